//! Row types for the `users` and `transactions` tables in `migrations/`.
//! Used by sqlx for typed queries.

use crate::types::{Transaction, UserSummary};

#[derive(Debug, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub hash: String,
    pub cash: f64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct UserSummaryRow {
    pub id: i64,
    pub username: String,
    pub cash: f64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct TransactionRow {
    pub id: i64,
    pub user_id: i64,
    pub symbol: String,
    pub shares: i64,
    pub price: f64,
    pub timestamp: i64,
}

impl From<UserSummaryRow> for UserSummary {
    fn from(r: UserSummaryRow) -> Self {
        UserSummary {
            id: r.id,
            username: r.username,
            cash: r.cash,
        }
    }
}

impl From<TransactionRow> for Transaction {
    fn from(r: TransactionRow) -> Self {
        Transaction {
            id: r.id,
            user_id: r.user_id,
            symbol: r.symbol,
            shares: r.shares,
            price: r.price,
            timestamp: r.timestamp,
        }
    }
}
