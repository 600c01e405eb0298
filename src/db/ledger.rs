use std::time::{SystemTime, UNIX_EPOCH};

use sqlx::sqlite::{SqliteConnection, SqlitePool};
use tracing::info;

use crate::db::models::{TransactionRow, UserRow, UserSummaryRow};
use crate::error::{AppError, Result};
use crate::types::{NewTransaction, Transaction, UserSummary};

/// SQLite-backed user accounts and the append-only transaction ledger.
///
/// Cash and ledger rows only ever change together: every buy or sell runs
/// its cash update and insert inside one database transaction.
#[derive(Clone)]
pub struct Ledger {
    pool: SqlitePool,
}

impl Ledger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    /// Insert a user and return the new id. A taken username is a rejection.
    pub async fn create_user(&self, username: &str, hash: &str, cash: f64) -> Result<i64> {
        let result = sqlx::query("INSERT INTO users (username, hash, cash) VALUES (?, ?, ?)")
            .bind(username)
            .bind(hash)
            .bind(cash)
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) => {
                let id = done.last_insert_rowid();
                info!(user_id = id, username = %username, "User registered");
                Ok(id)
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(AppError::rejected("Username already exists"))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT id, username, hash, cash FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn user(&self, user_id: i64) -> Result<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT id, username, hash, cash FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn user_summary(&self, user_id: i64) -> Result<UserSummary> {
        let row = sqlx::query_as::<_, UserSummaryRow>("SELECT id, username, cash FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(UserSummary::from)
            .ok_or_else(|| AppError::NotFound(format!("User {user_id} not found")))
    }

    pub async fn cash(&self, user_id: i64) -> Result<f64> {
        Ok(self.user_summary(user_id).await?.cash)
    }

    /// Every user, in registration order.
    pub async fn all_users(&self) -> Result<Vec<UserSummary>> {
        let rows = sqlx::query_as::<_, UserSummaryRow>("SELECT id, username, cash FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(UserSummary::from).collect())
    }

    pub async fn count_users(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    pub async fn update_password(&self, user_id: i64, hash: &str) -> Result<()> {
        let done = sqlx::query("UPDATE users SET hash = ? WHERE id = ?")
            .bind(hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {user_id} not found")));
        }
        Ok(())
    }

    /// Purge a user's ledger rows and the user itself as one unit.
    pub async fn delete_user(&self, user_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let purged = sqlx::query("DELETE FROM transactions WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let removed = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if removed == 0 {
            return Err(AppError::NotFound(format!("User {user_id} not found")));
        }
        tx.commit().await?;
        info!(user_id, transactions = purged, "Account deleted");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------------

    /// Write a ledger row without touching cash. Trades go through
    /// [`Ledger::execute_buy`] / [`Ledger::execute_sell`] instead.
    pub async fn append(&self, new: &NewTransaction) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        insert_transaction(&mut conn, new).await
    }

    /// A user's ledger, oldest first.
    pub async fn transactions_for_user(&self, user_id: i64) -> Result<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, user_id, symbol, shares, price, timestamp
            FROM transactions
            WHERE user_id = ?
            ORDER BY timestamp, id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Transaction::from).collect())
    }

    /// A user's ledger for one symbol, oldest first.
    pub async fn transactions_for_symbol(&self, user_id: i64, symbol: &str) -> Result<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, user_id, symbol, shares, price, timestamp
            FROM transactions
            WHERE user_id = ? AND symbol = ?
            ORDER BY timestamp, id
            "#,
        )
        .bind(user_id)
        .bind(symbol)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Transaction::from).collect())
    }

    /// A user's ledger, newest first.
    pub async fn history(&self, user_id: i64) -> Result<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, user_id, symbol, shares, price, timestamp
            FROM transactions
            WHERE user_id = ?
            ORDER BY timestamp DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Transaction::from).collect())
    }

    pub async fn shares_owned(&self, user_id: i64, symbol: &str) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        shares_owned_on(&mut conn, user_id, symbol).await
    }

    pub async fn delete_all_for_user(&self, user_id: i64) -> Result<u64> {
        let done = sqlx::query("DELETE FROM transactions WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected())
    }

    // -----------------------------------------------------------------------
    // Trades
    // -----------------------------------------------------------------------

    /// Debit `shares * price` and append the buy. Rejects without writing
    /// anything when the user cannot afford it. Returns the cash left.
    pub async fn execute_buy(&self, user_id: i64, symbol: &str, shares: i64, price: f64) -> Result<f64> {
        let new = NewTransaction {
            user_id,
            symbol: symbol.to_string(),
            shares,
            price,
        };
        let cost = shares as f64 * price;

        // The balance check lives in the UPDATE so it is the first statement of
        // the transaction and takes the write lock before anything is read.
        let mut tx = self.pool.begin().await?;
        let remaining: Option<f64> = sqlx::query_scalar(
            "UPDATE users SET cash = cash + ? WHERE id = ? AND cash + ? >= 0 RETURNING cash",
        )
        .bind(new.cash_delta())
        .bind(user_id)
        .bind(new.cash_delta())
        .fetch_optional(&mut *tx)
        .await?;
        let Some(remaining) = remaining else {
            return Err(refusal(&mut tx, user_id, "Cannot afford").await);
        };

        insert_transaction(&mut tx, &new).await?;
        tx.commit().await?;

        info!(user_id, symbol = %symbol, shares, price, cost, "Bought");
        Ok(remaining)
    }

    /// Credit `shares * price` and append the sell as negative shares.
    /// Rejects without writing anything when the user owns too few shares.
    /// Returns the resulting cash balance.
    pub async fn execute_sell(&self, user_id: i64, symbol: &str, shares: i64, price: f64) -> Result<f64> {
        let new = NewTransaction {
            user_id,
            symbol: symbol.to_string(),
            shares: -shares,
            price,
        };

        let mut tx = self.pool.begin().await?;
        let cash: Option<f64> = sqlx::query_scalar(
            r#"
            UPDATE users SET cash = cash + ?
            WHERE id = ?
              AND (SELECT COALESCE(SUM(shares), 0) FROM transactions
                   WHERE user_id = ? AND symbol = ?) >= ?
            RETURNING cash
            "#,
        )
        .bind(new.cash_delta())
        .bind(user_id)
        .bind(user_id)
        .bind(symbol)
        .bind(shares)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(cash) = cash else {
            return Err(refusal(&mut tx, user_id, "You do not own enough shares").await);
        };

        insert_transaction(&mut tx, &new).await?;
        tx.commit().await?;

        info!(user_id, symbol = %symbol, shares, price, proceeds = shares as f64 * price, "Sold");
        Ok(cash)
    }
}

/// Why a guarded trade UPDATE matched no row: the user is gone or the guard failed.
async fn refusal(conn: &mut SqliteConnection, user_id: i64, reason: &str) -> AppError {
    let exists = sqlx::query_scalar::<_, i64>("SELECT 1 FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await;
    match exists {
        Ok(Some(_)) => AppError::rejected(reason),
        Ok(None) => AppError::NotFound(format!("User {user_id} not found")),
        Err(e) => e.into(),
    }
}

async fn insert_transaction(conn: &mut SqliteConnection, new: &NewTransaction) -> Result<i64> {
    let done = sqlx::query(
        r#"
        INSERT INTO transactions (user_id, symbol, shares, price, timestamp)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(new.user_id)
    .bind(&new.symbol)
    .bind(new.shares)
    .bind(new.price)
    .bind(now_ns() as i64)
    .execute(&mut *conn)
    .await?;
    Ok(done.last_insert_rowid())
}

async fn shares_owned_on(conn: &mut SqliteConnection, user_id: i64, symbol: &str) -> Result<i64> {
    let owned: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(shares), 0) FROM transactions WHERE user_id = ? AND symbol = ?",
    )
    .bind(user_id)
    .bind(symbol)
    .fetch_one(&mut *conn)
    .await?;
    Ok(owned)
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}
