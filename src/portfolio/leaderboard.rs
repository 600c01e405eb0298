use std::collections::HashMap;

use serde::Serialize;
use tracing::info;

use crate::db::ledger::Ledger;
use crate::error::Result;
use crate::portfolio::holdings::{self, Position};
use crate::portfolio::valuation::{fetch_prices, stock_value};
use crate::quotes::PriceLookup;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub username: String,
    pub total_value: f64,
}

/// Sort by total value, highest first. Equal totals keep their input order.
pub fn rank(mut entries: Vec<LeaderboardEntry>) -> Vec<LeaderboardEntry> {
    entries.sort_by(|a, b| b.total_value.total_cmp(&a.total_value));
    entries
}

/// Total every user's cash plus priced holdings and rank them.
/// Each distinct symbol is priced once for the whole board.
pub async fn build(ledger: &Ledger, quotes: &dyn PriceLookup) -> Result<Vec<LeaderboardEntry>> {
    let users = ledger.all_users().await?;

    let mut books: Vec<(String, f64, Vec<Position>)> = Vec::with_capacity(users.len());
    for user in users {
        let txs = ledger.transactions_for_user(user.id).await?;
        books.push((user.username, user.cash, holdings::held(&txs)));
    }

    let prices: HashMap<String, f64> = fetch_prices(
        quotes,
        books
            .iter()
            .flat_map(|(_, _, positions)| positions.iter().map(|p| p.symbol.as_str()))
            .collect::<Vec<&str>>(),
    )
    .await?;

    let entries = books
        .into_iter()
        .map(|(username, cash, positions)| LeaderboardEntry {
            username,
            total_value: cash + stock_value(&positions, &prices),
        })
        .collect();

    let ranked = rank(entries);
    info!(users = ranked.len(), symbols = prices.len(), "Leaderboard built");
    Ok(ranked)
}
