use std::collections::BTreeMap;

use serde::Serialize;

use crate::types::Transaction;

/// Net position in one symbol, folded from a user's ledger rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub symbol: String,
    /// Signed sum of every buy and sell.
    pub shares: i64,
    /// Sum of positive share counts only.
    pub total_bought: i64,
    /// Sum of `shares * price` over buys only. Sells never touch cost basis.
    pub total_spent: f64,
}

impl Position {
    fn empty(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            shares: 0,
            total_bought: 0,
            total_spent: 0.0,
        }
    }

    fn apply(&mut self, tx: &Transaction) {
        // Counts saturate rather than wrap on absurd ledgers.
        self.shares = self.shares.saturating_add(tx.shares);
        if tx.shares > 0 {
            self.total_bought = self.total_bought.saturating_add(tx.shares);
            self.total_spent += tx.shares as f64 * tx.price;
        }
    }

    /// A symbol is held iff its net share count is positive.
    pub fn is_held(&self) -> bool {
        self.shares > 0
    }

    /// Mean purchase price over all buys; 0 when nothing was ever bought.
    pub fn average_price(&self) -> f64 {
        if self.total_bought > 0 {
            self.total_spent / self.total_bought as f64
        } else {
            0.0
        }
    }

    pub fn cost_basis(&self) -> f64 {
        self.average_price() * self.shares as f64
    }
}

/// Fold every transaction into one position per symbol, ordered by symbol.
/// Includes flat and short positions; see [`held`] for the filtered view.
pub fn aggregate(transactions: &[Transaction]) -> Vec<Position> {
    let mut by_symbol: BTreeMap<&str, Position> = BTreeMap::new();
    for tx in transactions {
        by_symbol
            .entry(tx.symbol.as_str())
            .or_insert_with(|| Position::empty(&tx.symbol))
            .apply(tx);
    }
    by_symbol.into_values().collect()
}

/// Positions with a positive net share count, ordered by symbol.
pub fn held(transactions: &[Transaction]) -> Vec<Position> {
    aggregate(transactions)
        .into_iter()
        .filter(Position::is_held)
        .collect()
}

/// Position for a single symbol. Transactions for other symbols are ignored.
pub fn position_for(transactions: &[Transaction], symbol: &str) -> Position {
    let mut position = Position::empty(symbol);
    for tx in transactions.iter().filter(|t| t.symbol == symbol) {
        position.apply(tx);
    }
    position
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(symbol: &str, shares: i64, price: f64) -> Transaction {
        Transaction {
            id: 0,
            user_id: 1,
            symbol: symbol.to_string(),
            shares,
            price,
            timestamp: 0,
        }
    }

    #[test]
    fn partial_sell_keeps_original_cost_basis() {
        let txs = vec![tx("AAPL", 10, 100.0), tx("AAPL", -4, 150.0)];
        let positions = held(&txs);
        assert_eq!(positions.len(), 1);

        let p = &positions[0];
        assert_eq!(p.shares, 6);
        assert_eq!(p.total_bought, 10);
        assert_eq!(p.total_spent, 1000.0);
        assert_eq!(p.average_price(), 100.0);
        assert_eq!(p.cost_basis(), 600.0);
    }

    #[test]
    fn fully_sold_symbol_is_not_held() {
        let txs = vec![
            tx("MSFT", 5, 300.0),
            tx("MSFT", -5, 320.0),
            tx("NFLX", 2, 400.0),
        ];
        let positions = held(&txs);
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].symbol, "NFLX");

        // The unfiltered view still reports the flat position.
        let all = aggregate(&txs);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].symbol, "MSFT");
        assert_eq!(all[0].shares, 0);
    }

    #[test]
    fn no_transactions_means_no_holdings() {
        assert!(held(&[]).is_empty());
        assert!(aggregate(&[]).is_empty());
    }

    #[test]
    fn positions_are_ordered_by_symbol() {
        let txs = vec![tx("TSLA", 1, 200.0), tx("AAPL", 1, 100.0), tx("GOOG", 1, 90.0)];
        let symbols: Vec<_> = held(&txs).into_iter().map(|p| p.symbol).collect();
        assert_eq!(symbols, vec!["AAPL", "GOOG", "TSLA"]);
    }

    #[test]
    fn average_price_weights_by_shares() {
        let txs = vec![tx("AAPL", 10, 100.0), tx("AAPL", 30, 200.0)];
        let p = position_for(&txs, "AAPL");
        assert_eq!(p.total_bought, 40);
        assert_eq!(p.total_spent, 7000.0);
        assert_eq!(p.average_price(), 175.0);
        assert_eq!(p.cost_basis(), 7000.0);
    }

    #[test]
    fn position_without_buys_has_zero_cost_basis() {
        let p = position_for(&[tx("AAPL", -3, 10.0)], "AAPL");
        assert_eq!(p.shares, -3);
        assert_eq!(p.average_price(), 0.0);
        assert!(!p.is_held());
    }

    #[test]
    fn position_for_ignores_other_symbols() {
        let txs = vec![tx("AAPL", 10, 100.0), tx("MSFT", 7, 50.0)];
        let p = position_for(&txs, "MSFT");
        assert_eq!(p.shares, 7);
        assert_eq!(p.total_spent, 350.0);
    }

    #[test]
    fn huge_share_counts_saturate() {
        let txs = vec![tx("AAPL", i64::MAX, 1.0), tx("AAPL", i64::MAX, 1.0)];
        let p = position_for(&txs, "AAPL");
        assert_eq!(p.shares, i64::MAX);
        assert_eq!(p.total_bought, i64::MAX);
        assert!(p.is_held());

        let p = position_for(&[tx("AAPL", i64::MIN, 1.0), tx("AAPL", -1, 1.0)], "AAPL");
        assert_eq!(p.shares, i64::MIN);
        assert_eq!(p.total_bought, 0);
    }
}
