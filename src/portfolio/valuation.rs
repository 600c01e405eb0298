use std::collections::HashMap;

use serde::Serialize;
use tracing::warn;

use crate::error::Result;
use crate::portfolio::holdings::Position;
use crate::quotes::PriceLookup;

/// One priced line of the portfolio view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioRow {
    pub symbol: String,
    pub shares: i64,
    pub cost_basis: f64,
    pub price: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioView {
    pub rows: Vec<PortfolioRow>,
    pub cash: f64,
    pub total_stocks: f64,
    pub total: f64,
    /// Held symbols left out because no price was available.
    pub skipped: Vec<String>,
}

/// Price held positions against a snapshot of current prices.
/// Positions without a price are skipped and reported, never fatal.
pub fn value_positions(cash: f64, positions: &[Position], prices: &HashMap<String, f64>) -> PortfolioView {
    let mut rows = Vec::with_capacity(positions.len());
    let mut skipped = Vec::new();
    let mut total_stocks = 0.0;

    for position in positions.iter().filter(|p| p.is_held()) {
        let Some(&price) = prices.get(&position.symbol) else {
            skipped.push(position.symbol.clone());
            continue;
        };
        let total = position.shares as f64 * price;
        total_stocks += total;
        rows.push(PortfolioRow {
            symbol: position.symbol.clone(),
            shares: position.shares,
            cost_basis: position.cost_basis(),
            price,
            total,
        });
    }

    PortfolioView {
        rows,
        cash,
        total_stocks,
        total: cash + total_stocks,
        skipped,
    }
}

/// Market value of held positions only (no cost basis). Used by the leaderboard.
pub fn stock_value(positions: &[Position], prices: &HashMap<String, f64>) -> f64 {
    positions
        .iter()
        .filter(|p| p.is_held())
        .filter_map(|p| prices.get(&p.symbol).map(|price| p.shares as f64 * price))
        .sum()
}

/// Look each symbol up once. A symbol the price service does not know is
/// left out of the map and logged; transport failures propagate.
pub async fn fetch_prices<'a, I>(quotes: &dyn PriceLookup, symbols: I) -> Result<HashMap<String, f64>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut prices = HashMap::new();
    for symbol in symbols {
        if prices.contains_key(symbol) {
            continue;
        }
        match quotes.lookup(symbol).await? {
            Some(quote) => {
                prices.insert(symbol.to_string(), quote.price);
            }
            None => warn!(symbol = %symbol, "No price available, excluding from valuation"),
        }
    }
    Ok(prices)
}

/// Fetch prices for the held positions and build the portfolio view.
pub async fn appraise(quotes: &dyn PriceLookup, cash: f64, positions: &[Position]) -> Result<PortfolioView> {
    let prices = fetch_prices(
        quotes,
        positions
            .iter()
            .filter(|p| p.is_held())
            .map(|p| p.symbol.as_str())
            .collect::<Vec<&str>>(),
    )
    .await?;
    Ok(value_positions(cash, positions, &prices))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quotes::testing::ScriptedQuotes;

    fn position(symbol: &str, shares: i64, total_bought: i64, total_spent: f64) -> Position {
        Position {
            symbol: symbol.to_string(),
            shares,
            total_bought,
            total_spent,
        }
    }

    #[test]
    fn values_rows_and_totals() {
        let positions = vec![
            position("AAPL", 6, 10, 1000.0),
            position("MSFT", 2, 2, 500.0),
        ];
        let prices = HashMap::from([("AAPL".to_string(), 120.0), ("MSFT".to_string(), 300.0)]);

        let view = value_positions(1000.0, &positions, &prices);
        assert_eq!(view.rows.len(), 2);
        assert_eq!(view.rows[0].total, 720.0);
        assert_eq!(view.rows[0].cost_basis, 600.0);
        assert_eq!(view.rows[1].total, 600.0);
        assert_eq!(view.total_stocks, 1320.0);
        assert_eq!(view.total, 2320.0);
        assert!(view.skipped.is_empty());
    }

    #[test]
    fn missing_price_is_skipped_not_fatal() {
        let positions = vec![
            position("AAPL", 6, 10, 1000.0),
            position("GONE", 3, 3, 30.0),
        ];
        let prices = HashMap::from([("AAPL".to_string(), 100.0)]);

        let view = value_positions(50.0, &positions, &prices);
        assert_eq!(view.rows.len(), 1);
        assert_eq!(view.rows[0].symbol, "AAPL");
        assert_eq!(view.total_stocks, 600.0);
        assert_eq!(view.total, 650.0);
        assert_eq!(view.skipped, vec!["GONE".to_string()]);
    }

    #[test]
    fn flat_positions_never_appear() {
        let positions = vec![position("AAPL", 0, 5, 500.0)];
        let prices = HashMap::from([("AAPL".to_string(), 100.0)]);
        let view = value_positions(10.0, &positions, &prices);
        assert!(view.rows.is_empty());
        assert_eq!(view.total, 10.0);
        assert_eq!(stock_value(&positions, &prices), 0.0);
    }

    #[tokio::test]
    async fn appraise_uses_lookup_and_skips_unknown() {
        let quotes = ScriptedQuotes::new(&[("AAPL", 150.0)]);
        let positions = vec![
            position("AAPL", 6, 10, 1000.0),
            position("ZZZZ", 1, 1, 5.0),
        ];

        let view = appraise(&quotes, 100.0, &positions).await.unwrap();
        assert_eq!(view.rows.len(), 1);
        assert_eq!(view.rows[0].price, 150.0);
        assert_eq!(view.total_stocks, 900.0);
        assert_eq!(view.total, 1000.0);
        assert_eq!(view.skipped, vec!["ZZZZ".to_string()]);
    }

    #[tokio::test]
    async fn fetch_prices_looks_up_each_symbol_once() {
        let quotes = ScriptedQuotes::new(&[("AAPL", 150.0)]);
        let prices = fetch_prices(&quotes, ["AAPL", "AAPL", "AAPL"]).await.unwrap();
        assert_eq!(prices.len(), 1);
        assert_eq!(quotes.lookups(), 1);
    }

    #[tokio::test]
    async fn lookup_failure_propagates() {
        let quotes = ScriptedQuotes::new(&[("AAPL", 150.0)]);
        quotes.fail_with("upstream down");
        let positions = vec![position("AAPL", 1, 1, 100.0)];
        assert!(appraise(&quotes, 0.0, &positions).await.is_err());
    }
}
