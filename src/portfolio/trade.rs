use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::ledger::Ledger;
use crate::error::{AppError, Result};
use crate::quotes::PriceLookup;
use crate::types::normalize_symbol;

/// Raw buy/sell form. Both fields arrive as text and are validated here.
#[derive(Debug, Default, Deserialize)]
pub struct TradeForm {
    pub symbol: Option<String>,
    pub shares: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub side: Side,
    pub symbol: String,
    pub shares: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeReceipt {
    pub message: String,
    pub symbol: String,
    pub shares: i64,
    pub price: f64,
    pub total: f64,
    /// Cash balance after the trade.
    pub cash: f64,
}

impl Order {
    /// Validate a submitted form. Rejections carry the reason shown to the user.
    pub fn parse(side: Side, form: &TradeForm) -> Result<Self> {
        let symbol = form
            .symbol
            .as_deref()
            .and_then(normalize_symbol)
            .ok_or_else(|| {
                AppError::rejected(match side {
                    Side::Buy => "Must provide valid symbol",
                    Side::Sell => "Must select a stock",
                })
            })?;

        let shares = form
            .shares
            .as_deref()
            .map(str::trim)
            .and_then(|s| s.parse::<i64>().ok())
            .filter(|n| *n > 0)
            .ok_or_else(|| AppError::rejected("Shares must be a positive integer"))?;

        Ok(Self { side, symbol, shares })
    }
}

/// Price and execute an order. Nothing is written unless every check passes.
pub async fn execute(ledger: &Ledger, quotes: &dyn PriceLookup, user_id: i64, order: &Order) -> Result<TradeReceipt> {
    match order.side {
        Side::Buy => buy(ledger, quotes, user_id, order).await,
        Side::Sell => sell(ledger, quotes, user_id, order).await,
    }
}

async fn buy(ledger: &Ledger, quotes: &dyn PriceLookup, user_id: i64, order: &Order) -> Result<TradeReceipt> {
    let quote = quotes
        .lookup(&order.symbol)
        .await?
        .ok_or_else(|| AppError::rejected("Must provide valid symbol"))?;

    let cash = ledger
        .execute_buy(user_id, &quote.symbol, order.shares, quote.price)
        .await?;

    Ok(TradeReceipt {
        message: format!("You bought {} shares of {}", order.shares, quote.symbol),
        symbol: quote.symbol,
        shares: order.shares,
        price: quote.price,
        total: order.shares as f64 * quote.price,
        cash,
    })
}

async fn sell(ledger: &Ledger, quotes: &dyn PriceLookup, user_id: i64, order: &Order) -> Result<TradeReceipt> {
    // Checked before pricing so selling something never owned needs no lookup.
    // The ledger re-checks inside the write transaction.
    let owned = ledger.shares_owned(user_id, &order.symbol).await?;
    if order.shares > owned {
        debug!(user_id, symbol = %order.symbol, owned, wanted = order.shares, "Sell exceeds holdings");
        return Err(AppError::rejected("You do not own enough shares"));
    }

    let quote = quotes
        .lookup(&order.symbol)
        .await?
        .ok_or_else(|| AppError::rejected("Invalid stock symbol"))?;

    let cash = ledger
        .execute_sell(user_id, &order.symbol, order.shares, quote.price)
        .await?;

    Ok(TradeReceipt {
        message: format!("You sold {} shares of {}", order.shares, order.symbol),
        symbol: order.symbol.clone(),
        shares: order.shares,
        price: quote.price,
        total: order.shares as f64 * quote.price,
        cash,
    })
}
