use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::api::health::HealthState;
use crate::api::latency::QuoteLatency;
use crate::config::QUOTE_TIMEOUT_SECS;
use crate::error::{AppError, Result};
use crate::types::{normalize_symbol, Quote};

/// Source of current market prices.
///
/// `Ok(None)` means the symbol is unknown to the service. Transport and
/// upstream failures are errors and are never retried here.
#[async_trait]
pub trait PriceLookup: Send + Sync {
    async fn lookup(&self, symbol: &str) -> Result<Option<Quote>>;
}

// ---------------------------------------------------------------------------
// HTTP quote service
// ---------------------------------------------------------------------------

pub struct HttpQuoteClient {
    client: reqwest::Client,
    base_url: String,
    latency: Arc<QuoteLatency>,
    health: Arc<HealthState>,
}

impl HttpQuoteClient {
    pub fn new(base_url: String, latency: Arc<QuoteLatency>, health: Arc<HealthState>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(QUOTE_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url,
            latency,
            health,
        })
    }

    async fn fetch(&self, symbol: &str) -> Result<Option<Quote>> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[("symbol", symbol)])
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::BAD_REQUEST {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(AppError::Upstream(format!("quote service returned {status} for {symbol}")));
        }

        let body: serde_json::Value = resp.json().await?;
        Ok(parse_quote(&body, symbol))
    }
}

#[async_trait]
impl PriceLookup for HttpQuoteClient {
    async fn lookup(&self, symbol: &str) -> Result<Option<Quote>> {
        let Some(symbol) = normalize_symbol(symbol) else {
            return Ok(None);
        };

        let started = Instant::now();
        let result = self.fetch(&symbol).await;
        self.latency.observe(started.elapsed());

        match &result {
            Ok(Some(q)) => {
                self.health.set_last_quote_at_ns(now_ns());
                debug!(symbol = %q.symbol, price = q.price, "Quote received");
            }
            Ok(None) => debug!(symbol = %symbol, "Quote service does not know symbol"),
            Err(e) => {
                self.health.inc_quote_failures();
                warn!(symbol = %symbol, "Quote lookup failed: {e}");
            }
        }
        result
    }
}

/// Pull a quote out of a JSON payload. Accepts `latestPrice` or `price`
/// (number or numeric string) and `companyName` or `name`. Returns None when
/// no usable positive price is present.
pub fn parse_quote(v: &serde_json::Value, requested: &str) -> Option<Quote> {
    let price = ["latestPrice", "price"]
        .iter()
        .filter_map(|key| v.get(*key))
        .find_map(|p| p.as_f64().or_else(|| p.as_str().and_then(|s| s.trim().parse().ok())))
        .filter(|p: &f64| p.is_finite() && *p > 0.0)?;

    let symbol = v
        .get("symbol")
        .and_then(|s| s.as_str())
        .and_then(normalize_symbol)
        .unwrap_or_else(|| requested.to_string());

    let name = ["companyName", "name"]
        .iter()
        .filter_map(|key| v.get(*key).and_then(|n| n.as_str()))
        .find(|n| !n.trim().is_empty())
        .map(|n| n.trim().to_string())
        .unwrap_or_else(|| symbol.clone());

    Some(Quote { symbol, name, price })
}

// ---------------------------------------------------------------------------
// Fixed price table
// ---------------------------------------------------------------------------

/// In-memory price table. Serves `QUOTE_FIXTURES` for offline runs and backs tests.
#[derive(Default)]
pub struct StaticQuotes {
    quotes: DashMap<String, Quote>,
}

impl StaticQuotes {
    pub fn new(prices: &[(&str, f64)]) -> Self {
        let table = Self::default();
        for (symbol, price) in prices {
            table.set_price(symbol, *price);
        }
        table
    }

    pub fn from_fixtures(fixtures: &[(String, f64)]) -> Self {
        let table = Self::default();
        for (symbol, price) in fixtures {
            table.set_price(symbol, *price);
        }
        table
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        let Some(symbol) = normalize_symbol(symbol) else {
            return;
        };
        self.quotes.insert(
            symbol.clone(),
            Quote {
                name: symbol.clone(),
                symbol,
                price,
            },
        );
    }
}

#[async_trait]
impl PriceLookup for StaticQuotes {
    async fn lookup(&self, symbol: &str) -> Result<Option<Quote>> {
        let Some(symbol) = normalize_symbol(symbol) else {
            return Ok(None);
        };
        Ok(self.quotes.get(&symbol).map(|q| q.clone()))
    }
}


fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}
