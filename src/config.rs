use crate::error::{AppError, Result};

pub const QUOTE_API_URL: &str = "https://finance.cs50.io/quote";

/// Cash granted to every newly registered account.
pub const STARTING_CASH: f64 = 10_000.0;

pub const MIN_PASSWORD_LEN: usize = 8;

/// Categorical questions `q1`..`q13` on the quiz form.
pub const QUIZ_QUESTION_COUNT: usize = 13;

/// Slider answers `q14`/`q15` use a 1–10 scale; a missing slider reads as 5.
pub mod slider {
    pub const MIN: f64 = 1.0;
    pub const MAX: f64 = 10.0;
    pub const DEFAULT: f64 = 5.0;
}

/// Price lookup request timeout (seconds).
pub const QUOTE_TIMEOUT_SECS: u64 = 10;

/// How often expired login sessions are swept (seconds).
pub const SESSION_REAPER_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    /// Port for the ledger API (API_PORT)
    pub api_port: u16,
    /// Port for the sorting hat quiz (QUIZ_PORT)
    pub quiz_port: u16,
    /// Quote endpoint, called as `{quote_api_url}?symbol=AAPL` (QUOTE_API_URL)
    pub quote_api_url: String,
    pub starting_cash: f64,
    pub session_ttl_secs: u64,
    /// Fixed prices that replace the quote service when set (QUOTE_FIXTURES).
    /// Example: "AAPL=150,MSFT=310.25"
    pub quote_fixtures: Vec<(String, f64)>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "finance.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            quiz_port: std::env::var("QUIZ_PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("QUIZ_PORT must be a valid port number".to_string()))?,
            quote_api_url: std::env::var("QUOTE_API_URL")
                .unwrap_or_else(|_| QUOTE_API_URL.to_string()),
            starting_cash: std::env::var("STARTING_CASH")
                .unwrap_or_else(|_| "10000".to_string())
                .parse::<f64>()
                .ok()
                .filter(|c| c.is_finite() && *c >= 0.0)
                .unwrap_or(STARTING_CASH),
            session_ttl_secs: std::env::var("SESSION_TTL_SECS")
                .unwrap_or_else(|_| "86400".to_string())
                .parse::<u64>()
                .unwrap_or(86_400),
            quote_fixtures: parse_fixtures(&std::env::var("QUOTE_FIXTURES").unwrap_or_default())?,
        })
    }
}

/// Parse `SYMBOL=PRICE` pairs separated by commas. Blank input yields no fixtures.
pub fn parse_fixtures(raw: &str) -> Result<Vec<(String, f64)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (symbol, price) = pair
                .split_once('=')
                .ok_or_else(|| AppError::Config(format!("QUOTE_FIXTURES entry {pair:?} must be SYMBOL=PRICE")))?;
            let price = price
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|p| p.is_finite() && *p > 0.0)
                .ok_or_else(|| AppError::Config(format!("QUOTE_FIXTURES price for {symbol:?} must be a positive number")))?;
            Ok((symbol.trim().to_ascii_uppercase(), price))
        })
        .collect()
}
