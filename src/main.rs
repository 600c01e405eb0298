use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use house_ledger::api::health::HealthState;
use house_ledger::api::latency::QuoteLatency;
use house_ledger::api::routes::{router, ApiState};
use house_ledger::config::Config;
use house_ledger::db::{self, Ledger};
use house_ledger::error::Result;
use house_ledger::quotes::{HttpQuoteClient, PriceLookup, StaticQuotes};
use house_ledger::state::SessionStore;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let pool = db::connect(&cfg.db_path).await?;
    let ledger = Ledger::new(pool);
    let users = ledger.count_users().await?;
    info!(users, "Database ready at {}", cfg.db_path);

    // --- Price source ---
    let latency = Arc::new(QuoteLatency::new());
    let health = Arc::new(HealthState::new());
    let quotes: Arc<dyn PriceLookup> = if cfg.quote_fixtures.is_empty() {
        info!("Quoting from {}", cfg.quote_api_url);
        Arc::new(HttpQuoteClient::new(
            cfg.quote_api_url.clone(),
            Arc::clone(&latency),
            Arc::clone(&health),
        )?)
    } else {
        info!(symbols = cfg.quote_fixtures.len(), "Quoting from fixed QUOTE_FIXTURES prices");
        Arc::new(StaticQuotes::from_fixtures(&cfg.quote_fixtures))
    };

    // Session reaper (background, every 300s)
    let sessions = SessionStore::new(Duration::from_secs(cfg.session_ttl_secs));
    tokio::spawn(Arc::clone(&sessions).run_reaper());

    // HTTP API server
    let api_state = ApiState {
        ledger,
        quotes,
        sessions,
        health,
        latency,
        starting_cash: cfg.starting_cash,
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Ledger API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
