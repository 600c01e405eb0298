use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use house_ledger::api::quiz;
use house_ledger::config::Config;
use house_ledger::error::Result;

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
    let bind_addr = format!("0.0.0.0:{}", cfg.quiz_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Sorting hat listening on {bind_addr}");

    axum::serve(listener, quiz::router()).await?;

    Ok(())
}
