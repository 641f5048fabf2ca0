mod config;
mod error;
mod message;
mod models;
mod pulse;
mod resultsdb;
mod translator;

use std::sync::Arc;

use anyhow::Result;

use config::Config;
use resultsdb::HttpResultsDb;
use translator::Translator;

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();

    let config = Config::from_env()?;
    let resultsdb = HttpResultsDb::new(&config)?;
    tracing::info!(api = resultsdb.base_url(), "using ResultsDB");
    let translator = Translator::new(Arc::new(resultsdb));

    loop {
        if let Err(e) = pulse::start_pulse_handler(&config, &translator).await {
            tracing::error!("Message consumer stopped: {:#}", e);
        }
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    }
}
