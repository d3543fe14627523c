use anyhow::Result;
use tracing::info;

use market_digest_agent::agent::ClaudeBackend;
use market_digest_agent::config::Config;
use market_digest_agent::digest;
use market_digest_agent::feeds::FeedAggregator;
use market_digest_agent::telegram::TelegramNotifier;

#[tokio::main]
async fn main() -> Result<()> {
    // Required credentials are checked before anything touches the network
    let config = Config::from_env()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("market_digest_agent=info")
            }),
        )
        .init();

    let date = digest::report_date();
    info!("Market digest agent starting");

    let notifier = TelegramNotifier::new(&config)?;
    let aggregator = FeedAggregator::new(&config)?;
    let backend = ClaudeBackend::new(&config)?;

    digest::run(&config, backend, aggregator, &notifier, &date).await;
    info!("Market digest run complete");
    Ok(())
}
