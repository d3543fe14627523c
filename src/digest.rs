use anyhow::Result;
use chrono::Local;
use tracing::{error, info};

use crate::agent::{Orchestrator, ReasoningBackend, TaskRequest};
use crate::config::Config;
use crate::feeds::FeedAggregator;
use crate::report;
use crate::telegram::TelegramNotifier;
use crate::tool::NewsFeedTool;

/// Formats the run date the way the report header expects it,
/// e.g. "Feb 03, 2026".
pub fn report_date() -> String {
    Local::now().format("%b %d, %Y").to_string()
}

/// Runs the whole digest pipeline once: reasoning over the feeds,
/// formatting, delivery. Exactly one message reaches the notifier per run —
/// the report, or, for any fault escaping the chain, the System Error
/// shape. The run itself never fails past this point.
pub async fn run<B: ReasoningBackend>(
    config: &Config,
    backend: B,
    aggregator: FeedAggregator,
    notifier: &TelegramNotifier,
    date: &str,
) {
    info!("Executing market digest report for {}", date);

    let message = match produce_report(config, backend, aggregator, date).await {
        Ok(report) => report,
        Err(e) => {
            error!("Digest pipeline failed: {:#}", e);
            report::error_message(&format!("{:#}", e), date, config.error_detail_max_chars)
        }
    };

    let outcome = notifier.deliver(&message).await;
    if !outcome.ok {
        // Logged only — there is no further channel to report through
        error!(
            "Delivery failed (status {:?}): {}",
            outcome.status, outcome.detail
        );
    }
}

async fn produce_report<B: ReasoningBackend>(
    config: &Config,
    backend: B,
    aggregator: FeedAggregator,
    date: &str,
) -> Result<String> {
    let tool = NewsFeedTool::new(aggregator);
    let orchestrator = Orchestrator::new(backend, tool, config.agent_max_iterations);
    let response = orchestrator.run(&TaskRequest::for_date(date)).await?;
    Ok(report::format_report(&response.output, date))
}
