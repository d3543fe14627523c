use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use crate::feeds::FeedAggregator;

pub const NEWS_TOOL_NAME: &str = "fetch_market_news";

/// Declaration of a callable capability, serialized verbatim into the
/// reasoning backend request.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Result of one tool invocation. `is_error` mirrors the tool_result wire
/// flag so the backend can tell a failed call from an empty one.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(content: String) -> Self {
        ToolOutput {
            content,
            is_error: false,
        }
    }

    pub fn error(content: String) -> Self {
        ToolOutput {
            content,
            is_error: true,
        }
    }
}

/// The single capability exposed to the orchestrator: fetch the configured
/// market feeds and flatten them into one text block. The query argument is
/// part of the calling convention only — the implementation ignores it.
pub struct NewsFeedTool {
    aggregator: FeedAggregator,
}

impl NewsFeedTool {
    pub fn new(aggregator: FeedAggregator) -> Self {
        NewsFeedTool { aggregator }
    }

    pub fn spec() -> ToolSpec {
        ToolSpec {
            name: NEWS_TOOL_NAME.to_string(),
            description: "Fetches the latest market news headlines from Livemint and \
                          Economic Times RSS feeds. Only use this when asked to fetch \
                          market news."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Free-form description of the news being requested"
                    }
                }
            }),
        }
    }

    /// Runs the aggregation. Never fails: per-source faults are absorbed by
    /// the aggregator and an empty result comes back as its sentinel string.
    pub async fn invoke(&self, query: &str) -> ToolOutput {
        info!("Tool {} invoked (query: {:?})", NEWS_TOOL_NAME, query);
        ToolOutput::ok(self.aggregator.aggregate().await)
    }
}
