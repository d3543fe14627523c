use anyhow::{Context, Result};
use std::env;

/// Default feed endpoints, in delivery order.
const DEFAULT_FEED_URLS: &[&str] = &[
    "https://www.livemint.com/rss/markets",
    "https://economictimes.indiatimes.com/rssfeeds/1977021501.cms",
];

#[derive(Debug, Clone)]
pub struct Config {
    // Telegram delivery
    pub telegram_bot_token: String,
    pub telegram_chat_id: String,
    pub telegram_api_url: String,
    pub telegram_request_timeout_secs: u64,
    // Reasoning backend
    pub anthropic_api_key: String,
    pub anthropic_api_url: String,
    pub model: String,
    pub agent_max_tokens: u32,
    pub agent_max_iterations: u32,
    pub backend_max_retries: u32,
    pub backend_request_timeout_secs: u64,
    // Feeds
    pub feed_urls: Vec<String>,
    pub max_entries_per_feed: usize,
    pub summary_max_chars: usize,
    pub feed_request_timeout_secs: u64,
    // Error reporting
    pub error_detail_max_chars: usize,
}

fn required(name: &str) -> Result<String> {
    env::var(name).with_context(|| format!("Missing required environment variable {}", name))
}

impl Config {
    /// Loads configuration from the environment. The three credentials are
    /// required and checked here, before anything touches the network;
    /// everything else has a default.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Don't fail if .env missing

        Ok(Config {
            telegram_bot_token: required("TELEGRAM_BOT_TOKEN")?,
            telegram_chat_id: required("TELEGRAM_CHAT_ID")?,
            anthropic_api_key: required("ANTHROPIC_API_KEY")?,
            telegram_api_url: env::var("TELEGRAM_API_URL")
                .unwrap_or_else(|_| "https://api.telegram.org".to_string()),
            telegram_request_timeout_secs: env::var("TELEGRAM_REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Failed to parse TELEGRAM_REQUEST_TIMEOUT_SECS")?,
            anthropic_api_url: env::var("ANTHROPIC_API_URL")
                .unwrap_or_else(|_| "https://api.anthropic.com".to_string()),
            model: env::var("ANTHROPIC_MODEL")
                .unwrap_or_else(|_| "claude-sonnet-4-5-20250929".to_string()),
            agent_max_tokens: env::var("AGENT_MAX_TOKENS")
                .unwrap_or_else(|_| "1024".to_string())
                .parse()
                .context("Failed to parse AGENT_MAX_TOKENS")?,
            agent_max_iterations: env::var("AGENT_MAX_ITERATIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("Failed to parse AGENT_MAX_ITERATIONS")?,
            backend_max_retries: env::var("BACKEND_MAX_RETRIES")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .context("Failed to parse BACKEND_MAX_RETRIES")?,
            backend_request_timeout_secs: env::var("BACKEND_REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("Failed to parse BACKEND_REQUEST_TIMEOUT_SECS")?,
            feed_urls: env::var("FEED_URLS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_else(|_| DEFAULT_FEED_URLS.iter().map(|s| s.to_string()).collect()),
            max_entries_per_feed: env::var("MAX_ENTRIES_PER_FEED")
                .unwrap_or_else(|_| "6".to_string())
                .parse()
                .context("Failed to parse MAX_ENTRIES_PER_FEED")?,
            summary_max_chars: env::var("SUMMARY_MAX_CHARS")
                .unwrap_or_else(|_| "200".to_string())
                .parse()
                .context("Failed to parse SUMMARY_MAX_CHARS")?,
            feed_request_timeout_secs: env::var("FEED_REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Failed to parse FEED_REQUEST_TIMEOUT_SECS")?,
            error_detail_max_chars: env::var("ERROR_DETAIL_MAX_CHARS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .context("Failed to parse ERROR_DETAIL_MAX_CHARS")?,
        })
    }
}
