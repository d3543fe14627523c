use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info};

use crate::config::Config;

/// Local record of one delivery attempt. Delivery failure is reported here
/// and logged, never raised — there is no further channel to surface it
/// through.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub ok: bool,
    pub status: Option<u16>,
    pub detail: String,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
}

pub struct TelegramNotifier {
    client: Client,
    api_url: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.telegram_request_timeout_secs))
            .build()
            .context("Failed to build Telegram HTTP client")?;

        Ok(TelegramNotifier {
            client,
            api_url: config.telegram_api_url.trim_end_matches('/').to_string(),
            bot_token: config.telegram_bot_token.clone(),
            chat_id: config.telegram_chat_id.clone(),
        })
    }

    /// Sends `text` as HTML to the configured chat with link previews
    /// disabled. The caller is expected to hand over markup-safe text.
    pub async fn deliver(&self, text: &str) -> DeliveryOutcome {
        let url = format!("{}/bot{}/sendMessage", self.api_url, self.bot_token);
        let payload = SendMessageRequest {
            chat_id: &self.chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };

        match self.client.post(&url).form(&payload).send().await {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    info!("Message delivered to chat {}", self.chat_id);
                    DeliveryOutcome {
                        ok: true,
                        status: Some(status.as_u16()),
                        detail: String::new(),
                    }
                } else {
                    let body = resp.text().await.unwrap_or_default();
                    error!("Telegram returned {}: {}", status, body);
                    DeliveryOutcome {
                        ok: false,
                        status: Some(status.as_u16()),
                        detail: body,
                    }
                }
            }
            Err(e) => {
                error!("Telegram request failed: {}", e);
                DeliveryOutcome {
                    ok: false,
                    status: None,
                    detail: e.to_string(),
                }
            }
        }
    }
}
