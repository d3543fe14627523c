use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::tool::{NewsFeedTool, ToolOutput, ToolSpec, NEWS_TOOL_NAME};

/// Formatting contract handed to the reasoning backend. The report shapes
/// the formatter and the Telegram channel expect are fixed here.
pub const SYSTEM_DIRECTIVE: &str = "You are a Senior Market Strategist.\n\
STEPS:\n\
1. Use fetch_market_news once.\n\
2. Organize results into: 🏦 BANKING, 💻 IT & TECH, 📈 FII/MACRO.\n\
3. For EACH story, use this EXACT format with DOUBLE SPACING between items:\n\
• <b>Title</b>: Summary. <a href='LINK'>Read More</a>\n\n\
4. If no news for a sector, skip it. If no news at all, say 'No news found.'\n\
5. Final Answer: Your formatted report.";

/// Marker the backend is instructed to prefix its terminal answer with.
/// The report formatter strips it before delivery.
pub const FINAL_ANSWER_MARKER: &str = "Final Answer:";

// ─── Conversation wire types ───

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: Vec<ContentBlock>,
}

impl ChatMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        ChatMessage {
            role: "user".to_string(),
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }
}

/// One reasoning step: the assistant content plus the reported stop reason.
#[derive(Debug, Clone)]
pub struct ReasoningStep {
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<String>,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("reasoning backend returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("reasoning backend request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed reasoning response: {0}")]
    Malformed(String),
}

/// The opaque reasoning strategy. Production talks to the Anthropic
/// Messages API; tests swap in a deterministic double.
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    async fn step(
        &self,
        system: &str,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ReasoningStep, BackendError>;
}

// ─── Anthropic Messages API backend ───

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    system: &'a str,
    messages: &'a [ChatMessage],
    tools: &'a [ToolSpec],
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

pub struct ClaudeBackend {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    max_retries: u32,
}

impl ClaudeBackend {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.backend_request_timeout_secs))
            .build()
            .context("Failed to build reasoning backend HTTP client")?;

        Ok(ClaudeBackend {
            client,
            api_url: config.anthropic_api_url.clone(),
            api_key: config.anthropic_api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.agent_max_tokens,
            max_retries: config.backend_max_retries,
        })
    }
}

#[async_trait]
impl ReasoningBackend for ClaudeBackend {
    async fn step(
        &self,
        system: &str,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ReasoningStep, BackendError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            // Pinned: the formatting contract leaves no room for sampling drift
            temperature: 0.0,
            system,
            messages,
            tools,
        };

        let mut last_err = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_millis(1000 * 2u64.pow(attempt - 1));
                warn!(
                    "Retrying reasoning backend after {:?} (attempt {})",
                    delay,
                    attempt + 1
                );
                tokio::time::sleep(delay).await;
            }

            match self
                .client
                .post(format!("{}/v1/messages", self.api_url))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01")
                .header("content-type", "application/json")
                .json(&request)
                .send()
                .await
            {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let parsed: MessagesResponse = resp
                            .json()
                            .await
                            .map_err(|e| BackendError::Malformed(e.to_string()))?;
                        if let Some(usage) = &parsed.usage {
                            debug!(
                                "Reasoning step used {} input / {} output tokens",
                                usage.input_tokens, usage.output_tokens
                            );
                        }
                        return Ok(ReasoningStep {
                            content: parsed.content,
                            stop_reason: parsed.stop_reason,
                        });
                    }
                    let code = status.as_u16();
                    let body = resp.text().await.unwrap_or_default();
                    if code == 429 || code >= 500 {
                        warn!("Reasoning backend returned {}: {}", code, body);
                        last_err = Some(BackendError::Api { status: code, body });
                        continue;
                    }
                    return Err(BackendError::Api { status: code, body });
                }
                Err(e) => {
                    warn!("Reasoning backend request failed: {}", e);
                    last_err = Some(BackendError::Transport(e));
                }
            }
        }
        Err(last_err
            .unwrap_or_else(|| BackendError::Malformed("no response after retries".to_string())))
    }
}

// ─── The orchestrator ───

/// The day's analysis goal plus the formatted run date, rendered into the
/// opening user message.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub instruction: String,
    pub date: String,
}

impl TaskRequest {
    pub fn for_date(date: &str) -> Self {
        TaskRequest {
            instruction: "Analyze today's RSS data for IT, Banking, and FII flows. \
                          Format into a clean report with links."
                .to_string(),
            date: date.to_string(),
        }
    }

    fn render(&self) -> String {
        format!("{}\nToday's date: {}.", self.instruction, self.date)
    }
}

/// Raw terminal output of the reasoning loop. May be empty, may be
/// well-formed report markup, may be free text that ignored the directive —
/// the report formatter tolerates all three.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub output: String,
}

pub struct Orchestrator<B> {
    backend: B,
    tool: NewsFeedTool,
    max_iterations: u32,
}

impl<B: ReasoningBackend> Orchestrator<B> {
    pub fn new(backend: B, tool: NewsFeedTool, max_iterations: u32) -> Self {
        Orchestrator {
            backend,
            tool,
            max_iterations,
        }
    }

    /// Drives the bounded reasoning loop: each iteration is one backend step
    /// followed by tool execution when requested. Tool faults stay inside
    /// the loop as error tool_results; backend faults propagate to the
    /// caller's single catch. The iteration ceiling is enforced here — the
    /// backend is never trusted to terminate on its own.
    pub async fn run(&self, task: &TaskRequest) -> Result<AgentResponse> {
        let tools = vec![NewsFeedTool::spec()];
        let mut messages = vec![ChatMessage::user_text(task.render())];
        let mut partial_answer = String::new();

        for iteration in 1..=self.max_iterations {
            let step = self
                .backend
                .step(SYSTEM_DIRECTIVE, &messages, &tools)
                .await
                .context("Reasoning step failed")?;

            let step_text = collect_text(&step.content);
            if !step_text.is_empty() {
                partial_answer = step_text.clone();
            }

            let tool_calls: Vec<(String, String, Value)> = step
                .content
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::ToolUse { id, name, input } => {
                        Some((id.clone(), name.clone(), input.clone()))
                    }
                    _ => None,
                })
                .collect();

            if tool_calls.is_empty() {
                info!(
                    "Agent produced final answer after {} iteration(s) (stop: {:?})",
                    iteration, step.stop_reason
                );
                return Ok(AgentResponse { output: step_text });
            }

            debug!(
                "Iteration {}: {} tool call(s) requested",
                iteration,
                tool_calls.len()
            );
            messages.push(ChatMessage {
                role: "assistant".to_string(),
                content: step.content,
            });

            let mut results = Vec::with_capacity(tool_calls.len());
            for (id, name, input) in tool_calls {
                let output = self.dispatch(&name, &input).await;
                results.push(ContentBlock::ToolResult {
                    tool_use_id: id,
                    content: output.content,
                    is_error: output.is_error.then_some(true),
                });
            }
            messages.push(ChatMessage {
                role: "user".to_string(),
                content: results,
            });
        }

        warn!(
            "Iteration ceiling ({}) reached, returning partial answer",
            self.max_iterations
        );
        Ok(AgentResponse {
            output: partial_answer,
        })
    }

    async fn dispatch(&self, name: &str, input: &Value) -> ToolOutput {
        if name != NEWS_TOOL_NAME {
            warn!("Backend requested unknown tool {}", name);
            return ToolOutput::error(format!("Unknown tool: {}", name));
        }
        let query = input.get("query").and_then(Value::as_str).unwrap_or_default();
        self.tool.invoke(query).await
    }
}

fn collect_text(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
