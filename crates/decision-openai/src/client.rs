use crate::parser::{parse_decision, MagnitudeBounds};
use crate::prompt::system_prompt;
use anyhow::{Context, Result};
use async_trait::async_trait;
use auto_trade_core::config::{DecisionConfig, EngineConfig};
use auto_trade_core::error::ApiError;
use auto_trade_core::events::{Decision, DecisionContext};
use auto_trade_core::traits::DecisionService;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    type_: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

pub struct OpenAiDecisionClient {
    http: Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    bounds: MagnitudeBounds,
}

impl OpenAiDecisionClient {
    /// Creates a decision client, reading `OPENAI_API_KEY` from the
    /// environment. The decision service is not optional; a missing key is
    /// a startup failure.
    ///
    /// # Errors
    ///
    /// Returns an error if `OPENAI_API_KEY` is not set.
    pub fn from_env(config: &DecisionConfig, engine: &EngineConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").context("Missing OPENAI_API_KEY env var")?;

        Ok(Self {
            http: Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .unwrap_or_default(),
            api_url: config.api_url.clone(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            bounds: MagnitudeBounds {
                mode: engine.magnitude_mode,
                absolute_cap: engine.absolute_magnitude_cap,
            },
        })
    }
}

#[async_trait]
impl DecisionService for OpenAiDecisionClient {
    async fn decide(&self, ctx: &DecisionContext) -> Result<Decision, ApiError> {
        let payload = serde_json::to_string(ctx)
            .map_err(|e| ApiError::InvalidResponse(format!("context serialization: {e}")))?;

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt(&ctx.snapshot.asset_id),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: payload,
                },
            ],
            temperature: 1.0,
            max_tokens: self.max_tokens,
            response_format: ResponseFormat {
                type_: "json_object".to_string(),
            },
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ApiError::Timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                } else {
                    ApiError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ApiError::RateLimited(format!("HTTP {status}")));
        }
        if status.is_server_error() {
            return Err(ApiError::Unavailable(format!("HTTP {status}")));
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ApiError::Auth(format!("HTTP {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::InvalidResponse(format!("HTTP {status}: {body}")));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        let content = chat
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| ApiError::InvalidResponse("no choices in response".to_string()))?;

        // From here on nothing is an error: unusable content becomes a HOLD
        // with an `invalid-response` rationale.
        Ok(parse_decision(
            content,
            &ctx.snapshot.asset_id,
            ctx.snapshot.timestamp,
            self.bounds,
        ))
    }
}
