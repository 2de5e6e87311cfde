//! Slack delivery for the engine's best-effort notifications.
//!
//! Uses `chat.postMessage` with a bot token. Missing credentials disable
//! delivery rather than failing the engine; a notification is never worth
//! more than a trade.

use async_trait::async_trait;
use auto_trade_core::config::SlackConfig;
use auto_trade_core::error::ApiError;
use auto_trade_core::traits::{Notification, NotificationChannel};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const SLACK_API_URL: &str = "https://slack.com/api/chat.postMessage";
const REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    error: Option<String>,
}

pub struct SlackNotifier {
    http: Client,
    token: String,
    channel_id: String,
}

impl SlackNotifier {
    /// Creates a notifier from config, reading `SLACK_BOT_TOKEN` and
    /// `SLACK_CHANNEL_ID` from the environment. Returns `None` when Slack
    /// is disabled or credentials are absent.
    #[must_use]
    pub fn from_env(config: &SlackConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let (Ok(token), Ok(channel_id)) = (
            std::env::var("SLACK_BOT_TOKEN"),
            std::env::var("SLACK_CHANNEL_ID"),
        ) else {
            tracing::warn!("slack enabled but credentials not set, notifications disabled");
            return None;
        };

        Some(Self {
            http: Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .unwrap_or_default(),
            token,
            channel_id,
        })
    }
}

#[async_trait]
impl NotificationChannel for SlackNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), ApiError> {
        let payload = json!({
            "channel": self.channel_id,
            "text": notification.title,
            "blocks": [
                {
                    "type": "section",
                    "text": {
                        "type": "mrkdwn",
                        "text": format!("*{}*\n{}", notification.title, notification.body),
                    }
                }
            ],
        });

        let response = self
            .http
            .post(SLACK_API_URL)
            .bearer_auth(&self.token)
            .json(&payload)
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
        if !status.is_success() {
            return Err(ApiError::Unavailable(format!("HTTP {status}")));
        }

        // Slack reports API-level failures inside a 200 body.
        let body: PostMessageResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        if !body.ok {
            return Err(ApiError::Rejected(
                body.error.unwrap_or_else(|| "unknown slack error".to_string()),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_config_yields_no_notifier() {
        let config = SlackConfig { enabled: false };
        assert!(SlackNotifier::from_env(&config).is_none());
    }

    #[test]
    fn api_level_failure_parses() {
        let body: PostMessageResponse =
            serde_json::from_str(r#"{"ok": false, "error": "channel_not_found"}"#).unwrap();
        assert!(!body.ok);
        assert_eq!(body.error.as_deref(), Some("channel_not_found"));
    }
}
