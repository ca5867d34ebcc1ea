// ABOUTME: Forwards chat messages to the external automation webhook
// ABOUTME: One POST per message with a shared-secret header; failures are logged and dropped

use anyhow::{Context, Result};
use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::{config::WebhookConfig, error::RelayError, metrics};

/// Body posted to the webhook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardPayload {
    pub sender: String,
    pub message: String,
}

/// Capability to hand a (sender, message) pair to the automation side
pub trait Forward: Send + Sync {
    fn forward(&self, sender: String, message: String);
}

struct WebhookTarget {
    url: String,
    token_header: HeaderName,
    token: HeaderValue,
}

/// Posts messages to the webhook, or does nothing when the webhook is unconfigured
#[derive(Clone)]
pub struct WebhookForwarder {
    client: reqwest::Client,
    target: Option<Arc<WebhookTarget>>,
}

impl WebhookForwarder {
    /// Build a forwarder from config. A missing URL or token, or a header that cannot be
    /// sent, disables forwarding for good.
    pub fn new(config: &WebhookConfig) -> Self {
        let target = match (&config.url, &config.token) {
            (Some(url), Some(token)) => match Self::target(url, &config.token_header, token) {
                Ok(target) => Some(Arc::new(target)),
                Err(e) => {
                    tracing::error!(error = %e, "Webhook misconfigured, forwarding disabled");
                    None
                }
            },
            _ => None,
        };

        Self {
            client: reqwest::Client::new(),
            target,
        }
    }

    fn target(url: &str, token_header: &str, token: &str) -> Result<WebhookTarget> {
        let token_header = HeaderName::from_bytes(token_header.as_bytes())
            .with_context(|| format!("Invalid webhook token header: {}", token_header))?;
        let mut token = HeaderValue::from_str(token)
            .context("Webhook token is not a valid HTTP header value")?;
        token.set_sensitive(true);
        Ok(WebhookTarget {
            url: url.to_string(),
            token_header,
            token,
        })
    }

    /// A forwarder that never makes network calls
    pub fn disabled() -> Self {
        Self {
            client: reqwest::Client::new(),
            target: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    /// Make a single delivery attempt
    pub async fn deliver(&self, sender: &str, message: &str) -> Result<(), RelayError> {
        let target = self.target.as_ref().ok_or(RelayError::WebhookDisabled)?;

        let payload = ForwardPayload {
            sender: sender.to_string(),
            message: message.to_string(),
        };

        tracing::info!(%sender, %message, "Forwarding message to webhook");

        let response = self
            .client
            .post(&target.url)
            .header(target.token_header.clone(), target.token.clone())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::WebhookStatus { status, body });
        }

        tracing::info!(%status, "Message successfully forwarded to webhook");
        Ok(())
    }

    /// Deliver in the background. Returns `None` when forwarding is disabled.
    pub fn spawn_forward(&self, sender: String, message: String) -> Option<JoinHandle<()>> {
        if !self.is_enabled() {
            tracing::warn!(
                %sender,
                "Webhook URL or token is not configured, cannot forward message"
            );
            metrics::record_webhook_forward("disabled");
            return None;
        }

        let forwarder = self.clone();
        Some(tokio::spawn(async move {
            match forwarder.deliver(&sender, &message).await {
                Ok(()) => metrics::record_webhook_forward("delivered"),
                Err(e) => {
                    tracing::error!(%sender, error = %e, "Error forwarding message to webhook");
                    metrics::record_webhook_forward("failed");
                }
            }
        }))
    }
}

impl Forward for WebhookForwarder {
    fn forward(&self, sender: String, message: String) {
        let _ = self.spawn_forward(sender, message);
    }
}
