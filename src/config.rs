// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Validates the chat endpoint and webhook settings and supplies defaults
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default = "default_token_header")]
    pub token_header: String,
}

// Custom Debug impl to redact token
impl std::fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("token_header", &self.token_header)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default = "default_metrics_bind_address")]
    pub bind_address: String,
}

fn default_ws_url() -> String {
    "ws://localhost:5225".to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

fn default_token_header() -> String {
    "X-Simplex-Bot-Token".to_string()
}

fn default_metrics_bind_address() -> String {
    "127.0.0.1".to_string()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            token_header: default_token_header(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: None,
            bind_address: default_metrics_bind_address(),
        }
    }
}

impl ChatConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl WebhookConfig {
    /// Forwarding needs both the endpoint and the shared secret
    pub fn is_configured(&self) -> bool {
        self.url.is_some() && self.token.is_some()
    }
}

impl Config {
    /// Find the config file, checking multiple locations in order:
    /// 1. SIMPLEX_RELAY_CONFIG_PATH env var (if set)
    /// 2. ./config.toml (current directory - for development)
    /// 3. ~/.config/simplex-relay/config.toml (XDG config dir)
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var("SIMPLEX_RELAY_CONFIG_PATH") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
        }

        let local_config = PathBuf::from("config.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        let xdg_config = paths::config_file();
        if xdg_config.exists() {
            return Some(xdg_config);
        }

        None
    }

    /// Load configuration from the first config file found, with environment overrides
    pub fn load() -> Result<Self> {
        Self::load_from(Self::find_config_file().as_deref())
    }

    /// Load configuration from an explicit file (or defaults when `None`), with environment overrides
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(config_path) => {
                tracing::info!(
                    path = %config_path.display(),
                    "Loading configuration from file"
                );
                let content = std::fs::read_to_string(config_path)
                    .with_context(|| format!("Failed to read {}", config_path.display()))?;
                toml::from_str::<Config>(&content)
                    .with_context(|| format!("Failed to parse {}", config_path.display()))?
            }
            None => {
                tracing::info!("No config file found, using environment variables and defaults");
                Config::default()
            }
        };

        config.apply_env_overrides()?;
        config.normalize();
        config.validate()?;

        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("SIMPLEX_CLI_WS_URL") {
            self.chat.ws_url = val;
        }
        if let Ok(val) = std::env::var("RELAY_RECONNECT_DELAY_MS") {
            self.chat.reconnect_delay_ms = val.parse().with_context(|| {
                format!(
                    "RELAY_RECONNECT_DELAY_MS must be a number of milliseconds, got: {}",
                    val
                )
            })?;
        }
        if let Ok(val) = std::env::var("N8N_WEBHOOK_URL") {
            self.webhook.url = Some(val);
        }
        if let Ok(val) = std::env::var("N8N_WEBHOOK_TOKEN") {
            self.webhook.token = Some(val);
        }
        if let Ok(val) = std::env::var("WEBHOOK_TOKEN_HEADER") {
            self.webhook.token_header = val;
        }
        if let Ok(val) = std::env::var("METRICS_PORT") {
            self.metrics.port = Some(val.parse().with_context(|| {
                format!("METRICS_PORT must be a valid port number, got: {}", val)
            })?);
        }
        if let Ok(val) = std::env::var("METRICS_BIND_ADDRESS") {
            self.metrics.bind_address = val;
        }
        Ok(())
    }

    /// Blank values count as unset. A blank chat URL falls back to the default endpoint;
    /// a webhook URL that is not http(s) disables forwarding instead of stopping startup.
    fn normalize(&mut self) {
        self.chat.ws_url = self.chat.ws_url.trim().to_string();
        if self.chat.ws_url.is_empty() {
            self.chat.ws_url = default_ws_url();
        }
        self.webhook.url = self
            .webhook
            .url
            .take()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .and_then(usable_webhook_url);
        self.webhook.token = self.webhook.token.take().filter(|t| !t.is_empty());
    }

    pub fn validate(&self) -> Result<()> {
        let ws_url = url::Url::parse(&self.chat.ws_url)
            .with_context(|| format!("chat.ws_url is not a valid URL: {}", self.chat.ws_url))?;
        if !matches!(ws_url.scheme(), "ws" | "wss") {
            anyhow::bail!(
                "chat.ws_url must use ws:// or wss:// (set in config.toml or SIMPLEX_CLI_WS_URL env var), got: {}",
                self.chat.ws_url
            );
        }

        if self.chat.reconnect_delay_ms == 0 {
            anyhow::bail!("chat.reconnect_delay_ms must be greater than zero");
        }

        Ok(())
    }
}

fn usable_webhook_url(webhook_url: String) -> Option<String> {
    match url::Url::parse(&webhook_url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Some(webhook_url),
        Ok(parsed) => {
            tracing::error!(
                url = %webhook_url,
                scheme = parsed.scheme(),
                "Webhook URL must use http:// or https://, forwarding disabled"
            );
            None
        }
        Err(e) => {
            tracing::error!(
                url = %webhook_url,
                error = %e,
                "Webhook URL is not a valid URL, forwarding disabled"
            );
            None
        }
    }
}
