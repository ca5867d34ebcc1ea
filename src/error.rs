// ABOUTME: Error taxonomy for the relay's runtime failure paths
// ABOUTME: Every variant is logged and survived; none of them stops the process

use thiserror::Error;

/// Runtime failures seen while relaying between the chat client and the webhook
#[derive(Debug, Error)]
pub enum RelayError {
    /// Inbound frame was not valid JSON
    #[error("Failed to decode frame from chat client: {0}")]
    Decode(#[source] serde_json::Error),

    /// Connection-level WebSocket failure
    #[error("Chat client WebSocket error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// A command was issued while no connection was open
    #[error("Cannot send command: WebSocket is not open")]
    NotOpen,

    /// Outbound command could not be serialized
    #[error("Failed to encode outbound command: {0}")]
    Encode(#[source] serde_json::Error),

    /// Webhook answered with a non-2xx status
    #[error("Webhook responded with {status}: {body}")]
    WebhookStatus {
        status: reqwest::StatusCode,
        body: String,
    },

    /// Webhook could not be reached at all
    #[error("Webhook request failed: {0}")]
    WebhookRequest(#[from] reqwest::Error),

    /// Webhook URL or token missing at startup
    #[error("Webhook URL or token is not configured")]
    WebhookDisabled,

    /// None of the sender fields held an identity
    #[error("Could not identify sender of new message")]
    UnresolvedSender,

    /// New message event had no usable text
    #[error("New message event carries no text")]
    MissingText,
}
