// ABOUTME: Decodes inbound chat client frames and classifies them into known shapes
// ABOUTME: Resolves the sender of new text messages through an ordered list of sender fields

use serde_json::Value;

use crate::error::RelayError;

/// Command that asks the chat client for the bot's own address
pub const ADDRESS_COMMAND: &str = "/address";

/// Event name of an incoming chat message
pub const NEW_MESSAGE_EVENT: &str = "x.msg.new";

/// Content type of plain text messages
pub const TEXT_CONTENT_TYPE: &str = "text";

/// Marker of the chat network's address scheme
pub const ADDRESS_SCHEME_MARKER: &str = "smp://";

/// Inbound frame after classification
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Result of the address-discovery command
    AddressResponse { result: Value },
    /// A new text message from a chat user
    NewTextMessage(TextMessage),
    /// Result of any other command, matched by correlation id
    CommandResult {
        corr_id: Option<String>,
        result: Value,
    },
    /// Nothing the relay knows how to handle
    Unrecognized,
}

/// A new text message whose sender and text may or may not be resolvable
#[derive(Debug, Clone, PartialEq)]
pub struct TextMessage {
    pub sender: Option<String>,
    pub text: Option<String>,
}

/// A new text message with both sender and text present
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMessage {
    pub sender: String,
    pub text: String,
}

impl TextMessage {
    pub fn resolve(self) -> Result<ResolvedMessage, RelayError> {
        let sender = self.sender.ok_or(RelayError::UnresolvedSender)?;
        let text = self.text.ok_or(RelayError::MissingText)?;
        Ok(ResolvedMessage { sender, text })
    }
}

/// Decode a raw frame into JSON
pub fn decode(raw: &str) -> Result<Value, RelayError> {
    serde_json::from_str(raw).map_err(RelayError::Decode)
}

impl InboundEvent {
    /// Classify a decoded payload.
    ///
    /// Address responses are a subset of generic command results, so they are
    /// checked first.
    pub fn classify(payload: &Value) -> Self {
        let cmd = payload.get("cmd").filter(|c| is_truthy(c));

        if let Some(result) = payload.get("result") {
            if cmd.and_then(Value::as_str) == Some(ADDRESS_COMMAND) && is_truthy(result) {
                return InboundEvent::AddressResponse {
                    result: result.clone(),
                };
            }
        }

        if is_text_message(payload) {
            return InboundEvent::NewTextMessage(TextMessage {
                sender: resolve_sender(payload),
                text: message_text(payload),
            });
        }

        if let (Some(_), Some(result)) = (cmd, payload.get("result")) {
            return InboundEvent::CommandResult {
                corr_id: payload
                    .get("corrId")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                result: result.clone(),
            };
        }

        InboundEvent::Unrecognized
    }

    /// Short label used for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::AddressResponse { .. } => "address_response",
            InboundEvent::NewTextMessage(_) => "new_text_message",
            InboundEvent::CommandResult { .. } => "command_result",
            InboundEvent::Unrecognized => "unrecognized",
        }
    }
}

/// True when an address result looks like a real network address
pub fn is_likely_address(result: &Value) -> bool {
    result
        .as_str()
        .is_some_and(|s| s.contains(ADDRESS_SCHEME_MARKER))
}

fn is_text_message(payload: &Value) -> bool {
    payload.get("event").and_then(Value::as_str) == Some(NEW_MESSAGE_EVENT)
        && payload
            .pointer("/params/content/type")
            .and_then(Value::as_str)
            == Some(TEXT_CONTENT_TYPE)
}

fn message_text(payload: &Value) -> Option<String> {
    payload
        .pointer("/params/content/text")
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

// =============================================================================
// Sender resolution
// =============================================================================

type SenderLookup = fn(&Value) -> Option<&Value>;

fn top_level_sender(payload: &Value) -> Option<&Value> {
    payload.get("sender")
}

fn contact_id(payload: &Value) -> Option<&Value> {
    payload.get("contactId")
}

fn params_sender(payload: &Value) -> Option<&Value> {
    payload.get("params").and_then(|p| p.get("sender"))
}

fn peer_id(payload: &Value) -> Option<&Value> {
    payload.get("peerId")
}

/// Lookup order matters: the first field that yields an identity wins
const SENDER_LOOKUPS: [(&str, SenderLookup); 4] = [
    ("sender", top_level_sender),
    ("contactId", contact_id),
    ("params.sender", params_sender),
    ("peerId", peer_id),
];

/// Resolve the sender identity of a new message payload
pub fn resolve_sender(payload: &Value) -> Option<String> {
    SENDER_LOOKUPS.iter().find_map(|(field, lookup)| {
        let identity = lookup(payload).and_then(sender_identity)?;
        tracing::trace!(field, %identity, "Resolved sender");
        Some(identity)
    })
}

/// Any truthy value names the sender. Strings are used as-is, everything else as compact JSON.
fn sender_identity(value: &Value) -> Option<String> {
    if !is_truthy(value) {
        return None;
    }
    match value {
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
