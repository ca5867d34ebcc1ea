// ABOUTME: Dispatches decoded chat client frames to the right handler
// ABOUTME: Local commands reply through the CommandSink; other user text goes to the forwarder

use std::sync::Arc;

use serde_json::Value;

use crate::{
    commands::{reply_command, LocalCommand},
    connection::CommandSink,
    event::{self, InboundEvent, ResolvedMessage, TextMessage},
    metrics,
    webhook::Forward,
};

/// Routes inbound frames. Holds no connection state of its own.
#[derive(Clone)]
pub struct Relay {
    forwarder: Arc<dyn Forward>,
}

impl Relay {
    pub fn new(forwarder: Arc<dyn Forward>) -> Self {
        Self { forwarder }
    }

    /// Handle one raw frame from the chat client. Never fails; every problem is logged.
    pub fn handle_frame(&self, raw: &str, sink: &dyn CommandSink) {
        metrics::record_frame_received();

        let payload = match event::decode(raw) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, raw = %raw, "Failed to parse message from chat client");
                metrics::record_decode_error();
                return;
            }
        };
        tracing::debug!(%payload, "Received from chat client");

        let inbound = InboundEvent::classify(&payload);
        metrics::record_event(inbound.kind());

        match inbound {
            InboundEvent::AddressResponse { result } => log_address_response(&result),
            InboundEvent::NewTextMessage(message) => {
                self.handle_text_message(message, &payload, sink)
            }
            InboundEvent::CommandResult { corr_id, result } => {
                tracing::info!(
                    corr_id = corr_id.as_deref().unwrap_or("-"),
                    %result,
                    "Result for other command"
                );
            }
            InboundEvent::Unrecognized => {
                tracing::trace!(%payload, "Ignoring unrecognized frame");
            }
        }
    }

    fn handle_text_message(&self, message: TextMessage, payload: &Value, sink: &dyn CommandSink) {
        let ResolvedMessage { sender, text } = match message.resolve() {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    %payload,
                    "Could not identify sender or message text from new message event"
                );
                return;
            }
        };

        tracing::info!(%sender, %text, "Message from chat user");

        match LocalCommand::parse(&text) {
            Some(command) => {
                metrics::record_local_command(command.token());
                sink.send_command(reply_command(&sender, command.reply_text()));
            }
            None => self.forwarder.forward(sender, text),
        }
    }
}

fn log_address_response(result: &Value) {
    for line in address_report(result) {
        tracing::info!("{}", line);
    }
}

/// Log lines for an address response: the address block, plus the "likely found"
/// block when the result looks like an SMP address.
fn address_report(result: &Value) -> Vec<String> {
    let address = result
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| result.to_string());

    let mut lines = vec![
        "===== BOT ADDRESS RESPONSE =====".to_string(),
        format!("Bot address: {}", address),
    ];
    if event::is_likely_address(result) {
        lines.push("!!!!!!!!!! BOT ADDRESS LIKELY FOUND !!!!!!!!!".to_string());
        lines.push(format!("Likely bot address: {}", address));
        lines.push("!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!".to_string());
    }
    lines.push("==============================".to_string());
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_smp_address_emits_both_blocks() {
        let lines = address_report(&json!("smp://abc@relay.example"));
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "===== BOT ADDRESS RESPONSE =====");
        assert_eq!(lines[1], "Bot address: smp://abc@relay.example");
        assert_eq!(lines[2], "!!!!!!!!!! BOT ADDRESS LIKELY FOUND !!!!!!!!!");
        assert_eq!(lines[3], "Likely bot address: smp://abc@relay.example");
        assert_eq!(lines[5], "==============================");
    }

    #[test]
    fn test_other_address_emits_only_the_address_block() {
        let lines = address_report(&json!({ "link": "smp://abc" }));
        assert_eq!(
            lines,
            vec![
                "===== BOT ADDRESS RESPONSE =====".to_string(),
                r#"Bot address: {"link":"smp://abc"}"#.to_string(),
                "==============================".to_string(),
            ]
        );
    }
}
