// ABOUTME: Bot-local slash commands answered directly in chat
// ABOUTME: /help and /ping reply to the sender and are never forwarded to the webhook

use crate::correlator::CommandPayload;

/// Reply to `/ping`
pub const PONG_TEXT: &str = "Pong!";

/// Reply to `/help`
pub const HELP_TEXT: &str =
    "Send any message and it will be forwarded to the automation webhook. Commands: /help, /ping.";

/// A command handled by the relay itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalCommand {
    Help,
    Ping,
}

impl LocalCommand {
    /// Recognize a local command. Matching ignores surrounding whitespace and case.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "/help" => Some(LocalCommand::Help),
            "/ping" => Some(LocalCommand::Ping),
            _ => None,
        }
    }

    pub fn token(&self) -> &'static str {
        match self {
            LocalCommand::Help => "/help",
            LocalCommand::Ping => "/ping",
        }
    }

    pub fn reply_text(&self) -> &'static str {
        match self {
            LocalCommand::Help => HELP_TEXT,
            LocalCommand::Ping => PONG_TEXT,
        }
    }
}

/// Build the chat command that sends `text` to `contact`
pub fn reply_command(contact: &str, text: &str) -> CommandPayload {
    CommandPayload::new(format!("@{} {}", contact, text))
}
