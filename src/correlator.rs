// ABOUTME: Builds outbound chat client commands stamped with correlation ids
// ABOUTME: Ids are "bot-<epoch millis>-<counter>" and never repeat within a process

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};

/// Prefix of every correlation id issued by the relay
pub const CORRELATION_PREFIX: &str = "bot";

/// Wire name of the correlation id field
const CORR_ID_FIELD: &str = "corrId";

/// A command before it is stamped: the `cmd` string plus any extra top-level fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandPayload {
    pub cmd: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CommandPayload {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            extra: Map::new(),
        }
    }

    /// Attach an extra top-level field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// A stamped command, immutable once built
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundCommand {
    #[serde(rename = "corrId")]
    pub corr_id: String,
    #[serde(flatten)]
    pub payload: CommandPayload,
}

impl OutboundCommand {
    pub fn cmd(&self) -> &str {
        &self.payload.cmd
    }
}

/// Issues correlation ids from a process-wide monotonic counter
#[derive(Debug, Default)]
pub struct CommandCorrelator {
    counter: AtomicU64,
}

impl CommandCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate the next correlation id
    pub fn next_id(&self) -> String {
        let sequence = self.counter.fetch_add(1, Ordering::Relaxed);
        format!(
            "{}-{}-{}",
            CORRELATION_PREFIX,
            chrono::Utc::now().timestamp_millis(),
            sequence
        )
    }

    /// Merge a fresh correlation id into the payload.
    ///
    /// Extra fields named `corrId` or `cmd` are discarded so the stamped id and the
    /// command string cannot be shadowed on the wire.
    pub fn stamp(&self, mut payload: CommandPayload) -> OutboundCommand {
        payload.extra.remove(CORR_ID_FIELD);
        payload.extra.remove("cmd");
        OutboundCommand {
            corr_id: self.next_id(),
            payload,
        }
    }

    /// Number of ids issued so far
    pub fn issued(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}
