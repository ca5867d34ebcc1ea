// ABOUTME: Owns the WebSocket session to the chat client: connect, serve, reconnect after close
// ABOUTME: Other components only see the narrow CommandSink capability, never the socket

use futures_util::{SinkExt, StreamExt};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::{
    config::ChatConfig,
    correlator::{CommandCorrelator, CommandPayload},
    error::RelayError,
    event::ADDRESS_COMMAND,
    metrics,
    relay::Relay,
};

/// Lifecycle of the single chat client connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability to send a command to the chat client
pub trait CommandSink: Send + Sync {
    /// Stamp and transmit a command. Returns the correlation id, or `None` if the
    /// command was dropped.
    fn send_command(&self, payload: CommandPayload) -> Option<String>;
}

struct Shared {
    state: ConnectionState,
    outbound: Option<mpsc::UnboundedSender<Message>>,
}

/// Cloneable view of the connection: its state and a way to send commands
#[derive(Clone)]
pub struct ConnectionHandle {
    shared: Arc<Mutex<Shared>>,
    correlator: Arc<CommandCorrelator>,
}

impl Default for ConnectionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionHandle {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                state: ConnectionState::Disconnected,
                outbound: None,
            })),
            correlator: Arc::new(CommandCorrelator::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    pub fn correlator(&self) -> &CommandCorrelator {
        &self.correlator
    }

    fn set_state(&self, state: ConnectionState) {
        self.lock().state = state;
    }

    fn open(&self, outbound: mpsc::UnboundedSender<Message>) {
        let mut shared = self.lock();
        shared.state = ConnectionState::Open;
        shared.outbound = Some(outbound);
    }

    fn begin_close(&self) {
        let mut shared = self.lock();
        shared.state = ConnectionState::Closing;
        shared.outbound = None;
    }

    /// Stamp and queue a command for the open connection
    pub fn try_send(&self, payload: CommandPayload) -> Result<String, RelayError> {
        let shared = self.lock();
        if shared.state != ConnectionState::Open {
            return Err(RelayError::NotOpen);
        }
        let outbound = shared.outbound.as_ref().ok_or(RelayError::NotOpen)?;

        let command = self.correlator.stamp(payload);
        let json = serde_json::to_string(&command).map_err(RelayError::Encode)?;
        tracing::info!(corr_id = %command.corr_id, command = %json, "Sending to chat client");

        outbound
            .send(Message::Text(json.into()))
            .map_err(|_| RelayError::NotOpen)?;
        Ok(command.corr_id)
    }
}

impl CommandSink for ConnectionHandle {
    fn send_command(&self, payload: CommandPayload) -> Option<String> {
        match self.try_send(payload) {
            Ok(corr_id) => {
                metrics::record_command_sent();
                Some(corr_id)
            }
            Err(e) => {
                tracing::error!(error = %e, "Command dropped");
                metrics::record_command_dropped();
                None
            }
        }
    }
}

/// Connection manager for the chat client WebSocket
pub struct ChatConnection {
    config: ChatConfig,
    handle: ConnectionHandle,
}

impl ChatConnection {
    pub fn new(config: ChatConfig) -> Self {
        Self {
            config,
            handle: ConnectionHandle::new(),
        }
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    /// Serve the chat client forever. After every close the next attempt is
    /// scheduled `reconnect_delay` later, with no retry limit.
    pub async fn run(self, relay: Relay) {
        loop {
            if let Err(e) = self.run_session(&relay).await {
                tracing::error!(error = %e, "Chat client connection failed");
            }

            let delay = self.config.reconnect_delay();
            tracing::info!(
                delay_ms = delay.as_millis() as u64,
                "Disconnected from chat client, scheduling reconnect"
            );
            metrics::record_reconnect();
            let reconnect_at = tokio::time::Instant::now() + delay;
            tokio::time::sleep_until(reconnect_at).await;
        }
    }

    /// Connect once and process frames until the connection closes.
    ///
    /// Frames are handled one at a time in arrival order. Replies queued while
    /// handling a frame are written before the next frame is read.
    pub async fn run_session(&self, relay: &Relay) -> Result<(), RelayError> {
        self.handle.set_state(ConnectionState::Connecting);
        tracing::info!(url = %self.config.ws_url, "Attempting to connect to chat client");

        let ws_stream = match connect_async(self.config.ws_url.as_str()).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                self.handle.set_state(ConnectionState::Disconnected);
                return Err(e.into());
            }
        };

        let (mut write, mut read) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        self.handle.open(tx);
        metrics::set_connection_open(true);
        tracing::info!("Connected to chat client");

        self.handle.send_command(CommandPayload::new(ADDRESS_COMMAND));

        let outcome = loop {
            tokio::select! {
                biased;

                Some(message) = rx.recv() => {
                    if let Err(e) = write.send(message).await {
                        break Err(RelayError::Transport(e));
                    }
                }
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        relay.handle_frame(text.as_str(), &self.handle);
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        relay.handle_frame(&String::from_utf8_lossy(&bytes), &self.handle);
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "Chat client closed the connection");
                        break Ok(());
                    }
                    Some(Ok(_)) => {} // pings and pongs are answered by tungstenite
                    Some(Err(e)) => break Err(RelayError::Transport(e)),
                    None => break Ok(()),
                },
            }
        };

        self.handle.begin_close();
        if let Err(e) = write.close().await {
            tracing::debug!(error = %e, "Close handshake did not complete");
        }
        self.handle.set_state(ConnectionState::Disconnected);
        metrics::set_connection_open(false);

        outcome
    }
}
