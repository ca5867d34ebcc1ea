// ABOUTME: Root library module exposing all public modules
// ABOUTME: Chat client connection, event classification, local commands, and webhook forwarding

pub mod commands;
pub mod config;
pub mod connection;
pub mod correlator;
pub mod error;
pub mod event;
pub mod metrics;
pub mod paths;
pub mod relay;
pub mod webhook;

pub use connection::{ChatConnection, CommandSink, ConnectionHandle, ConnectionState};
pub use error::RelayError;
pub use relay::Relay;
pub use webhook::{Forward, WebhookForwarder};
