// ABOUTME: Main entry point for the SimpleX chat client to webhook relay
// ABOUTME: Initializes logging, config, optional metrics server, and the reconnecting connection loop

use anyhow::Result;
use clap::Parser;
use simplex_relay::{config::Config, metrics, ChatConnection, Relay, WebhookForwarder};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "simplex-relay", version, about = "Relay SimpleX chat messages to an automation webhook")]
struct Cli {
    /// Path to a config.toml (overrides the default search locations)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines (also enabled by LOG_FORMAT=json)
    #[arg(long)]
    json_logs: bool,
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Set up panic hook to log panics before they crash the process
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("\nPANIC! Relay crashed with the following error:\n");
        eprintln!("{}", panic_info);
        eprintln!("\nBacktrace:");
        eprintln!("{:?}", std::backtrace::Backtrace::force_capture());
    }));

    let cli = Cli::parse();

    dotenvy::dotenv().ok();

    let json_logs = cli.json_logs
        || std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    init_logging(json_logs);

    tracing::info!("Starting SimpleX relay");

    let config = match &cli.config {
        Some(path) => Config::load_from(Some(path.as_path()))?,
        None => Config::load()?,
    };

    tracing::info!(
        chat_url = %config.chat.ws_url,
        reconnect_delay_ms = config.chat.reconnect_delay_ms,
        webhook_enabled = config.webhook.is_configured(),
        metrics_port = ?config.metrics.port,
        "Configuration loaded"
    );

    let forwarder = WebhookForwarder::new(&config.webhook);
    if !forwarder.is_enabled() {
        tracing::warn!(
            "N8N_WEBHOOK_URL and/or N8N_WEBHOOK_TOKEN are missing or unusable, webhook forwarding is disabled"
        );
    }

    let connection = ChatConnection::new(config.chat.clone());

    if let Some(port) = config.metrics.port {
        match metrics::init_metrics() {
            Ok(handle) => {
                let metrics_config = config.metrics.clone();
                let connection_handle = connection.handle();
                tokio::spawn(async move {
                    if let Err(e) = metrics::start_metrics_server(
                        &metrics_config,
                        port,
                        handle,
                        connection_handle,
                    )
                    .await
                    {
                        tracing::error!(error = %e, "Metrics server failed");
                    }
                });
            }
            Err(e) => tracing::error!(error = %e, "Metrics disabled"),
        }
    }

    let relay = Relay::new(Arc::new(forwarder));
    connection.run(relay).await;

    Ok(())
}
