use anyhow::Context;
use clap::Parser;
use commands::Command;
use server::client::RelayClient;
use server::processor::RequestProcessor;
use tokio_util::sync::CancellationToken;

mod commands;
mod config;
mod logger;

/// Sends MDM API requests over Azure Service Bus and correlates their replies.
#[derive(Debug, Parser)]
#[command(name = "mdm-relay", version, about)]
struct Cli {
    /// Config file (defaults to ./config.toml when present)
    #[arg(long, global = true)]
    config: Option<String>,
    /// Session to use instead of the configured or a generated one
    #[arg(long, global = true)]
    session: Option<String>,
    /// Log level override (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let app_config = config::load_config(cli.config.as_deref())?;
    logger::setup_logger(app_config.logging(), cli.log_level.as_deref())
        .context("Failed to initialize logger")?;

    let mut connection_config = app_config.servicebus().clone();
    if let Some(session) = cli.session {
        connection_config.session_id = Some(session);
    }

    let client = RelayClient::with_policy(app_config.processor().wait_policy());
    let connection = client
        .connect_service_bus(&connection_config)
        .await
        .context("Failed to connect to Service Bus")?;
    log::info!("Using session {}", connection.session_id());

    let processor = RequestProcessor::from_config(connection, app_config.processor());

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let result = commands::run(cli.command, &processor, cancel).await;

    let leftovers = processor.drain_buffered();
    if !leftovers.is_empty() {
        log::warn!(
            "{} replies for other requests were received and not claimed",
            leftovers.len()
        );
    }
    if let Err(e) = client.disconnect().await {
        log::warn!("Failed to disconnect cleanly: {e}");
    }

    result
}
