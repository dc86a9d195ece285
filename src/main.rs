use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};

use mailhook::config::RelayConfig;
use mailhook::dispatch::{Dispatcher, ReqwestTransport};
use mailhook::relay::Relay;
use mailhook::routing::FileRouteRepository;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(message_path), Some(recipient)) = (args.next(), args.next()) else {
        eprintln!("Usage: mailhook <message.eml> <recipient>");
        return Ok(ExitCode::from(2));
    };

    let config = RelayConfig::from_env();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        routes = %config.routes_path.display(),
        "Starting mailhook"
    );

    let raw = tokio::fs::read(&message_path)
        .await
        .with_context(|| format!("Failed to read message from {message_path}"))?;

    let repository = Arc::new(FileRouteRepository::new(
        config.routes_path.clone(),
        config.routes_ttl,
    ));
    let transport = Arc::new(ReqwestTransport::new(&config).context("Failed to build HTTP client")?);
    let relay = Relay::new(repository, Dispatcher::new(transport), &config);

    match relay.process(&raw, &recipient).await {
        Ok(outcome) => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(if outcome.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Err(e) => {
            error!(error = %e, recipient = %recipient, "Message not relayed");
            Ok(ExitCode::FAILURE)
        }
    }
}
