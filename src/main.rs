use std::sync::Arc;

use anyhow::Context;
use secrecy::ExposeSecret;

use automudae::agent::Session;
use automudae::channels::{ConsoleChannel, Identity};
use automudae::config::AppConfig;
use automudae::error::ConfigError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing; stdout carries console actions
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let me = self_identity().context("Failed to resolve the automated user")?;

    eprintln!("AutoMudae v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   User: {} ({})", me, me.id);
    eprintln!("   Channel: {}", config.chat.channel_id);
    eprintln!("   Roll command: {}", config.roll.command);
    eprintln!("   Paste one JSON chat message per line.\n");

    if config.chat.token.expose_secret().is_empty() {
        tracing::debug!("AUTOMUDAE_TOKEN not set; the console transport does not need it");
    }

    let console = Arc::new(ConsoleChannel::new(me, config.chat.channel_id));
    let session = Session::from_config(config, console.clone(), console);

    session.run().await.context("Session failed")?;
    Ok(())
}

/// The user the console transport acts as.
fn self_identity() -> Result<Identity, ConfigError> {
    let raw = std::env::var("AUTOMUDAE_SELF_ID")
        .map_err(|_| ConfigError::MissingEnvVar("AUTOMUDAE_SELF_ID".to_string()))?;
    let id = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: "AUTOMUDAE_SELF_ID".to_string(),
        message: format!("not an id: '{raw}'"),
    })?;
    // Status reports are addressed by display name.
    let name = std::env::var("AUTOMUDAE_SELF_NAME")
        .map_err(|_| ConfigError::MissingEnvVar("AUTOMUDAE_SELF_NAME".to_string()))?;
    Ok(Identity::new(id, name))
}
