mod bootstrap;
mod health;

use anyhow::Result;
use kujo_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use kujo_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config)?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.gateway.status(),
    )
    .await?;

    // An exhausted gateway leaves the health endpoint up; only a signal stops the process.
    let gateway = app.gateway;
    let gateway_task = tokio::spawn(async move { gateway.start().await });

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        admin_role = %app.controller.settings().admin_role_name,
        "kujo-server started"
    );
    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "kujo-server stopping"
    );
    gateway_task.abort();

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
