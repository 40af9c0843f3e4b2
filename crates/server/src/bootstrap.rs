use std::sync::Arc;

use kujo_core::config::{AppConfig, ConfigError};
use kujo_core::directory::GuildDirectory;
use kujo_core::tickets::TicketLifecycleController;
use kujo_discord::events::ticket_dispatcher;
use kujo_discord::gateway::{GatewayRunner, GatewayStatus, GatewayTransport, ReconnectPolicy};
use kujo_discord::serenity_client::{SerenityDirectory, SerenityTransport};
use secrecy::ExposeSecret;
use serenity::all::Http;
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub controller: Arc<TicketLifecycleController>,
    pub gateway: GatewayRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Wires the live Discord directory and gateway. No network I/O happens here;
/// the gateway connects when the runner starts.
pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    config.validate()?;

    let http = Arc::new(Http::new(config.discord.token.expose_secret()));
    let directory = Arc::new(SerenityDirectory::new(Arc::clone(&http)));
    let transport = Arc::new(SerenityTransport::new(config.discord.token.clone(), http));
    Ok(assemble(config, directory, transport))
}

pub fn assemble(
    config: AppConfig,
    directory: Arc<dyn GuildDirectory>,
    transport: Arc<dyn GatewayTransport>,
) -> Application {
    let controller =
        Arc::new(TicketLifecycleController::new(directory, config.tickets.clone()));
    let gateway = GatewayRunner::new(
        transport,
        ticket_dispatcher(Arc::clone(&controller)),
        ReconnectPolicy::from(&config.gateway),
        GatewayStatus::default(),
    );

    info!(
        event_name = "system.bootstrap.wired",
        correlation_id = "bootstrap",
        admin_role = %config.tickets.admin_role_name,
        channel_prefix = %config.tickets.channel_prefix,
        close_delay_secs = config.tickets.close_delay_secs,
        "ticket controller and gateway runner wired"
    );

    Application { config, controller, gateway }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kujo_core::config::{AppConfig, TicketConfig};
    use kujo_core::directory::{GuildDirectory, InMemoryGuildDirectory};
    use kujo_core::domain::ids::UserId;
    use kujo_discord::gateway::GatewayTransport;
    use kujo_discord::serenity_client::SerenityTransport;
    use serenity::all::Http;

    use crate::bootstrap::{assemble, bootstrap_with_config};

    #[tokio::test]
    async fn bootstrap_fails_fast_without_discord_token() {
        let result = bootstrap_with_config(AppConfig::default());

        let message = result.err().expect("error").to_string();
        assert!(message.contains("discord.token"));
    }

    #[tokio::test]
    async fn bootstrap_applies_ticket_settings_to_the_controller() {
        let mut config = AppConfig::default();
        config.discord.token = "test-token".to_string().into();
        config.tickets = TicketConfig {
            admin_role_name: "Support".to_string(),
            close_delay_secs: 2,
            ..TicketConfig::default()
        };

        let app = bootstrap_with_config(config).expect("bootstrap should succeed with a token");

        assert_eq!(app.controller.settings().admin_role_name, "Support");
        assert_eq!(app.controller.settings().close_delay_secs, 2);
        assert!(!app.gateway.status().is_connected());
    }

    #[tokio::test]
    async fn assemble_accepts_any_directory() {
        let directory: Arc<dyn GuildDirectory> = Arc::new(InMemoryGuildDirectory::new(UserId(1)));
        let transport: Arc<dyn GatewayTransport> = Arc::new(SerenityTransport::new(
            "test-token".to_string().into(),
            Arc::new(Http::new("test-token")),
        ));

        let app = assemble(AppConfig::default(), directory, transport);

        assert_eq!(app.controller.settings(), &TicketConfig::default());
    }
}
