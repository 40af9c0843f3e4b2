use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tickets::naming::sanitize_name;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub discord: DiscordConfig,
    pub tickets: TicketConfig,
    pub gateway: GatewayConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DiscordConfig {
    pub token: SecretString,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TicketConfig {
    pub open_emoji: String,
    pub close_emoji: String,
    pub admin_role_name: String,
    pub channel_prefix: String,
    pub close_delay_secs: u64,
    pub notice_ttl_secs: u64,
}

impl TicketConfig {
    pub fn close_delay(&self) -> Duration {
        Duration::from_secs(self.close_delay_secs)
    }

    pub fn notice_ttl(&self) -> Duration {
        Duration::from_secs(self.notice_ttl_secs)
    }

    /// Reactions arrive as bare emoji, so configured ones are stored trimmed.
    pub fn normalize(&mut self) {
        for emoji in [&mut self.open_emoji, &mut self.close_emoji] {
            *emoji = emoji.trim().to_owned();
        }
    }
}

impl Default for TicketConfig {
    fn default() -> Self {
        Self {
            open_emoji: "🎫".to_string(),
            close_emoji: "🔒".to_string(),
            admin_role_name: "Admin".to_string(),
            channel_prefix: "kujo-ticket".to_string(),
            close_delay_secs: 5,
            notice_ttl_secs: 10,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub discord_token: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub health_check_port: Option<u16>,
    pub admin_role_name: Option<String>,
    pub channel_prefix: Option<String>,
    pub close_delay_secs: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            discord: DiscordConfig { token: String::new().into() },
            tickets: TicketConfig::default(),
            gateway: GatewayConfig { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 },
            server: ServerConfig { bind_address: "0.0.0.0".to_string(), health_check_port: 8080 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("kujo.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.tickets.normalize();
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(discord) = patch.discord {
            if let Some(discord_token_value) = discord.token {
                self.discord.token = secret_value(discord_token_value);
            }
        }

        if let Some(tickets) = patch.tickets {
            if let Some(open_emoji) = tickets.open_emoji {
                self.tickets.open_emoji = open_emoji;
            }
            if let Some(close_emoji) = tickets.close_emoji {
                self.tickets.close_emoji = close_emoji;
            }
            if let Some(admin_role_name) = tickets.admin_role_name {
                self.tickets.admin_role_name = admin_role_name;
            }
            if let Some(channel_prefix) = tickets.channel_prefix {
                self.tickets.channel_prefix = channel_prefix;
            }
            if let Some(close_delay_secs) = tickets.close_delay_secs {
                self.tickets.close_delay_secs = close_delay_secs;
            }
            if let Some(notice_ttl_secs) = tickets.notice_ttl_secs {
                self.tickets.notice_ttl_secs = notice_ttl_secs;
            }
        }

        if let Some(gateway) = patch.gateway {
            if let Some(max_retries) = gateway.max_retries {
                self.gateway.max_retries = max_retries;
            }
            if let Some(base_delay_ms) = gateway.base_delay_ms {
                self.gateway.base_delay_ms = base_delay_ms;
            }
            if let Some(max_delay_ms) = gateway.max_delay_ms {
                self.gateway.max_delay_ms = max_delay_ms;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let token = read_env("KUJO_DISCORD_TOKEN").or_else(|| read_env("DISCORD_TOKEN"));
        if let Some(value) = token {
            self.discord.token = secret_value(value);
        }

        if let Some(value) = read_env("KUJO_TICKETS_OPEN_EMOJI") {
            self.tickets.open_emoji = value;
        }
        if let Some(value) = read_env("KUJO_TICKETS_CLOSE_EMOJI") {
            self.tickets.close_emoji = value;
        }
        if let Some(value) = read_env("KUJO_TICKETS_ADMIN_ROLE_NAME") {
            self.tickets.admin_role_name = value;
        }
        if let Some(value) = read_env("KUJO_TICKETS_CHANNEL_PREFIX") {
            self.tickets.channel_prefix = value;
        }
        if let Some(value) = read_env("KUJO_TICKETS_CLOSE_DELAY_SECS") {
            self.tickets.close_delay_secs = parse_u64("KUJO_TICKETS_CLOSE_DELAY_SECS", &value)?;
        }
        if let Some(value) = read_env("KUJO_TICKETS_NOTICE_TTL_SECS") {
            self.tickets.notice_ttl_secs = parse_u64("KUJO_TICKETS_NOTICE_TTL_SECS", &value)?;
        }

        if let Some(value) = read_env("KUJO_GATEWAY_MAX_RETRIES") {
            self.gateway.max_retries = parse_u32("KUJO_GATEWAY_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("KUJO_GATEWAY_BASE_DELAY_MS") {
            self.gateway.base_delay_ms = parse_u64("KUJO_GATEWAY_BASE_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("KUJO_GATEWAY_MAX_DELAY_MS") {
            self.gateway.max_delay_ms = parse_u64("KUJO_GATEWAY_MAX_DELAY_MS", &value)?;
        }

        if let Some(value) = read_env("KUJO_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        // `PORT` is what most container hosts inject.
        let port_key = ["KUJO_SERVER_HEALTH_CHECK_PORT", "PORT"]
            .into_iter()
            .find_map(|key| read_env(key).map(|value| (key, value)));
        if let Some((key, value)) = port_key {
            self.server.health_check_port = parse_u16(key, &value)?;
        }

        let log_level = read_env("KUJO_LOGGING_LEVEL").or_else(|| read_env("KUJO_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("KUJO_LOGGING_FORMAT").or_else(|| read_env("KUJO_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(discord_token) = overrides.discord_token {
            self.discord.token = secret_value(discord_token);
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(health_check_port) = overrides.health_check_port {
            self.server.health_check_port = health_check_port;
        }
        if let Some(admin_role_name) = overrides.admin_role_name {
            self.tickets.admin_role_name = admin_role_name;
        }
        if let Some(channel_prefix) = overrides.channel_prefix {
            self.tickets.channel_prefix = channel_prefix;
        }
        if let Some(close_delay_secs) = overrides.close_delay_secs {
            self.tickets.close_delay_secs = close_delay_secs;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_discord(&self.discord)?;
        validate_tickets(&self.tickets)?;
        validate_gateway(&self.gateway)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("kujo.toml"), PathBuf::from("config/kujo.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_discord(discord: &DiscordConfig) -> Result<(), ConfigError> {
    let token = discord.token.expose_secret();
    if token.trim().is_empty() {
        return Err(ConfigError::Validation(
            "discord.token is required. Set KUJO_DISCORD_TOKEN (or DISCORD_TOKEN) to the bot token from https://discord.com/developers/applications > Your App > Bot".to_string(),
        ));
    }
    if token.chars().any(char::is_whitespace) {
        return Err(ConfigError::Validation(
            "discord.token must not contain whitespace (hint: drop any `Bot ` prefix)".to_string(),
        ));
    }

    Ok(())
}

fn validate_tickets(tickets: &TicketConfig) -> Result<(), ConfigError> {
    if tickets.open_emoji.trim().is_empty() || tickets.close_emoji.trim().is_empty() {
        return Err(ConfigError::Validation(
            "tickets.open_emoji and tickets.close_emoji must not be empty".to_string(),
        ));
    }
    if tickets.open_emoji.trim() == tickets.close_emoji.trim() {
        return Err(ConfigError::Validation(
            "tickets.open_emoji and tickets.close_emoji must differ".to_string(),
        ));
    }

    if tickets.admin_role_name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "tickets.admin_role_name must not be empty".to_string(),
        ));
    }

    let prefix = tickets.channel_prefix.as_str();
    if prefix.is_empty() || sanitize_name(prefix) != prefix {
        return Err(ConfigError::Validation(format!(
            "tickets.channel_prefix `{prefix}` must be non-empty lowercase [a-z0-9_-]"
        )));
    }

    if tickets.close_delay_secs > 300 {
        return Err(ConfigError::Validation(
            "tickets.close_delay_secs must be in range 0..=300".to_string(),
        ));
    }
    if tickets.notice_ttl_secs == 0 || tickets.notice_ttl_secs > 300 {
        return Err(ConfigError::Validation(
            "tickets.notice_ttl_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_gateway(gateway: &GatewayConfig) -> Result<(), ConfigError> {
    if gateway.base_delay_ms > gateway.max_delay_ms {
        return Err(ConfigError::Validation(
            "gateway.base_delay_ms must not exceed gateway.max_delay_ms".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    discord: Option<DiscordPatch>,
    tickets: Option<TicketsPatch>,
    gateway: Option<GatewayPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DiscordPatch {
    token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TicketsPatch {
    open_emoji: Option<String>,
    close_emoji: Option<String>,
    admin_role_name: Option<String>,
    channel_prefix: Option<String>,
    close_delay_secs: Option<u64>,
    notice_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayPatch {
    max_retries: Option<u32>,
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
