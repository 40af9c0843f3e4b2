use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use kujo_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

use super::CommandResult;

struct ConfigField {
    key_path: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return CommandResult::new(2, format!("config validation failed: {error}")),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            field.key_path,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key_path, &field.value, source));
    }

    CommandResult::new(0, lines.join("\n"))
}

fn effective_fields(config: &AppConfig) -> Vec<ConfigField> {
    let tickets = &config.tickets;
    vec![
        ConfigField {
            key_path: "discord.token",
            value: redact_token(config.discord.token.expose_secret()),
            env_keys: &["KUJO_DISCORD_TOKEN", "DISCORD_TOKEN"],
        },
        ConfigField {
            key_path: "tickets.open_emoji",
            value: tickets.open_emoji.clone(),
            env_keys: &["KUJO_TICKETS_OPEN_EMOJI"],
        },
        ConfigField {
            key_path: "tickets.close_emoji",
            value: tickets.close_emoji.clone(),
            env_keys: &["KUJO_TICKETS_CLOSE_EMOJI"],
        },
        ConfigField {
            key_path: "tickets.admin_role_name",
            value: tickets.admin_role_name.clone(),
            env_keys: &["KUJO_TICKETS_ADMIN_ROLE_NAME"],
        },
        ConfigField {
            key_path: "tickets.channel_prefix",
            value: tickets.channel_prefix.clone(),
            env_keys: &["KUJO_TICKETS_CHANNEL_PREFIX"],
        },
        ConfigField {
            key_path: "tickets.close_delay_secs",
            value: tickets.close_delay_secs.to_string(),
            env_keys: &["KUJO_TICKETS_CLOSE_DELAY_SECS"],
        },
        ConfigField {
            key_path: "tickets.notice_ttl_secs",
            value: tickets.notice_ttl_secs.to_string(),
            env_keys: &["KUJO_TICKETS_NOTICE_TTL_SECS"],
        },
        ConfigField {
            key_path: "gateway.max_retries",
            value: config.gateway.max_retries.to_string(),
            env_keys: &["KUJO_GATEWAY_MAX_RETRIES"],
        },
        ConfigField {
            key_path: "gateway.base_delay_ms",
            value: config.gateway.base_delay_ms.to_string(),
            env_keys: &["KUJO_GATEWAY_BASE_DELAY_MS"],
        },
        ConfigField {
            key_path: "gateway.max_delay_ms",
            value: config.gateway.max_delay_ms.to_string(),
            env_keys: &["KUJO_GATEWAY_MAX_DELAY_MS"],
        },
        ConfigField {
            key_path: "server.bind_address",
            value: config.server.bind_address.clone(),
            env_keys: &["KUJO_SERVER_BIND_ADDRESS"],
        },
        ConfigField {
            key_path: "server.health_check_port",
            value: config.server.health_check_port.to_string(),
            env_keys: &["KUJO_SERVER_HEALTH_CHECK_PORT", "PORT"],
        },
        ConfigField {
            key_path: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["KUJO_LOGGING_LEVEL", "KUJO_LOG_LEVEL"],
        },
        ConfigField {
            key_path: "logging.format",
            value: format!("{:?}", config.logging.format),
            env_keys: &["KUJO_LOGGING_FORMAT", "KUJO_LOG_FORMAT"],
        },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("kujo.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/kujo.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Bot tokens are `<user id>.<timestamp>.<hmac>`; only the id segment is shown.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('.') {
        return format!("{prefix}.***");
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use super::{contains_path, redact_token};

    #[test]
    fn redaction_keeps_only_the_id_segment() {
        assert_eq!(redact_token("MTIzNDU2.GhIjKl.secret-part"), "MTIzNDU2.***");
        assert_eq!(redact_token("opaque"), "<redacted>");
        assert_eq!(redact_token("  "), "<empty>");
    }

    #[test]
    fn nested_key_lookup_follows_tables() {
        let doc: toml::Value = "[tickets]\nadmin_role_name = \"Staff\"\n".parse().expect("toml");
        assert!(contains_path(&doc, "tickets.admin_role_name"));
        assert!(!contains_path(&doc, "tickets.channel_prefix"));
    }
}
