use kujo_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use serde::Serialize;

use super::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult::new(exit_code, output);
    }

    CommandResult::new(exit_code, render_human(&report))
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_token_shape(&config));
            checks.push(check_ticket_settings(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["discord_token_shape", "ticket_settings"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_token_shape(config: &AppConfig) -> DoctorCheck {
    let segments = config.discord.token.expose_secret().split('.').count();
    if segments == 3 {
        DoctorCheck {
            name: "discord_token_shape",
            status: CheckStatus::Pass,
            details: "token has the three dot-separated segments of a bot token".to_string(),
        }
    } else {
        DoctorCheck {
            name: "discord_token_shape",
            status: CheckStatus::Fail,
            details: format!(
                "expected a bot token with 3 dot-separated segments, found {segments}; the gateway will reject it"
            ),
        }
    }
}

/// Discord rejects channel names over 100 characters.
const CHANNEL_NAME_LIMIT: usize = 100;
/// Longest display name Discord allows.
const DISPLAY_NAME_LIMIT: usize = 32;
/// A `u64` snowflake printed in decimal.
const USER_ID_DIGITS: usize = 20;

fn longest_channel_name(prefix: &str) -> usize {
    prefix.chars().count() + 1 + DISPLAY_NAME_LIMIT + 1 + USER_ID_DIGITS
}

fn check_ticket_settings(config: &AppConfig) -> DoctorCheck {
    let tickets = &config.tickets;
    let longest = longest_channel_name(&tickets.channel_prefix);
    if longest > CHANNEL_NAME_LIMIT {
        return DoctorCheck {
            name: "ticket_settings",
            status: CheckStatus::Fail,
            details: format!(
                "channel prefix `{}` allows ticket names of {longest} characters; Discord caps channel names at {CHANNEL_NAME_LIMIT}",
                tickets.channel_prefix
            ),
        };
    }

    DoctorCheck {
        name: "ticket_settings",
        status: CheckStatus::Pass,
        details: format!(
            "ticket names stay within {longest}/{CHANNEL_NAME_LIMIT} characters; admin role `{}`; deleted {}s after close",
            tickets.admin_role_name, tickets.close_delay_secs
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use kujo_core::config::AppConfig;

    use super::{check_ticket_settings, longest_channel_name, CheckStatus};

    #[test]
    fn default_prefix_leaves_room_for_the_longest_ticket_name() {
        assert_eq!(longest_channel_name("kujo-ticket"), 65);

        let check = check_ticket_settings(&AppConfig::default());
        assert_eq!(check.status, CheckStatus::Pass);
        assert!(check.details.contains("65/100"));
    }

    #[test]
    fn prefix_that_overflows_the_channel_name_limit_fails() {
        let mut config = AppConfig::default();
        config.tickets.channel_prefix = "a".repeat(47);

        let check = check_ticket_settings(&config);
        assert_eq!(check.status, CheckStatus::Fail);
        assert!(check.details.contains("101 characters"));

        config.tickets.channel_prefix = "a".repeat(46);
        assert_eq!(check_ticket_settings(&config).status, CheckStatus::Pass);
    }
}
