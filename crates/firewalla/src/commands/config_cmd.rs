//! Config subcommand handlers.

use std::io::{self, BufRead};
use std::str::FromStr;

use firewalla_config::Config;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

const REDACTED: &str = "****";

/// Mask plaintext secrets before the config leaves the process.
fn redact(mut cfg: Config) -> Config {
    for profile in cfg.profiles.values_mut() {
        if profile.api_key.is_some() {
            profile.api_key = Some(REDACTED.into());
        }
    }
    cfg
}

fn to_toml(cfg: &Config) -> Result<String, CliError> {
    toml::to_string_pretty(cfg).map_err(|e| CliError::Render(e.to_string()))
}

fn parse<T: FromStr>(field: &str, value: &str, expected: &str) -> Result<T, CliError> {
    value.parse().map_err(|_| CliError::Validation {
        field: field.into(),
        reason: format!("must be {expected}"),
    })
}

fn save(cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    firewalla_config::save_config_to(cfg, &config::config_path(global))?;
    Ok(())
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&config::config_path(global).display().to_string(), false);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = redact(config::load(global)?);
            let toml = to_toml(&cfg)?;
            let out = output::render_single(
                &global.output,
                &cfg,
                |_| toml.trim_end().to_owned(),
                |_| "config".into(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Set <key> <value> ───────────────────────────────────────
        ConfigCommand::Set { key, value } => {
            let mut cfg = config::load(global)?;
            let profile_name = config::active_profile_name(global, &cfg);
            let profile = cfg.profiles.entry(profile_name.clone()).or_default();

            match key.as_str() {
                "host" => profile.host = value,
                "box" | "box_gid" | "box-gid" => profile.box_gid = Some(value),
                "api_key_env" | "api-key-env" => profile.api_key_env = Some(value),
                "ca_cert" | "ca-cert" => profile.ca_cert = Some(value.into()),
                "insecure" => profile.insecure = Some(parse(&key, &value, "'true' or 'false'")?),
                "timeout" => profile.timeout = Some(parse(&key, &value, "a number (seconds)")?),
                "poll_interval" | "poll-interval" => {
                    profile.poll_interval = Some(parse(&key, &value, "a number (seconds)")?);
                }
                "failure_threshold" | "failure-threshold" => {
                    profile.failure_threshold = Some(parse(&key, &value, "a positive integer")?);
                }
                "missing_threshold" | "missing-threshold" => {
                    profile.missing_threshold = Some(parse(&key, &value, "a positive integer")?);
                }
                "confirm_cycles" | "confirm-cycles" => {
                    profile.confirm_cycles = Some(parse(&key, &value, "a positive integer")?);
                }
                "retry_attempts" | "retry-attempts" => {
                    profile.retry_attempts = Some(parse(&key, &value, "a positive integer")?);
                }
                "api_key" | "api-key" => {
                    return Err(CliError::Validation {
                        field: key,
                        reason: "use `firewalla config set-key` to store the key in the keyring"
                            .into(),
                    });
                }
                other => {
                    return Err(CliError::Validation {
                        field: other.into(),
                        reason: format!(
                            "unknown config key '{other}'. Valid keys: host, box, api_key_env, \
                             ca_cert, insecure, timeout, poll_interval, failure_threshold, \
                             missing_threshold, confirm_cycles, retry_attempts"
                        ),
                    });
                }
            }

            save(&cfg, global)?;
            if !global.quiet {
                eprintln!("Set {key} on profile '{profile_name}'");
            }
            Ok(())
        }

        // ── Profiles ────────────────────────────────────────────────
        ConfigCommand::Profiles => {
            let cfg = config::load(global)?;
            let default = cfg.default_profile.as_deref().unwrap_or("default");
            let mut names: Vec<&String> = cfg.profiles.keys().collect();
            names.sort();
            if names.is_empty() {
                eprintln!("No profiles configured. Run: firewalla config set host <msp-domain>");
            }
            for name in names {
                let marker = if name == default { " *" } else { "" };
                output::print_output(&format!("{name}{marker}"), global.quiet);
            }
            Ok(())
        }

        // ── Use <name> ─────────────────────────────────────────────
        ConfigCommand::Use { name } => {
            let mut cfg = config::load(global)?;
            if !cfg.profiles.contains_key(&name) {
                return Err(CliError::ProfileNotFound {
                    available: config::available_profiles(&cfg),
                    name,
                });
            }
            cfg.default_profile = Some(name.clone());
            save(&cfg, global)?;
            if !global.quiet {
                eprintln!("Default profile set to '{name}'");
            }
            Ok(())
        }

        // ── SetKey ─────────────────────────────────────────────────
        ConfigCommand::SetKey => {
            let cfg = config::load(global)?;
            let profile_name = config::active_profile_name(global, &cfg);

            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            let key = line.trim();
            if key.is_empty() {
                return Err(CliError::Validation {
                    field: "api_key".into(),
                    reason: "expected the key on stdin".into(),
                });
            }

            firewalla_config::store_api_key(&profile_name, key)?;
            if !global.quiet {
                eprintln!("API key stored in the system keyring for profile '{profile_name}'");
            }
            Ok(())
        }
    }
}
