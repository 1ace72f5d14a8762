//! CLI-aware config resolution.
//!
//! Wraps `firewalla-config` with the global flag overrides (`--host`,
//! `--box`, `--api-key`, `--insecure`, `--timeout`).

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use firewalla_config::{Config, Defaults, Profile};
use firewalla_core::{SyncConfig, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Config file in effect: `--config`, else the platform default.
pub fn config_path(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(firewalla_config::config_path)
}

pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(firewalla_config::load_config_from(&config_path(global))?)
}

/// Profile name in effect: `--profile`, else the file's default.
pub fn active_profile_name(global: &GlobalOpts, cfg: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| cfg.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build the `SyncConfig` for this invocation.
///
/// Uses the active profile when it exists; otherwise `--host` and
/// `--api-key` must be given. Flags win over profile values.
pub fn resolve(global: &GlobalOpts) -> Result<(String, SyncConfig), CliError> {
    let cfg = load(global)?;
    let profile_name = active_profile_name(global, &cfg);

    let mut sync = if let Some(profile) = cfg.profiles.get(&profile_name) {
        let mut profile = profile.clone();
        if let Some(host) = &global.host {
            profile.host.clone_from(host);
        }
        // A flag-supplied key stands in for a profile without stored credentials.
        if global.api_key.is_some() {
            profile.api_key.clone_from(&global.api_key);
        }
        firewalla_config::profile_to_sync_config(&profile, &profile_name, &cfg.defaults)?
    } else if global.profile.is_some() {
        return Err(CliError::ProfileNotFound {
            name: profile_name,
            available: available_profiles(&cfg),
        });
    } else {
        from_flags(global, &profile_name, &cfg.defaults)?
    };

    if let Some(gid) = &global.box_gid {
        sync.box_gid = Some(gid.clone());
    }
    if let Some(key) = &global.api_key {
        sync.api_key = SecretString::from(key.clone());
    }
    if global.insecure {
        sync.tls = TlsVerification::DangerAcceptInvalid;
    }
    if let Some(secs) = global.timeout {
        sync.timeout = Duration::from_secs(secs);
    }
    Ok((profile_name, sync))
}

fn from_flags(
    global: &GlobalOpts,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<SyncConfig, CliError> {
    let host = global.host.as_deref().ok_or_else(|| CliError::NoConfig {
        path: config_path(global).display().to_string(),
    })?;
    let key = global
        .api_key
        .as_deref()
        .ok_or_else(|| CliError::NoCredentials {
            profile: profile_name.into(),
        })?;

    let profile = Profile {
        host: host.into(),
        api_key: Some(key.into()),
        ..Profile::default()
    };
    Ok(firewalla_config::profile_to_sync_config(
        &profile,
        profile_name,
        defaults,
    )?)
}

pub fn available_profiles(cfg: &Config) -> String {
    let mut names: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
    names.sort_unstable();
    if names.is_empty() {
        "(none)".into()
    } else {
        names.join(", ")
    }
}
