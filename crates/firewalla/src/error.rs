//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and a process exit code.

use miette::Diagnostic;
use thiserror::Error;

use firewalla_config::ConfigError;
use firewalla_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the Firewalla MSP API: {message}")]
    #[diagnostic(
        code(firewalla::connection_failed),
        help(
            "Check the MSP domain and your network connection.\n\
             Try: firewalla status -vv"
        )
    )]
    ConnectionFailed { message: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(firewalla::auth_failed),
        help(
            "The MSP rejected the API token for profile '{profile}'.\n\
             Create a new personal access token in the MSP portal (Account Settings)."
        )
    )]
    AuthFailed { profile: String, message: String },

    #[error("No API key configured for profile '{profile}'")]
    #[diagnostic(
        code(firewalla::no_credentials),
        help(
            "Set api_key_env or api_key in the profile, store the key in the\n\
             system keyring, or set FIREWALLA_API_KEY."
        )
    )]
    NoCredentials { profile: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(firewalla::not_found),
        help("Run: firewalla {list_command} to see what the box reports")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid {field}: {reason}")]
    #[diagnostic(code(firewalla::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Invalid configuration value for {field}: {reason}")]
    #[diagnostic(
        code(firewalla::invalid_config),
        help("Fix the value in your config file or the matching FIREWALLA_ variable.")
    )]
    InvalidConfig { field: String, reason: String },

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(firewalla::profile_not_found),
        help("Available profiles: {available}")
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No profile configured and no --host given")]
    #[diagnostic(
        code(firewalla::no_config),
        help(
            "Create a config file at {path}\n\
             or pass --host and --api-key."
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(firewalla::config))]
    Config(Box<ConfigError>),

    #[error("Internal error: {0}")]
    #[diagnostic(code(firewalla::internal))]
    Internal(String),

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {0}")]
    #[diagnostic(code(firewalla::render))]
    Render(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::Validation { .. } => exit_code::NOT_FOUND,
            Self::InvalidConfig { .. } | Self::ProfileNotFound { .. } | Self::NoConfig { .. } => {
                exit_code::USAGE
            }
            Self::Config(_) | Self::Internal(_) | Self::Io(_) | Self::Render(_) => {
                exit_code::GENERAL
            }
        }
    }

    /// Attach the active profile name to an auth failure.
    pub fn for_profile(self, profile: &str) -> Self {
        match self {
            Self::AuthFailed { message, .. } => Self::AuthFailed {
                profile: profile.into(),
                message,
            },
            other => other,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Auth { message } => CliError::AuthFailed {
                profile: "current".into(),
                message,
            },

            CoreError::Transient { message } => CliError::ConnectionFailed { message },

            CoreError::Disconnected => CliError::ConnectionFailed {
                message: "the sync session ended before the request finished".into(),
            },

            CoreError::NotFound {
                entity_type,
                identifier,
            } => CliError::NotFound {
                resource_type: entity_type,
                identifier,
                list_command: "status rules".into(),
            },

            CoreError::Validation { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::Config { message } => CliError::InvalidConfig {
                field: "config".into(),
                reason: message,
            },

            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::InvalidConfig { field, reason },
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::UnknownProfile { name } => CliError::ProfileNotFound {
                name,
                available: String::new(),
            },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config(Box::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_failure_class() {
        let auth: CliError = CoreError::Auth {
            message: "nope".into(),
        }
        .into();
        assert_eq!(auth.exit_code(), exit_code::AUTH);

        let transient: CliError = CoreError::Transient {
            message: "reset".into(),
        }
        .into();
        assert_eq!(transient.exit_code(), exit_code::CONNECTION);

        let missing: CliError = CoreError::NotFound {
            entity_type: "Rule".into(),
            identifier: "r1".into(),
        }
        .into();
        assert_eq!(missing.exit_code(), exit_code::NOT_FOUND);

        let invalid: CliError = CoreError::Validation {
            message: "unknown rule id: R99".into(),
        }
        .into();
        assert_eq!(invalid.exit_code(), exit_code::NOT_FOUND);
    }

    #[test]
    fn auth_failure_names_profile() {
        let err = CliError::from(CoreError::Auth {
            message: "401".into(),
        })
        .for_profile("home");
        assert!(matches!(err, CliError::AuthFailed { ref profile, .. } if profile == "home"));
    }
}
