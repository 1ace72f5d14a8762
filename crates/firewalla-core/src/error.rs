// ── Core error types ──
//
// User-facing errors from firewalla-core. Consumers see the four failure
// classes plus lifecycle errors, never raw HTTP statuses. The
// `From<firewalla_api::Error>` impl folds transport errors into the class
// they belong to.

use thiserror::Error;

pub use firewalla_api::ErrorKind;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Remote failure classes ───────────────────────────────────────
    /// Credential rejected. The integration needs a new token.
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    /// Network trouble or server fault that outlasted the retry budget.
    #[error("Firewalla API unreachable: {message}")]
    Transient { message: String },

    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: String,
        identifier: String,
    },

    #[error("Validation failed: {message}")]
    Validation { message: String },

    // ── Lifecycle ────────────────────────────────────────────────────
    /// The integration was shut down (or never set up).
    #[error("Integration is shut down")]
    Disconnected,

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Failure class. Lifecycle and internal errors classify as validation:
    /// retrying them never helps.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth { .. } => ErrorKind::Auth,
            Self::Transient { .. } => ErrorKind::Transient,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Validation { .. }
            | Self::Disconnected
            | Self::Config { .. }
            | Self::Internal(_) => ErrorKind::Validation,
        }
    }

    pub fn is_auth(&self) -> bool {
        self.kind() == ErrorKind::Auth
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<firewalla_api::Error> for CoreError {
    fn from(err: firewalla_api::Error) -> Self {
        match err {
            firewalla_api::Error::NotFound { resource } => CoreError::NotFound {
                entity_type: "Resource".into(),
                identifier: resource,
            },
            firewalla_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            firewalla_api::Error::Tls(msg) => CoreError::Config {
                message: format!("TLS setup failed: {msg}"),
            },
            other => {
                let message = other.to_string();
                match other.kind() {
                    ErrorKind::Auth => CoreError::Auth { message },
                    ErrorKind::Transient => CoreError::Transient { message },
                    ErrorKind::NotFound => CoreError::NotFound {
                        entity_type: "Resource".into(),
                        identifier: message,
                    },
                    ErrorKind::Validation => CoreError::Validation { message },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_keep_their_class() {
        let auth: CoreError = firewalla_api::Error::Authentication { status: 401 }.into();
        assert!(auth.is_auth());

        let transient: CoreError = firewalla_api::Error::Server {
            status: 502,
            message: "bad gateway".into(),
        }
        .into();
        assert_eq!(transient.kind(), ErrorKind::Transient);

        let gone: CoreError = firewalla_api::Error::NotFound {
            resource: "/v2/rules/r1/pause".into(),
        }
        .into();
        assert!(gone.is_not_found());

        let bad: CoreError = firewalla_api::Error::UnexpectedPayload("no list".into()).into();
        assert_eq!(bad.kind(), ErrorKind::Validation);
    }

    #[test]
    fn lifecycle_errors_are_not_retryable() {
        assert_eq!(CoreError::Disconnected.kind(), ErrorKind::Validation);
    }
}
