use thiserror::Error;

/// Failure class shared by every layer above the transport.
///
/// Retry and propagation decisions are made on the class, never on the
/// concrete variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Credential rejected. Fatal to the session; never retried.
    Auth,
    /// Network trouble or a server-side fault. Retried with backoff.
    Transient,
    /// The addressed object no longer exists remotely.
    NotFound,
    /// Malformed input or payload. Never retried.
    Validation,
}

/// Top-level error type for the `firewalla-api` crate.
///
/// Covers every failure mode of the MSP API surface: authentication,
/// transport, HTTP status, and payload decoding. `firewalla-core` maps
/// these into its own taxonomy through [`Error::kind`].
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The API token was rejected (HTTP 401 or 403).
    #[error("Authentication rejected by the MSP API (HTTP {status})")]
    Authentication { status: u16 },

    /// The API token can't be encoded as a header value.
    #[error("Invalid API token: {0}")]
    InvalidToken(String),

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Remote status ───────────────────────────────────────────────
    /// HTTP 404 for an addressed object.
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Rate limited by the MSP API.
    #[error("Rate limited by the MSP API")]
    RateLimited { retry_after_secs: Option<u64> },

    /// HTTP 5xx.
    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// Any other non-success status.
    #[error("Unexpected response (HTTP {status}): {message}")]
    UnexpectedStatus { status: u16, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// The payload parsed as JSON but has a shape we can't use.
    #[error("Unexpected payload: {0}")]
    UnexpectedPayload(String),
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Authentication { .. } => ErrorKind::Auth,
            Self::Transport(e) => {
                if e.is_builder() || e.is_decode() || e.is_redirect() {
                    ErrorKind::Validation
                } else {
                    ErrorKind::Transient
                }
            }
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::RateLimited { .. } | Self::Server { .. } => ErrorKind::Transient,
            Self::InvalidToken(_)
            | Self::InvalidUrl(_)
            | Self::Tls(_)
            | Self::UnexpectedStatus { .. }
            | Self::Deserialization { .. }
            | Self::UnexpectedPayload(_) => ErrorKind::Validation,
        }
    }

    /// Returns `true` if re-entering credentials might resolve this error.
    pub fn is_auth(&self) -> bool {
        self.kind() == ErrorKind::Auth
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Server-requested wait before the next attempt, if any.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => *retry_after_secs,
            _ => None,
        }
    }
}
