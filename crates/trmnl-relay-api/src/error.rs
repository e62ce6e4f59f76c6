use thiserror::Error;

/// Top-level error type for the `trmnl-relay-api` crate.
///
/// Covers every failure mode of the two wire protocols: transport,
/// non-2xx responses, undecodable bodies, and client construction.
/// `trmnl-relay-core` maps these into its delivery error taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS setup or certificate loading error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Credentials ─────────────────────────────────────────────────
    /// A credential could not be encoded as an HTTP header.
    #[error("Invalid credentials: {message}")]
    InvalidCredentials { message: String },

    // ── Backend ─────────────────────────────────────────────────────
    /// The backend answered with a non-2xx status.
    ///
    /// `message` is the backend's own `error`/`message` field when the body
    /// was JSON, otherwise the status line. `body` is the raw (truncated) body.
    #[error("Backend error (HTTP {status}): {message}")]
    Backend {
        status: u16,
        message: String,
        body: String,
    },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if the backend rejected our credentials.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Backend { status: 401 | 403, .. })
    }

    /// Returns `true` if this is a transient error worth retrying.
    ///
    /// Nothing in this workspace retries on its own; callers decide.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } | Self::Backend { status: 429 | 502..=504, .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if the request ran out of time.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// HTTP status of a backend rejection, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Backend { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(status: u16) -> Error {
        Error::Backend {
            status,
            message: String::new(),
            body: String::new(),
        }
    }

    #[test]
    fn auth_failures_are_401_and_403() {
        assert!(backend(401).is_auth_failure());
        assert!(backend(403).is_auth_failure());
        assert!(!backend(404).is_auth_failure());
    }

    #[test]
    fn throttling_and_gateway_errors_are_transient() {
        assert!(backend(429).is_transient());
        assert!(backend(503).is_transient());
        assert!(!backend(400).is_transient());
        assert!(Error::Timeout { timeout_secs: 30 }.is_transient());
    }

    #[test]
    fn status_only_for_backend_errors() {
        assert_eq!(backend(422).status(), Some(422));
        assert_eq!(Error::Tls("x".into()).status(), None);
    }
}
