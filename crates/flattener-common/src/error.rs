//! Error taxonomy for the SPF flattener

use thiserror::Error;

/// Top-level error type. Each variant maps to an exit-code family and a
/// retry eligibility so that callers can decide both without string
/// matching.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed config, missing required field, invalid domain name.
    /// Fails the run before any network I/O.
    #[error("configuration error: {0}")]
    Config(String),

    /// No `v=spf1` record, recursion cycle, depth exceeded, DNS lookup
    /// failure. Fails the specific domain task; other tasks continue.
    #[error("SPF resolution error: {0}")]
    SpfResolution(String),

    /// HTTP 429/503. Recovered locally by the retry wrapper; surfaced only
    /// after retries exhaust.
    #[error("rate limited: {0}")]
    RateLimit(String),

    /// I/O timeout or refused connection. Recovered locally; surfaced on
    /// exhaustion.
    #[error("transient error: {0}")]
    Transient(String),

    /// Non-SUCCESS provider status, 4xx/5xx non-rate-limit, authentication
    /// failure. Propagates immediately; secrets are redacted before this
    /// variant is constructed (see [`crate::redact`]).
    #[error("provider error: {0}")]
    ProviderPermanent(String),

    /// A record rejected by validation during backup or import.
    #[error("validation error: {0}")]
    Validation(String),

    /// Caller's context was cancelled mid-operation.
    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// The four exit-code families a run can terminate in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitFamily {
    Success = 0,
    Config = 10,
    Auth = 20,
    Provider = 30,
    Validation = 40,
}

impl Error {
    /// Whether the retry wrapper should attempt this call again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RateLimit(_) | Error::Transient(_))
    }

    /// Exit-code family this error belongs to.
    pub fn exit_family(&self) -> ExitFamily {
        match self {
            Error::Config(_) => ExitFamily::Config,
            Error::ProviderPermanent(msg) if msg.contains("auth") => ExitFamily::Auth,
            Error::ProviderPermanent(_) | Error::RateLimit(_) | Error::Transient(_) => {
                ExitFamily::Provider
            }
            Error::Validation(_) => ExitFamily::Validation,
            Error::SpfResolution(_) | Error::Cancelled | Error::Other(_) => ExitFamily::Provider,
        }
    }
}

/// Redact provider secrets from a message before it is logged or returned
/// to the caller. A single substitution applied at the edge.
pub fn redact(message: &str) -> String {
    message
        .replace("secretapikey", "[REDACTED]")
        .replace("apikey", "[REDACTED]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(Error::RateLimit("429".into()).is_retryable());
        assert!(Error::Transient("timeout".into()).is_retryable());
        assert!(!Error::ProviderPermanent("bad request".into()).is_retryable());
        assert!(!Error::Validation("bad ttl".into()).is_retryable());
    }

    #[test]
    fn redacts_known_secret_literals() {
        let msg = "request failed: apikey=abc123 secretapikey=def456";
        assert_eq!(redact(msg), "request failed: [REDACTED]=abc123 [REDACTED]=def456");
    }

    #[test]
    fn redact_is_noop_on_clean_message() {
        assert_eq!(redact("domain not found"), "domain not found");
    }
}
