//! DNS Resolver Interface: abstracts TXT/A/AAAA/MX lookup
//! with validation, behind two implementations (system, explicit-servers).

mod explicit;
mod system;

pub use explicit::{ExplicitServersResolver, ServerSpec};
pub use system::SystemResolver;

use async_trait::async_trait;
use std::net::IpAddr;
use thiserror::Error;

/// A resolved MX record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MxRecord {
    pub host: String,
    pub pref: u16,
}

/// Failure modes for DNS lookups: transient (I/O timeout,
/// refused connection) vs permanent (NXDOMAIN, malformed response).
#[derive(Debug, Error)]
pub enum DnsError {
    #[error("transient DNS error: {0}")]
    Transient(String),
    #[error("permanent DNS error: {0}")]
    Permanent(String),
}

impl DnsError {
    pub fn is_transient(&self) -> bool {
        matches!(self, DnsError::Transient(_))
    }
}

pub type DnsResult<T> = Result<T, DnsError>;

/// The resolver interface every SPF/aggregation/reconciliation component
/// programs against.
#[async_trait]
pub trait DnsResolver: Send + Sync {
    /// Returns only TXT records passing validation: printable ASCII,
    /// length ≤ 4096.
    async fn lookup_txt(&self, domain: &str) -> DnsResult<Vec<String>>;

    /// Rejects nil and unspecified addresses (`0.0.0.0`, `::`).
    async fn lookup_ip(&self, domain: &str) -> DnsResult<Vec<IpAddr>>;

    /// Rejects empty hostnames, hostnames > 253 chars, or hostnames with
    /// characters outside `[A-Za-z0-9.-]`.
    async fn lookup_mx(&self, domain: &str) -> DnsResult<Vec<MxRecord>>;
}

/// Shared TXT-record validation: printable ASCII, length ≤ 4096.
pub(crate) fn valid_txt(value: &str) -> bool {
    value.len() <= 4096 && value.chars().all(|c| c.is_ascii_graphic() || c == ' ')
}

/// Shared IP validation: rejects nil/unspecified addresses.
pub(crate) fn valid_ip(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => !v4.is_unspecified(),
        IpAddr::V6(v6) => !v6.is_unspecified(),
    }
}

/// Shared MX hostname validation.
pub(crate) fn valid_mx_host(host: &str) -> bool {
    !host.is_empty()
        && host.len() <= 253
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}
