//! System resolver: delegates to the OS stub resolver via
//! `trust-dns-resolver`'s `TokioAsyncResolver`.

use crate::{valid_ip, valid_mx_host, valid_txt, DnsError, DnsResolver, DnsResult, MxRecord};
use async_trait::async_trait;
use std::net::IpAddr;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::ResolveErrorKind;
use trust_dns_resolver::TokioAsyncResolver;

pub struct SystemResolver {
    inner: TokioAsyncResolver,
}

impl SystemResolver {
    pub fn new() -> Self {
        Self {
            inner: TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default()),
        }
    }
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Classify a `trust-dns-resolver` error: NXDOMAIN and malformed responses
/// are permanent; timeouts and I/O failures are transient.
pub(crate) fn classify(err: trust_dns_resolver::error::ResolveError) -> DnsError {
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { .. } => DnsError::Permanent(err.to_string()),
        ResolveErrorKind::Timeout => DnsError::Transient(err.to_string()),
        ResolveErrorKind::Io(_) => DnsError::Transient(err.to_string()),
        _ => DnsError::Permanent(err.to_string()),
    }
}

#[async_trait]
impl DnsResolver for SystemResolver {
    async fn lookup_txt(&self, domain: &str) -> DnsResult<Vec<String>> {
        let lookup = self.inner.txt_lookup(domain).await.map_err(classify)?;
        Ok(lookup
            .iter()
            .map(|record| {
                record
                    .txt_data()
                    .iter()
                    .map(|chunk| String::from_utf8_lossy(chunk))
                    .collect::<String>()
            })
            .filter(|text| valid_txt(text))
            .collect())
    }

    async fn lookup_ip(&self, domain: &str) -> DnsResult<Vec<IpAddr>> {
        let mut out = Vec::new();
        if let Ok(v4) = self.inner.ipv4_lookup(domain).await {
            out.extend(
                v4.iter()
                    .map(|rec| IpAddr::V4((*rec).into()))
                    .filter(valid_ip),
            );
        }
        if let Ok(v6) = self.inner.ipv6_lookup(domain).await {
            out.extend(
                v6.iter()
                    .map(|rec| IpAddr::V6((*rec).into()))
                    .filter(valid_ip),
            );
        }
        Ok(out)
    }

    async fn lookup_mx(&self, domain: &str) -> DnsResult<Vec<MxRecord>> {
        let lookup = self.inner.mx_lookup(domain).await.map_err(classify)?;
        Ok(lookup
            .iter()
            .map(|mx| MxRecord {
                host: mx.exchange().to_string().trim_end_matches('.').to_string(),
                pref: mx.preference(),
            })
            .filter(|mx| valid_mx_host(&mx.host))
            .collect())
    }
}
