//! Explicit-servers resolver: iterates a configured list of `IP:port`
//! servers, falling back to the system resolver if every configured
//! server fails or returns a non-success response.

use crate::system::classify;
use crate::{DnsError, DnsResolver, DnsResult, MxRecord, SystemResolver};
use async_trait::async_trait;
use std::net::IpAddr;
use trust_dns_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver;

/// A single `{name, ip[:port]}` DNS server entry from config.
#[derive(Debug, Clone)]
pub struct ServerSpec {
    pub name: String,
    pub ip: IpAddr,
    pub port: u16,
}

/// Maintains one reusable resolver for the configured server list, for the
/// lifetime of the process, falling back to the system resolver.
pub struct ExplicitServersResolver {
    explicit: TokioAsyncResolver,
    fallback: SystemResolver,
}

impl ExplicitServersResolver {
    pub fn new(servers: &[ServerSpec]) -> Self {
        let ips: Vec<IpAddr> = servers.iter().map(|s| s.ip).collect();
        let port = servers.first().map(|s| s.port).unwrap_or(53);
        let group = NameServerConfigGroup::from_ips_clear(&ips, port, true);
        let config = ResolverConfig::from_parts(None, vec![], group);
        Self {
            explicit: TokioAsyncResolver::tokio(config, ResolverOpts::default()),
            fallback: SystemResolver::new(),
        }
    }

    fn server_unavailable(err: &DnsError) -> bool {
        // Every failure from the explicit server set triggers fallback to
        // the system resolver.
        matches!(err, DnsError::Transient(_) | DnsError::Permanent(_))
    }
}

#[async_trait]
impl DnsResolver for ExplicitServersResolver {
    async fn lookup_txt(&self, domain: &str) -> DnsResult<Vec<String>> {
        match self.explicit.txt_lookup(domain).await {
            Ok(lookup) => Ok(lookup
                .iter()
                .map(|record| {
                    record
                        .txt_data()
                        .iter()
                        .map(|chunk| String::from_utf8_lossy(chunk))
                        .collect::<String>()
                })
                .filter(|t| crate::valid_txt(t))
                .collect()),
            Err(e) => {
                let classified = classify(e);
                if Self::server_unavailable(&classified) {
                    self.fallback.lookup_txt(domain).await
                } else {
                    Err(classified)
                }
            }
        }
    }

    async fn lookup_ip(&self, domain: &str) -> DnsResult<Vec<IpAddr>> {
        let mut out = Vec::new();
        let mut any_ok = false;
        if let Ok(v4) = self.explicit.ipv4_lookup(domain).await {
            any_ok = true;
            out.extend(
                v4.iter()
                    .map(|rec| IpAddr::V4((*rec).into()))
                    .filter(crate::valid_ip),
            );
        }
        if let Ok(v6) = self.explicit.ipv6_lookup(domain).await {
            any_ok = true;
            out.extend(
                v6.iter()
                    .map(|rec| IpAddr::V6((*rec).into()))
                    .filter(crate::valid_ip),
            );
        }
        if !any_ok {
            return self.fallback.lookup_ip(domain).await;
        }
        Ok(out)
    }

    async fn lookup_mx(&self, domain: &str) -> DnsResult<Vec<MxRecord>> {
        match self.explicit.mx_lookup(domain).await {
            Ok(lookup) => Ok(lookup
                .iter()
                .map(|mx| MxRecord {
                    host: mx.exchange().to_string().trim_end_matches('.').to_string(),
                    pref: mx.preference(),
                })
                .filter(|mx| crate::valid_mx_host(&mx.host))
                .collect()),
            Err(e) => {
                let classified = classify(e);
                if Self::server_unavailable(&classified) {
                    self.fallback.lookup_mx(domain).await
                } else {
                    Err(classified)
                }
            }
        }
    }
}
