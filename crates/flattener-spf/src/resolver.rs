//! SPF Resolver: recursive lookup-count accounting and
//! record flattening, with cycle detection and a per-invocation TXT
//! cache. Grounded on the recursive descent shape of a conventional SPF
//! verifier, generalized from "does this IP pass" to "what is the full
//! set of authorized IPs".

use crate::mechanism::{parse_record, Mechanism, Qualifier};
use flattener_common::model::IpEntry;
use flattener_resolver::{DnsError, DnsResolver};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// RFC 7208's lookup budget.
pub const MAX_LOOKUPS: u32 = 10;
/// Recursion depth cap: independent of the lookup budget,
/// guards against pathological include chains that stay under 10 lookups
/// per branch but nest arbitrarily deep.
pub const MAX_DEPTH: u32 = 10;

#[derive(Debug, Error)]
pub enum SpfError {
    #[error("no v=spf1 TXT record found for {0}")]
    NoSpfRecord(String),
    #[error("SPF include cycle detected at {0}")]
    Cycle(String),
    #[error("SPF recursion depth exceeded at {0}")]
    DepthExceeded(String),
    #[error("SPF lookup budget of {MAX_LOOKUPS} exceeded")]
    TooManyLookups,
    #[error("malformed SPF record for {domain}: {source}")]
    Malformed {
        domain: String,
        source: crate::mechanism::ParseError,
    },
    #[error(transparent)]
    Dns(#[from] DnsError),
}

/// The outcome of a full flatten: the authorized IP set plus any
/// mechanisms that cannot be reduced to IPs (`exists:`, unrecognized
/// tokens) — preserved verbatim rather than silently dropped.
#[derive(Debug, Clone)]
pub struct FlattenResult {
    pub ips: BTreeSet<IpEntry>,
    pub passthrough: Vec<String>,
    /// The root record's terminal `all` qualifier, carried through so the
    /// packer can reproduce it (defaults to `~all` when absent).
    pub qualifier: Qualifier,
}

impl Default for FlattenResult {
    fn default() -> Self {
        Self {
            ips: BTreeSet::new(),
            passthrough: Vec::new(),
            qualifier: Qualifier::SoftFail,
        }
    }
}

/// Result of `flatten_with_threshold`: whether the record was under the
/// RFC budget already (nothing to do) or required flattening.
#[derive(Debug, Clone)]
pub enum ThresholdOutcome {
    UnderThreshold { lookups: u32 },
    Flattened { lookups: u32, result: FlattenResult },
}

type TxtCache = HashMap<String, Vec<Mechanism>>;
type BoxFut<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Resolves and flattens SPF records for one root domain. A fresh
/// instance (and fresh TXT cache) is created per flatten invocation;
/// the underlying `DnsResolver` may be shared across many.
pub struct SpfResolver {
    resolver: Arc<dyn DnsResolver>,
}

impl SpfResolver {
    pub fn new(resolver: Arc<dyn DnsResolver>) -> Self {
        Self { resolver }
    }

    /// Count the total number of DNS-lookup-consuming mechanisms
    /// (`include`, `a`, `a:host`, `mx`, `mx:host`) across the full
    /// expansion tree, plus the root apex fetch.
    pub async fn count_lookups(&self, root_domain: &str) -> Result<u32, SpfError> {
        let mut cache = TxtCache::new();
        let mut path = HashSet::new();
        count_lookups_rec(&*self.resolver, root_domain, &mut cache, &mut path, 0).await
    }

    /// Fully flatten `root_domain`'s SPF record into an IP set.
    pub async fn flatten(&self, root_domain: &str) -> Result<FlattenResult, SpfError> {
        let mut cache = TxtCache::new();
        let mut path = HashSet::new();
        let mut result = FlattenResult::default();
        flatten_rec(
            &*self.resolver,
            root_domain,
            &mut cache,
            &mut path,
            0,
            &mut result,
        )
        .await?;
        Ok(result)
    }

    /// Only flatten if the record's lookup count exceeds the RFC budget,
    /// or if `force` is set. Returns the lookup count either way so
    /// callers can report it.
    pub async fn flatten_with_threshold(
        &self,
        root_domain: &str,
        force: bool,
    ) -> Result<ThresholdOutcome, SpfError> {
        let lookups = self.count_lookups(root_domain).await?;
        if lookups <= MAX_LOOKUPS && !force {
            return Ok(ThresholdOutcome::UnderThreshold { lookups });
        }
        let result = self.flatten(root_domain).await?;
        Ok(ThresholdOutcome::Flattened { lookups, result })
    }
}

async fn fetch_spf(
    resolver: &dyn DnsResolver,
    domain: &str,
    cache: &mut TxtCache,
) -> Result<Vec<Mechanism>, SpfError> {
    if let Some(cached) = cache.get(domain) {
        return Ok(cached.clone());
    }
    let records = resolver.lookup_txt(domain).await?;
    let text = records
        .into_iter()
        .find(|t| t.starts_with("v=spf1"))
        .ok_or_else(|| SpfError::NoSpfRecord(domain.to_string()))?;
    let terms = parse_record(&text).map_err(|source| SpfError::Malformed {
        domain: domain.to_string(),
        source,
    })?;
    cache.insert(domain.to_string(), terms.clone());
    Ok(terms)
}

fn count_lookups_rec<'a>(
    resolver: &'a dyn DnsResolver,
    domain: &'a str,
    cache: &'a mut TxtCache,
    path: &'a mut HashSet<String>,
    depth: u32,
) -> BoxFut<'a, Result<u32, SpfError>> {
    Box::pin(async move {
        if depth > MAX_DEPTH {
            return Err(SpfError::DepthExceeded(domain.to_string()));
        }
        let key = domain.to_ascii_lowercase();
        if !path.insert(key.clone()) {
            return Err(SpfError::Cycle(domain.to_string()));
        }

        let terms = fetch_spf(resolver, domain, cache).await?;
        let mut count = if depth == 0 { 1 } else { 0 };

        for term in &terms {
            match term {
                Mechanism::Include(target) => {
                    count += 1;
                    count += count_lookups_rec(resolver, target, cache, path, depth + 1).await?;
                }
                Mechanism::A(_) | Mechanism::Mx(_) => count += 1,
                _ => {}
            }
        }

        path.remove(&key);
        if count > MAX_LOOKUPS {
            return Err(SpfError::TooManyLookups);
        }
        Ok(count)
    })
}

fn flatten_rec<'a>(
    resolver: &'a dyn DnsResolver,
    domain: &'a str,
    cache: &'a mut TxtCache,
    path: &'a mut HashSet<String>,
    depth: u32,
    out: &'a mut FlattenResult,
) -> BoxFut<'a, Result<(), SpfError>> {
    Box::pin(async move {
        if depth > MAX_DEPTH {
            return Err(SpfError::DepthExceeded(domain.to_string()));
        }
        let key = domain.to_ascii_lowercase();
        if !path.insert(key.clone()) {
            return Err(SpfError::Cycle(domain.to_string()));
        }

        let terms = fetch_spf(resolver, domain, cache).await?;

        for term in &terms {
            match term {
                Mechanism::Version => {}
                Mechanism::All(q) => {
                    if depth == 0 {
                        out.qualifier = *q;
                    }
                }
                Mechanism::Include(target) => {
                    flatten_rec(resolver, target, cache, path, depth + 1, out).await?;
                }
                Mechanism::A(target) => {
                    let host = target.clone().unwrap_or_else(|| domain.to_string());
                    for addr in resolver.lookup_ip(&host).await? {
                        out.ips.insert(ip_entry(addr));
                    }
                }
                Mechanism::Mx(target) => {
                    let host = target.clone().unwrap_or_else(|| domain.to_string());
                    for mx in resolver.lookup_mx(&host).await? {
                        for addr in resolver.lookup_ip(&mx.host).await? {
                            out.ips.insert(ip_entry(addr));
                        }
                    }
                }
                Mechanism::Ip4(addr, prefix) => {
                    out.ips.insert(IpEntry::V4 {
                        addr: *addr,
                        prefix: *prefix,
                    });
                }
                Mechanism::Ip6(addr, prefix) => {
                    out.ips.insert(IpEntry::V6 {
                        addr: *addr,
                        prefix: *prefix,
                    });
                }
                Mechanism::Ptr => {
                    // Ignored per RFC 7208 §5.5 deprecation; never
                    // contributes to the flattened set.
                }
                Mechanism::Exists(_) | Mechanism::Exp(_) | Mechanism::Redirect(_) | Mechanism::Unknown(_) => {
                    out.passthrough.push(render_passthrough(term));
                }
            }
        }

        path.remove(&key);
        Ok(())
    })
}

fn render_passthrough(term: &Mechanism) -> String {
    match term {
        Mechanism::Exists(target) => format!("exists:{target}"),
        Mechanism::Exp(target) => format!("exp={target}"),
        Mechanism::Redirect(target) => format!("redirect={target}"),
        Mechanism::Unknown(token) => token.clone(),
        _ => unreachable!("render_passthrough called on a reducible mechanism"),
    }
}

fn ip_entry(addr: std::net::IpAddr) -> IpEntry {
    match addr {
        std::net::IpAddr::V4(v4) => IpEntry::v4_host(v4),
        std::net::IpAddr::V6(v6) => IpEntry::v6_host(v6),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use flattener_resolver::{DnsResult, MxRecord};
    use std::collections::HashMap as StdHashMap;
    use std::net::IpAddr;

    struct FakeResolver {
        txt: StdHashMap<String, Vec<String>>,
        ip: StdHashMap<String, Vec<IpAddr>>,
        mx: StdHashMap<String, Vec<MxRecord>>,
    }

    #[async_trait]
    impl DnsResolver for FakeResolver {
        async fn lookup_txt(&self, domain: &str) -> DnsResult<Vec<String>> {
            Ok(self.txt.get(domain).cloned().unwrap_or_default())
        }
        async fn lookup_ip(&self, domain: &str) -> DnsResult<Vec<IpAddr>> {
            Ok(self.ip.get(domain).cloned().unwrap_or_default())
        }
        async fn lookup_mx(&self, domain: &str) -> DnsResult<Vec<MxRecord>> {
            Ok(self.mx.get(domain).cloned().unwrap_or_default())
        }
    }

    fn resolver_with(
        txt: &[(&str, &str)],
        ip: &[(&str, &str)],
    ) -> Arc<dyn DnsResolver> {
        let mut txt_map = StdHashMap::new();
        for (domain, record) in txt {
            txt_map
                .entry(domain.to_string())
                .or_insert_with(Vec::new)
                .push(record.to_string());
        }
        let mut ip_map = StdHashMap::new();
        for (domain, addr) in ip {
            ip_map
                .entry(domain.to_string())
                .or_insert_with(Vec::new)
                .push(addr.parse().unwrap());
        }
        Arc::new(FakeResolver {
            txt: txt_map,
            ip: ip_map,
            mx: StdHashMap::new(),
        })
    }

    #[tokio::test]
    async fn flattens_simple_ip_record() {
        let r = resolver_with(&[("example.com", "v=spf1 ip4:1.2.3.4 -all")], &[]);
        let spf = SpfResolver::new(r);
        let result = spf.flatten("example.com").await.unwrap();
        assert!(result.ips.contains(&IpEntry::v4_host("1.2.3.4".parse().unwrap())));
        assert!(result.passthrough.is_empty());
    }

    #[tokio::test]
    async fn flattens_nested_include() {
        let r = resolver_with(
            &[
                ("example.com", "v=spf1 include:_spf.example.com ~all"),
                ("_spf.example.com", "v=spf1 ip4:5.6.7.8 ~all"),
            ],
            &[],
        );
        let spf = SpfResolver::new(r);
        let result = spf.flatten("example.com").await.unwrap();
        assert!(result.ips.contains(&IpEntry::v4_host("5.6.7.8".parse().unwrap())));
    }

    #[tokio::test]
    async fn detects_include_cycle() {
        let r = resolver_with(
            &[
                ("a.example.com", "v=spf1 include:b.example.com ~all"),
                ("b.example.com", "v=spf1 include:a.example.com ~all"),
            ],
            &[],
        );
        let spf = SpfResolver::new(r);
        let err = spf.flatten("a.example.com").await.unwrap_err();
        assert!(matches!(err, SpfError::Cycle(_)));
    }

    #[tokio::test]
    async fn resolves_a_mechanism_against_current_domain() {
        let r = resolver_with(
            &[("example.com", "v=spf1 a -all")],
            &[("example.com", "9.9.9.9")],
        );
        let spf = SpfResolver::new(r);
        let result = spf.flatten("example.com").await.unwrap();
        assert!(result.ips.contains(&IpEntry::v4_host("9.9.9.9".parse().unwrap())));
    }

    #[tokio::test]
    async fn missing_spf_record_is_an_error() {
        let r = resolver_with(&[], &[]);
        let spf = SpfResolver::new(r);
        let err = spf.flatten("example.com").await.unwrap_err();
        assert!(matches!(err, SpfError::NoSpfRecord(_)));
    }

    #[tokio::test]
    async fn count_lookups_counts_apex_and_include() {
        let r = resolver_with(
            &[
                ("example.com", "v=spf1 include:a.example.com ~all"),
                ("a.example.com", "v=spf1 ip4:1.1.1.1 ~all"),
            ],
            &[],
        );
        let spf = SpfResolver::new(r);
        // 1 for the root apex fetch, 1 for the include mechanism.
        assert_eq!(spf.count_lookups("example.com").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn threshold_skips_flatten_when_under_budget() {
        let r = resolver_with(&[("example.com", "v=spf1 ip4:1.1.1.1 ~all")], &[]);
        let spf = SpfResolver::new(r);
        let outcome = spf.flatten_with_threshold("example.com", false).await.unwrap();
        assert!(matches!(outcome, ThresholdOutcome::UnderThreshold { lookups: 1 }));
    }

    #[tokio::test]
    async fn threshold_forces_flatten_when_requested() {
        let r = resolver_with(&[("example.com", "v=spf1 ip4:1.1.1.1 ~all")], &[]);
        let spf = SpfResolver::new(r);
        let outcome = spf.flatten_with_threshold("example.com", true).await.unwrap();
        assert!(matches!(outcome, ThresholdOutcome::Flattened { .. }));
    }

    #[tokio::test]
    async fn preserves_exists_mechanism_as_passthrough() {
        let r = resolver_with(
            &[("example.com", "v=spf1 exists:%{i}.example.com -all")],
            &[],
        );
        let spf = SpfResolver::new(r);
        let result = spf.flatten("example.com").await.unwrap();
        assert_eq!(result.passthrough, vec!["exists:%{i}.example.com"]);
    }

    #[tokio::test]
    async fn redirect_is_dropped_not_followed() {
        // `redirect.example.com`'s ip4 must never appear in the flattened
        // set: redirect= is a passthrough token, not an expansion target.
        let r = resolver_with(
            &[
                ("example.com", "v=spf1 ip4:1.1.1.1 redirect=redirect.example.com"),
                ("redirect.example.com", "v=spf1 ip4:2.2.2.2 ~all"),
            ],
            &[],
        );
        let spf = SpfResolver::new(r);
        let result = spf.flatten("example.com").await.unwrap();
        assert!(result.ips.contains(&IpEntry::v4_host("1.1.1.1".parse().unwrap())));
        assert!(!result.ips.contains(&IpEntry::v4_host("2.2.2.2".parse().unwrap())));
        assert_eq!(result.passthrough, vec!["redirect=redirect.example.com"]);
    }
}
