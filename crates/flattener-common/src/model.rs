//! Shared domain-model types that more than one component
//! needs: IP entries, provider-side TXT records, and managed-name rules.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// A single authorized address or block, tagged by family. A bare host is
/// `prefix = 32`/`128` and is serialized without a slash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IpEntry {
    V4 { addr: Ipv4Addr, prefix: u8 },
    V6 { addr: Ipv6Addr, prefix: u8 },
}

impl IpEntry {
    pub fn v4_host(addr: Ipv4Addr) -> Self {
        IpEntry::V4 { addr, prefix: 32 }
    }

    pub fn v6_host(addr: Ipv6Addr) -> Self {
        IpEntry::V6 { addr, prefix: 128 }
    }

    pub fn is_host(&self) -> bool {
        match self {
            IpEntry::V4 { prefix, .. } => *prefix == 32,
            IpEntry::V6 { prefix, .. } => *prefix == 128,
        }
    }

    /// Render as an `ip4:`/`ip6:` mechanism token, bare for single hosts.
    pub fn to_mechanism(self) -> String {
        match self {
            IpEntry::V4 { addr, prefix } if prefix == 32 => format!("ip4:{addr}"),
            IpEntry::V4 { addr, prefix } => format!("ip4:{addr}/{prefix}"),
            IpEntry::V6 { addr, prefix } if prefix == 128 => format!("ip6:{addr}"),
            IpEntry::V6 { addr, prefix } => format!("ip6:{addr}/{prefix}"),
        }
    }
}

impl fmt::Display for IpEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_mechanism())
    }
}

/// A TXT record as represented by a DNS provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxtRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub content: String,
    pub ttl: u32,
    pub priority: Option<u16>,
    pub notes: Option<String>,
}

/// Normalize a provider-returned record name: strip the trailing dot and
/// map `name == domain` to `"@"`.
pub fn normalize_record_name(name: &str, domain: &str) -> String {
    let trimmed = name.trim_end_matches('.');
    if trimmed.eq_ignore_ascii_case(domain) {
        "@".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Whether `name` is the apex for `domain` ("@" or the bare domain).
pub fn is_apex(name: &str, domain: &str) -> bool {
    name == "@" || name.trim_end_matches('.').eq_ignore_ascii_case(domain)
}

/// If `name` is a managed continuation `spfN.<domain>`, return `N`.
pub fn continuation_index(name: &str, domain: &str) -> Option<u32> {
    let suffix = format!(".{domain}");
    let prefix = name.strip_suffix(&suffix)?;
    let n = prefix.strip_prefix("spf")?;
    n.parse::<u32>().ok()
}

/// The name of a continuation record at index `n`.
pub fn continuation_name(n: u32, domain: &str) -> String {
    format!("spf{n}.{domain}")
}

/// FQDN-to-hostname normalization used by the backup/restore engine
///: `<host>.<domain>` becomes `<host>`, and the bare
/// `<domain>` becomes `@`. Unlike [`normalize_record_name`], this strips
/// the domain suffix from subdomains rather than leaving them untouched.
pub fn fqdn_to_hostname(name: &str, domain: &str) -> String {
    let trimmed = name.trim_end_matches('.');
    if trimmed.eq_ignore_ascii_case(domain) || trimmed == "@" {
        return "@".to_string();
    }
    let suffix = format!(".{domain}");
    trimmed
        .strip_suffix(suffix.as_str())
        .unwrap_or(trimmed)
        .to_string()
}

/// The never-deleted alternative source record name.
pub fn unflat_source_name(domain: &str) -> String {
    format!("spf-unflat.{domain}")
}

/// Whether a provider record is "managed" by this engine: the apex TXT
/// containing `v=spf1`, or any `spfN.<domain>` TXT.
pub fn is_managed(record: &TxtRecord, domain: &str) -> bool {
    if record.record_type != "TXT" {
        return false;
    }
    if is_apex(&record.name, domain) {
        return record.content.starts_with("v=spf1");
    }
    continuation_index(&record.name, domain).is_some()
}

/// Parse a `preserve_ips` config entry: a bare address or
/// a CIDR block, either family. Accepts the same syntax as `ipnet`'s
/// `IpNet` so operators can copy addresses straight out of an existing
/// SPF record.
pub fn parse_ip_entry(text: &str) -> Result<IpEntry, String> {
    if let Ok(net) = text.parse::<ipnet::IpNet>() {
        return Ok(match net {
            ipnet::IpNet::V4(n) => IpEntry::V4 {
                addr: n.addr(),
                prefix: n.prefix_len(),
            },
            ipnet::IpNet::V6(n) => IpEntry::V6 {
                addr: n.addr(),
                prefix: n.prefix_len(),
            },
        });
    }
    match text.parse::<Ipv4Addr>() {
        Ok(addr) => return Ok(IpEntry::v4_host(addr)),
        Err(_) => {}
    }
    match text.parse::<Ipv6Addr>() {
        Ok(addr) => Ok(IpEntry::v6_host(addr)),
        Err(_) => Err(format!("invalid address or CIDR block: {text:?}")),
    }
}

/// RFC 1035/1123 domain-name validation, with the `_`-prefixed DNS service
/// label extension (`_dmarc`, `_acme-challenge`, ...) allowed.
pub fn validate_domain_name(name: &str) -> Result<(), String> {
    let trimmed = name.trim_end_matches('.');
    if trimmed.is_empty() || trimmed.len() > 253 {
        return Err(format!("domain name length out of range: {}", trimmed.len()));
    }
    for label in trimmed.split('.') {
        validate_label(label)?;
    }
    Ok(())
}

fn validate_label(label: &str) -> Result<(), String> {
    if label.is_empty() || label.len() > 63 {
        return Err(format!("invalid label length: {label:?}"));
    }
    if let Some(rest) = label.strip_prefix('_') {
        if rest.is_empty() {
            return Err(format!("invalid DNS service label: {label:?}"));
        }
        if !rest
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(format!("invalid characters in service label: {label:?}"));
        }
        return Ok(());
    }
    let chars: Vec<char> = label.chars().collect();
    let first = chars[0];
    let last = *chars.last().unwrap();
    if !first.is_ascii_alphanumeric() || !last.is_ascii_alphanumeric() {
        return Err(format!("label must start/end alphanumeric: {label:?}"));
    }
    if !chars.iter().all(|c| c.is_ascii_alphanumeric() || *c == '-') {
        return Err(format!("invalid characters in label: {label:?}"));
    }
    Ok(())
}
