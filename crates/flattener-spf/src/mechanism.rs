//! SPF mechanism model: the tagged variant over `v=spf1`,
//! `include:`, `a[:target]`, `mx[:target]`, `ip4:`/`ip6:`, `ptr` (ignored),
//! `exists:`, `redirect=`, `exp=`, and the terminal `all` qualifier.

use flattener_common::model::IpEntry;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// The `all` mechanism's qualifier prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qualifier {
    Pass,     // +
    Fail,     // -
    SoftFail, // ~
    Neutral,  // ?
}

impl Qualifier {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Qualifier::Pass),
            '-' => Some(Qualifier::Fail),
            '~' => Some(Qualifier::SoftFail),
            '?' => Some(Qualifier::Neutral),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Qualifier::Pass => "+",
            Qualifier::Fail => "-",
            Qualifier::SoftFail => "~",
            Qualifier::Neutral => "?",
        }
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One parsed term of an SPF record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mechanism {
    Version,
    Include(String),
    A(Option<String>),
    Mx(Option<String>),
    Ip4(Ipv4Addr, u8),
    Ip6(Ipv6Addr, u8),
    Ptr,
    Exists(String),
    Redirect(String),
    Exp(String),
    All(Qualifier),
    /// Unknown token, preserved verbatim but never sorted.
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(pub String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for ParseError {}

/// Parse a full `v=spf1 ...` record into its terms, in order.
pub fn parse_record(text: &str) -> Result<Vec<Mechanism>, ParseError> {
    let rest = text
        .strip_prefix("v=spf1")
        .ok_or_else(|| ParseError(format!("missing v=spf1 prefix: {text:?}")))?;

    let mut terms = vec![Mechanism::Version];
    for token in rest.split_whitespace() {
        terms.push(parse_term(token)?);
    }
    Ok(terms)
}

fn parse_term(token: &str) -> Result<Mechanism, ParseError> {
    if token == "all" {
        return Ok(Mechanism::All(Qualifier::Pass));
    }
    let mut chars = token.chars();
    if let Some(first) = chars.next() {
        if let Some(q) = Qualifier::from_char(first) {
            let rest = &token[1..];
            if rest == "all" {
                return Ok(Mechanism::All(q));
            }
        }
    }

    if token == "ptr" || token.starts_with("ptr:") {
        return Ok(Mechanism::Ptr);
    }
    if token == "a" {
        return Ok(Mechanism::A(None));
    }
    if let Some(target) = token.strip_prefix("a:") {
        return Ok(Mechanism::A(Some(target.to_string())));
    }
    if token == "mx" {
        return Ok(Mechanism::Mx(None));
    }
    if let Some(target) = token.strip_prefix("mx:") {
        return Ok(Mechanism::Mx(Some(target.to_string())));
    }
    if let Some(target) = token.strip_prefix("include:") {
        return Ok(Mechanism::Include(target.to_string()));
    }
    if let Some(target) = token.strip_prefix("exists:") {
        return Ok(Mechanism::Exists(target.to_string()));
    }
    if let Some(target) = token.strip_prefix("redirect=") {
        return Ok(Mechanism::Redirect(target.to_string()));
    }
    if let Some(target) = token.strip_prefix("exp=") {
        return Ok(Mechanism::Exp(target.to_string()));
    }
    if let Some(value) = token.strip_prefix("ip4:") {
        let (addr, prefix) = parse_ip4(value)?;
        return Ok(Mechanism::Ip4(addr, prefix));
    }
    if let Some(value) = token.strip_prefix("ip6:") {
        let (addr, prefix) = parse_ip6(value)?;
        return Ok(Mechanism::Ip6(addr, prefix));
    }

    Ok(Mechanism::Unknown(token.to_string()))
}

fn parse_ip4(value: &str) -> Result<(Ipv4Addr, u8), ParseError> {
    match value.split_once('/') {
        Some((addr, prefix)) => {
            let addr: Ipv4Addr = addr
                .parse()
                .map_err(|_| ParseError(format!("invalid ip4 address: {addr}")))?;
            let prefix: u8 = prefix
                .parse()
                .map_err(|_| ParseError(format!("invalid ip4 prefix: {prefix}")))?;
            if prefix > 32 {
                return Err(ParseError(format!("ip4 prefix out of range: {prefix}")));
            }
            Ok((addr, prefix))
        }
        None => {
            let addr: Ipv4Addr = value
                .parse()
                .map_err(|_| ParseError(format!("invalid ip4 address: {value}")))?;
            Ok((addr, 32))
        }
    }
}

fn parse_ip6(value: &str) -> Result<(Ipv6Addr, u8), ParseError> {
    match value.split_once('/') {
        Some((addr, prefix)) => {
            let addr: Ipv6Addr = addr
                .parse()
                .map_err(|_| ParseError(format!("invalid ip6 address: {addr}")))?;
            let prefix: u8 = prefix
                .parse()
                .map_err(|_| ParseError(format!("invalid ip6 prefix: {prefix}")))?;
            if prefix > 128 {
                return Err(ParseError(format!("ip6 prefix out of range: {prefix}")));
            }
            Ok((addr, prefix))
        }
        None => {
            let addr: Ipv6Addr = value
                .parse()
                .map_err(|_| ParseError(format!("invalid ip6 address: {value}")))?;
            Ok((addr, 128))
        }
    }
}

impl Mechanism {
    pub fn as_ip_entry(&self) -> Option<IpEntry> {
        match *self {
            Mechanism::Ip4(addr, prefix) => Some(IpEntry::V4 { addr, prefix }),
            Mechanism::Ip6(addr, prefix) => Some(IpEntry::V6 { addr, prefix }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_include_record() {
        let terms = parse_record("v=spf1 include:_spf.google.com ~all").unwrap();
        assert_eq!(terms.len(), 3);
        assert_eq!(terms[0], Mechanism::Version);
        assert_eq!(terms[1], Mechanism::Include("_spf.google.com".into()));
        assert_eq!(terms[2], Mechanism::All(Qualifier::SoftFail));
    }

    #[test]
    fn parses_bare_and_cidr_ip4() {
        let terms = parse_record("v=spf1 ip4:8.8.8.8 ip4:192.0.2.0/24 -all").unwrap();
        assert_eq!(terms[1], Mechanism::Ip4("8.8.8.8".parse().unwrap(), 32));
        assert_eq!(terms[2], Mechanism::Ip4("192.0.2.0".parse().unwrap(), 24));
        assert_eq!(terms[3], Mechanism::All(Qualifier::Fail));
    }

    #[test]
    fn rejects_missing_version_prefix() {
        assert!(parse_record("include:_spf.google.com ~all").is_err());
    }

    #[test]
    fn preserves_unknown_tokens() {
        let terms = parse_record("v=spf1 ip4:1.2.3.4 unknown-token ~all").unwrap();
        assert_eq!(terms[2], Mechanism::Unknown("unknown-token".into()));
    }

    #[test]
    fn drops_ptr_marker_is_preserved_for_caller_to_ignore() {
        let terms = parse_record("v=spf1 ptr ~all").unwrap();
        assert_eq!(terms[1], Mechanism::Ptr);
    }
}
