//! Per-record validation, used by the backup/restore engine
//! on both export and import.

use crate::model::{validate_domain_name, TxtRecord};
use std::net::{Ipv4Addr, Ipv6Addr};

/// The closed record-type allowlist accepted by export/import filters
///.
pub const RECORD_TYPES: &[&str] = &[
    "A", "AAAA", "CNAME", "MX", "TXT", "NS", "SOA", "SRV", "PTR", "CAA", "DNSKEY", "DS", "RRSIG",
    "NSEC", "NSEC3", "NSEC3PARAM",
];

/// A validation outcome: hard failures abort the operation; warnings are
/// informational and do not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Issue {
    Error(String),
    Warning(String),
}

/// Validate one record against its type-specific rules. Returns every
/// issue found; callers decide whether to abort based on `Issue::Error`
/// presence.
pub fn validate_record(record: &TxtRecord) -> Vec<Issue> {
    let mut issues = Vec::new();

    if record.name.trim().is_empty() {
        issues.push(Issue::Error("record name must not be empty".to_string()));
    }
    if record.record_type.trim().is_empty() {
        issues.push(Issue::Error("record type must not be empty".to_string()));
    }
    if record.content.trim().is_empty() {
        issues.push(Issue::Error("record content must not be empty".to_string()));
    }
    if !(1..=86_400).contains(&record.ttl) {
        issues.push(Issue::Error(format!(
            "ttl {} out of range [1, 86400]",
            record.ttl
        )));
    }

    match record.record_type.as_str() {
        "A" => {
            if record.content.parse::<Ipv4Addr>().is_err() {
                issues.push(Issue::Error(format!(
                    "A record content {:?} does not parse as IPv4",
                    record.content
                )));
            }
        }
        "AAAA" => match record.content.parse::<Ipv6Addr>() {
            Ok(addr) if addr.to_ipv4_mapped().is_some() => {
                issues.push(Issue::Error(format!(
                    "AAAA record content {:?} is an IPv4-mapped address",
                    record.content
                )));
            }
            Ok(_) => {}
            Err(_) => issues.push(Issue::Error(format!(
                "AAAA record content {:?} does not parse as IPv6",
                record.content
            ))),
        },
        "CNAME" => {
            if record.name == "@" {
                issues.push(Issue::Error("CNAME at apex is rejected".to_string()));
            }
            if let Err(e) = validate_domain_name(&record.content) {
                issues.push(Issue::Error(format!("CNAME content invalid: {e}")));
            }
        }
        "MX" => {
            match record.priority {
                Some(p) if (1..=65_535).contains(&p) => {}
                _ => issues.push(Issue::Error(format!(
                    "MX priority {:?} out of range [1, 65535]",
                    record.priority
                ))),
            }
            if let Err(e) = validate_domain_name(&record.content) {
                issues.push(Issue::Error(format!("MX content invalid: {e}")));
            }
        }
        "TXT" => {
            if record.content.len() > 255 {
                issues.push(Issue::Warning(format!(
                    "TXT content length {} exceeds 255 octets",
                    record.content.len()
                )));
            }
            if record.content.starts_with("v=spf1") {
                let has_terminal_all = record.content.contains("~all")
                    || record.content.contains("-all")
                    || record.content.contains("+all")
                    || record.content.contains("?all");
                if record.content.contains("include:") && !has_terminal_all {
                    issues.push(Issue::Warning(
                        "SPF record includes another domain but lacks a terminal all qualifier"
                            .to_string(),
                    ));
                }
                if record.content.len() > 450 {
                    issues.push(Issue::Warning(format!(
                        "SPF record length {} exceeds 450 octets",
                        record.content.len()
                    )));
                }
            }
        }
        "NS" | "PTR" => {
            if let Err(e) = validate_domain_name(&record.content) {
                issues.push(Issue::Error(format!(
                    "{} content invalid: {e}",
                    record.record_type
                )));
            }
        }
        "SOA" => validate_soa(&record.content, &mut issues),
        "SRV" => validate_srv(&record.content, &mut issues),
        "CAA" => validate_caa(&record.content, &mut issues),
        _ => {}
    }

    issues
}

fn validate_soa(content: &str, issues: &mut Vec<Issue>) {
    let fields: Vec<&str> = content.split_whitespace().collect();
    if fields.len() != 7 {
        issues.push(Issue::Error(format!(
            "SOA content must have exactly 7 fields, found {}",
            fields.len()
        )));
        return;
    }
    if let Err(e) = validate_domain_name(fields[0]) {
        issues.push(Issue::Error(format!("SOA mname invalid: {e}")));
    }
    if !is_user_dot_domain(fields[1]) {
        issues.push(Issue::Error(format!(
            "SOA rname {:?} is not a valid user.domain form",
            fields[1]
        )));
    }
    for (i, field) in fields.iter().enumerate().skip(2) {
        if field.parse::<u32>().is_err() {
            issues.push(Issue::Error(format!(
                "SOA field {} ({:?}) must be a 32-bit integer",
                i + 1,
                field
            )));
        }
    }
}

fn is_user_dot_domain(value: &str) -> bool {
    match value.split_once('.') {
        Some((user, domain)) => !user.is_empty() && validate_domain_name(domain).is_ok(),
        None => false,
    }
}

fn validate_srv(content: &str, issues: &mut Vec<Issue>) {
    let fields: Vec<&str> = content.split_whitespace().collect();
    if fields.len() != 4 {
        issues.push(Issue::Error(format!(
            "SRV content must have exactly 4 fields, found {}",
            fields.len()
        )));
        return;
    }
    for (i, field) in fields.iter().enumerate().take(3) {
        match field.parse::<u32>() {
            Ok(n) if n <= 65_535 => {}
            _ => issues.push(Issue::Error(format!(
                "SRV field {} ({:?}) must be in 0-65535",
                i + 1,
                field
            ))),
        }
    }
    if let Err(e) = validate_domain_name(fields[3]) {
        issues.push(Issue::Error(format!("SRV target invalid: {e}")));
    }
}

fn validate_caa(content: &str, issues: &mut Vec<Issue>) {
    let fields: Vec<&str> = content.split_whitespace().collect();
    if fields.len() != 3 {
        issues.push(Issue::Error(format!(
            "CAA content must have exactly 3 fields, found {}",
            fields.len()
        )));
        return;
    }
    if !matches!(fields[1], "issue" | "issuewild" | "iodef") {
        issues.push(Issue::Error(format!(
            "CAA tag {:?} must be one of issue, issuewild, iodef",
            fields[1]
        )));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(record_type: &str, name: &str, content: &str) -> TxtRecord {
        TxtRecord {
            id: "1".to_string(),
            name: name.to_string(),
            record_type: record_type.to_string(),
            content: content.to_string(),
            ttl: 600,
            priority: None,
            notes: None,
        }
    }

    #[test]
    fn valid_a_record_passes() {
        assert!(validate_record(&record("A", "host", "1.2.3.4")).is_empty());
    }

    #[test]
    fn invalid_a_record_content_fails() {
        let issues = validate_record(&record("A", "host", "not-an-ip"));
        assert!(issues.iter().any(|i| matches!(i, Issue::Error(_))));
    }

    #[test]
    fn ipv4_mapped_aaaa_is_rejected() {
        let issues = validate_record(&record("AAAA", "host", "::ffff:1.2.3.4"));
        assert!(issues.iter().any(|i| matches!(i, Issue::Error(_))));
    }

    #[test]
    fn cname_at_apex_is_rejected() {
        let issues = validate_record(&record("CNAME", "@", "target.example.com"));
        assert!(issues
            .iter()
            .any(|i| matches!(i, Issue::Error(msg) if msg.contains("apex"))));
    }

    #[test]
    fn mx_requires_priority_in_range() {
        let mut r = record("MX", "@", "mail.example.com");
        r.priority = Some(70_000);
        let issues = validate_record(&r);
        assert!(issues.iter().any(|i| matches!(i, Issue::Error(_))));
    }

    #[test]
    fn txt_oversized_content_warns_not_errors() {
        let issues = validate_record(&record("TXT", "@", &"a".repeat(300)));
        assert_eq!(issues, vec![Issue::Warning(
            "TXT content length 300 exceeds 255 octets".to_string()
        )]);
    }

    #[test]
    fn spf_include_without_terminal_all_warns() {
        let issues = validate_record(&record(
            "TXT",
            "@",
            "v=spf1 include:_spf.example.com",
        ));
        assert!(issues
            .iter()
            .any(|i| matches!(i, Issue::Warning(msg) if msg.contains("terminal all"))));
    }

    #[test]
    fn soa_requires_seven_fields() {
        let issues = validate_record(&record("SOA", "@", "ns1.example.com admin.example.com 1"));
        assert!(issues.iter().any(|i| matches!(i, Issue::Error(_))));
    }

    #[test]
    fn valid_soa_passes() {
        let issues = validate_record(&record(
            "SOA",
            "@",
            "ns1.example.com admin.example.com 2024010100 7200 3600 1209600 300",
        ));
        assert!(issues.is_empty());
    }

    #[test]
    fn srv_requires_four_fields() {
        let issues = validate_record(&record("SRV", "@", "10 5 5060"));
        assert!(issues.iter().any(|i| matches!(i, Issue::Error(_))));
    }

    #[test]
    fn caa_tag_must_be_known() {
        let issues = validate_record(&record("CAA", "@", "0 unknown letsencrypt.org"));
        assert!(issues.iter().any(|i| matches!(i, Issue::Error(_))));
    }

    #[test]
    fn ttl_out_of_range_fails() {
        let mut r = record("A", "host", "1.2.3.4");
        r.ttl = 0;
        let issues = validate_record(&r);
        assert!(issues.iter().any(|i| matches!(i, Issue::Error(_))));
    }
}
