//! Rebuilds the "current aggregate": walks
//! `include:` chains among already-fetched provider records, following
//! only managed `spfN.<domain>` continuations, and concatenates the
//! non-include mechanisms it finds along the way.

use flattener_common::model::{continuation_index, continuation_name, is_apex, TxtRecord};
use flattener_spf::{mechanism::Mechanism, parse_record, Qualifier};
use std::collections::{BTreeSet, HashSet};

pub struct CurrentAggregate {
    pub ips: BTreeSet<flattener_common::model::IpEntry>,
    pub passthrough: Vec<String>,
    /// The currently-live apex record's terminal qualifier, so the
    /// comparison step can detect a qualifier-only change.
    pub qualifier: Qualifier,
}

pub fn rebuild_current(records: &[TxtRecord], domain: &str) -> CurrentAggregate {
    let mut out = CurrentAggregate {
        ips: BTreeSet::new(),
        passthrough: Vec::new(),
        qualifier: Qualifier::SoftFail,
    };
    let apex = records
        .iter()
        .find(|r| r.record_type == "TXT" && is_apex(&r.name, domain) && r.content.starts_with("v=spf1"));

    if let Some(apex) = apex {
        if let Ok(terms) = parse_record(&apex.content) {
            if let Some(Mechanism::All(q)) = terms.iter().find(|t| matches!(t, Mechanism::All(_))) {
                out.qualifier = *q;
            }
        }
        let mut visited = HashSet::new();
        walk(apex, records, domain, &mut out, &mut visited);
    }
    out
}

fn walk(
    record: &TxtRecord,
    records: &[TxtRecord],
    domain: &str,
    out: &mut CurrentAggregate,
    visited: &mut HashSet<u32>,
) {
    let Ok(terms) = parse_record(&record.content) else {
        return;
    };
    for term in &terms {
        match term {
            Mechanism::Include(target) => {
                let Some(n) = continuation_index(target, domain) else {
                    // Not one of our own continuations; ignore, since we
                    // only rebuild the portion of state this engine owns.
                    continue;
                };
                if !visited.insert(n) {
                    continue;
                }
                let name = continuation_name(n, domain);
                if let Some(next) = records
                    .iter()
                    .find(|r| r.record_type == "TXT" && r.name == name)
                {
                    walk(next, records, domain, out, visited);
                }
            }
            Mechanism::Ip4(addr, prefix) => {
                out.ips.insert(flattener_common::model::IpEntry::V4 {
                    addr: *addr,
                    prefix: *prefix,
                });
            }
            Mechanism::Ip6(addr, prefix) => {
                out.ips.insert(flattener_common::model::IpEntry::V6 {
                    addr: *addr,
                    prefix: *prefix,
                });
            }
            Mechanism::Exists(target) => out.passthrough.push(format!("exists:{target}")),
            Mechanism::Exp(target) => out.passthrough.push(format!("exp={target}")),
            Mechanism::Unknown(token) => out.passthrough.push(token.clone()),
            _ => {}
        }
    }
}
