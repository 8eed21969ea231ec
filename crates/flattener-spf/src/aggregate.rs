//! CIDR Aggregator: exact, alignment-safe range-merging
//! over IPv4 and IPv6 with preservation and policy-downgrade rules.

use flattener_common::model::IpEntry;
use std::collections::BTreeSet;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Memory bound: refuse to expand networks broader than this for
/// comparison/downgrade purposes.
const V4_MIN_EXPANSION_PREFIX: u8 = 16; // > 65,536 hosts refused
const V6_MIN_EXPANSION_PREFIX: u8 = 118; // > 1,024 hosts refused

/// Policy knobs applied after aggregation.
#[derive(Debug, Clone, Copy)]
pub struct AggregationPolicy {
    pub v4_max_prefix: u8,
    pub v6_max_prefix: u8,
}

impl AggregationPolicy {
    /// The internal default for the unrestricted flatten path: any
    /// aggregation is allowed.
    pub fn unrestricted() -> Self {
        Self {
            v4_max_prefix: 1,
            v6_max_prefix: 1,
        }
    }
}

impl Default for AggregationPolicy {
    fn default() -> Self {
        Self {
            v4_max_prefix: 24,
            v6_max_prefix: 64,
        }
    }
}

/// Aggregate a set of IP mechanisms into a minimal, semantically-identical
/// set of CIDR blocks plus any passthrough non-IP mechanisms (passed
/// through unchanged by the caller — this function only sees IP entries).
///
/// `preserve`: addresses that must never appear inside a produced CIDR;
/// they are excluded from aggregation and appended individually.
pub fn aggregate(
    entries: &BTreeSet<IpEntry>,
    policy: AggregationPolicy,
    preserve: &BTreeSet<IpEntry>,
) -> Vec<IpEntry> {
    // Separation step: existing CIDR blocks are never expanded.
    let mut v4_hosts: Vec<u32> = Vec::new();
    let mut v4_blocks: Vec<IpEntry> = Vec::new();
    let mut v6_hosts: Vec<u128> = Vec::new();
    let mut v6_blocks: Vec<IpEntry> = Vec::new();
    let mut preserved_out: Vec<IpEntry> = Vec::new();

    for entry in entries {
        if preserve.contains(entry) {
            preserved_out.push(*entry);
            continue;
        }
        match *entry {
            IpEntry::V4 { addr, prefix: 32 } => v4_hosts.push(u32::from(addr)),
            IpEntry::V4 { .. } => v4_blocks.push(*entry),
            IpEntry::V6 { addr, prefix: 128 } => v6_hosts.push(u128::from(addr)),
            IpEntry::V6 { .. } => v6_blocks.push(*entry),
        }
    }

    let mut out = Vec::new();
    out.extend(v4_blocks);
    out.extend(aggregate_v4(&v4_hosts, policy.v4_max_prefix));
    out.extend(v6_blocks);
    out.extend(aggregate_v6(&v6_hosts, policy.v6_max_prefix));
    out.extend(preserved_out);
    out.sort();
    out.dedup();
    out
}

fn aggregate_v4(hosts: &[u32], max_prefix: u8) -> Vec<IpEntry> {
    let mut sorted: Vec<u32> = hosts.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut out = Vec::new();
    let mut i = 0;
    while i < sorted.len() {
        let start = sorted[i];
        let mut end = start;
        let mut j = i + 1;
        while j < sorted.len() && sorted[j] == end + 1 {
            end = sorted[j];
            j += 1;
        }
        out.extend(emit_v4_run(start, end, max_prefix));
        i = j;
    }
    out
}

fn emit_v4_run(start: u32, end: u32, max_prefix: u8) -> Vec<IpEntry> {
    let mut out = Vec::new();
    let mut cur = start;
    while cur <= end {
        let remaining = (end - cur + 1) as u64;
        let mut size = largest_aligned_power_of_two(cur, remaining, 32);
        let mut prefix = 32 - size.trailing_zeros() as u8;
        if prefix < max_prefix {
            // Policy downgrade: re-expand into max_prefix-sized blocks
            // (or individual hosts if the block itself is a single host).
            size = 1u64 << (32 - max_prefix);
            prefix = max_prefix;
        }
        if size == 1 {
            out.push(IpEntry::v4_host(Ipv4Addr::from(cur)));
        } else {
            out.push(IpEntry::V4 {
                addr: Ipv4Addr::from(cur),
                prefix,
            });
        }
        // guard against overflow when cur + size wraps past u32::MAX
        match cur.checked_add(size as u32) {
            Some(next) => cur = next,
            None => break,
        }
    }
    out
}

fn aggregate_v6(hosts: &[u128], max_prefix: u8) -> Vec<IpEntry> {
    let mut sorted: Vec<u128> = hosts.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut out = Vec::new();
    let mut i = 0;
    while i < sorted.len() {
        let start = sorted[i];
        let mut end = start;
        let mut j = i + 1;
        while j < sorted.len() && sorted[j] == end + 1 {
            end = sorted[j];
            j += 1;
        }
        out.extend(emit_v6_run(start, end, max_prefix));
        i = j;
    }
    out
}

fn emit_v6_run(start: u128, end: u128, max_prefix: u8) -> Vec<IpEntry> {
    let mut out = Vec::new();
    let mut cur = start;
    while cur <= end {
        let remaining = end - cur + 1;
        let mut size = largest_aligned_power_of_two_128(cur, remaining, 128);
        let mut prefix = 128 - size.trailing_zeros() as u8;
        if prefix < max_prefix {
            size = 1u128 << (128 - max_prefix);
            prefix = max_prefix;
        }
        if size == 1 {
            out.push(IpEntry::v6_host(Ipv6Addr::from(cur)));
        } else {
            out.push(IpEntry::V6 {
                addr: Ipv6Addr::from(cur),
                prefix,
            });
        }
        match cur.checked_add(size) {
            Some(next) => cur = next,
            None => break,
        }
    }
    out
}

/// Largest power-of-two `size` such that `size <= remaining` and
/// `start % size == 0`.
fn largest_aligned_power_of_two(start: u32, remaining: u64, bits: u32) -> u64 {
    let max_by_remaining = if remaining == 0 {
        1
    } else {
        let floor_log2_remaining = u64::BITS - 1 - remaining.leading_zeros();
        1u64 << floor_log2_remaining.min(bits - 1)
    };
    let mut size = max_by_remaining.min(1u64 << bits);
    while size > 1 && (start as u64) % size != 0 {
        size /= 2;
    }
    size.max(1)
}

fn largest_aligned_power_of_two_128(start: u128, remaining: u128, bits: u32) -> u128 {
    let mut size: u128 = 1;
    while size * 2 <= remaining && size * 2 <= (1u128 << (bits - 1)) {
        size *= 2;
    }
    while size > 1 && start % size != 0 {
        size /= 2;
    }
    size.max(1)
}

/// Expand a CIDR block (or bare host) into its constituent /32 or /128
/// hosts, refusing oversized ranges per the memory bound above.
pub fn expand(entry: &IpEntry) -> Result<Vec<IpEntry>, String> {
    match *entry {
        IpEntry::V4 { addr, prefix } => {
            if prefix < V4_MIN_EXPANSION_PREFIX {
                return Err(format!(
                    "refusing to expand /{prefix} IPv4 network (> 65,536 hosts)"
                ));
            }
            let base = u32::from(addr);
            let size = 1u32 << (32 - prefix);
            Ok((0..size)
                .map(|i| IpEntry::v4_host(Ipv4Addr::from(base.wrapping_add(i))))
                .collect())
        }
        IpEntry::V6 { addr, prefix } => {
            if prefix < V6_MIN_EXPANSION_PREFIX {
                return Err(format!(
                    "refusing to expand /{prefix} IPv6 network (> 1,024 hosts)"
                ));
            }
            let base = u128::from(addr);
            let size = 1u128 << (128 - prefix);
            Ok((0..size)
                .map(|i| IpEntry::v6_host(Ipv6Addr::from(base.wrapping_add(i))))
                .collect())
        }
    }
}

/// The semantic-equivalence oracle: two IP mechanism sets
/// authorize the same union of addresses. For small sets, direct
/// expand-and-compare; for larger sets, re-aggregate both sides with the
/// unrestricted policy and compare canonical CIDR sequences.
pub fn semantically_equal(a: &BTreeSet<IpEntry>, b: &BTreeSet<IpEntry>) -> bool {
    if a == b {
        return true;
    }
    let total = a.len() + b.len();
    if total <= 1_000 {
        let expand_all = |set: &BTreeSet<IpEntry>| -> Option<BTreeSet<IpEntry>> {
            let mut out = BTreeSet::new();
            for entry in set {
                out.extend(expand(entry).ok()?);
            }
            Some(out)
        };
        if let (Some(ea), Some(eb)) = (expand_all(a), expand_all(b)) {
            return ea == eb;
        }
    }
    let canon_a = aggregate(a, AggregationPolicy::unrestricted(), &BTreeSet::new());
    let canon_b = aggregate(b, AggregationPolicy::unrestricted(), &BTreeSet::new());
    canon_a == canon_b
}
