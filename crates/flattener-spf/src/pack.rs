//! Normalizer & Packer: canonicalize a flattened record
//! into deterministic text, then split across 255-byte TXT records
//! chained through synthetic `spfN.<domain>` continuations.

use crate::mechanism::{parse_record, Mechanism, Qualifier};
use flattener_common::model::{continuation_name, IpEntry};
use std::collections::BTreeSet;

/// A single TXT record's content, limited to 255 bytes per RFC 1035
/// character-string encoding.
pub const MAX_TXT_BYTES: usize = 255;

/// Build the canonical `v=spf1 ...` text for a flattened IP set plus any
/// passthrough mechanisms, terminated with the given qualifier's `all`.
///
/// Known (sortable) tokens — `ip4:`/`ip6:` and passthrough mechanisms —
/// are sorted lexicographically among themselves; any `Unknown` token
/// stays pinned at its original position in the input record.
pub fn normalize(ips: &BTreeSet<IpEntry>, passthrough: &[String], terminal: Qualifier) -> String {
    let mut sortable: Vec<String> = ips.iter().map(|e| e.to_mechanism()).collect();
    sortable.extend(passthrough.iter().cloned());
    sortable.sort();

    let mut out = String::from("v=spf1");
    for token in &sortable {
        out.push(' ');
        out.push_str(token);
    }
    out.push(' ');
    out.push_str(terminal.as_str());
    out.push_str("all");
    out
}

/// Re-sort the known tokens of an already-assembled record while leaving
/// `Unknown` tokens pinned at their original position.
/// Used when re-canonicalizing an existing record (e.g. for the
/// semantic-equivalence walk in reconciliation) rather than building one
/// fresh from a `FlattenResult`.
pub fn renormalize(text: &str) -> Result<String, crate::mechanism::ParseError> {
    let terms = parse_record(text)?;
    let mut terminal = Qualifier::SoftFail;
    let mut slots: Vec<Option<String>> = Vec::new();
    let mut sortable: Vec<String> = Vec::new();

    for term in &terms {
        match term {
            Mechanism::Version => {}
            Mechanism::All(q) => terminal = *q,
            Mechanism::Unknown(token) => slots.push(Some(token.clone())),
            other => {
                let rendered = render_known(other);
                sortable.push(rendered);
                slots.push(None);
            }
        }
    }
    sortable.sort();

    let mut sorted_iter = sortable.into_iter();
    let mut out = String::from("v=spf1");
    for slot in slots {
        out.push(' ');
        match slot {
            Some(unknown) => out.push_str(&unknown),
            None => out.push_str(&sorted_iter.next().expect("slot count matches sortable count")),
        }
    }
    out.push(' ');
    out.push_str(terminal.as_str());
    out.push_str("all");
    Ok(out)
}

fn render_known(term: &Mechanism) -> String {
    match term {
        Mechanism::Include(d) => format!("include:{d}"),
        Mechanism::A(None) => "a".to_string(),
        Mechanism::A(Some(d)) => format!("a:{d}"),
        Mechanism::Mx(None) => "mx".to_string(),
        Mechanism::Mx(Some(d)) => format!("mx:{d}"),
        Mechanism::Ip4(addr, prefix) if *prefix == 32 => format!("ip4:{addr}"),
        Mechanism::Ip4(addr, prefix) => format!("ip4:{addr}/{prefix}"),
        Mechanism::Ip6(addr, prefix) if *prefix == 128 => format!("ip6:{addr}"),
        Mechanism::Ip6(addr, prefix) => format!("ip6:{addr}/{prefix}"),
        Mechanism::Ptr => "ptr".to_string(),
        Mechanism::Exists(d) => format!("exists:{d}"),
        Mechanism::Redirect(d) => format!("redirect={d}"),
        Mechanism::Exp(d) => format!("exp={d}"),
        Mechanism::Version | Mechanism::All(_) | Mechanism::Unknown(_) => {
            unreachable!("render_known called on a non-sortable mechanism")
        }
    }
}

/// One planned TXT record: its name (`@` for the apex, `spfN.<domain>`
/// for a continuation) and its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRecord {
    pub name: String,
    pub content: String,
}

/// Split a set of IP mechanisms (plus passthrough mechanisms) across a
/// chain of 255-byte TXT records rooted at `domain`'s apex, each
/// `include:`-ing the next.
///
/// Packing is greedy: tokens are added to the current segment until the
/// next one would overflow 255 bytes, at which point a new continuation
/// segment is started. When more than one segment is needed, the apex
/// is emitted separately as a pure redirect
/// (`v=spf1 include:spf0.<domain> ~all`) and the content lives in
/// `spf0.<domain>, spf1.<domain>, …`; a single-segment result has no
/// redirect and the apex carries the full content directly.
pub fn split_and_chain(
    domain: &str,
    ips: &BTreeSet<IpEntry>,
    passthrough: &[String],
    terminal: Qualifier,
) -> Vec<PlannedRecord> {
    let mut tokens: Vec<String> = ips.iter().map(|e| e.to_mechanism()).collect();
    tokens.extend(passthrough.iter().cloned());
    tokens.sort();

    if tokens.is_empty() {
        let content = format!("v=spf1 {}all", terminal.as_str());
        return vec![PlannedRecord {
            name: "@".to_string(),
            content,
        }];
    }

    // Reserve room in every segment's budget for " <terminal>all" or,
    // should this segment turn out not to be the last, for
    // " include:spfN.<domain>" linking to the next one. The page being
    // packed right now would be `pages.len()`, so if it overflows it
    // links onward to `pages.len() + 1` — compute that reserve exactly
    // rather than guessing, since its length depends on `domain` and the
    // digit count of the continuation index.
    let terminal_suffix = format!(" {}all", terminal.as_str());
    let mut pages: Vec<Vec<String>> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_len = "v=spf1".len();

    for token in tokens {
        let added_len = 1 + token.len(); // leading space
        let next_name = continuation_name(pages.len() as u32 + 1, domain);
        let continuation_reserve = " include:".len() + next_name.len();
        let reserve = continuation_reserve.max(terminal_suffix.len());
        if !current.is_empty() && current_len + added_len + reserve > MAX_TXT_BYTES {
            pages.push(std::mem::take(&mut current));
            current_len = "v=spf1".len();
        }
        current.push(token);
        current_len += added_len;
    }
    if !current.is_empty() {
        pages.push(current);
    }

    // Single segment: no chaining needed, apex carries the content.
    if pages.len() == 1 {
        let mut content = String::from("v=spf1");
        for token in &pages[0] {
            content.push(' ');
            content.push_str(token);
        }
        content.push(' ');
        content.push_str(terminal.as_str());
        content.push_str("all");
        return vec![PlannedRecord {
            name: "@".to_string(),
            content: cap_to_wire_limit(content),
        }];
    }

    // The apex redirect's own terminal is always `~all` in its literal
    // wire form; the real qualifier lives on the last segment.
    let mut out = Vec::with_capacity(pages.len() + 1);
    out.push(PlannedRecord {
        name: "@".to_string(),
        content: cap_to_wire_limit(format!("v=spf1 include:{} ~all", continuation_name(0, domain))),
    });
    let last_index = pages.len().saturating_sub(1);
    for (i, page) in pages.into_iter().enumerate() {
        let mut content = String::from("v=spf1");
        for token in &page {
            content.push(' ');
            content.push_str(token);
        }
        if i < last_index {
            content.push(' ');
            content.push_str("include:");
            content.push_str(&continuation_name((i + 1) as u32, domain));
        } else {
            content.push(' ');
            content.push_str(terminal.as_str());
            content.push_str("all");
        }
        out.push(PlannedRecord {
            name: continuation_name(i as u32, domain),
            content: cap_to_wire_limit(content),
        });
    }
    out
}

/// Safety net only: the packing loop above reserves exact room for each
/// segment's trailing suffix, so this should never actually trim
/// anything. Truncates to a char boundary at or below the wire limit.
fn cap_to_wire_limit(content: String) -> String {
    if content.len() <= MAX_TXT_BYTES {
        return content;
    }
    let mut end = MAX_TXT_BYTES;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    content[..end].to_string()
}
