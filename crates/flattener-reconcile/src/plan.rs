//! Mutation plan computation: diff the desired
//! packed records against the current managed records by normalized name
//! and classify each side into create/update/delete, plus a human-readable
//! change summary.

use flattener_common::model::{is_managed, normalize_record_name, TxtRecord};
use flattener_spf::PlannedRecord;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default)]
pub struct MutationPlan {
    /// `(record_id, name)` pairs of currently-managed records with no
    /// counterpart in the desired set.
    pub to_delete: Vec<(String, String)>,
    pub to_create: Vec<PlannedRecord>,
    /// `(record_id, desired)` pairs for a name that exists on both sides.
    pub to_update: Vec<(String, PlannedRecord)>,
}

impl MutationPlan {
    pub fn is_empty(&self) -> bool {
        self.to_delete.is_empty() && self.to_create.is_empty() && self.to_update.is_empty()
    }
}

/// Build the mutation plan. `current` must already be filtered to managed
/// records for `domain`; `spf-unflat` is excluded by
/// construction since [`is_managed`] never returns true for it.
pub fn build_plan(domain: &str, current: &[TxtRecord], desired: &[PlannedRecord]) -> MutationPlan {
    let mut plan = MutationPlan::default();
    let mut matched_current: BTreeSet<String> = BTreeSet::new();

    for want in desired {
        let want_name = normalize_record_name(&want.name, domain);
        match current
            .iter()
            .find(|r| is_managed(r, domain) && normalize_record_name(&r.name, domain) == want_name)
        {
            Some(existing) => {
                matched_current.insert(existing.id.clone());
                if existing.content != want.content {
                    plan.to_update.push((existing.id.clone(), want.clone()));
                }
            }
            None => plan.to_create.push(want.clone()),
        }
    }

    for existing in current {
        if is_managed(existing, domain) && !matched_current.contains(&existing.id) {
            plan.to_delete
                .push((existing.id.clone(), existing.name.clone()));
        }
    }

    plan
}

/// Render a human-readable summary of the mechanism-level diff between the
/// current and desired aggregates.
pub fn change_summary(
    current_tokens: &BTreeSet<String>,
    desired_tokens: &BTreeSet<String>,
    force: bool,
) -> String {
    let added: Vec<&String> = desired_tokens.difference(current_tokens).collect();
    let removed: Vec<&String> = current_tokens.difference(desired_tokens).collect();

    if added.is_empty() && removed.is_empty() {
        if force {
            return "No functional change to SPF mechanisms (forced update).".to_string();
        }
        return "No change.".to_string();
    }

    let added_str = if added.is_empty() {
        "none".to_string()
    } else {
        added
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    let removed_str = if removed.is_empty() {
        "none".to_string()
    } else {
        removed
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!("Added: {added_str}. Removed: {removed_str}.")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txt(id: &str, name: &str, content: &str) -> TxtRecord {
        TxtRecord {
            id: id.to_string(),
            name: name.to_string(),
            record_type: "TXT".to_string(),
            content: content.to_string(),
            ttl: 600,
            priority: None,
            notes: None,
        }
    }

    fn planned(name: &str, content: &str) -> PlannedRecord {
        PlannedRecord {
            name: name.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn unchanged_name_with_same_content_is_noop() {
        let current = vec![txt("1", "@", "v=spf1 ~all")];
        let desired = vec![planned("@", "v=spf1 ~all")];
        let plan = build_plan("example.com", &current, &desired);
        assert!(plan.is_empty());
    }

    #[test]
    fn changed_content_becomes_an_update() {
        let current = vec![txt("1", "@", "v=spf1 ip4:1.1.1.1 ~all")];
        let desired = vec![planned("@", "v=spf1 ip4:2.2.2.2 ~all")];
        let plan = build_plan("example.com", &current, &desired);
        assert_eq!(plan.to_update.len(), 1);
        assert_eq!(plan.to_update[0].0, "1");
    }

    #[test]
    fn new_continuation_becomes_a_create() {
        let current = vec![txt("1", "@", "v=spf1 include:spf1.example.com ~all")];
        let desired = vec![
            planned("@", "v=spf1 include:spf1.example.com ~all"),
            planned("spf1.example.com", "v=spf1 ip4:1.1.1.1 ~all"),
        ];
        let plan = build_plan("example.com", &current, &desired);
        assert_eq!(plan.to_create.len(), 1);
        assert_eq!(plan.to_create[0].name, "spf1.example.com");
    }

    #[test]
    fn orphaned_continuation_becomes_a_delete() {
        let current = vec![
            txt("1", "@", "v=spf1 ~all"),
            txt("2", "spf0.example.com", "v=spf1 ip4:1.1.1.1 ~all"),
        ];
        let desired = vec![planned("@", "v=spf1 ~all")];
        let plan = build_plan("example.com", &current, &desired);
        assert_eq!(plan.to_delete, vec![("2".to_string(), "spf0.example.com".to_string())]);
    }

    #[test]
    fn unmanaged_records_are_never_touched() {
        let current = vec![
            txt("1", "@", "v=spf1 ~all"),
            txt("2", "spf-unflat.example.com", "v=spf1 include:_spf.example.net ~all"),
        ];
        let desired = vec![planned("@", "v=spf1 ~all")];
        let plan = build_plan("example.com", &current, &desired);
        assert!(plan.to_delete.is_empty());
    }

    #[test]
    fn change_summary_reports_added_and_removed() {
        let current: BTreeSet<String> = ["ip4:1.1.1.1".to_string()].into_iter().collect();
        let desired: BTreeSet<String> = ["ip4:2.2.2.2".to_string()].into_iter().collect();
        let summary = change_summary(&current, &desired, false);
        assert_eq!(summary, "Added: ip4:2.2.2.2. Removed: ip4:1.1.1.1.");
    }

    #[test]
    fn change_summary_notes_forced_noop() {
        let set: BTreeSet<String> = ["ip4:1.1.1.1".to_string()].into_iter().collect();
        let summary = change_summary(&set, &set, true);
        assert_eq!(summary, "No functional change to SPF mechanisms (forced update).");
    }
}
