//! Per-domain reconciliation pipeline: resolve the desired
//! state, fetch the actual state, diff, and execute the mutation plan
//! under the rate limiter.

use crate::current::rebuild_current;
use crate::plan::{build_plan, change_summary};
use flattener_common::error::{Error, Result};
use flattener_common::model::{is_managed, unflat_source_name, IpEntry};
use flattener_provider::{ProviderClient, RecordInput};
use flattener_resolver::DnsResolver;
use flattener_schedule::{with_retry, RetryPolicy, TokenBucket};
use flattener_spf::{aggregate, normalize, split_and_chain, AggregationPolicy, SpfResolver, ThresholdOutcome};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub aggregate: bool,
    pub force: bool,
    pub aggregation_policy: AggregationPolicy,
    pub preserve: BTreeSet<IpEntry>,
    pub ttl: u32,
    /// When set, the SPF record is resolved from `spf-unflat.<domain>`
    /// instead of the apex: an alternative source the
    /// engine treats as authoritative input but never deletes.
    pub use_unflat_source: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            aggregate: false,
            force: false,
            aggregation_policy: AggregationPolicy::default(),
            preserve: BTreeSet::new(),
            ttl: 600,
            use_unflat_source: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub lookups: u32,
    pub no_op: bool,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub summary: String,
}

/// Run the full 8-step reconciliation for one domain.
/// `dry_run` skips the execute step (step 8) and reports the plan only.
pub async fn reconcile_domain(
    domain: &str,
    dns_resolver: Arc<dyn DnsResolver>,
    provider: &dyn ProviderClient,
    bucket: &TokenBucket,
    retry_policy: RetryPolicy,
    cancel: &CancellationToken,
    options: &ReconcileOptions,
    dry_run: bool,
) -> Result<ReconcileOutcome> {
    // Step 1: resolve the target SPF record, gated by the RFC lookup
    // threshold unless the operator forces a rewrite. `use_unflat_source`
    // redirects resolution to `spf-unflat.<domain>` while every later
    // step still targets `domain`'s own managed records.
    let source_domain = if options.use_unflat_source {
        unflat_source_name(domain)
    } else {
        domain.to_string()
    };
    let spf = SpfResolver::new(dns_resolver);
    let outcome = spf
        .flatten_with_threshold(&source_domain, options.force)
        .await
        .map_err(|e| Error::SpfResolution(e.to_string()))?;

    let (lookups, flattened) = match outcome {
        ThresholdOutcome::UnderThreshold { lookups } => {
            return Ok(ReconcileOutcome {
                lookups,
                no_op: true,
                created: 0,
                updated: 0,
                deleted: 0,
                summary: format!(
                    "{domain}: {lookups} DNS lookups, under the RFC 7208 budget; no flattening needed."
                ),
            });
        }
        ThresholdOutcome::Flattened { lookups, result } => (lookups, result),
    };

    // Step 2: fetch the provider's current records for this domain.
    let all_records = with_retry(bucket, retry_policy, cancel, || provider.list_records(domain)).await?;

    // Step 3: identify the records this engine owns.
    let current_managed: Vec<_> = all_records
        .into_iter()
        .filter(|r| is_managed(r, domain))
        .collect();

    // Step 4: rebuild the current aggregate by walking managed chains only.
    let current = rebuild_current(&current_managed, domain);

    // Step 5: compute the desired aggregate and compare.
    let desired_ips: BTreeSet<IpEntry> = if options.aggregate {
        aggregate(&flattened.ips, options.aggregation_policy, &options.preserve)
            .into_iter()
            .collect()
    } else {
        flattened.ips.clone()
    };

    let current_text = normalize(&current.ips, &current.passthrough, current.qualifier);
    let desired_text = normalize(&desired_ips, &flattened.passthrough, flattened.qualifier);
    let functionally_equal = current_text == desired_text
        || (options.aggregate
            && flattener_spf::semantically_equal(&current.ips, &desired_ips));

    if functionally_equal && !options.force {
        return Ok(ReconcileOutcome {
            lookups,
            no_op: true,
            created: 0,
            updated: 0,
            deleted: 0,
            summary: format!("{domain}: no change."),
        });
    }

    let current_tokens: BTreeSet<String> = current
        .ips
        .iter()
        .map(|e| e.to_mechanism())
        .chain(current.passthrough.iter().cloned())
        .collect();
    let desired_tokens: BTreeSet<String> = desired_ips
        .iter()
        .map(|e| e.to_mechanism())
        .chain(flattened.passthrough.iter().cloned())
        .collect();
    let summary = change_summary(&current_tokens, &desired_tokens, options.force);

    // Step 6: pack the desired aggregate into the 255-byte record chain.
    let desired_records = split_and_chain(domain, &desired_ips, &flattened.passthrough, flattened.qualifier);

    // Step 7: compute the mutation plan.
    let plan = build_plan(domain, &current_managed, &desired_records);

    if plan.is_empty() {
        return Ok(ReconcileOutcome {
            lookups,
            no_op: true,
            created: 0,
            updated: 0,
            deleted: 0,
            summary: format!("{domain}: {summary}"),
        });
    }

    if dry_run {
        return Ok(ReconcileOutcome {
            lookups,
            no_op: false,
            created: plan.to_create.len(),
            updated: plan.to_update.len(),
            deleted: plan.to_delete.len(),
            summary: format!("{domain}: {summary} (dry run, no changes applied)"),
        });
    }

    // Step 8: execute delete -> create -> update, each under the retry
    // wrapper and serialized behind the provider's token bucket.
    for (id, name) in &plan.to_delete {
        info!(domain, name, "deleting orphaned managed record");
        with_retry(bucket, retry_policy, cancel, || provider.delete_record(domain, id)).await?;
    }
    for record in &plan.to_create {
        let input = RecordInput {
            name: &record.name,
            record_type: "TXT",
            content: &record.content,
            ttl: options.ttl,
            priority: None,
            notes: None,
        };
        with_retry(bucket, retry_policy, cancel, || provider.create_record(domain, input)).await?;
    }
    for (id, record) in &plan.to_update {
        let input = RecordInput {
            name: &record.name,
            record_type: "TXT",
            content: &record.content,
            ttl: options.ttl,
            priority: None,
            notes: None,
        };
        with_retry(bucket, retry_policy, cancel, || provider.update_record(domain, id, input)).await?;
    }

    Ok(ReconcileOutcome {
        lookups,
        no_op: false,
        created: plan.to_create.len(),
        updated: plan.to_update.len(),
        deleted: plan.to_delete.len(),
        summary: format!("{domain}: {summary}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use flattener_common::model::TxtRecord;
    use flattener_provider::PingStatus;
    use flattener_resolver::{DnsResolver, DnsResult, MxRecord};
    use std::collections::HashMap;
    use std::net::IpAddr;
    use std::sync::Mutex as StdMutex;

    struct FakeResolver {
        txt: HashMap<String, Vec<String>>,
    }

    #[async_trait]
    impl DnsResolver for FakeResolver {
        async fn lookup_txt(&self, domain: &str) -> DnsResult<Vec<String>> {
            Ok(self.txt.get(domain).cloned().unwrap_or_default())
        }
        async fn lookup_ip(&self, _domain: &str) -> DnsResult<Vec<IpAddr>> {
            Ok(vec![])
        }
        async fn lookup_mx(&self, _domain: &str) -> DnsResult<Vec<MxRecord>> {
            Ok(vec![])
        }
    }

    fn resolver_with(spf: &str) -> Arc<dyn DnsResolver> {
        let mut txt = HashMap::new();
        txt.insert("example.com".to_string(), vec![spf.to_string()]);
        Arc::new(FakeResolver { txt })
    }

    fn resolver_with_named(entries: &[(&str, &str)]) -> Arc<dyn DnsResolver> {
        let mut txt = HashMap::new();
        for (domain, spf) in entries {
            txt.insert(domain.to_string(), vec![spf.to_string()]);
        }
        Arc::new(FakeResolver { txt })
    }

    struct FakeProvider {
        records: StdMutex<Vec<TxtRecord>>,
        next_id: StdMutex<u32>,
    }

    impl FakeProvider {
        fn new(records: Vec<TxtRecord>) -> Self {
            Self {
                records: StdMutex::new(records),
                next_id: StdMutex::new(100),
            }
        }
    }

    #[async_trait]
    impl ProviderClient for FakeProvider {
        async fn ping(&self, _domain: &str) -> Result<PingStatus> {
            Ok(PingStatus {
                status: "SUCCESS".to_string(),
                observed_ip: None,
            })
        }
        async fn list_records(&self, _domain: &str) -> Result<Vec<TxtRecord>> {
            Ok(self.records.lock().unwrap().clone())
        }
        async fn create_record(&self, _domain: &str, input: RecordInput<'_>) -> Result<String> {
            let mut id = self.next_id.lock().unwrap();
            *id += 1;
            let new_id = id.to_string();
            self.records.lock().unwrap().push(TxtRecord {
                id: new_id.clone(),
                name: input.name.to_string(),
                record_type: input.record_type.to_string(),
                content: input.content.to_string(),
                ttl: input.ttl,
                priority: input.priority,
                notes: input.notes.map(|s| s.to_string()),
            });
            Ok(new_id)
        }
        async fn update_record(&self, _domain: &str, id: &str, input: RecordInput<'_>) -> Result<()> {
            let mut records = self.records.lock().unwrap();
            if let Some(r) = records.iter_mut().find(|r| r.id == id) {
                r.content = input.content.to_string();
            }
            Ok(())
        }
        async fn delete_record(&self, _domain: &str, id: &str) -> Result<()> {
            self.records.lock().unwrap().retain(|r| r.id != id);
            Ok(())
        }
        async fn delete_by_name_type(&self, _domain: &str, _record_type: &str, _subdomain: &str) -> Result<()> {
            Ok(())
        }
        fn attribution(&self) -> String {
            "fake".to_string()
        }
    }

    fn cancel() -> CancellationToken {
        CancellationToken::new()
    }

    fn bucket() -> TokenBucket {
        TokenBucket::new(1000.0, 10)
    }

    #[tokio::test]
    async fn under_threshold_record_is_a_noop() {
        let dns = resolver_with("v=spf1 ip4:1.1.1.1 ~all");
        let provider = FakeProvider::new(vec![]);
        let outcome = reconcile_domain(
            "example.com",
            dns,
            &provider,
            &bucket(),
            RetryPolicy::default(),
            &cancel(),
            &ReconcileOptions::default(),
            false,
        )
        .await
        .unwrap();
        assert!(outcome.no_op);
        assert_eq!(outcome.created, 0);
    }

    #[tokio::test]
    async fn forced_run_creates_apex_when_missing() {
        let dns = resolver_with("v=spf1 ip4:1.1.1.1 ~all");
        let provider = FakeProvider::new(vec![]);
        let mut options = ReconcileOptions::default();
        options.force = true;
        let outcome = reconcile_domain(
            "example.com",
            dns,
            &provider,
            &bucket(),
            RetryPolicy::default(),
            &cancel(),
            &options,
            false,
        )
        .await
        .unwrap();
        assert!(!outcome.no_op);
        assert_eq!(outcome.created, 1);
        assert_eq!(provider.records.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn matching_existing_state_is_a_noop() {
        let dns = resolver_with("v=spf1 ip4:1.1.1.1 ~all");
        let existing = vec![TxtRecord {
            id: "1".into(),
            name: "@".into(),
            record_type: "TXT".into(),
            content: "v=spf1 ip4:1.1.1.1 ~all".into(),
            ttl: 600,
            priority: None,
            notes: None,
        }];
        let provider = FakeProvider::new(existing);
        let mut options = ReconcileOptions::default();
        options.force = true;
        let outcome = reconcile_domain(
            "example.com",
            dns,
            &provider,
            &bucket(),
            RetryPolicy::default(),
            &cancel(),
            &options,
            false,
        )
        .await
        .unwrap();
        assert!(outcome.no_op);
    }

    #[tokio::test]
    async fn changed_ip_set_triggers_an_update() {
        let dns = resolver_with("v=spf1 ip4:2.2.2.2 ~all");
        let existing = vec![TxtRecord {
            id: "1".into(),
            name: "@".into(),
            record_type: "TXT".into(),
            content: "v=spf1 ip4:1.1.1.1 ~all".into(),
            ttl: 600,
            priority: None,
            notes: None,
        }];
        let provider = FakeProvider::new(existing);
        let mut options = ReconcileOptions::default();
        options.force = true;
        let outcome = reconcile_domain(
            "example.com",
            dns,
            &provider,
            &bucket(),
            RetryPolicy::default(),
            &cancel(),
            &options,
            false,
        )
        .await
        .unwrap();
        assert_eq!(outcome.updated, 1);
        assert!(outcome.summary.contains("Added: ip4:2.2.2.2"));
        assert!(outcome.summary.contains("Removed: ip4:1.1.1.1"));
    }

    #[tokio::test]
    async fn dry_run_reports_without_mutating() {
        let dns = resolver_with("v=spf1 ip4:1.1.1.1 ~all");
        let provider = FakeProvider::new(vec![]);
        let mut options = ReconcileOptions::default();
        options.force = true;
        let outcome = reconcile_domain(
            "example.com",
            dns,
            &provider,
            &bucket(),
            RetryPolicy::default(),
            &cancel(),
            &options,
            true,
        )
        .await
        .unwrap();
        assert_eq!(outcome.created, 1);
        assert!(provider.records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn use_unflat_source_resolves_the_alternative_record() {
        let dns = resolver_with_named(&[
            ("example.com", "v=spf1 ip4:9.9.9.9 ~all"),
            ("spf-unflat.example.com", "v=spf1 ip4:1.1.1.1 ~all"),
        ]);
        let provider = FakeProvider::new(vec![]);
        let mut options = ReconcileOptions::default();
        options.force = true;
        options.use_unflat_source = true;
        reconcile_domain(
            "example.com",
            dns,
            &provider,
            &bucket(),
            RetryPolicy::default(),
            &cancel(),
            &options,
            false,
        )
        .await
        .unwrap();
        let records = provider.records.lock().unwrap();
        assert!(records[0].content.contains("1.1.1.1"));
        assert!(!records[0].content.contains("9.9.9.9"));
    }
}
