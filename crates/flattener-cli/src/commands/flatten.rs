//! `flatten` subcommand: reconcile every configured domain
//! concurrently, each task serialized behind its provider's token bucket
//! and the global worker pool.

use crate::cli::FlattenArgs;
use crate::commands::TaskReport;
use crate::runner::build_provider;
use flattener_common::config::Config;
use flattener_common::model::parse_ip_entry;
use flattener_reconcile::{reconcile_domain, ReconcileOptions};
use flattener_resolver::DnsResolver;
use flattener_schedule::{ProviderBuckets, RetryPolicy, WorkerPool};
use flattener_spf::AggregationPolicy;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::error;

pub async fn run(
    config: &Config,
    dns_resolver: Arc<dyn DnsResolver>,
    args: &FlattenArgs,
    cancel: CancellationToken,
) -> Vec<TaskReport> {
    let domains: Vec<_> = config
        .domains
        .iter()
        .filter(|d| args.domains.is_empty() || args.domains.iter().any(|n| n == &d.name))
        .cloned()
        .collect();

    let pool = Arc::new(WorkerPool::default_size());
    let buckets = Arc::new(ProviderBuckets::new());
    let dry_run = args.is_dry_run();
    let (tx, mut rx) = mpsc::unbounded_channel();

    for domain in domains {
        let pool = pool.clone();
        let buckets = buckets.clone();
        let dns_resolver = dns_resolver.clone();
        let cancel = cancel.clone();
        let tx = tx.clone();
        let default_provider = config.provider.clone();
        let force = args.force || domain.options.force;
        let aggregate = args.aggregate || domain.options.aggregate;
        let ttl = domain.ttl;
        let ipv4_max_prefix = domain.aggregation.ipv4_max_prefix;
        let ipv6_max_prefix = domain.aggregation.ipv6_max_prefix;
        let preserve_entries = domain.aggregation.preserve_individual.clone();
        let domain_name = domain.name.clone();

        tokio::spawn(async move {
            let report = async {
                let _permit = pool.acquire().await;
                let provider_tag = domain.resolved_provider(&default_provider);
                let provider = build_provider(&domain, &default_provider)?;
                let bucket = buckets.for_provider(&provider_tag);
                let mut preserve = BTreeSet::new();
                for entry in &preserve_entries {
                    if let Ok(parsed) = parse_ip_entry(entry) {
                        preserve.insert(parsed);
                    }
                }
                let options = ReconcileOptions {
                    aggregate,
                    force,
                    aggregation_policy: AggregationPolicy {
                        v4_max_prefix: ipv4_max_prefix,
                        v6_max_prefix: ipv6_max_prefix,
                    },
                    preserve,
                    ttl,
                    use_unflat_source: domain.options.use_unflat_source,
                };
                reconcile_domain(
                    &domain_name,
                    dns_resolver,
                    provider.as_ref(),
                    &bucket,
                    RetryPolicy::default(),
                    &cancel,
                    &options,
                    dry_run,
                )
                .await
                .map(|outcome| outcome.summary)
            }
            .await;

            if let Err(ref e) = report {
                error!(domain = %domain_name, "flatten task failed: {e}");
            }
            let _ = tx.send(TaskReport {
                domain: domain_name,
                outcome: report,
            });
        });
    }
    drop(tx);

    let mut reports = Vec::new();
    while let Some(report) = rx.recv().await {
        reports.push(report);
    }
    reports
}
