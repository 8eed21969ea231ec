//! `ping` subcommand: check provider credentials and reachability for
//! every configured domain, independently and concurrently.

use crate::commands::TaskReport;
use crate::runner::build_provider;
use flattener_common::config::Config;
use flattener_schedule::{ProviderBuckets, RetryPolicy};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub async fn run(config: &Config, cancel: CancellationToken) -> Vec<TaskReport> {
    let buckets = Arc::new(ProviderBuckets::new());
    let (tx, mut rx) = mpsc::unbounded_channel();

    for domain in config.domains.clone() {
        let tx = tx.clone();
        let buckets = buckets.clone();
        let cancel = cancel.clone();
        let default_provider = config.provider.clone();
        let domain_name = domain.name.clone();
        tokio::spawn(async move {
            let report = async {
                let provider_tag = domain.resolved_provider(&default_provider);
                let provider = build_provider(&domain, &default_provider)?;
                let bucket = buckets.for_provider(&provider_tag);
                let status = flattener_schedule::with_retry(
                    &bucket,
                    RetryPolicy::default(),
                    &cancel,
                    || provider.ping(&domain_name),
                )
                .await?;
                Ok(format!(
                    "{domain_name}: {} ({})",
                    status.status,
                    status.observed_ip.as_deref().unwrap_or("no observed IP")
                ))
            }
            .await;
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
