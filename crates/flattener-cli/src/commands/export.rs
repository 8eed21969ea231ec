//! `export` subcommand: write a backup document per domain
//! to `--output-dir`.

use crate::cli::{BackupFormat, ExportArgs};
use crate::commands::TaskReport;
use crate::runner::build_provider;
use flattener_backup::{export_domain, serialize_json, serialize_text};
use flattener_common::config::Config;
use flattener_schedule::{ProviderBuckets, RetryPolicy};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub async fn run(
    config: &Config,
    args: &ExportArgs,
    cancel: CancellationToken,
    exported_at: chrono::DateTime<chrono::Utc>,
) -> Vec<TaskReport> {
    let domains: Vec<_> = config
        .domains
        .iter()
        .filter(|d| args.domains.is_empty() || args.domains.iter().any(|n| n == &d.name))
        .cloned()
        .collect();

    let buckets = Arc::new(ProviderBuckets::new());
    let record_types = if args.record_types.is_empty() {
        None
    } else {
        Some(args.record_types.clone())
    };
    let (tx, mut rx) = mpsc::unbounded_channel();

    for domain in domains {
        let buckets = buckets.clone();
        let cancel = cancel.clone();
        let tx = tx.clone();
        let default_provider = config.provider.clone();
        let record_types = record_types.clone();
        let output_dir = args.output_dir.clone();
        let format = args.format;
        let domain_name = domain.name.clone();

        tokio::spawn(async move {
            let report = async {
                let provider_tag = domain.resolved_provider(&default_provider);
                let provider = build_provider(&domain, &default_provider)?;
                let bucket = buckets.for_provider(&provider_tag);
                let doc = export_domain(
                    &domain_name,
                    provider.as_ref(),
                    &bucket,
                    RetryPolicy::default(),
                    &cancel,
                    record_types.as_deref(),
                    exported_at,
                )
                .await?;

                let (content, extension) = match format {
                    BackupFormat::Json => (serialize_json(&doc)?, "json"),
                    BackupFormat::Txt => (serialize_text(&doc), "txt"),
                };
                let filename = output_dir.join(format!(
                    "{domain_name}-{}.{extension}",
                    exported_at.format("%Y%m%dT%H%M%SZ")
                ));
                std::fs::write(&filename, content).map_err(|e| {
                    flattener_common::error::Error::Other(anyhow::anyhow!(
                        "failed to write {}: {e}",
                        filename.display()
                    ))
                })?;
                Ok(format!(
                    "{domain_name}: exported {} records to {}",
                    doc.records.len(),
                    filename.display()
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
