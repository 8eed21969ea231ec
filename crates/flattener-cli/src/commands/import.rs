//! `import` subcommand: restore one or more backup files
//! into their target domains under a conflict-resolution strategy.

use crate::cli::ImportArgs;
use crate::commands::TaskReport;
use crate::runner::build_provider;
use flattener_backup::{import_domain, ConflictStrategy};
use flattener_common::config::Config;
use flattener_common::error::Error;
use flattener_schedule::{ProviderBuckets, RetryPolicy};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Imports run sequentially, in file order, against a single provider
/// connection per domain; unlike `flatten`/`export` there is no
/// cross-domain fan-out to make concurrent, since one backup file may
/// target several domains that share credentials.
pub async fn run(
    config: &Config,
    args: &ImportArgs,
    cancel: CancellationToken,
) -> Vec<TaskReport> {
    let strategy = match ConflictStrategy::parse(&args.strategy) {
        Ok(s) => s,
        Err(e) => {
            return vec![TaskReport {
                domain: "<config>".to_string(),
                outcome: Err(e),
            }]
        }
    };

    let buckets = Arc::new(ProviderBuckets::new());
    let record_types = if args.record_types.is_empty() {
        None
    } else {
        Some(args.record_types.clone())
    };

    let mut reports = Vec::new();
    for path in &args.files {
        let outcome = async {
            let content = std::fs::read_to_string(path).map_err(|e| {
                Error::Config(format!("failed to read {}: {e}", path.display()))
            })?;
            let document: flattener_backup::BackupDocument = serde_json::from_str(&content)
                .map_err(|e| Error::Validation(format!("malformed backup file {}: {e}", path.display())))?;

            let domain_config = config
                .domains
                .iter()
                .find(|d| d.name == document.domain)
                .ok_or_else(|| {
                    Error::Config(format!(
                        "backup file {} targets undeclared domain {}",
                        path.display(),
                        document.domain
                    ))
                })?;

            let provider_tag = domain_config.resolved_provider(&config.provider);
            let provider = build_provider(domain_config, &config.provider)?;
            let bucket = buckets.for_provider(&provider_tag);

            if args.backup_before {
                let before = flattener_backup::export_domain(
                    &document.domain,
                    provider.as_ref(),
                    &bucket,
                    RetryPolicy::default(),
                    &cancel,
                    None,
                    exported_at_now(),
                )
                .await?;
                let backup_path = path.with_extension("pre-import.json");
                let serialized = flattener_backup::serialize_json(&before)?;
                std::fs::write(&backup_path, serialized).map_err(|e| {
                    Error::Other(anyhow::anyhow!(
                        "failed to write pre-import backup {}: {e}",
                        backup_path.display()
                    ))
                })?;
            }

            let dry_run = args.is_dry_run();
            let result = import_domain(
                &document.domain,
                provider.as_ref(),
                &bucket,
                RetryPolicy::default(),
                &cancel,
                &document,
                strategy,
                record_types.as_deref(),
                dry_run,
            )
            .await?;

            Ok(format!(
                "{}: created {}, updated {}, skipped {}, failed {}{}",
                document.domain,
                result.created,
                result.updated,
                result.skipped,
                result.failed,
                if dry_run { " (dry run, no changes applied)" } else { "" }
            ))
        }
        .await;

        reports.push(TaskReport {
            domain: path.display().to_string(),
            outcome,
        });
    }
    reports
}

/// `chrono::Utc::now()` is the one acceptable call site for wall-clock
/// time in this crate: it is never replayed or diffed against a cached
/// value, so it carries no determinism requirement.
fn exported_at_now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}
