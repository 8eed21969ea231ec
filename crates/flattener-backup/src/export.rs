//! Export flow: ping, retrieve, filter, validate, serialize.

use crate::BackupDocument;
use flattener_common::error::{Error, Result};
use flattener_common::validate::{validate_record, Issue, RECORD_TYPES};
use flattener_provider::ProviderClient;
use flattener_schedule::{with_retry, RetryPolicy, TokenBucket};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Export every (optionally filtered) record for `domain` into a
/// [`BackupDocument`]. Fails if the provider ping doesn't report SUCCESS,
/// or if any retrieved record fails hard validation.
pub async fn export_domain(
    domain: &str,
    provider: &dyn ProviderClient,
    bucket: &TokenBucket,
    retry_policy: RetryPolicy,
    cancel: &CancellationToken,
    record_types: Option<&[String]>,
    exported_at: chrono::DateTime<chrono::Utc>,
) -> Result<BackupDocument> {
    let ping = with_retry(bucket, retry_policy, cancel, || provider.ping(domain)).await?;
    if !ping.status.eq_ignore_ascii_case("SUCCESS") {
        return Err(Error::ProviderPermanent(format!(
            "ping for {domain} returned status {:?}",
            ping.status
        )));
    }

    let all_records = with_retry(bucket, retry_policy, cancel, || provider.list_records(domain)).await?;

    let filtered: Vec<_> = all_records
        .into_iter()
        .filter(|r| RECORD_TYPES.contains(&r.record_type.as_str()))
        .filter(|r| match record_types {
            Some(wanted) => wanted.iter().any(|t| t.eq_ignore_ascii_case(&r.record_type)),
            None => true,
        })
        .collect();

    if filtered.is_empty() {
        warn!(domain, "export produced an empty record set");
    }

    for record in &filtered {
        for issue in validate_record(record) {
            match issue {
                Issue::Error(msg) => {
                    return Err(Error::Validation(format!(
                        "{domain}: record {} ({}) failed validation: {msg}",
                        record.name, record.record_type
                    )));
                }
                Issue::Warning(msg) => {
                    warn!(domain, name = %record.name, "export validation warning: {msg}");
                }
            }
        }
    }

    Ok(BackupDocument {
        domain: domain.to_string(),
        provider: provider.attribution(),
        version: "1.0".to_string(),
        exported_at,
        records: filtered,
        attribution: provider.attribution(),
    })
}

/// Serialize a backup document as pretty JSON.
pub fn serialize_json(doc: &BackupDocument) -> Result<String> {
    serde_json::to_string_pretty(doc).map_err(|e| Error::Other(e.into()))
}

/// Serialize a backup document as plain text, one record per line.
pub fn serialize_text(doc: &BackupDocument) -> String {
    let mut out = format!(
        "# domain={} provider={} version={} exported_at={}\n",
        doc.domain, doc.provider, doc.version, doc.exported_at
    );
    for record in &doc.records {
        out.push_str(&format!(
            "{}\t{}\t{}\tttl={}",
            record.name, record.record_type, record.content, record.ttl
        ));
        if let Some(priority) = record.priority {
            out.push_str(&format!("\tpriority={priority}"));
        }
        out.push('\n');
    }
    out.push_str(&format!("# attribution: {}\n", doc.attribution));
    out
}
