//! Import flow: validate up front, then apply one of four
//! conflict-resolution strategies against the provider's current records.

use crate::BackupDocument;
use flattener_common::error::{Error, Result};
use flattener_common::model::{fqdn_to_hostname, TxtRecord};
use flattener_common::validate::{validate_record, Issue};
use flattener_provider::{ProviderClient, RecordInput};
use flattener_schedule::{with_retry, RetryPolicy, TokenBucket};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictStrategy {
    Skip,
    Replace,
    Merge,
    Abort,
}

impl ConflictStrategy {
    pub fn parse(text: &str) -> Result<Self> {
        match text.to_ascii_lowercase().as_str() {
            "skip" => Ok(ConflictStrategy::Skip),
            "replace" => Ok(ConflictStrategy::Replace),
            "merge" => Ok(ConflictStrategy::Merge),
            "abort" => Ok(ConflictStrategy::Abort),
            other => Err(Error::Config(format!("unknown import strategy: {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImportOutcome {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub conflicts: Vec<String>,
}

/// Import `document`'s records into `domain` under `strategy`. Every
/// record is validated before any mutation; a single hard validation
/// failure aborts with no changes made. When
/// `dry_run` is set, no provider calls beyond the initial read happen.
pub async fn import_domain(
    domain: &str,
    provider: &dyn ProviderClient,
    bucket: &TokenBucket,
    retry_policy: RetryPolicy,
    cancel: &CancellationToken,
    document: &BackupDocument,
    strategy: ConflictStrategy,
    record_types: Option<&[String]>,
    dry_run: bool,
) -> Result<ImportOutcome> {
    let wanted: Vec<&TxtRecord> = document
        .records
        .iter()
        .filter(|r| match record_types {
            Some(types) => types.iter().any(|t| t.eq_ignore_ascii_case(&r.record_type)),
            None => true,
        })
        .collect();

    for record in &wanted {
        for issue in validate_record(record) {
            if let Issue::Error(msg) = issue {
                return Err(Error::Validation(format!(
                    "{domain}: import record {} ({}) failed validation: {msg}",
                    record.name, record.record_type
                )));
            }
        }
    }

    let current = with_retry(bucket, retry_policy, cancel, || provider.list_records(domain)).await?;

    let mut outcome = ImportOutcome::default();

    for record in wanted {
        let desired_host = fqdn_to_hostname(&record.name, domain);
        let existing = current.iter().find(|c| {
            fqdn_to_hostname(&c.name, domain) == desired_host && c.record_type == record.record_type
        });

        match existing {
            None => {
                if dry_run {
                    outcome.created += 1;
                    continue;
                }
                let input = RecordInput {
                    name: &record.name,
                    record_type: &record.record_type,
                    content: &record.content,
                    ttl: record.ttl,
                    priority: record.priority,
                    notes: record.notes.as_deref(),
                };
                match with_retry(bucket, retry_policy, cancel, || provider.create_record(domain, input)).await {
                    Ok(_) => outcome.created += 1,
                    Err(e) => {
                        outcome.failed += 1;
                        outcome.conflicts.push(format!("{desired_host}: create failed: {e}"));
                    }
                }
            }
            Some(existing) if existing.content == record.content => {
                outcome.skipped += 1;
                outcome
                    .conflicts
                    .push(format!("{desired_host}: identical record already present, skipped"));
            }
            Some(existing) => {
                let conflict_msg = format!(
                    "{desired_host}: existing {} record differs from backup",
                    record.record_type
                );
                match strategy {
                    ConflictStrategy::Skip => {
                        outcome.skipped += 1;
                        outcome.conflicts.push(conflict_msg);
                    }
                    ConflictStrategy::Abort => {
                        return Err(Error::Validation(format!(
                            "import aborted on first conflict: {conflict_msg}"
                        )));
                    }
                    ConflictStrategy::Replace => {
                        outcome.conflicts.push(conflict_msg);
                        if dry_run {
                            outcome.updated += 1;
                            continue;
                        }
                        apply_update(
                            domain,
                            provider,
                            bucket,
                            retry_policy,
                            cancel,
                            existing,
                            record,
                            &mut outcome,
                        )
                        .await;
                    }
                    ConflictStrategy::Merge => {
                        outcome.conflicts.push(conflict_msg);
                        let merged_content = merge_content(&existing.record_type, &existing.content, &record.content);
                        if merged_content == existing.content {
                            outcome.skipped += 1;
                            continue;
                        }
                        if dry_run {
                            outcome.updated += 1;
                            continue;
                        }
                        let merged = TxtRecord {
                            content: merged_content,
                            ..record.clone()
                        };
                        apply_update(
                            domain,
                            provider,
                            bucket,
                            retry_policy,
                            cancel,
                            existing,
                            &merged,
                            &mut outcome,
                        )
                        .await;
                    }
                }
            }
        }
    }

    info!(
        domain,
        created = outcome.created,
        updated = outcome.updated,
        skipped = outcome.skipped,
        failed = outcome.failed,
        "import complete"
    );
    Ok(outcome)
}

async fn apply_update(
    domain: &str,
    provider: &dyn ProviderClient,
    bucket: &TokenBucket,
    retry_policy: RetryPolicy,
    cancel: &CancellationToken,
    existing: &TxtRecord,
    desired: &TxtRecord,
    outcome: &mut ImportOutcome,
) {
    let input = RecordInput {
        name: &desired.name,
        record_type: &desired.record_type,
        content: &desired.content,
        ttl: desired.ttl,
        priority: desired.priority,
        notes: desired.notes.as_deref(),
    };
    match with_retry(bucket, retry_policy, cancel, || {
        provider.update_record(domain, &existing.id, input)
    })
    .await
    {
        Ok(()) => outcome.updated += 1,
        Err(e) => {
            outcome.failed += 1;
            outcome
                .conflicts
                .push(format!("{}: update failed: {e}", existing.name));
        }
    }
}

/// Additive merge for record content. TXT records merge as a
/// space-separated union of distinct tokens (reasonable for SPF-shaped or
/// otherwise multi-token content); every other record type has no
/// sensible union, so merge degrades to keeping the backup's value.
fn merge_content(record_type: &str, existing: &str, incoming: &str) -> String {
    if record_type != "TXT" {
        return incoming.to_string();
    }
    let mut tokens: Vec<&str> = existing.split_whitespace().collect();
    for token in incoming.split_whitespace() {
        if !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    tokens.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use flattener_provider::PingStatus;
    use std::sync::Mutex;

    struct FakeProvider {
        records: Mutex<Vec<TxtRecord>>,
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
            self.records.lock().unwrap().push(TxtRecord {
                id: "new".to_string(),
                name: input.name.to_string(),
                record_type: input.record_type.to_string(),
                content: input.content.to_string(),
                ttl: input.ttl,
                priority: input.priority,
                notes: input.notes.map(|s| s.to_string()),
            });
            Ok("new".to_string())
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

    fn doc(records: Vec<TxtRecord>) -> BackupDocument {
        BackupDocument {
            domain: "example.com".to_string(),
            provider: "fake".to_string(),
            version: "1.0".to_string(),
            exported_at: chrono::Utc::now(),
            records,
            attribution: "fake".to_string(),
        }
    }

    fn bucket() -> TokenBucket {
        TokenBucket::new(1000.0, 10)
    }

    #[tokio::test]
    async fn new_record_is_created() {
        let provider = FakeProvider {
            records: Mutex::new(vec![]),
        };
        let document = doc(vec![txt("1", "@", "v=spf1 ~all")]);
        let outcome = import_domain(
            "example.com",
            &provider,
            &bucket(),
            RetryPolicy::default(),
            &CancellationToken::new(),
            &document,
            ConflictStrategy::Skip,
            None,
            false,
        )
        .await
        .unwrap();
        assert_eq!(outcome.created, 1);
        assert_eq!(provider.records.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn identical_record_is_skipped_without_conflict_strategy() {
        let provider = FakeProvider {
            records: Mutex::new(vec![txt("1", "@", "v=spf1 ~all")]),
        };
        let document = doc(vec![txt("x", "@", "v=spf1 ~all")]);
        let outcome = import_domain(
            "example.com",
            &provider,
            &bucket(),
            RetryPolicy::default(),
            &CancellationToken::new(),
            &document,
            ConflictStrategy::Replace,
            None,
            false,
        )
        .await
        .unwrap();
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.updated, 0);
    }

    #[tokio::test]
    async fn skip_strategy_leaves_conflicting_record_untouched() {
        let provider = FakeProvider {
            records: Mutex::new(vec![txt("1", "@", "v=spf1 ip4:1.1.1.1 ~all")]),
        };
        let document = doc(vec![txt("x", "@", "v=spf1 ip4:2.2.2.2 ~all")]);
        let outcome = import_domain(
            "example.com",
            &provider,
            &bucket(),
            RetryPolicy::default(),
            &CancellationToken::new(),
            &document,
            ConflictStrategy::Skip,
            None,
            false,
        )
        .await
        .unwrap();
        assert_eq!(outcome.skipped, 1);
        assert_eq!(
            provider.records.lock().unwrap()[0].content,
            "v=spf1 ip4:1.1.1.1 ~all"
        );
    }

    #[tokio::test]
    async fn replace_strategy_overwrites_conflicting_record() {
        let provider = FakeProvider {
            records: Mutex::new(vec![txt("1", "@", "v=spf1 ip4:1.1.1.1 ~all")]),
        };
        let document = doc(vec![txt("x", "@", "v=spf1 ip4:2.2.2.2 ~all")]);
        let outcome = import_domain(
            "example.com",
            &provider,
            &bucket(),
            RetryPolicy::default(),
            &CancellationToken::new(),
            &document,
            ConflictStrategy::Replace,
            None,
            false,
        )
        .await
        .unwrap();
        assert_eq!(outcome.updated, 1);
        assert_eq!(
            provider.records.lock().unwrap()[0].content,
            "v=spf1 ip4:2.2.2.2 ~all"
        );
    }

    #[tokio::test]
    async fn merge_strategy_unions_txt_tokens() {
        let provider = FakeProvider {
            records: Mutex::new(vec![txt("1", "@", "v=spf1 ip4:1.1.1.1 ~all")]),
        };
        let document = doc(vec![txt("x", "@", "v=spf1 ip4:2.2.2.2 ~all")]);
        let outcome = import_domain(
            "example.com",
            &provider,
            &bucket(),
            RetryPolicy::default(),
            &CancellationToken::new(),
            &document,
            ConflictStrategy::Merge,
            None,
            false,
        )
        .await
        .unwrap();
        assert_eq!(outcome.updated, 1);
        let merged = &provider.records.lock().unwrap()[0].content;
        assert!(merged.contains("ip4:1.1.1.1"));
        assert!(merged.contains("ip4:2.2.2.2"));
    }

    #[tokio::test]
    async fn abort_strategy_fails_on_first_conflict() {
        let provider = FakeProvider {
            records: Mutex::new(vec![txt("1", "@", "v=spf1 ip4:1.1.1.1 ~all")]),
        };
        let document = doc(vec![txt("x", "@", "v=spf1 ip4:2.2.2.2 ~all")]);
        let result = import_domain(
            "example.com",
            &provider,
            &bucket(),
            RetryPolicy::default(),
            &CancellationToken::new(),
            &document,
            ConflictStrategy::Abort,
            None,
            false,
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn dry_run_reports_without_mutating() {
        let provider = FakeProvider {
            records: Mutex::new(vec![]),
        };
        let document = doc(vec![txt("x", "@", "v=spf1 ~all")]);
        let outcome = import_domain(
            "example.com",
            &provider,
            &bucket(),
            RetryPolicy::default(),
            &CancellationToken::new(),
            &document,
            ConflictStrategy::Skip,
            None,
            true,
        )
        .await
        .unwrap();
        assert_eq!(outcome.created, 1);
        assert!(provider.records.lock().unwrap().is_empty());
    }

    #[test]
    fn parses_strategy_names_case_insensitively() {
        assert_eq!(ConflictStrategy::parse("SKIP").unwrap(), ConflictStrategy::Skip);
        assert_eq!(ConflictStrategy::parse("Merge").unwrap(), ConflictStrategy::Merge);
        assert!(ConflictStrategy::parse("nonsense").is_err());
    }
}
