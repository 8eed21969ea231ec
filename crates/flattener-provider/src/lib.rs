//! DNS Provider Client Interface: ping/list/create/update/
//! delete over a provider's HTTP API, with a shared failure model.

mod cloudflare_like;
mod generic_rest;
pub mod registry;

pub use cloudflare_like::CloudflareLikeProvider;
pub use generic_rest::GenericRestProvider;
pub use registry::ProviderRegistry;

use async_trait::async_trait;
use flattener_common::error::{redact, Error, Result};
use flattener_common::model::TxtRecord;

/// Outcome of a reachability/credential check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingStatus {
    pub status: String,
    pub observed_ip: Option<String>,
}

/// Fields accepted when creating or updating a record. `id` is assigned
/// by the provider on create and echoed back by `create_record`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordInput<'a> {
    pub name: &'a str,
    pub record_type: &'a str,
    pub content: &'a str,
    pub ttl: u32,
    pub priority: Option<u16>,
    pub notes: Option<&'a str>,
}

/// Every DNS provider implementation programs against this interface
///; callers never depend on a concrete provider type.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn ping(&self, domain: &str) -> Result<PingStatus>;

    /// Returns *all* record types for `domain`; callers filter.
    async fn list_records(&self, domain: &str) -> Result<Vec<TxtRecord>>;

    async fn create_record(&self, domain: &str, input: RecordInput<'_>) -> Result<String>;

    async fn update_record(&self, domain: &str, id: &str, input: RecordInput<'_>) -> Result<()>;

    async fn delete_record(&self, domain: &str, id: &str) -> Result<()>;

    async fn delete_by_name_type(
        &self,
        domain: &str,
        record_type: &str,
        subdomain: &str,
    ) -> Result<()>;

    /// A human-readable provider notice appended to user-facing reports.
    fn attribution(&self) -> String;

    /// Iterates `create_record` per input; any single failure aborts and
    /// propagates.
    async fn bulk_create(&self, domain: &str, inputs: &[RecordInput<'_>]) -> Result<Vec<String>> {
        let mut ids = Vec::with_capacity(inputs.len());
        for input in inputs {
            ids.push(self.create_record(domain, input.clone()).await?);
        }
        Ok(ids)
    }

    async fn bulk_update(&self, domain: &str, updates: &[(&str, RecordInput<'_>)]) -> Result<()> {
        for (id, input) in updates {
            self.update_record(domain, id, input.clone()).await?;
        }
        Ok(())
    }

    async fn bulk_delete(&self, domain: &str, ids: &[&str]) -> Result<()> {
        for id in ids {
            self.delete_record(domain, id).await?;
        }
        Ok(())
    }
}

/// Classify an HTTP response status into the error model: 429/503 are
/// rate-limit errors, other 4xx/5xx are permanent.
pub(crate) fn classify_status(status: reqwest::StatusCode, body: &str) -> Error {
    if status.as_u16() == 429 || status.as_u16() == 503 {
        Error::RateLimit(redact(&format!("{status}: {body}")))
    } else {
        Error::ProviderPermanent(redact(&format!("{status}: {body}")))
    }
}

/// Classify a `reqwest` transport error: timeouts and connection refusals
/// are transient, everything else is permanent.
pub(crate) fn classify_transport(err: reqwest::Error) -> Error {
    if err.is_timeout() || err.is_connect() {
        Error::Transient(redact(&err.to_string()))
    } else {
        Error::ProviderPermanent(redact(&err.to_string()))
    }
}

/// A provider-returned status string other than `"SUCCESS"` becomes a
/// permanent error carrying the provider's message field.
pub(crate) fn require_success(status: &str, message: Option<&str>) -> Result<()> {
    if status.eq_ignore_ascii_case("SUCCESS") {
        return Ok(());
    }
    let msg = message.unwrap_or("no message");
    Err(Error::ProviderPermanent(redact(&format!(
        "provider status {status:?}: {msg}"
    ))))
}
