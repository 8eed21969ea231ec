//! A Cloudflare-shaped provider: bearer-token auth, `zones/{zone_id}/
//! dns_records` paths, and a `{success, errors[], result}` envelope.
//! Only TXT records carry `priority`-less payloads; MX priority maps to
//! Cloudflare's `priority` field.

use crate::{classify_status, classify_transport, PingStatus, ProviderClient, RecordInput};
use async_trait::async_trait;
use flattener_common::error::{redact, Error, Result};
use flattener_common::model::TxtRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct CloudflareLikeConfig {
    pub base_url: String,
    pub api_token: String,
    pub timeout_secs: u64,
}

impl Default for CloudflareLikeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.cloudflare-like.invalid/client/v4".to_string(),
            api_token: String::new(),
            timeout_secs: 15,
        }
    }
}

pub struct CloudflareLikeProvider {
    config: CloudflareLikeConfig,
    client: reqwest::Client,
    zone_cache: Mutex<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    errors: Vec<ApiError>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
    name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct DnsRecordBody {
    #[serde(rename = "type")]
    record_type: String,
    name: String,
    content: String,
    ttl: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DnsRecord {
    id: String,
    #[serde(rename = "type")]
    record_type: String,
    name: String,
    content: String,
    ttl: u32,
    priority: Option<u16>,
    comment: Option<String>,
}

impl CloudflareLikeProvider {
    pub fn new(config: CloudflareLikeConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("failed to build the Cloudflare-like HTTP client");
        Self {
            config,
            client,
            zone_cache: Mutex::new(HashMap::new()),
        }
    }

    fn build_request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url, path);
        self.client
            .request(method, url)
            .bearer_auth(&self.config.api_token)
    }

    async fn envelope<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let body = response.text().await.map_err(classify_transport)?;
        if !status.is_success() {
            return Err(classify_status(status, &body));
        }
        let parsed: Envelope<T> = serde_json::from_str(&body)
            .map_err(|e| Error::ProviderPermanent(format!("malformed response body: {e}")))?;
        if !parsed.success {
            let joined = parsed
                .errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(Error::ProviderPermanent(redact(&joined)));
        }
        parsed
            .result
            .ok_or_else(|| Error::ProviderPermanent("response missing result field".to_string()))
    }

    async fn zone_id(&self, domain: &str) -> Result<String> {
        if let Some(id) = self.zone_cache.lock().await.get(domain) {
            return Ok(id.clone());
        }
        let response = self
            .build_request(reqwest::Method::GET, &format!("/zones?name={domain}"))
            .send()
            .await
            .map_err(classify_transport)?;
        let zones: Vec<Zone> = self.envelope(response).await?;
        let zone = zones
            .into_iter()
            .find(|z| z.name.eq_ignore_ascii_case(domain))
            .ok_or_else(|| Error::ProviderPermanent(format!("no zone found for {domain}")))?;
        self.zone_cache
            .lock()
            .await
            .insert(domain.to_string(), zone.id.clone());
        Ok(zone.id)
    }

    fn to_body(input: RecordInput<'_>) -> DnsRecordBody {
        DnsRecordBody {
            record_type: input.record_type.to_string(),
            name: input.name.to_string(),
            content: input.content.to_string(),
            ttl: input.ttl,
            priority: input.priority,
            comment: input.notes.map(|s| s.to_string()),
        }
    }
}

#[async_trait]
impl ProviderClient for CloudflareLikeProvider {
    async fn ping(&self, domain: &str) -> Result<PingStatus> {
        self.zone_id(domain).await?;
        Ok(PingStatus {
            status: "SUCCESS".to_string(),
            observed_ip: None,
        })
    }

    async fn list_records(&self, domain: &str) -> Result<Vec<TxtRecord>> {
        let zone_id = self.zone_id(domain).await?;
        let response = self
            .build_request(
                reqwest::Method::GET,
                &format!("/zones/{zone_id}/dns_records"),
            )
            .send()
            .await
            .map_err(classify_transport)?;
        let records: Vec<DnsRecord> = self.envelope(response).await?;
        Ok(records
            .into_iter()
            .map(|r| TxtRecord {
                id: r.id,
                name: flattener_common::model::normalize_record_name(&r.name, domain),
                record_type: r.record_type,
                content: r.content,
                ttl: r.ttl,
                priority: r.priority,
                notes: r.comment,
            })
            .collect())
    }

    async fn create_record(&self, domain: &str, input: RecordInput<'_>) -> Result<String> {
        let zone_id = self.zone_id(domain).await?;
        let body = Self::to_body(input);
        let response = self
            .build_request(
                reqwest::Method::POST,
                &format!("/zones/{zone_id}/dns_records"),
            )
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;
        let created: DnsRecord = self.envelope(response).await?;
        Ok(created.id)
    }

    async fn update_record(&self, domain: &str, id: &str, input: RecordInput<'_>) -> Result<()> {
        let zone_id = self.zone_id(domain).await?;
        let body = Self::to_body(input);
        let response = self
            .build_request(
                reqwest::Method::PUT,
                &format!("/zones/{zone_id}/dns_records/{id}"),
            )
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;
        self.envelope::<DnsRecord>(response).await?;
        Ok(())
    }

    async fn delete_record(&self, domain: &str, id: &str) -> Result<()> {
        let zone_id = self.zone_id(domain).await?;
        let response = self
            .build_request(
                reqwest::Method::DELETE,
                &format!("/zones/{zone_id}/dns_records/{id}"),
            )
            .send()
            .await
            .map_err(classify_transport)?;
        self.envelope::<serde_json::Value>(response).await?;
        Ok(())
    }

    async fn delete_by_name_type(
        &self,
        domain: &str,
        record_type: &str,
        subdomain: &str,
    ) -> Result<()> {
        // `list_records` already normalizes the apex name to "@" via
        // `normalize_record_name`, so match against that rather than the
        // bare domain string.
        let target_name = if subdomain == "@" {
            "@".to_string()
        } else {
            format!("{subdomain}.{domain}")
        };
        let records = self.list_records(domain).await?;
        for record in records
            .iter()
            .filter(|r| r.record_type == record_type && r.name == target_name)
        {
            self.delete_record(domain, &record.id).await?;
        }
        Ok(())
    }

    fn attribution(&self) -> String {
        "Managed by the SPF flattener via the Cloudflare-like provider.".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_record_input_to_body() {
        let input = RecordInput {
            name: "@",
            record_type: "TXT",
            content: "v=spf1 ~all",
            ttl: 600,
            priority: None,
            notes: Some("managed"),
        };
        let body = CloudflareLikeProvider::to_body(input);
        assert_eq!(body.record_type, "TXT");
        assert_eq!(body.comment.as_deref(), Some("managed"));
    }
}
