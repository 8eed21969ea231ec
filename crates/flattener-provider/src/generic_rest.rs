//! A provider speaking a generic JSON REST dialect: `GET/POST/PUT/DELETE
//! /v1/domains/{domain}/records`. Authenticates via an `X-Api-Key` /
//! `X-Api-Secret` header pair. Grounded on the request-builder pattern of
//! a conventional internal HTTP client wrapper.

use crate::{classify_status, classify_transport, require_success, PingStatus, ProviderClient, RecordInput};
use async_trait::async_trait;
use flattener_common::error::{Error, Result};
use flattener_common::model::TxtRecord;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GenericRestConfig {
    pub base_url: String,
    pub api_key: String,
    pub secret_key: String,
    pub timeout_secs: u64,
}

impl Default for GenericRestConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.example-dns.invalid/v1".to_string(),
            api_key: String::new(),
            secret_key: String::new(),
            timeout_secs: 15,
        }
    }
}

pub struct GenericRestProvider {
    config: GenericRestConfig,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct RecordPayload<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    record_type: &'a str,
    content: &'a str,
    ttl: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct StatusEnvelope<T> {
    status: String,
    message: Option<String>,
    #[serde(default)]
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct CreatedId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PingBody {
    observed_ip: Option<String>,
}

impl GenericRestProvider {
    pub fn new(config: GenericRestConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("failed to build the generic REST HTTP client");
        Self { config, client }
    }

    fn build_request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url, path);
        self.client
            .request(method, url)
            .header("X-Api-Key", &self.config.api_key)
            .header("X-Api-Secret", &self.config.secret_key)
    }

    async fn envelope<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let parsed = self.envelope_raw::<T>(response).await?;
        parsed
            .data
            .ok_or_else(|| Error::ProviderPermanent("response missing data field".to_string()))
    }

    async fn envelope_status_only(&self, response: reqwest::Response) -> Result<()> {
        self.envelope_raw::<serde_json::Value>(response).await?;
        Ok(())
    }

    async fn envelope_raw<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<StatusEnvelope<T>> {
        let status = response.status();
        let body = response.text().await.map_err(classify_transport)?;
        if !status.is_success() {
            return Err(classify_status(status, &body));
        }
        let parsed: StatusEnvelope<T> = serde_json::from_str(&body)
            .map_err(|e| Error::ProviderPermanent(format!("malformed response body: {e}")))?;
        require_success(&parsed.status, parsed.message.as_deref())?;
        Ok(parsed)
    }
}

#[async_trait]
impl ProviderClient for GenericRestProvider {
    async fn ping(&self, domain: &str) -> Result<PingStatus> {
        let response = self
            .build_request(reqwest::Method::GET, &format!("/domains/{domain}/ping"))
            .send()
            .await
            .map_err(classify_transport)?;
        let body: PingBody = self.envelope(response).await?;
        Ok(PingStatus {
            status: "SUCCESS".to_string(),
            observed_ip: body.observed_ip,
        })
    }

    async fn list_records(&self, domain: &str) -> Result<Vec<TxtRecord>> {
        let response = self
            .build_request(reqwest::Method::GET, &format!("/domains/{domain}/records"))
            .send()
            .await
            .map_err(classify_transport)?;
        self.envelope(response).await
    }

    async fn create_record(&self, domain: &str, input: RecordInput<'_>) -> Result<String> {
        let payload = RecordPayload {
            name: input.name,
            record_type: input.record_type,
            content: input.content,
            ttl: input.ttl,
            priority: input.priority,
            notes: input.notes,
        };
        let response = self
            .build_request(reqwest::Method::POST, &format!("/domains/{domain}/records"))
            .json(&payload)
            .send()
            .await
            .map_err(classify_transport)?;
        let created: CreatedId = self.envelope(response).await?;
        Ok(created.id)
    }

    async fn update_record(&self, domain: &str, id: &str, input: RecordInput<'_>) -> Result<()> {
        let payload = RecordPayload {
            name: input.name,
            record_type: input.record_type,
            content: input.content,
            ttl: input.ttl,
            priority: input.priority,
            notes: input.notes,
        };
        let response = self
            .build_request(
                reqwest::Method::PUT,
                &format!("/domains/{domain}/records/{id}"),
            )
            .json(&payload)
            .send()
            .await
            .map_err(classify_transport)?;
        self.envelope_status_only(response).await
    }

    async fn delete_record(&self, domain: &str, id: &str) -> Result<()> {
        let response = self
            .build_request(
                reqwest::Method::DELETE,
                &format!("/domains/{domain}/records/{id}"),
            )
            .send()
            .await
            .map_err(classify_transport)?;
        self.envelope_status_only(response).await
    }

    async fn delete_by_name_type(
        &self,
        domain: &str,
        record_type: &str,
        subdomain: &str,
    ) -> Result<()> {
        let response = self
            .build_request(
                reqwest::Method::DELETE,
                &format!("/domains/{domain}/records?type={record_type}&name={subdomain}"),
            )
            .send()
            .await
            .map_err(classify_transport)?;
        self.envelope_status_only(response).await
    }

    fn attribution(&self) -> String {
        "Managed by the SPF flattener via the generic REST provider.".to_string()
    }
}
