//! Cloudflare API client for DNS operations
//!
//! Uses reqwest with rustls for HTTP requests. Every call is judged by the
//! `success` flag of Cloudflare's response envelope, not by HTTP status alone.

use std::fmt;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use urlencoding::encode;
use zeroize::Zeroizing;

use crate::constants::{CLOUDFLARE_API_BASE, USER_AGENT};
use crate::dns_provider::{DnsProvider, RecordPayload, RecordType, RemoteRecordState};
use crate::metrics;

//==============================================================================
// Types
//==============================================================================

/// A record as returned by the list endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CfRecord {
    pub id: String,
    #[serde(default)]
    pub content: String,
    #[serde(rename = "type", default)]
    pub record_type: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiError>,
    result: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: u64,
    #[serde(default)]
    message: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

fn describe_errors(errors: &[ApiError]) -> String {
    if errors.is_empty() {
        return "no error details".to_string();
    }
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

//==============================================================================
// Client
//==============================================================================

/// Client bound to a single zone
pub struct CloudflareClient {
    api_token: Zeroizing<String>,
    zone_id: Zeroizing<String>,
    base_url: String,
    client: reqwest::Client,
}

impl fmt::Debug for CloudflareClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudflareClient")
            .field("api_token", &"<REDACTED>")
            .field("zone_id", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl CloudflareClient {
    pub fn new(api_token: &str, zone_id: &str, timeout: Duration) -> Result<Self> {
        Self::with_base_url(api_token, zone_id, timeout, CLOUDFLARE_API_BASE)
    }

    /// Builds a client against a non-default API root
    pub fn with_base_url(
        api_token: &str,
        zone_id: &str,
        timeout: Duration,
        base_url: &str,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("build reqwest client")?;

        Ok(Self {
            api_token: Zeroizing::new(api_token.to_string()),
            zone_id: Zeroizing::new(zone_id.to_string()),
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn records_url(&self) -> String {
        format!("{}/zones/{}/dns_records", self.base_url, self.zone_id.as_str())
    }

    /// Lists records matching `(name, type)` in the zone
    pub async fn list_records(&self, name: &str, record_type: RecordType) -> Result<Vec<CfRecord>> {
        let url = format!(
            "{}?type={}&name={}",
            self.records_url(),
            record_type,
            encode(name)
        );

        debug!("GET dns_records type={} name={}", record_type, name);
        let _timer = metrics::start_provider_timer("list");
        let request = self.client.get(&url).bearer_auth(self.api_token.as_str());
        let records: Option<Vec<CfRecord>> = self.execute(request, "List").await?;

        // A missing result is not a confirmed absence
        records.context("List returned success but no result")
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        operation: &str,
    ) -> Result<Option<T>> {
        let resp = request
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("{} request failed", operation))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("{} response unreadable", operation))?;

        let body: ApiResponse<T> = match serde_json::from_str(&text) {
            Ok(body) => body,
            Err(e) => bail!(
                "{} returned malformed response (HTTP {}): {}",
                operation,
                status.as_u16(),
                e
            ),
        };

        if !body.success {
            if status == StatusCode::TOO_MANY_REQUESTS {
                bail!("Rate limited by Cloudflare");
            }
            if status.is_server_error() {
                bail!("Cloudflare server error: {}", status.as_u16());
            }
            bail!(
                "{} failed (HTTP {}): {}",
                operation,
                status.as_u16(),
                describe_errors(&body.errors)
            );
        }

        Ok(body.result)
    }
}

#[async_trait]
impl DnsProvider for CloudflareClient {
    async fn find_record(
        &self,
        name: &str,
        record_type: RecordType,
    ) -> Result<RemoteRecordState> {
        let records = self.list_records(name, record_type).await?;
        if records.len() > 1 {
            warn!(
                "{} {} records found for {}; reconciling the first",
                records.len(),
                record_type,
                name
            );
        }

        Ok(match records.into_iter().next() {
            Some(record) => RemoteRecordState::existing(record.id, record.content),
            None => RemoteRecordState::absent(),
        })
    }

    async fn create_record(&self, payload: &RecordPayload) -> Result<()> {
        debug!("POST dns_records {} {}", payload.record_type, payload.name);
        let _timer = metrics::start_provider_timer("create");
        let request = self
            .client
            .post(self.records_url())
            .bearer_auth(self.api_token.as_str())
            .json(payload);
        let _: Option<serde_json::Value> = self.execute(request, "Create").await?;
        Ok(())
    }

    async fn update_record(&self, record_id: &str, payload: &RecordPayload) -> Result<()> {
        debug!(
            "PUT dns_records/{} {} {}",
            record_id, payload.record_type, payload.name
        );
        let _timer = metrics::start_provider_timer("update");
        let url = format!("{}/{}", self.records_url(), encode(record_id));
        let request = self
            .client
            .put(&url)
            .bearer_auth(self.api_token.as_str())
            .json(payload);
        let _: Option<serde_json::Value> = self.execute(request, "Update").await?;
        Ok(())
    }
}

//==============================================================================
// Tests
//==============================================================================
