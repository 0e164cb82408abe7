// # DigitalOcean DNS Provider
//
// This crate provides the DigitalOcean client for the DDNS reconciler.
//
// DigitalOcean can list every A record of a domain in one (paginated) call
// and identifies records by a numeric id, so this provider supports the
// full read-then-diff reconciliation: existing records are updated by id
// with `PUT`, missing ones are created with `POST`.
//
// ## Behaviour
//
// - One HTTP request per page or per write; no retries (the next pass retries)
// - 30 second timeout per request
// - Every payload is deserialized into typed structs before use; a shape
//   mismatch is `Error::Schema`
// - Pagination links are only followed when they stay on the API host, so
//   the token is never sent elsewhere
// - Dry-run mode performs reads and logs writes without sending them
//
// ## Security Requirements
//
// - API token NEVER appears in logs or `Debug` output
// - Provider fails fast if the token is empty
//
// ## API Reference
//
// - List domains: GET `/v2/domains`
// - List A records: GET `/v2/domains/:domain/records?type=A`
// - Create record: POST `/v2/domains/:domain/records`
// - Update record: PUT `/v2/domains/:domain/records/:id`

use async_trait::async_trait;
use ddns_core::config::ProviderConfig;
use ddns_core::traits::{
    ARecord, ARecordUpsert, DnsProvider, DnsProviderFactory, RecordId, RegisteredDomain,
    UpsertOutcome,
};
use ddns_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// DigitalOcean API base URL
const DIGITALOCEAN_API_BASE: &str = "https://api.digitalocean.com";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest page size the API accepts
const PAGE_SIZE: u32 = 200;

/// Upper bound on followed pagination links
const MAX_PAGES: usize = 50;

/// Provider name used in logs and errors
const PROVIDER_NAME: &str = "digitalocean";

/// `GET /v2/domains` response
#[derive(Debug, Deserialize)]
struct DomainsPage {
    domains: Vec<DomainEntry>,
    #[serde(default)]
    links: Links,
    #[allow(dead_code)]
    meta: Meta,
}

#[derive(Debug, Deserialize)]
struct DomainEntry {
    name: String,
}

/// `GET /v2/domains/:domain/records` response
#[derive(Debug, Deserialize)]
struct RecordsPage {
    domain_records: Vec<DomainRecord>,
    #[serde(default)]
    links: Links,
    #[allow(dead_code)]
    meta: Meta,
}

/// `POST`/`PUT` record response
#[derive(Debug, Deserialize)]
struct RecordEnvelope {
    domain_record: DomainRecord,
}

#[derive(Debug, Deserialize)]
struct DomainRecord {
    id: u64,
    #[serde(rename = "type")]
    record_type: String,
    name: String,
    data: String,
    ttl: u32,
}

#[derive(Debug, Default, Deserialize)]
struct Links {
    #[serde(default)]
    pages: Option<Pages>,
}

#[derive(Debug, Default, Deserialize)]
struct Pages {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Meta {
    #[allow(dead_code)]
    total: u64,
}

/// Request body for creating or updating an A record
#[derive(Debug, Serialize)]
struct RecordBody<'a> {
    #[serde(rename = "type")]
    record_type: &'static str,
    name: &'a str,
    data: String,
    ttl: u32,
}

impl From<DomainRecord> for ARecord {
    fn from(record: DomainRecord) -> Self {
        ARecord {
            id: Some(RecordId::from(record.id)),
            name: record.name,
            data: record.data,
            ttl: record.ttl,
        }
    }
}

/// Parse a `GET /v2/domains` page into domains and the next page link
pub fn parse_domains_page(body: &str) -> Result<(Vec<RegisteredDomain>, Option<String>)> {
    let page: DomainsPage = parse_payload(body, "domain list")?;
    let next = page.links.pages.and_then(|p| p.next);
    let domains = page
        .domains
        .into_iter()
        .map(|d| RegisteredDomain::active(d.name))
        .collect();
    Ok((domains, next))
}

/// Parse a `GET /v2/domains/:domain/records` page into A records and the next page link
///
/// Non-A records are dropped even though the request filters on type.
pub fn parse_records_page(body: &str) -> Result<(Vec<ARecord>, Option<String>)> {
    let page: RecordsPage = parse_payload(body, "domain record list")?;
    let next = page.links.pages.and_then(|p| p.next);
    let records = page
        .domain_records
        .into_iter()
        .filter(|r| r.record_type == "A")
        .map(ARecord::from)
        .collect();
    Ok((records, next))
}

fn parse_payload<T: DeserializeOwned>(body: &str, what: &str) -> Result<T> {
    serde_json::from_str(body)
        .map_err(|e| Error::schema(format!("DigitalOcean {} did not match schema: {}", what, e)))
}

/// Record name as DigitalOcean's `name` filter expects it (fully qualified)
fn qualified_name(domain: &str, subdomain: &str) -> String {
    if subdomain == "@" {
        domain.to_string()
    } else {
        format!("{}.{}", subdomain, domain)
    }
}

/// Map a non-success status to the reconciler's error taxonomy
fn status_error(status: reqwest::StatusCode, body: &str, context: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::auth(format!(
            "DigitalOcean rejected the API token during {}. Status: {}",
            context, status
        )),
        404 => Error::not_found(format!("{}: {}", context, status)),
        409 | 422 => Error::conflict(format!("{}: {} - {}", context, status, body)),
        429 => Error::rate_limited(format!(
            "{}: rate limit exceeded. Status: {}",
            context, status
        )),
        500..=599 => Error::provider(
            PROVIDER_NAME,
            format!("Server error (transient) during {}: {} - {}", context, status, body),
        ),
        _ => Error::provider(
            PROVIDER_NAME,
            format!("{} failed: {} - {}", context, status, body),
        ),
    }
}

/// DigitalOcean DNS provider
///
/// Stateless apart from the HTTP client; every call goes to the API.
pub struct DigitalOceanProvider {
    /// Personal access token
    /// ⚠️ NEVER log this value
    api_key: String,

    /// API base URL, overridable for staging endpoints
    base_url: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Dry-run mode: perform reads, log writes
    dry_run: bool,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for DigitalOceanProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigitalOceanProvider")
            .field("api_key", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl DigitalOceanProvider {
    /// Create a new DigitalOcean provider
    ///
    /// # Errors
    ///
    /// `Error::Config` if the token is empty, `Error::Http` if the HTTP
    /// client cannot be built.
    pub fn new(api_key: impl Into<String>, dry_run: bool) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(Error::config("DigitalOcean API token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            base_url: DIGITALOCEAN_API_BASE.to_string(),
            client,
            dry_run,
        })
    }

    /// Point the provider at a different API host
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// GET a URL and return the body of a 2xx response
    async fn get_text(&self, url: &str, context: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| Error::network(format!("HTTP request failed during {}: {}", context, e)))?;

        read_success_body(response, context).await
    }

    /// Follow `links.pages.next` while it stays on our API host
    ///
    /// Scheme, host and port must all match the base URL; the bearer token
    /// goes with every request.
    fn next_page(&self, next: Option<String>) -> Option<String> {
        let next = next?;
        match (reqwest::Url::parse(&self.base_url), reqwest::Url::parse(&next)) {
            (Ok(base), Ok(link)) if same_origin(&base, &link) => Some(next),
            _ => {
                tracing::warn!("Ignoring pagination link outside the API host: {}", next);
                None
            }
        }
    }

    /// POST or PUT a record body and validate the returned record
    async fn write_record(
        &self,
        request: reqwest::RequestBuilder,
        body: &RecordBody<'_>,
        context: &str,
    ) -> Result<ARecord> {
        let response = request
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::network(format!("HTTP request failed during {}: {}", context, e)))?;

        let text = read_success_body(response, context).await?;
        let envelope: RecordEnvelope = parse_payload(&text, "record write response")?;
        Ok(envelope.domain_record.into())
    }
}

fn same_origin(base: &reqwest::Url, link: &reqwest::Url) -> bool {
    base.scheme() == link.scheme()
        && base.host_str() == link.host_str()
        && base.port_or_known_default() == link.port_or_known_default()
}

async fn read_success_body(response: reqwest::Response, context: &str) -> Result<String> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| Error::network(format!("Failed to read response during {}: {}", context, e)))?;

    if !status.is_success() {
        return Err(status_error(status, &body, context));
    }
    Ok(body)
}

#[async_trait]
impl DnsProvider for DigitalOceanProvider {
    async fn list_domains(&self) -> Result<Vec<RegisteredDomain>> {
        let mut url = Some(format!("{}/v2/domains?per_page={}", self.base_url, PAGE_SIZE));
        let mut domains = Vec::new();
        let mut pages = 0;

        while let Some(current) = url.take() {
            let body = self.get_text(&current, "domain listing").await?;
            let (mut page, next) = parse_domains_page(&body)?;
            domains.append(&mut page);

            pages += 1;
            if pages >= MAX_PAGES {
                tracing::warn!("Stopped domain listing after {} pages", pages);
                break;
            }
            url = self.next_page(next);
        }

        tracing::debug!("DigitalOcean account holds {} domain(s)", domains.len());
        Ok(domains)
    }

    async fn list_a_records(&self, domain: &str, subdomain: Option<&str>) -> Result<Vec<ARecord>> {
        let mut first = format!(
            "{}/v2/domains/{}/records?type=A&per_page={}",
            self.base_url, domain, PAGE_SIZE
        );
        if let Some(subdomain) = subdomain {
            first.push_str("&name=");
            first.push_str(&qualified_name(domain, subdomain));
        }

        let context = format!("A record listing for {}", domain);
        let mut url = Some(first);
        let mut records = Vec::new();
        let mut pages = 0;

        while let Some(current) = url.take() {
            let body = self.get_text(&current, &context).await?;
            let (mut page, next) = parse_records_page(&body)?;
            records.append(&mut page);

            pages += 1;
            if pages >= MAX_PAGES {
                tracing::warn!("Stopped record listing for {} after {} pages", domain, pages);
                break;
            }
            url = self.next_page(next);
        }

        if let Some(subdomain) = subdomain {
            records.retain(|r| r.name == subdomain);
        }
        Ok(records)
    }

    async fn upsert_a_record(&self, request: &ARecordUpsert) -> Result<UpsertOutcome> {
        let body = RecordBody {
            record_type: "A",
            name: &request.subdomain,
            data: request.ip.to_string(),
            ttl: request.ttl,
        };

        let (builder, context, outcome) = match &request.record_id {
            Some(id) => {
                let url = format!(
                    "{}/v2/domains/{}/records/{}",
                    self.base_url, request.domain, id
                );
                (
                    self.client.put(url),
                    format!("update of {} on {}", request.subdomain, request.domain),
                    UpsertOutcome::Updated,
                )
            }
            None => {
                let url = format!("{}/v2/domains/{}/records", self.base_url, request.domain);
                (
                    self.client.post(url),
                    format!("creation of {} on {}", request.subdomain, request.domain),
                    UpsertOutcome::Created,
                )
            }
        };

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send {} with payload: {}",
                context,
                serde_json::to_string(&body)?
            );
            return Ok(UpsertOutcome::DryRun);
        }

        let written = self.write_record(builder, &body, &context).await?;
        tracing::debug!(
            "DigitalOcean record {} ({}) now points to {}",
            written.name,
            written.id.as_ref().map(|id| id.to_string()).unwrap_or_default(),
            written.data
        );
        Ok(outcome)
    }

    fn supports_listing(&self) -> bool {
        true
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

/// Factory for creating DigitalOcean providers
pub struct DigitalOceanFactory;

impl DnsProviderFactory for DigitalOceanFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        match config {
            ProviderConfig::DigitalOcean { api_key } => {
                let dry_run = std::env::var("DDNS_MODE")
                    .unwrap_or_default()
                    .eq_ignore_ascii_case("dry-run");

                if dry_run {
                    tracing::warn!(
                        "DigitalOcean provider running in DRY-RUN mode - no changes will be made"
                    );
                }

                Ok(Box::new(DigitalOceanProvider::new(api_key.clone(), dry_run)?))
            }
            _ => Err(Error::config("Invalid config for DigitalOcean provider")),
        }
    }
}

/// Register the DigitalOcean provider with a registry
pub fn register(registry: &ddns_core::ProviderRegistry) {
    registry.register_provider(PROVIDER_NAME, Box::new(DigitalOceanFactory));
}
