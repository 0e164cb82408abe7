// # GoDaddy DNS Provider
//
// GoDaddy client for the DDNS reconciler.
//
// GoDaddy addresses A records by `(domain, type, name)` and a `PUT` to that
// path replaces whatever is there, creating it if absent. There is no record
// id, so this provider reports `supports_listing() == false` and the
// reconciler writes every configured subdomain each pass.
//
// ## Security Requirements
//
// - API key and secret NEVER appear in logs or `Debug` output
//
// ## API Reference
//
// - List domains: GET `/v1/domains`
// - Get A records by name: GET `/v1/domains/:domain/records/A/:name`
// - Replace A records by name: PUT `/v1/domains/:domain/records/A/:name`

use async_trait::async_trait;
use ddns_core::config::ProviderConfig;
use ddns_core::traits::{
    ARecord, ARecordUpsert, DnsProvider, DnsProviderFactory, RegisteredDomain, UpsertOutcome,
};
use ddns_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// GoDaddy API base URL
const GODADDY_API_BASE: &str = "https://api.godaddy.com";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const PROVIDER_NAME: &str = "godaddy";

/// Entry of the `GET /v1/domains` response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DomainSummary {
    domain: String,
    #[allow(dead_code)]
    domain_id: u64,
    status: String,
}

/// Entry of the `GET /v1/domains/:domain/records/A/:name` response
#[derive(Debug, Deserialize)]
struct DnsRecord {
    data: String,
    name: String,
    ttl: u32,
    #[serde(rename = "type")]
    record_type: String,
}

/// Body element of the replace request
#[derive(Debug, Serialize)]
struct RecordBody {
    data: String,
    ttl: u32,
}

/// Parse a `GET /v1/domains` response
///
/// A domain is active only when its status is exactly `ACTIVE`.
pub fn parse_domains(body: &str) -> Result<Vec<RegisteredDomain>> {
    let domains: Vec<DomainSummary> = parse_payload(body, "domain list")?;
    Ok(domains
        .into_iter()
        .map(|d| RegisteredDomain {
            active: d.status == "ACTIVE",
            name: d.domain,
        })
        .collect())
}

/// Parse a `GET /v1/domains/:domain/records/A/:name` response
pub fn parse_records(body: &str) -> Result<Vec<ARecord>> {
    let records: Vec<DnsRecord> = parse_payload(body, "A record list")?;
    Ok(records
        .into_iter()
        .filter(|r| r.record_type == "A")
        .map(|r| ARecord {
            id: None,
            name: r.name,
            data: r.data,
            ttl: r.ttl,
        })
        .collect())
}

fn parse_payload<T: DeserializeOwned>(body: &str, what: &str) -> Result<T> {
    serde_json::from_str(body)
        .map_err(|e| Error::schema(format!("GoDaddy {} did not match schema: {}", what, e)))
}

fn status_error(status: reqwest::StatusCode, body: &str, context: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::auth(format!(
            "GoDaddy rejected the API key during {}. Status: {}",
            context, status
        )),
        404 => Error::not_found(format!("{}: {}", context, status)),
        409 | 422 => Error::conflict(format!("{}: {} - {}", context, status, body)),
        429 => Error::rate_limited(format!(
            "{}: rate limit exceeded. Status: {}",
            context, status
        )),
        _ => Error::provider(
            PROVIDER_NAME,
            format!("{} failed: {} - {}", context, status, body),
        ),
    }
}

/// GoDaddy DNS provider
pub struct GoDaddyProvider {
    /// ⚠️ NEVER log these values
    key: String,
    secret: String,

    base_url: String,
    client: reqwest::Client,
    dry_run: bool,
}

impl std::fmt::Debug for GoDaddyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoDaddyProvider")
            .field("key", &"<REDACTED>")
            .field("secret", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl GoDaddyProvider {
    /// Create a new GoDaddy provider
    ///
    /// # Errors
    ///
    /// `Error::Config` if either credential is empty.
    pub fn new(key: impl Into<String>, secret: impl Into<String>, dry_run: bool) -> Result<Self> {
        let key = key.into();
        let secret = secret.into();
        if key.is_empty() || secret.is_empty() {
            return Err(Error::config("GoDaddy API key and secret cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            key,
            secret,
            base_url: GODADDY_API_BASE.to_string(),
            client,
            dry_run,
        })
    }

    /// Point the provider at a different API host (e.g. the OTE sandbox)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn authorization(&self) -> String {
        format!("sso-key {}:{}", self.key, self.secret)
    }

    fn record_url(&self, domain: &str, subdomain: &str) -> String {
        format!("{}/v1/domains/{}/records/A/{}", self.base_url, domain, subdomain)
    }

    async fn send(&self, request: reqwest::RequestBuilder, context: &str) -> Result<String> {
        let response = request
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .send()
            .await
            .map_err(|e| Error::network(format!("HTTP request failed during {}: {}", context, e)))?;

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
}

#[async_trait]
impl DnsProvider for GoDaddyProvider {
    async fn list_domains(&self) -> Result<Vec<RegisteredDomain>> {
        let url = format!("{}/v1/domains", self.base_url);
        let body = self.send(self.client.get(url), "domain listing").await?;
        let domains = parse_domains(&body)?;

        tracing::debug!("GoDaddy account holds {} domain(s)", domains.len());
        Ok(domains)
    }

    async fn list_a_records(&self, domain: &str, subdomain: Option<&str>) -> Result<Vec<ARecord>> {
        let Some(subdomain) = subdomain else {
            return Err(Error::invalid_input(
                "GoDaddy can only list A records by name",
            ));
        };

        let context = format!("A record lookup of {} on {}", subdomain, domain);
        let body = self
            .send(self.client.get(self.record_url(domain, subdomain)), &context)
            .await?;
        parse_records(&body)
    }

    async fn upsert_a_record(&self, request: &ARecordUpsert) -> Result<UpsertOutcome> {
        let body = [RecordBody {
            data: request.ip.to_string(),
            ttl: request.ttl,
        }];
        let context = format!("write of {} on {}", request.subdomain, request.domain);

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send {} with payload: {}",
                context,
                serde_json::to_string(&body)?
            );
            return Ok(UpsertOutcome::DryRun);
        }

        let builder = self
            .client
            .put(self.record_url(&request.domain, &request.subdomain))
            .json(&body);
        self.send(builder, &context).await?;

        // A replace-by-name cannot tell creation from update.
        Ok(UpsertOutcome::Updated)
    }

    fn supports_listing(&self) -> bool {
        false
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

/// Factory for creating GoDaddy providers
pub struct GoDaddyFactory;

impl DnsProviderFactory for GoDaddyFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        let ProviderConfig::GoDaddy { key, secret } = config else {
            return Err(Error::config("Invalid config for GoDaddy provider"));
        };

        let dry_run = std::env::var("DDNS_MODE")
            .unwrap_or_default()
            .eq_ignore_ascii_case("dry-run");
        if dry_run {
            tracing::warn!("GoDaddy provider running in DRY-RUN mode - no changes will be made");
        }

        Ok(Box::new(GoDaddyProvider::new(
            key.clone(),
            secret.clone(),
            dry_run,
        )?))
    }
}

/// Register the GoDaddy provider with a registry
pub fn register(registry: &ddns_core::ProviderRegistry) {
    registry.register_provider(PROVIDER_NAME, Box::new(GoDaddyFactory));
}
