// # HTTP IP Source
//
// Resolves the public IPv4 address by asking "what is my IP" services over
// HTTPS. Services are tried in configured order; the first one answering
// with a plain-text IPv4 address wins.
//
// Nothing is cached: every pass performs a fresh lookup.

use ddns_core::ProviderRegistry;
use ddns_core::config::IpSourceConfig;
use ddns_core::traits::{IpSource, IpSourceFactory};
use ddns_core::{Error, Result};

use std::net::Ipv4Addr;
use std::time::Duration;

/// HTTP-based public IPv4 source with failover across services
#[derive(Debug)]
pub struct HttpIpSource {
    /// Services to query, in order
    urls: Vec<String>,

    /// HTTP client (carries the per-request timeout)
    client: reqwest::Client,
}

impl HttpIpSource {
    /// Create a new HTTP IP source
    ///
    /// # Errors
    ///
    /// `Error::Config` when `urls` is empty.
    pub fn new(urls: Vec<String>, timeout: Duration) -> Result<Self> {
        if urls.is_empty() {
            return Err(Error::config("HTTP IP source needs at least one URL"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { urls, client })
    }

    /// Fetch the address from a single service
    async fn fetch_from(&self, url: &str) -> Result<Ipv4Addr> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::network(format!("Request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::http(format!(
                "{} answered with HTTP {}",
                url,
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::network(format!("Failed to read response from {}: {}", url, e)))?;

        parse_ipv4_body(&body)
    }
}

/// Parse a plain-text service answer into an IPv4 address
///
/// Surrounding whitespace is ignored. IPv6 answers are rejected.
pub fn parse_ipv4_body(body: &str) -> Result<Ipv4Addr> {
    let text = body.trim();
    text.parse::<Ipv4Addr>()
        .map_err(|_| Error::schema(format!("Not an IPv4 address: {:?}", text)))
}

#[async_trait::async_trait]
impl IpSource for HttpIpSource {
    async fn current(&self) -> Result<Ipv4Addr> {
        let mut failures = Vec::with_capacity(self.urls.len());

        for url in &self.urls {
            match self.fetch_from(url).await {
                Ok(ip) => {
                    tracing::debug!("Resolved public IPv4 {} via {}", ip, url);
                    return Ok(ip);
                }
                Err(e) => {
                    tracing::debug!("IP lookup via {} failed: {}", url, e);
                    failures.push(e.to_string());
                }
            }
        }

        Err(Error::ip_source(format!(
            "All {} IP services failed: {}",
            self.urls.len(),
            failures.join("; ")
        )))
    }

    fn source_name(&self) -> &'static str {
        "http"
    }
}

/// Factory for creating HTTP IP sources
pub struct HttpFactory;

impl IpSourceFactory for HttpFactory {
    fn create(&self, config: &IpSourceConfig) -> Result<Box<dyn IpSource>> {
        let IpSourceConfig::Http { urls, timeout_secs } = config;

        Ok(Box::new(HttpIpSource::new(
            urls.clone(),
            Duration::from_secs(*timeout_secs),
        )?))
    }
}

/// Register the HTTP IP source with a registry
pub fn register(registry: &ProviderRegistry) {
    registry.register_ip_source("http", Box::new(HttpFactory));
}
