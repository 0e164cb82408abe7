// # DNS Provider Trait
//
// Defines the contract every DNS provider client implements: list the
// domains on the account, list A records, and create or update one A record.
//
// ## Implementations
//
// - DigitalOcean: `ddns-provider-digitalocean` crate (read-then-diff)
// - GoDaddy: `ddns-provider-godaddy` crate (always-write)
//
// ## Usage
//
// ```rust,ignore
// use ddns_core::traits::{ARecordUpsert, DnsProvider};
//
// let provider = /* DnsProvider implementation */;
// let records = provider.list_a_records("example.com", None).await?;
// provider
//     .upsert_a_record(&ARecordUpsert::create("example.com", "home", ip, 600))
//     .await?;
// ```

use async_trait::async_trait;
use std::net::Ipv4Addr;

/// Opaque provider-side record identifier
///
/// DigitalOcean identifies records numerically; GoDaddy has no identifier
/// and addresses records by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(String);

impl RecordId {
    /// Wrap a provider identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as sent back to the provider
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for RecordId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// A domain registered on the provider account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredDomain {
    /// Domain name, e.g. "example.com"
    pub name: String,
    /// Whether the provider reports the domain as active
    pub active: bool,
}

impl RegisteredDomain {
    /// A domain the provider only reports as existing
    pub fn active(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            active: true,
        }
    }
}

/// An A record as currently held by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ARecord {
    /// Provider identifier, when the provider has one
    pub id: Option<RecordId>,
    /// Record name relative to the domain ("@" for the apex)
    pub name: String,
    /// Record data, expected to be an IPv4 address
    pub data: String,
    /// Time-to-live in seconds
    pub ttl: u32,
}

impl ARecord {
    /// Whether the record already resolves to `ip`
    ///
    /// Data that does not parse as IPv4 never matches, so it gets rewritten.
    pub fn points_to(&self, ip: Ipv4Addr) -> bool {
        self.data.trim().parse::<Ipv4Addr>().is_ok_and(|data| data == ip)
    }
}

/// A single create-or-update request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ARecordUpsert {
    /// Domain the record lives in
    pub domain: String,
    /// Record name relative to the domain
    pub subdomain: String,
    /// Address the record must point at
    pub ip: Ipv4Addr,
    /// Time-to-live in seconds
    pub ttl: u32,
    /// Existing record to update; `None` creates (or, for name-addressed
    /// providers, writes by name)
    pub record_id: Option<RecordId>,
}

impl ARecordUpsert {
    /// Request that creates a new record
    pub fn create(
        domain: impl Into<String>,
        subdomain: impl Into<String>,
        ip: Ipv4Addr,
        ttl: u32,
    ) -> Self {
        Self {
            domain: domain.into(),
            subdomain: subdomain.into(),
            ip,
            ttl,
            record_id: None,
        }
    }

    /// Request that overwrites an existing record
    ///
    /// `record_id` is `None` for providers that address records by name.
    pub fn update(
        domain: impl Into<String>,
        subdomain: impl Into<String>,
        ip: Ipv4Addr,
        ttl: u32,
        record_id: Option<RecordId>,
    ) -> Self {
        Self {
            record_id,
            ..Self::create(domain, subdomain, ip, ttl)
        }
    }
}

/// What an upsert did on the provider side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new record was created
    Created,
    /// An existing record was overwritten
    Updated,
    /// Dry-run mode: the request was logged, not sent
    DryRun,
}

/// Trait for DNS provider clients
///
/// Implementations hold their credentials and HTTP client, issue exactly the
/// requests asked of them, and validate every response payload before
/// trusting it. They do not retry, cache, or decide whether a write is
/// needed; that belongs to the reconciler and the scan loop.
///
/// # Errors
///
/// - Rejected credentials: [`Error::Authentication`](crate::Error::Authentication)
/// - Transport failures: [`Error::Network`](crate::Error::Network)
/// - Payloads of the wrong shape: [`Error::Schema`](crate::Error::Schema)
/// - Writes the provider refuses: [`Error::Conflict`](crate::Error::Conflict)
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// List the domains registered on the account
    async fn list_domains(&self) -> Result<Vec<RegisteredDomain>, crate::Error>;

    /// List A records of `domain`, optionally only those named `subdomain`
    ///
    /// Providers without bulk listing reject a `None` filter with
    /// [`Error::InvalidInput`](crate::Error::InvalidInput).
    async fn list_a_records(
        &self,
        domain: &str,
        subdomain: Option<&str>,
    ) -> Result<Vec<ARecord>, crate::Error>;

    /// Create or update one A record
    ///
    /// Re-issuing the same request after a success must not produce an
    /// additional record.
    async fn upsert_a_record(
        &self,
        request: &ARecordUpsert,
    ) -> Result<UpsertOutcome, crate::Error>;

    /// Whether the reconciler should read existing records and diff
    ///
    /// When `false`, every configured subdomain is written every pass.
    fn supports_listing(&self) -> bool;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS providers from configuration
pub trait DnsProviderFactory: Send + Sync {
    /// Create a DnsProvider instance from configuration
    fn create(
        &self,
        config: &crate::config::ProviderConfig,
    ) -> Result<Box<dyn DnsProvider>, crate::Error>;
}
