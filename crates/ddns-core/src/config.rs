//! Configuration types for the DDNS reconciler
//!
//! The configuration is a JSON document loaded once at startup and passed by
//! value into the scan loop. Numeric fields accept either JSON numbers or
//! numeric strings. Besides the tagged `provider` object, the flat layouts
//! `{ "apiKey": ... }` (DigitalOcean) and
//! `{ "godaddyKey": ..., "godaddySecret": ... }` (GoDaddy) are accepted.
//!
//! ```json
//! {
//!   "scanInterval": 300,
//!   "provider": { "type": "digitalocean", "apiKey": "dop_v1_..." },
//!   "domains": [
//!     { "domain": "example.com", "ttl": 600, "subdomains": ["home", "vpn"] }
//!   ]
//! }
//! ```

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

/// Default TTL for created and updated records, in seconds
pub const DEFAULT_TTL: u32 = 600;

/// Services queried by the HTTP IP source when none are configured
pub const DEFAULT_IP_SERVICES: &[&str] = &[
    "https://api.ipify.org",
    "https://ifconfig.me/ip",
    "https://icanhazip.com",
];

/// Main DDNS configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawConfig")]
pub struct DdnsConfig {
    /// Wait between the end of one pass and the start of the next, in seconds
    pub scan_interval_secs: u64,

    /// DNS provider and its credentials
    pub provider: ProviderConfig,

    /// How the external IPv4 address is discovered
    pub ip_source: IpSourceConfig,

    /// Domains to reconcile, in processing order
    pub domains: Vec<DomainConfig>,
}

impl DdnsConfig {
    /// Create a configuration from its parts
    pub fn new(
        scan_interval_secs: u64,
        provider: ProviderConfig,
        domains: Vec<DomainConfig>,
    ) -> Self {
        Self {
            scan_interval_secs,
            provider,
            ip_source: IpSourceConfig::default(),
            domains,
        }
    }

    /// Parse and validate a JSON configuration document
    pub fn from_json_str(json: &str) -> Result<Self, crate::Error> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| crate::Error::config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, crate::Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            crate::Error::config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&contents)
    }

    /// The scan interval as a duration
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.scan_interval_secs == 0 {
            return Err(crate::Error::config("scanInterval must be > 0 seconds"));
        }

        if self.domains.is_empty() {
            return Err(crate::Error::config("No domains configured"));
        }

        self.provider.validate()?;
        self.ip_source.validate()?;

        for domain in &self.domains {
            domain.validate()?;
        }

        Ok(())
    }
}

/// On-disk layout before the provider is resolved
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    #[serde(deserialize_with = "coerce_u64")]
    scan_interval: u64,
    #[serde(default)]
    provider: Option<ProviderConfig>,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    godaddy_key: Option<String>,
    #[serde(default)]
    godaddy_secret: Option<String>,
    #[serde(default)]
    ip_source: IpSourceConfig,
    domains: Vec<DomainConfig>,
}

impl TryFrom<RawConfig> for DdnsConfig {
    type Error = crate::Error;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        let provider = match (raw.provider, raw.api_key, raw.godaddy_key, raw.godaddy_secret) {
            (Some(provider), None, None, None) => provider,
            (None, Some(api_key), None, None) => ProviderConfig::DigitalOcean { api_key },
            (None, None, Some(key), Some(secret)) => ProviderConfig::GoDaddy { key, secret },
            (None, None, None, None) => {
                return Err(crate::Error::config(
                    "No provider configured: set `provider`, `apiKey`, or `godaddyKey` and `godaddySecret`",
                ));
            }
            (None, None, Some(_), None) | (None, None, None, Some(_)) => {
                return Err(crate::Error::config(
                    "`godaddyKey` and `godaddySecret` must be set together",
                ));
            }
            _ => {
                return Err(crate::Error::config(
                    "Ambiguous provider: configure exactly one of `provider`, `apiKey`, `godaddyKey`",
                ));
            }
        };

        Ok(Self {
            scan_interval_secs: raw.scan_interval,
            provider,
            ip_source: raw.ip_source,
            domains: raw.domains,
        })
    }
}

/// DNS provider configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProviderConfig {
    /// DigitalOcean, bearer-token authentication
    #[serde(rename = "digitalocean")]
    DigitalOcean {
        /// Personal access token with read/write scope
        #[serde(rename = "apiKey")]
        api_key: String,
    },

    /// GoDaddy, `sso-key` authentication
    #[serde(rename = "godaddy")]
    GoDaddy {
        /// API key
        key: String,
        /// API secret
        secret: String,
    },
}

impl ProviderConfig {
    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProviderConfig::DigitalOcean { api_key } => {
                validate_credential("DigitalOcean apiKey", api_key)
            }
            ProviderConfig::GoDaddy { key, secret } => {
                validate_credential("GoDaddy key", key)?;
                validate_credential("GoDaddy secret", secret)
            }
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::DigitalOcean { .. } => "digitalocean",
            ProviderConfig::GoDaddy { .. } => "godaddy",
        }
    }
}

// Credentials are never printed.
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::DigitalOcean { .. } => f
                .debug_struct("DigitalOcean")
                .field("api_key", &"<REDACTED>")
                .finish(),
            ProviderConfig::GoDaddy { .. } => f
                .debug_struct("GoDaddy")
                .field("key", &"<REDACTED>")
                .field("secret", &"<REDACTED>")
                .finish(),
        }
    }
}

fn validate_credential(label: &str, value: &str) -> Result<(), crate::Error> {
    if value.trim().is_empty() {
        return Err(crate::Error::config(format!("{} cannot be empty", label)));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(crate::Error::config(format!(
            "{} contains whitespace; check for a copy/paste error",
            label
        )));
    }
    Ok(())
}

/// External IP source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpSourceConfig {
    /// Ask plain-text "what is my IP" services, first answer wins
    Http {
        /// Services to query, in order
        #[serde(default = "default_ip_services")]
        urls: Vec<String>,

        /// Per-request timeout in seconds
        #[serde(
            rename = "timeoutSecs",
            default = "default_ip_timeout_secs",
            deserialize_with = "coerce_u64"
        )]
        timeout_secs: u64,
    },
}

impl IpSourceConfig {
    /// Validate the IP source configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            IpSourceConfig::Http { urls, timeout_secs } => {
                if urls.is_empty() {
                    return Err(crate::Error::config("HTTP IP source needs at least one URL"));
                }
                for url in urls {
                    if !url.starts_with("https://") && !url.starts_with("http://") {
                        return Err(crate::Error::config(format!(
                            "IP source URL must use HTTP or HTTPS scheme. Got: {}",
                            url
                        )));
                    }
                }
                if *timeout_secs == 0 {
                    return Err(crate::Error::config("HTTP IP source timeout must be > 0"));
                }
                Ok(())
            }
        }
    }

    /// Get the IP source type name
    pub fn type_name(&self) -> &str {
        match self {
            IpSourceConfig::Http { .. } => "http",
        }
    }
}

impl Default for IpSourceConfig {
    fn default() -> Self {
        IpSourceConfig::Http {
            urls: default_ip_services(),
            timeout_secs: default_ip_timeout_secs(),
        }
    }
}

fn default_ip_services() -> Vec<String> {
    DEFAULT_IP_SERVICES.iter().map(|s| s.to_string()).collect()
}

fn default_ip_timeout_secs() -> u64 {
    10
}

/// One domain and the subdomains whose A records should track the external IP
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Registered domain name, e.g. "example.com"
    pub domain: String,

    /// TTL applied to created and updated records
    #[serde(default = "default_ttl", deserialize_with = "coerce_u32")]
    pub ttl: u32,

    /// Record names relative to the domain ("@" for the apex)
    pub subdomains: Vec<String>,
}

impl DomainConfig {
    /// Create a domain configuration with the default TTL
    pub fn new<I, S>(domain: impl Into<String>, subdomains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            domain: domain.into(),
            ttl: DEFAULT_TTL,
            subdomains: subdomains.into_iter().map(Into::into).collect(),
        }
    }

    /// Set the TTL
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// The configured subdomains as a set; duplicates collapse
    pub fn desired(&self) -> BTreeSet<String> {
        self.subdomains.iter().cloned().collect()
    }

    /// Validate the domain configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        validate_domain_name(&self.domain)?;

        if self.ttl == 0 {
            return Err(crate::Error::config(format!(
                "TTL for {} must be > 0",
                self.domain
            )));
        }

        for subdomain in &self.subdomains {
            validate_subdomain(&self.domain, subdomain)?;
        }

        Ok(())
    }
}

fn default_ttl() -> u32 {
    DEFAULT_TTL
}

/// Basic RFC 1035 checks on a registered domain name
fn validate_domain_name(domain: &str) -> Result<(), crate::Error> {
    if domain.is_empty() {
        return Err(crate::Error::config("Domain name cannot be empty"));
    }

    if domain.len() > 253 {
        return Err(crate::Error::config(format!(
            "Domain name too long: {} chars (max 253). Got: {}",
            domain.len(),
            domain
        )));
    }

    for label in domain.split('.') {
        if label.is_empty() {
            return Err(crate::Error::config(format!(
                "Domain name has empty label: '{}'",
                domain
            )));
        }
        if label.len() > 63 {
            return Err(crate::Error::config(format!(
                "Domain label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            )));
        }
        if !label.chars().all(|c| c.is_alphanumeric() || c == '-') {
            return Err(crate::Error::config(format!(
                "Domain label contains invalid characters. Label: '{}'",
                label
            )));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(crate::Error::config(format!(
                "Domain label cannot start or end with hyphen. Label: '{}'",
                label
            )));
        }
    }

    Ok(())
}

/// Subdomains end up in request paths, so reject anything URL-significant
fn validate_subdomain(domain: &str, subdomain: &str) -> Result<(), crate::Error> {
    if subdomain.is_empty() {
        return Err(crate::Error::config(format!(
            "Empty subdomain configured for {}",
            domain
        )));
    }
    if subdomain.len() > 253 {
        return Err(crate::Error::config(format!(
            "Subdomain too long for {}: {}",
            domain, subdomain
        )));
    }
    if subdomain
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#' | '%'))
    {
        return Err(crate::Error::config(format!(
            "Subdomain '{}' of {} contains invalid characters",
            subdomain, domain
        )));
    }
    Ok(())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Integer(u64),
    Float(f64),
    Text(String),
}

fn coerce_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Integer(n) => Ok(n),
        NumberOrString::Float(f) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => {
            Ok(f as u64)
        }
        NumberOrString::Float(f) => Err(D::Error::custom(format!(
            "expected a non-negative whole number, got {}",
            f
        ))),
        NumberOrString::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("expected a number, got {:?}", s))),
    }
}

fn coerce_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = coerce_u64(deserializer)?;
    u32::try_from(value).map_err(|_| D::Error::custom(format!("{} is out of range", value)))
}
