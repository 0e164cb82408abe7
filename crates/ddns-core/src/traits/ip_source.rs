// # IP Source Trait
//
// Defines how the scan loop learns the caller's current public IPv4 address.
//
// ## Implementations
//
// - HTTP "what is my IP" services: `ddns-ip-http` crate
//
// The scan loop calls `current()` exactly once per pass and shares the
// result, read-only, across every domain in that pass. A failure is fatal:
// writing records with a stale or missing address would point them at the
// wrong host.

use async_trait::async_trait;
use std::net::Ipv4Addr;

/// Trait for external IP source implementations
///
/// Implementations must be thread-safe and usable across async tasks. They
/// must not cache across calls; each call reflects the address at that time.
#[async_trait]
pub trait IpSource: Send + Sync {
    /// Resolve the current public IPv4 address
    ///
    /// # Returns
    ///
    /// - `Ok(Ipv4Addr)`: The current public address
    /// - `Err(Error::IpSource)`: If no source could determine it
    async fn current(&self) -> Result<Ipv4Addr, crate::Error>;

    /// Short name for logs
    fn source_name(&self) -> &'static str;
}

/// Helper trait for constructing IP sources from configuration
pub trait IpSourceFactory: Send + Sync {
    /// Create an IpSource instance from configuration
    fn create(
        &self,
        config: &crate::config::IpSourceConfig,
    ) -> Result<Box<dyn IpSource>, crate::Error>;
}
