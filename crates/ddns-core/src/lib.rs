// # ddns-core
//
// Core library for the dynamic-DNS reconciler.
//
// ## Architecture Overview
//
// On every pass the scan loop resolves the public IPv4 address, lists the
// domains on the provider account, and reconciles the configured A records
// of each domain so they point at that address:
//
// - **IpSource**: Trait for resolving the current public IPv4 address
// - **DnsProvider**: Trait for listing domains and listing/writing A records
// - **reconcile**: Pure diff (`plan`) plus per-domain execution (`Reconciler`)
// - **ScanLoop**: Scanning/Waiting loop over all configured domains
// - **ProviderRegistry**: Plugin-based registry for providers and IP sources
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Diff logic is provider-agnostic; clients only talk HTTP
// 2. **Minimal Writes**: Records already pointing at the IP are left alone
// 3. **Failure Isolation**: A failed write never aborts the rest of a pass
// 4. **Plugin-Based**: Providers are registered by type name, no hard-coded if-else
// 5. **Library-First**: The daemon is a thin layer over this crate

pub mod traits;
pub mod engine;
pub mod reconcile;
pub mod registry;
pub mod config;
pub mod error;

// Re-export core types for convenience
pub use traits::{DnsProvider, IpSource};
pub use engine::{ScanEvent, ScanLoop};
pub use reconcile::{DomainReport, ReconciliationPlan, Reconciler};
pub use registry::ProviderRegistry;
pub use config::{DdnsConfig, DomainConfig, IpSourceConfig, ProviderConfig};
pub use error::{Error, Result};
