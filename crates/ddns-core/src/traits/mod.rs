//! Core traits for the DDNS reconciler
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`IpSource`]: Resolve the current public IPv4 address
//! - [`DnsProvider`]: List and write A records via provider APIs

pub mod ip_source;
pub mod dns_provider;

pub use ip_source::{IpSource, IpSourceFactory};
pub use dns_provider::{
    ARecord, ARecordUpsert, DnsProvider, DnsProviderFactory, RecordId, RegisteredDomain,
    UpsertOutcome,
};
