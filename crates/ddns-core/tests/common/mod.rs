//! Test doubles and common utilities for contract tests
//!
//! The mock provider keeps its records in memory and applies writes to
//! them, so consecutive passes observe each other's effects.

#![allow(dead_code)]

use ddns_core::config::{DdnsConfig, DomainConfig, ProviderConfig};
use ddns_core::error::{Error, Result};
use ddns_core::traits::{
    ARecord, ARecordUpsert, DnsProvider, IpSource, RecordId, RegisteredDomain, UpsertOutcome,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// The address every scenario resolves unless it says otherwise
pub const CURRENT_IP: Ipv4Addr = Ipv4Addr::new(5, 6, 7, 8);

/// Build a record as the provider would return it
pub fn a_record(id: u64, name: &str, data: &str) -> ARecord {
    ARecord {
        id: Some(RecordId::from(id)),
        name: name.to_string(),
        data: data.to_string(),
        ttl: 600,
    }
}

/// Configuration for a DigitalOcean-style account with a 60 second interval
pub fn config(domains: Vec<DomainConfig>) -> DdnsConfig {
    DdnsConfig::new(
        60,
        ProviderConfig::DigitalOcean {
            api_key: "test-token".to_string(),
        },
        domains,
    )
}

#[derive(Default)]
struct MockState {
    registered: Vec<RegisteredDomain>,
    records: HashMap<String, Vec<ARecord>>,
    failing_writes: HashSet<String>,
    failing_record_lists: HashSet<String>,
    domain_list_failures: VecDeque<Error>,
    writes: Vec<ARecordUpsert>,
}

/// In-memory DNS provider
///
/// Clones share state: keep one clone in the test and hand another to the
/// scan loop.
#[derive(Clone)]
pub struct MockDnsProvider {
    state: Arc<Mutex<MockState>>,
    supports_listing: bool,
    list_domains_calls: Arc<AtomicUsize>,
    list_records_calls: Arc<AtomicUsize>,
    next_id: Arc<AtomicU64>,
}

impl MockDnsProvider {
    /// A provider that can list records (DigitalOcean-like)
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            supports_listing: true,
            list_domains_calls: Arc::new(AtomicUsize::new(0)),
            list_records_calls: Arc::new(AtomicUsize::new(0)),
            next_id: Arc::new(AtomicU64::new(1000)),
        }
    }

    /// A provider that only writes by name (GoDaddy-like)
    pub fn write_only() -> Self {
        Self {
            supports_listing: false,
            ..Self::new()
        }
    }

    /// Register an active domain holding `records`
    pub fn with_domain(self, domain: &str, records: Vec<ARecord>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.registered.push(RegisteredDomain::active(domain));
            state.records.insert(domain.to_string(), records);
        }
        self
    }

    /// Register a domain the provider reports as inactive
    pub fn with_inactive_domain(self, domain: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.registered.push(RegisteredDomain {
                name: domain.to_string(),
                active: false,
            });
            state.records.insert(domain.to_string(), Vec::new());
        }
        self
    }

    /// Every write to `subdomain` fails with a conflict
    pub fn fail_writes_to(self, subdomain: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_writes
            .insert(subdomain.to_string());
        self
    }

    /// Stop failing writes to `subdomain`
    pub fn heal_writes_to(&self, subdomain: &str) {
        self.state.lock().unwrap().failing_writes.remove(subdomain);
    }

    /// Listing records of `domain` fails
    pub fn fail_record_list_of(self, domain: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_record_lists
            .insert(domain.to_string());
        self
    }

    /// The next `list_domains` call fails with `error`
    pub fn queue_domain_list_failure(&self, error: Error) {
        self.state
            .lock()
            .unwrap()
            .domain_list_failures
            .push_back(error);
    }

    /// Every write request received, in order
    pub fn writes(&self) -> Vec<ARecordUpsert> {
        self.state.lock().unwrap().writes.clone()
    }

    /// Records currently held for `domain`
    pub fn records(&self, domain: &str) -> Vec<ARecord> {
        self.state
            .lock()
            .unwrap()
            .records
            .get(domain)
            .cloned()
            .unwrap_or_default()
    }

    pub fn list_domains_calls(&self) -> usize {
        self.list_domains_calls.load(Ordering::SeqCst)
    }

    pub fn list_records_calls(&self) -> usize {
        self.list_records_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DnsProvider for MockDnsProvider {
    async fn list_domains(&self) -> Result<Vec<RegisteredDomain>> {
        self.list_domains_calls.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.domain_list_failures.pop_front() {
            return Err(error);
        }
        Ok(state.registered.clone())
    }

    async fn list_a_records(&self, domain: &str, subdomain: Option<&str>) -> Result<Vec<ARecord>> {
        self.list_records_calls.fetch_add(1, Ordering::SeqCst);

        let state = self.state.lock().unwrap();
        if state.failing_record_lists.contains(domain) {
            return Err(Error::network(format!("connection reset listing {}", domain)));
        }

        let records = state.records.get(domain).cloned().unwrap_or_default();
        Ok(match subdomain {
            Some(name) => records.into_iter().filter(|r| r.name == name).collect(),
            None => records,
        })
    }

    async fn upsert_a_record(&self, request: &ARecordUpsert) -> Result<UpsertOutcome> {
        let mut state = self.state.lock().unwrap();
        state.writes.push(request.clone());

        if state.failing_writes.contains(&request.subdomain) {
            return Err(Error::conflict(format!(
                "{} rejected by provider",
                request.subdomain
            )));
        }

        let supports_listing = self.supports_listing;
        let records = state.records.entry(request.domain.clone()).or_default();
        let existing = match &request.record_id {
            Some(id) => records.iter().position(|r| r.id.as_ref() == Some(id)),
            None if !supports_listing => records.iter().position(|r| r.name == request.subdomain),
            None => None,
        };

        match existing {
            Some(index) => {
                let record = &mut records[index];
                record.data = request.ip.to_string();
                record.ttl = request.ttl;
                Ok(UpsertOutcome::Updated)
            }
            None if request.record_id.is_some() => {
                Err(Error::not_found("record id does not exist"))
            }
            None => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                records.push(ARecord {
                    id: Some(RecordId::from(id)),
                    name: request.subdomain.clone(),
                    data: request.ip.to_string(),
                    ttl: request.ttl,
                });
                Ok(UpsertOutcome::Created)
            }
        }
    }

    fn supports_listing(&self) -> bool {
        self.supports_listing
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// IP source returning a settable address
#[derive(Clone)]
pub struct FixedIpSource {
    ip: Arc<Mutex<Ipv4Addr>>,
    calls: Arc<AtomicUsize>,
}

impl FixedIpSource {
    pub fn new(ip: Ipv4Addr) -> Self {
        Self {
            ip: Arc::new(Mutex::new(ip)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Change the address returned from now on
    pub fn set(&self, ip: Ipv4Addr) {
        *self.ip.lock().unwrap() = ip;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl IpSource for FixedIpSource {
    async fn current(&self) -> Result<Ipv4Addr> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(*self.ip.lock().unwrap())
    }

    fn source_name(&self) -> &'static str {
        "fixed"
    }
}

/// IP source that never resolves
pub struct FailingIpSource;

#[async_trait::async_trait]
impl IpSource for FailingIpSource {
    async fn current(&self) -> Result<Ipv4Addr> {
        Err(Error::network("no route to any IP service"))
    }

    fn source_name(&self) -> &'static str {
        "failing"
    }
}
