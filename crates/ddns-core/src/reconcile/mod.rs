//! Per-domain reconciliation
//!
//! Given the configured subdomains of one domain, the A records the provider
//! currently holds, and the external IP of this pass, [`plan`] computes the
//! minimal set of writes and [`Reconciler`] executes them.
//!
//! ## Diff
//!
//! ```text
//! desired   = configured subdomains (as a set)
//! to_create = desired − names(records)
//! to_update = { r ∈ records : r.name ∈ desired ∧ r.data ≠ ip }
//! ```
//!
//! Records outside `desired` are never touched. Providers that cannot list
//! records get an always-write plan: every desired subdomain is written by
//! name each pass.
//!
//! ## Duplicate names
//!
//! If the provider holds several A records with a desired name, the name is
//! satisfied when any of them already points at the IP. Otherwise exactly
//! one update is planned, against the first record in provider order. Both
//! cases log a warning.
//!
//! ## Failure isolation
//!
//! Writes are independent. A failed create or update is logged and recorded
//! in the [`DomainReport`]; the remaining writes still run.

use crate::config::DomainConfig;
use crate::error::Result;
use crate::traits::{ARecord, ARecordUpsert, DnsProvider, RecordId, UpsertOutcome};
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use tracing::{debug, info, warn};

/// An update the reconciler intends to issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUpdate {
    /// Record name relative to the domain
    pub subdomain: String,
    /// Provider record to overwrite; `None` for name-addressed providers
    pub record_id: Option<RecordId>,
    /// Data the record held when it was listed, if it was listed
    pub previous_data: Option<String>,
}

/// Writes needed to bring one domain in line with the external IP
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationPlan {
    /// Subdomains with no A record at all
    pub to_create: BTreeSet<String>,
    /// Existing records pointing elsewhere, at most one per subdomain
    pub to_update: Vec<PlannedUpdate>,
}

impl ReconciliationPlan {
    /// Plan for providers without listing: write every desired subdomain
    pub fn always_write(desired: &BTreeSet<String>) -> Self {
        Self {
            to_create: BTreeSet::new(),
            to_update: desired
                .iter()
                .map(|subdomain| PlannedUpdate {
                    subdomain: subdomain.clone(),
                    record_id: None,
                    previous_data: None,
                })
                .collect(),
        }
    }

    /// Whether nothing needs to be written
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty()
    }

    /// Names of the subdomains planned for update
    pub fn update_names(&self) -> BTreeSet<&str> {
        self.to_update.iter().map(|u| u.subdomain.as_str()).collect()
    }
}

/// Diff desired subdomains against the provider's records
pub fn plan(desired: &BTreeSet<String>, records: &[ARecord], ip: Ipv4Addr) -> ReconciliationPlan {
    let mut by_name: BTreeMap<&str, Vec<&ARecord>> = BTreeMap::new();
    for record in records.iter().filter(|r| desired.contains(&r.name)) {
        by_name.entry(record.name.as_str()).or_default().push(record);
    }

    let mut to_create = desired.clone();
    let mut to_update = Vec::new();

    for (name, matching) in by_name {
        to_create.remove(name);

        if matching.len() > 1 {
            warn!(
                "{} A records share the name {}; only one will be kept current",
                matching.len(),
                name
            );
        }

        if matching.iter().any(|r| r.points_to(ip)) {
            debug!("Record {} already points to {}", name, ip);
            continue;
        }

        let first = matching[0];
        to_update.push(PlannedUpdate {
            subdomain: name.to_string(),
            record_id: first.id.clone(),
            previous_data: Some(first.data.clone()),
        });
    }

    ReconciliationPlan {
        to_create,
        to_update,
    }
}

/// Kind of write that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOperation {
    /// Creating a missing record
    Create,
    /// Overwriting an existing record
    Update,
}

/// A write the provider did not accept
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFailure {
    /// Record name relative to the domain
    pub subdomain: String,
    /// What was attempted
    pub operation: WriteOperation,
    /// Provider error, rendered
    pub error: String,
}

/// Outcome of reconciling one domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainReport {
    /// Domain name
    pub domain: String,
    /// The plan that was executed
    pub plan: ReconciliationPlan,
    /// Subdomains created successfully
    pub created: Vec<String>,
    /// Subdomains updated successfully
    pub updated: Vec<String>,
    /// Writes that failed
    pub failed: Vec<WriteFailure>,
    /// Writes the provider only logged (dry-run mode)
    pub dry_run: Vec<String>,
}

impl DomainReport {
    /// Whether every planned write went through
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Plans and executes the writes for one domain at a time
pub struct Reconciler<'a> {
    provider: &'a dyn DnsProvider,
}

impl<'a> Reconciler<'a> {
    /// Create a reconciler over a provider client
    pub fn new(provider: &'a dyn DnsProvider) -> Self {
        Self { provider }
    }

    /// Fetch the current records (if the provider can list) and diff
    ///
    /// # Errors
    ///
    /// Propagates the provider's listing error; the caller skips the domain.
    pub async fn plan_domain(
        &self,
        domain: &DomainConfig,
        ip: Ipv4Addr,
    ) -> Result<ReconciliationPlan> {
        let desired = domain.desired();

        if !self.provider.supports_listing() {
            debug!(
                "{} cannot list records, writing all {} subdomain(s) of {}",
                self.provider.provider_name(),
                desired.len(),
                domain.domain
            );
            return Ok(ReconciliationPlan::always_write(&desired));
        }

        let records = self.provider.list_a_records(&domain.domain, None).await?;
        debug!("Fetched {} A record(s) for {}", records.len(), domain.domain);

        Ok(plan(&desired, &records, ip))
    }

    /// Issue every write in `plan`, creates first
    pub async fn execute(
        &self,
        domain: &DomainConfig,
        ip: Ipv4Addr,
        plan: ReconciliationPlan,
    ) -> DomainReport {
        info!(
            "Subdomains to add on {}: {:?}",
            domain.domain,
            plan.to_create.iter().collect::<Vec<_>>()
        );
        info!(
            "Subdomains to update on {}: {:?}",
            domain.domain,
            plan.update_names()
        );

        let mut report = DomainReport {
            domain: domain.domain.clone(),
            plan: ReconciliationPlan::default(),
            created: Vec::new(),
            updated: Vec::new(),
            failed: Vec::new(),
            dry_run: Vec::new(),
        };

        for subdomain in &plan.to_create {
            let request = ARecordUpsert::create(&domain.domain, subdomain, ip, domain.ttl);
            match self.provider.upsert_a_record(&request).await {
                Ok(UpsertOutcome::DryRun) => {
                    info!("[DRY-RUN] {} on {} would be created", subdomain, domain.domain);
                    report.dry_run.push(subdomain.clone());
                }
                Ok(_) => {
                    info!(
                        "Created record for {} on domain {} with ttl {}",
                        subdomain, domain.domain, domain.ttl
                    );
                    report.created.push(subdomain.clone());
                }
                Err(e) => {
                    warn!(
                        "Failed to create A record for {} on {}: {}",
                        subdomain, domain.domain, e
                    );
                    report.failed.push(WriteFailure {
                        subdomain: subdomain.clone(),
                        operation: WriteOperation::Create,
                        error: e.to_string(),
                    });
                }
            }
        }

        for update in &plan.to_update {
            let request = ARecordUpsert::update(
                &domain.domain,
                &update.subdomain,
                ip,
                domain.ttl,
                update.record_id.clone(),
            );
            match self.provider.upsert_a_record(&request).await {
                Ok(UpsertOutcome::DryRun) => {
                    info!(
                        "[DRY-RUN] {} on {} would be updated",
                        update.subdomain, domain.domain
                    );
                    report.dry_run.push(update.subdomain.clone());
                }
                Ok(_) => {
                    info!(
                        "IP refreshed for subdomain {} on domain {} with ttl {} (was: {})",
                        update.subdomain,
                        domain.domain,
                        domain.ttl,
                        update.previous_data.as_deref().unwrap_or("unknown")
                    );
                    report.updated.push(update.subdomain.clone());
                }
                Err(e) => {
                    warn!(
                        "Failed to update A record for {} on {}: {}",
                        update.subdomain, domain.domain, e
                    );
                    report.failed.push(WriteFailure {
                        subdomain: update.subdomain.clone(),
                        operation: WriteOperation::Update,
                        error: e.to_string(),
                    });
                }
            }
        }

        report.plan = plan;
        report
    }

    /// Plan and execute in one step
    pub async fn reconcile(&self, domain: &DomainConfig, ip: Ipv4Addr) -> Result<DomainReport> {
        let plan = self.plan_domain(domain, ip).await?;
        Ok(self.execute(domain, ip, plan).await)
    }
}
