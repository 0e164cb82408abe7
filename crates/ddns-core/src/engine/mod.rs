//! Scan loop
//!
//! The [`ScanLoop`] alternates between two states forever:
//!
//! ```text
//!        ┌────────────┐   pass done    ┌────────────┐
//!  ────▶ │  Scanning  │ ─────────────▶ │  Waiting   │
//!        └────────────┘                └────────────┘
//!              ▲        scan_interval        │
//!              └─────────────────────────────┘
//! ```
//!
//! ## One pass
//!
//! 1. Resolve the external IP once via [`IpSource`]
//! 2. List the domains registered on the provider account
//! 3. For each configured domain, in configuration order:
//!    skip it if it is not registered, otherwise run the [`Reconciler`]
//! 4. Emit a [`ScanEvent::PassCompleted`]
//!
//! ## Fatal conditions
//!
//! The loop returns an error instead of waiting when the IP cannot be
//! resolved, when listing domains fails with an unrecoverable error such as
//! rejected credentials (see [`Error::is_recoverable`]), or when the
//! registered domains cannot be listed on the very first pass. Every other
//! failure is confined to a domain (or a subdomain) and retried next pass.

use crate::config::{DdnsConfig, DomainConfig};
use crate::error::{Error, Result};
use crate::reconcile::{DomainReport, Reconciler};
use crate::traits::{DnsProvider, IpSource, RegisteredDomain};
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Capacity of the event channel handed out by [`ScanLoop::new`]
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Events emitted by the ScanLoop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// Loop started
    Started {
        domains_count: usize,
    },

    /// A pass began with this external IP
    PassStarted {
        pass: u64,
        external_ip: Ipv4Addr,
    },

    /// A configured domain was not reconciled this pass
    DomainSkipped {
        domain: String,
        reason: SkipReason,
    },

    /// A record was created
    RecordCreated {
        domain: String,
        subdomain: String,
    },

    /// A record was updated
    RecordUpdated {
        domain: String,
        subdomain: String,
    },

    /// A write failed; retried next pass
    WriteFailed {
        domain: String,
        subdomain: String,
        error: String,
    },

    /// A pass finished
    PassCompleted {
        pass: u64,
        created: usize,
        updated: usize,
        failed: usize,
        skipped: usize,
    },

    /// Loop stopped
    Stopped {
        reason: String,
    },
}

/// Why a domain was skipped for a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The account does not hold this domain
    NotRegistered,
    /// Listing its records failed
    FetchFailed(String),
    /// The registered-domain list could not be fetched this pass
    DomainListUnavailable(String),
}

/// What happened to one configured domain in a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainOutcome {
    /// Reconciled; individual writes may still have failed
    Reconciled(DomainReport),
    /// Not reconciled this pass
    Skipped {
        domain: String,
        reason: SkipReason,
    },
}

impl DomainOutcome {
    /// Domain name
    pub fn domain(&self) -> &str {
        match self {
            DomainOutcome::Reconciled(report) => &report.domain,
            DomainOutcome::Skipped { domain, .. } => domain,
        }
    }

    /// The report, if the domain was reconciled
    pub fn report(&self) -> Option<&DomainReport> {
        match self {
            DomainOutcome::Reconciled(report) => Some(report),
            DomainOutcome::Skipped { .. } => None,
        }
    }
}

/// Result of one Scanning state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    /// Pass number, starting at 1
    pub pass: u64,
    /// External IP shared by every domain in the pass
    pub external_ip: Ipv4Addr,
    /// One entry per configured domain, in configuration order
    pub domains: Vec<DomainOutcome>,
}

/// Drives reconciliation passes across all configured domains
///
/// ## Lifecycle
///
/// 1. Create with [`ScanLoop::new()`]
/// 2. Start with [`ScanLoop::run()`]; it only returns on a fatal error
/// 3. The process is stopped by OS signals, handled by the caller
///
/// Passes never overlap: the next pass starts `scan_interval` after the
/// previous one finished.
pub struct ScanLoop {
    /// External IP resolution
    ip_source: Box<dyn IpSource>,

    /// DNS provider client
    provider: Box<dyn DnsProvider>,

    /// Domains to reconcile, in order
    domains: Vec<DomainConfig>,

    /// Wait between passes
    scan_interval: Duration,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<ScanEvent>,
}

impl ScanLoop {
    /// Create a new scan loop
    ///
    /// # Returns
    ///
    /// A tuple of (scan_loop, event_receiver) where event_receiver yields scan events
    pub fn new(
        ip_source: Box<dyn IpSource>,
        provider: Box<dyn DnsProvider>,
        config: DdnsConfig,
    ) -> Result<(Self, mpsc::Receiver<ScanEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(DEFAULT_EVENT_CHANNEL_CAPACITY);

        let scan_loop = Self {
            ip_source,
            provider,
            scan_interval: config.scan_interval(),
            domains: config.domains,
            event_tx: tx,
        };

        Ok((scan_loop, rx))
    }

    /// Run passes forever
    ///
    /// # Returns
    ///
    /// Only returns on a fatal error; see the module docs.
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run passes until `shutdown_rx` fires during a Waiting state
    ///
    /// Used to embed the loop and by tests; the daemon relies on process
    /// signals instead. Dropping the sender without sending does not stop
    /// the loop.
    pub async fn run_with_shutdown(
        &self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(
        &self,
        mut shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        self.emit_event(ScanEvent::Started {
            domains_count: self.domains.len(),
        });
        info!(
            "Scan loop started: {} domain(s) via {}, every {:?}",
            self.domains.len(),
            self.provider.provider_name(),
            self.scan_interval
        );

        let mut pass = 0u64;
        loop {
            pass += 1;

            if let Err(e) = self.run_pass(pass).await {
                error!("Fatal error in pass {}: {}", pass, e);
                self.emit_event(ScanEvent::Stopped {
                    reason: e.to_string(),
                });
                return Err(e);
            }

            debug!("Waiting {:?} before the next pass", self.scan_interval);
            let deadline = tokio::time::Instant::now() + self.scan_interval;
            let mut handle_dropped = false;

            if let Some(rx) = shutdown_rx.as_mut() {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {}
                    received = rx => {
                        if received.is_ok() {
                            info!("Shutdown signal received");
                            self.emit_event(ScanEvent::Stopped {
                                reason: "Shutdown signal".to_string(),
                            });
                            return Ok(());
                        }
                        handle_dropped = true;
                    }
                }
            }

            // A dropped sender is not a shutdown request: keep scanning.
            if handle_dropped {
                debug!("Shutdown handle dropped without a signal");
                shutdown_rx = None;
            }
            if shutdown_rx.is_none() {
                tokio::time::sleep_until(deadline).await;
            }
        }
    }

    /// Run a single pass over every configured domain
    ///
    /// `pass` numbers start at 1; listing failures on pass 1 are fatal.
    ///
    /// # Errors
    ///
    /// Only fatal conditions are returned. Per-domain and per-subdomain
    /// failures are reported inside the [`PassReport`].
    pub async fn run_pass(&self, pass: u64) -> Result<PassReport> {
        let external_ip = self.ip_source.current().await.map_err(|e| match e {
            Error::IpSource(_) => e,
            other => Error::ip_source(other.to_string()),
        })?;
        info!("The current external IP is {}", external_ip);
        self.emit_event(ScanEvent::PassStarted { pass, external_ip });

        let registered = match self.provider.list_domains().await {
            Ok(domains) => domains,
            Err(e) if !e.is_recoverable() || pass == 1 => {
                if e.is_auth() {
                    error!(
                        "{} rejected the credentials",
                        self.provider.provider_name()
                    );
                }
                return Err(e);
            }
            Err(e) => {
                error!("Cannot list registered domains, skipping pass {}: {}", pass, e);
                let domains = self
                    .domains
                    .iter()
                    .map(|d| self.skip(d, SkipReason::DomainListUnavailable(e.to_string())))
                    .collect();
                let report = PassReport {
                    pass,
                    external_ip,
                    domains,
                };
                self.emit_pass_completed(&report);
                return Ok(report);
            }
        };

        let reconciler = Reconciler::new(self.provider.as_ref());
        let mut outcomes = Vec::with_capacity(self.domains.len());

        for domain in &self.domains {
            let outcome = self
                .reconcile_domain(&reconciler, &registered, domain, external_ip)
                .await;
            outcomes.push(outcome);
        }

        let report = PassReport {
            pass,
            external_ip,
            domains: outcomes,
        };
        self.emit_pass_completed(&report);

        Ok(report)
    }

    async fn reconcile_domain(
        &self,
        reconciler: &Reconciler<'_>,
        registered: &[RegisteredDomain],
        domain: &DomainConfig,
        external_ip: Ipv4Addr,
    ) -> DomainOutcome {
        let Some(found) = registered.iter().find(|r| r.name == domain.domain) else {
            warn!(
                "The domain {} is not registered on the {} account",
                domain.domain,
                self.provider.provider_name()
            );
            return self.skip(domain, SkipReason::NotRegistered);
        };

        if !found.active {
            warn!(
                "The domain {} is not active; its records may be unreachable",
                domain.domain
            );
        }

        match reconciler.reconcile(domain, external_ip).await {
            Ok(report) => {
                for subdomain in &report.created {
                    self.emit_event(ScanEvent::RecordCreated {
                        domain: report.domain.clone(),
                        subdomain: subdomain.clone(),
                    });
                }
                for subdomain in &report.updated {
                    self.emit_event(ScanEvent::RecordUpdated {
                        domain: report.domain.clone(),
                        subdomain: subdomain.clone(),
                    });
                }
                for failure in &report.failed {
                    self.emit_event(ScanEvent::WriteFailed {
                        domain: report.domain.clone(),
                        subdomain: failure.subdomain.clone(),
                        error: failure.error.clone(),
                    });
                }
                DomainOutcome::Reconciled(report)
            }
            Err(e) => {
                error!("Error during A records fetching for {}: {}", domain.domain, e);
                self.skip(domain, SkipReason::FetchFailed(e.to_string()))
            }
        }
    }

    fn skip(&self, domain: &DomainConfig, reason: SkipReason) -> DomainOutcome {
        self.emit_event(ScanEvent::DomainSkipped {
            domain: domain.domain.clone(),
            reason: reason.clone(),
        });
        DomainOutcome::Skipped {
            domain: domain.domain.clone(),
            reason,
        }
    }

    fn emit_pass_completed(&self, report: &PassReport) {
        let (mut created, mut updated, mut failed, mut skipped) = (0, 0, 0, 0);
        for outcome in &report.domains {
            match outcome {
                DomainOutcome::Reconciled(r) => {
                    created += r.created.len();
                    updated += r.updated.len();
                    failed += r.failed.len();
                }
                DomainOutcome::Skipped { .. } => skipped += 1,
            }
        }

        info!(
            "Pass {} complete: {} created, {} updated, {} failed, {} domain(s) skipped",
            report.pass, created, updated, failed, skipped
        );
        self.emit_event(ScanEvent::PassCompleted {
            pass: report.pass,
            created,
            updated,
            failed,
            skipped,
        });
    }

    /// Emit a scan event
    fn emit_event(&self, event: ScanEvent) {
        // Monitoring must never stall a pass; a closed receiver is fine.
        if let Err(mpsc::error::TrySendError::Full(_)) = self.event_tx.try_send(event) {
            warn!("Event channel full, dropping event");
        }
    }
}
