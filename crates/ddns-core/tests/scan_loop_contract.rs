//! Contract Test: Scan Loop Lifecycle and Fatal Conditions
//!
//! Constraints verified:
//! - The external IP is resolved exactly once per pass
//! - An IP resolution failure stops the loop before any provider call
//! - Unregistered domains are skipped, the others still reconciled
//! - Rejected credentials (and other unrecoverable errors) are fatal on any pass
//! - Other domain-list failures are fatal only on the first pass
//! - Passes repeat every scan interval until shutdown
//! - Dropping the shutdown handle without sending does not stop the loop
//!
//! If this test fails, the loop either gives up too early or keeps
//! writing when it should stop.

mod common;

use common::*;
use ddns_core::config::DomainConfig;
use ddns_core::engine::{DomainOutcome, ScanEvent, SkipReason};
use ddns_core::{Error, ScanLoop};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn build(provider: &MockDnsProvider, domains: Vec<DomainConfig>) -> (ScanLoop, FixedIpSource) {
    let ip_source = FixedIpSource::new(CURRENT_IP);
    let (scan_loop, _events) = ScanLoop::new(
        Box::new(ip_source.clone()),
        Box::new(provider.clone()),
        config(domains),
    )
    .expect("scan loop construction succeeds");
    (scan_loop, ip_source)
}

#[tokio::test]
async fn ip_failure_is_fatal_and_nothing_is_written() {
    let provider = MockDnsProvider::new().with_domain("example.com", vec![]);
    let (scan_loop, _events) = ScanLoop::new(
        Box::new(FailingIpSource),
        Box::new(provider.clone()),
        config(vec![DomainConfig::new("example.com", ["home"])]),
    )
    .unwrap();

    let result = scan_loop.run().await;

    assert!(matches!(result, Err(Error::IpSource(_))));
    assert_eq!(provider.list_domains_calls(), 0);
    assert!(provider.writes().is_empty());
}

#[tokio::test]
async fn ip_resolved_once_per_pass() {
    let provider = MockDnsProvider::new()
        .with_domain("example.com", vec![])
        .with_domain("example.org", vec![]);
    let (scan_loop, ip_source) = build(
        &provider,
        vec![
            DomainConfig::new("example.com", ["home"]),
            DomainConfig::new("example.org", ["home", "vpn"]),
        ],
    );

    let report = assert_ok!(scan_loop.run_pass(1).await);

    assert_eq!(ip_source.calls(), 1);
    assert_eq!(report.external_ip, CURRENT_IP);
    assert_eq!(provider.writes().len(), 3);
}

#[tokio::test]
async fn unregistered_domain_is_skipped() {
    let provider = MockDnsProvider::new().with_domain("example.com", vec![]);
    let (scan_loop, _) = build(
        &provider,
        vec![
            DomainConfig::new("not-mine.example", ["home"]),
            DomainConfig::new("example.com", ["home"]),
        ],
    );

    let report = assert_ok!(scan_loop.run_pass(1).await);

    assert_eq!(
        report.domains[0],
        DomainOutcome::Skipped {
            domain: "not-mine.example".to_string(),
            reason: SkipReason::NotRegistered,
        }
    );
    assert_eq!(report.domains[1].domain(), "example.com");
    assert!(report.domains[1].report().is_some());

    let writes = provider.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].domain, "example.com");
}

#[tokio::test]
async fn inactive_domain_is_still_reconciled() {
    let provider = MockDnsProvider::write_only().with_inactive_domain("example.net");
    let (scan_loop, _) = build(&provider, vec![DomainConfig::new("example.net", ["home"])]);

    let report = assert_ok!(scan_loop.run_pass(1).await);

    assert!(report.domains[0].report().is_some());
    assert_eq!(provider.writes().len(), 1);
}

#[tokio::test]
async fn domain_list_failure_on_first_pass_is_fatal() {
    let provider = MockDnsProvider::new().with_domain("example.com", vec![]);
    provider.queue_domain_list_failure(Error::network("connection refused"));
    let (scan_loop, _) = build(&provider, vec![DomainConfig::new("example.com", ["home"])]);

    let result = scan_loop.run().await;

    assert!(matches!(result, Err(Error::Network(_))));
    assert!(provider.writes().is_empty());
}

#[tokio::test]
async fn later_domain_list_failure_skips_the_pass() {
    let provider = MockDnsProvider::new().with_domain("example.com", vec![]);
    let (scan_loop, _) = build(&provider, vec![DomainConfig::new("example.com", ["home"])]);

    assert_ok!(scan_loop.run_pass(1).await);
    provider.queue_domain_list_failure(Error::rate_limited("slow down"));

    let report = assert_ok!(scan_loop.run_pass(2).await);

    assert!(matches!(
        &report.domains[0],
        DomainOutcome::Skipped {
            reason: SkipReason::DomainListUnavailable(_),
            ..
        }
    ));
    assert_eq!(provider.writes().len(), 1, "only the first pass wrote");
}

#[tokio::test]
async fn rejected_credentials_are_fatal_on_any_pass() {
    let provider = MockDnsProvider::new().with_domain("example.com", vec![]);
    let (scan_loop, _) = build(&provider, vec![DomainConfig::new("example.com", ["home"])]);

    assert_ok!(scan_loop.run_pass(1).await);
    provider.queue_domain_list_failure(Error::auth("token revoked"));

    let error = assert_err!(scan_loop.run_pass(2).await);
    assert!(error.is_auth());
}

#[tokio::test]
async fn unrecoverable_domain_list_failure_is_fatal_on_later_pass() {
    let provider = MockDnsProvider::new().with_domain("example.com", vec![]);
    let (scan_loop, _) = build(&provider, vec![DomainConfig::new("example.com", ["home"])]);

    assert_ok!(scan_loop.run_pass(1).await);
    provider.queue_domain_list_failure(Error::config("account misconfigured"));

    let error = assert_err!(scan_loop.run_pass(2).await);
    assert!(matches!(error, Error::Config(_)));
}

#[tokio::test]
async fn invalid_config_is_rejected_at_construction() {
    let provider = MockDnsProvider::new();

    let result = ScanLoop::new(
        Box::new(FixedIpSource::new(CURRENT_IP)),
        Box::new(provider),
        config(Vec::new()),
    );

    assert!(matches!(result, Err(Error::Config(_))));
}

#[tokio::test]
async fn events_describe_the_pass() {
    let provider = MockDnsProvider::new()
        .with_domain("example.com", vec![a_record(1, "home", "1.2.3.4")])
        .fail_writes_to("vpn");
    let (scan_loop, mut events) = ScanLoop::new(
        Box::new(FixedIpSource::new(CURRENT_IP)),
        Box::new(provider.clone()),
        config(vec![
            DomainConfig::new("example.com", ["home", "vpn"]),
            DomainConfig::new("missing.example", ["home"]),
        ]),
    )
    .unwrap();

    assert_ok!(scan_loop.run_pass(1).await);
    drop(scan_loop);

    let mut received = Vec::new();
    while let Some(event) = events.recv().await {
        received.push(event);
    }

    assert_eq!(
        received,
        vec![
            ScanEvent::PassStarted {
                pass: 1,
                external_ip: CURRENT_IP,
            },
            ScanEvent::RecordUpdated {
                domain: "example.com".to_string(),
                subdomain: "home".to_string(),
            },
            ScanEvent::WriteFailed {
                domain: "example.com".to_string(),
                subdomain: "vpn".to_string(),
                error: "Conflict: vpn rejected by provider".to_string(),
            },
            ScanEvent::DomainSkipped {
                domain: "missing.example".to_string(),
                reason: SkipReason::NotRegistered,
            },
            ScanEvent::PassCompleted {
                pass: 1,
                created: 0,
                updated: 1,
                failed: 1,
                skipped: 1,
            },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn passes_repeat_every_scan_interval() {
    let provider = MockDnsProvider::new().with_domain("example.com", vec![]);
    let (scan_loop, _) = build(&provider, vec![DomainConfig::new("example.com", ["home"])]);

    // Interval is 60s: passes start at 0s, 60s and 120s.
    let result = tokio::time::timeout(Duration::from_secs(150), scan_loop.run()).await;

    assert!(result.is_err(), "loop only returns on fatal errors");
    assert_eq!(provider.list_domains_calls(), 3);
    assert_eq!(provider.writes().len(), 1, "later passes find home current");
}

#[tokio::test(start_paused = true)]
async fn shutdown_during_wait_stops_cleanly() {
    let provider = MockDnsProvider::new().with_domain("example.com", vec![]);
    let (scan_loop, _) = build(&provider, vec![DomainConfig::new("example.com", ["home"])]);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    shutdown_tx.send(()).unwrap();

    let result = scan_loop.run_with_shutdown(Some(shutdown_rx)).await;

    assert_ok!(result);
    assert_eq!(provider.list_domains_calls(), 1, "the running pass completes");
    assert_eq!(provider.writes().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn dropped_shutdown_handle_keeps_scanning() {
    let provider = MockDnsProvider::new().with_domain("example.com", vec![]);
    let (scan_loop, _) = build(&provider, vec![DomainConfig::new("example.com", ["home"])]);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    drop(shutdown_tx);

    let result = tokio::time::timeout(
        Duration::from_secs(150),
        scan_loop.run_with_shutdown(Some(shutdown_rx)),
    )
    .await;

    assert!(result.is_err(), "a dropped handle is not a shutdown request");
    // Passes still start at 0s, 60s and 120s.
    assert_eq!(provider.list_domains_calls(), 3);
}
