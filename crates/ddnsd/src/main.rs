// # ddnsd - DDNS Daemon
//
// Thin integration layer: all reconciliation logic lives in ddns-core.
//
// The daemon is responsible for:
// 1. Initializing logging
// 2. Loading the JSON configuration file
// 3. Registering providers and IP sources
// 4. Running the scan loop until a signal or a fatal error
//
// ## Configuration
//
// - `DDNS_CONFIG_PATH`: Path to the JSON options file (default `/data/options.json`)
// - `DDNS_LOG_LEVEL`: trace, debug, info, warn, error (default `info`)
// - `DDNS_MODE`: `dry-run` to log writes instead of sending them
//
// ## Example
//
// ```bash
// cat > /tmp/options.json <<'EOF'
// {
//   "scanInterval": 300,
//   "provider": { "type": "digitalocean", "apiKey": "dop_v1_..." },
//   "domains": [{ "domain": "example.com", "subdomains": ["home", "vpn"] }]
// }
// EOF
// DDNS_CONFIG_PATH=/tmp/options.json ddnsd
// ```
//
// ## Exit codes
//
// - 0: Stopped by SIGTERM/SIGINT
// - 22: Invalid configuration, or a fatal error during a pass

use anyhow::{Context, Result};
use ddns_core::{DdnsConfig, ProviderRegistry, ScanEvent, ScanLoop};
use std::env;
use std::process::ExitCode;
use tracing::{Level, debug, error, info};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Default location of the options file (Home Assistant add-on layout)
const DEFAULT_CONFIG_PATH: &str = "/data/options.json";

/// Exit codes for different termination scenarios
#[derive(Debug, Clone, Copy)]
enum DdnsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Invalid configuration or fatal reconciliation error (EINVAL)
    Fatal = 22,
}

impl From<DdnsExitCode> for ExitCode {
    fn from(code: DdnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn parse_log_level(value: &str) -> Level {
    match value.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn main() -> ExitCode {
    let log_level = parse_log_level(&env::var("DDNS_LOG_LEVEL").unwrap_or_default());
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DdnsExitCode::Fatal.into();
    }

    let config_path =
        env::var("DDNS_CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let config = match DdnsConfig::from_file(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Configuration is not valid ({}): {}", config_path, e);
            return DdnsExitCode::Fatal.into();
        }
    };

    info!("Starting ddnsd daemon");
    info!(
        "Configuration loaded: {} domain(s), provider {}",
        config.domains.len(),
        config.provider.type_name()
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DdnsExitCode::Fatal.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {:#}", e);
            DdnsExitCode::Fatal
        } else {
            DdnsExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon until a shutdown signal or a fatal error
async fn run_daemon(config: DdnsConfig) -> Result<()> {
    let registry = ProviderRegistry::new();
    ddns_provider_digitalocean::register(&registry);
    ddns_provider_godaddy::register(&registry);
    ddns_ip_http::register(&registry);

    let provider = registry
        .create_provider(&config.provider)
        .context("Failed to create DNS provider")?;
    let ip_source = registry
        .create_ip_source(&config.ip_source)
        .context("Failed to create IP source")?;

    let (scan_loop, mut events) =
        ScanLoop::new(ip_source, provider, config).context("Failed to create scan loop")?;

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            log_event(&event);
        }
    });

    tokio::select! {
        result = scan_loop.run() => {
            result.context("Scan loop stopped")?;
        }
        signal = wait_for_shutdown() => {
            let signal = signal?;
            info!("Received shutdown signal: {}", signal);
            info!("Shutting down daemon");
        }
    }

    Ok(())
}

fn log_event(event: &ScanEvent) {
    match event {
        ScanEvent::RecordCreated { domain, subdomain } => {
            debug!("Created A record {} on {}", subdomain, domain)
        }
        ScanEvent::RecordUpdated { domain, subdomain } => {
            debug!("Updated A record {} on {}", subdomain, domain)
        }
        other => debug!("Scan event: {:?}", other),
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// The name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let received = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(received)
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
