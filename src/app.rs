//! Core application runner (business logic) for `presence-scanner`.
//!
//! This module is intentionally decoupled from CLI parsing and process exit
//! codes so it can be tested deterministically. One cycle is
//! discover -> pseudonymize/classify -> report; the run loop repeats cycles
//! on a fixed interval until shutdown.

use crate::device::DiscoveredDevice;
use crate::duration::parse_duration;
use crate::report::{Report, ReportSink};
use crate::scanner::{Backend, DiscoverError};
use clap::Parser;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Configuration for the core run loop.
///
/// Immutable after startup: the loop borrows it read-only and there is no
/// dynamic reconfiguration.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// Collection endpoint receiving one JSON record per sighting.
    #[arg(long)]
    pub endpoint: Url,

    /// Shared secret mixed into device pseudonyms. Never transmitted.
    #[arg(long)]
    pub secret: String,

    /// Static location label attached to every report.
    #[arg(long, default_value = "unknown")]
    pub location: String,

    /// Pause between scan cycles.
    /// Accepts duration with suffix: 3s, 1m, 500ms, 2h.
    /// Without suffix, value is interpreted as seconds.
    #[arg(long, default_value = "10s", value_parser = parse_duration)]
    pub interval: Duration,

    /// Time budget for each discovery pass.
    #[arg(long, default_value = "8s", value_parser = parse_duration)]
    pub scan_window: Duration,

    /// Bluetooth discovery backend to use
    #[arg(long, default_value_t, value_enum)]
    pub backend: Backend,

    /// Verbose output, log every outgoing payload
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

/// Per-cycle outcome counts, logged after every cycle and asserted in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleSummary {
    /// Devices the discovery pass returned
    pub discovered: usize,
    /// Reports the endpoint accepted
    pub accepted: usize,
    /// Reports that failed (non-success status or transport fault)
    pub failed: usize,
}

/// Discovery abstraction to enable deterministic unit tests without
/// Bluetooth hardware.
pub trait Discoverer: Send + Sync {
    fn discover(
        &self,
        backend: Backend,
        window: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DiscoveredDevice>, DiscoverError>> + Send + '_>>;
}

/// Real discoverer that delegates to the compiled-in backends.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealDiscoverer;

impl Discoverer for RealDiscoverer {
    fn discover(
        &self,
        backend: Backend,
        window: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DiscoveredDevice>, DiscoverError>> + Send + '_>>
    {
        Box::pin(async move { crate::scanner::discover(backend, window).await })
    }
}

/// Run one discovery/report cycle.
///
/// A discovery fault degrades to an empty cycle; a failed submission skips
/// only that record. Nothing here aborts the caller's loop.
pub async fn run_cycle(
    options: &Options,
    discoverer: &dyn Discoverer,
    sink: &dyn ReportSink,
) -> CycleSummary {
    let devices = match discoverer.discover(options.backend, options.scan_window).await {
        Ok(devices) => devices,
        Err(e) => {
            warn!("discovery failed, treating cycle as empty: {e}");
            Vec::new()
        }
    };

    let mut summary = CycleSummary {
        discovered: devices.len(),
        ..CycleSummary::default()
    };

    if devices.is_empty() {
        debug!("no devices this cycle");
        return summary;
    }

    for device in &devices {
        let report = Report::from_device(device, &options.secret, &options.location);
        debug!(
            mac = %report.mac,
            name = %report.name,
            rssi = report.rssi,
            "submitting report"
        );

        // One attempt per record; a failure never suppresses the rest.
        match sink.submit(&report).await {
            Ok(()) => summary.accepted += 1,
            Err(e) => {
                warn!("report for {} failed: {e}", report.mac);
                summary.failed += 1;
            }
        }
    }

    summary
}

/// Run the scheduler loop: cycle, sleep the configured interval, repeat.
///
/// Exits when `shutdown` resolves. An in-flight cycle finishes first; there
/// is deliberately no cleanup beyond dropping any in-flight request, matching
/// the best-effort reporting contract.
pub async fn run<F>(
    options: Options,
    discoverer: &dyn Discoverer,
    sink: &dyn ReportSink,
    shutdown: F,
) where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        let summary = run_cycle(&options, discoverer, sink).await;
        info!(
            discovered = summary.discovered,
            accepted = summary.accepted,
            failed = summary.failed,
            "cycle complete"
        );

        tokio::select! {
            () = &mut shutdown => break,
            () = tokio::time::sleep(options.interval) => {}
        }
    }

    info!("stop requested, exiting");
}
