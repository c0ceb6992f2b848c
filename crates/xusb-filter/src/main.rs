//! xusb-filter simulator entry point.
//!
//! Builds a complete simulated controller stack around the filter pair and
//! runs a client that keeps one wait-for-input request outstanding, the way
//! a game's input thread does.  Each completed wait is logged with the
//! report's sequence number; a repeat of the previous sequence is a stale
//! report.
//!
//! # Usage
//!
//! ```text
//! xusb-filter [OPTIONS]
//!
//! Options:
//!   --config <PATH>               Config file [default: platform config dir]
//!   --cycles <N>                  Wait-for-input requests to issue [default: 100]
//!   --report-interval-ms <MS>     Time the device takes to produce a report [default: 8]
//!   --processing-delay-ms <MS>    Function driver gap between polls [default: 2]
//!   --legacy                      Run the upper filter without a gate
//! ```
//!
//! Run once normally and once with `--legacy` to compare stale counts.
//!
//! # Architecture
//!
//! ```text
//! client loop
//!  └─ upper FilterDevice          -- gates WAIT_FOR_INPUT
//!      └─ SimulatedFunctionDriver -- polls the input endpoint
//!          └─ lower FilterDevice  -- opens/closes the gate
//!              └─ SimulatedBus    -- produces a report every interval
//! ```

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use xusb_core::{IoControlCode, NtStatus};
use xusb_filter::application::device::FilterDevice;
use xusb_filter::application::forward::IoTarget;
use xusb_filter::application::request::IoRequest;
use xusb_filter::infrastructure::io_target::simulated::{
    report_sequence, SimulatedBus, SimulatedFunctionDriver,
};
use xusb_filter::infrastructure::storage::config::{self, FilterConfig};

/// Output buffer size of a client wait-for-input request.
const WAIT_OUTPUT_LEN: usize = 20;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Simulated XUSB controller stack with the input-timing filter installed.
#[derive(Debug, Parser)]
#[command(
    name = "xusb-filter",
    about = "Simulates a controller stack with the wait-for-input timing filter",
    version
)]
struct Cli {
    /// Config file to load instead of the platform default.
    #[arg(long, env = "XUSB_FIXER_CONFIG")]
    config: Option<PathBuf>,

    /// Number of wait-for-input requests the client issues.
    #[arg(long, default_value_t = 100, env = "XUSB_FIXER_CYCLES")]
    cycles: u64,

    /// Time the simulated device takes to answer an input poll.
    #[arg(long, default_value_t = 8, env = "XUSB_FIXER_REPORT_INTERVAL_MS")]
    report_interval_ms: u64,

    /// Time the function driver spends between a completed poll and the next.
    #[arg(long, default_value_t = 2, env = "XUSB_FIXER_PROCESSING_DELAY_MS")]
    processing_delay_ms: u64,

    /// Create the upper filter without a lower link (no input gate).
    #[arg(long)]
    legacy: bool,
}

/// Per-run counts reported at exit.
#[derive(Debug, Default)]
struct ClientStats {
    fresh: u64,
    stale: u64,
    failed: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = match &cli.config {
        Some(path) => config::load_config_from(path),
        None => config::load_config(),
    }
    .context("failed to load configuration")?;

    // `RUST_LOG` overrides the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&cfg.filter.log_level)),
        )
        .init();

    info!(legacy = cli.legacy, cycles = cli.cycles, "xusb-filter simulator starting");

    let running = Arc::new(AtomicBool::new(true));
    let (upper, driver) = build_stack(&cli, &cfg);
    let mut driver_task = tokio::spawn(Arc::clone(&driver).run(Arc::clone(&running)));
    let mut driver_exit = None;

    let stats = tokio::select! {
        stats = run_client(&upper, cli.cycles) => stats,
        joined = &mut driver_task => {
            driver_exit = Some(joined);
            None
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            None
        }
    };

    running.store(false, Ordering::Relaxed);
    drop(upper);
    let joined = match driver_exit {
        Some(joined) => joined,
        None => driver_task.await,
    };
    if let Err(e) = joined.context("function driver task panicked")? {
        error!("function driver stopped: {e}");
    }

    if let Some(stats) = stats {
        info!(
            fresh = stats.fresh,
            stale = stats.stale,
            failed = stats.failed,
            "xusb-filter simulator finished"
        );
    }
    Ok(())
}

/// Wires bus, lower filter, function driver, and upper filter.
fn build_stack(cli: &Cli, cfg: &FilterConfig) -> (FilterDevice, Arc<SimulatedFunctionDriver>) {
    let settings = cfg.device_settings();

    let bus = Arc::new(SimulatedBus::new(
        tokio::runtime::Handle::current(),
        Duration::from_millis(cli.report_interval_ms),
        settings.input_pipe,
    ));
    let lower = Arc::new(FilterDevice::create_lower(bus, &settings));
    let driver = Arc::new(SimulatedFunctionDriver::new(
        Arc::clone(&lower),
        settings.input_pipe,
        Duration::from_millis(cli.processing_delay_ms),
    ));

    let link = (!cli.legacy).then_some(lower.as_ref());
    let upper = FilterDevice::create_upper(
        Arc::clone(&driver) as Arc<dyn IoTarget>,
        link,
        &settings,
    );
    (upper, driver)
}

/// Issues `cycles` wait-for-input requests back to back.
async fn run_client(upper: &FilterDevice, cycles: u64) -> Option<ClientStats> {
    let mut stats = ClientStats::default();
    let mut last_sequence = None;

    for cycle in 1..=cycles {
        let (wait, pending) =
            IoRequest::device_control(IoControlCode::WAIT_FOR_INPUT, Vec::new(), WAIT_OUTPUT_LEN);
        upper.dispatch_device_control(wait);

        let Ok(completion) = pending.await else {
            warn!(cycle, "wait-for-input abandoned");
            return None;
        };
        if completion.status != NtStatus::SUCCESS {
            warn!(cycle, status = %completion.status, "wait-for-input failed");
            stats.failed += 1;
            continue;
        }

        let report = completion.output.get(..completion.information).unwrap_or_default();
        let sequence = report_sequence(report);
        if sequence.is_some() && sequence == last_sequence {
            stats.stale += 1;
            warn!(cycle, ?sequence, "stale report");
        } else {
            stats.fresh += 1;
            info!(cycle, ?sequence, "fresh report");
        }
        last_sequence = sequence;
    }
    Some(stats)
}
