//! Cycle scheduling and signal handling
//!
//! `run` mode executes one cycle and exits; an external timer decides when the
//! next one happens. `watch` mode keeps the process alive and sleeps a fixed
//! interval plus random jitter between cycles. Cycles never overlap because
//! each one is awaited before the next sleep starts.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use rand::Rng;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, error, info, warn};

use crate::config::ScheduleConfig;
use crate::metrics;
use crate::reconciler::{CycleReport, Reconciler};

//==============================================================================
// Delays
//==============================================================================

/// Interval plus a uniformly random share of `jitter`
pub fn next_delay<R: Rng + ?Sized>(interval: Duration, jitter: Duration, rng: &mut R) -> Duration {
    let jitter_ms = u64::try_from(jitter.as_millis()).unwrap_or(u64::MAX);
    if jitter_ms == 0 {
        return interval;
    }
    interval + Duration::from_millis(rng.random_range(0..=jitter_ms))
}

/// Remaining grace time before the first cycle
///
/// The boot delay counts from system boot, so a process started long after
/// boot runs immediately. Unknown uptime waits the full delay.
pub fn initial_delay(boot_delay: Duration, uptime: Option<Duration>) -> Duration {
    match uptime {
        Some(uptime) => boot_delay.saturating_sub(uptime),
        None => boot_delay,
    }
}

/// Time since boot, from `/proc/uptime`
pub fn system_uptime() -> Option<Duration> {
    let text = std::fs::read_to_string("/proc/uptime").ok()?;
    parse_uptime(&text)
}

fn parse_uptime(text: &str) -> Option<Duration> {
    let secs: f64 = text.split_whitespace().next()?.parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(secs))
}

//==============================================================================
// Runners
//==============================================================================

/// Runs a single cycle, aborting it on SIGTERM or SIGINT
///
/// An interrupted cycle is an error so the process exits non-zero; writes
/// that already completed stay in place and the next cycle corrects the rest.
pub async fn run_once(reconciler: &Reconciler, metrics_file: Option<&Path>) -> Result<CycleReport> {
    let mut sigterm = signal(SignalKind::terminate()).context("install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("install SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => bail!("Interrupted by SIGTERM; cycle aborted"),
        _ = sigint.recv() => bail!("Interrupted by SIGINT; cycle aborted"),
        report = reconciler.run_cycle() => {
            export_metrics(metrics_file);
            Ok(report)
        }
    }
}

/// Runs cycles until SIGTERM or SIGINT
pub async fn watch(
    reconciler: &Reconciler,
    schedule: ScheduleConfig,
    metrics_file: Option<&Path>,
) -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate()).context("install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("install SIGINT handler")?;

    info!(
        "Watching {} records every {:?} (+ up to {:?} jitter)",
        reconciler.records().len(),
        schedule.interval,
        schedule.jitter
    );

    let mut delay = initial_delay(schedule.boot_delay, system_uptime());
    if !delay.is_zero() {
        info!("Waiting {:?} of boot grace before the first cycle", delay);
    }

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received");
                break;
            }
            _ = sigint.recv() => {
                info!("SIGINT received");
                break;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        tokio::select! {
            _ = sigterm.recv() => {
                warn!("SIGTERM received during cycle; aborting in-flight requests");
                break;
            }
            _ = sigint.recv() => {
                warn!("SIGINT received during cycle; aborting in-flight requests");
                break;
            }
            _ = reconciler.run_cycle() => {
                export_metrics(metrics_file);
            }
        }

        delay = next_delay(schedule.interval, schedule.jitter, &mut rand::rng());
        debug!("Next cycle in {:?}", delay);
    }

    info!("Watch stopped");
    Ok(())
}

fn export_metrics(metrics_file: Option<&Path>) {
    if let Some(path) = metrics_file {
        if let Err(e) = metrics::write_textfile(path) {
            error!("Metrics export failed: {:#}", e);
        }
    }
}

//==============================================================================
// Tests
//==============================================================================
