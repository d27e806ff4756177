/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::fmt::Debug;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use bist_scheduler::config::{BistConfigManager, Variant};
use bist_scheduler::escalation::{EscalationFunnel, HaltHandler};
use bist_scheduler::scheduler::DiagnosticScheduler;
use bist_scheduler::time::MonotonicClock;

// ── CLI argument definition ───────────────────────────────────────────────────

/// Built-in self-test scheduler.
///
/// Example:
///   bist-scheduler --config bist.yaml --variant timeslice --tick-period-ms 5
#[derive(Debug, Parser)]
#[command(
    name = "bist-scheduler",
    about = "Runs resumable self-tests on a fixed-rate tick",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML self-test configuration.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Override the scheduler variant from the configuration.
    #[arg(short = 'v', long = "variant", value_enum)]
    variant: Option<Variant>,

    /// Timer tick period in milliseconds.
    #[arg(short = 't', long = "tick-period-ms", default_value_t = 10)]
    tick_period_ms: u64,

    /// Stop after this many ticks (runs until Ctrl-C when absent).
    #[arg(short = 'n', long = "ticks")]
    ticks: Option<u64>,
}

// ── Driver ────────────────────────────────────────────────────────────────────

/// Call `tick()` once per timer period until `ticks` is reached or Ctrl-C.
///
/// A fatal fault never returns here: the funnel halts the process.
async fn drive<S>(sched: &mut S, period: Duration, ticks: Option<u64>)
where
    S: DiagnosticScheduler,
    S::Outcome: Debug,
{
    let mut funnel = EscalationFunnel::new(HaltHandler);
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut count: u64 = 0;
    loop {
        tokio::select! {
            _ = timer.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!(ticks = count, "Interrupted, stopping self-test scheduler");
                return;
            }
        }

        let outcome = sched.tick(&mut funnel);
        debug!(tick = count, ?outcome, "tick");

        count += 1;
        if ticks.is_some_and(|limit| count >= limit) {
            info!(ticks = count, "Tick limit reached");
            return;
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("BIST scheduler starting up...");

    let cli = Cli::parse();

    info!(
        config         = ?cli.config,
        variant        = ?cli.variant,
        tick_period_ms = cli.tick_period_ms,
        ticks          = ?cli.ticks,
        "Configuration"
    );

    if cli.tick_period_ms == 0 {
        error!("--tick-period-ms must be greater than zero");
        process::exit(2);
    }

    // ── Load configuration ────────────────────────────────────────────────────
    let mut manager = BistConfigManager::new();
    match &cli.config {
        Some(path) => {
            if let Err(e) = manager.load_from_file(path) {
                error!("Failed to load self-test configuration: {:#}", e);
                process::exit(1);
            }
        }
        None => {
            warn!("No configuration file provided, using the built-in default units");
        }
    }
    if let Some(variant) = cli.variant {
        manager.set_variant(variant);
    }

    let config = manager.config();
    for unit in &config.units {
        info!(
            "  [{name}]  kind={kind:?}  tag={tag}  cadence={cadence}  budget={budget}",
            name = unit.name,
            kind = unit.kind,
            tag = unit.tag,
            cadence = unit.cadence,
            budget = unit.completion_budget,
        );
    }

    // ── Build and drive the selected scheduler ────────────────────────────────
    let period = Duration::from_millis(cli.tick_period_ms);
    match config.scheduler.variant {
        Variant::Elapsed => {
            let mut sched = built_or_exit(config.elapsed_scheduler(MonotonicClock));
            drive(&mut sched, period, cli.ticks).await;
            info!(phase = %sched.phase(), "Self-test scheduler stopped");
        }
        Variant::Timeslice => {
            let mut sched = built_or_exit(config.timeslice_scheduler());
            drive(&mut sched, period, cli.ticks).await;
            info!(slice = sched.slice(), "Self-test scheduler stopped");
        }
    }
}

fn built_or_exit<T>(result: anyhow::Result<T>) -> T {
    match result {
        Ok(sched) => sched,
        Err(e) => {
            error!("Failed to build self-test scheduler: {:#}", e);
            process::exit(1);
        }
    }
}
