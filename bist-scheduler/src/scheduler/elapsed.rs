/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Wall-clock driven self-test scheduler.
//!
//! Each tick reads the clock and derives a [`SchedulerPhase`] from two
//! budgets:
//!
//! ```text
//!              first tick ─────────────────────────► InitialInstantiation
//!   elapsed(now, cycle_start) > whole_cycle_budget
//!        ├── every unit satisfied ─────────────────► CycleExpiredAllComplete
//!        └── otherwise ────────────────────────────► CycleExpiredIncomplete (fatal)
//!   elapsed(now, last_period) > per_iteration_budget
//!        ├── every unit satisfied ─────────────────► AllCompletedForPeriod
//!        ├── a unit is due and unsatisfied ────────► IterationsDue
//!        └── otherwise ────────────────────────────► NoIterationsDue
//!   neither ───────────────────────────────────────► NoNewPeriod
//! ```
//!
//! In `IterationsDue`, every due and unsatisfied unit from the enumeration
//! cursor to the end of the table gets one invocation.
//!
//! A unit that met its repeat count idles until the cycle rolls over, so the
//! completion monitor only watches unsatisfied units, and a rollover restarts
//! every unit's completion budget.

use std::fmt;

use tracing::{debug, info, trace, warn};

use super::error::{BuildError, Corruption, Fault};
use super::monitor::CompletionMonitor;
use super::{BoxedUnit, DiagnosticScheduler, InvokeOptions, UnitTable};
use crate::escalation::TestTypeTag;
use crate::record::ScheduleRecord;
use crate::time::Clock;

// ── Phase ─────────────────────────────────────────────────────────────────────

/// Meta-state recomputed on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    InitialInstantiation,
    CycleExpiredAllComplete,
    CycleExpiredIncomplete,
    NoNewPeriod,
    AllCompletedForPeriod,
    NoIterationsDue,
    IterationsDue,
}

impl fmt::Display for SchedulerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchedulerPhase::InitialInstantiation => "initial_instantiation",
            SchedulerPhase::CycleExpiredAllComplete => "cycle_expired_all_complete",
            SchedulerPhase::CycleExpiredIncomplete => "cycle_expired_incomplete",
            SchedulerPhase::NoNewPeriod => "no_new_period",
            SchedulerPhase::AllCompletedForPeriod => "all_completed_for_period",
            SchedulerPhase::NoIterationsDue => "no_iterations_due",
            SchedulerPhase::IterationsDue => "iterations_due",
        };
        f.write_str(s)
    }
}

// ── Runtime configuration ─────────────────────────────────────────────────────

/// Watchdog service, kicked once per tick.
pub trait Watchdog {
    fn kick(&mut self);
}

impl<F: FnMut()> Watchdog for F {
    fn kick(&mut self) {
        self()
    }
}

/// Watchdog that only emits a trace event.
#[derive(Debug, Default)]
pub struct TraceWatchdog;

impl Watchdog for TraceWatchdog {
    fn kick(&mut self) {
        trace!("watchdog kick");
    }
}

/// Error kinds the scheduler places in the low field of its own faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorKinds {
    /// A unit replied with a state outside the valid replies.
    pub corrupted_vector: u32,
    /// The scheduler's own bookkeeping failed a sanity check.
    pub corrupted_memory: u32,
    /// A unit exceeded its completion budget.
    pub test_too_long: u32,
    /// The diagnostic cycle expired before every unit completed.
    pub cycle_incomplete: u32,
}

/// Injected runtime parameters.  The clock and elapsed-time computation are
/// the scheduler's [`Clock`]; the fatal handler is the funnel passed to
/// [`DiagnosticScheduler::tick`].
#[derive(Debug, Clone)]
pub struct ElapsedConfig<S> {
    pub whole_cycle_budget: S,
    pub per_iteration_budget: S,
    /// Run the completion monitor on every tick.
    pub monitor_total_testing_time: bool,
    /// Track completion gaps and per-call run time.
    pub monitor_iteration_times: bool,
    pub scheduler_error_tag: TestTypeTag,
    pub error_kinds: ErrorKinds,
}

/// Per-unit schedule for the elapsed-time variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitSchedule<S> {
    pub cadence: S,
    pub completion_budget: S,
    pub required_runs: u32,
}

impl<S> UnitSchedule<S> {
    pub fn new(cadence: S, completion_budget: S) -> Self {
        Self {
            cadence,
            completion_budget,
            required_runs: 1,
        }
    }

    pub fn with_required_runs(mut self, runs: u32) -> Self {
        self.required_runs = runs;
        self
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

pub struct ElapsedBuilder<C: Clock> {
    clock: C,
    config: ElapsedConfig<C::Span>,
    watchdog: Box<dyn Watchdog + Send>,
    units: Vec<(BoxedUnit, UnitSchedule<C::Span>)>,
}

impl<C: Clock> ElapsedBuilder<C> {
    pub fn unit(mut self, unit: BoxedUnit, schedule: UnitSchedule<C::Span>) -> Self {
        self.units.push((unit, schedule));
        self
    }

    pub fn watchdog(mut self, watchdog: impl Watchdog + Send + 'static) -> Self {
        self.watchdog = Box::new(watchdog);
        self
    }

    pub fn build(self) -> Result<ElapsedScheduler<C>, BuildError> {
        if self.units.is_empty() {
            return Err(BuildError::Empty);
        }

        // Records are re-seeded on the first tick; the construction instant
        // only has to be valid.
        let start = self.clock.now();
        let mut table = UnitTable::new(self.clock);
        for (unit, schedule) in self.units {
            let record = ScheduleRecord::new(schedule.cadence, schedule.completion_budget, start)
                .with_required_runs(schedule.required_runs);
            table.push(unit, record)?;
        }

        info!(
            units = table.len(),
            whole_cycle_budget = ?self.config.whole_cycle_budget,
            per_iteration_budget = ?self.config.per_iteration_budget,
            "Elapsed-time self-test scheduler ready"
        );

        let monitor =
            CompletionMonitor::new(self.config.error_kinds.test_too_long, 1).skipping_satisfied();
        Ok(ElapsedScheduler {
            table,
            config: self.config,
            watchdog: self.watchdog,
            monitor,
            stamps: None,
            cursor: 0,
            phase: SchedulerPhase::InitialInstantiation,
        })
    }
}

// ── Scheduler ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Timestamps<I> {
    current: I,
    cycle_start: I,
    last_period: I,
}

pub struct ElapsedScheduler<C: Clock> {
    table: UnitTable<C>,
    config: ElapsedConfig<C::Span>,
    watchdog: Box<dyn Watchdog + Send>,
    monitor: CompletionMonitor,
    /// `None` until the first tick.
    stamps: Option<Timestamps<C::Instant>>,
    cursor: usize,
    phase: SchedulerPhase,
}

impl<C: Clock> ElapsedScheduler<C> {
    pub fn builder(clock: C, config: ElapsedConfig<C::Span>) -> ElapsedBuilder<C> {
        ElapsedBuilder {
            clock,
            config,
            watchdog: Box::new(TraceWatchdog),
            units: Vec::new(),
        }
    }

    pub fn table(&self) -> &UnitTable<C> {
        &self.table
    }

    /// Phase decided on the most recent tick.
    pub fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    /// Instant read on the most recent tick.
    pub fn current_timestamp(&self) -> Option<C::Instant> {
        self.stamps.map(|s| s.current)
    }

    /// Position the next enumeration starts from.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    fn all_satisfied(&self) -> bool {
        self.table.records().all(|r| r.is_satisfied())
    }

    fn corrupted_memory(&self, detail: Corruption) -> Fault {
        Fault::SchedulerCorruption {
            tag: self.config.scheduler_error_tag,
            kind: self.config.error_kinds.corrupted_memory,
            detail,
        }
    }

    /// Synchronise every timestamp and completion mark to `now`.
    fn instantiate(&mut self, now: C::Instant) {
        self.stamps = Some(Timestamps {
            current: now,
            cycle_start: now,
            last_period: now,
        });
        for record in self.table.records_mut() {
            record.seed(now);
        }
        self.cursor = 0;
        debug!("self-test scheduler instantiated");
    }

    /// Derive this tick's phase, moving the cycle and period stamps.
    fn evaluate(&mut self, now: C::Instant) -> Result<SchedulerPhase, Fault> {
        let Some(mut stamps) = self.stamps else {
            self.instantiate(now);
            return Ok(SchedulerPhase::InitialInstantiation);
        };
        stamps.current = now;
        let domain = self.table.domain();

        let phase = if domain.elapsed(now, stamps.cycle_start) > self.config.whole_cycle_budget {
            stamps.cycle_start = now;
            if self.all_satisfied() {
                for record in self.table.records_mut() {
                    record.reset_cycle(now);
                }
                info!("diagnostic cycle complete, starting next cycle");
                SchedulerPhase::CycleExpiredAllComplete
            } else {
                SchedulerPhase::CycleExpiredIncomplete
            }
        } else if domain.elapsed(now, stamps.last_period) > self.config.per_iteration_budget {
            stamps.last_period = now;
            if self.all_satisfied() {
                SchedulerPhase::AllCompletedForPeriod
            } else {
                match self.find_due(now)? {
                    Some(index) => {
                        self.cursor = index;
                        SchedulerPhase::IterationsDue
                    }
                    None => SchedulerPhase::NoIterationsDue,
                }
            }
        } else {
            SchedulerPhase::NoNewPeriod
        };

        self.stamps = Some(stamps);
        Ok(phase)
    }

    /// First unsatisfied, due unit starting at the cursor (wrapping).
    fn find_due(&self, now: C::Instant) -> Result<Option<usize>, Fault> {
        let len = self.table.len();
        if self.cursor >= len {
            return Err(self.corrupted_memory(Corruption::CursorOutOfRange {
                cursor: self.cursor,
                len,
            }));
        }
        let domain = self.table.domain();
        Ok((0..len).map(|k| (self.cursor + k) % len).find(|&i| {
            self.table
                .record(i)
                .is_some_and(|r| !r.is_satisfied() && r.is_due_by_elapsed(domain, now))
        }))
    }

    /// Invoke every due, unsatisfied unit from the cursor to the table end.
    fn run_due(&mut self, now: C::Instant) -> Result<usize, Fault> {
        let len = self.table.len();
        if self.cursor >= len {
            return Err(self.corrupted_memory(Corruption::CursorOutOfRange {
                cursor: self.cursor,
                len,
            }));
        }

        let opts = InvokeOptions {
            track_gaps: self.config.monitor_iteration_times,
            time_runs: self.config.monitor_iteration_times,
            corruption_kind: self.config.error_kinds.corrupted_vector,
        };

        let mut invoked = 0;
        let mut last = None;
        for index in self.cursor..len {
            let due = self.table.record(index).is_some_and(|r| {
                !r.is_satisfied() && r.is_due_by_elapsed(self.table.domain(), now)
            });
            if !due {
                continue;
            }
            let report = self
                .table
                .invoke(index, now, opts, self.config.scheduler_error_tag)?;
            if report.recheck_in.is_some() {
                debug!(index, "re-check requests are not used by the elapsed-time scheduler");
            }
            invoked += 1;
            last = Some(index);
        }

        self.cursor = last.map_or(0, |i| (i + 1) % len);
        Ok(invoked)
    }
}

impl<C: Clock> DiagnosticScheduler for ElapsedScheduler<C> {
    type Outcome = SchedulerPhase;

    fn try_tick(&mut self) -> Result<SchedulerPhase, Fault> {
        let now = self.table.domain().now();
        let phase = self.evaluate(now)?;
        self.phase = phase;

        match phase {
            SchedulerPhase::InitialInstantiation => {}
            SchedulerPhase::CycleExpiredIncomplete => {
                let incomplete = self.table.records().filter(|r| !r.is_satisfied()).count();
                warn!(incomplete, "diagnostic cycle expired before all self-tests completed");
                return Err(Fault::CycleIncomplete {
                    tag: self.config.scheduler_error_tag,
                    kind: self.config.error_kinds.cycle_incomplete,
                    incomplete,
                });
            }
            SchedulerPhase::IterationsDue => {
                let invoked = self.run_due(now)?;
                debug!(invoked, cursor = self.cursor, "ran due self-tests");
            }
            other => trace!(phase = %other, "no self-test due"),
        }

        if self.config.monitor_total_testing_time && phase != SchedulerPhase::InitialInstantiation {
            self.monitor.poll(&self.table, now)?;
        }
        self.watchdog.kick();
        Ok(phase)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
