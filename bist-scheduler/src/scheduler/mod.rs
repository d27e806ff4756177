/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Self-test schedulers.
//!
//! Both variants are built on one generic core, [`UnitTable<D>`], which owns
//! the `(unit, record)` pairs and implements the single invocation step every
//! variant shares: cycle-reset detection, the bounded `run_test()` call,
//! record updates and fault classification.  The variants only differ in how
//! they pick *which* unit runs on a tick:
//!
//! | Variant | Time domain | Units per tick | Selection |
//! |---|---|---|---|
//! | [`TimesliceScheduler`] | [`SliceDomain`](crate::time::SliceDomain) | exactly one | trigger equality + fairness bump |
//! | [`ElapsedScheduler`] | any [`Clock`](crate::time::Clock) | every due unit | phase machine over two budgets |
//!
//! # Design decisions vs the firmware tables
//!
//! | Topic | Static-table firmware | Rust |
//! |---|---|---|
//! | State | Process-wide control-block arrays | Scheduler owns its table; moved into the driver |
//! | Dispatch | Function-pointer vectors | `Box<dyn SelfTest + Send>` |
//! | Two schedulers | Two copies of the bookkeeping | One `UnitTable<D>` generic over the time domain |
//! | Errors | Bit-packed words everywhere | [`Fault`] enum, encoded only at the funnel |
//!
//! # Example
//! ```rust,ignore
//! let mut sched = TimesliceScheduler::builder(config)
//!     .unit(Box::new(flash_crc), SliceSpec::new(0, 2, 10))
//!     .build()?;
//! let mut funnel = EscalationFunnel::new(HaltHandler);
//! loop {
//!     wait_for_timeslice();
//!     sched.tick(&mut funnel);
//! }
//! ```

pub mod elapsed;
pub mod error;
pub mod feasibility;
pub mod monitor;
pub mod timeslice;

pub use elapsed::{
    ElapsedConfig, ElapsedScheduler, ErrorKinds, SchedulerPhase, TraceWatchdog, UnitSchedule,
    Watchdog,
};
pub use error::{BuildError, Corruption, Fault};
pub use monitor::CompletionMonitor;
pub use timeslice::{SliceOutcome, SliceSpec, TimesliceConfig, TimesliceScheduler};

use std::time::Instant;

use tracing::{debug, info, trace};

use crate::escalation::{EscalationFunnel, FatalHandler, TestTypeTag};
use crate::record::ScheduleRecord;
use crate::time::TimeDomain;
use crate::unit::{SelfTest, TestReport, TestState};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Capacity of a unit table.
///
/// The firmware tables are fixed-size arrays; the limit is kept so a
/// misconfigured build fails at construction rather than silently
/// stretching every diagnostic cycle.
pub const MAX_UNITS: usize = 32;

/// A self-test as stored by the scheduler.
pub type BoxedUnit = Box<dyn SelfTest + Send>;

// ── Driver-facing trait ───────────────────────────────────────────────────────

/// Common tick interface for both scheduler variants.
pub trait DiagnosticScheduler {
    /// What one successful tick reports back to the driver.
    type Outcome;

    /// Advance by one tick, returning any detected fault instead of
    /// escalating it.
    fn try_tick(&mut self) -> Result<Self::Outcome, Fault>;

    /// Advance by one tick; any fault goes straight to the funnel.
    fn tick<H: FatalHandler>(&mut self, funnel: &mut EscalationFunnel<H>) -> Self::Outcome {
        match self.try_tick() {
            Ok(outcome) => outcome,
            Err(fault) => funnel.escalate(&fault),
        }
    }
}

// ── Unit table ────────────────────────────────────────────────────────────────

struct UnitEntry<D: TimeDomain> {
    unit: BoxedUnit,
    record: ScheduleRecord<D>,
}

/// How [`UnitTable::invoke`] treats one call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct InvokeOptions {
    /// Update `max_observed_gap` on completion.
    pub track_gaps: bool,
    /// Measure the host time spent inside `run_test()`.
    pub time_runs: bool,
    /// Error kind used when the unit's reply or record is corrupt.
    pub corruption_kind: u32,
}

/// Ordered `(unit, record)` pairs plus the time domain they are measured in.
pub struct UnitTable<D: TimeDomain> {
    domain: D,
    entries: Vec<UnitEntry<D>>,
}

impl<D: TimeDomain> UnitTable<D> {
    pub fn new(domain: D) -> Self {
        Self {
            domain,
            entries: Vec::new(),
        }
    }

    /// Append a unit, validating its record against the table.
    pub fn push(&mut self, unit: BoxedUnit, record: ScheduleRecord<D>) -> Result<(), BuildError> {
        if self.entries.len() >= MAX_UNITS {
            return Err(BuildError::TooMany {
                count: self.entries.len() + 1,
                capacity: MAX_UNITS,
            });
        }
        let name = unit.name().to_string();
        if record.cadence() == D::Span::default() {
            return Err(BuildError::ZeroCadence { unit: name });
        }
        if record.required_runs_per_cycle() == 0 {
            return Err(BuildError::ZeroRequiredRuns { unit: name });
        }
        if record.completion_budget() < record.cadence() {
            return Err(BuildError::BudgetBelowCadence {
                unit: name,
                budget: format!("{:?}", record.completion_budget()),
                cadence: format!("{:?}", record.cadence()),
            });
        }
        let tag = unit.test_type_tag();
        if let Some(other) = self.entries.iter().find(|e| e.unit.test_type_tag() == tag) {
            return Err(BuildError::DuplicateTag {
                tag,
                first: other.unit.name().to_string(),
                second: name,
            });
        }

        debug!(unit = %name, tag = %tag, cadence = ?record.cadence(), "registered self-test");
        self.entries.push(UnitEntry { unit, record });
        Ok(())
    }

    pub fn domain(&self) -> &D {
        &self.domain
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn record(&self, index: usize) -> Option<&ScheduleRecord<D>> {
        self.entries.get(index).map(|e| &e.record)
    }

    pub fn records(&self) -> impl Iterator<Item = &ScheduleRecord<D>> {
        self.entries.iter().map(|e| &e.record)
    }

    /// `(name, tag, record)` for every unit, in table order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, TestTypeTag, &ScheduleRecord<D>)> {
        self.entries
            .iter()
            .map(|e| (e.unit.name(), e.unit.test_type_tag(), &e.record))
    }

    pub fn unit_name(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(|e| e.unit.name())
    }

    pub fn unit_tag(&self, index: usize) -> Option<TestTypeTag> {
        self.entries.get(index).map(|e| e.unit.test_type_tag())
    }

    pub(crate) fn record_mut(&mut self, index: usize) -> Option<&mut ScheduleRecord<D>> {
        self.entries.get_mut(index).map(|e| &mut e.record)
    }

    pub(crate) fn records_mut(&mut self) -> impl Iterator<Item = &mut ScheduleRecord<D>> {
        self.entries.iter_mut().map(|e| &mut e.record)
    }

    /// Index of the first record matching `pred`.
    pub(crate) fn position(&self, pred: impl Fn(&ScheduleRecord<D>) -> bool) -> Option<usize> {
        self.entries.iter().position(|e| pred(&e.record))
    }

    /// Run one bounded step of the unit at `index`.
    ///
    /// Calls `reset_for_new_cycle()` first when the stored state shows that a
    /// new cycle is starting.  `last_completion` moves only on `LoopComplete`.
    pub(crate) fn invoke(
        &mut self,
        index: usize,
        now: D::Instant,
        opts: InvokeOptions,
        scheduler_tag: TestTypeTag,
    ) -> Result<TestReport, Fault> {
        let len = self.entries.len();
        let domain = &self.domain;
        let entry = self.entries.get_mut(index).ok_or(Fault::SchedulerCorruption {
            tag: scheduler_tag,
            kind: opts.corruption_kind,
            detail: Corruption::CursorOutOfRange { cursor: index, len },
        })?;
        let tag = entry.unit.test_type_tag();

        match entry.record.state() {
            TestState::Failure => {
                return Err(Fault::SchedulerCorruption {
                    tag,
                    kind: opts.corruption_kind,
                    detail: Corruption::RecordInFailureState { index },
                });
            }
            state if state.starts_new_cycle() => {
                debug!(unit = entry.unit.name(), "starting new diagnostic cycle");
                entry.unit.reset_for_new_cycle();
            }
            _ => {}
        }

        let started = opts.time_runs.then(Instant::now);
        let report = entry.unit.run_test();
        let duration = started.map(|s| s.elapsed());
        entry.record.note_invocation(now, duration, report.state);

        if report.is_defect() {
            return Err(Fault::UnitDefect {
                unit: entry.unit.name().to_string(),
                tag,
                kind: report.error_kind,
                state: report.state,
            });
        }

        match report.state {
            TestState::LoopComplete => {
                entry.record.note_completion(domain, now, opts.track_gaps);
                info!(
                    unit = entry.unit.name(),
                    completions = entry.record.completions(),
                    max_gap = ?entry.record.max_observed_gap(),
                    "self-test loop complete"
                );
            }
            TestState::InProgress => {
                trace!(unit = entry.unit.name(), run_time = ?duration, "self-test in progress");
            }
            other => {
                return Err(Fault::SchedulerCorruption {
                    tag,
                    kind: opts.corruption_kind,
                    detail: Corruption::InvalidReturnState(other),
                });
            }
        }

        Ok(report)
    }
}

// ── Test support ──────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted stub units shared by the scheduler tests.

    use std::sync::{Arc, Mutex};

    use crate::escalation::TestTypeTag;
    use crate::unit::{SelfTest, TestReport};

    /// What a [`ScriptedUnit`] has been asked to do, in order.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Call {
        Reset,
        Run,
    }

    #[derive(Debug, Default)]
    pub struct Log {
        pub calls: Vec<Call>,
    }

    impl Log {
        pub fn runs(&self) -> usize {
            self.calls.iter().filter(|c| **c == Call::Run).count()
        }

        pub fn resets(&self) -> usize {
            self.calls.iter().filter(|c| **c == Call::Reset).count()
        }
    }

    /// Replays `script` (cycling) and records every call in a shared log.
    pub struct ScriptedUnit {
        name: String,
        tag: TestTypeTag,
        script: Vec<TestReport>,
        pos: usize,
        pub log: Arc<Mutex<Log>>,
    }

    impl ScriptedUnit {
        pub fn new(name: &str, tag: u8, script: Vec<TestReport>) -> Self {
            Self {
                name: name.to_string(),
                tag: TestTypeTag::new(tag).unwrap(),
                script,
                pos: 0,
                log: Arc::new(Mutex::new(Log::default())),
            }
        }

        /// Completes every call.
        pub fn completing(name: &str, tag: u8) -> Self {
            Self::new(name, tag, vec![TestReport::loop_complete()])
        }

        /// Needs `calls` invocations per loop.
        pub fn taking(name: &str, tag: u8, calls: usize) -> Self {
            let mut script = vec![TestReport::in_progress(); calls.saturating_sub(1)];
            script.push(TestReport::loop_complete());
            Self::new(name, tag, script)
        }

        pub fn log(&self) -> Arc<Mutex<Log>> {
            Arc::clone(&self.log)
        }
    }

    impl SelfTest for ScriptedUnit {
        fn run_test(&mut self) -> TestReport {
            self.log.lock().unwrap().calls.push(Call::Run);
            let report = self.script[self.pos % self.script.len()];
            self.pos += 1;
            report
        }

        fn reset_for_new_cycle(&mut self) {
            self.log.lock().unwrap().calls.push(Call::Reset);
        }

        fn test_type_tag(&self) -> TestTypeTag {
            self.tag
        }

        fn name(&self) -> &str {
            &self.name
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
