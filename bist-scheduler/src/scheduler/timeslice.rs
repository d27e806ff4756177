/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Fixed-cadence timeslice scheduler.
//!
//! Driven once per timeslice by an external fixed-rate counter.  Exactly one
//! unit runs per tick:
//!
//! 1. pick the first record whose trigger equals the current slice, or the
//!    last record if none does;
//! 2. advance its trigger by its step *before* the call;
//! 3. run it and update its record (a unit's `recheck_in` request overrides
//!    the advanced trigger);
//! 4. bump every other record due this slice to the next slice;
//! 5. advance the slice counter.

use tracing::{debug, info};

use super::error::{BuildError, Fault};
use super::feasibility::{analyse_plan, log_plan_findings};
use super::monitor::CompletionMonitor;
use super::{BoxedUnit, DiagnosticScheduler, InvokeOptions, UnitTable};
use crate::escalation::TestTypeTag;
use crate::record::ScheduleRecord;
use crate::time::{SliceDomain, TimeDomain};
use crate::unit::TestState;

// ── Configuration ─────────────────────────────────────────────────────────────

/// Per-record timeslice plan: `{ trigger, step, timeout }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceSpec {
    /// Slice number at which the unit first runs.
    pub trigger: u32,
    /// Cadence in slices.
    pub step: u32,
    /// Completion budget in slices.
    pub timeout: u32,
}

impl SliceSpec {
    pub fn new(trigger: u32, step: u32, timeout: u32) -> Self {
        Self {
            trigger,
            step,
            timeout,
        }
    }
}

/// Scheduler-wide settings for the timeslice variant.
#[derive(Debug, Clone)]
pub struct TimesliceConfig {
    /// Tag placed on faults the scheduler detects in its own metadata.
    pub scheduler_error_tag: TestTypeTag,
    /// Kind used for invalid unit replies and corrupt records.
    pub corrupted_state_error_code: u32,
    /// Kind used when a unit exceeds its completion timeout.
    pub completion_timeout_error_code: u32,
    /// Completion check pace, in ticks.
    pub completion_check_every: u32,
}

/// What happened on one slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceOutcome {
    pub slice: u32,
    /// Index of the unit that ran.
    pub index: usize,
    pub state: TestState,
    /// `true` if no trigger matched and the last record was run instead.
    pub fallback: bool,
    /// Number of other records that were due this slice and were deferred.
    pub deferred: usize,
}

// ── Builder ───────────────────────────────────────────────────────────────────

pub struct TimesliceBuilder {
    config: TimesliceConfig,
    units: Vec<(BoxedUnit, SliceSpec)>,
}

impl TimesliceBuilder {
    pub fn unit(mut self, unit: BoxedUnit, spec: SliceSpec) -> Self {
        self.units.push((unit, spec));
        self
    }

    /// Validate the plan and produce the scheduler.
    ///
    /// Every record starts its completion budget at slice 0, so a first
    /// trigger later than the timeout is rejected.  Plan feasibility
    /// findings are logged, not enforced.
    pub fn build(self) -> Result<TimesliceScheduler, BuildError> {
        if self.units.is_empty() {
            return Err(BuildError::Empty);
        }

        let specs: Vec<SliceSpec> = self.units.iter().map(|(_, s)| *s).collect();
        let mut table = UnitTable::new(SliceDomain);
        for (unit, spec) in self.units {
            if spec.trigger > spec.timeout {
                return Err(BuildError::TriggerBeyondTimeout {
                    unit: unit.name().to_string(),
                    trigger: spec.trigger,
                    timeout: spec.timeout,
                });
            }
            let mut record = ScheduleRecord::new(spec.step, spec.timeout, 0);
            record.due_at = spec.trigger;
            table.push(unit, record)?;
        }

        log_plan_findings(&analyse_plan(&specs));

        info!(
            units = table.len(),
            check_every = self.config.completion_check_every,
            "Timeslice self-test scheduler ready"
        );

        let monitor = CompletionMonitor::new(
            self.config.completion_timeout_error_code,
            self.config.completion_check_every,
        );
        Ok(TimesliceScheduler {
            table,
            slice: 0,
            monitor,
            config: self.config,
        })
    }
}

// ── Scheduler ─────────────────────────────────────────────────────────────────

pub struct TimesliceScheduler {
    table: UnitTable<SliceDomain>,
    slice: u32,
    monitor: CompletionMonitor,
    config: TimesliceConfig,
}

impl TimesliceScheduler {
    pub fn builder(config: TimesliceConfig) -> TimesliceBuilder {
        TimesliceBuilder {
            config,
            units: Vec::new(),
        }
    }

    /// The slice the next tick will run.
    pub fn slice(&self) -> u32 {
        self.slice
    }

    pub fn table(&self) -> &UnitTable<SliceDomain> {
        &self.table
    }

    /// Completion check against the current slice, outside the paced poll.
    pub fn check_completion(&self) -> Result<(), Fault> {
        self.monitor.check(&self.table, self.slice)
    }

    fn invoke_options(&self) -> InvokeOptions {
        InvokeOptions {
            track_gaps: true,
            time_runs: true,
            corruption_kind: self.config.corrupted_state_error_code,
        }
    }
}

impl DiagnosticScheduler for TimesliceScheduler {
    type Outcome = SliceOutcome;

    fn try_tick(&mut self) -> Result<SliceOutcome, Fault> {
        let slice = self.slice;
        let domain = *self.table.domain();
        self.monitor.poll(&self.table, slice)?;

        // The fallback keeps the schedule moving when no trigger matches.
        let (index, fallback) = match self.table.position(|r| r.due_at == slice) {
            Some(i) => (i, false),
            None => (self.table.len() - 1, true),
        };
        if fallback {
            debug!(slice, index, "no trigger matches this slice, running last record");
        }

        if let Some(record) = self.table.record_mut(index) {
            record.due_at = domain.advance(record.due_at, record.cadence());
        }

        let opts = self.invoke_options();
        let report = self
            .table
            .invoke(index, slice, opts, self.config.scheduler_error_tag)?;

        if let Some(slices) = report.recheck_in {
            if let Some(record) = self.table.record_mut(index) {
                record.due_at = domain.advance(slice, slices.max(1));
                debug!(slice, index, due_at = record.due_at, "unit requested early re-check");
            }
        }

        let mut deferred = 0;
        for (i, record) in self.table.records_mut().enumerate() {
            if i != index && record.due_at == slice {
                record.due_at = domain.advance(slice, 1);
                deferred += 1;
            }
        }
        if deferred > 0 {
            debug!(slice, deferred, "deferred colliding records to next slice");
        }

        self.slice = domain.advance(slice, 1);

        Ok(SliceOutcome {
            slice,
            index,
            state: report.state,
            fallback,
            deferred,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escalation::{EscalationFunnel, ErrorCode, FatalEscalation, PanicHandler};
    use crate::scheduler::testing::ScriptedUnit;
    use crate::unit::TestReport;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    fn config() -> TimesliceConfig {
        TimesliceConfig {
            scheduler_error_tag: TestTypeTag::new(63).unwrap(),
            corrupted_state_error_code: 1,
            completion_timeout_error_code: 5,
            completion_check_every: 1,
        }
    }

    /// Run `ticks` slices and return the index that ran on each.
    fn run(sched: &mut TimesliceScheduler, ticks: u32) -> Vec<usize> {
        (0..ticks).map(|_| sched.try_tick().unwrap().index).collect()
    }

    #[test]
    fn empty_plan_is_rejected() {
        assert_eq!(
            TimesliceScheduler::builder(config()).build().err(),
            Some(BuildError::Empty)
        );
    }

    #[test]
    fn trigger_later_than_timeout_is_rejected() {
        let built = TimesliceScheduler::builder(config())
            .unit(Box::new(ScriptedUnit::completing("hog", 1)), SliceSpec::new(0, 1, 30))
            .unit(Box::new(ScriptedUnit::completing("late", 2)), SliceSpec::new(50, 10, 20))
            .build();
        assert_eq!(
            built.err(),
            Some(BuildError::TriggerBeyondTimeout {
                unit: "late".to_string(),
                trigger: 50,
                timeout: 20,
            })
        );
    }

    #[test]
    fn trigger_at_timeout_first_runs_within_budget() {
        let mut sched = TimesliceScheduler::builder(config())
            .unit(Box::new(ScriptedUnit::completing("late", 2)), SliceSpec::new(21, 10, 21))
            .unit(Box::new(ScriptedUnit::completing("hog", 1)), SliceSpec::new(0, 1, 30))
            .build()
            .unwrap();

        for _ in 0..60 {
            sched.try_tick().unwrap();
        }
        let late = sched.table().record(0).unwrap();
        assert_eq!(late.completions(), 4);
        assert_eq!(late.last_completion(), 51);
        assert_eq!(late.due_at(), 61);
    }

    #[test]
    fn identical_triggers_run_one_and_defer_the_rest() {
        let mut sched = TimesliceScheduler::builder(config())
            .unit(Box::new(ScriptedUnit::completing("a", 1)), SliceSpec::new(0, 4, 20))
            .unit(Box::new(ScriptedUnit::completing("b", 2)), SliceSpec::new(0, 4, 20))
            .unit(Box::new(ScriptedUnit::completing("c", 3)), SliceSpec::new(0, 4, 20))
            .build()
            .unwrap();

        let out = sched.try_tick().unwrap();
        assert_eq!(out.index, 0);
        assert_eq!(out.deferred, 2);

        let triggers: Vec<u32> = sched.table().records().map(|r| r.due_at()).collect();
        assert_eq!(triggers, vec![4, 1, 1]);
    }

    #[test]
    fn staggered_plan_runs_each_unit_on_its_cadence() {
        let a = ScriptedUnit::completing("a", 1);
        let b = ScriptedUnit::completing("b", 2);
        let c = ScriptedUnit::completing("c", 3);
        let logs = [a.log(), b.log(), c.log()];
        let mut sched = TimesliceScheduler::builder(config())
            .unit(Box::new(a), SliceSpec::new(1, 2, 10))
            .unit(Box::new(b), SliceSpec::new(0, 4, 10))
            .unit(Box::new(c), SliceSpec::new(2, 4, 10))
            .build()
            .unwrap();

        let ran = run(&mut sched, 8);
        assert_eq!(ran, vec![1, 0, 2, 0, 1, 0, 2, 0]);
        let runs: Vec<usize> = logs.iter().map(|l| l.lock().unwrap().runs()).collect();
        assert_eq!(runs, vec![4, 2, 2], "one invocation per tick, none missed");
    }

    #[test]
    fn colliding_power_of_two_plan_defers_but_never_double_runs() {
        // Cadences {1, 2, 4}, all triggered at slice 0.
        let mut sched = TimesliceScheduler::builder(config())
            .unit(Box::new(ScriptedUnit::completing("c4", 3)), SliceSpec::new(0, 4, 10))
            .unit(Box::new(ScriptedUnit::completing("c2", 2)), SliceSpec::new(0, 2, 10))
            .unit(Box::new(ScriptedUnit::completing("c1", 1)), SliceSpec::new(0, 1, 10))
            .build()
            .unwrap();

        let ran = run(&mut sched, 8);
        assert_eq!(ran.len(), 8, "exactly one unit per tick");
        assert_eq!(ran, vec![0, 1, 2, 1, 0, 1, 2, 1]);
        for &i in &ran {
            assert!(sched.table().record(i).unwrap().completions() > 0);
        }
    }

    #[test]
    fn unmatched_slice_falls_back_to_last_record() {
        let mut sched = TimesliceScheduler::builder(config())
            .unit(Box::new(ScriptedUnit::completing("a", 1)), SliceSpec::new(5, 8, 20))
            .unit(Box::new(ScriptedUnit::completing("idle", 2)), SliceSpec::new(3, 8, 20))
            .build()
            .unwrap();

        let out = sched.try_tick().unwrap();
        assert!(out.fallback);
        assert_eq!(out.index, 1);
        assert_eq!(sched.table().record(1).unwrap().due_at(), 11);
    }

    #[test]
    fn resumable_unit_needs_five_slices() {
        let unit = ScriptedUnit::taking("march", 4, 5);
        let log = unit.log();
        let mut sched = TimesliceScheduler::builder(config())
            .unit(Box::new(unit), SliceSpec::new(0, 1, 10))
            .build()
            .unwrap();

        for _ in 0..4 {
            assert_eq!(sched.try_tick().unwrap().state, TestState::InProgress);
        }
        assert_eq!(sched.table().record(0).unwrap().completions(), 0);
        assert_eq!(sched.try_tick().unwrap().state, TestState::LoopComplete);
        assert_eq!(sched.table().record(0).unwrap().last_completion(), 4);
        assert_eq!(log.lock().unwrap().runs(), 5);
    }

    #[test]
    fn recheck_request_survives_trigger_advance() {
        let unit = ScriptedUnit::new(
            "loopback",
            6,
            vec![TestReport::in_progress().recheck_in(1), TestReport::loop_complete()],
        );
        let mut sched = TimesliceScheduler::builder(config())
            .unit(Box::new(unit), SliceSpec::new(0, 8, 20))
            .unit(Box::new(ScriptedUnit::completing("bg", 7)), SliceSpec::new(100, 100, 200))
            .build()
            .unwrap();

        sched.try_tick().unwrap();
        assert_eq!(sched.table().record(0).unwrap().due_at(), 1);
        let out = sched.try_tick().unwrap();
        assert_eq!(out.index, 0);
        assert!(!out.fallback);
        assert_eq!(sched.table().record(0).unwrap().due_at(), 9);
    }

    #[test]
    fn max_gap_ignores_the_first_completion() {
        let mut sched = TimesliceScheduler::builder(config())
            .unit(Box::new(ScriptedUnit::completing("a", 1)), SliceSpec::new(3, 3, 10))
            .unit(Box::new(ScriptedUnit::completing("bg", 2)), SliceSpec::new(1, 1, 10))
            .build()
            .unwrap();

        run(&mut sched, 7);
        let rec = sched.table().record(0).unwrap();
        assert_eq!(rec.completions(), 2);
        assert_eq!(rec.max_observed_gap(), 3);
    }

    #[test]
    fn starved_unit_is_escalated_once_by_completion_check() {
        let starving = ScriptedUnit::completing("starved", 2);
        let mut sched = TimesliceScheduler::builder(config())
            .unit(Box::new(ScriptedUnit::completing("hog", 1)), SliceSpec::new(0, 1, 10))
            .unit(Box::new(starving), SliceSpec::new(0, 2, 10))
            .build()
            .unwrap();

        let mut funnel = EscalationFunnel::new(PanicHandler);
        let mut ticks = 0;
        let payload = catch_unwind(AssertUnwindSafe(|| loop {
            ticks += 1;
            sched.tick(&mut funnel);
        }))
        .unwrap_err();

        let FatalEscalation(code) = *payload.downcast::<FatalEscalation>().unwrap();
        assert_eq!(code, ErrorCode::encode(5, TestTypeTag::new(2).unwrap()));
        // Slices 0..=10 are within budget; the check at slice 11 fires.
        assert_eq!(ticks, 12);
    }

    #[test]
    fn failure_reply_is_escalated_with_unit_tag() {
        let mut sched = TimesliceScheduler::builder(config())
            .unit(
                Box::new(ScriptedUnit::new("crc", 5, vec![TestReport::failure(0x12)])),
                SliceSpec::new(0, 1, 10),
            )
            .build()
            .unwrap();

        let fault = sched.try_tick().unwrap_err();
        assert_eq!(
            fault.error_code(),
            ErrorCode::encode(0x12, TestTypeTag::new(5).unwrap())
        );
    }

    #[test]
    fn explicit_completion_check_uses_current_slice() {
        let mut sched = TimesliceScheduler::builder(TimesliceConfig {
            completion_check_every: 1_000,
            ..config()
        })
        .unit(Box::new(ScriptedUnit::taking("slow", 1, 100)), SliceSpec::new(0, 1, 3))
        .build()
        .unwrap();

        run(&mut sched, 4);
        assert!(sched.check_completion().is_err());
    }
}
