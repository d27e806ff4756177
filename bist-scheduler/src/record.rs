/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Per-unit scheduling bookkeeping.
//!
//! A [`ScheduleRecord`] is owned by the scheduler next to its unit.  The
//! configuration half (`cadence`, `completion_budget`,
//! `required_runs_per_cycle`) is fixed at construction; only the trigger and
//! history fields move while ticking.
//!
//! `last_completion` moves if and only if the unit returned `LoopComplete`
//! (or the elapsed-time scheduler seeds it on its first tick).  The
//! completion budget is measured from `pending_since`, which additionally
//! restarts when a new diagnostic cycle begins.

use std::time::Duration;

use crate::time::TimeDomain;
use crate::unit::TestState;

#[derive(Debug, Clone)]
pub struct ScheduleRecord<D: TimeDomain> {
    // ── Fixed at construction ─────────────────────────────────────────────────
    cadence: D::Span,
    completion_budget: D::Span,
    required_runs_per_cycle: u32,

    // ── Trigger ───────────────────────────────────────────────────────────────
    /// When the unit should next run.  The timeslice scheduler compares this
    /// for equality with the current slice.
    pub(crate) due_at: D::Instant,

    // ── History ───────────────────────────────────────────────────────────────
    last_completion: D::Instant,
    /// Start of the current wait for a completion.
    pending_since: D::Instant,
    completions: u32,
    max_observed_gap: D::Span,
    last_run_at: Option<D::Instant>,
    last_run_duration: Option<Duration>,
    runs_this_cycle: u32,
    state: TestState,
}

impl<D: TimeDomain> ScheduleRecord<D> {
    /// A fresh `Idle` record whose trigger and completion mark are `start`.
    pub fn new(cadence: D::Span, completion_budget: D::Span, start: D::Instant) -> Self {
        Self {
            cadence,
            completion_budget,
            required_runs_per_cycle: 1,
            due_at: start,
            last_completion: start,
            pending_since: start,
            completions: 0,
            max_observed_gap: D::Span::default(),
            last_run_at: None,
            last_run_duration: None,
            runs_this_cycle: 0,
            state: TestState::Idle,
        }
    }

    /// Number of `LoopComplete` results needed per diagnostic cycle.
    pub fn with_required_runs(mut self, runs: u32) -> Self {
        self.required_runs_per_cycle = runs;
        self
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn cadence(&self) -> D::Span {
        self.cadence
    }

    pub fn completion_budget(&self) -> D::Span {
        self.completion_budget
    }

    pub fn required_runs_per_cycle(&self) -> u32 {
        self.required_runs_per_cycle
    }

    pub fn due_at(&self) -> D::Instant {
        self.due_at
    }

    pub fn last_completion(&self) -> D::Instant {
        self.last_completion
    }

    /// Number of `LoopComplete` results since construction.
    pub fn completions(&self) -> u32 {
        self.completions
    }

    pub fn max_observed_gap(&self) -> D::Span {
        self.max_observed_gap
    }

    pub fn last_run_at(&self) -> Option<D::Instant> {
        self.last_run_at
    }

    /// Host time spent inside the most recent `run_test()` call, if measured.
    pub fn last_run_duration(&self) -> Option<Duration> {
        self.last_run_duration
    }

    pub fn runs_this_cycle(&self) -> u32 {
        self.runs_this_cycle
    }

    pub fn state(&self) -> TestState {
        self.state
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    /// `true` once the unit has met its repeat count for this cycle.
    pub fn is_satisfied(&self) -> bool {
        self.runs_this_cycle >= self.required_runs_per_cycle
    }

    pub fn since_completion(&self, domain: &D, now: D::Instant) -> D::Span {
        domain.elapsed(now, self.last_completion)
    }

    /// Elapsed-time due rule: at least one cadence since the last completion.
    pub fn is_due_by_elapsed(&self, domain: &D, now: D::Instant) -> bool {
        self.since_completion(domain, now) >= self.cadence
    }

    /// Time the unit has owed a completion: since its last completion or
    /// the start of the current cycle, whichever is later.
    pub fn pending_for(&self, domain: &D, now: D::Instant) -> D::Span {
        domain.elapsed(now, self.pending_since)
    }

    /// `true` if the completion budget has been exceeded.
    pub fn is_overdue(&self, domain: &D, now: D::Instant) -> bool {
        self.pending_for(domain, now) > self.completion_budget
    }

    // ── Updates (scheduler-internal) ──────────────────────────────────────────

    /// Synchronise the completion mark and trigger to `now`.
    pub(crate) fn seed(&mut self, now: D::Instant) {
        self.last_completion = now;
        self.pending_since = now;
        self.due_at = now;
    }

    pub(crate) fn note_invocation(
        &mut self,
        now: D::Instant,
        duration: Option<Duration>,
        state: TestState,
    ) {
        self.last_run_at = Some(now);
        if duration.is_some() {
            self.last_run_duration = duration;
        }
        self.state = state;
    }

    /// Record a `LoopComplete`.  The gap is only tracked once the unit has a
    /// previous completion, so the first run never counts.
    pub(crate) fn note_completion(&mut self, domain: &D, now: D::Instant, track_gap: bool) {
        if track_gap && self.completions > 0 {
            let gap = domain.elapsed(now, self.last_completion);
            if gap > self.max_observed_gap {
                self.max_observed_gap = gap;
            }
        }
        self.last_completion = now;
        self.pending_since = now;
        self.completions = self.completions.saturating_add(1);
        self.runs_this_cycle = self.runs_this_cycle.saturating_add(1);
    }

    /// Start a new diagnostic cycle at `now`.
    pub(crate) fn reset_cycle(&mut self, now: D::Instant) {
        self.runs_this_cycle = 0;
        self.pending_since = now;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{ManualClock, SliceDomain};

    #[test]
    fn new_record_is_idle_and_unsatisfied() {
        let r: ScheduleRecord<SliceDomain> = ScheduleRecord::new(2, 10, 0);
        assert_eq!(r.state(), TestState::Idle);
        assert_eq!(r.completions(), 0);
        assert!(!r.is_satisfied());
        assert_eq!(r.required_runs_per_cycle(), 1);
    }

    #[test]
    fn first_completion_does_not_record_a_gap() {
        let d = SliceDomain;
        let mut r: ScheduleRecord<SliceDomain> = ScheduleRecord::new(1, 10, 0);
        r.note_completion(&d, 7, true);
        assert_eq!(r.max_observed_gap(), 0);
        assert_eq!(r.last_completion(), 7);

        r.note_completion(&d, 10, true);
        assert_eq!(r.max_observed_gap(), 3);
        r.note_completion(&d, 11, true);
        assert_eq!(r.max_observed_gap(), 3, "max only grows");
    }

    #[test]
    fn gap_tracking_can_be_disabled() {
        let d = SliceDomain;
        let mut r: ScheduleRecord<SliceDomain> = ScheduleRecord::new(1, 10, 0);
        r.note_completion(&d, 2, false);
        r.note_completion(&d, 9, false);
        assert_eq!(r.max_observed_gap(), 0);
        assert_eq!(r.completions(), 2);
    }

    #[test]
    fn elapsed_due_and_overdue_rules() {
        let clock = ManualClock::new();
        let mut r: ScheduleRecord<ManualClock> =
            ScheduleRecord::new(Duration::from_millis(100), Duration::from_millis(500), 0);
        r.seed(1_000);
        assert!(!r.is_due_by_elapsed(&clock, 1_099));
        assert!(r.is_due_by_elapsed(&clock, 1_100));
        assert!(!r.is_overdue(&clock, 1_500));
        assert!(r.is_overdue(&clock, 1_501));
    }

    #[test]
    fn repeat_count_and_cycle_reset() {
        let d = SliceDomain;
        let mut r: ScheduleRecord<SliceDomain> = ScheduleRecord::new(1, 10, 0).with_required_runs(2);
        r.note_completion(&d, 1, true);
        assert!(!r.is_satisfied());
        r.note_completion(&d, 2, true);
        assert!(r.is_satisfied());
        r.reset_cycle(3);
        assert_eq!(r.runs_this_cycle(), 0);
        assert_eq!(r.completions(), 2, "lifetime count survives a cycle reset");
    }

    #[test]
    fn cycle_reset_restarts_the_completion_budget() {
        let d = SliceDomain;
        let mut r: ScheduleRecord<SliceDomain> = ScheduleRecord::new(1, 10, 0);
        r.note_completion(&d, 2, true);
        assert!(r.is_overdue(&d, 13));

        r.reset_cycle(12);
        assert_eq!(r.last_completion(), 2, "completion mark is untouched");
        assert_eq!(r.since_completion(&d, 20), 18);
        assert_eq!(r.pending_for(&d, 20), 8);
        assert!(!r.is_overdue(&d, 22));
        assert!(r.is_overdue(&d, 23));
    }
}
