/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The self-test contract every diagnostic implements.
//!
//! ```text
//!            reset_for_new_cycle()            run_test() → InProgress
//!   Idle / LoopComplete ──────────────► (fresh) ──────────────────────┐
//!            ▲                                                       │
//!            └──────────── run_test() → LoopComplete ◄───────────────┘
//! ```
//!
//! A unit does a bounded slice of work per [`SelfTest::run_test`] call and
//! keeps its own resume point (byte offset, running checksum, sub-phase).
//! The scheduler never looks inside a unit; it only reads the returned
//! [`TestReport`].

use thiserror::Error;

pub use crate::escalation::TestTypeTag;

// ── Test state ────────────────────────────────────────────────────────────────

/// Progress of a unit within the current diagnostic cycle.
///
/// `Idle` is the state of a record that has never run.  A unit that *returns*
/// `Idle` from `run_test()` is treated as corrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TestState {
    #[default]
    Idle,
    /// Call again, same cycle, no reconfiguration.
    InProgress,
    /// The subject was fully validated for this cycle.
    LoopComplete,
    /// A defect was detected.
    Failure,
}

impl TestState {
    /// Integer form used by raw status words.
    pub fn to_raw(self) -> u32 {
        match self {
            TestState::Idle => 0,
            TestState::InProgress => 1,
            TestState::LoopComplete => 2,
            TestState::Failure => 3,
        }
    }

    /// `true` if the next invocation begins a fresh diagnostic cycle and must
    /// be preceded by [`SelfTest::reset_for_new_cycle`].
    pub fn starts_new_cycle(self) -> bool {
        matches!(self, TestState::Idle | TestState::LoopComplete)
    }
}

/// A raw state word outside the defined [`TestState`] set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid self-test state code {0:#x}")]
pub struct InvalidTestState(pub u32);

impl TryFrom<u32> for TestState {
    type Error = InvalidTestState;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(TestState::Idle),
            1 => Ok(TestState::InProgress),
            2 => Ok(TestState::LoopComplete),
            3 => Ok(TestState::Failure),
            other => Err(InvalidTestState(other)),
        }
    }
}

// ── Test report ───────────────────────────────────────────────────────────────

/// Result of one [`SelfTest::run_test`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestReport {
    pub state: TestState,

    /// Unit-specific error kind.  `0` means "no error"; anything else is a
    /// defect even when `state` is `InProgress` or `LoopComplete`.
    pub error_kind: u32,

    /// Request to be re-checked sooner than the configured step, in slices.
    ///
    /// Honoured by the timeslice scheduler only.
    pub recheck_in: Option<u32>,
}

impl TestReport {
    pub fn in_progress() -> Self {
        Self::with_state(TestState::InProgress)
    }

    pub fn loop_complete() -> Self {
        Self::with_state(TestState::LoopComplete)
    }

    pub fn failure(error_kind: u32) -> Self {
        Self {
            error_kind,
            ..Self::with_state(TestState::Failure)
        }
    }

    pub fn with_state(state: TestState) -> Self {
        Self {
            state,
            error_kind: 0,
            recheck_in: None,
        }
    }

    /// Attach a unit error kind to an otherwise ordinary report.
    pub fn with_error(mut self, error_kind: u32) -> Self {
        self.error_kind = error_kind;
        self
    }

    /// Ask the timeslice scheduler to run this unit again after `slices`.
    pub fn recheck_in(mut self, slices: u32) -> Self {
        self.recheck_in = Some(slices);
        self
    }

    /// `true` if this report signals a detected defect.
    pub fn is_defect(&self) -> bool {
        self.state == TestState::Failure || self.error_kind != 0
    }
}

// ── Self-test contract ────────────────────────────────────────────────────────

/// A resumable diagnostic.
///
/// Implementations may touch hardware and mask interrupts around short
/// critical sections inside `run_test`, but must return within one
/// scheduling slot.  The scheduler cannot abort a call in progress.
pub trait SelfTest {
    /// Perform one bounded step of the diagnostic.
    fn run_test(&mut self) -> TestReport;

    /// Re-initialise private iteration state before the first `run_test` of
    /// a new cycle.
    fn reset_for_new_cycle(&mut self);

    /// Identity used in the high field of escalated error codes.
    fn test_type_tag(&self) -> TestTypeTag;

    /// Human-readable name for logs.
    fn name(&self) -> &str {
        "self-test"
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_state_codes_round_trip() {
        for state in [
            TestState::Idle,
            TestState::InProgress,
            TestState::LoopComplete,
            TestState::Failure,
        ] {
            assert_eq!(TestState::try_from(state.to_raw()), Ok(state));
        }
    }

    #[test]
    fn unknown_raw_state_is_rejected() {
        assert_eq!(TestState::try_from(7), Err(InvalidTestState(7)));
    }

    #[test]
    fn only_idle_and_loop_complete_start_a_cycle() {
        assert!(TestState::Idle.starts_new_cycle());
        assert!(TestState::LoopComplete.starts_new_cycle());
        assert!(!TestState::InProgress.starts_new_cycle());
        assert!(!TestState::Failure.starts_new_cycle());
    }

    #[test]
    fn non_zero_error_kind_is_a_defect_in_any_state() {
        assert!(!TestReport::in_progress().is_defect());
        assert!(!TestReport::loop_complete().is_defect());
        assert!(TestReport::loop_complete().with_error(0x12).is_defect());
        assert!(TestReport::in_progress().with_error(1).is_defect());
        assert!(TestReport::failure(0).is_defect());
    }

    #[test]
    fn recheck_request_is_carried() {
        let r = TestReport::in_progress().recheck_in(2);
        assert_eq!(r.recheck_in, Some(2));
        assert_eq!(r.state, TestState::InProgress);
    }
}
