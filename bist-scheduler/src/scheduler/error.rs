/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for the self-test scheduler.
//!
//! Two enums model the two failure layers:
//!
//! * [`Fault`] — a runtime violation detected while ticking.  Every variant
//!   is fatal and leaves through the
//!   [`EscalationFunnel`](crate::escalation::EscalationFunnel); the 32-bit
//!   crash-log word is only produced there, by [`Fault::error_code`].
//! * [`BuildError`] — a table that cannot be scheduled at all, rejected
//!   before the first tick.
//!
//! **Do not** fold these into `anyhow::Error` — the funnel needs the tag and
//! kind of every variant.

use std::fmt;

use thiserror::Error;

use crate::escalation::{ErrorCode, TestTypeTag};
use crate::unit::TestState;

// ── Corruption detail ─────────────────────────────────────────────────────────

/// What the scheduler found wrong with its own metadata or a unit's reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corruption {
    /// `run_test()` returned a state that is not a valid reply.
    InvalidReturnState(TestState),

    /// A record was found in `Failure` although failures always escalate.
    RecordInFailureState { index: usize },

    /// The enumeration cursor points past the end of the unit table.
    CursorOutOfRange { cursor: usize, len: usize },
}

impl fmt::Display for Corruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Corruption::InvalidReturnState(state) => {
                write!(f, "run_test returned invalid state {:?}", state)
            }
            Corruption::RecordInFailureState { index } => {
                write!(f, "record {} is in Failure state without escalation", index)
            }
            Corruption::CursorOutOfRange { cursor, len } => write!(
                f,
                "enumeration cursor {} is outside the unit table (len {})",
                cursor, len
            ),
        }
    }
}

// ── Runtime faults ────────────────────────────────────────────────────────────

/// A fatal condition detected by the scheduler or reported by a unit.
///
/// | Variant | Taxonomy | Tag used |
/// |---|---|---|
/// | `UnitDefect` | unit-reported defect | reporting unit |
/// | `SchedulerCorruption` | scheduler-detected corruption | unit or scheduler |
/// | `CycleIncomplete` | whole-cycle budget violation | scheduler |
/// | `CompletionOverdue` | per-unit completion budget violation | overdue unit |
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("unit '{unit}' (tag {tag}) reported defect kind {kind:#x} in state {state:?}")]
    UnitDefect {
        unit: String,
        tag: TestTypeTag,
        kind: u32,
        state: TestState,
    },

    #[error("scheduler corruption: {detail} (tag {tag}, kind {kind:#x})")]
    SchedulerCorruption {
        tag: TestTypeTag,
        kind: u32,
        detail: Corruption,
    },

    #[error("diagnostic cycle expired with {incomplete} unit(s) not completed")]
    CycleIncomplete {
        tag: TestTypeTag,
        kind: u32,
        incomplete: usize,
    },

    #[error("unit '{unit}' (tag {tag}) has not completed for {elapsed} (budget {budget})")]
    CompletionOverdue {
        unit: String,
        tag: TestTypeTag,
        kind: u32,
        elapsed: String,
        budget: String,
    },
}

impl Fault {
    /// Test-type tag placed in the high field of the error word.
    pub fn tag(&self) -> TestTypeTag {
        match self {
            Fault::UnitDefect { tag, .. }
            | Fault::SchedulerCorruption { tag, .. }
            | Fault::CycleIncomplete { tag, .. }
            | Fault::CompletionOverdue { tag, .. } => *tag,
        }
    }

    /// Error kind placed in the low field of the error word.
    pub fn kind(&self) -> u32 {
        match self {
            Fault::UnitDefect { kind, .. }
            | Fault::SchedulerCorruption { kind, .. }
            | Fault::CycleIncomplete { kind, .. }
            | Fault::CompletionOverdue { kind, .. } => *kind,
        }
    }

    /// Encode for the fatal-handler boundary.
    pub fn error_code(&self) -> ErrorCode {
        ErrorCode::encode(self.kind(), self.tag())
    }
}

// ── Construction errors ───────────────────────────────────────────────────────

/// Why a unit table was rejected at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("no self-test units registered")]
    Empty,

    #[error("too many self-test units: {count} (capacity {capacity})")]
    TooMany { count: usize, capacity: usize },

    #[error("unit '{unit}' has a zero cadence")]
    ZeroCadence { unit: String },

    #[error("unit '{unit}' requires zero runs per cycle")]
    ZeroRequiredRuns { unit: String },

    #[error("unit '{unit}' completion budget {budget} is shorter than its cadence {cadence}")]
    BudgetBelowCadence {
        unit: String,
        budget: String,
        cadence: String,
    },

    #[error("unit '{unit}' first triggers at slice {trigger}, after its timeout of {timeout}")]
    TriggerBeyondTimeout {
        unit: String,
        trigger: u32,
        timeout: u32,
    },

    #[error("test type tag {tag} is used by both '{first}' and '{second}'")]
    DuplicateTag {
        tag: TestTypeTag,
        first: String,
        second: String,
    },
}

// ── Tests ─────────────────────────────────────────────────────────────────────
