/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Fail-safe escalation funnel.
//!
//! Every detected defect, corruption or budget violation leaves the
//! scheduler through [`EscalationFunnel::escalate`], which encodes the
//! internal [`Fault`] into the 32-bit crash-log word and hands it to the
//! platform [`FatalHandler`].  The handler never returns.
//!
//! # Wire format
//!
//! ```text
//!  31        26 25                                  0
//! ┌────────────┬─────────────────────────────────────┐
//! │  test tag  │            error kind               │
//! └────────────┴─────────────────────────────────────┘
//! ```
//!
//! For error kinds below 2^26 the word is identical to the legacy
//! `(kind & 0x7fff_ffff) | (tag << 26)` encoding consumed by existing
//! crash-log tooling.

use std::fmt;

use thiserror::Error;
use tracing::error;

use crate::scheduler::error::Fault;

// ── Encoding constants ────────────────────────────────────────────────────────

/// Bit position of the test-type tag field.
pub const TAG_SHIFT: u32 = 26;

/// Mask of the error-kind field.
pub const KIND_MASK: u32 = (1 << TAG_SHIFT) - 1;

/// Largest tag that fits in the high field.
pub const MAX_TAG: u8 = (u32::MAX >> TAG_SHIFT) as u8;

/// Process exit status used by [`HaltHandler`].
pub const HALT_EXIT_STATUS: i32 = 70;

// ── Test type tag ─────────────────────────────────────────────────────────────

/// Identity of a diagnostic in escalated error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TestTypeTag(u8);

/// Tag value does not fit the high field of the error word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("test type tag {0} exceeds the maximum of {MAX_TAG}")]
pub struct TagOutOfRange(pub u32);

impl TestTypeTag {
    pub fn new(value: u8) -> Result<Self, TagOutOfRange> {
        if value > MAX_TAG {
            Err(TagOutOfRange(u32::from(value)))
        } else {
            Ok(Self(value))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u32> for TestTypeTag {
    type Error = TagOutOfRange;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .map_err(|_| TagOutOfRange(value))
            .and_then(Self::new)
    }
}

impl fmt::Display for TestTypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Error code ────────────────────────────────────────────────────────────────

/// The encoded 32-bit crash-log word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(u32);

impl ErrorCode {
    /// Mask `kind` into the low field and place `tag` in the high field.
    ///
    /// Kinds of 2^26 and above do not fit the field: their upper bits are
    /// dropped by [`KIND_MASK`], so `encode(kind, tag).kind()` returns
    /// `kind & KIND_MASK`.
    pub fn encode(kind: u32, tag: TestTypeTag) -> Self {
        Self((kind & KIND_MASK) | (u32::from(tag.get()) << TAG_SHIFT))
    }

    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn tag(self) -> TestTypeTag {
        // The shifted value is at most MAX_TAG.
        TestTypeTag((self.0 >> TAG_SHIFT) as u8)
    }

    pub fn kind(self) -> u32 {
        self.0 & KIND_MASK
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x} (tag {}, kind {:#x})", self.0, self.tag(), self.kind())
    }
}

// ── Fatal handler ─────────────────────────────────────────────────────────────

/// Platform fatal-error sink.  Halts, resets or raises a fault line; never
/// returns control to the scheduler.
pub trait FatalHandler {
    fn report_fatal(&mut self, code: ErrorCode) -> !;
}

/// Terminates the process with [`HALT_EXIT_STATUS`].
#[derive(Debug, Default)]
pub struct HaltHandler;

impl FatalHandler for HaltHandler {
    fn report_fatal(&mut self, code: ErrorCode) -> ! {
        error!(code = %code, "Fatal self-test escalation – halting");
        std::process::exit(HALT_EXIT_STATUS)
    }
}

/// Panic payload raised by [`PanicHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatalEscalation(pub ErrorCode);

/// Unwinds with a [`FatalEscalation`] payload.
///
/// Used by hosted harnesses that need to observe the code; production builds
/// use [`HaltHandler`] or a board-specific handler.
#[derive(Debug, Default)]
pub struct PanicHandler;

impl FatalHandler for PanicHandler {
    fn report_fatal(&mut self, code: ErrorCode) -> ! {
        std::panic::panic_any(FatalEscalation(code))
    }
}

// ── Funnel ────────────────────────────────────────────────────────────────────

/// The single exit path for detected defects.
#[derive(Debug)]
pub struct EscalationFunnel<H: FatalHandler> {
    handler: H,
}

impl<H: FatalHandler> EscalationFunnel<H> {
    pub fn new(handler: H) -> Self {
        Self { handler }
    }

    /// Encode `fault` and hand it to the fatal handler.
    pub fn escalate(&mut self, fault: &Fault) -> ! {
        let code = fault.error_code();
        error!(code = %code, fault = %fault, "Escalating self-test fault");
        self.handler.report_fatal(code)
    }

    /// Escalate a pre-classified `(kind, tag)` pair.
    pub fn escalate_raw(&mut self, kind: u32, tag: TestTypeTag) -> ! {
        let code = ErrorCode::encode(kind, tag);
        error!(code = %code, "Escalating self-test fault");
        self.handler.report_fatal(code)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
