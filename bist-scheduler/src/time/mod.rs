/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Time domains the scheduler core is generic over.
//!
//! Both scheduling variants share one algorithm core that only needs three
//! things from "time": an instant type, a span type that can be compared
//! against budgets, and a way to measure the span between two instants.
//!
//! | Domain | Instant | Span | Driven by |
//! |---|---|---|---|
//! | [`SliceDomain`] | `u32` slice number | `u32` slices | the scheduler's own slice counter |
//! | [`MonotonicClock`] | `std::time::Instant` | `Duration` | the host monotonic clock |
//! | [`ManualClock`] | `u64` milliseconds | `Duration` | tests and the dry-run driver |

pub mod math;

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// ── Traits ────────────────────────────────────────────────────────────────────

/// A time domain: comparison, subtraction and advancement of instants.
///
/// `elapsed(now, since)` must be well defined when `now` is "later" than
/// `since` in the domain's own sense; counter-based domains wrap.
pub trait TimeDomain {
    /// A point in time.
    type Instant: Copy + Debug + PartialEq;
    /// A distance between two instants; compared against cadences and budgets.
    type Span: Copy + Debug + Ord + Default;

    /// Span between `since` and `now`.
    fn elapsed(&self, now: Self::Instant, since: Self::Instant) -> Self::Span;

    /// The instant `by` after `at`.
    fn advance(&self, at: Self::Instant, by: Self::Span) -> Self::Instant;
}

/// A time domain that can also be read.
pub trait Clock: TimeDomain {
    fn now(&self) -> Self::Instant;
}

// ── Timeslice domain ──────────────────────────────────────────────────────────

/// Discrete timeslice numbering used by the fixed-cadence scheduler.
///
/// The counter itself lives in the scheduler (it advances once per tick);
/// this type only provides the arithmetic.  Subtraction wraps so a counter
/// rollover does not produce a spurious completion timeout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SliceDomain;

impl TimeDomain for SliceDomain {
    type Instant = u32;
    type Span = u32;

    fn elapsed(&self, now: u32, since: u32) -> u32 {
        now.wrapping_sub(since)
    }

    fn advance(&self, at: u32, by: u32) -> u32 {
        at.wrapping_add(by)
    }
}

// ── Host monotonic clock ──────────────────────────────────────────────────────

/// Wall-clock domain backed by [`std::time::Instant`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl TimeDomain for MonotonicClock {
    type Instant = Instant;
    type Span = Duration;

    fn elapsed(&self, now: Instant, since: Instant) -> Duration {
        now.saturating_duration_since(since)
    }

    fn advance(&self, at: Instant, by: Duration) -> Instant {
        at.checked_add(by).unwrap_or(at)
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

// ── Manually advanced clock ───────────────────────────────────────────────────

/// Millisecond clock that only moves when told to.
///
/// Cloning yields another handle onto the same counter, so a test (or the
/// dry-run driver) can keep one handle and give the other to the scheduler.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ms: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the clock at an arbitrary millisecond value.
    pub fn starting_at(ms: u64) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(ms)),
        }
    }

    /// Move the clock forward by `by`.
    pub fn advance_by(&self, by: Duration) {
        self.now_ms
            .fetch_add(duration_to_ms(by), Ordering::Relaxed);
    }

    /// Current reading in milliseconds.
    pub fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::Relaxed)
    }
}

impl TimeDomain for ManualClock {
    type Instant = u64;
    type Span = Duration;

    fn elapsed(&self, now: u64, since: u64) -> Duration {
        Duration::from_millis(now.saturating_sub(since))
    }

    fn advance(&self, at: u64, by: Duration) -> u64 {
        at.saturating_add(duration_to_ms(by))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now_ms()
    }
}

fn duration_to_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
