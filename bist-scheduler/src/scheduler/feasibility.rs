/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Timeslice plan feasibility analysis.
//!
//! # Status: advisory
//!
//! The analysis is **computed and logged** when a timeslice scheduler is
//! built.  Findings are warnings only — the scheduler still starts.  The
//! hard gate at runtime is the completion monitor, which escalates when a
//! unit actually misses its timeout.
//!
//! # Theory
//! Exactly one unit runs per slice, so a plan with steps `s_i` demands
//!
//! $$L = \sum_{i=1}^{n} \frac{1}{s_i}$$
//!
//! slices per slice.  With `L > 1` some unit is deferred on every
//! hyperperiod and will eventually be starved.  With `L ≤ 1` the plan can
//! still collide when two triggers land on the same slice; collisions are
//! resolved by the fairness bump at the cost of one slice of jitter.
//!
//! | Steps | Load |
//! |---|---|
//! | {2, 4, 4} | 1.00 |
//! | {1, 2, 4} | 1.75 |
//! | {4, 8, 8} | 0.50 |

use tracing::{info, warn};

use super::timeslice::SliceSpec;
use crate::time::math::lcm_of_slice;

/// Longest hyperperiod the collision scan walks.
const MAX_SCANNED_SLICES: u64 = 4_096;

// ── Public API ────────────────────────────────────────────────────────────────

/// Two or more records whose static trigger pattern lands on one slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collision {
    pub slice: u64,
    pub records: Vec<usize>,
}

/// Result of [`analyse_plan`].
#[derive(Debug, Clone, PartialEq)]
pub struct PlanReport {
    /// `Σ 1/step`; above `1.0` the plan cannot serve every record on time.
    pub slice_load: f64,
    /// LCM of all steps, or `None` on overflow.
    pub hyperperiod: Option<u64>,
    /// Static collisions within the first hyperperiod (bounded scan).
    pub collisions: Vec<Collision>,
    /// Records whose timeout is shorter than the full hyperperiod.
    pub short_timeouts: Vec<usize>,
}

impl PlanReport {
    pub fn is_overloaded(&self) -> bool {
        self.slice_load > 1.0
    }
}

/// Slices demanded per slice by a set of steps.  Zero steps contribute
/// nothing.
pub fn slice_load(steps: &[u32]) -> f64 {
    steps
        .iter()
        .filter(|s| **s > 0)
        .map(|s| 1.0 / f64::from(*s))
        .sum()
}

/// Analyse a timeslice plan without running it.
pub fn analyse_plan(plan: &[SliceSpec]) -> PlanReport {
    let steps: Vec<u32> = plan.iter().map(|s| s.step).collect();
    let wide: Vec<u64> = steps.iter().map(|s| u64::from(*s)).collect();
    let hyperperiod = lcm_of_slice(&wide).ok().filter(|h| *h > 0);

    let collisions = match hyperperiod {
        Some(h) => find_collisions(plan, h.min(MAX_SCANNED_SLICES)),
        None => Vec::new(),
    };

    let short_timeouts = match hyperperiod {
        Some(h) => plan
            .iter()
            .enumerate()
            .filter(|(_, s)| u64::from(s.timeout) < h)
            .map(|(i, _)| i)
            .collect(),
        None => Vec::new(),
    };

    PlanReport {
        slice_load: slice_load(&steps),
        hyperperiod,
        collisions,
        short_timeouts,
    }
}

/// Emit the findings of `report` as log events.
pub fn log_plan_findings(report: &PlanReport) {
    info!(
        slice_load = report.slice_load,
        hyperperiod = ?report.hyperperiod,
        "Timeslice plan analysed"
    );
    if report.is_overloaded() {
        warn!(
            slice_load = report.slice_load,
            "Timeslice plan demands more than one unit per slice – some units will be starved"
        );
    }
    if report.hyperperiod.is_none() {
        warn!("Timeslice plan hyperperiod overflowed – collision scan skipped");
    }
    for c in &report.collisions {
        warn!(slice = c.slice, records = ?c.records, "Timeslice trigger collision");
    }
    for i in &report.short_timeouts {
        warn!(record = i, "Timeout shorter than the plan hyperperiod");
    }
}

fn find_collisions(plan: &[SliceSpec], slices: u64) -> Vec<Collision> {
    let mut out = Vec::new();
    for slice in 0..slices {
        let records: Vec<usize> = plan
            .iter()
            .enumerate()
            .filter(|(_, s)| {
                let trigger = u64::from(s.trigger);
                s.step > 0 && slice >= trigger && (slice - trigger) % u64::from(s.step) == 0
            })
            .map(|(i, _)| i)
            .collect();
        if records.len() > 1 {
            out.push(Collision { slice, records });
        }
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
