/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! GCD and checked LCM over slice counts.
//!
//! Used by the timeslice plan analysis to find the plan hyperperiod (the
//! number of slices after which the trigger pattern repeats).

use thiserror::Error;

/// The LCM of two steps does not fit in a `u64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("LCM overflow computing lcm({a}, {b})")]
pub struct LcmOverflow {
    pub a: u64,
    pub b: u64,
}

/// Iterative Euclidean GCD.
pub fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

/// Checked LCM.  Returns `Ok(0)` when either input is `0`.
pub fn lcm(a: u64, b: u64) -> Result<u64, LcmOverflow> {
    if a == 0 || b == 0 {
        return Ok(0);
    }
    (a / gcd(a, b)).checked_mul(b).ok_or(LcmOverflow { a, b })
}

/// LCM of every value in `steps`; `Ok(0)` for an empty slice.
pub fn lcm_of_slice(steps: &[u64]) -> Result<u64, LcmOverflow> {
    steps
        .iter()
        .try_fold(steps.first().copied().unwrap_or(0), |acc, &s| lcm(acc, s))
}
