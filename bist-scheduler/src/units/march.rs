/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! March C- RAM test over a private buffer.
//!
//! | # | Order | Operations |
//! |---|---|---|
//! | 0 | any | w0 |
//! | 1 | up | r0, w1 |
//! | 2 | up | r1, w0 |
//! | 3 | down | r0, w1 |
//! | 4 | down | r1, w0 |
//! | 5 | any | r0 |
//!
//! A cell is one byte; "0" and "1" are the all-clear and all-set patterns.
//! Each call visits at most `window` cells, carrying the element and cell
//! position over to the next call.

use tracing::{debug, warn};

use super::STUCK_CELL;
use crate::unit::{SelfTest, TestReport, TestTypeTag};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Order {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    R0,
    R1,
    W0,
    W1,
}

const ZERO: u8 = 0x00;
const ONE: u8 = 0xFF;

const MARCH_C_MINUS: [(Order, &[Op]); 6] = [
    (Order::Up, &[Op::W0]),
    (Order::Up, &[Op::R0, Op::W1]),
    (Order::Up, &[Op::R1, Op::W0]),
    (Order::Down, &[Op::R0, Op::W1]),
    (Order::Down, &[Op::R1, Op::W0]),
    (Order::Up, &[Op::R0]),
];

/// A bit forced to a fixed value regardless of what is written.
#[derive(Debug, Clone, Copy)]
struct StuckBit {
    cell: usize,
    mask: u8,
    value: bool,
}

pub struct MarchUnit {
    name: String,
    tag: TestTypeTag,
    cells: Vec<u8>,
    window: usize,
    element: usize,
    step: usize,
    stuck: Option<StuckBit>,
}

impl MarchUnit {
    /// Test a `len`-byte buffer, `window` cells per call (`0` is treated as
    /// `1`).
    pub fn new(name: impl Into<String>, tag: TestTypeTag, len: usize, window: usize) -> Self {
        Self {
            name: name.into(),
            tag,
            cells: vec![ZERO; len],
            window: window.max(1),
            element: 0,
            step: 0,
            stuck: None,
        }
    }

    /// Calls needed for one full pass.
    pub fn calls_per_pass(&self) -> usize {
        (MARCH_C_MINUS.len() * self.cells.len())
            .div_ceil(self.window)
            .max(1)
    }

    /// Force bit `bit` of `cell` to `value` from now on.
    pub fn inject_stuck_at(&mut self, cell: usize, bit: u8, value: bool) {
        self.stuck = Some(StuckBit {
            cell,
            mask: 1 << (bit % 8),
            value,
        });
        if cell < self.cells.len() {
            let current = self.cells[cell];
            self.write(cell, current);
        }
    }

    fn write(&mut self, cell: usize, pattern: u8) {
        let mut stored = pattern;
        if let Some(s) = self.stuck.filter(|s| s.cell == cell) {
            if s.value {
                stored |= s.mask;
            } else {
                stored &= !s.mask;
            }
        }
        self.cells[cell] = stored;
    }

    fn rewind(&mut self) {
        self.element = 0;
        self.step = 0;
    }

    /// Apply the current element's operations to one cell.  Returns `false`
    /// on a read mismatch.
    fn visit(&mut self) -> bool {
        let (order, ops) = MARCH_C_MINUS[self.element];
        let len = self.cells.len();
        let cell = match order {
            Order::Up => self.step,
            Order::Down => len - 1 - self.step,
        };

        for op in ops {
            match op {
                Op::R0 | Op::R1 => {
                    let expected = if *op == Op::R0 { ZERO } else { ONE };
                    let read = self.cells[cell];
                    if read != expected {
                        warn!(
                            unit = %self.name,
                            cell,
                            element = self.element,
                            expected = format_args!("{expected:#04x}"),
                            read = format_args!("{read:#04x}"),
                            "March read mismatch"
                        );
                        return false;
                    }
                }
                Op::W0 => self.write(cell, ZERO),
                Op::W1 => self.write(cell, ONE),
            }
        }

        self.step += 1;
        if self.step == len {
            self.step = 0;
            self.element += 1;
        }
        true
    }
}

impl SelfTest for MarchUnit {
    fn run_test(&mut self) -> TestReport {
        if self.cells.is_empty() {
            return TestReport::loop_complete();
        }

        for _ in 0..self.window {
            if self.element == MARCH_C_MINUS.len() {
                break;
            }
            if !self.visit() {
                self.rewind();
                return TestReport::failure(STUCK_CELL);
            }
        }

        if self.element == MARCH_C_MINUS.len() {
            self.rewind();
            debug!(unit = %self.name, cells = self.cells.len(), "March pass complete");
            TestReport::loop_complete()
        } else {
            TestReport::in_progress()
        }
    }

    fn reset_for_new_cycle(&mut self) {
        self.rewind();
    }

    fn test_type_tag(&self) -> TestTypeTag {
        self.tag
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::TestState;

    fn unit(len: usize, window: usize) -> MarchUnit {
        MarchUnit::new("ram", TestTypeTag::new(6).unwrap(), len, window)
    }

    fn run_pass(u: &mut MarchUnit) -> Vec<TestReport> {
        let mut out = Vec::new();
        loop {
            let r = u.run_test();
            out.push(r);
            if r.state != TestState::InProgress {
                return out;
            }
        }
    }

    #[test]
    fn healthy_buffer_completes_in_expected_calls() {
        let mut u = unit(16, 16);
        assert_eq!(u.calls_per_pass(), 6);
        let reports = run_pass(&mut u);
        assert_eq!(reports.len(), 6);
        assert_eq!(reports.last().unwrap().state, TestState::LoopComplete);
    }

    #[test]
    fn window_need_not_divide_the_buffer() {
        let mut u = unit(10, 7);
        assert_eq!(u.calls_per_pass(), 9);
        let reports = run_pass(&mut u);
        assert_eq!(reports.len(), 9);
        assert_eq!(reports.last().unwrap().state, TestState::LoopComplete);
        // A second pass starts from the first element again.
        assert_eq!(run_pass(&mut u).len(), 9);
    }

    #[test]
    fn stuck_at_one_is_detected() {
        let mut u = unit(32, 8);
        u.inject_stuck_at(17, 2, true);
        let last = *run_pass(&mut u).last().unwrap();
        assert_eq!(last.state, TestState::Failure);
        assert_eq!(last.error_kind, STUCK_CELL);
    }

    #[test]
    fn stuck_at_zero_is_detected() {
        let mut u = unit(32, 8);
        u.inject_stuck_at(3, 7, false);
        let last = *run_pass(&mut u).last().unwrap();
        assert_eq!(last.state, TestState::Failure);
        assert_eq!(last.error_kind, STUCK_CELL);
    }

    #[test]
    fn reset_rewinds_a_partial_pass() {
        let mut u = unit(16, 4);
        for _ in 0..5 {
            assert_eq!(u.run_test().state, TestState::InProgress);
        }
        u.reset_for_new_cycle();
        assert_eq!(run_pass(&mut u).len(), u.calls_per_pass());
    }

    #[test]
    fn zero_window_is_clamped() {
        let u = unit(2, 0);
        assert_eq!(u.calls_per_pass(), 12);
    }
}
