/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Completion-time monitor.
//!
//! Scans every record for `elapsed(now, pending_since) > completion_budget`,
//! where `pending_since` is the later of the last completion and the start
//! of the current cycle.  A monitor built with
//! [`skipping_satisfied`](CompletionMonitor::skipping_satisfied) ignores
//! records that already met their repeat count for the cycle: those units
//! are not run again until the cycle rolls over.
//!
//! The scan is paced independently of the scheduling decision: [`poll`]
//! only performs a scan every `every_n_polls` calls.  A unit that overruns
//! its slot is therefore detected after the fact; the only remedy is
//! escalation.
//!
//! [`poll`]: CompletionMonitor::poll

use tracing::error;

use super::error::Fault;
use super::UnitTable;
use crate::time::TimeDomain;

#[derive(Debug, Clone)]
pub struct CompletionMonitor {
    overdue_kind: u32,
    every_n_polls: u32,
    polls: u32,
    skip_satisfied: bool,
}

impl CompletionMonitor {
    /// A monitor that escalates with `overdue_kind` and scans on every
    /// `every_n_polls`-th poll (`0` is treated as `1`).
    pub fn new(overdue_kind: u32, every_n_polls: u32) -> Self {
        Self {
            overdue_kind,
            every_n_polls: every_n_polls.max(1),
            polls: 0,
            skip_satisfied: false,
        }
    }

    /// Leave out records whose unit is satisfied for the current cycle.
    pub fn skipping_satisfied(mut self) -> Self {
        self.skip_satisfied = true;
        self
    }

    /// Count one poll and scan when the pace says so.
    pub fn poll<D: TimeDomain>(&mut self, table: &UnitTable<D>, now: D::Instant) -> Result<(), Fault> {
        self.polls += 1;
        if self.polls < self.every_n_polls {
            return Ok(());
        }
        self.polls = 0;
        self.check(table, now)
    }

    /// Scan all records now, regardless of pace.
    pub fn check<D: TimeDomain>(&self, table: &UnitTable<D>, now: D::Instant) -> Result<(), Fault> {
        let domain = table.domain();
        for (name, tag, record) in table.entries() {
            if self.skip_satisfied && record.is_satisfied() {
                continue;
            }
            if !record.is_overdue(domain, now) {
                continue;
            }
            let unit = name.to_string();
            let elapsed = record.pending_for(domain, now);
            error!(
                unit = %unit,
                elapsed = ?elapsed,
                budget = ?record.completion_budget(),
                "self-test completion budget exceeded"
            );
            return Err(Fault::CompletionOverdue {
                unit,
                tag,
                kind: self.overdue_kind,
                elapsed: format!("{:?}", elapsed),
                budget: format!("{:?}", record.completion_budget()),
            });
        }
        Ok(())
    }
}
