/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Built-in self-test scheduler
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── unit          – the resumable self-test contract
//! ├── escalation    – error-word encoding + never-returning fatal funnel
//! ├── time/         – time domains (slice counter, monotonic, manual) + LCM helpers
//! ├── record        – per-unit schedule record
//! ├── scheduler/    – shared unit table, timeslice + elapsed-time variants,
//! │                   completion monitor, plan feasibility
//! ├── units/        – reference CRC scan and March RAM units
//! └── config/       – YAML configuration
//! ```

pub mod config;
pub mod escalation;
pub mod record;
pub mod scheduler;
pub mod time;
pub mod unit;
pub mod units;
