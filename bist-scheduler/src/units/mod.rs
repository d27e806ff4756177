/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Reference self-test units.
//!
//! | Unit | Subject | Work per call |
//! |---|---|---|
//! | [`CrcScanUnit`] | read-only region | `chunk` bytes folded into a CRC-32 |
//! | [`MarchUnit`] | private RAM buffer | `window` March C- cell visits |
//!
//! Both keep their resume point between calls and expose a fault injector
//! so a defect can be demonstrated end to end.

pub mod crc_scan;
pub mod march;

pub use crc_scan::CrcScanUnit;
pub use march::MarchUnit;

/// Error kind reported when a region's CRC differs from its reference.
pub const CRC_MISMATCH: u32 = 0x0101;

/// Error kind reported when a March read returns the wrong pattern.
pub const STUCK_CELL: u32 = 0x0201;
