/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Chunked CRC-32 scan of a read-only region.
//!
//! The reference checksum is captured at construction.  Each call folds at
//! most `chunk` bytes into a running digest; the call that consumes the last
//! byte compares the result.

use crc::{Crc, Digest, CRC_32_ISO_HDLC};
use tracing::{debug, warn};

use super::CRC_MISMATCH;
use crate::unit::{SelfTest, TestReport, TestTypeTag};

static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

pub struct CrcScanUnit {
    name: String,
    tag: TestTypeTag,
    region: Vec<u8>,
    chunk: usize,
    reference: u32,
    offset: usize,
    digest: Option<Digest<'static, u32>>,
}

impl CrcScanUnit {
    /// Scan `region`, `chunk` bytes per call (`0` is treated as `1`).
    pub fn new(name: impl Into<String>, tag: TestTypeTag, region: Vec<u8>, chunk: usize) -> Self {
        let reference = CRC32.checksum(&region);
        Self {
            name: name.into(),
            tag,
            region,
            chunk: chunk.max(1),
            reference,
            offset: 0,
            digest: None,
        }
    }

    /// A region of `len` bytes filled with a fixed pseudo-random pattern.
    pub fn with_pattern(name: impl Into<String>, tag: TestTypeTag, len: usize, chunk: usize) -> Self {
        let region = (0..len)
            .map(|i| (i as u32).wrapping_mul(2_654_435_761).rotate_right(13) as u8)
            .collect();
        Self::new(name, tag, region, chunk)
    }

    pub fn reference(&self) -> u32 {
        self.reference
    }

    /// Bytes already folded into the running digest.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Calls needed for one full pass.
    pub fn calls_per_pass(&self) -> usize {
        self.region.len().div_ceil(self.chunk).max(1)
    }

    /// Flip bit `bit` of the byte at `index`, leaving the reference untouched.
    /// Out-of-range positions are ignored.
    pub fn inject_bit_flip(&mut self, index: usize, bit: u8) {
        if let Some(byte) = self.region.get_mut(index) {
            *byte ^= 1 << (bit % 8);
        }
    }
}

impl SelfTest for CrcScanUnit {
    fn run_test(&mut self) -> TestReport {
        let digest = self.digest.get_or_insert_with(|| CRC32.digest());
        let end = (self.offset + self.chunk).min(self.region.len());
        digest.update(&self.region[self.offset..end]);
        self.offset = end;

        if self.offset < self.region.len() {
            return TestReport::in_progress();
        }

        let computed = self
            .digest
            .take()
            .map_or_else(|| CRC32.checksum(&[]), |d| d.finalize());
        self.offset = 0;

        if computed == self.reference {
            debug!(unit = %self.name, crc = format_args!("{computed:#010x}"), "CRC scan pass complete");
            TestReport::loop_complete()
        } else {
            warn!(
                unit = %self.name,
                expected = format_args!("{:#010x}", self.reference),
                computed = format_args!("{computed:#010x}"),
                "CRC mismatch"
            );
            TestReport::failure(CRC_MISMATCH)
        }
    }

    fn reset_for_new_cycle(&mut self) {
        self.offset = 0;
        self.digest = None;
    }

    fn test_type_tag(&self) -> TestTypeTag {
        self.tag
    }

    fn name(&self) -> &str {
        &self.name
    }
}
