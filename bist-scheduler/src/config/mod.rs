/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Self-test configuration loading.
//!
//! The expected YAML structure is:
//! ```yaml
//! scheduler:
//!   variant: elapsed              # or "timeslice"
//!   whole_cycle_budget_ms: 60000
//!   per_iteration_budget_ms: 100
//!   monitor_total_testing_time: true
//!   monitor_iteration_times: true
//!   completion_check_every: 1     # timeslice only
//!   scheduler_error_tag: 63
//!   error_codes:
//!     corrupted_vector: 1
//!     corrupted_memory: 2
//!     test_too_long: 3
//!     cycle_incomplete: 4
//!     completion_timeout: 5
//! units:
//!   flash_crc:
//!     kind: crc_scan
//!     tag: 5
//!     cadence: 200                # ms (elapsed) or slices (timeslice)
//!     completion_budget: 30000
//!     trigger: 0                  # timeslice only
//!     region_bytes: 4096
//!     chunk_bytes: 256
//! ```
//!
//! Units enter the scheduler table in name order.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::escalation::TestTypeTag;
use crate::scheduler::{
    BoxedUnit, ElapsedConfig, ElapsedScheduler, ErrorKinds, SliceSpec, TimesliceConfig,
    TimesliceScheduler, UnitSchedule,
};
use crate::time::Clock;
use crate::units::{CrcScanUnit, MarchUnit};

// ── Private YAML deserialization types ────────────────────────────────────────

/// Top-level wrapper that maps directly onto the YAML file layout.
#[derive(Debug, Deserialize)]
struct BistConfigFile {
    #[serde(default)]
    scheduler: SchedulerEntry,
    #[serde(default)]
    units: BTreeMap<String, UnitEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct SchedulerEntry {
    variant: Variant,
    whole_cycle_budget_ms: u64,
    per_iteration_budget_ms: u64,
    monitor_total_testing_time: bool,
    monitor_iteration_times: bool,
    completion_check_every: u32,
    scheduler_error_tag: u8,
    error_codes: ErrorCodes,
}

impl Default for SchedulerEntry {
    fn default() -> Self {
        let s = SchedulerSettings::default();
        Self {
            variant: s.variant,
            whole_cycle_budget_ms: s.whole_cycle_budget_ms,
            per_iteration_budget_ms: s.per_iteration_budget_ms,
            monitor_total_testing_time: s.monitor_total_testing_time,
            monitor_iteration_times: s.monitor_iteration_times,
            completion_check_every: s.completion_check_every,
            scheduler_error_tag: s.scheduler_error_tag,
            error_codes: s.error_codes,
        }
    }
}

/// Per-unit fields as they appear in the YAML file.
///
/// Only `kind`, `tag` and `cadence` are required.
#[derive(Debug, Deserialize)]
struct UnitEntry {
    kind: UnitKind,
    tag: u8,
    cadence: u64,
    completion_budget: Option<u64>,
    #[serde(default)]
    trigger: u32,
    #[serde(default = "default_required_runs")]
    required_runs: u32,
    #[serde(default = "default_region_bytes")]
    region_bytes: usize,
    #[serde(default = "default_chunk_bytes")]
    chunk_bytes: usize,
}

fn default_required_runs() -> u32 {
    1
}

fn default_region_bytes() -> usize {
    4096
}

fn default_chunk_bytes() -> usize {
    256
}

// ── Public data structures ────────────────────────────────────────────────────

/// Which scheduler drives the units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// Wall-clock budgets, every due unit per tick.
    #[default]
    Elapsed,
    /// One unit per fixed-rate slice.
    Timeslice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    CrcScan,
    March,
}

/// Error kinds the schedulers use for their own faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ErrorCodes {
    pub corrupted_vector: u32,
    pub corrupted_memory: u32,
    pub test_too_long: u32,
    pub cycle_incomplete: u32,
    pub completion_timeout: u32,
}

impl Default for ErrorCodes {
    fn default() -> Self {
        Self {
            corrupted_vector: 1,
            corrupted_memory: 2,
            test_too_long: 3,
            cycle_incomplete: 4,
            completion_timeout: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub variant: Variant,
    pub whole_cycle_budget_ms: u64,
    pub per_iteration_budget_ms: u64,
    pub monitor_total_testing_time: bool,
    pub monitor_iteration_times: bool,
    pub completion_check_every: u32,
    pub scheduler_error_tag: u8,
    pub error_codes: ErrorCodes,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            variant: Variant::Elapsed,
            whole_cycle_budget_ms: 60_000,
            per_iteration_budget_ms: 100,
            monitor_total_testing_time: true,
            monitor_iteration_times: true,
            completion_check_every: 1,
            scheduler_error_tag: 63,
            error_codes: ErrorCodes::default(),
        }
    }
}

/// One configured self-test unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitConfig {
    pub name: String,
    pub kind: UnitKind,
    pub tag: u8,
    /// Milliseconds for the elapsed variant, slices for the timeslice one.
    pub cadence: u64,
    pub completion_budget: u64,
    pub trigger: u32,
    pub required_runs: u32,
    pub region_bytes: usize,
    pub chunk_bytes: usize,
}

impl UnitConfig {
    /// Construct the unit this entry describes.
    ///
    /// # Errors
    /// Returns an error if the tag does not fit the error-code tag field.
    pub fn instantiate(&self) -> Result<BoxedUnit> {
        let tag = TestTypeTag::new(self.tag)
            .with_context(|| format!("Invalid tag for unit '{}'", self.name))?;
        let unit: BoxedUnit = match self.kind {
            UnitKind::CrcScan => Box::new(CrcScanUnit::with_pattern(
                self.name.clone(),
                tag,
                self.region_bytes,
                self.chunk_bytes,
            )),
            UnitKind::March => Box::new(MarchUnit::new(
                self.name.clone(),
                tag,
                self.region_bytes,
                self.chunk_bytes,
            )),
        };
        Ok(unit)
    }

    fn slice_spec(&self) -> Result<SliceSpec> {
        let step = u32::try_from(self.cadence)
            .with_context(|| format!("Cadence of unit '{}' exceeds the slice counter", self.name))?;
        let timeout = u32::try_from(self.completion_budget).with_context(|| {
            format!("Completion budget of unit '{}' exceeds the slice counter", self.name)
        })?;
        Ok(SliceSpec::new(self.trigger, step, timeout))
    }
}

/// Complete self-test configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BistConfig {
    pub scheduler: SchedulerSettings,
    pub units: Vec<UnitConfig>,
}

impl Default for BistConfig {
    /// One CRC scan and one March test, suitable for either variant.
    fn default() -> Self {
        Self {
            scheduler: SchedulerSettings::default(),
            units: default_units(),
        }
    }
}

fn default_units() -> Vec<UnitConfig> {
    vec![
        UnitConfig {
            name: "flash_crc".to_string(),
            kind: UnitKind::CrcScan,
            tag: 5,
            cadence: 2,
            completion_budget: 30_000,
            trigger: 0,
            required_runs: 1,
            region_bytes: 4096,
            chunk_bytes: 256,
        },
        UnitConfig {
            name: "ram_march".to_string(),
            kind: UnitKind::March,
            tag: 6,
            cadence: 2,
            completion_budget: 30_000,
            trigger: 1,
            required_runs: 1,
            region_bytes: 1024,
            chunk_bytes: 128,
        },
    ]
}

impl BistConfig {
    fn scheduler_tag(&self) -> Result<TestTypeTag> {
        TestTypeTag::new(self.scheduler.scheduler_error_tag).context("Invalid scheduler_error_tag")
    }

    /// Build the elapsed-time scheduler over `clock`.
    ///
    /// # Errors
    /// Returns an error if a tag is out of range or the unit table is
    /// rejected (empty, duplicate tags, zero cadence, budget below cadence).
    pub fn elapsed_scheduler<C>(&self, clock: C) -> Result<ElapsedScheduler<C>>
    where
        C: Clock<Span = Duration>,
    {
        let s = &self.scheduler;
        let config = ElapsedConfig {
            whole_cycle_budget: Duration::from_millis(s.whole_cycle_budget_ms),
            per_iteration_budget: Duration::from_millis(s.per_iteration_budget_ms),
            monitor_total_testing_time: s.monitor_total_testing_time,
            monitor_iteration_times: s.monitor_iteration_times,
            scheduler_error_tag: self.scheduler_tag()?,
            error_kinds: ErrorKinds {
                corrupted_vector: s.error_codes.corrupted_vector,
                corrupted_memory: s.error_codes.corrupted_memory,
                test_too_long: s.error_codes.test_too_long,
                cycle_incomplete: s.error_codes.cycle_incomplete,
            },
        };

        let mut builder = ElapsedScheduler::builder(clock, config);
        for u in &self.units {
            let schedule = UnitSchedule::new(
                Duration::from_millis(u.cadence),
                Duration::from_millis(u.completion_budget),
            )
            .with_required_runs(u.required_runs);
            builder = builder.unit(u.instantiate()?, schedule);
        }
        builder.build().context("Failed to build elapsed-time scheduler")
    }

    /// Build the timeslice scheduler.
    ///
    /// # Errors
    /// Returns an error if a tag is out of range, a cadence or budget does
    /// not fit the 32-bit slice counter, or the unit table is rejected.
    pub fn timeslice_scheduler(&self) -> Result<TimesliceScheduler> {
        let s = &self.scheduler;
        let config = TimesliceConfig {
            scheduler_error_tag: self.scheduler_tag()?,
            corrupted_state_error_code: s.error_codes.corrupted_vector,
            completion_timeout_error_code: s.error_codes.completion_timeout,
            completion_check_every: s.completion_check_every,
        };

        let mut builder = TimesliceScheduler::builder(config);
        for u in &self.units {
            if u.required_runs != 1 {
                warn!(unit = %u.name, "required_runs is ignored by the timeslice scheduler");
            }
            builder = builder.unit(u.instantiate()?, u.slice_spec()?);
        }
        builder.build().context("Failed to build timeslice scheduler")
    }
}

// ── BistConfigManager ─────────────────────────────────────────────────────────

/// Loads and holds the self-test configuration.
#[derive(Debug, Default)]
pub struct BistConfigManager {
    config: BistConfig,

    /// Set to `true` after a successful [`load_from_file`](Self::load_from_file).
    loaded: bool,
}

impl BistConfigManager {
    /// Creates a manager holding the built-in default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `path` and replaces the held configuration.
    ///
    /// * Missing scheduler fields fall back to their defaults.
    /// * If the file lists no units, the built-in default units are used.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened, the YAML is
    /// structurally invalid, or a unit has a zero cadence.
    pub fn load_from_file(&mut self, path: &Path) -> Result<()> {
        info!("Loading self-test configuration from: {}", path.display());

        self.loaded = false;

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        let file: BistConfigFile = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?;

        let mut units = Vec::with_capacity(file.units.len());
        for (name, entry) in file.units {
            if entry.cadence == 0 {
                bail!("Unit '{}' has a zero cadence", name);
            }
            let unit = UnitConfig {
                completion_budget: entry
                    .completion_budget
                    .unwrap_or(entry.cadence.saturating_mul(10)),
                name,
                kind: entry.kind,
                tag: entry.tag,
                cadence: entry.cadence,
                trigger: entry.trigger,
                required_runs: entry.required_runs,
                region_bytes: entry.region_bytes,
                chunk_bytes: entry.chunk_bytes,
            };
            debug!(
                "  Unit: {} | kind: {:?} | tag: {} | cadence: {} | budget: {}",
                unit.name, unit.kind, unit.tag, unit.cadence, unit.completion_budget,
            );
            units.push(unit);
        }

        if units.is_empty() {
            warn!("No units found in configuration file, using default units");
            units = default_units();
        }

        let s = file.scheduler;
        self.config = BistConfig {
            scheduler: SchedulerSettings {
                variant: s.variant,
                whole_cycle_budget_ms: s.whole_cycle_budget_ms,
                per_iteration_budget_ms: s.per_iteration_budget_ms,
                monitor_total_testing_time: s.monitor_total_testing_time,
                monitor_iteration_times: s.monitor_iteration_times,
                completion_check_every: s.completion_check_every,
                scheduler_error_tag: s.scheduler_error_tag,
                error_codes: s.error_codes,
            },
            units,
        };
        self.loaded = true;

        info!(
            variant = ?self.config.scheduler.variant,
            units = self.config.units.len(),
            "Successfully loaded self-test configuration"
        );
        Ok(())
    }

    pub fn config(&self) -> &BistConfig {
        &self.config
    }

    /// Override the configured scheduler variant.
    pub fn set_variant(&mut self, variant: Variant) {
        self.config.scheduler.variant = variant;
    }

    /// Returns `true` after a successful call to [`load_from_file`](Self::load_from_file).
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{DiagnosticScheduler, SchedulerPhase};
    use crate::time::ManualClock;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Helper: write a YAML string to a temp file and return it.
    fn yaml_tempfile(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    fn load(yaml: &str) -> Result<BistConfigManager> {
        let f = yaml_tempfile(yaml);
        let mut mgr = BistConfigManager::new();
        mgr.load_from_file(f.path())?;
        Ok(mgr)
    }

    #[test]
    fn default_config_has_two_units() {
        let cfg = BistConfig::default();
        assert_eq!(cfg.scheduler.variant, Variant::Elapsed);
        assert_eq!(cfg.units.len(), 2);
        assert_eq!(cfg.units[0].kind, UnitKind::CrcScan);
        assert_eq!(cfg.units[1].kind, UnitKind::March);
    }

    #[test]
    fn load_full_yaml() {
        let yaml = r#"
scheduler:
  variant: timeslice
  whole_cycle_budget_ms: 5000
  per_iteration_budget_ms: 20
  monitor_total_testing_time: false
  completion_check_every: 4
  scheduler_error_tag: 62
  error_codes:
    corrupted_vector: 11
    completion_timeout: 15
units:
  ram:
    kind: march
    tag: 6
    cadence: 4
    completion_budget: 64
    trigger: 1
    region_bytes: 128
    chunk_bytes: 32
  flash:
    kind: crc_scan
    tag: 5
    cadence: 2
"#;
        let mgr = load(yaml).unwrap();
        assert!(mgr.is_loaded());

        let cfg = mgr.config();
        assert_eq!(cfg.scheduler.variant, Variant::Timeslice);
        assert_eq!(cfg.scheduler.per_iteration_budget_ms, 20);
        assert!(!cfg.scheduler.monitor_total_testing_time);
        assert!(cfg.scheduler.monitor_iteration_times, "default kept");
        assert_eq!(cfg.scheduler.error_codes.corrupted_vector, 11);
        assert_eq!(cfg.scheduler.error_codes.test_too_long, 3, "default kept");

        // Name order.
        assert_eq!(cfg.units[0].name, "flash");
        assert_eq!(cfg.units[0].completion_budget, 20);
        assert_eq!(cfg.units[0].region_bytes, 4096);
        assert_eq!(cfg.units[1].name, "ram");
        assert_eq!(cfg.units[1].trigger, 1);
    }

    #[test]
    fn empty_file_uses_defaults() {
        let mgr = load("{}\n").unwrap();
        assert_eq!(mgr.config(), &BistConfig::default());
    }

    #[test]
    fn missing_file_returns_error() {
        let mut mgr = BistConfigManager::new();
        let result = mgr.load_from_file(Path::new("/nonexistent/path/bist.yaml"));
        assert!(result.is_err());
        assert!(!mgr.is_loaded());
    }

    #[test]
    fn malformed_yaml_returns_error() {
        assert!(load("this is: not: valid: yaml: content:::").is_err());
    }

    #[test]
    fn unknown_unit_kind_is_rejected() {
        assert!(load("units:\n  x:\n    kind: ecc\n    tag: 1\n    cadence: 1\n").is_err());
    }

    #[test]
    fn zero_cadence_is_rejected() {
        let err = load("units:\n  x:\n    kind: march\n    tag: 1\n    cadence: 0\n").unwrap_err();
        assert!(format!("{err:#}").contains("zero cadence"));
    }

    #[test]
    fn out_of_range_tag_fails_at_build() {
        let mgr = load("units:\n  x:\n    kind: march\n    tag: 64\n    cadence: 1\n").unwrap();
        assert!(mgr.config().timeslice_scheduler().is_err());
    }

    #[test]
    fn duplicate_tags_fail_at_build() {
        let yaml = "units:\n  a:\n    kind: march\n    tag: 3\n    cadence: 1\n  b:\n    kind: crc_scan\n    tag: 3\n    cadence: 1\n";
        let mgr = load(yaml).unwrap();
        assert!(mgr.config().elapsed_scheduler(ManualClock::new()).is_err());
    }

    #[test]
    fn default_config_builds_and_runs_both_variants() {
        let cfg = BistConfig::default();

        let mut ts = cfg.timeslice_scheduler().unwrap();
        for _ in 0..100 {
            ts.try_tick().unwrap();
        }
        assert!(ts.table().records().all(|r| r.completions() > 0));

        let clock = ManualClock::new();
        let mut el = cfg.elapsed_scheduler(clock.clone()).unwrap();
        for _ in 0..100 {
            clock.advance_by(Duration::from_millis(101));
            el.try_tick().unwrap();
        }
        assert!(el.table().records().all(|r| r.completions() > 0));
    }

    #[test]
    fn default_elapsed_config_survives_a_full_cycle() {
        let cfg = BistConfig::default();
        assert!(cfg.scheduler.monitor_total_testing_time);
        assert!(cfg.units.iter().all(|u| u.completion_budget < cfg.scheduler.whole_cycle_budget_ms));

        // Both units finish within seconds, then idle past their budget
        // until the 60 s cycle rolls over.
        let clock = ManualClock::new();
        let mut el = cfg.elapsed_scheduler(clock.clone()).unwrap();
        let mut rollovers = 0;
        for tick in 0..800 {
            clock.advance_by(Duration::from_millis(101));
            match el.try_tick() {
                Ok(SchedulerPhase::CycleExpiredAllComplete) => rollovers += 1,
                Ok(_) => {}
                Err(fault) => panic!("tick {tick} at {} ms escalated: {fault}", clock.now_ms()),
            }
        }
        assert_eq!(rollovers, 1);
        assert!(el.table().records().all(|r| r.completions() >= 2));
    }

    #[test]
    fn variant_override() {
        let mut mgr = BistConfigManager::new();
        mgr.set_variant(Variant::Timeslice);
        assert_eq!(mgr.config().scheduler.variant, Variant::Timeslice);
    }
}
