// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration for the overlay log manager
//!
//! This module provides:
//! - Memory throttle limits for the write buffer pool (three wire versions)
//! - Default settings for the shared log container
//! - Accelerated flush limits
//! - The typed Configure surface and its raw JSON decoding
//! - [`ManagerConfig`], loadable from a TOML file
//!
//! Every setter validates the complete input before anything is applied.

use crate::error::LogError;
use crate::id::{DiskId, LogId};
use crate::throttle::DebugCounters;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const MIB: u64 = 1024 * 1024;

/// Errors from configuration validation and loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} = {value} is outside the valid range {range}")]
    OutOfRange {
        field: &'static str,
        value: i64,
        range: &'static str,
    },
    #[error("{0}")]
    Inconsistent(&'static str),
    #[error("missing or malformed input for {code:?}: {reason}")]
    BadInput { code: ConfigureCode, reason: String },
    #[error("unknown configure code {0}")]
    UnknownCode(u32),
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

impl From<ConfigError> for LogError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Read { source, .. } => LogError::Io(source),
            other => LogError::InvalidParameter(other.to_string()),
        }
    }
}

fn check_range(
    field: &'static str,
    value: i64,
    min: i64,
    max: i64,
    range: &'static str,
) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange { field, value, range });
    }
    Ok(())
}

// =============================================================================
// Byte limits
// =============================================================================

/// A byte count that may also be "no limit"
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ByteLimit(i64);

impl ByteLimit {
    pub const NO_LIMIT: ByteLimit = ByteLimit(-1);

    pub const fn bytes(bytes: u64) -> Self {
        // Values above i64::MAX are indistinguishable from no limit in practice
        if bytes > i64::MAX as u64 {
            ByteLimit(i64::MAX)
        } else {
            ByteLimit(bytes as i64)
        }
    }

    pub fn is_no_limit(&self) -> bool {
        self.0 == Self::NO_LIMIT.0
    }

    /// A byte count or exactly the no-limit sentinel
    pub fn is_valid(&self) -> bool {
        self.0 >= Self::NO_LIMIT.0
    }

    /// The byte count, or `None` for no limit
    pub fn get(&self) -> Option<u64> {
        u64::try_from(self.0).ok()
    }

    pub fn raw(&self) -> i64 {
        self.0
    }
}

impl From<Option<u64>> for ByteLimit {
    fn from(value: Option<u64>) -> Self {
        value.map_or(ByteLimit::NO_LIMIT, ByteLimit::bytes)
    }
}

// =============================================================================
// Shared log container settings
// =============================================================================

/// Defaults applied when creating or opening the well-known shared log
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharedLogContainerSettings {
    /// Explicit container path; excludes `disk_id`
    pub path: Option<PathBuf>,
    /// Disk to place the container on; excludes `path`
    pub disk_id: Option<DiskId>,
    /// Replacement container id; present exactly when `path` is
    pub log_container_id: Option<LogId>,
    pub log_size: u64,
    pub maximum_number_streams: u32,
    /// Must be zero: the engine picks the record size
    pub maximum_record_size: u32,
    pub flags: u32,
}

impl SharedLogContainerSettings {
    /// Values lower than this are rejected by the log engine
    pub const LOG_SIZE_MIN: u64 = 512 * MIB;
    pub const DEFAULT_LOG_SIZE: u64 = 8 * 1024 * MIB;
    pub const MAXIMUM_NUMBER_STREAMS_MIN: u32 = 3 * 512;
    pub const MAXIMUM_NUMBER_STREAMS_MAX: u32 = 3 * 8192;
    pub const DEFAULT_MAXIMUM_NUMBER_STREAMS: u32 = 3 * 1024;
    pub const FLAG_SPARSE_FILE: u32 = 1;

    /// Structural validation; the path's volume is resolved by the manager
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log_size < Self::LOG_SIZE_MIN {
            return Err(ConfigError::OutOfRange {
                field: "log_size",
                value: self.log_size.min(i64::MAX as u64) as i64,
                range: ">= 512MiB",
            });
        }
        check_range(
            "maximum_number_streams",
            i64::from(self.maximum_number_streams),
            i64::from(Self::MAXIMUM_NUMBER_STREAMS_MIN),
            i64::from(Self::MAXIMUM_NUMBER_STREAMS_MAX),
            "[1536, 24576]",
        )?;
        if self.maximum_record_size != 0 {
            return Err(ConfigError::OutOfRange {
                field: "maximum_record_size",
                value: i64::from(self.maximum_record_size),
                range: "0",
            });
        }
        if self.flags != 0 && self.flags != Self::FLAG_SPARSE_FILE {
            return Err(ConfigError::OutOfRange {
                field: "flags",
                value: i64::from(self.flags),
                range: "0 or SPARSE_FILE",
            });
        }

        let disk_set = self.disk_id.is_some_and(|d| !d.is_nil());
        let container_set = self.log_container_id.is_some_and(|l| !l.is_nil());
        let path_set = self
            .path
            .as_ref()
            .is_some_and(|p| !p.as_os_str().is_empty());

        if disk_set && path_set {
            return Err(ConfigError::Inconsistent(
                "disk_id and path are mutually exclusive",
            ));
        }
        if container_set != path_set {
            return Err(ConfigError::Inconsistent(
                "log_container_id must be set exactly when path is set",
            ));
        }
        if let Some(path) = self.path.as_ref().filter(|_| path_set) {
            if !path.is_absolute() {
                return Err(ConfigError::Inconsistent("path must be absolute"));
            }
        }
        Ok(())
    }
}

impl Default for SharedLogContainerSettings {
    fn default() -> Self {
        Self {
            path: None,
            disk_id: None,
            log_container_id: None,
            log_size: Self::DEFAULT_LOG_SIZE,
            maximum_number_streams: Self::DEFAULT_MAXIMUM_NUMBER_STREAMS,
            maximum_record_size: 0,
            flags: 0,
        }
    }
}

// =============================================================================
// Memory throttle limits
// =============================================================================

/// Which generation of the throttle-limits input was supplied
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ThrottleLimitsVersion {
    V1,
    /// Adds `maximum_destaging_write_outstanding`
    V2,
    /// Adds `shared_log_throttle_limit`
    V3,
}

/// Limits for the write buffer memory pool
///
/// The pool's total allocation limit starts at `write_buffer_memory_pool_min`
/// and grows by `write_buffer_memory_pool_per_stream` for each stream that
/// opens, never beyond `write_buffer_memory_pool_max`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryThrottleLimits {
    pub write_buffer_memory_pool_max: ByteLimit,
    pub write_buffer_memory_pool_min: ByteLimit,
    pub write_buffer_memory_pool_per_stream: u64,
    pub pinned_memory_limit: ByteLimit,
    pub periodic_flush_time_secs: u32,
    pub periodic_timer_interval_secs: u32,
    /// 0 disables the timeout, `u32::MAX` selects the default
    pub allocation_timeout_ms: u32,
    pub maximum_destaging_write_outstanding: ByteLimit,
    /// Percentage of shared log usage at which writers are throttled
    pub shared_log_throttle_limit: u32,
}

impl MemoryThrottleLimits {
    pub const DEFAULT_PERIODIC_FLUSH_TIME_SECS: u32 = 60;
    pub const PERIODIC_FLUSH_TIME_SECS_MIN: u32 = 15;
    pub const PERIODIC_FLUSH_TIME_SECS_MAX: u32 = 5 * 60;

    pub const DEFAULT_PERIODIC_TIMER_INTERVAL_SECS: u32 = 10;
    pub const PERIODIC_TIMER_INTERVAL_SECS_MIN: u32 = 1;
    pub const PERIODIC_TIMER_INTERVAL_SECS_MAX: u32 = 60;

    pub const DEFAULT_POOL_MIN: u64 = 8 * 1024 * MIB;
    pub const POOL_MIN_MIN: u64 = 16 * MIB;
    pub const DEFAULT_POOL_PER_STREAM: u64 = MIB;
    pub const POOL_PER_STREAM_MIN: u64 = MIB;

    pub const PINNED_MEMORY_LIMIT_MIN: u64 = 64 * MIB;

    pub const NO_ALLOCATION_TIMEOUT_MS: u32 = 0;
    pub const USE_DEFAULT_ALLOCATION_TIMEOUT_MS: u32 = u32::MAX;
    pub const DEFAULT_ALLOCATION_TIMEOUT_MS: u32 = 5 * 60 * 1000;
    pub const ALLOCATION_TIMEOUT_MS_MAX: u32 = 60 * 60 * 1000;

    pub const DESTAGING_WRITE_OUTSTANDING_MIN: u64 = 16 * MIB;

    pub const NO_SHARED_LOG_THROTTLE_LIMIT: u32 = 100;
    pub const DEFAULT_SHARED_LOG_THROTTLE_LIMIT: u32 = 90;

    /// Validate for the given input version and return the limits to apply.
    ///
    /// Fields newer than `version` are replaced by their defaults and a
    /// destaging limit below the floor is raised to it.
    pub fn validated(&self, version: ThrottleLimitsVersion) -> Result<Self, ConfigError> {
        for (field, limit) in [
            ("write_buffer_memory_pool_min", self.write_buffer_memory_pool_min),
            ("write_buffer_memory_pool_max", self.write_buffer_memory_pool_max),
            ("pinned_memory_limit", self.pinned_memory_limit),
            (
                "maximum_destaging_write_outstanding",
                self.maximum_destaging_write_outstanding,
            ),
        ] {
            if !limit.is_valid() {
                return Err(ConfigError::OutOfRange {
                    field,
                    value: limit.raw(),
                    range: ">= 0 or NO_LIMIT",
                });
            }
        }
        check_range(
            "periodic_flush_time_secs",
            i64::from(self.periodic_flush_time_secs),
            i64::from(Self::PERIODIC_FLUSH_TIME_SECS_MIN),
            i64::from(Self::PERIODIC_FLUSH_TIME_SECS_MAX),
            "[15, 300]",
        )?;
        check_range(
            "periodic_timer_interval_secs",
            i64::from(self.periodic_timer_interval_secs),
            i64::from(Self::PERIODIC_TIMER_INTERVAL_SECS_MIN),
            i64::from(Self::PERIODIC_TIMER_INTERVAL_SECS_MAX),
            "[1, 60]",
        )?;
        if self.allocation_timeout_ms != Self::USE_DEFAULT_ALLOCATION_TIMEOUT_MS
            && self.allocation_timeout_ms > Self::ALLOCATION_TIMEOUT_MS_MAX
        {
            return Err(ConfigError::OutOfRange {
                field: "allocation_timeout_ms",
                value: i64::from(self.allocation_timeout_ms),
                range: "<= 3600000 or USE_DEFAULT",
            });
        }
        if let Some(pinned) = self.pinned_memory_limit.get() {
            if pinned < Self::PINNED_MEMORY_LIMIT_MIN {
                return Err(ConfigError::OutOfRange {
                    field: "pinned_memory_limit",
                    value: self.pinned_memory_limit.raw(),
                    range: ">= 64MiB or NO_LIMIT",
                });
            }
        }

        match (
            self.write_buffer_memory_pool_min.get(),
            self.write_buffer_memory_pool_max.get(),
        ) {
            (Some(min), max) => {
                if min < Self::POOL_MIN_MIN {
                    return Err(ConfigError::OutOfRange {
                        field: "write_buffer_memory_pool_min",
                        value: self.write_buffer_memory_pool_min.raw(),
                        range: ">= 16MiB or NO_LIMIT",
                    });
                }
                if max.is_some_and(|max| min > max) {
                    return Err(ConfigError::Inconsistent(
                        "write_buffer_memory_pool_min must not exceed write_buffer_memory_pool_max",
                    ));
                }
            }
            (None, Some(_)) => {
                return Err(ConfigError::Inconsistent(
                    "write_buffer_memory_pool_max requires write_buffer_memory_pool_min",
                ));
            }
            (None, None) => {}
        }

        if self.write_buffer_memory_pool_per_stream != 0
            && self.write_buffer_memory_pool_per_stream < Self::POOL_PER_STREAM_MIN
        {
            return Err(ConfigError::OutOfRange {
                field: "write_buffer_memory_pool_per_stream",
                value: self.write_buffer_memory_pool_per_stream.min(i64::MAX as u64) as i64,
                range: "0 or >= 1MiB",
            });
        }

        let mut applied = self.clone();

        applied.maximum_destaging_write_outstanding = if version >= ThrottleLimitsVersion::V2 {
            match self.maximum_destaging_write_outstanding.get() {
                Some(bytes) if bytes < Self::DESTAGING_WRITE_OUTSTANDING_MIN => {
                    ByteLimit::bytes(Self::DESTAGING_WRITE_OUTSTANDING_MIN)
                }
                _ => self.maximum_destaging_write_outstanding,
            }
        } else {
            ByteLimit::NO_LIMIT
        };

        applied.shared_log_throttle_limit = if version >= ThrottleLimitsVersion::V3 {
            self.shared_log_throttle_limit
        } else {
            Self::DEFAULT_SHARED_LOG_THROTTLE_LIMIT
        };
        check_range(
            "shared_log_throttle_limit",
            i64::from(applied.shared_log_throttle_limit),
            1,
            100,
            "(0, 100]",
        )?;

        Ok(applied)
    }

    /// Allocation timeout with the "use default" sentinel resolved
    pub fn effective_allocation_timeout_ms(&self) -> u32 {
        if self.allocation_timeout_ms == Self::USE_DEFAULT_ALLOCATION_TIMEOUT_MS {
            Self::DEFAULT_ALLOCATION_TIMEOUT_MS
        } else {
            self.allocation_timeout_ms
        }
    }
}

impl Default for MemoryThrottleLimits {
    fn default() -> Self {
        Self {
            write_buffer_memory_pool_max: ByteLimit::NO_LIMIT,
            write_buffer_memory_pool_min: ByteLimit::bytes(Self::DEFAULT_POOL_MIN),
            write_buffer_memory_pool_per_stream: Self::DEFAULT_POOL_PER_STREAM,
            pinned_memory_limit: ByteLimit::NO_LIMIT,
            periodic_flush_time_secs: Self::DEFAULT_PERIODIC_FLUSH_TIME_SECS,
            periodic_timer_interval_secs: Self::DEFAULT_PERIODIC_TIMER_INTERVAL_SECS,
            allocation_timeout_ms: Self::DEFAULT_ALLOCATION_TIMEOUT_MS,
            maximum_destaging_write_outstanding: ByteLimit::NO_LIMIT,
            shared_log_throttle_limit: Self::DEFAULT_SHARED_LOG_THROTTLE_LIMIT,
        }
    }
}

/// Snapshot of the write buffer pool returned by a usage query
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryThrottleUsage {
    pub configured_limits: MemoryThrottleLimits,
    pub total_allocation_limit: ByteLimit,
    pub current_allocations: u64,
    /// Some allocation is waiting for memory
    pub is_under_memory_pressure: bool,
}

// =============================================================================
// Accelerated flush limits
// =============================================================================

/// Thresholds at which streams are asked to flush early
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcceleratedFlushLimits {
    /// 0 disables active-mode flushing
    pub active_timer_ms: u32,
    pub passive_timer_ms: u32,
    pub active_percent: u32,
    pub passive_percent: u32,
}

impl AcceleratedFlushLimits {
    pub const ACTIVE_TIMER_MS_NO_ACTION: u32 = 0;
    pub const ACTIVE_TIMER_MS_MIN: u32 = 1000;
    pub const ACTIVE_TIMER_MS_MAX: u32 = 10_000;
    pub const PASSIVE_TIMER_MS_MIN: u32 = 1000;
    pub const PASSIVE_TIMER_MS_MAX: u32 = 60_000;
    pub const PERCENT_MIN: u32 = 1;
    pub const PERCENT_MAX: u32 = 99;

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.active_timer_ms != Self::ACTIVE_TIMER_MS_NO_ACTION {
            check_range(
                "active_timer_ms",
                i64::from(self.active_timer_ms),
                i64::from(Self::ACTIVE_TIMER_MS_MIN),
                i64::from(Self::ACTIVE_TIMER_MS_MAX),
                "0 or [1000, 10000]",
            )?;
        }
        check_range(
            "passive_timer_ms",
            i64::from(self.passive_timer_ms),
            i64::from(Self::PASSIVE_TIMER_MS_MIN),
            i64::from(Self::PASSIVE_TIMER_MS_MAX),
            "[1000, 60000]",
        )?;
        check_range(
            "active_percent",
            i64::from(self.active_percent),
            i64::from(Self::PERCENT_MIN),
            i64::from(Self::PERCENT_MAX),
            "[1, 99]",
        )?;
        check_range(
            "passive_percent",
            i64::from(self.passive_percent),
            i64::from(Self::PERCENT_MIN),
            i64::from(Self::PERCENT_MAX),
            "[1, 99]",
        )?;
        if self.active_percent < self.passive_percent {
            return Err(ConfigError::Inconsistent(
                "active_percent must be at least passive_percent",
            ));
        }
        Ok(())
    }
}

impl Default for AcceleratedFlushLimits {
    fn default() -> Self {
        Self {
            active_timer_ms: 1000,
            passive_timer_ms: 15_000,
            active_percent: 70,
            passive_percent: 30,
        }
    }
}

// =============================================================================
// Configure surface
// =============================================================================

/// Raw configuration codes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum ConfigureCode {
    SharedLogContainerSettings = 0,
    MemoryThrottleLimits = 1,
    MemoryThrottleLimits2 = 2,
    QueryMemoryThrottleUsage = 3,
    QueryDebugUnitTestInformation = 4,
    MemoryThrottleLimits3 = 5,
    AcceleratedFlushLimits = 6,
}

impl TryFrom<u32> for ConfigureCode {
    type Error = ConfigError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => ConfigureCode::SharedLogContainerSettings,
            1 => ConfigureCode::MemoryThrottleLimits,
            2 => ConfigureCode::MemoryThrottleLimits2,
            3 => ConfigureCode::QueryMemoryThrottleUsage,
            4 => ConfigureCode::QueryDebugUnitTestInformation,
            5 => ConfigureCode::MemoryThrottleLimits3,
            6 => ConfigureCode::AcceleratedFlushLimits,
            other => return Err(ConfigError::UnknownCode(other)),
        })
    }
}

/// A validated-on-apply configuration request
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigureRequest {
    SharedLogContainerSettings(SharedLogContainerSettings),
    MemoryThrottleLimits {
        limits: MemoryThrottleLimits,
        version: ThrottleLimitsVersion,
    },
    QueryMemoryThrottleUsage,
    /// Served by test builds only
    QueryDebugCounters,
    AcceleratedFlushLimits(AcceleratedFlushLimits),
}

/// Result of a configuration request
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigureOutput {
    None,
    Usage(MemoryThrottleUsage),
    Debug(DebugCounters),
}

// Wire shapes for the three throttle-limit versions. Every field is
// required, so a short input is rejected before anything is applied.
#[derive(Deserialize)]
struct ThrottleLimitsV1 {
    write_buffer_memory_pool_max: ByteLimit,
    write_buffer_memory_pool_min: ByteLimit,
    write_buffer_memory_pool_per_stream: u64,
    pinned_memory_limit: ByteLimit,
    periodic_flush_time_secs: u32,
    periodic_timer_interval_secs: u32,
    allocation_timeout_ms: u32,
}

#[derive(Deserialize)]
struct ThrottleLimitsV2 {
    #[serde(flatten)]
    v1: ThrottleLimitsV1,
    maximum_destaging_write_outstanding: ByteLimit,
}

#[derive(Deserialize)]
struct ThrottleLimitsV3 {
    #[serde(flatten)]
    v2: ThrottleLimitsV2,
    shared_log_throttle_limit: u32,
}

impl ThrottleLimitsV1 {
    fn into_limits(self) -> MemoryThrottleLimits {
        MemoryThrottleLimits {
            write_buffer_memory_pool_max: self.write_buffer_memory_pool_max,
            write_buffer_memory_pool_min: self.write_buffer_memory_pool_min,
            write_buffer_memory_pool_per_stream: self.write_buffer_memory_pool_per_stream,
            pinned_memory_limit: self.pinned_memory_limit,
            periodic_flush_time_secs: self.periodic_flush_time_secs,
            periodic_timer_interval_secs: self.periodic_timer_interval_secs,
            allocation_timeout_ms: self.allocation_timeout_ms,
            ..MemoryThrottleLimits::default()
        }
    }
}

fn decode_input<T: DeserializeOwned>(
    code: ConfigureCode,
    input: Option<&[u8]>,
) -> Result<T, ConfigError> {
    let bytes = input.ok_or_else(|| ConfigError::BadInput {
        code,
        reason: "no input supplied".to_string(),
    })?;
    serde_json::from_slice(bytes).map_err(|e| ConfigError::BadInput {
        code,
        reason: e.to_string(),
    })
}

impl ConfigureRequest {
    /// Decode a raw request: a code plus an optional JSON payload
    pub fn decode(code: u32, input: Option<&[u8]>) -> Result<Self, ConfigError> {
        let code = ConfigureCode::try_from(code)?;
        Ok(match code {
            ConfigureCode::SharedLogContainerSettings => {
                ConfigureRequest::SharedLogContainerSettings(decode_input(code, input)?)
            }
            ConfigureCode::MemoryThrottleLimits => {
                let v1: ThrottleLimitsV1 = decode_input(code, input)?;
                ConfigureRequest::MemoryThrottleLimits {
                    limits: v1.into_limits(),
                    version: ThrottleLimitsVersion::V1,
                }
            }
            ConfigureCode::MemoryThrottleLimits2 => {
                let v2: ThrottleLimitsV2 = decode_input(code, input)?;
                let mut limits = v2.v1.into_limits();
                limits.maximum_destaging_write_outstanding = v2.maximum_destaging_write_outstanding;
                ConfigureRequest::MemoryThrottleLimits {
                    limits,
                    version: ThrottleLimitsVersion::V2,
                }
            }
            ConfigureCode::MemoryThrottleLimits3 => {
                let v3: ThrottleLimitsV3 = decode_input(code, input)?;
                let mut limits = v3.v2.v1.into_limits();
                limits.maximum_destaging_write_outstanding =
                    v3.v2.maximum_destaging_write_outstanding;
                limits.shared_log_throttle_limit = v3.shared_log_throttle_limit;
                ConfigureRequest::MemoryThrottleLimits {
                    limits,
                    version: ThrottleLimitsVersion::V3,
                }
            }
            ConfigureCode::QueryMemoryThrottleUsage => ConfigureRequest::QueryMemoryThrottleUsage,
            ConfigureCode::QueryDebugUnitTestInformation => ConfigureRequest::QueryDebugCounters,
            ConfigureCode::AcceleratedFlushLimits => {
                ConfigureRequest::AcceleratedFlushLimits(decode_input(code, input)?)
            }
        })
    }
}

// =============================================================================
// Manager configuration
// =============================================================================

/// Complete configuration of an overlay log manager
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub memory_throttle_limits: MemoryThrottleLimits,
    pub shared_log_settings: SharedLogContainerSettings,
    pub accelerated_flush_limits: AcceleratedFlushLimits,
    /// Number of streams that may be opening against one disk at a time
    pub stream_open_gate_quanta: u32,
    /// Tick of the allocator's timeout sweep
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            memory_throttle_limits: MemoryThrottleLimits::default(),
            shared_log_settings: SharedLogContainerSettings::default(),
            accelerated_flush_limits: AcceleratedFlushLimits::default(),
            stream_open_gate_quanta: 1,
            sweep_interval: Duration::from_millis(1000),
        }
    }
}

impl ManagerConfig {
    /// Load and validate a TOML configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let mut config: ManagerConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section, normalizing throttle limits as a V3 input would be
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.memory_throttle_limits = self
            .memory_throttle_limits
            .validated(ThrottleLimitsVersion::V3)?;
        self.shared_log_settings.validate()?;
        self.accelerated_flush_limits.validate()?;
        if self.stream_open_gate_quanta == 0 {
            return Err(ConfigError::OutOfRange {
                field: "stream_open_gate_quanta",
                value: 0,
                range: ">= 1",
            });
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::Inconsistent("sweep_interval must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
