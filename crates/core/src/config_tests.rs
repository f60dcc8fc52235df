// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use yare::parameterized;

fn v1_json() -> serde_json::Value {
    json!({
        "write_buffer_memory_pool_max": -1,
        "write_buffer_memory_pool_min": 32 * MIB,
        "write_buffer_memory_pool_per_stream": MIB,
        "pinned_memory_limit": -1,
        "periodic_flush_time_secs": 60,
        "periodic_timer_interval_secs": 10,
        "allocation_timeout_ms": 1000,
    })
}

fn encode(value: &serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(value).unwrap()
}

#[test]
fn byte_limit_no_limit() {
    assert!(ByteLimit::NO_LIMIT.is_no_limit());
    assert_eq!(ByteLimit::NO_LIMIT.get(), None);
    assert_eq!(ByteLimit::bytes(4096).get(), Some(4096));
    assert_eq!(ByteLimit::from(None), ByteLimit::NO_LIMIT);
    assert_eq!(ByteLimit::bytes(u64::MAX).raw(), i64::MAX);
}

#[test]
fn defaults_are_valid() {
    let mut config = ManagerConfig::default();
    config.validate().unwrap();
    assert_eq!(
        config.memory_throttle_limits.shared_log_throttle_limit,
        MemoryThrottleLimits::DEFAULT_SHARED_LOG_THROTTLE_LIMIT
    );
}

// =============================================================================
// Memory throttle limits
// =============================================================================

#[parameterized(
    flush_too_short = { |l: &mut MemoryThrottleLimits| l.periodic_flush_time_secs = 14 },
    flush_too_long = { |l: &mut MemoryThrottleLimits| l.periodic_flush_time_secs = 301 },
    interval_zero = { |l: &mut MemoryThrottleLimits| l.periodic_timer_interval_secs = 0 },
    interval_too_long = { |l: &mut MemoryThrottleLimits| l.periodic_timer_interval_secs = 61 },
    timeout_too_long = { |l: &mut MemoryThrottleLimits| l.allocation_timeout_ms = 3_600_001 },
    pinned_too_small = { |l: &mut MemoryThrottleLimits| l.pinned_memory_limit = ByteLimit::bytes(MIB) },
    pool_min_too_small = { |l: &mut MemoryThrottleLimits| l.write_buffer_memory_pool_min = ByteLimit::bytes(MIB) },
    pool_max_below_min = { |l: &mut MemoryThrottleLimits| {
        l.write_buffer_memory_pool_min = ByteLimit::bytes(64 * MIB);
        l.write_buffer_memory_pool_max = ByteLimit::bytes(32 * MIB);
    }},
    pool_max_without_min = { |l: &mut MemoryThrottleLimits| {
        l.write_buffer_memory_pool_min = ByteLimit::NO_LIMIT;
        l.write_buffer_memory_pool_max = ByteLimit::bytes(32 * MIB);
    }},
    per_stream_too_small = { |l: &mut MemoryThrottleLimits| l.write_buffer_memory_pool_per_stream = 4096 },
    shared_throttle_zero = { |l: &mut MemoryThrottleLimits| l.shared_log_throttle_limit = 0 },
    shared_throttle_over_100 = { |l: &mut MemoryThrottleLimits| l.shared_log_throttle_limit = 101 },
    pool_min_negative = { |l: &mut MemoryThrottleLimits| l.write_buffer_memory_pool_min = ByteLimit(-5) },
    pool_max_negative = { |l: &mut MemoryThrottleLimits| l.write_buffer_memory_pool_max = ByteLimit(-2) },
    pinned_negative = { |l: &mut MemoryThrottleLimits| l.pinned_memory_limit = ByteLimit(i64::MIN) },
    destaging_negative = { |l: &mut MemoryThrottleLimits| l.maximum_destaging_write_outstanding = ByteLimit(-3) },
)]
fn throttle_limits_rejected(mutate: fn(&mut MemoryThrottleLimits)) {
    let mut limits = MemoryThrottleLimits::default();
    mutate(&mut limits);
    assert!(limits.validated(ThrottleLimitsVersion::V3).is_err());
}

#[parameterized(
    use_default_timeout = { |l: &mut MemoryThrottleLimits| l.allocation_timeout_ms = u32::MAX },
    no_timeout = { |l: &mut MemoryThrottleLimits| l.allocation_timeout_ms = 0 },
    unlimited_pool = { |l: &mut MemoryThrottleLimits| {
        l.write_buffer_memory_pool_min = ByteLimit::NO_LIMIT;
        l.write_buffer_memory_pool_max = ByteLimit::NO_LIMIT;
    }},
    per_stream_zero = { |l: &mut MemoryThrottleLimits| l.write_buffer_memory_pool_per_stream = 0 },
    pinned_at_floor = { |l: &mut MemoryThrottleLimits| l.pinned_memory_limit = ByteLimit::bytes(64 * MIB) },
    min_equals_max = { |l: &mut MemoryThrottleLimits| {
        l.write_buffer_memory_pool_min = ByteLimit::bytes(16 * MIB);
        l.write_buffer_memory_pool_max = ByteLimit::bytes(16 * MIB);
    }},
    shared_throttle_100 = { |l: &mut MemoryThrottleLimits| l.shared_log_throttle_limit = 100 },
)]
fn throttle_limits_accepted(mutate: fn(&mut MemoryThrottleLimits)) {
    let mut limits = MemoryThrottleLimits::default();
    mutate(&mut limits);
    assert!(limits.validated(ThrottleLimitsVersion::V3).is_ok());
}

#[test]
fn destaging_limit_is_raised_to_floor() {
    let limits = MemoryThrottleLimits {
        maximum_destaging_write_outstanding: ByteLimit::bytes(MIB),
        ..MemoryThrottleLimits::default()
    };
    let applied = limits.validated(ThrottleLimitsVersion::V2).unwrap();
    assert_eq!(
        applied.maximum_destaging_write_outstanding,
        ByteLimit::bytes(MemoryThrottleLimits::DESTAGING_WRITE_OUTSTANDING_MIN)
    );
}

#[test]
fn older_versions_get_defaults_for_newer_fields() {
    let limits = MemoryThrottleLimits {
        maximum_destaging_write_outstanding: ByteLimit::bytes(64 * MIB),
        shared_log_throttle_limit: 0,
        ..MemoryThrottleLimits::default()
    };

    let v1 = limits.validated(ThrottleLimitsVersion::V1).unwrap();
    assert!(v1.maximum_destaging_write_outstanding.is_no_limit());
    assert_eq!(v1.shared_log_throttle_limit, 90);

    let v2 = limits.validated(ThrottleLimitsVersion::V2).unwrap();
    assert_eq!(v2.maximum_destaging_write_outstanding, ByteLimit::bytes(64 * MIB));
    assert_eq!(v2.shared_log_throttle_limit, 90);

    assert!(limits.validated(ThrottleLimitsVersion::V3).is_err());
}

#[test]
fn effective_timeout_resolves_default() {
    let mut limits = MemoryThrottleLimits {
        allocation_timeout_ms: MemoryThrottleLimits::USE_DEFAULT_ALLOCATION_TIMEOUT_MS,
        ..MemoryThrottleLimits::default()
    };
    assert_eq!(limits.effective_allocation_timeout_ms(), 300_000);
    limits.allocation_timeout_ms = 0;
    assert_eq!(limits.effective_allocation_timeout_ms(), 0);
}

// =============================================================================
// Shared log settings
// =============================================================================

#[parameterized(
    log_too_small = { |s: &mut SharedLogContainerSettings| s.log_size = 1024 },
    too_few_streams = { |s: &mut SharedLogContainerSettings| s.maximum_number_streams = 1535 },
    too_many_streams = { |s: &mut SharedLogContainerSettings| s.maximum_number_streams = 24577 },
    record_size_set = { |s: &mut SharedLogContainerSettings| s.maximum_record_size = 4096 },
    unknown_flag = { |s: &mut SharedLogContainerSettings| s.flags = 2 },
    disk_and_path = { |s: &mut SharedLogContainerSettings| {
        s.disk_id = Some(DiskId::new());
        s.path = Some(PathBuf::from("/logs/shared.log"));
        s.log_container_id = Some(LogId::new());
    }},
    path_without_container = { |s: &mut SharedLogContainerSettings| s.path = Some(PathBuf::from("/logs/shared.log")) },
    container_without_path = { |s: &mut SharedLogContainerSettings| s.log_container_id = Some(LogId::new()) },
    relative_path = { |s: &mut SharedLogContainerSettings| {
        s.path = Some(PathBuf::from("logs/shared.log"));
        s.log_container_id = Some(LogId::new());
    }},
)]
fn shared_log_settings_rejected(mutate: fn(&mut SharedLogContainerSettings)) {
    let mut settings = SharedLogContainerSettings::default();
    mutate(&mut settings);
    assert!(settings.validate().is_err());
}

#[test]
fn shared_log_settings_with_path_and_container() {
    let settings = SharedLogContainerSettings {
        path: Some(PathBuf::from("/logs/shared.log")),
        log_container_id: Some(LogId::new()),
        flags: SharedLogContainerSettings::FLAG_SPARSE_FILE,
        ..SharedLogContainerSettings::default()
    };
    settings.validate().unwrap();
}

// =============================================================================
// Accelerated flush limits
// =============================================================================

#[parameterized(
    defaults = { 1000, 15000, 70, 30, true },
    active_disabled = { 0, 15000, 70, 30, true },
    active_too_short = { 999, 15000, 70, 30, false },
    active_too_long = { 10001, 15000, 70, 30, false },
    passive_too_short = { 1000, 999, 70, 30, false },
    passive_too_long = { 1000, 60001, 70, 30, false },
    percent_zero = { 1000, 15000, 70, 0, false },
    percent_100 = { 1000, 15000, 100, 30, false },
    active_below_passive = { 1000, 15000, 30, 70, false },
    equal_percents = { 1000, 15000, 50, 50, true },
)]
fn accelerated_flush_limits(active_ms: u32, passive_ms: u32, active: u32, passive: u32, ok: bool) {
    let limits = AcceleratedFlushLimits {
        active_timer_ms: active_ms,
        passive_timer_ms: passive_ms,
        active_percent: active,
        passive_percent: passive,
    };
    assert_eq!(limits.validate().is_ok(), ok);
}

// =============================================================================
// Raw decoding
// =============================================================================

#[test]
fn decode_v1_throttle_limits() {
    let request = ConfigureRequest::decode(1, Some(&encode(&v1_json()))).unwrap();
    let ConfigureRequest::MemoryThrottleLimits { limits, version } = request else {
        panic!("unexpected request {request:?}");
    };
    assert_eq!(version, ThrottleLimitsVersion::V1);
    assert_eq!(limits.write_buffer_memory_pool_min, ByteLimit::bytes(32 * MIB));
    assert_eq!(limits.allocation_timeout_ms, 1000);
}

#[test]
fn decode_v3_throttle_limits() {
    let mut value = v1_json();
    value["maximum_destaging_write_outstanding"] = json!(32 * MIB);
    value["shared_log_throttle_limit"] = json!(75);

    let request = ConfigureRequest::decode(5, Some(&encode(&value))).unwrap();
    let ConfigureRequest::MemoryThrottleLimits { limits, version } = request else {
        panic!("unexpected request {request:?}");
    };
    assert_eq!(version, ThrottleLimitsVersion::V3);
    assert_eq!(limits.maximum_destaging_write_outstanding, ByteLimit::bytes(32 * MIB));
    assert_eq!(limits.shared_log_throttle_limit, 75);
}

#[test]
fn negative_byte_limit_other_than_no_limit_is_rejected() {
    let mut value = v1_json();
    value["write_buffer_memory_pool_max"] = json!(-5);
    let request = ConfigureRequest::decode(1, Some(&encode(&value))).unwrap();
    let ConfigureRequest::MemoryThrottleLimits { limits, version } = request else {
        panic!("unexpected request {request:?}");
    };
    assert!(!limits.write_buffer_memory_pool_max.is_no_limit());
    let err = limits.validated(version).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::OutOfRange { field: "write_buffer_memory_pool_max", value: -5, .. }
    ));
}

#[test]
fn decode_rejects_short_input() {
    // V1 fields only, but code 5 expects the V3 shape
    let err = ConfigureRequest::decode(5, Some(&encode(&v1_json()))).unwrap_err();
    assert!(matches!(err, ConfigError::BadInput { .. }));
}

#[parameterized(
    shared_log = { 0 },
    throttle_v1 = { 1 },
    throttle_v2 = { 2 },
    throttle_v3 = { 5 },
    accelerated_flush = { 6 },
)]
fn decode_rejects_missing_input(code: u32) {
    let err = ConfigureRequest::decode(code, None).unwrap_err();
    assert!(matches!(err, ConfigError::BadInput { .. }));
}

#[test]
fn decode_queries_without_input() {
    assert_eq!(
        ConfigureRequest::decode(3, None).unwrap(),
        ConfigureRequest::QueryMemoryThrottleUsage
    );
    assert_eq!(
        ConfigureRequest::decode(4, None).unwrap(),
        ConfigureRequest::QueryDebugCounters
    );
}

#[test]
fn decode_rejects_unknown_code() {
    assert!(matches!(
        ConfigureRequest::decode(42, None),
        Err(ConfigError::UnknownCode(42))
    ));
}

#[test]
fn config_errors_become_invalid_parameter() {
    let err: LogError = ConfigError::UnknownCode(9).into();
    assert!(matches!(err, LogError::InvalidParameter(_)));
}

// =============================================================================
// TOML loading
// =============================================================================

#[test]
fn load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("overlog.toml");
    std::fs::write(
        &path,
        r#"
stream_open_gate_quanta = 2
sweep_interval = "250ms"

[memory_throttle_limits]
write_buffer_memory_pool_min = 33554432
allocation_timeout_ms = 0

[accelerated_flush_limits]
active_timer_ms = 0
"#,
    )
    .unwrap();

    let config = ManagerConfig::load(&path).unwrap();
    assert_eq!(config.stream_open_gate_quanta, 2);
    assert_eq!(config.sweep_interval, Duration::from_millis(250));
    assert_eq!(
        config.memory_throttle_limits.write_buffer_memory_pool_min,
        ByteLimit::bytes(32 * MIB)
    );
    assert_eq!(config.memory_throttle_limits.allocation_timeout_ms, 0);
    assert_eq!(config.accelerated_flush_limits.active_timer_ms, 0);
    assert_eq!(config.accelerated_flush_limits.passive_timer_ms, 15_000);
}

#[test]
fn load_rejects_invalid_values() {
    let err = ManagerConfig::from_toml_str("stream_open_gate_quanta = 0").unwrap_err();
    assert!(matches!(err, ConfigError::OutOfRange { .. }));
}

#[test]
fn load_missing_file() {
    let err = ManagerConfig::load(Path::new("/nonexistent/overlog.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}
