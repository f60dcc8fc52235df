// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use overlog_adapters::{EngineCall, EngineOp, FakeLogEngine, FakeVolumeSource};
use overlog_core::{
    ByteLimit, FakeClock, MemoryThrottleLimits, SharedLogContainerSettings, ThrottleLimitsVersion,
};

const MIB: u64 = 1024 * 1024;

type TestManager = OverlayManager<FakeLogEngine, FakeVolumeSource, FakeClock>;

fn setup_with(config: ManagerConfig) -> (TestManager, FakeLogEngine, FakeVolumeSource) {
    let engine = FakeLogEngine::new();
    let volumes = FakeVolumeSource::new();
    let manager = OverlayManager::new(
        ManagerDeps {
            engine: engine.clone(),
            volumes: volumes.clone(),
        },
        FakeClock::new(),
        config,
    )
    .unwrap();
    (manager, engine, volumes)
}

fn setup() -> (TestManager, FakeLogEngine, FakeVolumeSource) {
    setup_with(ManagerConfig::default())
}

fn request_at(disk_id: DiskId, path: Option<&str>, log_id: LogId) -> CreateLogRequest {
    CreateLogRequest {
        location: LogLocation {
            disk_id,
            path: path.map(PathBuf::from),
            log_id,
        },
        log_type: "overlay".to_string(),
        max_record_size: 0,
        max_streams: 0,
        log_size: 1 << 30,
        flags: 0,
    }
}

fn created(engine: &FakeLogEngine) -> Vec<CreateLogRequest> {
    engine
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            EngineCall::Create(request) => Some(request),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn open_activates_engine_and_admits_requests() {
    let (manager, engine, volumes) = setup();
    assert_eq!(manager.state(), ManagerLifecycleState::Created);
    assert!(matches!(
        manager.enumerate_logs(DiskId::new()).await,
        Err(LogError::NotOpen)
    ));

    manager.open().await.unwrap();

    assert_eq!(manager.state(), ManagerLifecycleState::Opened);
    assert!(engine.is_active());
    assert_eq!(volumes.query_count(), 1);
    assert!(manager.allocator().is_ok());
    assert!(manager.enumerate_logs(DiskId::new()).await.unwrap().is_empty());
}

#[tokio::test]
async fn open_twice_is_rejected() {
    let (manager, _, _) = setup();
    manager.open().await.unwrap();
    assert!(matches!(
        manager.open().await,
        Err(LogError::InvalidParameter(_))
    ));
    assert_eq!(manager.state(), ManagerLifecycleState::Opened);
}

#[tokio::test]
async fn volume_enumeration_failure_does_not_fail_open() {
    let (manager, _, volumes) = setup();
    volumes.set_failing(true);

    manager.open().await.unwrap();

    assert_eq!(manager.state(), ManagerLifecycleState::Opened);
    assert_eq!(
        manager.map_path_to_disk_id(Path::new("/data/x.log")).unwrap(),
        DiskId::DEFAULT
    );
}

#[tokio::test]
async fn engine_activation_failure_completes_with_error() {
    let (manager, engine, _) = setup();
    engine.fail_next(EngineOp::Activate, LogError::Engine("no device".into()));

    assert!(manager.open().await.is_err());
    assert_eq!(manager.state(), ManagerLifecycleState::CompletedWithError);
    assert!(manager.allocator().unwrap().is_shutting_down());
    assert!(matches!(
        manager.query_log_id("/data/x.log").await,
        Err(LogError::NotOpen)
    ));
}

#[tokio::test]
async fn close_before_open_is_not_open() {
    let (manager, _, _) = setup();
    assert!(matches!(manager.close().await, Err(LogError::NotOpen)));
}

#[tokio::test]
async fn longest_mount_point_wins() {
    let (manager, _, volumes) = setup();
    let root = DiskId::new();
    let data = DiskId::new();
    volumes.add_volume(root, "/");
    volumes.add_volume(data, "/data");
    manager.open().await.unwrap();

    assert_eq!(
        manager.map_path_to_disk_id(Path::new("/data/logs/a.log")).unwrap(),
        data
    );
    assert_eq!(
        manager.map_path_to_disk_id(Path::new("/database/a.log")).unwrap(),
        root
    );
    assert!(matches!(
        manager.map_path_to_disk_id(Path::new("logs/a.log")),
        Err(LogError::PathInvalid(_))
    ));
}

#[tokio::test]
async fn create_resolves_disk_from_path_and_defaults_streams() {
    let (manager, engine, volumes) = setup();
    let data = DiskId::new();
    volumes.add_volume(data, "/data");
    manager.open().await.unwrap();

    let log_id = LogId::new();
    let log = manager
        .create_log(request_at(DiskId::NIL, Some("/data/a.log"), log_id))
        .await
        .unwrap();

    assert_eq!(log.disk_id(), data);
    let requests = created(&engine);
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].location.disk_id, data);
    assert_eq!(requests[0].max_streams, DEFAULT_MAX_STREAMS);
}

#[tokio::test]
async fn default_shared_log_maps_to_configured_container() {
    let (manager, engine, volumes) = setup();
    let data = DiskId::new();
    volumes.add_volume(data, "/data");
    manager.open().await.unwrap();

    let container_id = LogId::new();
    manager
        .configure(ConfigureRequest::SharedLogContainerSettings(
            SharedLogContainerSettings {
                path: Some(PathBuf::from("/data/shared.log")),
                log_container_id: Some(container_id),
                log_size: 1024 * MIB,
                maximum_number_streams: 4096,
                ..Default::default()
            },
        ))
        .unwrap();

    let log = manager
        .create_log(request_at(DiskId::new(), None, LogId::DEFAULT_SHARED))
        .await
        .unwrap();

    assert_eq!(log.log_id(), container_id);
    assert_eq!(log.disk_id(), data);
    assert_eq!(log.path(), Some(Path::new("/data/shared.log")));
    let request = &created(&engine)[0];
    assert_eq!(request.log_size, 1024 * MIB);
    assert_eq!(request.max_streams, 4096);
}

#[tokio::test]
async fn default_shared_log_without_container_keeps_its_location() {
    let (manager, engine, _) = setup();
    manager.open().await.unwrap();
    let disk = DiskId::new();

    let log = manager
        .create_log(request_at(disk, None, LogId::DEFAULT_SHARED))
        .await
        .unwrap();

    assert_eq!(log.log_id(), LogId::DEFAULT_SHARED);
    assert_eq!(log.disk_id(), disk);
    let request = &created(&engine)[0];
    assert_eq!(request.log_size, SharedLogContainerSettings::DEFAULT_LOG_SIZE);
    assert_eq!(
        request.max_streams,
        SharedLogContainerSettings::DEFAULT_MAXIMUM_NUMBER_STREAMS
    );
}

#[tokio::test]
async fn shared_settings_with_relative_path_are_rejected() {
    let (manager, _, _) = setup();
    manager.open().await.unwrap();
    let before = manager.config().shared_log_settings;

    let result = manager.configure(ConfigureRequest::SharedLogContainerSettings(
        SharedLogContainerSettings {
            path: Some(PathBuf::from("shared.log")),
            log_container_id: Some(LogId::new()),
            ..Default::default()
        },
    ));

    assert!(matches!(result, Err(LogError::InvalidParameter(_))));
    assert_eq!(manager.config().shared_log_settings, before);
}

#[tokio::test]
async fn throttle_limits_reach_the_allocator() {
    let (manager, _, _) = setup();
    manager.open().await.unwrap();

    let limits = MemoryThrottleLimits {
        write_buffer_memory_pool_min: ByteLimit::bytes(32 * MIB),
        write_buffer_memory_pool_max: ByteLimit::bytes(64 * MIB),
        ..Default::default()
    };
    manager
        .configure(ConfigureRequest::MemoryThrottleLimits {
            limits,
            version: ThrottleLimitsVersion::V3,
        })
        .unwrap();

    let allocator = manager.allocator().unwrap();
    assert_eq!(allocator.total_limit(), ByteLimit::bytes(32 * MIB));
    assert_eq!(manager.add_to_limit().unwrap(), MIB);
    assert_eq!(allocator.total_limit(), ByteLimit::bytes(33 * MIB));
    manager.remove_from_limit(MIB).unwrap();
    assert_eq!(allocator.total_limit(), ByteLimit::bytes(32 * MIB));

    let ConfigureOutput::Usage(usage) = manager
        .configure(ConfigureRequest::QueryMemoryThrottleUsage)
        .unwrap()
    else {
        panic!("expected usage");
    };
    assert_eq!(usage.total_allocation_limit, ByteLimit::bytes(32 * MIB));
    assert_eq!(usage.current_allocations, 0);
    assert!(!usage.is_under_memory_pressure);
    assert_eq!(
        usage.configured_limits.write_buffer_memory_pool_max,
        ByteLimit::bytes(64 * MIB)
    );
}

#[tokio::test]
async fn invalid_throttle_limits_change_nothing() {
    let (manager, _, _) = setup();
    manager.open().await.unwrap();
    let before = manager.allocator().unwrap().total_limit();
    let configured = manager.config().memory_throttle_limits;

    let limits = MemoryThrottleLimits {
        write_buffer_memory_pool_min: ByteLimit::bytes(64 * MIB),
        write_buffer_memory_pool_max: ByteLimit::bytes(32 * MIB),
        ..Default::default()
    };
    let result = manager.configure(ConfigureRequest::MemoryThrottleLimits {
        limits,
        version: ThrottleLimitsVersion::V3,
    });

    assert!(matches!(result, Err(LogError::InvalidParameter(_))));
    assert_eq!(manager.allocator().unwrap().total_limit(), before);
    assert_eq!(manager.config().memory_throttle_limits, configured);
}

#[tokio::test]
async fn raw_configure_decodes_and_serves_debug_counters() {
    let (manager, _, _) = setup();
    manager.open().await.unwrap();

    let output = manager.configure_raw(4, None).unwrap();
    assert!(matches!(
        output,
        ConfigureOutput::Debug(counters) if counters.allocation_timeouts == 0
    ));

    assert!(matches!(
        manager.configure_raw(1, None),
        Err(LogError::InvalidParameter(_))
    ));

    let v1 = serde_json::json!({
        "write_buffer_memory_pool_max": -1,
        "write_buffer_memory_pool_min": 64 * MIB,
        "write_buffer_memory_pool_per_stream": MIB,
        "pinned_memory_limit": -1,
        "periodic_flush_time_secs": 60,
        "periodic_timer_interval_secs": 10,
        "allocation_timeout_ms": 0,
    });
    let input = serde_json::to_vec(&v1).unwrap();
    manager.configure_raw(1, Some(&input)).unwrap();
    assert_eq!(
        manager.allocator().unwrap().total_limit(),
        ByteLimit::bytes(64 * MIB)
    );
    assert_eq!(
        manager.config().memory_throttle_limits.maximum_destaging_write_outstanding,
        ByteLimit::NO_LIMIT
    );
    assert!(matches!(
        manager.configure_raw(99, None),
        Err(LogError::InvalidParameter(_))
    ));
}

#[tokio::test]
async fn stream_open_gate_admits_one_at_a_time() {
    let (manager, _, _) = setup();
    manager.open().await.unwrap();
    let manager = Arc::new(manager);
    let disk = DiskId::new();

    let first = manager
        .wait_for_stream_open_gate(disk, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(manager.gate_count(), 1);

    let waiting = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager
                .wait_for_stream_open_gate(disk, &CancellationToken::new())
                .await
        })
    };
    tokio::task::yield_now().await;
    assert!(!waiting.is_finished());

    drop(first);
    let second = waiting.await.unwrap().unwrap();
    assert_eq!(second.disk_id(), disk);
}

#[tokio::test]
async fn cancelled_gate_wait_leaves_no_waiter() {
    let (manager, _, _) = setup();
    manager.open().await.unwrap();
    let disk = DiskId::new();
    let _held = manager
        .wait_for_stream_open_gate(disk, &CancellationToken::new())
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = manager.wait_for_stream_open_gate(disk, &cancel).await;

    assert!(matches!(result, Err(LogError::Cancelled)));
    assert_eq!(manager.gates.find(&disk).unwrap().waiter_count(), 0);
}

#[tokio::test]
async fn close_fails_gate_waiters_and_empties_tables() {
    let (manager, engine, _) = setup();
    manager.open().await.unwrap();
    let manager = Arc::new(manager);
    let disk = DiskId::new();
    let held = manager
        .wait_for_stream_open_gate(disk, &CancellationToken::new())
        .await
        .unwrap();

    let waiting = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager
                .wait_for_stream_open_gate(disk, &CancellationToken::new())
                .await
        })
    };
    while manager.gates.find(&disk).map_or(0, |g| g.waiter_count()) == 0 {
        tokio::task::yield_now().await;
    }

    let _log = manager
        .create_log(request_at(disk, None, LogId::new()))
        .await
        .unwrap();
    manager.close().await.unwrap();

    assert!(matches!(
        waiting.await.unwrap(),
        Err(LogError::GateDeactivated)
    ));
    drop(held);
    assert_eq!(manager.state(), ManagerLifecycleState::Completed);
    assert_eq!(manager.gate_count(), 0);
    assert_eq!(manager.container_count(), 0);
    assert_eq!(engine.open_handles(), 0);
    assert!(!engine.is_active());
    assert!(manager.allocator().unwrap().is_shutting_down());
}

#[tokio::test]
async fn close_waits_for_in_flight_operations() {
    let (manager, engine, _) = setup();
    manager.open().await.unwrap();
    let manager = Arc::new(manager);
    engine.hold(EngineOp::Create);

    let creating = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager
                .create_log(request_at(DiskId::new(), None, LogId::new()))
                .await
                .map(|log| log.log_id())
        })
    };
    while manager.active_requests() == 0 {
        tokio::task::yield_now().await;
    }

    let closing = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.close().await })
    };
    tokio::task::yield_now().await;
    assert!(!closing.is_finished());
    assert_eq!(manager.state(), ManagerLifecycleState::CloseInitial);

    engine.release(EngineOp::Create);
    creating.await.unwrap().unwrap();
    closing.await.unwrap().unwrap();

    assert_eq!(manager.container_count(), 0);
    assert_eq!(engine.open_handles(), 0);
}

#[tokio::test]
async fn engine_deactivation_failure_completes_with_error() {
    let (manager, engine, _) = setup();
    manager.open().await.unwrap();
    engine.fail_next(EngineOp::Deactivate, LogError::Engine("busy".into()));

    assert!(manager.close().await.is_err());
    assert_eq!(manager.state(), ManagerLifecycleState::CompletedWithError);
}

#[test]
fn invalid_config_is_rejected_at_construction() {
    let config = ManagerConfig {
        stream_open_gate_quanta: 0,
        ..Default::default()
    };
    let result = OverlayManager::new(
        ManagerDeps {
            engine: FakeLogEngine::new(),
            volumes: FakeVolumeSource::new(),
        },
        FakeClock::new(),
        config,
    );
    assert!(matches!(result, Err(LogError::InvalidParameter(_))));
}
