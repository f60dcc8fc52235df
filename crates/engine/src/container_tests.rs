// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use overlog_adapters::{EngineCall, EngineOp, FakeLogEngine};
use overlog_core::{DiskId, LogId};
use std::path::PathBuf;

async fn setup() -> (OverlayContainer<FakeLogEngine>, FakeLogEngine, LogLocation) {
    let engine = FakeLogEngine::new();
    engine.activate().await.unwrap();
    let location = LogLocation {
        disk_id: DiskId::new(),
        path: Some(PathBuf::from("/logs/c.log")),
        log_id: LogId::new(),
    };
    let key = RegistryKey::new(location.disk_id, location.log_id);
    let container = OverlayContainer::new(key, engine.clone());
    container
        .create(&CreateLogRequest {
            location: location.clone(),
            log_type: String::new(),
            max_record_size: 0,
            max_streams: 8,
            log_size: 1 << 30,
            flags: 0,
        })
        .await
        .unwrap();
    (container, engine, location)
}

#[tokio::test]
async fn second_open_shares_the_engine_handle() {
    let (container, engine, location) = setup().await;

    let a = container.open(&location).await.unwrap();
    let b = container.open(&location).await.unwrap();
    assert_eq!(a, b);
    assert_eq!(container.open_count().await, 2);
    assert_eq!(engine.open_handles(), 1);

    container.close().await.unwrap();
    assert_eq!(engine.open_handles(), 1);
    container.close().await.unwrap();
    assert_eq!(engine.open_handles(), 0);
}

#[tokio::test]
async fn close_without_open_is_not_found() {
    let (container, _, _) = setup().await;
    assert!(matches!(container.close().await, Err(LogError::NotFound(_))));
}

#[tokio::test]
async fn close_after_delete_reports_no_longer_exists() {
    let (container, _, location) = setup().await;
    container.open(&location).await.unwrap();
    container.delete(&location).await.unwrap();

    assert!(matches!(
        container.close().await,
        Err(LogError::NoLongerExists(_))
    ));
}

#[tokio::test]
async fn shutdown_closes_all_openers() {
    let (container, engine, location) = setup().await;
    container.open(&location).await.unwrap();
    container.open(&location).await.unwrap();

    container.shutdown().await.unwrap();
    assert_eq!(container.open_count().await, 0);
    assert_eq!(engine.open_handles(), 0);

    // Nothing left to close
    container.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_tolerates_deleted_container() {
    let (container, _, location) = setup().await;
    container.open(&location).await.unwrap();
    container.delete(&location).await.unwrap();
    container.shutdown().await.unwrap();
}

#[tokio::test]
async fn deactivated_queue_rejects_work() {
    let (container, engine, location) = setup().await;
    container.deactivate_queue().await;

    assert!(!container.is_active().await);
    assert!(matches!(
        container.open(&location).await,
        Err(LogError::NoLongerExists(_))
    ));
    assert!(!engine
        .calls()
        .iter()
        .any(|c| matches!(c, EngineCall::Open(_))));
}

#[tokio::test]
async fn deactivation_waits_for_in_flight_work() {
    let (container, engine, location) = setup().await;
    let container = std::sync::Arc::new(container);
    engine.hold(EngineOp::Open);

    let opening = {
        let container = std::sync::Arc::clone(&container);
        let location = location.clone();
        tokio::spawn(async move { container.open(&location).await })
    };
    while !engine.calls().iter().any(|c| matches!(c, EngineCall::Open(_))) {
        tokio::task::yield_now().await;
    }

    let deactivating = {
        let container = std::sync::Arc::clone(&container);
        tokio::spawn(async move { container.deactivate_queue().await })
    };
    tokio::task::yield_now().await;
    assert!(!deactivating.is_finished());

    engine.release(EngineOp::Open);
    opening.await.unwrap().unwrap();
    deactivating.await.unwrap();
    assert!(!container.is_active().await);
}
