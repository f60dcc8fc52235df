// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Overlay container: the manager's view of one physical log container
//!
//! Sub-operations against a container are serialized through its work
//! queue. Once the queue is deactivated every further sub-operation fails
//! with `NoLongerExists`.

use overlog_adapters::{CreateLogRequest, LogEngine, LogHandle, LogLocation};
use overlog_core::{LogError, LogResult, RegistryKey};
use tokio::sync::Mutex;

struct ContainerState {
    active: bool,
    handle: Option<LogHandle>,
    open_count: usize,
    deleted: bool,
}

/// Shared handle to a physical container, owned by the registry
pub struct OverlayContainer<E> {
    key: RegistryKey,
    engine: E,
    queue: Mutex<ContainerState>,
}

impl<E: LogEngine> OverlayContainer<E> {
    pub fn new(key: RegistryKey, engine: E) -> Self {
        Self {
            key,
            engine,
            queue: Mutex::new(ContainerState {
                active: true,
                handle: None,
                open_count: 0,
                deleted: false,
            }),
        }
    }

    pub fn key(&self) -> RegistryKey {
        self.key
    }

    async fn enter(&self) -> LogResult<tokio::sync::MutexGuard<'_, ContainerState>> {
        let state = self.queue.lock().await;
        if !state.active {
            return Err(LogError::NoLongerExists(self.key.to_string()));
        }
        Ok(state)
    }

    pub async fn create(&self, request: &CreateLogRequest) -> LogResult<()> {
        let _state = self.enter().await?;
        self.engine.create(request).await
    }

    /// Open the container, or share the handle if it is already open
    pub async fn open(&self, location: &LogLocation) -> LogResult<LogHandle> {
        let mut state = self.enter().await?;
        if let Some(handle) = state.handle.filter(|_| state.open_count > 0) {
            state.open_count += 1;
            return Ok(handle);
        }
        let handle = self.engine.open(location).await?;
        state.handle = Some(handle);
        state.open_count = 1;
        state.deleted = false;
        Ok(handle)
    }

    /// Drop one opener; the engine handle is closed with the last one
    pub async fn close(&self) -> LogResult<()> {
        let mut state = self.enter().await?;
        if state.open_count == 0 {
            return Err(LogError::NotFound(format!("{} is not open", self.key)));
        }
        state.open_count -= 1;
        if state.open_count > 0 {
            return Ok(());
        }
        let Some(handle) = state.handle.take() else {
            return Ok(());
        };
        self.engine.close(handle).await
    }

    pub async fn delete(&self, location: &LogLocation) -> LogResult<()> {
        let mut state = self.enter().await?;
        let result = self.engine.delete(location).await;
        if result.is_ok() || result.as_ref().is_err_and(LogError::is_no_longer_exists) {
            state.deleted = true;
        }
        result
    }

    /// Force-close regardless of how many openers remain
    pub async fn shutdown(&self) -> LogResult<()> {
        let mut state = self.enter().await?;
        state.open_count = 0;
        let Some(handle) = state.handle.take() else {
            return Ok(());
        };
        match self.engine.close(handle).await {
            Err(e) if e.is_no_longer_exists() => Ok(()),
            other => other,
        }
    }

    /// Wait for in-flight sub-operations, then refuse new ones
    pub async fn deactivate_queue(&self) {
        let mut state = self.queue.lock().await;
        state.active = false;
        tracing::debug!(key = %self.key, deleted = state.deleted, "container queue deactivated");
    }

    pub async fn is_active(&self) -> bool {
        self.queue.lock().await.active
    }

    pub async fn open_count(&self) -> usize {
        self.queue.lock().await.open_count
    }
}

#[cfg(test)]
#[path = "container_tests.rs"]
mod tests;
