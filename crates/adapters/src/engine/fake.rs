// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory log engine for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{CreateLogRequest, LogEngine, LogHandle, LogLocation};
use async_trait::async_trait;
use overlog_core::{DiskId, LogError, LogId, LogResult};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Semaphore;

/// Engine entry points, for failure injection and holds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EngineOp {
    Activate,
    Deactivate,
    Create,
    Open,
    Close,
    Delete,
    QueryLogId,
    EnumerateLogs,
}

/// Recorded engine call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Activate,
    Deactivate,
    Create(CreateLogRequest),
    Open(LogLocation),
    Close(LogHandle),
    Delete(LogLocation),
    QueryLogId(PathBuf),
    EnumerateLogs(DiskId),
}

/// A container held by the fake engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeLog {
    pub disk_id: DiskId,
    pub path: Option<PathBuf>,
    pub log_size: u64,
    pub max_streams: u32,
    pub flags: u32,
}

#[derive(Default)]
struct FakeState {
    active: bool,
    logs: HashMap<LogId, FakeLog>,
    deleted: HashSet<LogId>,
    open: HashMap<LogHandle, LogId>,
    next_handle: u64,
    failures: HashMap<EngineOp, VecDeque<LogError>>,
    holds: HashMap<EngineOp, Arc<Semaphore>>,
}

/// Fake log engine for testing
#[derive(Clone, Default)]
pub struct FakeLogEngine {
    state: Arc<Mutex<FakeState>>,
    calls: Arc<Mutex<Vec<EngineCall>>>,
}

impl FakeLogEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Make the next call to `op` fail with `error`
    pub fn fail_next(&self, op: EngineOp, error: LogError) {
        self.lock().failures.entry(op).or_default().push_back(error);
    }

    /// Park every call to `op` until [`FakeLogEngine::release`]
    pub fn hold(&self, op: EngineOp) {
        self.lock().holds.insert(op, Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, op: EngineOp) {
        if let Some(hold) = self.lock().holds.remove(&op) {
            hold.close();
        }
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    pub fn get_log(&self, log_id: &LogId) -> Option<FakeLog> {
        self.lock().logs.get(log_id).cloned()
    }

    pub fn log_count(&self) -> usize {
        self.lock().logs.len()
    }

    /// Number of handles currently open
    pub fn open_handles(&self) -> usize {
        self.lock().open.len()
    }

    /// Add a container as though it already existed on disk
    pub fn insert_log(&self, log_id: LogId, log: FakeLog) {
        self.lock().logs.insert(log_id, log);
    }

    async fn enter(&self, op: EngineOp, call: EngineCall) -> LogResult<()> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);

        let hold = self.lock().holds.get(&op).cloned();
        if let Some(hold) = hold {
            // Closed on release
            let _ = hold.acquire().await;
        }

        let mut state = self.lock();
        if let Some(error) = state.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            return Err(error);
        }
        if !state.active && !matches!(op, EngineOp::Activate) {
            return Err(LogError::Engine("log engine is not active".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LogEngine for FakeLogEngine {
    async fn activate(&self) -> LogResult<()> {
        self.enter(EngineOp::Activate, EngineCall::Activate).await?;
        self.lock().active = true;
        Ok(())
    }

    async fn deactivate(&self) -> LogResult<()> {
        self.enter(EngineOp::Deactivate, EngineCall::Deactivate)
            .await?;
        self.lock().active = false;
        Ok(())
    }

    async fn create(&self, request: &CreateLogRequest) -> LogResult<()> {
        self.enter(EngineOp::Create, EngineCall::Create(request.clone()))
            .await?;

        let mut state = self.lock();
        let log_id = request.location.log_id;
        if state.logs.contains_key(&log_id) {
            return Err(LogError::AlreadyExists(log_id.to_string()));
        }
        state.deleted.remove(&log_id);
        state.logs.insert(
            log_id,
            FakeLog {
                disk_id: request.location.disk_id,
                path: request.location.path.clone(),
                log_size: request.log_size,
                max_streams: request.max_streams,
                flags: request.flags,
            },
        );
        Ok(())
    }

    async fn open(&self, location: &LogLocation) -> LogResult<LogHandle> {
        self.enter(EngineOp::Open, EngineCall::Open(location.clone()))
            .await?;

        let mut state = self.lock();
        if !state.logs.contains_key(&location.log_id) {
            return Err(LogError::NotFound(location.log_id.to_string()));
        }
        state.next_handle += 1;
        let handle = LogHandle(state.next_handle);
        state.open.insert(handle, location.log_id);
        Ok(handle)
    }

    async fn close(&self, handle: LogHandle) -> LogResult<()> {
        self.enter(EngineOp::Close, EngineCall::Close(handle)).await?;

        let mut state = self.lock();
        let Some(log_id) = state.open.remove(&handle) else {
            return Err(LogError::NotFound(handle.to_string()));
        };
        if !state.logs.contains_key(&log_id) {
            return Err(LogError::NoLongerExists(log_id.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, location: &LogLocation) -> LogResult<()> {
        self.enter(EngineOp::Delete, EngineCall::Delete(location.clone()))
            .await?;

        let mut state = self.lock();
        if state.logs.remove(&location.log_id).is_some() {
            state.deleted.insert(location.log_id);
            return Ok(());
        }
        if state.deleted.contains(&location.log_id) {
            return Err(LogError::NoLongerExists(location.log_id.to_string()));
        }
        Err(LogError::NotFound(location.log_id.to_string()))
    }

    async fn query_log_id(&self, path: &Path) -> LogResult<LogId> {
        self.enter(EngineOp::QueryLogId, EngineCall::QueryLogId(path.to_path_buf()))
            .await?;

        let state = self.lock();
        state
            .logs
            .iter()
            .find(|(_, log)| log.path.as_deref() == Some(path))
            .map(|(id, _)| *id)
            .ok_or_else(|| LogError::NotFound(path.display().to_string()))
    }

    async fn enumerate_logs(&self, disk_id: DiskId) -> LogResult<Vec<LogId>> {
        self.enter(EngineOp::EnumerateLogs, EngineCall::EnumerateLogs(disk_id))
            .await?;

        let state = self.lock();
        let mut ids: Vec<LogId> = state
            .logs
            .iter()
            .filter(|(_, log)| log.disk_id == disk_id)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
