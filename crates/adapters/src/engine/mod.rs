// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Physical log engine adapters

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{EngineCall, EngineOp, FakeLog, FakeLogEngine};

use async_trait::async_trait;
use overlog_core::{DiskId, LogId, LogResult};
use std::fmt;
use std::path::{Path, PathBuf};

/// Engine-assigned handle of an open physical container
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LogHandle(pub u64);

impl fmt::Display for LogHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a physical container lives
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogLocation {
    pub disk_id: DiskId,
    /// Explicit file path; `None` places the container on the disk's default location
    pub path: Option<PathBuf>,
    pub log_id: LogId,
}

/// Parameters of a physical container creation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateLogRequest {
    pub location: LogLocation,
    pub log_type: String,
    pub max_record_size: u32,
    pub max_streams: u32,
    pub log_size: u64,
    pub flags: u32,
}

/// The on-disk log engine the overlay manager drives
#[async_trait]
pub trait LogEngine: Clone + Send + Sync + 'static {
    /// Bring the engine up; called once while the manager opens
    async fn activate(&self) -> LogResult<()>;

    /// Take the engine down; called last while the manager closes
    async fn deactivate(&self) -> LogResult<()>;

    /// Create a physical container; it must be opened before use
    async fn create(&self, request: &CreateLogRequest) -> LogResult<()>;

    async fn open(&self, location: &LogLocation) -> LogResult<LogHandle>;

    /// Close an open container; `NoLongerExists` if it was deleted meanwhile
    async fn close(&self, handle: LogHandle) -> LogResult<()>;

    async fn delete(&self, location: &LogLocation) -> LogResult<()>;

    /// Resolve a container path to its id
    async fn query_log_id(&self, path: &Path) -> LogResult<LogId>;

    /// Ids of every container on a disk
    async fn enumerate_logs(&self, disk_id: DiskId) -> LogResult<Vec<LogId>>;
}
