// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host volume enumeration adapters

mod mounts;
mod noop;

pub use mounts::MountTableVolumes;
pub use noop::NoOpVolumeSource;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeVolumeSource;

use async_trait::async_trait;
use overlog_core::{DiskId, LogResult};
use std::path::PathBuf;

/// A mounted volume
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VolumeInfo {
    pub disk_id: DiskId,
    pub mount_point: PathBuf,
}

/// Source of the host's volume list, used to map paths to disks
#[async_trait]
pub trait VolumeSource: Clone + Send + Sync + 'static {
    async fn query_volume_list(&self) -> LogResult<Vec<VolumeInfo>>;
}
