// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake volume source for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{VolumeInfo, VolumeSource};
use async_trait::async_trait;
use overlog_core::{DiskId, LogError, LogResult};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct FakeVolumes {
    volumes: Vec<VolumeInfo>,
    fail: bool,
    queries: usize,
}

/// Fake volume source for testing
#[derive(Clone, Default)]
pub struct FakeVolumeSource {
    inner: Arc<Mutex<FakeVolumes>>,
}

impl FakeVolumeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a volume mounted at `mount_point`
    pub fn add_volume(&self, disk_id: DiskId, mount_point: impl Into<PathBuf>) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .volumes
            .push(VolumeInfo {
                disk_id,
                mount_point: mount_point.into(),
            });
    }

    /// Make every query fail
    pub fn set_failing(&self, fail: bool) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).fail = fail;
    }

    pub fn query_count(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).queries
    }
}

#[async_trait]
impl VolumeSource for FakeVolumeSource {
    async fn query_volume_list(&self) -> LogResult<Vec<VolumeInfo>> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.queries += 1;
        if inner.fail {
            return Err(LogError::Engine("volume enumeration unavailable".to_string()));
        }
        Ok(inner.volumes.clone())
    }
}
