// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! No-op volume source for hosts without volume enumeration.

use super::{VolumeInfo, VolumeSource};
use async_trait::async_trait;
use overlog_core::LogResult;

/// Volume source that reports no volumes.
///
/// Every path then maps to the default disk and shares one stream-open gate.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpVolumeSource;

impl NoOpVolumeSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl VolumeSource for NoOpVolumeSource {
    async fn query_volume_list(&self) -> LogResult<Vec<VolumeInfo>> {
        Ok(Vec::new())
    }
}
