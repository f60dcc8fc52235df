// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced adapter wrappers for consistent observability

use crate::engine::{CreateLogRequest, LogEngine, LogHandle, LogLocation};
use crate::volume::{VolumeInfo, VolumeSource};
use async_trait::async_trait;
use overlog_core::{DiskId, LogId, LogResult};
use std::path::Path;
use tracing::Instrument;

/// Wrapper that adds tracing to any LogEngine
#[derive(Clone)]
pub struct TracedLogEngine<E> {
    inner: E,
}

impl<E> TracedLogEngine<E> {
    pub fn new(inner: E) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }
}

#[async_trait]
impl<E: LogEngine> LogEngine for TracedLogEngine<E> {
    async fn activate(&self) -> LogResult<()> {
        let span = tracing::info_span!("engine.activate");
        async {
            let result = self.inner.activate().await;
            match &result {
                Ok(()) => tracing::info!("log engine activated"),
                Err(e) => tracing::error!(error = %e, "activation failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn deactivate(&self) -> LogResult<()> {
        let span = tracing::info_span!("engine.deactivate");
        async {
            let result = self.inner.deactivate().await;
            match &result {
                Ok(()) => tracing::info!("log engine deactivated"),
                Err(e) => tracing::warn!(error = %e, "deactivation failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn create(&self, request: &CreateLogRequest) -> LogResult<()> {
        let span = tracing::info_span!(
            "engine.create",
            disk_id = %request.location.disk_id,
            log_id = %request.location.log_id,
        );
        async {
            tracing::info!(
                path = ?request.location.path,
                log_type = %request.log_type,
                log_size = request.log_size,
                max_streams = request.max_streams,
                flags = request.flags,
                "creating"
            );

            let start = std::time::Instant::now();
            let result = self.inner.create(request).await;
            let elapsed = start.elapsed();

            match &result {
                Ok(()) => tracing::info!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    "container created"
                ),
                Err(e) => tracing::error!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %e,
                    "create failed"
                ),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn open(&self, location: &LogLocation) -> LogResult<LogHandle> {
        let span = tracing::info_span!(
            "engine.open",
            disk_id = %location.disk_id,
            log_id = %location.log_id,
        );
        async {
            let start = std::time::Instant::now();
            let result = self.inner.open(location).await;
            let elapsed = start.elapsed();

            match &result {
                Ok(handle) => tracing::info!(
                    %handle,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "container opened"
                ),
                Err(e) => tracing::error!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %e,
                    "open failed"
                ),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn close(&self, handle: LogHandle) -> LogResult<()> {
        let span = tracing::info_span!("engine.close", %handle);
        async {
            let result = self.inner.close(handle).await;
            // A container deleted while open is an expected race
            match &result {
                Ok(()) => tracing::info!("container closed"),
                Err(e) if e.is_no_longer_exists() => {
                    tracing::warn!(error = %e, "close after delete")
                }
                Err(e) => tracing::error!(error = %e, "close failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn delete(&self, location: &LogLocation) -> LogResult<()> {
        let span = tracing::info_span!(
            "engine.delete",
            disk_id = %location.disk_id,
            log_id = %location.log_id,
        );
        async {
            let result = self.inner.delete(location).await;
            match &result {
                Ok(()) => tracing::info!("container deleted"),
                Err(e) => tracing::warn!(error = %e, "delete failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn query_log_id(&self, path: &Path) -> LogResult<LogId> {
        let result = self.inner.query_log_id(path).await;
        tracing::debug!(
            path = %path.display(),
            log_id = ?result.as_ref().ok(),
            "queried log id"
        );
        result
    }

    async fn enumerate_logs(&self, disk_id: DiskId) -> LogResult<Vec<LogId>> {
        let result = self.inner.enumerate_logs(disk_id).await;
        tracing::debug!(
            %disk_id,
            count = result.as_ref().map(|v| v.len()).ok(),
            "enumerated logs"
        );
        result
    }
}

/// Wrapper that adds tracing to any VolumeSource
#[derive(Clone)]
pub struct TracedVolumeSource<V> {
    inner: V,
}

impl<V> TracedVolumeSource<V> {
    pub fn new(inner: V) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<V: VolumeSource> VolumeSource for TracedVolumeSource<V> {
    async fn query_volume_list(&self) -> LogResult<Vec<VolumeInfo>> {
        let start = std::time::Instant::now();
        let result = self.inner.query_volume_list().await;
        let elapsed = start.elapsed();

        match &result {
            Ok(volumes) => tracing::info!(
                count = volumes.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "volume list queried"
            ),
            Err(e) => tracing::warn!(error = %e, "volume list unavailable"),
        }
        result
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
