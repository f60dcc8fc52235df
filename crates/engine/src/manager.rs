// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Overlay log manager: the facade over containers, gates and the buffer pool

use crate::ops::{
    apply_configure, CloseLogOperation, ContainerContext, CreateLogOperation, DeleteLogOperation,
    EnumerateLogsOperation, OpenLogOperation, OverlayLog, QueryLogIdOperation,
};
use overlog_adapters::{CreateLogRequest, LogEngine, LogLocation, VolumeInfo, VolumeSource};
use overlog_core::{
    Clock, ConfigureOutput, ConfigureRequest, DiskId, GatePermit, GateTable, LogError, LogId,
    LogResult, ManagerConfig, ThrottledAllocator,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Stream count of a created container when the request leaves it at 0
pub const DEFAULT_MAX_STREAMS: u32 = 1024;

/// Collaborators the manager drives
pub struct ManagerDeps<E, V> {
    pub engine: E,
    pub volumes: V,
}

/// Lifecycle of the manager itself
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManagerLifecycleState {
    Created,
    OpenAttempted,
    Opened,
    CloseInitial,
    /// Gate deactivations still outstanding
    WaitForGateDeactivation(usize),
    CloseContainers,
    DeactivateBaseLog,
    CloseCleanup,
    Completed,
    CompletedWithError,
}

/// Owns the open containers, the per-disk gates and the write buffer pool
pub struct OverlayManager<E: LogEngine, V: VolumeSource, C: Clock> {
    context: Arc<ContainerContext<E>>,
    volume_source: V,
    clock: C,
    gates: GateTable,
    gate_events: tokio::sync::Mutex<mpsc::UnboundedReceiver<DiskId>>,
    allocator: OnceLock<ThrottledAllocator<C>>,
    settings: Mutex<ManagerConfig>,
    volumes: Mutex<Vec<VolumeInfo>>,
    lifecycle: Mutex<ManagerLifecycleState>,
}

impl<E, V, C> OverlayManager<E, V, C>
where
    E: LogEngine,
    V: VolumeSource,
    C: Clock,
{
    /// Create a manager; nothing is started until [`OverlayManager::open`]
    pub fn new(deps: ManagerDeps<E, V>, clock: C, mut config: ManagerConfig) -> LogResult<Self> {
        config.validate()?;
        let (tx, rx) = mpsc::unbounded_channel();
        Ok(Self {
            context: Arc::new(ContainerContext::new(deps.engine)),
            volume_source: deps.volumes,
            clock,
            gates: GateTable::new(u64::from(config.stream_open_gate_quanta), tx),
            gate_events: tokio::sync::Mutex::new(rx),
            allocator: OnceLock::new(),
            settings: Mutex::new(config),
            volumes: Mutex::new(Vec::new()),
            lifecycle: Mutex::new(ManagerLifecycleState::Created),
        })
    }

    pub fn state(&self) -> ManagerLifecycleState {
        *lock(&self.lifecycle)
    }

    fn transition(&self, next: ManagerLifecycleState) {
        let mut state = lock(&self.lifecycle);
        tracing::debug!(from = ?*state, to = ?next, "manager state");
        *state = next;
    }

    /// Expect `expected` and move to `next` in one step
    fn advance_from(
        &self,
        expected: ManagerLifecycleState,
        next: ManagerLifecycleState,
    ) -> LogResult<()> {
        let mut state = lock(&self.lifecycle);
        if *state != expected {
            return Err(match *state {
                ManagerLifecycleState::Created => LogError::NotOpen,
                other => LogError::InvalidParameter(format!("log manager is {other:?}")),
            });
        }
        tracing::debug!(from = ?expected, to = ?next, "manager state");
        *state = next;
        Ok(())
    }

    /// Start the allocator and the engine and begin admitting requests
    pub async fn open(&self) -> LogResult<()> {
        self.advance_from(
            ManagerLifecycleState::Created,
            ManagerLifecycleState::OpenAttempted,
        )?;
        self.run_open()
            .instrument(tracing::info_span!("manager.open"))
            .await
    }

    async fn run_open(&self) -> LogResult<()> {
        let config = self.settings().clone();
        let allocator = self.allocator.get_or_init(|| {
            ThrottledAllocator::new(
                self.clock.clone(),
                &config.memory_throttle_limits,
                config.sweep_interval,
            )
        });

        if let Err(e) = self.context.engine.activate().await {
            tracing::error!(error = %e, "log engine failed to activate");
            allocator.shutdown().await;
            self.transition(ManagerLifecycleState::CompletedWithError);
            return Err(e);
        }

        // An empty volume list only coarsens disk id resolution
        match self.volume_source.query_volume_list().await {
            Ok(volumes) => *lock(&self.volumes) = volumes,
            Err(e) => tracing::warn!(error = %e, "volume list unavailable, paths map to the default disk"),
        }

        self.context.refs.open();
        self.transition(ManagerLifecycleState::Opened);
        tracing::info!(
            pool_min = config.memory_throttle_limits.write_buffer_memory_pool_min.raw(),
            pool_max = config.memory_throttle_limits.write_buffer_memory_pool_max.raw(),
            "log manager opened"
        );
        Ok(())
    }

    /// Stop admitting requests, wait for in-flight ones, then tear down
    /// gates, containers and the engine in that order
    pub async fn close(&self) -> LogResult<()> {
        self.advance_from(
            ManagerLifecycleState::Opened,
            ManagerLifecycleState::CloseInitial,
        )?;
        self.close_sequence()
            .instrument(tracing::info_span!("manager.close"))
            .await
    }

    async fn close_sequence(&self) -> LogResult<()> {
        self.context.refs.close_and_drain().await;

        match self.run_close().await {
            Ok(()) => {
                self.transition(ManagerLifecycleState::Completed);
                tracing::info!("log manager closed");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, state = ?self.state(), "log manager close failed");
                self.transition(ManagerLifecycleState::CompletedWithError);
                Err(e)
            }
        }
    }

    async fn run_close(&self) -> LogResult<()> {
        if let Some(allocator) = self.allocator.get() {
            allocator.shutdown().await;
        }

        let mut outstanding = self.gates.deactivate_all();
        if outstanding > 0 {
            self.transition(ManagerLifecycleState::WaitForGateDeactivation(outstanding));
            let mut events = self.gate_events.lock().await;
            while outstanding > 0 {
                let Some(disk_id) = events.recv().await else {
                    break;
                };
                outstanding -= 1;
                tracing::debug!(%disk_id, outstanding, "quota gate deactivated");
                self.transition(ManagerLifecycleState::WaitForGateDeactivation(outstanding));
            }
        }

        self.transition(ManagerLifecycleState::CloseContainers);
        while let Some((key, container)) = self.context.registry.get_first() {
            tracing::info!(%key, "force closing container");
            container.shutdown().await?;
            while !self.context.release(&container) {}
            container.deactivate_queue().await;
        }
        self.context.engine.deactivate().await?;

        self.transition(ManagerLifecycleState::DeactivateBaseLog);
        self.transition(ManagerLifecycleState::CloseCleanup);
        Ok(())
    }

    fn settings(&self) -> MutexGuard<'_, ManagerConfig> {
        lock(&self.settings)
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> ManagerConfig {
        self.settings().clone()
    }

    /// The write buffer pool; exists once the manager has been opened
    pub fn allocator(&self) -> LogResult<&ThrottledAllocator<C>> {
        self.allocator.get().ok_or(LogError::NotOpen)
    }

    /// Grow the pool ceiling for a starting stream; returns the increment
    pub fn add_to_limit(&self) -> LogResult<u64> {
        Ok(self.allocator()?.add_to_limit())
    }

    /// Shrink the pool ceiling for a stopping stream
    pub fn remove_from_limit(&self, amount: u64) -> LogResult<()> {
        self.allocator()?.remove_from_limit(amount);
        Ok(())
    }

    /// Disk id of the volume holding `path`
    ///
    /// The longest mount point that prefixes the path wins. Paths on no
    /// known volume share [`DiskId::DEFAULT`].
    pub fn map_path_to_disk_id(&self, path: &Path) -> LogResult<DiskId> {
        if !path.is_absolute() {
            return Err(LogError::PathInvalid(path.display().to_string()));
        }
        let volumes = lock(&self.volumes);
        let disk_id = volumes
            .iter()
            .filter(|v| path.starts_with(&v.mount_point))
            .max_by_key(|v| v.mount_point.components().count())
            .map_or(DiskId::DEFAULT, |v| v.disk_id);
        Ok(disk_id)
    }

    /// Fill in the disk id of a location that names only a path
    fn resolve_location(&self, location: &mut LogLocation) -> LogResult<()> {
        if location.disk_id.is_nil() {
            if let Some(path) = location.path.as_deref() {
                location.disk_id = self.map_path_to_disk_id(path)?;
            }
        }
        Ok(())
    }

    /// Rewrite a location naming the default shared log to the configured
    /// shared container; returns whether it was mapped
    fn map_shared_location(&self, location: &mut LogLocation) -> bool {
        if location.log_id != LogId::DEFAULT_SHARED {
            return false;
        }
        let settings = self.settings();
        let shared = &settings.shared_log_settings;
        if let Some(container_id) = shared.log_container_id.filter(|id| !id.is_nil()) {
            location.log_id = container_id;
            location.path = shared
                .path
                .clone()
                .filter(|p: &PathBuf| !p.as_os_str().is_empty());
            location.disk_id = shared.disk_id.unwrap_or(DiskId::NIL);
        }
        true
    }

    fn prepare_create(&self, mut request: CreateLogRequest) -> LogResult<CreateLogRequest> {
        if self.map_shared_location(&mut request.location) {
            let settings = self.settings();
            let shared = &settings.shared_log_settings;
            request.log_size = shared.log_size;
            request.max_streams = shared.maximum_number_streams;
            request.max_record_size = shared.maximum_record_size;
            request.flags = shared.flags;
            tracing::info!(
                log_id = %request.location.log_id,
                log_size = request.log_size,
                max_streams = request.max_streams,
                "mapped default shared log"
            );
        }
        if request.max_streams == 0 {
            request.max_streams = DEFAULT_MAX_STREAMS;
        }
        self.resolve_location(&mut request.location)?;
        Ok(request)
    }

    fn prepare_location(&self, mut location: LogLocation) -> LogResult<LogLocation> {
        self.map_shared_location(&mut location);
        self.resolve_location(&mut location)?;
        Ok(location)
    }

    pub fn create_log_op(&self, request: CreateLogRequest) -> LogResult<CreateLogOperation<E>> {
        let request = self.prepare_create(request)?;
        Ok(CreateLogOperation::new(Arc::clone(&self.context), request))
    }

    /// Create a container and open it
    pub async fn create_log(&self, request: CreateLogRequest) -> LogResult<OverlayLog<E>> {
        self.create_log_op(request)?.run().await
    }

    pub fn open_log_op(&self, location: LogLocation) -> LogResult<OpenLogOperation<E>> {
        let location = self.prepare_location(location)?;
        Ok(OpenLogOperation::new(Arc::clone(&self.context), location))
    }

    pub async fn open_log(&self, location: LogLocation) -> LogResult<OverlayLog<E>> {
        self.open_log_op(location)?.run().await
    }

    pub fn close_log_op(&self, log: OverlayLog<E>) -> CloseLogOperation<E> {
        CloseLogOperation::new(Arc::clone(&self.context), log)
    }

    pub async fn close_log(&self, log: OverlayLog<E>) -> LogResult<()> {
        self.close_log_op(log).run().await
    }

    pub fn delete_log_op(&self, location: LogLocation) -> LogResult<DeleteLogOperation<E>> {
        let location = self.prepare_location(location)?;
        Ok(DeleteLogOperation::new(Arc::clone(&self.context), location))
    }

    pub async fn delete_log(&self, location: LogLocation) -> LogResult<()> {
        self.delete_log_op(location)?.run().await
    }

    pub fn query_log_id_op(&self, path: impl Into<PathBuf>) -> QueryLogIdOperation<E> {
        QueryLogIdOperation::new(Arc::clone(&self.context), path.into())
    }

    pub async fn query_log_id(&self, path: impl Into<PathBuf>) -> LogResult<LogId> {
        self.query_log_id_op(path).run().await
    }

    pub fn enumerate_logs_op(&self, disk_id: DiskId) -> EnumerateLogsOperation<E> {
        EnumerateLogsOperation::new(Arc::clone(&self.context), disk_id)
    }

    pub async fn enumerate_logs(&self, disk_id: DiskId) -> LogResult<Vec<LogId>> {
        self.enumerate_logs_op(disk_id).run().await
    }

    /// Validate and apply a configuration request
    pub fn configure(&self, request: ConfigureRequest) -> LogResult<ConfigureOutput> {
        let _request = self.context.refs.acquire()?;
        let allocator = self.allocator()?;
        apply_configure(request, &self.settings, allocator, |path| {
            self.map_path_to_disk_id(path)
        })
    }

    /// Decode and apply a raw configuration request
    pub fn configure_raw(&self, code: u32, input: Option<&[u8]>) -> LogResult<ConfigureOutput> {
        let request = ConfigureRequest::decode(code, input)?;
        self.configure(request)
    }

    /// Wait for a stream-open slot on `disk_id`
    ///
    /// The slot is returned when the permit drops. Fails with
    /// `GateDeactivated` once the manager starts closing.
    pub async fn wait_for_stream_open_gate(
        &self,
        disk_id: DiskId,
        cancel: &CancellationToken,
    ) -> LogResult<GatePermit> {
        let gate = {
            let _request = self.context.refs.acquire()?;
            self.gates.acquire_or_create(disk_id)?
        };
        tracing::debug!(%disk_id, waiters = gate.waiter_count(), "waiting for stream open gate");
        gate.acquire_permit(1, cancel).await
    }

    /// Number of containers currently registered
    pub fn container_count(&self) -> usize {
        self.context.registry.len()
    }

    /// Number of per-disk gates currently in the table
    pub fn gate_count(&self) -> usize {
        self.gates.len()
    }

    /// Number of operations currently holding a request reference
    pub fn active_requests(&self) -> usize {
        self.context.refs.active()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
