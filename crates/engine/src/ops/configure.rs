// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configure: validate a request completely, then apply it

use overlog_core::{
    Clock, ConfigureOutput, ConfigureRequest, DiskId, LogResult, ManagerConfig,
    MemoryThrottleUsage, ThrottledAllocator,
};
use std::path::Path;
use std::sync::Mutex;

/// Apply `request` to the manager settings and the allocator
///
/// Nothing is changed unless the whole request validates.
pub(crate) fn apply_configure<C: Clock>(
    request: ConfigureRequest,
    settings: &Mutex<ManagerConfig>,
    allocator: &ThrottledAllocator<C>,
    resolve_disk: impl FnOnce(&Path) -> LogResult<DiskId>,
) -> LogResult<ConfigureOutput> {
    match request {
        ConfigureRequest::SharedLogContainerSettings(shared) => {
            shared.validate()?;
            // The path must land on a known disk; it is resolved again at use
            let resolved = match shared.path.as_deref().filter(|p| !p.as_os_str().is_empty()) {
                Some(path) => Some(resolve_disk(path)?),
                None => shared.disk_id,
            };
            tracing::info!(
                path = ?shared.path,
                disk_id = ?resolved,
                log_size = shared.log_size,
                streams = shared.maximum_number_streams,
                "shared log settings updated"
            );
            lock(settings).shared_log_settings = shared;
            Ok(ConfigureOutput::None)
        }
        ConfigureRequest::MemoryThrottleLimits { limits, version } => {
            let limits = limits.validated(version)?;
            allocator.apply_limits(&limits);
            tracing::info!(?version, "memory throttle limits updated");
            lock(settings).memory_throttle_limits = limits;
            Ok(ConfigureOutput::None)
        }
        ConfigureRequest::QueryMemoryThrottleUsage => {
            let configured_limits = lock(settings).memory_throttle_limits.clone();
            Ok(ConfigureOutput::Usage(MemoryThrottleUsage {
                configured_limits,
                total_allocation_limit: allocator.total_limit(),
                current_allocations: allocator.current_allocations(),
                is_under_memory_pressure: allocator.is_under_memory_pressure(),
            }))
        }
        ConfigureRequest::QueryDebugCounters => debug_counters(allocator),
        ConfigureRequest::AcceleratedFlushLimits(flush) => {
            flush.validate()?;
            tracing::info!(
                active_timer_ms = flush.active_timer_ms,
                passive_timer_ms = flush.passive_timer_ms,
                "accelerated flush limits updated"
            );
            lock(settings).accelerated_flush_limits = flush;
            Ok(ConfigureOutput::None)
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
fn debug_counters<C: Clock>(allocator: &ThrottledAllocator<C>) -> LogResult<ConfigureOutput> {
    Ok(ConfigureOutput::Debug(allocator.debug_counters()))
}

#[cfg(not(any(test, feature = "test-support")))]
fn debug_counters<C: Clock>(_allocator: &ThrottledAllocator<C>) -> LogResult<ConfigureOutput> {
    Err(overlog_core::LogError::InvalidParameter(
        "debug counters are not available in this build".to_string(),
    ))
}

fn lock(settings: &Mutex<ManagerConfig>) -> std::sync::MutexGuard<'_, ManagerConfig> {
    settings.lock().unwrap_or_else(|e| e.into_inner())
}
