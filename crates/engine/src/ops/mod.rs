// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log operation state machines
//!
//! Every operation takes a request reference when it starts and walks an
//! explicit state enum to `Completed` or `CompletedWithError`. Operations
//! that fail after taking a container reference release it in `Cleanup`;
//! when that was the last reference the container's queue is drained
//! before the operation completes.
//!
//! Each operation exposes a [`CancellationToken`]. Cancelling abandons the
//! sub-operation being awaited, runs the normal failure cleanup and
//! completes with `Cancelled`.

mod close;
mod configure;
mod create;
mod delete;
mod open;
mod query;

pub use close::{CloseLogOperation, CloseState};
pub(crate) use configure::apply_configure;
pub use create::{CreateLogOperation, CreateState};
pub use delete::{DeleteLogOperation, DeleteState};
pub use open::{OpenLogOperation, OpenState};
pub use query::{EnumerateLogsOperation, PassThroughState, QueryLogIdOperation};

use crate::container::OverlayContainer;
use crate::refs::RequestRefs;
use overlog_adapters::{LogEngine, LogHandle, LogLocation};
use overlog_core::{ActivityId, ContainerRegistry, DiskId, LogError, LogId, LogResult, RegistryKey};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// State shared by the container operations
pub(crate) struct ContainerContext<E: LogEngine> {
    pub(crate) engine: E,
    pub(crate) registry: ContainerRegistry<OverlayContainer<E>>,
    pub(crate) refs: RequestRefs,
}

impl<E: LogEngine> ContainerContext<E> {
    pub(crate) fn new(engine: E) -> Self {
        Self {
            engine,
            registry: ContainerRegistry::new(),
            refs: RequestRefs::new(),
        }
    }

    /// Take a registry reference, creating the container entry if needed
    pub(crate) fn reference(&self, key: RegistryKey) -> (Arc<OverlayContainer<E>>, bool) {
        self.registry
            .create_or_get(key, || OverlayContainer::new(key, self.engine.clone()))
    }

    /// Drop a registry reference; true when it was the last one and the
    /// caller must drain the container's queue
    pub(crate) fn release(&self, container: &OverlayContainer<E>) -> bool {
        let key = container.key();
        let last = self.registry.release(&key);
        if last {
            tracing::debug!(%key, "last container reference released");
        }
        last
    }
}

/// An open overlay log, returned by create and open
///
/// Holds the standing registry reference until passed to close.
pub struct OverlayLog<E> {
    location: LogLocation,
    handle: LogHandle,
    container: Arc<OverlayContainer<E>>,
}

impl<E: LogEngine> OverlayLog<E> {
    pub(crate) fn new(
        location: LogLocation,
        handle: LogHandle,
        container: Arc<OverlayContainer<E>>,
    ) -> Self {
        Self {
            location,
            handle,
            container,
        }
    }

    pub fn log_id(&self) -> LogId {
        self.location.log_id
    }

    pub fn disk_id(&self) -> DiskId {
        self.location.disk_id
    }

    pub fn path(&self) -> Option<&Path> {
        self.location.path.as_deref()
    }

    pub fn location(&self) -> &LogLocation {
        &self.location
    }

    pub fn handle(&self) -> LogHandle {
        self.handle
    }

    pub fn activity_id(&self) -> ActivityId {
        ActivityId::for_log(&self.location.log_id)
    }

    pub(crate) fn key(&self) -> RegistryKey {
        self.container.key()
    }
}

impl<E> std::fmt::Debug for OverlayLog<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayLog")
            .field("location", &self.location)
            .field("handle", &self.handle)
            .finish()
    }
}

pub(crate) fn key_for(location: &LogLocation) -> RegistryKey {
    RegistryKey::new(location.disk_id, location.log_id)
}

/// Await `work` unless `cancel` fires first
pub(crate) async fn cancellable<T>(
    cancel: &CancellationToken,
    work: impl Future<Output = LogResult<T>>,
) -> LogResult<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(LogError::Cancelled),
        result = work => result,
    }
}

#[cfg(test)]
#[path = "ops_tests.rs"]
mod tests;
