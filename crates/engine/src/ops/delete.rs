// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delete a physical container

use super::{cancellable, key_for, ContainerContext};
use overlog_adapters::{LogEngine, LogLocation};
use overlog_core::{ActivityId, LogResult};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteState {
    Initial,
    Delete,
    /// Reference released and it was the last; draining the queue
    Release,
    Completed,
    CompletedWithError,
}

pub struct DeleteLogOperation<E: LogEngine> {
    context: Arc<ContainerContext<E>>,
    location: LogLocation,
    state: DeleteState,
    cancel: CancellationToken,
}

impl<E: LogEngine> DeleteLogOperation<E> {
    pub(crate) fn new(context: Arc<ContainerContext<E>>, location: LogLocation) -> Self {
        Self {
            context,
            location,
            state: DeleteState::Initial,
            cancel: CancellationToken::new(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> DeleteState {
        self.state
    }

    fn transition(&mut self, next: DeleteState) {
        tracing::debug!(from = ?self.state, to = ?next, "delete state");
        self.state = next;
    }

    /// Delete the container; one that is already gone counts as deleted
    pub async fn run(&mut self) -> LogResult<()> {
        assert_eq!(self.state, DeleteState::Initial, "delete operation started twice");
        let span = tracing::info_span!(
            "log.delete",
            disk_id = %self.location.disk_id,
            log_id = %self.location.log_id,
            activity_id = %ActivityId::for_log(&self.location.log_id),
        );
        self.execute().instrument(span).await
    }

    async fn execute(&mut self) -> LogResult<()> {
        let context = Arc::clone(&self.context);
        let _request = match context.refs.acquire() {
            Ok(guard) => guard,
            Err(e) => {
                self.transition(DeleteState::CompletedWithError);
                return Err(e);
            }
        };

        let (container, _) = context.reference(key_for(&self.location));

        self.transition(DeleteState::Delete);
        let result = match cancellable(&self.cancel, container.delete(&self.location)).await {
            Err(e) if e.is_no_longer_exists() => {
                tracing::info!("container already deleted");
                Ok(())
            }
            other => other,
        };

        if context.release(&container) {
            self.transition(DeleteState::Release);
            container.deactivate_queue().await;
        }

        match result {
            Ok(()) => {
                self.transition(DeleteState::Completed);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "delete failed");
                self.transition(DeleteState::CompletedWithError);
                Err(e)
            }
        }
    }
}
