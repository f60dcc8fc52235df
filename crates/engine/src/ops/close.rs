// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Close an open overlay log

use super::{cancellable, ContainerContext, OverlayLog};
use overlog_adapters::LogEngine;
use overlog_core::LogResult;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseState {
    Initial,
    CloseLog,
    /// Dropping the working reference and the standing open reference
    ReleaseReferences,
    Completed,
    CompletedWithError,
}

pub struct CloseLogOperation<E: LogEngine> {
    context: Arc<ContainerContext<E>>,
    log: OverlayLog<E>,
    state: CloseState,
    cancel: CancellationToken,
}

impl<E: LogEngine> CloseLogOperation<E> {
    pub(crate) fn new(context: Arc<ContainerContext<E>>, log: OverlayLog<E>) -> Self {
        Self {
            context,
            log,
            state: CloseState::Initial,
            cancel: CancellationToken::new(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> CloseState {
        self.state
    }

    fn transition(&mut self, next: CloseState) {
        tracing::debug!(from = ?self.state, to = ?next, "close state");
        self.state = next;
    }

    /// Close the log and drop its standing reference
    ///
    /// A log deleted while it was open closes successfully. On any other
    /// failure the standing reference is kept; the manager's close drops it.
    pub async fn run(&mut self) -> LogResult<()> {
        assert_eq!(self.state, CloseState::Initial, "close operation started twice");
        let span = tracing::info_span!(
            "log.close",
            disk_id = %self.log.disk_id(),
            log_id = %self.log.log_id(),
            activity_id = %self.log.activity_id(),
            handle = %self.log.handle(),
        );
        self.execute().instrument(span).await
    }

    async fn execute(&mut self) -> LogResult<()> {
        let context = Arc::clone(&self.context);
        let _request = match context.refs.acquire() {
            Ok(guard) => guard,
            Err(e) => {
                self.transition(CloseState::CompletedWithError);
                return Err(e);
            }
        };

        let (container, added) = context.reference(self.log.key());
        assert!(!added, "closing {} which is not registered", self.log.key());

        self.transition(CloseState::CloseLog);
        context.registry.set_pending_close(&self.log.key(), true);
        match cancellable(&self.cancel, container.close()).await {
            Ok(()) => {}
            Err(e) if e.is_no_longer_exists() => {
                tracing::info!("log was deleted while open");
            }
            Err(e) => {
                tracing::warn!(error = %e, "close failed");
                context.registry.set_pending_close(&self.log.key(), false);
                let last = context.release(&container);
                assert!(!last, "standing reference of {} lost", container.key());
                self.transition(CloseState::CompletedWithError);
                return Err(e);
            }
        }

        self.transition(CloseState::ReleaseReferences);
        let working_was_last = context.release(&container);
        assert!(!working_was_last, "standing reference of {} lost", container.key());
        if context.release(&container) {
            container.deactivate_queue().await;
        }
        self.transition(CloseState::Completed);
        Ok(())
    }
}
