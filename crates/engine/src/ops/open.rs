// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Open an existing physical container

use super::{cancellable, key_for, ContainerContext, OverlayLog};
use overlog_adapters::{LogEngine, LogLocation};
use overlog_core::{ActivityId, LogResult};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenState {
    Initial,
    Open,
    Cleanup,
    Completed,
    CompletedWithError,
}

pub struct OpenLogOperation<E: LogEngine> {
    context: Arc<ContainerContext<E>>,
    location: LogLocation,
    state: OpenState,
    cancel: CancellationToken,
}

impl<E: LogEngine> OpenLogOperation<E> {
    pub(crate) fn new(context: Arc<ContainerContext<E>>, location: LogLocation) -> Self {
        Self {
            context,
            location,
            state: OpenState::Initial,
            cancel: CancellationToken::new(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> OpenState {
        self.state
    }

    fn transition(&mut self, next: OpenState) {
        tracing::debug!(from = ?self.state, to = ?next, "open state");
        self.state = next;
    }

    pub async fn run(&mut self) -> LogResult<OverlayLog<E>> {
        assert_eq!(self.state, OpenState::Initial, "open operation started twice");
        let span = tracing::info_span!(
            "log.open",
            disk_id = %self.location.disk_id,
            log_id = %self.location.log_id,
            activity_id = %ActivityId::for_log(&self.location.log_id),
        );
        self.execute().instrument(span).await
    }

    async fn execute(&mut self) -> LogResult<OverlayLog<E>> {
        let context = Arc::clone(&self.context);
        let _request = match context.refs.acquire() {
            Ok(guard) => guard,
            Err(e) => {
                self.transition(OpenState::CompletedWithError);
                return Err(e);
            }
        };

        let (container, _) = context.reference(key_for(&self.location));

        self.transition(OpenState::Open);
        match cancellable(&self.cancel, container.open(&self.location)).await {
            Ok(handle) => {
                self.transition(OpenState::Completed);
                Ok(OverlayLog::new(self.location.clone(), handle, container))
            }
            Err(e) => {
                tracing::warn!(error = %e, "open failed");
                if context.release(&container) {
                    self.transition(OpenState::Cleanup);
                    container.deactivate_queue().await;
                }
                self.transition(OpenState::CompletedWithError);
                Err(e)
            }
        }
    }
}
