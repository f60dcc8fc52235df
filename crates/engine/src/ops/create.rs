// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Create a physical container and open it

use super::{cancellable, key_for, ContainerContext, OverlayLog};
use crate::container::OverlayContainer;
use overlog_adapters::{CreateLogRequest, LogEngine, LogHandle};
use overlog_core::{ActivityId, LogResult};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateState {
    Initial,
    Create,
    /// Freshly created containers must be opened before use
    Reopen,
    /// Failed after taking the last reference; draining the queue
    Cleanup,
    Completed,
    CompletedWithError,
}

pub struct CreateLogOperation<E: LogEngine> {
    context: Arc<ContainerContext<E>>,
    request: CreateLogRequest,
    state: CreateState,
    cancel: CancellationToken,
}

impl<E: LogEngine> CreateLogOperation<E> {
    pub(crate) fn new(context: Arc<ContainerContext<E>>, request: CreateLogRequest) -> Self {
        Self {
            context,
            request,
            state: CreateState::Initial,
            cancel: CancellationToken::new(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> CreateState {
        self.state
    }

    pub fn request(&self) -> &CreateLogRequest {
        &self.request
    }

    fn transition(&mut self, next: CreateState) {
        tracing::debug!(from = ?self.state, to = ?next, "create state");
        self.state = next;
    }

    /// Run the operation to completion
    ///
    /// On success the operation's container reference becomes the standing
    /// reference of the returned log.
    pub async fn run(&mut self) -> LogResult<OverlayLog<E>> {
        assert_eq!(self.state, CreateState::Initial, "create operation started twice");
        let location = &self.request.location;
        let span = tracing::info_span!(
            "log.create",
            disk_id = %location.disk_id,
            log_id = %location.log_id,
            activity_id = %ActivityId::for_log(&location.log_id),
        );
        self.execute().instrument(span).await
    }

    async fn execute(&mut self) -> LogResult<OverlayLog<E>> {
        let context = Arc::clone(&self.context);
        let _request = match context.refs.acquire() {
            Ok(guard) => guard,
            Err(e) => {
                self.transition(CreateState::CompletedWithError);
                return Err(e);
            }
        };

        let (container, added) = context.reference(key_for(&self.request.location));
        tracing::debug!(added, "container referenced");

        match self.create_and_reopen(&container).await {
            Ok(handle) => {
                self.transition(CreateState::Completed);
                Ok(OverlayLog::new(
                    self.request.location.clone(),
                    handle,
                    container,
                ))
            }
            Err(e) => {
                tracing::warn!(error = %e, state = ?self.state, "create failed");
                if context.release(&container) {
                    self.transition(CreateState::Cleanup);
                    container.deactivate_queue().await;
                }
                self.transition(CreateState::CompletedWithError);
                Err(e)
            }
        }
    }

    async fn create_and_reopen(&mut self, container: &OverlayContainer<E>) -> LogResult<LogHandle> {
        self.transition(CreateState::Create);
        cancellable(&self.cancel, container.create(&self.request)).await?;

        self.transition(CreateState::Reopen);
        cancellable(&self.cancel, container.open(&self.request.location)).await
    }
}
