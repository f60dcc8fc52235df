// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-shot queries delegated straight to the engine
//!
//! Neither touches the container registry.

use super::{cancellable, ContainerContext};
use overlog_adapters::LogEngine;
use overlog_core::{DiskId, LogId, LogResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassThroughState {
    Initial,
    Query,
    Completed,
    CompletedWithError,
}

impl PassThroughState {
    fn finish<T>(&mut self, result: &LogResult<T>) {
        *self = match result {
            Ok(_) => Self::Completed,
            Err(_) => Self::CompletedWithError,
        };
    }
}

/// Resolve a container path to its log id
pub struct QueryLogIdOperation<E: LogEngine> {
    context: Arc<ContainerContext<E>>,
    path: PathBuf,
    state: PassThroughState,
    cancel: CancellationToken,
}

impl<E: LogEngine> QueryLogIdOperation<E> {
    pub(crate) fn new(context: Arc<ContainerContext<E>>, path: PathBuf) -> Self {
        Self {
            context,
            path,
            state: PassThroughState::Initial,
            cancel: CancellationToken::new(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> PassThroughState {
        self.state
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn run(&mut self) -> LogResult<LogId> {
        assert_eq!(self.state, PassThroughState::Initial, "query operation started twice");
        let span = tracing::info_span!("log.query_log_id", path = %self.path.display());
        let context = Arc::clone(&self.context);
        let result = async {
            let _request = context.refs.acquire()?;
            self.state = PassThroughState::Query;
            cancellable(&self.cancel, context.engine.query_log_id(&self.path)).await
        }
        .instrument(span)
        .await;
        self.state.finish(&result);
        result
    }
}

/// List the log ids on one disk
pub struct EnumerateLogsOperation<E: LogEngine> {
    context: Arc<ContainerContext<E>>,
    disk_id: DiskId,
    state: PassThroughState,
    cancel: CancellationToken,
}

impl<E: LogEngine> EnumerateLogsOperation<E> {
    pub(crate) fn new(context: Arc<ContainerContext<E>>, disk_id: DiskId) -> Self {
        Self {
            context,
            disk_id,
            state: PassThroughState::Initial,
            cancel: CancellationToken::new(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> PassThroughState {
        self.state
    }

    pub async fn run(&mut self) -> LogResult<Vec<LogId>> {
        assert_eq!(self.state, PassThroughState::Initial, "enumerate operation started twice");
        let span = tracing::info_span!("log.enumerate", disk_id = %self.disk_id);
        let context = Arc::clone(&self.context);
        let result = async {
            let _request = context.refs.acquire()?;
            self.state = PassThroughState::Query;
            cancellable(&self.cancel, context.engine.enumerate_logs(self.disk_id)).await
        }
        .instrument(span)
        .await;
        self.state.finish(&result);
        result
    }
}
