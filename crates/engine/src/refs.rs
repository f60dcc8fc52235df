// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request references: liveness tokens held by in-flight operations
//!
//! Operations take a reference before touching any manager state. Once
//! the manager starts closing no new references are granted, and close
//! waits until the outstanding ones are dropped.

use overlog_core::{LogError, LogResult};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Admission {
    NotOpened,
    Open,
    Closing,
}

struct RefsState {
    admission: Admission,
    active: usize,
}

pub(crate) struct RequestRefs {
    state: Mutex<RefsState>,
    idle: Notify,
}

impl RequestRefs {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(RefsState {
                admission: Admission::NotOpened,
                active: 0,
            }),
            idle: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RefsState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start admitting requests
    pub(crate) fn open(&self) {
        self.lock().admission = Admission::Open;
    }

    pub(crate) fn acquire(&self) -> LogResult<RequestRef<'_>> {
        let mut state = self.lock();
        match state.admission {
            Admission::Open => {
                state.active += 1;
                Ok(RequestRef { refs: self })
            }
            Admission::NotOpened => Err(LogError::NotOpen),
            Admission::Closing => Err(LogError::manager_gone()),
        }
    }

    pub(crate) fn active(&self) -> usize {
        self.lock().active
    }

    /// Stop admitting requests and wait for the outstanding ones
    pub(crate) async fn close_and_drain(&self) {
        self.lock().admission = Admission::Closing;
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let active = self.lock().active;
            if active == 0 {
                return;
            }
            tracing::debug!(active, "waiting for in-flight requests");
            notified.await;
        }
    }

    fn release(&self) {
        let mut state = self.lock();
        state.active -= 1;
        if state.active == 0 {
            drop(state);
            self.idle.notify_waiters();
        }
    }
}

/// Held for the duration of one operation
pub(crate) struct RequestRef<'a> {
    refs: &'a RequestRefs,
}

impl Drop for RequestRef<'_> {
    fn drop(&mut self) {
        self.refs.release();
    }
}
