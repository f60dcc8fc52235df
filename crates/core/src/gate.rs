// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-disk admission gates
//!
//! A [`QuotaGate`] is a counting semaphore with a FIFO waiter list and an
//! explicit deactivation step. The manager keeps one gate per disk in a
//! [`GateTable`] to bound how many streams open against a disk at once.
//! Deactivation fails every waiter and reports completion on the table's
//! notification channel.

use crate::error::{LogError, LogResult};
use crate::id::DiskId;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

struct GateWaiter {
    id: u64,
    quanta: u64,
    tx: oneshot::Sender<LogResult<()>>,
}

struct GateState {
    active: bool,
    available: u64,
    next_waiter_id: u64,
    waiters: VecDeque<GateWaiter>,
    on_deactivated: Option<mpsc::UnboundedSender<DiskId>>,
}

impl GateState {
    /// Grant waiters from the head while they fit
    fn grant_waiters(&mut self) {
        while let Some(head) = self.waiters.front() {
            if head.quanta > self.available {
                break;
            }
            let Some(waiter) = self.waiters.pop_front() else {
                break;
            };
            self.available -= waiter.quanta;
            if waiter.tx.send(Ok(())).is_err() {
                self.available += waiter.quanta;
            }
        }
    }
}

/// Counting admission gate for one disk
pub struct QuotaGate {
    disk_id: DiskId,
    state: Mutex<GateState>,
}

impl QuotaGate {
    /// Create an inactive gate; acquisitions fail until [`QuotaGate::activate`]
    pub fn new(disk_id: DiskId) -> Self {
        Self {
            disk_id,
            state: Mutex::new(GateState {
                active: false,
                available: 0,
                next_waiter_id: 0,
                waiters: VecDeque::new(),
                on_deactivated: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn disk_id(&self) -> DiskId {
        self.disk_id
    }

    /// Activate with `quanta` units; `on_deactivated` receives the disk id
    /// once the gate is deactivated
    pub fn activate(&self, quanta: u64, on_deactivated: Option<mpsc::UnboundedSender<DiskId>>) {
        let mut state = self.lock();
        state.active = true;
        state.available = quanta;
        state.on_deactivated = on_deactivated;
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    pub fn available(&self) -> u64 {
        self.lock().available
    }

    pub fn waiter_count(&self) -> usize {
        self.lock().waiters.len()
    }

    /// Wait until `quanta` units are available and take them.
    ///
    /// Dropping the returned future before it completes withdraws the
    /// request; units granted in the meantime are returned to the gate.
    pub async fn acquire(&self, quanta: u64) -> LogResult<()> {
        let (id, rx) = {
            let mut state = self.lock();
            if !state.active {
                return Err(LogError::GateDeactivated);
            }
            if state.waiters.is_empty() && state.available >= quanta {
                state.available -= quanta;
                return Ok(());
            }
            let id = state.next_waiter_id;
            state.next_waiter_id += 1;
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(GateWaiter { id, quanta, tx });
            (id, rx)
        };

        let mut pending = PendingAcquire {
            gate: self,
            id,
            quanta,
            rx: Some(rx),
        };
        pending.wait().await
    }

    /// [`QuotaGate::acquire`] that gives up with `Cancelled` when `cancel` fires
    pub async fn acquire_cancellable(
        &self,
        quanta: u64,
        cancel: &CancellationToken,
    ) -> LogResult<()> {
        tokio::select! {
            result = self.acquire(quanta) => result,
            _ = cancel.cancelled() => Err(LogError::Cancelled),
        }
    }

    /// Acquire `quanta` units held by an RAII permit
    pub async fn acquire_permit(
        self: &Arc<Self>,
        quanta: u64,
        cancel: &CancellationToken,
    ) -> LogResult<GatePermit> {
        self.acquire_cancellable(quanta, cancel).await?;
        Ok(GatePermit {
            gate: Arc::clone(self),
            quanta,
        })
    }

    /// Return `quanta` units and wake waiters that now fit
    pub fn release(&self, quanta: u64) {
        let mut state = self.lock();
        state.available += quanta;
        state.grant_waiters();
    }

    /// Fail all waiters and report completion on the notification channel
    pub fn deactivate(&self) {
        let (waiters, notify) = {
            let mut state = self.lock();
            state.active = false;
            (
                std::mem::take(&mut state.waiters),
                state.on_deactivated.take(),
            )
        };
        for waiter in waiters {
            let _ = waiter.tx.send(Err(LogError::GateDeactivated));
        }
        tracing::debug!(disk_id = %self.disk_id, "quota gate deactivated");
        if let Some(tx) = notify {
            let _ = tx.send(self.disk_id);
        }
    }
}

struct PendingAcquire<'a> {
    gate: &'a QuotaGate,
    id: u64,
    quanta: u64,
    rx: Option<oneshot::Receiver<LogResult<()>>>,
}

impl PendingAcquire<'_> {
    async fn wait(&mut self) -> LogResult<()> {
        let Some(rx) = self.rx.as_mut() else {
            return Err(LogError::Cancelled);
        };
        let result = rx.await.unwrap_or(Err(LogError::GateDeactivated));
        self.rx = None;
        result
    }
}

impl Drop for PendingAcquire<'_> {
    fn drop(&mut self) {
        let Some(mut rx) = self.rx.take() else {
            return;
        };
        let mut state = self.gate.lock();
        if let Some(pos) = state.waiters.iter().position(|w| w.id == self.id) {
            state.waiters.remove(pos);
            // A smaller waiter behind us may fit now
            state.grant_waiters();
            return;
        }
        // Already granted while the caller stopped waiting
        if let Ok(Ok(())) = rx.try_recv() {
            state.available += self.quanta;
            state.grant_waiters();
        }
    }
}

/// Units held on a gate, returned on drop
pub struct GatePermit {
    gate: Arc<QuotaGate>,
    quanta: u64,
}

impl GatePermit {
    pub fn disk_id(&self) -> DiskId {
        self.gate.disk_id
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.gate.release(self.quanta);
    }
}

impl std::fmt::Debug for GatePermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatePermit")
            .field("disk_id", &self.gate.disk_id)
            .field("quanta", &self.quanta)
            .finish()
    }
}

struct TableState {
    gates: HashMap<DiskId, Arc<QuotaGate>>,
    closed: bool,
}

/// Disk-keyed table of quota gates
pub struct GateTable {
    quanta: u64,
    on_deactivated: mpsc::UnboundedSender<DiskId>,
    state: Mutex<TableState>,
}

impl GateTable {
    /// Gates are activated with `quanta` units; each deactivation is
    /// reported on `on_deactivated`
    pub fn new(quanta: u64, on_deactivated: mpsc::UnboundedSender<DiskId>) -> Self {
        Self {
            quanta,
            on_deactivated,
            state: Mutex::new(TableState {
                gates: HashMap::new(),
                closed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TableState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Existing gate for `disk_id`, or a newly created and activated one.
    ///
    /// Fails once the table has been torn down by [`GateTable::deactivate_all`].
    pub fn acquire_or_create(&self, disk_id: DiskId) -> LogResult<Arc<QuotaGate>> {
        let mut state = self.lock();
        if state.closed {
            return Err(LogError::GateDeactivated);
        }
        let gate = state.gates.entry(disk_id).or_insert_with(|| {
            let gate = QuotaGate::new(disk_id);
            gate.activate(self.quanta, Some(self.on_deactivated.clone()));
            tracing::debug!(%disk_id, quanta = self.quanta, "quota gate created");
            Arc::new(gate)
        });
        Ok(Arc::clone(gate))
    }

    pub fn find(&self, disk_id: &DiskId) -> Option<Arc<QuotaGate>> {
        self.lock().gates.get(disk_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and deactivate every gate; returns how many were deactivated
    pub fn deactivate_all(&self) -> usize {
        let gates: Vec<Arc<QuotaGate>> = {
            let mut state = self.lock();
            state.closed = true;
            state.gates.drain().map(|(_, gate)| gate).collect()
        };
        for gate in &gates {
            gate.deactivate();
        }
        gates.len()
    }
}

#[cfg(test)]
#[path = "gate_tests.rs"]
mod tests;
