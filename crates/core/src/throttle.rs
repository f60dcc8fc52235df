// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Throttled I/O buffer allocator
//!
//! Write paths draw staging buffers from a pool bounded by a dynamically
//! adjustable ceiling. Requests that do not fit wait in a FIFO queue; a
//! request that was already tried goes back to the head so a large
//! request is not starved by a stream of smaller ones. A sweep task runs
//! while the queue is non-empty, expiring requests whose deadline passed
//! and retrying the head against freed memory.
//!
//! Buffers are built from 64 KiB extents plus a smaller remainder rather
//! than one contiguous block.

use crate::clock::Clock;
use crate::config::{ByteLimit, MemoryThrottleLimits};
use crate::error::{LogError, LogResult};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Allocation sizes must be a multiple of this
pub const PAGE_SIZE: u64 = 4096;

/// Size of the chunks a buffer is assembled from
pub const EXTENT_SIZE: usize = 64 * 1024;

// Internal encoding of "no limit" for the ceiling atomics
const UNLIMITED: u64 = u64::MAX;

/// Source of buffer extents
pub trait ExtentAllocator: Send + Sync + 'static {
    /// A zeroed extent of `len` bytes, or `None` if memory is unavailable
    fn allocate_extent(&self, len: usize) -> Option<Vec<u8>>;
}

/// Extents from the global heap, failing instead of aborting on exhaustion
#[derive(Clone, Copy, Debug, Default)]
pub struct HeapExtents;

impl ExtentAllocator for HeapExtents {
    fn allocate_extent(&self, len: usize) -> Option<Vec<u8>> {
        let mut extent = Vec::new();
        extent.try_reserve_exact(len).ok()?;
        extent.resize(len, 0);
        Some(extent)
    }
}

/// A staging buffer made of one or more extents
#[derive(Debug)]
pub struct IoBuffer {
    extents: Vec<Vec<u8>>,
    len: u64,
}

impl IoBuffer {
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn extents(&self) -> &[Vec<u8>] {
        &self.extents
    }

    pub fn extents_mut(&mut self) -> &mut [Vec<u8>] {
        &mut self.extents
    }
}

/// How long a request may wait for memory
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocationTimeout {
    /// The allocator's configured default
    Default,
    Never,
    /// A zero duration waits forever
    After(Duration),
}

/// Diagnostic counters surfaced through the Configure debug query
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DebugCounters {
    pub extent_allocation_failures: u64,
    pub allocation_timeouts: u64,
}

struct Waiter {
    id: u64,
    size: u64,
    deadline: Option<Instant>,
    tx: oneshot::Sender<LogResult<IoBuffer>>,
}

struct WaitQueue {
    next_id: u64,
    waiters: VecDeque<Waiter>,
    shutting_down: bool,
    sweep_running: bool,
    sweep_task: Option<JoinHandle<()>>,
}

type NowFn = Box<dyn Fn() -> Instant + Send + Sync>;

struct Pool {
    now: NowFn,
    extents: Arc<dyn ExtentAllocator>,
    sweep_interval: Duration,

    current: AtomicU64,
    total_limit: AtomicU64,
    max_limit: AtomicU64,
    per_stream: AtomicU64,
    default_timeout_ms: AtomicU32,
    shutting_down: AtomicBool,

    queue: Mutex<WaitQueue>,

    extent_failures: AtomicU64,
    timeouts: AtomicU64,
}

enum Admission {
    Granted(IoBuffer),
    Queued(u64, oneshot::Receiver<LogResult<IoBuffer>>),
}

impl Pool {
    fn lock(&self) -> MutexGuard<'_, WaitQueue> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn headroom(&self) -> u64 {
        let total = self.total_limit.load(Ordering::Acquire);
        if total == UNLIMITED {
            return UNLIMITED;
        }
        total.saturating_sub(self.current.load(Ordering::Acquire))
    }

    fn build_buffer(&self, size: u64) -> Option<IoBuffer> {
        let size_usize = usize::try_from(size).ok()?;
        let mut extents = Vec::with_capacity(size_usize.div_ceil(EXTENT_SIZE));
        let mut remaining = size_usize;
        while remaining > 0 {
            let len = remaining.min(EXTENT_SIZE);
            match self.extents.allocate_extent(len) {
                Some(extent) => extents.push(extent),
                None => {
                    self.extent_failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(size, extent_len = len, "extent allocation failed");
                    return None;
                }
            }
            remaining -= len;
        }
        Some(IoBuffer { extents, len: size })
    }

    /// Admit or queue a new request
    fn admit(self: &Arc<Self>, size: u64, deadline: Option<Instant>) -> LogResult<Admission> {
        let mut queue = self.lock();
        if queue.shutting_down {
            return Err(LogError::ShuttingDown);
        }

        let unlimited = self.total_limit.load(Ordering::Acquire) == UNLIMITED;
        if unlimited || (queue.waiters.is_empty() && size <= self.headroom()) {
            self.current.fetch_add(size, Ordering::AcqRel);
            drop(queue);
            if let Some(buffer) = self.build_buffer(size) {
                tracing::trace!(size, "allocation granted");
                return Ok(Admission::Granted(buffer));
            }
            // Roll back and retry from the head of the queue
            self.current.fetch_sub(size, Ordering::AcqRel);
            queue = self.lock();
            let (id, rx) = self.enqueue(&mut queue, size, deadline, true);
            drop(queue);
            return Ok(Admission::Queued(id, rx));
        }

        let (id, rx) = self.enqueue(&mut queue, size, deadline, false);
        tracing::debug!(
            size,
            waiters = queue.waiters.len(),
            current = self.current.load(Ordering::Relaxed),
            "allocation queued"
        );
        Ok(Admission::Queued(id, rx))
    }

    fn enqueue(
        self: &Arc<Self>,
        queue: &mut WaitQueue,
        size: u64,
        deadline: Option<Instant>,
        at_head: bool,
    ) -> (u64, oneshot::Receiver<LogResult<IoBuffer>>) {
        let id = queue.next_id;
        queue.next_id += 1;
        let (tx, rx) = oneshot::channel();
        let waiter = Waiter {
            id,
            size,
            deadline,
            tx,
        };
        if at_head {
            queue.waiters.push_front(waiter);
        } else {
            queue.waiters.push_back(waiter);
        }
        self.ensure_sweep(queue);
        (id, rx)
    }

    fn ensure_sweep(self: &Arc<Self>, queue: &mut WaitQueue) {
        if queue.sweep_running || queue.shutting_down {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no runtime available, allocation timeouts are not swept");
            return;
        };
        queue.sweep_running = true;
        let pool = Arc::downgrade(self);
        let interval = self.sweep_interval;
        queue.sweep_task = Some(runtime.spawn(sweep_loop(pool, interval)));
    }

    /// Grant queued requests from the head while they fit
    fn process_freed_memory(self: &Arc<Self>) {
        loop {
            let waiter = {
                let mut queue = self.lock();
                let Some(head) = queue.waiters.front() else {
                    return;
                };
                let total = self.total_limit.load(Ordering::Acquire);
                if total != UNLIMITED && head.size > total {
                    // The limit shrank below this request; it can never fit
                    if let Some(waiter) = queue.waiters.pop_front() {
                        tracing::warn!(
                            size = waiter.size,
                            limit = total,
                            "queued allocation exceeds limit"
                        );
                        let _ = waiter.tx.send(Err(LogError::InvalidBufferSize {
                            requested: waiter.size,
                            limit: total,
                        }));
                    }
                    continue;
                }
                if head.size > self.headroom() {
                    return;
                }
                let Some(waiter) = queue.waiters.pop_front() else {
                    return;
                };
                self.current.fetch_add(waiter.size, Ordering::AcqRel);
                waiter
            };

            let Some(buffer) = self.build_buffer(waiter.size) else {
                self.current.fetch_sub(waiter.size, Ordering::AcqRel);
                let expired = waiter.deadline.is_some_and(|d| (self.now)() >= d);
                if expired {
                    let _ = waiter.tx.send(Err(LogError::InsufficientResources(
                        "extent allocation failed".to_string(),
                    )));
                    continue;
                }
                let mut queue = self.lock();
                queue.waiters.push_front(waiter);
                self.ensure_sweep(&mut queue);
                return;
            };

            tracing::trace!(size = waiter.size, "queued allocation granted");
            if let Err(Ok(buffer)) = waiter.tx.send(Ok(buffer)) {
                // Requester went away after the grant
                self.current.fetch_sub(buffer.len(), Ordering::AcqRel);
            }
        }
    }

    fn expire_timed_out(&self, now: Instant) {
        let expired = {
            let mut queue = self.lock();
            let (expired, kept): (Vec<Waiter>, Vec<Waiter>) = std::mem::take(&mut queue.waiters)
                .into_iter()
                .partition(|w| w.deadline.is_some_and(|d| now >= d));
            queue.waiters = kept.into();
            expired
        };
        for waiter in expired {
            self.timeouts.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(size = waiter.size, reason = "timeout", "allocation failed");
            let _ = waiter.tx.send(Err(LogError::InsufficientResources(format!(
                "allocation of {} bytes timed out",
                waiter.size
            ))));
        }
    }

    fn sweep(self: &Arc<Self>, now: Instant) {
        self.expire_timed_out(now);
        self.process_freed_memory();
    }

    fn free(self: &Arc<Self>, size: u64) {
        let result = self
            .current
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| c.checked_sub(size));
        assert!(result.is_ok(), "freed {size} bytes more than were allocated");
        self.process_freed_memory();
    }

    /// Remove a waiter; returns its sender if it was still queued
    fn withdraw(&self, id: u64) -> Option<oneshot::Sender<LogResult<IoBuffer>>> {
        let mut queue = self.lock();
        let pos = queue.waiters.iter().position(|w| w.id == id)?;
        queue.waiters.remove(pos).map(|w| w.tx)
    }
}

async fn sweep_loop(pool: Weak<Pool>, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;
        let Some(pool) = pool.upgrade() else {
            return;
        };
        pool.sweep((pool.now)());

        let mut queue = pool.lock();
        if queue.waiters.is_empty() || queue.shutting_down {
            queue.sweep_running = false;
            queue.sweep_task = None;
            return;
        }
    }
}

/// Bounded, backpressure-aware pool of I/O buffers
#[derive(Clone)]
pub struct ThrottledAllocator<C: Clock> {
    pool: Arc<Pool>,
    clock: C,
}

impl<C: Clock> ThrottledAllocator<C> {
    /// Allocator over the heap, configured from `limits`
    pub fn new(clock: C, limits: &MemoryThrottleLimits, sweep_interval: Duration) -> Self {
        Self::with_extents(clock, limits, sweep_interval, Arc::new(HeapExtents))
    }

    pub fn with_extents(
        clock: C,
        limits: &MemoryThrottleLimits,
        sweep_interval: Duration,
        extents: Arc<dyn ExtentAllocator>,
    ) -> Self {
        let now_clock = clock.clone();
        let pool = Pool {
            now: Box::new(move || now_clock.now()),
            extents,
            sweep_interval,
            current: AtomicU64::new(0),
            total_limit: AtomicU64::new(UNLIMITED),
            max_limit: AtomicU64::new(UNLIMITED),
            per_stream: AtomicU64::new(0),
            default_timeout_ms: AtomicU32::new(0),
            shutting_down: AtomicBool::new(false),
            queue: Mutex::new(WaitQueue {
                next_id: 0,
                waiters: VecDeque::new(),
                shutting_down: false,
                sweep_running: false,
                sweep_task: None,
            }),
            extent_failures: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
        };
        let allocator = Self {
            pool: Arc::new(pool),
            clock,
        };
        allocator.apply_limits(limits);
        allocator
    }

    /// Apply the pool limits and allocation timeout from `limits`
    pub fn apply_limits(&self, limits: &MemoryThrottleLimits) {
        self.set_allocation_timeout_ms(limits.effective_allocation_timeout_ms());
        self.set_limit(
            limits.write_buffer_memory_pool_min,
            limits.write_buffer_memory_pool_max,
            limits.write_buffer_memory_pool_per_stream,
        );
    }

    /// Default timeout for [`AllocationTimeout::Default`]; 0 waits forever
    pub fn set_allocation_timeout_ms(&self, ms: u32) {
        self.pool.default_timeout_ms.store(ms, Ordering::Relaxed);
    }

    /// Reset the ceiling to `min` and re-examine the queue
    pub fn set_limit(&self, min: ByteLimit, max: ByteLimit, per_stream: u64) {
        let total = min.get().unwrap_or(UNLIMITED);
        self.pool
            .max_limit
            .store(max.get().unwrap_or(UNLIMITED), Ordering::Release);
        self.pool.per_stream.store(per_stream, Ordering::Release);
        let previous = self.pool.total_limit.swap(total, Ordering::AcqRel);
        tracing::info!(
            min = min.raw(),
            max = max.raw(),
            per_stream,
            "write buffer pool limit set"
        );
        if total != previous {
            self.pool.process_freed_memory();
        }
    }

    /// Grow the ceiling by the per-stream increment if it stays within the
    /// maximum; returns the amount added
    pub fn add_to_limit(&self) -> u64 {
        let per_stream = self.pool.per_stream.load(Ordering::Acquire);
        let max = self.pool.max_limit.load(Ordering::Acquire);
        if per_stream == 0 {
            return 0;
        }
        let grown = self
            .pool
            .total_limit
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |total| {
                if total == UNLIMITED {
                    return None;
                }
                total.checked_add(per_stream).filter(|t| *t <= max)
            });
        match grown {
            Ok(_) => {
                self.pool.process_freed_memory();
                per_stream
            }
            Err(_) => 0,
        }
    }

    /// Shrink the ceiling by `amount`; outstanding allocations are untouched
    pub fn remove_from_limit(&self, amount: u64) {
        let result = self
            .pool
            .total_limit
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |total| {
                if total == UNLIMITED {
                    return Some(total);
                }
                total.checked_sub(amount)
            });
        assert!(
            result.is_ok(),
            "removed {amount} bytes from a smaller pool limit"
        );
        self.pool.process_freed_memory();
    }

    /// Start an allocation of `size` bytes.
    ///
    /// Fails immediately when `size` is not a positive multiple of
    /// [`PAGE_SIZE`], when it exceeds the ceiling, or after shutdown.
    pub fn start_allocate(
        &self,
        size: u64,
        timeout: AllocationTimeout,
    ) -> LogResult<AllocateRequest> {
        if size == 0 || size % PAGE_SIZE != 0 {
            return Err(LogError::InvalidParameter(format!(
                "allocation size {size} is not a multiple of {PAGE_SIZE}"
            )));
        }
        if self.pool.shutting_down.load(Ordering::Acquire) {
            return Err(LogError::ShuttingDown);
        }
        let total = self.pool.total_limit.load(Ordering::Acquire);
        if total != UNLIMITED && size > total {
            return Err(LogError::InvalidBufferSize {
                requested: size,
                limit: total,
            });
        }

        let wait_for = match timeout {
            AllocationTimeout::Never => None,
            AllocationTimeout::After(after) => Some(after),
            AllocationTimeout::Default => Some(Duration::from_millis(u64::from(
                self.pool.default_timeout_ms.load(Ordering::Relaxed),
            ))),
        };
        let deadline = wait_for
            .filter(|after| !after.is_zero())
            .map(|after| self.clock.deadline_after(after));
        let request = match self.pool.admit(size, deadline)? {
            Admission::Granted(buffer) => AllocateRequest {
                pool: Arc::clone(&self.pool),
                id: None,
                ready: Some(buffer),
                rx: None,
            },
            Admission::Queued(id, rx) => AllocateRequest {
                pool: Arc::clone(&self.pool),
                id: Some(id),
                ready: None,
                rx: Some(rx),
            },
        };
        Ok(request)
    }

    /// Allocate `size` bytes, waiting for memory if needed
    pub async fn allocate(&self, size: u64, timeout: AllocationTimeout) -> LogResult<IoBuffer> {
        self.start_allocate(size, timeout)?.wait().await
    }

    /// Return `size` previously allocated bytes to the pool
    pub fn free(&self, size: u64) {
        self.pool.free(size);
    }

    /// Return a buffer's bytes to the pool
    pub fn free_buffer(&self, buffer: IoBuffer) {
        self.pool.free(buffer.len());
    }

    /// Expire timed-out requests and retry the queue against freed memory
    pub fn sweep(&self) {
        self.pool.sweep(self.clock.now());
    }

    /// Stop the sweep task and fail every queued request with `ShuttingDown`
    pub async fn shutdown(&self) {
        self.pool.shutting_down.store(true, Ordering::Release);
        let (waiters, task) = {
            let mut queue = self.pool.lock();
            queue.shutting_down = true;
            queue.sweep_running = false;
            (std::mem::take(&mut queue.waiters), queue.sweep_task.take())
        };
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }
        let failed = waiters.len();
        for waiter in waiters {
            let _ = waiter.tx.send(Err(LogError::ShuttingDown));
        }
        tracing::info!(failed, "buffer allocator shut down");
    }

    pub fn is_shutting_down(&self) -> bool {
        self.pool.shutting_down.load(Ordering::Acquire)
    }

    /// Some request is waiting for memory
    pub fn is_under_memory_pressure(&self) -> bool {
        !self.pool.lock().waiters.is_empty()
    }

    pub fn waiter_count(&self) -> usize {
        self.pool.lock().waiters.len()
    }

    pub fn current_allocations(&self) -> u64 {
        self.pool.current.load(Ordering::Acquire)
    }

    pub fn total_limit(&self) -> ByteLimit {
        match self.pool.total_limit.load(Ordering::Acquire) {
            UNLIMITED => ByteLimit::NO_LIMIT,
            total => ByteLimit::bytes(total),
        }
    }

    pub fn is_sweep_running(&self) -> bool {
        self.pool.lock().sweep_running
    }

    pub fn debug_counters(&self) -> DebugCounters {
        DebugCounters {
            extent_allocation_failures: self.pool.extent_failures.load(Ordering::Relaxed),
            allocation_timeouts: self.pool.timeouts.load(Ordering::Relaxed),
        }
    }
}

/// An allocation in flight
///
/// Dropping a request that has not been granted removes it from the wait
/// queue; bytes granted to a dropped request go back to the pool.
pub struct AllocateRequest {
    pool: Arc<Pool>,
    id: Option<u64>,
    ready: Option<IoBuffer>,
    rx: Option<oneshot::Receiver<LogResult<IoBuffer>>>,
}

impl AllocateRequest {
    /// Whether the request is still waiting in the queue
    pub fn is_queued(&self) -> bool {
        self.id
            .is_some_and(|id| self.pool.lock().waiters.iter().any(|w| w.id == id))
    }

    /// Handle that cancels the request while it is queued
    pub fn canceller(&self) -> AllocationCanceller {
        AllocationCanceller {
            pool: Arc::downgrade(&self.pool),
            id: self.id,
        }
    }

    /// Non-blocking poll for the outcome
    pub fn try_take(&mut self) -> Option<LogResult<IoBuffer>> {
        if let Some(buffer) = self.ready.take() {
            return Some(Ok(buffer));
        }
        let rx = self.rx.as_mut()?;
        match rx.try_recv() {
            Ok(result) => {
                self.rx = None;
                Some(result)
            }
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                self.rx = None;
                Some(Err(LogError::ShuttingDown))
            }
        }
    }

    /// Wait for the grant, timeout, cancellation or shutdown
    pub async fn wait(mut self) -> LogResult<IoBuffer> {
        if let Some(buffer) = self.ready.take() {
            return Ok(buffer);
        }
        let Some(rx) = self.rx.as_mut() else {
            return Err(LogError::Cancelled);
        };
        let result = rx.await.unwrap_or(Err(LogError::ShuttingDown));
        self.rx = None;
        result
    }
}

impl Drop for AllocateRequest {
    fn drop(&mut self) {
        if let Some(buffer) = self.ready.take() {
            self.pool.free(buffer.len());
            return;
        }
        let Some(mut rx) = self.rx.take() else {
            return;
        };
        if let Some(id) = self.id {
            if self.pool.withdraw(id).is_some() {
                // The next waiter may fit now
                self.pool.process_freed_memory();
                return;
            }
        }
        if let Ok(Ok(buffer)) = rx.try_recv() {
            self.pool.free(buffer.len());
        }
    }
}

/// Cancels a queued allocation; a no-op once it has completed
#[derive(Clone)]
pub struct AllocationCanceller {
    pool: Weak<Pool>,
    id: Option<u64>,
}

impl AllocationCanceller {
    /// Returns true if the request was still queued and is now cancelled
    pub fn cancel(&self) -> bool {
        let (Some(pool), Some(id)) = (self.pool.upgrade(), self.id) else {
            return false;
        };
        let Some(tx) = pool.withdraw(id) else {
            return false;
        };
        let _ = tx.send(Err(LogError::Cancelled));
        pool.process_freed_memory();
        true
    }
}

#[cfg(test)]
#[path = "throttle_tests.rs"]
mod tests;
