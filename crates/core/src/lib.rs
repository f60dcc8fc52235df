// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! overlog-core: building blocks of the overlay log manager
//!
//! This crate provides:
//! - Identifiers for disks, log containers and activities
//! - The error taxonomy shared by every layer
//! - Configuration types with their validation rules
//! - Per-disk quota gates and the gate table
//! - A reference-counted container registry
//! - The throttled I/O buffer allocator

pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod id;
pub mod registry;
pub mod throttle;

// Re-exports
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{
    AcceleratedFlushLimits, ByteLimit, ConfigError, ConfigureCode, ConfigureOutput,
    ConfigureRequest, ManagerConfig, MemoryThrottleLimits, MemoryThrottleUsage,
    SharedLogContainerSettings, ThrottleLimitsVersion,
};
pub use error::{LogError, LogResult};
pub use gate::{GatePermit, GateTable, QuotaGate};
pub use id::{ActivityId, DiskId, LogId};
pub use registry::{ContainerRegistry, RegistryKey};
pub use throttle::{
    AllocateRequest, AllocationCanceller, AllocationTimeout, DebugCounters, ExtentAllocator,
    HeapExtents, IoBuffer, ThrottledAllocator, EXTENT_SIZE, PAGE_SIZE,
};
