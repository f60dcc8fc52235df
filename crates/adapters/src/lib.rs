// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Adapters for the collaborators beneath the overlay log manager

pub mod engine;
pub mod traced;
pub mod volume;

pub use engine::{CreateLogRequest, LogEngine, LogHandle, LogLocation};
pub use traced::{TracedLogEngine, TracedVolumeSource};
pub use volume::{MountTableVolumes, NoOpVolumeSource, VolumeInfo, VolumeSource};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use engine::{EngineCall, EngineOp, FakeLog, FakeLogEngine};
#[cfg(any(test, feature = "test-support"))]
pub use volume::FakeVolumeSource;
