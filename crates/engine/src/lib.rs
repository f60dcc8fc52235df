// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Overlay log manager: container lifecycle, stream-open gates and the
//! write buffer pool

mod container;
mod manager;
mod ops;
mod refs;

pub use container::OverlayContainer;
pub use manager::{ManagerDeps, ManagerLifecycleState, OverlayManager, DEFAULT_MAX_STREAMS};
pub use ops::{
    CloseLogOperation, CloseState, CreateLogOperation, CreateState, DeleteLogOperation,
    DeleteState, EnumerateLogsOperation, OpenLogOperation, OpenState, OverlayLog,
    PassThroughState, QueryLogIdOperation,
};
