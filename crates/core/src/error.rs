// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared by the log manager layers

use thiserror::Error;

/// Errors surfaced by the overlay log manager and its collaborators
#[derive(Debug, Error)]
pub enum LogError {
    #[error("insufficient resources: {0}")]
    InsufficientResources(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("invalid buffer size: requested {requested} bytes, limit {limit} bytes")]
    InvalidBufferSize { requested: u64, limit: u64 },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("object no longer exists: {0}")]
    NoLongerExists(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("invalid path: {0}")]
    PathInvalid(String),
    #[error("quota gate deactivated")]
    GateDeactivated,
    #[error("operation cancelled")]
    Cancelled,
    #[error("shutting down")]
    ShuttingDown,
    #[error("log manager is not open")]
    NotOpen,
    #[error("log engine error: {0}")]
    Engine(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type LogResult<T> = Result<T, LogError>;

impl LogError {
    /// The manager has begun shutting down and no longer admits work
    pub fn manager_gone() -> Self {
        LogError::NoLongerExists("log manager is closing".to_string())
    }

    /// Whether the caller should treat this as resource exhaustion
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(
            self,
            LogError::InsufficientResources(_) | LogError::InvalidBufferSize { .. }
        )
    }

    /// Whether the target object was already torn down by someone else
    pub fn is_no_longer_exists(&self) -> bool {
        matches!(self, LogError::NoLongerExists(_))
    }
}
