// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifiers for disks, log containers and activities

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a physical disk (volume)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiskId(pub Uuid);

impl DiskId {
    /// Disk id used for paths whose volume cannot be resolved.
    ///
    /// Every such path shares this id and therefore one stream-open gate.
    pub const DEFAULT: DiskId = DiskId(Uuid::from_u128(0x3c391cbc_4ac5_4a8b_b38b_413d17e1db46));

    /// Unset disk id; a location carrying it is resolved from its path
    pub const NIL: DiskId = DiskId(Uuid::nil());

    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Stable id for a volume named by its device or mount source
    pub fn for_volume(source: &str) -> Self {
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, source.as_bytes()))
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for DiskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DiskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a log container
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogId(pub Uuid);

impl LogId {
    /// Well-known id of the default shared log.
    ///
    /// Create/open requests naming it are rewritten from the configured
    /// shared log container settings.
    pub const DEFAULT_SHARED: LogId = LogId(Uuid::from_u128(0x3ca2ccda_dd0f_49c8_a741_62aac0d4eb62));

    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for LogId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlation id attached to every sub-operation started on behalf of a caller
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ActivityId(pub u64);

impl ActivityId {
    /// Activity id derived from a log id, so all work against one
    /// container correlates in the logs.
    pub fn for_log(log_id: &LogId) -> Self {
        let (hi, lo) = log_id.0.as_u64_pair();
        Self(hi ^ lo)
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(LogId::new(), LogId::new());
        assert_ne!(DiskId::new(), DiskId::new());
    }

    #[test]
    fn volume_disk_ids_are_stable() {
        assert_eq!(DiskId::for_volume("/dev/sda1"), DiskId::for_volume("/dev/sda1"));
        assert_ne!(DiskId::for_volume("/dev/sda1"), DiskId::for_volume("/dev/sdb1"));
    }

    #[test]
    fn activity_id_follows_log_id() {
        let log_id = LogId::new();
        assert_eq!(ActivityId::for_log(&log_id), ActivityId::for_log(&log_id));
    }

    #[test]
    fn well_known_ids_are_not_nil() {
        assert!(!DiskId::DEFAULT.is_nil());
        assert!(!LogId::DEFAULT_SHARED.is_nil());
    }
}
