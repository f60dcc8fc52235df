// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Volume source backed by the kernel mount table

use super::{VolumeInfo, VolumeSource};
use async_trait::async_trait;
use overlog_core::{DiskId, LogResult};
use std::path::{Path, PathBuf};

const PROC_MOUNTS: &str = "/proc/self/mounts";

/// Volumes listed in a mount table, one per block-device mount.
///
/// Disk ids are derived from the mount source so they are stable across
/// restarts.
#[derive(Clone, Debug)]
pub struct MountTableVolumes {
    table: PathBuf,
}

impl Default for MountTableVolumes {
    fn default() -> Self {
        Self::new()
    }
}

impl MountTableVolumes {
    pub fn new() -> Self {
        Self::with_table(PROC_MOUNTS)
    }

    /// Read an alternative mount table, in `/proc/mounts` format
    pub fn with_table(table: impl AsRef<Path>) -> Self {
        Self {
            table: table.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl VolumeSource for MountTableVolumes {
    async fn query_volume_list(&self) -> LogResult<Vec<VolumeInfo>> {
        let text = tokio::fs::read_to_string(&self.table).await?;
        Ok(parse_mount_table(&text))
    }
}

/// Parse `/proc/mounts` lines, keeping mounts whose source is a device path
fn parse_mount_table(text: &str) -> Vec<VolumeInfo> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let source = fields.next()?;
            let mount_point = fields.next()?;
            if !source.starts_with('/') {
                return None;
            }
            Some(VolumeInfo {
                disk_id: DiskId::for_volume(source),
                mount_point: PathBuf::from(unescape(mount_point)),
            })
        })
        .collect()
}

// The kernel escapes space, tab, newline and backslash as \ooo octal
fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            if let Some(value) = bytes.get(i + 1..i + 4).and_then(octal_byte) {
                out.push(value);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn octal_byte(digits: &[u8]) -> Option<u8> {
    let value = digits.iter().try_fold(0u16, |acc, d| match d {
        b'0'..=b'7' => Some(acc * 8 + u16::from(d - b'0')),
        _ => None,
    })?;
    u8::try_from(value).ok()
}

#[cfg(test)]
#[path = "mounts_tests.rs"]
mod tests;
