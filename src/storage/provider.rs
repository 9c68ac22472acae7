//! Storage statistics providers
//!
//! The capacity evaluator never touches devices directly. It asks a
//! [`StorageStatProvider`], so tests and embedders can swap in their own
//! device or database size lookups.

use crate::error::{DataflowError, Result};
use crate::model::{Endpoint, EndpointKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sysinfo::Disks;

/// Raw capacity figures for one endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageStats {
    /// Total capacity in bytes
    pub total_bytes: u64,
    /// Used bytes
    pub used_bytes: u64,
    /// Free bytes
    pub free_bytes: u64,
}

impl StorageStats {
    /// Build from total and free space; used is derived so the three always add up
    pub fn from_total_free(total_bytes: u64, free_bytes: u64) -> Self {
        let free_bytes = free_bytes.min(total_bytes);
        Self {
            total_bytes,
            used_bytes: total_bytes - free_bytes,
            free_bytes,
        }
    }

    /// Usage ratio in [0, 1]; a zero-capacity endpoint counts as full
    pub fn percent_used(&self) -> f64 {
        if self.total_bytes == 0 {
            1.0
        } else {
            self.used_bytes as f64 / self.total_bytes as f64
        }
    }
}

/// Source of capacity figures for endpoints
#[async_trait]
pub trait StorageStatProvider: Send + Sync {
    /// Query total/used/free space of `endpoint`
    async fn stats(&self, endpoint: &Endpoint) -> Result<StorageStats>;
}

/// Mounted filesystem summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountInfo {
    /// Mount point path
    pub mount_point: String,
    /// Device name/path
    pub device: String,
    /// Filesystem type
    pub fs_type: String,
    /// Total space in bytes
    pub total_bytes: u64,
    /// Available space in bytes
    pub available_bytes: u64,
    /// Is this a remote/network filesystem?
    pub is_remote: bool,
    /// Device can be detached
    pub is_removable: bool,
}

/// Reads disk capacity of mounted filesystems via sysinfo
///
/// Database and object-store endpoints have no mount point; those are
/// delegated to an optional device-info provider.
#[derive(Clone, Default)]
pub struct SystemStatProvider {
    device_info: Option<Arc<dyn StorageStatProvider>>,
}

impl SystemStatProvider {
    /// Provider for mounted filesystems only
    pub fn new() -> Self {
        Self::default()
    }

    /// Delegate endpoints without a mount point to `provider`
    pub fn with_device_info(mut self, provider: Arc<dyn StorageStatProvider>) -> Self {
        self.device_info = Some(provider);
        self
    }

    /// Capacity of the filesystem holding `path`
    pub fn stats_for_path(path: &Path) -> Result<StorageStats> {
        let disks = Disks::new_with_refreshed_list();
        let target = resolve_existing(path);

        // Longest mount point that contains the path wins
        let disk = disks
            .iter()
            .filter(|d| target.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len())
            .ok_or_else(|| {
                DataflowError::storage_query(
                    path.display().to_string(),
                    "no mounted filesystem contains this path",
                )
            })?;

        Ok(StorageStats::from_total_free(disk.total_space(), disk.available_space()))
    }

    /// Summary of every mounted filesystem
    pub fn mounts() -> Vec<MountInfo> {
        let disks = Disks::new_with_refreshed_list();
        disks
            .iter()
            .map(|d| {
                let fs_type = d.file_system().to_string_lossy().to_string();
                MountInfo {
                    mount_point: d.mount_point().to_string_lossy().to_string(),
                    device: d.name().to_string_lossy().to_string(),
                    is_remote: is_remote_fs(&fs_type),
                    fs_type,
                    total_bytes: d.total_space(),
                    available_bytes: d.available_space(),
                    is_removable: d.is_removable(),
                }
            })
            .collect()
    }
}

#[async_trait]
impl StorageStatProvider for SystemStatProvider {
    async fn stats(&self, endpoint: &Endpoint) -> Result<StorageStats> {
        match endpoint.kind {
            EndpointKind::LocalFilesystem
            | EndpointKind::RemovableDevice
            | EndpointKind::NetworkShare => {
                let path = PathBuf::from(&endpoint.path_or_address);
                tokio::task::spawn_blocking(move || Self::stats_for_path(&path))
                    .await
                    .map_err(|e| {
                        DataflowError::storage_query(endpoint.to_string(), e.to_string())
                    })?
            }
            EndpointKind::Database | EndpointKind::CloudObjectStore => match &self.device_info {
                Some(provider) => provider.stats(endpoint).await,
                None => Err(DataflowError::storage_query(
                    endpoint.to_string(),
                    format!("no capacity source configured for {} endpoints", endpoint.kind),
                )),
            },
        }
    }
}

/// Walk up to the nearest existing ancestor so destinations that do not
/// exist yet still resolve to their filesystem
fn resolve_existing(path: &Path) -> PathBuf {
    let mut current = Some(path);
    while let Some(p) = current {
        if let Ok(canonical) = p.canonicalize() {
            return canonical;
        }
        current = p.parent();
    }
    path.to_path_buf()
}

/// Check if filesystem is a remote/network type
pub fn is_remote_fs(fs_type: &str) -> bool {
    let fs_lower = fs_type.to_lowercase();
    ["nfs", "cifs", "smb", "sshfs", "fuse", "gluster", "ceph", "lustre"]
        .iter()
        .any(|remote| fs_lower.contains(remote))
}

/// Fixed capacity figures keyed by endpoint address
///
/// Used for device-info lookups reported by an outer layer and in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticStatProvider {
    entries: HashMap<String, StorageStats>,
}

impl StaticStatProvider {
    /// Empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Register stats for an address
    pub fn with(mut self, address: impl Into<String>, stats: StorageStats) -> Self {
        self.entries.insert(address.into(), stats);
        self
    }

    /// Register stats for an address
    pub fn insert(&mut self, address: impl Into<String>, stats: StorageStats) {
        self.entries.insert(address.into(), stats);
    }
}

#[async_trait]
impl StorageStatProvider for StaticStatProvider {
    async fn stats(&self, endpoint: &Endpoint) -> Result<StorageStats> {
        self.entries
            .get(&endpoint.path_or_address)
            .copied()
            .ok_or_else(|| DataflowError::storage_query(endpoint.to_string(), "endpoint not reachable"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GB: u64 = 1024 * 1024 * 1024;

    #[test]
    fn test_stats_invariant() {
        let stats = StorageStats::from_total_free(1000 * GB, 350 * GB);
        assert_eq!(stats.used_bytes + stats.free_bytes, stats.total_bytes);
        assert!((stats.percent_used() - 0.65).abs() < 1e-9);

        // Free larger than total is clamped
        let stats = StorageStats::from_total_free(10, 20);
        assert_eq!(stats.free_bytes, 10);
        assert_eq!(stats.used_bytes, 0);
    }

    #[test]
    fn test_zero_capacity_counts_as_full() {
        assert_eq!(StorageStats::from_total_free(0, 0).percent_used(), 1.0);
    }

    #[test]
    fn test_remote_fs_detection() {
        assert!(is_remote_fs("nfs4"));
        assert!(is_remote_fs("CIFS"));
        assert!(!is_remote_fs("ext4"));
    }

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticStatProvider::new()
            .with("/mnt/a", StorageStats::from_total_free(100, 40));

        let stats = provider.stats(&Endpoint::local("/mnt/a")).await.unwrap();
        assert_eq!(stats.used_bytes, 60);

        let err = provider.stats(&Endpoint::local("/mnt/b")).await.unwrap_err();
        assert!(matches!(err, DataflowError::StorageQuery { .. }));
    }

    #[test]
    fn test_static_provider_insert() {
        let mut provider = StaticStatProvider::new();
        provider.insert("//nas/share", StorageStats::from_total_free(8 * GB, 2 * GB));

        let share = Endpoint::new(EndpointKind::NetworkShare, "//nas/share");
        let stats = tokio_test::block_on(provider.stats(&share)).unwrap();
        assert_eq!(stats.used_bytes, 6 * GB);
    }

    #[tokio::test]
    async fn test_system_provider_without_device_info() {
        let provider = SystemStatProvider::new();
        let err = provider
            .stats(&Endpoint::database("mysql", "db:3306"))
            .await
            .unwrap_err();
        assert!(matches!(err, DataflowError::StorageQuery { .. }));
    }

    #[tokio::test]
    async fn test_system_provider_delegates_databases() {
        let devices = StaticStatProvider::new().with("db:3306", StorageStats::from_total_free(500, 290));
        let provider = SystemStatProvider::new().with_device_info(Arc::new(devices));

        let stats = provider.stats(&Endpoint::database("mysql", "db:3306")).await.unwrap();
        assert_eq!(stats.total_bytes, 500);
    }
}
