//! Request and response models for the service facade

use crate::analysis::{CompatibilityReport, FileSetAnalysis, TransferEstimate};
use crate::error::{IoResultExt, Result};
use crate::model::{Endpoint, JobSettings, Manifest};
use crate::storage::StorageComparison;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A proposed migration as callers describe it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRequest {
    pub source: Endpoint,
    pub destination: Endpoint,
    /// Files to move
    #[serde(default, alias = "files")]
    pub manifest: Manifest,
    #[serde(default)]
    pub settings: JobSettings,
}

impl MigrationRequest {
    /// Read a request from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_path(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Combined capacity, compatibility and file-set verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeasibilityReport {
    /// Capacity of both sides and the readiness verdict
    pub storage: StorageComparison,
    pub compatibility: CompatibilityReport,
    pub file_analysis: FileSetAnalysis,
    pub estimate: TransferEstimate,
    /// Storage advice followed by transfer optimization advice
    pub recommendations: Vec<String>,
    /// Destination has room; under strict compatibility the endpoints must
    /// also be compatible
    pub can_migrate: bool,
    /// As `can_migrate`, with the destination keeping its free-space margin
    pub can_migrate_safely: bool,
}

/// Overall service health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Slots available
    Healthy,
    /// Every slot busy and jobs are waiting
    Saturated,
}

/// Snapshot of the coordinator's load
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub version: String,
    pub health: HealthStatus,
    pub active_jobs: usize,
    pub queued_jobs: usize,
    pub max_concurrent: usize,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EndpointKind;

    #[test]
    fn test_request_accepts_legacy_shape() {
        let request: MigrationRequest = serde_json::from_str(
            r#"{
                "source": {"type": "local", "path": "/data"},
                "destination": {"type": "nas", "path": "/mnt/nas", "protocol": "smb"},
                "files": [{"filename": "a.csv", "size": 100}]
            }"#,
        )
        .unwrap();

        assert_eq!(request.destination.kind, EndpointKind::NetworkShare);
        assert_eq!(request.manifest.total_bytes(), 100);
        assert_eq!(request.settings, JobSettings::default());
    }
}
