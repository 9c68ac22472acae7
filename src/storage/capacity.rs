//! Capacity evaluation
//!
//! Classifies an endpoint's free space against the transfer size and the
//! configured thresholds. Status is decided in priority order:
//!
//! | Condition | Status |
//! |-----------|--------|
//! | provider query failed | `error` |
//! | usage >= critical (95%) | `critical` |
//! | usage >= warning (85%) | `warning` |
//! | free < required | `insufficient` |
//! | free - required < total * margin (10%) | `marginal` |
//! | otherwise | `healthy` |

use crate::config::CapacityThresholds;
use crate::error::DataflowError;
use crate::model::Endpoint;
use crate::storage::{StorageStatProvider, StorageStats};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Capacity health of one endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapacityStatus {
    Healthy,
    Marginal,
    Insufficient,
    Warning,
    Critical,
    Error,
}

impl CapacityStatus {
    /// Ordering used for severity comparisons; `None` for `error`,
    /// which is not comparable with the others
    pub fn severity(&self) -> Option<u8> {
        match self {
            Self::Healthy => Some(0),
            Self::Marginal => Some(1),
            Self::Insufficient => Some(2),
            Self::Warning => Some(3),
            Self::Critical => Some(4),
            Self::Error => None,
        }
    }
}

impl fmt::Display for CapacityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Healthy => "healthy",
            Self::Marginal => "marginal",
            Self::Insufficient => "insufficient",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Capacity check result for one endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityReport {
    /// Classification
    pub status: CapacityStatus,
    /// Total capacity in bytes
    pub total_bytes: u64,
    /// Used bytes
    pub used_bytes: u64,
    /// Free bytes
    pub free_bytes: u64,
    /// Usage ratio in [0, 1]
    pub percent_used: f64,
    /// Bytes the transfer needs
    pub required_bytes: u64,
    /// Required bytes fit in free space
    pub fits: bool,
    /// Required bytes fit and the safety margin remains
    pub fits_with_margin: bool,
    /// Free space left after the transfer (negative when it does not fit)
    pub available_after_migration: i64,
    /// Query failure, only set when status is `error`
    pub error: Option<String>,
}

impl CapacityReport {
    /// Classify successfully queried stats
    pub fn classify(stats: StorageStats, required_bytes: u64, thresholds: &CapacityThresholds) -> Self {
        let percent_used = stats.percent_used();
        let fits = stats.free_bytes >= required_bytes;
        let margin = stats.total_bytes as f64 * thresholds.safety_margin;
        let fits_with_margin =
            fits && (stats.free_bytes - required_bytes) as f64 >= margin;

        let status = if percent_used >= thresholds.critical {
            CapacityStatus::Critical
        } else if percent_used >= thresholds.warning {
            CapacityStatus::Warning
        } else if !fits {
            CapacityStatus::Insufficient
        } else if !fits_with_margin {
            CapacityStatus::Marginal
        } else {
            CapacityStatus::Healthy
        };

        Self {
            status,
            total_bytes: stats.total_bytes,
            used_bytes: stats.used_bytes,
            free_bytes: stats.free_bytes,
            percent_used,
            required_bytes,
            fits,
            fits_with_margin,
            available_after_migration: signed_difference(stats.free_bytes, required_bytes),
            error: None,
        }
    }

    /// Report for an endpoint whose capacity could not be queried
    pub fn unknown(required_bytes: u64, error: &DataflowError) -> Self {
        Self {
            status: CapacityStatus::Error,
            total_bytes: 0,
            used_bytes: 0,
            free_bytes: 0,
            percent_used: 0.0,
            required_bytes,
            fits: false,
            fits_with_margin: false,
            available_after_migration: 0,
            error: Some(error.to_string()),
        }
    }

    /// One-line human summary
    pub fn summary(&self) -> String {
        if let Some(error) = &self.error {
            return format!("{} ({})", self.status, error);
        }
        format!(
            "{}: {} free of {} ({:.1}% used)",
            self.status,
            humansize::format_size(self.free_bytes, humansize::BINARY),
            humansize::format_size(self.total_bytes, humansize::BINARY),
            self.percent_used * 100.0
        )
    }
}

fn signed_difference(a: u64, b: u64) -> i64 {
    let a = i64::try_from(a).unwrap_or(i64::MAX);
    let b = i64::try_from(b).unwrap_or(i64::MAX);
    a.saturating_sub(b)
}

/// Source/destination capacity verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageComparison {
    /// Source report (checked with no required size)
    pub source: CapacityReport,
    /// Destination report
    pub destination: CapacityReport,
    /// Destination can hold the data
    pub can_migrate: bool,
    /// Destination can hold the data and keep its margin
    pub can_migrate_safely: bool,
    /// Destination free space minus transfer size
    pub size_difference: i64,
    /// Human-facing warnings
    pub warnings: Vec<String>,
}

/// Capacity evaluator
#[derive(Clone)]
pub struct CapacityEvaluator {
    provider: Arc<dyn StorageStatProvider>,
    thresholds: CapacityThresholds,
}

impl CapacityEvaluator {
    /// Create an evaluator over `provider`
    pub fn new(provider: Arc<dyn StorageStatProvider>, thresholds: CapacityThresholds) -> Self {
        Self {
            provider,
            thresholds,
        }
    }

    /// Check one endpoint; query failures become an `error` report
    pub async fn check_capacity(&self, endpoint: &Endpoint, required_bytes: u64) -> CapacityReport {
        match self.provider.stats(endpoint).await {
            Ok(stats) => {
                let report = CapacityReport::classify(stats, required_bytes, &self.thresholds);
                tracing::debug!(endpoint = %endpoint, status = %report.status, "capacity checked");
                report
            }
            Err(e) => {
                tracing::warn!(endpoint = %endpoint, error = %e, "capacity query failed");
                CapacityReport::unknown(required_bytes, &e)
            }
        }
    }

    /// Compare source and destination for a transfer of `size` bytes
    pub async fn compare(&self, source: &Endpoint, destination: &Endpoint, size: u64) -> StorageComparison {
        let (source_report, dest_report) = futures::join!(
            self.check_capacity(source, 0),
            self.check_capacity(destination, size)
        );
        self.comparison(source_report, dest_report, size)
    }

    /// Compose two reports into a migration-readiness verdict
    pub fn comparison(
        &self,
        source: CapacityReport,
        destination: CapacityReport,
        size: u64,
    ) -> StorageComparison {
        let can_migrate = destination.fits;
        let can_migrate_safely = destination.fits_with_margin;

        let mut warnings = Vec::new();
        if destination.status == CapacityStatus::Error {
            warnings.push("Destination capacity could not be determined".to_string());
        } else if !can_migrate {
            warnings.push("Destination has insufficient space for migration".to_string());
        } else if !can_migrate_safely {
            warnings.push(format!(
                "Destination will have less than {:.0}% free space after migration",
                self.thresholds.safety_margin * 100.0
            ));
        }

        if source.status == CapacityStatus::Critical {
            warnings.push("Source storage is critically full".to_string());
        }

        StorageComparison {
            size_difference: signed_difference(destination.free_bytes, size),
            source,
            destination,
            can_migrate,
            can_migrate_safely,
            warnings,
        }
    }
}

/// Storage-side recommendations for a proposed migration
pub fn storage_recommendations(
    source: &CapacityReport,
    destination: &CapacityReport,
    compatible: bool,
) -> Vec<String> {
    let mut recommendations = Vec::new();

    match source.status {
        CapacityStatus::Critical => recommendations
            .push("Source storage is critically full. Consider cleaning up before migration".to_string()),
        CapacityStatus::Warning => recommendations
            .push("Source storage is getting full. Monitor usage during migration".to_string()),
        _ => {}
    }

    if !destination.fits {
        recommendations.push(
            "Destination has insufficient space. Free up space or choose another destination".to_string(),
        );
    } else if !destination.fits_with_margin {
        recommendations.push(
            "Destination will have limited space after migration. Consider cleaning up destination first"
                .to_string(),
        );
    }

    match destination.status {
        CapacityStatus::Critical => recommendations
            .push("Destination storage is critically full. Not recommended for migration".to_string()),
        CapacityStatus::Warning => recommendations
            .push("Destination storage is getting full. Consider alternative storage".to_string()),
        _ => {}
    }

    if !compatible {
        recommendations
            .push("Compatibility issues detected. Consider data conversion before migration".to_string());
    }

    recommendations.push("Always verify data integrity after migration".to_string());
    recommendations.push("Keep backups of important data before migration".to_string());

    recommendations
}
