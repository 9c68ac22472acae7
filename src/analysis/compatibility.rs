//! Endpoint compatibility scoring

use crate::model::{Endpoint, EndpointKind};
use serde::{Deserialize, Serialize};

/// Database engines the coordinator knows how to move data between
pub const SUPPORTED_DATABASES: &[&str] =
    &["mysql", "postgresql", "mongodb", "sqlite", "oracle", "sqlserver"];

/// Device classes accepted for removable endpoints
pub const SUPPORTED_DEVICES: &[&str] = &[
    "phone", "computer", "server", "nas", "camera", "usb-drive", "sd-card",
];

/// Minimum score for a pair to count as compatible
pub const COMPATIBLE_SCORE: u8 = 70;

const UNSUPPORTED_PENALTY: i32 = 30;
const CROSS_FAMILY_PENALTY: i32 = 20;
const CROSS_OS_PENALTY: i32 = 10;
const PROTOCOL_PENALTY: i32 = 15;

/// Result of scoring a source/destination pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityReport {
    /// 0-100, higher is better
    pub score: u8,
    /// `score >= 70`
    pub compatible: bool,
    /// Problems found, in rule order
    pub issues: Vec<String>,
    /// Advice for this pair, generic guidance last
    pub recommendations: Vec<String>,
}

impl CompatibilityReport {
    /// Issues joined into one line
    pub fn summary(&self) -> String {
        if self.issues.is_empty() {
            "no issues".to_string()
        } else {
            self.issues.join("; ")
        }
    }
}

/// Scores how well two endpoints interoperate
///
/// Pure function of the two endpoints: the same pair always yields the same
/// report.
#[derive(Debug, Clone, Default)]
pub struct CompatibilityAnalyzer;

impl CompatibilityAnalyzer {
    /// Create an analyzer
    pub fn new() -> Self {
        Self
    }

    /// Score `source -> destination`
    pub fn analyze(&self, source: &Endpoint, destination: &Endpoint) -> CompatibilityReport {
        let mut score: i32 = 100;

        if !is_supported(source) {
            score -= UNSUPPORTED_PENALTY;
        }
        if !is_supported(destination) {
            score -= UNSUPPORTED_PENALTY;
        }

        if source.kind == EndpointKind::Database
            && destination.kind == EndpointKind::Database
            && source.family_normalized() != destination.family_normalized()
        {
            score -= CROSS_FAMILY_PENALTY;
        }

        if let (Some(a), Some(b)) = (&source.operating_system, &destination.operating_system) {
            if !a.trim().eq_ignore_ascii_case(b.trim()) {
                score -= CROSS_OS_PENALTY;
            }
        }

        if !source.protocol().eq_ignore_ascii_case(destination.protocol()) {
            score -= PROTOCOL_PENALTY;
        }

        let score = score.clamp(0, 100) as u8;
        CompatibilityReport {
            score,
            compatible: score >= COMPATIBLE_SCORE,
            issues: issues(source, destination, score),
            recommendations: recommendations(source, destination),
        }
    }
}

/// Databases need a known engine; removable devices that declare a class
/// need a known class. Every other kind is always supported.
fn is_supported(endpoint: &Endpoint) -> bool {
    match endpoint.kind {
        EndpointKind::Database => endpoint
            .family_normalized()
            .is_some_and(|f| SUPPORTED_DATABASES.contains(&f.as_str())),
        EndpointKind::RemovableDevice => endpoint
            .family_normalized()
            .map_or(true, |f| SUPPORTED_DEVICES.contains(&f.as_str())),
        _ => true,
    }
}

fn issues(source: &Endpoint, destination: &Endpoint, score: u8) -> Vec<String> {
    let mut issues = Vec::new();

    if score < 100 {
        issues.push("Partial compatibility detected".to_string());
    }
    if source.is_phone() && destination.kind == EndpointKind::Database {
        issues.push(
            "Direct phone to database migration may require intermediate storage".to_string(),
        );
    }
    if source.encrypted && !destination.supports_encryption {
        issues.push("Source is encrypted but destination may not support encryption".to_string());
    }

    issues
}

fn recommendations(source: &Endpoint, destination: &Endpoint) -> Vec<String> {
    let mut recs = Vec::new();

    match (source.kind, destination.kind) {
        (EndpointKind::Database, EndpointKind::Database) => {
            recs.push(
                "Consider using database-native export/import tools for better performance"
                    .to_string(),
            );
            recs.push("Verify data types are compatible between database systems".to_string());
        }
        (kind, EndpointKind::Database) if kind.is_file_based() => {
            recs.push("Convert files to database-compatible format before migration".to_string());
            recs.push("Consider using CSV or JSON as intermediate format".to_string());
        }
        (EndpointKind::Database, _) => {
            recs.push("Export the database to a portable dump (SQL or CSV) before copying".to_string());
        }
        _ => {}
    }

    recs.push("Perform a test migration with a small dataset first".to_string());
    recs.push("Verify network connectivity and bandwidth".to_string());
    recs
}
