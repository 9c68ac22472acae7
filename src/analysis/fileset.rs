//! File set analysis and batch planning

use crate::model::Manifest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// Extensions expected to shrink well under general-purpose compression
pub const COMPRESSIBLE_EXTENSIONS: &[&str] = &[
    "txt", "csv", "json", "xml", "log", "html", "css", "js", "doc", "docx", "pdf",
];

/// Expected saving for compressible bytes
const COMPRESSIBLE_SAVING: f64 = 0.6;
/// Expected saving for everything else
const OTHER_SAVING: f64 = 0.1;

/// Largest parallel transfer count a plan recommends
pub const MAX_PARALLEL_TRANSFERS: u64 = 5;

/// Largest file seen in a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LargestFile {
    pub path: String,
    pub size_bytes: u64,
}

/// How to split a transfer into batches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPlan {
    /// Target bytes per batch
    pub batch_size_bytes: u64,
    /// Average files per batch
    pub files_per_batch: u64,
    /// Number of batches, at least 1
    pub total_batches: u64,
    /// Suggested concurrent batch transfers
    pub max_parallel_transfers: u64,
}

impl BatchPlan {
    /// Plan for `total_bytes` spread over `file_count` files
    pub fn for_size(total_bytes: u64, file_count: u64) -> Self {
        if total_bytes < 100 * MIB {
            return Self {
                batch_size_bytes: total_bytes,
                files_per_batch: file_count.max(1),
                total_batches: 1,
                max_parallel_transfers: 1,
            };
        }

        let batch_size_bytes = if total_bytes < GIB {
            100 * MIB
        } else if total_bytes < 10 * GIB {
            500 * MIB
        } else {
            GIB
        };
        let total_batches = (total_bytes / batch_size_bytes).max(1);

        Self {
            batch_size_bytes,
            files_per_batch: (file_count / total_batches).max(1),
            total_batches,
            max_parallel_transfers: total_batches.min(MAX_PARALLEL_TRANSFERS),
        }
    }
}

/// Aggregate view of a manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSetAnalysis {
    pub total_files: u64,
    pub total_bytes: u64,
    /// Extension -> total bytes; files without an extension are left out
    pub type_histogram: BTreeMap<String, u64>,
    pub largest_file: Option<LargestFile>,
    pub compressible_bytes: u64,
    pub compressible_files: u64,
    /// Expected fraction of bytes saved by compression, in [0, 1]
    pub estimated_compression_ratio: f64,
    pub estimated_size_after_compression: u64,
    pub batch_plan: BatchPlan,
}

impl FileSetAnalysis {
    /// Human-readable total size
    pub fn total_size_human(&self) -> String {
        humansize::format_size(self.total_bytes, humansize::BINARY)
    }

    /// Transfer optimization advice, most specific first
    pub fn recommendations(&self) -> Vec<String> {
        let mut recs = Vec::new();

        if self.total_bytes > 5 * GIB {
            recs.push("Large dataset detected. Consider migrating during off-peak hours".to_string());
            recs.push("Enable compression to reduce transfer size".to_string());
        } else if self.total_bytes < 10 * MIB {
            recs.push("Small dataset. Single transfer recommended for efficiency".to_string());
        }

        if self.total_files > 1000 {
            recs.push(format!(
                "High file count ({}). Consider archiving files before migration",
                self.total_files
            ));
        }

        if self.estimated_compression_ratio > 0.3 {
            recs.push(format!(
                "High compression potential ({:.1}%). Enable compression for faster transfer",
                self.estimated_compression_ratio * 100.0
            ));
        }

        if self.batch_plan.total_batches > 1 {
            recs.push(format!(
                "Split migration into {} batches for reliability",
                self.batch_plan.total_batches
            ));
            recs.push(format!(
                "Use {} parallel transfers for optimal speed",
                self.batch_plan.max_parallel_transfers
            ));
        }

        recs.push("Verify checksums after migration to ensure data integrity".to_string());
        recs.push("Keep source data until migration is verified complete".to_string());
        recs
    }
}

/// Whether files with this (lowercased) extension compress well
pub fn is_compressible(extension: &str) -> bool {
    COMPRESSIBLE_EXTENSIONS.contains(&extension)
}

/// Weighted compression estimate for a compressible share of the bytes
pub fn estimate_compression_ratio(compressible_bytes: u64, total_bytes: u64) -> f64 {
    if total_bytes == 0 {
        return 0.0;
    }
    let fraction = compressible_bytes as f64 / total_bytes as f64;
    (fraction * COMPRESSIBLE_SAVING + (1.0 - fraction) * OTHER_SAVING).clamp(0.0, 1.0)
}

/// Single-pass manifest analyzer
#[derive(Debug, Clone, Default)]
pub struct FileSetAnalyzer;

impl FileSetAnalyzer {
    /// Create an analyzer
    pub fn new() -> Self {
        Self
    }

    /// Analyze every entry of `manifest`
    pub fn analyze(&self, manifest: &Manifest) -> FileSetAnalysis {
        let mut total_bytes = 0u64;
        let mut compressible_bytes = 0u64;
        let mut compressible_files = 0u64;
        let mut type_histogram: BTreeMap<String, u64> = BTreeMap::new();
        let mut largest_file: Option<LargestFile> = None;

        for entry in manifest.iter() {
            total_bytes = total_bytes.saturating_add(entry.size_bytes);

            if let Some(ext) = entry.extension() {
                if is_compressible(&ext) {
                    compressible_bytes = compressible_bytes.saturating_add(entry.size_bytes);
                    compressible_files += 1;
                }
                let bytes = type_histogram.entry(ext).or_default();
                *bytes = bytes.saturating_add(entry.size_bytes);
            }

            // Strictly greater keeps the first of equal-sized files
            if largest_file.as_ref().map_or(true, |l| entry.size_bytes > l.size_bytes) {
                largest_file = Some(LargestFile {
                    path: entry.path.clone(),
                    size_bytes: entry.size_bytes,
                });
            }
        }

        let total_files = manifest.len() as u64;
        let estimated_compression_ratio = estimate_compression_ratio(compressible_bytes, total_bytes);

        FileSetAnalysis {
            total_files,
            total_bytes,
            type_histogram,
            largest_file,
            compressible_bytes,
            compressible_files,
            estimated_compression_ratio,
            estimated_size_after_compression: (total_bytes as f64
                * (1.0 - estimated_compression_ratio)) as u64,
            batch_plan: BatchPlan::for_size(total_bytes, total_files),
        }
    }
}
