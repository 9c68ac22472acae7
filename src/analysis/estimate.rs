//! Transfer time estimates

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Assumed link speed when none is configured, in MB/s
pub const DEFAULT_SPEED_MBPS: f64 = 50.0;

/// Protocol and bookkeeping overhead added on top of raw transfer time
const OVERHEAD: f64 = 1.2;

/// Estimated wall-clock time for a transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferEstimate {
    /// Seconds including overhead
    pub total_seconds: f64,
    /// `HH:MM:SS`
    pub estimated_time: String,
    /// Speed the estimate assumed, in MB/s
    pub speed_mbps: f64,
    /// Transfer size in MiB
    pub size_mb: f64,
}

impl TransferEstimate {
    /// Estimate as a duration
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.total_seconds.max(0.0))
    }

    /// Estimate in humantime notation, rounded to whole seconds ("1h 2m 3s")
    pub fn human(&self) -> String {
        humantime::format_duration(Duration::from_secs(self.total_seconds as u64)).to_string()
    }
}

/// Estimate how long moving `total_bytes` takes at `speed_mbps`
///
/// Non-positive speeds fall back to 1 MB/s.
pub fn estimate_transfer_time(total_bytes: u64, speed_mbps: f64) -> TransferEstimate {
    let speed_mbps = if speed_mbps > 0.0 { speed_mbps } else { 1.0 };
    let size_mb = total_bytes as f64 / (1024.0 * 1024.0);
    let total_seconds = size_mb / speed_mbps * OVERHEAD;

    TransferEstimate {
        total_seconds,
        estimated_time: format_hms(total_seconds),
        speed_mbps,
        size_mb,
    }
}

/// Format seconds as zero-padded `HH:MM:SS`; hours may exceed two digits
pub fn format_hms(seconds: f64) -> String {
    let secs = seconds.max(0.0) as u64;
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
