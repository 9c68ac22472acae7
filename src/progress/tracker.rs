//! Throughput and ETA tracking

use std::time::{Duration, Instant};

/// Byte/file counters for one running transfer, owned by the task driving it
///
/// Readers see progress through the job snapshots that task publishes.
#[derive(Debug, Clone)]
pub struct TransferTracker {
    start_time: Instant,
    total_bytes: u64,
    bytes_done: u64,
    files_done: u64,
}

impl TransferTracker {
    /// Start tracking a transfer of `total_bytes`
    pub fn new(total_bytes: u64) -> Self {
        Self::started_at(Instant::now(), total_bytes)
    }

    /// Start tracking from an explicit start instant
    pub fn started_at(start_time: Instant, total_bytes: u64) -> Self {
        Self {
            start_time,
            total_bytes,
            bytes_done: 0,
            files_done: 0,
        }
    }

    /// Record a finished unit of work
    pub fn record(&mut self, bytes: u64, files: u64) {
        self.bytes_done = self.bytes_done.saturating_add(bytes);
        self.files_done = self.files_done.saturating_add(files);
    }

    /// Bytes recorded so far
    pub fn bytes_done(&self) -> u64 {
        self.bytes_done
    }

    /// Files recorded so far
    pub fn files_done(&self) -> u64 {
        self.files_done
    }

    /// Time since tracking started
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Completion in percent; a zero-byte transfer is 0 until marked done
    pub fn percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.bytes_done() as f64 / self.total_bytes as f64 * 100.0).min(100.0)
    }

    /// Average throughput in bytes/second
    pub fn throughput(&self) -> f64 {
        throughput(self.bytes_done(), self.elapsed())
    }

    /// Seconds left at the current average throughput
    pub fn eta_seconds(&self) -> Option<u64> {
        eta_seconds(self.total_bytes, self.bytes_done(), self.throughput())
    }
}

/// Bytes per second over `elapsed`
pub fn throughput(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        bytes as f64 / secs
    } else {
        0.0
    }
}

/// Remaining seconds, or `None` until there is a rate to extrapolate from
pub fn eta_seconds(total_bytes: u64, bytes_done: u64, throughput: f64) -> Option<u64> {
    if bytes_done == 0 || total_bytes == 0 || throughput <= 0.0 {
        return None;
    }
    let remaining = total_bytes.saturating_sub(bytes_done);
    Some((remaining as f64 / throughput).ceil() as u64)
}
