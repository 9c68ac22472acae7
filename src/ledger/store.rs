//! Cached job ledger

use crate::error::{DataflowError, Result};
use crate::ledger::{LedgerBackend, MemoryBackend};
use crate::model::{JobStatus, MigrationJob};
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Job records keyed by id, backed by a [`LedgerBackend`]
///
/// Writes to different jobs never wait on each other beyond the brief cache
/// insert; writes to the same job must come from one writer at a time.
pub struct JobLedger {
    backend: Arc<dyn LedgerBackend>,
    cache: RwLock<HashMap<String, MigrationJob>>,
}

impl JobLedger {
    /// Open a ledger, loading every record the backend holds
    pub fn open(backend: Arc<dyn LedgerBackend>) -> Result<Self> {
        let jobs = backend.load()?;
        tracing::debug!(backend = %backend.describe(), records = jobs.len(), "ledger loaded");

        let cache = jobs.into_iter().map(|j| (j.id.clone(), j)).collect();
        Ok(Self {
            backend,
            cache: RwLock::new(cache),
        })
    }

    /// Ledger that lives in memory only
    pub fn in_memory() -> Self {
        Self {
            backend: Arc::new(MemoryBackend::new()),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or replace the record for `job.id`
    ///
    /// The record is only visible to readers once the backend accepted it.
    pub fn put(&self, job: &MigrationJob) -> Result<()> {
        self.backend.store(job)?;
        self.cache.write().insert(job.id.clone(), job.clone());
        Ok(())
    }

    /// Record for `id`
    pub fn get(&self, id: &str) -> Result<MigrationJob> {
        self.cache
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| DataflowError::JobNotFound(id.to_string()))
    }

    /// Up to `limit` records, newest `created_at` first
    pub fn list(&self, limit: usize) -> Vec<MigrationJob> {
        let cache = self.cache.read();
        let mut jobs: Vec<&MigrationJob> = cache.values().collect();
        // Ids embed the creation second, so they break ties within one second
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        jobs.into_iter().take(limit).cloned().collect()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }

    /// Aggregate statistics over jobs created in the last `days` days
    ///
    /// Windows reaching past the representable calendar cover every job;
    /// negative windows cover none.
    pub fn stats(&self, days: i64) -> LedgerStats {
        let cutoff = TimeDelta::try_days(days.max(0))
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let cache = self.cache.read();
        let jobs: Vec<_> = cache.values().filter(|j| j.created_at > cutoff).collect();

        let count = |status: JobStatus| jobs.iter().filter(|j| j.status == status).count();
        let completed_jobs = count(JobStatus::Completed);
        let failed_jobs = count(JobStatus::Failed);
        let cancelled_jobs = count(JobStatus::Cancelled);
        let finished = completed_jobs + failed_jobs + cancelled_jobs;

        let durations: Vec<f64> = jobs
            .iter()
            .filter(|j| j.status == JobStatus::Completed)
            .filter_map(|j| j.elapsed_seconds())
            .collect();
        let avg_job_duration = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<f64>() / durations.len() as f64
        };

        LedgerStats {
            period_days: days,
            total_jobs: jobs.len(),
            completed_jobs,
            failed_jobs,
            cancelled_jobs,
            active_jobs: jobs.len() - finished,
            total_bytes_transferred: jobs
                .iter()
                .fold(0, |acc, j| acc.saturating_add(j.bytes_transferred)),
            total_files_transferred: jobs
                .iter()
                .fold(0, |acc, j| acc.saturating_add(j.files_transferred)),
            success_rate: if finished > 0 {
                completed_jobs as f64 / finished as f64 * 100.0
            } else {
                0.0
            },
            avg_job_duration,
        }
    }
}

/// Aggregate ledger statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerStats {
    /// Look-back window in days
    pub period_days: i64,
    /// Jobs created in the window
    pub total_jobs: usize,
    /// Completed jobs
    pub completed_jobs: usize,
    /// Failed jobs
    pub failed_jobs: usize,
    /// Cancelled jobs
    pub cancelled_jobs: usize,
    /// Jobs not yet finished
    pub active_jobs: usize,
    /// Bytes moved across all jobs
    pub total_bytes_transferred: u64,
    /// Files moved across all jobs
    pub total_files_transferred: u64,
    /// Completed share of finished jobs (0-100)
    pub success_rate: f64,
    /// Mean duration of completed jobs in seconds
    pub avg_job_duration: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::JsonFileBackend;
    use chrono::Duration;
    use crate::model::{Endpoint, JobSettings, Manifest};
    use std::thread;
    use tempfile::TempDir;

    fn job(id: &str, age_secs: i64) -> MigrationJob {
        let mut job = MigrationJob::new(
            id,
            Endpoint::local("/a"),
            Endpoint::local("/b"),
            Manifest::default(),
            JobSettings::default(),
        );
        job.created_at = Utc::now() - Duration::seconds(age_secs);
        job
    }

    #[test]
    fn test_get_missing() {
        let ledger = JobLedger::in_memory();
        assert!(matches!(ledger.get("nope"), Err(DataflowError::JobNotFound(id)) if id == "nope"));
    }

    #[test]
    fn test_put_replaces_by_id() {
        let ledger = JobLedger::in_memory();
        let mut j = job("mig_a", 0);
        ledger.put(&j).unwrap();
        j.bytes_transferred = 42;
        ledger.put(&j).unwrap();

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get("mig_a").unwrap().bytes_transferred, 42);
    }

    #[test]
    fn test_list_newest_first() {
        let ledger = JobLedger::in_memory();
        ledger.put(&job("mig_old", 300)).unwrap();
        ledger.put(&job("mig_new", 10)).unwrap();
        ledger.put(&job("mig_mid", 100)).unwrap();

        let ids: Vec<_> = ledger.list(10).into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec!["mig_new", "mig_mid", "mig_old"]);

        let ids: Vec<_> = ledger.list(2).into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec!["mig_new", "mig_mid"]);
        assert!(ledger.list(0).is_empty());
    }

    #[test]
    fn test_reopen_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs");

        {
            let ledger = JobLedger::open(Arc::new(JsonFileBackend::new(&path).unwrap())).unwrap();
            ledger.put(&job("mig_1", 5)).unwrap();
            ledger.put(&job("mig_2", 1)).unwrap();
        }

        let ledger = JobLedger::open(Arc::new(JsonFileBackend::new(&path).unwrap())).unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.list(1)[0].id, "mig_2");
    }

    #[test]
    fn test_stats() {
        let ledger = JobLedger::in_memory();

        let mut done = job("mig_done", 60);
        done.transition(JobStatus::Initializing).unwrap();
        done.transition(JobStatus::InProgress).unwrap();
        done.started_at = Some(Utc::now() - Duration::seconds(20));
        done.bytes_transferred = 1000;
        done.transition(JobStatus::Completed).unwrap();
        ledger.put(&done).unwrap();

        let mut failed = job("mig_failed", 30);
        failed.transition(JobStatus::Initializing).unwrap();
        failed.fail("boom").unwrap();
        ledger.put(&failed).unwrap();

        ledger.put(&job("mig_queued", 1)).unwrap();
        ledger.put(&job("mig_ancient", 40 * 24 * 3600)).unwrap();

        let stats = ledger.stats(30);
        assert_eq!(stats.total_jobs, 3);
        assert_eq!(stats.completed_jobs, 1);
        assert_eq!(stats.failed_jobs, 1);
        assert_eq!(stats.active_jobs, 1);
        assert_eq!(stats.total_bytes_transferred, 1000);
        assert!((stats.success_rate - 50.0).abs() < 1e-9);
        assert!(stats.avg_job_duration >= 19.0);
    }

    #[test]
    fn test_stats_window_extremes() {
        let ledger = JobLedger::in_memory();
        let mut big = job("mig_big", 60);
        big.bytes_transferred = u64::MAX;
        ledger.put(&big).unwrap();
        let mut more = job("mig_more", 40 * 24 * 3600);
        more.bytes_transferred = 10;
        ledger.put(&more).unwrap();

        let all = ledger.stats(i64::MAX);
        assert_eq!(all.total_jobs, 2);
        assert_eq!(all.total_bytes_transferred, u64::MAX);

        assert_eq!(ledger.stats(-5).total_jobs, 0);
    }

    #[test]
    fn test_concurrent_reads_during_writes() {
        let ledger = Arc::new(JobLedger::in_memory());
        let writer = {
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || {
                let mut j = job("mig_hot", 0);
                for i in 0..200 {
                    j.bytes_transferred = i;
                    ledger.put(&j).unwrap();
                }
            })
        };

        let mut last = 0;
        while !writer.is_finished() {
            if let Ok(j) = ledger.get("mig_hot") {
                // Snapshots only ever move forward
                assert!(j.bytes_transferred >= last);
                last = j.bytes_transferred;
            }
        }
        writer.join().unwrap();
        assert_eq!(ledger.get("mig_hot").unwrap().bytes_transferred, 199);
    }
}
