//! Job coordinator
//!
//! Owns every migration job from submission until it reaches a terminal
//! state. Each admitted job runs in its own supervised task; the task is the
//! only writer of that job's record, and readers only ever see snapshots
//! copied out of the job table.
//!
//! ## Lifecycle
//!
//! ```text
//! submit --> queued --(slot)--> initializing --(begin)--> in_progress
//!               |                    |                        |
//!               '--> cancelled <-----+-----------<------------+
//!                                    '--> failed <------------+
//!                                                             '--> completed
//! ```

use crate::analysis::{BatchPlan, CompatibilityAnalyzer};
use crate::config::CoordinatorConfig;
use crate::core::{build_batches, Admission, AdmissionQueue, Batch, TransferContext, TransferExecutor};
use crate::error::{DataflowError, Result};
use crate::ledger::JobLedger;
use crate::model::{Endpoint, JobSettings, JobStatus, Manifest, MigrationJob};
use crate::progress::TransferTracker;
use chrono::Utc;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Minimum spacing between ledger writes of per-batch progress
const PROGRESS_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// What a cancellation request did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job was still queued and is now cancelled
    Cancelled,
    /// The job is running; it stops at its next batch boundary
    Requested,
}

struct JobEntry {
    job: MigrationJob,
    cancel: Arc<AtomicBool>,
    status: watch::Sender<JobStatus>,
    finished_at: Option<Instant>,
}

struct Inner {
    config: CoordinatorConfig,
    jobs: RwLock<HashMap<String, JobEntry>>,
    admission: AdmissionQueue,
    ledger: Arc<JobLedger>,
    executor: Arc<dyn TransferExecutor>,
    compatibility: CompatibilityAnalyzer,
}

/// Schedules, runs and tracks migration jobs
///
/// Cheap to clone; clones share the same job table. Submitting requires a
/// running Tokio runtime.
#[derive(Clone)]
pub struct JobCoordinator {
    inner: Arc<Inner>,
}

impl JobCoordinator {
    /// Create a coordinator
    ///
    /// Records the ledger still shows as unfinished belong to a previous
    /// process and are closed out: queued ones as cancelled, running ones as
    /// failed.
    pub fn new(
        config: CoordinatorConfig,
        ledger: Arc<JobLedger>,
        executor: Arc<dyn TransferExecutor>,
    ) -> Self {
        let inner = Inner {
            admission: AdmissionQueue::new(config.max_concurrent),
            config,
            jobs: RwLock::new(HashMap::new()),
            ledger,
            executor,
            compatibility: CompatibilityAnalyzer::new(),
        };
        inner.close_interrupted();

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// Ledger this coordinator writes to
    pub fn ledger(&self) -> &Arc<JobLedger> {
        &self.inner.ledger
    }

    /// Create a job and schedule it, returning its id
    ///
    /// The job starts immediately when a slot is free and waits in FIFO
    /// order otherwise. Manifests naming paths outside the endpoint roots
    /// are rejected.
    pub fn submit(
        &self,
        source: Endpoint,
        destination: Endpoint,
        manifest: Manifest,
        settings: JobSettings,
    ) -> Result<String> {
        manifest.validate()?;

        let report = self.inner.compatibility.analyze(&source, &destination);
        if !report.compatible {
            if self.inner.config.strict_compatibility {
                return Err(DataflowError::IncompatibleEndpoints {
                    score: report.score,
                    summary: report.summary(),
                });
            }
            tracing::warn!(
                score = report.score,
                issues = %report.summary(),
                "submitting job with incompatible endpoints"
            );
        }

        self.inner.prune_expired();

        let id = MigrationJob::generate_id();
        let mut job = MigrationJob::new(id.clone(), source, destination, manifest, settings);

        // The queued record reaches the ledger before anything can move it on
        self.inner.ledger.put(&job)?;

        let cancel = Arc::new(AtomicBool::new(false));
        let admission = {
            let mut jobs = self.inner.jobs.write();
            let admission = self.inner.admission.admit_or_enqueue(&id);
            if admission == Admission::Admitted {
                job.transition(JobStatus::Initializing)?;
            }
            let (status, _) = watch::channel(job.status);
            jobs.insert(
                id.clone(),
                JobEntry {
                    job: job.clone(),
                    cancel: Arc::clone(&cancel),
                    status,
                    finished_at: None,
                },
            );
            admission
        };

        match admission {
            Admission::Admitted => {
                tracing::info!(job = %id, bytes = job.total_bytes, files = job.file_manifest.len(), "job admitted");
                self.inner.persist(&job);
                self.inner.spawn(id.clone(), cancel);
            }
            Admission::Queued { position } => {
                tracing::info!(job = %id, position, "job queued, all slots busy");
            }
        }

        Ok(id)
    }

    /// Latest snapshot of a job
    pub fn get(&self, id: &str) -> Result<MigrationJob> {
        if let Some(entry) = self.inner.jobs.read().get(id) {
            return Ok(entry.job.clone());
        }
        self.inner.ledger.get(id)
    }

    /// Most recent jobs, newest first
    pub fn list(&self, limit: usize) -> Vec<MigrationJob> {
        self.inner.prune_expired();
        self.inner.ledger.list(limit)
    }

    /// Cancel a job
    ///
    /// Queued jobs are cancelled on the spot. Running jobs get their
    /// cancellation flag set and stop before their next batch.
    pub fn cancel(&self, id: &str) -> Result<CancelOutcome> {
        let snapshot = {
            let mut jobs = self.inner.jobs.write();
            let entry = match jobs.get_mut(id) {
                Some(entry) => entry,
                None => {
                    let job = self.inner.ledger.get(id)?;
                    return Err(DataflowError::AlreadyTerminal {
                        id: id.to_string(),
                        status: job.status,
                    });
                }
            };

            let status = entry.job.status;
            match status {
                _ if status.is_terminal() => {
                    return Err(DataflowError::AlreadyTerminal {
                        id: id.to_string(),
                        status,
                    });
                }
                JobStatus::Queued => {
                    self.inner.admission.remove_waiting(id);
                    entry.cancel.store(true, Ordering::SeqCst);
                    entry.job.transition(JobStatus::Cancelled)?;
                    entry.job.clone()
                }
                _ => {
                    entry.cancel.store(true, Ordering::SeqCst);
                    tracing::info!(job = %id, "cancellation requested");
                    return Ok(CancelOutcome::Requested);
                }
            }
        };

        tracing::info!(job = %id, "queued job cancelled");
        self.inner.persist(&snapshot);
        self.inner.publish(&snapshot);
        Ok(CancelOutcome::Cancelled)
    }

    /// Resolve once the job reaches a terminal state
    pub async fn wait(&self, id: &str) -> Result<MigrationJob> {
        let receiver = self.inner.jobs.read().get(id).map(|e| e.status.subscribe());
        if let Some(mut receiver) = receiver {
            // A closed channel means the entry was evicted, which only happens once terminal
            let _ = receiver.wait_for(|status| status.is_terminal()).await;
        }
        self.get(id)
    }

    /// Cancel every live job and wait for all of them to stop
    pub async fn shutdown(&self) {
        let mut live: Vec<(String, JobStatus)> = self
            .inner
            .jobs
            .read()
            .values()
            .filter(|e| !e.job.is_terminal())
            .map(|e| (e.job.id.clone(), e.job.status))
            .collect();
        // Queued first, so a finishing job cannot hand its slot to one of them
        live.sort_by_key(|(_, status)| *status != JobStatus::Queued);

        tracing::info!(jobs = live.len(), "shutting down coordinator");
        for (id, _) in &live {
            let _ = self.cancel(id);
        }
        for (id, _) in &live {
            let _ = self.wait(id).await;
        }
    }

    /// Evict terminal jobs older than the retention period from the active
    /// table; their ledger records are kept
    pub fn prune_expired(&self) -> usize {
        self.inner.prune_expired()
    }

    /// Jobs currently holding a worker slot
    pub fn active_count(&self) -> usize {
        self.inner
            .jobs
            .read()
            .values()
            .filter(|e| e.job.status.is_active())
            .count()
    }

    /// Jobs waiting for a slot
    pub fn queued_count(&self) -> usize {
        self.inner.admission.waiting()
    }

    /// Jobs in the active table, terminal ones not yet evicted included
    pub fn tracked_count(&self) -> usize {
        self.inner.jobs.read().len()
    }
}

impl Inner {
    /// Synchronous ledger write, for callers outside the job's own task
    fn persist(&self, job: &MigrationJob) {
        if let Err(e) = self.ledger.put(job) {
            tracing::error!(job = %job.id, error = %e, "failed to write job to ledger");
        }
    }

    /// Ledger write off the async worker threads
    async fn persist_async(&self, job: MigrationJob) {
        let ledger = Arc::clone(&self.ledger);
        let id = job.id.clone();
        match tokio::task::spawn_blocking(move || ledger.put(&job)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(job = %id, error = %e, "failed to write job to ledger"),
            Err(e) => tracing::error!(job = %id, error = %e, "ledger write task failed"),
        }
    }

    fn snapshot(&self, id: &str) -> Option<MigrationJob> {
        self.jobs.read().get(id).map(|e| e.job.clone())
    }

    /// Apply `change` to a copy of the job and store it in the job table
    ///
    /// A rejected change leaves the table untouched. Waiters are not woken
    /// until [`Inner::publish`].
    fn apply<F>(&self, id: &str, change: F) -> Result<MigrationJob>
    where
        F: FnOnce(&mut MigrationJob) -> Result<()>,
    {
        let mut jobs = self.jobs.write();
        let entry = jobs
            .get_mut(id)
            .ok_or_else(|| DataflowError::JobNotFound(id.to_string()))?;

        let mut next = entry.job.clone();
        change(&mut next)?;
        entry.job = next.clone();
        Ok(next)
    }

    /// Wake status waiters; a terminal job becomes eligible for eviction
    fn publish(&self, job: &MigrationJob) {
        if let Some(entry) = self.jobs.write().get_mut(&job.id) {
            if job.is_terminal() && entry.finished_at.is_none() {
                entry.finished_at = Some(Instant::now());
            }
            entry.status.send_replace(job.status);
        }
    }

    /// Persist a status change, then announce it
    async fn commit(&self, job: MigrationJob) -> MigrationJob {
        self.persist_async(job.clone()).await;
        self.publish(&job);
        job
    }

    fn prune_expired(&self) -> usize {
        let retention = self.config.active_retention;
        let mut jobs = self.jobs.write();
        let before = jobs.len();
        jobs.retain(|_, e| e.finished_at.map_or(true, |t| t.elapsed() < retention));

        let evicted = before - jobs.len();
        if evicted > 0 {
            tracing::debug!(evicted, "evicted finished jobs from the active table");
        }
        evicted
    }

    fn close_interrupted(&self) {
        for mut job in self.ledger.list(usize::MAX) {
            let closed = match job.status {
                JobStatus::Queued => job.transition(JobStatus::Cancelled),
                status if status.is_active() => {
                    job.fail("Interrupted: coordinator stopped before the job finished")
                }
                _ => continue,
            };
            if closed.is_ok() {
                tracing::warn!(job = %job.id, status = %job.status, "closed out job left over from a previous run");
                self.persist(&job);
            }
        }
    }

    /// Run `id` under a supervisor that turns a crashed worker into a failed job
    fn spawn(self: &Arc<Self>, id: String, cancel: Arc<AtomicBool>) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let worker = tokio::spawn(Arc::clone(&inner).execute(id.clone(), cancel));

            if let Err(e) = worker.await {
                let reason = if e.is_panic() {
                    panic_message(e.into_panic())
                } else {
                    "worker task aborted".to_string()
                };
                tracing::error!(job = %id, reason = %reason, "transfer worker crashed");
                match inner.apply(&id, |job| job.fail(format!("Transfer worker panicked: {reason}"))) {
                    Ok(job) => {
                        inner.commit(job).await;
                    }
                    Err(e) => tracing::warn!(job = %id, error = %e, "could not record worker crash"),
                }
            }

            inner.release_slot().await;
        });
    }

    /// Hand the finished job's slot to the next queued job still waiting
    async fn release_slot(self: &Arc<Self>) {
        while let Some(next) = self.admission.release() {
            if self.start_queued(&next).await {
                break;
            }
        }
    }

    async fn start_queued(self: &Arc<Self>, id: &str) -> bool {
        let (snapshot, cancel) = {
            let mut jobs = self.jobs.write();
            let Some(entry) = jobs.get_mut(id) else {
                return false;
            };
            if entry.job.status != JobStatus::Queued
                || entry.job.transition(JobStatus::Initializing).is_err()
            {
                return false;
            }
            (entry.job.clone(), Arc::clone(&entry.cancel))
        };

        tracing::info!(job = %id, "job admitted from queue");
        self.commit(snapshot).await;
        self.spawn(id.to_string(), cancel);
        true
    }

    async fn execute(self: Arc<Self>, id: String, cancel: Arc<AtomicBool>) {
        let Some(job) = self.snapshot(&id) else {
            return;
        };

        let timeout_secs = job
            .settings
            .timeout_secs
            .unwrap_or_else(|| self.config.job_timeout.as_secs());
        let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_secs);

        let batch_size = job.settings.batch_size_bytes.unwrap_or_else(|| {
            BatchPlan::for_size(job.total_bytes, job.file_manifest.len() as u64).batch_size_bytes
        });
        let batches = build_batches(&job.file_manifest, batch_size);

        let ctx = TransferContext::new(
            id.clone(),
            job.source.clone(),
            job.destination.clone(),
            job.settings.clone(),
            cancel,
        );

        let outcome = self
            .drive(&ctx, &batches, job.total_bytes, deadline, timeout_secs)
            .await;

        let finished = match outcome {
            Ok(status) => self.apply(&id, |job| job.transition(status)),
            Err(e) => self.apply(&id, |job| job.fail(failure_message(&e))),
        };

        match finished {
            Ok(job) => {
                let job = self.commit(job).await;
                match job.status {
                    JobStatus::Completed => tracing::info!(
                        job = %id,
                        bytes = job.bytes_transferred,
                        elapsed = ?job.elapsed_seconds(),
                        "job completed"
                    ),
                    JobStatus::Cancelled => tracing::warn!(
                        job = %id,
                        bytes = job.bytes_transferred,
                        "job cancelled"
                    ),
                    _ => tracing::error!(
                        job = %id,
                        error = job.error.as_deref().unwrap_or_default(),
                        "job failed"
                    ),
                }
            }
            Err(e) => tracing::error!(job = %id, error = %e, "could not finalize job"),
        }
    }

    /// Move every batch, returning the terminal status to record
    ///
    /// Progress lands in the job table after every batch and in the ledger
    /// at most once per [`PROGRESS_FLUSH_INTERVAL`]; the terminal record
    /// written by the caller carries the final counters.
    async fn drive(
        &self,
        ctx: &TransferContext,
        batches: &[Batch],
        total_bytes: u64,
        deadline: tokio::time::Instant,
        timeout_secs: u64,
    ) -> Result<JobStatus> {
        if ctx.is_cancelled() {
            return Ok(JobStatus::Cancelled);
        }

        within(deadline, timeout_secs, self.executor.begin(ctx)).await?;
        let started = self.apply(&ctx.job_id, |job| {
            job.total_batches = batches.len() as u64;
            job.transition(JobStatus::InProgress)
        })?;
        self.commit(started).await;

        let mut tracker = TransferTracker::new(total_bytes);
        let mut last_flush = Instant::now();
        for batch in batches {
            if ctx.is_cancelled() {
                return Ok(JobStatus::Cancelled);
            }

            let bytes = within(deadline, timeout_secs, self.executor.transfer_batch(ctx, batch)).await?;
            tracker.record(bytes, batch.len() as u64);

            let job = self.apply(&ctx.job_id, |job| {
                job.bytes_transferred = tracker.bytes_done();
                job.files_transferred = tracker.files_done();
                job.batches_completed += 1;
                job.progress_percent = if total_bytes > 0 {
                    tracker.percent()
                } else {
                    job.batches_completed as f64 / job.total_batches.max(1) as f64 * 100.0
                };
                job.current_throughput = tracker.throughput();
                job.eta_seconds = tracker.eta_seconds();
                job.last_update_at = Utc::now();
                Ok(())
            })?;

            tracing::debug!(
                job = %ctx.job_id,
                batch = batch.index,
                progress = job.progress_percent,
                "batch transferred"
            );

            if last_flush.elapsed() >= PROGRESS_FLUSH_INTERVAL {
                self.persist_async(job).await;
                last_flush = Instant::now();
            }
        }

        within(deadline, timeout_secs, self.executor.finish(ctx)).await?;
        Ok(JobStatus::Completed)
    }
}

async fn within<T, F>(deadline: tokio::time::Instant, timeout_secs: u64, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout_at(deadline, fut)
        .await
        .unwrap_or(Err(DataflowError::Timeout(timeout_secs)))
}

/// Error text recorded on a failed job; executor faults are kept verbatim
fn failure_message(error: &DataflowError) -> String {
    match error {
        DataflowError::TransferFault(message) => message.clone(),
        other => other.to_string(),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerBackend, MemoryBackend};
    use crate::model::ManifestEntry;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Semaphore;

    #[derive(Default)]
    struct MockExecutor {
        batch_delay: Duration,
        fail_on_batch: Option<usize>,
        panic_on_batch: Option<usize>,
        gate: Option<Arc<Semaphore>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl TransferExecutor for MockExecutor {
        async fn begin(&self, _ctx: &TransferContext) -> Result<()> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            Ok(())
        }

        async fn transfer_batch(&self, _ctx: &TransferContext, batch: &Batch) -> Result<u64> {
            if let Some(gate) = &self.gate {
                gate.acquire()
                    .await
                    .map_err(|e| DataflowError::transfer(e.to_string()))?
                    .forget();
            }
            if !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }
            if self.fail_on_batch == Some(batch.index) {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                return Err(DataflowError::transfer("disk gone"));
            }
            if self.panic_on_batch == Some(batch.index) {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                panic!("executor exploded");
            }
            Ok(batch.total_bytes())
        }

        async fn finish(&self, _ctx: &TransferContext) -> Result<()> {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config(max_concurrent: usize) -> CoordinatorConfig {
        CoordinatorConfig {
            max_concurrent,
            ..Default::default()
        }
    }

    fn coordinator(config: CoordinatorConfig, executor: Arc<MockExecutor>) -> JobCoordinator {
        JobCoordinator::new(config, Arc::new(JobLedger::in_memory()), executor)
    }

    /// Three 10-byte files moved one per batch
    fn three_batches() -> (Manifest, JobSettings) {
        let manifest = (0..3).map(|i| ManifestEntry::new(format!("f{i}.txt"), 10)).collect();
        let settings = JobSettings {
            batch_size_bytes: Some(10),
            ..Default::default()
        };
        (manifest, settings)
    }

    fn submit(coord: &JobCoordinator) -> String {
        let (manifest, settings) = three_batches();
        coord
            .submit(Endpoint::local("/src"), Endpoint::local("/dst"), manifest, settings)
            .unwrap()
    }

    async fn wait_for_status(coord: &JobCoordinator, id: &str, status: JobStatus) {
        for _ in 0..500 {
            if coord.get(id).unwrap().status == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("job {id} never reached {status}");
    }

    #[tokio::test]
    async fn test_job_completes() {
        let coord = coordinator(config(5), Arc::new(MockExecutor::default()));
        let id = submit(&coord);

        let job = coord.wait(&id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress_percent, 100.0);
        assert_eq!(job.bytes_transferred, 30);
        assert_eq!(job.files_transferred, 3);
        assert_eq!(job.batches_completed, 3);
        assert_eq!(job.total_batches, 3);
        assert_eq!(job.eta_seconds, Some(0));
        assert!(job.completed_at.is_some());
        assert!(job.error.is_none());

        // The ledger holds the same final record
        assert_eq!(coord.ledger().get(&id).unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_transfer_fault_fails_job_verbatim() {
        let executor = Arc::new(MockExecutor {
            fail_on_batch: Some(1),
            ..Default::default()
        });
        let coord = coordinator(config(5), executor);
        let id = submit(&coord);

        let job = coord.wait(&id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("disk gone"));
        assert!(job.failed_at.is_some());
        assert_eq!(job.bytes_transferred, 10);
        assert_eq!(job.batches_completed, 1);
    }

    #[tokio::test]
    async fn test_panicking_executor_is_contained() {
        let executor = Arc::new(MockExecutor {
            panic_on_batch: Some(0),
            ..Default::default()
        });
        let coord = coordinator(config(1), Arc::clone(&executor));
        let first = submit(&coord);
        let second = submit(&coord);

        let job = coord.wait(&first).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("executor exploded"));

        // The crashed job released its slot
        assert_eq!(coord.wait(&second).await.unwrap().status, JobStatus::Failed);
        assert_eq!(coord.active_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_fails_job() {
        let executor = Arc::new(MockExecutor {
            batch_delay: Duration::from_millis(50),
            ..Default::default()
        });
        let coord = coordinator(config(5), executor);
        let (manifest, mut settings) = three_batches();
        settings.timeout_secs = Some(0);
        let id = coord
            .submit(Endpoint::local("/a"), Endpoint::local("/b"), manifest, settings)
            .unwrap();

        let job = coord.wait(&id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_concurrency_cap() {
        let executor = Arc::new(MockExecutor {
            batch_delay: Duration::from_millis(5),
            ..Default::default()
        });
        let coord = coordinator(config(2), Arc::clone(&executor));

        let ids: Vec<String> = (0..6).map(|_| submit(&coord)).collect();
        assert_eq!(coord.active_count(), 2);
        assert_eq!(coord.queued_count(), 4);

        let mut peak_observed = 0;
        for id in &ids {
            while !coord.get(id).unwrap().is_terminal() {
                peak_observed = peak_observed.max(coord.active_count());
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }

        for id in &ids {
            assert_eq!(coord.get(id).unwrap().status, JobStatus::Completed);
        }
        assert!(peak_observed <= 2);
        assert!(executor.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(coord.queued_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_queued_job() {
        let gate = Arc::new(Semaphore::new(0));
        let executor = Arc::new(MockExecutor {
            gate: Some(Arc::clone(&gate)),
            ..Default::default()
        });
        let coord = coordinator(config(1), executor);

        let running = submit(&coord);
        let queued = submit(&coord);
        assert_eq!(coord.get(&queued).unwrap().status, JobStatus::Queued);

        assert_eq!(coord.cancel(&queued).unwrap(), CancelOutcome::Cancelled);
        let job = coord.get(&queued).unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(job.bytes_transferred, 0);
        assert_eq!(job.progress_percent, 0.0);
        assert!(job.cancelled_at.is_some());
        assert_eq!(coord.queued_count(), 0);

        gate.add_permits(3);
        assert_eq!(coord.wait(&running).await.unwrap().status, JobStatus::Completed);
        assert_eq!(coord.get(&queued).unwrap().status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_running_job_keeps_progress() {
        let gate = Arc::new(Semaphore::new(0));
        let executor = Arc::new(MockExecutor {
            gate: Some(Arc::clone(&gate)),
            ..Default::default()
        });
        let coord = coordinator(config(1), executor);
        let id = submit(&coord);

        wait_for_status(&coord, &id, JobStatus::InProgress).await;
        assert_eq!(coord.cancel(&id).unwrap(), CancelOutcome::Requested);
        gate.add_permits(1);

        let job = coord.wait(&id).await.unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(job.bytes_transferred, 10);
        assert_eq!(job.batches_completed, 1);
        assert!(job.progress_percent > 0.0 && job.progress_percent < 100.0);
    }

    #[tokio::test]
    async fn test_terminal_jobs_stay_terminal() {
        let coord = coordinator(config(1), Arc::new(MockExecutor::default()));
        let id = submit(&coord);
        coord.wait(&id).await.unwrap();

        assert!(matches!(
            coord.cancel(&id),
            Err(DataflowError::AlreadyTerminal { status: JobStatus::Completed, .. })
        ));
        assert!(matches!(coord.cancel("mig_unknown"), Err(DataflowError::JobNotFound(_))));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(coord.get(&id).unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_strict_compatibility_rejects() {
        let config = CoordinatorConfig {
            strict_compatibility: true,
            ..Default::default()
        };
        let coord = coordinator(config, Arc::new(MockExecutor::default()));
        let err = coord
            .submit(
                Endpoint::database("cassandra", "a").with_protocol("cql"),
                Endpoint::database("mysql", "b"),
                Manifest::default(),
                JobSettings::default(),
            )
            .unwrap_err();

        assert!(matches!(err, DataflowError::IncompatibleEndpoints { score: 35, .. }));
        assert!(coord.list(10).is_empty());
    }

    #[tokio::test]
    async fn test_finished_jobs_evicted_but_queryable() {
        let config = CoordinatorConfig {
            active_retention: Duration::ZERO,
            ..Default::default()
        };
        let coord = coordinator(config, Arc::new(MockExecutor::default()));
        let id = submit(&coord);
        coord.wait(&id).await.unwrap();

        assert_eq!(coord.prune_expired(), 1);
        assert_eq!(coord.tracked_count(), 0);
        assert_eq!(coord.get(&id).unwrap().status, JobStatus::Completed);
        assert_eq!(coord.list(5)[0].id, id);
    }

    #[tokio::test]
    async fn test_shutdown_stops_everything() {
        let executor = Arc::new(MockExecutor {
            batch_delay: Duration::from_millis(20),
            ..Default::default()
        });
        let coord = coordinator(config(1), executor);
        let first = submit(&coord);
        let second = submit(&coord);

        coord.shutdown().await;

        assert_eq!(coord.get(&first).unwrap().status, JobStatus::Cancelled);
        assert_eq!(coord.get(&second).unwrap().status, JobStatus::Cancelled);
        assert_eq!(coord.active_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_manifest_completes() {
        let coord = coordinator(config(1), Arc::new(MockExecutor::default()));
        let id = coord
            .submit(Endpoint::local("/a"), Endpoint::local("/b"), Manifest::default(), JobSettings::default())
            .unwrap();

        let job = coord.wait(&id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress_percent, 100.0);
        assert_eq!(job.total_batches, 0);
    }

    /// Counts writes reaching the backing store
    #[derive(Default)]
    struct CountingBackend {
        inner: MemoryBackend,
        stores: AtomicUsize,
    }

    impl LedgerBackend for CountingBackend {
        fn load(&self) -> Result<Vec<MigrationJob>> {
            self.inner.load()
        }

        fn store(&self, job: &MigrationJob) -> Result<()> {
            self.stores.fetch_add(1, Ordering::SeqCst);
            self.inner.store(job)
        }

        fn describe(&self) -> String {
            "counting".to_string()
        }
    }

    #[tokio::test]
    async fn test_progress_writes_are_throttled() {
        let backend = Arc::new(CountingBackend::default());
        let ledger = Arc::new(JobLedger::open(backend.clone()).unwrap());
        let coord = JobCoordinator::new(config(1), ledger, Arc::new(MockExecutor::default()));

        let manifest: Manifest = (0..50).map(|i| ManifestEntry::new(format!("f{i}.txt"), 10)).collect();
        let settings = JobSettings {
            batch_size_bytes: Some(10),
            ..Default::default()
        };
        let id = coord
            .submit(Endpoint::local("/src"), Endpoint::local("/dst"), manifest, settings)
            .unwrap();
        let job = coord.wait(&id).await.unwrap();
        assert_eq!(job.batches_completed, 50);

        // queued, initializing, in_progress, completed; no per-batch writes
        // for a run well under the flush interval
        let stores = backend.stores.load(Ordering::SeqCst);
        assert!(stores <= 10, "{stores} ledger writes for 50 batches");

        let stored = backend.inner.load().unwrap().pop().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.bytes_transferred, 500);
        assert_eq!(stored.files_transferred, 50);
    }

    #[tokio::test]
    async fn test_manifest_escaping_roots_rejected() {
        let coord = coordinator(config(1), Arc::new(MockExecutor::default()));

        for path in ["/etc/passwd", "../secret.txt", "docs/../../secret.txt", ""] {
            let manifest: Manifest = [ManifestEntry::new(path, 1)].into_iter().collect();
            let err = coord
                .submit(Endpoint::local("/src"), Endpoint::local("/dst"), manifest, JobSettings::default())
                .unwrap_err();
            assert!(matches!(err, DataflowError::ManifestError(_)), "{path:?} accepted");
        }
        assert!(coord.list(10).is_empty());
    }

    #[tokio::test]
    async fn test_leftover_jobs_closed_on_start() {
        let mut queued = MigrationJob::new(
            "mig_queued",
            Endpoint::local("/a"),
            Endpoint::local("/b"),
            Manifest::default(),
            JobSettings::default(),
        );
        let mut running = queued.clone();
        running.id = "mig_running".to_string();
        running.transition(JobStatus::Initializing).unwrap();
        running.transition(JobStatus::InProgress).unwrap();
        queued.settings.label = Some("left behind".to_string());

        let backend = Arc::new(MemoryBackend::with_jobs(vec![queued, running]));
        let ledger = Arc::new(JobLedger::open(backend).unwrap());
        let coord = JobCoordinator::new(CoordinatorConfig::default(), ledger, Arc::new(MockExecutor::default()));

        assert_eq!(coord.get("mig_queued").unwrap().status, JobStatus::Cancelled);
        let job = coord.get("mig_running").unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().starts_with("Interrupted"));
    }
}
