//! Migration service facade
//!
//! The single entry point outer layers (CLI, HTTP, RPC) talk to. It wires
//! the analyzers, the coordinator and the ledger together over injected
//! collaborators.

use crate::analysis::{estimate_transfer_time, CompatibilityAnalyzer, FileSetAnalyzer};
use crate::api::{FeasibilityReport, HealthStatus, ServiceStatus};
use crate::config::CoordinatorConfig;
use crate::core::{CancelOutcome, JobCoordinator, LocalCopyExecutor, TransferExecutor};
use crate::error::Result;
use crate::ledger::{JobLedger, JsonFileBackend, LedgerBackend, LedgerStats, MemoryBackend};
use crate::model::{Endpoint, JobSettings, Manifest, MigrationJob};
use crate::storage::{storage_recommendations, CapacityEvaluator, StorageStatProvider, SystemStatProvider};
use chrono::Utc;
use std::sync::Arc;

/// Feasibility checks plus job submission, tracking and cancellation
pub struct MigrationService {
    coordinator: JobCoordinator,
    capacity: CapacityEvaluator,
    compatibility: CompatibilityAnalyzer,
    files: FileSetAnalyzer,
    assumed_speed_mbps: f64,
}

impl MigrationService {
    /// Build a service over explicit collaborators
    pub fn new(
        config: CoordinatorConfig,
        provider: Arc<dyn StorageStatProvider>,
        executor: Arc<dyn TransferExecutor>,
        backend: Arc<dyn LedgerBackend>,
    ) -> Result<Self> {
        let ledger = Arc::new(JobLedger::open(backend)?);
        let capacity = CapacityEvaluator::new(provider, config.thresholds);
        let assumed_speed_mbps = config.assumed_speed_mbps;

        Ok(Self {
            coordinator: JobCoordinator::new(config, ledger, executor),
            capacity,
            compatibility: CompatibilityAnalyzer::new(),
            files: FileSetAnalyzer::new(),
            assumed_speed_mbps,
        })
    }

    /// Service for local directories: sysinfo disk stats, plain file copies,
    /// and a JSON ledger when `config.ledger_path` is set
    pub fn local(config: CoordinatorConfig) -> Result<Self> {
        let backend: Arc<dyn LedgerBackend> = match &config.ledger_path {
            Some(path) => Arc::new(JsonFileBackend::new(path)?),
            None => Arc::new(MemoryBackend::new()),
        };
        Self::new(
            config,
            Arc::new(SystemStatProvider::new()),
            Arc::new(LocalCopyExecutor::new()),
            backend,
        )
    }

    /// Underlying coordinator
    pub fn coordinator(&self) -> &JobCoordinator {
        &self.coordinator
    }

    /// Check capacity, compatibility and the file set of a proposed migration
    ///
    /// Never fails: capacity query errors surface as `error` reports.
    pub async fn evaluate_feasibility(
        &self,
        source: &Endpoint,
        destination: &Endpoint,
        manifest: &Manifest,
    ) -> FeasibilityReport {
        let file_analysis = self.files.analyze(manifest);
        let storage = self
            .capacity
            .compare(source, destination, file_analysis.total_bytes)
            .await;
        let compatibility = self.compatibility.analyze(source, destination);
        let estimate = estimate_transfer_time(file_analysis.total_bytes, self.assumed_speed_mbps);

        let mut recommendations =
            storage_recommendations(&storage.source, &storage.destination, compatibility.compatible);
        for rec in file_analysis.recommendations() {
            if !recommendations.contains(&rec) {
                recommendations.push(rec);
            }
        }

        tracing::info!(
            source = %source,
            destination = %destination,
            bytes = file_analysis.total_bytes,
            can_migrate = storage.can_migrate,
            score = compatibility.score,
            "feasibility evaluated"
        );

        // Incompatibility only blocks when policy escalates it
        let allowed = compatibility.compatible || !self.coordinator.config().strict_compatibility;

        FeasibilityReport {
            can_migrate: storage.can_migrate && allowed,
            can_migrate_safely: storage.can_migrate_safely && allowed,
            storage,
            compatibility,
            file_analysis,
            estimate,
            recommendations,
        }
    }

    /// Submit a job, returning its id
    pub fn submit_job(
        &self,
        source: Endpoint,
        destination: Endpoint,
        manifest: Manifest,
        settings: JobSettings,
    ) -> Result<String> {
        self.coordinator.submit(source, destination, manifest, settings)
    }

    /// Current snapshot of a job
    pub fn get_job(&self, id: &str) -> Result<MigrationJob> {
        self.coordinator.get(id)
    }

    /// Most recent jobs, newest first
    pub fn list_jobs(&self, limit: usize) -> Vec<MigrationJob> {
        self.coordinator.list(limit)
    }

    /// Cancel a job
    pub fn cancel_job(&self, id: &str) -> Result<CancelOutcome> {
        self.coordinator.cancel(id)
    }

    /// Wait for a job to finish
    pub async fn wait_job(&self, id: &str) -> Result<MigrationJob> {
        self.coordinator.wait(id).await
    }

    /// Ledger statistics over the last `days` days
    pub fn stats(&self, days: i64) -> LedgerStats {
        self.coordinator.ledger().stats(days)
    }

    /// Current load
    pub fn status(&self) -> ServiceStatus {
        let active_jobs = self.coordinator.active_count();
        let queued_jobs = self.coordinator.queued_count();
        ServiceStatus {
            version: crate::VERSION.to_string(),
            health: if queued_jobs > 0 {
                HealthStatus::Saturated
            } else {
                HealthStatus::Healthy
            },
            active_jobs,
            queued_jobs,
            max_concurrent: self.coordinator.config().max_concurrent,
            timestamp: Utc::now(),
        }
    }

    /// Cancel every live job and wait for them to stop
    pub async fn shutdown(&self) {
        self.coordinator.shutdown().await
    }
}
