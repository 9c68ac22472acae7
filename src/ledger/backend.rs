//! Ledger persistence backends

use crate::error::{DataflowError, IoResultExt, Result};
use crate::model::MigrationJob;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

const RECORD_EXTENSION: &str = "json";

/// Where ledger records are persisted
///
/// Records are stored one per job id; `store` replaces only the record it is
/// given. Callers serialize writes for the same id.
pub trait LedgerBackend: Send + Sync {
    /// Read every stored record
    fn load(&self) -> Result<Vec<MigrationJob>>;

    /// Insert or replace the record for `job.id`
    fn store(&self, job: &MigrationJob) -> Result<()>;

    /// Short description for logs
    fn describe(&self) -> String;
}

/// Keeps records for the lifetime of the process only
#[derive(Debug, Default)]
pub struct MemoryBackend {
    jobs: Mutex<HashMap<String, MigrationJob>>,
}

impl MemoryBackend {
    /// Empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend pre-seeded with records
    pub fn with_jobs(jobs: Vec<MigrationJob>) -> Self {
        Self {
            jobs: Mutex::new(jobs.into_iter().map(|j| (j.id.clone(), j)).collect()),
        }
    }
}

impl LedgerBackend for MemoryBackend {
    fn load(&self) -> Result<Vec<MigrationJob>> {
        Ok(self.jobs.lock().values().cloned().collect())
    }

    fn store(&self, job: &MigrationJob) -> Result<()> {
        self.jobs.lock().insert(job.id.clone(), job.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Directory holding one `<job id>.json` file per record
///
/// Each write goes to a sibling temp file which is then renamed over the
/// record, so a crash mid-write leaves the previous version intact and a
/// progress update only rewrites its own job.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    dir: PathBuf,
}

impl JsonFileBackend {
    /// Use `dir`, creating it if needed
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).with_path(&dir)?;
        Ok(Self { dir })
    }

    fn record_path(&self, id: &str) -> Result<PathBuf> {
        let safe = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !safe {
            return Err(DataflowError::Ledger(format!(
                "job id '{id}' cannot be used as a record name"
            )));
        }
        Ok(self.dir.join(format!("{id}.{RECORD_EXTENSION}")))
    }
}

impl LedgerBackend for JsonFileBackend {
    fn load(&self) -> Result<Vec<MigrationJob>> {
        let mut jobs = Vec::new();

        for entry in fs::read_dir(&self.dir).with_path(&self.dir)? {
            let path = entry.with_path(&self.dir)?.path();
            // Leftover `.json.tmp` files from an interrupted write are skipped
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }

            let content = fs::read_to_string(&path).with_path(&path)?;
            let job: MigrationJob = serde_json::from_str(&content).map_err(|e| {
                DataflowError::Ledger(format!("unreadable ledger record {}: {}", path.display(), e))
            })?;
            jobs.push(job);
        }

        Ok(jobs)
    }

    fn store(&self, job: &MigrationJob) -> Result<()> {
        let path = self.record_path(&job.id)?;
        let content =
            serde_json::to_string_pretty(job).map_err(|e| DataflowError::Ledger(e.to_string()))?;

        let tmp = path.with_extension(format!("{RECORD_EXTENSION}.tmp"));
        fs::write(&tmp, content).with_path(&tmp)?;
        fs::rename(&tmp, &path).with_path(&path)?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}
