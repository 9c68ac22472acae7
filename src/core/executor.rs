//! Transfer execution
//!
//! The coordinator never moves bytes itself. It splits the manifest into
//! batches and hands them one at a time to a [`TransferExecutor`], checking
//! for cancellation and timeout between batches.

use crate::error::{DataflowError, IoResultExt, Result};
use crate::model::{Endpoint, JobSettings, Manifest, ManifestEntry};
use async_trait::async_trait;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A group of manifest entries transferred as one unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Position in the job's batch sequence
    pub index: usize,
    /// Files in this batch
    pub entries: Vec<ManifestEntry>,
}

impl Batch {
    /// Sum of entry sizes, saturating at `u64::MAX`
    pub fn total_bytes(&self) -> u64 {
        self.entries
            .iter()
            .fold(0, |total, e| total.saturating_add(e.size_bytes))
    }

    /// Number of files
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Split `manifest` into batches of roughly `batch_size` bytes
///
/// Entries keep manifest order. A file larger than `batch_size` gets a batch
/// of its own; `batch_size == 0` puts everything in one batch.
pub fn build_batches(manifest: &Manifest, batch_size: u64) -> Vec<Batch> {
    let mut batches = Vec::new();
    let mut current: Vec<ManifestEntry> = Vec::new();
    let mut current_bytes = 0u64;

    for entry in manifest.iter() {
        let overflow = batch_size > 0 && current_bytes.saturating_add(entry.size_bytes) > batch_size;
        if overflow && !current.is_empty() {
            batches.push(Batch {
                index: batches.len(),
                entries: std::mem::take(&mut current),
            });
            current_bytes = 0;
        }
        current_bytes = current_bytes.saturating_add(entry.size_bytes);
        current.push(entry.clone());
    }

    if !current.is_empty() {
        batches.push(Batch {
            index: batches.len(),
            entries: current,
        });
    }
    batches
}

/// What an executor needs to know about the job it is serving
#[derive(Debug, Clone)]
pub struct TransferContext {
    pub job_id: String,
    pub source: Endpoint,
    pub destination: Endpoint,
    pub settings: JobSettings,
    cancelled: Arc<AtomicBool>,
}

impl TransferContext {
    /// Context sharing the job's cancellation flag
    pub fn new(
        job_id: impl Into<String>,
        source: Endpoint,
        destination: Endpoint,
        settings: JobSettings,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            source,
            destination,
            settings,
            cancelled,
        }
    }

    /// Whether cancellation was requested; long batches may poll this to stop early
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Moves batches of files between two endpoints
///
/// Any error returned is treated as a transfer fault: the job fails with the
/// error's message and is not retried.
#[async_trait]
pub trait TransferExecutor: Send + Sync {
    /// Open connections, create target containers
    async fn begin(&self, _ctx: &TransferContext) -> Result<()> {
        Ok(())
    }

    /// Move one batch, returning the bytes moved
    async fn transfer_batch(&self, ctx: &TransferContext, batch: &Batch) -> Result<u64>;

    /// Flush and close after the last batch
    async fn finish(&self, _ctx: &TransferContext) -> Result<()> {
        Ok(())
    }
}

/// Copies files between two locally mounted directories
#[derive(Debug, Clone, Default)]
pub struct LocalCopyExecutor;

impl LocalCopyExecutor {
    /// Create an executor
    pub fn new() -> Self {
        Self
    }

    fn roots(ctx: &TransferContext) -> Result<(PathBuf, PathBuf)> {
        for endpoint in [&ctx.source, &ctx.destination] {
            if !endpoint.kind.is_file_based() {
                return Err(DataflowError::transfer(format!(
                    "local copy cannot serve {} endpoints",
                    endpoint.kind
                )));
            }
        }
        Ok((
            PathBuf::from(&ctx.source.path_or_address),
            PathBuf::from(&ctx.destination.path_or_address),
        ))
    }
}

#[async_trait]
impl TransferExecutor for LocalCopyExecutor {
    async fn begin(&self, ctx: &TransferContext) -> Result<()> {
        let (source, destination) = Self::roots(ctx)?;
        if !tokio::fs::metadata(&source).await.map(|m| m.is_dir()).unwrap_or(false) {
            return Err(DataflowError::transfer(format!(
                "source directory {} not found",
                source.display()
            )));
        }
        tokio::fs::create_dir_all(&destination).await.with_path(&destination)?;
        if ctx.settings.compress {
            tracing::debug!(job = %ctx.job_id, "compression has no effect on local copies");
        }
        Ok(())
    }

    async fn transfer_batch(&self, ctx: &TransferContext, batch: &Batch) -> Result<u64> {
        let (source, destination) = Self::roots(ctx)?;
        // Nothing is written if any entry would land outside the roots
        let relative = batch
            .entries
            .iter()
            .map(|entry| entry.relative_path().map_err(|e| DataflowError::transfer(e.to_string())))
            .collect::<Result<Vec<_>>>()?;

        let mut copied = 0u64;
        for (entry, rel) in batch.entries.iter().zip(relative) {
            let src = source.join(rel);
            let dst = destination.join(rel);
            if let Some(parent) = dst.parent() {
                tokio::fs::create_dir_all(parent).await.with_path(parent)?;
            }

            let bytes = tokio::fs::copy(&src, &dst)
                .await
                .map_err(|e| DataflowError::transfer(format!("{}: {}", src.display(), e)))?;

            if ctx.settings.verify {
                verify_copy(src, dst).await?;
            }

            tracing::trace!(job = %ctx.job_id, file = %entry.path, bytes, "copied");
            copied = copied.saturating_add(bytes);
        }

        Ok(copied)
    }
}

async fn verify_copy(src: PathBuf, dst: PathBuf) -> Result<()> {
    let target = dst.display().to_string();
    let (expected, actual) = tokio::task::spawn_blocking(move || -> Result<(u64, u64)> {
        Ok((quick_hash(&src)?, quick_hash(&dst)?))
    })
    .await
    .map_err(|e| DataflowError::transfer(e.to_string()))??;

    if expected != actual {
        return Err(DataflowError::transfer(format!(
            "checksum mismatch for {target}: xxh3 {expected:016x} != {actual:016x}"
        )));
    }
    Ok(())
}

/// XXH3 digest of a file's contents
pub fn quick_hash(path: &Path) -> Result<u64> {
    let mut file = std::fs::File::open(path).with_path(path)?;
    let mut hasher = xxhash_rust::xxh3::Xxh3::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let read = file.read(&mut buffer).with_path(path)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hasher.digest())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn manifest(sizes: &[u64]) -> Manifest {
        sizes
            .iter()
            .enumerate()
            .map(|(i, s)| ManifestEntry::new(format!("f{i}"), *s))
            .collect()
    }

    #[test]
    fn test_build_batches_greedy() {
        let batches = build_batches(&manifest(&[40, 40, 40, 200, 10]), 100);
        let sizes: Vec<u64> = batches.iter().map(Batch::total_bytes).collect();
        assert_eq!(sizes, vec![80, 40, 200, 10]);
        assert_eq!(batches[3].index, 3);
    }

    #[test]
    fn test_build_batches_edges() {
        assert!(build_batches(&Manifest::default(), 100).is_empty());
        assert_eq!(build_batches(&manifest(&[5, 5, 5]), 0).len(), 1);

        let all: usize = build_batches(&manifest(&[1; 17]), 4).iter().map(Batch::len).sum();
        assert_eq!(all, 17);
    }

    fn ctx(src: &Path, dst: &Path, verify: bool) -> TransferContext {
        TransferContext::new(
            "mig_test",
            Endpoint::local(src.to_string_lossy()),
            Endpoint::local(dst.to_string_lossy()),
            JobSettings {
                verify,
                ..Default::default()
            },
            Arc::new(AtomicBool::new(false)),
        )
    }

    #[tokio::test]
    async fn test_local_copy() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::create_dir_all(src.path().join("sub")).unwrap();
        fs::write(src.path().join("a.txt"), b"hello").unwrap();
        fs::write(src.path().join("sub/b.txt"), b"world!").unwrap();

        let manifest = Manifest::from_dir(src.path()).unwrap();
        let target = dst.path().join("out");
        let ctx = ctx(src.path(), &target, true);
        let executor = LocalCopyExecutor::new();

        executor.begin(&ctx).await.unwrap();
        let mut total = 0;
        for batch in build_batches(&manifest, 0) {
            total += executor.transfer_batch(&ctx, &batch).await.unwrap();
        }

        assert_eq!(total, 11);
        assert_eq!(fs::read(target.join("sub/b.txt")).unwrap(), b"world!");
    }

    #[test]
    fn test_batch_total_saturates() {
        let batch = Batch {
            index: 0,
            entries: vec![ManifestEntry::new("a", u64::MAX), ManifestEntry::new("b", 1)],
        };
        assert_eq!(batch.total_bytes(), u64::MAX);
    }

    #[tokio::test]
    async fn test_copy_refuses_paths_outside_roots() {
        let root = TempDir::new().unwrap();
        let src = root.path().join("src");
        let dst = root.path().join("dst");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("ok.txt"), b"fine").unwrap();
        fs::write(src.join("precious.txt"), b"keep me").unwrap();
        fs::write(root.path().join("secret.txt"), b"outside").unwrap();

        let ctx = ctx(&src, &dst, false);
        let executor = LocalCopyExecutor::new();
        executor.begin(&ctx).await.unwrap();

        let absolute = src.join("precious.txt").to_string_lossy().to_string();
        for bad in [absolute.as_str(), "../secret.txt"] {
            let batch = Batch {
                index: 0,
                entries: vec![ManifestEntry::new("ok.txt", 4), ManifestEntry::new(bad, 7)],
            };
            let err = executor.transfer_batch(&ctx, &batch).await.unwrap_err();
            assert!(matches!(err, DataflowError::TransferFault(_)), "{bad} accepted");
        }

        assert_eq!(fs::read(src.join("precious.txt")).unwrap(), b"keep me");
        assert!(!dst.join("ok.txt").exists());
        assert_eq!(fs::read(root.path().join("secret.txt")).unwrap(), b"outside");
    }

    #[tokio::test]
    async fn test_missing_source_is_a_fault() {
        let dst = TempDir::new().unwrap();
        let ctx = ctx(Path::new("/definitely/not/here"), dst.path(), false);
        let err = LocalCopyExecutor::new().begin(&ctx).await.unwrap_err();
        assert!(matches!(err, DataflowError::TransferFault(_)));
    }

    #[tokio::test]
    async fn test_database_endpoint_rejected() {
        let ctx = TransferContext::new(
            "mig_db",
            Endpoint::database("mysql", "db:3306"),
            Endpoint::local("/tmp"),
            JobSettings::default(),
            Arc::new(AtomicBool::new(false)),
        );
        assert!(LocalCopyExecutor::new().begin(&ctx).await.is_err());
    }

    #[test]
    fn test_quick_hash() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, b"same").unwrap();
        fs::write(&b, b"same").unwrap();
        assert_eq!(quick_hash(&a).unwrap(), quick_hash(&b).unwrap());

        fs::write(&b, b"diff").unwrap();
        assert_ne!(quick_hash(&a).unwrap(), quick_hash(&b).unwrap());
    }
}
