//! Configuration settings for DataFlow
//!
//! Defines the CLI, its environment overrides, and the defaults used by
//! the capacity evaluator and the job coordinator.

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// DataFlow - storage migration coordinator
#[derive(Parser, Debug, Clone)]
#[command(name = "dataflow")]
#[command(author = "DataFlow Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Check, run and track storage migrations")]
#[command(long_about = r#"
DataFlow checks whether a migration between two storage endpoints is
feasible and runs it as a tracked, cancellable background job.

Examples:
  dataflow check request.json                 # Capacity + compatibility report
  dataflow analyze /data/photos               # File set analysis and batch plan
  dataflow migrate /data/photos /mnt/backup   # Run a migration with progress
  dataflow jobs --limit 20                    # Recent jobs from the ledger
"#)]
pub struct CliArgs {
    /// Maximum number of migrations running at once
    #[arg(long, env = "DATAFLOW_MAX_CONCURRENT", default_value = "5", value_name = "NUM")]
    pub max_concurrent: usize,

    /// Job ledger directory (one JSON record per job)
    #[arg(long, env = "DATAFLOW_LEDGER", value_name = "PATH")]
    pub ledger: Option<PathBuf>,

    /// Per-job timeout in seconds
    #[arg(long, env = "DATAFLOW_JOB_TIMEOUT", default_value = "3600", value_name = "SECS")]
    pub job_timeout: u64,

    /// Free space (percent of total) to keep after a migration
    #[arg(long, env = "DATAFLOW_MIN_FREE_PERCENT", default_value = "10", value_name = "PERCENT")]
    pub min_free_percent: f64,

    /// Assumed link speed for time estimates, in MB/s
    #[arg(long, default_value = "50", value_name = "MBPS")]
    pub assumed_speed: f64,

    /// Reject submissions whose endpoints are incompatible
    #[arg(long)]
    pub strict: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Evaluate feasibility of a migration described in a JSON request
    #[command(name = "check")]
    Check {
        /// Request file: {"source": ..., "destination": ..., "files": [...]}
        request: PathBuf,
    },

    /// Analyze a directory or manifest file
    #[command(name = "analyze")]
    Analyze {
        /// Directory to scan or JSON manifest
        path: PathBuf,
    },

    /// Copy a local directory tree as a tracked migration job
    #[command(name = "migrate")]
    Migrate {
        /// Source directory
        source: PathBuf,
        /// Destination directory
        destination: PathBuf,
        /// Verify every copied file
        #[arg(long)]
        verify: bool,
        /// Batch size (e.g., 100M, 1G)
        #[arg(long, value_name = "SIZE")]
        batch_size: Option<String>,
        /// Show a progress bar
        #[arg(short = 'p', long)]
        progress: bool,
        /// Skip the feasibility check
        #[arg(long)]
        force: bool,
    },

    /// List recent jobs
    #[command(name = "jobs")]
    Jobs {
        /// Number of jobs to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Show a single job
    #[command(name = "status")]
    Status {
        /// Job id
        id: String,
    },

    /// Aggregate ledger statistics
    #[command(name = "stats")]
    Stats {
        /// Look-back window in days
        #[arg(short, long, default_value = "30")]
        days: i64,
    },

    /// Show mounted storage capacity
    #[command(name = "storage")]
    Storage,
}

/// Capacity classification thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapacityThresholds {
    /// Usage ratio at or above which storage is `warning`
    pub warning: f64,
    /// Usage ratio at or above which storage is `critical`
    pub critical: f64,
    /// Fraction of total capacity to keep free after a transfer
    pub safety_margin: f64,
}

impl Default for CapacityThresholds {
    fn default() -> Self {
        Self {
            warning: 0.85,
            critical: 0.95,
            safety_margin: 0.10,
        }
    }
}

/// Runtime configuration for the coordinator and service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Maximum jobs holding a worker slot
    pub max_concurrent: usize,
    /// Default per-job timeout
    pub job_timeout: Duration,
    /// How long terminal jobs stay in the active set
    pub active_retention: Duration,
    /// Reject incompatible endpoint pairs on submission
    pub strict_compatibility: bool,
    /// Capacity thresholds
    pub thresholds: CapacityThresholds,
    /// Assumed link speed for estimates (MB/s)
    pub assumed_speed_mbps: f64,
    /// Ledger directory; in-memory ledger when unset
    pub ledger_path: Option<PathBuf>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            job_timeout: Duration::from_secs(3600),
            active_retention: Duration::from_secs(3600),
            strict_compatibility: false,
            thresholds: CapacityThresholds::default(),
            assumed_speed_mbps: 50.0,
            ledger_path: None,
        }
    }
}

impl CoordinatorConfig {
    /// Create config from CLI arguments
    pub fn from_cli(args: &CliArgs) -> Result<Self, String> {
        if args.max_concurrent == 0 {
            return Err("max-concurrent must be at least 1".to_string());
        }
        if !(0.0..100.0).contains(&args.min_free_percent) {
            return Err(format!(
                "min-free-percent must be in [0, 100), got {}",
                args.min_free_percent
            ));
        }

        Ok(Self {
            max_concurrent: args.max_concurrent,
            job_timeout: Duration::from_secs(args.job_timeout),
            strict_compatibility: args.strict,
            thresholds: CapacityThresholds {
                safety_margin: args.min_free_percent / 100.0,
                ..Default::default()
            },
            assumed_speed_mbps: args.assumed_speed,
            ledger_path: Some(args.ledger.clone().unwrap_or_else(default_ledger_path)),
            ..Default::default()
        })
    }
}

/// Default ledger location under the user's data directory
pub fn default_ledger_path() -> PathBuf {
    data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dataflow")
        .join("jobs")
}

fn data_local_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME").ok().map(|h| PathBuf::from(h).join("Library/Application Support"))
    }

    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_DATA_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".local/share")))
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var("LOCALAPPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        None
    }
}

/// Parse human-readable size string to bytes
pub fn parse_size(size: &str) -> Result<u64, String> {
    let size = size.trim().to_uppercase();

    if size.is_empty() {
        return Err("Empty size string".to_string());
    }

    let (num_str, multiplier) = if size.ends_with("TB") || size.ends_with('T') {
        (size.trim_end_matches(['T', 'B']), 1024u64 * 1024 * 1024 * 1024)
    } else if size.ends_with("GB") || size.ends_with('G') {
        (size.trim_end_matches(['G', 'B']), 1024u64 * 1024 * 1024)
    } else if size.ends_with("MB") || size.ends_with('M') {
        (size.trim_end_matches(['M', 'B']), 1024u64 * 1024)
    } else if size.ends_with("KB") || size.ends_with('K') {
        (size.trim_end_matches(['K', 'B']), 1024u64)
    } else if size.ends_with('B') {
        (size.trim_end_matches('B'), 1u64)
    } else {
        (size.as_str(), 1u64)
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number: {}", num_str))?;

    if num < 0.0 {
        return Err(format!("Negative size: {}", num_str));
    }

    Ok((num * multiplier as f64) as u64)
}
