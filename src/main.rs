//! DataFlow CLI
//!
//! Thin command-line front end over [`dataflow::MigrationService`].

use clap::Parser;
use dataflow::analysis::{estimate_transfer_time, FileSetAnalyzer};
use dataflow::api::{FeasibilityReport, MigrationRequest, MigrationService};
use dataflow::config::{parse_size, CliArgs, Commands, CoordinatorConfig};
use dataflow::core::CancelOutcome;
use dataflow::error::{DataflowError, Result};
use dataflow::ledger::{JobLedger, JsonFileBackend};
use dataflow::model::{Endpoint, JobSettings, Manifest, MigrationJob};
use dataflow::progress::{status_line, JobProgressBar};
use dataflow::storage::SystemStatProvider;
use humansize::{format_size, BINARY};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_tracing(args.verbose, args.log_json);

    if let Err(e) = run(args).await {
        eprintln!("Error: {}", e);
        if e.is_recoverable() {
            eprintln!("This may be transient; running the command again can succeed.");
        }
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8, json: bool) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(args: CliArgs) -> Result<()> {
    let config = CoordinatorConfig::from_cli(&args).map_err(DataflowError::ConfigError)?;

    match args.command {
        Commands::Check { request } => cmd_check(config, &request).await,
        Commands::Analyze { path } => cmd_analyze(&config, &path),
        Commands::Migrate {
            source,
            destination,
            verify,
            batch_size,
            progress,
            force,
        } => {
            let batch_size_bytes = batch_size
                .as_deref()
                .map(parse_size)
                .transpose()
                .map_err(DataflowError::ConfigError)?;
            let settings = JobSettings {
                verify,
                batch_size_bytes,
                ..Default::default()
            };
            cmd_migrate(config, &source, &destination, settings, progress, force).await
        }
        Commands::Jobs { limit } => cmd_jobs(&config, limit),
        Commands::Status { id } => cmd_status(&config, &id),
        Commands::Stats { days } => cmd_stats(&config, days),
        Commands::Storage => cmd_storage(),
    }
}

/// Read-only view of the ledger that leaves other processes' jobs alone
fn open_ledger(config: &CoordinatorConfig) -> Result<JobLedger> {
    match &config.ledger_path {
        Some(path) => JobLedger::open(Arc::new(JsonFileBackend::new(path)?)),
        None => Ok(JobLedger::in_memory()),
    }
}

async fn cmd_check(config: CoordinatorConfig, request_path: &Path) -> Result<()> {
    let request = MigrationRequest::load(request_path)?;
    // Feasibility never touches jobs; keep the shared ledger out of it
    let service = MigrationService::local(CoordinatorConfig {
        ledger_path: None,
        ..config
    })?;

    let report = service
        .evaluate_feasibility(&request.source, &request.destination, &request.manifest)
        .await;
    print_feasibility(&report);

    if !report.can_migrate {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_analyze(config: &CoordinatorConfig, path: &Path) -> Result<()> {
    let manifest = if path.is_dir() {
        Manifest::from_dir(path)?
    } else {
        Manifest::load(path)?
    };

    let analysis = FileSetAnalyzer::new().analyze(&manifest);
    let estimate = estimate_transfer_time(analysis.total_bytes, config.assumed_speed_mbps);

    println!("=== File Set Analysis ===");
    println!("Files:             {}", analysis.total_files);
    println!("Total size:        {}", analysis.total_size_human());
    if let Some(largest) = &analysis.largest_file {
        println!(
            "Largest file:      {} ({})",
            largest.path,
            format_size(largest.size_bytes, BINARY)
        );
    }
    println!(
        "Compressible:      {} files, {}",
        analysis.compressible_files,
        format_size(analysis.compressible_bytes, BINARY)
    );
    println!(
        "Est. compression:  {:.1}% ({} after)",
        analysis.estimated_compression_ratio * 100.0,
        format_size(analysis.estimated_size_after_compression, BINARY)
    );

    println!("\nFile types by size:");
    let mut types: Vec<_> = analysis.type_histogram.iter().collect();
    types.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    for (ext, bytes) in types.iter().take(10) {
        println!("  {:<12} {}", ext, format_size(**bytes, BINARY));
    }
    if types.len() > 10 {
        println!("  ... and {} more", types.len() - 10);
    }

    let plan = &analysis.batch_plan;
    println!("\nBatch plan:");
    println!("  Batch size:      {}", format_size(plan.batch_size_bytes, BINARY));
    println!("  Batches:         {}", plan.total_batches);
    println!("  Files per batch: {}", plan.files_per_batch);
    println!("  Parallelism:     {}", plan.max_parallel_transfers);

    println!(
        "\nEstimated time at {} MB/s: {} ({})",
        estimate.speed_mbps,
        estimate.estimated_time,
        estimate.human()
    );

    print_recommendations(&analysis.recommendations());
    Ok(())
}

async fn cmd_migrate(
    config: CoordinatorConfig,
    source: &Path,
    destination: &Path,
    settings: JobSettings,
    show_progress: bool,
    force: bool,
) -> Result<()> {
    if !source.is_dir() {
        return Err(DataflowError::config(format!(
            "source {} is not a directory",
            source.display()
        )));
    }

    let manifest = Manifest::from_dir(source)?;
    let source = Endpoint::local(source.to_string_lossy());
    let destination = Endpoint::local(destination.to_string_lossy());
    let service = MigrationService::local(config)?;

    if !force {
        let report = service
            .evaluate_feasibility(&source, &destination, &manifest)
            .await;
        if !report.can_migrate {
            print_feasibility(&report);
            eprintln!("\nMigration blocked. Use --force to run it anyway.");
            std::process::exit(1);
        }
        if !report.compatibility.compatible {
            eprintln!("Warning: {}", report.compatibility.summary());
        }
    }

    let id = service.submit_job(source, destination, manifest, settings)?;
    println!("Submitted job {}", id);

    let job = tokio::select! {
        job = follow(&service, &id, show_progress) => job?,
        _ = tokio::signal::ctrl_c() => {
            match service.cancel_job(&id) {
                Ok(CancelOutcome::Requested) => {
                    eprintln!("Cancelling {} after the current batch...", id);
                }
                Ok(CancelOutcome::Cancelled) | Err(DataflowError::AlreadyTerminal { .. }) => {}
                Err(e) => return Err(e),
            }
            service.wait_job(&id).await?
        }
    };

    print_job(&job);
    if job.status != dataflow::JobStatus::Completed {
        std::process::exit(1);
    }
    Ok(())
}

/// Wait for `id` to finish, drawing a bar when asked
async fn follow(service: &MigrationService, id: &str, show_progress: bool) -> Result<MigrationJob> {
    if !show_progress {
        return service.wait_job(id).await;
    }

    let mut job = service.get_job(id)?;
    let bar = JobProgressBar::new(&job);
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    while !job.is_terminal() {
        ticker.tick().await;
        job = service.get_job(id)?;
        bar.update(&job);
    }
    bar.finish(&job);
    Ok(job)
}

fn cmd_jobs(config: &CoordinatorConfig, limit: usize) -> Result<()> {
    let ledger = open_ledger(config)?;
    let jobs = ledger.list(limit);

    if jobs.is_empty() {
        println!("No jobs recorded.");
        return Ok(());
    }

    println!(
        "{:<28} {:<10} {:>7} {:>12}  {}",
        "ID", "STATUS", "DONE", "SIZE", "CREATED"
    );
    for job in &jobs {
        println!(
            "{:<28} {:<10} {:>6.1}% {:>12}  {}",
            job.id,
            job.status,
            job.progress_percent,
            format_size(job.total_bytes, BINARY),
            job.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

fn cmd_status(config: &CoordinatorConfig, id: &str) -> Result<()> {
    let job = open_ledger(config)?.get(id)?;
    print_job(&job);
    Ok(())
}

fn cmd_stats(config: &CoordinatorConfig, days: i64) -> Result<()> {
    let stats = open_ledger(config)?.stats(days);

    println!("=== Migration Statistics (last {} days) ===", stats.period_days);
    println!("Total jobs:        {}", stats.total_jobs);
    println!("Completed:         {}", stats.completed_jobs);
    println!("Failed:            {}", stats.failed_jobs);
    println!("Cancelled:         {}", stats.cancelled_jobs);
    println!("Active:            {}", stats.active_jobs);
    println!("Success rate:      {:.1}%", stats.success_rate);
    println!(
        "Data transferred:  {} in {} files",
        format_size(stats.total_bytes_transferred, BINARY),
        stats.total_files_transferred
    );
    println!(
        "Avg duration:      {}",
        humantime::format_duration(Duration::from_secs(stats.avg_job_duration.max(0.0) as u64))
    );
    Ok(())
}

fn cmd_storage() -> Result<()> {
    let mounts = SystemStatProvider::mounts();

    println!(
        "{:<30} {:<10} {:>12} {:>12} {:>6}  {}",
        "MOUNT", "FS", "TOTAL", "FREE", "USED", "FLAGS"
    );
    for mount in &mounts {
        let used = if mount.total_bytes > 0 {
            100.0 * (mount.total_bytes - mount.available_bytes.min(mount.total_bytes)) as f64
                / mount.total_bytes as f64
        } else {
            0.0
        };
        let mut flags = Vec::new();
        if mount.is_remote {
            flags.push("remote");
        }
        if mount.is_removable {
            flags.push("removable");
        }
        println!(
            "{:<30} {:<10} {:>12} {:>12} {:>5.1}%  {}",
            mount.mount_point,
            mount.fs_type,
            format_size(mount.total_bytes, BINARY),
            format_size(mount.available_bytes, BINARY),
            used,
            flags.join(",")
        );
    }
    Ok(())
}

fn print_feasibility(report: &FeasibilityReport) {
    let storage = &report.storage;

    println!("=== Feasibility ===");
    println!("Can migrate:        {}", yes_no(report.can_migrate));
    println!("Can migrate safely: {}", yes_no(report.can_migrate_safely));

    println!("\nSource:      {}", storage.source.summary());
    println!("Destination: {}", storage.destination.summary());
    println!("Size difference: {} bytes", storage.size_difference);
    for warning in &storage.warnings {
        println!("  ! {}", warning);
    }

    println!("\nCompatibility: {}", report.compatibility.summary());
    for issue in &report.compatibility.issues {
        println!("  - {}", issue);
    }

    println!(
        "\nFiles: {} ({}), estimated {}",
        report.file_analysis.total_files,
        report.file_analysis.total_size_human(),
        report.estimate.estimated_time
    );

    let mut recommendations = report.recommendations.clone();
    for rec in &report.compatibility.recommendations {
        if !recommendations.contains(rec) {
            recommendations.push(rec.clone());
        }
    }
    print_recommendations(&recommendations);
}

fn print_job(job: &MigrationJob) {
    println!("=== Job {} ===", job.id);
    println!("Status:       {}", status_line(job));
    println!("Source:       {}", job.source);
    println!("Destination:  {}", job.destination);
    println!("Progress:     {:.1}%", job.progress_percent);
    println!(
        "Transferred:  {} of {} ({} files, {}/{} batches)",
        format_size(job.bytes_transferred, BINARY),
        format_size(job.total_bytes, BINARY),
        job.files_transferred,
        job.batches_completed,
        job.total_batches
    );
    println!("Created:      {}", job.created_at.to_rfc3339());
    if let Some(finished) = job.finished_at() {
        println!("Finished:     {}", finished.to_rfc3339());
    }
    if let Some(elapsed) = job.elapsed_seconds() {
        println!("Elapsed:      {:.1}s", elapsed);
    }
    if let Some(error) = &job.error {
        println!("Error:        {}", error);
    }
}

fn print_recommendations(recommendations: &[String]) {
    if recommendations.is_empty() {
        return;
    }
    println!("\nRecommendations:");
    for rec in recommendations {
        println!("  * {}", rec);
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "YES ✓"
    } else {
        "NO ✗"
    }
}
