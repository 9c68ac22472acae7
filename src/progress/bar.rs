//! Terminal progress bar for a single job

use crate::model::{JobStatus, MigrationJob};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

const BAR_TEMPLATE: &str =
    "{prefix:.bold.dim} [{bar:40.green/white}] {bytes}/{total_bytes} ({msg})";

/// Renders job snapshots as an indicatif bar
pub struct JobProgressBar {
    bar: ProgressBar,
}

impl JobProgressBar {
    /// Bar sized for `job`
    pub fn new(job: &MigrationJob) -> Self {
        let bar = ProgressBar::new(job.total_bytes);
        let style = ProgressStyle::default_bar()
            .template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        bar.set_style(style);
        bar.set_prefix(job.id.clone());
        Self { bar }
    }

    /// Bar that draws nothing
    pub fn hidden(job: &MigrationJob) -> Self {
        let this = Self::new(job);
        this.bar.set_draw_target(ProgressDrawTarget::hidden());
        this
    }

    /// Reflect the latest snapshot
    pub fn update(&self, job: &MigrationJob) {
        self.bar.set_position(job.bytes_transferred);
        self.bar.set_message(status_line(job));
    }

    /// Final render for a terminal snapshot
    pub fn finish(&self, job: &MigrationJob) {
        self.update(job);
        match job.status {
            JobStatus::Completed => self.bar.finish_with_message("✓ completed"),
            JobStatus::Failed => self.bar.abandon_with_message(format!(
                "✗ failed: {}",
                job.error.as_deref().unwrap_or("unknown error")
            )),
            JobStatus::Cancelled => self.bar.abandon_with_message("✗ cancelled"),
            _ => self.bar.abandon(),
        }
    }

    /// Current bar position in bytes
    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

/// Short status text: state, speed and time left
pub fn status_line(job: &MigrationJob) -> String {
    let mut line = job.status.to_string();
    if job.current_throughput > 0.0 {
        line.push_str(&format!(
            ", {}/s",
            humansize::format_size(job.current_throughput as u64, humansize::BINARY)
        ));
    }
    if let Some(eta) = job.eta_seconds.filter(|_| !job.is_terminal()) {
        line.push_str(&format!(
            ", ETA {}",
            humantime::format_duration(std::time::Duration::from_secs(eta))
        ));
    }
    line
}
