//! User-facing progress for long running commands.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Mutex;

use crate::report::ReportSummary;

/// Receives events while uploads, runs and reports make progress.
#[async_trait]
pub trait Reporter: Send + Sync {
    /// A new step started, e.g. "Uploading app.apk".
    async fn on_step(&self, step: &str);

    /// A polled resource reported a non-terminal status.
    async fn on_status(&self, what: &str, status: &str);

    /// The current step finished successfully.
    async fn on_step_done(&self, message: &str);

    /// Artifact downloads are about to start.
    async fn on_downloads_planned(&self, total: usize);

    /// One artifact download finished, successfully or not.
    async fn on_download_complete(&self, path: &Path, error: Option<&str>);

    async fn on_report_complete(&self, summary: &ReportSummary);
}

/// A reporter that does nothing (for tests or when output is not needed).
pub struct NullReporter;

#[async_trait]
impl Reporter for NullReporter {
    async fn on_step(&self, _step: &str) {}
    async fn on_status(&self, _what: &str, _status: &str) {}
    async fn on_step_done(&self, _message: &str) {}
    async fn on_downloads_planned(&self, _total: usize) {}
    async fn on_download_complete(&self, _path: &Path, _error: Option<&str>) {}
    async fn on_report_complete(&self, _summary: &ReportSummary) {}
}

/// Console reporter with a spinner per step and a bar for downloads.
pub struct ConsoleReporter {
    progress: Mutex<Option<ProgressBar>>,
    verbose: bool,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self {
            progress: Mutex::new(None),
            verbose,
        }
    }

    fn spinner(message: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) =
            ProgressStyle::default_spinner().template("{spinner:.green} {msg} [{elapsed}]")
        {
            pb.set_style(style);
        }
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    }
}

#[async_trait]
impl Reporter for ConsoleReporter {
    async fn on_step(&self, step: &str) {
        let mut slot = self.progress.lock().await;
        if let Some(pb) = slot.take() {
            pb.finish_and_clear();
        }
        *slot = Some(Self::spinner(step));
    }

    async fn on_status(&self, what: &str, status: &str) {
        if let Some(pb) = self.progress.lock().await.as_ref() {
            pb.set_message(format!("{} {}", what, console::style(status).cyan()));
        }
    }

    async fn on_step_done(&self, message: &str) {
        if let Some(pb) = self.progress.lock().await.take() {
            pb.finish_and_clear();
        }
        println!("{} {}", console::style("✓").green(), message);
    }

    async fn on_downloads_planned(&self, total: usize) {
        let pb = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }

        let mut slot = self.progress.lock().await;
        if let Some(previous) = slot.replace(pb) {
            previous.finish_and_clear();
        }
    }

    async fn on_download_complete(&self, path: &Path, error: Option<&str>) {
        if let Some(pb) = self.progress.lock().await.as_ref() {
            pb.inc(1);
            match error {
                Some(error) => pb.println(format!(
                    "{} {}: {}",
                    console::style("FAIL").red(),
                    path.display(),
                    console::style(error).dim()
                )),
                None if self.verbose => {
                    pb.println(format!("{} {}", console::style("OK  ").green(), path.display()))
                }
                None => {}
            }
        }
    }

    async fn on_report_complete(&self, summary: &ReportSummary) {
        if let Some(pb) = self.progress.lock().await.take() {
            pb.finish_and_clear();
        }

        println!();
        println!("Report: {}", summary.root.display());
        println!("  Jobs:       {}", summary.jobs);
        println!("  Suites:     {}", summary.suites);
        println!("  Downloaded: {}", console::style(summary.downloaded).green());
        if !summary.failures.is_empty() {
            println!("  Failed:     {}", console::style(summary.failures.len()).red());
            for failure in &summary.failures {
                println!("    - {}", failure.path.display());
                println!("      {}", console::style(&failure.error).dim());
            }
        }
    }
}
