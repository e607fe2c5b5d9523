//! Configuration schema definitions for devicefarm-cli.
//!
//! # Schema Overview
//!
//! ```text
//! Config (root)
//! ├── FarmConfig      - Service region
//! ├── PollingConfig   - Pacing and limits of upload and run waits
//! └── ReportConfig    - Report directory and download behavior
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::report::{DownloadPolicy, ReportOptions};
use crate::wait::PollPolicy;

/// Root configuration structure.
///
/// # TOML Structure
///
/// ```toml
/// [farm]
/// region = "us-west-2"
///
/// [polling]
/// interval_secs = 4
/// run_timeout_secs = 7200
///
/// [report]
/// output_dir = "report"
/// on_download_error = "continue"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub farm: FarmConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub report: ReportConfig,
}

impl Config {
    /// Checks values that parse but cannot be used.
    pub fn validate(&self) -> Result<()> {
        self.polling.validate()?;
        if self.report.concurrency == 0 {
            bail!("report.concurrency must be at least 1");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FarmConfig {
    /// AWS region hosting the device farm. Device Farm only runs in us-west-2.
    #[serde(default = "default_region")]
    pub region: String,
}

impl Default for FarmConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
        }
    }
}

fn default_region() -> String {
    "us-west-2".to_string()
}

/// How uploads and runs are polled.
///
/// Checks start `interval_secs` apart and the gap grows by `backoff` after
/// every pending check, up to `max_interval_secs`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    #[serde(default = "default_max_interval")]
    pub max_interval_secs: u64,

    #[serde(default = "default_backoff")]
    pub backoff: f64,

    /// Give up on upload processing after this long.
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_secs: u64,

    /// Give up on a run after this long.
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,

    /// Maximum checks per wait. `0` leaves only the timeout.
    #[serde(default)]
    pub max_attempts: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            max_interval_secs: default_max_interval(),
            backoff: default_backoff(),
            upload_timeout_secs: default_upload_timeout(),
            run_timeout_secs: default_run_timeout(),
            max_attempts: 0,
        }
    }
}

/// Largest accepted `backoff` factor.
pub const MAX_BACKOFF: f64 = 10.0;

impl PollingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            bail!("polling.interval_secs must be at least 1");
        }
        if !self.backoff.is_finite() || !(1.0..=MAX_BACKOFF).contains(&self.backoff) {
            bail!(
                "polling.backoff must be between 1.0 and {}, got {}",
                MAX_BACKOFF,
                self.backoff
            );
        }
        Ok(())
    }

    fn policy(&self, timeout_secs: u64) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.interval_secs),
            max_interval: Duration::from_secs(self.max_interval_secs),
            backoff: self.backoff,
            timeout: Some(Duration::from_secs(timeout_secs)),
            max_attempts: (self.max_attempts > 0).then_some(self.max_attempts),
        }
    }

    pub fn upload_policy(&self) -> PollPolicy {
        self.policy(self.upload_timeout_secs)
    }

    pub fn run_policy(&self) -> PollPolicy {
        self.policy(self.run_timeout_secs)
    }
}

fn default_interval() -> u64 {
    4
}

fn default_max_interval() -> u64 {
    30
}

fn default_backoff() -> f64 {
    1.5
}

fn default_upload_timeout() -> u64 {
    15 * 60
}

fn default_run_timeout() -> u64 {
    2 * 60 * 60
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportConfig {
    /// Directory the report tree is written to.
    #[serde(default = "default_report_dir")]
    pub output_dir: PathBuf,

    /// Maximum artifact downloads in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default)]
    pub on_download_error: DownloadPolicy,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_report_dir(),
            concurrency: default_concurrency(),
            on_download_error: DownloadPolicy::default(),
        }
    }
}

impl ReportConfig {
    pub fn options(&self) -> ReportOptions {
        ReportOptions::new(self.output_dir.clone())
            .with_concurrency(self.concurrency)
            .with_policy(self.on_download_error)
    }
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("report")
}

fn default_concurrency() -> usize {
    4
}
