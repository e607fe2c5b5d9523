//! devicefarm: schedule mobile test runs on AWS Device Farm and collect
//! their artifacts.
//!
//! # Architecture
//!
//! The main components are:
//!
//! - **Farm**: The [`farm::DeviceFarm`] trait over the remote service (AWS SDK or in-memory fake)
//! - **Upload**: Send local files through presigned URLs and wait for processing
//! - **Pool**: Turn a device name into a single-device pool
//! - **Test types**: Map a test framework to the upload kinds it needs
//! - **Scheduler**: Upload, resolve, schedule, wait, then report
//! - **Report**: Match artifacts to suites and download a per-suite tree
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use devicefarm::config::load_config_or_default;
//! use devicefarm::farm::aws::AwsDeviceFarm;
//! use devicefarm::report::ReportBuilder;
//! use devicefarm::transfer::HttpTransfer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config_or_default(None)?;
//!     let farm = Arc::new(AwsDeviceFarm::connect(&config.farm.region).await);
//!     let transfer = Arc::new(HttpTransfer::new()?);
//!     let builder = ReportBuilder::new(farm, transfer, config.report.options());
//!     let summary = builder.build("arn:aws:devicefarm:us-west-2:123456789012:run:...").await?;
//!     println!("{} artifacts downloaded", summary.downloaded);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod farm;
pub mod pool;
pub mod progress;
pub mod report;
pub mod scheduler;
pub mod table;
pub mod test_type;
pub mod transfer;
pub mod upload;
pub mod wait;

// Re-export commonly used types
pub use config::{Config, load_config};
pub use farm::{DeviceFarm, FarmError};
pub use progress::Reporter;
pub use report::{ReportBuilder, ReportSummary};
pub use scheduler::{RunOutcome, RunScheduler, ScheduleRequest};
pub use test_type::TestType;
