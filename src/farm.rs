//! Access to the remote device farm.
//!
//! The rest of the crate talks to the service only through the [`DeviceFarm`]
//! trait. A handle is passed explicitly into every component so that tests can
//! substitute the in-memory [`fake::FakeDeviceFarm`].
//!
//! ```text
//!   RunScheduler ─┬─► Uploader ──────► DeviceFarm::create_upload / get_upload
//!                 ├─► pool resolver ─► DeviceFarm::list_devices / create_device_pool
//!                 ├─► DeviceFarm::schedule_run / get_run
//!                 └─► ReportBuilder ─► DeviceFarm::list_artifacts / list_jobs / list_suites
//! ```
//!
//! # Implementations
//!
//! | Type | Module | Backend |
//! |------|--------|---------|
//! | [`aws::AwsDeviceFarm`] | [`aws`] | AWS SDK, follows pagination tokens |
//! | [`fake::FakeDeviceFarm`] | [`fake`] | In-memory, scripted status sequences |

pub mod aws;
pub mod fake;
pub mod model;

use std::sync::Arc;

use async_trait::async_trait;

pub use model::*;

/// Result type for device farm calls.
pub type FarmResult<T> = Result<T, FarmError>;

/// Errors returned by a [`DeviceFarm`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum FarmError {
    /// The service rejected or failed the call.
    #[error("{operation} failed: {message}")]
    Service {
        operation: &'static str,
        message: String,
    },

    /// The requested resource does not exist.
    #[error("{resource} not found: {arn}")]
    NotFound { resource: &'static str, arn: String },

    /// The service answered without a field the client relies on.
    #[error("{resource} response is missing its {field}")]
    MissingField {
        resource: &'static str,
        field: &'static str,
    },

    /// The request could not be built locally.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Operations the client needs from the remote testing service.
///
/// Listing calls return every page; callers never see pagination tokens.
#[async_trait]
pub trait DeviceFarm: Send + Sync {
    async fn list_projects(&self) -> FarmResult<Vec<Project>>;

    /// Lists every device the service offers, across all projects.
    async fn list_devices(&self) -> FarmResult<Vec<Device>>;

    async fn list_device_pools(&self, project_arn: &str) -> FarmResult<Vec<DevicePool>>;

    async fn create_device_pool(&self, input: &CreateDevicePool) -> FarmResult<DevicePool>;

    async fn list_uploads(&self, project_arn: &str) -> FarmResult<Vec<Upload>>;

    /// Creates an upload resource. The returned upload carries the presigned URL.
    async fn create_upload(&self, input: &CreateUpload) -> FarmResult<Upload>;

    async fn get_upload(&self, arn: &str) -> FarmResult<Upload>;

    async fn list_runs(&self, project_arn: &str) -> FarmResult<Vec<Run>>;

    async fn schedule_run(&self, input: &ScheduleRun) -> FarmResult<Run>;

    async fn get_run(&self, arn: &str) -> FarmResult<Run>;

    async fn list_jobs(&self, run_arn: &str) -> FarmResult<Vec<Job>>;

    async fn get_job(&self, arn: &str) -> FarmResult<Job>;

    /// Lists the suites of a job (or of every job when given a run).
    async fn list_suites(&self, owner_arn: &str) -> FarmResult<Vec<Suite>>;

    async fn get_suite(&self, arn: &str) -> FarmResult<Suite>;

    async fn list_tests(&self, owner_arn: &str) -> FarmResult<Vec<RemoteTest>>;

    async fn list_unique_problems(&self, run_arn: &str) -> FarmResult<Vec<UniqueProblem>>;

    /// Lists the artifacts of one category below a run, job, suite or test.
    async fn list_artifacts(
        &self,
        owner_arn: &str,
        category: &ArtifactCategory,
    ) -> FarmResult<Vec<Artifact>>;
}

#[async_trait]
impl<T: DeviceFarm + ?Sized> DeviceFarm for Arc<T> {
    async fn list_projects(&self) -> FarmResult<Vec<Project>> {
        (**self).list_projects().await
    }

    async fn list_devices(&self) -> FarmResult<Vec<Device>> {
        (**self).list_devices().await
    }

    async fn list_device_pools(&self, project_arn: &str) -> FarmResult<Vec<DevicePool>> {
        (**self).list_device_pools(project_arn).await
    }

    async fn create_device_pool(&self, input: &CreateDevicePool) -> FarmResult<DevicePool> {
        (**self).create_device_pool(input).await
    }

    async fn list_uploads(&self, project_arn: &str) -> FarmResult<Vec<Upload>> {
        (**self).list_uploads(project_arn).await
    }

    async fn create_upload(&self, input: &CreateUpload) -> FarmResult<Upload> {
        (**self).create_upload(input).await
    }

    async fn get_upload(&self, arn: &str) -> FarmResult<Upload> {
        (**self).get_upload(arn).await
    }

    async fn list_runs(&self, project_arn: &str) -> FarmResult<Vec<Run>> {
        (**self).list_runs(project_arn).await
    }

    async fn schedule_run(&self, input: &ScheduleRun) -> FarmResult<Run> {
        (**self).schedule_run(input).await
    }

    async fn get_run(&self, arn: &str) -> FarmResult<Run> {
        (**self).get_run(arn).await
    }

    async fn list_jobs(&self, run_arn: &str) -> FarmResult<Vec<Job>> {
        (**self).list_jobs(run_arn).await
    }

    async fn get_job(&self, arn: &str) -> FarmResult<Job> {
        (**self).get_job(arn).await
    }

    async fn list_suites(&self, owner_arn: &str) -> FarmResult<Vec<Suite>> {
        (**self).list_suites(owner_arn).await
    }

    async fn get_suite(&self, arn: &str) -> FarmResult<Suite> {
        (**self).get_suite(arn).await
    }

    async fn list_tests(&self, owner_arn: &str) -> FarmResult<Vec<RemoteTest>> {
        (**self).list_tests(owner_arn).await
    }

    async fn list_unique_problems(&self, run_arn: &str) -> FarmResult<Vec<UniqueProblem>> {
        (**self).list_unique_problems(run_arn).await
    }

    async fn list_artifacts(
        &self,
        owner_arn: &str,
        category: &ArtifactCategory,
    ) -> FarmResult<Vec<Artifact>> {
        (**self).list_artifacts(owner_arn, category).await
    }
}
