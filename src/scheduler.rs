//! End-to-end run scheduling.
//!
//! [`RunScheduler::schedule`] turns a [`ScheduleRequest`] into a finished run:
//!
//! 1. upload the application file, if one was given;
//! 2. resolve the device pool (explicit, or created from a device);
//! 3. map the test type to its package and spec upload kinds;
//! 4. upload the test package and test spec files, if given;
//! 5. submit the run;
//! 6. poll the run until it is `COMPLETED`;
//! 7. download the run's artifacts into the report tree.
//!
//! Any failure aborts the workflow. Uploads and runs created before the
//! failure are left in place.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::farm::{
    DeviceFarm, ExecutionStatus, FarmError, Run, ScheduleRun, TestDescriptor, UploadKind,
};
use crate::pool::{PoolError, resolve_device_pool};
use crate::progress::{NullReporter, Reporter};
use crate::report::{ReportBuilder, ReportError, ReportSummary};
use crate::test_type::{TestType, TestTypeError, guess_app_kind};
use crate::upload::{UploadError, Uploader};
use crate::wait::{PollPolicy, PollStatus, WaitError, poll_until};

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error(transparent)]
    TestType(#[from] TestTypeError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("Test type {0} does not take a test spec")]
    NoSpecKind(TestType),

    #[error("Test type {0} does not take a test package")]
    NoPackageKind(TestType),

    #[error(transparent)]
    Farm(#[from] FarmError),

    #[error(transparent)]
    Wait(WaitError),

    #[error(transparent)]
    Report(#[from] ReportError),
}

impl From<WaitError> for ScheduleError {
    fn from(err: WaitError) -> Self {
        match err {
            WaitError::Farm(err) => ScheduleError::Farm(err),
            other => ScheduleError::Wait(other),
        }
    }
}

/// Something that is either already in the farm or still a local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Arn(String),
    File(PathBuf),
}

impl Source {
    /// Picks the file when given, else the ARN. Empty strings count as absent.
    pub fn from_parts(arn: Option<String>, file: Option<PathBuf>) -> Option<Source> {
        match (arn.filter(|a| !a.is_empty()), file) {
            (_, Some(file)) => Some(Source::File(file)),
            (Some(arn), None) => Some(Source::Arn(arn)),
            (None, None) => None,
        }
    }
}

/// Everything needed to schedule one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleRequest {
    pub project_arn: String,
    pub run_name: String,
    pub app: Option<Source>,
    /// Overrides the kind guessed from the app file's extension.
    pub app_kind: Option<UploadKind>,
    pub device: Option<String>,
    pub device_pool: Option<String>,
    /// Test framework name, e.g. `INSTRUMENTATION`.
    pub test_type: String,
    pub test_package: Option<Source>,
    pub test_spec: Option<Source>,
}

/// A completed run and its downloaded report.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run: Run,
    pub report: ReportSummary,
}

pub struct RunScheduler {
    farm: Arc<dyn DeviceFarm>,
    uploader: Uploader,
    report: ReportBuilder,
    policy: PollPolicy,
    cancel: CancellationToken,
    reporter: Arc<dyn Reporter>,
}

impl RunScheduler {
    /// `policy` paces the wait for run completion; uploads use the uploader's own.
    pub fn new(
        farm: Arc<dyn DeviceFarm>,
        uploader: Uploader,
        report: ReportBuilder,
        policy: PollPolicy,
    ) -> Self {
        Self {
            farm,
            uploader,
            report,
            policy,
            cancel: CancellationToken::new(),
            reporter: Arc::new(NullReporter),
        }
    }

    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.uploader = self.uploader.with_cancellation_token(cancel.clone());
        self.cancel = cancel;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.uploader = self.uploader.with_reporter(reporter.clone());
        self.report = self.report.with_reporter(reporter.clone());
        self.reporter = reporter;
        self
    }

    pub async fn schedule(&self, request: &ScheduleRequest) -> Result<RunOutcome, ScheduleError> {
        let project = request.project_arn.as_str();

        let app_arn = match &request.app {
            Some(Source::File(path)) => {
                let kind = match &request.app_kind {
                    Some(kind) => kind.clone(),
                    None => guess_app_kind(path)?,
                };
                Some(self.uploader.upload(path, kind, project, None).await?.arn)
            }
            Some(Source::Arn(arn)) => Some(arn.clone()),
            None => None,
        };

        let pool_arn = resolve_device_pool(
            self.farm.as_ref(),
            project,
            request.device_pool.as_deref().filter(|p| !p.is_empty()),
            request.device.as_deref().filter(|d| !d.is_empty()),
        )
        .await?;

        let test_type: TestType = request.test_type.parse()?;
        let (package_kind, spec_kind) = test_type.kinds();

        let package_arn = match &request.test_package {
            Some(Source::File(path)) => {
                let kind = package_kind.ok_or(ScheduleError::NoPackageKind(test_type))?;
                Some(self.uploader.upload(path, kind, project, None).await?.arn)
            }
            Some(Source::Arn(arn)) => Some(arn.clone()),
            None => None,
        };

        let spec_arn = match &request.test_spec {
            Some(Source::File(path)) => {
                let kind = spec_kind.ok_or(ScheduleError::NoSpecKind(test_type))?;
                Some(self.uploader.upload(path, kind, project, None).await?.arn)
            }
            Some(Source::Arn(arn)) => Some(arn.clone()),
            None => None,
        }
        .filter(|arn| !arn.is_empty());

        let input = ScheduleRun {
            project_arn: project.to_string(),
            name: request.run_name.clone(),
            app_arn,
            device_pool_arn: pool_arn,
            test: TestDescriptor {
                test_type,
                package_arn,
                spec_arn,
            },
        };

        self.reporter
            .on_step(&format!("Scheduling run {}", request.run_name))
            .await;
        let scheduled = self.farm.schedule_run(&input).await?;
        info!("Scheduled run {} ({})", scheduled.name, scheduled.arn);

        self.reporter.on_step("Waiting until the tests complete").await;
        let run = self.wait_for_run(&scheduled.arn).await?;
        self.reporter
            .on_step_done(&format!("Run {} completed with result {}", run.name, run.result))
            .await;

        let report = self.report.build(&run.arn).await?;
        Ok(RunOutcome { run, report })
    }

    /// Polls a run until its status is `COMPLETED`.
    pub async fn wait_for_run(&self, run_arn: &str) -> Result<Run, ScheduleError> {
        let what = format!("run {}", run_arn);
        let run = poll_until(&what, &self.policy, &self.cancel, || async {
            let run = self.farm.get_run(run_arn).await?;
            if run.status == ExecutionStatus::Completed {
                Ok::<_, FarmError>(PollStatus::Ready(run))
            } else {
                self.reporter.on_status("Run", run.status.as_str()).await;
                Ok(PollStatus::Pending(run.status.to_string()))
            }
        })
        .await?;
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::farm::fake::FakeDeviceFarm;
    use crate::farm::{Device, ExecutionResult};
    use crate::report::ReportOptions;
    use crate::transfer::fake::FakeTransfer;

    struct Harness {
        farm: FakeDeviceFarm,
        transfer: FakeTransfer,
        dir: tempfile::TempDir,
    }

    impl Harness {
        async fn new() -> Self {
            let farm = FakeDeviceFarm::new();
            farm.add_device(Device {
                arn: "arn:device:p5".to_string(),
                name: "Pixel 5".to_string(),
                os: "11".to_string(),
                model: "Pixel 5".to_string(),
                platform: "ANDROID".to_string(),
                form_factor: "PHONE".to_string(),
                manufacturer: "Google".to_string(),
            })
            .await;
            Self {
                farm,
                transfer: FakeTransfer::new(),
                dir: tempfile::tempdir().unwrap(),
            }
        }

        fn file(&self, name: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            std::fs::write(&path, name.as_bytes()).unwrap();
            path
        }

        fn scheduler(&self) -> RunScheduler {
            let farm: Arc<dyn DeviceFarm> = Arc::new(self.farm.clone());
            let transfer = Arc::new(self.transfer.clone());
            let policy = PollPolicy::fixed(Duration::from_secs(4)).with_max_attempts(50);
            let uploader = Uploader::new(farm.clone(), transfer.clone(), policy.clone());
            let report = ReportBuilder::new(
                farm.clone(),
                transfer,
                ReportOptions::new(self.dir.path().join("report")),
            );
            RunScheduler::new(farm, uploader, report, policy)
        }

        fn request(&self) -> ScheduleRequest {
            ScheduleRequest {
                project_arn: "arn:project:p1".to_string(),
                run_name: "nightly".to_string(),
                app: Some(Source::File(self.file("app.apk"))),
                app_kind: None,
                device: Some("Pixel 5 - 11".to_string()),
                device_pool: None,
                test_type: "INSTRUMENTATION".to_string(),
                test_package: Some(Source::File(self.file("tests.jar"))),
                test_spec: None,
            }
        }
    }

    #[test]
    fn test_source_prefers_file() {
        assert_eq!(
            Source::from_parts(Some("arn:x".to_string()), Some(PathBuf::from("a.apk"))),
            Some(Source::File(PathBuf::from("a.apk")))
        );
        assert_eq!(
            Source::from_parts(Some("arn:x".to_string()), None),
            Some(Source::Arn("arn:x".to_string()))
        );
        assert_eq!(Source::from_parts(Some(String::new()), None), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_uploads_then_runs() {
        let h = Harness::new().await;
        h.farm
            .set_run_script(vec![
                ExecutionStatus::Scheduling,
                ExecutionStatus::Running,
                ExecutionStatus::Completed,
            ])
            .await;

        let outcome = h.scheduler().schedule(&h.request()).await.unwrap();

        assert_eq!(outcome.run.status, ExecutionStatus::Completed);
        assert_eq!(outcome.run.result, ExecutionResult::Passed);
        assert_eq!(h.farm.call_count("GetRun").await, 3 + 1);

        let kinds: Vec<UploadKind> = h
            .farm
            .created_uploads()
            .await
            .into_iter()
            .map(|u| u.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![UploadKind::AndroidApp, UploadKind::InstrumentationTestPackage]
        );

        let scheduled = h.farm.scheduled_runs().await;
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].test.test_type, TestType::Instrumentation);
        assert!(scheduled[0].app_arn.is_some());
        assert!(scheduled[0].test.package_arn.is_some());
        assert_eq!(scheduled[0].test.spec_arn, None);
        assert!(scheduled[0].device_pool_arn.contains(":devicepool:"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_existing_arns_are_not_uploaded() {
        let h = Harness::new().await;
        let request = ScheduleRequest {
            app: Some(Source::Arn("arn:upload:app".to_string())),
            device_pool: Some("arn:pool:given".to_string()),
            test_package: Some(Source::Arn("arn:upload:pkg".to_string())),
            test_spec: Some(Source::Arn("arn:upload:spec".to_string())),
            ..h.request()
        };

        h.scheduler().schedule(&request).await.unwrap();

        assert!(h.farm.created_uploads().await.is_empty());
        assert!(h.farm.created_pools().await.is_empty());
        let scheduled = &h.farm.scheduled_runs().await[0];
        assert_eq!(scheduled.app_arn.as_deref(), Some("arn:upload:app"));
        assert_eq!(scheduled.device_pool_arn, "arn:pool:given");
        assert_eq!(scheduled.test.spec_arn.as_deref(), Some("arn:upload:spec"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spec_file_uploaded_with_spec_kind() {
        let h = Harness::new().await;
        let request = ScheduleRequest {
            test_spec: Some(Source::File(h.file("spec.yml"))),
            ..h.request()
        };

        h.scheduler().schedule(&request).await.unwrap();

        let created = h.farm.created_uploads().await;
        assert_eq!(created[2].kind, UploadKind::InstrumentationTestSpec);
        assert!(h.farm.scheduled_runs().await[0].test.spec_arn.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spec_file_rejected_for_type_without_spec() {
        let h = Harness::new().await;
        let request = ScheduleRequest {
            test_type: "CALABASH".to_string(),
            test_spec: Some(Source::File(h.file("spec.yml"))),
            ..h.request()
        };

        let err = h.scheduler().schedule(&request).await.unwrap_err();

        assert!(matches!(err, ScheduleError::NoSpecKind(TestType::Calabash)));
        assert!(h.farm.scheduled_runs().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_test_type_after_app_upload() {
        let h = Harness::new().await;
        let request = ScheduleRequest {
            test_type: "ESPRESSO".to_string(),
            ..h.request()
        };

        let err = h.scheduler().schedule(&request).await.unwrap_err();

        assert!(matches!(
            err,
            ScheduleError::TestType(TestTypeError::UnknownTestType(_))
        ));
        // The app was already uploaded; nothing is rolled back.
        assert_eq!(h.farm.created_uploads().await.len(), 1);
        assert!(h.farm.scheduled_runs().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unguessable_app_file() {
        let h = Harness::new().await;
        let request = ScheduleRequest {
            app: Some(Source::File(h.file("app.zip"))),
            ..h.request()
        };

        let err = h.scheduler().schedule(&request).await.unwrap_err();

        assert!(matches!(
            err,
            ScheduleError::TestType(TestTypeError::UnguessableAppType(_))
        ));
        assert!(h.farm.created_uploads().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_app_kind_skips_guessing() {
        let h = Harness::new().await;
        let request = ScheduleRequest {
            app: Some(Source::File(h.file("app.zip"))),
            app_kind: Some(UploadKind::WebApp),
            ..h.request()
        };

        h.scheduler().schedule(&request).await.unwrap();

        assert_eq!(h.farm.created_uploads().await[0].kind, UploadKind::WebApp);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_device_and_pool() {
        let h = Harness::new().await;
        let request = ScheduleRequest {
            device: None,
            device_pool: None,
            ..h.request()
        };

        let err = h.scheduler().schedule(&request).await.unwrap_err();

        assert!(matches!(err, ScheduleError::Pool(PoolError::MissingDeviceOrPool)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_builtin_runs_without_package() {
        let h = Harness::new().await;
        let request = ScheduleRequest {
            test_type: "BUILTIN_FUZZ".to_string(),
            test_package: None,
            ..h.request()
        };

        h.scheduler().schedule(&request).await.unwrap();

        let scheduled = &h.farm.scheduled_runs().await[0];
        assert_eq!(scheduled.test.test_type, TestType::BuiltinFuzz);
        assert_eq!(scheduled.test.package_arn, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_run_wait() {
        let h = Harness::new().await;
        h.farm.set_run_script(vec![ExecutionStatus::Running]).await;
        let cancel = CancellationToken::new();
        let scheduler = h.scheduler().with_cancellation_token(cancel.clone());

        let request = h.request();
        let schedule = scheduler.schedule(&request);
        tokio::pin!(schedule);

        tokio::select! {
            _ = &mut schedule => panic!("run should still be pending"),
            _ = tokio::time::sleep(Duration::from_secs(60)) => cancel.cancel(),
        }
        let err = schedule.await.unwrap_err();

        assert!(matches!(err, ScheduleError::Wait(WaitError::Cancelled { .. })));
        assert_eq!(h.farm.scheduled_runs().await.len(), 1);
    }
}
