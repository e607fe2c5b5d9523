//! [`DeviceFarm`] backed by the AWS SDK.
//!
//! Credentials come from the standard AWS provider chain (environment,
//! profile, instance metadata). Device Farm itself only exists in
//! `us-west-2`, which is the configured default.

use std::error::Error;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_devicefarm::Client;
use aws_sdk_devicefarm::config::Region;
use aws_sdk_devicefarm::error::DisplayErrorContext;
use aws_sdk_devicefarm::primitives::DateTime as AwsDateTime;
use aws_sdk_devicefarm::types as aws;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::{
    Artifact, ArtifactCategory, CreateDevicePool, CreateUpload, Device, DeviceFarm,
    DevicePool, DevicePoolType, ExecutionResult, ExecutionStatus, FarmError, FarmResult, Job,
    PoolRule, Project, RemoteTest, Run, ScheduleRun, Suite, UniqueProblem, Upload,
    UploadKind, UploadStatus,
};

/// Device farm client talking to AWS.
#[derive(Clone)]
pub struct AwsDeviceFarm {
    client: Client,
}

impl AwsDeviceFarm {
    /// Loads AWS configuration from the environment and pins the region.
    pub async fn connect(region: &str) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        info!("Device farm client initialized: region={}", region);

        Self {
            client: Client::new(&sdk_config),
        }
    }
}

fn service_error<E: Error>(operation: &'static str, err: E) -> FarmError {
    FarmError::Service {
        operation,
        message: DisplayErrorContext(err).to_string(),
    }
}

fn required(
    value: Option<&str>,
    resource: &'static str,
    field: &'static str,
) -> FarmResult<String> {
    value
        .map(str::to_string)
        .ok_or(FarmError::MissingField { resource, field })
}

fn text(value: Option<&str>) -> String {
    value.unwrap_or_default().to_string()
}

fn timestamp(value: Option<&AwsDateTime>) -> Option<DateTime<Utc>> {
    value.and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()))
}

fn execution_status(value: Option<&aws::ExecutionStatus>) -> ExecutionStatus {
    value
        .map(|s| ExecutionStatus::from(s.as_str()))
        .unwrap_or_default()
}

fn execution_result(value: Option<&aws::ExecutionResult>) -> ExecutionResult {
    value
        .map(|r| ExecutionResult::from(r.as_str()))
        .unwrap_or_default()
}

fn project_from(p: &aws::Project) -> FarmResult<Project> {
    Ok(Project {
        arn: required(p.arn(), "Project", "arn")?,
        name: text(p.name()),
        created: timestamp(p.created()),
    })
}

fn device_from(d: &aws::Device) -> FarmResult<Device> {
    Ok(Device {
        arn: required(d.arn(), "Device", "arn")?,
        name: text(d.name()),
        os: text(d.os()),
        model: text(d.model()),
        platform: text(d.platform().map(|p| p.as_str())),
        form_factor: text(d.form_factor().map(|f| f.as_str())),
        manufacturer: text(d.manufacturer()),
    })
}

fn pool_from(p: &aws::DevicePool) -> FarmResult<DevicePool> {
    Ok(DevicePool {
        arn: required(p.arn(), "DevicePool", "arn")?,
        name: text(p.name()),
        description: p.description().map(str::to_string),
        pool_type: p
            .r#type()
            .map(|t| DevicePoolType::from(t.as_str()))
            .unwrap_or(DevicePoolType::Private),
        rules: p
            .rules()
            .iter()
            .map(|r| PoolRule {
                attribute: text(r.attribute().map(|a| a.as_str())),
                operator: text(r.operator().map(|o| o.as_str())),
                value: text(r.value()),
            })
            .collect(),
    })
}

fn upload_from(u: &aws::Upload) -> FarmResult<Upload> {
    Ok(Upload {
        arn: required(u.arn(), "Upload", "arn")?,
        name: text(u.name()),
        kind: UploadKind::from(u.r#type().map(|t| t.as_str()).unwrap_or_default()),
        content_type: u.content_type().map(str::to_string),
        url: u.url().map(str::to_string),
        status: u
            .status()
            .map(|s| UploadStatus::from(s.as_str()))
            .unwrap_or(UploadStatus::Initializing),
        message: u.message().map(str::to_string),
    })
}

fn run_from(r: &aws::Run) -> FarmResult<Run> {
    Ok(Run {
        arn: required(r.arn(), "Run", "arn")?,
        name: text(r.name()),
        platform: text(r.platform().map(|p| p.as_str())),
        test_type: text(r.r#type().map(|t| t.as_str())),
        status: execution_status(r.status()),
        result: execution_result(r.result()),
        created: timestamp(r.created()),
    })
}

fn job_from(j: &aws::Job) -> FarmResult<Job> {
    Ok(Job {
        arn: required(j.arn(), "Job", "arn")?,
        name: text(j.name()),
        device: j.device().map(device_from).transpose()?,
        status: execution_status(j.status()),
        result: execution_result(j.result()),
    })
}

fn suite_from(s: &aws::Suite) -> FarmResult<Suite> {
    Ok(Suite {
        arn: required(s.arn(), "Suite", "arn")?,
        name: text(s.name()),
        status: execution_status(s.status()),
        result: execution_result(s.result()),
        message: s.message().map(str::to_string),
    })
}

fn test_from(t: &aws::Test) -> FarmResult<RemoteTest> {
    Ok(RemoteTest {
        arn: required(t.arn(), "Test", "arn")?,
        name: text(t.name()),
        status: execution_status(t.status()),
        result: execution_result(t.result()),
        message: t.message().map(str::to_string),
    })
}

fn artifact_from(a: &aws::Artifact, category: &ArtifactCategory) -> FarmResult<Artifact> {
    Ok(Artifact {
        arn: required(a.arn(), "Artifact", "arn")?,
        name: text(a.name()),
        extension: text(a.extension()),
        url: a.url().map(str::to_string),
        category: category.clone(),
        kind: text(a.r#type().map(|t| t.as_str())),
    })
}

#[async_trait]
impl DeviceFarm for AwsDeviceFarm {
    async fn list_projects(&self) -> FarmResult<Vec<Project>> {
        let mut projects = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let page = self
                .client
                .list_projects()
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| service_error("ListProjects", e))?;
            for project in page.projects() {
                projects.push(project_from(project)?);
            }
            match page.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }
        Ok(projects)
    }

    async fn list_devices(&self) -> FarmResult<Vec<Device>> {
        let mut devices = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let page = self
                .client
                .list_devices()
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| service_error("ListDevices", e))?;
            for device in page.devices() {
                devices.push(device_from(device)?);
            }
            match page.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }
        debug!("Listed {} devices", devices.len());
        Ok(devices)
    }

    async fn list_device_pools(&self, project_arn: &str) -> FarmResult<Vec<DevicePool>> {
        let mut pools = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let page = self
                .client
                .list_device_pools()
                .arn(project_arn)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| service_error("ListDevicePools", e))?;
            for pool in page.device_pools() {
                pools.push(pool_from(pool)?);
            }
            match page.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }
        Ok(pools)
    }

    async fn create_device_pool(&self, input: &CreateDevicePool) -> FarmResult<DevicePool> {
        let rules = input
            .rules
            .iter()
            .map(|rule| {
                aws::Rule::builder()
                    .attribute(aws::DeviceAttribute::from(rule.attribute.as_str()))
                    .operator(aws::RuleOperator::from(rule.operator.as_str()))
                    .value(&rule.value)
                    .build()
            })
            .collect::<Vec<_>>();

        let output = self
            .client
            .create_device_pool()
            .project_arn(&input.project_arn)
            .name(&input.name)
            .description(&input.description)
            .set_rules(Some(rules))
            .send()
            .await
            .map_err(|e| service_error("CreateDevicePool", e))?;

        let pool = output.device_pool().ok_or(FarmError::MissingField {
            resource: "CreateDevicePool",
            field: "devicePool",
        })?;
        pool_from(pool)
    }

    async fn list_uploads(&self, project_arn: &str) -> FarmResult<Vec<Upload>> {
        let mut uploads = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let page = self
                .client
                .list_uploads()
                .arn(project_arn)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| service_error("ListUploads", e))?;
            for upload in page.uploads() {
                uploads.push(upload_from(upload)?);
            }
            match page.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }
        Ok(uploads)
    }

    async fn create_upload(&self, input: &CreateUpload) -> FarmResult<Upload> {
        let output = self
            .client
            .create_upload()
            .project_arn(&input.project_arn)
            .name(&input.name)
            .r#type(aws::UploadType::from(input.kind.as_str()))
            .set_content_type(input.content_type.clone())
            .send()
            .await
            .map_err(|e| service_error("CreateUpload", e))?;

        let upload = output.upload().ok_or(FarmError::MissingField {
            resource: "CreateUpload",
            field: "upload",
        })?;
        upload_from(upload)
    }

    async fn get_upload(&self, arn: &str) -> FarmResult<Upload> {
        let output = self
            .client
            .get_upload()
            .arn(arn)
            .send()
            .await
            .map_err(|e| service_error("GetUpload", e))?;

        match output.upload() {
            Some(upload) => upload_from(upload),
            None => Err(FarmError::NotFound {
                resource: "Upload",
                arn: arn.to_string(),
            }),
        }
    }

    async fn list_runs(&self, project_arn: &str) -> FarmResult<Vec<Run>> {
        let mut runs = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let page = self
                .client
                .list_runs()
                .arn(project_arn)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| service_error("ListRuns", e))?;
            for run in page.runs() {
                runs.push(run_from(run)?);
            }
            match page.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }
        Ok(runs)
    }

    async fn schedule_run(&self, input: &ScheduleRun) -> FarmResult<Run> {
        let test = aws::ScheduleRunTest::builder()
            .r#type(aws::TestType::from(input.test.test_type.as_str()))
            .set_test_package_arn(input.test.package_arn.clone())
            .set_test_spec_arn(input.test.spec_arn.clone())
            .build()
            .map_err(|e| FarmError::InvalidRequest(e.to_string()))?;

        let output = self
            .client
            .schedule_run()
            .project_arn(&input.project_arn)
            .name(&input.name)
            .set_app_arn(input.app_arn.clone())
            .device_pool_arn(&input.device_pool_arn)
            .test(test)
            .send()
            .await
            .map_err(|e| service_error("ScheduleRun", e))?;

        let run = output.run().ok_or(FarmError::MissingField {
            resource: "ScheduleRun",
            field: "run",
        })?;
        run_from(run)
    }

    async fn get_run(&self, arn: &str) -> FarmResult<Run> {
        let output = self
            .client
            .get_run()
            .arn(arn)
            .send()
            .await
            .map_err(|e| service_error("GetRun", e))?;

        match output.run() {
            Some(run) => run_from(run),
            None => Err(FarmError::NotFound {
                resource: "Run",
                arn: arn.to_string(),
            }),
        }
    }

    async fn list_jobs(&self, run_arn: &str) -> FarmResult<Vec<Job>> {
        let mut jobs = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let page = self
                .client
                .list_jobs()
                .arn(run_arn)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| service_error("ListJobs", e))?;
            for job in page.jobs() {
                jobs.push(job_from(job)?);
            }
            match page.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }
        Ok(jobs)
    }

    async fn get_job(&self, arn: &str) -> FarmResult<Job> {
        let output = self
            .client
            .get_job()
            .arn(arn)
            .send()
            .await
            .map_err(|e| service_error("GetJob", e))?;

        match output.job() {
            Some(job) => job_from(job),
            None => Err(FarmError::NotFound {
                resource: "Job",
                arn: arn.to_string(),
            }),
        }
    }

    async fn list_suites(&self, owner_arn: &str) -> FarmResult<Vec<Suite>> {
        let mut suites = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let page = self
                .client
                .list_suites()
                .arn(owner_arn)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| service_error("ListSuites", e))?;
            for suite in page.suites() {
                suites.push(suite_from(suite)?);
            }
            match page.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }
        Ok(suites)
    }

    async fn get_suite(&self, arn: &str) -> FarmResult<Suite> {
        let output = self
            .client
            .get_suite()
            .arn(arn)
            .send()
            .await
            .map_err(|e| service_error("GetSuite", e))?;

        match output.suite() {
            Some(suite) => suite_from(suite),
            None => Err(FarmError::NotFound {
                resource: "Suite",
                arn: arn.to_string(),
            }),
        }
    }

    async fn list_tests(&self, owner_arn: &str) -> FarmResult<Vec<RemoteTest>> {
        let mut tests = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let page = self
                .client
                .list_tests()
                .arn(owner_arn)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| service_error("ListTests", e))?;
            for test in page.tests() {
                tests.push(test_from(test)?);
            }
            match page.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }
        Ok(tests)
    }

    async fn list_unique_problems(&self, run_arn: &str) -> FarmResult<Vec<UniqueProblem>> {
        let mut problems = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let page = self
                .client
                .list_unique_problems()
                .arn(run_arn)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| service_error("ListUniqueProblems", e))?;
            if let Some(by_result) = page.unique_problems() {
                for (result, unique) in by_result {
                    for problem in unique {
                        problems.push(UniqueProblem {
                            result: ExecutionResult::from(result.as_str()),
                            message: text(problem.message()),
                            occurrences: problem.problems().len(),
                        });
                    }
                }
            }
            match page.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }
        // The service returns a map; give callers a stable order.
        problems.sort_by(|a, b| {
            (a.result.as_str(), &a.message).cmp(&(b.result.as_str(), &b.message))
        });
        Ok(problems)
    }

    async fn list_artifacts(
        &self,
        owner_arn: &str,
        category: &ArtifactCategory,
    ) -> FarmResult<Vec<Artifact>> {
        let mut artifacts = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let page = self
                .client
                .list_artifacts()
                .arn(owner_arn)
                .r#type(aws::ArtifactCategory::from(category.as_str()))
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| service_error("ListArtifacts", e))?;
            for artifact in page.artifacts() {
                artifacts.push(artifact_from(artifact, category)?);
            }
            match page.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }
        debug!(
            "Listed {} {} artifacts under {}",
            artifacts.len(),
            category,
            owner_arn
        );
        Ok(artifacts)
    }
}
