use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{
    Artifact, ArtifactCategory, CreateDevicePool, CreateUpload, Device, DeviceFarm,
    DevicePool, DevicePoolType, ExecutionResult, ExecutionStatus, FarmError, FarmResult, Job,
    Project, RemoteTest, Run, ScheduleRun, Suite, UniqueProblem, Upload, UploadStatus,
};

const ACCOUNT_PREFIX: &str = "arn:aws:devicefarm:us-west-2:123456789012";

#[derive(Default)]
struct State {
    projects: Vec<Project>,
    devices: Vec<Device>,
    pools: Vec<DevicePool>,
    uploads: Vec<Upload>,
    runs: Vec<Run>,
    jobs: HashMap<String, Vec<Job>>,
    suites: HashMap<String, Vec<Suite>>,
    tests: HashMap<String, Vec<RemoteTest>>,
    problems: HashMap<String, Vec<UniqueProblem>>,
    artifacts: HashMap<(String, ArtifactCategory), Vec<Artifact>>,

    upload_script: Vec<UploadStatus>,
    upload_progress: HashMap<String, VecDeque<UploadStatus>>,
    run_script: Vec<ExecutionStatus>,
    run_progress: HashMap<String, VecDeque<ExecutionStatus>>,
    next_run_arn: Option<String>,
    failing_operations: Vec<&'static str>,

    created_uploads: Vec<CreateUpload>,
    created_pools: Vec<CreateDevicePool>,
    scheduled: Vec<ScheduleRun>,
    calls: Vec<String>,
    sequence: usize,
}

impl State {
    fn record(&mut self, operation: &'static str, arn: &str) -> FarmResult<()> {
        self.calls.push(format!("{} {}", operation, arn).trim_end().to_string());
        if self.failing_operations.contains(&operation) {
            return Err(FarmError::Service {
                operation,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn next_id(&mut self) -> usize {
        self.sequence += 1;
        self.sequence
    }
}

/// In-memory [`DeviceFarm`] for tests.
///
/// Uploads and runs walk through scripted status sequences, one step per
/// `get_*` call, and stay on the last status once the script runs out. Every
/// call is recorded so tests can assert on what the workflow asked for.
#[derive(Clone)]
pub struct FakeDeviceFarm {
    state: Arc<Mutex<State>>,
}

impl Default for FakeDeviceFarm {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDeviceFarm {
    /// An empty farm where uploads succeed and runs complete on the first poll.
    pub fn new() -> Self {
        let state = State {
            upload_script: vec![UploadStatus::Succeeded],
            run_script: vec![ExecutionStatus::Completed],
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub async fn add_project(&self, project: Project) {
        self.state.lock().await.projects.push(project);
    }

    pub async fn add_device(&self, device: Device) {
        self.state.lock().await.devices.push(device);
    }

    pub async fn add_pool(&self, pool: DevicePool) {
        self.state.lock().await.pools.push(pool);
    }

    pub async fn add_upload(&self, upload: Upload) {
        self.state.lock().await.uploads.push(upload);
    }

    pub async fn add_run(&self, run: Run) {
        self.state.lock().await.runs.push(run);
    }

    pub async fn add_job(&self, run_arn: &str, job: Job) {
        let mut state = self.state.lock().await;
        state.jobs.entry(run_arn.to_string()).or_default().push(job);
    }

    pub async fn add_suite(&self, job_arn: &str, suite: Suite) {
        let mut state = self.state.lock().await;
        state
            .suites
            .entry(job_arn.to_string())
            .or_default()
            .push(suite);
    }

    pub async fn add_test(&self, owner_arn: &str, test: RemoteTest) {
        let mut state = self.state.lock().await;
        state.tests.entry(owner_arn.to_string()).or_default().push(test);
    }

    pub async fn add_problem(&self, run_arn: &str, problem: UniqueProblem) {
        let mut state = self.state.lock().await;
        state
            .problems
            .entry(run_arn.to_string())
            .or_default()
            .push(problem);
    }

    /// Registers an artifact as listed under `owner_arn` for its category.
    pub async fn add_artifact(&self, owner_arn: &str, artifact: Artifact) {
        let mut state = self.state.lock().await;
        state
            .artifacts
            .entry((owner_arn.to_string(), artifact.category.clone()))
            .or_default()
            .push(artifact);
    }

    /// Statuses reported by successive `get_upload` calls for each new upload.
    pub async fn set_upload_script(&self, statuses: Vec<UploadStatus>) {
        self.state.lock().await.upload_script = statuses;
    }

    /// Statuses reported by successive `get_run` calls for each scheduled run.
    pub async fn set_run_script(&self, statuses: Vec<ExecutionStatus>) {
        self.state.lock().await.run_script = statuses;
    }

    /// ARN given to the next scheduled run, so jobs can be registered up front.
    pub async fn set_next_run_arn(&self, arn: &str) {
        self.state.lock().await.next_run_arn = Some(arn.to_string());
    }

    /// Makes every call of `operation` (e.g. `"ListJobs"`) fail.
    pub async fn fail_operation(&self, operation: &'static str) {
        self.state.lock().await.failing_operations.push(operation);
    }

    pub async fn created_uploads(&self) -> Vec<CreateUpload> {
        self.state.lock().await.created_uploads.clone()
    }

    pub async fn created_pools(&self) -> Vec<CreateDevicePool> {
        self.state.lock().await.created_pools.clone()
    }

    pub async fn scheduled_runs(&self) -> Vec<ScheduleRun> {
        self.state.lock().await.scheduled.clone()
    }

    /// Calls in the order they were made, as `"<Operation> <arn>"`.
    pub async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }

    /// Number of recorded calls of one operation.
    pub async fn call_count(&self, operation: &str) -> usize {
        let prefix = format!("{} ", operation);
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.as_str() == operation || c.starts_with(&prefix))
            .count()
    }
}

#[async_trait]
impl DeviceFarm for FakeDeviceFarm {
    async fn list_projects(&self) -> FarmResult<Vec<Project>> {
        let mut state = self.state.lock().await;
        state.record("ListProjects", "")?;
        Ok(state.projects.clone())
    }

    async fn list_devices(&self) -> FarmResult<Vec<Device>> {
        let mut state = self.state.lock().await;
        state.record("ListDevices", "")?;
        Ok(state.devices.clone())
    }

    async fn list_device_pools(&self, project_arn: &str) -> FarmResult<Vec<DevicePool>> {
        let mut state = self.state.lock().await;
        state.record("ListDevicePools", project_arn)?;
        Ok(state.pools.clone())
    }

    async fn create_device_pool(&self, input: &CreateDevicePool) -> FarmResult<DevicePool> {
        let mut state = self.state.lock().await;
        state.record("CreateDevicePool", &input.project_arn)?;
        let id = state.next_id();
        let pool = DevicePool {
            arn: format!("{}:devicepool:fake/{}", ACCOUNT_PREFIX, id),
            name: input.name.clone(),
            description: Some(input.description.clone()),
            pool_type: DevicePoolType::Private,
            rules: input.rules.clone(),
        };
        state.created_pools.push(input.clone());
        state.pools.push(pool.clone());
        Ok(pool)
    }

    async fn list_uploads(&self, project_arn: &str) -> FarmResult<Vec<Upload>> {
        let mut state = self.state.lock().await;
        state.record("ListUploads", project_arn)?;
        Ok(state.uploads.clone())
    }

    async fn create_upload(&self, input: &CreateUpload) -> FarmResult<Upload> {
        let mut state = self.state.lock().await;
        state.record("CreateUpload", &input.project_arn)?;
        let id = state.next_id();
        let upload = Upload {
            arn: format!("{}:upload:fake/{}", ACCOUNT_PREFIX, id),
            name: input.name.clone(),
            kind: input.kind.clone(),
            content_type: input.content_type.clone(),
            url: Some(format!(
                "https://uploads.example.test/fake/{}?X-Amz-Signature=a%2Fb%3D",
                id
            )),
            status: UploadStatus::Initializing,
            message: None,
        };
        let script = state.upload_script.iter().cloned().collect();
        state.upload_progress.insert(upload.arn.clone(), script);
        state.created_uploads.push(input.clone());
        state.uploads.push(upload.clone());
        Ok(upload)
    }

    async fn get_upload(&self, arn: &str) -> FarmResult<Upload> {
        let mut state = self.state.lock().await;
        state.record("GetUpload", arn)?;
        let next = state.upload_progress.get_mut(arn).and_then(|script| {
            if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            }
        });
        let upload = state
            .uploads
            .iter_mut()
            .find(|u| u.arn == arn)
            .ok_or_else(|| FarmError::NotFound {
                resource: "Upload",
                arn: arn.to_string(),
            })?;
        if let Some(status) = next {
            if status == UploadStatus::Failed {
                upload.message = Some("Invalid package".to_string());
            }
            upload.status = status;
        }
        Ok(upload.clone())
    }

    async fn list_runs(&self, project_arn: &str) -> FarmResult<Vec<Run>> {
        let mut state = self.state.lock().await;
        state.record("ListRuns", project_arn)?;
        Ok(state.runs.clone())
    }

    async fn schedule_run(&self, input: &ScheduleRun) -> FarmResult<Run> {
        let mut state = self.state.lock().await;
        state.record("ScheduleRun", &input.project_arn)?;
        let id = state.next_id();
        let arn = state
            .next_run_arn
            .take()
            .unwrap_or_else(|| format!("{}:run:fake/{}", ACCOUNT_PREFIX, id));
        let run = Run {
            arn: arn.clone(),
            name: input.name.clone(),
            platform: String::new(),
            test_type: input.test.test_type.to_string(),
            status: ExecutionStatus::Scheduling,
            result: ExecutionResult::Pending,
            created: None,
        };
        let script = state.run_script.iter().cloned().collect();
        state.run_progress.insert(arn, script);
        state.scheduled.push(input.clone());
        state.runs.push(run.clone());
        Ok(run)
    }

    async fn get_run(&self, arn: &str) -> FarmResult<Run> {
        let mut state = self.state.lock().await;
        state.record("GetRun", arn)?;
        let next = state.run_progress.get_mut(arn).and_then(|script| {
            if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            }
        });
        let run = state
            .runs
            .iter_mut()
            .find(|r| r.arn == arn)
            .ok_or_else(|| FarmError::NotFound {
                resource: "Run",
                arn: arn.to_string(),
            })?;
        if let Some(status) = next {
            if status == ExecutionStatus::Completed {
                run.result = ExecutionResult::Passed;
            }
            run.status = status;
        }
        Ok(run.clone())
    }

    async fn list_jobs(&self, run_arn: &str) -> FarmResult<Vec<Job>> {
        let mut state = self.state.lock().await;
        state.record("ListJobs", run_arn)?;
        Ok(state.jobs.get(run_arn).cloned().unwrap_or_default())
    }

    async fn get_job(&self, arn: &str) -> FarmResult<Job> {
        let mut state = self.state.lock().await;
        state.record("GetJob", arn)?;
        state
            .jobs
            .values()
            .flatten()
            .find(|j| j.arn == arn)
            .cloned()
            .ok_or_else(|| FarmError::NotFound {
                resource: "Job",
                arn: arn.to_string(),
            })
    }

    async fn list_suites(&self, owner_arn: &str) -> FarmResult<Vec<Suite>> {
        let mut state = self.state.lock().await;
        state.record("ListSuites", owner_arn)?;
        Ok(state.suites.get(owner_arn).cloned().unwrap_or_default())
    }

    async fn get_suite(&self, arn: &str) -> FarmResult<Suite> {
        let mut state = self.state.lock().await;
        state.record("GetSuite", arn)?;
        state
            .suites
            .values()
            .flatten()
            .find(|s| s.arn == arn)
            .cloned()
            .ok_or_else(|| FarmError::NotFound {
                resource: "Suite",
                arn: arn.to_string(),
            })
    }

    async fn list_tests(&self, owner_arn: &str) -> FarmResult<Vec<RemoteTest>> {
        let mut state = self.state.lock().await;
        state.record("ListTests", owner_arn)?;
        Ok(state.tests.get(owner_arn).cloned().unwrap_or_default())
    }

    async fn list_unique_problems(&self, run_arn: &str) -> FarmResult<Vec<UniqueProblem>> {
        let mut state = self.state.lock().await;
        state.record("ListUniqueProblems", run_arn)?;
        Ok(state.problems.get(run_arn).cloned().unwrap_or_default())
    }

    async fn list_artifacts(
        &self,
        owner_arn: &str,
        category: &ArtifactCategory,
    ) -> FarmResult<Vec<Artifact>> {
        let mut state = self.state.lock().await;
        state.record("ListArtifacts", owner_arn)?;
        Ok(state
            .artifacts
            .get(&(owner_arn.to_string(), category.clone()))
            .cloned()
            .unwrap_or_default())
    }
}
