//! Artifact reconciliation and report trees.
//!
//! The farm lists a run's artifacts per category only, with no link to the
//! job or suite that produced them. The link is recovered from the ARNs: an
//! artifact produced under a suite carries the suite's ARN with `:suite:`
//! replaced by `:artifact:` as a prefix.
//!
//! # Layout
//!
//! ```text
//! report/
//! ├── Pixel 5 - Pixel 5 - 11/          <job> - <device model> - <device os>
//! │   ├── Setup Suite/
//! │   │   └── 0_Logcat.logcat
//! │   └── Tests Suite/
//! │       ├── 0_Logcat.logcat          LOG artifacts first,
//! │       ├── 1_Screenshot.png         then SCREENSHOT,
//! │       └── 2_Customer Artifacts.zip then FILE
//! └── Galaxy S21 - Galaxy S21 - 12/
//!     └── ...
//! ```
//!
//! The index is per suite directory and runs across all categories, so file
//! names never collide. Planning ([`plan_report`]) is pure; only
//! [`ReportBuilder`] talks to the farm and writes files.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::farm::{Artifact, ArtifactCategory, DeviceFarm, FarmError, Job, Suite};
use crate::progress::{NullReporter, Reporter};
use crate::transfer::{Transfer, TransferError};

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error(transparent)]
    Farm(#[from] FarmError),

    #[error("Failed to download {path}: {source}")]
    Download {
        path: String,
        #[source]
        source: TransferError,
    },
}

/// What to do when one artifact fails to download.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DownloadPolicy {
    /// Abort the report on the first failure.
    #[default]
    FailFast,
    /// Keep going and list failures in the summary.
    Continue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportOptions {
    pub root: PathBuf,
    /// Maximum downloads in flight.
    pub concurrency: usize,
    pub policy: DownloadPolicy,
}

impl ReportOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            concurrency: 4,
            policy: DownloadPolicy::FailFast,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_policy(mut self, policy: DownloadPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Result of building a report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportSummary {
    pub root: PathBuf,
    pub run_name: String,
    pub jobs: usize,
    pub suites: usize,
    pub downloaded: usize,
    pub bytes: u64,
    /// Artifacts listed without a download URL.
    pub skipped: usize,
    pub failures: Vec<DownloadFailure>,
}

/// The ARN prefix shared by every artifact produced under `suite_arn`.
pub fn suite_artifact_prefix(suite_arn: &str) -> String {
    suite_arn.replacen(":suite:", ":artifact:", 1)
}

/// Whether `artifact_arn` lies under `prefix`, stopping at a path boundary.
///
/// `…:artifact:P/R/J/1/x` belongs to `…:artifact:P/R/J/1` but not to
/// `…:artifact:P/R/J/10`.
pub fn artifact_belongs_to(artifact_arn: &str, prefix: &str) -> bool {
    match artifact_arn.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// A run's artifacts, grouped by category in listing order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtifactIndex {
    categories: Vec<(ArtifactCategory, Vec<Artifact>)>,
}

impl ArtifactIndex {
    /// Builds an index; categories are kept in [`ArtifactCategory::ALL`] order.
    pub fn new(listings: Vec<(ArtifactCategory, Vec<Artifact>)>) -> Self {
        let mut by_category: HashMap<ArtifactCategory, Vec<Artifact>> = HashMap::new();
        for (category, artifacts) in listings {
            by_category.entry(category).or_default().extend(artifacts);
        }

        let mut categories = Vec::new();
        for category in ArtifactCategory::ALL {
            if let Some(artifacts) = by_category.remove(&category) {
                categories.push((category, artifacts));
            }
        }
        let mut rest: Vec<_> = by_category.into_iter().collect();
        rest.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
        categories.extend(rest);

        Self { categories }
    }

    pub fn len(&self) -> usize {
        self.categories.iter().map(|(_, a)| a.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every artifact, category by category.
    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.categories.iter().flat_map(|(_, a)| a.iter())
    }

    /// Artifacts of one suite, category by category.
    pub fn for_suite(&self, suite_arn: &str) -> Vec<&Artifact> {
        let prefix = suite_artifact_prefix(suite_arn);
        self.iter()
            .filter(|a| artifact_belongs_to(&a.arn, &prefix))
            .collect()
    }
}

/// A job together with its suites.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSuites {
    pub job: Job,
    pub suites: Vec<Suite>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedDownload {
    pub artifact_arn: String,
    pub url: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportPlan {
    pub jobs: usize,
    pub suites: usize,
    pub downloads: Vec<PlannedDownload>,
    /// Matched artifacts that had no download URL.
    pub skipped: usize,
}

/// Makes a name safe to use as one path component.
fn path_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' || c == '\0' { '_' } else { c })
        .collect();
    match cleaned.trim() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

/// Returns `name`, or `name (2)`, `name (3)`... if already taken.
fn unique_name(taken: &mut HashSet<String>, name: String) -> String {
    let mut candidate = name.clone();
    let mut n = 1;
    while !taken.insert(candidate.clone()) {
        n += 1;
        candidate = format!("{} ({})", name, n);
    }
    candidate
}

/// Plans the per-suite report tree under `root`.
///
/// Jobs are ordered by display name and suites by name (ties broken by ARN),
/// so the same input always yields the same paths, whatever the listing
/// order.
pub fn plan_report(root: &Path, jobs: &[JobSuites], index: &ArtifactIndex) -> ReportPlan {
    let mut ordered: Vec<&JobSuites> = jobs.iter().collect();
    ordered.sort_by(|a, b| {
        (a.job.display_name(), &a.job.arn).cmp(&(b.job.display_name(), &b.job.arn))
    });

    let mut plan = ReportPlan {
        jobs: ordered.len(),
        ..Default::default()
    };
    let mut job_dirs = HashSet::new();

    for entry in ordered {
        let job_dir = root.join(unique_name(
            &mut job_dirs,
            path_component(&entry.job.display_name()),
        ));

        let mut suites: Vec<&Suite> = entry.suites.iter().collect();
        suites.sort_by(|a, b| (&a.name, &a.arn).cmp(&(&b.name, &b.arn)));
        let mut suite_dirs = HashSet::new();

        for suite in suites {
            plan.suites += 1;
            let suite_dir =
                job_dir.join(unique_name(&mut suite_dirs, path_component(&suite.name)));

            // Numbering counts planned files only, so skipped artifacts leave no gaps.
            let mut position = 0usize;
            for artifact in index.for_suite(&suite.arn) {
                let Some(url) = &artifact.url else {
                    plan.skipped += 1;
                    continue;
                };
                let file = path_component(&format!("{}_{}", position, artifact.file_name()));
                position += 1;
                plan.downloads.push(PlannedDownload {
                    artifact_arn: artifact.arn.clone(),
                    url: url.clone(),
                    path: suite_dir.join(file),
                });
            }
        }
    }

    plan
}

/// Plans a flat download: `<root>/<index>-<name>.<ext>` for every artifact.
pub fn plan_flat(root: &Path, index: &ArtifactIndex) -> ReportPlan {
    let mut plan = ReportPlan::default();
    for artifact in index.iter() {
        let Some(url) = &artifact.url else {
            plan.skipped += 1;
            continue;
        };
        let position = plan.downloads.len();
        plan.downloads.push(PlannedDownload {
            artifact_arn: artifact.arn.clone(),
            url: url.clone(),
            path: root.join(path_component(&format!(
                "{}-{}",
                position,
                artifact.file_name()
            ))),
        });
    }
    plan
}

/// Fetches a run's artifacts and writes them to disk.
#[derive(Clone)]
pub struct ReportBuilder {
    farm: Arc<dyn DeviceFarm>,
    transfer: Arc<dyn Transfer>,
    options: ReportOptions,
    reporter: Arc<dyn Reporter>,
}

impl ReportBuilder {
    pub fn new(
        farm: Arc<dyn DeviceFarm>,
        transfer: Arc<dyn Transfer>,
        options: ReportOptions,
    ) -> Self {
        Self {
            farm,
            transfer,
            options,
            reporter: Arc::new(NullReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Lists the artifacts of `owner_arn` in every category, concurrently.
    pub async fn fetch_index(&self, owner_arn: &str) -> Result<ArtifactIndex, FarmError> {
        let listings = try_join_all(ArtifactCategory::ALL.into_iter().map(|category| async move {
            let artifacts = self.farm.list_artifacts(owner_arn, &category).await?;
            Ok::<_, FarmError>((category, artifacts))
        }))
        .await?;
        Ok(ArtifactIndex::new(listings))
    }

    /// Lists the jobs of a run and the suites of each job.
    pub async fn fetch_jobs(&self, run_arn: &str) -> Result<Vec<JobSuites>, FarmError> {
        let jobs = self.farm.list_jobs(run_arn).await?;
        try_join_all(jobs.into_iter().map(|job| async move {
            let suites = self.farm.list_suites(&job.arn).await?;
            Ok::<_, FarmError>(JobSuites { job, suites })
        }))
        .await
    }

    /// Writes the per-suite report tree of a run.
    pub async fn build(&self, run_arn: &str) -> Result<ReportSummary, ReportError> {
        let run = self.farm.get_run(run_arn).await?;
        info!("Reporting on run {}", run.name);
        self.reporter
            .on_step(&format!("Collecting artifacts of run {}", run.name))
            .await;

        let (index, jobs) =
            futures::try_join!(self.fetch_index(run_arn), self.fetch_jobs(run_arn))?;
        let plan = plan_report(&self.options.root, &jobs, &index);
        info!(
            "{} artifacts across {} jobs and {} suites",
            plan.downloads.len(),
            plan.jobs,
            plan.suites
        );

        let mut summary = self.execute(&plan).await?;
        summary.run_name = run.name;
        self.reporter.on_report_complete(&summary).await;
        Ok(summary)
    }

    /// Downloads every artifact of a run or job into one directory.
    ///
    /// `category` restricts the download to one category.
    pub async fn download_flat(
        &self,
        owner_arn: &str,
        category: Option<&ArtifactCategory>,
    ) -> Result<ReportSummary, ReportError> {
        let index = match category {
            Some(category) => {
                let artifacts = self.farm.list_artifacts(owner_arn, category).await?;
                ArtifactIndex::new(vec![(category.clone(), artifacts)])
            }
            None => self.fetch_index(owner_arn).await?,
        };
        let plan = plan_flat(&self.options.root, &index);
        let summary = self.execute(&plan).await?;
        self.reporter.on_report_complete(&summary).await;
        Ok(summary)
    }

    async fn execute(&self, plan: &ReportPlan) -> Result<ReportSummary, ReportError> {
        let mut summary = ReportSummary {
            root: self.options.root.clone(),
            jobs: plan.jobs,
            suites: plan.suites,
            skipped: plan.skipped,
            ..Default::default()
        };
        if plan.skipped > 0 {
            warn!("{} artifacts have no download URL and were skipped", plan.skipped);
        }

        self.reporter.on_downloads_planned(plan.downloads.len()).await;
        let transfer = &self.transfer;
        let mut downloads = futures::stream::iter(plan.downloads.iter().map(
            |download| async move {
                let result = transfer.download(&download.url, &download.path).await;
                (download, result)
            },
        ))
        .buffer_unordered(self.options.concurrency.max(1));

        while let Some((download, result)) = downloads.next().await {
            match result {
                Ok(bytes) => {
                    summary.downloaded += 1;
                    summary.bytes += bytes;
                    self.reporter
                        .on_download_complete(&download.path, None)
                        .await;
                }
                Err(err) => {
                    let message = err.to_string();
                    self.reporter
                        .on_download_complete(&download.path, Some(&message))
                        .await;
                    match self.options.policy {
                        DownloadPolicy::FailFast => {
                            return Err(ReportError::Download {
                                path: download.path.display().to_string(),
                                source: err,
                            });
                        }
                        DownloadPolicy::Continue => {
                            warn!("Skipping {}: {}", download.path.display(), message);
                            summary.failures.push(DownloadFailure {
                                path: download.path.clone(),
                                error: message,
                            });
                        }
                    }
                }
            }
        }

        summary.failures.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(summary)
    }
}
