//! Sending local files into the device farm.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::farm::{CreateUpload, DeviceFarm, FarmError, Upload, UploadKind, UploadStatus};
use crate::progress::{NullReporter, Reporter};
use crate::transfer::{Transfer, TransferError};
use crate::wait::{PollPolicy, PollStatus, WaitError, poll_until};

pub const CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Upload {arn} has no presigned URL")]
    MissingUrl { arn: String },

    #[error("Upload {name} failed: {message}")]
    UploadFailed { name: String, message: String },

    #[error(transparent)]
    Farm(#[from] FarmError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Wait(WaitError),
}

impl From<WaitError> for UploadError {
    fn from(err: WaitError) -> Self {
        match err {
            WaitError::Farm(err) => UploadError::Farm(err),
            other => UploadError::Wait(other),
        }
    }
}

/// Uploads files and waits for the farm to finish processing them.
#[derive(Clone)]
pub struct Uploader {
    farm: Arc<dyn DeviceFarm>,
    transfer: Arc<dyn Transfer>,
    policy: PollPolicy,
    cancel: CancellationToken,
    reporter: Arc<dyn Reporter>,
}

impl Uploader {
    pub fn new(farm: Arc<dyn DeviceFarm>, transfer: Arc<dyn Transfer>, policy: PollPolicy) -> Self {
        Self {
            farm,
            transfer,
            policy,
            cancel: CancellationToken::new(),
            reporter: Arc::new(NullReporter),
        }
    }

    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Creates an upload resource without sending any bytes.
    pub async fn create(
        &self,
        project_arn: &str,
        name: &str,
        kind: UploadKind,
    ) -> Result<Upload, UploadError> {
        let request = CreateUpload {
            project_arn: project_arn.to_string(),
            name: name.to_string(),
            kind,
            content_type: Some(CONTENT_TYPE.to_string()),
        };
        Ok(self.farm.create_upload(&request).await?)
    }

    /// Uploads `path` as `kind` and waits until it is processed.
    ///
    /// `name` defaults to the file's base name. A failed upload is left in the
    /// project; nothing is deleted on error.
    pub async fn upload(
        &self,
        path: &Path,
        kind: UploadKind,
        project_arn: &str,
        name: Option<&str>,
    ) -> Result<Upload, UploadError> {
        let body = tokio::fs::read(path).await.map_err(|source| UploadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let name = match name {
            Some(name) => name.to_string(),
            None => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        };

        self.reporter
            .on_step(&format!("Uploading {} as {}", name, kind))
            .await;
        let created = self.create(project_arn, &name, kind).await?;
        let url = created.url.as_deref().ok_or_else(|| UploadError::MissingUrl {
            arn: created.arn.clone(),
        })?;
        info!("Uploading {} ({} bytes) to {}", name, body.len(), created.arn);
        self.transfer.put_presigned(url, body).await?;

        let what = format!("upload {}", name);
        let upload = poll_until(&what, &self.policy, &self.cancel, || async {
            let upload = self.farm.get_upload(&created.arn).await?;
            Ok::<_, FarmError>(match upload.status {
                UploadStatus::Succeeded => PollStatus::Ready(upload),
                UploadStatus::Failed => PollStatus::Failed(
                    upload
                        .message
                        .unwrap_or_else(|| "no message from server".to_string()),
                ),
                status => {
                    self.reporter.on_status(&what, status.as_str()).await;
                    PollStatus::Pending(status.to_string())
                }
            })
        })
        .await
        .map_err(|err| match err {
            WaitError::Failed { reason, .. } => UploadError::UploadFailed {
                name: name.clone(),
                message: reason,
            },
            other => other.into(),
        })?;

        self.reporter
            .on_step_done(&format!("Uploaded {} ({})", name, upload.arn))
            .await;
        Ok(upload)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::farm::fake::FakeDeviceFarm;
    use crate::transfer::fake::FakeTransfer;

    fn uploader(farm: &FakeDeviceFarm, transfer: &FakeTransfer) -> Uploader {
        Uploader::new(
            Arc::new(farm.clone()),
            Arc::new(transfer.clone()),
            PollPolicy::fixed(Duration::from_secs(1)).with_max_attempts(10),
        )
    }

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_puts_bytes_and_polls_until_succeeded() {
        let farm = FakeDeviceFarm::new();
        farm.set_upload_script(vec![
            UploadStatus::Processing,
            UploadStatus::Processing,
            UploadStatus::Succeeded,
        ])
        .await;
        let transfer = FakeTransfer::new();
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "app.apk", b"apk-bytes");

        let upload = uploader(&farm, &transfer)
            .upload(&path, UploadKind::AndroidApp, "arn:project", None)
            .await
            .unwrap();

        assert_eq!(upload.status, UploadStatus::Succeeded);
        assert_eq!(farm.call_count("GetUpload").await, 3);

        let created = farm.created_uploads().await;
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].name, "app.apk");
        assert_eq!(created[0].kind, UploadKind::AndroidApp);
        assert_eq!(created[0].content_type.as_deref(), Some(CONTENT_TYPE));

        let puts = transfer.puts().await;
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].1, b"apk-bytes");
        assert!(puts[0].0.ends_with("X-Amz-Signature=a%2Fb%3D"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_uses_given_name() {
        let farm = FakeDeviceFarm::new();
        let transfer = FakeTransfer::new();
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "build-1234.apk", b"x");

        uploader(&farm, &transfer)
            .upload(&path, UploadKind::AndroidApp, "arn:project", Some("app.apk"))
            .await
            .unwrap();

        assert_eq!(farm.created_uploads().await[0].name, "app.apk");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_status_carries_server_message() {
        let farm = FakeDeviceFarm::new();
        farm.set_upload_script(vec![UploadStatus::Processing, UploadStatus::Failed])
            .await;
        let transfer = FakeTransfer::new();
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "tests.zip", b"x");

        let err = uploader(&farm, &transfer)
            .upload(&path, UploadKind::AppiumPythonTestPackage, "arn:project", None)
            .await
            .unwrap_err();

        match err {
            UploadError::UploadFailed { name, message } => {
                assert_eq!(name, "tests.zip");
                assert_eq!(message, "Invalid package");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(farm.call_count("GetUpload").await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_file_creates_nothing() {
        let farm = FakeDeviceFarm::new();
        let transfer = FakeTransfer::new();

        let err = uploader(&farm, &transfer)
            .upload(
                Path::new("/nonexistent/app.apk"),
                UploadKind::AndroidApp,
                "arn:project",
                None,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Io { .. }));
        assert!(farm.created_uploads().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_failure_stops_before_polling() {
        let farm = FakeDeviceFarm::new();
        let transfer = FakeTransfer::new();
        transfer
            .fail_on("https://uploads.example.test/fake/1?X-Amz-Signature=a%2Fb%3D")
            .await;
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "app.apk", b"x");

        let err = uploader(&farm, &transfer)
            .upload(&path, UploadKind::AndroidApp, "arn:project", None)
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Transfer(TransferError::Status { status: 500, .. })));
        assert_eq!(farm.call_count("GetUpload").await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_processing_forever_times_out() {
        let farm = FakeDeviceFarm::new();
        farm.set_upload_script(vec![UploadStatus::Processing]).await;
        let transfer = FakeTransfer::new();
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "app.apk", b"x");

        let err = uploader(&farm, &transfer)
            .upload(&path, UploadKind::AndroidApp, "arn:project", None)
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Wait(WaitError::TimedOut { .. })));
        assert_eq!(farm.call_count("GetUpload").await, 10);
    }

    #[tokio::test]
    async fn test_create_only() {
        let farm = FakeDeviceFarm::new();
        let transfer = FakeTransfer::new();

        let upload = uploader(&farm, &transfer)
            .create("arn:project", "data.zip", UploadKind::ExternalData)
            .await
            .unwrap();

        assert!(upload.url.is_some());
        assert!(transfer.puts().await.is_empty());
    }
}
