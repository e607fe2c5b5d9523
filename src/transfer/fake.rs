use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Transfer, TransferError};

#[derive(Default)]
struct State {
    contents: HashMap<String, Vec<u8>>,
    failing: HashSet<String>,
    puts: Vec<(String, Vec<u8>)>,
    downloads: Vec<(String, PathBuf)>,
}

/// In-memory [`Transfer`] for tests.
///
/// Downloads write the registered content for a URL, or the URL itself when
/// nothing was registered. URLs marked with [`FakeTransfer::fail_on`] answer 500.
#[derive(Clone, Default)]
pub struct FakeTransfer {
    state: Arc<Mutex<State>>,
}

impl FakeTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_content(&self, url: &str, content: &[u8]) {
        self.state
            .lock()
            .await
            .contents
            .insert(url.to_string(), content.to_vec());
    }

    pub async fn fail_on(&self, url: &str) {
        self.state.lock().await.failing.insert(url.to_string());
    }

    /// Bodies PUT so far, keyed by the exact URL used.
    pub async fn puts(&self) -> Vec<(String, Vec<u8>)> {
        self.state.lock().await.puts.clone()
    }

    pub async fn downloads(&self) -> Vec<(String, PathBuf)> {
        self.state.lock().await.downloads.clone()
    }
}

#[async_trait]
impl Transfer for FakeTransfer {
    async fn put_presigned(&self, url: &str, body: Vec<u8>) -> Result<(), TransferError> {
        let mut state = self.state.lock().await;
        if state.failing.contains(url) {
            return Err(TransferError::Status {
                url: super::redact(url),
                status: 500,
            });
        }
        state.puts.push((url.to_string(), body));
        Ok(())
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64, TransferError> {
        let content = {
            let mut state = self.state.lock().await;
            state.downloads.push((url.to_string(), dest.to_path_buf()));
            if state.failing.contains(url) {
                return Err(TransferError::Status {
                    url: super::redact(url),
                    status: 500,
                });
            }
            state
                .contents
                .get(url)
                .cloned()
                .unwrap_or_else(|| url.as_bytes().to_vec())
        };

        let io_error = |source| TransferError::Io {
            path: dest.display().to_string(),
            source,
        };
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        tokio::fs::write(dest, &content).await.map_err(io_error)?;
        Ok(content.len() as u64)
    }
}
