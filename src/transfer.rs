//! Byte transfers to and from presigned URLs.
//!
//! The device farm hands out presigned URLs for both directions. Those URLs
//! carry their own credentials in the query string, so requests go out with no
//! extra authentication and the URL must be used exactly as received.

pub mod fake;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Errors from a transfer.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("Request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Moves bytes over presigned URLs.
#[async_trait]
pub trait Transfer: Send + Sync {
    /// PUTs `body` to a presigned upload URL.
    async fn put_presigned(&self, url: &str, body: Vec<u8>) -> Result<(), TransferError>;

    /// Streams `url` into `dest`, creating parent directories. Returns the byte count.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, TransferError>;
}

/// Strips the query string so signatures never reach logs or error messages.
pub fn redact(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{}?...", base),
        None => url.to_string(),
    }
}

/// [`Transfer`] over HTTPS.
#[derive(Clone)]
pub struct HttpTransfer {
    client: reqwest::Client,
}

fn client_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .redirect(reqwest::redirect::Policy::limited(5))
}

impl HttpTransfer {
    pub fn new() -> Result<Self, TransferError> {
        let client = client_builder()
            .build()
            .map_err(|source| TransferError::Http {
                url: String::new(),
                source,
            })?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transfer for HttpTransfer {
    async fn put_presigned(&self, url: &str, body: Vec<u8>) -> Result<(), TransferError> {
        let shown = redact(url);
        debug!("PUT {} ({} bytes)", shown, body.len());

        let response = self
            .client
            .put(url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, body.len())
            .body(body)
            .send()
            .await
            .map_err(|source| TransferError::Http {
                url: shown.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::Status {
                url: shown,
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64, TransferError> {
        let shown = redact(url);
        let io_error = |source| TransferError::Io {
            path: dest.display().to_string(),
            source,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| TransferError::Http {
                url: shown.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::Status {
                url: shown,
                status: status.as_u16(),
            });
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        let mut file = tokio::fs::File::create(dest).await.map_err(io_error)?;

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(source) => {
                    drop(file);
                    let _ = tokio::fs::remove_file(dest).await;
                    return Err(TransferError::Http { url: shown, source });
                }
            };
            file.write_all(&chunk).await.map_err(io_error)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io_error)?;

        debug!("Downloaded {} bytes to {}", written, dest.display());
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    use super::*;

    /// A request as received: the head (request line and headers) and the body.
    type Received = (String, Vec<u8>);

    fn transfer() -> HttpTransfer {
        HttpTransfer::with_client(client_builder().no_proxy().build().unwrap())
    }

    fn response(status: &str, headers: &[(&str, &str)], body: &str) -> String {
        let mut out = format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n",
            status,
            body.len()
        );
        for (name, value) in headers {
            out.push_str(&format!("{}: {}\r\n", name, value));
        }
        out.push_str("\r\n");
        out.push_str(body);
        out
    }

    async fn read_request(stream: &mut TcpStream) -> Received {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        let head_end = loop {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before the request head ended");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
        let length = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while buf.len() < head_end + length {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before the body ended");
            buf.extend_from_slice(&chunk[..n]);
        }
        (head, buf[head_end..head_end + length].to_vec())
    }

    /// Serves one connection per canned response, in order.
    async fn serve(responses: Vec<String>) -> (String, JoinHandle<Vec<Received>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let mut received = Vec::new();
            for response in responses {
                let (mut stream, _) = listener.accept().await.unwrap();
                received.push(read_request(&mut stream).await);
                stream.write_all(response.as_bytes()).await.unwrap();
                stream.shutdown().await.unwrap();
            }
            received
        });
        (base, handle)
    }

    #[tokio::test]
    async fn test_put_sends_octet_stream_to_url_as_given() {
        let (base, server) = serve(vec![response("200 OK", &[], "")]).await;
        let url = format!("{}/key%20x/a?X-Amz-Signature=a%2Fb%3D&x=1", base);

        transfer().put_presigned(&url, b"abc".to_vec()).await.unwrap();

        let received = server.await.unwrap();
        let (head, body) = &received[0];
        assert!(
            head.starts_with("PUT /key%20x/a?X-Amz-Signature=a%2Fb%3D&x=1 HTTP/1.1\r\n"),
            "unexpected request head:\n{}",
            head
        );
        let head = head.to_ascii_lowercase();
        assert!(head.contains("content-type: application/octet-stream\r\n"));
        assert!(head.contains("content-length: 3\r\n"));
        assert_eq!(body, b"abc");
    }

    #[tokio::test]
    async fn test_put_rejected_is_a_status_error() {
        let (base, server) = serve(vec![response("403 Forbidden", &[], "denied")]).await;
        let url = format!("{}/key?X-Amz-Signature=secret", base);

        let err = transfer().put_presigned(&url, b"abc".to_vec()).await.unwrap_err();
        server.await.unwrap();

        match err {
            TransferError::Status { url, status } => {
                assert_eq!(status, 403);
                assert!(!url.contains("secret"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_download_truncates_existing_file() {
        let (base, server) = serve(vec![response("200 OK", &[], "hello")]).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("job/suite/0_Logcat.logcat");
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::fs::write(&dest, "an older and much longer file").unwrap();

        let bytes = transfer()
            .download(&format!("{}/artifact?sig=1", base), &dest)
            .await
            .unwrap();
        server.await.unwrap();

        assert_eq!(bytes, 5);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_download_into_new_nested_path() {
        let (base, server) = serve(vec![response("200 OK", &[], "png-bytes")]).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a/b/c/1_Screenshot.png");

        transfer()
            .download(&format!("{}/shot", base), &dest)
            .await
            .unwrap();
        let received = server.await.unwrap();

        assert!(received[0].0.starts_with("GET /shot HTTP/1.1\r\n"));
        assert_eq!(std::fs::read(&dest).unwrap(), b"png-bytes");
    }

    #[tokio::test]
    async fn test_download_forbidden_writes_nothing() {
        let (base, server) = serve(vec![response("403 Forbidden", &[], "expired")]).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out/file.log");

        let err = transfer()
            .download(&format!("{}/expired?X-Amz-Signature=abc", base), &dest)
            .await
            .unwrap_err();
        server.await.unwrap();

        assert!(matches!(err, TransferError::Status { status: 403, .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_download_follows_redirect() {
        let (base, server) = serve(vec![
            response("302 Found", &[("Location", "/final?X-Amz-Signature=a%2Fb")], ""),
            response("200 OK", &[], "moved"),
        ])
        .await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("file.zip");

        transfer()
            .download(&format!("{}/start", base), &dest)
            .await
            .unwrap();
        let received = server.await.unwrap();

        assert!(received[1].0.starts_with("GET /final?X-Amz-Signature=a%2Fb HTTP/1.1\r\n"));
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "moved");
    }

    #[tokio::test]
    async fn test_truncated_body_removes_partial_file() {
        // Announces more bytes than it sends, then closes.
        let short = "HTTP/1.1 200 OK\r\nContent-Length: 100\r\nConnection: close\r\n\r\nhello"
            .to_string();
        let (base, server) = serve(vec![short]).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("partial.bin");

        let err = transfer()
            .download(&format!("{}/partial", base), &dest)
            .await
            .unwrap_err();
        server.await.unwrap();

        assert!(matches!(err, TransferError::Http { .. }));
        assert!(!dest.exists());
    }

    #[test]
    fn test_redact_hides_signature() {
        assert_eq!(
            redact("https://bucket.example/key?X-Amz-Signature=abc%2F"),
            "https://bucket.example/key?..."
        );
        assert_eq!(redact("https://bucket.example/key"), "https://bucket.example/key");
    }

    #[test]
    fn test_status_error_names_redacted_url() {
        let err = TransferError::Status {
            url: redact("https://bucket.example/key?sig=1"),
            status: 403,
        };
        assert_eq!(
            err.to_string(),
            "Request to https://bucket.example/key?... returned HTTP 403"
        );
    }
}
