use imgprep_core::{ArtifactNaming, FetchConfig, ImageLink, Record};
use imgprep_storage::StorageError;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::placeholder::placeholder_jpeg;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("Failed to store download: {0}")]
    Write(#[from] StorageError),
    #[error("Failed to encode placeholder: {0}")]
    Placeholder(#[from] image::ImageError),
    #[error("Retries set to zero, nothing attempted")]
    NoAttempts,
}

/// What happened to one record. Download failures never escape as errors;
/// they end up as `Placeholder` (or `Failed` when even that could not be
/// written).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Link is not a fetchable URL; nothing written.
    InvalidLink,
    /// Artifact was already on disk; no request made.
    AlreadyPresent,
    Downloaded { bytes: usize },
    /// All attempts failed; a placeholder image was written instead.
    Placeholder { attempts: u32 },
    /// All attempts failed and the placeholder could not be written.
    Failed { reason: String },
}

impl FetchOutcome {
    /// Whether an artifact exists after this outcome.
    pub fn has_artifact(&self) -> bool {
        matches!(
            self,
            FetchOutcome::AlreadyPresent
                | FetchOutcome::Downloaded { .. }
                | FetchOutcome::Placeholder { .. }
        )
    }
}

/// HTTP image fetcher with fixed-delay retries and a placeholder fallback.
pub struct Fetcher {
    client: reqwest::Client,
    retries: u32,
    delay: Duration,
    placeholder_size: u32,
}

impl Fetcher {
    pub fn new(cfg: &FetchConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(cfg.timeout())
            .user_agent(cfg.user_agent.as_str())
            .build()?;
        Ok(Self {
            client,
            retries: cfg.retries,
            delay: cfg.delay(),
            placeholder_size: cfg.placeholder_size,
        })
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// One GET. Non-2xx responses are errors.
    pub async fn download(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.bytes().await?;
        Ok(body.to_vec())
    }

    /// [`Fetcher::download`] with up to `retries` attempts. Returns the last
    /// error when every attempt fails.
    pub async fn download_with_retries(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        self.retry(url, move || self.download(url)).await
    }

    /// Fetch the artifact for `record` into `dir` as `{index}_{entity_name}.jpg`.
    pub async fn fetch_record(&self, record: &Record, dir: &Path) -> FetchOutcome {
        let dest = dir.join(ArtifactNaming::IndexEntity.file_name(record));
        self.fetch_to(&record.image_link, &dest).await
    }

    /// Ensure `dest` exists: skip if present, otherwise download (retrying)
    /// and fall back to a placeholder.
    pub async fn fetch_to(&self, link: &ImageLink, dest: &Path) -> FetchOutcome {
        let Some(url) = link.url() else {
            tracing::debug!("Skipping invalid image link {link} for {}", dest.display());
            return FetchOutcome::InvalidLink;
        };

        if imgprep_storage::artifact_exists(dest).await {
            tracing::info!("Image already exists, skipping: {}", dest.display());
            return FetchOutcome::AlreadyPresent;
        }

        let attempt = move || async move {
            let bytes = self.download(url).await?;
            imgprep_storage::write_atomic(dest, &bytes).await?;
            Ok::<_, FetchError>(bytes.len())
        };

        match self.retry(url, attempt).await {
            Ok(bytes) => {
                tracing::info!("Downloaded image: {}", dest.display());
                FetchOutcome::Downloaded { bytes }
            }
            Err(_) => match self.write_placeholder(dest).await {
                Ok(()) => {
                    tracing::info!("Created placeholder image: {}", dest.display());
                    FetchOutcome::Placeholder { attempts: self.retries }
                }
                Err(e) => {
                    tracing::error!("Failed to create placeholder image {}: {e}", dest.display());
                    FetchOutcome::Failed { reason: e.to_string() }
                }
            },
        }
    }

    pub fn placeholder_bytes(&self) -> Result<Vec<u8>, FetchError> {
        Ok(placeholder_jpeg(self.placeholder_size)?)
    }

    pub async fn write_placeholder(&self, dest: &Path) -> Result<(), FetchError> {
        let bytes = self.placeholder_bytes()?;
        imgprep_storage::write_atomic(dest, &bytes).await?;
        Ok(())
    }

    /// Run `op` up to `retries` times, sleeping `delay` between failed attempts.
    async fn retry<T, F, Fut>(&self, url: &Url, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut last_err = FetchError::NoAttempts;
        for attempt in 1..=self.retries {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    tracing::warn!(attempt, retries = self.retries, "Error downloading {url}: {e}");
                    last_err = e;
                    if attempt < self.retries && !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                }
            }
        }
        Err(last_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const IMAGE: &[u8] = b"\xFF\xD8\xFFfake-jpeg-body";

    /// Minimal HTTP/1.1 responder: fixed routes, everything else 404.
    async fn spawn_server(routes: HashMap<&'static str, (u16, Vec<u8>)>) -> (SocketAddr, Arc<AtomicUsize>) {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let routes = Arc::new(routes);
        let counter = hits.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut sock, _)) = listener.accept().await else { break };
                let routes = routes.clone();
                let counter = counter.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8192];
                    let mut n = 0;
                    loop {
                        let Ok(read) = sock.read(&mut buf[n..]).await else { return };
                        if read == 0 {
                            return;
                        }
                        n += read;
                        if buf[..n].windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }
                    counter.fetch_add(1, Ordering::SeqCst);
                    let req = String::from_utf8_lossy(&buf[..n]);
                    let path = req.split_whitespace().nth(1).unwrap_or("/").to_string();
                    let (status, body) = routes.get(path.as_str()).cloned().unwrap_or((404, Vec::new()));
                    let head = format!(
                        "HTTP/1.1 {status} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    );
                    let _ = sock.write_all(head.as_bytes()).await;
                    let _ = sock.write_all(&body).await;
                    let _ = sock.shutdown().await;
                });
            }
        });
        (addr, hits)
    }

    fn fetcher(retries: u32) -> Fetcher {
        Fetcher::new(&FetchConfig {
            retries,
            delay_secs: 0.0,
            timeout_secs: 5,
            ..FetchConfig::default()
        })
        .unwrap()
    }

    fn link(addr: SocketAddr, path: &str) -> ImageLink {
        ImageLink::parse(&format!("http://{addr}{path}"))
    }

    #[tokio::test]
    async fn downloads_to_destination() {
        let (addr, hits) = spawn_server(HashMap::from([("/a.jpg", (200, IMAGE.to_vec()))])).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("0_x.jpg");

        let outcome = fetcher(3).fetch_to(&link(addr, "/a.jpg"), &dest).await;
        assert_eq!(outcome, FetchOutcome::Downloaded { bytes: IMAGE.len() });
        assert_eq!(std::fs::read(&dest).unwrap(), IMAGE);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn second_fetch_makes_no_request() {
        let (addr, hits) = spawn_server(HashMap::from([("/a.jpg", (200, IMAGE.to_vec()))])).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("0_x.jpg");
        let f = fetcher(3);

        f.fetch_to(&link(addr, "/a.jpg"), &dest).await;
        let first = std::fs::read(&dest).unwrap();
        let outcome = f.fetch_to(&link(addr, "/a.jpg"), &dest).await;

        assert_eq!(outcome, FetchOutcome::AlreadyPresent);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read(&dest).unwrap(), first);
    }

    #[tokio::test]
    async fn exhausted_retries_write_placeholder() {
        let (addr, hits) = spawn_server(HashMap::new()).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("1_y.jpg");

        let outcome = fetcher(3).fetch_to(&link(addr, "/missing.jpg"), &dest).await;
        assert_eq!(outcome, FetchOutcome::Placeholder { attempts: 3 });
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        let img = image::open(&dest).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (100, 100));
        assert!(img.pixels().all(|p| p.0.iter().all(|&c| c <= 2)));
    }

    #[tokio::test]
    async fn server_error_is_retried_until_success_is_impossible() {
        let (addr, hits) =
            spawn_server(HashMap::from([("/busy.jpg", (503, Vec::new()))])).await;
        let url = Url::parse(&format!("http://{addr}/busy.jpg")).unwrap();
        let err = fetcher(2).download_with_retries(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unreachable_host_falls_back() {
        // Bind then drop so the port is closed.
        let addr = {
            let l = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
            l.local_addr().unwrap()
        };
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("2_z.jpg");
        let outcome = fetcher(2).fetch_to(&link(addr, "/a.jpg"), &dest).await;
        assert_eq!(outcome, FetchOutcome::Placeholder { attempts: 2 });
        assert!(dest.exists());
    }

    #[tokio::test]
    async fn invalid_link_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("1_y.jpg");
        let outcome = fetcher(3).fetch_to(&ImageLink::parse("123"), &dest).await;
        assert_eq!(outcome, FetchOutcome::InvalidLink);
        assert!(!outcome.has_artifact());
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn zero_retries_goes_straight_to_placeholder() {
        let (addr, hits) = spawn_server(HashMap::from([("/a.jpg", (200, IMAGE.to_vec()))])).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("0_x.jpg");
        let outcome = fetcher(0).fetch_to(&link(addr, "/a.jpg"), &dest).await;
        assert_eq!(outcome, FetchOutcome::Placeholder { attempts: 0 });
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_attempts_are_spaced_by_a_fixed_delay() {
        let url = Url::parse("http://example.invalid/a.jpg").unwrap();
        for (retries, total) in [(1u32, 0u64), (3, 6)] {
            let f = Fetcher::new(&FetchConfig {
                retries,
                delay_secs: 3.0,
                ..FetchConfig::default()
            })
            .unwrap();
            let start = tokio::time::Instant::now();
            let mut attempts_at = Vec::new();

            let err = f
                .retry(&url, || {
                    attempts_at.push(start.elapsed());
                    async { Err::<(), _>(FetchError::Status { url: "a".into(), status: 500 }) }
                })
                .await
                .unwrap_err();

            assert!(matches!(err, FetchError::Status { status: 500, .. }));
            assert_eq!(attempts_at.len(), retries as usize);
            // No sleep after the final attempt.
            assert_eq!(start.elapsed(), Duration::from_secs(total));
            for pair in attempts_at.windows(2) {
                assert_eq!(pair[1] - pair[0], Duration::from_secs(3));
            }
        }
    }

    #[tokio::test]
    async fn fetch_record_uses_index_entity_name() {
        let (addr, _) = spawn_server(HashMap::from([("/a.jpg", (200, IMAGE.to_vec()))])).await;
        let dir = tempfile::tempdir().unwrap();
        let record = Record::new(42, &format!("http://{addr}/a.jpg"), "wattage", None);
        let outcome = fetcher(1).fetch_record(&record, dir.path()).await;
        assert!(outcome.has_artifact());
        assert!(dir.path().join("42_wattage.jpg").exists());
    }
}
