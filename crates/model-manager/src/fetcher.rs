//! Model fetchers
//!
//! Pull model artifacts from their source into memory, reporting progress as
//! bytes arrive. `http(s)://` sources go over the network; anything else is
//! treated as a local path (with or without a `file://` prefix).

use std::sync::Arc;
use std::time::{Duration, Instant};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::Client;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use common::error::{Error, Result};
use common::models::ModelDescriptor;
use common::utils::format_bytes;

/// Progress callback: `(bytes_so_far, total_bytes)`
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

const FILE_CHUNK_SIZE: usize = 64 * 1024;
const LOG_INTERVAL: Duration = Duration::from_millis(500);

/// Source of model artifacts
#[async_trait]
pub trait ModelFetcher: Send + Sync {
    /// Fetches the full artifact for a model
    async fn fetch(&self, descriptor: &ModelDescriptor, progress: Option<ProgressCallback>) -> Result<Bytes>;
}

/// Tracks transferred bytes and throttles debug output
struct TransferTracker<'a> {
    model_name: &'a str,
    total: u64,
    received: u64,
    started: Instant,
    last_log: Instant,
    progress: Option<ProgressCallback>,
}

impl<'a> TransferTracker<'a> {
    fn new(model_name: &'a str, total: u64, progress: Option<ProgressCallback>) -> Self {
        let now = Instant::now();
        Self {
            model_name,
            total,
            received: 0,
            started: now,
            last_log: now,
            progress,
        }
    }

    fn advance(&mut self, chunk_len: usize) {
        self.received += chunk_len as u64;

        // Size hints can be stale; never report more than 100%
        let total = self.total.max(self.received);
        if let Some(progress) = &self.progress {
            progress(self.received, total);
        }

        let now = Instant::now();
        if now.duration_since(self.last_log) >= LOG_INTERVAL {
            let elapsed = now.duration_since(self.started).as_secs_f64().max(f64::EPSILON);
            let speed = (self.received as f64 / elapsed) as u64;

            debug!(
                "Fetching model {}: {} / {} ({}/s)",
                self.model_name,
                format_bytes(self.received),
                format_bytes(total),
                format_bytes(speed)
            );
            self.last_log = now;
        }
    }
}

/// Fetches artifacts over HTTP(S)
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Creates a fetcher with the given overall request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("photo-curator/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| Error::Initialization(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

fn map_reqwest_error(url: &str, error: reqwest::Error) -> Error {
    if error.is_timeout() {
        Error::Timeout(format!("Request to {} timed out", url))
    } else {
        Error::Network(format!("Request to {} failed: {}", url, error))
    }
}

#[async_trait]
impl ModelFetcher for HttpFetcher {
    async fn fetch(&self, descriptor: &ModelDescriptor, progress: Option<ProgressCallback>) -> Result<Bytes> {
        let url = descriptor.source.as_str();
        info!("Downloading model {} from {}", descriptor.name, url);

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| map_reqwest_error(url, e))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("Model artifact not found at {}", url)));
        }
        if !status.is_success() {
            return Err(Error::Network(format!("Failed to download {}: HTTP {}", url, status)));
        }

        let total = resp.content_length().unwrap_or(descriptor.size_bytes);
        let mut buffer = BytesMut::with_capacity(total as usize);
        let mut tracker = TransferTracker::new(&descriptor.name, total, progress);

        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| map_reqwest_error(url, e))?;
            buffer.extend_from_slice(&chunk);
            tracker.advance(chunk.len());
        }

        info!(
            "Downloaded model {} ({})",
            descriptor.name,
            format_bytes(buffer.len() as u64)
        );

        Ok(buffer.freeze())
    }
}

/// Reads artifacts from the local filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct FileFetcher;

impl FileFetcher {
    fn path_of(source: &str) -> &str {
        source.strip_prefix("file://").unwrap_or(source)
    }
}

#[async_trait]
impl ModelFetcher for FileFetcher {
    async fn fetch(&self, descriptor: &ModelDescriptor, progress: Option<ProgressCallback>) -> Result<Bytes> {
        let path = Self::path_of(&descriptor.source);

        let mut file = match tokio::fs::File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!("Model artifact not found at {}", path)));
            }
            Err(e) => return Err(e.into()),
        };

        let total = file.metadata().await?.len();
        let mut buffer = BytesMut::with_capacity(total as usize);
        let mut tracker = TransferTracker::new(&descriptor.name, total, progress);
        let mut chunk = vec![0u8; FILE_CHUNK_SIZE];

        loop {
            let read = file.read(&mut chunk).await?;
            if read == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..read]);
            tracker.advance(read);
        }

        debug!("Read model {} from {} ({})", descriptor.name, path, format_bytes(total));

        Ok(buffer.freeze())
    }
}

/// Dispatches to the HTTP or file fetcher by source scheme
pub struct SourceFetcher {
    http: HttpFetcher,
    file: FileFetcher,
}

impl SourceFetcher {
    pub fn new(http_timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: HttpFetcher::new(http_timeout)?,
            file: FileFetcher,
        })
    }

    fn is_remote(source: &str) -> bool {
        source.starts_with("http://") || source.starts_with("https://")
    }
}

#[async_trait]
impl ModelFetcher for SourceFetcher {
    async fn fetch(&self, descriptor: &ModelDescriptor, progress: Option<ProgressCallback>) -> Result<Bytes> {
        if Self::is_remote(&descriptor.source) {
            self.http.fetch(descriptor, progress).await
        } else {
            self.file.fetch(descriptor, progress).await
        }
    }
}
