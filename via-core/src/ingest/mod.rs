//! Source acquisition
//!
//! The ingestion adapter turns a [`SourceDescriptor`] into the job's
//! raw-video artifact. Uploads are validated against the configured size
//! limit and container signature before anything touches the artifact store;
//! remote URLs are downloaded with bounded retry on transient network
//! failures and then validated the same way.
//!
//! Download retry lives here, not in the orchestrator's stage retry: once
//! the adapter has exhausted its attempts the error surfaces as permanent,
//! so the ingestion stage is not retried on top of the already-retried
//! download.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::{IngestConfig, PipelineConfig};
use crate::core::{
    Artifact, ArtifactKind, ArtifactStore, JobId, PipelineError, RemoteFetcher, Result,
    SourceDescriptor,
};

/// Video container formats accepted by signature sniffing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    /// MP4 / QuickTime (`ftyp` box)
    Mp4,
    /// Matroska / WebM (EBML magic)
    Matroska,
    /// AVI (RIFF container)
    Avi,
}

impl ContainerFormat {
    /// Identify the container from the payload's leading bytes
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
            return Some(ContainerFormat::Mp4);
        }
        if bytes.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
            return Some(ContainerFormat::Matroska);
        }
        if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"AVI " {
            return Some(ContainerFormat::Avi);
        }
        None
    }

    /// Stable name for logs
    pub fn name(&self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => "mp4",
            ContainerFormat::Matroska => "matroska",
            ContainerFormat::Avi => "avi",
        }
    }
}

/// Turns upload streams and remote URLs into raw video artifacts
pub struct IngestionAdapter {
    store: Arc<dyn ArtifactStore>,
    fetcher: Arc<dyn RemoteFetcher>,
    config: IngestConfig,
    max_upload_size_bytes: u64,
}

impl IngestionAdapter {
    /// Create an adapter writing into `store` and downloading via `fetcher`
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        fetcher: Arc<dyn RemoteFetcher>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            store,
            fetcher,
            config: config.ingest.clone(),
            max_upload_size_bytes: config.max_upload_size_bytes,
        }
    }

    /// Acquire the source video and store it as the job's raw artifact
    pub async fn fetch_source(
        &self,
        job_id: &JobId,
        source: &SourceDescriptor,
    ) -> Result<Artifact> {
        let bytes = match source {
            SourceDescriptor::Upload { file_name, data } => {
                debug!(job_id = %job_id, file_name = %file_name, "Validating uploaded video");
                self.validate(data)?;
                data.clone()
            },
            SourceDescriptor::RemoteUrl { url } => {
                if !self.config.allow_remote_urls {
                    return Err(PipelineError::Ingestion {
                        message: "remote URL ingestion is disabled".to_string(),
                        transient: false,
                    });
                }
                let data = self.download_with_retry(url).await?;
                self.validate(&data)?;
                data
            },
        };
        self.store.put(job_id, ArtifactKind::RawVideo, &bytes).await
    }

    /// Size and container checks, performed before any store write
    fn validate(&self, bytes: &[u8]) -> Result<()> {
        if bytes.len() as u64 > self.max_upload_size_bytes {
            return Err(PipelineError::Ingestion {
                message: format!(
                    "source of {} bytes exceeds the maximum of {} bytes",
                    bytes.len(),
                    self.max_upload_size_bytes
                ),
                transient: false,
            });
        }
        match ContainerFormat::sniff(bytes) {
            Some(format) => {
                debug!(container = format.name(), "Source container recognized");
                Ok(())
            },
            None => Err(PipelineError::Ingestion {
                message: "unrecognized container format (expected mp4, matroska or avi)"
                    .to_string(),
                transient: false,
            }),
        }
    }

    async fn download_with_retry(&self, url: &str) -> Result<Vec<u8>> {
        let max_attempts = self.config.max_download_attempts;
        let mut attempt = 1;
        loop {
            match self.fetcher.fetch(url).await {
                Ok(bytes) => return Ok(bytes),
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let delay = self.config.backoff_delay(attempt);
                    warn!(
                        url = %url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient download failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
                Err(err) if err.is_transient() => {
                    // Retry budget spent; don't let the stage retry multiply it.
                    return Err(PipelineError::Ingestion {
                        message: format!("download failed after {max_attempts} attempts: {err}"),
                        transient: false,
                    });
                },
                Err(err) => return Err(err),
            }
        }
    }
}

/// HTTP download implementation of [`RemoteFetcher`]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with a request deadline
    pub fn new(timeout: std::time::Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Ingestion {
                message: format!("cannot build HTTP client: {e}"),
                transient: false,
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Ingestion {
                message: format!("download of {url} returned HTTP {status}"),
                transient: status.is_server_error(),
            });
        }
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}
