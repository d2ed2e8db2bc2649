//! Core traits for pipeline components
//!
//! This module defines the capability contracts that enable modularity,
//! testability, and flexibility throughout the pipeline: the three analysis
//! workers, the job registry, the artifact store, and the remote fetcher.
//!
//! Implementations are selected once at orchestrator construction from
//! configuration identifiers; the orchestrator never inspects inputs at call
//! time to pick a backend. Each analysis call must be a pure function of its
//! input artifact (no hidden global state), because crash recovery implies
//! at-least-once execution per stage.

use async_trait::async_trait;

use crate::core::{
    Artifact, ArtifactKind, ArtifactRef, DetectionEvent, Job, JobError, JobFilter, JobId,
    JobLogEntry, JobStatus, LogLevel, MergedEntry, Result, SourceDescriptor, StageResult,
    SummaryResult, TranscriptSegment,
};

/// Raw-video input handed to the analysis workers
///
/// Bundles the artifact record with its payload bytes so a worker call is
/// fully determined by the value it receives.
#[derive(Debug, Clone)]
pub struct VideoInput {
    /// The raw-video artifact record
    pub artifact: Artifact,
    /// The artifact's payload bytes
    pub data: Vec<u8>,
}

/// Speech transcription capability
///
/// Implementations may be model-backed or deterministic stubs. Calls are
/// expected to be slow and possibly blocking; CPU-heavy implementations
/// should hand work to `tokio::task::spawn_blocking` internally.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe the video into ordered transcript segments
    async fn transcribe(&self, video: &VideoInput) -> Result<Vec<TranscriptSegment>>;

    /// Human-readable name of this implementation (for logging)
    fn name(&self) -> &str;
}

/// Object detection capability
#[async_trait]
pub trait Detector: Send + Sync {
    /// Detect objects in the video as ordered detection events
    async fn detect(&self, video: &VideoInput) -> Result<Vec<DetectionEvent>>;

    /// Human-readable name of this implementation (for logging)
    fn name(&self) -> &str;
}

/// Summary generation capability
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Produce a summary from the merged timeline
    ///
    /// The timeline arrives in the published merge order: ascending
    /// timestamp, transcript entries before detection entries at equal
    /// timestamps. Implementations may rely on that ordering.
    async fn summarize(&self, timeline: &[MergedEntry]) -> Result<SummaryResult>;

    /// Human-readable name of this implementation (for logging)
    fn name(&self) -> &str;
}

/// Durable record of job identity, status, and per-stage results
///
/// All writes for a given job id are serialized (single writer at a time);
/// writers for different jobs proceed independently. Mutations go through
/// the orchestrator's status-transition calls only.
#[async_trait]
pub trait JobRegistry: Send + Sync {
    /// Create and persist a new job for the given source
    async fn create_job(&self, source: &SourceDescriptor) -> Result<Job>;

    /// Fetch a job by id
    ///
    /// Fails with `NotFound` for unknown ids.
    async fn get_job(&self, id: &JobId) -> Result<Job>;

    /// List jobs matching `filter`, newest first
    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>>;

    /// Record a stage result for the job's currently active stage
    ///
    /// Fails with `Conflict` when the targeted stage already has a
    /// `Succeeded` record — earlier succeeded results are immutable.
    async fn append_stage_result(&self, id: &JobId, result: StageResult) -> Result<()>;

    /// Transition the job's status
    ///
    /// Fails with `Conflict` when the job is already terminal or the
    /// transition is not a legal move through the state machine.
    async fn set_status(
        &self,
        id: &JobId,
        status: JobStatus,
        error: Option<JobError>,
    ) -> Result<()>;

    /// Attach a human-readable log line to the job
    async fn append_log(&self, id: &JobId, level: LogLevel, message: &str) -> Result<()>;

    /// Fetch the job's log lines, oldest first
    async fn list_logs(&self, id: &JobId) -> Result<Vec<JobLogEntry>>;
}

/// Content-addressed storage for artifact byte payloads
///
/// Writes are idempotent: identical bytes always resolve to the same
/// content reference, so concurrent writers cannot corrupt each other.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store a payload and return its artifact record
    ///
    /// When the payload already exists, the existing reference is returned
    /// without rewriting the bytes.
    async fn put(&self, job_id: &JobId, kind: ArtifactKind, bytes: &[u8]) -> Result<Artifact>;

    /// Fetch a payload by content reference
    ///
    /// Fails with `NotFound` for unknown references.
    async fn get(&self, content_ref: &ArtifactRef) -> Result<Vec<u8>>;

    /// List the artifact records of a job, oldest first
    async fn list(&self, job_id: &JobId) -> Result<Vec<Artifact>>;
}

/// Remote download capability used by the ingestion adapter
///
/// Split out as its own contract so the retry discipline can be tested
/// without a network.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Download the resource at `url` and return its bytes
    ///
    /// Errors should be classified transient (timeouts, connection
    /// failures, 5xx) or permanent (4xx, malformed URLs) so the caller can
    /// apply its bounded retry policy.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}
