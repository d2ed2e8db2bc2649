//! Core data structures and abstractions for the VIA pipeline
//!
//! This module contains the fundamental types, traits, and error handling
//! that power the video analysis pipeline: job identity, the stage state
//! machine, artifact records, and the payload shapes produced by each stage.

pub mod error;
pub mod providers;
pub mod traits;

// Re-export key items for convenience
pub use error::{ErrorContext, PipelineError, Result};
pub use traits::{
    ArtifactStore, Detector, JobRegistry, RemoteFetcher, Summarizer, Transcriber, VideoInput,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for jobs
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    /// Creates a new JobId from a string
    pub fn new(id: String) -> Self {
        Self(id)
    }

    /// Generates a fresh random JobId
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

/// Content-addressed reference to stored artifact bytes
///
/// The reference is the lowercase hex SHA-256 digest of the artifact
/// payload, so identical bytes always resolve to the same reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef(pub String);

impl ArtifactRef {
    /// Creates a new ArtifactRef from a string
    pub fn new(id: String) -> Self {
        Self(id)
    }

    /// Computes the reference for a byte payload
    pub fn from_bytes(bytes: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(format!("{:x}", hasher.finalize()))
    }
}

impl std::fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ArtifactRef {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<ArtifactRef> for String {
    fn from(id: ArtifactRef) -> Self {
        id.0
    }
}

/// How the source video entered the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Bytes streamed in by the caller
    Upload,
    /// Downloaded from a remote URL
    RemoteUrl,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceType::Upload => write!(f, "upload"),
            SourceType::RemoteUrl => write!(f, "remote_url"),
        }
    }
}

/// Description of a video source handed to the ingestion adapter
#[derive(Debug, Clone)]
pub enum SourceDescriptor {
    /// An uploaded file held in memory by the caller
    Upload {
        /// Original file name, kept for display and logs
        file_name: String,
        /// Raw file bytes
        data: Vec<u8>,
    },
    /// A remote video to download
    RemoteUrl {
        /// HTTP(S) URL of the video
        url: String,
    },
}

impl SourceDescriptor {
    /// The source type this descriptor represents
    pub fn source_type(&self) -> SourceType {
        match self {
            SourceDescriptor::Upload { .. } => SourceType::Upload,
            SourceDescriptor::RemoteUrl { .. } => SourceType::RemoteUrl,
        }
    }

    /// Display form of the source (file name or URL)
    pub fn display_source(&self) -> &str {
        match self {
            SourceDescriptor::Upload { file_name, .. } => file_name,
            SourceDescriptor::RemoteUrl { url } => url,
        }
    }
}

/// Job lifecycle states
///
/// Jobs move strictly forward through the analysis states; `Failed` and
/// `Cancelled` are reachable from every non-terminal state. `Completed`,
/// `Failed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job recorded, no stage started yet
    Created,
    /// Acquiring the source video
    Ingesting,
    /// Speech transcription in flight
    Transcribing,
    /// Object detection in flight
    Detecting,
    /// Timeline merge in flight
    Merging,
    /// Summary generation in flight
    Summarizing,
    /// All stages succeeded
    Completed,
    /// A stage failed permanently or exhausted its retries
    Failed,
    /// Cancelled by explicit request
    Cancelled,
}

impl JobStatus {
    /// Whether this status is terminal (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether a transition from `self` to `next` is a legal move through
    /// the state machine.
    ///
    /// Re-entering the current state is allowed for non-terminal states:
    /// crash recovery re-runs the in-flight stage, which re-asserts the same
    /// running status (at-least-once execution).
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        if self == next {
            return !self.is_terminal();
        }
        match (self, next) {
            (from, JobStatus::Failed) | (from, JobStatus::Cancelled) => !from.is_terminal(),
            (JobStatus::Created, JobStatus::Ingesting)
            | (JobStatus::Ingesting, JobStatus::Transcribing)
            | (JobStatus::Transcribing, JobStatus::Detecting)
            | (JobStatus::Detecting, JobStatus::Merging)
            | (JobStatus::Merging, JobStatus::Summarizing)
            | (JobStatus::Summarizing, JobStatus::Completed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobStatus::Created => "created",
            JobStatus::Ingesting => "ingesting",
            JobStatus::Transcribing => "transcribing",
            JobStatus::Detecting => "detecting",
            JobStatus::Merging => "merging",
            JobStatus::Summarizing => "summarizing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        write!(f, "{name}")
    }
}

/// The fixed, totally ordered pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Acquire and validate the source video
    Ingestion,
    /// Produce transcript segments from the video
    Transcription,
    /// Produce detection events from the video
    Detection,
    /// Merge transcript and detections into one timeline
    Merge,
    /// Produce the summary from the merged timeline
    Summarization,
}

impl StageKind {
    /// The complete stage sequence, in execution order
    pub const SEQUENCE: [StageKind; 5] = [
        StageKind::Ingestion,
        StageKind::Transcription,
        StageKind::Detection,
        StageKind::Merge,
        StageKind::Summarization,
    ];

    /// Stable name used in logs, error records and metrics
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Ingestion => "ingestion",
            StageKind::Transcription => "transcription",
            StageKind::Detection => "detection",
            StageKind::Merge => "merge",
            StageKind::Summarization => "summarization",
        }
    }

    /// The job status observed while this stage is in flight
    pub fn running_status(&self) -> JobStatus {
        match self {
            StageKind::Ingestion => JobStatus::Ingesting,
            StageKind::Transcription => JobStatus::Transcribing,
            StageKind::Detection => JobStatus::Detecting,
            StageKind::Merge => JobStatus::Merging,
            StageKind::Summarization => JobStatus::Summarizing,
        }
    }

    /// The artifact kind this stage produces
    pub fn output_kind(&self) -> ArtifactKind {
        match self {
            StageKind::Ingestion => ArtifactKind::RawVideo,
            StageKind::Transcription => ArtifactKind::Transcript,
            StageKind::Detection => ArtifactKind::Detections,
            StageKind::Merge => ArtifactKind::MergedTimeline,
            StageKind::Summarization => ArtifactKind::Summary,
        }
    }

    /// The stage scheduled after this one, if any
    pub fn next(&self) -> Option<StageKind> {
        let pos = Self::SEQUENCE.iter().position(|s| s == self)?;
        Self::SEQUENCE.get(pos + 1).copied()
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Execution state of a single stage of a single job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Not started
    Pending,
    /// Currently in flight
    Running,
    /// Finished with an output artifact
    Succeeded,
    /// Gave up after exhausting retries or hitting a permanent error
    Failed,
}

/// Record of one stage execution for one job
///
/// A job owns one `StageResult` per pipeline stage in execution order.
/// Only the currently active stage's record may be overwritten; a
/// `Succeeded` record is immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    /// Which stage this record describes
    pub stage: StageKind,
    /// Execution state of the stage
    pub status: StageStatus,
    /// Content reference of the output artifact, once succeeded
    pub output: Option<ArtifactRef>,
    /// Failure message, once failed
    pub error: Option<String>,
    /// Number of execution attempts made so far
    pub attempts: u32,
    /// When the stage first started, if it has
    pub started_at: Option<DateTime<Utc>>,
    /// When the stage reached `Succeeded` or `Failed`
    pub finished_at: Option<DateTime<Utc>>,
}

impl StageResult {
    /// A pristine pending record for `stage`
    pub fn pending(stage: StageKind) -> Self {
        Self {
            stage,
            status: StageStatus::Pending,
            output: None,
            error: None,
            attempts: 0,
            started_at: None,
            finished_at: None,
        }
    }

    /// A record marking `stage` as in flight
    pub fn running(stage: StageKind) -> Self {
        Self {
            status: StageStatus::Running,
            started_at: Some(Utc::now()),
            ..Self::pending(stage)
        }
    }

    /// A record marking `stage` as succeeded with its output artifact
    pub fn succeeded(
        stage: StageKind,
        output: ArtifactRef,
        started_at: Option<DateTime<Utc>>,
        attempts: u32,
    ) -> Self {
        Self {
            stage,
            status: StageStatus::Succeeded,
            output: Some(output),
            error: None,
            attempts,
            started_at,
            finished_at: Some(Utc::now()),
        }
    }

    /// A record marking `stage` as failed
    pub fn failed(
        stage: StageKind,
        message: String,
        started_at: Option<DateTime<Utc>>,
        attempts: u32,
    ) -> Self {
        Self {
            stage,
            status: StageStatus::Failed,
            output: None,
            error: Some(message),
            attempts,
            started_at,
            finished_at: Some(Utc::now()),
        }
    }
}

/// Structured error carried by a FAILED job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    /// Stage the failure originated from
    pub stage: StageKind,
    /// Failure message
    pub message: String,
    /// When the failure was recorded
    pub timestamp: DateTime<Utc>,
}

impl JobError {
    /// Creates an error record stamped with the current time
    pub fn new(stage: StageKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// One end-to-end video analysis request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier
    pub id: JobId,
    /// How the source video entered the system
    pub source_type: SourceType,
    /// File name or URL the job was created from
    pub source: String,
    /// Current lifecycle state
    pub status: JobStatus,
    /// When the job was created
    pub created_at: DateTime<Utc>,
    /// When the job was last mutated
    pub updated_at: DateTime<Utc>,
    /// Structured error, present iff the job is FAILED
    pub error: Option<JobError>,
    /// Per-stage execution records, in pipeline order
    pub stages: Vec<StageResult>,
}

impl Job {
    /// Creates a fresh job with all stage records pending
    pub fn new(source_type: SourceType, source: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::generate(),
            source_type,
            source: source.into(),
            status: JobStatus::Created,
            created_at: now,
            updated_at: now,
            error: None,
            stages: StageKind::SEQUENCE
                .iter()
                .map(|s| StageResult::pending(*s))
                .collect(),
        }
    }

    /// The record for `stage`, if the job carries one
    pub fn stage_result(&self, stage: StageKind) -> Option<&StageResult> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    /// The first stage without a `Succeeded` record, or `None` once every
    /// stage has succeeded.
    pub fn next_stage(&self) -> Option<StageKind> {
        StageKind::SEQUENCE.iter().copied().find(|stage| {
            self.stage_result(*stage)
                .map(|r| r.status != StageStatus::Succeeded)
                .unwrap_or(true)
        })
    }

    /// Output artifact reference of a succeeded stage
    pub fn stage_output(&self, stage: StageKind) -> Option<&ArtifactRef> {
        self.stage_result(stage).and_then(|r| r.output.as_ref())
    }

    /// The status implied by the stage records alone.
    ///
    /// Does not account for cancellation, which is an explicit override
    /// rather than a stage outcome.
    pub fn derived_status(&self) -> JobStatus {
        let mut last_active: Option<&StageResult> = None;
        for result in &self.stages {
            if result.status != StageStatus::Pending {
                last_active = Some(result);
            }
        }
        match last_active {
            None => JobStatus::Created,
            Some(r) => match r.status {
                StageStatus::Failed => JobStatus::Failed,
                StageStatus::Running => r.stage.running_status(),
                StageStatus::Succeeded => match r.stage.next() {
                    None => JobStatus::Completed,
                    Some(_) => r.stage.running_status(),
                },
                StageStatus::Pending => unreachable!("pending records are filtered above"),
            },
        }
    }
}

/// Categories of stored artifact payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// The validated source video bytes
    RawVideo,
    /// JSON-encoded transcript segments
    Transcript,
    /// JSON-encoded detection events
    Detections,
    /// JSON-encoded merged timeline
    MergedTimeline,
    /// JSON-encoded summary result
    Summary,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ArtifactKind::RawVideo => "raw_video",
            ArtifactKind::Transcript => "transcript",
            ArtifactKind::Detections => "detections",
            ArtifactKind::MergedTimeline => "merged_timeline",
            ArtifactKind::Summary => "summary",
        };
        write!(f, "{name}")
    }
}

/// Immutable record of a stored byte payload
///
/// Artifacts are never mutated after creation, only superseded by new
/// artifacts under a new content reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Owning job
    pub job_id: JobId,
    /// What the payload contains
    pub kind: ArtifactKind,
    /// Content-addressed reference to the payload bytes
    pub content_ref: ArtifactRef,
    /// Payload size in bytes
    pub size_bytes: u64,
    /// When the artifact record was created
    pub created_at: DateTime<Utc>,
}

/// One transcribed utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Segment start, seconds from the beginning of the video
    pub start: f64,
    /// Segment end, seconds
    pub end: f64,
    /// Transcribed text
    pub text: String,
    /// Transcription confidence (0.0-1.0)
    pub confidence: f32,
}

/// Normalized bounding box of a detected object
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge, fraction of frame width
    pub x: f32,
    /// Top edge, fraction of frame height
    pub y: f32,
    /// Box width, fraction of frame width
    pub width: f32,
    /// Box height, fraction of frame height
    pub height: f32,
}

/// One detected object occurrence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    /// First appearance, seconds from the beginning of the video
    pub start: f64,
    /// Last appearance, seconds
    pub end: f64,
    /// Object class label
    pub label: String,
    /// Detection confidence (0.0-1.0)
    pub confidence: f32,
    /// Bounding box at first appearance, when the detector provides one
    pub bbox: Option<BoundingBox>,
}

/// Which side of the pipeline a merged entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergedKind {
    /// Transcript segment
    Transcript,
    /// Detection event
    Detection,
}

impl MergedKind {
    /// Ordering rank inside the merge contract: transcript entries sort
    /// before detection entries sharing the same timestamp.
    pub fn rank(&self) -> u8 {
        match self {
            MergedKind::Transcript => 0,
            MergedKind::Detection => 1,
        }
    }
}

/// Payload of a merged timeline entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum MergedPayload {
    /// A transcript segment
    Transcript(TranscriptSegment),
    /// A detection event
    Detection(DetectionEvent),
}

impl MergedPayload {
    /// The entry kind of this payload
    pub fn kind(&self) -> MergedKind {
        match self {
            MergedPayload::Transcript(_) => MergedKind::Transcript,
            MergedPayload::Detection(_) => MergedKind::Detection,
        }
    }
}

/// One entry of the merged timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedEntry {
    /// Entry timestamp, seconds from the beginning of the video
    pub timestamp: f64,
    /// The underlying transcript segment or detection event
    #[serde(flatten)]
    pub payload: MergedPayload,
}

impl MergedEntry {
    /// The entry kind (transcript or detection)
    pub fn kind(&self) -> MergedKind {
        self.payload.kind()
    }
}

/// Final summary produced by the summarization stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryResult {
    /// Narrative summary text
    pub text: String,
    /// Notable moments or labels worth surfacing
    pub highlights: Vec<String>,
}

/// Severity of a job log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Routine progress
    Info,
    /// Unexpected but recoverable condition
    Warning,
    /// Failure
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARNING"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// One human-readable log line attached to a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobLogEntry {
    /// When the line was recorded
    pub timestamp: DateTime<Utc>,
    /// Severity
    pub level: LogLevel,
    /// Message text
    pub message: String,
}

/// Filter for registry job listings
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    /// Only jobs with this exact status
    pub status: Option<JobStatus>,
    /// Only jobs created from this source type
    pub source_type: Option<SourceType>,
    /// Only jobs whose status is non-terminal
    pub non_terminal_only: bool,
}

impl JobFilter {
    /// Filter matching every job
    pub fn all() -> Self {
        Self::default()
    }

    /// Filter matching jobs still moving through the pipeline
    ///
    /// This is the crash-recovery scan filter.
    pub fn non_terminal() -> Self {
        Self {
            non_terminal_only: true,
            ..Self::default()
        }
    }

    /// Whether `job` passes this filter
    pub fn matches(&self, job: &Job) -> bool {
        if let Some(status) = self.status {
            if job.status != status {
                return false;
            }
        }
        if let Some(source_type) = self.source_type {
            if job.source_type != source_type {
                return false;
            }
        }
        if self.non_terminal_only && job.status.is_terminal() {
            return false;
        }
        true
    }
}
