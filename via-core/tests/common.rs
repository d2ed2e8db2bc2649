//! Shared fixtures and helpers for pipeline integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use via_core::core::providers::{SignatureDetector, SignatureTranscriber};
use via_core::core::{
    DetectionEvent, Detector, PipelineError, RemoteFetcher, Result, Summarizer, Transcriber,
    TranscriptSegment, VideoInput,
};
use via_core::pipeline::{PipelineComponents, PipelineOrchestrator};
use via_core::{Job, JobId, JobStatus, PipelineConfig, StageKind};

/// Minimal bytes carrying a valid MP4 signature
pub fn mp4_bytes(tail: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x18]);
    bytes.extend_from_slice(b"ftypisom");
    bytes.extend_from_slice(tail);
    bytes
}

/// A configuration tuned for fast tests: small pool, millisecond backoff
pub fn fast_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.worker_pool_size = 2;
    config.queue_capacity = 64;
    config.stage.timeout_secs = 30;
    config.stage.backoff_base_ms = 1;
    config.ingest.download_backoff_base_ms = 1;
    config
}

/// Poll the registry until the job reaches a terminal state
pub async fn wait_for_terminal(
    orchestrator: &PipelineOrchestrator,
    id: &JobId,
    deadline: Duration,
) -> Job {
    let started = std::time::Instant::now();
    loop {
        let job = orchestrator.get_job(id).await.expect("job should exist");
        if job.status.is_terminal() {
            return job;
        }
        if started.elapsed() > deadline {
            panic!("job {id} still {} after {deadline:?}", job.status);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Poll the registry, recording every distinct status observed, until the
/// job reaches a terminal state
pub async fn observe_status_path(
    orchestrator: &PipelineOrchestrator,
    id: &JobId,
    deadline: Duration,
) -> Vec<JobStatus> {
    let started = std::time::Instant::now();
    let mut observed = Vec::new();
    loop {
        let job = orchestrator.get_job(id).await.expect("job should exist");
        if observed.last() != Some(&job.status) {
            observed.push(job.status);
        }
        if job.status.is_terminal() {
            return observed;
        }
        if started.elapsed() > deadline {
            panic!("job {id} still {} after {deadline:?}", job.status);
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

/// Assert that a sampled status sequence is a valid walk through the state
/// machine: strictly forward through the linear states, optionally ending
/// in a terminal override
pub fn assert_valid_status_path(observed: &[JobStatus]) {
    fn order(status: JobStatus) -> usize {
        match status {
            JobStatus::Created => 0,
            JobStatus::Ingesting => 1,
            JobStatus::Transcribing => 2,
            JobStatus::Detecting => 3,
            JobStatus::Merging => 4,
            JobStatus::Summarizing => 5,
            JobStatus::Completed => 6,
            JobStatus::Failed | JobStatus::Cancelled => 7,
        }
    }
    for pair in observed.windows(2) {
        assert!(
            order(pair[0]) < order(pair[1]),
            "status went backwards: {:?}",
            observed
        );
    }
    for status in &observed[..observed.len().saturating_sub(1)] {
        assert!(!status.is_terminal(), "terminal state was not a sink: {observed:?}");
    }
}

/// Fetcher returning fixed bytes without a network
pub struct StaticFetcher {
    pub bytes: Vec<u8>,
    pub calls: AtomicUsize,
}

impl StaticFetcher {
    pub fn mp4(tail: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            bytes: mp4_bytes(tail),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl RemoteFetcher for StaticFetcher {
    async fn fetch(&self, _url: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.bytes.clone())
    }
}

/// Transcriber failing transiently for its first `fail_first` calls, then
/// delegating to the deterministic signature transcriber
pub struct FlakyTranscriber {
    pub calls: Arc<AtomicUsize>,
    pub fail_first: usize,
    inner: SignatureTranscriber,
}

impl FlakyTranscriber {
    pub fn new(fail_first: usize) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            fail_first,
            inner: SignatureTranscriber::default(),
        }
    }
}

#[async_trait]
impl Transcriber for FlakyTranscriber {
    async fn transcribe(&self, video: &VideoInput) -> Result<Vec<TranscriptSegment>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(PipelineError::StageExecution {
                stage: StageKind::Transcription,
                message: "speech service briefly unavailable".to_string(),
                transient: true,
            });
        }
        self.inner.transcribe(video).await
    }

    fn name(&self) -> &str {
        "flaky-transcriber"
    }
}

/// Detector that always fails, transiently or permanently
pub struct FailingDetector {
    pub transient: bool,
    pub calls: Arc<AtomicUsize>,
}

impl FailingDetector {
    pub fn new(transient: bool) -> Self {
        Self {
            transient,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Detector for FailingDetector {
    async fn detect(&self, _video: &VideoInput) -> Result<Vec<DetectionEvent>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(PipelineError::StageExecution {
            stage: StageKind::Detection,
            message: "vision model crashed".to_string(),
            transient: self.transient,
        })
    }

    fn name(&self) -> &str {
        "failing-detector"
    }
}

/// Transcriber that blocks on a gate until the test releases it
pub struct GatedTranscriber {
    pub entered: Arc<AtomicBool>,
    pub gate: Arc<Semaphore>,
    inner: SignatureTranscriber,
}

impl GatedTranscriber {
    pub fn new() -> Self {
        Self {
            entered: Arc::new(AtomicBool::new(false)),
            gate: Arc::new(Semaphore::new(0)),
            inner: SignatureTranscriber::default(),
        }
    }

    pub async fn wait_until_entered(&self) {
        while !self.entered.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}

#[async_trait]
impl Transcriber for GatedTranscriber {
    async fn transcribe(&self, video: &VideoInput) -> Result<Vec<TranscriptSegment>> {
        self.entered.store(true, Ordering::SeqCst);
        let permit = self.gate.acquire().await.map_err(|_| {
            PipelineError::StageExecution {
                stage: StageKind::Transcription,
                message: "gate closed".to_string(),
                transient: false,
            }
        })?;
        permit.forget();
        self.inner.transcribe(video).await
    }

    fn name(&self) -> &str {
        "gated-transcriber"
    }
}

/// Transcriber emitting fixed segments, for exact-output assertions
pub struct FixtureTranscriber {
    pub segments: Vec<TranscriptSegment>,
}

#[async_trait]
impl Transcriber for FixtureTranscriber {
    async fn transcribe(&self, _video: &VideoInput) -> Result<Vec<TranscriptSegment>> {
        Ok(self.segments.clone())
    }

    fn name(&self) -> &str {
        "fixture-transcriber"
    }
}

/// Detector emitting fixed events, for exact-output assertions
pub struct FixtureDetector {
    pub events: Vec<DetectionEvent>,
}

#[async_trait]
impl Detector for FixtureDetector {
    async fn detect(&self, _video: &VideoInput) -> Result<Vec<DetectionEvent>> {
        Ok(self.events.clone())
    }

    fn name(&self) -> &str {
        "fixture-detector"
    }
}

/// Components with every backend at its deterministic default
pub fn signature_components() -> PipelineComponents {
    PipelineComponents::from_config(&PipelineConfig::default().backends).unwrap()
}

/// Components with a custom transcriber and defaults elsewhere
pub fn components_with_transcriber(transcriber: Arc<dyn Transcriber>) -> PipelineComponents {
    let defaults = signature_components();
    PipelineComponents::new(transcriber, defaults.detector, defaults.summarizer)
}

/// Components with a custom detector and defaults elsewhere
pub fn components_with_detector(detector: Arc<dyn Detector>) -> PipelineComponents {
    let defaults = signature_components();
    PipelineComponents::new(defaults.transcriber, detector, defaults.summarizer)
}

/// Components with fixed transcript/detection outputs and the default
/// summarizer
pub fn fixture_components(
    segments: Vec<TranscriptSegment>,
    events: Vec<DetectionEvent>,
) -> PipelineComponents {
    let defaults = signature_components();
    PipelineComponents::new(
        Arc::new(FixtureTranscriber { segments }),
        Arc::new(FixtureDetector { events }),
        defaults.summarizer,
    )
}

/// A summarizer is part of every component set; re-export the trait for
/// tests that build their own
pub fn default_summarizer() -> Arc<dyn Summarizer> {
    signature_components().summarizer
}
