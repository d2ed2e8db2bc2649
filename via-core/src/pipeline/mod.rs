//! Pipeline orchestration
//!
//! This module drives jobs through the fixed stage state machine:
//!
//! ```text
//! CREATED → INGESTING → TRANSCRIBING → DETECTING → MERGING → SUMMARIZING → COMPLETED
//! ```
//!
//! with `FAILED` reachable from every non-terminal state and `CANCELLED`
//! available behind a configuration flag. A bounded worker pool pulls job
//! ids from a queue; each dequeue runs exactly one stage and re-enqueues the
//! job until it reaches a terminal state, so jobs interleave fairly while
//! stages within one job stay strictly sequential.
//!
//! # Main Types
//!
//! - [`PipelineOrchestrator`]: owns the worker pool and enforces the
//!   retry/timeout/cancellation policy
//! - [`PipelineComponents`]: the analysis backends, resolved once at
//!   construction from configuration
//! - [`ResultAssembler`]: rebuilds the externally visible result bundle from
//!   registry + store contents alone
//! - [`PipelineMetrics`]: throughput and stage counters

pub mod assembler;
pub mod metrics;
pub mod orchestrator;

pub use assembler::{ResultAssembler, ResultBundle};
pub use metrics::{MetricsSummary, PipelineMetrics};
pub use orchestrator::{OrchestratorBuilder, PipelineOrchestrator};

use std::sync::Arc;

use crate::analysis::{ExtractiveSummarizer, StubSummarizer};
use crate::config::BackendConfig;
use crate::config_error;
use crate::core::providers::{
    SignatureDetector, SignatureTranscriber, StubDetector, StubTranscriber,
};
use crate::core::{Detector, Result, Summarizer, Transcriber};

/// The analysis backends a pipeline runs with
///
/// Selected exactly once, at orchestrator construction; the orchestrator
/// never picks a backend at call time by inspecting its input.
#[derive(Clone)]
pub struct PipelineComponents {
    /// Speech transcription backend
    pub transcriber: Arc<dyn Transcriber>,
    /// Object detection backend
    pub detector: Arc<dyn Detector>,
    /// Summary generation backend
    pub summarizer: Arc<dyn Summarizer>,
}

impl std::fmt::Debug for PipelineComponents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineComponents")
            .field("transcriber", &self.transcriber.name())
            .field("detector", &self.detector.name())
            .field("summarizer", &self.summarizer.name())
            .finish()
    }
}

impl PipelineComponents {
    /// Assemble components from explicit backend instances
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        detector: Arc<dyn Detector>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Self {
        Self {
            transcriber,
            detector,
            summarizer,
        }
    }

    /// Resolve components from configuration identifiers
    pub fn from_config(backends: &BackendConfig) -> Result<Self> {
        let transcriber: Arc<dyn Transcriber> = match backends.transcriber.as_str() {
            "signature" => Arc::new(SignatureTranscriber::default()),
            "stub" => Arc::new(StubTranscriber::new()),
            other => {
                return Err(config_error!("unknown transcriber implementation '{other}'"));
            },
        };
        let detector: Arc<dyn Detector> = match backends.detector.as_str() {
            "signature" => Arc::new(SignatureDetector::new()),
            "stub" => Arc::new(StubDetector::new()),
            other => return Err(config_error!("unknown detector implementation '{other}'")),
        };
        let summarizer: Arc<dyn Summarizer> = match backends.summarizer.as_str() {
            "extractive" => Arc::new(ExtractiveSummarizer::default()),
            "stub" => Arc::new(StubSummarizer::new()),
            other => {
                return Err(config_error!("unknown summarizer implementation '{other}'"));
            },
        };
        Ok(Self::new(transcriber, detector, summarizer))
    }
}
