//! Result assembly
//!
//! Rebuilds the externally visible result bundle purely from the job
//! registry and the artifact store. No orchestrator-internal state is
//! consulted, so results survive a process restart unchanged.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::analysis::{build_analytics, AnalyticsBundle};
use crate::artifact::get_json;
use crate::core::{
    ArtifactStore, DetectionEvent, Job, JobId, JobRegistry, JobStatus, MergedEntry, PipelineError,
    Result, StageKind, SummaryResult, TranscriptSegment,
};
use crate::storage_error;

/// The complete analysis output of a COMPLETED job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultBundle {
    /// Ordered transcript segments
    pub transcript: Vec<TranscriptSegment>,
    /// Ordered detection events
    pub detections: Vec<DetectionEvent>,
    /// The merged timeline, in the published merge order
    pub merged_timeline: Vec<MergedEntry>,
    /// The generated summary
    pub summary: SummaryResult,
    /// Analytics derived from the stored results at read time
    pub analytics: AnalyticsBundle,
}

/// Reconstructs result bundles from registry + store contents
pub struct ResultAssembler {
    registry: Arc<dyn JobRegistry>,
    store: Arc<dyn ArtifactStore>,
    timeline_window_secs: f64,
}

impl ResultAssembler {
    /// Create an assembler reading from the given registry and store
    pub fn new(
        registry: Arc<dyn JobRegistry>,
        store: Arc<dyn ArtifactStore>,
        timeline_window_secs: f64,
    ) -> Self {
        Self {
            registry,
            store,
            timeline_window_secs,
        }
    }

    /// Assemble the result bundle of a COMPLETED job
    ///
    /// Fails with `NotFound` when the job does not exist or has not
    /// completed: partial results are never reported.
    pub async fn assemble(&self, id: &JobId) -> Result<ResultBundle> {
        let job = self.registry.get_job(id).await?;
        if job.status != JobStatus::Completed {
            return Err(PipelineError::NotFound {
                resource: "Result bundle".to_string(),
                id: id.to_string(),
            });
        }

        let transcript: Vec<TranscriptSegment> =
            self.load_stage_output(&job, StageKind::Transcription).await?;
        let detections: Vec<DetectionEvent> =
            self.load_stage_output(&job, StageKind::Detection).await?;
        let merged_timeline: Vec<MergedEntry> =
            self.load_stage_output(&job, StageKind::Merge).await?;
        let summary: SummaryResult =
            self.load_stage_output(&job, StageKind::Summarization).await?;
        let analytics = build_analytics(&transcript, &detections, self.timeline_window_secs);

        Ok(ResultBundle {
            transcript,
            detections,
            merged_timeline,
            summary,
            analytics,
        })
    }

    async fn load_stage_output<T: serde::de::DeserializeOwned>(
        &self,
        job: &Job,
        stage: StageKind,
    ) -> Result<T> {
        let content_ref = job.stage_output(stage).ok_or_else(|| {
            storage_error!(
                "completed job {} carries no {} artifact reference",
                job.id,
                stage
            )
        })?;
        get_json(self.store.as_ref(), content_ref).await
    }
}
