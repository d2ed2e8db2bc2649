//! The pipeline orchestrator
//!
//! Drives jobs through the stage state machine with a bounded worker pool.
//! The queue carries job ids; a worker runs exactly one stage per dequeue
//! and re-enqueues the job until it reaches a terminal state. Stage
//! execution is wrapped in the configured timeout and retried with
//! exponential backoff on transient errors; retry exhaustion or a permanent
//! error records a structured failure and stops the job, retaining every
//! artifact earlier stages produced.
//!
//! Stage idempotence is a hard requirement here, not an optimisation: crash
//! recovery re-enqueues non-terminal jobs at their current stage, so every
//! stage may run more than once for the same input.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex as SyncMutex;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::analysis::merge_timeline;
use crate::artifact::{get_json, put_json};
use crate::config::PipelineConfig;
use crate::core::{
    ArtifactKind, ArtifactRef, ArtifactStore, DetectionEvent, Job, JobError, JobFilter, JobId,
    JobLogEntry, JobRegistry, JobStatus, LogLevel, MergedEntry, PipelineError, RemoteFetcher,
    Result, SourceDescriptor, SourceType, StageKind, StageResult, TranscriptSegment, VideoInput,
};
use crate::ingest::{HttpFetcher, IngestionAdapter};
use crate::pipeline::{PipelineComponents, PipelineMetrics};
use crate::storage_error;

/// What a worker should do with a job after running one of its stages
enum StageOutcome {
    /// The stage succeeded and a later stage remains
    Advanced,
    /// The job reached a terminal state
    Terminal,
}

struct OrchestratorInner {
    registry: Arc<dyn JobRegistry>,
    store: Arc<dyn ArtifactStore>,
    components: PipelineComponents,
    ingestion: IngestionAdapter,
    config: PipelineConfig,
    queue_tx: mpsc::Sender<JobId>,
    /// Upload payloads held until their ingestion stage succeeds
    pending_uploads: SyncMutex<HashMap<JobId, Vec<u8>>>,
    /// Jobs with an outstanding cancellation request
    cancel_requests: RwLock<HashSet<JobId>>,
    metrics: PipelineMetrics,
}

/// Builder for [`PipelineOrchestrator`]
///
/// Lets tests and embedders swap the analysis backends or the remote
/// fetcher before the worker pool starts.
pub struct OrchestratorBuilder {
    registry: Arc<dyn JobRegistry>,
    store: Arc<dyn ArtifactStore>,
    config: PipelineConfig,
    components: Option<PipelineComponents>,
    fetcher: Option<Arc<dyn RemoteFetcher>>,
}

impl OrchestratorBuilder {
    /// Use explicit backend instances instead of resolving them from
    /// configuration identifiers
    pub fn components(mut self, components: PipelineComponents) -> Self {
        self.components = Some(components);
        self
    }

    /// Use a custom remote fetcher for URL ingestion
    pub fn fetcher(mut self, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Validate the configuration, resolve the backends, and start the
    /// worker pool
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<PipelineOrchestrator> {
        self.config.validate()?;
        let components = match self.components {
            Some(components) => components,
            None => PipelineComponents::from_config(&self.config.backends)?,
        };
        let fetcher: Arc<dyn RemoteFetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::new(Duration::from_secs(
                self.config.stage.timeout_secs,
            ))?),
        };

        let (queue_tx, queue_rx) = mpsc::channel(self.config.queue_capacity);
        let ingestion = IngestionAdapter::new(Arc::clone(&self.store), fetcher, &self.config);
        let inner = Arc::new(OrchestratorInner {
            registry: self.registry,
            store: self.store,
            components,
            ingestion,
            config: self.config,
            queue_tx,
            pending_uploads: SyncMutex::new(HashMap::new()),
            cancel_requests: RwLock::new(HashSet::new()),
            metrics: PipelineMetrics::new(),
        });

        let shutdown = CancellationToken::new();
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let mut workers = Vec::with_capacity(inner.config.worker_pool_size);
        for worker_id in 0..inner.config.worker_pool_size {
            workers.push(tokio::spawn(worker_loop(
                Arc::clone(&inner),
                Arc::clone(&queue_rx),
                shutdown.clone(),
                worker_id,
            )));
        }
        info!(
            workers = inner.config.worker_pool_size,
            queue_capacity = inner.config.queue_capacity,
            "Pipeline orchestrator started"
        );

        Ok(PipelineOrchestrator {
            inner,
            workers: SyncMutex::new(workers),
            shutdown,
        })
    }
}

/// Orchestrates jobs through the analysis pipeline
///
/// See the [module documentation](crate::pipeline) for the execution model.
pub struct PipelineOrchestrator {
    inner: Arc<OrchestratorInner>,
    workers: SyncMutex<Vec<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl PipelineOrchestrator {
    /// Start building an orchestrator over the given registry and store
    pub fn builder(
        registry: Arc<dyn JobRegistry>,
        store: Arc<dyn ArtifactStore>,
        config: PipelineConfig,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder {
            registry,
            store,
            config,
            components: None,
            fetcher: None,
        }
    }

    /// Build an orchestrator with backends resolved from configuration
    pub fn new(
        registry: Arc<dyn JobRegistry>,
        store: Arc<dyn ArtifactStore>,
        config: PipelineConfig,
    ) -> Result<Self> {
        Self::builder(registry, store, config).build()
    }

    /// Create a job for the given source and enqueue its first stage
    ///
    /// Waits when the work queue is full, which is the orchestrator's
    /// backpressure signal to the caller.
    pub async fn submit(&self, source: SourceDescriptor) -> Result<Job> {
        if matches!(source, SourceDescriptor::RemoteUrl { .. })
            && !self.inner.config.ingest.allow_remote_urls
        {
            return Err(PipelineError::Ingestion {
                message: "remote URL ingestion is disabled".to_string(),
                transient: false,
            });
        }

        let job = self.inner.registry.create_job(&source).await?;
        self.inner
            .registry
            .append_log(
                &job.id,
                LogLevel::Info,
                &format!("Job created for {}", source.source_type()),
            )
            .await?;
        if let SourceDescriptor::Upload { data, .. } = source {
            self.inner
                .pending_uploads
                .lock()
                .insert(job.id.clone(), data);
        }
        self.inner.metrics.increment_jobs_submitted();
        self.inner
            .queue_tx
            .send(job.id.clone())
            .await
            .map_err(|_| PipelineError::Conflict {
                message: "orchestrator is shut down".to_string(),
            })?;
        info!(job_id = %job.id, source_type = %job.source_type, "Job submitted");
        Ok(job)
    }

    /// Create a job from uploaded bytes
    pub async fn submit_upload(&self, file_name: &str, data: Vec<u8>) -> Result<Job> {
        self.submit(SourceDescriptor::Upload {
            file_name: file_name.to_string(),
            data,
        })
        .await
    }

    /// Create a job from a remote URL
    pub async fn submit_remote_url(&self, url: &str) -> Result<Job> {
        self.submit(SourceDescriptor::RemoteUrl {
            url: url.to_string(),
        })
        .await
    }

    /// Request cooperative cancellation of a job
    ///
    /// The flag is checked between stages; an in-flight stage call finishes
    /// before cancellation takes effect. Fails with `Conflict` when
    /// cancellation is disabled by configuration or the job is already
    /// terminal.
    pub async fn cancel_job(&self, id: &JobId) -> Result<()> {
        if !self.inner.config.enable_cancellation {
            return Err(PipelineError::Conflict {
                message: "cancellation is disabled by configuration".to_string(),
            });
        }
        let job = self.inner.registry.get_job(id).await?;
        if job.status.is_terminal() {
            return Err(PipelineError::Conflict {
                message: format!("job {id} is already {}", job.status),
            });
        }
        self.inner.cancel_requests.write().insert(id.clone());
        self.inner
            .registry
            .append_log(id, LogLevel::Info, "Cancellation requested")
            .await?;
        info!(job_id = %id, "Cancellation requested");
        Ok(())
    }

    /// Re-enqueue every non-terminal job at its current stage
    ///
    /// Called once after construction when the registry may hold jobs from a
    /// previous process. Upload jobs whose payload never reached the
    /// artifact store cannot be resumed (the bytes lived only in the dead
    /// process) and are failed with an ingestion error instead.
    ///
    /// Returns the number of jobs re-enqueued.
    pub async fn recover(&self) -> Result<usize> {
        let jobs = self
            .inner
            .registry
            .list_jobs(&JobFilter::non_terminal())
            .await?;
        let mut requeued = 0;
        for job in jobs {
            let ingestion_pending = job.next_stage() == Some(StageKind::Ingestion);
            let payload_available = self.inner.pending_uploads.lock().contains_key(&job.id);
            if job.source_type == SourceType::Upload && ingestion_pending && !payload_available {
                let message = "upload payload lost before ingestion; resubmit the file";
                self.inner
                    .registry
                    .append_stage_result(
                        &job.id,
                        StageResult::failed(StageKind::Ingestion, message.to_string(), None, 0),
                    )
                    .await?;
                self.inner
                    .registry
                    .set_status(
                        &job.id,
                        JobStatus::Failed,
                        Some(JobError::new(StageKind::Ingestion, message)),
                    )
                    .await?;
                self.inner
                    .registry
                    .append_log(&job.id, LogLevel::Error, message)
                    .await?;
                self.inner.metrics.increment_jobs_failed();
                warn!(job_id = %job.id, "Upload job not recoverable, marked failed");
                continue;
            }
            self.inner
                .queue_tx
                .send(job.id.clone())
                .await
                .map_err(|_| PipelineError::Conflict {
                    message: "orchestrator is shut down".to_string(),
                })?;
            requeued += 1;
        }
        info!(requeued, "Recovery scan complete");
        Ok(requeued)
    }

    /// Fetch a job by id
    pub async fn get_job(&self, id: &JobId) -> Result<Job> {
        self.inner.registry.get_job(id).await
    }

    /// List jobs matching `filter`, newest first
    pub async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        self.inner.registry.list_jobs(filter).await
    }

    /// Fetch a job's log lines, oldest first
    pub async fn job_logs(&self, id: &JobId) -> Result<Vec<JobLogEntry>> {
        self.inner.registry.list_logs(id).await
    }

    /// The orchestrator's metrics collector
    pub fn metrics(&self) -> &PipelineMetrics {
        &self.inner.metrics
    }

    /// Stop the worker pool gracefully
    ///
    /// In-flight stage executions finish; queued work stays in the registry
    /// for a later `recover()`.
    pub async fn shutdown(&self) {
        info!("Shutting down pipeline orchestrator");
        self.shutdown.cancel();
        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock();
            workers.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
        info!("Pipeline orchestrator shutdown complete");
    }
}

async fn worker_loop(
    inner: Arc<OrchestratorInner>,
    queue_rx: Arc<Mutex<mpsc::Receiver<JobId>>>,
    shutdown: CancellationToken,
    worker_id: usize,
) {
    loop {
        let job_id = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = async {
                let mut rx = queue_rx.lock().await;
                rx.recv().await
            } => match received {
                Some(id) => id,
                None => break,
            },
        };

        // Run one stage; on success hand the job back to the queue so other
        // jobs interleave. If the queue has no room right now, keep working
        // the same job inline rather than blocking a consumer on a send.
        let mut current = Some(job_id);
        while let Some(id) = current.take() {
            if shutdown.is_cancelled() {
                break;
            }
            match run_one_stage(&inner, &id).await {
                Ok(StageOutcome::Terminal) => {},
                Ok(StageOutcome::Advanced) => match inner.queue_tx.try_send(id.clone()) {
                    Ok(()) => {},
                    Err(_) => current = Some(id),
                },
                Err(err) => {
                    error!(
                        worker_id,
                        job_id = %id,
                        category = err.category(),
                        error = %err,
                        "Stage bookkeeping failed"
                    );
                },
            }
        }
    }
}

fn stage_start_message(stage: StageKind) -> &'static str {
    match stage {
        StageKind::Ingestion => "Fetching source video",
        StageKind::Transcription => "Running speech transcription",
        StageKind::Detection => "Running object detection",
        StageKind::Merge => "Merging transcript and detection timeline",
        StageKind::Summarization => "Generating summary",
    }
}

async fn run_one_stage(inner: &Arc<OrchestratorInner>, id: &JobId) -> Result<StageOutcome> {
    let job = inner.registry.get_job(id).await?;
    if job.status.is_terminal() {
        return Ok(StageOutcome::Terminal);
    }

    if inner.config.enable_cancellation && inner.cancel_requests.read().contains(id) {
        inner
            .registry
            .set_status(id, JobStatus::Cancelled, None)
            .await?;
        inner
            .registry
            .append_log(id, LogLevel::Info, "Job cancelled")
            .await?;
        inner.metrics.increment_jobs_cancelled();
        cleanup_job_state(inner, id);
        info!(job_id = %id, "Job cancelled");
        return Ok(StageOutcome::Terminal);
    }

    let Some(stage) = job.next_stage() else {
        // Recovery edge: every stage already succeeded but the terminal
        // transition was never recorded.
        finish_completed(inner, id).await?;
        return Ok(StageOutcome::Terminal);
    };

    inner
        .registry
        .set_status(id, stage.running_status(), None)
        .await?;
    inner
        .registry
        .append_log(id, LogLevel::Info, stage_start_message(stage))
        .await?;
    inner
        .registry
        .append_stage_result(id, StageResult::running(stage))
        .await?;
    let started_at = Utc::now();
    let started = Instant::now();
    info!(job_id = %id, stage = stage.name(), "Stage started");

    let (outcome, attempts) = execute_with_retry(inner, &job, stage).await;
    match outcome {
        Ok(output) => {
            inner
                .registry
                .append_stage_result(
                    id,
                    StageResult::succeeded(stage, output, Some(started_at), attempts),
                )
                .await?;
            inner.metrics.record_stage_duration(started.elapsed());
            info!(
                job_id = %id,
                stage = stage.name(),
                attempts,
                duration_ms = started.elapsed().as_millis() as u64,
                "Stage succeeded"
            );
            if stage == StageKind::Ingestion {
                // The raw artifact is durable now; the buffered upload can go.
                inner.pending_uploads.lock().remove(id);
            }
            if stage == StageKind::Summarization {
                finish_completed(inner, id).await?;
                return Ok(StageOutcome::Terminal);
            }
            Ok(StageOutcome::Advanced)
        },
        Err(err) => {
            let message = err.to_string();
            inner
                .registry
                .append_stage_result(
                    id,
                    StageResult::failed(stage, message.clone(), Some(started_at), attempts),
                )
                .await?;
            inner
                .registry
                .set_status(
                    id,
                    JobStatus::Failed,
                    Some(JobError::new(stage, message.clone())),
                )
                .await?;
            inner
                .registry
                .append_log(id, LogLevel::Error, &format!("Pipeline failed: {message}"))
                .await?;
            inner.metrics.increment_jobs_failed();
            cleanup_job_state(inner, id);
            error!(
                job_id = %id,
                stage = stage.name(),
                attempts,
                category = err.category(),
                error = %message,
                "Stage failed, job marked failed"
            );
            Ok(StageOutcome::Terminal)
        },
    }
}

async fn finish_completed(inner: &Arc<OrchestratorInner>, id: &JobId) -> Result<()> {
    inner
        .registry
        .set_status(id, JobStatus::Completed, None)
        .await?;
    inner
        .registry
        .append_log(id, LogLevel::Info, "Pipeline completed successfully")
        .await?;
    inner.metrics.increment_jobs_completed();
    cleanup_job_state(inner, id);
    info!(job_id = %id, "Pipeline completed");
    Ok(())
}

fn cleanup_job_state(inner: &Arc<OrchestratorInner>, id: &JobId) {
    inner.pending_uploads.lock().remove(id);
    inner.cancel_requests.write().remove(id);
}

/// Run one stage under the timeout/retry policy
///
/// Returns the outcome together with the number of attempts made.
async fn execute_with_retry(
    inner: &Arc<OrchestratorInner>,
    job: &Job,
    stage: StageKind,
) -> (Result<ArtifactRef>, u32) {
    let policy = &inner.config.stage;
    let mut attempt: u32 = 1;
    loop {
        let outcome = tokio::time::timeout(policy.timeout(), execute_stage(inner, job, stage)).await;
        let err = match outcome {
            Ok(Ok(output)) => return (Ok(output), attempt),
            Ok(Err(err)) => err,
            Err(_) => {
                inner.metrics.increment_stage_timeouts();
                PipelineError::Timeout {
                    operation: stage.name().to_string(),
                    duration: policy.timeout(),
                }
            },
        };

        if err.is_transient() && attempt < policy.max_attempts {
            inner.metrics.increment_stage_retries();
            let delay = policy.backoff_delay(attempt);
            warn!(
                job_id = %job.id,
                stage = stage.name(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient stage failure, backing off"
            );
            let _ = inner
                .registry
                .append_log(
                    &job.id,
                    LogLevel::Warning,
                    &format!("Stage {stage} attempt {attempt} failed: {err}; retrying"),
                )
                .await;
            tokio::time::sleep(delay).await;
            attempt += 1;
            continue;
        }
        return (Err(err), attempt);
    }
}

/// Execute one stage against its recorded input artifacts
///
/// Pure with respect to the job's earlier stage outputs: re-running a stage
/// with the same inputs stores the same artifact under the same reference.
async fn execute_stage(
    inner: &Arc<OrchestratorInner>,
    job: &Job,
    stage: StageKind,
) -> Result<ArtifactRef> {
    match stage {
        StageKind::Ingestion => {
            let descriptor = resolve_source(inner, job)?;
            let artifact = inner.ingestion.fetch_source(&job.id, &descriptor).await?;
            Ok(artifact.content_ref)
        },
        StageKind::Transcription => {
            let video = load_video(inner, job).await?;
            let segments = inner.components.transcriber.transcribe(&video).await?;
            let artifact =
                put_json(inner.store.as_ref(), &job.id, ArtifactKind::Transcript, &segments)
                    .await?;
            Ok(artifact.content_ref)
        },
        StageKind::Detection => {
            let video = load_video(inner, job).await?;
            let events = inner.components.detector.detect(&video).await?;
            let artifact =
                put_json(inner.store.as_ref(), &job.id, ArtifactKind::Detections, &events).await?;
            Ok(artifact.content_ref)
        },
        StageKind::Merge => {
            let transcript: Vec<TranscriptSegment> =
                load_stage_json(inner, job, StageKind::Transcription).await?;
            let detections: Vec<DetectionEvent> =
                load_stage_json(inner, job, StageKind::Detection).await?;
            let timeline = merge_timeline(&transcript, &detections);
            let artifact = put_json(
                inner.store.as_ref(),
                &job.id,
                ArtifactKind::MergedTimeline,
                &timeline,
            )
            .await?;
            Ok(artifact.content_ref)
        },
        StageKind::Summarization => {
            let timeline: Vec<MergedEntry> = load_stage_json(inner, job, StageKind::Merge).await?;
            let summary = inner.components.summarizer.summarize(&timeline).await?;
            let artifact =
                put_json(inner.store.as_ref(), &job.id, ArtifactKind::Summary, &summary).await?;
            Ok(artifact.content_ref)
        },
    }
}

fn resolve_source(inner: &Arc<OrchestratorInner>, job: &Job) -> Result<SourceDescriptor> {
    match job.source_type {
        SourceType::RemoteUrl => Ok(SourceDescriptor::RemoteUrl {
            url: job.source.clone(),
        }),
        SourceType::Upload => inner
            .pending_uploads
            .lock()
            .get(&job.id)
            .cloned()
            .map(|data| SourceDescriptor::Upload {
                file_name: job.source.clone(),
                data,
            })
            .ok_or_else(|| PipelineError::Ingestion {
                message: "upload payload is no longer available".to_string(),
                transient: false,
            }),
    }
}

async fn load_video(inner: &Arc<OrchestratorInner>, job: &Job) -> Result<VideoInput> {
    let content_ref = job
        .stage_output(StageKind::Ingestion)
        .ok_or_else(|| storage_error!("job {} has no raw video artifact recorded", job.id))?;
    let artifacts = inner.store.list(&job.id).await?;
    let artifact = artifacts
        .into_iter()
        .find(|a| a.kind == ArtifactKind::RawVideo && &a.content_ref == content_ref)
        .ok_or_else(|| PipelineError::NotFound {
            resource: "Artifact".to_string(),
            id: content_ref.to_string(),
        })?;
    let data = inner.store.get(content_ref).await?;
    Ok(VideoInput { artifact, data })
}

async fn load_stage_json<T: serde::de::DeserializeOwned>(
    inner: &Arc<OrchestratorInner>,
    job: &Job,
    stage: StageKind,
) -> Result<T> {
    let content_ref = job
        .stage_output(stage)
        .ok_or_else(|| storage_error!("job {} has no {} artifact recorded", job.id, stage))?;
    get_json(inner.store.as_ref(), content_ref).await
}
