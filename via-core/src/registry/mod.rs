//! Job registry
//!
//! Durable record of job identity, status, timestamps, per-stage results and
//! log lines. All writes for a given job id are serialized through a per-job
//! lock; writers for different jobs proceed independently. The registry is
//! the only component allowed to mutate a [`Job`], and it enforces the state
//! machine: terminal statuses are never overwritten, succeeded stage results
//! are immutable, and a stage result can only be recorded once every
//! predecessor stage has succeeded.
//!
//! [`MemoryJobRegistry`] is the in-process implementation used by tests and
//! embedded deployments; durable backends plug in behind the [`JobRegistry`]
//! trait.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::core::{
    Job, JobError, JobFilter, JobId, JobLogEntry, JobRegistry, JobStatus, LogLevel, PipelineError,
    Result, SourceDescriptor, StageResult, StageStatus,
};

#[derive(Debug)]
struct JobRecord {
    job: Job,
    logs: Vec<JobLogEntry>,
}

/// In-memory job registry
///
/// The outer map lock is held only to look up or insert a job slot; all
/// mutation happens under the slot's own async mutex, giving single-writer
/// semantics per job without serializing unrelated jobs.
#[derive(Debug, Default)]
pub struct MemoryJobRegistry {
    jobs: RwLock<HashMap<JobId, Arc<Mutex<JobRecord>>>>,
}

impl MemoryJobRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: &JobId) -> Result<Arc<Mutex<JobRecord>>> {
        self.jobs
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| PipelineError::NotFound {
                resource: "Job".to_string(),
                id: id.to_string(),
            })
    }
}

#[async_trait]
impl JobRegistry for MemoryJobRegistry {
    async fn create_job(&self, source: &SourceDescriptor) -> Result<Job> {
        let job = Job::new(source.source_type(), source.display_source());
        let record = JobRecord {
            job: job.clone(),
            logs: Vec::new(),
        };
        self.jobs
            .write()
            .insert(job.id.clone(), Arc::new(Mutex::new(record)));
        Ok(job)
    }

    async fn get_job(&self, id: &JobId) -> Result<Job> {
        let slot = self.slot(id)?;
        let record = slot.lock().await;
        Ok(record.job.clone())
    }

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        let slots: Vec<Arc<Mutex<JobRecord>>> = self.jobs.read().values().cloned().collect();
        let snapshots = join_all(slots.iter().map(|slot| async {
            let record = slot.lock().await;
            record.job.clone()
        }))
        .await;
        let mut jobs: Vec<Job> = snapshots
            .into_iter()
            .filter(|job| filter.matches(job))
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    async fn append_stage_result(&self, id: &JobId, result: StageResult) -> Result<()> {
        let slot = self.slot(id)?;
        let mut record = slot.lock().await;

        // Stage order is fixed and total: a record for stage k is only
        // accepted once every predecessor has succeeded.
        for stage in crate::core::StageKind::SEQUENCE {
            if stage == result.stage {
                break;
            }
            let predecessor_ok = record
                .job
                .stage_result(stage)
                .map(|r| r.status == StageStatus::Succeeded)
                .unwrap_or(false);
            if !predecessor_ok {
                return Err(PipelineError::Conflict {
                    message: format!(
                        "cannot record result for stage '{}' of job {id}: predecessor '{}' has not succeeded",
                        result.stage, stage
                    ),
                });
            }
        }

        let target = result.stage;
        let existing = record
            .job
            .stages
            .iter_mut()
            .find(|r| r.stage == target)
            .ok_or_else(|| PipelineError::Conflict {
                message: format!("job {id} carries no record for stage '{target}'"),
            })?;
        if existing.status == StageStatus::Succeeded {
            return Err(PipelineError::Conflict {
                message: format!(
                    "stage '{target}' of job {id} already succeeded; its result is immutable"
                ),
            });
        }
        *existing = result;
        record.job.updated_at = Utc::now();
        Ok(())
    }

    async fn set_status(
        &self,
        id: &JobId,
        status: JobStatus,
        error: Option<JobError>,
    ) -> Result<()> {
        let slot = self.slot(id)?;
        let mut record = slot.lock().await;

        let current = record.job.status;
        if current.is_terminal() {
            return Err(PipelineError::Conflict {
                message: format!("job {id} is already {current}; terminal statuses are immutable"),
            });
        }
        if !current.can_transition_to(status) {
            return Err(PipelineError::Conflict {
                message: format!("illegal status transition {current} -> {status} for job {id}"),
            });
        }
        if status == JobStatus::Failed && error.is_none() {
            return Err(PipelineError::Conflict {
                message: format!("refusing to fail job {id} without an error record"),
            });
        }

        record.job.status = status;
        if let Some(error) = error {
            record.job.error = Some(error);
        }
        record.job.updated_at = Utc::now();
        Ok(())
    }

    async fn append_log(&self, id: &JobId, level: LogLevel, message: &str) -> Result<()> {
        let slot = self.slot(id)?;
        let mut record = slot.lock().await;
        record.logs.push(JobLogEntry {
            timestamp: Utc::now(),
            level,
            message: message.to_string(),
        });
        Ok(())
    }

    async fn list_logs(&self, id: &JobId) -> Result<Vec<JobLogEntry>> {
        let slot = self.slot(id)?;
        let record = slot.lock().await;
        Ok(record.logs.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ArtifactRef, SourceType, StageKind};

    fn upload_descriptor() -> SourceDescriptor {
        SourceDescriptor::Upload {
            file_name: "clip.mp4".to_string(),
            data: b"bytes".to_vec(),
        }
    }

    async fn succeed_stage(registry: &MemoryJobRegistry, id: &JobId, stage: StageKind) {
        registry
            .append_stage_result(
                id,
                StageResult::succeeded(
                    stage,
                    ArtifactRef::from_bytes(stage.name().as_bytes()),
                    Some(Utc::now()),
                    1,
                ),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let registry = MemoryJobRegistry::new();
        let job = registry.create_job(&upload_descriptor()).await.unwrap();
        assert_eq!(job.status, JobStatus::Created);
        assert_eq!(job.source_type, SourceType::Upload);
        assert_eq!(job.source, "clip.mp4");
        assert_eq!(job.stages.len(), StageKind::SEQUENCE.len());

        let fetched = registry.get_job(&job.id).await.unwrap();
        assert_eq!(fetched.id, job.id);
    }

    #[tokio::test]
    async fn test_get_unknown_job() {
        let registry = MemoryJobRegistry::new();
        let err = registry
            .get_job(&JobId::new("missing".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_terminal_status_is_immutable() {
        let registry = MemoryJobRegistry::new();
        let job = registry.create_job(&upload_descriptor()).await.unwrap();
        registry
            .set_status(
                &job.id,
                JobStatus::Failed,
                Some(JobError::new(StageKind::Ingestion, "bad container")),
            )
            .await
            .unwrap();

        let err = registry
            .set_status(&job.id, JobStatus::Ingesting, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_illegal_transition_rejected() {
        let registry = MemoryJobRegistry::new();
        let job = registry.create_job(&upload_descriptor()).await.unwrap();
        // Created -> Detecting skips two states
        let err = registry
            .set_status(&job.id, JobStatus::Detecting, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_failed_requires_error_record() {
        let registry = MemoryJobRegistry::new();
        let job = registry.create_job(&upload_descriptor()).await.unwrap();
        let err = registry
            .set_status(&job.id, JobStatus::Failed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_succeeded_stage_result_is_immutable() {
        let registry = MemoryJobRegistry::new();
        let job = registry.create_job(&upload_descriptor()).await.unwrap();
        succeed_stage(&registry, &job.id, StageKind::Ingestion).await;

        let err = registry
            .append_stage_result(&job.id, StageResult::running(StageKind::Ingestion))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_stage_result_requires_succeeded_predecessor() {
        let registry = MemoryJobRegistry::new();
        let job = registry.create_job(&upload_descriptor()).await.unwrap();

        let err = registry
            .append_stage_result(&job.id, StageResult::running(StageKind::Detection))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Conflict { .. }));

        succeed_stage(&registry, &job.id, StageKind::Ingestion).await;
        succeed_stage(&registry, &job.id, StageKind::Transcription).await;
        registry
            .append_stage_result(&job.id, StageResult::running(StageKind::Detection))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_running_stage_result_may_be_overwritten() {
        let registry = MemoryJobRegistry::new();
        let job = registry.create_job(&upload_descriptor()).await.unwrap();
        registry
            .append_stage_result(&job.id, StageResult::running(StageKind::Ingestion))
            .await
            .unwrap();
        // Crash recovery re-runs the in-flight stage and re-records it.
        registry
            .append_stage_result(&job.id, StageResult::running(StageKind::Ingestion))
            .await
            .unwrap();
        succeed_stage(&registry, &job.id, StageKind::Ingestion).await;
    }

    #[tokio::test]
    async fn test_list_jobs_filters_and_orders() {
        let registry = MemoryJobRegistry::new();
        let a = registry.create_job(&upload_descriptor()).await.unwrap();
        let b = registry
            .create_job(&SourceDescriptor::RemoteUrl {
                url: "https://example.com/v.mp4".to_string(),
            })
            .await
            .unwrap();
        registry
            .set_status(
                &a.id,
                JobStatus::Failed,
                Some(JobError::new(StageKind::Ingestion, "too large")),
            )
            .await
            .unwrap();

        let all = registry.list_jobs(&JobFilter::all()).await.unwrap();
        assert_eq!(all.len(), 2);

        let active = registry.list_jobs(&JobFilter::non_terminal()).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, b.id);

        let uploads = registry
            .list_jobs(&JobFilter {
                source_type: Some(SourceType::Upload),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].id, a.id);
    }

    #[tokio::test]
    async fn test_logs_are_ordered() {
        let registry = MemoryJobRegistry::new();
        let job = registry.create_job(&upload_descriptor()).await.unwrap();
        registry
            .append_log(&job.id, LogLevel::Info, "Pipeline started")
            .await
            .unwrap();
        registry
            .append_log(&job.id, LogLevel::Error, "Pipeline failed: boom")
            .await
            .unwrap();

        let logs = registry.list_logs(&job.id).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].message, "Pipeline started");
        assert_eq!(logs[1].level, LogLevel::Error);
    }

    #[tokio::test]
    async fn test_independent_jobs_write_concurrently() {
        let registry = Arc::new(MemoryJobRegistry::new());
        let a = registry.create_job(&upload_descriptor()).await.unwrap();
        let b = registry.create_job(&upload_descriptor()).await.unwrap();

        let ra = Arc::clone(&registry);
        let ia = a.id.clone();
        let ta = tokio::spawn(async move {
            for i in 0..50 {
                ra.append_log(&ia, LogLevel::Info, &format!("a{i}")).await.unwrap();
            }
        });
        let rb = Arc::clone(&registry);
        let ib = b.id.clone();
        let tb = tokio::spawn(async move {
            for i in 0..50 {
                rb.append_log(&ib, LogLevel::Info, &format!("b{i}")).await.unwrap();
            }
        });
        ta.await.unwrap();
        tb.await.unwrap();

        assert_eq!(registry.list_logs(&a.id).await.unwrap().len(), 50);
        assert_eq!(registry.list_logs(&b.id).await.unwrap().len(), 50);
    }
}
