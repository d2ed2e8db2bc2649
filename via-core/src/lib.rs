//! # VIA Core
//!
//! Core library of the Video Intelligence Analyzer: the job state machine,
//! stage sequencing, retry/idempotence discipline, artifact lifecycle, and
//! the pluggable-backend contracts for the analysis stages.
//!
//! A job moves through a fixed pipeline — ingestion, transcription,
//! detection, timeline merge, summarization — persisting a content-addressed
//! artifact after every stage. The orchestrator owns a bounded worker pool,
//! retries transient failures with backoff, enforces per-stage timeouts, and
//! recovers non-terminal jobs after a restart. The HTTP surface, schema
//! validation and durable persistence backends live outside this crate,
//! behind the [`core::JobRegistry`] and [`core::ArtifactStore`] traits.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use via_core::{
//!     artifact::MemoryArtifactStore, config::PipelineConfig,
//!     pipeline::PipelineOrchestrator, registry::MemoryJobRegistry,
//! };
//!
//! # async fn example() -> via_core::Result<()> {
//! let registry = Arc::new(MemoryJobRegistry::new());
//! let store = Arc::new(MemoryArtifactStore::new());
//! let orchestrator =
//!     PipelineOrchestrator::new(registry, store, PipelineConfig::default())?;
//!
//! let job = orchestrator.submit_upload("clip.mp4", video_bytes).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// ================================
// MODULE DECLARATIONS
// ================================

/// Analysis building blocks: merge contract, analytics, summarizers
pub mod analysis;
/// Content-addressed artifact storage
pub mod artifact;
/// Configuration management and validation
pub mod config;
/// Core types, traits and error handling
pub mod core;
/// Source acquisition (uploads and remote URLs)
pub mod ingest;
/// Orchestration: worker pool, state machine, result assembly
pub mod pipeline;
/// Job registry implementations
pub mod registry;

// Re-export the items nearly every consumer touches
pub use crate::core::error::{ErrorContext, PipelineError, Result};
pub use crate::core::{
    Artifact, ArtifactKind, ArtifactRef, Job, JobError, JobFilter, JobId, JobStatus,
    SourceDescriptor, SourceType, StageKind, StageResult, StageStatus,
};
pub use config::PipelineConfig;
pub use pipeline::{PipelineComponents, PipelineOrchestrator, ResultAssembler, ResultBundle};
