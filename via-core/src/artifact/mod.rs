//! Content-addressed artifact storage
//!
//! Every byte payload a stage produces is stored under the SHA-256 digest of
//! its content. Identical bytes resolve to the same reference without being
//! rewritten, which makes writes idempotent and safe under concurrent access
//! — the property crash recovery's at-least-once stage execution leans on.
//!
//! ## Backends
//!
//! - [`MemoryArtifactStore`] — in-memory storage for tests and embedding
//! - [`FsArtifactStore`] — filesystem storage with two-level hex sharding

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::core::{Artifact, ArtifactKind, ArtifactRef, ArtifactStore, JobId, Result};
use crate::storage_error;

/// In-memory artifact store for tests and embedded use
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    objects: RwLock<HashMap<ArtifactRef, Vec<u8>>>,
    index: RwLock<HashMap<JobId, Vec<Artifact>>>,
}

impl MemoryArtifactStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct payloads held
    pub fn object_count(&self) -> usize {
        self.objects.read().len()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(&self, job_id: &JobId, kind: ArtifactKind, bytes: &[u8]) -> Result<Artifact> {
        let content_ref = ArtifactRef::from_bytes(bytes);

        {
            let mut objects = self.objects.write();
            objects
                .entry(content_ref.clone())
                .or_insert_with(|| bytes.to_vec());
        }

        let mut index = self.index.write();
        let records = index.entry(job_id.clone()).or_default();
        if let Some(existing) = records
            .iter()
            .find(|a| a.kind == kind && a.content_ref == content_ref)
        {
            return Ok(existing.clone());
        }
        let artifact = Artifact {
            job_id: job_id.clone(),
            kind,
            content_ref,
            size_bytes: bytes.len() as u64,
            created_at: Utc::now(),
        };
        records.push(artifact.clone());
        Ok(artifact)
    }

    async fn get(&self, content_ref: &ArtifactRef) -> Result<Vec<u8>> {
        self.objects
            .read()
            .get(content_ref)
            .cloned()
            .ok_or_else(|| crate::PipelineError::NotFound {
                resource: "Artifact".to_string(),
                id: content_ref.to_string(),
            })
    }

    async fn list(&self, job_id: &JobId) -> Result<Vec<Artifact>> {
        Ok(self.index.read().get(job_id).cloned().unwrap_or_default())
    }
}

/// Filesystem-backed artifact store
///
/// Layout under the root directory:
///
/// ```text
/// objects/ab/abcdef...   # payloads, sharded by the first two hex chars
/// jobs/<job_id>.json     # per-job artifact records
/// ```
///
/// Payload writes go through a temp file followed by an atomic rename, so a
/// crashed writer never leaves a partial object behind and two concurrent
/// writers of the same content cannot clobber each other.
#[derive(Debug)]
pub struct FsArtifactStore {
    root: PathBuf,
    /// Serializes read-modify-write cycles on the per-job index files
    index_lock: tokio::sync::Mutex<()>,
}

impl FsArtifactStore {
    /// Open (or initialize) a store rooted at `root`
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(root.join("objects"))
            .await
            .map_err(|e| storage_error!("cannot create object directory: {e}"))?;
        tokio::fs::create_dir_all(root.join("jobs"))
            .await
            .map_err(|e| storage_error!("cannot create job index directory: {e}"))?;
        Ok(Self {
            root,
            index_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn object_path(&self, content_ref: &ArtifactRef) -> PathBuf {
        let hex = &content_ref.0;
        let shard = &hex[..2.min(hex.len())];
        self.root.join("objects").join(shard).join(hex)
    }

    fn index_path(&self, job_id: &JobId) -> PathBuf {
        self.root.join("jobs").join(format!("{job_id}.json"))
    }

    async fn read_index(&self, path: &Path) -> Result<Vec<Artifact>> {
        match tokio::fs::read(path).await {
            Ok(raw) => serde_json::from_slice(&raw)
                .map_err(|e| storage_error!("corrupt artifact index {}: {e}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(storage_error!("cannot read artifact index: {e}")),
        }
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, job_id: &JobId, kind: ArtifactKind, bytes: &[u8]) -> Result<Artifact> {
        let content_ref = ArtifactRef::from_bytes(bytes);
        let object_path = self.object_path(&content_ref);

        if tokio::fs::try_exists(&object_path)
            .await
            .map_err(|e| storage_error!("cannot probe object file: {e}"))?
        {
            // Identical content already stored; nothing to rewrite.
        } else {
            let parent = object_path
                .parent()
                .ok_or_else(|| storage_error!("object path has no parent directory"))?;
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_error!("cannot create object shard: {e}"))?;
            let tmp_path = parent.join(format!(".{}.tmp-{}", content_ref, std::process::id()));
            tokio::fs::write(&tmp_path, bytes)
                .await
                .map_err(|e| storage_error!("cannot write object payload: {e}"))?;
            tokio::fs::rename(&tmp_path, &object_path)
                .await
                .map_err(|e| storage_error!("cannot commit object payload: {e}"))?;
        }

        let _guard = self.index_lock.lock().await;
        let index_path = self.index_path(job_id);
        let mut records = self.read_index(&index_path).await?;
        if let Some(existing) = records
            .iter()
            .find(|a| a.kind == kind && a.content_ref == content_ref)
        {
            return Ok(existing.clone());
        }
        let artifact = Artifact {
            job_id: job_id.clone(),
            kind,
            content_ref,
            size_bytes: bytes.len() as u64,
            created_at: Utc::now(),
        };
        records.push(artifact.clone());
        let encoded = serde_json::to_vec_pretty(&records)?;
        tokio::fs::write(&index_path, encoded)
            .await
            .map_err(|e| storage_error!("cannot write artifact index: {e}"))?;
        Ok(artifact)
    }

    async fn get(&self, content_ref: &ArtifactRef) -> Result<Vec<u8>> {
        match tokio::fs::read(self.object_path(content_ref)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(crate::PipelineError::NotFound {
                    resource: "Artifact".to_string(),
                    id: content_ref.to_string(),
                })
            },
            Err(e) => Err(storage_error!("cannot read object payload: {e}")),
        }
    }

    async fn list(&self, job_id: &JobId) -> Result<Vec<Artifact>> {
        let _guard = self.index_lock.lock().await;
        self.read_index(&self.index_path(job_id)).await
    }
}

/// Store a serde-encodable payload as a JSON artifact
pub async fn put_json<T: serde::Serialize>(
    store: &dyn ArtifactStore,
    job_id: &JobId,
    kind: ArtifactKind,
    payload: &T,
) -> Result<Artifact> {
    let bytes = serde_json::to_vec(payload)?;
    store.put(job_id, kind, &bytes).await
}

/// Fetch and decode a JSON artifact payload
pub async fn get_json<T: serde::de::DeserializeOwned>(
    store: &dyn ArtifactStore,
    content_ref: &ArtifactRef,
) -> Result<T> {
    let bytes = store.get(content_ref).await?;
    serde_json::from_slice(&bytes).map_err(|e| crate::PipelineError::Serialization {
        message: format!("artifact {content_ref} does not decode: {e}"),
    })
}

/// Convenience alias for a shared store handle
pub type SharedArtifactStore = Arc<dyn ArtifactStore>;

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> JobId {
        JobId::new("job-artifacts".to_string())
    }

    #[tokio::test]
    async fn test_memory_put_is_content_addressed() {
        let store = MemoryArtifactStore::new();
        let a = store.put(&job(), ArtifactKind::Transcript, b"payload").await.unwrap();
        let b = store.put(&job(), ArtifactKind::Transcript, b"payload").await.unwrap();
        assert_eq!(a.content_ref, b.content_ref);
        assert_eq!(store.object_count(), 1);

        let bytes = store.get(&a.content_ref).await.unwrap();
        assert_eq!(bytes, b"payload");
    }

    #[tokio::test]
    async fn test_memory_get_unknown_ref() {
        let store = MemoryArtifactStore::new();
        let missing = ArtifactRef::from_bytes(b"never stored");
        let err = store.get(&missing).await.unwrap_err();
        assert!(matches!(err, crate::PipelineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_memory_list_is_scoped_to_job() {
        let store = MemoryArtifactStore::new();
        let other = JobId::new("job-other".to_string());
        store.put(&job(), ArtifactKind::RawVideo, b"video").await.unwrap();
        store.put(&other, ArtifactKind::RawVideo, b"video").await.unwrap();
        store.put(&job(), ArtifactKind::Transcript, b"words").await.unwrap();

        let mine = store.list(&job()).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|a| a.job_id == job()));
        // Identical bytes across jobs share one object
        assert_eq!(store.object_count(), 2);
    }

    #[tokio::test]
    async fn test_fs_store_roundtrip_and_dedup() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::open(dir.path()).await.unwrap();

        let a = store.put(&job(), ArtifactKind::RawVideo, b"the video bytes").await.unwrap();
        let b = store.put(&job(), ArtifactKind::RawVideo, b"the video bytes").await.unwrap();
        assert_eq!(a.content_ref, b.content_ref);

        let bytes = store.get(&a.content_ref).await.unwrap();
        assert_eq!(bytes, b"the video bytes");

        let listed = store.list(&job()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].size_bytes, 15);
    }

    #[tokio::test]
    async fn test_fs_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let content_ref = {
            let store = FsArtifactStore::open(dir.path()).await.unwrap();
            store
                .put(&job(), ArtifactKind::Summary, b"{\"text\":\"done\"}")
                .await
                .unwrap()
                .content_ref
        };

        let reopened = FsArtifactStore::open(dir.path()).await.unwrap();
        let bytes = reopened.get(&content_ref).await.unwrap();
        assert_eq!(bytes, b"{\"text\":\"done\"}");
        assert_eq!(reopened.list(&job()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_json_helpers_roundtrip() {
        let store = MemoryArtifactStore::new();
        let payload = vec!["one".to_string(), "two".to_string()];
        let artifact = put_json(&store, &job(), ArtifactKind::Transcript, &payload)
            .await
            .unwrap();
        let back: Vec<String> = get_json(&store, &artifact.content_ref).await.unwrap();
        assert_eq!(back, payload);
    }
}
