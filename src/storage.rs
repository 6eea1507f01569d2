//! Artifact persistence seam
//!
//! The pipeline hands the encoded PNG to an [`ArtifactStore`] exactly once
//! per successful run and treats the returned [`StoredArtifact`] as opaque.
//! Deployments implement the trait over their object storage;
//! [`FsArtifactStore`] covers local runs, and [`MemoryArtifactStore`] lets
//! tests observe store calls.

use crate::config::OutputMode;
use crate::error::MatteError;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Mutex;
use uuid::Uuid;

/// Fixed category tag passed on every store call
pub const ARTIFACT_CATEGORY: &str = "background-removal";

/// Content type of every artifact this core produces
pub const ARTIFACT_CONTENT_TYPE: &str = "image/png";

/// Opaque reference to a persisted artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    /// Public URL of the artifact
    pub url: String,
    /// Storage-internal path
    pub path: String,
    /// The file name the artifact was stored under
    pub file_name: String,
}

/// External persistence collaborator
#[async_trait::async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist one encoded artifact
    ///
    /// # Errors
    ///
    /// Returns `MatteError::Storage` when the artifact cannot be persisted.
    /// Failures surface to the caller unretried.
    async fn store(
        &self,
        bytes: &[u8],
        owner_id: &str,
        category: &str,
        file_name: &str,
        content_type: &str,
    ) -> Result<StoredArtifact, MatteError>;
}

/// Generate a collision-resistant artifact file name
///
/// Incorporates a UTC timestamp and the output mode; the uuid suffix keeps
/// names unique within the same millisecond.
#[must_use]
pub fn artifact_file_name(mode: OutputMode) -> String {
    let timestamp = Utc::now().format("%Y%m%dT%H%M%S%3fZ");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("matte-{timestamp}-{}-{}.png", mode.tag(), &suffix[..8])
}

/// Disk-backed store for local deployments
#[derive(Debug)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Store artifacts under `root/{owner}/{category}/{file_name}`
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait::async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn store(
        &self,
        bytes: &[u8],
        owner_id: &str,
        category: &str,
        file_name: &str,
        _content_type: &str,
    ) -> Result<StoredArtifact, MatteError> {
        let dir = self.root.join(owner_id).join(category);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            MatteError::storage(format!("failed to create {}: {e}", dir.display()))
        })?;

        let path = dir.join(file_name);
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            MatteError::storage(format!("failed to write {}: {e}", path.display()))
        })?;

        log::debug!("Stored artifact at {} ({} bytes)", path.display(), bytes.len());
        Ok(StoredArtifact {
            url: format!("file://{}", path.display()),
            path: path.display().to_string(),
            file_name: file_name.to_string(),
        })
    }
}

/// One recorded store call
#[derive(Debug, Clone)]
pub struct StoreCall {
    pub owner_id: String,
    pub category: String,
    pub file_name: String,
    pub content_type: String,
    pub byte_len: usize,
}

/// In-memory store that records every call, for tests
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    calls: Mutex<Vec<StoreCall>>,
    fail: bool,
}

impl MemoryArtifactStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every store call fail
    #[must_use]
    pub fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// Number of store calls so far
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }

    /// Snapshot of every recorded call
    #[must_use]
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn store(
        &self,
        bytes: &[u8],
        owner_id: &str,
        category: &str,
        file_name: &str,
        content_type: &str,
    ) -> Result<StoredArtifact, MatteError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(StoreCall {
                owner_id: owner_id.to_string(),
                category: category.to_string(),
                file_name: file_name.to_string(),
                content_type: content_type.to_string(),
                byte_len: bytes.len(),
            });
        }

        if self.fail {
            return Err(MatteError::storage("memory store configured to fail"));
        }

        Ok(StoredArtifact {
            url: format!("memory://{owner_id}/{category}/{file_name}"),
            path: format!("{owner_id}/{category}/{file_name}"),
            file_name: file_name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_incorporates_timestamp_and_mode() {
        let name = artifact_file_name(OutputMode::Background);
        assert!(name.starts_with("matte-"));
        assert!(name.contains("-background-"));
        assert!(name.ends_with(".png"));
    }

    #[test]
    fn test_file_names_are_unique() {
        let a = artifact_file_name(OutputMode::Foreground);
        let b = artifact_file_name(OutputMode::Foreground);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_fs_store_writes_artifact() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FsArtifactStore::new(dir.path().to_path_buf());

        let artifact = store
            .store(b"png-bytes", "user-1", ARTIFACT_CATEGORY, "out.png", ARTIFACT_CONTENT_TYPE)
            .await
            .unwrap();

        assert!(artifact.url.starts_with("file://"));
        assert_eq!(artifact.file_name, "out.png");
        let on_disk = dir.path().join("user-1").join(ARTIFACT_CATEGORY).join("out.png");
        assert_eq!(std::fs::read(on_disk).unwrap(), b"png-bytes");
    }

    #[tokio::test]
    async fn test_memory_store_records_calls() {
        let store = MemoryArtifactStore::new();
        store
            .store(b"abc", "owner", "cat", "f.png", "image/png")
            .await
            .unwrap();

        assert_eq!(store.call_count(), 1);
        let calls = store.calls();
        assert_eq!(calls[0].owner_id, "owner");
        assert_eq!(calls[0].byte_len, 3);
    }

    #[tokio::test]
    async fn test_failing_store_still_records() {
        let store = MemoryArtifactStore::failing();
        let err = store
            .store(b"abc", "owner", "cat", "f.png", "image/png")
            .await
            .unwrap_err();
        assert!(matches!(err, MatteError::Storage(_)));
        assert_eq!(store.call_count(), 1);
    }
}
