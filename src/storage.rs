//! # Media Artifact Storage
//!
//! Filesystem-backed store for the byte artifacts a transaction produces:
//! uploaded audio (required), uploaded image (optional), the synthesized
//! response, and persisted chat logs. Each kind lives in its own folder under
//! the uploads root.
//!
//! Artifact names embed a unix timestamp plus a process-monotonic counter, so
//! two identical transactions running at the same instant still land in
//! distinct files — directories are append-only by filename uniqueness and
//! need no write locking.

use crate::error::ExchangeError;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// The artifact families the store manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Audio,
    Image,
    Response,
    ChatLog,
}

impl ArtifactKind {
    pub fn dir_name(&self) -> &'static str {
        match self {
            ArtifactKind::Audio => "audio",
            ArtifactKind::Image => "images",
            ArtifactKind::Response => "response",
            ArtifactKind::ChatLog => "chats",
        }
    }

    pub fn file_prefix(&self) -> &'static str {
        match self {
            ArtifactKind::Audio => "audio",
            ArtifactKind::Image => "image",
            ArtifactKind::Response => "response",
            ArtifactKind::ChatLog => "chat",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Audio | ArtifactKind::Response => "wav",
            ArtifactKind::Image => "jpg",
            ArtifactKind::ChatLog => "json",
        }
    }
}

/// Filesystem store rooted at the configured uploads directory.
pub struct MediaStore {
    root: PathBuf,
    counter: AtomicU64,
}

impl MediaStore {
    /// Create the store and ensure every artifact folder exists.
    pub async fn bootstrap(root: impl Into<PathBuf>) -> Result<Self, ExchangeError> {
        let root = root.into();
        for kind in [
            ArtifactKind::Audio,
            ArtifactKind::Image,
            ArtifactKind::Response,
            ArtifactKind::ChatLog,
        ] {
            let dir = root.join(kind.dir_name());
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| ExchangeError::Storage(format!("creating {:?}: {}", dir, e)))?;
        }
        debug!(root = %root.display(), "media store ready");
        Ok(Self {
            root,
            counter: AtomicU64::new(0),
        })
    }

    /// Generate a fresh artifact identifier: `<unix_seconds>_<sequence>`.
    pub fn next_id(&self) -> String {
        let ts = chrono::Utc::now().timestamp();
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}_{}", ts, seq)
    }

    pub fn dir(&self, kind: ArtifactKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    /// Path an artifact of the given kind and id would occupy.
    pub fn artifact_path(&self, kind: ArtifactKind, id: &str) -> PathBuf {
        self.dir(kind).join(format!(
            "{}_{}.{}",
            kind.file_prefix(),
            id,
            kind.extension()
        ))
    }

    /// Write an artifact, fsync it, and verify it landed with the right size.
    pub async fn save(
        &self,
        kind: ArtifactKind,
        id: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, ExchangeError> {
        let path = self.artifact_path(kind, id);

        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| ExchangeError::Storage(format!("creating {:?}: {}", path, e)))?;
        file.write_all(bytes)
            .await
            .map_err(|e| ExchangeError::Storage(format!("writing {:?}: {}", path, e)))?;
        file.sync_all()
            .await
            .map_err(|e| ExchangeError::Storage(format!("syncing {:?}: {}", path, e)))?;
        drop(file);

        // Post-write verification: the artifact must exist at the written size.
        let written = self.size(&path).await?;
        if written != bytes.len() as u64 {
            warn!(path = %path.display(), expected = bytes.len(), actual = written,
                "artifact size mismatch after save");
            return Err(ExchangeError::Storage(format!(
                "size mismatch after save: expected {}, found {}",
                bytes.len(),
                written
            )));
        }

        debug!(path = %path.display(), bytes = bytes.len(), "artifact saved");
        Ok(path)
    }

    pub async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    pub async fn size(&self, path: &Path) -> Result<u64, ExchangeError> {
        tokio::fs::metadata(path)
            .await
            .map(|m| m.len())
            .map_err(|e| ExchangeError::Storage(format!("stat {:?}: {}", path, e)))
    }

    /// Count artifacts of one kind (status page / health endpoint).
    pub async fn count(&self, kind: ArtifactKind) -> usize {
        let mut n = 0;
        if let Ok(mut entries) = tokio::fs::read_dir(self.dir(kind)).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                if entry
                    .path()
                    .extension()
                    .is_some_and(|ext| ext == kind.extension())
                {
                    n += 1;
                }
            }
        }
        n
    }

    /// File names of one kind, newest first (files listing endpoint).
    pub async fn list(&self, kind: ArtifactKind) -> Vec<String> {
        let mut names = Vec::new();
        if let Ok(mut entries) = tokio::fs::read_dir(self.dir(kind)).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                if let Some(name) = entry.file_name().to_str() {
                    if entry
                        .path()
                        .extension()
                        .is_some_and(|ext| ext == kind.extension())
                    {
                        names.push(name.to_string());
                    }
                }
            }
        }
        names.sort_by(|a, b| b.cmp(a));
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_verify() {
        let tmp = tempfile::tempdir().unwrap();
        let store = MediaStore::bootstrap(tmp.path()).await.unwrap();

        let id = store.next_id();
        let path = store
            .save(ArtifactKind::Audio, &id, b"RIFF fake payload")
            .await
            .unwrap();

        assert!(store.exists(&path).await);
        assert_eq!(store.size(&path).await.unwrap(), 17);
        assert_eq!(store.count(ArtifactKind::Audio).await, 1);
        assert_eq!(store.count(ArtifactKind::Image).await, 0);
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let tmp = tempfile::tempdir().unwrap();
        let store = MediaStore::bootstrap(tmp.path()).await.unwrap();

        let a = store.next_id();
        let b = store.next_id();
        assert_ne!(a, b);
        assert_ne!(
            store.artifact_path(ArtifactKind::Audio, &a),
            store.artifact_path(ArtifactKind::Audio, &b)
        );
    }

    #[tokio::test]
    async fn test_identical_payloads_get_distinct_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let store = MediaStore::bootstrap(tmp.path()).await.unwrap();

        let p1 = store
            .save(ArtifactKind::Audio, &store.next_id(), b"same bytes")
            .await
            .unwrap();
        let p2 = store
            .save(ArtifactKind::Audio, &store.next_id(), b"same bytes")
            .await
            .unwrap();

        assert_ne!(p1, p2);
        assert_eq!(
            tokio::fs::read(&p1).await.unwrap(),
            tokio::fs::read(&p2).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let tmp = tempfile::tempdir().unwrap();
        let store = MediaStore::bootstrap(tmp.path()).await.unwrap();

        store
            .save(ArtifactKind::Response, "1000_0", b"a")
            .await
            .unwrap();
        store
            .save(ArtifactKind::Response, "1000_1", b"b")
            .await
            .unwrap();

        let names = store.list(ArtifactKind::Response).await;
        assert_eq!(names, vec!["response_1000_1.wav", "response_1000_0.wav"]);
    }
}
