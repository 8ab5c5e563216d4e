//! Blob storage for uploaded files.

use super::{ProviderError, ProviderResult};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

pub trait BlobStore: Send + Sync {
    fn put<'a>(
        &'a self,
        bucket: &'a str,
        path: &'a str,
        bytes: Vec<u8>,
        content_type: &'a str,
    ) -> BoxFuture<'a, ProviderResult<()>>;

    fn get<'a>(&'a self, bucket: &'a str, path: &'a str) -> BoxFuture<'a, ProviderResult<Vec<u8>>>;

    /// URL the client can fetch the blob from for at least `ttl`.
    fn shareable_url(&self, bucket: &str, path: &str, ttl: Duration) -> String;
}

/// Reject absolute paths and parent-directory segments.
fn relative(bucket: &str, path: &str) -> ProviderResult<PathBuf> {
    let joined = Path::new(bucket).join(path);
    let safe = !bucket.is_empty()
        && !path.is_empty()
        && joined
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if safe {
        Ok(joined)
    } else {
        Err(ProviderError::InvalidPath(format!("{bucket}/{path}")))
    }
}

fn public_url(base: &str, bucket: &str, path: &str) -> String {
    format!("{base}/files/{bucket}/{path}")
}

/// Files under a root directory, served back by the API's `/files` route.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    public_base: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base: public_base.into(),
        }
    }
}

impl BlobStore for LocalBlobStore {
    fn put<'a>(
        &'a self,
        bucket: &'a str,
        path: &'a str,
        bytes: Vec<u8>,
        _content_type: &'a str,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            let target = self.root.join(relative(bucket, path)?);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&target, bytes).await?;
            Ok(())
        })
    }

    fn get<'a>(&'a self, bucket: &'a str, path: &'a str) -> BoxFuture<'a, ProviderResult<Vec<u8>>> {
        Box::pin(async move {
            let target = self.root.join(relative(bucket, path)?);
            match tokio::fs::read(&target).await {
                Ok(bytes) => Ok(bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(ProviderError::NotFound(format!("{bucket}/{path}")))
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    fn shareable_url(&self, bucket: &str, path: &str, _ttl: Duration) -> String {
        public_url(&self.public_base, bucket, path)
    }
}

/// In-memory blobs for tests and `--memory` mode.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    public_base: String,
}

impl MemoryBlobStore {
    pub fn new(public_base: impl Into<String>) -> Self {
        Self {
            blobs: Mutex::new(HashMap::new()),
            public_base: public_base.into(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.lock().is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    fn put<'a>(
        &'a self,
        bucket: &'a str,
        path: &'a str,
        bytes: Vec<u8>,
        _content_type: &'a str,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            relative(bucket, path)?;
            self.blobs.lock().insert(format!("{bucket}/{path}"), bytes);
            Ok(())
        })
    }

    fn get<'a>(&'a self, bucket: &'a str, path: &'a str) -> BoxFuture<'a, ProviderResult<Vec<u8>>> {
        Box::pin(async move {
            relative(bucket, path)?;
            let key = format!("{bucket}/{path}");
            self.blobs
                .lock()
                .get(&key)
                .cloned()
                .ok_or(ProviderError::NotFound(key))
        })
    }

    fn shareable_url(&self, bucket: &str, path: &str, _ttl: Duration) -> String {
        public_url(&self.public_base, bucket, path)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn rejects_escaping_paths() {
        assert!(relative("uploads", "images/a.png").is_ok());
        assert!(relative("uploads", "../etc/passwd").is_err());
        assert!(relative("uploads", "/abs").is_err());
        assert!(relative("", "a").is_err());
    }

    #[tokio::test]
    async fn local_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path(), "http://localhost:8080");
        store
            .put("uploads", "images/profile/1-a.png", b"png".to_vec(), "image/png")
            .await
            .unwrap();
        assert_eq!(store.get("uploads", "images/profile/1-a.png").await.unwrap(), b"png");
        assert!(matches!(
            store.get("uploads", "images/missing.png").await,
            Err(ProviderError::NotFound(_))
        ));
        assert_eq!(
            store.shareable_url("uploads", "images/profile/1-a.png", Duration::from_secs(60)),
            "http://localhost:8080/files/uploads/images/profile/1-a.png"
        );
    }
}
