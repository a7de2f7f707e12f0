use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::{MediaError, MediaResult};

/// Blob store for originals and cached renditions, addressed by
/// `/`-separated relative keys.
#[async_trait]
pub trait MediaStorage: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> MediaResult<()>;
    async fn get(&self, key: &str) -> MediaResult<Option<Vec<u8>>>;
    async fn delete(&self, key: &str) -> MediaResult<()>;
    /// Remove every object under `prefix`. Missing prefixes are not an error.
    async fn delete_prefix(&self, prefix: &str) -> MediaResult<()>;
}

/// Files on local disk under a root directory
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> MediaResult<PathBuf> {
        if key.is_empty() || key.contains('\\') {
            return Err(MediaError::InvalidKey(key.to_string()));
        }
        let rel = Path::new(key);
        if !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(MediaError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl MediaStorage for LocalStorage {
    async fn put(&self, key: &str, bytes: &[u8]) -> MediaResult<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        // Write then rename so readers never see a partial file.
        let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
        let written = match fs::write(&tmp, bytes).await {
            Ok(()) => fs::rename(&tmp, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&tmp).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Could not remove temporary file {}: {}", tmp.display(), cleanup);
                }
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> MediaResult<Option<Vec<u8>>> {
        let path = self.resolve(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> MediaResult<()> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> MediaResult<()> {
        let path = self.resolve(prefix.trim_end_matches('/'))?;
        match fs::remove_dir_all(&path).await {
            Ok(()) => {
                tracing::debug!("Removed media prefix {}", prefix);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
