use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Stores `bytes` under a fresh name that keeps `suggested_name`'s extension.
    async fn save(&self, bytes: &[u8], suggested_name: &str) -> io::Result<PathBuf>;
    async fn exists(&self, path: &Path) -> bool;
    async fn delete(&self, path: &Path) -> io::Result<()>;
}

pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    pub async fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        info!("Storing uploads in {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

pub fn unique_file_name(suggested_name: &str) -> String {
    let extension = Path::new(suggested_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()));

    match extension {
        Some(ext) => format!("{}.{}", Uuid::new_v4(), ext.to_ascii_lowercase()),
        None => Uuid::new_v4().to_string(),
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn save(&self, bytes: &[u8], suggested_name: &str) -> io::Result<PathBuf> {
        let path = self.root.join(unique_file_name(suggested_name));
        tokio::fs::write(&path, bytes).await?;
        debug!(path = %path.display(), size = bytes.len(), "Saved upload");
        Ok(path)
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn delete(&self, path: &Path) -> io::Result<()> {
        match tokio::fs::remove_file(path).await {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_names_keep_safe_extensions_only() {
        assert!(unique_file_name("leaf.JPG").ends_with(".jpg"));
        assert!(!unique_file_name("../../etc/passwd").contains('/'));
        assert!(!unique_file_name("noext").contains('.'));
        assert!(!unique_file_name("evil.p/ng").contains('/'));
        assert_ne!(unique_file_name("a.png"), unique_file_name("a.png"));
    }

    #[tokio::test]
    async fn save_exists_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path().join("uploads")).await.unwrap();

        let path = storage.save(b"bytes", "plant.png").await.unwrap();
        assert!(path.starts_with(storage.root()));
        assert!(storage.exists(&path).await);

        storage.delete(&path).await.unwrap();
        assert!(!storage.exists(&path).await);
        // Deleting twice is fine.
        storage.delete(&path).await.unwrap();
    }
}
