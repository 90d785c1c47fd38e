//! Artifact storage collaborator
//!
//! Generated export files are handed to an [`ArtifactStorage`] under a key
//! of the form `<collectionId>/<recordId>/<fileName>`. Two sinks ship with
//! the crate: [`MemoryStorage`] for tests and embedding, and
//! [`LocalStorage`] which writes below a root directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Result, StorageError};
use crate::export::spec::OutputFormat;
use crate::utils::random_string;

/// Length of the random part of generated artifact names
pub const FILE_NAME_LENGTH: usize = 20;

/// Generate an artifact file name for the given format
///
/// # Returns
/// * `String` - 20 random `[a-z0-9]` characters plus `.csv` or `.xlsx`
pub fn generate_file_name(format: OutputFormat) -> String {
    format!("{}.{}", random_string(FILE_NAME_LENGTH), format.extension())
}

/// Join a record's base files path and a file name into a storage key
pub fn artifact_key(base_path: &str, file_name: &str) -> String {
    format!("{}/{}", base_path.trim_end_matches('/'), file_name)
}

/// Durable sink for generated artifacts
#[async_trait]
pub trait ArtifactStorage: Send + Sync {
    /// Persist `bytes` under `key`, replacing any previous content
    async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<()>;

    /// Remove every artifact whose key starts with `prefix`
    async fn delete_prefix(&self, prefix: &str) -> Result<()>;

    /// Whether an artifact exists under `key`
    async fn exists(&self, key: &str) -> Result<bool>;
}

/// Reject empty keys, absolute keys and keys that escape the root
fn validate_key(key: &str) -> Result<()> {
    let invalid = key.is_empty()
        || key.starts_with('/')
        || key.split('/').any(|part| part.is_empty() || part == "." || part == "..");
    if invalid {
        return Err(StorageError::InvalidKey(key.to_string()).into());
    }
    Ok(())
}

/// In-memory artifact storage
#[derive(Default)]
pub struct MemoryStorage {
    files: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content stored under `key`
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.files.read().await.get(key).cloned()
    }

    /// All stored keys in order
    pub async fn keys(&self) -> Vec<String> {
        self.files.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl ArtifactStorage for MemoryStorage {
    async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        validate_key(key)?;
        debug!("Storing {} bytes under {}", bytes.len(), key);
        self.files.write().await.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        let prefix = format!("{}/", prefix.trim_end_matches('/'));
        self.files
            .write()
            .await
            .retain(|key, _| !key.starts_with(&prefix));
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.files.read().await.contains_key(key))
    }
}

/// Artifact storage on the local filesystem
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path an artifact key maps to
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ArtifactStorage for LocalStorage {
    async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.path_for(key)?;
        let write_failed = |source| StorageError::WriteFailed {
            key: key.to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
        }
        tokio::fs::write(&path, bytes).await.map_err(write_failed)?;

        debug!("Wrote artifact {}", path.display());
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        let path = self.path_for(prefix.trim_end_matches('/'))?;
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::DeleteFailed {
                key: prefix.to_string(),
                source,
            }
            .into()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_file_name() {
        let csv = generate_file_name(OutputFormat::Csv);
        assert_eq!(csv.len(), FILE_NAME_LENGTH + 4);
        assert!(csv.ends_with(".csv"));

        let xlsx = generate_file_name(OutputFormat::Xlsx);
        assert!(xlsx.ends_with(".xlsx"));
        assert_ne!(
            generate_file_name(OutputFormat::Csv),
            generate_file_name(OutputFormat::Csv)
        );
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("exports/abc/file.csv").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("exports/../secret").is_err());
        assert!(validate_key("exports//file.csv").is_err());
    }

    #[tokio::test]
    async fn test_memory_storage() {
        let storage = MemoryStorage::new();
        storage.upload("exports/r1/a.csv", b"a,b\n".to_vec()).await.unwrap();
        storage.upload("exports/r2/b.csv", b"c\n".to_vec()).await.unwrap();

        assert_eq!(storage.get("exports/r1/a.csv").await.unwrap(), b"a,b\n");
        assert!(storage.exists("exports/r2/b.csv").await.unwrap());

        storage.delete_prefix("exports/r1").await.unwrap();
        assert_eq!(storage.keys().await, vec!["exports/r2/b.csv".to_string()]);
        assert!(storage.upload("../x", Vec::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_local_storage() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        let key = artifact_key("exports/r1/", "out.csv");
        assert_eq!(key, "exports/r1/out.csv");

        storage.upload(&key, b"x,y\n".to_vec()).await.unwrap();
        assert!(storage.exists(&key).await.unwrap());
        assert_eq!(
            std::fs::read(dir.path().join("exports/r1/out.csv")).unwrap(),
            b"x,y\n"
        );

        storage.delete_prefix("exports/r1").await.unwrap();
        assert!(!storage.exists(&key).await.unwrap());
        storage.delete_prefix("exports/missing").await.unwrap();
    }
}
