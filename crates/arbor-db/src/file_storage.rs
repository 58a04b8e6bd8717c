//! Blob storage for note attachments.
//!
//! Attachment metadata lives in PostgreSQL; the bytes live in a
//! [`StorageBackend`] under a path derived from the attachment's UUIDv7.
//!
//! ```rust,ignore
//! use arbor_db::file_storage::{FilesystemBackend, StorageBackend};
//!
//! let backend = FilesystemBackend::new("/var/lib/arbor");
//! backend.validate().await?;
//! backend.write("blobs/01/94/0194....bin", &data).await?;
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use arbor_core::{Error, Result};

/// Where attachment bytes are kept.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Write data to the specified path, replacing anything already there.
    async fn write(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Read data from the specified path.
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Delete data at the specified path. Missing data is not an error.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Check if data exists at the specified path.
    async fn exists(&self, path: &str) -> Result<bool>;
}

/// Filesystem storage backend.
///
/// Path format: `{base_path}/blobs/{first-2-hex}/{next-2-hex}/{uuid}.bin`
#[derive(Debug, Clone)]
pub struct FilesystemBackend {
    base_path: PathBuf,
}

impl FilesystemBackend {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a storage path below the base directory.
    ///
    /// Only relative paths made of normal components are accepted, so a
    /// tampered `storage_path` column cannot reach outside the blob root.
    fn full_path(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let safe = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, std::path::Component::Normal(_)));
        if !safe {
            return Err(Error::InvalidArgument(format!(
                "Invalid storage path: {}",
                path
            )));
        }
        Ok(self.base_path.join(relative))
    }

    /// Write, read back, and delete a probe file.
    ///
    /// Run at startup so permission problems show up before the first upload.
    pub async fn validate(&self) -> std::result::Result<(), String> {
        let test_dir = self.base_path.join("blobs/.health-check");
        let test_file = test_dir.join("probe.bin");

        fs::create_dir_all(&test_dir)
            .await
            .map_err(|e| format!("create_dir_all({:?}): {}", test_dir, e))?;

        let data = b"arbor-storage-probe";
        fs::write(&test_file, data)
            .await
            .map_err(|e| format!("write({:?}): {}", test_file, e))?;

        let read_data = fs::read(&test_file)
            .await
            .map_err(|e| format!("read({:?}): {}", test_file, e))?;
        if read_data != data {
            return Err("read-back mismatch".to_string());
        }

        fs::remove_file(&test_file)
            .await
            .map_err(|e| format!("remove_file({:?}): {}", test_file, e))?;
        let _ = fs::remove_dir(&test_dir).await;

        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(path)?;
        debug!(
            subsystem = "storage",
            op = "write",
            storage_path = %path,
            size_bytes = data.len(),
            "Writing blob"
        );

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                warn!(subsystem = "storage", parent = %parent.display(), error = %e, "create_dir_all failed");
                e
            })?;
        }

        // Temp file + rename so readers never see a partial blob.
        let temp_path = full_path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = fs::rename(&temp_path, &full_path).await {
            warn!(subsystem = "storage", from = %temp_path.display(), to = %full_path.display(), error = %e, "rename failed");
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&full_path, std::fs::Permissions::from_mode(0o644)).await?;
        }

        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(path)?;
        match fs::read(&full_path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("Blob {} is missing", path)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path)?;
        match fs::remove_file(&full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full_path = self.full_path(path)?;
        Ok(fs::try_exists(full_path).await?)
    }
}

/// BLAKE3 hash of data as `blake3:{64-char-hex}`.
pub fn compute_content_hash(data: &[u8]) -> String {
    let hash = blake3::hash(data);
    format!("blake3:{}", hash.to_hex())
}

/// Storage path for an attachment id.
///
/// Example: `blobs/01/94/01948f7e-8b2a-7c3d-9e4f-5a6b7c8d9e0f.bin`
pub fn generate_storage_path(uuid: &Uuid) -> String {
    let hex = uuid.simple().to_string();
    format!(
        "blobs/{}/{}/{}.bin",
        &hex[0..2],
        &hex[2..4],
        uuid.as_hyphenated()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_content_hash_format() {
        let hash = compute_content_hash(b"discharge summary");
        assert!(hash.starts_with("blake3:"));
        assert_eq!(hash.len(), "blake3:".len() + 64);
        assert_eq!(hash, compute_content_hash(b"discharge summary"));
        assert_ne!(hash, compute_content_hash(b"admission summary"));
    }

    #[test]
    fn test_storage_path_fans_out_by_prefix() {
        let id = Uuid::parse_str("01948f7e-8b2a-7c3d-9e4f-5a6b7c8d9e0f").unwrap();
        assert_eq!(
            generate_storage_path(&id),
            "blobs/01/94/01948f7e-8b2a-7c3d-9e4f-5a6b7c8d9e0f.bin"
        );
    }

    #[tokio::test]
    async fn test_write_read_delete() {
        let dir = TempDir::new().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        let path = generate_storage_path(&Uuid::now_v7());

        backend.write(&path, b"ecg trace").await.unwrap();
        assert!(backend.exists(&path).await.unwrap());
        assert_eq!(backend.read(&path).await.unwrap(), b"ecg trace");

        backend.delete(&path).await.unwrap();
        assert!(!backend.exists(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_write_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        let path = generate_storage_path(&Uuid::now_v7());

        backend.write(&path, b"x-ray").await.unwrap();
        let tmp = dir.path().join(&path).with_extension("tmp");
        assert!(!tmp.exists());
    }

    #[tokio::test]
    async fn test_delete_missing_blob_is_ok() {
        let dir = TempDir::new().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        backend.delete("blobs/00/00/missing.bin").await.unwrap();
    }

    #[tokio::test]
    async fn test_read_missing_blob_is_not_found() {
        let dir = TempDir::new().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        let err = backend.read("blobs/00/00/missing.bin").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let dir = TempDir::new().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        for path in ["../outside.bin", "/etc/passwd", "blobs/../../x", ""] {
            assert!(
                matches!(backend.read(path).await, Err(Error::InvalidArgument(_))),
                "{} should be rejected",
                path
            );
        }
    }

    #[tokio::test]
    async fn test_validate_round_trip() {
        let dir = TempDir::new().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        backend.validate().await.unwrap();
        assert!(!dir.path().join("blobs/.health-check/probe.bin").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_blob_is_not_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        let path = generate_storage_path(&Uuid::now_v7());
        backend.write(&path, b"scan").await.unwrap();

        let mode = std::fs::metadata(dir.path().join(&path))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o644);
    }
}
