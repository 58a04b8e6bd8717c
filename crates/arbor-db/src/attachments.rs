//! Attachment repository: metadata rows in PostgreSQL, bytes in a
//! [`StorageBackend`].
//!
//! ```rust,ignore
//! use arbor_db::{FilesystemBackend, PgAttachmentRepository};
//!
//! let repo = PgAttachmentRepository::new(pool, Arc::new(FilesystemBackend::new("/var/lib/arbor")));
//! let attachment = repo.store(note_id, "ecg.pdf", Some("application/pdf"), &data).await?;
//! let (data, content_type, filename) = repo.download(attachment.id).await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::{info, warn};
use uuid::Uuid;

use arbor_core::{
    check_upload, detect_content_type, new_v7, sanitize_filename, Attachment,
    AttachmentRepository, Error, Result,
};

use crate::file_storage::{compute_content_hash, generate_storage_path, StorageBackend};

/// Default upload limit: 50 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

const ATTACHMENT_COLUMNS: &str = "id, note_id, filename, original_filename, content_type, \
                                  size_bytes, content_hash, storage_path, created_at";

/// PostgreSQL implementation of AttachmentRepository.
#[derive(Clone)]
pub struct PgAttachmentRepository {
    pool: Pool<Postgres>,
    backend: Arc<dyn StorageBackend>,
    max_upload_bytes: u64,
}

impl PgAttachmentRepository {
    pub fn new(pool: Pool<Postgres>, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            pool,
            backend,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: u64) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    async fn require_attachment(&self, id: Uuid) -> Result<Attachment> {
        self.get(id).await?.ok_or(Error::AttachmentNotFound(id))
    }
}

#[async_trait]
impl AttachmentRepository for PgAttachmentRepository {
    async fn store(
        &self,
        note_id: Uuid,
        filename: &str,
        content_type: Option<&str>,
        data: &[u8],
    ) -> Result<Attachment> {
        check_upload(filename, data, self.max_upload_bytes)?;

        let note_exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM note WHERE id = $1)")
                .bind(note_id)
                .fetch_one(&self.pool)
                .await?;
        if !note_exists {
            return Err(Error::NoteNotFound(note_id));
        }

        let id = new_v7();
        let safe_name = sanitize_filename(filename);
        let content_type = detect_content_type(&safe_name, data, content_type);
        let content_hash = compute_content_hash(data);
        let storage_path = generate_storage_path(&id);

        self.backend.write(&storage_path, data).await?;

        // The note may have been deleted since the check above; the foreign
        // key then rejects the row and the blob must not outlive it.
        let inserted = sqlx::query(&format!(
            "INSERT INTO attachment
                 (id, note_id, filename, original_filename, content_type,
                  size_bytes, content_hash, storage_path, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {ATTACHMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(note_id)
        .bind(&safe_name)
        .bind(filename)
        .bind(&content_type)
        .bind(data.len() as i64)
        .bind(&content_hash)
        .bind(&storage_path)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await;

        let row = match inserted {
            Ok(row) => row,
            Err(e) => {
                if let Err(cleanup) = self.backend.delete(&storage_path).await {
                    warn!(
                        subsystem = "storage",
                        component = "attachments",
                        op = "store",
                        storage_path = %storage_path,
                        error = %cleanup,
                        "Failed to remove blob after metadata insert failed"
                    );
                }
                let err = Error::from(e);
                return Err(if err.is_not_found() {
                    Error::NoteNotFound(note_id)
                } else {
                    err
                });
            }
        };
        let attachment = attachment_from_row(&row);

        info!(
            subsystem = "db",
            component = "attachments",
            op = "store",
            attachment_id = %id,
            note_id = %note_id,
            size_bytes = data.len(),
            content_type = %attachment.content_type,
            "Stored attachment"
        );
        Ok(attachment)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Attachment>> {
        let row = sqlx::query(&format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM attachment WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(attachment_from_row))
    }

    async fn list_for_note(&self, note_id: Uuid) -> Result<Vec<Attachment>> {
        let rows = sqlx::query(&format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM attachment WHERE note_id = $1
             ORDER BY created_at, id"
        ))
        .bind(note_id)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM note WHERE id = $1)")
                    .bind(note_id)
                    .fetch_one(&self.pool)
                    .await?;
            if !exists {
                return Err(Error::NoteNotFound(note_id));
            }
        }

        Ok(rows.iter().map(attachment_from_row).collect())
    }

    async fn download(&self, id: Uuid) -> Result<(Vec<u8>, String, String)> {
        let attachment = self.require_attachment(id).await?;
        let data = self.backend.read(&attachment.storage_path).await?;
        Ok((data, attachment.content_type, attachment.filename))
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let storage_path: Option<String> =
            sqlx::query_scalar("DELETE FROM attachment WHERE id = $1 RETURNING storage_path")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        let storage_path = storage_path.ok_or(Error::AttachmentNotFound(id))?;

        if let Err(e) = self.backend.delete(&storage_path).await {
            warn!(
                subsystem = "storage",
                component = "attachments",
                op = "delete",
                attachment_id = %id,
                storage_path = %storage_path,
                error = %e,
                "Failed to remove attachment blob; file left behind"
            );
        }

        info!(
            subsystem = "db",
            component = "attachments",
            op = "delete",
            attachment_id = %id,
            "Deleted attachment"
        );
        Ok(())
    }
}

fn attachment_from_row(row: &PgRow) -> Attachment {
    Attachment {
        id: row.get("id"),
        note_id: row.get("note_id"),
        filename: row.get("filename"),
        original_filename: row.get("original_filename"),
        content_type: row.get("content_type"),
        size_bytes: row.get("size_bytes"),
        content_hash: row.get("content_hash"),
        storage_path: row.get("storage_path"),
        created_at: row.get("created_at"),
    }
}
