//! Note repository implementation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row, Transaction};
use tracing::{debug, info, warn};
use uuid::Uuid;

use arbor_core::{
    new_v7, normalize_tags, CreateNoteRequest, Error, Note, NoteCleanupReport, NoteRepository,
    Result, UpdateNoteRequest,
};

use crate::file_storage::StorageBackend;
use crate::hierarchy::NoteCleanup;

const NOTE_COLUMNS: &str = "id, node_id, node_type, content, tags, created_at, updated_at";

/// PostgreSQL implementation of NoteRepository.
///
/// Holds the blob backend so deleting a note also removes its attachment
/// files.
#[derive(Clone)]
pub struct PgNoteRepository {
    pool: Pool<Postgres>,
    storage: Arc<dyn StorageBackend>,
}

impl PgNoteRepository {
    pub fn new(pool: Pool<Postgres>, storage: Arc<dyn StorageBackend>) -> Self {
        Self { pool, storage }
    }

    /// Create a note inside an existing transaction.
    ///
    /// The owning node is held with `FOR KEY SHARE` until the caller commits.
    pub async fn create_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        req: CreateNoteRequest,
    ) -> Result<Note> {
        validate_content(&req.content)?;
        let tags = normalize_tags(req.tags.as_deref().unwrap_or_default());

        let node_type: Option<String> =
            sqlx::query_scalar("SELECT node_type FROM hierarchy_node WHERE id = $1 FOR KEY SHARE")
                .bind(req.node_id)
                .fetch_optional(&mut **tx)
                .await?;
        let node_type = node_type.ok_or(Error::NodeNotFound(req.node_id))?;

        let row = sqlx::query(&format!(
            "INSERT INTO note (id, node_id, node_type, content, tags, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $6)
             RETURNING {NOTE_COLUMNS}"
        ))
        .bind(new_v7())
        .bind(req.node_id)
        .bind(&node_type)
        .bind(&req.content)
        .bind(&tags)
        .bind(Utc::now())
        .fetch_one(&mut **tx)
        .await?;

        note_from_row(&row)
    }

    async fn remove_blob_paths(&self, paths: &[String]) {
        for path in paths {
            if let Err(e) = self.storage.delete(path).await {
                warn!(
                    subsystem = "storage",
                    component = "notes",
                    op = "remove_blob",
                    storage_path = %path,
                    error = %e,
                    "Failed to remove attachment blob; file left behind"
                );
            }
        }
    }
}

fn validate_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(Error::InvalidArgument(
            "Note content must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[async_trait]
impl NoteRepository for PgNoteRepository {
    async fn create(&self, req: CreateNoteRequest) -> Result<Note> {
        // Also checked in `create_tx`; fail before taking a connection.
        validate_content(&req.content)?;
        let mut tx = self.pool.begin().await?;
        let note = self.create_tx(&mut tx, req).await?;
        tx.commit().await?;

        info!(
            subsystem = "db",
            component = "notes",
            op = "create",
            note_id = %note.id,
            node_id = %note.node_id,
            "Created note"
        );
        Ok(note)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Note>> {
        let row = sqlx::query(&format!("SELECT {NOTE_COLUMNS} FROM note WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(note_from_row).transpose()
    }

    async fn list_for_node(&self, node_id: Uuid) -> Result<Vec<Note>> {
        let rows = sqlx::query(&format!(
            "SELECT {NOTE_COLUMNS} FROM note WHERE node_id = $1
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(node_id)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM hierarchy_node WHERE id = $1)")
                    .bind(node_id)
                    .fetch_one(&self.pool)
                    .await?;
            if !exists {
                return Err(Error::NodeNotFound(node_id));
            }
        }

        debug!(
            subsystem = "db",
            component = "notes",
            op = "list_for_node",
            node_id = %node_id,
            result_count = rows.len(),
            "Listed notes"
        );
        rows.iter().map(note_from_row).collect()
    }

    async fn update(&self, id: Uuid, req: UpdateNoteRequest) -> Result<Note> {
        if let Some(content) = &req.content {
            validate_content(content)?;
        }
        let tags = req.tags.as_deref().map(normalize_tags);

        let row = sqlx::query(&format!(
            "UPDATE note SET
                 content = COALESCE($2, content),
                 tags = COALESCE($3, tags),
                 updated_at = $4
             WHERE id = $1
             RETURNING {NOTE_COLUMNS}"
        ))
        .bind(id)
        .bind(req.content.as_deref())
        .bind(tags.as_ref())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        let note = row
            .as_ref()
            .map(note_from_row)
            .transpose()?
            .ok_or(Error::NoteNotFound(id))?;

        info!(
            subsystem = "db",
            component = "notes",
            op = "update",
            note_id = %id,
            "Updated note"
        );
        Ok(note)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let blob_paths: Vec<String> =
            sqlx::query_scalar("DELETE FROM attachment WHERE note_id = $1 RETURNING storage_path")
                .bind(id)
                .fetch_all(&mut *tx)
                .await?;

        let deleted = sqlx::query("DELETE FROM note WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(Error::NoteNotFound(id));
        }

        tx.commit().await?;
        self.remove_blob_paths(&blob_paths).await;

        info!(
            subsystem = "db",
            component = "notes",
            op = "delete",
            note_id = %id,
            attachments_deleted = blob_paths.len(),
            "Deleted note"
        );
        Ok(())
    }
}

#[async_trait]
impl NoteCleanup for PgNoteRepository {
    async fn delete_notes_for_nodes(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        node_ids: &[Uuid],
    ) -> Result<NoteCleanupReport> {
        let blob_paths: Vec<String> = sqlx::query_scalar(
            "DELETE FROM attachment
             WHERE note_id IN (SELECT id FROM note WHERE node_id = ANY($1))
             RETURNING storage_path",
        )
        .bind(node_ids)
        .fetch_all(&mut **tx)
        .await?;

        let notes_deleted = sqlx::query("DELETE FROM note WHERE node_id = ANY($1)")
            .bind(node_ids)
            .execute(&mut **tx)
            .await?
            .rows_affected();

        Ok(NoteCleanupReport {
            notes_deleted,
            attachments_deleted: blob_paths.len() as u64,
            blob_paths,
        })
    }

    async fn remove_blobs(&self, report: &NoteCleanupReport) {
        self.remove_blob_paths(&report.blob_paths).await;
    }
}

fn note_from_row(row: &PgRow) -> Result<Note> {
    let node_type: String = row.get("node_type");
    Ok(Note {
        id: row.get("id"),
        node_id: row.get("node_id"),
        node_type: node_type
            .parse()
            .map_err(|_| Error::Internal(format!("Unknown node type in store: {}", node_type)))?,
        content: row.get("content"),
        tags: row.get("tags"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_content() {
        assert!(validate_content("Vital signs stable.").is_ok());
        assert!(matches!(
            validate_content("  \n\t"),
            Err(Error::InvalidArgument(_))
        ));
    }
}
