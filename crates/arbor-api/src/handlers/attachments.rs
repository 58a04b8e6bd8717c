//! Attachment HTTP handlers.
//!
//! Uploads are `multipart/form-data` with a `file` part. An optional
//! `content_type` text part overrides the type sent with the file; without
//! either, the type is detected from the bytes.

use axum::{
    extract::{Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::debug;
use uuid::Uuid;

use crate::{ApiError, AppState};
use arbor_core::{Attachment, AttachmentRepository};

pub async fn list_for_note(
    State(state): State<AppState>,
    Path(note_id): Path<Uuid>,
) -> Result<Json<Vec<Attachment>>, ApiError> {
    Ok(Json(state.db.attachments.list_for_note(note_id).await?))
}

/// Upload one file to a note.
///
/// # Returns
/// - 201 Created with the attachment metadata
/// - 400 Bad Request if the `file` part is missing, empty, too large or
///   an executable
/// - 404 Not Found if the note does not exist
pub async fn upload(
    State(state): State<AppState>,
    Path(note_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Attachment>), ApiError> {
    let mut file: Option<(String, Option<String>, Vec<u8>)> = None;
    let mut content_type_override: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload.bin").to_string();
                let sent_type = field.content_type().map(str::to_string);
                let data = field.bytes().await?;
                file = Some((filename, sent_type, data.to_vec()));
            }
            Some("content_type") => {
                let value = field.text().await?;
                if !value.trim().is_empty() {
                    content_type_override = Some(value.trim().to_string());
                }
            }
            other => {
                debug!(field = ?other, "Ignoring multipart field");
            }
        }
    }

    let (filename, sent_type, data) =
        file.ok_or_else(|| ApiError::BadRequest("Missing 'file' field".to_string()))?;

    // Browsers send octet-stream for anything they cannot name; detect instead.
    let content_type = content_type_override.or(sent_type.filter(|t| t != "application/octet-stream"));

    let attachment = state
        .db
        .attachments
        .store(note_id, &filename, content_type.as_deref(), &data)
        .await?;
    Ok((StatusCode::CREATED, Json(attachment)))
}

/// Raw bytes with `Content-Type` and an attachment `Content-Disposition`.
pub async fn download(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let (data, content_type, filename) = state.db.attachments.download(id).await?;

    let content_type = HeaderValue::from_str(&content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        data,
    )
        .into_response())
}

pub async fn delete_attachment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.db.attachments.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
