//! Note HTTP handlers.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{ApiError, AppState};
use arbor_core::{CreateNoteRequest, Note, NoteRepository, UpdateNoteRequest};

/// Notes of one node, newest first.
pub async fn list_for_node(
    State(state): State<AppState>,
    Path(node_id): Path<Uuid>,
) -> Result<Json<Vec<Note>>, ApiError> {
    Ok(Json(state.db.notes.list_for_node(node_id).await?))
}

pub async fn create_note(
    State(state): State<AppState>,
    body: Result<Json<CreateNoteRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Note>), ApiError> {
    let Json(req) = body?;
    let note = state.db.notes.create(req).await?;
    Ok((StatusCode::CREATED, Json(note)))
}

pub async fn get_note(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Note>, ApiError> {
    state
        .db
        .notes
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Note not found: {}", id)))
}

/// Partial update: absent fields keep their value.
pub async fn update_note(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateNoteRequest>, JsonRejection>,
) -> Result<Json<Note>, ApiError> {
    let Json(req) = body?;
    Ok(Json(state.db.notes.update(id, req).await?))
}

pub async fn delete_note(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.db.notes.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
