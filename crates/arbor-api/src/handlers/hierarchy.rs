//! Hierarchy HTTP handlers.
//!
//! Organisations, teams, clients and episodes share one closure-table
//! hierarchy; these endpoints expose its queries and mutations.

use std::collections::BTreeSet;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ApiError, AppState};
use arbor_core::{
    AncestorEntry, CreateNodeRequest, HierarchyNode, HierarchyRepository, HierarchyTree,
};

/// Query parameters for listing children.
#[derive(Debug, Deserialize)]
pub struct ChildrenQuery {
    /// Distance below the node (default 1, 0 returns the node itself).
    pub depth: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct RenameNodeRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteSubtreeResponse {
    pub deleted: u64,
}

#[derive(Debug, Serialize)]
pub struct SubtreeResponse {
    pub root: Uuid,
    pub ids: BTreeSet<Uuid>,
    pub count: usize,
}

/// Whole forest, roots oldest first.
pub async fn get_tree(
    State(state): State<AppState>,
) -> Result<Json<Vec<HierarchyTree>>, ApiError> {
    Ok(Json(state.db.hierarchy.get_tree().await?))
}

/// Create a node, optionally under a parent.
///
/// # Returns
/// - 201 Created with the node
/// - 400 Bad Request for an unknown type or blank name
/// - 404 Not Found if the parent does not exist
pub async fn create_node(
    State(state): State<AppState>,
    body: Result<Json<CreateNodeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<HierarchyNode>), ApiError> {
    let Json(req) = body?;
    let node = state
        .db
        .hierarchy
        .create_node(req.node_type, &req.name, req.parent_id)
        .await?;
    Ok((StatusCode::CREATED, Json(node)))
}

pub async fn get_node(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<HierarchyNode>, ApiError> {
    state
        .db
        .hierarchy
        .get_node(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Node not found: {}", id)))
}

pub async fn rename_node(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Result<Json<RenameNodeRequest>, JsonRejection>,
) -> Result<Json<HierarchyNode>, ApiError> {
    let Json(req) = body?;
    Ok(Json(state.db.hierarchy.rename_node(id, &req.name).await?))
}

/// Delete a node with every descendant, their notes and attachments.
pub async fn delete_node(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteSubtreeResponse>, ApiError> {
    let deleted = state.db.hierarchy.delete_subtree(id).await?;
    Ok(Json(DeleteSubtreeResponse { deleted }))
}

pub async fn get_children(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ChildrenQuery>,
) -> Result<Json<Vec<HierarchyNode>>, ApiError> {
    let depth = query.depth.unwrap_or(1);
    Ok(Json(state.db.hierarchy.get_children(id, depth).await?))
}

/// Ancestors nearest first, each with its distance.
pub async fn get_ancestors(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<AncestorEntry>>, ApiError> {
    Ok(Json(state.db.hierarchy.get_ancestors(id).await?))
}

/// Ids a delete of this node would remove, itself included.
pub async fn get_subtree(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SubtreeResponse>, ApiError> {
    let ids = state.db.hierarchy.get_subtree_ids(id).await?;
    Ok(Json(SubtreeResponse {
        root: id,
        count: ids.len(),
        ids,
    }))
}

/// `GET /api/v1/:plural`, e.g. `/api/v1/teams`.
pub async fn list_by_type(
    State(state): State<AppState>,
    Path(plural): Path<String>,
) -> Result<Json<Vec<HierarchyNode>>, ApiError> {
    let node_type = arbor_core::NodeType::from_plural(&plural)
        .ok_or_else(|| ApiError::NotFound(format!("Unknown collection: {}", plural)))?;
    Ok(Json(state.db.hierarchy.list_by_type(node_type).await?))
}
