//! Core traits for Arbor abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable backends and testability.

use std::collections::BTreeSet;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// HIERARCHY REPOSITORY
// =============================================================================

/// Closure-table hierarchy of organisations, teams, clients and episodes.
///
/// Every mutating operation runs in a single store transaction. Read
/// operations on an id that does not exist fail with `NotFound`.
#[async_trait]
pub trait HierarchyRepository: Send + Sync {
    /// Create a node, optionally under `parent_id`.
    async fn create_node(
        &self,
        node_type: NodeType,
        name: &str,
        parent_id: Option<Uuid>,
    ) -> Result<HierarchyNode>;

    /// Fetch a node by id.
    async fn get_node(&self, id: Uuid) -> Result<Option<HierarchyNode>>;

    /// Change a node's name. Never touches the closure table.
    async fn rename_node(&self, id: Uuid, new_name: &str) -> Result<HierarchyNode>;

    /// Nodes exactly `depth` edges below `id`, oldest first.
    async fn get_children(&self, id: Uuid, depth: i32) -> Result<Vec<HierarchyNode>>;

    /// Proper ancestors of `id`, nearest first.
    async fn get_ancestors(&self, id: Uuid) -> Result<Vec<AncestorEntry>>;

    /// Direct parent of `id`, `None` for roots.
    async fn get_parent(&self, id: Uuid) -> Result<Option<HierarchyNode>>;

    /// `id` and all of its transitive descendants.
    async fn get_subtree_ids(&self, id: Uuid) -> Result<BTreeSet<Uuid>>;

    /// Delete `id` with its whole subtree and everything attached to it.
    /// Returns the number of nodes removed.
    async fn delete_subtree(&self, id: Uuid) -> Result<u64>;

    /// All nodes of one type, oldest first.
    async fn list_by_type(&self, node_type: NodeType) -> Result<Vec<HierarchyNode>>;

    /// Forest roots, oldest first.
    async fn list_roots(&self) -> Result<Vec<HierarchyNode>>;

    /// Every root with its nested children.
    async fn get_tree(&self) -> Result<Vec<HierarchyTree>>;
}

// =============================================================================
// NOTE REPOSITORY
// =============================================================================

/// Notes hung off hierarchy nodes.
#[async_trait]
pub trait NoteRepository: Send + Sync {
    /// Create a note on an existing node.
    async fn create(&self, req: CreateNoteRequest) -> Result<Note>;

    /// Fetch a note by id.
    async fn get(&self, id: Uuid) -> Result<Option<Note>>;

    /// Notes of one node, newest first.
    async fn list_for_node(&self, node_id: Uuid) -> Result<Vec<Note>>;

    /// Apply a partial update.
    async fn update(&self, id: Uuid, req: UpdateNoteRequest) -> Result<Note>;

    /// Delete a note with its attachments.
    async fn delete(&self, id: Uuid) -> Result<()>;
}

// =============================================================================
// ATTACHMENT REPOSITORY
// =============================================================================

/// File attachments of notes.
#[async_trait]
pub trait AttachmentRepository: Send + Sync {
    /// Store a file for a note. `content_type` is the client's claim.
    async fn store(
        &self,
        note_id: Uuid,
        filename: &str,
        content_type: Option<&str>,
        data: &[u8],
    ) -> Result<Attachment>;

    /// Fetch attachment metadata.
    async fn get(&self, id: Uuid) -> Result<Option<Attachment>>;

    /// Attachments of one note, oldest first.
    async fn list_for_note(&self, note_id: Uuid) -> Result<Vec<Attachment>>;

    /// Read the blob back. Returns `(data, content_type, filename)`.
    async fn download(&self, id: Uuid) -> Result<(Vec<u8>, String, String)>;

    /// Delete metadata and blob.
    async fn delete(&self, id: Uuid) -> Result<()>;
}
