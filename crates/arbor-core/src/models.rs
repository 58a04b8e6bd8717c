//! Core data models for Arbor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// =============================================================================
// HIERARCHY TYPES
// =============================================================================

/// Level of a node in the organisation → team → client → episode hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Organisation,
    Team,
    Client,
    Episode,
}

/// Route segment → node type. Plural names are looked up, never derived by
/// trimming characters.
const PLURALS: &[(&str, NodeType)] = &[
    ("organisations", NodeType::Organisation),
    ("teams", NodeType::Team),
    ("clients", NodeType::Client),
    ("episodes", NodeType::Episode),
];

impl NodeType {
    /// All node types, outermost first.
    pub const ALL: [NodeType; 4] = [
        NodeType::Organisation,
        NodeType::Team,
        NodeType::Client,
        NodeType::Episode,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Organisation => "organisation",
            Self::Team => "team",
            Self::Client => "client",
            Self::Episode => "episode",
        }
    }

    /// Plural form used in collection routes (`/organisations`).
    pub fn plural(&self) -> &'static str {
        PLURALS
            .iter()
            .find(|(_, t)| t == self)
            .map(|(p, _)| *p)
            .unwrap_or("nodes")
    }

    /// Resolve a plural route segment to a node type.
    pub fn from_plural(segment: &str) -> Option<NodeType> {
        PLURALS
            .iter()
            .find(|(p, _)| p.eq_ignore_ascii_case(segment))
            .map(|(_, t)| *t)
    }

    /// The type a child created under this level normally has.
    pub fn child_type(&self) -> Option<NodeType> {
        match self {
            Self::Organisation => Some(Self::Team),
            Self::Team => Some(Self::Client),
            Self::Client => Some(Self::Episode),
            Self::Episode => None,
        }
    }

    /// Creating or deleting nodes of this type needs an elevated role.
    ///
    /// Arbor does not authorize requests itself; the caller checks this.
    pub fn requires_elevated_role(&self) -> bool {
        matches!(self, Self::Organisation)
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeType {
    type Err = Error;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "organisation" | "organization" => Ok(Self::Organisation),
            "team" => Ok(Self::Team),
            "client" => Ok(Self::Client),
            "episode" => Ok(Self::Episode),
            _ => Err(Error::InvalidArgument(format!("Unknown node type: {}", s))),
        }
    }
}

/// A node of the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyNode {
    pub id: Uuid,
    pub node_type: NodeType,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row of the closure table: `descendant` is reachable from `ancestor`
/// through `depth` parent-child edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClosureEdge {
    pub ancestor: Uuid,
    pub descendant: Uuid,
    pub depth: i32,
}

impl ClosureEdge {
    pub fn new(ancestor: Uuid, descendant: Uuid, depth: i32) -> Self {
        Self {
            ancestor,
            descendant,
            depth,
        }
    }

    /// The `(n, n, 0)` edge every node carries.
    pub fn self_edge(id: Uuid) -> Self {
        Self::new(id, id, 0)
    }

    pub fn is_self_edge(&self) -> bool {
        self.ancestor == self.descendant
    }
}

/// An ancestor of some node together with its distance from that node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AncestorEntry {
    #[serde(flatten)]
    pub node: HierarchyNode,
    pub depth: i32,
}

/// A node with its nested children, as rendered by the sidebar tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyTree {
    #[serde(flatten)]
    pub node: HierarchyNode,
    pub children: Vec<HierarchyTree>,
}

impl HierarchyTree {
    /// Number of nodes in this tree, root included.
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(HierarchyTree::len).sum::<usize>()
    }

    /// Always false: a tree holds at least its root.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Request for creating a hierarchy node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNodeRequest {
    pub node_type: NodeType,
    pub name: String,
    /// Parent node (None = forest root)
    #[serde(default)]
    pub parent_id: Option<Uuid>,
}

// =============================================================================
// NOTE & ATTACHMENT TYPES
// =============================================================================

/// A note attached to one hierarchy node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub node_id: Uuid,
    pub node_type: NodeType,
    pub content: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request for creating a note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNoteRequest {
    pub node_id: Uuid,
    pub content: String,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// Partial note update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateNoteRequest {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// File metadata for a note attachment. The blob itself lives in a
/// storage backend under `storage_path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: Uuid,
    pub note_id: Uuid,
    pub filename: String,
    pub original_filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    /// `blake3:{hex}`
    pub content_hash: String,
    #[serde(skip_serializing)]
    pub storage_path: String,
    pub created_at: DateTime<Utc>,
}

/// What the notes subsystem removed while a subtree was being deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteCleanupReport {
    pub notes_deleted: u64,
    pub attachments_deleted: u64,
    /// Blob paths to remove once the surrounding transaction has committed.
    #[serde(skip)]
    pub blob_paths: Vec<String>,
}

// =============================================================================
// VALIDATION
// =============================================================================

/// Trim a node name and reject it when nothing is left.
pub fn validate_name(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidArgument(
            "Name must not be empty".to_string(),
        ));
    }
    Ok(trimmed)
}

/// Reject negative closure depths.
pub fn validate_depth(depth: i32) -> Result<i32> {
    if depth < 0 {
        return Err(Error::InvalidArgument(format!(
            "Depth must be non-negative, got {}",
            depth
        )));
    }
    Ok(depth)
}

/// Trim tags, drop empty ones, and deduplicate while keeping first-seen order.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}
