//! Closure-table hierarchy repository.
//!
//! Nodes live in `hierarchy_node`; reachability lives in `hierarchy_closure`
//! as `(ancestor, descendant, depth)` rows. Creating a node copies its
//! parent's ancestry one level deeper; deleting a node removes its whole
//! subtree. Every mutation runs in one transaction, so readers see either all
//! of a change or none of it.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use arbor_core::{
    assemble_tree, edges_for_new_node, new_v7, validate_depth, validate_name, verify_closure,
    AncestorEntry, ClosureEdge, Error, HierarchyNode, HierarchyRepository, HierarchyTree,
    NodeType, NoteCleanupReport, Result,
};

const NODE_COLUMNS: &str = "n.id, n.node_type, n.name, n.created_at, n.updated_at";

/// Removes whatever hangs off hierarchy nodes while their subtree is deleted.
///
/// `delete_notes_for_nodes` runs inside the delete transaction; `remove_blobs`
/// runs after it committed, since blob storage is not transactional.
#[async_trait]
pub trait NoteCleanup: Send + Sync {
    async fn delete_notes_for_nodes(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        node_ids: &[Uuid],
    ) -> Result<NoteCleanupReport>;

    /// Best effort; failures are logged, not returned.
    async fn remove_blobs(&self, report: &NoteCleanupReport);
}

/// PostgreSQL implementation of HierarchyRepository.
#[derive(Clone)]
pub struct PgHierarchyRepository {
    pool: Pool<Postgres>,
    note_cleanup: Option<Arc<dyn NoteCleanup>>,
}

impl PgHierarchyRepository {
    /// Create a repository without note cleanup. Notes of deleted nodes are
    /// still removed by the foreign-key cascade, but their blobs are not.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            note_cleanup: None,
        }
    }

    pub fn with_note_cleanup(mut self, cleanup: Arc<dyn NoteCleanup>) -> Self {
        self.note_cleanup = Some(cleanup);
        self
    }

    /// Create a node inside an existing transaction.
    ///
    /// The parent row is held with `FOR KEY SHARE` until the caller commits,
    /// so a concurrent subtree delete cannot remove it underneath us.
    pub async fn create_node_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        node_type: NodeType,
        name: &str,
        parent_id: Option<Uuid>,
    ) -> Result<HierarchyNode> {
        let name = validate_name(name)?;

        let ancestry = match parent_id {
            Some(pid) => {
                let parent = sqlx::query("SELECT id FROM hierarchy_node WHERE id = $1 FOR KEY SHARE")
                    .bind(pid)
                    .fetch_optional(&mut **tx)
                    .await?;
                if parent.is_none() {
                    return Err(Error::NodeNotFound(pid));
                }

                sqlx::query(
                    "SELECT ancestor, descendant, depth FROM hierarchy_closure WHERE descendant = $1",
                )
                .bind(pid)
                .fetch_all(&mut **tx)
                .await?
                .iter()
                .map(edge_from_row)
                .collect::<Vec<_>>()
            }
            None => Vec::new(),
        };

        let id = new_v7();
        let now = Utc::now();
        let edges = edges_for_new_node(id, &ancestry)?;

        let row = sqlx::query(
            "INSERT INTO hierarchy_node (id, node_type, name, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $4)
             RETURNING id, node_type, name, created_at, updated_at",
        )
        .bind(id)
        .bind(node_type.as_str())
        .bind(name)
        .bind(now)
        .fetch_one(&mut **tx)
        .await?;
        let node = node_from_row(&row)?;

        insert_edges(tx, &edges).await?;

        debug!(
            subsystem = "db",
            component = "hierarchy",
            op = "create_node_tx",
            node_id = %id,
            edge_count = edges.len(),
            "Inserted node and closure edges"
        );
        Ok(node)
    }

    /// Every closure edge, ordered by `(ancestor, descendant)`.
    pub async fn list_edges(&self) -> Result<Vec<ClosureEdge>> {
        let rows = sqlx::query(
            "SELECT ancestor, descendant, depth FROM hierarchy_closure
             ORDER BY ancestor, descendant",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(edge_from_row).collect())
    }

    /// Number of nodes in the hierarchy.
    pub async fn count_nodes(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM hierarchy_node")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Check the closure-table invariants over a consistent snapshot.
    ///
    /// Returns `Error::Internal` naming the first violation found.
    pub async fn verify_integrity(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let ids: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM hierarchy_node")
            .fetch_all(&mut *tx)
            .await?;
        let edges: Vec<ClosureEdge> =
            sqlx::query("SELECT ancestor, descendant, depth FROM hierarchy_closure")
                .fetch_all(&mut *tx)
                .await?
                .iter()
                .map(edge_from_row)
                .collect();
        tx.commit().await?;

        verify_closure(&ids, &edges)
    }

    async fn node_exists(&self, id: Uuid) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM hierarchy_node WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn require_node(&self, id: Uuid) -> Result<()> {
        if self.node_exists(id).await? {
            Ok(())
        } else {
            Err(Error::NodeNotFound(id))
        }
    }

    /// Lock `root` and every node below it, then return the locked set.
    ///
    /// A child created under a member between reading the subtree and
    /// locking it would be missed, so the read is repeated until it is
    /// stable. Once every member is locked no new child can appear.
    async fn lock_subtree(
        tx: &mut Transaction<'_, Postgres>,
        root: Uuid,
    ) -> Result<Option<Vec<Uuid>>> {
        let locked = sqlx::query("SELECT id FROM hierarchy_node WHERE id = $1 FOR UPDATE")
            .bind(root)
            .fetch_optional(&mut **tx)
            .await?;
        if locked.is_none() {
            return Ok(None);
        }

        let mut subtree: Vec<Uuid> = Vec::new();
        loop {
            let current: Vec<Uuid> = sqlx::query_scalar(
                "SELECT descendant FROM hierarchy_closure WHERE ancestor = $1 ORDER BY descendant",
            )
            .bind(root)
            .fetch_all(&mut **tx)
            .await?;

            if current.len() == subtree.len() {
                return Ok(Some(subtree));
            }

            sqlx::query("SELECT id FROM hierarchy_node WHERE id = ANY($1) ORDER BY id FOR UPDATE")
                .bind(&current)
                .fetch_all(&mut **tx)
                .await?;
            subtree = current;
        }
    }
}

#[async_trait]
impl HierarchyRepository for PgHierarchyRepository {
    async fn create_node(
        &self,
        node_type: NodeType,
        name: &str,
        parent_id: Option<Uuid>,
    ) -> Result<HierarchyNode> {
        let start = Instant::now();
        // Also checked in `create_node_tx`; here a blank name fails before a
        // connection is taken from the pool.
        validate_name(name)?;
        let mut tx = self.pool.begin().await?;
        let node = self.create_node_tx(&mut tx, node_type, name, parent_id).await?;
        tx.commit().await?;

        info!(
            subsystem = "db",
            component = "hierarchy",
            op = "create_node",
            node_id = %node.id,
            node_type = %node_type,
            parent_id = ?parent_id,
            duration_ms = start.elapsed().as_millis() as u64,
            "Created hierarchy node"
        );
        Ok(node)
    }

    async fn get_node(&self, id: Uuid) -> Result<Option<HierarchyNode>> {
        let row = sqlx::query(&format!(
            "SELECT {NODE_COLUMNS} FROM hierarchy_node n WHERE n.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(node_from_row).transpose()
    }

    async fn rename_node(&self, id: Uuid, new_name: &str) -> Result<HierarchyNode> {
        let name = validate_name(new_name)?;

        let row = sqlx::query(
            "UPDATE hierarchy_node n SET name = $2, updated_at = $3 WHERE n.id = $1
             RETURNING n.id, n.node_type, n.name, n.created_at, n.updated_at",
        )
        .bind(id)
        .bind(name)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        let node = row
            .as_ref()
            .map(node_from_row)
            .transpose()?
            .ok_or(Error::NodeNotFound(id))?;

        info!(
            subsystem = "db",
            component = "hierarchy",
            op = "rename_node",
            node_id = %id,
            "Renamed hierarchy node"
        );
        Ok(node)
    }

    async fn get_children(&self, id: Uuid, depth: i32) -> Result<Vec<HierarchyNode>> {
        let depth = validate_depth(depth)?;

        let rows = sqlx::query(&format!(
            "SELECT {NODE_COLUMNS}
             FROM hierarchy_closure c
             JOIN hierarchy_node n ON n.id = c.descendant
             WHERE c.ancestor = $1 AND c.depth = $2
             ORDER BY n.created_at, n.id"
        ))
        .bind(id)
        .bind(depth)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            self.require_node(id).await?;
        }

        debug!(
            subsystem = "db",
            component = "hierarchy",
            op = "get_children",
            node_id = %id,
            depth,
            result_count = rows.len(),
            "Fetched children"
        );
        rows.iter().map(node_from_row).collect()
    }

    async fn get_ancestors(&self, id: Uuid) -> Result<Vec<AncestorEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {NODE_COLUMNS}, c.depth
             FROM hierarchy_closure c
             JOIN hierarchy_node n ON n.id = c.ancestor
             WHERE c.descendant = $1 AND c.depth > 0
             ORDER BY c.depth"
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            self.require_node(id).await?;
        }

        rows.iter()
            .map(|r| {
                Ok(AncestorEntry {
                    node: node_from_row(r)?,
                    depth: r.get("depth"),
                })
            })
            .collect()
    }

    async fn get_parent(&self, id: Uuid) -> Result<Option<HierarchyNode>> {
        let row = sqlx::query(&format!(
            "SELECT {NODE_COLUMNS}
             FROM hierarchy_closure c
             JOIN hierarchy_node n ON n.id = c.ancestor
             WHERE c.descendant = $1 AND c.depth = 1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(node_from_row(&r)?)),
            None => {
                self.require_node(id).await?;
                Ok(None)
            }
        }
    }

    async fn get_subtree_ids(&self, id: Uuid) -> Result<BTreeSet<Uuid>> {
        let ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT descendant FROM hierarchy_closure WHERE ancestor = $1")
                .bind(id)
                .fetch_all(&self.pool)
                .await?;

        // The self-edge is always present, so an empty result means no node.
        if ids.is_empty() {
            return Err(Error::NodeNotFound(id));
        }
        Ok(ids.into_iter().collect())
    }

    async fn delete_subtree(&self, id: Uuid) -> Result<u64> {
        let start = Instant::now();
        let mut tx = self.pool.begin().await?;

        let subtree = Self::lock_subtree(&mut tx, id)
            .await?
            .ok_or(Error::NodeNotFound(id))?;

        let report = match &self.note_cleanup {
            Some(cleanup) => cleanup.delete_notes_for_nodes(&mut tx, &subtree).await?,
            None => NoteCleanupReport::default(),
        };

        let edges_removed = sqlx::query(
            "DELETE FROM hierarchy_closure WHERE ancestor = ANY($1) OR descendant = ANY($1)",
        )
        .bind(&subtree)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let nodes_removed = sqlx::query("DELETE FROM hierarchy_node WHERE id = ANY($1)")
            .bind(&subtree)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        if let Some(cleanup) = &self.note_cleanup {
            cleanup.remove_blobs(&report).await;
        }

        info!(
            subsystem = "db",
            component = "hierarchy",
            op = "delete_subtree",
            node_id = %id,
            nodes_deleted = nodes_removed,
            edge_count = edges_removed,
            notes_deleted = report.notes_deleted,
            attachments_deleted = report.attachments_deleted,
            duration_ms = start.elapsed().as_millis() as u64,
            "Deleted hierarchy subtree"
        );
        Ok(nodes_removed)
    }

    async fn list_by_type(&self, node_type: NodeType) -> Result<Vec<HierarchyNode>> {
        let rows = sqlx::query(&format!(
            "SELECT {NODE_COLUMNS} FROM hierarchy_node n
             WHERE n.node_type = $1
             ORDER BY n.created_at, n.id"
        ))
        .bind(node_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(node_from_row).collect()
    }

    async fn list_roots(&self) -> Result<Vec<HierarchyNode>> {
        let rows = sqlx::query(&format!(
            "SELECT {NODE_COLUMNS} FROM hierarchy_node n
             WHERE NOT EXISTS (
                 SELECT 1 FROM hierarchy_closure c WHERE c.descendant = n.id AND c.depth = 1
             )
             ORDER BY n.created_at, n.id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(node_from_row).collect()
    }

    async fn get_tree(&self) -> Result<Vec<HierarchyTree>> {
        // Nodes and links must come from the same snapshot.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let rows = sqlx::query(&format!(
            "SELECT {NODE_COLUMNS} FROM hierarchy_node n ORDER BY n.created_at, n.id"
        ))
        .fetch_all(&mut *tx)
        .await?;
        let nodes = rows.iter().map(node_from_row).collect::<Result<Vec<_>>>()?;

        let links: Vec<(Uuid, Uuid)> =
            sqlx::query_as("SELECT ancestor, descendant FROM hierarchy_closure WHERE depth = 1")
                .fetch_all(&mut *tx)
                .await?;
        tx.commit().await?;

        Ok(assemble_tree(nodes, &links))
    }
}

async fn insert_edges(tx: &mut Transaction<'_, Postgres>, edges: &[ClosureEdge]) -> Result<()> {
    let ancestors: Vec<Uuid> = edges.iter().map(|e| e.ancestor).collect();
    let descendants: Vec<Uuid> = edges.iter().map(|e| e.descendant).collect();
    let depths: Vec<i32> = edges.iter().map(|e| e.depth).collect();

    sqlx::query(
        "INSERT INTO hierarchy_closure (ancestor, descendant, depth)
         SELECT * FROM UNNEST($1::uuid[], $2::uuid[], $3::int4[])",
    )
    .bind(&ancestors)
    .bind(&descendants)
    .bind(&depths)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn node_from_row(row: &PgRow) -> Result<HierarchyNode> {
    let node_type: String = row.get("node_type");
    Ok(HierarchyNode {
        id: row.get("id"),
        node_type: node_type
            .parse()
            .map_err(|_| Error::Internal(format!("Unknown node type in store: {}", node_type)))?,
        name: row.get("name"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn edge_from_row(row: &PgRow) -> ClosureEdge {
    ClosureEdge::new(row.get("ancestor"), row.get("descendant"), row.get("depth"))
}
