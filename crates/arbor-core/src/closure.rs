//! Closure-table algorithms.
//!
//! The store keeps one `(ancestor, descendant, depth)` row for every pair of
//! nodes on the same root-to-leaf path, self-pairs included. The functions
//! here hold the parts of that bookkeeping that do not need a database:
//!
//! - [`edges_for_new_node`]: the rows a freshly created node needs, derived in
//!   one pass from its parent's ancestry.
//! - [`assemble_tree`]: nested tree assembly from depth-1 links.
//! - [`verify_closure`]: invariant checker used by tests against any edge set.
//! - [`ClosureTable`]: an in-memory closure table with the same semantics as
//!   the PostgreSQL repository.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{ClosureEdge, HierarchyNode, HierarchyTree};

/// Closure rows for a node created under a parent.
///
/// `parent_ancestry` must be every edge `(a, parent, d)` the parent has,
/// including its self-edge. The result holds the new self-edge followed by one
/// `(a, new_id, d + 1)` row per parent ancestry edge. An empty ancestry means
/// the node is a forest root and only the self-edge is produced.
pub fn edges_for_new_node(new_id: Uuid, parent_ancestry: &[ClosureEdge]) -> Result<Vec<ClosureEdge>> {
    let mut edges = Vec::with_capacity(parent_ancestry.len() + 1);
    edges.push(ClosureEdge::self_edge(new_id));

    if parent_ancestry.is_empty() {
        return Ok(edges);
    }

    let parent = parent_ancestry[0].descendant;
    if !parent_ancestry
        .iter()
        .any(|e| e.is_self_edge() && e.ancestor == parent)
    {
        return Err(Error::Internal(format!(
            "Ancestry of {} is missing its self-edge",
            parent
        )));
    }

    for edge in parent_ancestry {
        if edge.descendant != parent {
            return Err(Error::Internal(format!(
                "Ancestry edge {} -> {} does not end at parent {}",
                edge.ancestor, edge.descendant, parent
            )));
        }
        if edge.ancestor == new_id {
            return Err(Error::Conflict(format!(
                "Node {} is already an ancestor of its own parent",
                new_id
            )));
        }
        edges.push(ClosureEdge::new(edge.ancestor, new_id, edge.depth + 1));
    }

    Ok(edges)
}

/// Nest `nodes` into trees using `(parent, child)` links.
///
/// Sibling order follows the order of `nodes`, so callers pass nodes sorted by
/// creation time. Nodes without a link, or whose parent is absent from
/// `nodes`, become roots.
pub fn assemble_tree(nodes: Vec<HierarchyNode>, parent_links: &[(Uuid, Uuid)]) -> Vec<HierarchyTree> {
    let present: HashSet<Uuid> = nodes.iter().map(|n| n.id).collect();
    let parent_of: HashMap<Uuid, Uuid> = parent_links
        .iter()
        .filter(|(parent, _)| present.contains(parent))
        .map(|(parent, child)| (*child, *parent))
        .collect();

    let mut roots = Vec::new();
    let mut children_of: HashMap<Uuid, Vec<HierarchyNode>> = HashMap::new();
    for node in nodes {
        match parent_of.get(&node.id) {
            Some(parent) => children_of.entry(*parent).or_default().push(node),
            None => roots.push(node),
        }
    }

    roots
        .into_iter()
        .map(|root| attach_children(root, &mut children_of))
        .collect()
}

fn attach_children(
    node: HierarchyNode,
    children_of: &mut HashMap<Uuid, Vec<HierarchyNode>>,
) -> HierarchyTree {
    let children = children_of.remove(&node.id).unwrap_or_default();
    HierarchyTree {
        node,
        children: children
            .into_iter()
            .map(|child| attach_children(child, children_of))
            .collect(),
    }
}

/// Check the closure invariants over a complete edge set.
///
/// - every node has exactly one self-edge at depth 0 and no other depth-0 edge;
/// - every edge references known nodes;
/// - `(a, b, d1)` and `(b, c, d2)` imply `(a, c, d1 + d2)`;
/// - every node has at most one depth-1 ancestor (forest shape).
pub fn verify_closure(nodes: &[Uuid], edges: &[ClosureEdge]) -> Result<()> {
    let known: HashSet<Uuid> = nodes.iter().copied().collect();
    let mut by_pair: HashMap<(Uuid, Uuid), i32> = HashMap::with_capacity(edges.len());

    for edge in edges {
        if !known.contains(&edge.ancestor) || !known.contains(&edge.descendant) {
            return Err(Error::Internal(format!(
                "Edge {} -> {} references an unknown node",
                edge.ancestor, edge.descendant
            )));
        }
        if edge.depth < 0 {
            return Err(Error::Internal(format!(
                "Edge {} -> {} has negative depth {}",
                edge.ancestor, edge.descendant, edge.depth
            )));
        }
        if edge.is_self_edge() != (edge.depth == 0) {
            return Err(Error::Internal(format!(
                "Edge {} -> {} has depth {}",
                edge.ancestor, edge.descendant, edge.depth
            )));
        }
        if by_pair
            .insert((edge.ancestor, edge.descendant), edge.depth)
            .is_some()
        {
            return Err(Error::Conflict(format!(
                "Duplicate edge {} -> {}",
                edge.ancestor, edge.descendant
            )));
        }
    }

    for id in nodes {
        if by_pair.get(&(*id, *id)) != Some(&0) {
            return Err(Error::Internal(format!("Node {} has no self-edge", id)));
        }
    }

    let mut parents: HashMap<Uuid, Uuid> = HashMap::new();
    for edge in edges.iter().filter(|e| e.depth == 1) {
        if let Some(other) = parents.insert(edge.descendant, edge.ancestor) {
            return Err(Error::Internal(format!(
                "Node {} has two parents: {} and {}",
                edge.descendant, other, edge.ancestor
            )));
        }
    }

    let mut outgoing: HashMap<Uuid, Vec<(Uuid, i32)>> = HashMap::new();
    for edge in edges {
        outgoing
            .entry(edge.ancestor)
            .or_default()
            .push((edge.descendant, edge.depth));
    }
    for ab in edges {
        for (c, d2) in outgoing.get(&ab.descendant).map(Vec::as_slice).unwrap_or(&[]) {
            let expected = ab.depth + d2;
            match by_pair.get(&(ab.ancestor, *c)) {
                Some(d) if *d == expected => {}
                found => {
                    return Err(Error::Internal(format!(
                        "Missing transitive edge {} -> {} at depth {} (found {:?})",
                        ab.ancestor, c, expected, found
                    )))
                }
            }
        }
    }

    Ok(())
}

/// In-memory closure table.
///
/// Mirrors the semantics of the PostgreSQL repository without timestamps or
/// names: node order is insertion order, which stands in for creation time.
#[derive(Debug, Clone, Default)]
pub struct ClosureTable {
    order: Vec<Uuid>,
    edges: BTreeMap<(Uuid, Uuid), i32>,
}

impl ClosureTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.edges.contains_key(&(id, id))
    }

    /// Node ids in insertion order.
    pub fn nodes(&self) -> &[Uuid] {
        &self.order
    }

    /// Every edge, ordered by `(ancestor, descendant)`.
    pub fn edges(&self) -> Vec<ClosureEdge> {
        self.edges
            .iter()
            .map(|((a, d), depth)| ClosureEdge::new(*a, *d, *depth))
            .collect()
    }

    fn require(&self, id: Uuid) -> Result<()> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(Error::NodeNotFound(id))
        }
    }

    /// Edges `(a, id, d)` for every ancestor of `id`, self-edge included.
    pub fn ancestry(&self, id: Uuid) -> Vec<ClosureEdge> {
        self.edges
            .iter()
            .filter(|((_, d), _)| *d == id)
            .map(|((a, d), depth)| ClosureEdge::new(*a, *d, *depth))
            .collect()
    }

    /// Add a node, optionally under `parent`.
    pub fn insert(&mut self, id: Uuid, parent: Option<Uuid>) -> Result<()> {
        if self.contains(id) {
            return Err(Error::Conflict(format!("Node {} already exists", id)));
        }
        let ancestry = match parent {
            Some(p) => {
                self.require(p)?;
                self.ancestry(p)
            }
            None => Vec::new(),
        };
        for edge in edges_for_new_node(id, &ancestry)? {
            self.edges
                .insert((edge.ancestor, edge.descendant), edge.depth);
        }
        self.order.push(id);
        Ok(())
    }

    /// Nodes exactly `depth` edges below `id`, in insertion order.
    pub fn children(&self, id: Uuid, depth: i32) -> Result<Vec<Uuid>> {
        crate::models::validate_depth(depth)?;
        self.require(id)?;
        Ok(self
            .order
            .iter()
            .filter(|d| self.edges.get(&(id, **d)) == Some(&depth))
            .copied()
            .collect())
    }

    /// Proper ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: Uuid) -> Result<Vec<(Uuid, i32)>> {
        self.require(id)?;
        let mut out: Vec<(Uuid, i32)> = self
            .ancestry(id)
            .into_iter()
            .filter(|e| !e.is_self_edge())
            .map(|e| (e.ancestor, e.depth))
            .collect();
        out.sort_by_key(|(_, depth)| *depth);
        Ok(out)
    }

    /// `id` and all of its descendants.
    pub fn subtree(&self, id: Uuid) -> Result<BTreeSet<Uuid>> {
        self.require(id)?;
        Ok(self
            .edges
            .range((id, Uuid::nil())..=(id, Uuid::max()))
            .map(|((_, d), _)| *d)
            .collect())
    }

    /// Remove `id` with its whole subtree. Returns the number of nodes removed.
    pub fn delete_subtree(&mut self, id: Uuid) -> Result<usize> {
        let doomed = self.subtree(id)?;
        self.edges
            .retain(|(a, d), _| !doomed.contains(a) && !doomed.contains(d));
        self.order.retain(|n| !doomed.contains(n));
        Ok(doomed.len())
    }

    /// Check the closure invariants over the current state.
    pub fn verify(&self) -> Result<()> {
        verify_closure(&self.order, &self.edges())
    }
}
