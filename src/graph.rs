//! Directed graph model for rooted phylogenetic trees and hybridization networks.
//!
//! # Overview
//! [`PhyloGraph`] stores nodes and edges in arenas (`Vec<Option<_>>`) and hands
//! out [`NodeId`] / [`EdgeId`] handles. Every handle carries the id of the graph
//! that created it, so passing a node of one graph into another graph is caught
//! as a [`HybridError::Structural`] instead of silently touching an unrelated
//! slot.
//!
//! # Clusters
//! The cluster of a node is the bitset of taxa reachable as leaves below it.
//! Clusters are computed bottom-up on demand and cached per node. Any mutation
//! below a node (new edge, deleted edge or node, relabel) drops the cached
//! clusters of that node and of all its ancestors.
//!
//! # Copies
//! There is no `Clone`: copying goes through [`PhyloGraph::deep_copy`] or
//! [`PhyloGraph::graft`], which allocate fresh handles and return a remapping
//! table. Handles of the source graph are never valid in the copy.

use crate::bitset::Bitset;
use crate::error::{HybridError, Result};
use crate::taxa::{Taxa, ROOT_MARKER};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_GRAPH_ID: AtomicU64 = AtomicU64::new(1);

/// Handle of a node, valid only in the graph that created it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    graph: u64,
    index: usize,
}

/// Handle of an edge, valid only in the graph that created it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId {
    graph: u64,
    index: usize,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}@g{}", self.index, self.graph)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}@g{}", self.index, self.graph)
    }
}

#[derive(Debug, Default)]
struct NodeData {
    label: Option<String>,
    in_edges: Vec<EdgeId>,
    out_edges: Vec<EdgeId>,
    cluster: Option<Bitset>,
}

#[derive(Debug)]
struct EdgeData {
    source: NodeId,
    target: NodeId,
    /// Reticulate edge flag.
    special: bool,
    weight: f64,
}

/// A rooted DAG over a shared [`Taxa`] ordering.
#[derive(Debug)]
pub struct PhyloGraph {
    id: u64,
    taxa: Arc<Taxa>,
    nodes: Vec<Option<NodeData>>,
    edges: Vec<Option<EdgeData>>,
    /// taxon index → leaf carrying that label
    leaves: HashMap<usize, NodeId>,
}

impl PhyloGraph {
    pub fn new(taxa: Arc<Taxa>) -> Self {
        PhyloGraph {
            id: NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed),
            taxa,
            nodes: Vec::new(),
            edges: Vec::new(),
            leaves: HashMap::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn taxa(&self) -> &Arc<Taxa> {
        &self.taxa
    }

    // ------------------------------------------------------------------
    // Handle resolution
    // ------------------------------------------------------------------

    fn node(&self, v: NodeId) -> Result<&NodeData> {
        if v.graph != self.id {
            return Err(HybridError::structural(format!(
                "node {v} is not owned by graph g{}",
                self.id
            )));
        }
        self.nodes
            .get(v.index)
            .and_then(Option::as_ref)
            .ok_or_else(|| HybridError::structural(format!("node {v} has been deleted")))
    }

    fn node_mut(&mut self, v: NodeId) -> Result<&mut NodeData> {
        if v.graph != self.id {
            return Err(HybridError::structural(format!(
                "node {v} is not owned by graph g{}",
                self.id
            )));
        }
        self.nodes
            .get_mut(v.index)
            .and_then(Option::as_mut)
            .ok_or_else(|| HybridError::structural(format!("node {v} has been deleted")))
    }

    fn edge(&self, e: EdgeId) -> Result<&EdgeData> {
        if e.graph != self.id {
            return Err(HybridError::structural(format!(
                "edge {e} is not owned by graph g{}",
                self.id
            )));
        }
        self.edges
            .get(e.index)
            .and_then(Option::as_ref)
            .ok_or_else(|| HybridError::structural(format!("edge {e} has been deleted")))
    }

    fn edge_mut(&mut self, e: EdgeId) -> Result<&mut EdgeData> {
        if e.graph != self.id {
            return Err(HybridError::structural(format!(
                "edge {e} is not owned by graph g{}",
                self.id
            )));
        }
        self.edges
            .get_mut(e.index)
            .and_then(Option::as_mut)
            .ok_or_else(|| HybridError::structural(format!("edge {e} has been deleted")))
    }

    // ------------------------------------------------------------------
    // Construction and mutation
    // ------------------------------------------------------------------

    pub fn new_node(&mut self) -> NodeId {
        let index = self.nodes.len();
        self.nodes.push(Some(NodeData::default()));
        NodeId {
            graph: self.id,
            index,
        }
    }

    pub fn new_labeled_node(&mut self, label: &str) -> Result<NodeId> {
        let v = self.new_node();
        self.set_label(v, label)?;
        Ok(v)
    }

    /// Sets the label of `v`. Labels naming a taxon must be unique in the graph.
    pub fn set_label(&mut self, v: NodeId, label: &str) -> Result<()> {
        let old = self.node(v)?.label.clone();
        let new_taxon = self.taxa.index_of(label);
        if let Some(idx) = new_taxon {
            if let Some(&holder) = self.leaves.get(&idx) {
                if holder != v {
                    return Err(HybridError::structural(format!(
                        "taxon '{label}' already labels node {holder}"
                    )));
                }
            }
        }
        if let Some(old_idx) = old.as_deref().and_then(|l| self.taxa.index_of(l)) {
            if self.leaves.get(&old_idx) == Some(&v) {
                self.leaves.remove(&old_idx);
            }
        }
        if let Some(idx) = new_taxon {
            self.leaves.insert(idx, v);
        }
        self.node_mut(v)?.label = Some(label.to_string());
        self.invalidate_upwards(v);
        Ok(())
    }

    pub fn new_edge(&mut self, source: NodeId, target: NodeId) -> Result<EdgeId> {
        self.node(source)?;
        self.node(target)?;
        if source == target {
            return Err(HybridError::structural(format!("self-loop on {source}")));
        }
        let e = EdgeId {
            graph: self.id,
            index: self.edges.len(),
        };
        self.edges.push(Some(EdgeData {
            source,
            target,
            special: false,
            weight: 0.0,
        }));
        self.node_mut(source)?.out_edges.push(e);
        self.node_mut(target)?.in_edges.push(e);
        self.invalidate_upwards(source);
        Ok(e)
    }

    pub fn delete_edge(&mut self, e: EdgeId) -> Result<()> {
        let (source, target) = self.endpoints(e)?;
        self.node_mut(source)?.out_edges.retain(|x| *x != e);
        self.node_mut(target)?.in_edges.retain(|x| *x != e);
        self.edges[e.index] = None;
        self.invalidate_upwards(source);
        Ok(())
    }

    /// Deletes `v` together with all incident edges.
    pub fn delete_node(&mut self, v: NodeId) -> Result<()> {
        let node = self.node(v)?;
        let incident: Vec<EdgeId> = node
            .in_edges
            .iter()
            .chain(node.out_edges.iter())
            .copied()
            .collect();
        for e in incident {
            self.delete_edge(e)?;
        }
        if let Some(idx) = self.taxon(v)? {
            if self.leaves.get(&idx) == Some(&v) {
                self.leaves.remove(&idx);
            }
        }
        self.nodes[v.index] = None;
        Ok(())
    }

    pub fn set_special(&mut self, e: EdgeId, special: bool) -> Result<()> {
        self.edge_mut(e)?.special = special;
        Ok(())
    }

    pub fn is_special(&self, e: EdgeId) -> Result<bool> {
        Ok(self.edge(e)?.special)
    }

    pub fn set_weight(&mut self, e: EdgeId, weight: f64) -> Result<()> {
        self.edge_mut(e)?.weight = weight;
        Ok(())
    }

    pub fn weight(&self, e: EdgeId) -> Result<f64> {
        Ok(self.edge(e)?.weight)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn endpoints(&self, e: EdgeId) -> Result<(NodeId, NodeId)> {
        let edge = self.edge(e)?;
        Ok((edge.source, edge.target))
    }

    pub fn label(&self, v: NodeId) -> Result<Option<&str>> {
        Ok(self.node(v)?.label.as_deref())
    }

    /// Taxon index of the label of `v`, if the label names a taxon.
    pub fn taxon(&self, v: NodeId) -> Result<Option<usize>> {
        Ok(self.label(v)?.and_then(|l| self.taxa.index_of(l)))
    }

    pub fn in_edges(&self, v: NodeId) -> Result<&[EdgeId]> {
        Ok(&self.node(v)?.in_edges)
    }

    pub fn out_edges(&self, v: NodeId) -> Result<&[EdgeId]> {
        Ok(&self.node(v)?.out_edges)
    }

    pub fn in_degree(&self, v: NodeId) -> Result<usize> {
        Ok(self.node(v)?.in_edges.len())
    }

    pub fn out_degree(&self, v: NodeId) -> Result<usize> {
        Ok(self.node(v)?.out_edges.len())
    }

    pub fn children(&self, v: NodeId) -> Result<Vec<NodeId>> {
        self.node(v)?
            .out_edges
            .iter()
            .map(|&e| self.edge(e).map(|d| d.target))
            .collect()
    }

    /// Source of the first in-edge (the only one in a tree).
    pub fn parent(&self, v: NodeId) -> Result<Option<NodeId>> {
        match self.node(v)?.in_edges.first() {
            Some(&e) => Ok(Some(self.edge(e)?.source)),
            None => Ok(None),
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        let graph = self.id;
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_some())
            .map(move |(index, _)| NodeId { graph, index })
    }

    pub fn edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        let graph = self.id;
        self.edges
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_some())
            .map(move |(index, _)| EdgeId { graph, index })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.iter().filter(|e| e.is_some()).count()
    }

    /// The unique node without in-edges.
    pub fn root(&self) -> Result<NodeId> {
        let mut roots = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.as_ref().is_some_and(|n| n.in_edges.is_empty()))
            .map(|(index, _)| NodeId {
                graph: self.id,
                index,
            });
        let root = roots
            .next()
            .ok_or_else(|| HybridError::structural("graph has no root"))?;
        if roots.next().is_some() {
            return Err(HybridError::structural("graph has more than one root"));
        }
        Ok(root)
    }

    pub fn leaf_of(&self, taxon: usize) -> Option<NodeId> {
        self.leaves.get(&taxon).copied()
    }

    /// Nodes with more than one in-edge.
    pub fn reticulations(&self) -> Vec<NodeId> {
        self.nodes()
            .filter(|&v| self.in_degree(v).is_ok_and(|d| d > 1))
            .collect()
    }

    /// Kahn's algorithm; true if some nodes can never be released.
    pub fn has_cycle(&self) -> bool {
        let mut indegree: HashMap<NodeId, usize> = self
            .nodes()
            .map(|v| (v, self.in_degree(v).unwrap_or(0)))
            .collect();
        let mut ready: VecDeque<NodeId> = indegree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(v, _)| *v)
            .collect();
        let mut released = 0;
        while let Some(v) = ready.pop_front() {
            released += 1;
            for w in self.children(v).unwrap_or_default() {
                if let Some(d) = indegree.get_mut(&w) {
                    *d -= 1;
                    if *d == 0 {
                        ready.push_back(w);
                    }
                }
            }
        }
        released != indegree.len()
    }

    // ------------------------------------------------------------------
    // Clusters
    // ------------------------------------------------------------------

    fn invalidate_upwards(&mut self, v: NodeId) {
        let mut stack = vec![v];
        let mut seen = HashSet::new();
        while let Some(u) = stack.pop() {
            if u.graph != self.id || !seen.insert(u) {
                continue;
            }
            let Some(Some(node)) = self.nodes.get_mut(u.index) else {
                continue;
            };
            node.cluster = None;
            for e in &node.in_edges {
                if let Some(Some(edge)) = self.edges.get(e.index) {
                    stack.push(edge.source);
                }
            }
        }
    }

    /// Computes (and caches) the cluster of `v`.
    pub fn compute_cluster(&mut self, v: NodeId) -> Result<Bitset> {
        if let Some(cluster) = &self.node(v)?.cluster {
            return Ok(cluster.clone());
        }
        let children = self.children(v)?;
        let mut cluster = self.taxa.empty_set();
        if children.is_empty() {
            if let Some(idx) = self.taxon(v)? {
                cluster.set(idx);
            }
        } else {
            for child in children {
                let child_cluster = self.compute_cluster(child)?;
                cluster.or_assign(&child_cluster);
            }
        }
        self.node_mut(v)?.cluster = Some(cluster.clone());
        Ok(cluster)
    }

    /// Cached cluster of `v`.
    ///
    /// # Errors
    /// Fails if the cache was invalidated since the last [`refresh_clusters`](Self::refresh_clusters).
    pub fn cluster(&self, v: NodeId) -> Result<&Bitset> {
        self.node(v)?.cluster.as_ref().ok_or_else(|| {
            HybridError::structural(format!("cluster of {v} is stale, refresh clusters first"))
        })
    }

    pub fn refresh_clusters(&mut self) -> Result<()> {
        let ids: Vec<NodeId> = self.nodes().collect();
        for v in ids {
            self.compute_cluster(v)?;
        }
        Ok(())
    }

    /// Lowest common ancestor of the leaves in `set`.
    ///
    /// Walks up from the leaf of the first taxon in `set` until a node whose
    /// cluster covers the whole set is reached. Follows first in-edges, so on a
    /// network this is the LCA along the first-parent tree only.
    pub fn find_lca(&self, set: &Bitset) -> Result<NodeId> {
        let first = set
            .first_one()
            .ok_or_else(|| HybridError::structural("empty leaf set has no LCA"))?;
        let mut v = self
            .leaf_of(first)
            .ok_or_else(|| HybridError::structural(format!("taxon {first} has no leaf")))?;
        loop {
            if self.cluster(v)?.is_superset(set) {
                return Ok(v);
            }
            v = self.parent(v)?.ok_or_else(|| {
                HybridError::structural("leaf set is not covered by the root cluster")
            })?;
        }
    }

    // ------------------------------------------------------------------
    // Copies and subtrees
    // ------------------------------------------------------------------

    fn check_same_taxa(&self, other: &PhyloGraph) -> Result<()> {
        if Arc::ptr_eq(&self.taxa, &other.taxa) || *self.taxa == *other.taxa {
            Ok(())
        } else {
            Err(HybridError::structural(format!(
                "graphs g{} and g{} use different taxon orderings",
                self.id, other.id
            )))
        }
    }

    /// Copies everything reachable from `root` in `source` into `self`.
    ///
    /// Labels, edge flags, weights and cached clusters are carried over. The
    /// returned map sends every copied source node to its new handle.
    pub fn graft_mapped(
        &mut self,
        source: &PhyloGraph,
        root: NodeId,
        map: &mut HashMap<NodeId, NodeId>,
    ) -> Result<NodeId> {
        self.check_same_taxa(source)?;
        source.node(root)?;

        let mut queue = VecDeque::new();
        let new_root = match map.get(&root) {
            Some(&copy) => copy,
            None => {
                let copy = self.copy_node(source, root)?;
                map.insert(root, copy);
                queue.push_back(root);
                copy
            }
        };
        let mut copied = vec![root];
        while let Some(u) = queue.pop_front() {
            for &e in source.out_edges(u)? {
                let data = source.edge(e)?;
                let target = match map.get(&data.target) {
                    Some(&copy) => copy,
                    None => {
                        let copy = self.copy_node(source, data.target)?;
                        map.insert(data.target, copy);
                        queue.push_back(data.target);
                        copied.push(data.target);
                        copy
                    }
                };
                let new_e = self.new_edge(map[&u], target)?;
                self.set_special(new_e, data.special)?;
                self.set_weight(new_e, data.weight)?;
            }
        }
        // edges invalidate caches, so clusters go in last
        for u in copied {
            if let Some(cluster) = &source.node(u)?.cluster {
                self.node_mut(map[&u])?.cluster = Some(cluster.clone());
            }
        }
        Ok(new_root)
    }

    /// Copies the subtree below `root` of `source` into `self`; returns the copy's root.
    pub fn graft(&mut self, source: &PhyloGraph, root: NodeId) -> Result<NodeId> {
        let mut map = HashMap::new();
        self.graft_mapped(source, root, &mut map)
    }

    fn copy_node(&mut self, source: &PhyloGraph, v: NodeId) -> Result<NodeId> {
        match source.label(v)? {
            Some(label) => self.new_labeled_node(label),
            None => Ok(self.new_node()),
        }
    }

    /// Full structural clone with fresh handles plus the old → new node table.
    pub fn deep_copy(&self) -> Result<(PhyloGraph, HashMap<NodeId, NodeId>)> {
        let mut copy = PhyloGraph::new(self.taxa.clone());
        let mut map = HashMap::new();
        let roots: Vec<NodeId> = self
            .nodes()
            .filter(|&v| self.in_degree(v).is_ok_and(|d| d == 0))
            .collect();
        for root in roots {
            copy.graft_mapped(self, root, &mut map)?;
        }
        Ok((copy, map))
    }

    /// Independent copy of the subtree rooted at `v`.
    pub fn copy_subtree(&self, v: NodeId) -> Result<PhyloGraph> {
        let mut sub = PhyloGraph::new(self.taxa.clone());
        sub.graft(self, v)?;
        Ok(sub)
    }

    /// Copy of the subtree rooted at `v`; with `detach` the subtree (and the
    /// edge into `v`) is also removed from `self`.
    pub fn get_subtree(&mut self, v: NodeId, detach: bool) -> Result<PhyloGraph> {
        let sub = self.copy_subtree(v)?;
        if detach {
            for u in self.descendants(v)? {
                self.delete_node(u)?;
            }
        }
        Ok(sub)
    }

    /// `v` and every node reachable from it.
    pub fn descendants(&self, v: NodeId) -> Result<Vec<NodeId>> {
        let mut seen = HashSet::from([v]);
        let mut order = vec![v];
        let mut queue = VecDeque::from([v]);
        while let Some(u) = queue.pop_front() {
            for w in self.children(u)? {
                if seen.insert(w) {
                    order.push(w);
                    queue.push_back(w);
                }
            }
        }
        Ok(order)
    }

    /// Copy of the tree restricted to the taxa of `set`, unary nodes suppressed.
    pub fn restricted(&self, set: &Bitset) -> Result<PhyloGraph> {
        let lca = self.find_lca(set)?;
        let mut sub = self.copy_subtree(lca)?;
        sub.prune_to(set)?;
        sub.refresh_clusters()?;
        Ok(sub)
    }

    /// Removes every leaf whose taxon is not in `keep`, then cleans up.
    pub fn prune_to(&mut self, keep: &Bitset) -> Result<()> {
        loop {
            let mut dead = Vec::new();
            for v in self.nodes() {
                if self.out_degree(v)? == 0 && !self.taxon(v)?.is_some_and(|t| keep.get(t)) {
                    dead.push(v);
                }
            }
            if dead.is_empty() {
                break;
            }
            for v in dead {
                self.delete_node(v)?;
            }
        }
        self.suppress_unary()
    }

    /// Suppresses nodes with one in-edge and one out-edge, and removes a root
    /// with a single child.
    pub fn suppress_unary(&mut self) -> Result<()> {
        loop {
            let mut next = None;
            for v in self.nodes() {
                if self.out_degree(v)? == 1 && self.in_degree(v)? <= 1 {
                    next = Some(v);
                    break;
                }
            }
            let Some(v) = next else {
                return Ok(());
            };
            let out = self.out_edges(v)?[0];
            let (_, child) = self.endpoints(out)?;
            match self.in_edges(v)?.first().copied() {
                None => self.delete_node(v)?,
                Some(inc) => {
                    let (parent, _) = self.endpoints(inc)?;
                    let special = self.is_special(out)?;
                    let weight = if special {
                        self.weight(out)?
                    } else {
                        self.weight(inc)? + self.weight(out)?
                    };
                    self.delete_node(v)?;
                    let e = self.new_edge(parent, child)?;
                    self.set_special(e, special)?;
                    self.set_weight(e, weight)?;
                }
            }
        }
    }

    /// Hangs the root marker leaf above the current root.
    pub fn attach_root_marker(&mut self) -> Result<NodeId> {
        let old_root = self.root()?;
        let top = self.new_node();
        let marker = self.new_labeled_node(ROOT_MARKER)?;
        self.new_edge(top, old_root)?;
        self.new_edge(top, marker)?;
        Ok(marker)
    }

    /// Checks the rooted binary tree invariants and that every taxon labels
    /// exactly one leaf. Returns the root.
    pub fn validate_binary_tree(&self) -> Result<NodeId> {
        let root = self.root()?;
        for v in self.nodes() {
            let indeg = self.in_degree(v)?;
            let outdeg = self.out_degree(v)?;
            if indeg > 1 {
                return Err(HybridError::structural(format!(
                    "node {v} has {indeg} parents, expected a tree"
                )));
            }
            match outdeg {
                0 => {
                    if self.taxon(v)?.is_none() {
                        return Err(HybridError::structural(format!(
                            "leaf {v} has no taxon label"
                        )));
                    }
                }
                2 => {}
                n => {
                    return Err(HybridError::structural(format!(
                        "node {v} has {n} children, expected a binary tree"
                    )))
                }
            }
        }
        let expected = self.taxa.len() + usize::from(self.leaves.contains_key(&self.taxa.root_marker()));
        if self.leaves.len() != expected {
            return Err(HybridError::structural(format!(
                "tree covers {} of {} taxa",
                self.leaves.len(),
                expected
            )));
        }
        Ok(root)
    }

    /// Non-trivial clusters of the tree displayed for `selection`.
    ///
    /// `selection` maps reticulation nodes to the one in-edge that is kept;
    /// the other in-edges are ignored. A reticulation missing from the map
    /// keeps all of its in-edges. Unary nodes and dead ends show up as
    /// duplicate or empty clusters and drop out of the set.
    pub fn displayed_clusters(
        &self,
        selection: &HashMap<NodeId, EdgeId>,
    ) -> Result<HashSet<Bitset>> {
        let root = self.root()?;
        let mut memo: HashMap<NodeId, Bitset> = HashMap::new();
        // post-order without recursion, networks can be deep
        let mut stack = vec![(root, false)];
        while let Some((v, expanded)) = stack.pop() {
            if memo.contains_key(&v) {
                continue;
            }
            let mut kept = Vec::new();
            for &e in self.out_edges(v)? {
                let target = self.edge(e)?.target;
                if selection.get(&target).is_none_or(|&chosen| chosen == e) {
                    kept.push(target);
                }
            }
            if expanded {
                let mut cluster = self.taxa.empty_set();
                if kept.is_empty() {
                    if let Some(idx) = self.taxon(v)? {
                        cluster.set(idx);
                    }
                }
                for w in &kept {
                    if let Some(c) = memo.get(w) {
                        cluster.or_assign(c);
                    }
                }
                memo.insert(v, cluster);
            } else {
                stack.push((v, true));
                stack.extend(kept.into_iter().map(|w| (w, false)));
            }
        }
        Ok(memo
            .into_values()
            .filter(|c| c.count_ones() > 1)
            .collect())
    }

    /// Labels of all leaves, in taxon order.
    pub fn leaf_labels(&self) -> Vec<String> {
        let mut taxa: Vec<usize> = self.leaves.keys().copied().collect();
        taxa.sort_unstable();
        taxa.into_iter()
            .filter_map(|t| self.taxa.label(t).map(str::to_string))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// ```text
    ///        root
    ///       /    \
    ///     ab      cd
    ///    /  \    /  \
    ///   a    b  c    d
    /// ```
    fn quartet() -> (PhyloGraph, HashMap<&'static str, NodeId>) {
        let taxa = Arc::new(Taxa::new(["a", "b", "c", "d"]).unwrap());
        let mut g = PhyloGraph::new(taxa);
        let mut ids = HashMap::new();
        let root = g.new_node();
        let ab = g.new_node();
        let cd = g.new_node();
        g.new_edge(root, ab).unwrap();
        g.new_edge(root, cd).unwrap();
        for (parent, name) in [(ab, "a"), (ab, "b"), (cd, "c"), (cd, "d")] {
            let leaf = g.new_labeled_node(name).unwrap();
            g.new_edge(parent, leaf).unwrap();
            ids.insert(name, leaf);
        }
        ids.insert("root", root);
        ids.insert("ab", ab);
        ids.insert("cd", cd);
        g.refresh_clusters().unwrap();
        (g, ids)
    }

    #[test]
    fn test_clusters_and_lca() {
        let (g, ids) = quartet();
        let taxa = g.taxa().clone();
        assert_eq!(g.cluster(ids["ab"]).unwrap(), &taxa.set_of(["a", "b"]).unwrap());
        assert_eq!(g.cluster(ids["root"]).unwrap(), &taxa.all_taxa());
        assert_eq!(g.find_lca(&taxa.set_of(["a", "b"]).unwrap()).unwrap(), ids["ab"]);
        assert_eq!(g.find_lca(&taxa.set_of(["b", "c"]).unwrap()).unwrap(), ids["root"]);
        assert_eq!(g.find_lca(&taxa.set_of(["d"]).unwrap()).unwrap(), ids["d"]);
        assert_eq!(g.validate_binary_tree().unwrap(), ids["root"]);
    }

    #[test]
    fn test_foreign_handles_are_rejected() {
        let (mut g1, ids) = quartet();
        let (g2, _) = quartet();
        let foreign = g2.root().unwrap();
        assert!(matches!(g1.delete_node(foreign), Err(HybridError::Structural(_))));
        assert!(matches!(g1.new_edge(ids["a"], foreign), Err(HybridError::Structural(_))));
        assert!(g1.children(foreign).is_err());
    }

    #[test]
    fn test_delete_cascades_and_invalidates() {
        let (mut g, ids) = quartet();
        g.delete_node(ids["a"]).unwrap();
        assert_eq!(g.out_degree(ids["ab"]).unwrap(), 1);
        assert!(g.cluster(ids["root"]).is_err());
        assert!(g.cluster(ids["cd"]).is_ok());
        assert!(g.label(ids["a"]).is_err());
        g.refresh_clusters().unwrap();
        let taxa = g.taxa().clone();
        assert_eq!(g.cluster(ids["root"]).unwrap(), &taxa.set_of(["b", "c", "d"]).unwrap());
    }

    #[test]
    fn test_get_subtree_detach() {
        let (mut g, ids) = quartet();
        let sub = g.get_subtree(ids["cd"], true).unwrap();
        assert_eq!(sub.node_count(), 3);
        assert_eq!(sub.leaf_labels(), vec!["c", "d"]);
        assert_eq!(g.node_count(), 4);
        assert!(g.leaf_of(2).is_none());
        assert_eq!(g.out_degree(ids["root"]).unwrap(), 1);

        let kept = g.get_subtree(ids["ab"], false).unwrap();
        assert_eq!(kept.node_count(), 3);
        assert_eq!(g.node_count(), 4);
    }

    #[test]
    fn test_deep_copy_is_independent() {
        let (g, ids) = quartet();
        let (mut copy, map) = g.deep_copy().unwrap();
        assert_ne!(copy.id(), g.id());
        assert_eq!(copy.node_count(), g.node_count());
        copy.delete_node(map[&ids["a"]]).unwrap();
        assert_eq!(g.node_count(), 7);
        assert_eq!(copy.node_count(), 6);
        assert!(copy.delete_node(ids["b"]).is_err());
    }

    #[test]
    fn test_restricted_suppresses_unary_nodes() {
        let (g, _) = quartet();
        let taxa = g.taxa().clone();
        let sub = g.restricted(&taxa.set_of(["a", "c", "d"]).unwrap()).unwrap();
        assert_eq!(sub.node_count(), 5);
        assert_eq!(sub.leaf_labels(), vec!["a", "c", "d"]);
        sub.validate_binary_tree().unwrap_err(); // only 3 of 4 taxa
        let root = sub.root().unwrap();
        assert_eq!(sub.out_degree(root).unwrap(), 2);
    }

    #[test]
    fn test_root_marker_and_cycles() {
        let (mut g, ids) = quartet();
        let marker = g.attach_root_marker().unwrap();
        g.refresh_clusters().unwrap();
        let top = g.root().unwrap();
        assert_eq!(g.parent(marker).unwrap(), Some(top));
        assert_eq!(g.cluster(top).unwrap().count_ones(), 5);
        assert!(!g.has_cycle());
        g.new_edge(ids["a"], top).unwrap();
        assert!(g.has_cycle());
    }
}
