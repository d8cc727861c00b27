//! Cluster snapshots of rooted trees and of the trees a network displays.
//!
//! # Overview
//! A ClusterSnapshot captures every non-trivial cluster (leaf set with at
//! least two taxa) of a rooted tree. Two rooted trees on the same taxa are
//! isomorphic exactly when their snapshots hold the same clusters, which is
//! how search results are checked against the input trees.
//!
//! # Why taxon NAMES, not node IDs
//! Node IDs are assigned during parsing and differ across trees. Bit positions
//! come from the shared [`Taxa`] ordering instead, so identical taxa always
//! land on identical bits.
//!
//! # Displayed trees
//! A network with `r` reticulations displays up to `2^r` trees, one per choice
//! of kept in-edge at every reticulation. [`ClusterSnapshot::displayed_trees`]
//! enumerates all of them.

use crate::bitset::Bitset;
use crate::error::{HybridError, Result};
use crate::graph::{EdgeId, NodeId, PhyloGraph};
use crate::taxa::Taxa;
use phylotree::tree::Tree as PhyloTree;
use std::collections::{HashMap, HashSet};

/// Upper limit on reticulations for exhaustive displayed-tree enumeration.
pub const MAX_ENUMERATED_RETICULATIONS: usize = 20;

/// An immutable snapshot of all non-trivial clusters of a rooted tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSnapshot {
    /// All clusters with two or more taxa, root cluster included
    pub clusters: HashSet<Bitset>,

    /// Number of taxa covered by the tree
    pub num_leaves: usize,
}

impl ClusterSnapshot {
    /// Extract a snapshot from a parsed `phylotree` tree.
    ///
    /// # Algorithm
    /// 1. Map each leaf name to its index in `taxa`
    /// 2. DFS from the root, building bitsets bottom-up
    /// 3. Keep every bitset with at least two taxa
    ///
    /// # Errors
    /// Returns [`HybridError::Structural`] for unnamed leaves or leaves whose
    /// name is not part of `taxa`.
    pub fn from_tree(tree: &PhyloTree, taxa: &Taxa) -> Result<Self> {
        let mut leaf_index: HashMap<usize, usize> = HashMap::new();
        for leaf_id in tree.get_leaves() {
            let node = tree
                .get(&leaf_id)
                .map_err(|e| HybridError::structural(e.to_string()))?;
            let name = node
                .name
                .as_deref()
                .ok_or_else(|| HybridError::structural("tree has an unnamed leaf"))?;
            let idx = taxa
                .index_of(name)
                .ok_or_else(|| HybridError::structural(format!("unknown taxon '{name}'")))?;
            leaf_index.insert(leaf_id, idx);
        }

        let root_id = tree
            .get_root()
            .map_err(|e| HybridError::structural(e.to_string()))?;
        // Cache to store computed bitsets
        // Key: node_id, Value: Bitset of leaves under this node
        let mut cache: HashMap<usize, Bitset> = HashMap::new();
        Self::compute_bitsets(root_id, tree, &leaf_index, taxa, &mut cache)?;

        Ok(ClusterSnapshot {
            clusters: cache
                .into_values()
                .filter(|bitset| bitset.count_ones() > 1)
                .collect(),
            num_leaves: leaf_index.len(),
        })
    }

    /// Recursively compute bitsets for all nodes via DFS.
    ///
    /// - **Leaf node**: bitset with its single taxon bit set
    /// - **Internal node**: OR of all child bitsets
    fn compute_bitsets(
        node_id: usize,
        tree: &PhyloTree,
        leaf_index: &HashMap<usize, usize>,
        taxa: &Taxa,
        cache: &mut HashMap<usize, Bitset>,
    ) -> Result<Bitset> {
        if let Some(bitset) = cache.get(&node_id) {
            return Ok(bitset.clone());
        }

        let node = tree
            .get(&node_id)
            .map_err(|e| HybridError::structural(e.to_string()))?;

        let mut bitset = taxa.empty_set();
        if node.children.is_empty() {
            let idx = leaf_index.get(&node_id).ok_or_else(|| {
                HybridError::structural(format!("leaf {node_id} has no taxon index"))
            })?;
            bitset.set(*idx);
        } else {
            for &child_id in &node.children {
                let child = Self::compute_bitsets(child_id, tree, leaf_index, taxa, cache)?;
                bitset.or_assign(&child);
            }
        }

        cache.insert(node_id, bitset.clone());
        Ok(bitset)
    }

    /// Snapshot of a tree held in the graph model.
    ///
    /// # Errors
    /// Fails with [`HybridError::Structural`] if `graph` has reticulations.
    pub fn from_graph(graph: &PhyloGraph) -> Result<Self> {
        if !graph.reticulations().is_empty() {
            return Err(HybridError::structural(
                "expected a tree, found a network with reticulations",
            ));
        }
        Self::displayed(graph, &HashMap::new())
    }

    /// Snapshot of the tree `network` displays for one in-edge per reticulation.
    pub fn displayed(network: &PhyloGraph, selection: &HashMap<NodeId, EdgeId>) -> Result<Self> {
        let clusters = network.displayed_clusters(selection)?;
        let num_leaves = clusters
            .iter()
            .map(Bitset::count_ones)
            .max()
            .unwrap_or(0);
        Ok(ClusterSnapshot {
            clusters,
            num_leaves,
        })
    }

    /// Snapshots of every tree displayed by `network`, one per selection of
    /// in-edges. Selections are enumerated as bit masks over the reticulations.
    ///
    /// # Errors
    /// Refuses networks with more than [`MAX_ENUMERATED_RETICULATIONS`] reticulations.
    pub fn displayed_trees(network: &PhyloGraph) -> Result<Vec<Self>> {
        let retics = network.reticulations();
        if retics.len() > MAX_ENUMERATED_RETICULATIONS {
            return Err(HybridError::structural(format!(
                "{} reticulations are too many to enumerate displayed trees",
                retics.len()
            )));
        }
        let mut parents: Vec<(NodeId, [EdgeId; 2])> = Vec::with_capacity(retics.len());
        for &r in &retics {
            match network.in_edges(r)? {
                [first, second] => parents.push((r, [*first, *second])),
                other => {
                    return Err(HybridError::structural(format!(
                        "reticulation {r} has {} parents, expected 2",
                        other.len()
                    )))
                }
            }
        }

        let mut snapshots = Vec::with_capacity(1 << parents.len());
        for mask in 0u32..(1u32 << parents.len()) {
            let selection: HashMap<NodeId, EdgeId> = parents
                .iter()
                .enumerate()
                .map(|(bit, (r, edges))| (*r, edges[((mask >> bit) & 1) as usize]))
                .collect();
            snapshots.push(Self::displayed(network, &selection)?);
        }
        Ok(snapshots)
    }

    /// True if both snapshots describe the same rooted topology.
    pub fn same_topology(&self, other: &ClusterSnapshot) -> bool {
        self.clusters == other.clusters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// ```text
    ///              root
    ///             /    \
    ///         node1     E
    ///         /   \
    ///     node2    D
    ///     /   \
    ///    A    node3
    ///         /   \
    ///        B     C
    /// ```
    ///
    /// Leaves sorted: A=0, B=1, C=2, D=3, E=4
    ///
    /// | Node  | Leaves Below | Bitset   |
    /// |-------|--------------|----------|
    /// | node3 | {B, C}       | 0b00110  |
    /// | node2 | {A, B, C}    | 0b00111  |
    /// | node1 | {A,B,C,D}    | 0b01111  |
    /// | root  | {A,B,C,D,E}  | 0b11111  |
    #[test]
    fn test_asymmetric_tree_clusters() {
        let taxa = Taxa::new(["A", "B", "C", "D", "E"]).unwrap();
        let tree = PhyloTree::from_newick("(((A,(B,C)),D),E);").unwrap();
        let snap = ClusterSnapshot::from_tree(&tree, &taxa).unwrap();

        let expected: HashSet<Bitset> = [0b00110u64, 0b00111, 0b01111, 0b11111]
            .into_iter()
            .map(|w| Bitset(vec![w]))
            .collect();
        assert_eq!(snap.clusters, expected);
        assert_eq!(snap.num_leaves, 5);
    }

    /// Child order and node IDs must not matter, only taxon names.
    #[test]
    fn test_child_order_is_irrelevant() {
        let taxa = Taxa::new(["Human", "Chimp", "Gorilla", "Orang"]).unwrap();
        let t1 = PhyloTree::from_newick("(((Human,Chimp),Gorilla),Orang);").unwrap();
        let t2 = PhyloTree::from_newick("(Orang,(Gorilla,(Chimp,Human)));").unwrap();
        let s1 = ClusterSnapshot::from_tree(&t1, &taxa).unwrap();
        let s2 = ClusterSnapshot::from_tree(&t2, &taxa).unwrap();
        assert!(s1.same_topology(&s2));
    }

    #[test]
    fn test_unknown_taxon_is_structural() {
        let taxa = Taxa::new(["a", "b"]).unwrap();
        let tree = PhyloTree::from_newick("(a,(b,c));").unwrap();
        assert!(matches!(
            ClusterSnapshot::from_tree(&tree, &taxa),
            Err(HybridError::Structural(_))
        ));
    }

    /// ```text
    ///        root
    ///       /    \
    ///      u      v
    ///     / \    / \
    ///    a   \  /   c
    ///         h
    ///         |
    ///         b
    /// ```
    /// Keeping u→h displays ((a,b),c); keeping v→h displays (a,(b,c)).
    #[test]
    fn test_displayed_trees_of_one_reticulation() {
        let taxa = Arc::new(Taxa::new(["a", "b", "c"]).unwrap());
        let mut net = PhyloGraph::new(taxa.clone());
        let root = net.new_node();
        let u = net.new_node();
        let v = net.new_node();
        let h = net.new_labeled_node("#H1").unwrap();
        let a = net.new_labeled_node("a").unwrap();
        let b = net.new_labeled_node("b").unwrap();
        let c = net.new_labeled_node("c").unwrap();
        net.new_edge(root, u).unwrap();
        net.new_edge(root, v).unwrap();
        net.new_edge(u, a).unwrap();
        net.new_edge(v, c).unwrap();
        let uh = net.new_edge(u, h).unwrap();
        net.new_edge(v, h).unwrap();
        net.new_edge(h, b).unwrap();

        let left = ClusterSnapshot::displayed(&net, &HashMap::from([(h, uh)])).unwrap();
        let ab_c = PhyloTree::from_newick("((a,b),c);").unwrap();
        assert!(left.same_topology(&ClusterSnapshot::from_tree(&ab_c, &taxa).unwrap()));

        let all = ClusterSnapshot::displayed_trees(&net).unwrap();
        assert_eq!(all.len(), 2);
        let a_bc = ClusterSnapshot::from_tree(&PhyloTree::from_newick("(a,(b,c));").unwrap(), &taxa)
            .unwrap();
        assert!(all.iter().any(|s| s.same_topology(&a_bc)));
        assert!(ClusterSnapshot::from_graph(&net).is_err());
    }
}
