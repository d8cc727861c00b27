//! Rooted Robinson-Foulds distance on cluster snapshots.
//!
//! Two rooted trees are compared by their sets of non-trivial clusters:
//!
//! RF = |A ∪ B| - |A ∩ B| = |A| + |B| - 2|A ∩ B|
//!
//! A distance of 0 means the trees are isomorphic, which lets the search skip
//! straight to a single-component forest.

use crate::error::Result;
use crate::snapshot::ClusterSnapshot;
use crate::taxa::Taxa;
use phylotree::tree::Tree as PhyloTree;

#[cfg(test)]
use itertools::Itertools;

/// Compute the rooted Robinson-Foulds distance between two parsed trees.
///
/// # Example
/// ```text
/// Tree 1:  ((A,B),(C,D))     Clusters: {A,B}, {C,D}, {A,B,C,D}
/// Tree 2:  ((A,C),(B,D))     Clusters: {A,C}, {B,D}, {A,B,C,D}
///
/// Intersection: 1 cluster (the root)
/// RF = 3 + 3 - 2*1 = 4
/// ```
///
/// # Errors
/// Returns [`HybridError::Structural`](crate::error::HybridError::Structural)
/// if a leaf is unnamed or not part of `taxa`.
pub fn robinson_foulds(tree_a: &PhyloTree, tree_b: &PhyloTree, taxa: &Taxa) -> Result<usize> {
    let snap_a = ClusterSnapshot::from_tree(tree_a, taxa)?;
    let snap_b = ClusterSnapshot::from_tree(tree_b, taxa)?;

    Ok(rf_from_snapshots(&snap_a, &snap_b))
}

/// Compute Robinson-Foulds distance from two pre-computed snapshots.
///
/// Uses HashSet intersection, so it runs in time linear in the cluster count.
pub fn rf_from_snapshots(a: &ClusterSnapshot, b: &ClusterSnapshot) -> usize {
    let inter = a.clusters.intersection(&b.clusters).count();
    a.clusters.len() + b.clusters.len() - 2 * inter
}
