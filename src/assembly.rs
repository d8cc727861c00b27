//! Network assembly: turns an acyclic agreement forest into a hybridization
//! network that displays both input trees.
//!
//! Components are attached ancestors first, starting with the root
//! component. While the network grows, every edge belongs to one of three
//! *views*: plain edges are shared by both trees, reticulate edges belong to
//! the tree whose attachment created them. Following the view of tree `s`
//! from the top gives a tree on the taxa attached so far that agrees with
//! tree `s` restricted to those taxa.
//!
//! A new component `C` is placed, separately for each tree, by walking up
//! from its LCA until the first ancestor whose cluster meets the attached
//! taxa. That intersection `S` is the cluster of the sibling `C` must get.
//! The lowest node with cluster `S` in the matching view is found, its view
//! in-edge is subdivided, and the new node becomes one parent of the
//! reticulation above `C`.

use crate::bitset::Bitset;
use crate::cycles::Inheritance;
use crate::error::{HybridError, Result};
use crate::forest::{AgreementForest, Side, TreePair};
use crate::graph::{EdgeId, NodeId, PhyloGraph};
use log::{debug, warn};
use std::collections::HashMap;

/// Reticulate edges and the input tree each one serves.
type SideTags = HashMap<EdgeId, Side>;

fn in_view(tags: &SideTags, e: EdgeId, side: Side) -> bool {
    tags.get(&e).is_none_or(|&s| s == side)
}

/// Clusters of the nodes reachable from the root through `side`'s view.
fn view_clusters(
    network: &PhyloGraph,
    tags: &SideTags,
    side: Side,
) -> Result<HashMap<NodeId, Bitset>> {
    let root = network.root()?;
    let mut memo: HashMap<NodeId, Bitset> = HashMap::new();
    let mut stack = vec![(root, false)];
    while let Some((v, expanded)) = stack.pop() {
        if memo.contains_key(&v) {
            continue;
        }
        let mut kept = Vec::new();
        for &e in network.out_edges(v)? {
            if in_view(tags, e, side) {
                kept.push(network.endpoints(e)?.1);
            }
        }
        if expanded {
            let mut cluster = network.taxa().empty_set();
            if network.out_degree(v)? == 0 {
                if let Some(idx) = network.taxon(v)? {
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
    Ok(memo)
}

/// The taxa the sibling of `component` covers in tree `side`, restricted to
/// the taxa already in the network.
fn sibling_cluster(
    pair: &TreePair,
    side: Side,
    component: &Bitset,
    added: &Bitset,
) -> Result<Bitset> {
    let tree = pair.tree(side);
    let mut v = tree.find_lca(component)?;
    if tree.cluster(v)?.intersects(added) {
        return Err(HybridError::structural(format!(
            "component root in tree {side:?} lies above attached taxa"
        )));
    }
    loop {
        let parent = tree.parent(v)?.ok_or_else(|| {
            HybridError::structural(format!("no attached taxa above a component in tree {side:?}"))
        })?;
        let sibling = tree.cluster(parent)?.intersection(added);
        if !sibling.is_empty() {
            return Ok(sibling);
        }
        v = parent;
    }
}

/// In-edge (within `side`'s view) of the lowest node whose view cluster is `target`.
/// Without such a node, the edge below the network root is used.
fn attachment_edge(
    network: &PhyloGraph,
    tags: &SideTags,
    side: Side,
    target: &Bitset,
) -> Result<EdgeId> {
    let clusters = view_clusters(network, tags, side)?;
    let mut lowest = None;
    for (&v, cluster) in &clusters {
        if cluster != target {
            continue;
        }
        let mut has_equal_child = false;
        for &e in network.out_edges(v)? {
            let child = network.endpoints(e)?.1;
            if in_view(tags, e, side) && clusters.get(&child) == Some(target) {
                has_equal_child = true;
                break;
            }
        }
        if !has_equal_child && lowest.is_none_or(|w| v < w) {
            lowest = Some(v);
        }
    }
    let Some(node) = lowest else {
        warn!("no attachment point in the {side:?} view, attaching below the root");
        let root = network.root()?;
        return network
            .out_edges(root)?
            .iter()
            .copied()
            .find(|&e| in_view(tags, e, side))
            .ok_or_else(|| HybridError::structural("network root has no out-edge"));
    };
    network
        .in_edges(node)?
        .iter()
        .copied()
        .find(|&e| in_view(tags, e, side))
        .ok_or_else(|| HybridError::structural(format!("attachment point {node} has no in-edge")))
}

/// Splits `e` with a new node. Both halves keep the flag and view of `e`;
/// the weight stays on the upper half.
fn subdivide(network: &mut PhyloGraph, tags: &mut SideTags, e: EdgeId) -> Result<NodeId> {
    let (source, target) = network.endpoints(e)?;
    let special = network.is_special(e)?;
    let weight = network.weight(e)?;
    let tag = tags.remove(&e);
    network.delete_edge(e)?;

    let x = network.new_node();
    let upper = network.new_edge(source, x)?;
    network.set_special(upper, special)?;
    network.set_weight(upper, weight)?;
    let lower = network.new_edge(x, target)?;
    network.set_special(lower, special)?;
    if let Some(side) = tag {
        tags.insert(upper, side);
        tags.insert(lower, side);
    }
    Ok(x)
}

/// Builds a network with exactly `forest.len() - 1` reticulations that
/// displays both trees of `pair`.
///
/// # Errors
/// [`HybridError::Structural`] if the forest has no root component, its
/// inheritance relation has a cycle, or it does not agree with the trees.
pub fn assemble(pair: &TreePair, forest: &AgreementForest) -> Result<PhyloGraph> {
    let order = Inheritance::new(pair, forest)?
        .topological_order()
        .ok_or_else(|| HybridError::structural("forest is not acyclic"))?;
    let components = forest.components();

    let mut network = PhyloGraph::new(pair.taxa().clone());
    let mut tags = SideTags::new();
    let top = network.new_node();

    let mut order = order.into_iter();
    let root_component = order
        .next()
        .and_then(|i| components.get(i))
        .ok_or_else(|| HybridError::structural("cannot assemble an empty forest"))?;
    let base = pair.first().restricted(root_component)?;
    let base_root = network.graft(&base, base.root()?)?;
    network.new_edge(top, base_root)?;
    let mut added = root_component.clone();

    for (k, index) in order.enumerate() {
        let component = &components[index];
        let mut parents = Vec::with_capacity(2);
        for side in Side::BOTH {
            let sibling = sibling_cluster(pair, side, component, &added)?;
            let e = attachment_edge(&network, &tags, side, &sibling)?;
            parents.push((side, subdivide(&mut network, &mut tags, e)?));
        }

        let reticulation = network.new_labeled_node(&format!("#H{}", k + 1))?;
        for (side, parent) in parents {
            let e = network.new_edge(parent, reticulation)?;
            network.set_special(e, true)?;
            network.set_weight(e, 0.0)?;
            tags.insert(e, side);
        }
        let part = pair.first().restricted(component)?;
        let part_root = network.graft(&part, part.root()?)?;
        network.new_edge(reticulation, part_root)?;
        added.or_assign(component);
        debug!(
            "attached component {} of {} below reticulation #H{}",
            index,
            components.len(),
            k + 1
        );
    }

    network.prune_to(&pair.taxa().all_taxa())?;
    network.refresh_clusters()?;

    if network.has_cycle() {
        return Err(HybridError::structural("assembled network has a directed cycle"));
    }
    let found = network.reticulations().len();
    if found != forest.reticulations() {
        return Err(HybridError::structural(format!(
            "assembled network has {found} reticulations, forest needs {}",
            forest.reticulations()
        )));
    }
    Ok(network)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::parse_tree_pair;
    use crate::snapshot::ClusterSnapshot;

    struct Fixture {
        pair: TreePair,
        t1: PhyloGraph,
        t2: PhyloGraph,
    }

    fn fixture(n1: &str, n2: &str) -> Fixture {
        let (t1, t2) = parse_tree_pair(n1, n2).unwrap();
        let pair = TreePair::new(&t1, &t2).unwrap();
        Fixture { pair, t1, t2 }
    }

    fn forest(f: &Fixture, parts: &[&[&str]]) -> AgreementForest {
        let taxa = f.pair.taxa();
        AgreementForest::new(
            parts
                .iter()
                .map(|labels| taxa.set_of(labels.iter().copied()).unwrap())
                .collect(),
        )
    }

    fn displays_both(f: &Fixture, network: &PhyloGraph) -> bool {
        let shown = ClusterSnapshot::displayed_trees(network).unwrap();
        let s1 = ClusterSnapshot::from_graph(&f.t1).unwrap();
        let s2 = ClusterSnapshot::from_graph(&f.t2).unwrap();
        shown.iter().any(|s| s.same_topology(&s1)) && shown.iter().any(|s| s.same_topology(&s2))
    }

    #[test]
    fn test_single_component_gives_tree_1() {
        let f = fixture("(((a,b),c),(d,e));", "((d,e),(c,(b,a)));");
        let all = ["#rho", "a", "b", "c", "d", "e"];
        let network = assemble(&f.pair, &forest(&f, &[&all])).unwrap();
        assert!(network.reticulations().is_empty());
        assert_eq!(network.node_count(), f.t1.node_count());
        let snap = ClusterSnapshot::from_graph(&network).unwrap();
        assert!(snap.same_topology(&ClusterSnapshot::from_graph(&f.t1).unwrap()));
        assert!(network.label(network.root().unwrap()).unwrap().is_none());
    }

    #[test]
    fn test_rogue_leaf_network() {
        let f = fixture("((((a,b),c),d),e);", "(((a,b),(c,e)),d);");
        let af = forest(&f, &[&["#rho", "a", "b", "c", "d"], &["e"]]);
        let network = assemble(&f.pair, &af).unwrap();
        let retics = network.reticulations();
        assert_eq!(retics.len(), 1);
        assert_eq!(network.label(retics[0]).unwrap(), Some("#H1"));
        for &e in network.in_edges(retics[0]).unwrap() {
            assert!(network.is_special(e).unwrap());
            assert_eq!(network.weight(e).unwrap(), 0.0);
        }
        assert!(displays_both(&f, &network));
        assert_eq!(network.leaf_labels(), vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_quartet_needs_two_reticulations() {
        let f = fixture("((a,b),(c,d));", "((a,c),(b,d));");
        let af = forest(&f, &[&["#rho", "c", "d"], &["a"], &["b"]]);
        let network = assemble(&f.pair, &af).unwrap();
        assert_eq!(network.reticulations().len(), 2);
        assert!(!network.has_cycle());
        assert!(displays_both(&f, &network));
    }

    #[test]
    fn test_cyclic_forest_is_rejected() {
        let f = fixture("((a1,(b1,b2)),a2);", "((b1,(a1,a2)),b2);");
        let af = forest(&f, &[&["#rho"], &["a1", "a2"], &["b1", "b2"]]);
        assert!(matches!(
            assemble(&f.pair, &af),
            Err(HybridError::Structural(_))
        ));
    }

    #[test]
    fn test_missing_attachment_point_falls_back_below_root() {
        let f = fixture("((a,b),(c,d));", "((a,c),(b,d));");
        let taxa = f.pair.taxa();
        let mut network = PhyloGraph::new(taxa.clone());
        let top = network.new_node();
        let base = f
            .pair
            .first()
            .restricted(&taxa.set_of(["#rho", "c", "d"]).unwrap())
            .unwrap();
        let base_root = network.graft(&base, base.root().unwrap()).unwrap();
        let below_root = network.new_edge(top, base_root).unwrap();

        let detached = taxa.set_of(["a"]).unwrap();
        for side in Side::BOTH {
            let e = attachment_edge(&network, &SideTags::new(), side, &detached).unwrap();
            assert_eq!(e, below_root);
        }
    }

    #[test]
    fn test_forest_without_root_component_is_rejected() {
        let f = fixture("((a,b),c);", "((a,b),c);");
        let taxa = f.pair.taxa();
        let af = AgreementForest::new(vec![taxa.all_taxa()]);
        assert!(assemble(&f.pair, &af).is_err());
    }
}
