//! Lightweight binary tree used by the agreement forest search.
//!
//! A [`Clade`] is either a leaf labelled with a taxon *group* (a bitset; the
//! search merges agreeing cherries into one leaf) or an internal node with
//! exactly two children. Every internal node caches its cluster, and because
//! the groups of one tree are pairwise disjoint, a group is always located by
//! following the child whose cluster covers it.
//!
//! All restructuring operations consume `self` and return the new tree, so a
//! search branch that needs the old shape simply clones it first.

use crate::bitset::Bitset;
use crate::error::{HybridError, Result};
use crate::graph::{NodeId, PhyloGraph};
use crate::taxa::Taxa;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Clade {
    Leaf(Bitset),
    Internal {
        cluster: Bitset,
        children: Box<(Clade, Clade)>,
    },
}

impl Clade {
    pub fn join(left: Clade, right: Clade) -> Clade {
        let cluster = left.cluster().union(right.cluster());
        Clade::Internal {
            cluster,
            children: Box::new((left, right)),
        }
    }

    pub fn cluster(&self) -> &Bitset {
        match self {
            Clade::Leaf(group) => group,
            Clade::Internal { cluster, .. } => cluster,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Clade::Leaf(_))
    }

    pub fn leaf_group(&self) -> Option<&Bitset> {
        match self {
            Clade::Leaf(group) => Some(group),
            Clade::Internal { .. } => None,
        }
    }

    /// Builds the clade below `v` of a binary tree, one singleton group per leaf.
    pub fn from_graph(graph: &PhyloGraph, v: NodeId) -> Result<Clade> {
        let children = graph.children(v)?;
        match children.as_slice() {
            [] => {
                let taxon = graph.taxon(v)?.ok_or_else(|| {
                    HybridError::structural(format!("leaf {v} has no taxon label"))
                })?;
                Ok(Clade::Leaf(graph.taxa().singleton(taxon)))
            }
            [left, right] => Ok(Clade::join(
                Clade::from_graph(graph, *left)?,
                Clade::from_graph(graph, *right)?,
            )),
            other => Err(HybridError::structural(format!(
                "node {v} has {} children, expected a binary tree",
                other.len()
            ))),
        }
    }

    /// Leaf groups from left to right.
    pub fn groups(&self) -> Vec<&Bitset> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                Clade::Leaf(group) => out.push(group),
                Clade::Internal { children, .. } => {
                    stack.push(&children.1);
                    stack.push(&children.0);
                }
            }
        }
        out
    }

    /// Every cherry (internal node with two leaf children), leftmost first.
    pub fn cherries(&self) -> Vec<(&Bitset, &Bitset)> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if let Clade::Internal { children, .. } = node {
                if let (Clade::Leaf(a), Clade::Leaf(b)) = (&children.0, &children.1) {
                    out.push((a, b));
                } else {
                    stack.push(&children.1);
                    stack.push(&children.0);
                }
            }
        }
        out
    }

    /// Leftmost cherry.
    pub fn find_cherry(&self) -> Option<(&Bitset, &Bitset)> {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if let Clade::Internal { children, .. } = node {
                if let (Clade::Leaf(a), Clade::Leaf(b)) = (&children.0, &children.1) {
                    return Some((a, b));
                }
                stack.push(&children.1);
                stack.push(&children.0);
            }
        }
        None
    }

    /// The subtree hanging next to leaf `group`, if `group` is a leaf here.
    pub fn sibling_of(&self, group: &Bitset) -> Option<&Clade> {
        let mut node = self;
        loop {
            let Clade::Internal { cluster, children } = node else {
                return None;
            };
            if !cluster.is_superset(group) {
                return None;
            }
            let (left, right) = (&children.0, &children.1);
            if left.leaf_group() == Some(group) {
                return Some(right);
            }
            if right.leaf_group() == Some(group) {
                return Some(left);
            }
            node = if left.cluster().is_superset(group) { left } else { right };
        }
    }

    pub fn are_siblings(&self, a: &Bitset, b: &Bitset) -> bool {
        self.sibling_of(a).and_then(Clade::leaf_group) == Some(b)
    }

    /// Removes leaf `group` and suppresses its parent. `None` if nothing is left.
    pub fn remove_leaf(self, group: &Bitset) -> Option<Clade> {
        match self {
            Clade::Leaf(g) => {
                if &g == group {
                    None
                } else {
                    Some(Clade::Leaf(g))
                }
            }
            Clade::Internal { cluster, children } => {
                if !cluster.is_superset(group) {
                    return Some(Clade::Internal { cluster, children });
                }
                let (left, right) = *children;
                if left.cluster().is_superset(group) {
                    Some(match left.remove_leaf(group) {
                        Some(rest) => Clade::join(rest, right),
                        None => right,
                    })
                } else {
                    Some(match right.remove_leaf(group) {
                        Some(rest) => Clade::join(left, rest),
                        None => left,
                    })
                }
            }
        }
    }

    /// Replaces the cherry `{a, b}` by a single leaf `a ∪ b`.
    pub fn contract(self, a: &Bitset, b: &Bitset) -> Clade {
        let (cluster, children) = match self {
            Clade::Internal { cluster, children } => (cluster, children),
            leaf => return leaf,
        };
        let merged = a.union(b);
        if !cluster.is_superset(&merged) {
            return Clade::Internal { cluster, children };
        }
        let (left, right) = *children;
        let is_cherry = matches!(
            (&left, &right),
            (Clade::Leaf(x), Clade::Leaf(y)) if (x == a && y == b) || (x == b && y == a)
        );
        if is_cherry {
            Clade::Leaf(merged)
        } else if left.cluster().is_superset(&merged) {
            Clade::join(left.contract(a, b), right)
        } else if right.cluster().is_superset(&merged) {
            Clade::join(left, right.contract(a, b))
        } else {
            Clade::join(left, right)
        }
    }

    /// Cuts every subtree hanging off the path from here down to leaf `group`.
    /// Returns the bare leaf; the cut subtrees are pushed to `pendants`.
    fn strip_towards(self, group: &Bitset, pendants: &mut Vec<Clade>) -> Clade {
        match self {
            Clade::Internal { children, .. } => {
                let (left, right) = *children;
                if left.cluster().is_superset(group) {
                    pendants.push(right);
                    left.strip_towards(group, pendants)
                } else {
                    pendants.push(left);
                    right.strip_towards(group, pendants)
                }
            }
            leaf => leaf,
        }
    }

    /// Cuts every pendant subtree on the path between leaves `a` and `b`,
    /// which leaves `a` and `b` as a cherry.
    pub fn strip_path(self, a: &Bitset, b: &Bitset, pendants: &mut Vec<Clade>) -> Clade {
        let children = match self {
            Clade::Internal { children, .. } => children,
            leaf => return leaf,
        };
        let (left, right) = *children;
        let both = a.union(b);
        if left.cluster().is_superset(&both) {
            Clade::join(left.strip_path(a, b, pendants), right)
        } else if right.cluster().is_superset(&both) {
            Clade::join(left, right.strip_path(a, b, pendants))
        } else if left.cluster().is_superset(a) {
            let left = left.strip_towards(a, pendants);
            Clade::join(left, right.strip_towards(b, pendants))
        } else {
            let left = left.strip_towards(b, pendants);
            Clade::join(left, right.strip_towards(a, pendants))
        }
    }

    /// Newick-like rendering for log output; groups print as `{x+y}`.
    pub fn render(&self, taxa: &Taxa) -> String {
        match self {
            Clade::Leaf(group) => {
                let labels = taxa.labels_of(group);
                if labels.len() == 1 {
                    labels.concat()
                } else {
                    format!("{{{}}}", labels.join("+"))
                }
            }
            Clade::Internal { children, .. } => {
                format!("({},{})", children.0.render(taxa), children.1.render(taxa))
            }
        }
    }
}
