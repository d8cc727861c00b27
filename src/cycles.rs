//! Cycle detection and cutting for agreement forests.
//!
//! Each component `C` has a root in either tree: the LCA of its taxa. The
//! inheritance relation has an edge `i -> j` whenever the root of `C_i` is a
//! proper ancestor of the root of `C_j` in tree 1 or in tree 2. A network can
//! be assembled from the forest only if this relation is acyclic.
//!
//! A cycle is removed by bisecting a component on it at the two children of
//! its tree-1 root. Each cut adds a component and components never become
//! smaller than one taxon, so [`run`] terminates. The choice of which
//! component to bisect is a heuristic: it always yields an acyclic forest but
//! not necessarily one of minimum size.

use crate::bitset::Bitset;
use crate::error::{HybridError, Result};
use crate::forest::{AgreementForest, Side, TreePair};
use log::debug;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Directed ancestor relation among the components of one forest.
#[derive(Debug, Clone)]
pub struct Inheritance {
    successors: Vec<Vec<usize>>,
    root: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    New,
    Active,
    Done,
}

impl Inheritance {
    pub fn new(pair: &TreePair, forest: &AgreementForest) -> Result<Self> {
        let root = forest
            .root_component(pair.taxa())
            .ok_or_else(|| HybridError::structural("forest has no component with the root marker"))?;

        // LCA cluster of every component, per side
        let mut lca_clusters: Vec<Vec<Bitset>> = Vec::with_capacity(forest.len());
        for component in forest.components() {
            let mut clusters = Vec::with_capacity(2);
            for side in Side::BOTH {
                let tree = pair.tree(side);
                let lca = tree.find_lca(component)?;
                clusters.push(tree.cluster(lca)?.clone());
            }
            lca_clusters.push(clusters);
        }

        let successors = (0..forest.len())
            .map(|i| {
                (0..forest.len())
                    .filter(|&j| {
                        j != i
                            && j != root
                            && (i == root
                                || lca_clusters[j][0].is_proper_subset(&lca_clusters[i][0])
                                || lca_clusters[j][1].is_proper_subset(&lca_clusters[i][1]))
                    })
                    .collect()
            })
            .collect();
        Ok(Inheritance { successors, root })
    }

    pub fn len(&self) -> usize {
        self.successors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.successors.is_empty()
    }

    pub fn successors(&self, i: usize) -> &[usize] {
        &self.successors[i]
    }

    /// Two consecutive components `(u, v)` on some directed cycle, `u -> v`.
    pub fn find_cycle(&self) -> Option<(usize, usize)> {
        let n = self.successors.len();
        let mut mark = vec![Mark::New; n];
        for start in 0..n {
            if mark[start] != Mark::New {
                continue;
            }
            // (node, index of the next successor to visit)
            let mut stack = vec![(start, 0usize)];
            mark[start] = Mark::Active;
            while let Some(top) = stack.last_mut() {
                let (u, next) = *top;
                top.1 += 1;
                match self.successors[u].get(next) {
                    Some(&v) => match mark[v] {
                        Mark::Active => return Some((u, v)),
                        Mark::New => {
                            mark[v] = Mark::Active;
                            stack.push((v, 0));
                        }
                        Mark::Done => {}
                    },
                    None => {
                        mark[u] = Mark::Done;
                        stack.pop();
                    }
                }
            }
        }
        None
    }

    /// Ancestors-first order starting at the root component; ties go to the
    /// lower index. `None` if the relation has a cycle.
    pub fn topological_order(&self) -> Option<Vec<usize>> {
        let n = self.successors.len();
        let mut indegree = vec![0usize; n];
        for succ in &self.successors {
            for &j in succ {
                indegree[j] += 1;
            }
        }
        let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
            .filter(|&i| indegree[i] == 0 && i != self.root)
            .map(Reverse)
            .collect();
        let mut order = Vec::with_capacity(n);
        let mut next = (indegree[self.root] == 0).then_some(self.root);
        while let Some(u) = next.take().or_else(|| ready.pop().map(|Reverse(u)| u)) {
            order.push(u);
            for &v in &self.successors[u] {
                indegree[v] -= 1;
                if indegree[v] == 0 {
                    ready.push(Reverse(v));
                }
            }
        }
        (order.len() == n).then_some(order)
    }
}

/// Finds two components with contradicting ancestor order, if any.
pub fn find_cycle(pair: &TreePair, forest: &AgreementForest) -> Result<Option<(usize, usize)>> {
    Ok(Inheritance::new(pair, forest)?.find_cycle())
}

/// Bisects the first component of `cycle` at the children of its tree-1 root.
pub fn cut_cycle_pair(
    pair: &TreePair,
    forest: &AgreementForest,
    cycle: (usize, usize),
) -> Result<AgreementForest> {
    let (u, _) = cycle;
    let component = forest
        .components()
        .get(u)
        .ok_or_else(|| HybridError::structural(format!("forest has no component {u}")))?;
    let tree = pair.first();
    let lca = tree.find_lca(component)?;
    let children = tree.children(lca)?;
    let [left, _right] = children.as_slice() else {
        return Err(HybridError::structural(
            "component on a cycle has no binary root in tree 1",
        ));
    };
    let left_part = component.intersection(tree.cluster(*left)?);
    let right_part = component.difference(&left_part);
    if left_part.is_empty() || right_part.is_empty() {
        return Err(HybridError::structural("bisection produced an empty component"));
    }
    Ok(forest.split(u, left_part, right_part))
}

/// Cuts cycles until the forest is acyclic.
pub fn run(pair: &TreePair, mut forest: AgreementForest) -> Result<AgreementForest> {
    while let Some(cycle) = find_cycle(pair, &forest)? {
        debug!(
            "cutting cycle between components {} and {} of {}",
            cycle.0,
            cycle.1,
            forest.len()
        );
        forest = cut_cycle_pair(pair, &forest, cycle)?;
    }
    Ok(forest)
}
