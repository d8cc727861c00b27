//! Agreement forest engine.
//!
//! # Overview
//! The search works on a [`SearchState`]: a reduced copy of tree 1 (a
//! [`Clade`]) and a forest obtained from tree 2 by cutting edges. Leaves of
//! both are taxon *groups*; a group is a subtree the two sides already agree on.
//!
//! Before every branching decision two reductions are applied until neither
//! fires:
//! 1. a tree-1 leaf that is an isolated forest component is dropped from tree 1
//! 2. a tree-1 cherry whose two leaves are also siblings in the forest is
//!    contracted to one leaf on both sides
//!
//! The search then branches on the leftmost tree-1 cherry `{a, c}`:
//!
//! | forest situation          | branches                                   |
//! |---------------------------|--------------------------------------------|
//! | different components      | isolate `a` / isolate `c`                  |
//! | same component            | isolate `a` / isolate `c` / cut every      |
//! |                           | pendant subtree on the path `a .. c`       |
//!
//! Every branch adds at least one component. When tree 1 has shrunk to a
//! single leaf the forest components form an agreement forest, which is then
//! made acyclic by [`cycles::run`] and handed to a [`ForestSink`].

use crate::bitset::Bitset;
use crate::cache::{Signature, SignatureCache};
use crate::clade::Clade;
use crate::cycles;
use crate::error::{HybridError, Result};
use crate::graph::PhyloGraph;
use crate::taxa::Taxa;
use log::debug;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

/// Which input tree a piece of structure comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    First,
    Second,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::First, Side::Second];
}

/// The two input trees, prepared for the search.
///
/// Both are private deep copies with the root marker leaf attached above the
/// original root and all clusters computed, so they can be shared read-only
/// between worker threads.
#[derive(Debug)]
pub struct TreePair {
    taxa: Arc<Taxa>,
    first: PhyloGraph,
    second: PhyloGraph,
}

impl TreePair {
    /// # Errors
    /// [`HybridError::Structural`] if the trees use different taxon orderings,
    /// are not binary, or do not cover every taxon exactly once.
    pub fn new(tree1: &PhyloGraph, tree2: &PhyloGraph) -> Result<Self> {
        let taxa = tree1.taxa().clone();
        if !Arc::ptr_eq(&taxa, tree2.taxa()) && *taxa != **tree2.taxa() {
            return Err(HybridError::structural(
                "input trees are defined over different taxon sets",
            ));
        }
        Ok(TreePair {
            taxa,
            first: Self::prepare(tree1)?,
            second: Self::prepare(tree2)?,
        })
    }

    fn prepare(tree: &PhyloGraph) -> Result<PhyloGraph> {
        let (mut copy, _) = tree.deep_copy()?;
        copy.suppress_unary()?;
        copy.validate_binary_tree()?;
        copy.attach_root_marker()?;
        copy.refresh_clusters()?;
        Ok(copy)
    }

    pub fn taxa(&self) -> &Arc<Taxa> {
        &self.taxa
    }

    pub fn tree(&self, side: Side) -> &PhyloGraph {
        match side {
            Side::First => &self.first,
            Side::Second => &self.second,
        }
    }

    pub fn first(&self) -> &PhyloGraph {
        &self.first
    }

    pub fn second(&self) -> &PhyloGraph {
        &self.second
    }

    /// All taxa plus the root marker.
    pub fn full_set(&self) -> Bitset {
        let mut set = self.taxa.all_taxa();
        set.set(self.taxa.root_marker());
        set
    }
}

/// A partition of the taxa (root marker included) into components.
///
/// Components are kept sorted, so equal forests compare equal and sets of
/// forests iterate in a stable order.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AgreementForest {
    components: Vec<Bitset>,
}

impl AgreementForest {
    pub fn new(mut components: Vec<Bitset>) -> Self {
        components.sort_unstable();
        AgreementForest { components }
    }

    pub fn components(&self) -> &[Bitset] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Reticulations of a network built from this forest.
    pub fn reticulations(&self) -> usize {
        self.components.len().saturating_sub(1)
    }

    /// Index of the component holding the root marker.
    pub fn root_component(&self, taxa: &Taxa) -> Option<usize> {
        let marker = taxa.root_marker();
        self.components.iter().position(|c| c.get(marker))
    }

    /// Replaces component `index` by two parts.
    pub fn split(&self, index: usize, left: Bitset, right: Bitset) -> AgreementForest {
        let mut components = self.components.clone();
        components.swap_remove(index);
        components.push(left);
        components.push(right);
        AgreementForest::new(components)
    }

    /// Taxon labels per component, root marker left out. A component that
    /// only held the marker is skipped.
    pub fn labels(&self, taxa: &Taxa) -> Vec<Vec<String>> {
        let real = taxa.all_taxa();
        self.components
            .iter()
            .map(|c| taxa.labels_of(&c.intersection(&real)))
            .filter(|labels| !labels.is_empty())
            .collect()
    }
}

/// One node of the search tree.
#[derive(Clone, Debug)]
pub struct SearchState {
    tree: Clade,
    forest: Vec<Clade>,
}

/// What [`SearchState::branch`] produced.
#[derive(Debug)]
pub enum Branching {
    /// Tree 1 is fully reduced; the forest is an agreement forest.
    Terminal(AgreementForest),
    /// Child states, each with at least one more component.
    Branches(Vec<SearchState>),
}

impl SearchState {
    /// Initial state: tree 1 and a one-component forest holding tree 2.
    pub fn new(pair: &TreePair) -> Result<Self> {
        let first = pair.first();
        let second = pair.second();
        Ok(SearchState {
            tree: Clade::from_graph(first, first.root()?)?,
            forest: vec![Clade::from_graph(second, second.root()?)?],
        })
    }

    pub fn tree(&self) -> &Clade {
        &self.tree
    }

    pub fn forest(&self) -> &[Clade] {
        &self.forest
    }

    /// Edges cut so far (components - 1).
    pub fn cuts(&self) -> usize {
        self.forest.len().saturating_sub(1)
    }

    pub fn signature(&self) -> Signature {
        Signature::from_parts(self.tree.groups(), self.forest.iter().map(Clade::cluster))
    }

    fn component_of(&self, group: &Bitset) -> Result<usize> {
        self.forest
            .iter()
            .position(|c| c.cluster().is_superset(group))
            .ok_or_else(|| HybridError::structural("taxon group missing from the forest"))
    }

    fn take_tree(&mut self) -> Clade {
        std::mem::replace(&mut self.tree, Clade::Leaf(Bitset(Vec::new())))
    }

    /// Makes `group` a component of its own.
    fn isolate(&mut self, group: &Bitset) -> Result<()> {
        let idx = self.component_of(group)?;
        let component = self.forest.remove(idx);
        if let Some(rest) = component.remove_leaf(group) {
            self.forest.insert(idx, rest);
        }
        self.forest.push(Clade::Leaf(group.clone()));
        Ok(())
    }

    /// Cuts every pendant subtree between `a` and `c` in their common component.
    fn strip(&mut self, a: &Bitset, c: &Bitset) -> Result<()> {
        let idx = self.component_of(a)?;
        let component = self.forest.remove(idx);
        let mut pendants = Vec::new();
        self.forest.insert(idx, component.strip_path(a, c, &mut pendants));
        self.forest.extend(pendants);
        Ok(())
    }

    /// Applies the two reductions until neither fires.
    pub fn reduce(&mut self) -> Result<()> {
        loop {
            if self.tree.is_leaf() {
                return Ok(());
            }

            let isolated: HashSet<&Bitset> =
                self.forest.iter().filter_map(Clade::leaf_group).collect();
            let lone = self
                .tree
                .groups()
                .into_iter()
                .find(|g| isolated.contains(g))
                .cloned();
            if let Some(group) = lone {
                let tree = self.take_tree();
                self.tree = tree.remove_leaf(&group).ok_or_else(|| {
                    HybridError::structural("reduction emptied tree 1")
                })?;
                continue;
            }

            let mut agreeing = None;
            for (a, c) in self.tree.cherries() {
                let idx = self.component_of(a)?;
                if self.forest[idx].are_siblings(a, c) {
                    agreeing = Some((idx, a.clone(), c.clone()));
                    break;
                }
            }
            if let Some((idx, a, c)) = agreeing {
                let tree = self.take_tree();
                self.tree = tree.contract(&a, &c);
                let component = self.forest.remove(idx);
                self.forest.insert(idx, component.contract(&a, &c));
                continue;
            }

            return Ok(());
        }
    }

    /// Reduces the state and either reports the agreement forest it reached
    /// or splits it into child states.
    pub fn branch(mut self) -> Result<Branching> {
        self.reduce()?;
        if self.tree.is_leaf() {
            let components = self.forest.iter().map(|c| c.cluster().clone()).collect();
            return Ok(Branching::Terminal(AgreementForest::new(components)));
        }

        let (a, c) = self
            .tree
            .find_cherry()
            .map(|(a, c)| (a.clone(), c.clone()))
            .ok_or_else(|| HybridError::structural("reduced tree 1 has no cherry"))?;
        let same_component = self.component_of(&a)? == self.component_of(&c)?;

        let mut children = Vec::with_capacity(3);
        let mut cut_a = self.clone();
        cut_a.isolate(&a)?;
        children.push(cut_a);
        let mut cut_c = self.clone();
        cut_c.isolate(&c)?;
        children.push(cut_c);
        if same_component {
            self.strip(&a, &c)?;
            children.push(self);
        }
        Ok(Branching::Branches(children))
    }
}

/// Outcome of exploring one subtree of the search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expansion {
    /// At least one terminal state was reached and reported.
    Explored,
    /// Every branch was cut off by the bound or the cache.
    Pruned,
    /// The cancellation flag was observed.
    Cancelled,
}

/// Receiver of search results and source of the pruning bound.
pub trait ForestSink {
    /// Current best reticulation count; states with more cuts are pruned.
    fn bound(&self) -> usize;

    fn is_cancelled(&self) -> bool;

    /// Returns `false` if an equivalent state was already explored.
    fn admit(&self, state: &SearchState) -> bool;

    /// Offers an acyclic agreement forest.
    fn accept(&self, forest: AgreementForest);
}

/// Best forests seen so far; all kept forests share the lowest score.
#[derive(Debug, Default)]
pub struct BestForests {
    score: Option<usize>,
    forests: BTreeSet<AgreementForest>,
}

impl BestForests {
    /// Keeps `forest` if it ties or beats the current score. Returns the
    /// score after the offer.
    pub fn offer(&mut self, forest: AgreementForest) -> usize {
        let r = forest.reticulations();
        match self.score {
            Some(best) if r > best => {}
            Some(best) if r == best => {
                self.forests.insert(forest);
            }
            _ => {
                self.score = Some(r);
                self.forests.clear();
                self.forests.insert(forest);
            }
        }
        self.score.unwrap_or(r)
    }

    pub fn score(&self) -> Option<usize> {
        self.score
    }

    pub fn into_forests(self) -> BTreeSet<AgreementForest> {
        self.forests
    }
}

/// Depth-first exploration of the subtree below `state`.
///
/// `state` itself must already have been admitted by the caller; children are
/// admitted here before they are entered.
pub fn explore<S>(pair: &TreePair, state: SearchState, sink: &S) -> Result<Expansion>
where
    S: ForestSink + ?Sized,
{
    if sink.is_cancelled() {
        return Ok(Expansion::Cancelled);
    }
    if state.cuts() > sink.bound() {
        return Ok(Expansion::Pruned);
    }
    match state.branch()? {
        Branching::Terminal(forest) => {
            let raw = forest.len();
            let forest = cycles::run(pair, forest)?;
            if forest.len() != raw {
                debug!("cycle cutting grew a forest from {raw} to {} components", forest.len());
            }
            sink.accept(forest);
            Ok(Expansion::Explored)
        }
        Branching::Branches(children) => {
            let mut outcome = Expansion::Pruned;
            for child in children {
                if child.cuts() > sink.bound() || !sink.admit(&child) {
                    continue;
                }
                match explore(pair, child, sink)? {
                    Expansion::Cancelled => return Ok(Expansion::Cancelled),
                    Expansion::Explored => outcome = Expansion::Explored,
                    Expansion::Pruned => {}
                }
            }
            Ok(outcome)
        }
    }
}

/// Single-threaded sink used by [`compute_forests`].
struct Collector {
    bound: Cell<usize>,
    best: RefCell<BestForests>,
    cache: SignatureCache,
}

impl ForestSink for Collector {
    fn bound(&self) -> usize {
        self.bound.get()
    }

    fn is_cancelled(&self) -> bool {
        false
    }

    fn admit(&self, state: &SearchState) -> bool {
        self.cache.add(state.signature())
    }

    fn accept(&self, forest: AgreementForest) {
        if forest.reticulations() > self.bound.get() {
            return;
        }
        let score = self.best.borrow_mut().offer(forest);
        self.bound.set(self.bound.get().min(score));
    }
}

/// Computes every minimum acyclic agreement forest found by the search,
/// single-threaded. Forests needing more than `max_reticulations` are not
/// reported, so the result may be empty when a bound is given.
pub fn compute_forests(
    tree1: &PhyloGraph,
    tree2: &PhyloGraph,
    max_reticulations: Option<usize>,
) -> Result<BTreeSet<AgreementForest>> {
    let pair = TreePair::new(tree1, tree2)?;
    let collector = Collector {
        bound: Cell::new(max_reticulations.unwrap_or(usize::MAX)),
        best: RefCell::new(BestForests::default()),
        cache: SignatureCache::new(),
    };
    let start = SearchState::new(&pair)?;
    collector.admit(&start);
    explore(&pair, start, &collector)?;
    Ok(collector.best.into_inner().into_forests())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::parse_tree_pair;

    fn pair(n1: &str, n2: &str) -> TreePair {
        let (t1, t2) = parse_tree_pair(n1, n2).unwrap();
        TreePair::new(&t1, &t2).unwrap()
    }

    #[test]
    fn test_identical_trees_reduce_to_terminal() {
        let p = pair("((a,b),(c,d));", "((c,d),(b,a));");
        let state = SearchState::new(&p).unwrap();
        match state.branch().unwrap() {
            Branching::Terminal(forest) => {
                assert_eq!(forest.len(), 1);
                assert_eq!(forest.components()[0], p.full_set());
            }
            Branching::Branches(_) => panic!("identical trees need no cut"),
        }
    }

    #[test]
    fn test_branching_on_quartet() {
        let p = pair("((a,b),(c,d));", "((a,c),(b,d));");
        let state = SearchState::new(&p).unwrap();
        let Branching::Branches(children) = state.branch().unwrap() else {
            panic!("quartet must branch");
        };
        // a and b share the single component but are not siblings
        assert_eq!(children.len(), 3);
        assert!(children.iter().all(|c| c.cuts() >= 1));
        // cutting the pendants between a and b removes c and d
        assert_eq!(children[2].cuts(), 2);
    }

    #[test]
    fn test_rogue_leaf_needs_one_cut() {
        let (t1, t2) = parse_tree_pair("((((a,b),c),d),e);", "(((a,b),(c,e)),d);").unwrap();
        let forests = compute_forests(&t1, &t2, None).unwrap();
        assert!(!forests.is_empty());
        assert!(forests.iter().all(|f| f.reticulations() == 1));
        let taxa = t1.taxa();
        let e = taxa.set_of(["e"]).unwrap();
        assert!(forests.iter().any(|f| f.components().contains(&e)));
    }

    #[test]
    fn test_bound_filters_results() {
        let (t1, t2) = parse_tree_pair("((a,b),(c,d));", "((a,c),(b,d));").unwrap();
        assert!(compute_forests(&t1, &t2, Some(1)).unwrap().is_empty());
        let forests = compute_forests(&t1, &t2, Some(2)).unwrap();
        assert!(!forests.is_empty());
        assert!(forests.iter().all(|f| f.reticulations() == 2));
    }

    #[test]
    fn test_best_forests_keeps_ties() {
        let mut best = BestForests::default();
        let f = |words: &[u64]| {
            AgreementForest::new(words.iter().map(|w| Bitset(vec![*w])).collect())
        };
        assert_eq!(best.offer(f(&[0b0011, 0b1100])), 1);
        assert_eq!(best.offer(f(&[0b0101, 0b1010])), 1);
        assert_eq!(best.offer(f(&[0b0001, 0b0010, 0b1100])), 1);
        assert_eq!(best.score(), Some(1));
        assert_eq!(best.offer(f(&[0b1111])), 0);
        assert_eq!(best.into_forests().len(), 1);
    }

    #[test]
    fn test_forest_labels_skip_marker() {
        let taxa = Taxa::new(["a", "b"]).unwrap();
        let mut rho = taxa.empty_set();
        rho.set(taxa.root_marker());
        let forest = AgreementForest::new(vec![rho, taxa.all_taxa()]);
        assert_eq!(forest.root_component(&taxa), Some(1));
        assert_eq!(forest.labels(&taxa), vec![vec!["a".to_string(), "b".to_string()]]);
    }
}
