//! Signature cache: remembers search states that were already explored.
//!
//! # Signature layout
//! ```text
//! [ header word | tree-1 group 1 | ... | tree-1 group k | forest cluster 1 | ... ]
//! ```
//! The header word holds `k`, the number of tree-1 groups. Groups and forest
//! clusters are sorted and each occupies whole words, so two signatures are
//! equal exactly when both the group list and the cluster list are equal.
//! A search state is a function of exactly these two lists (reduced tree 1 is
//! tree 1 restricted to its groups, every forest component is tree 2
//! restricted to its cluster), so equal signatures never hide a different
//! subproblem.

use crate::bitset::Bitset;
use parking_lot::Mutex;
use std::collections::HashSet;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Signature(Bitset);

impl Signature {
    /// Encodes a state given its tree-1 groups and forest component clusters.
    pub fn from_parts<'a, G, F>(groups: G, clusters: F) -> Self
    where
        G: IntoIterator<Item = &'a Bitset>,
        F: IntoIterator<Item = &'a Bitset>,
    {
        let mut groups: Vec<&Bitset> = groups.into_iter().collect();
        let mut clusters: Vec<&Bitset> = clusters.into_iter().collect();
        groups.sort_unstable();
        clusters.sort_unstable();

        let words = groups.first().or(clusters.first()).map_or(0, |b| b.0.len());
        let mut encoded = Bitset(Vec::with_capacity(1 + (groups.len() + clusters.len()) * words));
        encoded.0.push(groups.len() as u64);
        for part in groups.into_iter().chain(clusters) {
            encoded.extend_words(part);
        }
        Signature(encoded)
    }

    pub fn as_bitset(&self) -> &Bitset {
        &self.0
    }
}

/// Thread-safe set of explored signatures behind a single coarse lock.
#[derive(Debug, Default)]
pub struct SignatureCache {
    seen: Mutex<HashSet<Signature>>,
}

impl SignatureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, signature: &Signature) -> bool {
        self.seen.lock().contains(signature)
    }

    /// Records `signature`; returns `true` if it was not known before.
    pub fn add(&self, signature: Signature) -> bool {
        self.seen.lock().insert(signature)
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }
}
