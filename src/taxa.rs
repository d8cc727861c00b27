//! Taxon Ordering: a stable label → index mapping shared by every graph of a run.
//!
//! Taxa are sorted alphabetically so that identical label sets always map to
//! the same bit positions, no matter in which order a parser met the leaves.
//! One extra index, directly after the real taxa, is reserved for the root
//! marker leaf that the search hangs above both input trees.

use crate::bitset::Bitset;
use crate::error::{HybridError, Result};
use std::collections::HashMap;

/// Label of the reserved root marker leaf.
pub const ROOT_MARKER: &str = "#rho";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Taxa {
    labels: Vec<String>,
    index: HashMap<String, usize>,
}

impl Taxa {
    /// Builds the ordering from a collection of leaf labels.
    ///
    /// # Errors
    /// Returns [`HybridError::Structural`] for an empty label set, duplicated
    /// labels, or labels starting with `#` (that prefix is reserved for the
    /// root marker and reticulation nodes).
    pub fn new<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.is_empty() {
            return Err(HybridError::structural("taxon set is empty"));
        }
        if let Some(bad) = labels.iter().find(|l| l.starts_with('#')) {
            return Err(HybridError::structural(format!(
                "taxon label '{bad}' uses the reserved '#' prefix"
            )));
        }
        labels.sort();
        if let Some(pair) = labels.windows(2).find(|w| w[0] == w[1]) {
            return Err(HybridError::structural(format!(
                "taxon label '{}' occurs more than once",
                pair[0]
            )));
        }
        let index = labels
            .iter()
            .enumerate()
            .map(|(idx, label)| (label.clone(), idx))
            .collect();
        Ok(Taxa { labels, index })
    }

    /// Number of real taxa (the root marker is not counted).
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Number of bit positions a cluster needs, root marker included.
    pub fn width(&self) -> usize {
        self.labels.len() + 1
    }

    /// Bit index of the root marker.
    pub fn root_marker(&self) -> usize {
        self.labels.len()
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        if label == ROOT_MARKER {
            return Some(self.root_marker());
        }
        self.index.get(label).copied()
    }

    pub fn label(&self, idx: usize) -> Option<&str> {
        if idx == self.root_marker() {
            return Some(ROOT_MARKER);
        }
        self.labels.get(idx).map(String::as_str)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn empty_set(&self) -> Bitset {
        Bitset::with_width(self.width())
    }

    /// Bitset holding every real taxon (root marker excluded).
    pub fn all_taxa(&self) -> Bitset {
        let mut set = self.empty_set();
        for idx in 0..self.len() {
            set.set(idx);
        }
        set
    }

    pub fn singleton(&self, idx: usize) -> Bitset {
        let mut set = self.empty_set();
        set.set(idx);
        set
    }

    /// Resolves labels into a cluster.
    pub fn set_of<'a, I>(&self, labels: I) -> Result<Bitset>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut set = self.empty_set();
        for label in labels {
            let idx = self
                .index_of(label)
                .ok_or_else(|| HybridError::structural(format!("unknown taxon '{label}'")))?;
            set.set(idx);
        }
        Ok(set)
    }

    /// Labels of the taxa in `set`, in ordering order.
    pub fn labels_of(&self, set: &Bitset) -> Vec<String> {
        set.ones()
            .filter_map(|idx| self.label(idx).map(str::to_string))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alphabetical_indices() {
        let taxa = Taxa::new(["Human", "Chimp", "Gorilla"]).unwrap();
        assert_eq!(taxa.index_of("Chimp"), Some(0));
        assert_eq!(taxa.index_of("Gorilla"), Some(1));
        assert_eq!(taxa.index_of("Human"), Some(2));
        assert_eq!(taxa.index_of(ROOT_MARKER), Some(3));
        assert_eq!(taxa.width(), 4);
    }

    #[test]
    fn test_rejects_bad_labels() {
        assert!(Taxa::new(Vec::<String>::new()).is_err());
        assert!(Taxa::new(["a", "b", "a"]).is_err());
        assert!(Taxa::new(["a", "#H1"]).is_err());
    }

    #[test]
    fn test_set_round_trip() {
        let taxa = Taxa::new(["d", "c", "b", "a"]).unwrap();
        let set = taxa.set_of(["d", "b"]).unwrap();
        assert_eq!(set.0[0], 0b1010);
        assert_eq!(taxa.labels_of(&set), vec!["b", "d"]);
        assert!(taxa.set_of(["x"]).is_err());
        assert_eq!(taxa.all_taxa().count_ones(), 4);
        assert!(!taxa.all_taxa().get(taxa.root_marker()));
    }
}
