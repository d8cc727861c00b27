//! Compact bitset representation for leaf sets (clusters) in phylogenetic trees.
//!
//! # Overview
//! A bitset is an efficient way to represent which taxa lie below a node.
//! Each bit position corresponds to a taxon index from the shared [`Taxa`](crate::taxa::Taxa)
//! ordering.
//!
//! # Example
//! For a tree with leaves [A, B, C, D] mapped to indices [0, 1, 2, 3]:
//! - Cluster {A, C} → bitset `0b0101` (bits 0 and 2 set)
//! - Cluster {B, C, D} → bitset `0b1110` (bits 1, 2, 3 set)
//!
//! All bitsets compared with each other must have been created with the same
//! number of words; the search code guarantees this by allocating every set
//! through [`Taxa::empty_set`](crate::taxa::Taxa::empty_set).

/// A compact bitset for representing which leaves belong to a cluster.
///
/// Internally stores bits in `Vec<u64>` words to support arbitrarily large trees.
/// Each u64 word holds 64 leaf indices.
///
/// The derived ordering compares words lexicographically. It carries no
/// biological meaning but is total and stable, which is what canonical forest
/// ordering and signature encoding need.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Bitset(pub Vec<u64>);

impl Bitset {
    /// Creates a new bitset with all bits set to 0.
    ///
    /// # Parameters
    /// - `words`: Number of u64 words needed. Calculate as `(num_leaves + 63) / 64`
    ///
    /// # Example
    /// ```
    /// # use hybrid_net::bitset::Bitset;
    /// // For a tree with 100 leaves, need 2 words (128 bits)
    /// let bs = Bitset::zeros(2);
    /// assert_eq!(bs.0.len(), 2);
    /// ```
    pub fn zeros(words: usize) -> Self {
        Bitset(vec![0u64; words])
    }

    /// Creates an empty bitset able to hold `bits` indices.
    pub fn with_width(bits: usize) -> Self {
        Self::zeros(bits.div_ceil(64).max(1))
    }

    /// Sets the bit at the given index to 1.
    ///
    /// # Example
    /// ```
    /// # use hybrid_net::bitset::Bitset;
    /// let mut bs = Bitset::zeros(1);
    /// bs.set(0);  // Mark leaf 0 as present
    /// bs.set(5);  // Mark leaf 5 as present
    /// assert_eq!(bs.0[0], 0b00100001);
    /// ```
    #[inline]
    pub fn set(&mut self, idx: usize) {
        let word = idx >> 6; // Equivalent to idx / 64
        let bit = idx & 63; // Equivalent to idx % 64
        self.0[word] |= 1u64 << bit;
    }

    /// Returns whether the bit at `idx` is set. Out-of-range indices read as unset.
    #[inline]
    pub fn get(&self, idx: usize) -> bool {
        let word = idx >> 6;
        let bit = idx & 63;
        self.0.get(word).is_some_and(|w| w & (1u64 << bit) != 0)
    }

    /// Performs bitwise OR with another bitset (union operation).
    ///
    /// Merges two leaf sets: `self` becomes `self ∪ other`
    ///
    /// # Example
    /// ```
    /// # use hybrid_net::bitset::Bitset;
    /// let mut left = Bitset::zeros(1);
    /// left.set(0);   // {0}
    ///
    /// let mut right = Bitset::zeros(1);
    /// right.set(1);  // {1}
    ///
    /// left.or_assign(&right);  // {0} ∪ {1} = {0, 1}
    /// assert_eq!(left.0[0], 0b11);
    /// ```
    #[inline]
    pub fn or_assign(&mut self, other: &Bitset) {
        for (a, b) in self.0.iter_mut().zip(&other.0) {
            *a |= *b;
        }
    }

    /// Returns `self ∪ other` as a new bitset.
    pub fn union(&self, other: &Bitset) -> Bitset {
        let mut out = self.clone();
        out.or_assign(other);
        out
    }

    /// Returns `self ∩ other` as a new bitset.
    ///
    /// # Example
    /// ```
    /// # use hybrid_net::bitset::Bitset;
    /// let a = Bitset(vec![0b0111]);
    /// let b = Bitset(vec![0b1100]);
    /// assert_eq!(a.intersection(&b), Bitset(vec![0b0100]));
    /// ```
    pub fn intersection(&self, other: &Bitset) -> Bitset {
        Bitset(self.0.iter().zip(&other.0).map(|(a, b)| a & b).collect())
    }

    /// Returns `self \ other` as a new bitset.
    pub fn difference(&self, other: &Bitset) -> Bitset {
        Bitset(self.0.iter().zip(&other.0).map(|(a, b)| a & !b).collect())
    }

    /// True if every bit of `other` is also set in `self`.
    #[inline]
    pub fn is_superset(&self, other: &Bitset) -> bool {
        other.0.iter().zip(&self.0).all(|(o, s)| o & !s == 0)
    }

    /// True if `self ⊆ other` and the two sets differ.
    #[inline]
    pub fn is_proper_subset(&self, other: &Bitset) -> bool {
        other.is_superset(self) && self != other
    }

    /// True if the two sets share at least one bit.
    #[inline]
    pub fn intersects(&self, other: &Bitset) -> bool {
        self.0.iter().zip(&other.0).any(|(a, b)| a & b != 0)
    }

    /// True if no bit is set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|w| *w == 0)
    }

    /// Counts the number of set bits (population count).
    ///
    /// Returns how many leaves are in this cluster.
    ///
    /// # Example
    /// ```
    /// # use hybrid_net::bitset::Bitset;
    /// let mut bs = Bitset::zeros(1);
    /// bs.set(0);
    /// bs.set(2);
    /// bs.set(5);
    /// assert_eq!(bs.count_ones(), 3);
    /// ```
    #[inline]
    pub fn count_ones(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Index of the lowest set bit, if any.
    pub fn first_one(&self) -> Option<usize> {
        self.0
            .iter()
            .enumerate()
            .find(|(_, w)| **w != 0)
            .map(|(i, w)| i * 64 + w.trailing_zeros() as usize)
    }

    /// Iterates the indices of all set bits in increasing order.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().enumerate().flat_map(|(i, &word)| {
            let mut w = word;
            std::iter::from_fn(move || {
                if w == 0 {
                    return None;
                }
                let bit = w.trailing_zeros() as usize;
                w &= w - 1;
                Some(i * 64 + bit)
            })
        })
    }

    /// Appends the words of `other` to `self`.
    ///
    /// Each appended set occupies whole words, so two concatenations are equal
    /// exactly when their parts are equal part by part.
    pub fn extend_words(&mut self, other: &Bitset) {
        self.0.extend_from_slice(&other.0);
    }
}
