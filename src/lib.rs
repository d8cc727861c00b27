//! Crate root: module orchestration and public re-exports.
//!
//! Modules:
//! - `bitset`: fixed-width leaf-set bitsets used as clusters and signatures.
//! - `taxa`: shared taxon ordering, root marker included.
//! - `error`: the `HybridError` taxonomy.
//! - `graph`: arena graph model for trees and hybridization networks.
//! - `snapshot`: cluster snapshots of trees and of the trees a network displays.
//! - `distances`: rooted Robinson-Foulds distance between cluster snapshots.
//! - `io`: Newick / NEXUS input via `phylotree`.
//! - `clade`: the tagged binary tree the forest search restructures.
//! - `forest`: agreement forest search (reductions, branching, bounds).
//! - `cycles`: cycle detection and cutting between forest components.
//! - `assembly`: building a network from an acyclic agreement forest.
//! - `cache`: signature cache of explored search states.
//! - `search`: parallel coordinator, configuration, progress and cancellation.
//! - `api`: Python bindings via `pyo3` (gated behind "python" feature).

pub mod bitset;
pub mod taxa;
pub mod error;
pub mod graph;
pub mod snapshot;
pub mod distances;
pub mod io;
pub mod clade;
pub mod forest;
pub mod cycles;
pub mod assembly;
pub mod cache;
pub mod search;

#[cfg(feature = "python")]
pub mod api;

// Re-export frequently used types & functions
pub use assembly::assemble;
pub use bitset::Bitset;
pub use error::{HybridError, Result};
pub use forest::{compute_forests, AgreementForest, TreePair};
pub use graph::PhyloGraph;
pub use io::{parse_tree_pair, read_tree_pair};
pub use search::{
    compute_hybrid_networks, CancellationToken, HybridResult, HybridSearch, LogProgress,
    ProgressListener, SearchConfig, SearchOutcome, WorkerState,
};
pub use snapshot::ClusterSnapshot;
pub use taxa::Taxa;
