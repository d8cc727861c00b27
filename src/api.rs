//! Python binding layer for hybridization number computation.
//!
//! Provides Python functions that take two Newick strings and return the
//! minimum reticulation count together with the agreement forests found.

use pyo3::exceptions::{PyTimeoutError, PyValueError};
use pyo3::prelude::*;
use std::time::Duration;

use crate::error::HybridError;
use crate::forest::compute_forests;
use crate::io::parse_tree_pair;
use crate::search::{HybridResult, HybridSearch, LogProgress, SearchConfig};

/// Compute the hybridization number of two rooted binary trees.
///
/// Args:
///     newick1: First tree in Newick format
///     newick2: Second tree in Newick format, same taxa as the first
///     threads: Worker threads (default: available cores minus one)
///     max_reticulations: Stop looking beyond this many reticulations (default: unbounded)
///     timeout_ms: Cancel the search after this many milliseconds and report the best so far
///
/// Returns:
///     A tuple of (count, forests) where:
///     - count is the minimum number of reticulations, or None if the bound was too low
///     - forests lists every minimum agreement forest as a list of taxon label lists
///
/// Raises:
///     ValueError: If a tree cannot be parsed, the taxa differ, or the search fails
///     TimeoutError: If the timeout expired before any forest was found
#[pyfunction]
#[pyo3(signature = (newick1, newick2, threads=None, max_reticulations=None, timeout_ms=None))]
fn hybridization_number(
    newick1: &str,
    newick2: &str,
    threads: Option<usize>,
    max_reticulations: Option<usize>,
    timeout_ms: Option<u64>,
) -> PyResult<(Option<usize>, Vec<Vec<Vec<String>>>)> {
    let (tree1, tree2) = parse_tree_pair(newick1, newick2)
        .map_err(|e| PyValueError::new_err(format!("Failed to read trees: {}", e)))?;

    let mut config = SearchConfig::default().with_max_reticulations(max_reticulations);
    if let Some(threads) = threads {
        config = config.with_threads(threads);
    }
    let search = HybridSearch::new(config);
    if let Some(ms) = timeout_ms {
        let token = search.token();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(ms));
            token.cancel();
        });
    }
    let result = search
        .run(&tree1, &tree2, &LogProgress)
        .and_then(HybridResult::into_found)
        .map_err(|e| match e {
            HybridError::Cancelled => PyTimeoutError::new_err(e.to_string()),
            e => PyValueError::new_err(format!("Search failed: {}", e)),
        })?;

    let taxa = tree1.taxa();
    let forests = result
        .forests()
        .iter()
        .map(|forest| forest.labels(taxa))
        .collect();
    Ok((result.reticulations(), forests))
}

/// Minimum agreement forests computed on the calling thread, without assembly.
///
/// Returns:
///     A list of forests, each a list of taxon label lists
#[pyfunction]
#[pyo3(signature = (newick1, newick2, max_reticulations=None))]
fn agreement_forests(
    newick1: &str,
    newick2: &str,
    max_reticulations: Option<usize>,
) -> PyResult<Vec<Vec<Vec<String>>>> {
    let (tree1, tree2) = parse_tree_pair(newick1, newick2)
        .map_err(|e| PyValueError::new_err(format!("Failed to read trees: {}", e)))?;
    let forests = compute_forests(&tree1, &tree2, max_reticulations)
        .map_err(|e| PyValueError::new_err(format!("Search failed: {}", e)))?;
    let taxa = tree1.taxa();
    Ok(forests.iter().map(|forest| forest.labels(taxa)).collect())
}

/// Python module definition
#[pymodule]
fn hybrid_net(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(hybridization_number, m)?)?;
    m.add_function(wrap_pyfunction!(agreement_forests, m)?)?;
    Ok(())
}
