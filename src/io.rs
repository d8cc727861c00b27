//! Reading input trees and converting them into the graph model.
//!
//! Newick parsing itself is delegated to `phylotree`; this module cleans the
//! text, resolves a shared [`Taxa`] ordering for both trees and copies them
//! into [`PhyloGraph`] instances.

use crate::error::{HybridError, Result};
use crate::graph::PhyloGraph;
use crate::taxa::Taxa;
use phylotree::tree::Tree;
use std::collections::HashMap;
use std::fs;
use std::panic::catch_unwind;
use std::path::Path;
use std::sync::Arc;

/// Strip BEAST annotations from Newick strings.
///
/// BEAST format includes annotations like :[&rate=0.123]2.45 where 2.45 is the actual branch length.
/// This function removes the [&...] annotations while preserving the branch lengths.
fn strip_beast_annotations(newick: &str) -> String {
    let mut result = String::with_capacity(newick.len());
    let mut in_annotation = false;
    let mut chars = newick.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '[' && chars.peek() == Some(&'&') {
            in_annotation = true;
        } else if ch == ']' && in_annotation {
            in_annotation = false;
        } else if !in_annotation {
            result.push(ch);
        }
    }

    result
}

/// Parse one Newick string (BEAST annotations allowed).
///
/// # Errors
/// [`HybridError::Parse`] for malformed text and for trees without an
/// internal node, which `phylotree` cannot represent.
pub fn parse_newick(newick: &str) -> Result<Tree> {
    let cleaned = strip_beast_annotations(newick.trim());
    if !cleaned.contains('(') {
        return Err(HybridError::Parse(format!(
            "tree has no internal node: {}",
            newick.trim()
        )));
    }
    match catch_unwind(|| Tree::from_newick(&cleaned)) {
        Ok(parsed) => {
            parsed.map_err(|e| HybridError::Parse(format!("{e}: {}", newick.trim())))
        }
        Err(_) => Err(HybridError::Parse(format!(
            "Newick parser aborted: {}",
            newick.trim()
        ))),
    }
}

/// Names of all leaves of a parsed tree.
///
/// # Errors
/// Unnamed leaves are rejected with [`HybridError::Structural`].
pub fn leaf_names(tree: &Tree) -> Result<Vec<String>> {
    tree.get_leaves()
        .iter()
        .map(|leaf_id| {
            let node = tree
                .get(leaf_id)
                .map_err(|e| HybridError::structural(e.to_string()))?;
            node.name
                .clone()
                .filter(|n| !n.is_empty())
                .ok_or_else(|| HybridError::structural("tree has an unnamed leaf"))
        })
        .collect()
}

/// Copy a parsed tree into the graph model.
///
/// Leaf names become node labels, internal names are dropped, branch lengths
/// become edge weights (missing lengths read as 0.0). Clusters are computed.
pub fn from_phylotree(tree: &Tree, taxa: Arc<Taxa>) -> Result<PhyloGraph> {
    let mut graph = PhyloGraph::new(taxa);
    let root_id = tree
        .get_root()
        .map_err(|e| HybridError::structural(e.to_string()))?;
    let root = graph.new_node();

    let mut stack = vec![(root_id, root)];
    while let Some((src_id, node)) = stack.pop() {
        let src = tree
            .get(&src_id)
            .map_err(|e| HybridError::structural(e.to_string()))?;
        if src.children.is_empty() {
            let name = src
                .name
                .as_deref()
                .ok_or_else(|| HybridError::structural("tree has an unnamed leaf"))?;
            if graph.taxa().index_of(name).is_none() {
                return Err(HybridError::structural(format!("unknown taxon '{name}'")));
            }
            graph.set_label(node, name)?;
            continue;
        }
        for &child_id in &src.children {
            let child = graph.new_node();
            let edge = graph.new_edge(node, child)?;
            let length = tree
                .get(&child_id)
                .map_err(|e| HybridError::structural(e.to_string()))?
                .parent_edge
                .unwrap_or(0.0);
            graph.set_weight(edge, length)?;
            stack.push((child_id, child));
        }
    }

    graph.refresh_clusters()?;
    Ok(graph)
}

/// Convert two parsed trees into graphs over one shared taxon ordering.
///
/// # Errors
/// [`HybridError::Structural`] if the trees do not have identical leaf sets.
pub fn graphs_from_phylotrees(tree1: &Tree, tree2: &Tree) -> Result<(PhyloGraph, PhyloGraph)> {
    let mut names1 = leaf_names(tree1)?;
    let mut names2 = leaf_names(tree2)?;
    names1.sort();
    names2.sort();
    if names1 != names2 {
        return Err(HybridError::structural(format!(
            "trees have different leaf sets ({} vs {} leaves)",
            names1.len(),
            names2.len()
        )));
    }
    let taxa = Arc::new(Taxa::new(names1)?);
    Ok((
        from_phylotree(tree1, taxa.clone())?,
        from_phylotree(tree2, taxa)?,
    ))
}

/// Parse two Newick strings into graphs over a shared taxon ordering.
pub fn parse_tree_pair(newick1: &str, newick2: &str) -> Result<(PhyloGraph, PhyloGraph)> {
    let t1 = parse_newick(newick1)?;
    let t2 = parse_newick(newick2)?;
    graphs_from_phylotrees(&t1, &t2)
}

/// Read the first two trees of a file.
///
/// Two layouts are understood:
/// - NEXUS with a `TREES` block (`tree NAME = (...);`), a `TRANSLATE` table is applied
/// - plain text with one Newick tree per line; blank lines and `#` comments are skipped
pub fn read_tree_pair<P: AsRef<Path>>(path: P) -> Result<(Tree, Tree)> {
    let content = fs::read_to_string(path.as_ref())?;

    let bodies: Vec<String> = if content.trim_start().to_ascii_uppercase().starts_with("#NEXUS") {
        collect_tree_blocks(&content)
    } else {
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect()
    };

    if bodies.len() < 2 {
        return Err(HybridError::Parse(format!(
            "{} holds {} tree(s), two are needed",
            path.as_ref().display(),
            bodies.len()
        )));
    }
    if bodies.len() > 2 {
        log::warn!(
            "{} holds {} trees, using the first two",
            path.as_ref().display(),
            bodies.len()
        );
    }

    let translate = parse_taxon_block(&content);
    let mut first = parse_newick(&bodies[0])?;
    let mut second = parse_newick(&bodies[1])?;
    if !translate.is_empty() {
        rename_leaf_nodes(&mut first, &translate);
        rename_leaf_nodes(&mut second, &translate);
    }
    Ok((first, second))
}

/// Bodies of the `tree NAME = ...;` lines of a NEXUS trees block.
fn collect_tree_blocks(content: &str) -> Vec<String> {
    content
        .lines()
        .skip_while(|line| !line.trim().to_ascii_uppercase().starts_with("TREE "))
        .take_while(|line| !line.trim().to_ascii_uppercase().starts_with("END;"))
        .filter_map(|line| {
            let (_header, body) = line.split_once('=')?;
            Some(body.trim().to_string())
        })
        .collect()
}

fn parse_taxon_block(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .skip_while(|line| !line.trim().to_ascii_uppercase().starts_with("TRANSLATE"))
        .skip(1)
        .take_while(|line| !line.trim().starts_with(';'))
        // 1 'Homo_sapiens',
        // 2 'Pan_troglodytes',
        .filter_map(|line| {
            let line = line.trim().trim_end_matches(',').trim_end_matches(';');
            let mut parts = line.split_whitespace();
            let id = parts.next()?.to_string();
            let label = parts.next()?.trim_matches('\'').to_string();
            Some((id, label))
        })
        .collect::<HashMap<_, _>>()
}

fn rename_leaf_nodes(tree: &mut Tree, translate: &HashMap<String, String>) {
    for leaf_id in tree.get_leaves() {
        if let Ok(node) = tree.get_mut(&leaf_id) {
            if let Some(label) = node.name.as_ref().and_then(|n| translate.get(n)) {
                node.name = Some(label.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_strip_beast_annotations() {
        let raw = "((A:[&rate=0.5]1.0,B:2.0):[&rate=1.2]0.5,C:3.0);";
        assert_eq!(strip_beast_annotations(raw), "((A:1.0,B:2.0):0.5,C:3.0);");
    }

    #[test]
    fn test_pair_shares_taxa() {
        let (g1, g2) = parse_tree_pair("((a:1,b:2):0.5,c:1);", "(a,(c,b));").unwrap();
        assert!(Arc::ptr_eq(g1.taxa(), g2.taxa()));
        assert_eq!(g1.leaf_labels(), vec!["a", "b", "c"]);
        assert_eq!(g1.node_count(), 5);
        assert_eq!(g1.edge_count(), 4);
        let root = g1.validate_binary_tree().unwrap();
        assert_eq!(g1.cluster(root).unwrap().count_ones(), 3);
        let weights: f64 = g1.edges().map(|e| g1.weight(e).unwrap()).sum();
        assert!((weights - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_leaf_set_mismatch() {
        let err = parse_tree_pair("((a,b),c);", "((a,b),d);").unwrap_err();
        assert!(matches!(err, HybridError::Structural(_)));
        assert!(matches!(parse_newick("((a,b),c"), Err(HybridError::Parse(_))));
    }

    #[test]
    fn test_single_leaf_is_rejected() {
        for text in ["a;", "  a:1.0;\n", ";"] {
            assert!(matches!(parse_newick(text), Err(HybridError::Parse(_))), "{text:?}");
        }
        assert!(parse_tree_pair("a;", "a;").is_err());
        assert!(parse_newick("(a,b);").is_ok());
    }

    #[test]
    fn test_read_newick_lines() {
        let mut file = scratch_file("pair.nwk");
        writeln!(file.1, "# first tree\n((a,b),c);\n\n(a,(b,c));").unwrap();
        let (t1, t2) = read_tree_pair(&file.0).unwrap();
        assert_eq!(leaf_names(&t1).unwrap().len(), 3);
        assert_eq!(leaf_names(&t2).unwrap().len(), 3);
        std::fs::remove_file(&file.0).ok();
    }

    #[test]
    fn test_read_nexus_with_translate() {
        let mut file = scratch_file("pair.trees");
        writeln!(
            file.1,
            "#NEXUS\nBegin trees;\n\tTranslate\n\t\t1 'alpha',\n\t\t2 'beta',\n\t\t3 'gamma'\n\t\t;\n\
             tree STATE_0 = ((1,2),3);\ntree STATE_1 = (1,(2,3));\nEnd;"
        )
        .unwrap();
        let (t1, _t2) = read_tree_pair(&file.0).unwrap();
        let mut names = leaf_names(&t1).unwrap();
        names.sort();
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);
        std::fs::remove_file(&file.0).ok();
    }

    fn scratch_file(name: &str) -> (std::path::PathBuf, std::fs::File) {
        let dir = std::env::temp_dir().join(format!("hybrid-net-io-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let file = std::fs::File::create(&path).unwrap();
        (path, file)
    }
}
