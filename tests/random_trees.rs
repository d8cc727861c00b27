use hybrid_net::{compute_hybrid_networks, parse_tree_pair, ClusterSnapshot, SearchConfig};
use proptest::prelude::*;

/// Joins pooled subtrees pairwise, picking positions from `picks`.
fn newick_from_picks(n: usize, picks: &[usize]) -> String {
    let mut pool: Vec<String> = (0..n).map(|i| format!("x{i}")).collect();
    let mut k = 0;
    while pool.len() > 1 {
        let a = pool.swap_remove(picks[k % picks.len()] % pool.len());
        let b = pool.swap_remove(picks[(k + 1) % picks.len()] % pool.len());
        pool.push(format!("({a},{b})"));
        k += 2;
    }
    format!("{};", pool[0])
}

fn tree_pair() -> impl Strategy<Value = (String, String)> {
    (4usize..=7).prop_flat_map(|n| {
        (
            prop::collection::vec(0usize..64, 2 * n),
            prop::collection::vec(0usize..64, 2 * n),
        )
            .prop_map(move |(p1, p2)| (newick_from_picks(n, &p1), newick_from_picks(n, &p2)))
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn identical_trees_give_zero(picks in prop::collection::vec(0usize..64, 12)) {
        let newick = newick_from_picks(6, &picks);
        let (t1, t2) = parse_tree_pair(&newick, &newick).unwrap();
        let result = compute_hybrid_networks(&t1, &t2, SearchConfig::default().with_threads(1)).unwrap();
        prop_assert_eq!(result.reticulations(), Some(0));
    }

    #[test]
    fn networks_display_both_trees((n1, n2) in tree_pair()) {
        let (t1, t2) = parse_tree_pair(&n1, &n2).unwrap();
        let result = compute_hybrid_networks(&t1, &t2, SearchConfig::default().with_threads(2)).unwrap();
        prop_assert!(result.reticulations().is_some());
        let s1 = ClusterSnapshot::from_graph(&t1).unwrap();
        let s2 = ClusterSnapshot::from_graph(&t2).unwrap();
        for (forest, network) in result.forests().iter().zip(result.networks()) {
            prop_assert_eq!(network.reticulations().len(), forest.reticulations());
            prop_assert!(!network.has_cycle());
            let shown = ClusterSnapshot::displayed_trees(network).unwrap();
            prop_assert!(shown.iter().any(|s| s.same_topology(&s1)), "{} / {}", n1, n2);
            prop_assert!(shown.iter().any(|s| s.same_topology(&s2)), "{} / {}", n1, n2);
        }
    }

    #[test]
    fn pool_size_independent((n1, n2) in tree_pair()) {
        let (t1, t2) = parse_tree_pair(&n1, &n2).unwrap();
        let single = compute_hybrid_networks(&t1, &t2, SearchConfig::default().with_threads(1)).unwrap();
        let many = compute_hybrid_networks(&t1, &t2, SearchConfig::default().with_threads(3)).unwrap();
        prop_assert_eq!(single.reticulations(), many.reticulations());
        prop_assert_eq!(single.forests().len(), many.forests().len());
    }
}
