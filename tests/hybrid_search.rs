use hybrid_net::{
    compute_hybrid_networks, parse_tree_pair, CancellationToken, ClusterSnapshot, HybridSearch,
    LogProgress, PhyloGraph, SearchConfig, SearchOutcome,
};
use std::time::{Duration, Instant};

fn config(threads: usize) -> SearchConfig {
    SearchConfig::default().with_threads(threads)
}

fn displays(network: &PhyloGraph, tree: &PhyloGraph) -> bool {
    let target = ClusterSnapshot::from_graph(tree).unwrap();
    ClusterSnapshot::displayed_trees(network)
        .unwrap()
        .iter()
        .any(|shown| shown.same_topology(&target))
}

/// Builds a binary tree on `n` taxa by repeatedly joining two pooled
/// subtrees chosen by a small linear congruential generator.
fn random_newick(n: usize, seed: u64) -> String {
    let mut state = seed;
    let mut next = move |bound: usize| {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((state >> 33) as usize) % bound
    };
    let mut pool: Vec<String> = (0..n).map(|i| format!("t{i}")).collect();
    while pool.len() > 1 {
        let a = pool.swap_remove(next(pool.len()));
        let b = pool.swap_remove(next(pool.len()));
        pool.push(format!("({a},{b})"));
    }
    format!("{};", pool[0])
}

#[test]
fn identical_trees_need_no_reticulation() {
    let newick = "(((a,b),(c,d)),((e,f),g));";
    let (t1, t2) = parse_tree_pair(newick, "((g,(f,e)),((d,c),(b,a)));").unwrap();
    let result = compute_hybrid_networks(&t1, &t2, config(2)).unwrap();
    assert_eq!(result.reticulations(), Some(0));
    assert_eq!(result.networks().len(), 1);
    let network = &result.networks()[0];
    let snap = ClusterSnapshot::from_graph(network).unwrap();
    assert!(snap.same_topology(&ClusterSnapshot::from_graph(&t1).unwrap()));
    assert_eq!(network.node_count(), t1.node_count());
}

#[test]
fn rogue_leaf_needs_one_reticulation() {
    let (t1, t2) =
        parse_tree_pair("((((a,b),c),(d,e)),f);", "(((a,b),(d,e)),(c,f));").unwrap();
    let result = compute_hybrid_networks(&t1, &t2, config(2)).unwrap();
    assert_eq!(result.reticulations(), Some(1));
    assert_eq!(result.outcome(), SearchOutcome::Complete);
    for network in result.networks() {
        assert_eq!(network.reticulations().len(), 1);
        assert!(displays(network, &t1));
        assert!(displays(network, &t2));
    }
}

#[test]
fn quartet_needs_two_reticulations() {
    let (t1, t2) = parse_tree_pair("((a,b),(c,d));", "((a,c),(b,d));").unwrap();
    let result = compute_hybrid_networks(&t1, &t2, config(1)).unwrap();
    assert_eq!(result.reticulations(), Some(2));
    assert!(!result.networks().is_empty());
    for (forest, network) in result.forests().iter().zip(result.networks()) {
        assert_eq!(forest.len(), 3);
        assert_eq!(network.reticulations().len(), 2);
        assert!(!network.has_cycle());
        assert!(displays(network, &t1));
        assert!(displays(network, &t2));
    }
}

#[test]
fn components_induce_isomorphic_subtrees() {
    let (t1, t2) =
        parse_tree_pair("(((a,b),(c,d)),((e,f),(g,h)));", "(((a,e),(c,b)),((d,h),(g,f)));")
            .unwrap();
    let result = compute_hybrid_networks(&t1, &t2, config(2)).unwrap();
    let taxa = t1.taxa();
    let real = taxa.all_taxa();
    assert!(!result.forests().is_empty());
    for forest in result.forests() {
        for component in forest.components() {
            let part = component.intersection(&real);
            if part.is_empty() {
                continue;
            }
            let s1 = ClusterSnapshot::from_graph(&t1.restricted(&part).unwrap()).unwrap();
            let s2 = ClusterSnapshot::from_graph(&t2.restricted(&part).unwrap()).unwrap();
            assert!(s1.same_topology(&s2), "component {:?}", taxa.labels_of(&part));
        }
    }
}

#[test]
fn forests_are_acyclic_and_networks_match_them() {
    let (t1, t2) =
        parse_tree_pair("((((a,b),c),d),(e,f));", "((a,(e,(c,f))),(b,d));").unwrap();
    let result = compute_hybrid_networks(&t1, &t2, config(2)).unwrap();
    let pair = hybrid_net::TreePair::new(&t1, &t2).unwrap();
    for (forest, network) in result.forests().iter().zip(result.networks()) {
        assert!(hybrid_net::cycles::find_cycle(&pair, forest).unwrap().is_none());
        assert_eq!(network.reticulations().len(), forest.len() - 1);
        assert!(displays(network, &t1));
        assert!(displays(network, &t2));
    }
}

#[test]
fn repeated_runs_agree() {
    let (t1, t2) = parse_tree_pair(&random_newick(9, 7), &random_newick(9, 8)).unwrap();
    let first = compute_hybrid_networks(&t1, &t2, config(1)).unwrap();
    let second = compute_hybrid_networks(&t1, &t2, config(1)).unwrap();
    assert_eq!(first.reticulations(), second.reticulations());
    assert_eq!(first.forests(), second.forests());
}

#[test]
fn pool_size_does_not_change_the_answer() {
    let (t1, t2) = parse_tree_pair(&random_newick(10, 21), &random_newick(10, 22)).unwrap();
    let single = compute_hybrid_networks(&t1, &t2, config(1)).unwrap();
    let many = compute_hybrid_networks(&t1, &t2, config(4)).unwrap();
    assert_eq!(single.reticulations(), many.reticulations());
    assert_eq!(single.forests().len(), many.forests().len());
}

#[test]
fn cancellation_returns_promptly() {
    let (t1, t2) = parse_tree_pair(&random_newick(40, 3), &random_newick(40, 4)).unwrap();
    let token = CancellationToken::new();
    let search = HybridSearch::new(config(2)).with_token(token.clone());

    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        token.cancel();
        Instant::now()
    });
    let result = search.run(&t1, &t2, &LogProgress).unwrap();
    let returned = Instant::now();
    let cancelled_at = canceller.join().unwrap();

    if result.outcome() == SearchOutcome::Cancelled {
        assert!(returned.saturating_duration_since(cancelled_at) < Duration::from_secs(10));
    }
    assert_eq!(result.failed_workers(), 0);
    for (forest, network) in result.forests().iter().zip(result.networks()) {
        assert_eq!(network.reticulations().len(), forest.len() - 1);
        assert!(!network.has_cycle());
    }
}

#[test]
fn bound_caps_the_search() {
    let (t1, t2) = parse_tree_pair("((a,b),(c,d));", "((a,c),(b,d));").unwrap();
    let result =
        compute_hybrid_networks(&t1, &t2, config(2).with_max_reticulations(Some(1))).unwrap();
    assert_eq!(result.reticulations(), None);
    assert!(result.networks().is_empty());
}

#[test]
fn mismatched_taxa_are_rejected() {
    assert!(parse_tree_pair("((a,b),c);", "((a,b),(c,d));").is_err());
}
