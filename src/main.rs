use clap::Parser;
use hybrid_net::distances::robinson_foulds;
use hybrid_net::io::{graphs_from_phylotrees, read_tree_pair};
use itertools::Itertools;
use hybrid_net::{HybridResult, HybridSearch, LogProgress, SearchConfig, SearchOutcome};
use log::{error, info};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Compute minimum hybridization networks for two rooted binary trees
/// read from a Newick or NEXUS file.
#[derive(Parser, Debug)]
#[command(name = "hybrid-net", version, about = "Minimum hybridization networks of two rooted trees")]
struct Args {
    /// File with two trees: Newick one per line, or a NEXUS trees block
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Worker threads (default: available cores minus one)
    #[arg(short = 't', long = "threads")]
    threads: Option<usize>,

    /// Give up on forests needing more reticulations than this
    #[arg(short = 'r', long = "max-reticulations")]
    max_reticulations: Option<usize>,

    /// Disable the signature cache of explored search states
    #[arg(long = "no-cache", default_value_t = false)]
    no_cache: bool,

    /// Cancel the search after this many milliseconds and report the best so far
    #[arg(long = "timeout-ms")]
    timeout_ms: Option<u64>,

    /// Quiet mode: only warnings and errors are logged
    #[arg(short = 'q', long = "quiet", default_value_t = false)]
    quiet: bool,
}

fn main() {
    let args = Args::parse();
    let default_filter = if args.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let t0 = Instant::now();
    let (tree1, tree2, rf) = match read_tree_pair(&args.input).and_then(|(t1, t2)| {
        let (g1, g2) = graphs_from_phylotrees(&t1, &t2)?;
        let rf = robinson_foulds(&t1, &t2, g1.taxa())?;
        Ok((g1, g2, rf))
    }) {
        Ok(read) => read,
        Err(e) => {
            error!("Failed to read trees from {:?}: {e}", args.input);
            std::process::exit(2);
        }
    };
    info!(
        "Read 2 trees on {} taxa in {:.3}s, rooted RF distance {rf}",
        tree1.taxa().len(),
        t0.elapsed().as_secs_f64()
    );

    let mut config = SearchConfig::default()
        .with_max_reticulations(args.max_reticulations)
        .with_cache(!args.no_cache);
    if let Some(threads) = args.threads {
        config = config.with_threads(threads);
    }
    let search = HybridSearch::new(config);

    if let Some(ms) = args.timeout_ms {
        let token = search.token();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(ms));
            token.cancel();
        });
    }

    let result = match search
        .run(&tree1, &tree2, &LogProgress)
        .and_then(HybridResult::into_found)
    {
        Ok(result) => result,
        Err(e) => {
            error!("Search failed: {e}");
            std::process::exit(3);
        }
    };

    let taxa = tree1.taxa();
    match result.reticulations() {
        Some(r) => println!("Hybridization number: {r}"),
        None => println!("Hybridization number: not found"),
    }
    if result.outcome() == SearchOutcome::Cancelled {
        println!("Search was cancelled, results are the best found so far");
    }
    for (i, (forest, network)) in result.forests().iter().zip(result.networks()).enumerate() {
        let components = forest
            .labels(taxa)
            .iter()
            .map(|labels| format!("{{{}}}", labels.join(",")))
            .join(" ");
        println!("Forest {}: {components}", i + 1);
        println!(
            "Network {}: {} nodes, {} edges, {} reticulations",
            i + 1,
            network.node_count(),
            network.edge_count(),
            network.reticulations().len()
        );
    }
    for failure in result.failures() {
        println!("Failure: {failure}");
    }
}
