//! Parallel search coordinator.
//!
//! # Overview
//! The coordinator expands the top of the agreement forest search
//! breadth-first until there are enough independent branches to keep the
//! worker pool busy, then runs every branch as one task on a dedicated
//! `rayon` pool. Each task explores its branch depth-first on its own copy of
//! the state.
//!
//! # Shared state
//! | what               | type                          | written by            |
//! |--------------------|-------------------------------|-----------------------|
//! | best bound         | `AtomicUsize`, only decreases | `Aggregator::accept`  |
//! | best forests       | `parking_lot::Mutex`          | `Aggregator::accept`  |
//! | explored states    | [`SignatureCache`]            | `Aggregator::admit`   |
//! | cancellation flag  | [`CancellationToken`]         | caller / CLI timeout  |
//!
//! A task reads a possibly stale bound; a stale bound is never lower than the
//! true one, so it only costs some redundant exploration.
//!
//! # Worker states
//! ```text
//! Idle -> Running -> Completed | Cancelled | Failed
//! ```
//! A failed task (error or panic, in the search or in the progress
//! listener) is recorded and logged while the others keep
//! running. The search fails as a whole only when every task failed.

use crate::assembly::assemble;
use crate::cache::SignatureCache;
use crate::cycles;
use crate::distances::rf_from_snapshots;
use crate::error::{HybridError, Result};
use crate::forest::{
    explore, AgreementForest, BestForests, Branching, Expansion, ForestSink, SearchState, TreePair,
};
use crate::graph::PhyloGraph;
use crate::snapshot::ClusterSnapshot;
use log::{debug, info, warn};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Tuning knobs of a search run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchConfig {
    /// Worker pool size.
    pub threads: usize,
    /// Forests needing more reticulations are never reported.
    pub max_reticulations: Option<usize>,
    /// Skip states whose signature was explored before.
    pub use_cache: bool,
    /// The frontier is expanded to at least `threads * frontier_factor` tasks.
    pub frontier_factor: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1))
            .unwrap_or(1)
            .max(1);
        SearchConfig {
            threads,
            max_reticulations: None,
            use_cache: true,
            frontier_factor: 4,
        }
    }
}

impl SearchConfig {
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn with_max_reticulations(mut self, max: Option<usize>) -> Self {
        self.max_reticulations = max;
        self
    }

    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn with_frontier_factor(mut self, factor: usize) -> Self {
        self.frontier_factor = factor.max(1);
        self
    }
}

/// Shared stop flag, polled by every task between branch expansions.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Receives progress of a running search. Called from worker threads.
pub trait ProgressListener: Send + Sync {
    /// Percentage of finished tasks, `0.0..=100.0`.
    fn set_progress(&self, percent: f64);

    fn set_status(&self, status: &str);
}

/// Forwards progress to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressListener for LogProgress {
    fn set_progress(&self, percent: f64) {
        debug!("search progress {percent:.1}%");
    }

    fn set_status(&self, status: &str) {
        info!("{status}");
    }
}

/// Lifecycle of one search task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Every branch was explored; the reported count is the minimum the search finds.
    Complete,
    /// The search was stopped early; results are the best found so far.
    Cancelled,
}

/// Minimum networks and forests of one search run.
#[derive(Debug)]
pub struct HybridResult {
    networks: Vec<PhyloGraph>,
    forests: Vec<AgreementForest>,
    reticulations: Option<usize>,
    outcome: SearchOutcome,
    failures: Vec<HybridError>,
    workers: Vec<WorkerState>,
}

impl HybridResult {
    /// One network per forest, in the same order as [`forests`](Self::forests).
    pub fn networks(&self) -> &[PhyloGraph] {
        &self.networks
    }

    pub fn forests(&self) -> &[AgreementForest] {
        &self.forests
    }

    /// Minimum reticulation count, `None` if nothing was found.
    pub fn reticulations(&self) -> Option<usize> {
        self.reticulations
    }

    pub fn outcome(&self) -> SearchOutcome {
        self.outcome
    }

    /// [`HybridError::WorkerFailure`] of every failed task.
    pub fn failures(&self) -> &[HybridError] {
        &self.failures
    }

    pub fn worker_states(&self) -> &[WorkerState] {
        &self.workers
    }

    pub fn completed_workers(&self) -> usize {
        self.count_workers(WorkerState::Completed)
    }

    pub fn cancelled_workers(&self) -> usize {
        self.count_workers(WorkerState::Cancelled)
    }

    pub fn failed_workers(&self) -> usize {
        self.count_workers(WorkerState::Failed)
    }

    /// Passes the result through unless the search was cancelled before
    /// any forest was found.
    ///
    /// # Errors
    /// [`HybridError::Cancelled`] if there is no best-so-far result to report.
    pub fn into_found(self) -> Result<Self> {
        if self.outcome == SearchOutcome::Cancelled && self.reticulations.is_none() {
            return Err(HybridError::Cancelled);
        }
        Ok(self)
    }

    fn count_workers(&self, state: WorkerState) -> usize {
        self.workers.iter().filter(|&&s| s == state).count()
    }
}

/// Cross-task sink: shared bound, best forests and signature cache.
struct Aggregator<'a> {
    bound: AtomicUsize,
    best: Mutex<BestForests>,
    cache: Option<SignatureCache>,
    token: &'a CancellationToken,
}

impl<'a> Aggregator<'a> {
    fn new(config: &SearchConfig, token: &'a CancellationToken) -> Self {
        Aggregator {
            bound: AtomicUsize::new(config.max_reticulations.unwrap_or(usize::MAX)),
            best: Mutex::new(BestForests::default()),
            cache: config.use_cache.then(SignatureCache::new),
            token,
        }
    }

    /// Lowers the bound to `score`; never raises it.
    fn lower_bound(&self, score: usize) {
        let _ = self
            .bound
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (score < current).then_some(score)
            });
    }
}

impl ForestSink for Aggregator<'_> {
    fn bound(&self) -> usize {
        self.bound.load(Ordering::Acquire)
    }

    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn admit(&self, state: &SearchState) -> bool {
        self.cache
            .as_ref()
            .is_none_or(|cache| cache.add(state.signature()))
    }

    fn accept(&self, forest: AgreementForest) {
        if forest.reticulations() > self.bound() {
            return;
        }
        let score = self.best.lock().offer(forest);
        debug!("forest offered, best score now {score}");
        self.lower_bound(score);
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "worker panicked".to_string())
}

/// Runs `body`, turning an error or a panic into a failure reason.
fn guarded<T>(body: impl FnOnce() -> Result<T>) -> std::result::Result<T, String> {
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(panic_reason(payload.as_ref())),
    }
}

/// Body of one search task: runs `search`, then `report`s progress. Errors
/// and panics of either step leave the task `Failed` with a
/// [`HybridError::WorkerFailure`].
fn run_task<F, P>(task: usize, search: F, report: P) -> (WorkerState, Option<HybridError>)
where
    F: FnOnce() -> Result<Expansion>,
    P: FnOnce(),
{
    let searched = guarded(search);
    let reported = guarded(|| {
        report();
        Ok(())
    });
    let reason = match (searched, reported) {
        (Ok(Expansion::Cancelled), Ok(())) => return (WorkerState::Cancelled, None),
        (Ok(_), Ok(())) => return (WorkerState::Completed, None),
        (Err(reason), _) => reason,
        (Ok(_), Err(reason)) => format!("progress listener panicked: {reason}"),
    };
    warn!("search task {task} failed: {reason}");
    (
        WorkerState::Failed,
        Some(HybridError::WorkerFailure { task, reason }),
    )
}

/// Orders task failures by task index. Fails with
/// [`HybridError::AllWorkersFailed`] when none of `total` tasks succeeded.
fn settle_failures(total: usize, mut failures: Vec<HybridError>) -> Result<Vec<HybridError>> {
    failures.sort_by_key(|f| match f {
        HybridError::WorkerFailure { task, .. } => *task,
        _ => usize::MAX,
    });
    if total > 0 && failures.len() == total {
        return Err(HybridError::AllWorkersFailed {
            count: total,
            reason: failures
                .first()
                .map(|f| f.to_string())
                .unwrap_or_default(),
        });
    }
    Ok(failures)
}

/// Runs the full pipeline: forest search, cycle cutting, network assembly.
#[derive(Debug, Clone, Default)]
pub struct HybridSearch {
    config: SearchConfig,
    token: CancellationToken,
}

impl HybridSearch {
    pub fn new(config: SearchConfig) -> Self {
        HybridSearch {
            config,
            token: CancellationToken::new(),
        }
    }

    /// Uses an externally owned cancellation token.
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Computes all minimum hybridization networks of `tree1` and `tree2`.
    ///
    /// # Errors
    /// - [`HybridError::Structural`] for malformed inputs or a forest that
    ///   cannot be assembled
    /// - [`HybridError::AllWorkersFailed`] if no task finished
    /// - [`HybridError::ThreadPool`] if the pool cannot be started
    ///
    /// Cancellation is not an error: the result then carries
    /// [`SearchOutcome::Cancelled`] and the best forests found so far.
    pub fn run(
        &self,
        tree1: &PhyloGraph,
        tree2: &PhyloGraph,
        progress: &dyn ProgressListener,
    ) -> Result<HybridResult> {
        let started = Instant::now();
        progress.set_status("Preparing input trees");
        let pair = TreePair::new(tree1, tree2)?;

        let s1 = ClusterSnapshot::from_graph(tree1)?;
        let s2 = ClusterSnapshot::from_graph(tree2)?;
        if rf_from_snapshots(&s1, &s2) == 0 {
            info!("input trees are identical, no reticulation needed");
            let forest = AgreementForest::new(vec![pair.full_set()]);
            let network = assemble(&pair, &forest)?;
            progress.set_progress(100.0);
            return Ok(HybridResult {
                networks: vec![network],
                forests: vec![forest],
                reticulations: Some(0),
                outcome: SearchOutcome::Complete,
                failures: Vec::new(),
                workers: Vec::new(),
            });
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .thread_name(|i| format!("hybrid-worker-{i}"))
            .build()?;
        let aggregator = Aggregator::new(&self.config, &self.token);

        progress.set_status("Expanding search frontier");
        let tasks = self.frontier(&pair, &aggregator)?;
        let total = tasks.len();
        progress.set_status(&format!(
            "Searching {total} branches on {} threads",
            self.config.threads
        ));

        let workers = Mutex::new(vec![WorkerState::Idle; total]);
        let failures = Mutex::new(Vec::new());
        let finished = AtomicUsize::new(0);
        pool.scope(|scope| {
            for (task, state) in tasks.into_iter().enumerate() {
                let (pair, aggregator) = (&pair, &aggregator);
                let (workers, failures, finished) = (&workers, &failures, &finished);
                scope.spawn(move |_| {
                    workers.lock()[task] = WorkerState::Running;
                    let (ended, failure) = run_task(
                        task,
                        || explore(pair, state, aggregator),
                        || {
                            let done = finished.fetch_add(1, Ordering::AcqRel) + 1;
                            progress.set_progress(100.0 * done as f64 / total as f64);
                        },
                    );
                    workers.lock()[task] = ended;
                    if let Some(failure) = failure {
                        failures.lock().push(failure);
                    }
                });
            }
        });

        let workers = workers.into_inner();
        let failures = settle_failures(total, failures.into_inner())?;

        let outcome = if self.token.is_cancelled() {
            warn!("search cancelled, reporting the best forests found so far");
            SearchOutcome::Cancelled
        } else {
            SearchOutcome::Complete
        };

        let best = aggregator.best.into_inner();
        let reticulations = best.score();
        let forests: Vec<AgreementForest> = best.into_forests().into_iter().collect();
        progress.set_status(&format!("Assembling {} networks", forests.len()));
        let networks = pool.install(|| {
            forests
                .par_iter()
                .map(|forest| assemble(&pair, forest))
                .collect::<Result<Vec<_>>>()
        })?;

        info!(
            "search finished in {:.3}s: {} forests, reticulations {:?}, {} of {} tasks failed",
            started.elapsed().as_secs_f64(),
            forests.len(),
            reticulations,
            failures.len(),
            total
        );
        Ok(HybridResult {
            networks,
            forests,
            reticulations,
            outcome,
            failures,
            workers,
        })
    }

    /// Breadth-first expansion of the search tree until it is wide enough to
    /// feed the pool. Terminal states met on the way are reported directly.
    fn frontier(&self, pair: &TreePair, aggregator: &Aggregator<'_>) -> Result<Vec<SearchState>> {
        let target = self.config.threads * self.config.frontier_factor;
        let start = SearchState::new(pair)?;
        aggregator.admit(&start);
        let mut frontier = VecDeque::from([start]);
        while frontier.len() < target && !aggregator.is_cancelled() {
            let Some(state) = frontier.pop_front() else {
                break;
            };
            if state.cuts() > aggregator.bound() {
                continue;
            }
            match state.branch()? {
                Branching::Terminal(forest) => aggregator.accept(cycles::run(pair, forest)?),
                Branching::Branches(children) => {
                    for child in children {
                        if child.cuts() <= aggregator.bound() && aggregator.admit(&child) {
                            frontier.push_back(child);
                        }
                    }
                }
            }
        }
        debug!("search frontier holds {} states", frontier.len());
        Ok(frontier.into())
    }
}

/// Runs a search with a fresh token, reporting progress through `log`.
pub fn compute_hybrid_networks(
    tree1: &PhyloGraph,
    tree2: &PhyloGraph,
    config: SearchConfig,
) -> Result<HybridResult> {
    HybridSearch::new(config).run(tree1, tree2, &LogProgress)
}
