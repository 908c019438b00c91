//! Task orchestrator (spec §4.10): candidate filtering, multi-strategy
//! scheduling, parallel diversity-aware dispatch, and global-optimum batch
//! assignment. An independent plane from the L2 state engine — it
//! consumes the reputation ledger and latency map (`basalt-reputation`)
//! and emits assignment decisions; it is the sole writer of its own
//! assignment and metrics state (spec §3 "Ownership").
//!
//! Scheduling is synchronous (spec §5); [`TaskOrchestrator::submit_async`]
//! offers a `threadpool`-backed alternative whose `Receiver` is either
//! fulfilled by a worker or silently abandoned on shutdown, matching the
//! "future... abandoned on shutdown" language in spec §5.

pub mod assignment;
pub mod cost;
pub mod filter;
pub mod genetic;
pub mod rebalance;
pub mod score;
pub mod strategies;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use filter::{filter_candidates, reject_reason, FilterRejection};
pub use score::CustomScorer;
pub use types::*;

use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::{mpsc, Arc};

use basalt_config::OrchestratorConfig;
use basalt_primitives::{PeerId, TaskId};
use basalt_reputation::{LatencyFeed, ReputationLedger};
use parking_lot::Mutex;
use threadpool::ThreadPool;

/// Reward multiplier applied to every cost estimate (spec §4.10 "Cost
/// estimate"). Fixed at 1.0 here — the spec leaves it a free parameter
/// with no named source of truth; a future revision could source it from
/// a per-task or per-epoch config value.
const DEFAULT_REWARD_MULTIPLIER: f64 = 1.0;

pub struct TaskOrchestrator {
    config: OrchestratorConfig,
    reputation: Arc<ReputationLedger>,
    latency: Arc<dyn LatencyFeed>,
    pool: ThreadPool,
    round_robin: AtomicUsize,
    metrics: Mutex<OrchestratorMetrics>,
    custom_scorer: Option<Arc<CustomScorer>>,
}

impl TaskOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        reputation: Arc<ReputationLedger>,
        latency: Arc<dyn LatencyFeed>,
    ) -> Self {
        let pool = ThreadPool::new(config.workers.max(1));
        Self {
            config,
            reputation,
            latency,
            pool,
            round_robin: AtomicUsize::new(0),
            metrics: Mutex::new(OrchestratorMetrics::default()),
            custom_scorer: None,
        }
    }

    pub fn with_custom_scorer(mut self, scorer: Arc<CustomScorer>) -> Self {
        self.custom_scorer = Some(scorer);
        self
    }

    pub fn latency_feed(&self) -> &Arc<dyn LatencyFeed> {
        &self.latency
    }

    pub fn reputation_ledger(&self) -> &Arc<ReputationLedger> {
        &self.reputation
    }

    fn weights(&self) -> ScoreWeights {
        ScoreWeights {
            trust: self.config.trust_weight,
            speed: self.config.speed_weight,
            power: self.config.power_weight,
        }
    }

    fn reputation_score(&self, peer: &PeerId, now_ms: u64) -> f64 {
        self.reputation.get(peer, now_ms).trust_score
    }

    fn eligible_candidates<'a>(&self, task: &TaskPayload, nodes: &'a [NodeMetrics], now_ms: u64) -> Vec<&'a NodeMetrics> {
        filter::filter_candidates(
            task,
            nodes,
            |n| self.reputation_score(&n.peer_id, now_ms),
            |n| cost::estimate_cost_tokens(task.task_type, n, DEFAULT_REWARD_MULTIPLIER),
            now_ms,
        )
    }

    /// Single-worker synchronous scheduling (spec §4.10 "Strategies").
    pub fn schedule(
        &self,
        task: &TaskPayload,
        nodes: &[NodeMetrics],
        strategy: SchedulingStrategy,
        now_ms: u64,
    ) -> Assignment {
        let candidates = self.eligible_candidates(task, nodes, now_ms);
        let candidate_scores: Vec<(PeerId, f64)> = candidates
            .iter()
            .map(|n| {
                let rep = self.reputation_score(&n.peer_id, now_ms);
                (n.peer_id.clone(), score::weighted_score(task, n, rep, self.weights(), DEFAULT_REWARD_MULTIPLIER))
            })
            .collect();

        let mut rng = rand::thread_rng();
        let picked = strategies::select_single(
            strategy,
            task,
            &candidates,
            |n| self.reputation_score(&n.peer_id, now_ms),
            self.weights(),
            DEFAULT_REWARD_MULTIPLIER,
            &self.round_robin,
            self.custom_scorer.as_deref(),
            &mut rng,
        );

        let mut metrics = self.metrics.lock();
        metrics.tasks_submitted += 1;

        match picked {
            Some((node, _score)) => {
                let est_cost = cost::estimate_cost_tokens(task.task_type, node, DEFAULT_REWARD_MULTIPLIER);
                let completion = cost::estimate_completion_ms(task.task_type, node);
                metrics.tasks_assigned += 1;
                metrics.total_assignment_wall_time_ms += completion;
                Assignment {
                    task_id: task.task_id,
                    assignment_id: format!("{}-single", task.task_id.to_hex()),
                    assigned: true,
                    worker_peer_id: Some(node.peer_id.clone()),
                    reason: None,
                    candidate_scores,
                    expected_latency_ms: node.latency_ms,
                    expected_cost_tokens: est_cost,
                    expected_completion_time_ms: completion,
                }
            }
            None => {
                metrics.tasks_failed_to_assign += 1;
                Assignment::failed(
                    task.task_id,
                    format!("{}-single", task.task_id.to_hex()),
                    "no eligible candidate found",
                )
            }
        }
    }

    /// Submits `task` to the worker pool, returning a `Receiver` fulfilled
    /// by whichever pool thread picks it up. Dropping the receiver (e.g.
    /// on shutdown) simply lets the send fail silently — no state is lost,
    /// since the orchestrator itself is not the system of record for task
    /// outcomes (spec §9: "losing a callback never loses state").
    pub fn submit_async(
        &self,
        task: TaskPayload,
        nodes: Vec<NodeMetrics>,
        strategy: SchedulingStrategy,
        now_ms: u64,
        orchestrator: Arc<Self>,
    ) -> mpsc::Receiver<Assignment> {
        let (tx, rx) = mpsc::channel();
        self.pool.execute(move || {
            let assignment = orchestrator.schedule(&task, &nodes, strategy, now_ms);
            let _ = tx.send(assignment);
        });
        rx
    }

    /// Blocks until every queued job on the worker pool has completed.
    pub fn join_workers(&self) {
        self.pool.join();
    }

    pub fn parallel_dispatch(&self, task: &TaskPayload, nodes: &[NodeMetrics], now_ms: u64) -> Vec<Assignment> {
        let candidates = self.eligible_candidates(task, nodes, now_ms);
        let assignments = strategies::parallel_dispatch(
            task,
            &candidates,
            |n| self.reputation_score(&n.peer_id, now_ms),
            self.weights(),
            DEFAULT_REWARD_MULTIPLIER,
        );
        let mut metrics = self.metrics.lock();
        metrics.tasks_submitted += 1;
        if assignments.iter().all(|a| a.assigned) {
            metrics.tasks_assigned += assignments.len() as u64;
        } else {
            metrics.tasks_failed_to_assign += 1;
        }
        assignments
    }

    pub fn backup_worker(
        &self,
        task: &TaskPayload,
        nodes: &[NodeMetrics],
        primary: &PeerId,
        now_ms: u64,
    ) -> Option<Assignment> {
        let candidates = self.eligible_candidates(task, nodes, now_ms);
        strategies::backup_worker(
            task,
            &candidates,
            primary,
            |n| self.reputation_score(&n.peer_id, now_ms),
            self.weights(),
            DEFAULT_REWARD_MULTIPLIER,
        )
    }

    /// Global-optimum batch scheduling (spec §4.10 "Batch global
    /// scheduling"): every candidate's feasibility still runs through the
    /// same filter/score path as single-worker scheduling, just folded
    /// into the Hungarian cost matrix instead of a max-by.
    pub fn batch_schedule(&self, tasks: &[TaskPayload], nodes: &[NodeMetrics], now_ms: u64) -> Vec<Assignment> {
        let assignments = assignment::batch_assign(
            tasks,
            nodes,
            |peer| self.reputation_score(peer, now_ms),
            self.weights(),
            DEFAULT_REWARD_MULTIPLIER,
        );
        let mut metrics = self.metrics.lock();
        metrics.batch_assignments += 1;
        for a in &assignments {
            metrics.tasks_submitted += 1;
            if a.assigned {
                metrics.tasks_assigned += 1;
                metrics.total_assignment_wall_time_ms += a.expected_completion_time_ms;
            } else {
                metrics.tasks_failed_to_assign += 1;
            }
        }
        assignments
    }

    pub fn rebalance(
        &self,
        assignments: &mut HashMap<TaskId, PeerId>,
        nodes: &mut HashMap<PeerId, NodeMetrics>,
    ) -> Vec<Migration> {
        rebalance::rebalance(assignments, nodes)
    }

    pub fn metrics(&self) -> OrchestratorMetrics {
        self.metrics.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_config::ReputationConfig;
    use basalt_reputation::InMemoryLatencyMap;
    use test_support::{sample_node, sample_task};

    fn orchestrator() -> TaskOrchestrator {
        let reputation = Arc::new(ReputationLedger::new(ReputationConfig::default()));
        let latency = Arc::new(InMemoryLatencyMap::new());
        TaskOrchestrator::new(OrchestratorConfig::default(), reputation, latency)
    }

    #[test]
    fn scenario_s5_weighted_orchestrator_end_to_end() {
        let orch = orchestrator();
        let task = sample_task();

        let mut n1 = sample_node("n1");
        n1.latency_ms = 50.0;
        n1.capacity_score = 0.9;
        orch.reputation.reward(&n1.peer_id, 0.3, 1_000); // -> 0.8

        let mut n2 = sample_node("n2");
        n2.latency_ms = 200.0;
        n2.capacity_score = 0.5;
        orch.reputation.reward(&n2.peer_id, 0.4, 1_000); // -> 0.9

        let mut n3 = sample_node("n3");
        n3.capacity_score = 0.6;
        orch.reputation.slash(&n3.peer_id, 0.2, 0, 1_000); // -> 0.3, below min_reputation

        let assignment = orch.schedule(
            &task,
            &[n1.clone(), n2, n3],
            SchedulingStrategy::WeightedScore,
            1_000,
        );
        assert!(assignment.assigned);
        assert_eq!(assignment.worker_peer_id, Some(n1.peer_id));
        assert_eq!(assignment.candidate_scores.len(), 2);
    }

    #[test]
    fn no_eligible_candidates_yields_failed_assignment() {
        let orch = orchestrator();
        let mut task = sample_task();
        task.min_reputation = 0.99;
        let assignment = orch.schedule(&task, &[sample_node("n1")], SchedulingStrategy::WeightedScore, 1_000);
        assert!(!assignment.assigned);
    }

    #[test]
    fn submit_async_completes_via_worker_pool() {
        let orch = Arc::new(orchestrator());
        let task = sample_task();
        let rx = orch.submit_async(
            task.clone(),
            vec![sample_node("n1")],
            SchedulingStrategy::WeightedScore,
            1_000,
            orch.clone(),
        );
        let assignment = rx.recv().expect("worker completes the job");
        assert!(assignment.assigned);
    }
}
