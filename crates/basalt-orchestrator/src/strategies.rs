//! Single-worker scheduling strategies and regionally-diverse parallel
//! dispatch (spec §4.10 "Strategies", "Parallel dispatch").

use std::sync::atomic::{AtomicUsize, Ordering};

use basalt_primitives::PeerId;
use rand::Rng;

use crate::cost::estimate_cost_tokens;
use crate::score::{weighted_score, CustomScorer};
use crate::types::{Assignment, NodeMetrics, ScoreWeights, SchedulingStrategy, TaskPayload};

/// Picks one candidate per `strategy`. Returns the chosen node plus the
/// score it would have received under the weighted formula (for
/// diagnostics / `candidate_scores`) — strategies that don't naturally
/// produce a score (e.g. round robin) fall back to the weighted score for
/// reporting purposes only; it does not affect their selection.
#[allow(clippy::too_many_arguments)]
pub fn select_single<'a>(
    strategy: SchedulingStrategy,
    task: &TaskPayload,
    candidates: &[&'a NodeMetrics],
    reputation: impl Fn(&NodeMetrics) -> f64,
    weights: ScoreWeights,
    reward_multiplier: f64,
    round_robin_counter: &AtomicUsize,
    custom_scorer: Option<&CustomScorer>,
    rng: &mut impl Rng,
) -> Option<(&'a NodeMetrics, f64)> {
    if candidates.is_empty() {
        return None;
    }

    let score_of = |node: &NodeMetrics| weighted_score(task, node, reputation(node), weights, reward_multiplier);

    match strategy {
        SchedulingStrategy::Custom => {
            let scorer = custom_scorer?;
            candidates
                .iter()
                .map(|n| (*n, scorer(task, n)))
                .filter(|(_, s)| s.is_finite())
                .max_by(|a, b| a.1.total_cmp(&b.1))
        }
        SchedulingStrategy::WeightedScore => candidates
            .iter()
            .map(|n| (*n, score_of(n)))
            .filter(|(_, s)| s.is_finite())
            .max_by(|a, b| a.1.total_cmp(&b.1)),
        SchedulingStrategy::RoundRobin => {
            let idx = round_robin_counter.fetch_add(1, Ordering::Relaxed) % candidates.len();
            let node = candidates[idx];
            Some((node, score_of(node)))
        }
        SchedulingStrategy::LeastLoaded | SchedulingStrategy::LoadBalancing => candidates
            .iter()
            .min_by(|a, b| a.load_ratio().total_cmp(&b.load_ratio()))
            .map(|n| (*n, score_of(n))),
        SchedulingStrategy::LowestLatency => candidates
            .iter()
            .min_by(|a, b| a.latency_ms.total_cmp(&b.latency_ms))
            .map(|n| (*n, score_of(n))),
        SchedulingStrategy::HighestReputation => candidates
            .iter()
            .max_by(|a, b| reputation(a).total_cmp(&reputation(b)))
            .map(|n| (*n, score_of(n))),
        SchedulingStrategy::LowestCost => candidates
            .iter()
            .min_by(|a, b| {
                let ca = estimate_cost_tokens(task.task_type, a, reward_multiplier);
                let cb = estimate_cost_tokens(task.task_type, b, reward_multiplier);
                ca.cmp(&cb)
            })
            .map(|n| (*n, score_of(n))),
        SchedulingStrategy::GeographicAffinity => {
            let in_region: Vec<&&NodeMetrics> = match &task.preferred_region {
                Some(region) => candidates.iter().filter(|n| &n.region == region).collect(),
                None => candidates.iter().collect(),
            };
            let pool: Vec<&NodeMetrics> = if in_region.is_empty() {
                candidates.to_vec()
            } else {
                in_region.into_iter().copied().collect()
            };
            pool.into_iter()
                .min_by(|a, b| a.latency_ms.total_cmp(&b.latency_ms))
                .map(|n| (n, score_of(n)))
        }
        SchedulingStrategy::GeneticAlgorithm => {
            crate::genetic::genetic_select(task, candidates, &reputation, weights, reward_multiplier, rng)
        }
    }
}

/// Maximum number of selected workers any single region may hold, per
/// spec §4.10: `max(1, N/4)`.
fn max_per_region(n: u32) -> usize {
    (n / 4).max(1) as usize
}

/// Parallel dispatch for a task requiring `num_workers` workers (spec
/// §4.10 "Parallel dispatch"): ranks filtered candidates by weighted
/// score, greedily selects top peers while capping how many come from any
/// one region, and fails the whole request (one assignment, `assigned =
/// false`) if there aren't enough candidates to begin with.
pub fn parallel_dispatch(
    task: &TaskPayload,
    candidates: &[&NodeMetrics],
    reputation: impl Fn(&NodeMetrics) -> f64,
    weights: ScoreWeights,
    reward_multiplier: f64,
) -> Vec<Assignment> {
    let num_workers = task.num_parallel_workers.max(1);

    if (candidates.len() as u32) < num_workers {
        return vec![Assignment::failed(
            task.task_id,
            format!("{}-parallel-0", task.task_id.to_hex()),
            format!(
                "insufficient candidates for parallel dispatch: need {num_workers}, have {}",
                candidates.len()
            ),
        )];
    }

    let mut ranked: Vec<(&NodeMetrics, f64)> = candidates
        .iter()
        .map(|n| (*n, weighted_score(task, n, reputation(n), weights, reward_multiplier)))
        .filter(|(_, s)| s.is_finite())
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    let cap = max_per_region(num_workers);
    let mut region_counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    let mut selected: Vec<(&NodeMetrics, f64)> = Vec::new();

    for (node, score) in ranked {
        if selected.len() as u32 >= num_workers {
            break;
        }
        let count = region_counts.entry(node.region.clone()).or_insert(0);
        if *count >= cap {
            continue;
        }
        *count += 1;
        selected.push((node, score));
    }

    if (selected.len() as u32) < num_workers {
        return vec![Assignment::failed(
            task.task_id,
            format!("{}-parallel-0", task.task_id.to_hex()),
            "insufficient candidates after regional diversity cap",
        )];
    }

    selected
        .into_iter()
        .enumerate()
        .map(|(i, (node, score))| {
            let est_cost = estimate_cost_tokens(task.task_type, node, reward_multiplier);
            let completion = crate::cost::estimate_completion_ms(task.task_type, node);
            Assignment {
                task_id: task.task_id,
                assignment_id: format!("{}-parallel-{i}", task.task_id.to_hex()),
                assigned: true,
                worker_peer_id: Some(node.peer_id.clone()),
                reason: None,
                candidate_scores: vec![(node.peer_id.clone(), score)],
                expected_latency_ms: node.latency_ms,
                expected_cost_tokens: est_cost,
                expected_completion_time_ms: completion,
            }
        })
        .collect()
}

/// Re-runs the weighted selector with `primary` excluded, for an optional
/// backup assignment (spec §4.10 "Backup worker").
pub fn backup_worker(
    task: &TaskPayload,
    candidates: &[&NodeMetrics],
    primary: &PeerId,
    reputation: impl Fn(&NodeMetrics) -> f64,
    weights: ScoreWeights,
    reward_multiplier: f64,
) -> Option<Assignment> {
    let remaining: Vec<&NodeMetrics> = candidates.iter().filter(|n| &n.peer_id != primary).copied().collect();
    let (node, score) = remaining
        .iter()
        .map(|n| (*n, weighted_score(task, n, reputation(n), weights, reward_multiplier)))
        .filter(|(_, s)| s.is_finite())
        .max_by(|a, b| a.1.total_cmp(&b.1))?;

    let est_cost = estimate_cost_tokens(task.task_type, node, reward_multiplier);
    let completion = crate::cost::estimate_completion_ms(task.task_type, node);
    Some(Assignment {
        task_id: task.task_id,
        assignment_id: format!("{}-backup", task.task_id.to_hex()),
        assigned: true,
        worker_peer_id: Some(node.peer_id.clone()),
        reason: None,
        candidate_scores: vec![(node.peer_id.clone(), score)],
        expected_latency_ms: node.latency_ms,
        expected_cost_tokens: est_cost,
        expected_completion_time_ms: completion,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_node, sample_task};

    #[test]
    fn round_robin_cycles_through_candidates() {
        let task = sample_task();
        let n1 = sample_node("n1");
        let n2 = sample_node("n2");
        let candidates = vec![&n1, &n2];
        let counter = AtomicUsize::new(0);
        let mut rng = rand::thread_rng();

        let (first, _) = select_single(
            SchedulingStrategy::RoundRobin,
            &task,
            &candidates,
            |_| 1.0,
            ScoreWeights::default(),
            1.0,
            &counter,
            None,
            &mut rng,
        )
        .unwrap();
        let (second, _) = select_single(
            SchedulingStrategy::RoundRobin,
            &task,
            &candidates,
            |_| 1.0,
            ScoreWeights::default(),
            1.0,
            &counter,
            None,
            &mut rng,
        )
        .unwrap();
        assert_ne!(first.peer_id, second.peer_id);
    }

    #[test]
    fn parallel_dispatch_respects_regional_cap() {
        // 4 workers needed, cap = max(1, 4/4) = 1 per region: two eu nodes
        // compete for the single eu slot, and the better-scoring one must
        // win while the loser is passed over even though it beats some
        // other-region nodes on raw score.
        let mut task = sample_task();
        task.num_parallel_workers = 4;
        let mut eu_best = sample_node("eu-best");
        eu_best.region = "eu".to_string();
        eu_best.latency_ms = 1.0;
        let mut eu_worst = sample_node("eu-worst");
        eu_worst.region = "eu".to_string();
        eu_worst.latency_ms = 2.0;
        let mut us = sample_node("us");
        us.region = "us".to_string();
        let mut asia = sample_node("asia");
        asia.region = "asia".to_string();
        let mut sa = sample_node("sa");
        sa.region = "sa".to_string();

        let nodes = vec![eu_best.clone(), eu_worst, us, asia, sa];
        let refs: Vec<&NodeMetrics> = nodes.iter().collect();
        let assignments = parallel_dispatch(&task, &refs, |_| 1.0, ScoreWeights::default(), 1.0);
        assert_eq!(assignments.len(), 4);
        assert!(assignments.iter().all(|a| a.assigned));
        let eu_picks = assignments
            .iter()
            .filter(|a| a.worker_peer_id.as_ref().map(|p| p.as_str()) == Some(eu_best.peer_id.as_str()))
            .count();
        assert_eq!(eu_picks, 1);
        assert!(assignments
            .iter()
            .all(|a| a.worker_peer_id.as_ref().map(|p| p.as_str()) != Some("eu-worst")));
    }

    #[test]
    fn parallel_dispatch_fails_cleanly_when_too_few_candidates() {
        let mut task = sample_task();
        task.num_parallel_workers = 5;
        let n1 = sample_node("n1");
        let candidates = vec![&n1];
        let assignments = parallel_dispatch(&task, &candidates, |_| 1.0, ScoreWeights::default(), 1.0);
        assert_eq!(assignments.len(), 1);
        assert!(!assignments[0].assigned);
    }

    #[test]
    fn backup_worker_excludes_primary() {
        let task = sample_task();
        let n1 = sample_node("n1");
        let n2 = sample_node("n2");
        let candidates = vec![&n1, &n2];
        let backup = backup_worker(&task, &candidates, &n1.peer_id, |_| 1.0, ScoreWeights::default(), 1.0).unwrap();
        assert_eq!(backup.worker_peer_id, Some(n2.peer_id.clone()));
    }
}
