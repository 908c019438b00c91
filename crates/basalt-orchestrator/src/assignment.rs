//! Batch global scheduling (spec §4.10 "Batch global scheduling"): builds
//! a padded cost matrix over task x (node-slot + sentinel) pairs and solves
//! it with the Hungarian (Kuhn-Munkres) algorithm. This is the one corner
//! of this crate with no direct teacher-file counterpart (see DESIGN.md) —
//! built straight from the spec's algorithmic description.

use basalt_primitives::PeerId;

use crate::cost::estimate_cost_tokens;
use crate::score::weighted_score;
use crate::types::{Assignment, NodeMetrics, ScoreWeights, TaskPayload};

/// Cost assigned to an infeasible (requirement mismatch / blacklisted)
/// pairing or to a sentinel "leave unassigned" column, per spec §4.10.
const SENTINEL_COST: f64 = 1e12;

/// Solves the rectangular minimum-cost assignment problem: `cost` has
/// `n` rows and `m >= n` columns; every row is matched to a distinct
/// column minimizing total cost. This is the textbook O(n^2 * m)
/// Kuhn-Munkres shortest-augmenting-path formulation, indices kept
/// 1-based internally to match the well-known reference form.
pub fn hungarian_min_cost(cost: &[Vec<f64>]) -> (f64, Vec<usize>) {
    let n = cost.len();
    if n == 0 {
        return (0.0, Vec::new());
    }
    let m = cost[0].len();
    assert!(m >= n, "cost matrix must have at least as many columns as rows");

    let inf = f64::INFINITY;
    let mut u = vec![0.0_f64; n + 1];
    let mut v = vec![0.0_f64; m + 1];
    let mut p = vec![0usize; m + 1];
    let mut way = vec![0usize; m + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![inf; m + 1];
        let mut used = vec![false; m + 1];
        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = inf;
            let mut j1 = 0usize;
            for j in 1..=m {
                if !used[j] {
                    let cur = cost[i0 - 1][j - 1] - u[i0] - v[j];
                    if cur < minv[j] {
                        minv[j] = cur;
                        way[j] = j0;
                    }
                    if minv[j] < delta {
                        delta = minv[j];
                        j1 = j;
                    }
                }
            }
            for j in 0..=m {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }
            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }
        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut result = vec![0usize; n];
    for j in 1..=m {
        if p[j] > 0 {
            result[p[j] - 1] = j - 1;
        }
    }
    let total: f64 = (0..n).map(|i| cost[i][result[i]]).sum();
    (total, result)
}

/// One residual-capacity unit on a specific node — a column of the cost
/// matrix.
struct Slot<'a> {
    node: &'a NodeMetrics,
}

/// Builds the cost matrix for `tasks` over `nodes`' residual capacity and
/// solves it, emitting one [`Assignment`] per task (spec §4.10, invariant
/// 11 in spec §8: every `assigned=false` outcome corresponds to a
/// sentinel column).
pub fn batch_assign(
    tasks: &[TaskPayload],
    nodes: &[NodeMetrics],
    reputation: impl Fn(&PeerId) -> f64,
    weights: ScoreWeights,
    reward_multiplier: f64,
) -> Vec<Assignment> {
    let m = tasks.len();
    if m == 0 {
        return Vec::new();
    }

    let mut slots: Vec<Slot<'_>> = Vec::new();
    for node in nodes {
        let residual = node.max_concurrent_tasks.saturating_sub(node.active_task_count);
        for _ in 0..residual {
            slots.push(Slot { node });
        }
    }

    let cols = slots.len() + m;
    let mut cost = vec![vec![SENTINEL_COST; cols]; m];
    for (ti, task) in tasks.iter().enumerate() {
        for (si, slot) in slots.iter().enumerate() {
            let rep = reputation(&slot.node.peer_id);
            let score = weighted_score(task, slot.node, rep, weights, reward_multiplier);
            if score.is_finite() {
                cost[ti][si] = -score;
            }
        }
        // `m` trailing sentinel columns, one guaranteed-available "leave
        // unassigned" slot per task so the solve is always feasible.
        for sentinel in 0..m {
            cost[ti][slots.len() + sentinel] = SENTINEL_COST;
        }
    }

    let (_, col_for_row) = hungarian_min_cost(&cost);

    tasks
        .iter()
        .enumerate()
        .map(|(ti, task)| {
            let col = col_for_row[ti];
            if col >= slots.len() {
                return Assignment::failed(
                    task.task_id,
                    format!("{}-batch", task.task_id.to_hex()),
                    "No feasible assignment after global optimization",
                );
            }
            let slot = &slots[col];
            let rep = reputation(&slot.node.peer_id);
            let score = weighted_score(task, slot.node, rep, weights, reward_multiplier);
            let est_cost = estimate_cost_tokens(task.task_type, slot.node, reward_multiplier);
            let completion = crate::cost::estimate_completion_ms(task.task_type, slot.node);
            Assignment {
                task_id: task.task_id,
                assignment_id: format!("{}-batch", task.task_id.to_hex()),
                assigned: true,
                worker_peer_id: Some(slot.node.peer_id.clone()),
                reason: None,
                candidate_scores: vec![(slot.node.peer_id.clone(), score)],
                expected_latency_ms: slot.node.latency_ms,
                expected_cost_tokens: est_cost,
                expected_completion_time_ms: completion,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hungarian_picks_global_minimum_not_greedy_per_row() {
        // Classic example where greedy row-by-row assignment fails but the
        // Hungarian algorithm finds the true optimum.
        let cost = vec![vec![4.0, 1.0, 3.0], vec![2.0, 0.0, 5.0], vec![3.0, 2.0, 2.0]];
        let (total, assign) = hungarian_min_cost(&cost);
        // Optimal assignment: row0->col1(1), row1->col0(2), row2->col2(2) = 5
        // (a greedy-by-row choice of row0->col0(4) forces a worse total).
        assert_eq!(total, 5.0);
        assert_eq!(assign.len(), 3);
        let mut used = assign.clone();
        used.sort();
        assert_eq!(used, vec![0, 1, 2]);
    }

    #[test]
    fn rectangular_matrix_with_sentinel_columns_solves() {
        // 2 tasks, 1 real slot + 2 sentinel columns.
        let cost = vec![
            vec![1.0, SENTINEL_COST, SENTINEL_COST],
            vec![5.0, SENTINEL_COST, SENTINEL_COST],
        ];
        let (_, assign) = hungarian_min_cost(&cost);
        // The cheaper task should take the real slot (col 0); the other
        // goes to a sentinel.
        assert_eq!(assign[0], 0);
        assert_ne!(assign[1], 0);
    }
}
