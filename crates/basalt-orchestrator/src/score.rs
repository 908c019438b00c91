//! Per-node weighted scoring (spec §4.10 "Per-node score (weighted
//! strategy)").

use crate::cost::estimate_cost_tokens;
use crate::types::{NodeMetrics, ScoreWeights, TaskPayload};

/// A caller-supplied scorer that replaces the weighted formula entirely
/// (spec §4.10: "A caller-supplied scorer, if present, replaces this
/// formula entirely").
pub type CustomScorer = dyn Fn(&TaskPayload, &NodeMetrics) -> f64 + Send + Sync;

/// Computes the weighted-strategy score for one candidate. Returns
/// `f64::NEG_INFINITY` if the node fails the reputation or cost gate —
/// candidate filtering (§`filter`) should already have removed such nodes,
/// but the gate is reimplemented here too since the formula is specified
/// as including it.
pub fn weighted_score(
    task: &TaskPayload,
    node: &NodeMetrics,
    reputation_score: f64,
    weights: ScoreWeights,
    reward_multiplier: f64,
) -> f64 {
    if reputation_score < task.min_reputation {
        return f64::NEG_INFINITY;
    }

    let est_cost = estimate_cost_tokens(task.task_type, node, reward_multiplier);
    let cost_factor = match task.max_cost_tokens {
        Some(max_cost) if max_cost > 0 => {
            if est_cost > max_cost {
                return f64::NEG_INFINITY;
            }
            (1.0 - est_cost as f64 / max_cost as f64).clamp(0.0, 1.0)
        }
        Some(0) => {
            if est_cost > 0 {
                return f64::NEG_INFINITY;
            }
            1.0
        }
        None => 1.0,
    };

    let mut score = reputation_score * weights.trust - (node.latency_ms / 1000.0) * weights.speed
        + node.capacity_score * weights.power;

    if let Some(preferred) = &task.preferred_region {
        if preferred == &node.region {
            score += 0.10;
        }
    }
    if task.prefer_green_energy && node.carbon_intensity_g_co2_per_kwh < 100.0 {
        score += 0.05;
    }
    score -= node.load_ratio() * 0.20;

    score * cost_factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_node, sample_task};

    #[test]
    fn scenario_s5_weighted_orchestrator() {
        // spec §8 S5: N1{latency=50, capacity=0.9, rep=0.8} wins over
        // N2{latency=200, capacity=0.5, rep=0.9}; N3 is filtered by
        // reputation before scoring even applies.
        let task = sample_task();
        let weights = ScoreWeights::default();

        let mut n1 = sample_node("n1");
        n1.latency_ms = 50.0;
        n1.capacity_score = 0.9;
        let mut n2 = sample_node("n2");
        n2.latency_ms = 200.0;
        n2.capacity_score = 0.5;

        let s1 = weighted_score(&task, &n1, 0.8, weights, 1.0);
        let s2 = weighted_score(&task, &n2, 0.9, weights, 1.0);
        assert!(s1 > s2, "s1={s1} s2={s2}");
    }

    #[test]
    fn below_min_reputation_is_negative_infinity() {
        let mut task = sample_task();
        task.min_reputation = 0.5;
        let node = sample_node("n1");
        let score = weighted_score(&task, &node, 0.1, ScoreWeights::default(), 1.0);
        assert_eq!(score, f64::NEG_INFINITY);
    }

    #[test]
    fn exceeding_max_cost_is_negative_infinity() {
        let mut task = sample_task();
        task.max_cost_tokens = Some(1);
        let mut node = sample_node("n1");
        node.cost_per_hour = 1_000_000.0;
        let score = weighted_score(&task, &node, 1.0, ScoreWeights::default(), 1.0);
        assert_eq!(score, f64::NEG_INFINITY);
    }

    #[test]
    fn preferred_region_adds_bonus() {
        let mut task = sample_task();
        task.preferred_region = Some("eu".to_string());
        let mut node = sample_node("n1");
        node.region = "eu".to_string();
        let mut elsewhere = sample_node("n2");
        elsewhere.region = "us".to_string();
        let with_bonus = weighted_score(&task, &node, 1.0, ScoreWeights::default(), 1.0);
        let without = weighted_score(&task, &elsewhere, 1.0, ScoreWeights::default(), 1.0);
        assert!(with_bonus > without);
    }
}
