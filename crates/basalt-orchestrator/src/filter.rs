//! Candidate filtering (spec §4.10 "Candidate filtering"): the gate every
//! node must clear before scoring is even attempted.

use crate::types::{NodeMetrics, TaskPayload};

const OFFLINE_AFTER_MS: u64 = 5 * 60 * 1000;

/// Why a node was excluded, surfaced for diagnostics/tests only — the
/// orchestrator itself just needs the filtered set.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FilterRejection {
    Blacklisted,
    NotWhitelisted,
    Offline,
    RequirementsNotMet,
    BelowMinReputation,
    MissingZk,
    AtCapacity,
    ExceedsMaxCost,
}

/// Applies every filter in spec §4.10's list. `reputation` is the trust
/// score already looked up for each node (keeping this function pure and
/// independent of the reputation ledger's storage).
pub fn filter_candidates<'a>(
    task: &TaskPayload,
    nodes: &'a [NodeMetrics],
    reputation: impl Fn(&NodeMetrics) -> f64,
    estimated_cost: impl Fn(&NodeMetrics) -> u64,
    now_ms: u64,
) -> Vec<&'a NodeMetrics> {
    nodes
        .iter()
        .filter(|n| reject_reason(task, n, &reputation, &estimated_cost, now_ms).is_none())
        .collect()
}

pub fn reject_reason(
    task: &TaskPayload,
    node: &NodeMetrics,
    reputation: &impl Fn(&NodeMetrics) -> f64,
    estimated_cost: &impl Fn(&NodeMetrics) -> u64,
    now_ms: u64,
) -> Option<FilterRejection> {
    if task.blacklist.contains(&node.peer_id) {
        return Some(FilterRejection::Blacklisted);
    }
    if let Some(whitelist) = &task.whitelist {
        if !whitelist.contains(&node.peer_id) {
            return Some(FilterRejection::NotWhitelisted);
        }
    }
    if now_ms.saturating_sub(node.last_seen_ms) > OFFLINE_AFTER_MS {
        return Some(FilterRejection::Offline);
    }
    if !node.satisfies(&task.requirements) {
        return Some(FilterRejection::RequirementsNotMet);
    }
    if reputation(node) < task.min_reputation {
        return Some(FilterRejection::BelowMinReputation);
    }
    if task.task_type == crate::types::TaskType::Zk && !node.has_zk {
        return Some(FilterRejection::MissingZk);
    }
    if node.active_task_count >= node.max_concurrent_tasks {
        return Some(FilterRejection::AtCapacity);
    }
    if let Some(max_cost) = task.max_cost_tokens {
        if estimated_cost(node) > max_cost {
            return Some(FilterRejection::ExceedsMaxCost);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_node, sample_task};

    #[test]
    fn blacklisted_node_is_rejected() {
        let mut task = sample_task();
        let node = sample_node("n1");
        task.blacklist.insert(node.peer_id.clone());
        let rejection = reject_reason(&task, &node, &|_| 1.0, &|_| 0, 1_000);
        assert_eq!(rejection, Some(FilterRejection::Blacklisted));
    }

    #[test]
    fn offline_node_is_rejected() {
        let task = sample_task();
        let mut node = sample_node("n1");
        node.last_seen_ms = 0;
        let rejection = reject_reason(&task, &node, &|_| 1.0, &|_| 0, 10 * 60 * 1000);
        assert_eq!(rejection, Some(FilterRejection::Offline));
    }

    #[test]
    fn low_reputation_node_is_rejected() {
        let mut task = sample_task();
        task.min_reputation = 0.5;
        let node = sample_node("n1");
        let rejection = reject_reason(&task, &node, &|_| 0.1, &|_| 0, 1_000);
        assert_eq!(rejection, Some(FilterRejection::BelowMinReputation));
    }

    #[test]
    fn healthy_node_passes() {
        let task = sample_task();
        let node = sample_node("n1");
        assert!(reject_reason(&task, &node, &|_| 1.0, &|_| 0, 1_000).is_none());
    }
}
