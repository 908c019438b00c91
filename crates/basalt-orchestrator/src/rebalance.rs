//! Load rebalancing (spec §4.10 "Rebalancing"): moves tasks off
//! overloaded nodes onto underloaded ones, one at a time, recomputing load
//! after each move.

use std::collections::HashMap;

use basalt_primitives::{PeerId, TaskId};

use crate::types::{Migration, NodeMetrics};

const OVERLOADED_THRESHOLD: f64 = 0.80;
const UNDERLOADED_THRESHOLD: f64 = 0.30;

/// Mutates `assignments` and the virtual `active_task_count` on `nodes` in
/// place, returning the migrations applied. Safe against infinite loops:
/// each migration strictly reduces the overloaded node's count, so the
/// loop terminates within `assignments.len()` iterations at worst.
pub fn rebalance(
    assignments: &mut HashMap<TaskId, PeerId>,
    nodes: &mut HashMap<PeerId, NodeMetrics>,
) -> Vec<Migration> {
    let mut migrations = Vec::new();
    let bound = assignments.len() + 1;

    loop {
        if migrations.len() >= bound {
            break;
        }

        let overloaded = nodes
            .values()
            .filter(|n| n.load_ratio() > OVERLOADED_THRESHOLD && n.active_task_count > 0)
            .max_by(|a, b| a.load_ratio().total_cmp(&b.load_ratio()))
            .map(|n| n.peer_id.clone());
        let Some(from_peer) = overloaded else {
            break;
        };

        let underloaded = nodes
            .values()
            .filter(|n| {
                n.load_ratio() < UNDERLOADED_THRESHOLD
                    && n.peer_id != from_peer
                    && n.active_task_count < n.max_concurrent_tasks
            })
            .min_by(|a, b| a.load_ratio().total_cmp(&b.load_ratio()))
            .map(|n| n.peer_id.clone());
        let Some(to_peer) = underloaded else {
            break;
        };

        let task_id = assignments
            .iter()
            .find(|(_, peer)| **peer == from_peer)
            .map(|(task_id, _)| *task_id);
        let Some(task_id) = task_id else {
            break;
        };

        assignments.insert(task_id, to_peer.clone());
        if let Some(n) = nodes.get_mut(&from_peer) {
            n.active_task_count = n.active_task_count.saturating_sub(1);
        }
        if let Some(n) = nodes.get_mut(&to_peer) {
            n.active_task_count += 1;
        }
        migrations.push(Migration {
            task_id,
            description: format!("{from_peer}->{to_peer}"),
        });
    }

    migrations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_node;
    use basalt_primitives::Digest;

    fn task_id(n: u8) -> TaskId {
        let mut bytes = [0u8; 32];
        bytes[31] = n;
        TaskId(Digest::from_bytes(bytes))
    }

    #[test]
    fn moves_one_task_from_overloaded_to_underloaded() {
        let mut overloaded = sample_node("hot");
        overloaded.max_concurrent_tasks = 10;
        overloaded.active_task_count = 9; // load 0.9
        let mut cold = sample_node("cold");
        cold.max_concurrent_tasks = 10;
        cold.active_task_count = 1; // load 0.1

        let mut nodes = HashMap::new();
        nodes.insert(overloaded.peer_id.clone(), overloaded.clone());
        nodes.insert(cold.peer_id.clone(), cold.clone());

        let mut assignments = HashMap::new();
        assignments.insert(task_id(1), overloaded.peer_id.clone());

        let migrations = rebalance(&mut assignments, &mut nodes);
        assert_eq!(migrations.len(), 1);
        assert_eq!(assignments.get(&task_id(1)), Some(&cold.peer_id));
        assert_eq!(nodes[&overloaded.peer_id].active_task_count, 8);
        assert_eq!(nodes[&cold.peer_id].active_task_count, 2);
    }

    #[test]
    fn no_migration_when_nothing_is_overloaded() {
        let mut nodes = HashMap::new();
        let n = sample_node("n1");
        nodes.insert(n.peer_id.clone(), n);
        let mut assignments = HashMap::new();
        let migrations = rebalance(&mut assignments, &mut nodes);
        assert!(migrations.is_empty());
    }
}
