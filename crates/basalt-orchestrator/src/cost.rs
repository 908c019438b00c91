//! Cost and completion-time estimation (spec §4.10 "Cost estimate").

use crate::types::{NodeMetrics, TaskType};

/// Base completion time in milliseconds for a task type, split by whether
/// the node has a GPU (spec §4.10's table).
fn base_completion_ms(task_type: TaskType, has_gpu: bool) -> f64 {
    match task_type {
        TaskType::AiInference => {
            if has_gpu {
                100.0
            } else {
                1_000.0
            }
        }
        TaskType::AiTraining => {
            if has_gpu {
                10_000.0
            } else {
                60_000.0
            }
        }
        TaskType::FederatedRound => 5_000.0,
        TaskType::Wasm => 1_000.0,
        TaskType::Zk => 3_000.0,
        TaskType::DataProcessing => 2_000.0,
        TaskType::Relay => 500.0,
    }
}

/// Completion time adjusted by CPU utilization and additive latency, per
/// spec §4.10: `base * (1 + 0.5 * cpu_utilization) + latency_ms`.
pub fn estimate_completion_ms(task_type: TaskType, node: &NodeMetrics) -> f64 {
    let base = base_completion_ms(task_type, node.has_gpu);
    base * (1.0 + 0.5 * node.cpu_utilization) + node.latency_ms
}

/// `ceil(completion_hours * cost_per_hour * reward_multiplier)` (spec
/// §4.10 "Cost estimate").
pub fn estimate_cost_tokens(task_type: TaskType, node: &NodeMetrics, reward_multiplier: f64) -> u64 {
    let completion_hours = estimate_completion_ms(task_type, node) / (60.0 * 60.0 * 1000.0);
    let cost = completion_hours * node.cost_per_hour * reward_multiplier;
    cost.ceil().max(0.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_node;

    #[test]
    fn gpu_inference_is_cheaper_and_faster_than_cpu() {
        let mut gpu = sample_node("gpu");
        gpu.has_gpu = true;
        gpu.cpu_utilization = 0.0;
        gpu.latency_ms = 0.0;
        let mut cpu = sample_node("cpu");
        cpu.has_gpu = false;
        cpu.cpu_utilization = 0.0;
        cpu.latency_ms = 0.0;

        let gpu_time = estimate_completion_ms(TaskType::AiInference, &gpu);
        let cpu_time = estimate_completion_ms(TaskType::AiInference, &cpu);
        assert!(gpu_time < cpu_time);
    }

    #[test]
    fn higher_cpu_utilization_increases_completion_time() {
        let mut busy = sample_node("busy");
        busy.cpu_utilization = 0.8;
        busy.latency_ms = 0.0;
        let mut idle = sample_node("idle");
        idle.cpu_utilization = 0.0;
        idle.latency_ms = 0.0;
        assert!(
            estimate_completion_ms(TaskType::DataProcessing, &busy)
                > estimate_completion_ms(TaskType::DataProcessing, &idle)
        );
    }
}
