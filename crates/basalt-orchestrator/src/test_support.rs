//! Shared test fixtures, used by `#[cfg(test)]` modules across this
//! crate's files.

use std::collections::HashSet;

use basalt_primitives::{Digest, PeerId, TaskId};

use crate::types::{NodeMetrics, RetryPolicy, TaskPayload, TaskRequirements, TaskType};

pub fn sample_task() -> TaskPayload {
    let mut bytes = [0u8; 32];
    bytes[0] = 1;
    TaskPayload {
        task_id: TaskId(Digest::from_bytes(bytes)),
        task_type: TaskType::DataProcessing,
        priority: 1,
        payload_bytes: Vec::new(),
        requirements: TaskRequirements::default(),
        timeout_ms: 30_000,
        deadline_ms: None,
        preferred_region: None,
        blacklist: HashSet::new(),
        whitelist: None,
        max_cost_tokens: None,
        min_reputation: 0.0,
        allow_parallel: false,
        num_parallel_workers: 1,
        retry_policy: RetryPolicy::default(),
        submitter_id: PeerId::new("submitter"),
        submitted_at_ms: 0,
        prefer_green_energy: false,
    }
}

pub fn sample_node(peer_id: &str) -> NodeMetrics {
    NodeMetrics {
        peer_id: PeerId::new(peer_id),
        region: "default".to_string(),
        zone: None,
        latency_ms: 10.0,
        bandwidth_mbps: 100.0,
        jitter_ms: 1.0,
        cpu_utilization: 0.1,
        mem_utilization: 0.1,
        disk_utilization: 0.1,
        gpu_utilization: 0.0,
        capacity_score: 0.8,
        energy_source: "grid".to_string(),
        carbon_intensity_g_co2_per_kwh: 200.0,
        cost_per_hour: 1.0,
        tokens_available: 1_000,
        last_seen_ms: 1_000,
        availability_rate: 0.99,
        active_task_count: 0,
        max_concurrent_tasks: 10,
        is_verified: true,
        has_zk: false,
        has_gpu: false,
        has_tpu: false,
        attestation_hash: None,
        cpu_cores: 8,
        mem_mb: 16_000,
        storage_mb: 100_000,
        architectures: Vec::new(),
        runtimes: Vec::new(),
    }
}
