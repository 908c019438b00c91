//! Task and node value types (spec §3 `TaskPayload`, `NodeMetrics`).

use std::collections::HashSet;

use basalt_primitives::{PeerId, TaskId};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TaskType {
    AiInference,
    AiTraining,
    FederatedRound,
    Wasm,
    Zk,
    DataProcessing,
    Relay,
}

/// Hardware/software requirements a candidate node must satisfy.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TaskRequirements {
    pub min_cpu_cores: u32,
    pub min_mem_mb: u64,
    pub min_storage_mb: u64,
    pub min_bandwidth_mbps: f64,
    pub needs_gpu: bool,
    pub needs_tpu: bool,
    pub architectures: Vec<String>,
    pub runtimes: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 500,
        }
    }
}

/// A unit of distributed work submitted to the orchestrator (spec §3).
#[derive(Clone, Debug)]
pub struct TaskPayload {
    pub task_id: TaskId,
    pub task_type: TaskType,
    pub priority: u8,
    pub payload_bytes: Vec<u8>,
    pub requirements: TaskRequirements,
    pub timeout_ms: u64,
    pub deadline_ms: Option<u64>,
    pub preferred_region: Option<String>,
    pub blacklist: HashSet<PeerId>,
    pub whitelist: Option<HashSet<PeerId>>,
    pub max_cost_tokens: Option<u64>,
    pub min_reputation: f64,
    pub allow_parallel: bool,
    pub num_parallel_workers: u32,
    pub retry_policy: RetryPolicy,
    pub submitter_id: PeerId,
    pub submitted_at_ms: u64,
    /// Additive preference (spec §4.10 scoring formula), not a hard
    /// requirement: a `0.05` score bonus when a node's carbon intensity is
    /// below 100 gCO2/kWh.
    pub prefer_green_energy: bool,
}

/// A worker node's self-reported and measured state (spec §3).
#[derive(Clone, Debug)]
pub struct NodeMetrics {
    pub peer_id: PeerId,
    pub region: String,
    pub zone: Option<String>,
    pub latency_ms: f64,
    pub bandwidth_mbps: f64,
    pub jitter_ms: f64,
    pub cpu_utilization: f64,
    pub mem_utilization: f64,
    pub disk_utilization: f64,
    pub gpu_utilization: f64,
    pub capacity_score: f64,
    pub energy_source: String,
    pub carbon_intensity_g_co2_per_kwh: f64,
    pub cost_per_hour: f64,
    pub tokens_available: u64,
    pub last_seen_ms: u64,
    pub availability_rate: f64,
    pub active_task_count: u32,
    pub max_concurrent_tasks: u32,
    pub is_verified: bool,
    pub has_zk: bool,
    pub has_gpu: bool,
    pub has_tpu: bool,
    pub attestation_hash: Option<basalt_primitives::Digest>,
    pub cpu_cores: u32,
    pub mem_mb: u64,
    pub storage_mb: u64,
    pub architectures: Vec<String>,
    pub runtimes: Vec<String>,
}

impl NodeMetrics {
    pub fn load_ratio(&self) -> f64 {
        if self.max_concurrent_tasks == 0 {
            return 1.0;
        }
        self.active_task_count as f64 / self.max_concurrent_tasks as f64
    }

    pub fn satisfies(&self, req: &TaskRequirements) -> bool {
        self.cpu_cores >= req.min_cpu_cores
            && self.mem_mb >= req.min_mem_mb
            && self.storage_mb >= req.min_storage_mb
            && self.bandwidth_mbps >= req.min_bandwidth_mbps
            && (!req.needs_gpu || self.has_gpu)
            && (!req.needs_tpu || self.has_tpu)
            && req.architectures.iter().all(|a| self.architectures.contains(a))
            && req.runtimes.iter().all(|r| self.runtimes.contains(r))
    }
}

/// An orchestrator decision binding a task to a worker (spec GLOSSARY).
#[derive(Clone, Debug)]
pub struct Assignment {
    pub task_id: TaskId,
    pub assignment_id: String,
    pub assigned: bool,
    pub worker_peer_id: Option<PeerId>,
    pub reason: Option<String>,
    pub candidate_scores: Vec<(PeerId, f64)>,
    pub expected_latency_ms: f64,
    pub expected_cost_tokens: u64,
    pub expected_completion_time_ms: f64,
}

impl Assignment {
    pub fn failed(task_id: TaskId, assignment_id: String, reason: impl Into<String>) -> Self {
        Self {
            task_id,
            assignment_id,
            assigned: false,
            worker_peer_id: None,
            reason: Some(reason.into()),
            candidate_scores: Vec::new(),
            expected_latency_ms: 0.0,
            expected_cost_tokens: 0,
            expected_completion_time_ms: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SchedulingStrategy {
    WeightedScore,
    RoundRobin,
    LeastLoaded,
    LowestLatency,
    HighestReputation,
    LowestCost,
    GeographicAffinity,
    LoadBalancing,
    GeneticAlgorithm,
    Custom,
}

/// Weights for the default weighted-score strategy (spec §4.10).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoreWeights {
    pub trust: f64,
    pub speed: f64,
    pub power: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            trust: 0.6,
            speed: 0.3,
            power: 0.1,
        }
    }
}

/// A `(task_id, "from->to")` migration record emitted by rebalancing.
#[derive(Clone, Debug, PartialEq)]
pub struct Migration {
    pub task_id: TaskId,
    pub description: String,
}

#[derive(Clone, Debug, Default)]
pub struct OrchestratorMetrics {
    pub tasks_submitted: u64,
    pub tasks_assigned: u64,
    pub tasks_failed_to_assign: u64,
    pub total_assignment_wall_time_ms: f64,
    pub batch_assignments: u64,
}

impl OrchestratorMetrics {
    pub fn average_wall_time_ms(&self) -> f64 {
        if self.tasks_assigned == 0 {
            0.0
        } else {
            self.total_assignment_wall_time_ms / self.tasks_assigned as f64
        }
    }
}
