//! Reputation ledger and latency map contracts (spec §4.10): per-peer trust
//! scoring and measured network distance, both consumed by the task
//! orchestrator's candidate filtering and scoring. Neither component owns a
//! worker thread (spec §5) — they are synchronized data structures called
//! from whichever thread needs a score.

use std::collections::HashMap;

use basalt_config::ReputationConfig;
use basalt_primitives::PeerId;
use parking_lot::RwLock;

/// Per-peer trust record (spec §3 `Reputation`).
#[derive(Clone, Debug, PartialEq)]
pub struct Reputation {
    pub peer_id: PeerId,
    pub total_tasks: u64,
    pub successful_tasks: u64,
    pub failed_tasks: u64,
    pub timeout_tasks: u64,
    pub byzantine_count: u64,
    pub recent_success_rate: f64,
    pub avg_quality: f64,
    pub avg_response_time_ms: f64,
    pub slashing_count: u64,
    pub tokens: u64,
    pub trust_score: f64,
    pub last_active_at_ms: u64,
}

impl Reputation {
    /// A peer we have never observed: neutral trust, no history.
    fn new(peer_id: PeerId, now_ms: u64) -> Self {
        Self {
            peer_id,
            total_tasks: 0,
            successful_tasks: 0,
            failed_tasks: 0,
            timeout_tasks: 0,
            byzantine_count: 0,
            recent_success_rate: 1.0,
            avg_quality: 1.0,
            avg_response_time_ms: 0.0,
            slashing_count: 0,
            tokens: 0,
            trust_score: 0.5,
            last_active_at_ms: now_ms,
        }
    }

    /// Blends recent success rate, average quality, and a byzantine
    /// penalty into the single `[0,1]` trust score the orchestrator reads.
    /// Byzantine behaviour is weighted heavily: a single strike knocks
    /// trust down hard, matching the "slashing" framing in spec §3.
    fn recompute_trust_score(&mut self) {
        let behavior = 0.5 * self.recent_success_rate + 0.5 * self.avg_quality;
        let byzantine_penalty = 1.0 - (self.byzantine_count as f64 * 0.25).min(1.0);
        self.trust_score = (behavior * byzantine_penalty).clamp(0.0, 1.0);
    }
}

/// Owns every peer's [`Reputation`] record. Sole writer per spec §3
/// ("the Orchestrator is the sole writer of ... metrics" — the reputation
/// ledger is the orchestrator's delegate for this slice of state).
pub struct ReputationLedger {
    config: ReputationConfig,
    entries: RwLock<HashMap<PeerId, Reputation>>,
}

impl ReputationLedger {
    pub fn new(config: ReputationConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns a copy of `peer`'s record, materializing a neutral default
    /// if this is the first time the peer has been seen. Unlike the
    /// ledger's `balance_of`, this *does* insert — reputation has no
    /// meaningful "unknown peer" state distinct from "freshly seen peer".
    pub fn get(&self, peer: &PeerId, now_ms: u64) -> Reputation {
        let mut guard = self.entries.write();
        guard
            .entry(peer.clone())
            .or_insert_with(|| Reputation::new(peer.clone(), now_ms))
            .clone()
    }

    /// Overwrites `peer`'s record wholesale.
    pub fn update(&self, record: Reputation) {
        self.entries.write().insert(record.peer_id.clone(), record);
    }

    pub fn batch_update(&self, records: Vec<Reputation>) {
        let mut guard = self.entries.write();
        for record in records {
            guard.insert(record.peer_id.clone(), record);
        }
    }

    /// Folds the outcome of one completed task into `peer`'s running
    /// averages using an exponential moving average (alpha = 0.2), then
    /// recomputes the derived trust score.
    pub fn record_task_completion(
        &self,
        peer: &PeerId,
        outcome: TaskOutcome,
        quality: f64,
        response_time_ms: f64,
        now_ms: u64,
    ) {
        const ALPHA: f64 = 0.2;
        let mut guard = self.entries.write();
        let rep = guard
            .entry(peer.clone())
            .or_insert_with(|| Reputation::new(peer.clone(), now_ms));

        rep.total_tasks += 1;
        match outcome {
            TaskOutcome::Success => rep.successful_tasks += 1,
            TaskOutcome::Failure => rep.failed_tasks += 1,
            TaskOutcome::Timeout => rep.timeout_tasks += 1,
        }
        let success_sample = if matches!(outcome, TaskOutcome::Success) { 1.0 } else { 0.0 };
        rep.recent_success_rate = ALPHA * success_sample + (1.0 - ALPHA) * rep.recent_success_rate;
        rep.avg_quality = ALPHA * quality.clamp(0.0, 1.0) + (1.0 - ALPHA) * rep.avg_quality;
        rep.avg_response_time_ms =
            ALPHA * response_time_ms + (1.0 - ALPHA) * rep.avg_response_time_ms;
        rep.last_active_at_ms = now_ms;
        rep.recompute_trust_score();
    }

    pub fn record_byzantine(&self, peer: &PeerId, now_ms: u64) {
        let mut guard = self.entries.write();
        let rep = guard
            .entry(peer.clone())
            .or_insert_with(|| Reputation::new(peer.clone(), now_ms));
        rep.byzantine_count += 1;
        rep.last_active_at_ms = now_ms;
        rep.recompute_trust_score();
        tracing::warn!(peer = %peer, count = rep.byzantine_count, "byzantine behaviour recorded");
    }

    /// Boosts trust score by `delta`, clamped to `[0,1]`.
    pub fn reward(&self, peer: &PeerId, trust_delta: f64, now_ms: u64) {
        let mut guard = self.entries.write();
        let rep = guard
            .entry(peer.clone())
            .or_insert_with(|| Reputation::new(peer.clone(), now_ms));
        rep.trust_score = (rep.trust_score + trust_delta).clamp(0.0, 1.0);
        rep.last_active_at_ms = now_ms;
    }

    /// Applies both a trust penalty and a token slash, and records the
    /// strike against `slashing_count`.
    pub fn slash(&self, peer: &PeerId, reputation_penalty: f64, token_slash: u64, now_ms: u64) {
        let mut guard = self.entries.write();
        let rep = guard
            .entry(peer.clone())
            .or_insert_with(|| Reputation::new(peer.clone(), now_ms));
        rep.trust_score = (rep.trust_score - reputation_penalty).clamp(0.0, 1.0);
        rep.tokens = rep.tokens.saturating_sub(token_slash);
        rep.slashing_count += 1;
        rep.last_active_at_ms = now_ms;
        tracing::warn!(peer = %peer, penalty = reputation_penalty, tokens = token_slash, "slashed");
    }

    /// The `n` peers with the highest trust score, descending.
    pub fn top_nodes(&self, n: usize) -> Vec<Reputation> {
        let guard = self.entries.read();
        let mut all: Vec<Reputation> = guard.values().cloned().collect();
        all.sort_by(|a, b| b.trust_score.total_cmp(&a.trust_score));
        all.truncate(n);
        all
    }

    pub fn above_threshold(&self, threshold: f64) -> Vec<PeerId> {
        self.entries
            .read()
            .values()
            .filter(|r| r.trust_score >= threshold)
            .map(|r| r.peer_id.clone())
            .collect()
    }

    /// Multiplicative decay for peers inactive longer than the configured
    /// window (spec §9 open question, resolved in SPEC_FULL.md: 30-day
    /// window, rate 0.01 by default, both configurable):
    /// `trust_score *= exp(-rate * days_inactive)`.
    pub fn decay_inactive(&self, now_ms: u64) {
        let window_ms = self.config.decay_window_days * 24 * 60 * 60 * 1000;
        let mut guard = self.entries.write();
        for rep in guard.values_mut() {
            let inactive_ms = now_ms.saturating_sub(rep.last_active_at_ms);
            if inactive_ms <= window_ms {
                continue;
            }
            let days_inactive = (inactive_ms - window_ms) as f64 / (24.0 * 60.0 * 60.0 * 1000.0);
            rep.trust_score *= (-self.config.decay_rate * days_inactive).exp();
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskOutcome {
    Success,
    Failure,
    Timeout,
}

/// Measured network distance to a peer. Implementations may be
/// remote-measured or static (spec §4.10) — this trait is the seam.
pub trait LatencyFeed: Send + Sync {
    fn get_latency_ms(&self, peer: &PeerId) -> Option<f64>;
    fn update_latency(&self, peer: &PeerId, latency_ms: f64, now_ms: u64);
    fn get_bandwidth(&self, peer: &PeerId) -> Option<f64>;
    fn get_jitter(&self, peer: &PeerId) -> Option<f64>;
    /// Issues a fresh measurement for `peer`, returning the sample taken.
    /// Implementations that have no real network probe (the default
    /// `InMemoryLatencyMap`) simply replay the last known sample.
    fn probe(&self, peer: &PeerId, now_ms: u64) -> Option<f64>;
    fn get_distance_km(&self, peer: &PeerId) -> Option<f64>;
    fn cleanup_stale(&self, max_age_ms: u64, now_ms: u64);
}

#[derive(Clone, Debug)]
struct LatencyEntry {
    latency_ms: f64,
    bandwidth_mbps: f64,
    jitter_ms: f64,
    distance_km: Option<f64>,
    last_seen_ms: u64,
}

/// The default, in-process [`LatencyFeed`]: callers feed it measurements
/// (from wherever network RTTs are actually sampled — out of scope here)
/// and it answers queries against the latest sample per peer.
#[derive(Default)]
pub struct InMemoryLatencyMap {
    entries: RwLock<HashMap<PeerId, LatencyEntry>>,
}

impl InMemoryLatencyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a full sample (latency + bandwidth + jitter + distance) in
    /// one call, as a heartbeat callback or network prober would.
    pub fn record_sample(
        &self,
        peer: &PeerId,
        latency_ms: f64,
        bandwidth_mbps: f64,
        jitter_ms: f64,
        distance_km: Option<f64>,
        now_ms: u64,
    ) {
        self.entries.write().insert(
            peer.clone(),
            LatencyEntry {
                latency_ms,
                bandwidth_mbps,
                jitter_ms,
                distance_km,
                last_seen_ms: now_ms,
            },
        );
    }
}

impl LatencyFeed for InMemoryLatencyMap {
    fn get_latency_ms(&self, peer: &PeerId) -> Option<f64> {
        self.entries.read().get(peer).map(|e| e.latency_ms)
    }

    fn update_latency(&self, peer: &PeerId, latency_ms: f64, now_ms: u64) {
        let mut guard = self.entries.write();
        let entry = guard.entry(peer.clone()).or_insert(LatencyEntry {
            latency_ms,
            bandwidth_mbps: 0.0,
            jitter_ms: 0.0,
            distance_km: None,
            last_seen_ms: now_ms,
        });
        entry.latency_ms = latency_ms;
        entry.last_seen_ms = now_ms;
    }

    fn get_bandwidth(&self, peer: &PeerId) -> Option<f64> {
        self.entries.read().get(peer).map(|e| e.bandwidth_mbps)
    }

    fn get_jitter(&self, peer: &PeerId) -> Option<f64> {
        self.entries.read().get(peer).map(|e| e.jitter_ms)
    }

    fn probe(&self, peer: &PeerId, now_ms: u64) -> Option<f64> {
        let mut guard = self.entries.write();
        let entry = guard.get_mut(peer)?;
        entry.last_seen_ms = now_ms;
        Some(entry.latency_ms)
    }

    fn get_distance_km(&self, peer: &PeerId) -> Option<f64> {
        self.entries.read().get(peer).and_then(|e| e.distance_km)
    }

    fn cleanup_stale(&self, max_age_ms: u64, now_ms: u64) {
        self.entries
            .write()
            .retain(|_, e| now_ms.saturating_sub(e.last_seen_ms) <= max_age_ms);
    }
}
