//! Settlement Orchestrator (spec §4.9): gates a cross-chain settlement
//! intent through three risk checks before delegating to the target
//! chain's adapter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use basalt_chain_adapter::{BroadcastOpts, ChainAdapter};
use basalt_primitives::{ChainId, RiskFlags, SettlementIntent};

/// Process-wide (well, orchestrator-wide) circuit breaker: when tripped,
/// only settlements targeting Bitcoin are allowed through.
#[derive(Default)]
pub struct CircuitBreaker {
    tripped: AtomicBool,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trip(&self) {
        self.tripped.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.tripped.store(false, Ordering::SeqCst);
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }
}

fn is_bitcoin(chain: &ChainId) -> bool {
    matches!(chain.0.to_ascii_lowercase().as_str(), "bitcoin" | "btc")
}

/// Result of routing a settlement intent: either a target adapter
/// broadcast id, or a refusal — either way the risk flags observed along
/// the way are surfaced to the caller.
#[derive(Debug)]
pub struct SettlementOutcome {
    pub l1_tx_id: Option<String>,
    pub risk_flags: RiskFlags,
}

pub struct SettlementOrchestrator {
    breaker: CircuitBreaker,
}

impl SettlementOrchestrator {
    pub fn new() -> Self {
        Self {
            breaker: CircuitBreaker::new(),
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Runs the three gates in spec order, short-circuiting on the first
    /// failure, then synthesises a single-output payload and delegates to
    /// `target`'s `broadcast`.
    pub fn settle(
        &self,
        intent: &SettlementIntent,
        target: &dyn ChainAdapter,
    ) -> SettlementOutcome {
        let mut flags = RiskFlags::default();

        if self.breaker.is_tripped() && !is_bitcoin(&intent.target_chain) {
            flags.circuit_breaker_tripped = true;
            tracing::warn!(target = %intent.target_chain, "circuit breaker blocked non-bitcoin settlement");
            return SettlementOutcome {
                l1_tx_id: None,
                risk_flags: flags,
            };
        }

        if let Some(oracle) = &intent.oracle {
            if oracle.confidence < MIN_ORACLE_CONFIDENCE_FLOOR {
                flags.low_oracle_confidence = true;
                tracing::warn!(confidence = oracle.confidence, "oracle confidence below floor");
                return SettlementOutcome {
                    l1_tx_id: None,
                    risk_flags: flags,
                };
            }
        }

        if !intent.slippage_policy.is_structurally_valid() {
            flags.slippage_invalid = true;
            tracing::warn!("slippage policy structurally invalid");
            return SettlementOutcome {
                l1_tx_id: None,
                risk_flags: flags,
            };
        }

        let payload = synthesize_payload(intent);
        let opts = BroadcastOpts {
            raw_tx: payload,
            extra: HashMap::new(),
        };
        match target.broadcast(opts) {
            Ok(tx_id) => SettlementOutcome {
                l1_tx_id: Some(tx_id),
                risk_flags: flags,
            },
            Err(err) => {
                tracing::error!(error = %err, "target adapter rejected settlement broadcast");
                SettlementOutcome {
                    l1_tx_id: None,
                    risk_flags: flags,
                }
            }
        }
    }
}

impl Default for SettlementOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

/// Default oracle confidence floor (spec §4.9 "configured floor"); node
/// wiring may substitute its own threshold by constructing the
/// orchestrator with a configured value instead in a future revision.
pub const MIN_ORACLE_CONFIDENCE_FLOOR: f64 = 0.5;

/// A single-output payload encoding the settlement's destination and
/// amount — adapters treat this as opaque `raw_tx` bytes and perform the
/// actual integer value-transfer math themselves (spec §4.9).
fn synthesize_payload(intent: &SettlementIntent) -> Vec<u8> {
    format!(
        "SETTLE|{:?}|{}|{}|{}|{}",
        intent.kind,
        intent.source_chain,
        intent.target_chain,
        intent.amount_source.value,
        intent.target_address.as_deref().unwrap_or("")
    )
    .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_chain_adapter::mock::MockUtxoAdapter;
    use basalt_chain_adapter::AdapterConfig;
    use basalt_primitives::{Amount, FeePolicy, FeePriority, Network, OracleSignal, SettlementKind, SlippagePolicy, UnitSpec};
    use basalt_config::AdapterRetryConfig;

    fn intent(target_chain: &str) -> SettlementIntent {
        SettlementIntent {
            kind: SettlementKind::PegOut,
            source_chain: ChainId::new("l2"),
            target_chain: ChainId::new(target_chain),
            amount_source: Amount {
                value: 100_000,
                unit: UnitSpec::new("sat".into(), 8),
            },
            min_receive_target: Amount {
                value: 99_000,
                unit: UnitSpec::new("sat".into(), 8),
            },
            fee_policy: FeePolicy {
                max_fee_rate: 10.0,
                priority: FeePriority::Normal,
            },
            slippage_policy: SlippagePolicy {
                max_slippage_pct: 1.0,
                enforce_hard: true,
            },
            oracle: None,
            vault_id: None,
            peg_tag: None,
            target_address: Some("bc1qexample".into()),
        }
    }

    fn started_adapter() -> MockUtxoAdapter {
        let adapter = MockUtxoAdapter::new(AdapterRetryConfig::default());
        adapter
            .init(
                AdapterConfig {
                    chain: "bitcoin".into(),
                    node_endpoint: "http://localhost".into(),
                    auth_username: None,
                    auth_password: None,
                    network: Network::Named("regtest".into()),
                    extra: HashMap::new(),
                    enable_telemetry: false,
                    read_only: false,
                    fee_policy: FeePolicy {
                        max_fee_rate: 10.0,
                        priority: FeePriority::Normal,
                    },
                    slippage_policy: SlippagePolicy {
                        max_slippage_pct: 1.0,
                        enforce_hard: false,
                    },
                    min_oracle_confidence: 0.5,
                },
                Box::new(|_| {}),
            )
            .unwrap();
        adapter
    }

    #[test]
    fn settles_successfully_when_all_gates_pass() {
        let orchestrator = SettlementOrchestrator::new();
        let adapter = started_adapter();
        let outcome = orchestrator.settle(&intent("bitcoin"), &adapter);
        assert!(outcome.l1_tx_id.is_some());
        assert!(outcome.risk_flags.is_clear());
    }

    #[test]
    fn circuit_breaker_blocks_non_bitcoin_targets() {
        let orchestrator = SettlementOrchestrator::new();
        orchestrator.breaker().trip();
        let adapter = started_adapter();
        let outcome = orchestrator.settle(&intent("ethereum"), &adapter);
        assert!(outcome.l1_tx_id.is_none());
        assert!(outcome.risk_flags.circuit_breaker_tripped);
    }

    #[test]
    fn circuit_breaker_still_allows_bitcoin_targets() {
        let orchestrator = SettlementOrchestrator::new();
        orchestrator.breaker().trip();
        let adapter = started_adapter();
        let outcome = orchestrator.settle(&intent("bitcoin"), &adapter);
        assert!(outcome.l1_tx_id.is_some());
        assert!(!outcome.risk_flags.circuit_breaker_tripped);
    }

    #[test]
    fn low_oracle_confidence_blocks_settlement() {
        let orchestrator = SettlementOrchestrator::new();
        let adapter = started_adapter();
        let mut settlement_intent = intent("bitcoin");
        settlement_intent.oracle = Some(OracleSignal {
            price: 50_000.0,
            confidence: 0.1,
        });
        let outcome = orchestrator.settle(&settlement_intent, &adapter);
        assert!(outcome.l1_tx_id.is_none());
        assert!(outcome.risk_flags.low_oracle_confidence);
    }

    #[test]
    fn invalid_slippage_policy_blocks_settlement() {
        let orchestrator = SettlementOrchestrator::new();
        let adapter = started_adapter();
        let mut settlement_intent = intent("bitcoin");
        settlement_intent.slippage_policy = SlippagePolicy {
            max_slippage_pct: 0.0,
            enforce_hard: true,
        };
        let outcome = orchestrator.settle(&settlement_intent, &adapter);
        assert!(outcome.l1_tx_id.is_none());
        assert!(outcome.risk_flags.slippage_invalid);
    }
}
