//! The peg bridge: two-way BTC<->L2 pegs secured by a federation multisig,
//! plus the atomic-swap and SPV-verification primitives it depends on.

pub mod monitor;
pub mod spv;
pub mod swap;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use thiserror::Error;

use basalt_config::BridgeConfig;
use basalt_primitives::{AnchorHash, PegId, SignerId};

pub use monitor::CollateralAlert;
pub use spv::SpvProof;
pub use swap::{AtomicSwap, SwapError};

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflicting state: {0}")]
    Conflict(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("consistency check failed: {0}")]
    Consistency(String),
    #[error("bridge is in emergency mode")]
    EmergencyMode,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PegInStatus {
    Initiated,
    PendingL1Conf,
    L1Confirmed,
    Minted,
    Failed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PegIn {
    pub peg_id: PegId,
    pub l1_tx_id: String,
    pub vout: u32,
    pub l1_amount: u64,
    pub l1_source_addr: String,
    pub l2_dest_addr: String,
    pub l1_block_height: Option<u64>,
    pub l1_confirmations: u64,
    pub l2_mint_amount: Option<u64>,
    pub status: PegInStatus,
    pub spv_proof: Option<SpvProof>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PegOutStatus {
    BurnInitiated,
    PendingPegOut,
    Completed,
    Failed,
    EmergencyRecovery,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PegOut {
    pub peg_id: PegId,
    pub l2_source_addr: String,
    pub l1_dest_addr: String,
    pub l2_burn_amount: u64,
    pub l1_release_amount: u64,
    pub l2_burn_height: u64,
    pub l2_confirmations: u64,
    pub l1_release_tx_id: Option<String>,
    pub anchor_commitment_hash: AnchorHash,
    pub signatures: HashMap<SignerId, Vec<u8>>,
    pub status: PegOutStatus,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FederationSigner {
    pub id: SignerId,
    pub pubkey: Vec<u8>,
    pub l1_addr: String,
    pub stake: u64,
    pub reputation: u8,
    pub signature_count: u32,
    pub missed_count: u32,
    /// Fraction of signing rounds this signer has responded to:
    /// `signature_count / (signature_count + missed_count)`. `1.0` until
    /// the signer has been asked to sign or has missed a round.
    pub response_rate: f64,
    pub active: bool,
}

impl FederationSigner {
    pub fn new(id: SignerId, pubkey: Vec<u8>, l1_addr: String, stake: u64) -> Self {
        Self {
            id,
            pubkey,
            l1_addr,
            stake,
            reputation: 100,
            signature_count: 0,
            missed_count: 0,
            response_rate: 1.0,
            active: true,
        }
    }

    /// A signer that misses ten signing rounds is automatically deactivated.
    const MAX_MISSED: u32 = 10;

    fn recompute_response_rate(&mut self) {
        let rounds = self.signature_count + self.missed_count;
        self.response_rate = if rounds == 0 {
            1.0
        } else {
            self.signature_count as f64 / rounds as f64
        };
    }

    pub fn record_miss(&mut self) {
        self.missed_count += 1;
        self.recompute_response_rate();
        if self.missed_count >= Self::MAX_MISSED {
            self.active = false;
        }
    }

    /// Records one accepted signature: bumps `signature_count` and
    /// improves `response_rate` accordingly (spec §4.8 peg-out step 3).
    pub fn record_signature(&mut self) {
        self.signature_count += 1;
        self.recompute_response_rate();
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Federation {
    pub signers: HashMap<SignerId, FederationSigner>,
    pub threshold: u16,
}

impl Federation {
    pub fn new(threshold: u16) -> Self {
        Self {
            signers: HashMap::new(),
            threshold,
        }
    }

    pub fn add_signer(&mut self, signer: FederationSigner) {
        self.signers.insert(signer.id.clone(), signer);
    }

    fn active_count(&self) -> u16 {
        self.signers.values().filter(|s| s.active).count() as u16
    }

    /// True when enough active signers remain to ever reach `threshold`
    /// signatures (invariant 8, "Federation safety").
    pub fn has_quorum(&self) -> bool {
        self.active_count() >= self.threshold
    }
}

pub struct Bridge {
    pegins: Mutex<HashMap<PegId, PegIn>>,
    pegouts: Mutex<HashMap<PegId, PegOut>>,
    federation: Mutex<Federation>,
    swaps: Mutex<HashMap<basalt_primitives::Digest, AtomicSwap>>,
    registered_anchors: Mutex<HashSet<AnchorHash>>,
    emergency_mode: AtomicBool,
    config: BridgeConfig,
}

impl Bridge {
    pub fn new(config: BridgeConfig, federation: Federation) -> Self {
        Self {
            pegins: Mutex::new(HashMap::new()),
            pegouts: Mutex::new(HashMap::new()),
            federation: Mutex::new(federation),
            swaps: Mutex::new(HashMap::new()),
            registered_anchors: Mutex::new(HashSet::new()),
            emergency_mode: AtomicBool::new(false),
            config,
        }
    }

    fn peg_id_for(l1_tx_id: &str, vout: u32) -> PegId {
        basalt_crypto::sha256(format!("{l1_tx_id}:{vout}").as_bytes()).into()
    }

    pub fn is_emergency(&self) -> bool {
        self.emergency_mode.load(Ordering::SeqCst)
    }

    pub fn enter_emergency_mode(&self) {
        self.emergency_mode.store(true, Ordering::SeqCst);
        tracing::warn!("bridge entering emergency mode");
    }

    /// Leaving emergency mode requires the federation still has quorum,
    /// otherwise operators would be unmuting peg-out release with no
    /// federation able to actually sign it.
    pub fn clear_emergency_mode(&self) -> Result<(), BridgeError> {
        if !self.federation.lock().has_quorum() {
            return Err(BridgeError::Consistency(
                "federation lacks quorum, cannot leave emergency mode".into(),
            ));
        }
        self.emergency_mode.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn register_anchor(&self, anchor_hash: AnchorHash) {
        self.registered_anchors.lock().insert(anchor_hash);
    }

    fn is_anchor_registered(&self, anchor_hash: &AnchorHash) -> bool {
        self.registered_anchors.lock().contains(anchor_hash)
    }

    // --- peg-in ---------------------------------------------------------

    pub fn initiate_peg_in(
        &self,
        l1_tx_id: String,
        vout: u32,
        l1_amount: u64,
        l1_source_addr: String,
        l2_dest_addr: String,
    ) -> Result<PegId, BridgeError> {
        if l1_amount < self.config.min_pegin_amount || l1_amount > self.config.max_pegin_amount {
            return Err(BridgeError::Validation(format!(
                "peg-in amount {l1_amount} out of bounds [{}, {}]",
                self.config.min_pegin_amount, self.config.max_pegin_amount
            )));
        }
        if l2_dest_addr.is_empty() {
            return Err(BridgeError::Validation("empty l2 destination address".into()));
        }
        let peg_id = Self::peg_id_for(&l1_tx_id, vout);
        let mut pegins = self.pegins.lock();
        if pegins.contains_key(&peg_id) {
            return Err(BridgeError::Conflict(format!("peg-in {} already exists", peg_id)));
        }
        pegins.insert(
            peg_id,
            PegIn {
                peg_id,
                l1_tx_id,
                vout,
                l1_amount,
                l1_source_addr,
                l2_dest_addr,
                l1_block_height: None,
                l1_confirmations: 0,
                l2_mint_amount: None,
                status: PegInStatus::Initiated,
                spv_proof: None,
            },
        );
        Ok(peg_id)
    }

    pub fn submit_spv_proof(
        &self,
        peg_id: PegId,
        proof: SpvProof,
        l1_block_height: u64,
    ) -> Result<(), BridgeError> {
        if !spv::spv_verify(&proof) {
            return Err(BridgeError::Validation("SPV proof does not verify".into()));
        }
        let mut pegins = self.pegins.lock();
        let entry = pegins
            .get_mut(&peg_id)
            .ok_or_else(|| BridgeError::NotFound(format!("peg-in {peg_id}")))?;
        if entry.status != PegInStatus::Initiated {
            return Err(BridgeError::Conflict(format!(
                "peg-in {peg_id} is not awaiting an SPV proof (status {:?})",
                entry.status
            )));
        }
        entry.spv_proof = Some(proof);
        entry.l1_block_height = Some(l1_block_height);
        entry.status = PegInStatus::PendingL1Conf;
        Ok(())
    }

    pub fn update_pegin_confirmations(
        &self,
        peg_id: PegId,
        confirmations: u64,
    ) -> Result<PegInStatus, BridgeError> {
        let mut pegins = self.pegins.lock();
        let entry = pegins
            .get_mut(&peg_id)
            .ok_or_else(|| BridgeError::NotFound(format!("peg-in {peg_id}")))?;
        entry.l1_confirmations = confirmations;
        if entry.status == PegInStatus::PendingL1Conf
            && confirmations >= self.config.min_confirmations_pegin
        {
            entry.status = PegInStatus::L1Confirmed;
        }
        Ok(entry.status)
    }

    /// Mints `l1_amount - bridge_fee_sats` on L2 once the deposit has
    /// reached `min_confirmations_pegin`. The bridge must not be in
    /// emergency mode.
    pub fn complete_pegin_mint(&self, peg_id: PegId) -> Result<u64, BridgeError> {
        if self.is_emergency() {
            return Err(BridgeError::EmergencyMode);
        }
        let mut pegins = self.pegins.lock();
        let entry = pegins
            .get_mut(&peg_id)
            .ok_or_else(|| BridgeError::NotFound(format!("peg-in {peg_id}")))?;
        if entry.status != PegInStatus::L1Confirmed {
            return Err(BridgeError::Conflict(format!(
                "peg-in {peg_id} is not L1-confirmed (status {:?})",
                entry.status
            )));
        }
        let mint_amount = entry.l1_amount.saturating_sub(self.config.bridge_fee_sats);
        entry.l2_mint_amount = Some(mint_amount);
        entry.status = PegInStatus::Minted;
        Ok(mint_amount)
    }

    // --- peg-out ----------------------------------------------------------

    pub fn initiate_peg_out(
        &self,
        l2_source_addr: String,
        l1_dest_addr: String,
        l2_burn_amount: u64,
        l1_release_amount: u64,
        l2_burn_height: u64,
        anchor_commitment_hash: AnchorHash,
    ) -> Result<PegId, BridgeError> {
        if !self.is_anchor_registered(&anchor_commitment_hash) {
            return Err(BridgeError::Unauthorized(
                "peg-out is not bound to a registered anchor commitment".into(),
            ));
        }
        if l1_dest_addr.is_empty() {
            return Err(BridgeError::Validation("empty l1 destination address".into()));
        }
        let peg_id = basalt_crypto::sha256(
            format!("{l2_source_addr}:{l2_burn_height}:{l2_burn_amount}").as_bytes(),
        )
        .into();
        let mut pegouts = self.pegouts.lock();
        if pegouts.contains_key(&peg_id) {
            return Err(BridgeError::Conflict(format!("peg-out {peg_id} already exists")));
        }
        pegouts.insert(
            peg_id,
            PegOut {
                peg_id,
                l2_source_addr,
                l1_dest_addr,
                l2_burn_amount,
                l1_release_amount,
                l2_burn_height,
                l2_confirmations: 0,
                l1_release_tx_id: None,
                anchor_commitment_hash,
                signatures: HashMap::new(),
                status: PegOutStatus::BurnInitiated,
            },
        );
        Ok(peg_id)
    }

    pub fn update_pegout_confirmations(
        &self,
        peg_id: PegId,
        confirmations: u64,
    ) -> Result<PegOutStatus, BridgeError> {
        let mut pegouts = self.pegouts.lock();
        let entry = pegouts
            .get_mut(&peg_id)
            .ok_or_else(|| BridgeError::NotFound(format!("peg-out {peg_id}")))?;
        entry.l2_confirmations = confirmations;
        if entry.status == PegOutStatus::BurnInitiated
            && confirmations >= self.config.min_confirmations_pegout
        {
            entry.status = PegOutStatus::PendingPegOut;
        }
        Ok(entry.status)
    }

    /// Records one federation member's signature over a pending peg-out.
    /// Returns `true` once the threshold has just been reached.
    pub fn add_pegout_signature(
        &self,
        peg_id: PegId,
        signer_id: SignerId,
        signature: Vec<u8>,
    ) -> Result<bool, BridgeError> {
        {
            let federation = self.federation.lock();
            let signer = federation
                .signers
                .get(&signer_id)
                .ok_or_else(|| BridgeError::Unauthorized(format!("unknown signer {signer_id}")))?;
            if !signer.active {
                return Err(BridgeError::Unauthorized(format!("signer {signer_id} is inactive")));
            }
        }
        let mut pegouts = self.pegouts.lock();
        let entry = pegouts
            .get_mut(&peg_id)
            .ok_or_else(|| BridgeError::NotFound(format!("peg-out {peg_id}")))?;
        if !self.is_anchor_registered(&entry.anchor_commitment_hash) {
            return Err(BridgeError::Unauthorized(
                "peg-out's anchor commitment is no longer registered".into(),
            ));
        }
        if entry.status != PegOutStatus::PendingPegOut {
            return Err(BridgeError::Conflict(format!(
                "peg-out {peg_id} is not pending signatures (status {:?})",
                entry.status
            )));
        }
        let was_below = entry.signatures.len() < self.federation.lock().threshold as usize;
        let newly_accepted = !entry.signatures.contains_key(&signer_id);
        entry.signatures.insert(signer_id.clone(), signature);
        if newly_accepted {
            if let Some(signer) = self.federation.lock().signers.get_mut(&signer_id) {
                signer.record_signature();
            }
        }
        let threshold = self.federation.lock().threshold as usize;
        let now_at_threshold = entry.signatures.len() >= threshold;
        Ok(was_below && now_at_threshold)
    }

    /// Completes a peg-out once threshold signatures are present, the
    /// bound anchor is still registered, and the bridge is not halted.
    pub fn complete_peg_out(&self, peg_id: PegId, l1_release_tx_id: String) -> Result<(), BridgeError> {
        if self.is_emergency() {
            return Err(BridgeError::EmergencyMode);
        }
        let threshold = self.federation.lock().threshold as usize;
        let mut pegouts = self.pegouts.lock();
        let entry = pegouts
            .get_mut(&peg_id)
            .ok_or_else(|| BridgeError::NotFound(format!("peg-out {peg_id}")))?;
        if entry.status != PegOutStatus::PendingPegOut {
            return Err(BridgeError::Conflict(format!(
                "peg-out {peg_id} is not pending release (status {:?})",
                entry.status
            )));
        }
        if entry.signatures.len() < threshold {
            return Err(BridgeError::Unauthorized(format!(
                "peg-out {peg_id} has {} of {} required signatures",
                entry.signatures.len(),
                threshold
            )));
        }
        if !self.is_anchor_registered(&entry.anchor_commitment_hash) {
            return Err(BridgeError::Unauthorized(
                "peg-out's anchor commitment is no longer registered".into(),
            ));
        }
        entry.l1_release_tx_id = Some(l1_release_tx_id);
        entry.status = PegOutStatus::Completed;
        Ok(())
    }

    // --- atomic swaps -----------------------------------------------------

    pub fn create_atomic_swap(&self, swap: AtomicSwap) -> Result<(), BridgeError> {
        let mut swaps = self.swaps.lock();
        if swaps.contains_key(&swap.swap_id) {
            return Err(BridgeError::Conflict(format!("swap {} already exists", swap.swap_id)));
        }
        swaps.insert(swap.swap_id, swap);
        Ok(())
    }

    pub fn claim_swap(
        &self,
        swap_id: basalt_primitives::Digest,
        party: &basalt_primitives::PeerId,
        secret: &[u8],
        now: u64,
    ) -> Result<(), BridgeError> {
        let mut swaps = self.swaps.lock();
        let swap = swaps
            .get_mut(&swap_id)
            .ok_or_else(|| BridgeError::NotFound(format!("swap {swap_id}")))?;
        swap.claim(party, secret, now)
            .map_err(|e| BridgeError::Validation(e.to_string()))
    }

    pub fn refund_swap(
        &self,
        swap_id: basalt_primitives::Digest,
        party: &basalt_primitives::PeerId,
        now: u64,
    ) -> Result<(), BridgeError> {
        let mut swaps = self.swaps.lock();
        let swap = swaps
            .get_mut(&swap_id)
            .ok_or_else(|| BridgeError::NotFound(format!("swap {swap_id}")))?;
        swap.refund(party, now)
            .map_err(|e| BridgeError::Validation(e.to_string()))
    }

    // --- collateralization --------------------------------------------

    /// Sums locked L1 over confirmed-or-minted peg-ins and net minted L2
    /// supply (minted peg-ins minus completed peg-out burns). This is an
    /// aggregate approximation of the bridge's true UTXO-level reserve —
    /// sufficient for the monitor's band check.
    pub fn collateralization_snapshot(&self) -> (u64, u64) {
        let pegins = self.pegins.lock();
        let pegouts = self.pegouts.lock();
        let locked_l1: u64 = pegins
            .values()
            .filter(|p| matches!(p.status, PegInStatus::L1Confirmed | PegInStatus::Minted))
            .map(|p| p.l1_amount)
            .sum();
        let minted_l2: u64 = pegins
            .values()
            .filter(|p| p.status == PegInStatus::Minted)
            .filter_map(|p| p.l2_mint_amount)
            .sum();
        let burned_l2: u64 = pegouts
            .values()
            .filter(|p| p.status == PegOutStatus::Completed)
            .map(|p| p.l2_burn_amount)
            .sum();
        (locked_l1, minted_l2.saturating_sub(burned_l2))
    }

    pub fn check_collateralization(&self) -> CollateralAlert {
        let (locked_l1, minted_l2) = self.collateralization_snapshot();
        monitor::check_collateralization(locked_l1, minted_l2, self.config.collateralization_band)
    }

    pub fn get_peg_in(&self, peg_id: &PegId) -> Option<PegIn> {
        self.pegins.lock().get(peg_id).cloned()
    }

    pub fn get_peg_out(&self, peg_id: &PegId) -> Option<PegOut> {
        self.pegouts.lock().get(peg_id).cloned()
    }
}
