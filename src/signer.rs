//! Pricing and signing of EIP-1559 payloads.
//!
//! Everything here is local and synchronous once the inputs are known: the
//! base fee is sampled at most once per run and gas limits are estimated at
//! most once per call shape, so signing N payloads costs no RPC round-trips.

use alloy_consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy_eips::eip2718::Encodable2718;
use alloy_primitives::{Address, Bytes, Signature, TxKind, B256, U256};
use std::{collections::HashMap, fmt, str::FromStr};
use tracing::debug;

use crate::{
    chain::{CallRequest, ChainClient, RpcError},
    proof::ProofArtifactRef,
    KeyError, SenderIdentity,
};

/// One gwei in wei.
pub const GWEI: u128 = 1_000_000_000;

/// Gas limit of a plain value transfer; also the floor for every estimate.
pub const TRANSFER_GAS: u64 = 21_000;

/// Fractional scale of [`FeeMultiplier`].
const MULTIPLIER_SCALE: u128 = 10_000;

// ============================================================================
// Fee Policy
// ============================================================================

/// Error returned when a fee multiplier cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid fee multiplier `{0}`: expected a non-negative decimal with at most 4 fractional digits")]
pub struct ParseMultiplierError(String);

/// A base fee multiplier kept as an exact decimal with four fractional digits,
/// so `floor(base_fee * multiplier)` is computed without float rounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FeeMultiplier {
    basis_points: u32,
}

impl FeeMultiplier {
    pub const ONE: Self = Self::from_basis_points(10_000);

    /// `basis_points / 10_000`, e.g. `15_000` for 1.5.
    pub const fn from_basis_points(basis_points: u32) -> Self {
        Self { basis_points }
    }

    pub fn apply(&self, base_fee: u128) -> u128 {
        base_fee.saturating_mul(self.basis_points as u128) / MULTIPLIER_SCALE
    }
}

impl Default for FeeMultiplier {
    fn default() -> Self {
        Self::ONE
    }
}

impl FromStr for FeeMultiplier {
    type Err = ParseMultiplierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseMultiplierError(s.to_string());
        let (whole, fraction) = s.trim().split_once('.').unwrap_or((s.trim(), ""));
        if (whole.is_empty() && fraction.is_empty()) || fraction.len() > 4 {
            return Err(invalid());
        }
        let digits = |part: &str| part.is_empty() || part.bytes().all(|b| b.is_ascii_digit());
        if !digits(whole) || !digits(fraction) {
            return Err(invalid());
        }

        let whole: u32 = if whole.is_empty() { 0 } else { whole.parse().map_err(|_| invalid())? };
        let fraction: u32 = format!("{fraction:0<4}").parse().map_err(|_| invalid())?;
        whole
            .checked_mul(10_000)
            .and_then(|bp| bp.checked_add(fraction))
            .map(Self::from_basis_points)
            .ok_or_else(invalid)
    }
}

impl fmt::Display for FeeMultiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.basis_points / 10_000;
        let fraction = self.basis_points % 10_000;
        if fraction == 0 {
            write!(f, "{whole}")
        } else {
            let fraction = format!("{fraction:04}");
            write!(f, "{whole}.{}", fraction.trim_end_matches('0'))
        }
    }
}

/// How a run prices its transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeePolicy {
    pub multiplier: FeeMultiplier,
    /// Priority fee per gas, in wei.
    pub tip: u128,
    /// Base fee used when no live sample is available, in wei.
    pub fallback_base_fee: u128,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            multiplier: FeeMultiplier::ONE,
            tip: 2 * GWEI,
            fallback_base_fee: 10 * GWEI,
        }
    }
}

impl FeePolicy {
    /// `floor(base_fee * multiplier) + tip`.
    pub fn max_fee_per_gas(&self, base_fee: u128) -> u128 {
        self.multiplier.apply(base_fee).saturating_add(self.tip)
    }

    /// Picks the live sample when there is one, the fallback otherwise.
    pub fn resolve_base_fee(&self, sample: Option<u128>) -> u128 {
        sample.unwrap_or(self.fallback_base_fee)
    }
}

// ============================================================================
// Intents and Priced Transactions
// ============================================================================

/// What a single unit of load should do, independent of nonce and pricing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogicalCallIntent {
    /// A plain value transfer.
    Transfer { to: Address, value: U256 },
    /// A verifier contract call carrying one proof.
    ProofVerification {
        contract: Address,
        artifact: ProofArtifactRef,
        /// ABI-encoded call built from the artifact.
        calldata: Bytes,
    },
}

impl LogicalCallIntent {
    pub fn to(&self) -> Address {
        match self {
            Self::Transfer { to, .. } => *to,
            Self::ProofVerification { contract, .. } => *contract,
        }
    }

    pub fn value(&self) -> U256 {
        match self {
            Self::Transfer { value, .. } => *value,
            Self::ProofVerification { .. } => U256::ZERO,
        }
    }

    pub fn input(&self) -> Bytes {
        match self {
            Self::Transfer { .. } => Bytes::new(),
            Self::ProofVerification { calldata, .. } => calldata.clone(),
        }
    }
}

/// An intent with its nonce, gas limit, fees and chain id fixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedTransaction {
    pub intent: LogicalCallIntent,
    pub nonce: u64,
    pub gas_limit: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    pub chain_id: u64,
}

impl PricedTransaction {
    fn to_eip1559(&self) -> TxEip1559 {
        TxEip1559 {
            chain_id: self.chain_id,
            nonce: self.nonce,
            gas_limit: self.gas_limit,
            max_fee_per_gas: self.max_fee_per_gas,
            max_priority_fee_per_gas: self.max_priority_fee_per_gas,
            to: TxKind::Call(self.intent.to()),
            value: self.intent.value(),
            access_list: Default::default(),
            input: self.intent.input(),
        }
    }
}

/// A priced transaction with its signature and wire encoding.
///
/// Produced once by [`TransactionSigner`] and consumed once by the
/// submission pool.
#[derive(Debug, Clone)]
pub struct SignedPayload {
    /// Position of this payload within the burst.
    pub index: usize,
    pub transaction: PricedTransaction,
    pub signature: Signature,
    /// The transaction hash the node will report.
    pub hash: B256,
    /// EIP-2718 encoded bytes for `eth_sendRawTransaction`.
    pub raw: Bytes,
}

impl SignedPayload {
    pub fn nonce(&self) -> u64 {
        self.transaction.nonce
    }
}

// ============================================================================
// Signer
// ============================================================================

/// Prices and signs payloads with fees fixed for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionSigner {
    chain_id: u64,
    max_fee_per_gas: u128,
    max_priority_fee_per_gas: u128,
}

impl TransactionSigner {
    /// Fixes the fees for a run from the policy and an optional base fee sample.
    pub fn new(chain_id: u64, policy: &FeePolicy, base_fee_sample: Option<u128>) -> Self {
        let base_fee = policy.resolve_base_fee(base_fee_sample);
        let signer = Self {
            chain_id,
            max_fee_per_gas: policy.max_fee_per_gas(base_fee),
            max_priority_fee_per_gas: policy.tip,
        };
        debug!(
            chain_id,
            base_fee,
            live = base_fee_sample.is_some(),
            max_fee_per_gas = signer.max_fee_per_gas,
            "fees fixed for run"
        );
        signer
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn max_fee_per_gas(&self) -> u128 {
        self.max_fee_per_gas
    }

    pub fn max_priority_fee_per_gas(&self) -> u128 {
        self.max_priority_fee_per_gas
    }

    /// Attaches nonce, gas limit and the run's fees to an intent.
    pub fn price(
        &self,
        intent: LogicalCallIntent,
        nonce: u64,
        gas_limit: u64,
    ) -> PricedTransaction {
        PricedTransaction {
            intent,
            nonce,
            gas_limit: gas_limit.max(TRANSFER_GAS),
            max_fee_per_gas: self.max_fee_per_gas,
            max_priority_fee_per_gas: self.max_priority_fee_per_gas,
            chain_id: self.chain_id,
        }
    }

    /// Signs a priced transaction for the `index`-th slot of the burst.
    ///
    /// Only invalid key material can make this fail.
    pub fn sign(
        &self,
        identity: &SenderIdentity,
        index: usize,
        transaction: PricedTransaction,
    ) -> Result<SignedPayload, KeyError> {
        let tx = transaction.to_eip1559();
        let signature_hash = tx.signature_hash();
        let (sig, recovery_id) = identity
            .signing_key
            .sign_prehash_recoverable(signature_hash.as_slice())?;
        let signature = Signature::from_signature_and_parity(sig, recovery_id.is_y_odd());

        let signed = tx.into_signed(signature);
        let hash = *signed.hash();
        let raw = TxEnvelope::from(signed).encoded_2718();

        Ok(SignedPayload {
            index,
            transaction,
            signature,
            hash,
            raw: raw.into(),
        })
    }
}

// ============================================================================
// Gas Limits
// ============================================================================

/// Calls that share a gas estimate: same target, same method selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CallShape {
    to: Address,
    selector: [u8; 4],
}

/// Caches one gas estimate per call shape.
#[derive(Debug, Default)]
pub struct GasOracle {
    estimates: HashMap<CallShape, u64>,
}

impl GasOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gas limit for `intent` sent by `from`.
    ///
    /// Transfers use the protocol constant. Contract calls are estimated on
    /// the first call of each shape and reuse that estimate afterwards.
    pub async fn gas_limit<C>(
        &mut self,
        chain: &C,
        from: Address,
        intent: &LogicalCallIntent,
    ) -> Result<u64, RpcError>
    where
        C: ChainClient + ?Sized,
    {
        let LogicalCallIntent::ProofVerification { contract, calldata, .. } = intent else {
            return Ok(TRANSFER_GAS);
        };
        let mut selector = [0u8; 4];
        let len = calldata.len().min(4);
        selector[..len].copy_from_slice(&calldata[..len]);
        let shape = CallShape { to: *contract, selector };
        if let Some(gas) = self.estimates.get(&shape) {
            return Ok(*gas);
        }

        let call = CallRequest {
            from,
            to: *contract,
            input: calldata.clone(),
            value: None,
        };
        let gas = chain.estimate_gas(&call).await?.max(TRANSFER_GAS);
        debug!(to = %contract, selector = %hex::encode(selector), gas, "estimated gas");
        self.estimates.insert(shape, gas);
        Ok(gas)
    }
}

// ============================================================================
// Tests
// ============================================================================
