//! Load-generation and measurement harness for an Ethereum execution node.
//!
//! This crate drives a live node with a bounded burst of signed transactions
//! (plain value transfers or zero-knowledge proof-verification calls) and
//! reduces what the node did with them into a throughput/CPU report.
//!
//! # Architecture
//!
//! The harness is organized around the components of a single run:
//!
//! - **NonceAllocator** ([`nonce`]): one pending-nonce query, then a
//!   contiguous, gap-free range for the whole burst
//! - **TransactionSigner** ([`signer`]): prices and signs EIP-1559 payloads
//! - **ProofProvider** ([`proof`]): cached or freshly generated Groth16 proofs
//! - **SubmissionPool** ([`submission`]): bounded-concurrency dispatch with
//!   per-item failure capture
//! - **ConfirmationTracker** ([`confirmation`]): independent receipt waits
//! - **ProfilingWindowScheduler** ([`profiler`]): back-to-back CPU profiling
//!   windows running beside the load
//! - **MetricsReducer** ([`metrics`]): block telemetry trimming and ratios
//!
//! The chain, the proof toolchain, the profiler and the report sink are
//! collaborators behind traits ([`ChainClient`], [`ProofToolchain`],
//! [`ProfilerControl`], [`ReportSink`]); [`Harness`] wires them together.
//!
//! # Quick Start
//!
//! ```
//! use node_stress::{IdentityPool, SenderIdentity};
//!
//! // Deterministic identities for local experiments.
//! let pool = IdentityPool::new((1..=3).map(SenderIdentity::from_seed).collect());
//!
//! // Sender and receiver are always distinct identities.
//! let (sender, receiver) = pool.distinct_pair(&mut rand::thread_rng()).unwrap();
//! assert_ne!(sender.address, receiver.address);
//! ```

pub mod abi;
pub mod chain;
pub mod config;
pub mod confirmation;
pub mod error;
pub mod harness;
pub mod metrics;
pub mod nonce;
pub mod profiler;
pub mod proof;
pub mod report;
pub mod signer;
pub mod submission;

pub use chain::{BlockTelemetry, ChainClient, JsonRpcClient, RpcError, TransactionReceipt};
pub use confirmation::{ConfirmationRecord, ConfirmationResult, ConfirmationTracker};
pub use error::HarnessError;
pub use harness::{Harness, HarnessConfig, RunReport, Workload};
pub use metrics::{MetricsReducer, Report};
pub use nonce::{NonceAllocator, NonceRange};
pub use profiler::{ProfilerControl, ProfilingArtifact, ProfilingWindowScheduler};
pub use proof::{ProofProvider, ProofToolchain};
pub use report::ReportSink;
pub use signer::{FeePolicy, LogicalCallIntent, SignedPayload, TransactionSigner};
pub use submission::{SubmissionOutcome, SubmissionPool, SubmissionRecord};

use alloy_primitives::{keccak256, Address};
use k256::ecdsa::{SigningKey, VerifyingKey};
use rand::{rngs::StdRng, seq::index, Rng, SeedableRng};

// ============================================================================
// Sender Identities
// ============================================================================

/// Errors raised while loading key material.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// The private key is not valid hex.
    #[error("private key is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    /// The private key has the wrong length or is out of range for secp256k1.
    #[error("invalid secp256k1 private key: {0}")]
    Invalid(#[from] k256::ecdsa::Error),
}

/// An address with the key material needed to sign for it.
///
/// Immutable for the duration of a run.
#[derive(Clone)]
pub struct SenderIdentity {
    /// The secp256k1 signing key.
    pub signing_key: SigningKey,
    /// The Ethereum address derived from the public key.
    pub address: Address,
}

impl SenderIdentity {
    /// Creates an identity from a signing key.
    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let verifying_key = VerifyingKey::from(&signing_key);
        let address = public_key_to_address(&verifying_key);
        Self { signing_key, address }
    }

    /// Parses a hex private key, with or without a `0x` prefix.
    pub fn from_private_key(private_key: &str) -> Result<Self, KeyError> {
        let trimmed = private_key.trim();
        let bytes = hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))?;
        let signing_key = SigningKey::from_slice(&bytes)?;
        Ok(Self::from_signing_key(signing_key))
    }

    /// Generates a deterministic identity from a seed.
    pub fn from_seed(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        loop {
            let mut key_bytes = [0u8; 32];
            rng.fill(&mut key_bytes);
            // Out-of-range scalars are astronomically rare; draw again.
            if let Ok(signing_key) = SigningKey::from_slice(&key_bytes) {
                return Self::from_signing_key(signing_key);
            }
        }
    }
}

impl std::fmt::Debug for SenderIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenderIdentity")
            .field("address", &self.address)
            .finish()
    }
}

/// Derives an Ethereum address from a secp256k1 public key.
fn public_key_to_address(verifying_key: &VerifyingKey) -> Address {
    let public_key_bytes = verifying_key.to_encoded_point(false);
    // Skip the 0x04 prefix byte, hash the rest.
    let hash = keccak256(&public_key_bytes.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// A fixed pool of identities a run can draw its sender (and receiver) from.
#[derive(Debug, Clone, Default)]
pub struct IdentityPool {
    identities: Vec<SenderIdentity>,
}

impl IdentityPool {
    /// Creates a pool from already-loaded identities.
    pub fn new(identities: Vec<SenderIdentity>) -> Self {
        Self { identities }
    }

    /// Loads every private key, failing on the first malformed one.
    pub fn from_private_keys<S: AsRef<str>>(keys: &[S]) -> Result<Self, KeyError> {
        let identities = keys
            .iter()
            .map(|key| SenderIdentity::from_private_key(key.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(identities))
    }

    /// Number of identities in the pool.
    pub fn len(&self) -> usize {
        self.identities.len()
    }

    /// Returns true if the pool holds no identities.
    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Picks one identity uniformly at random.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&SenderIdentity> {
        if self.identities.is_empty() {
            return None;
        }
        Some(&self.identities[rng.gen_range(0..self.identities.len())])
    }

    /// Samples two distinct identities without replacement.
    ///
    /// Returns `None` when the pool holds fewer than two identities.
    pub fn distinct_pair<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Option<(&SenderIdentity, &SenderIdentity)> {
        if self.identities.len() < 2 {
            return None;
        }
        let picked = index::sample(rng, self.identities.len(), 2);
        Some((&self.identities[picked.index(0)], &self.identities[picked.index(1)]))
    }
}

// ============================================================================
// Tests
// ============================================================================
