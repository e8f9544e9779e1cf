//! Calldata for Groth16 verifier contracts.
//!
//! Only the `(uint256[2], uint256[2][2], uint256[2], uint256[N])` method shape
//! emitted by snarkjs verifier templates is supported. All four parameters are
//! static, so the call is the selector followed by `8 + N` big-endian words.

use alloy_primitives::{keccak256, Bytes, U256};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::proof::ProofCallArgs;

/// Method called when no ABI file is configured.
pub const DEFAULT_METHOD: &str = "verifyProof";

#[derive(Debug, thiserror::Error)]
pub enum AbiError {
    #[error("failed to read ABI {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed ABI JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("method `{0}` not found in ABI")]
    MethodNotFound(String),
    #[error("method `{method}` takes ({found}), expected (uint256[2],uint256[2][2],uint256[2],uint256[N])")]
    UnsupportedInputs { method: String, found: String },
    #[error("proof carries {actual} public signals, verifier expects {expected}")]
    SignalCount { expected: usize, actual: usize },
}

/// Order of the limbs inside each `pi_b` coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum G2Order {
    /// As written by the prover.
    AsGenerated,
    /// Swapped within each pair, as Solidity pairing precompiles expect.
    #[default]
    Swapped,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AbiDocument {
    Artifact { abi: Vec<AbiItem> },
    Bare(Vec<AbiItem>),
}

#[derive(Deserialize)]
struct AbiItem {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    inputs: Vec<AbiParam>,
}

#[derive(Deserialize)]
struct AbiParam {
    #[serde(rename = "type")]
    kind: String,
}

/// `uint` is an alias of `uint256` in ABI JSON but not in signatures.
fn canonical_type(kind: &str) -> String {
    match kind.strip_prefix("uint") {
        Some(rest) if !rest.starts_with(|c: char| c.is_ascii_digit()) => format!("uint256{rest}"),
        _ => kind.to_string(),
    }
}

/// Encodes proof-verification calls for one verifier method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofCallEncoder {
    signature: String,
    selector: [u8; 4],
    public_signals: usize,
    g2_order: G2Order,
}

impl ProofCallEncoder {
    /// `method(uint256[2],uint256[2][2],uint256[2],uint256[public_signals])`.
    pub fn new(method: &str, public_signals: usize, g2_order: G2Order) -> Self {
        let signature = format!(
            "{method}(uint256[2],uint256[2][2],uint256[2],uint256[{public_signals}])"
        );
        let hash = keccak256(signature.as_bytes());
        let mut selector = [0u8; 4];
        selector.copy_from_slice(&hash[..4]);
        Self {
            signature,
            selector,
            public_signals,
            g2_order,
        }
    }

    /// The single-signal `verifyProof` used when no ABI is configured.
    pub fn canonical(g2_order: G2Order) -> Self {
        Self::new(DEFAULT_METHOD, 1, g2_order)
    }

    /// Reads a Hardhat artifact or a bare ABI array from disk.
    pub fn from_abi_file(path: &Path, method: &str, g2_order: G2Order) -> Result<Self, AbiError> {
        let json = std::fs::read_to_string(path).map_err(|source| AbiError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_abi_json(&json, method, g2_order)
    }

    pub fn from_abi_json(json: &str, method: &str, g2_order: G2Order) -> Result<Self, AbiError> {
        let items = match serde_json::from_str(json)? {
            AbiDocument::Artifact { abi } => abi,
            AbiDocument::Bare(abi) => abi,
        };
        let item = items
            .iter()
            .find(|item| item.kind == "function" && item.name == method)
            .ok_or_else(|| AbiError::MethodNotFound(method.to_string()))?;

        let inputs: Vec<String> = item.inputs.iter().map(|p| canonical_type(&p.kind)).collect();
        let unsupported = || AbiError::UnsupportedInputs {
            method: method.to_string(),
            found: inputs.join(","),
        };
        let [a, b, c, signals] = inputs.as_slice() else {
            return Err(unsupported());
        };
        if a != "uint256[2]" || b != "uint256[2][2]" || c != "uint256[2]" {
            return Err(unsupported());
        }
        let public_signals = signals
            .strip_prefix("uint256[")
            .and_then(|rest| rest.strip_suffix(']'))
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .ok_or_else(unsupported)?;

        Ok(Self::new(method, public_signals, g2_order))
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn selector(&self) -> [u8; 4] {
        self.selector
    }

    pub fn public_signals(&self) -> usize {
        self.public_signals
    }

    pub fn g2_order(&self) -> G2Order {
        self.g2_order
    }

    /// ABI-encodes a call carrying `args`.
    pub fn encode(&self, args: &ProofCallArgs) -> Result<Bytes, AbiError> {
        if args.public_signals.len() != self.public_signals {
            return Err(AbiError::SignalCount {
                expected: self.public_signals,
                actual: args.public_signals.len(),
            });
        }

        let b = match self.g2_order {
            G2Order::AsGenerated => args.b,
            G2Order::Swapped => args.b.map(|[x, y]| [y, x]),
        };
        let words = args
            .a
            .iter()
            .chain(b.iter().flatten())
            .chain(args.c.iter())
            .chain(args.public_signals.iter());

        let mut out = Vec::with_capacity(4 + 32 * (8 + self.public_signals));
        out.extend_from_slice(&self.selector);
        for word in words {
            out.extend_from_slice(&word.to_be_bytes::<32>());
        }
        Ok(out.into())
    }
}
