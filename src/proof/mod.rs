//! Proof artifacts for verification workloads.
//!
//! Proofs live in a cache directory keyed by index:
//!
//! ```text
//! <cache_dir>/<index>/input.json    witness input
//! <cache_dir>/<index>/witness.wtns  intermediate witness
//! <cache_dir>/<index>/proof.json    Groth16 proof
//! <cache_dir>/<index>/public.json   public signals
//! ```
//!
//! An index whose `proof.json` and `public.json` both exist is a cache hit
//! and is never regenerated. Misses go through a [`ProofToolchain`].

mod toolchain;

pub use toolchain::SnarkjsToolchain;

use alloy_primitives::U256;
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info, warn};

pub const PROOF_FILE: &str = "proof.json";
pub const PUBLIC_FILE: &str = "public.json";
pub const INPUT_FILE: &str = "input.json";
pub const WITNESS_FILE: &str = "witness.wtns";

/// Default depth of generated Merkle paths.
pub const MERKLE_DEPTH: usize = 50;

/// Errors raised while obtaining or reading proofs.
#[derive(Debug, thiserror::Error)]
pub enum ProofError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed proof file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// The external tool exited with a non-zero status.
    #[error("{program} exited with {status}: {stderr}")]
    Toolchain {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("toolchain succeeded but {0} is missing")]
    MissingOutput(PathBuf),
}

impl ProofError {
    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn parse(path: &Path, reason: impl ToString) -> Self {
        Self::Parse {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

// ============================================================================
// Artifacts
// ============================================================================

/// Reference to the cached proof for one index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProofArtifactRef {
    pub index: u64,
    dir: PathBuf,
}

impl ProofArtifactRef {
    pub fn new(index: u64, cache_dir: impl AsRef<Path>) -> Self {
        Self {
            index,
            dir: cache_dir.as_ref().join(index.to_string()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn proof_path(&self) -> PathBuf {
        self.dir.join(PROOF_FILE)
    }

    pub fn public_path(&self) -> PathBuf {
        self.dir.join(PUBLIC_FILE)
    }

    pub fn input_path(&self) -> PathBuf {
        self.dir.join(INPUT_FILE)
    }

    pub fn witness_path(&self) -> PathBuf {
        self.dir.join(WITNESS_FILE)
    }

    async fn is_complete(&self) -> bool {
        let exists =
            |path: PathBuf| async move { tokio::fs::try_exists(path).await.unwrap_or(false) };
        exists(self.proof_path()).await && exists(self.public_path()).await
    }

    /// Reads the proof and public signals into verifier call arguments.
    pub async fn load_call_args(&self) -> Result<ProofCallArgs, ProofError> {
        let proof_path = self.proof_path();
        let public_path = self.public_path();
        let proof = tokio::fs::read(&proof_path)
            .await
            .map_err(ProofError::io(&proof_path))?;
        let public = tokio::fs::read(&public_path)
            .await
            .map_err(ProofError::io(&public_path))?;

        let proof: SnarkjsProof =
            serde_json::from_slice(&proof).map_err(|err| ProofError::parse(&proof_path, err))?;
        let public: Vec<String> =
            serde_json::from_slice(&public).map_err(|err| ProofError::parse(&public_path, err))?;

        let point = |values: &[String], name: &str| -> Result<[U256; 2], ProofError> {
            match values {
                [x, y, ..] => Ok([parse_field(x, &proof_path)?, parse_field(y, &proof_path)?]),
                _ => Err(ProofError::parse(&proof_path, format!("{name} has fewer than 2 limbs"))),
            }
        };
        let b = match proof.pi_b.as_slice() {
            [x, y, ..] => [point(x.as_slice(), "pi_b[0]")?, point(y.as_slice(), "pi_b[1]")?],
            _ => return Err(ProofError::parse(&proof_path, "pi_b has fewer than 2 pairs")),
        };

        Ok(ProofCallArgs {
            a: point(proof.pi_a.as_slice(), "pi_a")?,
            b,
            c: point(proof.pi_c.as_slice(), "pi_c")?,
            public_signals: public
                .iter()
                .map(|signal| parse_field(signal, &public_path))
                .collect::<Result<_, _>>()?,
        })
    }
}

/// snarkjs writes field elements as decimal strings; projective points carry
/// a trailing `z` limb we ignore.
#[derive(Deserialize)]
struct SnarkjsProof {
    pi_a: Vec<String>,
    pi_b: Vec<Vec<String>>,
    pi_c: Vec<String>,
}

fn parse_field(value: &str, path: &Path) -> Result<U256, ProofError> {
    U256::from_str_radix(value.trim(), 10)
        .map_err(|err| ProofError::parse(path, format!("bad field element `{value}`: {err}")))
}

/// Groth16 proof points and public signals, ready for ABI encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofCallArgs {
    pub a: [U256; 2],
    pub b: [[U256; 2]; 2],
    pub c: [U256; 2],
    pub public_signals: Vec<U256>,
}

// ============================================================================
// Witness Inputs
// ============================================================================

/// Shape of the circuit's witness input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputShape {
    /// `{"x": "<1000 + index>"}`.
    #[default]
    Scalar,
    /// A random Merkle path of the given depth.
    MerklePath { depth: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum WitnessInput {
    Scalar {
        x: String,
    },
    #[serde(rename_all = "camelCase")]
    MerklePath {
        leaf: String,
        path_elements: Vec<String>,
        path_indices: Vec<u8>,
    },
}

impl WitnessInput {
    pub fn generate<R: Rng + ?Sized>(shape: InputShape, index: u64, rng: &mut R) -> Self {
        match shape {
            InputShape::Scalar => Self::Scalar {
                x: (1000 + u128::from(index)).to_string(),
            },
            InputShape::MerklePath { depth } => {
                let mut random_word = || format!("0x{}", hex::encode(rng.gen::<[u8; 32]>()));
                let leaf = random_word();
                let path_elements = (0..depth).map(|_| random_word()).collect();
                let path_indices = (0..depth).map(|_| rng.gen_range(0..=1)).collect();
                Self::MerklePath {
                    leaf,
                    path_elements,
                    path_indices,
                }
            }
        }
    }
}

// ============================================================================
// Toolchain and Provider
// ============================================================================

/// The external prover, invoked once for the witness and once for the proof.
#[async_trait]
pub trait ProofToolchain: Send + Sync {
    /// Computes `witness` from the JSON witness input at `input`.
    async fn witness(&self, input: &Path, witness: &Path) -> Result<(), ProofError>;

    /// Proves `witness`, writing the proof and public signals.
    async fn prove(&self, witness: &Path, proof: &Path, public: &Path) -> Result<(), ProofError>;
}

/// Outcome of bulk generation over a range of indices.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GenerationSummary {
    pub generated: usize,
    pub cached: usize,
    /// Failed indices and why.
    pub failed: Vec<(u64, String)>,
}

/// Obtains proofs from the cache, generating missing ones.
#[derive(Clone)]
pub struct ProofProvider {
    cache_dir: PathBuf,
    toolchain: Arc<dyn ProofToolchain>,
    shape: InputShape,
}

impl std::fmt::Debug for ProofProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProofProvider")
            .field("cache_dir", &self.cache_dir)
            .field("shape", &self.shape)
            .finish()
    }
}

impl ProofProvider {
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        toolchain: Arc<dyn ProofToolchain>,
        shape: InputShape,
    ) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            toolchain,
            shape,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Reference for `index`, generated on a cache miss.
    ///
    /// The second element is `true` when the proof came from the cache.
    pub async fn obtain(&self, index: u64) -> Result<(ProofArtifactRef, bool), ProofError> {
        let artifact = ProofArtifactRef::new(index, &self.cache_dir);
        if artifact.is_complete().await {
            debug!(index, "proof cache hit");
            return Ok((artifact, true));
        }

        tokio::fs::create_dir_all(artifact.dir())
            .await
            .map_err(ProofError::io(artifact.dir()))?;
        let input = WitnessInput::generate(self.shape, index, &mut rand::thread_rng());
        let input_path = artifact.input_path();
        let json = serde_json::to_vec(&input).map_err(|err| ProofError::parse(&input_path, err))?;
        tokio::fs::write(&input_path, json)
            .await
            .map_err(ProofError::io(&input_path))?;

        info!(index, "generating proof");
        if let Err(err) = self.run_toolchain(&artifact).await {
            // Never leave half an artifact that would look like a cache hit.
            for path in [artifact.proof_path(), artifact.public_path()] {
                if let Err(remove) = tokio::fs::remove_file(&path).await {
                    if remove.kind() != std::io::ErrorKind::NotFound {
                        warn!(
                            path = %path.display(),
                            %remove,
                            "failed to remove partial proof output"
                        );
                    }
                }
            }
            return Err(err);
        }
        Ok((artifact, false))
    }

    async fn run_toolchain(&self, artifact: &ProofArtifactRef) -> Result<(), ProofError> {
        let witness = artifact.witness_path();
        self.toolchain.witness(&artifact.input_path(), &witness).await?;
        self.toolchain
            .prove(&witness, &artifact.proof_path(), &artifact.public_path())
            .await?;
        if !artifact.is_complete().await {
            return Err(ProofError::MissingOutput(artifact.proof_path()));
        }
        Ok(())
    }

    /// Obtains `count` proofs starting at `first`; the first failure aborts.
    pub async fn obtain_all(
        &self,
        first: u64,
        count: usize,
    ) -> Result<Vec<ProofArtifactRef>, ProofError> {
        let mut artifacts = Vec::with_capacity(count);
        for index in (first..).take(count) {
            let (artifact, _) = self.obtain(index).await?;
            artifacts.push(artifact);
        }
        Ok(artifacts)
    }

    /// Fills the cache for `count` indices starting at `first`, carrying on
    /// past failures.
    pub async fn generate_range(&self, first: u64, count: usize) -> GenerationSummary {
        let mut summary = GenerationSummary::default();
        for index in (first..).take(count) {
            match self.obtain(index).await {
                Ok((_, true)) => summary.cached += 1,
                Ok((_, false)) => summary.generated += 1,
                Err(err) => {
                    warn!(index, %err, "proof generation failed");
                    summary.failed.push((index, err.to_string()));
                }
            }
        }
        summary
    }
}

// ============================================================================
// Tests
// ============================================================================
