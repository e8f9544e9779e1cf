//! Command line and environment surface.
//!
//! Every flag can also be set through the environment variable named next to
//! it; the binary loads a `.env` file first. Values are read once at startup.

use alloy_primitives::{Address, U256};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::{path::PathBuf, sync::Arc, time::Duration};

use crate::{
    abi::{AbiError, G2Order, ProofCallEncoder, DEFAULT_METHOD},
    error::HarnessError,
    harness::{HarnessConfig, DEFAULT_CHAIN_ID},
    profiler::{GethProfiler, PprofSummarizer, DEFAULT_FOCUS_SYMBOL},
    proof::{InputShape, ProofProvider, SnarkjsToolchain, MERKLE_DEPTH},
    signer::{FeeMultiplier, FeePolicy, GWEI},
    IdentityPool, KeyError,
};

/// Drive an execution node with a burst of transactions and measure what it did.
#[derive(Parser, Debug)]
#[command(name = "node-stress", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send plain value transfers between two identities
    Transfer(TransferArgs),
    /// Send proof-verification calls to a verifier contract
    Proof(ProofArgs),
    /// Fill the proof cache for a range of indices
    Prove(ProveArgs),
}

/// Settings shared by every load-generating run.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// JSON-RPC endpoint of the node under test
    #[arg(long, env = "RPC_URL", default_value = "http://localhost:8545")]
    pub rpc_url: String,

    /// Chain id used for signing
    #[arg(long, env = "CHAIN_ID", default_value_t = DEFAULT_CHAIN_ID)]
    pub chain_id: u64,

    /// Private keys of the identities to send from, comma separated
    #[arg(
        long = "private-keys",
        env = "PRIVATE_KEYS",
        value_delimiter = ',',
        required = true,
        hide_env_values = true
    )]
    pub private_keys: Vec<String>,

    /// Maximum number of requests in flight
    #[arg(long, env = "CONCURRENCY", default_value_t = 50)]
    pub concurrency: usize,

    /// Per-request timeout for submissions, in seconds
    #[arg(long, default_value_t = 30)]
    pub request_timeout: u64,

    /// How long to wait for each receipt, in seconds
    #[arg(long, env = "TX_TIMEOUT", default_value_t = 300)]
    pub confirmation_timeout: u64,

    /// Receipt polling interval, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub poll_interval_ms: u64,

    /// Multiplier applied to the base fee
    #[arg(long, env = "FEE_MULTIPLIER", default_value = "1.0")]
    pub fee_multiplier: FeeMultiplier,

    /// Priority tip, in gwei
    #[arg(long, env = "PRIORITY_FEE_GWEI", default_value_t = 2)]
    pub tip_gwei: u64,

    /// Base fee used when no live sample is taken, in gwei
    #[arg(long, env = "FALLBACK_BASE_FEE_GWEI", default_value_t = 10)]
    pub fallback_base_fee_gwei: u64,

    /// Sample the pending base fee once at startup
    #[arg(long, env = "LIVE_BASE_FEE")]
    pub live_base_fee: bool,

    /// Nominal block time used to normalize throughput, in seconds
    #[arg(long, env = "SLOT_DURATION", default_value_t = 12)]
    pub slot_duration: u64,

    /// Directory for profiles and reports
    #[arg(long, env = "READINGS_DIR", default_value = "readings")]
    pub readings_dir: PathBuf,

    #[command(flatten)]
    pub calls: CallCount,

    #[command(flatten)]
    pub profiling: ProfilingArgs,
}

/// Number of calls, given directly or derived from a gas budget.
#[derive(Args, Debug, Clone, Default)]
pub struct CallCount {
    /// Number of transactions to send
    #[arg(long, env = "CALLS")]
    pub calls: Option<usize>,

    /// Block gas limit, used to derive the call count
    #[arg(long, env = "GAS_LIMIT")]
    pub gas_limit: Option<u64>,

    /// Gas used by one call, used to derive the call count
    #[arg(long, env = "PER_TXN_GAS")]
    pub per_call_gas: Option<u64>,

    /// Blocks worth of calls to send, used to derive the call count
    #[arg(long, env = "ESTIMATED_BLOCKS_TO_MONITOR")]
    pub blocks_to_monitor: Option<u64>,
}

impl CallCount {
    /// `calls`, or `(gas_limit / per_call_gas) * blocks_to_monitor`.
    pub fn resolve(&self) -> Result<usize, HarnessError> {
        if let Some(calls) = self.calls {
            return Ok(calls);
        }
        match (self.gas_limit, self.per_call_gas, self.blocks_to_monitor) {
            (Some(_), Some(0), _) => {
                Err(HarnessError::Config("per-call gas must be positive".into()))
            }
            (Some(gas_limit), Some(per_call), Some(blocks)) => {
                usize::try_from((gas_limit / per_call) * blocks).map_err(|_| {
                    HarnessError::Config("derived call count does not fit in usize".into())
                })
            }
            _ => Err(HarnessError::Config(
                "set --calls, or all of --gas-limit, --per-call-gas and --blocks-to-monitor".into(),
            )),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ProfilingArgs {
    /// IPC endpoint of the node to profile; profiling is off without it
    #[arg(long, env = "NODE_IPC_PATH")]
    pub ipc_path: Option<PathBuf>,

    #[arg(long, env = "GETH_BIN", default_value = "geth")]
    pub geth_bin: PathBuf,

    /// Length of each profiling window, in seconds
    #[arg(long, env = "CPU_PROFILE_INTERVAL", default_value_t = 12)]
    pub profile_interval: u64,

    /// Number of profiling windows
    #[arg(long, env = "CPU_PROFILE_COUNT", default_value_t = 5)]
    pub profile_count: usize,

    /// Leading windows left out of the CPU average
    #[arg(long, default_value_t = 1)]
    pub discard_windows: usize,

    /// Stop any profile left running before the first window
    #[arg(long, env = "PROFILER_RESET")]
    pub reset_profiler: bool,

    #[arg(long, env = "GO_BIN", default_value = "go")]
    pub go_bin: PathBuf,

    /// Function whose cumulative time is reported as execution CPU
    #[arg(long, default_value = DEFAULT_FOCUS_SYMBOL)]
    pub focus_symbol: String,

    /// Skip the execution CPU figure
    #[arg(long)]
    pub no_focus: bool,
}

impl ProfilingArgs {
    pub fn profiler(&self) -> Option<GethProfiler> {
        self.ipc_path
            .as_ref()
            .map(|ipc| GethProfiler::new(ipc).with_binary(&self.geth_bin))
    }

    pub fn summarizer(&self) -> PprofSummarizer {
        let focus = (!self.no_focus).then(|| self.focus_symbol.clone());
        PprofSummarizer::new(&self.go_bin, focus)
    }
}

impl RunArgs {
    pub fn identities(&self) -> Result<IdentityPool, KeyError> {
        IdentityPool::from_private_keys(&self.private_keys)
    }

    pub fn fee_policy(&self) -> FeePolicy {
        FeePolicy {
            multiplier: self.fee_multiplier,
            tip: u128::from(self.tip_gwei) * GWEI,
            fallback_base_fee: u128::from(self.fallback_base_fee_gwei) * GWEI,
        }
    }

    /// The readings directory is made absolute because the profiler resolves
    /// output paths relative to the node's working directory.
    pub fn harness_config(&self) -> Result<HarnessConfig, HarnessError> {
        let readings_dir = std::path::absolute(&self.readings_dir).map_err(|err| {
            HarnessError::Config(format!("readings dir {}: {err}", self.readings_dir.display()))
        })?;
        Ok(HarnessConfig {
            chain_id: self.chain_id,
            fee_policy: self.fee_policy(),
            live_base_fee: self.live_base_fee,
            submission_width: self.concurrency.max(1),
            request_timeout: Duration::from_secs(self.request_timeout),
            confirmation_timeout: Duration::from_secs(self.confirmation_timeout),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            slot_duration: Duration::from_secs(self.slot_duration),
            profile_windows: self.profiling.profile_count,
            profile_interval: Duration::from_secs(self.profiling.profile_interval),
            discarded_windows: self.profiling.discard_windows,
            reset_profiler: self.profiling.reset_profiler,
            readings_dir,
        })
    }
}

#[derive(Args, Debug, Clone)]
pub struct TransferArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Value of each transfer, in wei
    #[arg(long, default_value_t = 100_000_000_000_000_000)]
    pub value_wei: u128,
}

impl TransferArgs {
    pub fn value(&self) -> U256 {
        U256::from(self.value_wei)
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WitnessShape {
    /// A single scalar field
    #[default]
    Scalar,
    /// A random Merkle path
    MerklePath,
}

/// Where proofs come from and where they are cached.
#[derive(Args, Debug, Clone)]
pub struct ToolchainArgs {
    /// Circuit build directory (`<circuit>.zkey`, `<circuit>_js/`)
    #[arg(long, env = "BUILD_DIR")]
    pub build_dir: PathBuf,

    #[arg(long = "circuit", env = "ZK_CIRCUIT_NAME")]
    pub circuit: String,

    /// Proof cache; defaults to `<build-dir>/proofs`
    #[arg(long, env = "PROOF_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    #[arg(long, env = "NODE_BIN", default_value = "node")]
    pub node_bin: PathBuf,

    #[arg(long, env = "SNARKJS_BIN", default_value = "snarkjs")]
    pub snarkjs_bin: PathBuf,

    #[arg(long, value_enum, default_value_t = WitnessShape::Scalar)]
    pub witness_shape: WitnessShape,

    #[arg(long, default_value_t = MERKLE_DEPTH)]
    pub merkle_depth: usize,
}

impl ToolchainArgs {
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.build_dir.join("proofs"))
    }

    pub fn input_shape(&self) -> InputShape {
        match self.witness_shape {
            WitnessShape::Scalar => InputShape::Scalar,
            WitnessShape::MerklePath => InputShape::MerklePath {
                depth: self.merkle_depth,
            },
        }
    }

    pub fn provider(&self) -> ProofProvider {
        let toolchain = SnarkjsToolchain::new(&self.build_dir, &self.circuit)
            .with_binaries(&self.node_bin, &self.snarkjs_bin);
        ProofProvider::new(self.cache_dir(), Arc::new(toolchain), self.input_shape())
    }
}

#[derive(Args, Debug, Clone)]
pub struct ProofArgs {
    #[command(flatten)]
    pub run: RunArgs,

    #[command(flatten)]
    pub toolchain: ToolchainArgs,

    /// Verifier contract address
    #[arg(long, env = "VERIFIER_CONTRACT_ADDRESS")]
    pub contract: Address,

    /// Verifier ABI (Hardhat artifact or bare ABI array)
    #[arg(long, env = "VERIFIER_ABI_PATH")]
    pub abi: Option<PathBuf>,

    #[arg(long, default_value = DEFAULT_METHOD)]
    pub method: String,

    #[arg(long, value_enum, default_value_t = G2Order::Swapped)]
    pub g2_order: G2Order,

    /// Proof index of the first call
    #[arg(long, default_value_t = 0)]
    pub first_index: u64,
}

impl ProofArgs {
    pub fn encoder(&self) -> Result<ProofCallEncoder, AbiError> {
        match &self.abi {
            Some(path) => ProofCallEncoder::from_abi_file(path, &self.method, self.g2_order),
            None => Ok(ProofCallEncoder::new(&self.method, 1, self.g2_order)),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ProveArgs {
    #[command(flatten)]
    pub toolchain: ToolchainArgs,

    #[arg(long, default_value_t = 0)]
    pub first_index: u64,

    /// Number of proofs to generate
    #[arg(long, env = "NUM_PROOFS")]
    pub count: usize,
}
