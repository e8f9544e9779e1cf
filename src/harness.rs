//! The run driver.
//!
//! A run allocates nonces once, builds and signs the whole burst, starts the
//! profiling schedule in the background, submits, waits for receipts, joins
//! the profiler and reduces the observed block range. Only resource failures
//! before the first submission (no endpoint, no nonce, no proof, no ABI) end
//! a run early; everything after that produces a report.

use alloy_primitives::{Address, U256};
use rand::Rng;
use serde::Serialize;
use std::{fmt, path::PathBuf, sync::Arc, time::Duration};
use tracing::{info, warn};

use crate::{
    abi::ProofCallEncoder,
    chain::ChainClient,
    confirmation::{
        ConfirmationRecord, ConfirmationResult, ConfirmationTracker, DEFAULT_CONFIRMATION_TIMEOUT,
        DEFAULT_POLL_INTERVAL,
    },
    error::HarnessError,
    metrics::{MetricsReducer, Report, DEFAULT_SLOT_DURATION},
    nonce::NonceAllocator,
    profiler::{ProfileSummarizer, ProfilerControl, ProfilingRun, ProfilingWindowScheduler},
    proof::ProofProvider,
    report::{ReportRecord, ReportSink, SummaryRecord, TransactionRow},
    signer::{FeePolicy, GasOracle, LogicalCallIntent, TransactionSigner},
    submission::{SubmissionPool, SubmissionRecord, DEFAULT_REQUEST_TIMEOUT, DEFAULT_WIDTH},
    IdentityPool, SenderIdentity,
};

/// Chain id of the local devnet the harness is normally pointed at.
pub const DEFAULT_CHAIN_ID: u64 = 32382;

/// Everything a run needs besides its collaborators. Read once at startup.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub chain_id: u64,
    pub fee_policy: FeePolicy,
    /// Sample the pending base fee once instead of using the fallback.
    pub live_base_fee: bool,
    pub submission_width: usize,
    pub request_timeout: Duration,
    pub confirmation_timeout: Duration,
    pub poll_interval: Duration,
    pub slot_duration: Duration,
    pub profile_windows: usize,
    pub profile_interval: Duration,
    /// Leading windows left out of the CPU average.
    pub discarded_windows: usize,
    pub reset_profiler: bool,
    /// Profiles are written here.
    pub readings_dir: PathBuf,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID,
            fee_policy: FeePolicy::default(),
            live_base_fee: false,
            submission_width: DEFAULT_WIDTH,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            slot_duration: DEFAULT_SLOT_DURATION,
            profile_windows: 5,
            profile_interval: Duration::from_secs(12),
            discarded_windows: 1,
            reset_profiler: false,
            readings_dir: PathBuf::from("readings"),
        }
    }
}

/// What to send.
#[derive(Debug)]
pub enum Workload {
    Transfer {
        sender: SenderIdentity,
        receiver: Address,
        value: U256,
        calls: usize,
    },
    ProofVerification {
        sender: SenderIdentity,
        contract: Address,
        encoder: ProofCallEncoder,
        provider: ProofProvider,
        /// Proof index of the first call; call `i` uses `first_index + i`.
        first_index: u64,
        calls: usize,
    },
}

impl Workload {
    /// Transfers between two distinct identities drawn from `pool`.
    pub fn transfers<R: Rng + ?Sized>(
        pool: &IdentityPool,
        rng: &mut R,
        value: U256,
        calls: usize,
    ) -> Result<Self, HarnessError> {
        let (sender, receiver) = pool.distinct_pair(rng).ok_or(HarnessError::NoIdentity {
            needed: 2,
            available: pool.len(),
        })?;
        Ok(Self::Transfer {
            sender: sender.clone(),
            receiver: receiver.address,
            value,
            calls,
        })
    }

    pub fn sender(&self) -> &SenderIdentity {
        match self {
            Self::Transfer { sender, .. } | Self::ProofVerification { sender, .. } => sender,
        }
    }

    pub fn calls(&self) -> usize {
        match self {
            Self::Transfer { calls, .. } | Self::ProofVerification { calls, .. } => *calls,
        }
    }

    /// Builds one intent per call. Proofs are obtained (and generated on a
    /// cache miss) up front; any failure here aborts the run.
    async fn intents(&self) -> Result<Vec<LogicalCallIntent>, HarnessError> {
        match self {
            Self::Transfer { receiver, value, calls, .. } => Ok(vec![
                LogicalCallIntent::Transfer {
                    to: *receiver,
                    value: *value,
                };
                *calls
            ]),
            Self::ProofVerification {
                contract,
                encoder,
                provider,
                first_index,
                calls,
                ..
            } => {
                info!(
                    first_index,
                    calls,
                    cache = %provider.cache_dir().display(),
                    "Preparing proofs"
                );
                let artifacts = provider.obtain_all(*first_index, *calls).await?;
                let mut intents = Vec::with_capacity(artifacts.len());
                for artifact in artifacts {
                    let args = artifact.load_call_args().await?;
                    let calldata = encoder.encode(&args)?;
                    intents.push(LogicalCallIntent::ProofVerification {
                        contract: *contract,
                        artifact,
                        calldata,
                    });
                }
                Ok(intents)
            }
        }
    }
}

/// Outcome of one run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub sender: Address,
    pub calls: usize,
    pub max_fee_per_gas: u128,
    pub start_block: u64,
    pub end_block: u64,
    pub submitted: usize,
    pub accepted: usize,
    pub rejected: usize,
    /// Mined, whatever the receipt status.
    pub confirmed: usize,
    /// Mined with a successful receipt status.
    pub succeeded: usize,
    pub timed_out: usize,
    pub errored: usize,
    /// Gas of confirmed transactions, from their receipts.
    pub confirmed_gas: u64,
    pub windows_scheduled: usize,
    pub windows_completed: usize,
    pub metrics: Report,
    pub submissions: Vec<SubmissionRecord>,
    pub confirmations: Vec<ConfirmationRecord>,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Sender: {}", self.sender)?;
        writeln!(f, "Block Range: {}..={}", self.start_block, self.end_block)?;
        writeln!(
            f,
            "Submitted: {} ({} accepted, {} rejected)",
            self.submitted, self.accepted, self.rejected
        )?;
        writeln!(
            f,
            "Confirmed: {} ({} succeeded, {} timed out, {} errored)",
            self.confirmed, self.succeeded, self.timed_out, self.errored
        )?;
        writeln!(
            f,
            "Profiling Windows: {}/{} completed",
            self.windows_completed, self.windows_scheduled
        )?;
        write!(f, "{}", self.metrics)
    }
}

/// Wires the run components to their collaborators.
pub struct Harness<C> {
    chain: C,
    config: HarnessConfig,
    profiler: Option<Arc<dyn ProfilerControl>>,
    summarizer: Arc<dyn ProfileSummarizer>,
}

impl<C: fmt::Debug> fmt::Debug for Harness<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Harness")
            .field("chain", &self.chain)
            .field("config", &self.config)
            .field("profiling", &self.profiler.is_some())
            .finish()
    }
}

impl<C: ChainClient> Harness<C> {
    /// A harness without a profiler reports CPU use as not available.
    pub fn new(chain: C, config: HarnessConfig, summarizer: Arc<dyn ProfileSummarizer>) -> Self {
        Self {
            chain,
            config,
            profiler: None,
            summarizer,
        }
    }

    pub fn with_profiler(mut self, profiler: Arc<dyn ProfilerControl>) -> Self {
        self.profiler = Some(profiler);
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Queries the chain id; an unreachable endpoint is fatal, a different
    /// id only warrants a warning.
    pub async fn check_chain(&self) -> Result<u64, HarnessError> {
        let chain_id = self.chain.chain_id().await?;
        if chain_id != self.config.chain_id {
            warn!(node = chain_id, configured = self.config.chain_id, "chain id mismatch");
        }
        Ok(chain_id)
    }

    /// Runs `workload` end to end and appends its records to `sink`.
    ///
    /// Once the load has been sent, failures to read back the chain only
    /// shrink the reduced range; the run still returns a report.
    pub async fn run(
        &self,
        workload: Workload,
        sink: &mut dyn ReportSink,
    ) -> Result<RunReport, HarnessError> {
        self.check_chain().await?;
        let sender = workload.sender();
        let calls = workload.calls();
        let nonces = NonceAllocator::allocate(&self.chain, sender.address, calls).await?;

        let base_fee_sample = if self.config.live_base_fee {
            match self.chain.pending_base_fee().await {
                Ok(sample) => sample,
                Err(err) => {
                    warn!(%err, "base fee sample failed, using fallback");
                    None
                }
            }
        } else {
            None
        };
        let signer =
            TransactionSigner::new(self.config.chain_id, &self.config.fee_policy, base_fee_sample);

        let intents = workload.intents().await?;
        let mut oracle = GasOracle::new();
        let mut payloads = Vec::with_capacity(intents.len());
        for (index, (intent, nonce)) in intents.into_iter().zip(nonces.iter()).enumerate() {
            let gas_limit = oracle.gas_limit(&self.chain, sender.address, &intent).await?;
            payloads.push(signer.sign(sender, index, signer.price(intent, nonce, gas_limit))?);
        }
        info!(
            sender = %sender.address,
            calls = payloads.len(),
            first_nonce = nonces.start(),
            max_fee_per_gas = signer.max_fee_per_gas(),
            "Signed transactions"
        );

        let start_block = self.chain.block_number().await? + 1;
        let profiling = self.profiler.clone().map(|profiler| {
            ProfilingWindowScheduler::new(
                profiler,
                &self.config.readings_dir,
                self.config.profile_windows,
                self.config.profile_interval,
            )
            .with_reset(self.config.reset_profiler)
            .spawn()
        });

        let pool = SubmissionPool::new(self.config.submission_width, self.config.request_timeout);
        let submissions = pool.submit_all(&self.chain, payloads).await;
        let tracker = ConfirmationTracker::new(
            self.config.confirmation_timeout,
            self.config.poll_interval,
            self.config.submission_width,
        );
        let confirmations = tracker.confirm_all(&self.chain, &submissions).await;
        write_transactions(sink, &confirmations)?;
        let end_block = match self.chain.block_number().await {
            Ok(head) => head,
            Err(err) => {
                let last_receipt = confirmations
                    .iter()
                    .filter_map(|record| match record.result {
                        ConfirmationResult::Confirmed { block_number, .. } => Some(block_number),
                        _ => None,
                    })
                    .max();
                warn!(
                    %err,
                    ?last_receipt,
                    "head query failed, reducing up to the last receipt"
                );
                last_receipt.unwrap_or(start_block.saturating_sub(1))
            }
        };

        let profiling_run = match profiling {
            Some(handle) => {
                info!("Waiting for CPU profiling to finish");
                handle.join().await.unwrap_or_else(|err| {
                    warn!(%err, "CPU profiling did not finish");
                    ProfilingRun::default()
                })
            }
            None => ProfilingRun::default(),
        };

        let reducer = MetricsReducer::new(
            self.config.slot_duration,
            self.config.profile_interval,
            self.summarizer.clone(),
        )
        .with_discarded_windows(self.config.discarded_windows);
        let metrics = reducer
            .reduce(&self.chain, start_block, end_block, &profiling_run.artifacts())
            .await;
        write_metrics(sink, &metrics)?;

        let accepted = submissions.iter().filter(|s| s.outcome.is_accepted()).count();
        let mut report = RunReport {
            sender: sender.address,
            calls,
            max_fee_per_gas: signer.max_fee_per_gas(),
            start_block,
            end_block,
            submitted: submissions.len(),
            accepted,
            rejected: submissions.len() - accepted,
            confirmed: 0,
            succeeded: 0,
            timed_out: 0,
            errored: 0,
            confirmed_gas: 0,
            windows_scheduled: profiling_run.scheduled,
            windows_completed: profiling_run.completed(),
            metrics,
            submissions,
            confirmations: Vec::new(),
        };
        for record in &confirmations {
            match record.result {
                ConfirmationResult::Confirmed { gas_used, success, .. } => {
                    report.confirmed += 1;
                    report.succeeded += usize::from(success);
                    report.confirmed_gas += gas_used;
                }
                ConfirmationResult::TimedOut => report.timed_out += 1,
                ConfirmationResult::Errored { .. } => report.errored += 1,
            }
        }
        report.confirmations = confirmations;
        info!(
            confirmed = report.confirmed,
            submitted = report.submitted,
            blocks = report.metrics.blocks_summary.block_count,
            "Run finished"
        );
        Ok(report)
    }
}

fn write_transactions(
    sink: &mut dyn ReportSink,
    confirmations: &[ConfirmationRecord],
) -> Result<(), HarnessError> {
    for record in confirmations {
        if let ConfirmationResult::Confirmed { block_number, success, .. } = record.result {
            sink.append(&ReportRecord::Transaction(TransactionRow {
                hash: record.hash,
                nonce: record.nonce,
                block_number,
                success,
            }))?;
        }
    }
    sink.flush()?;
    Ok(())
}

fn write_metrics(sink: &mut dyn ReportSink, metrics: &Report) -> Result<(), HarnessError> {
    for block in &metrics.blocks {
        sink.append(&ReportRecord::Block(*block))?;
    }
    for window in &metrics.profile_windows {
        sink.append(&ReportRecord::ProfileWindow(*window))?;
    }
    sink.append(&ReportRecord::Summary(SummaryRecord::from(metrics)))?;
    sink.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        abi::G2Order,
        chain::mock::{MockChain, MOCK_BASE_FEE},
        metrics::tests::FixedSummarizer,
        profiler::tests::RecordingProfiler,
        proof::{tests::FakeToolchain, InputShape},
        report::tests::MemorySink,
        signer::GWEI,
    };
    use rand::{rngs::StdRng, SeedableRng};
    use tokio::time::Instant;

    fn transfer_workload(calls: usize) -> Workload {
        Workload::Transfer {
            sender: SenderIdentity::from_seed(1),
            receiver: SenderIdentity::from_seed(2).address,
            value: U256::from(100_000_000_000_000_000u128),
            calls,
        }
    }

    fn harness(chain: MockChain, config: HarnessConfig) -> Harness<MockChain> {
        Harness::new(chain, config, Arc::new(FixedSummarizer::default()))
    }

    #[tokio::test]
    async fn test_all_transfers_confirm() {
        let harness = harness(MockChain::new(100), HarnessConfig::default());
        let mut sink = MemorySink::default();

        let report = harness.run(transfer_workload(10), &mut sink).await.unwrap();
        assert_eq!(report.submitted, 10);
        assert_eq!(report.confirmed, 10);
        assert_eq!(report.succeeded, 10);
        assert_eq!(report.confirmed_gas, 210_000);
        assert_eq!(report.start_block, 101);
        assert_eq!(report.end_block, 103);

        let blocks = &report.metrics.blocks_summary;
        assert_eq!(blocks.block_count, 3);
        assert_eq!(blocks.missed_block_count, 0);
        assert_eq!(blocks.total_gas, 210_000);
        assert_eq!(report.metrics.cpu_utilization_percent, None);
        assert_eq!(report.windows_scheduled, 0);

        let count = |f: fn(&ReportRecord) -> bool| sink.records.iter().filter(|r| f(r)).count();
        assert_eq!(count(|r| matches!(r, ReportRecord::Block(_))), 3);
        assert_eq!(count(|r| matches!(r, ReportRecord::Transaction(_))), 10);
        assert_eq!(count(|r| matches!(r, ReportRecord::Summary(_))), 1);
        assert!(sink.flushed);
    }

    #[tokio::test]
    async fn test_lost_block_still_reports() {
        let chain = MockChain::new(100).missing_blocks([102]);
        let harness = harness(chain, HarnessConfig::default());
        let mut sink = MemorySink::default();

        let report = harness.run(transfer_workload(10), &mut sink).await.unwrap();
        assert_eq!(report.confirmed, 10);
        assert_eq!(report.end_block, 103);
        let numbers: Vec<u64> = report.metrics.blocks.iter().map(|b| b.block_number).collect();
        assert_eq!(numbers, [101, 103]);

        let count = |f: fn(&ReportRecord) -> bool| sink.records.iter().filter(|r| f(r)).count();
        assert_eq!(count(|r| matches!(r, ReportRecord::Transaction(_))), 10);
        assert_eq!(count(|r| matches!(r, ReportRecord::Block(_))), 2);
        assert_eq!(count(|r| matches!(r, ReportRecord::Summary(_))), 1);
        assert!(matches!(sink.records[0], ReportRecord::Transaction(_)));
    }

    #[tokio::test]
    async fn test_failed_head_query_uses_last_receipt() {
        let chain = MockChain::new(100).with_idle_edges(0, 5).failing_block_number();
        let harness = harness(chain, HarnessConfig::default());
        let mut sink = MemorySink::default();

        let report = harness.run(transfer_workload(10), &mut sink).await.unwrap();
        assert_eq!(report.confirmed, 10);
        assert_eq!((report.start_block, report.end_block), (101, 103));
        assert_eq!(report.metrics.blocks_summary.block_count, 3);
        assert!(sink.flushed);
    }

    #[tokio::test]
    async fn test_rejected_submissions_are_not_tracked() {
        let chain = MockChain::new(100).reject_nonces([2, 5, 7]);
        let harness = harness(chain, HarnessConfig::default());

        let report = harness
            .run(transfer_workload(10), &mut MemorySink::default())
            .await
            .unwrap();
        assert_eq!(report.submitted, 10);
        assert_eq!(report.rejected, 3);
        assert_eq!(report.confirmations.len(), 7);
        assert!(report.confirmed <= 7);
        let rejected: Vec<u64> = report
            .submissions
            .iter()
            .filter(|s| !s.outcome.is_accepted())
            .map(|s| s.nonce)
            .collect();
        assert_eq!(rejected, vec![2, 5, 7]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_transaction_times_out() {
        let chain = MockChain::new(0).drop_nonces([4]);
        let config = HarnessConfig {
            confirmation_timeout: Duration::from_secs(30),
            ..Default::default()
        };
        let report = harness(chain, config)
            .run(transfer_workload(6), &mut MemorySink::default())
            .await
            .unwrap();
        assert_eq!(report.confirmed, 5);
        assert_eq!(report.timed_out, 1);
        assert_eq!(report.confirmed_gas, 5 * 21_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_profiling_windows_joined() {
        let dir = tempfile::tempdir().unwrap();
        let profiler = Arc::new(RecordingProfiler::default());
        let config = HarnessConfig {
            profile_windows: 3,
            profile_interval: Duration::from_secs(5),
            readings_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let summarizer = Arc::new(FixedSummarizer::uniform(3, 1.0));
        let harness =
            Harness::new(MockChain::new(100), config, summarizer).with_profiler(profiler.clone());

        let started = Instant::now();
        let mut sink = MemorySink::default();
        let report = harness.run(transfer_workload(4), &mut sink).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(15));

        assert_eq!(report.windows_scheduled, 3);
        assert_eq!(report.windows_completed, 3);
        assert_eq!(profiler.calls.lock().len(), 6);
        for window in 0..3 {
            assert!(dir.path().join(format!("cpu_{window}.prof")).exists());
        }

        // Window 0 is left out: two windows of 1s sampled out of 5s.
        let windows: Vec<usize> = report.metrics.profile_windows.iter().map(|w| w.window).collect();
        assert_eq!(windows, vec![1, 2]);
        let cpu = report.metrics.cpu_utilization_percent.unwrap();
        assert!((cpu - 20.0).abs() < 1e-9);
        assert_eq!(
            sink.records
                .iter()
                .filter(|r| matches!(r, ReportRecord::ProfileWindow(_)))
                .count(),
            2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_profiler_failure_does_not_abort_run() {
        let dir = tempfile::tempdir().unwrap();
        let profiler = Arc::new(RecordingProfiler {
            fail_start_on: Some(0),
            ..Default::default()
        });
        let config = HarnessConfig {
            profile_windows: 2,
            profile_interval: Duration::from_secs(2),
            readings_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let harness = harness(MockChain::new(100), config).with_profiler(profiler);

        let report = harness
            .run(transfer_workload(4), &mut MemorySink::default())
            .await
            .unwrap();
        assert_eq!(report.confirmed, 4);
        assert_eq!(report.windows_scheduled, 2);
        assert_eq!(report.windows_completed, 1);
    }

    #[tokio::test]
    async fn test_proof_verification_run() {
        let dir = tempfile::tempdir().unwrap();
        let provider =
            ProofProvider::new(dir.path(), Arc::new(FakeToolchain::default()), InputShape::Scalar);
        let workload = Workload::ProofVerification {
            sender: SenderIdentity::from_seed(1),
            contract: Address::repeat_byte(0x42),
            encoder: ProofCallEncoder::canonical(G2Order::Swapped),
            provider,
            first_index: 0,
            calls: 3,
        };
        let chain = MockChain::new(10).with_gas_estimate(300_000);
        let harness = harness(chain, HarnessConfig::default());

        let report = harness.run(workload, &mut MemorySink::default()).await.unwrap();
        assert_eq!(report.confirmed, 3);
        assert_eq!(report.metrics.blocks_summary.total_gas, 900_000);
        assert_eq!(harness.chain.estimate_calls(), 1);
        for index in 0..3 {
            assert!(dir.path().join(index.to_string()).join("proof.json").exists());
        }
    }

    #[tokio::test]
    async fn test_failed_proof_aborts_before_submission() {
        let dir = tempfile::tempdir().unwrap();
        let toolchain = FakeToolchain {
            fail_indices: ["1".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let workload = Workload::ProofVerification {
            sender: SenderIdentity::from_seed(1),
            contract: Address::repeat_byte(0x42),
            encoder: ProofCallEncoder::canonical(G2Order::Swapped),
            provider: ProofProvider::new(dir.path(), Arc::new(toolchain), InputShape::Scalar),
            first_index: 0,
            calls: 3,
        };
        let harness = harness(MockChain::new(10), HarnessConfig::default());

        let result = harness.run(workload, &mut MemorySink::default()).await;
        assert!(matches!(result, Err(HarnessError::Proof(_))));
        assert_eq!(harness.chain.sent(), 0);
    }

    #[tokio::test]
    async fn test_nonce_query_failure_is_fatal() {
        let harness = harness(MockChain::new(0).failing_nonce_query(), HarnessConfig::default());
        let mut sink = MemorySink::default();

        let result = harness.run(transfer_workload(5), &mut sink).await;
        assert!(matches!(result, Err(HarnessError::Rpc(_))));
        assert_eq!(harness.chain.sent(), 0);
        assert!(sink.records.is_empty());
    }

    #[tokio::test]
    async fn test_live_base_fee() {
        let fixed = harness(MockChain::new(0), HarnessConfig::default())
            .run(transfer_workload(1), &mut MemorySink::default())
            .await
            .unwrap();
        assert_eq!(fixed.max_fee_per_gas, 12 * GWEI);

        let config = HarnessConfig {
            live_base_fee: true,
            ..Default::default()
        };
        let live = harness(MockChain::new(0), config.clone())
            .run(transfer_workload(1), &mut MemorySink::default())
            .await
            .unwrap();
        assert_eq!(live.max_fee_per_gas, MOCK_BASE_FEE + 2 * GWEI);

        // No base fee on the chain: fall back.
        let legacy = harness(MockChain::new(0).with_base_fee(None), config)
            .run(transfer_workload(1), &mut MemorySink::default())
            .await
            .unwrap();
        assert_eq!(legacy.max_fee_per_gas, 12 * GWEI);
    }

    #[test]
    fn test_transfer_pair_needs_two_identities() {
        let mut rng = StdRng::seed_from_u64(3);
        let single = IdentityPool::new(vec![SenderIdentity::from_seed(1)]);
        assert!(matches!(
            Workload::transfers(&single, &mut rng, U256::from(1), 10),
            Err(HarnessError::NoIdentity { needed: 2, available: 1 })
        ));

        let pool = IdentityPool::new((1..=4).map(SenderIdentity::from_seed).collect());
        let Workload::Transfer { sender, receiver, calls, .. } =
            Workload::transfers(&pool, &mut rng, U256::from(1), 10).unwrap()
        else {
            panic!("expected a transfer workload");
        };
        assert_ne!(sender.address, receiver);
        assert_eq!(calls, 10);
    }
}
