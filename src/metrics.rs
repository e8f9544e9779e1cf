//! Reduction of block telemetry and profiles into a run report.
//!
//! Throughput is always normalized by the nominal slot duration, and only over
//! the trimmed range: idle blocks mined before the load arrived or after it
//! drained are dropped from both edges first.

use futures::{stream, StreamExt};
use serde::Serialize;
use std::{fmt, sync::Arc, time::Duration};
use tracing::{info, warn};

use crate::{
    chain::{BlockTelemetry, ChainClient},
    profiler::{ProfileSummarizer, ProfilingArtifact},
};

/// Default nominal slot duration.
pub const DEFAULT_SLOT_DURATION: Duration = Duration::from_secs(12);

/// Concurrent block fetches during reduction.
const FETCH_WIDTH: usize = 16;

/// Drops leading, then trailing, blocks with no transactions.
///
/// Idempotent; a sequence with loaded blocks at both edges is returned whole.
pub fn trim_idle_edges(blocks: &[BlockTelemetry]) -> &[BlockTelemetry] {
    let Some(first) = blocks.iter().position(|b| b.tx_count > 0) else {
        return &[];
    };
    // `first` exists, so a last loaded block does too.
    let last = blocks.iter().rposition(|b| b.tx_count > 0).unwrap_or(first);
    &blocks[first..=last]
}

/// Figures derived from the trimmed block range alone.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockMetrics {
    pub first_block: Option<u64>,
    pub last_block: Option<u64>,
    pub block_count: usize,
    pub total_gas: u64,
    pub total_txs: usize,
    /// Trimmed blocks that used no gas.
    pub missed_block_count: usize,
    /// Gas per second; `None` when nothing was left to measure.
    pub gas_throughput: Option<f64>,
    /// Transactions per second over the same window.
    pub tx_throughput: Option<f64>,
}

impl BlockMetrics {
    pub fn from_blocks(blocks: &[BlockTelemetry], slot_duration: Duration) -> Self {
        let trimmed = trim_idle_edges(blocks);
        let block_count = trimmed.len();
        let total_gas = trimmed.iter().map(|b| b.gas_used).sum::<u64>();
        let total_txs = trimmed.iter().map(|b| b.tx_count).sum::<usize>();
        let window_seconds = block_count as f64 * slot_duration.as_secs_f64();

        let per_second =
            |total: f64| (window_seconds > 0.0 && total > 0.0).then(|| total / window_seconds);
        Self {
            first_block: trimmed.first().map(|b| b.block_number),
            last_block: trimmed.last().map(|b| b.block_number),
            block_count,
            total_gas,
            total_txs,
            missed_block_count: trimmed.iter().filter(|b| b.gas_used == 0).count(),
            gas_throughput: per_second(total_gas as f64),
            tx_throughput: per_second(total_txs as f64),
        }
    }
}

/// CPU use measured during one profiling window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileWindowUsage {
    pub window: usize,
    pub sampled_seconds: f64,
    pub cpu_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_percent: Option<f64>,
}

/// The reduced outcome of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Requested range, before trimming.
    pub start_block: u64,
    pub end_block: u64,
    #[serde(flatten)]
    pub blocks_summary: BlockMetrics,
    /// Average sampled CPU time per window as a share of the window length.
    pub cpu_utilization_percent: Option<f64>,
    /// Same ratio for the focus symbol alone.
    pub execution_cpu_percent: Option<f64>,
    /// Every fetched block, untrimmed.
    pub blocks: Vec<BlockTelemetry>,
    /// Summarized windows that entered the CPU average.
    pub profile_windows: Vec<ProfileWindowUsage>,
}

/// `Some(x)` with two decimals, `None` as `N/A`.
pub(crate) struct Maybe(pub Option<f64>);

impl fmt::Display for Maybe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(value) => write!(f, "{value:.2}"),
            None => f.write_str("N/A"),
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.blocks_summary;
        writeln!(f, "Blocks Used: {}", m.block_count)?;
        writeln!(f, "Total Gas: {}", m.total_gas)?;
        writeln!(f, "Total Txns in Blocks: {}", m.total_txs)?;
        writeln!(f, "Gas Throughput (gas/s): {}", Maybe(m.gas_throughput))?;
        writeln!(f, "Block-Based TPS: {}", Maybe(m.tx_throughput))?;
        writeln!(f, "Missed Blocks: {}", m.missed_block_count)?;
        writeln!(f, "CPU Average Usage (%): {}", Maybe(self.cpu_utilization_percent))?;
        write!(f, "Execution CPU Usage (%): {}", Maybe(self.execution_cpu_percent))
    }
}

/// Turns the observed block range and profiling artifacts into a [`Report`].
#[derive(Clone)]
pub struct MetricsReducer {
    slot_duration: Duration,
    sampling_interval: Duration,
    discarded_windows: usize,
    summarizer: Arc<dyn ProfileSummarizer>,
}

impl fmt::Debug for MetricsReducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsReducer")
            .field("slot_duration", &self.slot_duration)
            .field("sampling_interval", &self.sampling_interval)
            .field("discarded_windows", &self.discarded_windows)
            .finish()
    }
}

impl MetricsReducer {
    /// `sampling_interval` is the profiling window length. The first window
    /// is left out of the CPU average.
    pub fn new(
        slot_duration: Duration,
        sampling_interval: Duration,
        summarizer: Arc<dyn ProfileSummarizer>,
    ) -> Self {
        Self {
            slot_duration,
            sampling_interval,
            discarded_windows: 1,
            summarizer,
        }
    }

    /// Leave out windows `0..count` instead of just the first.
    pub fn with_discarded_windows(mut self, count: usize) -> Self {
        self.discarded_windows = count;
        self
    }

    /// Fetches `[start_block, end_block]` and reduces it together with the
    /// artifacts. An empty range (`start_block > end_block`) fetches nothing.
    ///
    /// Blocks that cannot be fetched are left out with a warning, so a run
    /// that already sent its load still gets a report.
    pub async fn reduce<C>(
        &self,
        chain: &C,
        start_block: u64,
        end_block: u64,
        artifacts: &[ProfilingArtifact],
    ) -> Report
    where
        C: ChainClient + ?Sized,
    {
        info!(start_block, end_block, "Generating report");
        let blocks: Vec<BlockTelemetry> = stream::iter(start_block..=end_block)
            .map(|number| async move { (number, chain.get_block(number).await) })
            .buffered(FETCH_WIDTH)
            .filter_map(|(number, result)| async move {
                result
                    .inspect_err(|err| warn!(block = number, %err, "skipping block"))
                    .ok()
            })
            .collect()
            .await;

        let profile_windows = self.summarize(artifacts).await;
        self.reduce_blocks(start_block, end_block, blocks, profile_windows)
    }

    /// Pure part of [`reduce`](Self::reduce), for already summarized windows.
    pub fn reduce_blocks(
        &self,
        start_block: u64,
        end_block: u64,
        blocks: Vec<BlockTelemetry>,
        profile_windows: Vec<ProfileWindowUsage>,
    ) -> Report {
        let blocks_summary = BlockMetrics::from_blocks(&blocks, self.slot_duration);
        let measurable = blocks_summary.block_count > 0 && !profile_windows.is_empty();

        let average = |values: Vec<f64>| {
            (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
        };
        let cpu_utilization_percent = measurable
            .then(|| average(profile_windows.iter().map(|w| w.cpu_percent).collect()))
            .flatten();
        let execution_cpu_percent = measurable
            .then(|| average(profile_windows.iter().filter_map(|w| w.execution_percent).collect()))
            .flatten();

        Report {
            start_block,
            end_block,
            blocks_summary,
            cpu_utilization_percent,
            execution_cpu_percent,
            blocks,
            profile_windows,
        }
    }

    /// Summarizes every non-discarded artifact; failures leave the window out.
    async fn summarize(&self, artifacts: &[ProfilingArtifact]) -> Vec<ProfileWindowUsage> {
        let interval = self.sampling_interval.as_secs_f64();
        if interval <= 0.0 {
            warn!("zero sampling interval, CPU utilization not available");
            return Vec::new();
        }

        let mut usage = Vec::new();
        for artifact in artifacts.iter().filter(|a| a.window >= self.discarded_windows) {
            match self.summarizer.summarize(artifact).await {
                Ok(summary) => usage.push(ProfileWindowUsage {
                    window: artifact.window,
                    sampled_seconds: summary.sampled_seconds,
                    cpu_percent: summary.sampled_seconds / interval * 100.0,
                    execution_percent: summary.focus_seconds.map(|s| s / interval * 100.0),
                }),
                Err(err) => warn!(
                    window = artifact.window,
                    path = %artifact.path.display(),
                    %err,
                    "skipping profile"
                ),
            }
        }
        usage
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        chain::mock::MockChain,
        profiler::{ProfileSummary, SummaryError},
    };
    use async_trait::async_trait;
    use std::collections::HashMap;

    pub(crate) fn block(block_number: u64, gas_used: u64, tx_count: usize) -> BlockTelemetry {
        BlockTelemetry {
            block_number,
            gas_used,
            base_fee_per_gas: 7,
            tx_count,
        }
    }

    /// Returns fixed seconds per window; unknown windows fail.
    #[derive(Default)]
    pub(crate) struct FixedSummarizer(pub(crate) HashMap<usize, ProfileSummary>);

    impl FixedSummarizer {
        pub(crate) fn uniform(windows: usize, sampled_seconds: f64) -> Self {
            Self(
                (0..windows)
                    .map(|w| (w, ProfileSummary { sampled_seconds, focus_seconds: None }))
                    .collect(),
            )
        }
    }

    #[async_trait]
    impl ProfileSummarizer for FixedSummarizer {
        async fn summarize(
            &self,
            artifact: &ProfilingArtifact,
        ) -> Result<ProfileSummary, SummaryError> {
            self.0
                .get(&artifact.window)
                .copied()
                .ok_or_else(|| SummaryError::Format(artifact.path.clone()))
        }
    }

    fn artifacts(count: usize) -> Vec<ProfilingArtifact> {
        (0..count)
            .map(|w| ProfilingArtifact::new(w, format!("cpu_{w}.prof")))
            .collect()
    }

    fn reducer(summarizer: FixedSummarizer) -> MetricsReducer {
        MetricsReducer::new(DEFAULT_SLOT_DURATION, Duration::from_secs(12), Arc::new(summarizer))
    }

    #[test]
    fn test_trim_is_idempotent() {
        let blocks = vec![
            block(1, 0, 0),
            block(2, 21_000, 1),
            block(3, 0, 0),
            block(4, 42_000, 2),
            block(5, 0, 0),
        ];
        let once = trim_idle_edges(&blocks);
        assert_eq!(once.first().unwrap().block_number, 2);
        assert_eq!(once.last().unwrap().block_number, 4);
        assert_eq!(trim_idle_edges(once), once);

        let loaded = vec![block(1, 1, 1), block(2, 0, 0), block(3, 1, 1)];
        assert_eq!(trim_idle_edges(&loaded), loaded.as_slice());

        assert!(trim_idle_edges(&[block(1, 0, 0), block(2, 0, 0)]).is_empty());
        assert!(trim_idle_edges(&[]).is_empty());
    }

    #[test]
    fn test_interior_empty_block_is_missed() {
        let blocks = vec![block(1, 21_000, 1), block(2, 0, 0), block(3, 21_000, 1)];
        let metrics = BlockMetrics::from_blocks(&blocks, Duration::from_secs(12));
        assert_eq!(metrics.block_count, 3);
        assert_eq!(metrics.missed_block_count, 1);
        assert_eq!(metrics.gas_throughput, Some(42_000.0 / 36.0));
        assert_eq!(metrics.tx_throughput, Some(2.0 / 36.0));
    }

    #[test]
    fn test_zero_gas_is_not_available() {
        // Transactions present but no gas accounted, e.g. a broken telemetry source.
        let blocks = vec![block(1, 0, 3), block(2, 0, 1)];
        let metrics = BlockMetrics::from_blocks(&blocks, Duration::from_secs(12));
        assert_eq!(metrics.block_count, 2);
        assert_eq!(metrics.gas_throughput, None);
        assert_eq!(metrics.missed_block_count, 2);

        let idle = BlockMetrics::from_blocks(&[block(1, 0, 0)], Duration::from_secs(12));
        assert_eq!(idle.block_count, 0);
        assert_eq!(idle.gas_throughput, None);
        assert_eq!(idle.tx_throughput, None);

        let no_slot = BlockMetrics::from_blocks(&blocks, Duration::ZERO);
        assert_eq!(no_slot.tx_throughput, None);
    }

    #[tokio::test]
    async fn test_reduce_trims_range() {
        let blocks = (100..=110).map(|n| {
            if (102..=108).contains(&n) {
                block(n, 210_000, 10)
            } else {
                block(n, 0, 0)
            }
        });
        let chain = MockChain::new(90).with_blocks(blocks);

        let report = reducer(FixedSummarizer::uniform(3, 6.0))
            .reduce(&chain, 100, 110, &artifacts(3))
            .await;

        let m = report.blocks_summary;
        assert_eq!(report.blocks.len(), 11);
        assert_eq!((m.first_block, m.last_block), (Some(102), Some(108)));
        assert_eq!(m.block_count, 7);
        assert_eq!(m.total_gas, 7 * 210_000);
        assert_eq!(m.missed_block_count, 0);
        assert_eq!(m.gas_throughput, Some(210_000.0 / 12.0));

        // Window 0 is discarded.
        assert_eq!(report.profile_windows.len(), 2);
        assert_eq!(report.profile_windows[0].window, 1);
        assert_eq!(report.cpu_utilization_percent, Some(50.0));
        assert_eq!(report.execution_cpu_percent, None);
    }

    #[tokio::test]
    async fn test_cpu_not_available() {
        let chain = MockChain::new(0).with_blocks([block(1, 21_000, 1)]);

        // Only the discarded window was recorded.
        let report = reducer(FixedSummarizer::uniform(1, 6.0))
            .reduce(&chain, 1, 1, &artifacts(1))
            .await;
        assert!(report.profile_windows.is_empty());
        assert_eq!(report.cpu_utilization_percent, None);

        // Every summary failed.
        let report = reducer(FixedSummarizer::default())
            .reduce(&chain, 1, 1, &artifacts(4))
            .await;
        assert_eq!(report.cpu_utilization_percent, None);

        // Windows summarized but no loaded block.
        let empty = MockChain::new(0).with_blocks([block(1, 0, 0)]);
        let report = reducer(FixedSummarizer::uniform(3, 6.0))
            .reduce(&empty, 1, 1, &artifacts(3))
            .await;
        assert_eq!(report.profile_windows.len(), 2);
        assert_eq!(report.cpu_utilization_percent, None);
        assert!(report.to_string().contains("CPU Average Usage (%): N/A"));
    }

    #[tokio::test]
    async fn test_execution_cpu_average() {
        let chain = MockChain::new(0).with_blocks([block(1, 21_000, 1)]);
        let summarizer = FixedSummarizer(
            [
                (1, ProfileSummary { sampled_seconds: 3.0, focus_seconds: Some(1.2) }),
                (2, ProfileSummary { sampled_seconds: 6.0, focus_seconds: Some(2.4) }),
                (3, ProfileSummary { sampled_seconds: 9.0, focus_seconds: None }),
            ]
            .into(),
        );
        let report = reducer(summarizer).reduce(&chain, 1, 1, &artifacts(4)).await;
        assert_eq!(report.cpu_utilization_percent, Some(50.0));
        let execution = report.execution_cpu_percent.unwrap();
        assert!((execution - 15.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_empty_range() {
        let chain = MockChain::new(10);
        let report = reducer(FixedSummarizer::default())
            .reduce(&chain, 11, 10, &[])
            .await;
        assert!(report.blocks.is_empty());
        assert_eq!(report.blocks_summary.block_count, 0);
        assert_eq!(report.blocks_summary.gas_throughput, None);
    }

    #[tokio::test]
    async fn test_unfetchable_block_is_skipped() {
        let chain = MockChain::new(0)
            .with_blocks((1..=4).map(|n| block(n, 21_000, 1)))
            .missing_blocks([2]);
        let report = reducer(FixedSummarizer::default())
            .reduce(&chain, 1, 4, &[])
            .await;
        let numbers: Vec<u64> = report.blocks.iter().map(|b| b.block_number).collect();
        assert_eq!(numbers, [1, 3, 4]);
        assert_eq!(report.blocks_summary.block_count, 3);
        assert_eq!(report.blocks_summary.total_gas, 63_000);
    }
}
