//! Receipt tracking for accepted submissions.
//!
//! Each accepted hash is awaited on its own with its own deadline, so one
//! dropped transaction times out alone instead of holding up the others.

use alloy_primitives::B256;
use futures::{stream, StreamExt};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{
    chain::ChainClient,
    submission::{SubmissionOutcome, SubmissionRecord},
};

pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How waiting for one hash ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ConfirmationResult {
    /// Mined. `success` mirrors the receipt status; reverted calls still count
    /// as confirmed.
    #[serde(rename_all = "camelCase")]
    Confirmed {
        block_number: u64,
        gas_used: u64,
        success: bool,
    },
    TimedOut,
    Errored { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationRecord {
    pub index: usize,
    pub nonce: u64,
    pub hash: B256,
    #[serde(flatten)]
    pub result: ConfirmationResult,
}

impl ConfirmationRecord {
    pub fn is_confirmed(&self) -> bool {
        matches!(self.result, ConfirmationResult::Confirmed { .. })
    }
}

/// Waits for receipts of accepted submissions.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationTracker {
    timeout: Duration,
    poll_interval: Duration,
    width: usize,
}

impl Default for ConfirmationTracker {
    fn default() -> Self {
        Self::new(
            DEFAULT_CONFIRMATION_TIMEOUT,
            DEFAULT_POLL_INTERVAL,
            crate::submission::DEFAULT_WIDTH,
        )
    }
}

impl ConfirmationTracker {
    /// `width` bounds how many hashes are polled at once; zero is treated as one.
    pub fn new(timeout: Duration, poll_interval: Duration, width: usize) -> Self {
        Self {
            timeout,
            poll_interval,
            width: width.max(1),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Tracks every accepted record; rejected ones are skipped.
    ///
    /// Results come back in the order of `records`.
    pub async fn confirm_all<C>(
        &self,
        chain: &C,
        records: &[SubmissionRecord],
    ) -> Vec<ConfirmationRecord>
    where
        C: ChainClient + ?Sized,
    {
        let tracked: Vec<(usize, u64, B256)> = records
            .iter()
            .filter_map(|record| match record.outcome {
                SubmissionOutcome::Accepted { hash } => Some((record.index, record.nonce, hash)),
                SubmissionOutcome::Rejected { .. } => None,
            })
            .collect();
        info!(
            tracked = tracked.len(),
            timeout = ?self.timeout,
            "Waiting for receipts"
        );

        let (timeout, poll_interval) = (self.timeout, self.poll_interval);
        let mut confirmed: Vec<ConfirmationRecord> = stream::iter(tracked)
            .map(|(index, nonce, hash)| async move {
                let result = match chain.wait_receipt(hash, timeout, poll_interval).await {
                    Ok(Some(receipt)) => {
                        debug!(
                            %hash,
                            block = receipt.block_number,
                            success = receipt.success,
                            "confirmed"
                        );
                        ConfirmationResult::Confirmed {
                            block_number: receipt.block_number,
                            gas_used: receipt.gas_used,
                            success: receipt.success,
                        }
                    }
                    Ok(None) => {
                        warn!(%hash, nonce, "receipt wait timed out");
                        ConfirmationResult::TimedOut
                    }
                    Err(err) => {
                        warn!(%hash, nonce, %err, "receipt wait failed");
                        ConfirmationResult::Errored {
                            reason: err.to_string(),
                        }
                    }
                };
                ConfirmationRecord {
                    index,
                    nonce,
                    hash,
                    result,
                }
            })
            .buffer_unordered(self.width)
            .collect()
            .await;
        confirmed.sort_by_key(|record| record.index);

        info!(
            confirmed = confirmed.iter().filter(|r| r.is_confirmed()).count(),
            total = confirmed.len(),
            "Finished waiting for receipts"
        );
        confirmed
    }
}
