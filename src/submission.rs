//! Bounded-concurrency submission of signed payloads.
//!
//! Every payload is sent exactly once. A failure of any kind is captured as a
//! [`SubmissionOutcome::Rejected`] for that payload alone; siblings keep
//! going and nothing is retried.

use alloy_primitives::B256;
use futures::{stream, StreamExt};
use serde::Serialize;
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{select, time::interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{chain::ChainClient, signer::SignedPayload};

/// Default number of in-flight submissions.
pub const DEFAULT_WIDTH: usize = 50;

/// Default per-request submission timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// What the node said about one payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SubmissionOutcome {
    Accepted { hash: B256 },
    Rejected { reason: String },
}

impl SubmissionOutcome {
    pub fn hash(&self) -> Option<B256> {
        match self {
            Self::Accepted { hash } => Some(*hash),
            Self::Rejected { .. } => None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Outcome of one payload, keyed by its burst index and nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRecord {
    pub index: usize,
    pub nonce: u64,
    #[serde(flatten)]
    pub outcome: SubmissionOutcome,
}

/// Fixed-width pool that sends signed payloads to the chain.
#[derive(Debug, Clone, Copy)]
pub struct SubmissionPool {
    width: usize,
    request_timeout: Duration,
}

impl Default for SubmissionPool {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH, DEFAULT_REQUEST_TIMEOUT)
    }
}

impl SubmissionPool {
    /// A zero width is treated as one.
    pub fn new(width: usize, request_timeout: Duration) -> Self {
        Self {
            width: width.max(1),
            request_timeout,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Sends every payload and returns one record per payload, sorted by
    /// burst index.
    pub async fn submit_all<C>(
        &self,
        chain: &C,
        payloads: Vec<SignedPayload>,
    ) -> Vec<SubmissionRecord>
    where
        C: ChainClient + ?Sized,
    {
        let total = payloads.len();
        info!(transactions = total, width = self.width, "Sending transactions");

        let sent = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let _drop_guard = cancel.clone().drop_guard();
        tokio::spawn(monitor_progress(sent.clone(), total, cancel.clone()));

        let timeout = self.request_timeout;
        let mut records: Vec<SubmissionRecord> = stream::iter(payloads)
            .map(|payload| {
                let sent = sent.clone();
                async move {
                    let result = tokio::time::timeout(timeout, chain.send_raw(&payload.raw)).await;
                    sent.fetch_add(1, Ordering::Relaxed);
                    let outcome = match result {
                        Ok(Ok(hash)) => {
                            if hash != payload.hash {
                                debug!(
                                    %hash,
                                    expected = %payload.hash,
                                    "node reported a different hash"
                                );
                            }
                            SubmissionOutcome::Accepted { hash }
                        }
                        Ok(Err(err)) => {
                            warn!(
                                index = payload.index,
                                nonce = payload.nonce(),
                                %err,
                                "submission rejected"
                            );
                            SubmissionOutcome::Rejected {
                                reason: err.to_string(),
                            }
                        }
                        Err(_) => {
                            warn!(
                                index = payload.index,
                                nonce = payload.nonce(),
                                "submission timed out"
                            );
                            SubmissionOutcome::Rejected {
                                reason: format!("no response within {timeout:?}"),
                            }
                        }
                    };
                    SubmissionRecord {
                        index: payload.index,
                        nonce: payload.nonce(),
                        outcome,
                    }
                }
            })
            .buffer_unordered(self.width)
            .collect()
            .await;
        records.sort_unstable_by_key(|record| record.index);

        let accepted = records.iter().filter(|r| r.outcome.is_accepted()).count();
        info!(
            accepted,
            rejected = records.len() - accepted,
            "Finished sending transactions"
        );
        records
    }
}

async fn monitor_progress(sent: Arc<AtomicUsize>, total: usize, token: CancellationToken) {
    let mut ticker = interval(Duration::from_secs(1));
    let mut last = 0;
    loop {
        select! {
            _ = ticker.tick() => {
                let current = sent.load(Ordering::Relaxed);
                if current != last {
                    info!(per_second = current - last, sent = current, total, "Status");
                    last = current;
                }
                if current >= total {
                    break;
                }
            }
            _ = token.cancelled() => break,
        }
    }
}
