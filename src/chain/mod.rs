//! The chain collaborator.
//!
//! The harness only needs a narrow slice of an execution node's JSON-RPC
//! surface: nonce and block queries, gas estimation, raw submission and
//! receipt lookups. [`ChainClient`] captures that slice so the load and
//! measurement logic can run against [`JsonRpcClient`] in production and an
//! in-memory chain in tests.

mod rpc;

#[cfg(test)]
pub(crate) mod mock;

pub use rpc::JsonRpcClient;

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Lower bound on the receipt polling step, so a zero interval cannot spin.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Errors returned by the chain collaborator.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The HTTP request could not be completed.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The node answered with a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    /// The node answered with something we could not decode.
    #[error("malformed `{method}` response: {reason}")]
    Decode { method: &'static str, reason: String },
    /// The requested block does not exist (yet).
    #[error("block {0} not found")]
    BlockNotFound(u64),
}

/// Per-block telemetry, fetched read-only for reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockTelemetry {
    pub block_number: u64,
    pub gas_used: u64,
    /// Zero for blocks without a base fee.
    pub base_fee_per_gas: u128,
    pub tx_count: usize,
}

/// The parts of a transaction receipt the harness records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    pub block_number: u64,
    pub gas_used: u64,
    /// Receipt status field; `false` for reverted calls.
    pub success: bool,
}

/// A call used for gas estimation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CallRequest {
    pub from: Address,
    pub to: Address,
    #[serde(rename = "data")]
    pub input: Bytes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
}

/// Chain RPC endpoint as seen by the harness.
///
/// Implementations must be safe to call concurrently from many submission
/// and confirmation futures; the harness adds no locking of its own.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Chain identifier reported by the node.
    async fn chain_id(&self) -> Result<u64, RpcError>;

    /// Number of the latest block.
    async fn block_number(&self) -> Result<u64, RpcError>;

    /// Transaction count for `address` under the `pending` tag, so
    /// transactions that are not yet mined are included.
    async fn get_nonce(&self, address: Address) -> Result<u64, RpcError>;

    /// Base fee of the pending block, if the chain has one.
    async fn pending_base_fee(&self) -> Result<Option<u128>, RpcError>;

    /// Gas estimate for a call.
    async fn estimate_gas(&self, call: &CallRequest) -> Result<u64, RpcError>;

    /// Submits an EIP-2718 encoded signed transaction and returns its hash.
    async fn send_raw(&self, raw: &[u8]) -> Result<B256, RpcError>;

    /// Fetches telemetry for one block.
    async fn get_block(&self, number: u64) -> Result<BlockTelemetry, RpcError>;

    /// Looks a receipt up once; `None` while the transaction is unknown or
    /// not yet mined.
    async fn transaction_receipt(&self, hash: B256)
        -> Result<Option<TransactionReceipt>, RpcError>;

    /// Waits for a receipt, polling every `poll_interval` until `timeout`.
    ///
    /// "Not found yet" is retried until the deadline and then reported as
    /// `Ok(None)`. The last poll happens at the deadline, so the call returns
    /// no earlier than `timeout` and no later than `timeout` plus one poll.
    async fn wait_receipt(
        &self,
        hash: B256,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Option<TransactionReceipt>, RpcError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(receipt) = self.transaction_receipt(hash).await? {
                return Ok(Some(receipt));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            sleep(poll_interval.max(MIN_POLL_INTERVAL).min(deadline - now)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockChain;
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_wait_receipt_times_out_within_one_poll() {
        let chain = MockChain::new(100);
        let timeout = Duration::from_secs(10);
        let poll = Duration::from_secs(3);

        let started = Instant::now();
        let receipt = chain.wait_receipt(B256::repeat_byte(1), timeout, poll).await.unwrap();
        let waited = started.elapsed();

        assert!(receipt.is_none());
        assert!(waited >= timeout);
        assert!(waited <= timeout + poll);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_receipt_zero_poll_interval() {
        let chain = MockChain::new(100);
        let receipt = chain
            .wait_receipt(B256::ZERO, Duration::from_millis(20), Duration::ZERO)
            .await
            .unwrap();
        assert!(receipt.is_none());
    }

    #[test]
    fn test_call_request_serialization() {
        let call = CallRequest {
            from: Address::repeat_byte(0x11),
            to: Address::repeat_byte(0x22),
            input: Bytes::from_static(&[0xde, 0xad]),
            value: None,
        };
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json["data"], "0xdead");
        assert!(json.get("value").is_none());
    }
}
