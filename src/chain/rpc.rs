//! JSON-RPC over HTTP implementation of [`ChainClient`].

use alloy_primitives::{Address, B256, U128, U64};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tracing::trace;

use super::{BlockTelemetry, CallRequest, ChainClient, RpcError, TransactionReceipt};

/// Serializes as an empty positional parameter list.
const NO_PARAMS: [(); 0] = [];

/// HTTP JSON-RPC client for an execution node.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct JsonRpcClient {
    client: reqwest::Client,
    url: String,
    next_id: std::sync::Arc<AtomicU64>,
}

impl JsonRpcClient {
    /// Creates a client for `url` with a per-request timeout.
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, RpcError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .pool_max_idle_per_host(100)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            next_id: Default::default(),
        })
    }

    /// The endpoint this client talks to.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn request<P, T>(&self, method: &'static str, params: P) -> Result<T, RpcError>
    where
        P: Serialize + Send,
        T: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = RequestBody {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };
        trace!(id, method, "rpc request");

        let response: ResponseBody = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(RpcError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        serde_json::from_value(response.result).map_err(|err| RpcError::Decode {
            method,
            reason: err.to_string(),
        })
    }
}

#[derive(Serialize)]
struct RequestBody<P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: P,
}

#[derive(Deserialize)]
struct ResponseBody {
    #[serde(default)]
    result: serde_json::Value,
    #[serde(default)]
    error: Option<ErrorObject>,
}

#[derive(Deserialize)]
struct ErrorObject {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBlock {
    #[serde(default)]
    number: Option<U64>,
    gas_used: U64,
    #[serde(default)]
    base_fee_per_gas: Option<U128>,
    #[serde(default)]
    transactions: Vec<serde_json::Value>,
}

impl From<RawBlock> for BlockTelemetry {
    fn from(block: RawBlock) -> Self {
        Self {
            block_number: block.number.map_or(0, |number| number.to()),
            gas_used: block.gas_used.to(),
            base_fee_per_gas: block.base_fee_per_gas.map_or(0, |fee| fee.to()),
            tx_count: block.transactions.len(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: B256,
    block_number: U64,
    gas_used: U64,
    #[serde(default)]
    status: Option<U64>,
}

impl From<RawReceipt> for TransactionReceipt {
    fn from(receipt: RawReceipt) -> Self {
        Self {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number.to(),
            gas_used: receipt.gas_used.to(),
            success: receipt.status.is_some_and(|status| status == U64::from(1)),
        }
    }
}

#[async_trait]
impl ChainClient for JsonRpcClient {
    async fn chain_id(&self) -> Result<u64, RpcError> {
        let id: U64 = self.request("eth_chainId", NO_PARAMS).await?;
        Ok(id.to())
    }

    async fn block_number(&self) -> Result<u64, RpcError> {
        let number: U64 = self.request("eth_blockNumber", NO_PARAMS).await?;
        Ok(number.to())
    }

    async fn get_nonce(&self, address: Address) -> Result<u64, RpcError> {
        let count: U64 = self
            .request("eth_getTransactionCount", (address, "pending"))
            .await?;
        Ok(count.to())
    }

    async fn pending_base_fee(&self) -> Result<Option<u128>, RpcError> {
        let block: Option<RawBlock> = self
            .request("eth_getBlockByNumber", ("pending", false))
            .await?;
        Ok(block.and_then(|block| block.base_fee_per_gas).map(|fee| fee.to()))
    }

    async fn estimate_gas(&self, call: &CallRequest) -> Result<u64, RpcError> {
        let gas: U64 = self.request("eth_estimateGas", (call,)).await?;
        Ok(gas.to())
    }

    async fn send_raw(&self, raw: &[u8]) -> Result<B256, RpcError> {
        let encoded = format!("0x{}", hex::encode(raw));
        self.request("eth_sendRawTransaction", (encoded,)).await
    }

    async fn get_block(&self, number: u64) -> Result<BlockTelemetry, RpcError> {
        let block: Option<RawBlock> = self
            .request("eth_getBlockByNumber", (U64::from(number), true))
            .await?;
        let block = block.ok_or(RpcError::BlockNotFound(number))?;
        Ok(BlockTelemetry {
            block_number: number,
            ..block.into()
        })
    }

    async fn transaction_receipt(
        &self,
        hash: B256,
    ) -> Result<Option<TransactionReceipt>, RpcError> {
        let receipt: Option<RawReceipt> = self
            .request("eth_getTransactionReceipt", (hash,))
            .await?;
        Ok(receipt.map(TransactionReceipt::from))
    }
}
