//! In-memory chain used by the harness tests.
//!
//! Accepted transactions are "mined" immediately into consecutive blocks
//! after the current head, `txs_per_block` at a time, optionally preceded and
//! followed by idle blocks.

use alloy_consensus::{Transaction, TxEnvelope};
use alloy_eips::eip2718::Decodable2718;
use alloy_primitives::{keccak256, Address, B256};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};

use super::{BlockTelemetry, CallRequest, ChainClient, RpcError, TransactionReceipt};

pub(crate) const MOCK_BASE_FEE: u128 = 7_000_000_000;

#[derive(Debug)]
struct State {
    chain_id: u64,
    head: u64,
    nonces: HashMap<Address, u64>,
    nonce_queries: usize,
    fail_nonce_query: bool,
    reject_nonces: HashSet<u64>,
    drop_nonces: HashSet<u64>,
    receipt_error_nonces: HashSet<u64>,
    hang_nonces: HashSet<u64>,
    missing_blocks: HashSet<u64>,
    fail_block_number: bool,
    txs_per_block: usize,
    leading_idle: u64,
    trailing_idle: u64,
    gas_estimate: u64,
    estimate_calls: usize,
    base_fee: Option<u128>,
    blocks: BTreeMap<u64, BlockTelemetry>,
    mined: usize,
    sent: usize,
    last_loaded_block: Option<u64>,
    receipts: HashMap<B256, TransactionReceipt>,
    hash_nonces: HashMap<B256, u64>,
}

#[derive(Debug)]
pub(crate) struct MockChain {
    state: Mutex<State>,
}

impl MockChain {
    pub(crate) fn new(head: u64) -> Self {
        Self {
            state: Mutex::new(State {
                chain_id: 32382,
                head,
                nonces: HashMap::new(),
                nonce_queries: 0,
                fail_nonce_query: false,
                reject_nonces: HashSet::new(),
                drop_nonces: HashSet::new(),
                receipt_error_nonces: HashSet::new(),
                hang_nonces: HashSet::new(),
                missing_blocks: HashSet::new(),
                fail_block_number: false,
                txs_per_block: 4,
                leading_idle: 0,
                trailing_idle: 0,
                gas_estimate: 250_000,
                estimate_calls: 0,
                base_fee: Some(MOCK_BASE_FEE),
                blocks: BTreeMap::new(),
                mined: 0,
                sent: 0,
                last_loaded_block: None,
                receipts: HashMap::new(),
                hash_nonces: HashMap::new(),
            }),
        }
    }

    pub(crate) fn with_nonce(self, address: Address, nonce: u64) -> Self {
        self.state.lock().nonces.insert(address, nonce);
        self
    }

    pub(crate) fn failing_nonce_query(self) -> Self {
        self.state.lock().fail_nonce_query = true;
        self
    }

    /// Submissions carrying these nonces are rejected by the node.
    pub(crate) fn reject_nonces(self, nonces: impl IntoIterator<Item = u64>) -> Self {
        self.state.lock().reject_nonces.extend(nonces);
        self
    }

    /// Submissions carrying these nonces are accepted but never mined.
    pub(crate) fn drop_nonces(self, nonces: impl IntoIterator<Item = u64>) -> Self {
        self.state.lock().drop_nonces.extend(nonces);
        self
    }

    /// Receipt lookups for these nonces fail with an RPC error.
    pub(crate) fn receipt_errors(self, nonces: impl IntoIterator<Item = u64>) -> Self {
        self.state.lock().receipt_error_nonces.extend(nonces);
        self
    }

    /// Submissions carrying these nonces never get an answer.
    pub(crate) fn hang_nonces(self, nonces: impl IntoIterator<Item = u64>) -> Self {
        self.state.lock().hang_nonces.extend(nonces);
        self
    }

    /// Block lookups for these numbers fail as if the node lost them.
    pub(crate) fn missing_blocks(self, numbers: impl IntoIterator<Item = u64>) -> Self {
        self.state.lock().missing_blocks.extend(numbers);
        self
    }

    /// Head queries fail once the first transaction has been mined.
    pub(crate) fn failing_block_number(self) -> Self {
        self.state.lock().fail_block_number = true;
        self
    }

    pub(crate) fn with_txs_per_block(self, txs_per_block: usize) -> Self {
        self.state.lock().txs_per_block = txs_per_block.max(1);
        self
    }

    pub(crate) fn with_idle_edges(self, leading: u64, trailing: u64) -> Self {
        {
            let mut state = self.state.lock();
            state.leading_idle = leading;
            state.trailing_idle = trailing;
        }
        self
    }

    pub(crate) fn with_gas_estimate(self, gas: u64) -> Self {
        self.state.lock().gas_estimate = gas;
        self
    }

    pub(crate) fn with_base_fee(self, base_fee: Option<u128>) -> Self {
        self.state.lock().base_fee = base_fee;
        self
    }

    /// Preloads explicit block telemetry and moves the head to the last one.
    pub(crate) fn with_blocks(self, blocks: impl IntoIterator<Item = BlockTelemetry>) -> Self {
        {
            let mut state = self.state.lock();
            for block in blocks {
                state.head = state.head.max(block.block_number);
                state.blocks.insert(block.block_number, block);
            }
        }
        self
    }

    pub(crate) fn nonce_queries(&self) -> usize {
        self.state.lock().nonce_queries
    }

    pub(crate) fn estimate_calls(&self) -> usize {
        self.state.lock().estimate_calls
    }

    pub(crate) fn sent(&self) -> usize {
        self.state.lock().sent
    }
}

fn rpc_error(message: impl Into<String>) -> RpcError {
    RpcError::Rpc {
        code: -32000,
        message: message.into(),
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn chain_id(&self) -> Result<u64, RpcError> {
        Ok(self.state.lock().chain_id)
    }

    async fn block_number(&self) -> Result<u64, RpcError> {
        let state = self.state.lock();
        if state.fail_block_number && state.last_loaded_block.is_some() {
            return Err(rpc_error("connection reset"));
        }
        Ok(match state.last_loaded_block {
            Some(last) => state.head.max(last + state.trailing_idle),
            None => state.head,
        })
    }

    async fn get_nonce(&self, address: Address) -> Result<u64, RpcError> {
        let mut state = self.state.lock();
        state.nonce_queries += 1;
        if state.fail_nonce_query {
            return Err(rpc_error("connection refused"));
        }
        Ok(state.nonces.get(&address).copied().unwrap_or_default())
    }

    async fn pending_base_fee(&self) -> Result<Option<u128>, RpcError> {
        Ok(self.state.lock().base_fee)
    }

    async fn estimate_gas(&self, _call: &CallRequest) -> Result<u64, RpcError> {
        let mut state = self.state.lock();
        state.estimate_calls += 1;
        Ok(state.gas_estimate)
    }

    async fn send_raw(&self, raw: &[u8]) -> Result<B256, RpcError> {
        let envelope = TxEnvelope::decode_2718(&mut &raw[..])
            .map_err(|err| rpc_error(format!("malformed transaction: {err}")))?;
        let nonce = envelope.nonce();
        let gas = envelope.gas_limit();
        let hash = keccak256(raw);

        let hangs = self.state.lock().hang_nonces.contains(&nonce);
        if hangs {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.lock();
        state.sent += 1;
        if state.reject_nonces.contains(&nonce) {
            return Err(rpc_error("nonce too low"));
        }
        state.hash_nonces.insert(hash, nonce);
        if state.drop_nonces.contains(&nonce) {
            return Ok(hash);
        }

        let number = state.head
            + 1
            + state.leading_idle
            + (state.mined / state.txs_per_block) as u64;
        let base_fee = state.base_fee.unwrap_or_default();
        let block = state.blocks.entry(number).or_insert(BlockTelemetry {
            block_number: number,
            gas_used: 0,
            base_fee_per_gas: base_fee,
            tx_count: 0,
        });
        block.gas_used += gas;
        block.tx_count += 1;
        state.mined += 1;
        state.last_loaded_block = Some(number);
        state.receipts.insert(
            hash,
            TransactionReceipt {
                transaction_hash: hash,
                block_number: number,
                gas_used: gas,
                success: true,
            },
        );
        Ok(hash)
    }

    async fn get_block(&self, number: u64) -> Result<BlockTelemetry, RpcError> {
        let state = self.state.lock();
        if state.missing_blocks.contains(&number) {
            return Err(RpcError::BlockNotFound(number));
        }
        Ok(state.blocks.get(&number).copied().unwrap_or(BlockTelemetry {
            block_number: number,
            gas_used: 0,
            base_fee_per_gas: state.base_fee.unwrap_or_default(),
            tx_count: 0,
        }))
    }

    async fn transaction_receipt(
        &self,
        hash: B256,
    ) -> Result<Option<TransactionReceipt>, RpcError> {
        let state = self.state.lock();
        if let Some(nonce) = state.hash_nonces.get(&hash) {
            if state.receipt_error_nonces.contains(nonce) {
                return Err(rpc_error("header not found"));
            }
        }
        Ok(state.receipts.get(&hash).copied())
    }
}
