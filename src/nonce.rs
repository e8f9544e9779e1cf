//! Nonce allocation for a burst of transactions from one sender.
//!
//! The chain is asked exactly once per run. Every payload then gets
//! `base + i`, so a burst of N calls covers `[base, base + N)` with no gaps
//! and no duplicates even though the payloads are submitted concurrently.

use alloy_primitives::Address;
use tracing::debug;

use crate::chain::{ChainClient, RpcError};

/// A contiguous range of nonces `[start, start + len)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonceRange {
    start: u64,
    len: usize,
}

impl NonceRange {
    pub fn new(start: u64, len: usize) -> Self {
        Self { start, len }
    }

    /// First nonce of the range.
    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// One past the last nonce of the range.
    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.len as u64)
    }

    /// Nonce for the `index`-th payload of the burst.
    pub fn get(&self, index: usize) -> Option<u64> {
        (index < self.len).then(|| self.start + index as u64)
    }

    /// All nonces in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u64> {
        self.start..self.end()
    }
}

/// Assigns nonces to a burst of calls from one sender.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonceAllocator;

impl NonceAllocator {
    /// Queries the pending transaction count of `sender` once and reserves
    /// `count` consecutive nonces starting there.
    ///
    /// A failed query aborts the run before anything is signed; there is no
    /// partial allocation.
    pub async fn allocate<C>(
        chain: &C,
        sender: Address,
        count: usize,
    ) -> Result<NonceRange, RpcError>
    where
        C: ChainClient + ?Sized,
    {
        let base = chain.get_nonce(sender).await?;
        let range = NonceRange::new(base, count);
        debug!(%sender, start = range.start(), end = range.end(), "allocated nonces");
        Ok(range)
    }
}
