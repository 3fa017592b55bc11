//! The node capabilities the checker consumes.
//!
//! [`ChainClient`] is implemented over JSON-RPC by
//! [`EthRpcClient`](crate::rpc_client::EthRpcClient) and by the scripted
//! in-memory chain used in tests.

use std::time::Duration;

use bytes::Bytes;
use ethereum_types::{Address, H256, U256};
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

use crate::error::ClientError;
use crate::signer::SignedTransaction;

/// Subset of block header fields returned by `eth_getBlockByNumber`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub number: u64,
    pub base_fee_per_gas: Option<U256>,
}

/// Receipt status as reported by the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiptStatus {
    Success,
    Failed,
    /// The node does not report a status field (pre-Byzantium receipts).
    #[default]
    Unknown,
}

impl ReceiptStatus {
    pub fn is_failed(self) -> bool {
        self == ReceiptStatus::Failed
    }

    /// Numeric form used in diagnostics, matching the RPC encoding.
    pub fn code(self) -> &'static str {
        match self {
            ReceiptStatus::Success => "1",
            ReceiptStatus::Failed => "0",
            ReceiptStatus::Unknown => "unknown",
        }
    }
}

/// Subset of receipt fields returned by `eth_getTransactionReceipt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_hash: H256,
    pub block_number: Option<u64>,
    pub status: ReceiptStatus,
    pub contract_address: Option<Address>,
}

/// Read-only `eth_call` against the latest block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Address,
    pub to: Address,
    pub gas: u64,
    pub data: Bytes,
}

#[async_trait::async_trait]
pub trait ChainClient: Send + Sync {
    async fn chain_id(&self) -> Result<u64, ClientError>;

    async fn block_number(&self) -> Result<u64, ClientError>;

    /// Header of the latest block.
    async fn latest_header(&self) -> Result<BlockHeader, ClientError>;

    async fn pending_nonce(&self, address: Address) -> Result<u64, ClientError>;

    /// The node's `eth_gasPrice`, unclamped.
    async fn gas_price(&self) -> Result<U256, ClientError>;

    async fn send_raw_transaction(&self, raw: &Bytes) -> Result<H256, ClientError>;

    async fn transaction_receipt(&self, hash: H256) -> Result<Option<Receipt>, ClientError>;

    async fn call(&self, request: &CallRequest) -> Result<Bytes, ClientError>;

    async fn code_at(&self, address: Address) -> Result<Bytes, ClientError>;

    /// Gas price suggestion, raised to the latest base fee when there is one.
    async fn suggest_gas_price(&self) -> Result<U256, ClientError> {
        let price = self.gas_price().await?;
        let header = self.latest_header().await?;
        Ok(match header.base_fee_per_gas {
            Some(base_fee) if base_fee > price => base_fee,
            _ => price,
        })
    }

    /// Submits `tx` and returns the block height observed right after.
    async fn send_signed_tx(&self, tx: &SignedTransaction) -> Result<u64, ClientError> {
        let hash = self.send_raw_transaction(&tx.raw).await?;
        if hash != tx.hash {
            debug!(expected = %tx.hash, reported = %hash, "node reported a different tx hash");
        }
        self.block_number().await
    }

    /// Polls until the chain height is strictly above `started_at`.
    ///
    /// Never returns on its own if the chain stalls; callers bound it with
    /// the run deadline.
    async fn wait_for_next_block(
        &self,
        started_at: u64,
        poll_interval: Duration,
    ) -> Result<u64, ClientError> {
        let mut ticker = time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let current = self.block_number().await?;
            if current > started_at {
                return Ok(current);
            }
        }
    }

    /// Polls until the node returns a receipt for `hash`.
    async fn wait_mined(&self, hash: H256, poll_interval: Duration) -> Result<Receipt, ClientError> {
        let mut ticker = time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Some(receipt) = self.transaction_receipt(hash).await? {
                return Ok(receipt);
            }
        }
    }
}
