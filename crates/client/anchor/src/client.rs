//! Collaborator interfaces consumed by the anchoring engine.
//!
//! The engine itself never talks JSON-RPC: it goes through [`ChainClient`] for plain chain reads
//! (on both the source and the destination chain) and through [`AnchorContract`] for the typed
//! calls against the deployed anchor contract. The alloy-backed implementations live in
//! [`crate::eth`]; tests use the `mockall` mocks generated here.

use crate::error::ChainError;
use crate::tx_options::ResolvedTxOptions;
use alloy::primitives::{Address, B256};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

/// The subset of a block header the anchor needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockHeader {
    pub height: u64,
    pub state_root: B256,
    /// Unix timestamp, in seconds.
    pub timestamp: u64,
}

/// What the destination chain reports once a commit transaction was included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    pub transaction_hash: B256,
    pub block_number: Option<u64>,
    pub block_hash: Option<B256>,
    pub gas_used: u64,
    pub status: bool,
}

/// Which registry check the anchor's organization contract is asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum AuthorizationMode {
    /// `isOrganization(signer)`: the organization owner or any of its workers.
    #[default]
    Organization,
    /// `isWorker(signer)`: worker membership only.
    Worker,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn chain_id(&self) -> Result<u64, ChainError>;

    async fn current_height(&self) -> Result<u64, ChainError>;

    /// `Ok(None)` when the node does not know the block.
    async fn get_block(&self, height: u64) -> Result<Option<BlockHeader>, ChainError>;

    /// Fetches every height in `heights` and returns once all requests have settled, in any
    /// order. Requests that failed are reported as absent.
    async fn batch_get_blocks(&self, heights: Vec<u64>) -> Vec<(u64, Option<BlockHeader>)>;

    async fn has_code(&self, address: Address) -> Result<bool, ChainError>;
}

/// Typed binding to the anchor contract deployed on the destination chain.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AnchorContract: Send + Sync {
    fn address(&self) -> Address;

    /// Chain id of the source chain, as recorded by the contract at deployment.
    async fn remote_chain_id(&self) -> Result<u64, ChainError>;

    async fn latest_state_root_block_height(&self) -> Result<u64, ChainError>;

    async fn is_authorized(&self, signer: Address, mode: AuthorizationMode) -> Result<bool, ChainError>;

    /// Sends `anchorStateRoot(height, state_root)` and returns the transaction hash as soon as
    /// the node accepted it.
    async fn submit_state_root(
        &self,
        height: u64,
        state_root: B256,
        tx_options: &ResolvedTxOptions,
    ) -> Result<B256, ChainError>;

    /// `Ok(None)` while the transaction is still pending.
    async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<CommitReceipt>, ChainError>;
}
