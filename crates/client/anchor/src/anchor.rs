use crate::block_time::{estimate_block_time, BlockTimeInfo};
use crate::client::{AnchorContract, AuthorizationMode, BlockHeader, ChainClient, CommitReceipt};
use crate::error::{AnchorError, AnchorResult, ChainError, ValidationError};
use crate::metrics::ANCHOR_METRICS;
use crate::tx_options::{self, ResolvedTxOptions, TxOptions};
use alloy::primitives::{Address, B256};
use mp_utils::trim_hash;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

pub const DEFAULT_CONFIRMATION_DEPTH: u64 = 24;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(120);

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorSettings {
    pub signer: Address,
    pub confirmation_depth: u64,
    /// Instance layer of the transaction options.
    pub tx_options: TxOptions,
    pub authorization_mode: AuthorizationMode,
    pub request_timeout: Duration,
    pub receipt_poll_interval: Duration,
    pub receipt_timeout: Duration,
}

impl AnchorSettings {
    pub fn new(signer: Address) -> Self {
        Self {
            signer,
            confirmation_depth: DEFAULT_CONFIRMATION_DEPTH,
            tx_options: TxOptions::default(),
            authorization_mode: AuthorizationMode::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            receipt_poll_interval: DEFAULT_RECEIPT_POLL_INTERVAL,
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
        }
    }

    pub fn with_confirmation_depth(mut self, confirmation_depth: u64) -> Self {
        self.confirmation_depth = confirmation_depth;
        self
    }

    pub fn with_tx_options(mut self, tx_options: TxOptions) -> Self {
        self.tx_options = tx_options;
        self
    }

    pub fn with_authorization_mode(mut self, authorization_mode: AuthorizationMode) -> Self {
        self.authorization_mode = authorization_mode;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}

/// Notifications emitted for every submission, in this order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnchorEvent {
    TransactionSubmitted { tx_hash: B256, height: u64 },
    ReceiptConfirmed { receipt: CommitReceipt },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    pub transaction_hash: B256,
    pub receipt: CommitReceipt,
    pub committed_height: u64,
}

/// Target height for the given chain tip, `None` while the chain is shallower than the depth.
pub fn committable_height(current_height: u64, confirmation_depth: u64) -> Option<u64> {
    current_height.checked_sub(confirmation_depth)
}

/// Anchors source chain state roots into one anchor contract on the destination chain.
///
/// The anchor holds no mutable state of its own: every operation reads what it needs from the
/// chains, so operations can run concurrently. The committed height lives in the contract.
pub struct Anchor {
    source: Arc<dyn ChainClient>,
    destination: Arc<dyn ChainClient>,
    contract: Arc<dyn AnchorContract>,
    settings: AnchorSettings,
    events: broadcast::Sender<AnchorEvent>,
}

impl Anchor {
    pub fn new(
        source: Arc<dyn ChainClient>,
        destination: Arc<dyn ChainClient>,
        contract: Arc<dyn AnchorContract>,
        settings: AnchorSettings,
    ) -> AnchorResult<Self> {
        if contract.address().is_zero() {
            return Err(AnchorError::Config("Anchor contract address is missing or invalid".into()));
        }
        if settings.signer.is_zero() {
            return Err(AnchorError::Config("Authorized signer address is missing or invalid".into()));
        }
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self { source, destination, contract, settings, events })
    }

    pub fn settings(&self) -> &AnchorSettings {
        &self.settings
    }

    pub fn contract_address(&self) -> Address {
        self.contract.address()
    }

    /// Receives [`AnchorEvent`]s for submissions started after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<AnchorEvent> {
        self.events.subscribe()
    }

    async fn request<T>(
        &self,
        request: &'static str,
        fut: impl Future<Output = Result<T, ChainError>>,
    ) -> Result<T, ChainError> {
        let after = self.settings.request_timeout;
        tokio::time::timeout(after, fut).await.map_err(|_| ChainError::Timeout { request, after })?
    }

    /// Checks that the contract is deployed, anchors the source chain we read from, and
    /// accepts commits from our signer.
    pub async fn validate(&self) -> AnchorResult<()> {
        let address = self.contract.address();
        tracing::debug!(%address, "Validating anchor contract");

        if !self.request("get_code", self.destination.has_code(address)).await? {
            return Err(ValidationError::ContractNotDeployed(address).into());
        }

        let source_chain_id = self.request("chain_id", self.source.chain_id()).await?;
        let recorded = self.request("getRemoteChainId", self.contract.remote_chain_id()).await?;
        if source_chain_id != recorded {
            tracing::error!(source_chain_id, recorded, "⚓ Anchor contract does not record the source chain");
            return Err(ValidationError::ChainIdMismatch { source_chain_id, recorded }.into());
        }

        let signer = self.settings.signer;
        let mode = self.settings.authorization_mode;
        if !self.request("is_authorized", self.contract.is_authorized(signer, mode)).await? {
            tracing::error!(%signer, ?mode, "⚓ Signer is not authorized by the anchor's organization");
            return Err(ValidationError::UnauthorizedSigner(signer).into());
        }

        tracing::info!("⚓ Anchor contract {address} validated for source chain {source_chain_id}");
        Ok(())
    }

    /// Block at `current height - confirmation depth`, `None` if the chain is not that deep yet.
    pub async fn get_committable_block(&self) -> AnchorResult<Option<BlockHeader>> {
        let current_height = self.request("current_height", self.source.current_height()).await?;
        let Some(target) = committable_height(current_height, self.settings.confirmation_depth) else {
            tracing::debug!(
                current_height,
                confirmation_depth = self.settings.confirmation_depth,
                "No committable block yet"
            );
            return Ok(None);
        };

        let block =
            self.request("get_block", self.source.get_block(target)).await?.ok_or(ChainError::MissingBlock(target))?;
        tracing::debug!(current_height, target, "Committable block fetched");
        Ok(Some(block))
    }

    /// Commits `block`, or the current committable block when `None`.
    ///
    /// Returns `Ok(None)` when no block was given and none is committable yet.
    pub async fn commit(
        &self,
        block: Option<BlockHeader>,
        tx_options: Option<&TxOptions>,
    ) -> AnchorResult<Option<CommitResult>> {
        let options = tx_options::resolve(tx_options, &self.settings.tx_options, self.settings.signer)?;
        let block = match block {
            Some(block) => block,
            None => match self.get_committable_block().await? {
                Some(block) => block,
                None => return Ok(None),
            },
        };
        self.submit(&block, &options).await.map(Some)
    }

    /// Submits `anchorStateRoot(block.height, block.state_root)` and waits for its receipt.
    pub async fn anchor_state_root(
        &self,
        block: &BlockHeader,
        tx_options: Option<&TxOptions>,
    ) -> AnchorResult<CommitResult> {
        let options = tx_options::resolve(tx_options, &self.settings.tx_options, self.settings.signer)?;
        self.submit(block, &options).await
    }

    async fn submit(&self, block: &BlockHeader, options: &ResolvedTxOptions) -> AnchorResult<CommitResult> {
        let started = Instant::now();
        let height = block.height;

        let tx_hash = self
            .request("anchorStateRoot", self.contract.submit_state_root(height, block.state_root, options))
            .await?;
        tracing::info!(
            "⚓ Anchoring state root {} of block #{height} in transaction {}",
            trim_hash(&block.state_root.to_string()),
            trim_hash(&tx_hash.to_string())
        );
        // No subscriber is not an error.
        let _ = self.events.send(AnchorEvent::TransactionSubmitted { tx_hash, height });

        let receipt = self.wait_for_receipt(tx_hash).await?;
        if !receipt.status {
            tracing::error!(%tx_hash, height, "⚓ Anchor transaction reverted");
            return Err(ChainError::Reverted { tx_hash }.into());
        }

        let elapsed = started.elapsed();
        tracing::info!(
            block_number = receipt.block_number,
            gas_used = receipt.gas_used,
            "⚓ State root of block #{height} anchored in {elapsed:?}"
        );
        let _ = self.events.send(AnchorEvent::ReceiptConfirmed { receipt: receipt.clone() });
        ANCHOR_METRICS.record_commit(height, elapsed.as_secs_f64());

        Ok(CommitResult { transaction_hash: tx_hash, receipt, committed_height: height })
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<CommitReceipt, ChainError> {
        let after = self.settings.receipt_timeout;
        tokio::time::timeout(after, self.poll_receipt(tx_hash))
            .await
            .map_err(|_| ChainError::ReceiptTimeout { tx_hash, after })?
    }

    async fn poll_receipt(&self, tx_hash: B256) -> Result<CommitReceipt, ChainError> {
        loop {
            let receipt =
                self.request("get_transaction_receipt", self.contract.transaction_receipt(tx_hash)).await?;
            if let Some(receipt) = receipt {
                return Ok(receipt);
            }
            tokio::time::sleep(self.settings.receipt_poll_interval).await;
        }
    }

    /// Height of the last block anchored in the contract.
    pub async fn get_latest_committed_height(&self) -> AnchorResult<u64> {
        Ok(self.request("getLatestStateRootBlockHeight", self.contract.latest_state_root_block_height()).await?)
    }

    /// Average source block time over `2 * confirmation depth` blocks below the committable boundary.
    pub async fn get_average_source_block_time(&self) -> AnchorResult<BlockTimeInfo> {
        self.estimate_source_block_time(self.settings.confirmation_depth.saturating_mul(2)).await
    }

    pub async fn estimate_source_block_time(&self, sample_size: u64) -> AnchorResult<BlockTimeInfo> {
        let depth = self.settings.confirmation_depth;
        estimate_block_time(self.source.as_ref(), sample_size, depth, self.settings.request_timeout).await
    }
}
