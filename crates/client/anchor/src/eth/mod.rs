//! JSON-RPC implementations of the collaborator traits, backed by alloy HTTP providers.

use crate::anchor::{Anchor, AnchorSettings};
use crate::client::{AnchorContract, AuthorizationMode, BlockHeader, ChainClient, CommitReceipt};
use crate::config::AnchorConfig;
use crate::contracts::{ContractInterfaceProvider, ANCHOR_CONTRACT, ORGANIZATION_CONTRACT};
use crate::error::{AnchorResult, ChainError};
use crate::eth::Organization::OrganizationInstance;
use crate::eth::StateRootAnchor::StateRootAnchorInstance;
use crate::tx_options::ResolvedTxOptions;
use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{Provider, ProviderBuilder, ReqwestProvider, RootProvider};
use alloy::rpc::types::{BlockTransactionsKind, TransactionReceipt};
use alloy::sol;
use alloy::transports::http::{Client, Http};
use alloy::transports::{RpcError, TransportErrorKind};
use async_trait::async_trait;
use futures::future::join_all;
use mp_utils::{stopwatch_end, PerfStopwatch};
use std::sync::Arc;
use url::Url;

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface StateRootAnchor {
        function anchorStateRoot(uint256 _blockHeight, bytes32 _stateRoot) external returns (bool success_);
        function getLatestStateRootBlockHeight() external view returns (uint256 height_);
        function getRemoteChainId() external view returns (uint256 remoteChainId_);
        function getStateRoot(uint256 _blockHeight) external view returns (bytes32 stateRoot_);
        function organization() external view returns (address);

        event StateRootAvailable(uint256 _blockHeight, bytes32 _stateRoot);
    }
}

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface Organization {
        function isOrganization(address _organization) external view returns (bool isOrganization_);
        function isWorker(address _worker) external view returns (bool isWorker_);
    }
}

/// Functions the engine calls, checked against the registered ABIs at connect time.
const ANCHOR_FUNCTIONS: &[&str] =
    &["anchorStateRoot", "getLatestStateRootBlockHeight", "getRemoteChainId", "organization"];
const ORGANIZATION_FUNCTIONS: &[&str] = &["isOrganization", "isWorker"];

impl From<RpcError<TransportErrorKind>> for ChainError {
    fn from(err: RpcError<TransportErrorKind>) -> Self {
        Self::Rpc(err.to_string())
    }
}

impl From<alloy::contract::Error> for ChainError {
    fn from(err: alloy::contract::Error) -> Self {
        Self::Contract(err.to_string())
    }
}

fn u256_to_u64(value: U256, what: &str) -> Result<u64, ChainError> {
    u64::try_from(value).map_err(|e| ChainError::Conversion(format!("{what} {value} does not fit in u64: {e}")))
}

#[derive(Clone)]
pub struct EthereumChainClient {
    provider: Arc<ReqwestProvider>,
}

impl EthereumChainClient {
    pub fn new(url: Url) -> Self {
        Self { provider: Arc::new(ProviderBuilder::new().on_http(url)) }
    }

    pub fn provider(&self) -> &ReqwestProvider {
        &self.provider
    }
}

#[async_trait]
impl ChainClient for EthereumChainClient {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(self.provider.get_chain_id().await?)
    }

    async fn current_height(&self) -> Result<u64, ChainError> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn get_block(&self, height: u64) -> Result<Option<BlockHeader>, ChainError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(height), BlockTransactionsKind::Hashes)
            .await?;
        Ok(block.map(|block| BlockHeader {
            height: block.header.number,
            state_root: block.header.state_root,
            timestamp: block.header.timestamp,
        }))
    }

    async fn batch_get_blocks(&self, heights: Vec<u64>) -> Vec<(u64, Option<BlockHeader>)> {
        let sw = PerfStopwatch::new();
        let requested = heights.len();
        let settled = join_all(heights.into_iter().map(|height| async move {
            match self.get_block(height).await {
                Ok(block) => (height, block),
                Err(err) => {
                    tracing::warn!(height, error = %err, "Failed to fetch sampled block");
                    (height, None)
                }
            }
        }))
        .await;
        stopwatch_end!(sw, "Fetched {requested} blocks in {:?}");
        settled
    }

    async fn has_code(&self, address: Address) -> Result<bool, ChainError> {
        Ok(!self.provider.get_code_at(address).await?.is_empty())
    }
}

fn commit_receipt(receipt: &TransactionReceipt) -> CommitReceipt {
    CommitReceipt {
        transaction_hash: receipt.transaction_hash,
        block_number: receipt.block_number,
        block_hash: receipt.block_hash,
        gas_used: u64::try_from(receipt.gas_used).unwrap_or(u64::MAX),
        status: receipt.status(),
    }
}

/// Anchor contract binding. Transactions are signed by the destination node for the `from`
/// account, which must therefore be unlocked there.
#[derive(Debug)]
pub struct EthereumAnchorContract {
    provider: RootProvider<Http<Client>>,
    anchor: StateRootAnchorInstance<Http<Client>, RootProvider<Http<Client>>>,
}

impl EthereumAnchorContract {
    /// Binds to the contract at `address`, refusing registered ABIs that lack a function we call.
    pub fn connect(
        provider: RootProvider<Http<Client>>,
        address: Address,
        interfaces: &dyn ContractInterfaceProvider,
    ) -> AnchorResult<Self> {
        interfaces.interface_for(ANCHOR_CONTRACT)?.require_functions(ANCHOR_CONTRACT, ANCHOR_FUNCTIONS)?;
        interfaces
            .interface_for(ORGANIZATION_CONTRACT)?
            .require_functions(ORGANIZATION_CONTRACT, ORGANIZATION_FUNCTIONS)?;

        let anchor = StateRootAnchor::new(address, provider.clone());
        Ok(Self { provider, anchor })
    }

    async fn organization(&self) -> Result<OrganizationInstance<Http<Client>, RootProvider<Http<Client>>>, ChainError> {
        let address = self.anchor.organization().call().await?._0;
        Ok(Organization::new(address, self.provider.clone()))
    }

    /// State root anchored for `height`, zero if none was.
    pub async fn state_root(&self, height: u64) -> Result<B256, ChainError> {
        Ok(self.anchor.getStateRoot(U256::from(height)).call().await?.stateRoot_)
    }
}

#[async_trait]
impl AnchorContract for EthereumAnchorContract {
    fn address(&self) -> Address {
        *self.anchor.address()
    }

    async fn remote_chain_id(&self) -> Result<u64, ChainError> {
        u256_to_u64(self.anchor.getRemoteChainId().call().await?.remoteChainId_, "remote chain id")
    }

    async fn latest_state_root_block_height(&self) -> Result<u64, ChainError> {
        u256_to_u64(self.anchor.getLatestStateRootBlockHeight().call().await?.height_, "anchored height")
    }

    async fn is_authorized(&self, signer: Address, mode: AuthorizationMode) -> Result<bool, ChainError> {
        let organization = self.organization().await?;
        let authorized = match mode {
            AuthorizationMode::Organization => organization.isOrganization(signer).call().await?.isOrganization_,
            AuthorizationMode::Worker => organization.isWorker(signer).call().await?.isWorker_,
        };
        Ok(authorized)
    }

    async fn submit_state_root(
        &self,
        height: u64,
        state_root: B256,
        tx_options: &ResolvedTxOptions,
    ) -> Result<B256, ChainError> {
        let pending = self
            .anchor
            .anchorStateRoot(U256::from(height), state_root)
            .from(tx_options.from)
            .gas(tx_options.gas_limit)
            .gas_price(tx_options.gas_price)
            .send()
            .await?;
        Ok(*pending.tx_hash())
    }

    async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<CommitReceipt>, ChainError> {
        let receipt = self.provider.get_transaction_receipt(tx_hash).await?;
        Ok(receipt.as_ref().map(commit_receipt))
    }
}

/// Builds an [`Anchor`] talking JSON-RPC to both chains.
pub fn connect_anchor(config: &AnchorConfig, interfaces: &dyn ContractInterfaceProvider) -> AnchorResult<Anchor> {
    let source = EthereumChainClient::new(config.source_rpc_url.clone());
    let destination = EthereumChainClient::new(config.destination_rpc_url.clone());
    let contract =
        EthereumAnchorContract::connect(destination.provider().clone(), config.contract_address, interfaces)?;

    tracing::info!(
        "⚓ Anchoring {} into contract {} on {}",
        config.source_rpc_url,
        config.contract_address,
        config.destination_rpc_url
    );

    let settings: AnchorSettings = config.settings.clone();
    Anchor::new(Arc::new(source), Arc::new(destination), Arc::new(contract), settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{BundledInterfaces, ContractInterface};
    use crate::error::AnchorError;
    use alloy::json_abi::JsonAbi;
    use alloy::primitives::Bytes;
    use assert_matches::assert_matches;
    use httpmock::prelude::*;
    use serde_json::json;

    async fn rpc_server(method: &str, result: serde_json::Value) -> MockServer {
        let server = MockServer::start_async().await;
        let method = method.to_string();
        server
            .mock_async(|when, then| {
                when.method(POST).body_contains(method);
                then.status(200).header("content-type", "application/json").json_body(json!({
                    "jsonrpc": "2.0",
                    "id": 0,
                    "result": result,
                }));
            })
            .await;
        server
    }

    fn client(server: &MockServer) -> EthereumChainClient {
        EthereumChainClient::new(server.url("/").parse().unwrap())
    }

    #[tokio::test]
    async fn reads_chain_id_and_height() {
        let server = rpc_server("eth_chainId", json!("0x5")).await;
        assert_eq!(client(&server).chain_id().await.unwrap(), 5);

        let server = rpc_server("eth_blockNumber", json!("0x10d4f")).await;
        assert_eq!(client(&server).current_height().await.unwrap(), 68943);
    }

    #[tokio::test]
    async fn unknown_block_is_absent() {
        let server = rpc_server("eth_getBlockByNumber", serde_json::Value::Null).await;
        assert_eq!(client(&server).get_block(1_000_000).await.unwrap(), None);
    }

    #[tokio::test]
    async fn block_header_fields_are_extracted() {
        let state_root = B256::repeat_byte(0xab);
        let zero_hash = B256::ZERO;
        let server = rpc_server(
            "eth_getBlockByNumber",
            json!({
                "hash": B256::repeat_byte(0x01),
                "parentHash": zero_hash,
                "sha3Uncles": zero_hash,
                "miner": Address::ZERO,
                "stateRoot": state_root,
                "transactionsRoot": zero_hash,
                "receiptsRoot": zero_hash,
                "logsBloom": format!("0x{}", "0".repeat(512)),
                "difficulty": "0x0",
                "number": "0x2a",
                "gasLimit": "0x1c9c380",
                "gasUsed": "0x0",
                "timestamp": "0x65b0c7d0",
                "extraData": "0x",
                "mixHash": zero_hash,
                "nonce": "0x0000000000000000",
                "uncles": [],
                "transactions": []
            }),
        )
        .await;

        let block = client(&server).get_block(42).await.unwrap().unwrap();
        assert_eq!(block, BlockHeader { height: 42, state_root, timestamp: 0x65b0c7d0 });
    }

    #[tokio::test]
    async fn rpc_errors_are_chain_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200).header("content-type", "application/json").json_body(json!({
                    "jsonrpc": "2.0",
                    "id": 0,
                    "error": { "code": -32000, "message": "header not found" },
                }));
            })
            .await;

        assert_matches!(
            client(&server).current_height().await,
            Err(ChainError::Rpc(message)) if message.contains("header not found")
        );
    }

    #[tokio::test]
    async fn failed_samples_are_reported_absent() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(500);
            })
            .await;

        let settled = client(&server).batch_get_blocks(vec![7, 8]).await;
        assert_eq!(settled, vec![(7, None), (8, None)]);
    }

    #[test]
    fn receipt_fields_are_extracted() {
        let tx_hash = B256::repeat_byte(0x77);
        let block_hash = B256::repeat_byte(0x01);
        let receipt: TransactionReceipt = serde_json::from_value(json!({
            "type": "0x2",
            "status": "0x0",
            "cumulativeGasUsed": "0x1e8480",
            "logs": [],
            "logsBloom": format!("0x{}", "0".repeat(512)),
            "transactionHash": tx_hash,
            "transactionIndex": "0x0",
            "blockHash": block_hash,
            "blockNumber": "0x2a",
            "gasUsed": "0x5208",
            "effectiveGasPrice": "0x3b9aca00",
            "from": Address::repeat_byte(0xaa),
            "to": Address::repeat_byte(0xc0),
            "contractAddress": null
        }))
        .unwrap();

        assert_eq!(
            commit_receipt(&receipt),
            CommitReceipt {
                transaction_hash: tx_hash,
                block_number: Some(42),
                block_hash: Some(block_hash),
                gas_used: 21_000,
                status: false,
            }
        );
    }

    #[tokio::test]
    async fn empty_code_means_not_deployed() {
        let server = rpc_server("eth_getCode", json!("0x")).await;
        assert!(!client(&server).has_code(Address::repeat_byte(0x42)).await.unwrap());
    }

    #[test]
    fn connect_checks_registered_abis() {
        let provider = ProviderBuilder::new().on_http("http://localhost:8545".parse().unwrap());
        let address = Address::repeat_byte(0xc0);

        let bundled = BundledInterfaces::new().unwrap();
        let contract = EthereumAnchorContract::connect(provider.clone(), address, &bundled).unwrap();
        assert_eq!(contract.address(), address);

        let mut stripped = BundledInterfaces::new().unwrap();
        stripped.register(ANCHOR_CONTRACT, ContractInterface { abi: JsonAbi::new(), bytecode: Bytes::new() });
        assert_matches!(EthereumAnchorContract::connect(provider, address, &stripped), Err(AnchorError::Config(_)));
    }
}
