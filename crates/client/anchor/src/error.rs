use alloy::primitives::{Address, B256};
use std::time::Duration;
use thiserror::Error;

/// Failures talking to either chain. Any of these aborts the current job run.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Contract interaction failed: {0}")]
    Contract(String),

    #[error("Block #{0} is not available on the source chain")]
    MissingBlock(u64),

    #[error("Value conversion error: {0}")]
    Conversion(String),

    #[error("Transaction {tx_hash} was reverted")]
    Reverted { tx_hash: B256 },

    #[error("Request `{request}` timed out after {after:?}")]
    Timeout { request: &'static str, after: Duration },

    #[error("No receipt for transaction {tx_hash} after {after:?}")]
    ReceiptTimeout { tx_hash: B256, after: Duration },
}

/// Failures detected by [`crate::Anchor::validate`], before any polling starts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("chain id mismatch: source chain reports {source_chain_id}, anchor contract records {recorded}")]
    ChainIdMismatch { source_chain_id: u64, recorded: u64 },

    #[error("unauthorized signer: {0} is not permitted by the anchor's organization")]
    UnauthorizedSigner(Address),

    #[error("no contract deployed at {0} on the destination chain")]
    ContractNotDeployed(Address),
}

#[derive(Debug, Error)]
pub enum AnchorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Insufficient data: {received} usable block(s) out of {requested} requested, at least 2 are needed")]
    InsufficientData { requested: usize, received: usize },

    #[error("Job is already executing. Create a new job or wait for the current run to finish")]
    AlreadyRunning,

    #[error("Job task aborted: {0}")]
    Aborted(String),
}

impl AnchorError {
    /// Short static label, used as a metrics attribute.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Validation(_) => "validation",
            Self::Chain(ChainError::Timeout { .. } | ChainError::ReceiptTimeout { .. }) => "timeout",
            Self::Chain(ChainError::Reverted { .. }) => "reverted",
            Self::Chain(_) => "chain",
            Self::InsufficientData { .. } => "insufficient_data",
            Self::AlreadyRunning => "already_running",
            Self::Aborted(_) => "aborted",
        }
    }
}

pub type AnchorResult<T> = Result<T, AnchorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_messages_name_the_failure() {
        let mismatch = AnchorError::from(ValidationError::ChainIdMismatch { source_chain_id: 1, recorded: 5 });
        assert!(mismatch.to_string().contains("chain id mismatch"));

        let unauthorized = AnchorError::from(ValidationError::UnauthorizedSigner(Address::repeat_byte(0x11)));
        assert!(unauthorized.to_string().contains("unauthorized signer"));
    }

    #[test]
    fn kind_labels() {
        assert_eq!(AnchorError::Config("x".into()).kind(), "config");
        assert_eq!(
            AnchorError::from(ChainError::Timeout { request: "get_block", after: Duration::from_secs(1) }).kind(),
            "timeout"
        );
        assert_eq!(AnchorError::from(ChainError::Reverted { tx_hash: B256::ZERO }).kind(), "reverted");
        assert_eq!(AnchorError::from(ChainError::Rpc("boom".into())).kind(), "chain");
        assert_eq!(AnchorError::InsufficientData { requested: 4, received: 1 }.kind(), "insufficient_data");
    }
}
