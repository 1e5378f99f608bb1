//! State root anchoring.
//!
//! Periodically reads a block at a safe confirmation depth on a source chain and records its
//! height and state root in an anchor contract deployed on a destination chain.
//!
//! - [`Anchor`] validates the contract, picks the committable block and commits it.
//! - [`Job`] drives an [`Anchor`] through a bounded poll loop in the background.
//! - [`block_time`] estimates the source chain's average block time.
//!
//! The chains are accessed through the [`ChainClient`] and [`AnchorContract`] traits; [`eth`]
//! implements them over JSON-RPC.

pub mod anchor;
pub mod block_time;
pub mod client;
pub mod config;
pub mod contracts;
pub mod error;
pub mod eth;
pub mod job;
pub mod metrics;
pub mod tx_options;

pub use anchor::{Anchor, AnchorEvent, AnchorSettings, CommitResult};
pub use client::{AnchorContract, AuthorizationMode, BlockHeader, ChainClient, CommitReceipt};
pub use config::{AnchorConfig, AnchorParams, JobParams};
pub use error::{AnchorError, AnchorResult, ChainError, ValidationError};
pub use job::{Job, JobConfig, JobEvent, JobHandle, JobOutcome, JobState};
pub use tx_options::TxOptions;
