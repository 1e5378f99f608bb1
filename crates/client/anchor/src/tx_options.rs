//! Transaction options for the commit transaction.
//!
//! Options come in three layers, highest precedence first:
//!
//! 1. call-time overrides passed to [`crate::Anchor::commit`],
//! 2. the instance layer configured on the [`crate::Anchor`],
//! 3. hardcoded fallbacks ([`DEFAULT_GAS_PRICE`], [`DEFAULT_GAS_LIMIT`], and the authorized
//!    signer as sender).
//!
//! Each field is resolved independently: a call-time layer that only sets `gas_limit` still
//! inherits the instance gas price.

use crate::error::{AnchorError, AnchorResult};
use alloy::primitives::Address;

/// 0x5B9ACA00 wei.
pub const DEFAULT_GAS_PRICE: u128 = 1_536_870_912;
pub const DEFAULT_GAS_LIMIT: u64 = 5_000_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxOptions {
    pub gas_price: Option<u128>,
    pub gas_limit: Option<u64>,
    pub from: Option<Address>,
}

impl TxOptions {
    pub fn with_gas_price(mut self, gas_price: u128) -> Self {
        self.gas_price = Some(gas_price);
        self
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    pub fn with_from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    /// Field-wise merge: values set on `self` win, holes are filled from `lower`.
    pub fn or(self, lower: &TxOptions) -> TxOptions {
        TxOptions {
            gas_price: self.gas_price.or(lower.gas_price),
            gas_limit: self.gas_limit.or(lower.gas_limit),
            from: self.from.or(lower.from),
        }
    }
}

/// Fully resolved options, ready to be attached to a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTxOptions {
    pub gas_price: u128,
    pub gas_limit: u64,
    pub from: Address,
}

/// Resolves the effective options for one submission.
///
/// Fails with [`AnchorError::Config`] when the resolved sender is the zero address or differs
/// from `signer`: the contract only accepts commits from the authorized signer.
pub fn resolve(call: Option<&TxOptions>, instance: &TxOptions, signer: Address) -> AnchorResult<ResolvedTxOptions> {
    let fallback =
        TxOptions { gas_price: Some(DEFAULT_GAS_PRICE), gas_limit: Some(DEFAULT_GAS_LIMIT), from: Some(signer) };
    let merged = call.copied().unwrap_or_default().or(instance).or(&fallback);

    let from = merged.from.unwrap_or(signer);
    if from.is_zero() {
        return Err(AnchorError::Config("Mandatory parameter 'from' is missing or invalid".into()));
    }
    if from != signer {
        return Err(AnchorError::Config(format!("Sender {from} does not match the authorized signer {signer}")));
    }

    Ok(ResolvedTxOptions {
        gas_price: merged.gas_price.unwrap_or(DEFAULT_GAS_PRICE),
        gas_limit: merged.gas_limit.unwrap_or(DEFAULT_GAS_LIMIT),
        from,
    })
}
