use crate::anchor::{AnchorSettings, DEFAULT_CONFIRMATION_DEPTH};
use crate::client::AuthorizationMode;
use crate::error::{AnchorError, AnchorResult};
use crate::job::{JobConfig, DEFAULT_COLLATE_FACTOR, DEFAULT_ITERATIONS};
use crate::tx_options::TxOptions;
use alloy::primitives::Address;
use anyhow::Context;
use clap::Args;
use mp_utils::parsers::{parse_address, parse_duration, parse_url};
use std::time::Duration;
use url::Url;

/// Everything needed to build an [`crate::Anchor`] over JSON-RPC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorConfig {
    pub source_rpc_url: Url,
    pub destination_rpc_url: Url,
    pub contract_address: Address,
    pub settings: AnchorSettings,
}

/// Parameters used to configure the anchor.
#[derive(Debug, Clone, Args)]
pub struct AnchorParams {
    /// JSON-RPC endpoint of the chain whose state roots are anchored.
    #[arg(env = "ANCHOR_SOURCE_RPC_URL", long, default_value = "http://localhost:8545")]
    pub source_rpc_url: String,

    /// JSON-RPC endpoint of the chain hosting the anchor contract.
    #[arg(env = "ANCHOR_DESTINATION_RPC_URL", long, default_value = "http://localhost:8546")]
    pub destination_rpc_url: String,

    /// Address of the anchor contract on the destination chain.
    #[arg(env = "ANCHOR_CONTRACT_ADDRESS", long)]
    pub anchor_contract_address: String,

    /// Account submitting the commits. It must be unlocked on the destination node and
    /// authorized by the anchor's organization.
    #[arg(env = "ANCHOR_SIGNER_ADDRESS", long)]
    pub anchor_signer_address: String,

    /// Number of blocks behind the source chain tip considered final.
    #[arg(env = "ANCHOR_CONFIRMATIONS", long, default_value_t = DEFAULT_CONFIRMATION_DEPTH)]
    pub anchor_confirmations: u64,

    /// Gas price of commit transactions, in wei.
    #[arg(env = "ANCHOR_GAS_PRICE", long)]
    pub anchor_gas_price: Option<u128>,

    /// Gas limit of commit transactions.
    #[arg(env = "ANCHOR_GAS_LIMIT", long)]
    pub anchor_gas_limit: Option<u64>,

    /// Which organization check the signer must pass.
    #[arg(env = "ANCHOR_AUTHORIZATION", long, value_enum, default_value_t = AuthorizationMode::Organization)]
    pub anchor_authorization: AuthorizationMode,

    /// Timeout of a single JSON-RPC request.
    #[arg(env = "ANCHOR_REQUEST_TIMEOUT", long, value_parser = parse_duration, default_value = "30s")]
    pub anchor_request_timeout: Duration,

    /// How often the receipt of a commit is polled.
    #[arg(env = "ANCHOR_RECEIPT_POLL_INTERVAL", long, value_parser = parse_duration, default_value = "1s")]
    pub anchor_receipt_poll_interval: Duration,

    /// How long to wait for the receipt of a commit.
    #[arg(env = "ANCHOR_RECEIPT_TIMEOUT", long, value_parser = parse_duration, default_value = "120s")]
    pub anchor_receipt_timeout: Duration,
}

fn config_error(err: anyhow::Error) -> AnchorError {
    AnchorError::Config(format!("{err:#}"))
}

impl AnchorParams {
    pub fn as_anchor_config(&self) -> AnchorResult<AnchorConfig> {
        let source_rpc_url =
            parse_url(&self.source_rpc_url).context("Invalid source RPC url").map_err(config_error)?;
        let destination_rpc_url =
            parse_url(&self.destination_rpc_url).context("Invalid destination RPC url").map_err(config_error)?;
        let contract_address =
            parse_address(&self.anchor_contract_address).context("Invalid anchor contract").map_err(config_error)?;
        let signer = parse_address(&self.anchor_signer_address).context("Invalid signer").map_err(config_error)?;

        let tx_options = TxOptions { gas_price: self.anchor_gas_price, gas_limit: self.anchor_gas_limit, from: None };
        let settings = AnchorSettings {
            signer,
            confirmation_depth: self.anchor_confirmations,
            tx_options,
            authorization_mode: self.anchor_authorization,
            request_timeout: self.anchor_request_timeout,
            receipt_poll_interval: self.anchor_receipt_poll_interval,
            receipt_timeout: self.anchor_receipt_timeout,
        };

        Ok(AnchorConfig { source_rpc_url, destination_rpc_url, contract_address, settings })
    }
}

/// Parameters used to configure the anchoring job.
#[derive(Debug, Clone, Args)]
pub struct JobParams {
    /// Number of commits after which the job stops.
    #[arg(env = "ANCHOR_ITERATIONS", long, default_value_t = DEFAULT_ITERATIONS)]
    pub anchor_iterations: u32,

    /// Delay between two polls of the source chain.
    #[arg(env = "ANCHOR_INTERVAL", long, value_parser = parse_duration, default_value = "1000ms")]
    pub anchor_interval: Duration,

    /// Derive the polling interval from the source chain's average block time instead.
    #[arg(env = "ANCHOR_TUNE_INTERVAL", long)]
    pub anchor_tune_interval: bool,

    /// Lower bound of the block time used for tuning.
    #[arg(env = "ANCHOR_MIN_INTERVAL", long, value_parser = parse_duration, default_value = "1s")]
    pub anchor_min_interval: Duration,

    /// Number of source blocks per tuned polling interval.
    #[arg(env = "ANCHOR_COLLATE", long, default_value_t = DEFAULT_COLLATE_FACTOR)]
    pub anchor_collate: u32,

    /// Number of blocks sampled for tuning. Defaults to twice the confirmation depth.
    #[arg(env = "ANCHOR_SAMPLE_SIZE", long)]
    pub anchor_sample_size: Option<u64>,
}

impl JobParams {
    pub fn as_job_config(&self) -> JobConfig {
        JobConfig {
            iterations: self.anchor_iterations,
            polling_interval: self.anchor_interval,
            tune_polling_interval: self.anchor_tune_interval,
            min_polling_interval: self.anchor_min_interval,
            collate_factor: self.anchor_collate,
            sample_size: self.anchor_sample_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::{DEFAULT_RECEIPT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
    use crate::job::DEFAULT_POLLING_INTERVAL;
    use assert_matches::assert_matches;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        anchor: AnchorParams,
        #[command(flatten)]
        job: JobParams,
    }

    const CONTRACT: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
    const SIGNER: &str = "0x00000000000000000000000000000000000000aa";

    fn parse(extra: &[&str]) -> Cli {
        let args = ["anchor", "--anchor-contract-address", CONTRACT, "--anchor-signer-address", SIGNER];
        Cli::try_parse_from(args.iter().chain(extra).copied()).unwrap()
    }

    #[test]
    fn defaults_match_engine_defaults() {
        let cli = parse(&[]);
        let config = cli.anchor.as_anchor_config().unwrap();

        assert_eq!(config.contract_address, parse_address(CONTRACT).unwrap());
        assert_eq!(config.settings.signer, Address::with_last_byte(0xaa));
        assert_eq!(config.settings.confirmation_depth, DEFAULT_CONFIRMATION_DEPTH);
        assert_eq!(config.settings.tx_options, TxOptions::default());
        assert_eq!(config.settings.authorization_mode, AuthorizationMode::Organization);
        assert_eq!(config.settings.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.settings.receipt_timeout, DEFAULT_RECEIPT_TIMEOUT);

        assert_eq!(cli.job.as_job_config(), JobConfig::default());
        assert_eq!(cli.job.as_job_config().polling_interval, DEFAULT_POLLING_INTERVAL);
    }

    #[test]
    fn overrides_are_applied() {
        let cli = parse(&[
            "--anchor-confirmations",
            "6",
            "--anchor-gas-price",
            "1000000000",
            "--anchor-authorization",
            "worker",
            "--anchor-interval",
            "15s",
            "--anchor-tune-interval",
            "--anchor-sample-size",
            "20",
        ]);
        let config = cli.anchor.as_anchor_config().unwrap();
        assert_eq!(config.settings.confirmation_depth, 6);
        assert_eq!(config.settings.tx_options.gas_price, Some(1_000_000_000));
        assert_eq!(config.settings.tx_options.gas_limit, None);
        assert_eq!(config.settings.authorization_mode, AuthorizationMode::Worker);

        let job = cli.job.as_job_config();
        assert_eq!(job.polling_interval, Duration::from_secs(15));
        assert!(job.tune_polling_interval);
        assert_eq!(job.sample_size, Some(20));
    }

    #[test]
    fn invalid_addresses_and_urls_are_config_errors() {
        let mut params = parse(&[]).anchor;
        params.anchor_contract_address = "0x1234".into();
        let err = params.as_anchor_config().unwrap_err();
        assert_matches!(&err, AnchorError::Config(message) if message.contains("Invalid anchor contract"));

        let mut params = parse(&[]).anchor;
        params.destination_rpc_url = "not a url".into();
        assert_matches!(params.as_anchor_config(), Err(AnchorError::Config(_)));
    }
}
