//! ABI and bytecode lookup for the contracts the anchor talks to.
//!
//! The `Anchor` and `Organization` artifacts ship with the crate (ABI only, creation bytecode is
//! empty since deployment is not this crate's business). Further artifacts can be registered
//! from Truffle/Hardhat (`"bytecode": "0x.."`) or Foundry (`"bytecode": {"object": "0x.."}`)
//! build outputs.

use crate::error::{AnchorError, AnchorResult};
use alloy::json_abi::JsonAbi;
use alloy::primitives::Bytes;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

pub const ANCHOR_CONTRACT: &str = "Anchor";
pub const ORGANIZATION_CONTRACT: &str = "Organization";

const ANCHOR_ARTIFACT: &str = include_str!("../res/Anchor.json");
const ORGANIZATION_ARTIFACT: &str = include_str!("../res/Organization.json");

#[derive(Debug, Clone, PartialEq)]
pub struct ContractInterface {
    pub abi: JsonAbi,
    pub bytecode: Bytes,
}

impl ContractInterface {
    /// Fails unless every function in `names` is declared by the ABI.
    pub fn require_functions(&self, contract_name: &str, names: &[&str]) -> AnchorResult<()> {
        let missing: Vec<&str> = names.iter().copied().filter(|name| self.abi.function(name).is_none()).collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AnchorError::Config(format!("{contract_name} ABI does not declare: {}", missing.join(", "))))
        }
    }
}

pub trait ContractInterfaceProvider: Send + Sync {
    fn interface_for(&self, contract_name: &str) -> AnchorResult<ContractInterface>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ArtifactBytecode {
    Hex(Bytes),
    Foundry { object: Bytes },
}

#[derive(Deserialize)]
struct Artifact {
    #[serde(rename = "contractName", default)]
    contract_name: Option<String>,
    abi: JsonAbi,
    #[serde(default)]
    bytecode: Option<ArtifactBytecode>,
}

/// In-memory artifact registry, keyed by case-insensitive contract name.
#[derive(Debug, Clone, Default)]
pub struct BundledInterfaces {
    interfaces: HashMap<String, ContractInterface>,
}

impl BundledInterfaces {
    /// Registry preloaded with the artifacts shipped with this crate.
    pub fn new() -> AnchorResult<Self> {
        let mut this = Self::default();
        this.register_artifact_json(Some(ANCHOR_CONTRACT), ANCHOR_ARTIFACT)?;
        this.register_artifact_json(Some(ORGANIZATION_CONTRACT), ORGANIZATION_ARTIFACT)?;
        Ok(this)
    }

    pub fn register(&mut self, contract_name: &str, interface: ContractInterface) {
        self.interfaces.insert(contract_name.to_ascii_lowercase(), interface);
    }

    /// Registers a build artifact. `contract_name` takes precedence over the artifact's own
    /// `contractName`; one of the two must be present. Returns the name it was registered under.
    pub fn register_artifact_json(&mut self, contract_name: Option<&str>, json: &str) -> AnchorResult<String> {
        let artifact: Artifact = serde_json::from_str(json)
            .map_err(|e| AnchorError::Config(format!("Failed to decode contract artifact: {e}")))?;

        let name = contract_name
            .map(str::to_string)
            .or(artifact.contract_name)
            .ok_or_else(|| AnchorError::Config("Contract artifact has no name".into()))?;

        let bytecode = match artifact.bytecode {
            Some(ArtifactBytecode::Hex(bytes)) | Some(ArtifactBytecode::Foundry { object: bytes }) => bytes,
            None => Bytes::new(),
        };

        self.register(&name, ContractInterface { abi: artifact.abi, bytecode });
        Ok(name)
    }

    pub fn register_artifact_file(&mut self, path: &Path) -> AnchorResult<String> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| AnchorError::Config(format!("Failed to read contract artifact {}: {e}", path.display())))?;
        let fallback_name = path.file_stem().and_then(|stem| stem.to_str());
        let artifact_name = serde_json::from_str::<serde_json::Value>(&json)
            .ok()
            .and_then(|value| value.get("contractName").and_then(|name| name.as_str()).map(str::to_string));
        match artifact_name {
            Some(_) => self.register_artifact_json(None, &json),
            None => self.register_artifact_json(fallback_name, &json),
        }
    }
}

impl ContractInterfaceProvider for BundledInterfaces {
    fn interface_for(&self, contract_name: &str) -> AnchorResult<ContractInterface> {
        self.interfaces
            .get(&contract_name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| AnchorError::Config(format!("No interface registered for contract '{contract_name}'")))
    }
}
