//! Run configuration: network, artifacts, finality, fees and the manifest.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Result;
use serde::Deserialize;
use starknet::core::types::Felt;
use url::Url;

use crate::{
    artifacts::FsArtifactStore,
    error::ConfigError,
    felt::{deserialize_felt, deserialize_opt_felt},
    fees::FeeConfig,
    ledger::StarknetLedgerConfig,
    manifest::{ContractSpec, Manifest},
    orchestrator::OrchestratorSettings,
    record::RECORD_FILENAME,
    sequencer,
};

/// Default name of the configuration file.
pub const CONFIG_FILENAME: &str = "Snup.toml";

/// Default directory holding Scarb's compiled artifacts.
pub const DEFAULT_ARTIFACTS_DIR: &str = "target/dev";

/// The account's private key. Never printed.
#[derive(Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PrivateKey(#[serde(deserialize_with = "deserialize_felt")] Felt);

impl PrivateKey {
    pub fn new(felt: Felt) -> Self {
        Self(felt)
    }

    pub fn secret(&self) -> Felt {
        self.0
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

fn default_network_name() -> String {
    "devnet".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Tag written to the record.
    #[serde(default = "default_network_name")]
    pub name: String,
    #[serde(default)]
    pub rpc_url: Option<Url>,
    #[serde(default, deserialize_with = "deserialize_opt_felt")]
    pub account_address: Option<Felt>,
    /// Usually injected through `SNUP_NETWORK__PRIVATE_KEY`.
    #[serde(default)]
    pub private_key: Option<PrivateKey>,
    /// Expected chain id; checked against the node when set.
    #[serde(default, deserialize_with = "deserialize_opt_felt")]
    pub chain_id: Option<Felt>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: default_network_name(),
            rpc_url: None,
            account_address: None,
            private_key: None,
            chain_id: None,
        }
    }
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from(DEFAULT_ARTIFACTS_DIR)
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactsConfig {
    #[serde(default = "default_artifacts_dir")]
    pub dir: PathBuf,
    /// Default artifact file prefix.
    #[serde(default)]
    pub package: Option<String>,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: default_artifacts_dir(),
            package: None,
        }
    }
}

fn default_ceiling_secs() -> u64 {
    300
}

fn default_poll_interval_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct FinalityConfig {
    #[serde(default = "default_ceiling_secs")]
    pub ceiling_secs: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for FinalityConfig {
    fn default() -> Self {
        Self {
            ceiling_secs: default_ceiling_secs(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_record_path() -> PathBuf {
    PathBuf::from(RECORD_FILENAME)
}

/// Complete configuration of a deployment run.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeployConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub finality: FinalityConfig,
    /// Fees used by contracts without an override.
    #[serde(default)]
    pub fees: FeeConfig,
    #[serde(default = "default_record_path")]
    pub record_path: PathBuf,
    /// Skip the declare of classes the node already knows.
    #[serde(default = "default_true")]
    pub check_declared: bool,
    #[serde(default)]
    pub contracts: Vec<ContractSpec>,
}

impl DeployConfig {
    /// Resolve a configuration path that may point at a directory holding
    /// `Snup.toml`.
    pub fn resolve_path(path: &Path) -> Result<PathBuf> {
        if !path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file or directory not found: {}",
                path.display()
            ));
        }

        if path.is_dir() {
            Ok(path.join(CONFIG_FILENAME))
        } else {
            Ok(path.to_path_buf())
        }
    }

    /// Validate the manifest: contract list, references and ordering.
    ///
    /// Needs no network settings, so it can back a dry run.
    pub fn manifest(&self) -> Result<Manifest, ConfigError> {
        let manifest = Manifest::new(self.contracts.clone())?;
        sequencer::sequence(&manifest)?;
        Ok(manifest)
    }

    /// Validate everything a run needs before any network activity.
    pub fn validate(&self) -> Result<Manifest, ConfigError> {
        let manifest = self.manifest()?;
        self.ledger_config()?;

        if self.finality.ceiling_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "finality.ceiling_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.finality.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "finality.poll_interval_secs",
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(manifest)
    }

    /// Connection settings of the Starknet ledger client.
    pub fn ledger_config(&self) -> Result<StarknetLedgerConfig, ConfigError> {
        let network = &self.network;
        Ok(StarknetLedgerConfig {
            rpc_url: network
                .rpc_url
                .clone()
                .ok_or(ConfigError::MissingField("network.rpc_url"))?,
            account_address: network
                .account_address
                .ok_or(ConfigError::MissingField("network.account_address"))?,
            private_key: network
                .private_key
                .ok_or(ConfigError::MissingField("network.private_key"))?
                .secret(),
            chain_id: network.chain_id,
            poll_interval: Duration::from_secs(self.finality.poll_interval_secs),
        })
    }

    pub fn artifact_store(&self) -> FsArtifactStore {
        FsArtifactStore::new(&self.artifacts.dir, self.artifacts.package.clone())
    }

    pub fn settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            network: self.network.name.clone(),
            default_fees: self.fees.clone(),
            finality_ceiling: Duration::from_secs(self.finality.ceiling_secs),
            check_declared: self.check_declared,
        }
    }
}
