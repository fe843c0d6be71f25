//! Deployment record: what a run declared and deployed, and where.
//!
//! The record is rewritten in full at the end of every run, including runs
//! that stopped on failures, so it always reflects the latest run.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use starknet::core::types::Felt;

use crate::{
    error::{ContractFailure, FailureKind, Stage},
    felt::hex_serde,
    resolver::{ClassOrigin, RecoverySource, ResolvedClass},
};

/// The default file name of the deployment record.
pub const RECORD_FILENAME: &str = "deployments.json";

/// How a class hash of the record was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "source", rename_all = "snake_case")]
pub enum DeclareOrigin {
    Declared,
    Recovered(RecoverySource),
    Cached,
}

impl From<ClassOrigin> for DeclareOrigin {
    fn from(origin: ClassOrigin) -> Self {
        match origin {
            ClassOrigin::Declared { .. } => Self::Declared,
            ClassOrigin::Recovered(source) => Self::Recovered(source),
            ClassOrigin::Cached => Self::Cached,
        }
    }
}

/// A class resolved during the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredClass {
    /// Manifest contract name.
    pub name: String,
    /// Artifact class name.
    pub class: String,
    #[serde(with = "hex_serde")]
    pub class_hash: Felt,
    pub origin: DeclareOrigin,
    /// Declare transaction, when this run submitted one.
    #[serde(with = "hex_serde::option", skip_serializing_if = "Option::is_none", default)]
    pub declare_tx: Option<Felt>,
}

impl DeclaredClass {
    pub fn new(name: &str, class: &str, resolved: &ResolvedClass) -> Self {
        Self {
            name: name.to_string(),
            class: class.to_string(),
            class_hash: resolved.class_hash,
            origin: resolved.origin.into(),
            declare_tx: resolved.declare_transaction(),
        }
    }
}

/// A contract instance whose deploy transaction reached finality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedInstance {
    pub name: String,
    #[serde(with = "hex_serde")]
    pub class_hash: Felt,
    #[serde(with = "hex_serde")]
    pub address: Felt,
    /// Declare transaction, absent when the class was recovered or cached.
    #[serde(with = "hex_serde::option", skip_serializing_if = "Option::is_none", default)]
    pub declare_tx: Option<Felt>,
    #[serde(with = "hex_serde")]
    pub deploy_tx: Felt,
    /// Constructor calldata as submitted, after reference substitution.
    #[serde(default)]
    pub constructor_calldata: Vec<String>,
    /// Finality status reached by the deploy transaction.
    pub finality: String,
}

/// A contract that did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub contract: String,
    pub stage: Stage,
    pub kind: FailureKind,
    pub detail: String,
}

impl From<&ContractFailure> for FailureEntry {
    fn from(failure: &ContractFailure) -> Self {
        Self {
            contract: failure.contract.clone(),
            stage: failure.stage,
            kind: failure.error.kind(),
            detail: failure.error.to_string(),
        }
    }
}

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    /// Every contract completed.
    Complete,
    /// Some contracts completed, others failed.
    Partial,
    /// No contract completed.
    Failed,
}

/// The structured output of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub network: String,
    #[serde(with = "hex_serde::option", skip_serializing_if = "Option::is_none", default)]
    pub chain_id: Option<Felt>,
    #[serde(with = "hex_serde")]
    pub deployer: Felt,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    pub declared: Vec<DeclaredClass>,
    pub contracts: Vec<DeployedInstance>,
    pub failures: Vec<FailureEntry>,
}

impl DeploymentRecord {
    pub fn instance(&self, name: &str) -> Option<&DeployedInstance> {
        self.contracts.iter().find(|instance| instance.name == name)
    }

    pub fn declared_class(&self, name: &str) -> Option<&DeclaredClass> {
        self.declared.iter().find(|declared| declared.name == name)
    }
}

/// Persists the record of a run.
pub trait RecordWriter {
    fn write(&self, record: &DeploymentRecord) -> Result<()>;
}

/// Writes the record as pretty JSON, replacing any previous record.
#[derive(Debug, Clone)]
pub struct JsonRecordWriter {
    path: PathBuf,
}

impl JsonRecordWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RecordWriter for JsonRecordWriter {
    fn write(&self, record: &DeploymentRecord) -> Result<()> {
        let json =
            serde_json::to_string_pretty(record).context("Failed to serialize deployment record")?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .context(format!("Failed to create directory {}", parent.display()))?;
        }

        // Write next to the target and rename so readers never see a torn file.
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json).context(format!(
            "Failed to write deployment record to {}",
            tmp_path.display()
        ))?;
        std::fs::rename(&tmp_path, &self.path).context(format!(
            "Failed to move deployment record to {}",
            self.path.display()
        ))?;

        tracing::info!(
            path = %self.path.display(),
            status = %record.status,
            "Deployment record saved"
        );
        Ok(())
    }
}
