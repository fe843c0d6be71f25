//! Compiled contract artifacts.
//!
//! Scarb writes two files per contract into its target directory:
//! `<package>_<Class>.contract_class.json` (Sierra) and
//! `<package>_<Class>.compiled_contract_class.json` (CASM).

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use starknet::core::types::{
    Felt, FlattenedSierraClass,
    contract::{CompiledClass, SierraClass},
};

use crate::{error::ArtifactError, ledger::ProgramClass, manifest::ContractSpec};

/// Sierra file suffix.
pub const SIERRA_SUFFIX: &str = "contract_class.json";
/// CASM file suffix.
pub const CASM_SUFFIX: &str = "compiled_contract_class.json";

/// A compiled contract ready to be declared.
#[derive(Debug)]
pub struct ContractArtifact<P> {
    /// Artifact class name.
    pub class: String,
    /// Program representation sent with the declare.
    pub program: Arc<P>,
    /// Compiled class hash sent with the declare.
    pub compiled_class_hash: Felt,
}

impl<P> Clone for ContractArtifact<P> {
    fn clone(&self) -> Self {
        Self {
            class: self.class.clone(),
            program: Arc::clone(&self.program),
            compiled_class_hash: self.compiled_class_hash,
        }
    }
}

/// Source of compiled artifacts.
pub trait ArtifactStore: Send + Sync {
    type Program: ProgramClass;

    /// Load the artifact of `spec`'s class.
    ///
    /// A compiled class hash override on the spec takes precedence over the
    /// one derived from the CASM file, which is then not read at all.
    fn load(&self, spec: &ContractSpec) -> Result<ContractArtifact<Self::Program>, ArtifactError>;

    /// Identity of the artifact `spec` loads. Manifest entries with the same
    /// key share one declaration per run.
    fn artifact_key(&self, spec: &ContractSpec) -> String {
        format!(
            "{}/{}",
            spec.package.as_deref().unwrap_or_default(),
            spec.class_name()
        )
    }
}

impl ProgramClass for FlattenedSierraClass {
    fn compute_class_hash(&self) -> anyhow::Result<Felt> {
        Ok(self.class_hash())
    }
}

/// Artifact store reading Scarb output from a directory.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    dir: PathBuf,
    package: Option<String>,
}

impl FsArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, package: Option<String>) -> Self {
        Self {
            dir: dir.into(),
            package,
        }
    }

    /// Package prefix of `spec`'s artifacts: the spec's own, else the store's.
    fn package<'s>(&'s self, spec: &'s ContractSpec) -> Option<&'s str> {
        spec.package.as_deref().or(self.package.as_deref())
    }

    /// Path of an artifact file for `class`, using the spec's package when set.
    pub fn artifact_path(&self, spec: &ContractSpec, suffix: &str) -> PathBuf {
        let file_name = match self.package(spec) {
            Some(package) => format!("{}_{}.{}", package, spec.class_name(), suffix),
            None => format!("{}.{}", spec.class_name(), suffix),
        };
        self.dir.join(file_name)
    }

    fn read(path: &Path, class: &str) -> Result<String, ArtifactError> {
        if !path.exists() {
            return Err(ArtifactError::NotFound {
                class: class.to_string(),
                path: path.display().to_string(),
            });
        }
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))
            .map_err(|source| ArtifactError::Malformed {
                class: class.to_string(),
                source,
            })
    }

    fn load_sierra(path: &Path, class: &str) -> Result<FlattenedSierraClass, ArtifactError> {
        let content = Self::read(path, class)?;
        let malformed = |source: anyhow::Error| ArtifactError::Malformed {
            class: class.to_string(),
            source,
        };

        let sierra: SierraClass = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse Sierra class {}", path.display()))
            .map_err(malformed)?;

        sierra
            .flatten()
            .map_err(|e| anyhow::anyhow!("Failed to flatten Sierra class: {}", e))
            .map_err(malformed)
    }

    fn load_compiled_class_hash(path: &Path, class: &str) -> Result<Felt, ArtifactError> {
        let content = Self::read(path, class)?;
        let malformed = |source: anyhow::Error| ArtifactError::Malformed {
            class: class.to_string(),
            source,
        };

        let casm: CompiledClass = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse compiled class {}", path.display()))
            .map_err(malformed)?;

        casm.class_hash()
            .map_err(|e| anyhow::anyhow!("Failed to compute compiled class hash: {}", e))
            .map_err(malformed)
    }
}

impl ArtifactStore for FsArtifactStore {
    type Program = FlattenedSierraClass;

    fn load(&self, spec: &ContractSpec) -> Result<ContractArtifact<Self::Program>, ArtifactError> {
        let class = spec.class_name();
        let sierra_path = self.artifact_path(spec, SIERRA_SUFFIX);
        let program = Self::load_sierra(&sierra_path, class)?;

        let compiled_class_hash = match spec.compiled_class_hash {
            Some(hash) => hash,
            None => {
                Self::load_compiled_class_hash(&self.artifact_path(spec, CASM_SUFFIX), class)?
            }
        };

        tracing::debug!(
            class,
            path = %sierra_path.display(),
            compiled_class_hash = %crate::felt::to_hex(&compiled_class_hash),
            "Loaded contract artifact"
        );

        Ok(ContractArtifact {
            class: class.to_string(),
            program: Arc::new(program),
            compiled_class_hash,
        })
    }

    fn artifact_key(&self, spec: &ContractSpec) -> String {
        format!(
            "{}/{}",
            self.package(spec).unwrap_or_default(),
            spec.class_name()
        )
    }
}
