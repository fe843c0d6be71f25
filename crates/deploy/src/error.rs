//! Error taxonomy for a deployment run.

use starknet::core::types::Felt;
use thiserror::Error;

use crate::ledger::LedgerError;

/// A pipeline stage, attached to every per-contract failure.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Load,
    Declare,
    Resolve,
    Deploy,
    Await,
}

/// Configuration defects. Always detected before the first ledger call.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("the manifest does not declare any contract")]
    EmptyManifest,
    #[error("contract `{0}` is declared more than once in the manifest")]
    DuplicateContract(String),
    #[error("contract `{contract}` references unknown contract `{reference}`")]
    UnknownReference { contract: String, reference: String },
    #[error(
        "contract `{contract}` references the address of `{reference}`, which is declare-only"
    )]
    AddressOfDeclareOnly { contract: String, reference: String },
    #[error("cyclic dependency between contracts: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),
    #[error("missing configuration field `{0}`")]
    MissingField(&'static str),
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Failure to load a compiled artifact from the store.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("compiled artifact for `{class}` not found at {path} (was the contract built?)")]
    NotFound { class: String, path: String },
    #[error("artifact for `{class}` is malformed: {source}")]
    Malformed {
        class: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Outcome of the class resolver when no class hash can be produced.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The ledger reported an already-declared class but none of the
    /// recovery sources produced a class hash.
    #[error("class reported as already declared but no class hash could be recovered: {detail}")]
    UnresolvableClass { detail: String },
    /// Any declare failure that is not an already-declared signal.
    #[error("declare failed: {0}")]
    DeclareFailed(LedgerError),
}

/// Fatal condition for a single contract.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error("declare failed: {0}")]
    DeclareFailed(LedgerError),
    #[error("deploy failed: {0}")]
    DeployFailed(LedgerError),
    #[error("class reported as already declared but no class hash could be recovered: {detail}")]
    UnresolvableClass { detail: String },
    #[error("transaction {tx_hash:#x} did not reach finality within {ceiling_secs}s")]
    FinalityTimeout { tx_hash: Felt, ceiling_secs: u64 },
    #[error("transaction {tx_hash:#x} failed: {reason}")]
    TransactionFailed { tx_hash: Felt, reason: String },
    #[error("dependency `{0}` did not complete")]
    DependencyFailed(String),
}

impl From<ResolveError> for DeployError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::UnresolvableClass { detail } => Self::UnresolvableClass { detail },
            ResolveError::DeclareFailed(err) => Self::DeclareFailed(err),
        }
    }
}

/// Coarse classification used for the record and the process exit status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    ArtifactNotFound,
    ArtifactMalformed,
    DeclareFailed,
    DeployFailed,
    UnresolvableClass,
    FinalityTimeout,
    TransactionFailed,
    DependencyFailed,
}

impl FailureKind {
    /// Failures of the build or configuration rather than of the ledger.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::ArtifactNotFound | Self::ArtifactMalformed)
    }
}

impl DeployError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Artifact(ArtifactError::NotFound { .. }) => FailureKind::ArtifactNotFound,
            Self::Artifact(ArtifactError::Malformed { .. }) => FailureKind::ArtifactMalformed,
            Self::DeclareFailed(_) => FailureKind::DeclareFailed,
            Self::DeployFailed(_) => FailureKind::DeployFailed,
            Self::UnresolvableClass { .. } => FailureKind::UnresolvableClass,
            Self::FinalityTimeout { .. } => FailureKind::FinalityTimeout,
            Self::TransactionFailed { .. } => FailureKind::TransactionFailed,
            Self::DependencyFailed(_) => FailureKind::DependencyFailed,
        }
    }
}

/// A fatal error for one contract, tagged with where it happened.
#[derive(Debug, Error)]
#[error("contract `{contract}` failed at stage {stage}: {error}")]
pub struct ContractFailure {
    pub contract: String,
    pub stage: Stage,
    #[source]
    pub error: DeployError,
}
