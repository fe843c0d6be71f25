//! snup-deploy - Declare and deploy Starknet contracts from a manifest.
//!
//! A run orders the manifest by constructor dependencies, declares each class
//! (recovering the class hash when the class already exists on the ledger),
//! deploys the instances with their references substituted, and writes a
//! deployment record.

pub mod artifacts;
pub mod config;
pub mod error;
pub mod felt;
pub mod fees;
pub mod ledger;
pub mod manifest;
pub mod orchestrator;
pub mod record;
pub mod resolver;
pub mod rpc;
pub mod sequencer;

pub use artifacts::{ArtifactStore, ContractArtifact, FsArtifactStore};
pub use config::{CONFIG_FILENAME, DeployConfig};
pub use error::{
    ArtifactError, ConfigError, ContractFailure, DeployError, FailureKind, ResolveError, Stage,
};
pub use fees::{FeeConfig, ResourceBound};
pub use ledger::{
    DeclareReceipt, DeployReceipt, FinalStatus, LedgerClient, LedgerError, LedgerErrorKind,
    ProgramClass, StarknetLedger, StarknetLedgerConfig,
};
pub use manifest::{ArgDescriptor, ContractSpec, Manifest, U256Literal};
pub use orchestrator::{Orchestrator, OrchestratorSettings, RunContext, RunExit, RunOutcome};
pub use record::{
    DeclareOrigin, DeclaredClass, DeployedInstance, DeploymentRecord, FailureEntry,
    JsonRecordWriter, RECORD_FILENAME, RecordWriter, RunStatus,
};
pub use resolver::{
    ClassOrigin, ClassResolver, FailureClassifier, MessageClassifier, RecoverySource,
    ResolvedClass,
};
pub use sequencer::sequence;

/// Re-exported so callers can build field elements without a direct
/// dependency on the Starknet SDK.
pub use starknet::core::types::Felt;
