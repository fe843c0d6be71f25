//! Ledger client abstraction.
//!
//! The orchestrator only talks to the ledger through [`LedgerClient`], so a run
//! can be driven against the real Starknet RPC ([`StarknetLedger`]) or against an
//! in-memory double in tests.

mod starknet_rpc;

pub use starknet_rpc::{StarknetLedger, StarknetLedgerConfig};

use std::{future::Future, time::Duration};

use starknet::core::types::Felt;
use thiserror::Error;

use crate::{artifacts::ContractArtifact, fees::FeeConfig};

/// Structured classification of a ledger failure.
///
/// Populated by the ledger client from the provider's error codes wherever
/// they exist; `Other` is used when only free text is available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerErrorKind {
    AlreadyDeclared,
    InsufficientFunds,
    /// The compiled class hash sent with a declare does not match the one the
    /// sequencer computed. `expected` is set when the sequencer reported it.
    CompiledClassHashMismatch { expected: Option<Felt> },
    Timeout,
    Other,
}

/// A failure reported by the ledger client.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct LedgerError {
    pub kind: LedgerErrorKind,
    pub message: String,
    /// Class hash carried by the failure payload, if the ledger returned one.
    pub class_hash: Option<Felt>,
}

impl LedgerError {
    pub fn new(kind: LedgerErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            class_hash: None,
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(LedgerErrorKind::Other, message)
    }

    pub fn with_class_hash(mut self, class_hash: Felt) -> Self {
        self.class_hash = Some(class_hash);
        self
    }
}

/// Accepted declare submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeclareReceipt {
    pub transaction_hash: Felt,
    pub class_hash: Felt,
}

/// Accepted deploy submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployReceipt {
    pub transaction_hash: Felt,
    pub address: Felt,
}

/// Terminal state of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalStatus {
    AcceptedOnL2,
    AcceptedOnL1,
    Reverted(String),
    Rejected(String),
    /// The ceiling elapsed before the transaction reached a terminal state.
    TimedOut,
}

impl FinalStatus {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::AcceptedOnL2 | Self::AcceptedOnL1)
    }
}

/// Capability required from a hash-deriving program representation.
///
/// Recomputes the class hash the ledger derives from the program, used when
/// an already-declared signal carries no class hash.
pub trait ProgramClass: Send + Sync {
    fn compute_class_hash(&self) -> anyhow::Result<Felt>;
}

/// Class lookup, declare/deploy submission and finality polling over RPC.
pub trait LedgerClient: Send + Sync {
    /// The program representation declared by this client.
    type Program: ProgramClass;

    /// Address of the account paying for and signing transactions.
    fn account_address(&self) -> Felt;

    /// Chain the client is connected to, when known.
    fn chain_id(&self) -> Option<Felt> {
        None
    }

    /// Whether a class with `class_hash` is already declared.
    fn class_exists(
        &self,
        class_hash: Felt,
    ) -> impl Future<Output = Result<bool, LedgerError>> + Send;

    /// Submit a declare transaction for `artifact`.
    fn declare(
        &self,
        artifact: &ContractArtifact<Self::Program>,
        compiled_class_hash: Felt,
        fees: &FeeConfig,
    ) -> impl Future<Output = Result<DeclareReceipt, LedgerError>> + Send;

    /// Submit a deploy transaction for an already declared class.
    fn deploy(
        &self,
        class_hash: Felt,
        constructor_calldata: &[Felt],
        salt: Felt,
        fees: &FeeConfig,
    ) -> impl Future<Output = Result<DeployReceipt, LedgerError>> + Send;

    /// Block until `transaction_hash` is final, failed, or `ceiling` elapsed.
    fn await_finality(
        &self,
        transaction_hash: Felt,
        ceiling: Duration,
    ) -> impl Future<Output = Result<FinalStatus, LedgerError>> + Send;
}
