//! Class resolution: turning a declare outcome into a class hash.
//!
//! A class that is already declared on the ledger is not a failure. The class
//! hash is recovered, in order of preference, from the failure payload, by
//! recomputing it from the program, or from a per-contract fallback. A wrong
//! class hash is never guessed: if none of these produce a value the contract
//! fails with [`ResolveError::UnresolvableClass`].

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use starknet::core::types::Felt;

use crate::{
    error::ResolveError,
    felt::{parse_felt, to_hex},
    ledger::{DeclareReceipt, LedgerError, LedgerErrorKind, ProgramClass},
};

/// Lowercase message fragments signalling an already declared class.
const ALREADY_DECLARED_PATTERNS: &[&str] = &[
    "class already declared",
    "already declared",
    "class_already_declared",
    "classalreadydeclared",
];

/// Lowercase message fragments signalling an underfunded account.
const INSUFFICIENT_FUNDS_PATTERNS: &[&str] = &[
    "insufficient account balance",
    "insufficient_account_balance",
    "exceeds balance",
    "insufficient funds",
];

/// A hex value introduced as a class hash ("class hash 0x..", "Class with hash 0x..").
///
/// The optional `compiled` prefix is captured so that compiled class hashes
/// can be told apart and skipped.
static CLASS_HASH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)\b(compiled[ _])?class(?:[ _]hash|\s+with\s+hash)?",
        r#"["']?\s*[:=]?\s*["']?(0x[0-9a-f]{1,64})\b"#,
    ))
    .expect("valid regex")
});

/// A hex value right after the already-declared phrase ("already declared: 0x..").
static DECLARED_HASH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)already[ _]declared["']?[\s:=,.]*["']?(0x[0-9a-f]{1,64})\b"#)
        .expect("valid regex")
});

/// Any hex value.
static HEX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b0x[0-9a-f]{1,64}\b").expect("valid regex"));

/// The compiled class hash the sequencer expected ("Expected: 0x..").
static EXPECTED_HASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)expected:?\s*(0x[0-9a-f]{1,64})").expect("valid regex"));

/// Classifies ledger failures.
///
/// Structured kinds reported by the ledger client always win; message
/// inspection only applies to failures the client could not classify.
pub trait FailureClassifier: Send + Sync {
    fn classify(&self, err: &LedgerError) -> LedgerErrorKind;
}

/// Default classifier: structured kind first, then case-insensitive matching
/// on known message fragments.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageClassifier;

impl FailureClassifier for MessageClassifier {
    fn classify(&self, err: &LedgerError) -> LedgerErrorKind {
        if err.kind != LedgerErrorKind::Other {
            return err.kind.clone();
        }

        let message = err.message.to_lowercase();
        if ALREADY_DECLARED_PATTERNS.iter().any(|p| message.contains(p)) {
            return LedgerErrorKind::AlreadyDeclared;
        }
        if INSUFFICIENT_FUNDS_PATTERNS.iter().any(|p| message.contains(p)) {
            return LedgerErrorKind::InsufficientFunds;
        }
        if message.contains("compiled class hash") && message.contains("mismatch") {
            return LedgerErrorKind::CompiledClassHashMismatch {
                expected: expected_compiled_class_hash(&err.message),
            };
        }
        LedgerErrorKind::Other
    }
}

/// Extract the compiled class hash a sequencer reported as expected.
pub fn expected_compiled_class_hash(message: &str) -> Option<Felt> {
    EXPECTED_HASH_RE
        .captures(message)
        .and_then(|caps| parse_felt(&caps[1]).ok())
}

/// Extract a class hash embedded in a failure message.
///
/// Only a value labelled as a class hash is accepted, compiled class hashes
/// excluded. An unlabelled value counts only when it directly follows the
/// already-declared phrase and is the only hex value of the message, so a
/// transaction hash, address or nonce is never taken for a class hash.
pub fn embedded_class_hash(message: &str) -> Option<Felt> {
    let labelled = CLASS_HASH_RE
        .captures_iter(message)
        .filter(|caps| caps.get(1).is_none())
        .find_map(|caps| parse_felt(&caps[2]).ok());
    if labelled.is_some() {
        return labelled;
    }

    if HEX_RE.find_iter(message).count() != 1 {
        return None;
    }
    DECLARED_HASH_RE
        .captures(message)
        .and_then(|caps| parse_felt(&caps[1]).ok())
}

/// Where a recovered class hash came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecoverySource {
    /// Carried by the failure payload or message.
    Embedded,
    /// Recomputed from the program representation.
    Recomputed,
    /// Fallback configured for the contract.
    Fallback,
}

/// How a class hash was obtained during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassOrigin {
    /// Freshly declared by this run.
    Declared { transaction_hash: Felt },
    /// The class was already on the ledger.
    Recovered(RecoverySource),
    /// Resolved earlier in this run for another contract of the same class.
    Cached,
}

/// A class hash together with its origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedClass {
    pub class_hash: Felt,
    pub origin: ClassOrigin,
}

impl ResolvedClass {
    pub fn declare_transaction(&self) -> Option<Felt> {
        match self.origin {
            ClassOrigin::Declared { transaction_hash } => Some(transaction_hash),
            _ => None,
        }
    }
}

/// Interprets declare outcomes.
#[derive(Debug, Clone, Default)]
pub struct ClassResolver<C = MessageClassifier> {
    classifier: C,
}

impl<C: FailureClassifier> ClassResolver<C> {
    pub fn new(classifier: C) -> Self {
        Self { classifier }
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    /// Resolve the class hash of a declare attempt.
    ///
    /// `fallback` is the configured last-resort class hash of the contract.
    pub fn resolve<P: ProgramClass + ?Sized>(
        &self,
        outcome: Result<DeclareReceipt, LedgerError>,
        program: &P,
        fallback: Option<Felt>,
    ) -> Result<ResolvedClass, ResolveError> {
        let err = match outcome {
            Ok(receipt) => {
                return Ok(ResolvedClass {
                    class_hash: receipt.class_hash,
                    origin: ClassOrigin::Declared {
                        transaction_hash: receipt.transaction_hash,
                    },
                });
            }
            Err(err) => err,
        };

        if self.classifier.classify(&err) != LedgerErrorKind::AlreadyDeclared {
            return Err(ResolveError::DeclareFailed(err));
        }

        tracing::info!(error = %err, "Class already declared, recovering class hash");
        self.recover(&err, program, fallback)
    }

    fn recover<P: ProgramClass + ?Sized>(
        &self,
        err: &LedgerError,
        program: &P,
        fallback: Option<Felt>,
    ) -> Result<ResolvedClass, ResolveError> {
        let recovered = |class_hash: Felt, source: RecoverySource| {
            tracing::info!(class_hash = %to_hex(&class_hash), %source, "Recovered class hash");
            Ok(ResolvedClass {
                class_hash,
                origin: ClassOrigin::Recovered(source),
            })
        };

        if let Some(class_hash) = err.class_hash.or_else(|| embedded_class_hash(&err.message)) {
            return recovered(class_hash, RecoverySource::Embedded);
        }

        let recompute_error = match program.compute_class_hash() {
            Ok(class_hash) => return recovered(class_hash, RecoverySource::Recomputed),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to recompute class hash from program");
                e
            }
        };

        if let Some(class_hash) = fallback {
            return recovered(class_hash, RecoverySource::Fallback);
        }

        Err(ResolveError::UnresolvableClass {
            detail: format!(
                "{} (no embedded class hash, recomputation failed: {}, no fallback configured)",
                err.message, recompute_error
            ),
        })
    }
}
