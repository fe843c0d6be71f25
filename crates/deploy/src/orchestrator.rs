//! Deployment orchestration.
//!
//! Contracts are processed one at a time in sequencer order: declare (unless
//! the class was already resolved in this run or the ledger already knows its
//! recomputed class hash), resolve the class hash,
//! substitute references into the constructor, deploy, await finality. A
//! failed contract stops its dependents; independent contracts continue, and
//! the record always carries whatever completed.

use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use chrono::{DateTime, Utc};
use starknet::core::types::Felt;

use crate::{
    artifacts::{ArtifactStore, ContractArtifact},
    error::{ConfigError, ContractFailure, DeployError, FailureKind, Stage},
    felt::to_hex,
    fees::FeeConfig,
    ledger::{FinalStatus, LedgerClient, LedgerErrorKind, ProgramClass},
    manifest::{ArgDescriptor, ContractSpec, Manifest},
    record::{DeclaredClass, DeployedInstance, DeploymentRecord, FailureEntry, RunStatus},
    resolver::{
        ClassOrigin, ClassResolver, FailureClassifier, MessageClassifier, RecoverySource,
        ResolvedClass,
    },
    sequencer,
};

/// Default ceiling for a single finality wait.
pub const DEFAULT_FINALITY_CEILING: Duration = Duration::from_secs(300);

/// Run-wide settings of the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Network tag written to the record.
    pub network: String,
    /// Fees used when a contract has no override.
    pub default_fees: FeeConfig,
    /// Maximum time to wait for one transaction to become final.
    pub finality_ceiling: Duration,
    /// Look the recomputed class hash up on the ledger before declaring.
    pub check_declared: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            network: "devnet".to_string(),
            default_fees: FeeConfig::default(),
            finality_ceiling: DEFAULT_FINALITY_CEILING,
            check_declared: true,
        }
    }
}

/// State accumulated over one run.
///
/// The class cache is written once per class and read by every dependent.
pub struct RunContext {
    started_at: DateTime<Utc>,
    /// Resolved class hashes keyed by artifact (package and class).
    classes: HashMap<String, Felt>,
    /// Resolved class hash of each manifest contract.
    class_hashes: HashMap<String, Felt>,
    /// Address of each deployed manifest contract.
    addresses: HashMap<String, Felt>,
    completed: HashSet<String>,
    failed: HashSet<String>,
    declared: Vec<DeclaredClass>,
    instances: Vec<DeployedInstance>,
    failures: Vec<ContractFailure>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            classes: HashMap::new(),
            class_hashes: HashMap::new(),
            addresses: HashMap::new(),
            completed: HashSet::new(),
            failed: HashSet::new(),
            declared: Vec::new(),
            instances: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn cached_class(&self, key: &str) -> Option<Felt> {
        self.classes.get(key).copied()
    }

    fn record_class(&mut self, spec: &ContractSpec, key: String, resolved: &ResolvedClass) {
        self.classes.entry(key).or_insert(resolved.class_hash);
        self.class_hashes
            .insert(spec.name.clone(), resolved.class_hash);
        self.declared
            .push(DeclaredClass::new(&spec.name, spec.class_name(), resolved));
    }

    fn record_instance(&mut self, instance: DeployedInstance) {
        self.addresses.insert(instance.name.clone(), instance.address);
        self.instances.push(instance);
    }

    fn complete(&mut self, name: &str) {
        self.completed.insert(name.to_string());
    }

    fn fail(&mut self, failure: ContractFailure) {
        self.failed.insert(failure.contract.clone());
        self.failures.push(failure);
    }

    pub fn class_hash(&self, name: &str) -> Option<Felt> {
        self.class_hashes.get(name).copied()
    }

    pub fn address(&self, name: &str) -> Option<Felt> {
        self.addresses.get(name).copied()
    }

    pub fn instances(&self) -> &[DeployedInstance] {
        &self.instances
    }

    pub fn failures(&self) -> &[ContractFailure] {
        &self.failures
    }

    fn status(&self) -> RunStatus {
        if self.failures.is_empty() {
            RunStatus::Complete
        } else if self.completed.is_empty() {
            RunStatus::Failed
        } else {
            RunStatus::Partial
        }
    }

    /// Build the record of the run.
    pub fn to_record(
        &self,
        network: &str,
        deployer: Felt,
        chain_id: Option<Felt>,
    ) -> DeploymentRecord {
        DeploymentRecord {
            network: network.to_string(),
            chain_id,
            deployer,
            started_at: self.started_at,
            finished_at: Utc::now(),
            status: self.status(),
            declared: self.declared.clone(),
            contracts: self.instances.clone(),
            failures: self.failures.iter().map(FailureEntry::from).collect(),
        }
    }
}

/// How a run ended, from the operator's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum RunExit {
    Success,
    /// Invalid manifest, cyclic dependency, missing or malformed artifact.
    ConfigurationError,
    /// Only finality timeouts: re-running the pipeline is safe.
    FinalityTimeout,
    RuntimeFailure,
}

impl RunExit {
    /// Classify the failures of a run.
    pub fn from_failures(failures: &[ContractFailure]) -> Self {
        let kinds: Vec<FailureKind> = failures
            .iter()
            .map(|f| f.error.kind())
            .filter(|kind| *kind != FailureKind::DependencyFailed)
            .collect();

        if failures.is_empty() {
            Self::Success
        } else if kinds.iter().any(FailureKind::is_configuration) {
            Self::ConfigurationError
        } else if !kinds.is_empty() && kinds.iter().all(|k| *k == FailureKind::FinalityTimeout) {
            Self::FinalityTimeout
        } else {
            Self::RuntimeFailure
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::Success => 0,
            Self::RuntimeFailure => 1,
            Self::ConfigurationError => 2,
            Self::FinalityTimeout => 3,
        }
    }
}

/// Result of a complete run.
pub struct RunOutcome {
    pub record: DeploymentRecord,
    pub failures: Vec<ContractFailure>,
}

impl RunOutcome {
    pub fn exit(&self) -> RunExit {
        RunExit::from_failures(&self.failures)
    }
}

/// Drives every contract of a manifest through declare, resolve, deploy and
/// finality.
pub struct Orchestrator<'a, A, L, C = MessageClassifier> {
    store: &'a A,
    ledger: &'a L,
    resolver: ClassResolver<C>,
    settings: OrchestratorSettings,
}

impl<'a, A, L> Orchestrator<'a, A, L, MessageClassifier>
where
    A: ArtifactStore,
    L: LedgerClient<Program = A::Program>,
{
    pub fn new(store: &'a A, ledger: &'a L, settings: OrchestratorSettings) -> Self {
        Self::with_classifier(store, ledger, settings, MessageClassifier)
    }
}

impl<'a, A, L, C> Orchestrator<'a, A, L, C>
where
    A: ArtifactStore,
    L: LedgerClient<Program = A::Program>,
    C: FailureClassifier,
{
    pub fn with_classifier(
        store: &'a A,
        ledger: &'a L,
        settings: OrchestratorSettings,
        classifier: C,
    ) -> Self {
        Self {
            store,
            ledger,
            resolver: ClassResolver::new(classifier),
            settings,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Run the whole manifest and build its record.
    ///
    /// Only configuration defects are returned as errors, before any ledger
    /// call; per-contract failures are part of the outcome.
    pub async fn deploy(&self, manifest: &Manifest) -> Result<RunOutcome, ConfigError> {
        let mut ctx = RunContext::new();
        self.run(manifest, &mut ctx).await?;

        let record = ctx.to_record(
            &self.settings.network,
            self.ledger.account_address(),
            self.ledger.chain_id(),
        );

        Ok(RunOutcome {
            record,
            failures: ctx.failures,
        })
    }

    /// Run the manifest against an existing context.
    pub async fn run(&self, manifest: &Manifest, ctx: &mut RunContext) -> Result<(), ConfigError> {
        let order = sequencer::sequence(manifest)?;

        tracing::info!(
            order = ?order.iter().map(|spec| spec.name.as_str()).collect::<Vec<_>>(),
            network = %self.settings.network,
            "Starting deployment run..."
        );

        for spec in order {
            match self.process(spec, ctx).await {
                Ok(()) => ctx.complete(&spec.name),
                Err(failure) => {
                    tracing::error!(
                        contract = %failure.contract,
                        stage = %failure.stage,
                        error = %failure.error,
                        "Contract failed"
                    );
                    ctx.fail(failure);
                }
            }
        }

        tracing::info!(
            completed = ctx.completed.len(),
            failed = ctx.failures.len(),
            "Deployment run finished"
        );

        Ok(())
    }

    async fn process(
        &self,
        spec: &ContractSpec,
        ctx: &mut RunContext,
    ) -> Result<(), ContractFailure> {
        let fail = |stage: Stage, error: DeployError| ContractFailure {
            contract: spec.name.clone(),
            stage,
            error,
        };

        if let Some(dep) = spec
            .dependencies()
            .into_iter()
            .find(|dep| ctx.failed.contains(*dep))
        {
            tracing::warn!(
                contract = %spec.name,
                dependency = dep,
                "Skipping contract, dependency failed"
            );
            return Err(fail(Stage::Load, DeployError::DependencyFailed(dep.to_string())));
        }

        let key = self.store.artifact_key(spec);
        let resolved = match ctx.cached_class(&key) {
            Some(class_hash) => {
                tracing::info!(
                    contract = %spec.name,
                    class_hash = %to_hex(&class_hash),
                    "Class already resolved in this run, skipping declare"
                );
                ResolvedClass {
                    class_hash,
                    origin: ClassOrigin::Cached,
                }
            }
            None => self.declare(spec).await?,
        };
        ctx.record_class(spec, key, &resolved);

        if !spec.deploy {
            return Ok(());
        }

        let calldata =
            self.constructor_calldata(spec, ctx).map_err(|e| fail(Stage::Deploy, e))?;
        let fees = self.fees(spec);
        let salt = spec.salt.unwrap_or_else(|| Felt::from(rand::random::<u128>()));

        tracing::info!(
            contract = %spec.name,
            class_hash = %to_hex(&resolved.class_hash),
            calldata = ?calldata.iter().map(to_hex).collect::<Vec<_>>(),
            "Deploying contract..."
        );

        let receipt = self
            .ledger
            .deploy(resolved.class_hash, &calldata, salt, fees)
            .await
            .map_err(|e| fail(Stage::Deploy, DeployError::DeployFailed(e)))?;

        tracing::info!(
            contract = %spec.name,
            tx_hash = %to_hex(&receipt.transaction_hash),
            address = %to_hex(&receipt.address),
            "Deploy submitted, waiting for finality..."
        );

        let status = self
            .await_final(receipt.transaction_hash)
            .await
            .map_err(|e| fail(Stage::Await, e))?;

        tracing::info!(
            contract = %spec.name,
            address = %to_hex(&receipt.address),
            %status,
            "Contract deployed"
        );

        ctx.record_instance(DeployedInstance {
            name: spec.name.clone(),
            class_hash: resolved.class_hash,
            address: receipt.address,
            declare_tx: resolved.declare_transaction(),
            deploy_tx: receipt.transaction_hash,
            constructor_calldata: calldata.iter().map(to_hex).collect(),
            finality: status.to_string(),
        });

        Ok(())
    }

    /// Load, declare, resolve and, for fresh declarations, await finality.
    async fn declare(&self, spec: &ContractSpec) -> Result<ResolvedClass, ContractFailure> {
        let fail = |stage: Stage, error: DeployError| ContractFailure {
            contract: spec.name.clone(),
            stage,
            error,
        };

        let artifact = self
            .store
            .load(spec)
            .map_err(|e| fail(Stage::Load, e.into()))?;

        if self.settings.check_declared {
            if let Some(resolved) = self.declared_on_ledger(spec, &artifact).await {
                return Ok(resolved);
            }
        }

        tracing::info!(
            contract = %spec.name,
            class = %artifact.class,
            compiled_class_hash = %to_hex(&artifact.compiled_class_hash),
            "Declaring class..."
        );

        let outcome = self.submit_declare(&artifact, self.fees(spec)).await;

        let resolved = self
            .resolver
            .resolve(outcome, artifact.program.as_ref(), spec.fallback_class_hash)
            .map_err(|e| {
                let error = DeployError::from(e);
                let stage = match error {
                    DeployError::UnresolvableClass { .. } => Stage::Resolve,
                    _ => Stage::Declare,
                };
                fail(stage, error)
            })?;

        if let ClassOrigin::Declared { transaction_hash } = resolved.origin {
            tracing::info!(
                contract = %spec.name,
                tx_hash = %to_hex(&transaction_hash),
                class_hash = %to_hex(&resolved.class_hash),
                "Declare submitted, waiting for finality..."
            );
            self.await_final(transaction_hash)
                .await
                .map_err(|e| fail(Stage::Await, e))?;
        }

        tracing::info!(
            contract = %spec.name,
            class_hash = %to_hex(&resolved.class_hash),
            "Class resolved"
        );

        Ok(resolved)
    }

    /// Look the recomputed class hash up on the ledger, so that a class that
    /// is already declared costs no declare transaction.
    ///
    /// Any failure here only means the declare is submitted.
    async fn declared_on_ledger(
        &self,
        spec: &ContractSpec,
        artifact: &ContractArtifact<A::Program>,
    ) -> Option<ResolvedClass> {
        let class_hash = match artifact.program.compute_class_hash() {
            Ok(class_hash) => class_hash,
            Err(e) => {
                tracing::debug!(
                    contract = %spec.name,
                    error = %e,
                    "Cannot recompute class hash, declaring without lookup"
                );
                return None;
            }
        };

        match self.ledger.class_exists(class_hash).await {
            Ok(true) => {
                tracing::info!(
                    contract = %spec.name,
                    class_hash = %to_hex(&class_hash),
                    "Class already declared on the ledger, skipping declare"
                );
                Some(ResolvedClass {
                    class_hash,
                    origin: ClassOrigin::Recovered(RecoverySource::Recomputed),
                })
            }
            Ok(false) => None,
            Err(err) => {
                tracing::warn!(
                    contract = %spec.name,
                    class_hash = %to_hex(&class_hash),
                    error = %err,
                    "Class lookup failed, declaring"
                );
                None
            }
        }
    }

    /// Submit a declare, retrying once with the compiled class hash the
    /// sequencer reports as expected on a mismatch.
    async fn submit_declare(
        &self,
        artifact: &ContractArtifact<A::Program>,
        fees: &FeeConfig,
    ) -> Result<crate::ledger::DeclareReceipt, crate::ledger::LedgerError> {
        let outcome = self
            .ledger
            .declare(artifact, artifact.compiled_class_hash, fees)
            .await;

        let Err(err) = &outcome else {
            return outcome;
        };

        match self.resolver.classifier().classify(err) {
            LedgerErrorKind::CompiledClassHashMismatch {
                expected: Some(expected),
            } if expected != artifact.compiled_class_hash => {
                tracing::warn!(
                    class = %artifact.class,
                    local = %to_hex(&artifact.compiled_class_hash),
                    expected = %to_hex(&expected),
                    "Compiled class hash mismatch, retrying with the sequencer's hash"
                );
                self.ledger.declare(artifact, expected, fees).await
            }
            _ => outcome,
        }
    }

    fn constructor_calldata(
        &self,
        spec: &ContractSpec,
        ctx: &RunContext,
    ) -> Result<Vec<Felt>, DeployError> {
        let mut calldata = Vec::with_capacity(spec.constructor.len());

        for arg in &spec.constructor {
            match arg {
                ArgDescriptor::Literal(value) => calldata.push(*value),
                ArgDescriptor::U256(value) => {
                    calldata.push(Felt::from(value.low));
                    calldata.push(Felt::from(value.high));
                }
                ArgDescriptor::ClassHashOf(name) => calldata.push(
                    ctx.class_hash(name)
                        .ok_or_else(|| DeployError::DependencyFailed(name.clone()))?,
                ),
                ArgDescriptor::AddressOf(name) => calldata.push(
                    ctx.address(name)
                        .ok_or_else(|| DeployError::DependencyFailed(name.clone()))?,
                ),
                ArgDescriptor::DeployerAddress => calldata.push(self.ledger.account_address()),
            }
        }

        Ok(calldata)
    }

    fn fees<'s>(&'s self, spec: &'s ContractSpec) -> &'s FeeConfig {
        spec.fees.as_ref().unwrap_or(&self.settings.default_fees)
    }

    async fn await_final(&self, transaction_hash: Felt) -> Result<FinalStatus, DeployError> {
        let ceiling = self.settings.finality_ceiling;
        let timeout = || DeployError::FinalityTimeout {
            tx_hash: transaction_hash,
            ceiling_secs: ceiling.as_secs(),
        };

        match self.ledger.await_finality(transaction_hash, ceiling).await {
            Ok(status @ (FinalStatus::AcceptedOnL2 | FinalStatus::AcceptedOnL1)) => Ok(status),
            Ok(FinalStatus::TimedOut) => Err(timeout()),
            Ok(FinalStatus::Reverted(reason)) => Err(DeployError::TransactionFailed {
                tx_hash: transaction_hash,
                reason: format!("reverted: {}", reason),
            }),
            Ok(FinalStatus::Rejected(reason)) => Err(DeployError::TransactionFailed {
                tx_hash: transaction_hash,
                reason: format!("rejected: {}", reason),
            }),
            Err(err) if err.kind == LedgerErrorKind::Timeout => Err(timeout()),
            Err(err) => Err(DeployError::TransactionFailed {
                tx_hash: transaction_hash,
                reason: err.message,
            }),
        }
    }
}
