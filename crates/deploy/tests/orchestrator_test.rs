//! Orchestrator tests against an in-memory ledger and artifact store.
//!
//! The mock ledger keeps the set of declared classes across runs, so running
//! the same manifest twice exercises the already-declared recovery path the
//! way a real network would.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::Result;
use snup_deploy::{
    ArgDescriptor, ArtifactError, ArtifactStore, ConfigError, ContractArtifact, ContractSpec,
    DeclareOrigin, DeclareReceipt, DeployReceipt, DeploymentRecord, FailureKind, FeeConfig, Felt,
    FinalStatus, JsonRecordWriter, LedgerClient, LedgerError, LedgerErrorKind, Manifest,
    Orchestrator, OrchestratorSettings, ProgramClass, RecordWriter, RecoverySource, RunContext,
    RunExit, RunStatus, Stage,
};
use tempdir::TempDir;

const DEPLOYER: u64 = 0xdead;

fn felt(v: u64) -> Felt {
    Felt::from(v)
}

fn hex(v: u64) -> String {
    format!("{:#x}", v)
}

/// Program whose class hash recomputation is counted.
struct MockProgram {
    class_hash: Option<Felt>,
    recomputations: Arc<AtomicUsize>,
}

impl ProgramClass for MockProgram {
    fn compute_class_hash(&self) -> anyhow::Result<Felt> {
        self.recomputations.fetch_add(1, Ordering::SeqCst);
        self.class_hash
            .ok_or_else(|| anyhow::anyhow!("program cannot be hashed"))
    }
}

#[derive(Default)]
struct MockStore {
    /// Recomputable class hash per class name.
    hashes: HashMap<String, Felt>,
    missing: HashSet<String>,
    /// Package applied to specs without one.
    package: Option<String>,
    recomputations: Arc<AtomicUsize>,
    loads: AtomicUsize,
}

impl MockStore {
    fn with_hash(mut self, class: &str, class_hash: Felt) -> Self {
        self.hashes.insert(class.to_string(), class_hash);
        self
    }

    fn missing(mut self, class: &str) -> Self {
        self.missing.insert(class.to_string());
        self
    }

    fn package(mut self, package: &str) -> Self {
        self.package = Some(package.to_string());
        self
    }
}

impl ArtifactStore for MockStore {
    type Program = MockProgram;

    fn load(&self, spec: &ContractSpec) -> Result<ContractArtifact<MockProgram>, ArtifactError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let class = spec.class_name();
        if self.missing.contains(class) {
            return Err(ArtifactError::NotFound {
                class: class.to_string(),
                path: format!("target/dev/{}.contract_class.json", class),
            });
        }

        Ok(ContractArtifact {
            class: class.to_string(),
            program: Arc::new(MockProgram {
                class_hash: self.hashes.get(class).copied(),
                recomputations: Arc::clone(&self.recomputations),
            }),
            compiled_class_hash: spec.compiled_class_hash.unwrap_or(felt(0xc0)),
        })
    }

    fn artifact_key(&self, spec: &ContractSpec) -> String {
        let package = spec.package.as_deref().or(self.package.as_deref());
        format!("{}/{}", package.unwrap_or_default(), spec.class_name())
    }
}

/// What the ledger does when a class is declared.
#[derive(Clone)]
enum DeclareScript {
    /// Accept the declaration with this class hash.
    Accept(Felt),
    /// Reject with a free-text message.
    Reject(String),
    /// Reject until the given compiled class hash is sent, then accept.
    ExpectCompiledHash { expected: Felt, class_hash: Felt },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Lookup(Felt),
    Declare { class: String, compiled_class_hash: Felt },
    Deploy { class_hash: Felt, calldata: Vec<Felt> },
    Await(Felt),
}

#[derive(Default)]
struct LedgerState {
    scripts: HashMap<String, DeclareScript>,
    /// Classes on the ledger, by class name.
    declared: HashMap<String, Felt>,
    addresses: HashMap<Felt, Felt>,
    failing_deploys: HashSet<Felt>,
    /// Status returned for every deploy transaction without an explicit one.
    deploy_status: Option<FinalStatus>,
    deploy_txs: HashSet<Felt>,
    lookup_fails: bool,
    calls: Vec<Call>,
    next_tx: u64,
}

#[derive(Default)]
struct MockLedger {
    state: Mutex<LedgerState>,
}

impl MockLedger {
    fn script(self, class: &str, script: DeclareScript) -> Self {
        self.state
            .lock()
            .unwrap()
            .scripts
            .insert(class.to_string(), script);
        self
    }

    fn declared(self, class: &str, class_hash: Felt) -> Self {
        self.state
            .lock()
            .unwrap()
            .declared
            .insert(class.to_string(), class_hash);
        self
    }

    fn lookup_fails(self) -> Self {
        self.state.lock().unwrap().lookup_fails = true;
        self
    }

    fn address(self, class_hash: Felt, address: Felt) -> Self {
        self.state
            .lock()
            .unwrap()
            .addresses
            .insert(class_hash, address);
        self
    }

    fn failing_deploy(self, class_hash: Felt) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_deploys
            .insert(class_hash);
        self
    }

    fn deploy_status(self, status: FinalStatus) -> Self {
        self.state.lock().unwrap().deploy_status = Some(status);
        self
    }

    fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    fn declare_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Declare { .. }))
            .count()
    }

    fn deploy_calls(&self) -> Vec<(Felt, Vec<Felt>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Deploy {
                    class_hash,
                    calldata,
                } => Some((class_hash, calldata)),
                _ => None,
            })
            .collect()
    }

    fn reset_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }
}

impl LedgerState {
    fn tx(&mut self) -> Felt {
        self.next_tx += 1;
        Felt::from(0x7000 + self.next_tx)
    }
}

impl LedgerClient for MockLedger {
    type Program = MockProgram;

    fn account_address(&self) -> Felt {
        felt(DEPLOYER)
    }

    async fn class_exists(&self, class_hash: Felt) -> Result<bool, LedgerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Lookup(class_hash));

        if state.lookup_fails {
            return Err(LedgerError::other("RPC error 24: Block not found"));
        }
        let known = state.declared.values().any(|hash| *hash == class_hash);
        Ok(known)
    }

    async fn declare(
        &self,
        artifact: &ContractArtifact<MockProgram>,
        compiled_class_hash: Felt,
        _fees: &FeeConfig,
    ) -> Result<DeclareReceipt, LedgerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Declare {
            class: artifact.class.clone(),
            compiled_class_hash,
        });

        if let Some(&class_hash) = state.declared.get(&artifact.class) {
            return Err(
                LedgerError::new(LedgerErrorKind::AlreadyDeclared, "Class already declared")
                    .with_class_hash(class_hash),
            );
        }

        let script = state
            .scripts
            .get(&artifact.class)
            .cloned()
            .unwrap_or_else(|| DeclareScript::Reject("no script".to_string()));

        let class_hash = match script {
            DeclareScript::Accept(class_hash) => class_hash,
            DeclareScript::Reject(message) => return Err(LedgerError::other(message)),
            DeclareScript::ExpectCompiledHash {
                expected,
                class_hash,
            } => {
                if compiled_class_hash != expected {
                    return Err(LedgerError::other(format!(
                        "Compiled class hash mismatch for class {}. Actual: {}, Expected: {}",
                        class_hash.to_hex_string(),
                        compiled_class_hash.to_hex_string(),
                        expected.to_hex_string()
                    )));
                }
                class_hash
            }
        };

        state.declared.insert(artifact.class.clone(), class_hash);
        let transaction_hash = state.tx();
        Ok(DeclareReceipt {
            transaction_hash,
            class_hash,
        })
    }

    async fn deploy(
        &self,
        class_hash: Felt,
        constructor_calldata: &[Felt],
        _salt: Felt,
        _fees: &FeeConfig,
    ) -> Result<DeployReceipt, LedgerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Deploy {
            class_hash,
            calldata: constructor_calldata.to_vec(),
        });

        if state.failing_deploys.contains(&class_hash) {
            return Err(LedgerError::new(
                LedgerErrorKind::InsufficientFunds,
                "Insufficient account balance",
            ));
        }

        let address = state
            .addresses
            .get(&class_hash)
            .copied()
            .unwrap_or(class_hash + felt(0x1000));
        let transaction_hash = state.tx();
        state.deploy_txs.insert(transaction_hash);
        Ok(DeployReceipt {
            transaction_hash,
            address,
        })
    }

    async fn await_finality(
        &self,
        transaction_hash: Felt,
        _ceiling: Duration,
    ) -> Result<FinalStatus, LedgerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Await(transaction_hash));

        if state.deploy_txs.contains(&transaction_hash) {
            if let Some(status) = &state.deploy_status {
                return Ok(status.clone());
            }
        }
        Ok(FinalStatus::AcceptedOnL2)
    }
}

fn settings() -> OrchestratorSettings {
    OrchestratorSettings {
        network: "mock".to_string(),
        default_fees: FeeConfig::default(),
        finality_ceiling: Duration::from_secs(30),
        check_declared: false,
    }
}

fn settings_with_lookup() -> OrchestratorSettings {
    OrchestratorSettings {
        check_declared: true,
        ..settings()
    }
}

fn class_of(name: &str) -> ArgDescriptor {
    ArgDescriptor::ClassHashOf(name.to_string())
}

fn address_of(name: &str) -> ArgDescriptor {
    ArgDescriptor::AddressOf(name.to_string())
}

fn two_contracts() -> Manifest {
    Manifest::new(vec![
        ContractSpec::new("A"),
        ContractSpec::new("B").arg(class_of("A")),
    ])
    .expect("valid manifest")
}

#[tokio::test]
async fn test_end_to_end_class_reference_substitution() -> Result<()> {
    let store = MockStore::default();
    let ledger = MockLedger::default()
        .script("A", DeclareScript::Accept(felt(0x1)))
        .script("B", DeclareScript::Accept(felt(0x2)))
        .address(felt(0x1), felt(0x10))
        .address(felt(0x2), felt(0x20));

    let outcome = Orchestrator::new(&store, &ledger, settings())
        .deploy(&two_contracts())
        .await?;

    assert_eq!(outcome.exit(), RunExit::Success);
    assert_eq!(outcome.record.status, RunStatus::Complete);
    assert_eq!(outcome.record.deployer, felt(DEPLOYER));

    let names: Vec<_> = outcome.record.contracts.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["A", "B"]);

    let a = outcome.record.instance("A").unwrap();
    assert_eq!(a.class_hash, felt(0x1));
    assert_eq!(a.address, felt(0x10));
    assert!(a.declare_tx.is_some());
    assert_eq!(a.finality, "ACCEPTED_ON_L2");

    let b = outcome.record.instance("B").unwrap();
    assert_eq!(b.class_hash, felt(0x2));
    assert_eq!(b.address, felt(0x20));
    assert_eq!(b.constructor_calldata, vec![hex(0x1)]);
    assert_eq!(b.finality, "ACCEPTED_ON_L2");

    assert_eq!(
        ledger.deploy_calls(),
        vec![(felt(0x1), vec![]), (felt(0x2), vec![felt(0x1)])]
    );
    Ok(())
}

#[tokio::test]
async fn test_end_to_end_already_declared_with_embedded_hash() -> Result<()> {
    let store = MockStore::default().with_hash("A", felt(0x7));
    let ledger = MockLedger::default()
        .script(
            "A",
            DeclareScript::Reject("Class already declared: 0x99".to_string()),
        )
        .script("B", DeclareScript::Accept(felt(0x2)));

    let outcome = Orchestrator::new(&store, &ledger, settings())
        .deploy(&two_contracts())
        .await?;

    assert_eq!(outcome.exit(), RunExit::Success);
    assert_eq!(store.recomputations.load(Ordering::SeqCst), 0);

    let a = outcome.record.instance("A").unwrap();
    assert_eq!(a.class_hash, felt(0x99));
    assert!(a.declare_tx.is_none());
    assert_eq!(
        outcome.record.declared_class("A").unwrap().origin,
        DeclareOrigin::Recovered(RecoverySource::Embedded)
    );

    let deploys = ledger.deploy_calls();
    assert_eq!(deploys[0].0, felt(0x99));
    assert_eq!(deploys[1], (felt(0x2), vec![felt(0x99)]));
    Ok(())
}

#[tokio::test]
async fn test_cycle_makes_no_ledger_call() -> Result<()> {
    let store = MockStore::default();
    let ledger = MockLedger::default()
        .script("A", DeclareScript::Accept(felt(0x1)))
        .script("B", DeclareScript::Accept(felt(0x2)));

    let manifest = Manifest::new(vec![
        ContractSpec::new("Free"),
        ContractSpec::new("A").arg(class_of("B")),
        ContractSpec::new("B").arg(address_of("A")),
    ])?;

    let result = Orchestrator::new(&store, &ledger, settings())
        .deploy(&manifest)
        .await;

    assert!(matches!(result, Err(ConfigError::CyclicDependency(_))));
    assert!(ledger.calls().is_empty());
    assert_eq!(store.loads.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_rerun_resolves_through_already_declared() -> Result<()> {
    let store = MockStore::default();
    let ledger = MockLedger::default()
        .script("A", DeclareScript::Accept(felt(0x1)))
        .script("B", DeclareScript::Accept(felt(0x2)));
    let manifest = two_contracts();
    let orchestrator = Orchestrator::new(&store, &ledger, settings());

    let first = orchestrator.deploy(&manifest).await?;
    ledger.reset_calls();
    let second = orchestrator.deploy(&manifest).await?;

    for name in ["A", "B"] {
        assert_eq!(
            first.record.declared_class(name).unwrap().class_hash,
            second.record.declared_class(name).unwrap().class_hash
        );
        assert!(matches!(
            second.record.declared_class(name).unwrap().origin,
            DeclareOrigin::Recovered(_)
        ));
    }
    assert_eq!(second.exit(), RunExit::Success);

    // Every declare of the second run was answered as already declared and
    // never awaited.
    assert_eq!(ledger.declare_calls(), 2);
    let awaits = ledger
        .calls()
        .iter()
        .filter(|call| matches!(call, Call::Await(_)))
        .count();
    assert_eq!(awaits, 2);
    Ok(())
}

#[tokio::test]
async fn test_declare_failure_isolated_from_independent_contract() -> Result<()> {
    let store = MockStore::default();
    let ledger = MockLedger::default()
        .script(
            "A",
            DeclareScript::Reject("Account validation failed: invalid signature".to_string()),
        )
        .script("B", DeclareScript::Accept(felt(0x2)))
        .script("C", DeclareScript::Accept(felt(0x3)));

    let manifest = Manifest::new(vec![
        ContractSpec::new("A"),
        ContractSpec::new("B").arg(address_of("A")),
        ContractSpec::new("C"),
    ])?;

    let outcome = Orchestrator::new(&store, &ledger, settings())
        .deploy(&manifest)
        .await?;

    assert_eq!(outcome.record.status, RunStatus::Partial);
    assert_eq!(outcome.exit(), RunExit::RuntimeFailure);

    let failures = &outcome.record.failures;
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0].contract, "A");
    assert_eq!(failures[0].stage, Stage::Declare);
    assert_eq!(failures[0].kind, FailureKind::DeclareFailed);
    assert_eq!(failures[1].contract, "B");
    assert_eq!(failures[1].kind, FailureKind::DependencyFailed);

    // Neither A nor its dependent B was deployed; C was.
    assert!(outcome.record.instance("C").is_some());
    assert_eq!(ledger.deploy_calls(), vec![(felt(0x3), vec![])]);
    assert!(
        !ledger
            .calls()
            .iter()
            .any(|call| matches!(call, Call::Declare { class, .. } if class == "B"))
    );
    Ok(())
}

#[tokio::test]
async fn test_shared_class_is_declared_once() -> Result<()> {
    let store = MockStore::default();
    let ledger = MockLedger::default().script("Token", DeclareScript::Accept(felt(0x5)));

    let mut eth = ContractSpec::new("ETH");
    eth.class = Some("Token".to_string());
    let mut strk = ContractSpec::new("STRK");
    strk.class = Some("Token".to_string());

    let manifest = Manifest::new(vec![eth, strk])?;
    let outcome = Orchestrator::new(&store, &ledger, settings())
        .deploy(&manifest)
        .await?;

    assert_eq!(ledger.declare_calls(), 1);
    assert_eq!(ledger.deploy_calls().len(), 2);
    assert_eq!(outcome.record.contracts.len(), 2);
    assert_eq!(
        outcome.record.declared_class("STRK").unwrap().origin,
        DeclareOrigin::Cached
    );
    Ok(())
}

#[tokio::test]
async fn test_declare_only_class_feeds_constructor() -> Result<()> {
    let store = MockStore::default();
    let ledger = MockLedger::default()
        .script("Verifier", DeclareScript::Accept(felt(0xabc)))
        .script("ZKPassport", DeclareScript::Accept(felt(0x2)));

    let manifest = Manifest::new(vec![
        ContractSpec::new("ZKPassport")
            .arg(ArgDescriptor::DeployerAddress)
            .arg(class_of("Verifier"))
            .arg(ArgDescriptor::U256(snup_deploy::U256Literal { low: 70, high: 0 })),
        ContractSpec::new("Verifier").declare_only(),
    ])?;

    let outcome = Orchestrator::new(&store, &ledger, settings())
        .deploy(&manifest)
        .await?;

    assert_eq!(outcome.exit(), RunExit::Success);
    assert!(outcome.record.instance("Verifier").is_none());
    assert!(outcome.record.declared_class("Verifier").is_some());
    assert_eq!(
        ledger.deploy_calls(),
        vec![(
            felt(0x2),
            vec![felt(DEPLOYER), felt(0xabc), felt(70), Felt::ZERO]
        )]
    );
    Ok(())
}

#[tokio::test]
async fn test_compiled_hash_mismatch_is_retried_once() -> Result<()> {
    let store = MockStore::default();
    let ledger = MockLedger::default().script(
        "Verifier",
        DeclareScript::ExpectCompiledHash {
            expected: felt(0xb9),
            class_hash: felt(0x44),
        },
    );

    let manifest = Manifest::new(vec![ContractSpec::new("Verifier").declare_only()])?;
    let outcome = Orchestrator::new(&store, &ledger, settings())
        .deploy(&manifest)
        .await?;

    assert_eq!(outcome.exit(), RunExit::Success);
    let declares: Vec<_> = ledger
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::Declare {
                compiled_class_hash,
                ..
            } => Some(compiled_class_hash),
            _ => None,
        })
        .collect();
    assert_eq!(declares, vec![felt(0xc0), felt(0xb9)]);

    let declared = outcome.record.declared_class("Verifier").unwrap();
    assert_eq!(declared.class_hash, felt(0x44));
    assert_eq!(declared.origin, DeclareOrigin::Declared);
    Ok(())
}

#[tokio::test]
async fn test_finality_timeout_is_recoverable_exit() -> Result<()> {
    let store = MockStore::default();
    let ledger = MockLedger::default()
        .script("A", DeclareScript::Accept(felt(0x1)))
        .deploy_status(FinalStatus::TimedOut);

    let manifest = Manifest::new(vec![ContractSpec::new("A")])?;
    let outcome = Orchestrator::new(&store, &ledger, settings())
        .deploy(&manifest)
        .await?;

    assert_eq!(outcome.exit(), RunExit::FinalityTimeout);
    assert_eq!(outcome.exit().code(), 3);
    assert_eq!(outcome.record.status, RunStatus::Failed);
    assert_eq!(outcome.record.failures[0].stage, Stage::Await);
    assert!(outcome.record.contracts.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_reverted_deploy_fails_dependents() -> Result<()> {
    let store = MockStore::default();
    let ledger = MockLedger::default()
        .script("A", DeclareScript::Accept(felt(0x1)))
        .script("B", DeclareScript::Accept(felt(0x2)))
        .deploy_status(FinalStatus::Reverted("out of gas".to_string()));

    let manifest = Manifest::new(vec![
        ContractSpec::new("A"),
        ContractSpec::new("B").arg(address_of("A")),
    ])?;
    let outcome = Orchestrator::new(&store, &ledger, settings())
        .deploy(&manifest)
        .await?;

    assert_eq!(outcome.record.failures[0].kind, FailureKind::TransactionFailed);
    assert!(outcome.record.failures[0].detail.contains("out of gas"));
    assert_eq!(outcome.record.failures[1].kind, FailureKind::DependencyFailed);
    assert_eq!(ledger.deploy_calls().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_deploy_failure_keeps_declared_class() -> Result<()> {
    let store = MockStore::default();
    let ledger = MockLedger::default()
        .script("A", DeclareScript::Accept(felt(0x1)))
        .failing_deploy(felt(0x1));

    let manifest = Manifest::new(vec![ContractSpec::new("A")])?;
    let outcome = Orchestrator::new(&store, &ledger, settings())
        .deploy(&manifest)
        .await?;

    assert_eq!(outcome.record.failures[0].stage, Stage::Deploy);
    assert_eq!(outcome.record.failures[0].kind, FailureKind::DeployFailed);
    assert_eq!(
        outcome.record.declared_class("A").unwrap().class_hash,
        felt(0x1)
    );
    Ok(())
}

#[tokio::test]
async fn test_missing_artifact_is_configuration_exit() -> Result<()> {
    let store = MockStore::default().missing("A");
    let ledger = MockLedger::default().script("B", DeclareScript::Accept(felt(0x2)));

    let manifest = Manifest::new(vec![ContractSpec::new("A"), ContractSpec::new("B")])?;
    let outcome = Orchestrator::new(&store, &ledger, settings())
        .deploy(&manifest)
        .await?;

    assert_eq!(outcome.exit(), RunExit::ConfigurationError);
    assert_eq!(outcome.record.failures[0].kind, FailureKind::ArtifactNotFound);
    assert_eq!(outcome.record.failures[0].stage, Stage::Load);
    assert!(outcome.record.instance("B").is_some());
    Ok(())
}

#[tokio::test]
async fn test_unresolvable_class_is_never_guessed() -> Result<()> {
    // No embedded hash, program cannot be hashed, no fallback.
    let store = MockStore::default();
    let ledger = MockLedger::default().script(
        "A",
        DeclareScript::Reject("Class already declared".to_string()),
    );

    let manifest = Manifest::new(vec![ContractSpec::new("A")])?;
    let outcome = Orchestrator::new(&store, &ledger, settings())
        .deploy(&manifest)
        .await?;

    assert_eq!(outcome.record.failures[0].kind, FailureKind::UnresolvableClass);
    assert_eq!(outcome.record.failures[0].stage, Stage::Resolve);
    assert!(ledger.deploy_calls().is_empty());
    assert_eq!(store.recomputations.load(Ordering::SeqCst), 1);

    // With a fallback configured the same contract resolves.
    let mut spec = ContractSpec::new("A");
    spec.fallback_class_hash = Some(felt(0x4829));
    let outcome = Orchestrator::new(&store, &ledger, settings())
        .deploy(&Manifest::new(vec![spec])?)
        .await?;
    assert_eq!(outcome.exit(), RunExit::Success);
    assert_eq!(outcome.record.instance("A").unwrap().class_hash, felt(0x4829));
    Ok(())
}

#[tokio::test]
async fn test_partial_record_is_written() -> Result<()> {
    let temp_dir = TempDir::new("snup-test")?;
    let path = temp_dir.path().join("deployments.json");

    let store = MockStore::default();
    let ledger = MockLedger::default()
        .script("A", DeclareScript::Accept(felt(0x1)))
        .script("B", DeclareScript::Reject("boom".to_string()));

    let manifest = Manifest::new(vec![ContractSpec::new("A"), ContractSpec::new("B")])?;
    let outcome = Orchestrator::new(&store, &ledger, settings())
        .deploy(&manifest)
        .await?;

    JsonRecordWriter::new(&path).write(&outcome.record)?;
    let loaded: DeploymentRecord = serde_json::from_str(&std::fs::read_to_string(&path)?)?;

    assert_eq!(loaded.status, RunStatus::Partial);
    assert_eq!(loaded.network, "mock");
    assert_eq!(loaded.contracts.len(), 1);
    assert_eq!(loaded.failures.len(), 1);
    assert!(loaded.finished_at >= loaded.started_at);
    Ok(())
}

#[tokio::test]
async fn test_run_context_exposes_resolved_values() -> Result<()> {
    let store = MockStore::default();
    let ledger = MockLedger::default()
        .script("A", DeclareScript::Accept(felt(0x1)))
        .script("B", DeclareScript::Accept(felt(0x2)))
        .address(felt(0x1), felt(0x10));

    let mut ctx = RunContext::new();
    Orchestrator::new(&store, &ledger, settings())
        .run(&two_contracts(), &mut ctx)
        .await?;

    assert_eq!(ctx.class_hash("A"), Some(felt(0x1)));
    assert_eq!(ctx.address("A"), Some(felt(0x10)));
    assert!(ctx.failures().is_empty());
    assert_eq!(ctx.instances().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_known_class_skips_declare() -> Result<()> {
    let store = MockStore::default().with_hash("A", felt(0x1));
    let ledger = MockLedger::default()
        .declared("A", felt(0x1))
        .address(felt(0x1), felt(0x10));

    let manifest = Manifest::new(vec![ContractSpec::new("A")])?;
    let outcome = Orchestrator::new(&store, &ledger, settings_with_lookup())
        .deploy(&manifest)
        .await?;

    assert_eq!(outcome.exit(), RunExit::Success);
    assert_eq!(ledger.declare_calls(), 0);
    assert_eq!(ledger.calls()[0], Call::Lookup(felt(0x1)));
    assert_eq!(
        outcome.record.declared_class("A").unwrap().origin,
        DeclareOrigin::Recovered(RecoverySource::Recomputed)
    );

    let a = outcome.record.instance("A").unwrap();
    assert_eq!(a.class_hash, felt(0x1));
    assert_eq!(a.address, felt(0x10));
    assert!(a.declare_tx.is_none());
    Ok(())
}

#[tokio::test]
async fn test_unknown_class_is_declared_after_lookup() -> Result<()> {
    let store = MockStore::default().with_hash("A", felt(0x1));
    let ledger = MockLedger::default().script("A", DeclareScript::Accept(felt(0x1)));

    let manifest = Manifest::new(vec![ContractSpec::new("A")])?;
    let outcome = Orchestrator::new(&store, &ledger, settings_with_lookup())
        .deploy(&manifest)
        .await?;

    assert_eq!(outcome.exit(), RunExit::Success);
    assert_eq!(ledger.calls()[0], Call::Lookup(felt(0x1)));
    assert_eq!(ledger.declare_calls(), 1);
    assert_eq!(
        outcome.record.declared_class("A").unwrap().origin,
        DeclareOrigin::Declared
    );
    Ok(())
}

#[tokio::test]
async fn test_failed_lookup_falls_back_to_declare() -> Result<()> {
    let store = MockStore::default().with_hash("A", felt(0x1));
    let ledger = MockLedger::default()
        .declared("A", felt(0x1))
        .lookup_fails();

    let manifest = Manifest::new(vec![ContractSpec::new("A")])?;
    let outcome = Orchestrator::new(&store, &ledger, settings_with_lookup())
        .deploy(&manifest)
        .await?;

    // The declare is answered as already declared with the class hash attached.
    assert_eq!(outcome.exit(), RunExit::Success);
    assert_eq!(ledger.declare_calls(), 1);
    assert_eq!(
        outcome.record.declared_class("A").unwrap().origin,
        DeclareOrigin::Recovered(RecoverySource::Embedded)
    );
    Ok(())
}

#[tokio::test]
async fn test_shared_class_with_default_package_is_declared_once() -> Result<()> {
    let store = MockStore::default().package("contracts");
    let ledger = MockLedger::default().script("Token", DeclareScript::Accept(felt(0x5)));

    let mut eth = ContractSpec::new("ETH");
    eth.class = Some("Token".to_string());
    let mut strk = ContractSpec::new("STRK");
    strk.class = Some("Token".to_string());
    strk.package = Some("contracts".to_string());

    let manifest = Manifest::new(vec![eth, strk])?;
    let outcome = Orchestrator::new(&store, &ledger, settings())
        .deploy(&manifest)
        .await?;

    assert_eq!(ledger.declare_calls(), 1);
    assert_eq!(
        outcome.record.declared_class("STRK").unwrap().origin,
        DeclareOrigin::Cached
    );
    Ok(())
}
