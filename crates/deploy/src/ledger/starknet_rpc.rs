//! [`LedgerClient`] backed by a Starknet JSON-RPC node.
//!
//! Submission goes through a starknet-rs single-owner account; finality is
//! polled with plain `starknet_getTransactionStatus` calls.

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use starknet::{
    accounts::{Account, AccountError, ExecutionEncoding, SingleOwnerAccount},
    contract::ContractFactory,
    core::types::{Felt, FlattenedSierraClass, StarknetError},
    providers::{JsonRpcClient, ProviderError, jsonrpc::HttpTransport},
    signers::{LocalWallet, SigningKey},
};
use url::Url;

use super::{
    DeclareReceipt, DeployReceipt, FinalStatus, LedgerClient, LedgerError, LedgerErrorKind,
};
use crate::{
    artifacts::ContractArtifact,
    fees::{FeeConfig, ResourceBound},
    felt::to_hex,
    resolver::expected_compiled_class_hash,
    rpc,
};

/// Connection settings of [`StarknetLedger`].
#[derive(Clone)]
pub struct StarknetLedgerConfig {
    pub rpc_url: Url,
    pub account_address: Felt,
    pub private_key: Felt,
    /// Expected chain id. Fetched from the node when unset.
    pub chain_id: Option<Felt>,
    pub poll_interval: Duration,
}

impl std::fmt::Debug for StarknetLedgerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StarknetLedgerConfig")
            .field("rpc_url", &self.rpc_url.as_str())
            .field("account_address", &to_hex(&self.account_address))
            .field("private_key", &"<redacted>")
            .field("chain_id", &self.chain_id.as_ref().map(to_hex))
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

type RpcAccount = SingleOwnerAccount<JsonRpcClient<HttpTransport>, LocalWallet>;

/// Ledger client talking to a Starknet node.
pub struct StarknetLedger {
    account: RpcAccount,
    http: reqwest::Client,
    rpc_url: Url,
    chain_id: Felt,
    poll_interval: Duration,
}

impl StarknetLedger {
    /// Connect to the node and build the signing account.
    ///
    /// Fails if the node is unreachable or reports a chain id different from
    /// the configured one.
    pub async fn connect(config: StarknetLedgerConfig) -> anyhow::Result<Self> {
        let http = rpc::create_client()?;

        let node_chain_id = rpc::get_chain_id(&http, config.rpc_url.as_str())
            .await
            .with_context(|| format!("Failed to fetch chain id from {}", config.rpc_url))?;

        if let Some(expected) = config.chain_id {
            if expected != node_chain_id {
                anyhow::bail!(
                    "Chain id mismatch: configured {}, node at {} reports {}",
                    to_hex(&expected),
                    config.rpc_url,
                    to_hex(&node_chain_id)
                );
            }
        }

        let provider = JsonRpcClient::new(HttpTransport::new(config.rpc_url.clone()));
        let signer = LocalWallet::from(SigningKey::from_secret_scalar(config.private_key));
        let account = SingleOwnerAccount::new(
            provider,
            signer,
            config.account_address,
            node_chain_id,
            ExecutionEncoding::New,
        );

        tracing::info!(
            rpc_url = %config.rpc_url,
            chain_id = %to_hex(&node_chain_id),
            account = %to_hex(&config.account_address),
            "Connected to Starknet node"
        );

        Ok(Self {
            account,
            http,
            rpc_url: config.rpc_url,
            chain_id: node_chain_id,
            poll_interval: config.poll_interval,
        })
    }

    async fn status(&self, transaction_hash: Felt) -> anyhow::Result<Option<FinalStatus>> {
        let status =
            rpc::get_transaction_status(&self.http, self.rpc_url.as_str(), transaction_hash).await?;
        Ok(final_status(&status))
    }
}

/// Map an RPC status to a terminal state, or `None` while still pending.
fn final_status(status: &rpc::TransactionStatus) -> Option<FinalStatus> {
    let reason = || {
        status
            .failure_reason
            .clone()
            .unwrap_or_else(|| "no reason given".to_string())
    };

    if status.execution_status.as_deref() == Some("REVERTED") {
        return Some(FinalStatus::Reverted(reason()));
    }

    match status.finality_status.as_str() {
        "ACCEPTED_ON_L2" => Some(FinalStatus::AcceptedOnL2),
        "ACCEPTED_ON_L1" => Some(FinalStatus::AcceptedOnL1),
        "REJECTED" => Some(FinalStatus::Rejected(reason())),
        _ => None,
    }
}

/// Translate an account error into a classified ledger error.
fn ledger_error<S>(err: AccountError<S>) -> LedgerError
where
    AccountError<S>: std::fmt::Display,
{
    let message = err.to_string();
    let kind = match &err {
        AccountError::Provider(ProviderError::StarknetError(starknet_error)) => {
            match starknet_error {
                StarknetError::ClassAlreadyDeclared => LedgerErrorKind::AlreadyDeclared,
                StarknetError::InsufficientAccountBalance => LedgerErrorKind::InsufficientFunds,
                StarknetError::CompiledClassHashMismatch => {
                    LedgerErrorKind::CompiledClassHashMismatch {
                        expected: expected_compiled_class_hash(&message),
                    }
                }
                _ => LedgerErrorKind::Other,
            }
        }
        _ => LedgerErrorKind::Other,
    };
    LedgerError::new(kind, message)
}

fn unsupported_fee_mode() -> LedgerError {
    LedgerError::other(concat!(
        "the max_fee fee mode needs a legacy transaction version; ",
        "use `estimated` or `resource_bounds`"
    ))
}

/// Resource bounds to apply, or `None` to let the SDK estimate.
fn bounds(fees: &FeeConfig) -> Result<Option<[ResourceBound; 3]>, LedgerError> {
    match fees {
        FeeConfig::Estimated => Ok(None),
        FeeConfig::MaxFee { .. } => Err(unsupported_fee_mode()),
        FeeConfig::ResourceBounds {
            l1_gas,
            l2_gas,
            l1_data_gas,
        } => Ok(Some([*l1_gas, *l2_gas, *l1_data_gas])),
    }
}

impl LedgerClient for StarknetLedger {
    type Program = FlattenedSierraClass;

    fn account_address(&self) -> Felt {
        self.account.address()
    }

    fn chain_id(&self) -> Option<Felt> {
        Some(self.chain_id)
    }

    async fn class_exists(&self, class_hash: Felt) -> Result<bool, LedgerError> {
        rpc::class_exists(&self.http, self.rpc_url.as_str(), class_hash)
            .await
            .map_err(|e| LedgerError::other(format!("{:#}", e)))
    }

    async fn declare(
        &self,
        artifact: &ContractArtifact<Self::Program>,
        compiled_class_hash: Felt,
        fees: &FeeConfig,
    ) -> Result<DeclareReceipt, LedgerError> {
        let declaration = self
            .account
            .declare_v3(Arc::clone(&artifact.program), compiled_class_hash);

        let declaration = match bounds(fees)? {
            None => declaration,
            Some([l1, l2, l1_data]) => declaration
                .l1_gas(l1.max_amount)
                .l1_gas_price(l1.max_price_per_unit)
                .l2_gas(l2.max_amount)
                .l2_gas_price(l2.max_price_per_unit)
                .l1_data_gas(l1_data.max_amount)
                .l1_data_gas_price(l1_data.max_price_per_unit),
        };

        let result = declaration.send().await.map_err(ledger_error)?;

        Ok(DeclareReceipt {
            transaction_hash: result.transaction_hash,
            class_hash: result.class_hash,
        })
    }

    async fn deploy(
        &self,
        class_hash: Felt,
        constructor_calldata: &[Felt],
        salt: Felt,
        fees: &FeeConfig,
    ) -> Result<DeployReceipt, LedgerError> {
        let factory = ContractFactory::new(class_hash, &self.account);
        let deployment = factory.deploy_v3(constructor_calldata.to_vec(), salt, true);

        let deployment = match bounds(fees)? {
            None => deployment,
            Some([l1, l2, l1_data]) => deployment
                .l1_gas(l1.max_amount)
                .l1_gas_price(l1.max_price_per_unit)
                .l2_gas(l2.max_amount)
                .l2_gas_price(l2.max_price_per_unit)
                .l1_data_gas(l1_data.max_amount)
                .l1_data_gas_price(l1_data.max_price_per_unit),
        };

        let address = deployment.deployed_address();
        let result = deployment.send().await.map_err(ledger_error)?;

        Ok(DeployReceipt {
            transaction_hash: result.transaction_hash,
            address,
        })
    }

    async fn await_finality(
        &self,
        transaction_hash: Felt,
        ceiling: Duration,
    ) -> Result<FinalStatus, LedgerError> {
        let name = to_hex(&transaction_hash);
        let status = rpc::poll_until(&name, ceiling, self.poll_interval, || {
            self.status(transaction_hash)
        })
        .await;

        Ok(status.unwrap_or(FinalStatus::TimedOut))
    }
}
