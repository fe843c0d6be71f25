//! snup is a CLI tool to declare and deploy a set of interdependent Starknet
//! contracts in one run.

mod cli;
mod report;

use std::{path::Path, process::ExitCode};

use anyhow::{Context, Result};
use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use cli::{Cli, Command, DeployArgs};
use snup_deploy::{
    DeployConfig, JsonRecordWriter, Orchestrator, RecordWriter, RunExit, StarknetLedger, sequence,
};

/// Build the configuration from the TOML file, `SNUP_` environment variables
/// and command-line overrides, in increasing order of precedence.
fn load_config(path: &Path, overrides: &DeployArgs) -> Result<DeployConfig> {
    let config_path = DeployConfig::resolve_path(path)?;

    let config: DeployConfig = Figment::new()
        .merge(Toml::file(&config_path))
        .merge(
            Env::prefixed("SNUP_")
                .ignore(&["VERBOSITY", "CONFIG"])
                .split("__"),
        )
        .merge(Serialized::defaults(overrides))
        .extract()
        .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;

    tracing::info!(
        path = %config_path.display(),
        network = %config.network.name,
        contracts = config.contracts.len(),
        "Configuration loaded"
    );

    Ok(config)
}

fn plan(cli: &Cli) -> Result<RunExit> {
    let config = match load_config(&cli.config, &DeployArgs::default()) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %format!("{:#}", err), "Failed to load configuration");
            return Ok(RunExit::ConfigurationError);
        }
    };

    let manifest = match config.manifest() {
        Ok(manifest) => manifest,
        Err(err) => {
            tracing::error!(error = %err, "Invalid manifest");
            return Ok(RunExit::ConfigurationError);
        }
    };

    let order = sequence(&manifest)?;
    println!("{}", report::plan_table(&order));

    Ok(RunExit::Success)
}

async fn deploy(cli: &Cli, args: &DeployArgs) -> Result<RunExit> {
    let config = match load_config(&cli.config, args) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %format!("{:#}", err), "Failed to load configuration");
            return Ok(RunExit::ConfigurationError);
        }
    };

    let manifest = match config.validate() {
        Ok(manifest) => manifest,
        Err(err) => {
            tracing::error!(error = %err, "Invalid configuration");
            return Ok(RunExit::ConfigurationError);
        }
    };

    let ledger_config = config.ledger_config()?;
    let ledger = StarknetLedger::connect(ledger_config).await?;
    let store = config.artifact_store();

    let orchestrator = Orchestrator::new(&store, &ledger, config.settings());
    let outcome = orchestrator.deploy(&manifest).await?;

    JsonRecordWriter::new(&config.record_path).write(&outcome.record)?;

    for table in report::summary_tables(&outcome.record) {
        println!("{}", table);
    }

    let exit = outcome.exit();
    tracing::info!(
        status = %outcome.record.status,
        exit = %exit,
        record = %config.record_path.display(),
        "Deployment finished"
    );

    Ok(exit)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let result = match &cli.command {
        Command::Deploy(args) => deploy(&cli, args).await,
        Command::Plan => plan(&cli),
    };

    match result {
        Ok(exit) => ExitCode::from(exit.code()),
        Err(err) => {
            tracing::error!(error = %format!("{:#}", err), "Deployment aborted");
            ExitCode::from(RunExit::RuntimeFailure.code())
        }
    }
}
