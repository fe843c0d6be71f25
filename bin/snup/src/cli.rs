use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::level_filters::LevelFilter;
use url::Url;

#[derive(Parser)]
#[command(name = "snup")]
#[command(
    author,
    version,
    about = "Declare and deploy a set of interdependent Starknet contracts"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "SNUP_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to the Snup.toml configuration file, or to the directory holding it.
    ///
    /// Values from the file are overridden by `SNUP_` environment variables
    /// (`SNUP_NETWORK__PRIVATE_KEY`, ...) and then by command-line flags.
    #[arg(short, long, alias = "conf", env = "SNUP_CONFIG", default_value = ".")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Declare and deploy every contract of the manifest.
    Deploy(DeployArgs),
    /// Validate the configuration and print the deployment order.
    ///
    /// Makes no network call.
    Plan,
}

#[derive(Debug, Clone, Default, Args, Serialize)]
pub struct DeployArgs {
    #[command(flatten)]
    #[serde(skip_serializing_if = "NetworkOverrides::is_empty")]
    pub network: NetworkOverrides,

    /// Where to write the deployment record.
    #[arg(long = "record", alias = "record-path")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_path: Option<PathBuf>,
}

/// Network settings that can be overridden from the command line.
#[derive(Debug, Clone, Default, Args, Serialize)]
pub struct NetworkOverrides {
    /// The URL of the Starknet JSON-RPC endpoint.
    #[arg(long, alias = "rpc")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<Url>,

    /// The network name written to the deployment record.
    #[arg(long = "network-name", alias = "name")]
    #[serde(rename = "name", skip_serializing_if = "Option::is_none")]
    pub network_name: Option<String>,
}

impl NetworkOverrides {
    fn is_empty(&self) -> bool {
        self.rpc_url.is_none() && self.network_name.is_none()
    }
}
