//! Definitions of CLI arguments and commands for deploy scripts

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

use crate::{
    chain::{artifacts::ArtifactStore, rpc::setup_client, ChainClient},
    commands::{addresses, configure, deploy, upgrade},
    config::DeployConfig,
    constants::{DEFAULT_ARTIFACTS_DIR, DEFAULT_CONFIG_PATH, DEFAULT_DEPLOYMENTS_PATH},
    errors::ScriptError,
    events::EventSink,
};

/// Deploy and configure the vault protocol contracts
#[derive(Parser)]
pub struct Cli {
    /// Private key of the deployer
    #[arg(short, long, env = "PRIVATE_KEY", hide_env_values = true)]
    pub priv_key: Option<String>,

    /// Network RPC URL
    #[arg(short, long, env = "RPC_URL")]
    pub rpc_url: Option<String>,

    /// Path to the static deploy configuration
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Path to the file in which deployed addresses are persisted
    #[arg(short, long, default_value = DEFAULT_DEPLOYMENTS_PATH)]
    pub deployments_path: PathBuf,

    /// Directory containing the compiled contract artifacts
    #[arg(short, long, default_value = DEFAULT_ARTIFACTS_DIR)]
    pub artifacts: PathBuf,

    /// The command to run
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Load the configuration and run the selected command.
    /// A network client is only built for the commands which send transactions.
    pub async fn run(self, sink: &dyn EventSink) -> Result<(), ScriptError> {
        let Cli {
            priv_key,
            rpc_url,
            config,
            deployments_path,
            artifacts,
            command,
        } = self;
        let config = DeployConfig::from_file(&config)?;

        match command {
            Command::Addresses(args) => addresses(args, sink, &config, &deployments_path),
            command => {
                let priv_key = require_credential(priv_key, "PRIVATE_KEY")?;
                let rpc_url = require_credential(rpc_url, "RPC_URL")?;
                let client = setup_client(&priv_key, &rpc_url, ArtifactStore::new(artifacts))?;

                command
                    .run(&client, sink, &config, &deployments_path)
                    .await
            }
        }
    }
}

/// Unwrap a credential needed to connect to the network
fn require_credential(value: Option<String>, name: &str) -> Result<String, ScriptError> {
    value.ok_or_else(|| ScriptError::ClientInitialization(format!("{name} is not set")))
}

/// The available commands
#[derive(Subcommand)]
pub enum Command {
    /// Deploy the enabled targets in dependency order
    Deploy(DeployArgs),
    /// Run the enabled post-deployment operations
    Configure(ConfigureArgs),
    /// Upgrade the implementation behind a transparent proxy
    Upgrade(UpgradeArgs),
    /// Print the resolved address table without sending any transaction
    Addresses(AddressesArgs),
}

impl Command {
    /// Run the command
    pub async fn run<C: ChainClient + ?Sized>(
        self,
        client: &C,
        sink: &dyn EventSink,
        config: &DeployConfig,
        deployments_path: &Path,
    ) -> Result<(), ScriptError> {
        match self {
            Command::Deploy(args) => deploy(args, client, sink, config, deployments_path).await,
            Command::Configure(args) => {
                configure(args, client, sink, config, deployments_path).await
            }
            Command::Upgrade(args) => upgrade(args, client, sink).await,
            Command::Addresses(args) => addresses(args, sink, config, deployments_path),
        }
    }
}

/// Deploy the enabled targets
#[derive(Args)]
pub struct DeployArgs {
    /// Run the post-deployment operations against the resolved addresses
    #[arg(long)]
    pub configure: bool,

    /// Fill unset static addresses from the deployments file
    #[arg(long)]
    pub resume: bool,

    /// Do not write the resolved addresses to the deployments file
    #[arg(long)]
    pub no_persist: bool,
}

/// Run the post-deployment operations
#[derive(Args)]
pub struct ConfigureArgs {
    /// Fill unset static addresses from the deployments file
    #[arg(long)]
    pub resume: bool,
}

/// Upgrade a transparent proxy's implementation
#[derive(Args)]
pub struct UpgradeArgs {
    /// Address of the proxy admin contract
    #[arg(long)]
    pub proxy_admin: String,

    /// Address of the proxy contract
    #[arg(long)]
    pub proxy: String,

    /// Address of the new implementation contract
    #[arg(short, long)]
    pub implementation: String,

    /// Optional calldata, in hex form, with which to
    /// call the implementation contract when upgrading
    #[arg(long)]
    pub calldata: Option<String>,
}

/// Print the resolved address table
#[derive(Args)]
pub struct AddressesArgs {
    /// Fill unset static addresses from the deployments file
    #[arg(long)]
    pub resume: bool,
}
