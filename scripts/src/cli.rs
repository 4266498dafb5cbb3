//! Definitions of CLI arguments and commands for deploy scripts

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{
    backend::rpc::RpcBackend,
    commands::{deploy_upgradeable, status},
    constants::{
        DEFAULT_ADMIN_CHANGE_METHOD, DEFAULT_ARTIFACTS_DIR, DEFAULT_CONFIRMATIONS,
        DEFAULT_CONFIRMATION_TIMEOUT_SECS, DEFAULT_DEPLOYMENTS_PATH, DEFAULT_INITIALIZER,
        DEFAULT_PROXY_CONTRACT, DEFAULT_RPC_URL,
    },
    deployments::DeploymentsFile,
    errors::DeployError,
    resolver::ArtifactDirResolver,
    types::{AdminAddress, AdminSlot},
};

/// Deploy contracts behind admin-upgradeable proxies
#[derive(Parser)]
pub struct Cli {
    /// Private key of the deployer
    #[arg(short, long, env = "PKEY")]
    pub priv_key: String,

    /// Network RPC URL
    #[arg(short, long, env = "RPC_URL", default_value = DEFAULT_RPC_URL)]
    pub rpc_url: String,

    /// Directory holding the compiled contract artifacts
    #[arg(long, default_value = DEFAULT_ARTIFACTS_DIR)]
    pub artifacts: PathBuf,

    /// Path to the file recording deployed addresses
    #[arg(long, default_value = DEFAULT_DEPLOYMENTS_PATH)]
    pub deployments: PathBuf,

    /// Number of confirmations to wait for on each transaction
    #[arg(
        long,
        default_value_t = DEFAULT_CONFIRMATIONS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub confirmations: u64,

    /// Seconds to wait for a transaction's confirmations before giving up
    #[arg(long, default_value_t = DEFAULT_CONFIRMATION_TIMEOUT_SECS)]
    pub confirmation_timeout_secs: u64,

    /// Gas limit attached to every transaction
    #[arg(long)]
    pub gas_limit: Option<u64>,

    /// The chain id the node is expected to report
    #[arg(long)]
    pub chain_id: Option<u64>,

    /// The command to run
    #[command(subcommand)]
    pub command: Command,
}

/// The available commands
#[derive(Subcommand)]
pub enum Command {
    /// Deploy a contract behind a proxy, initialize it and hand the proxy to an admin
    DeployUpgradeable(DeployUpgradeableArgs),
    /// Print the recorded progress of a deployment and its proxy's admin
    Status(StatusArgs),
}

impl Command {
    /// Run the command against the connected node
    pub async fn run(
        self,
        backend: RpcBackend,
        resolver: ArtifactDirResolver,
        deployments: DeploymentsFile,
    ) -> Result<(), DeployError> {
        match self {
            Command::DeployUpgradeable(args) => {
                deploy_upgradeable(args, backend, resolver, deployments).await
            }
            Command::Status(args) => status(args, backend, deployments).await,
        }
    }
}

/// Deploy an implementation and an admin-upgradeable proxy over it.
///
/// The proxy is deployed with the implementation's address, its admin rights
/// are handed to `--admin`, and the implementation's initializer is called
/// through the proxy. Without `--fresh` the run picks up where the
/// deployments file says a previous run stopped.
#[derive(Args)]
pub struct DeployUpgradeableArgs {
    /// Name of the implementation contract's artifact
    #[arg(short, long)]
    pub contract: String,

    /// Address to hand the proxy's admin rights to
    #[arg(short, long)]
    pub admin: AdminAddress,

    /// Initializer argument, in order; repeat for each argument
    #[arg(long = "init-arg")]
    pub init_args: Vec<String>,

    /// Name of the proxy contract's artifact
    #[arg(long, default_value = DEFAULT_PROXY_CONTRACT)]
    pub proxy_contract: String,

    /// The proxy method transferring admin rights
    #[arg(long, default_value = DEFAULT_ADMIN_CHANGE_METHOD)]
    pub admin_change_method: String,

    /// The implementation's initializer
    #[arg(long, default_value = DEFAULT_INITIALIZER)]
    pub initializer: String,

    /// The storage slot the proxy keeps its admin in
    #[arg(long, value_enum, default_value_t = AdminSlot::default())]
    pub admin_slot: AdminSlot,

    /// Initialize before handing off admin rights. Transparent proxies
    /// reject this order.
    #[arg(long)]
    pub init_before_admin_change: bool,

    /// Ignore any recorded progress and deploy from scratch
    #[arg(long)]
    pub fresh: bool,
}

/// Print the recorded progress of a deployment
#[derive(Args)]
pub struct StatusArgs {
    /// Name of the implementation contract's artifact
    #[arg(short, long)]
    pub contract: String,

    /// The storage slot the proxy keeps its admin in
    #[arg(long, value_enum, default_value_t = AdminSlot::default())]
    pub admin_slot: AdminSlot,
}
