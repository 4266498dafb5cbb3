use std::time::Duration;

use clap::Parser;
use proxy_deploy_scripts::{
    backend::ConfirmationPolicy, cli::Cli, deployments::DeploymentsFile,
    resolver::ArtifactDirResolver, utils::setup_backend,
};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let Cli {
        priv_key,
        rpc_url,
        artifacts,
        deployments,
        confirmations,
        confirmation_timeout_secs,
        gas_limit,
        chain_id,
        command,
    } = Cli::parse();

    tracing_subscriber::fmt().pretty().init();

    let policy = ConfirmationPolicy::new(
        confirmations,
        Duration::from_secs(confirmation_timeout_secs),
    );
    let backend = setup_backend(&rpc_url, &priv_key, policy, gas_limit, chain_id).await?;

    let deployments = DeploymentsFile::open(deployments, backend.chain_id())?;
    let resolver = ArtifactDirResolver::new(artifacts);

    command.run(backend, resolver, deployments).await?;
    Ok(())
}
