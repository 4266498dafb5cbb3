//! Implementations of the deploy script commands

use alloy::primitives::Address;
use tracing::{error, info};

use crate::{
    backend::{rpc::RpcBackend, DeploymentBackend},
    cli::{DeployUpgradeableArgs, StatusArgs},
    deployments::{DeploymentLedger, DeploymentsFile},
    errors::DeployError,
    orchestrator::{OrchestratorConfig, UpgradeOrchestrator},
    resolver::{ArtifactDirResolver, ArtifactResolver},
    types::{DeploymentProgress, InitOrder},
    utils::parse_init_args,
};

/// Deploy a contract behind a proxy and print the resulting addresses
pub async fn deploy_upgradeable(
    args: DeployUpgradeableArgs,
    backend: RpcBackend,
    resolver: ArtifactDirResolver,
    deployments: DeploymentsFile,
) -> Result<(), DeployError> {
    let implementation = resolver.resolve(&args.contract)?;
    let init_args = parse_init_args(&implementation, &args.initializer, &args.init_args)?;

    let config = OrchestratorConfig {
        proxy_contract: args.proxy_contract,
        admin_change_method: args.admin_change_method,
        initializer: args.initializer,
        init_order: if args.init_before_admin_change {
            InitOrder::BeforeAdminChange
        } else {
            InitOrder::AfterAdminChange
        },
        admin_slot: args.admin_slot.slot(),
    };
    let mut orchestrator = UpgradeOrchestrator::new(resolver, backend, deployments, config);

    let result = if args.fresh {
        orchestrator
            .deploy_upgradeable(&args.contract, &init_args, args.admin)
            .await
    } else {
        orchestrator
            .resume_from_ledger(&args.contract, &init_args, args.admin)
            .await
    };

    let deployment = match result {
        Ok(deployment) => deployment,
        Err(e) => {
            report_failure(&args.contract, &e);
            return Err(e);
        }
    };

    info!(
        "recorded `{}` in {}",
        args.contract,
        orchestrator.ledger().path().display()
    );
    println!("{} deployed", args.contract);
    println!("  implementation: {:#x}", deployment.implementation);
    println!("  proxy:          {:#x}", deployment.proxy);
    println!("  admin:          {:#x}", deployment.admin);
    for (step, receipt) in &deployment.receipts {
        println!("  {step}: tx {:#x}", receipt.tx_hash);
    }

    Ok(())
}

/// Print the recorded progress of a deployment and its proxy's on-chain admin
pub async fn status(
    args: StatusArgs,
    backend: RpcBackend,
    deployments: DeploymentsFile,
) -> Result<(), DeployError> {
    let progress = deployments.load(&args.contract)?;
    if progress.is_empty() {
        println!("{}: no deployment recorded", args.contract);
        return Ok(());
    }

    println!("{}: {progress}", args.contract);
    print_steps(&progress);

    if let (Some(proxy), Some(slot)) = (progress.proxy, args.admin_slot.slot()) {
        let admin = backend
            .storage_address(proxy, slot)
            .await
            .map_err(|e| DeployError::ContractInteraction(e.to_string()))?;
        println!("  on-chain admin: {}", format_admin(admin, backend.deployer()));
    }

    Ok(())
}

// -----------
// | Helpers |
// -----------

/// Print the completed steps and the failed one
fn report_failure(contract: &str, error: &DeployError) {
    error!("deployment of `{contract}` failed: {error}");

    match error {
        DeployError::Transaction { step, .. } => eprintln!("{contract}: {step} failed"),
        DeployError::Record { step, .. } => {
            eprintln!("{contract}: {step} confirmed but not recorded, record it before resuming")
        }
        _ => return,
    }
    let Some(progress) = error.progress() else {
        return;
    };
    eprintln!("completed steps:");
    if progress.is_empty() {
        eprintln!("  none");
    }
    for step in progress.completed_steps() {
        eprintln!("  {step}");
    }
    eprintln!("recorded: {progress}");
}

/// Print the steps recorded as complete
fn print_steps(progress: &DeploymentProgress) {
    for step in progress.completed_steps() {
        println!("  done: {step}");
    }
}

/// Describe an admin read from the chain
fn format_admin(admin: Address, deployer: Address) -> String {
    if admin.is_zero() {
        "unset".to_string()
    } else if admin == deployer {
        format!("{admin:#x} (deployer)")
    } else {
        format!("{admin:#x}")
    }
}
