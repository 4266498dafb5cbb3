//! Drives full upgradeable deployments against the mock chain

use alloy::{
    dyn_abi::DynSolValue,
    primitives::{address, Address, Bytes, U256},
};
use proxy_deploy_scripts::{
    deployments::{DeploymentLedger, DeploymentsFile},
    errors::DeployError,
    orchestrator::{OrchestratorConfig, UpgradeOrchestrator},
    resolver::StaticResolver,
    test_helpers::{
        implementation_descriptor, implementation_descriptor_with, proxy_descriptor, MemoryLedger,
        MockChain, MockTransaction, MOCK_DEPLOYER,
    },
    types::{AdminAddress, ContractDescriptor, DeployStep, DeploymentProgress, InitOrder},
};
use tempfile::TempDir;

/// The operator account the original migration hands the proxy to
const NODE_ADMIN: &str = "0xf0b1eef88956b0a307fa87b5f5671aad6a5d330f";

/// The contract deployed by the original migration
const CONTRACT: &str = "TeslaShare";

/// A resolver holding the implementation and the proxy
fn resolver() -> StaticResolver {
    StaticResolver::new()
        .with(implementation_descriptor(CONTRACT))
        .with(proxy_descriptor())
}

/// An orchestrator with the default configuration over `chain`
fn orchestrator(
    chain: &MockChain,
) -> UpgradeOrchestrator<StaticResolver, MockChain, MemoryLedger> {
    UpgradeOrchestrator::new(
        resolver(),
        chain.clone(),
        MemoryLedger::default(),
        OrchestratorConfig::default(),
    )
}

fn admin() -> AdminAddress {
    NODE_ADMIN.parse().unwrap()
}

#[tokio::test]
async fn deploys_initializes_and_hands_off_the_proxy() {
    let chain = MockChain::new();
    let mut orchestrator = orchestrator(&chain);

    let deployment = orchestrator
        .deploy_upgradeable(CONTRACT, &[], admin())
        .await
        .unwrap();

    assert_eq!(chain.deploy_count(), 2);
    assert_eq!(chain.call_count("changeAdmin"), 1);
    assert_eq!(chain.call_count("initialize"), 1);
    assert_eq!(chain.proxy_admin(deployment.proxy), Some(admin().address()));
    assert_eq!(deployment.admin, admin().address());

    // Initialization lands in the proxy's storage, not the implementation's
    assert_eq!(chain.initializations(deployment.proxy), 1);
    assert_eq!(chain.initializations(deployment.implementation), 0);
}

#[tokio::test]
async fn proxy_is_constructed_with_the_implementation_address() {
    let chain = MockChain::new();
    let mut orchestrator = orchestrator(&chain);

    let deployment = orchestrator
        .deploy_upgradeable(CONTRACT, &[], admin())
        .await
        .unwrap();

    assert_eq!(
        chain.proxy_implementation(deployment.proxy),
        Some(deployment.implementation)
    );
    let proxy_args = chain.transactions().into_iter().find_map(|tx| match tx {
        MockTransaction::Deploy { contract, args, .. }
            if contract == "AdminUpgradeabilityProxy" =>
        {
            Some(args)
        }
        _ => None,
    });
    assert_eq!(
        proxy_args,
        Some(vec![DynSolValue::Address(deployment.implementation)])
    );
}

#[tokio::test]
async fn steps_run_in_order_from_the_deployer() {
    let chain = MockChain::new();
    let mut orchestrator = orchestrator(&chain);

    let deployment = orchestrator
        .deploy_upgradeable(CONTRACT, &[], admin())
        .await
        .unwrap();

    let transactions = chain.transactions();
    assert_eq!(transactions.len(), 4);
    assert!(transactions[0].is_deploy());
    assert!(transactions[1].is_deploy());
    assert_eq!(transactions[2].method(), Some("changeAdmin"));
    assert_eq!(transactions[3].method(), Some("initialize"));
    for tx in &transactions[2..] {
        assert!(matches!(
            tx,
            MockTransaction::Call { from, to, success: true, .. }
                if *from == MOCK_DEPLOYER && *to == deployment.proxy
        ));
    }

    assert_eq!(orchestrator.ledger().writes(), 4);
}

#[tokio::test]
async fn admin_equal_to_deployer_sends_nothing() {
    let chain = MockChain::new();
    let mut orchestrator = orchestrator(&chain);
    let deployer = AdminAddress::new(MOCK_DEPLOYER).unwrap();

    let err = orchestrator
        .deploy_upgradeable(CONTRACT, &[], deployer)
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::Precondition(_)));
    assert!(chain.transactions().is_empty());
}

#[tokio::test]
async fn unknown_contract_sends_nothing() {
    let chain = MockChain::new();
    let mut orchestrator = orchestrator(&chain);

    let err = orchestrator
        .deploy_upgradeable("Tesla", &[], admin())
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::Resolution(_)));
    assert!(chain.transactions().is_empty());
}

#[test]
fn zero_admin_is_rejected() {
    let err = AdminAddress::new(Address::ZERO).unwrap_err();
    assert!(matches!(err, DeployError::Precondition(_)));

    let err = "0x0000000000000000000000000000000000000000"
        .parse::<AdminAddress>()
        .unwrap_err();
    assert!(matches!(err, DeployError::Precondition(_)));
}

#[tokio::test]
async fn failed_admin_change_reports_progress_and_resumes_without_redeploying() {
    let chain = MockChain::new();
    let mut orchestrator = orchestrator(&chain);
    chain.fail_on("changeAdmin");

    let err = orchestrator
        .deploy_upgradeable(CONTRACT, &[], admin())
        .await
        .unwrap_err();

    let DeployError::Transaction { step, progress, .. } = &err else {
        panic!("expected a transaction error, got {err}");
    };
    assert_eq!(*step, DeployStep::AdminChange);
    assert_eq!(
        progress.completed_steps(),
        [DeployStep::ImplementationDeploy, DeployStep::ProxyDeploy]
    );
    let proxy = progress.proxy.unwrap();
    assert_eq!(orchestrator.ledger().load(CONTRACT).unwrap(), *progress);
    assert_eq!(chain.call_count("initialize"), 0);

    chain.clear_failures();
    let deployment = orchestrator
        .resume_from_ledger(CONTRACT, &[], admin())
        .await
        .unwrap();

    assert_eq!(chain.deploy_count(), 2);
    assert_eq!(deployment.proxy, proxy);
    assert_eq!(chain.proxy_admin(proxy), Some(admin().address()));
    assert_eq!(chain.initializations(proxy), 1);
    let resumed: Vec<_> = deployment.receipts.iter().map(|(step, _)| *step).collect();
    assert_eq!(resumed, [DeployStep::AdminChange, DeployStep::Initialize]);
}

#[tokio::test]
async fn failed_implementation_deploy_leaves_nothing_recorded() {
    let chain = MockChain::new();
    let mut orchestrator = orchestrator(&chain);
    chain.fail_on(CONTRACT);

    let err = orchestrator
        .deploy_upgradeable(CONTRACT, &[], admin())
        .await
        .unwrap_err();

    assert_eq!(err.failed_step(), Some(DeployStep::ImplementationDeploy));
    assert!(orchestrator.ledger().load(CONTRACT).unwrap().is_empty());
    assert_eq!(chain.deploy_count(), 0);
}

#[tokio::test]
async fn proxy_without_implementation_is_rejected() {
    let chain = MockChain::new();
    let mut orchestrator = orchestrator(&chain);
    let prior = DeploymentProgress {
        proxy: Some(address!("00000000000000000000000000000000000000aa")),
        ..Default::default()
    };

    let err = orchestrator
        .resume(CONTRACT, &[], admin(), prior)
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::Precondition(_)));
    assert!(chain.transactions().is_empty());
}

#[tokio::test]
async fn zero_recorded_address_is_rejected() {
    let chain = MockChain::new();
    let mut orchestrator = orchestrator(&chain);
    let prior = DeploymentProgress {
        implementation: Some(Address::ZERO),
        ..Default::default()
    };

    let err = orchestrator
        .resume(CONTRACT, &[], admin(), prior)
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::Precondition(_)));
    assert!(chain.transactions().is_empty());
}

#[tokio::test]
async fn recorded_address_without_code_is_rejected() {
    let chain = MockChain::new();
    let mut orchestrator = orchestrator(&chain);
    let prior = DeploymentProgress {
        implementation: Some(address!("00000000000000000000000000000000000000aa")),
        ..Default::default()
    };

    let err = orchestrator
        .resume(CONTRACT, &[], admin(), prior)
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::Precondition(_)));
    assert!(chain.transactions().is_empty());
}

#[tokio::test]
async fn unrecorded_admin_change_is_rejected() {
    let chain = MockChain::new();
    let mut orchestrator = orchestrator(&chain);
    chain.fail_on("initialize");
    let err = orchestrator
        .deploy_upgradeable(CONTRACT, &[], admin())
        .await
        .unwrap_err();
    assert_eq!(err.failed_step(), Some(DeployStep::Initialize));
    chain.clear_failures();

    // The admin change went through, but the record lost it
    let mut progress = orchestrator.ledger().load(CONTRACT).unwrap();
    progress.admin = None;
    let sent = chain.transactions().len();

    let err = orchestrator
        .resume(CONTRACT, &[], admin(), progress)
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::Precondition(_)));
    assert_eq!(chain.transactions().len(), sent);
}

#[tokio::test]
async fn initializes_before_admin_change_on_a_non_transparent_proxy() {
    let chain = MockChain::new().with_transparency(false);
    let config = OrchestratorConfig {
        init_order: InitOrder::BeforeAdminChange,
        ..Default::default()
    };
    let mut orchestrator =
        UpgradeOrchestrator::new(resolver(), chain.clone(), MemoryLedger::default(), config);

    let deployment = orchestrator
        .deploy_upgradeable(CONTRACT, &[], admin())
        .await
        .unwrap();

    let methods: Vec<_> = chain
        .transactions()
        .iter()
        .filter_map(|tx| tx.method().map(str::to_string))
        .collect();
    assert_eq!(methods, ["initialize", "changeAdmin"]);
    assert_eq!(chain.proxy_admin(deployment.proxy), Some(admin().address()));
    assert_eq!(chain.initializations(deployment.proxy), 1);
}

#[tokio::test]
async fn transparent_proxy_refuses_initialization_from_its_admin() {
    let chain = MockChain::new();
    let config = OrchestratorConfig {
        init_order: InitOrder::BeforeAdminChange,
        ..Default::default()
    };
    let mut orchestrator =
        UpgradeOrchestrator::new(resolver(), chain.clone(), MemoryLedger::default(), config);

    let err = orchestrator
        .deploy_upgradeable(CONTRACT, &[], admin())
        .await
        .unwrap_err();

    assert_eq!(err.failed_step(), Some(DeployStep::Initialize));
    assert_eq!(chain.call_count("changeAdmin"), 0);
}

#[tokio::test]
async fn init_args_are_forwarded_through_the_proxy() {
    let chain = MockChain::new();
    let resolver = StaticResolver::new()
        .with(implementation_descriptor_with(
            CONTRACT,
            "function initialize(address owner, uint256 supply)",
        ))
        .with(proxy_descriptor());
    let mut orchestrator = UpgradeOrchestrator::new(
        resolver,
        chain.clone(),
        MemoryLedger::default(),
        OrchestratorConfig::default(),
    );
    let init_args = [
        DynSolValue::Address(admin().address()),
        DynSolValue::Uint(U256::from(21_000_000u64), 256),
    ];

    let deployment = orchestrator
        .deploy_upgradeable(CONTRACT, &init_args, admin())
        .await
        .unwrap();

    assert_eq!(chain.initializations(deployment.proxy), 1);

    // A second initialization through the proxy is refused
    let err = orchestrator
        .resume(
            CONTRACT,
            &init_args,
            admin(),
            DeploymentProgress {
                implementation: Some(deployment.implementation),
                proxy: Some(deployment.proxy),
                admin: Some(deployment.admin),
                initialized: false,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.failed_step(), Some(DeployStep::Initialize));
}

#[tokio::test]
async fn resumes_from_a_deployments_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("deployments.json");
    let chain = MockChain::new();
    chain.fail_on("initialize");

    let ledger = DeploymentsFile::open(&path, 15).unwrap();
    let mut orchestrator =
        UpgradeOrchestrator::new(resolver(), chain.clone(), ledger, OrchestratorConfig::default());
    let err = orchestrator
        .deploy_upgradeable(CONTRACT, &[], admin())
        .await
        .unwrap_err();
    assert_eq!(err.failed_step(), Some(DeployStep::Initialize));
    chain.clear_failures();

    // A later run reads the record back from disk
    let ledger = DeploymentsFile::open(&path, 15).unwrap();
    let mut orchestrator =
        UpgradeOrchestrator::new(resolver(), chain.clone(), ledger, OrchestratorConfig::default());
    let deployment = orchestrator
        .resume_from_ledger(CONTRACT, &[], admin())
        .await
        .unwrap();

    assert_eq!(chain.deploy_count(), 2);
    let resumed: Vec<_> = deployment.receipts.iter().map(|(step, _)| *step).collect();
    assert_eq!(resumed, [DeployStep::Initialize]);
    assert!(DeploymentsFile::open(&path, 15)
        .unwrap()
        .load(CONTRACT)
        .unwrap()
        .is_complete());
}

#[tokio::test]
async fn failed_proxy_deploy_keeps_the_implementation() {
    let chain = MockChain::new();
    let mut orchestrator = orchestrator(&chain);
    chain.fail_on("AdminUpgradeabilityProxy");

    let err = orchestrator
        .deploy_upgradeable(CONTRACT, &[], admin())
        .await
        .unwrap_err();

    assert_eq!(err.failed_step(), Some(DeployStep::ProxyDeploy));
    let recorded = orchestrator.ledger().load(CONTRACT).unwrap();
    assert_eq!(recorded.completed_steps(), [DeployStep::ImplementationDeploy]);
    assert_eq!(err.progress(), Some(&recorded));

    chain.clear_failures();
    let deployment = orchestrator
        .resume_from_ledger(CONTRACT, &[], admin())
        .await
        .unwrap();

    let implementation_deploys = chain
        .transactions()
        .iter()
        .filter(|tx| {
            matches!(
                tx,
                MockTransaction::Deploy { contract, success: true, .. } if contract == CONTRACT
            )
        })
        .count();
    assert_eq!(implementation_deploys, 1);
    assert_eq!(deployment.implementation, recorded.implementation.unwrap());
    assert_eq!(
        chain.proxy_implementation(deployment.proxy),
        Some(deployment.implementation)
    );
}

#[tokio::test]
async fn admin_change_recorded_without_a_proxy_is_rejected() {
    let chain = MockChain::new();
    let mut orchestrator = orchestrator(&chain);
    let implementation = address!("00000000000000000000000000000000000000aa");

    let admin_only = DeploymentProgress {
        implementation: Some(implementation),
        admin: Some(admin().address()),
        ..Default::default()
    };
    let err = orchestrator
        .resume(CONTRACT, &[], admin(), admin_only)
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::Precondition(_)));

    let initialized_only = DeploymentProgress {
        implementation: Some(implementation),
        initialized: true,
        ..Default::default()
    };
    let err = orchestrator
        .resume(CONTRACT, &[], admin(), initialized_only)
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::Precondition(_)));

    assert!(chain.transactions().is_empty());
}

#[tokio::test]
async fn contract_without_bytecode_is_not_deployed() {
    let chain = MockChain::new();
    let interface = ContractDescriptor::new(
        CONTRACT,
        implementation_descriptor(CONTRACT).abi,
        Bytes::new(),
    );
    let resolver = StaticResolver::new()
        .with(interface)
        .with(proxy_descriptor());
    let mut orchestrator = UpgradeOrchestrator::new(
        resolver,
        chain.clone(),
        MemoryLedger::default(),
        OrchestratorConfig::default(),
    );

    let err = orchestrator
        .deploy_upgradeable(CONTRACT, &[], admin())
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::Resolution(_)));
    assert!(chain.transactions().is_empty());
}

#[tokio::test]
async fn unrecorded_step_keeps_its_progress_in_the_error() {
    let chain = MockChain::new();
    let mut failing = UpgradeOrchestrator::new(
        resolver(),
        chain.clone(),
        MemoryLedger::default().failing_after(0),
        OrchestratorConfig::default(),
    );

    let err = failing
        .deploy_upgradeable(CONTRACT, &[], admin())
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::Record { .. }));
    assert_eq!(err.failed_step(), Some(DeployStep::ImplementationDeploy));
    let progress = err.progress().cloned().unwrap();
    assert!(progress.implementation.is_some());
    assert_eq!(chain.deploy_count(), 1);

    // Resuming from the progress carried by the error reuses the implementation
    let mut orchestrator = orchestrator(&chain);
    let deployment = orchestrator
        .resume(CONTRACT, &[], admin(), progress.clone())
        .await
        .unwrap();

    assert_eq!(chain.deploy_count(), 2);
    assert_eq!(Some(deployment.implementation), progress.implementation);
}
