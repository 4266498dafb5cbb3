//! Deployment of a contract behind an admin-controlled upgradeable proxy.
//!
//! A run executes, strictly in order:
//! 1. deploy the implementation, with no constructor arguments
//! 2. deploy the proxy, passing it the confirmed implementation address
//! 3. bind the proxy's address to the implementation's interface
//! 4. hand the proxy's admin rights to the operator's account
//! 5. call the implementation's initializer through the proxy
//!
//! Steps 4 and 5 may be swapped through [`InitOrder`]. Both are sent from the
//! deployer. Every confirmed step is written to the [`DeploymentLedger`]
//! before the next one starts, so a failed run can be resumed without
//! redeploying anything.

use std::sync::Arc;

use alloy::{
    dyn_abi::DynSolValue,
    primitives::{Address, B256},
};
use tracing::{debug, error, info, warn};

use crate::{
    backend::{encode_call, DeploymentBackend},
    constants::{DEFAULT_ADMIN_CHANGE_METHOD, DEFAULT_INITIALIZER, DEFAULT_PROXY_CONTRACT},
    deployments::DeploymentLedger,
    errors::{BackendError, DeployError, DeployResult},
    resolver::ArtifactResolver,
    types::{
        AdminAddress, AdminSlot, ContractDescriptor, DeployStep, DeployedHandle,
        DeploymentProgress, InitOrder, ProxyBinding, UpgradeableDeployment,
    },
};

/// The proxy contract and entry points an orchestrator works with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// The artifact name of the proxy contract
    pub proxy_contract: String,
    /// The proxy method transferring admin rights
    pub admin_change_method: String,
    /// The implementation's one-shot initializer
    pub initializer: String,
    /// When the initializer runs relative to the admin change
    pub init_order: InitOrder,
    /// The storage slot the proxy keeps its admin in, `None` to skip the
    /// admin checks
    pub admin_slot: Option<B256>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            proxy_contract: DEFAULT_PROXY_CONTRACT.to_string(),
            admin_change_method: DEFAULT_ADMIN_CHANGE_METHOD.to_string(),
            initializer: DEFAULT_INITIALIZER.to_string(),
            init_order: InitOrder::default(),
            admin_slot: AdminSlot::default().slot(),
        }
    }
}

/// Drives an upgradeable deployment over a resolver, a backend and a ledger
pub struct UpgradeOrchestrator<R, B, L> {
    /// Resolves contract names into descriptors
    resolver: R,
    /// Sends and confirms transactions
    backend: B,
    /// Records the progress of each deployment
    ledger: L,
    /// The proxy contract and entry points to use
    config: OrchestratorConfig,
}

impl<R, B, L> UpgradeOrchestrator<R, B, L>
where
    R: ArtifactResolver,
    B: DeploymentBackend,
    L: DeploymentLedger,
{
    /// Create a new orchestrator
    pub fn new(resolver: R, backend: B, ledger: L, config: OrchestratorConfig) -> Self {
        Self {
            resolver,
            backend,
            ledger,
            config,
        }
    }

    /// The backend transactions are sent through
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The ledger progress is recorded in
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// The orchestrator's configuration
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Deploy `name` behind a fresh proxy, initialize it with `init_args` and
    /// hand the proxy to `admin`
    pub async fn deploy_upgradeable(
        &mut self,
        name: &str,
        init_args: &[DynSolValue],
        admin: AdminAddress,
    ) -> DeployResult<UpgradeableDeployment> {
        self.resume(name, init_args, admin, DeploymentProgress::default())
            .await
    }

    /// Like [`UpgradeOrchestrator::resume`], starting from the progress the
    /// ledger holds for `name`
    pub async fn resume_from_ledger(
        &mut self,
        name: &str,
        init_args: &[DynSolValue],
        admin: AdminAddress,
    ) -> DeployResult<UpgradeableDeployment> {
        let prior = self.ledger.load(name)?;
        if !prior.is_empty() {
            info!("resuming `{name}` from recorded progress: {prior}");
        }

        self.resume(name, init_args, admin, prior).await
    }

    /// Continue the deployment of `name` from `prior`, skipping every step it
    /// records as complete.
    ///
    /// All inputs and the recorded progress are validated before any
    /// transaction is sent.
    pub async fn resume(
        &mut self,
        name: &str,
        init_args: &[DynSolValue],
        admin: AdminAddress,
        prior: DeploymentProgress,
    ) -> DeployResult<UpgradeableDeployment> {
        let implementation = Arc::new(self.resolve_deployable(name)?);
        let proxy = Arc::new(self.resolve_deployable(&self.config.proxy_contract)?);

        self.check_preconditions(&implementation, &proxy, init_args, admin, &prior)?;

        let recorded_implementation = match prior.implementation {
            Some(address) => Some(self.attach_recorded(address, &implementation).await?),
            None => None,
        };
        let recorded_proxy = match prior.proxy {
            Some(address) => Some(self.attach_recorded(address, &proxy).await?),
            None => None,
        };
        if let Some(proxy_handle) = &recorded_proxy {
            if prior.admin.is_none() {
                self.check_pending_admin_change(proxy_handle, admin).await?;
            }
        }

        let deployer = self.backend.deployer();
        let mut progress = prior;
        let mut receipts = Vec::new();

        // --- Implementation --- //

        let implementation_handle = match recorded_implementation {
            Some(handle) => {
                debug!(
                    "skipping {}, recorded at {}",
                    DeployStep::ImplementationDeploy,
                    handle.address()
                );
                handle
            }
            None => {
                let step = DeployStep::ImplementationDeploy;
                let (handle, receipt) = self
                    .backend
                    .deploy(implementation.clone(), &[])
                    .await
                    .map_err(|e| step_failed(step, &progress, e))?;

                info!(
                    "{step}: `{name}` deployed at {} (tx {:#x})",
                    handle.address(),
                    receipt.tx_hash
                );
                progress.implementation = Some(handle.address());
                self.record_step(name, step, &progress)?;
                receipts.push((step, receipt));
                handle
            }
        };

        // --- Proxy --- //

        let proxy_handle = match recorded_proxy {
            Some(handle) => {
                debug!(
                    "skipping {}, recorded at {}",
                    DeployStep::ProxyDeploy,
                    handle.address()
                );
                handle
            }
            None => {
                let step = DeployStep::ProxyDeploy;
                let constructor_args = [DynSolValue::Address(implementation_handle.address())];
                let (handle, receipt) = self
                    .backend
                    .deploy(proxy.clone(), &constructor_args)
                    .await
                    .map_err(|e| step_failed(step, &progress, e))?;

                info!(
                    "{step}: `{}` deployed at {} over {} (tx {:#x})",
                    proxy.name,
                    handle.address(),
                    implementation_handle.address(),
                    receipt.tx_hash
                );
                progress.proxy = Some(handle.address());
                self.record_step(name, step, &progress)?;
                receipts.push((step, receipt));
                handle
            }
        };

        let binding = ProxyBinding::bind(&self.backend, &proxy_handle, &implementation);

        // --- Admin change and initialization --- //

        let steps = match self.config.init_order {
            InitOrder::AfterAdminChange => [DeployStep::AdminChange, DeployStep::Initialize],
            InitOrder::BeforeAdminChange => [DeployStep::Initialize, DeployStep::AdminChange],
        };

        for step in steps {
            match step {
                DeployStep::AdminChange if progress.admin.is_none() => {
                    let receipt = self
                        .backend
                        .call(
                            &proxy_handle,
                            &self.config.admin_change_method,
                            &[DynSolValue::Address(admin.address())],
                            deployer,
                        )
                        .await
                        .map_err(|e| step_failed(step, &progress, e))?;

                    info!(
                        "{step}: {} handed to {admin} (tx {:#x})",
                        proxy_handle.address(),
                        receipt.tx_hash
                    );
                    progress.admin = Some(admin.address());
                    self.record_step(name, step, &progress)?;
                    receipts.push((step, receipt));
                }
                DeployStep::Initialize if !progress.initialized => {
                    let receipt = self
                        .backend
                        .call(binding.handle(), &self.config.initializer, init_args, deployer)
                        .await
                        .map_err(|e| step_failed(step, &progress, e))?;

                    info!(
                        "{step}: `{name}` initialized through {} (tx {:#x})",
                        binding.address(),
                        receipt.tx_hash
                    );
                    progress.initialized = true;
                    self.record_step(name, step, &progress)?;
                    receipts.push((step, receipt));
                }
                _ => debug!("skipping {step}, already recorded"),
            }
        }

        self.verify_admin(&proxy_handle, admin, &progress).await?;

        Ok(UpgradeableDeployment {
            implementation: implementation_handle.address(),
            proxy: proxy_handle.address(),
            admin: admin.address(),
            receipts,
        })
    }

    // -----------
    // | Helpers |
    // -----------

    /// Validate everything that can be checked without touching the chain
    fn check_preconditions(
        &self,
        implementation: &ContractDescriptor,
        proxy: &ContractDescriptor,
        init_args: &[DynSolValue],
        admin: AdminAddress,
        prior: &DeploymentProgress,
    ) -> DeployResult<()> {
        let deployer = self.backend.deployer();
        if admin.address() == deployer {
            return Err(DeployError::Precondition(format!(
                "admin {admin} is the deployer account"
            )));
        }

        prior.validate()?;
        if let Some(recorded) = prior.admin {
            if recorded != admin.address() {
                return Err(DeployError::Precondition(format!(
                    "recorded admin {recorded} differs from requested admin {admin}"
                )));
            }
        }

        if implementation.constructor_arity() != 0 {
            return Err(DeployError::Precondition(format!(
                "implementation `{}` must not take constructor arguments",
                implementation.name
            )));
        }
        encode_call(implementation, &self.config.initializer, init_args)
            .map_err(|e| DeployError::Precondition(e.to_string()))?;

        if !proxy.has_function(&self.config.admin_change_method) {
            return Err(DeployError::Precondition(format!(
                "proxy `{}` has no `{}` method",
                proxy.name, self.config.admin_change_method
            )));
        }
        let takes_implementation = proxy.abi.constructor().is_some_and(|constructor| {
            constructor.inputs.len() == 1 && constructor.inputs[0].ty == "address"
        });
        if !takes_implementation {
            return Err(DeployError::Precondition(format!(
                "proxy `{}` must take the implementation address as its only constructor argument",
                proxy.name
            )));
        }

        Ok(())
    }

    /// Resolve `name`, requiring creation bytecode
    fn resolve_deployable(&self, name: &str) -> DeployResult<ContractDescriptor> {
        let descriptor = self.resolver.resolve(name)?;
        if descriptor.bytecode.is_empty() {
            return Err(DeployError::Resolution(format!(
                "`{name}` has no creation bytecode and cannot be deployed"
            )));
        }

        Ok(descriptor)
    }

    /// Record the progress after a confirmed `step`, keeping the progress in
    /// the error if the write fails
    fn record_step(
        &mut self,
        name: &str,
        step: DeployStep,
        progress: &DeploymentProgress,
    ) -> DeployResult<()> {
        self.ledger.record(name, progress).map_err(|e| {
            error!("{step} confirmed but not recorded: {e}; confirmed: {progress}");
            DeployError::Record {
                step,
                progress: progress.clone(),
                source: Box::new(e),
            }
        })
    }

    /// Bind a recorded address, requiring contract code to exist there
    async fn attach_recorded(
        &self,
        address: Address,
        descriptor: &Arc<ContractDescriptor>,
    ) -> DeployResult<DeployedHandle> {
        self.backend
            .attach(address, descriptor.clone())
            .await
            .map_err(|e| {
                DeployError::Precondition(format!(
                    "recorded `{}` at {address} is not usable: {e}",
                    descriptor.name
                ))
            })
    }

    /// Check that a recorded proxy is still held by the deployer before its
    /// admin change is sent
    async fn check_pending_admin_change(
        &self,
        proxy: &DeployedHandle,
        admin: AdminAddress,
    ) -> DeployResult<()> {
        let Some(slot) = self.config.admin_slot else {
            return Ok(());
        };

        let current = self
            .backend
            .storage_address(proxy.address(), slot)
            .await
            .map_err(|e| DeployError::Precondition(e.to_string()))?;

        if current == admin.address() {
            return Err(DeployError::Precondition(format!(
                "proxy {} is already administered by {admin} but the change is not recorded",
                proxy.address()
            )));
        }
        if current != self.backend.deployer() {
            return Err(DeployError::Precondition(format!(
                "proxy {} is administered by {current}, not the deployer",
                proxy.address()
            )));
        }

        Ok(())
    }

    /// Read the proxy's admin back and compare it with the requested one
    async fn verify_admin(
        &self,
        proxy: &DeployedHandle,
        admin: AdminAddress,
        progress: &DeploymentProgress,
    ) -> DeployResult<()> {
        let Some(slot) = self.config.admin_slot else {
            warn!("not verifying the admin of {}", proxy.address());
            return Ok(());
        };

        let step = DeployStep::AdminChange;
        let actual = self
            .backend
            .storage_address(proxy.address(), slot)
            .await
            .map_err(|e| step_failed(step, progress, e))?;

        if actual != admin.address() {
            return Err(step_failed(
                step,
                progress,
                BackendError::AdminMismatch {
                    expected: admin.address(),
                    actual,
                },
            ));
        }

        Ok(())
    }
}

/// Wrap a backend failure with the step it occurred in and the progress made
/// before it
fn step_failed(
    step: DeployStep,
    progress: &DeploymentProgress,
    source: BackendError,
) -> DeployError {
    error!("{step} failed: {source}; completed: {progress}");
    DeployError::Transaction {
        step,
        progress: progress.clone(),
        source,
    }
}
