//! Type definitions used throughout the scripts

use std::{
    fmt::{self, Display},
    str::FromStr,
    sync::Arc,
};

use alloy::json_abi::JsonAbi;
use alloy_primitives::{keccak256, Address, Bytes, B256};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::{
    backend::DeploymentBackend,
    constants::{PROXY_ADMIN_STORAGE_SLOT, ZEPPELIN_OS_ADMIN_STORAGE_SLOT},
    errors::DeployError,
};

// -------------
// | Artifacts |
// -------------

/// A deployable contract: its name, ABI and creation bytecode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractDescriptor {
    /// The logical name of the contract
    pub name: String,
    /// The contract's ABI
    pub abi: JsonAbi,
    /// The contract's creation bytecode, without constructor arguments
    pub bytecode: Bytes,
}

impl ContractDescriptor {
    /// Create a new descriptor
    pub fn new(name: impl Into<String>, abi: JsonAbi, bytecode: Bytes) -> Self {
        Self {
            name: name.into(),
            abi,
            bytecode,
        }
    }

    /// The keccak hash of the creation bytecode, identifying the deployable artifact
    pub fn code_hash(&self) -> B256 {
        keccak256(&self.bytecode)
    }

    /// Whether the ABI exposes a function with the given name
    pub fn has_function(&self, name: &str) -> bool {
        self.abi.function(name).is_some_and(|fns| !fns.is_empty())
    }

    /// The number of constructor arguments, zero if there is no explicit constructor
    pub fn constructor_arity(&self) -> usize {
        self.abi
            .constructor()
            .map_or(0, |constructor| constructor.inputs.len())
    }
}

// -------------------
// | Deployed state |
// -------------------

/// An on-chain address bound to a callable interface
#[derive(Debug, Clone)]
pub struct DeployedHandle {
    /// The address of the deployed contract
    address: Address,
    /// The interface through which the address is called
    descriptor: Arc<ContractDescriptor>,
}

impl DeployedHandle {
    /// Bind an address to an interface. Backends construct handles; the
    /// orchestrator only consumes them.
    pub fn new(address: Address, descriptor: Arc<ContractDescriptor>) -> Self {
        Self {
            address,
            descriptor,
        }
    }

    /// The address of the deployed contract
    pub fn address(&self) -> Address {
        self.address
    }

    /// The interface through which the address is called
    pub fn descriptor(&self) -> &ContractDescriptor {
        &self.descriptor
    }

    /// The name of the contract whose interface this handle exposes
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

/// The proxy's address viewed through the implementation's interface, so that
/// calls against it route through delegation into the proxy's storage
#[derive(Debug, Clone)]
pub struct ProxyBinding {
    /// The reinterpreted handle
    handle: DeployedHandle,
}

impl ProxyBinding {
    /// Reinterpret a deployed proxy through the implementation's interface
    pub fn bind<B: DeploymentBackend + ?Sized>(
        backend: &B,
        proxy: &DeployedHandle,
        implementation: &Arc<ContractDescriptor>,
    ) -> Self {
        let handle = backend.reinterpret(proxy.address(), implementation.clone());
        Self { handle }
    }

    /// The handle to call initialization and business methods on
    pub fn handle(&self) -> &DeployedHandle {
        &self.handle
    }

    /// The proxy's address
    pub fn address(&self) -> Address {
        self.handle.address()
    }
}

/// A validated externally-owned account designated as a proxy's admin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdminAddress(Address);

impl AdminAddress {
    /// Wrap an address, rejecting the zero address
    pub fn new(address: Address) -> Result<Self, DeployError> {
        if address.is_zero() {
            return Err(DeployError::Precondition(
                "admin address must not be the zero address".to_string(),
            ));
        }

        Ok(Self(address))
    }

    /// The underlying address
    pub fn address(&self) -> Address {
        self.0
    }
}

impl FromStr for AdminAddress {
    type Err = DeployError;

    /// Accepts `0x` followed by 40 hex digits. Mixed-case input must carry a
    /// valid EIP-55 checksum.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").ok_or_else(|| {
            DeployError::Precondition(format!("admin address `{s}` is not 0x-prefixed"))
        })?;
        if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DeployError::Precondition(format!(
                "admin address `{s}` is not 40 hex digits"
            )));
        }

        let mixed_case = digits.chars().any(|c| c.is_ascii_lowercase())
            && digits.chars().any(|c| c.is_ascii_uppercase());
        let address = if mixed_case {
            Address::parse_checksummed(s, None /* chain_id */).map_err(|e| {
                DeployError::Precondition(format!("admin address `{s}` failed checksum: {e}"))
            })?
        } else {
            Address::from_str(s).map_err(|e| DeployError::Precondition(e.to_string()))?
        };

        Self::new(address)
    }
}

impl Display for AdminAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The confirmed result of a single transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    /// The transaction hash
    pub tx_hash: B256,
    /// The block the transaction was included in
    pub block_number: Option<u64>,
}

// ---------------------
// | Deployment steps |
// ---------------------

/// The transaction-sending steps of an upgradeable deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeployStep {
    /// Deploying the implementation contract
    ImplementationDeploy,
    /// Deploying the proxy bound to the implementation
    ProxyDeploy,
    /// Handing the proxy's admin rights to the operator
    AdminChange,
    /// Initializing the proxied storage
    Initialize,
}

impl Display for DeployStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployStep::ImplementationDeploy => write!(f, "implementation-deploy"),
            DeployStep::ProxyDeploy => write!(f, "proxy-deploy"),
            DeployStep::AdminChange => write!(f, "admin-change"),
            DeployStep::Initialize => write!(f, "initialize"),
        }
    }
}

/// When the initializer runs relative to the admin change
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitOrder {
    /// Hand off admin rights, then initialize from the (former admin) deployer.
    /// Transparent proxies refuse fallback calls from their admin, so this is
    /// the only order they accept.
    #[default]
    AfterAdminChange,
    /// Initialize while the deployer is still admin, then hand off admin rights
    BeforeAdminChange,
}

/// The storage slot a proxy keeps its admin in, used to read the admin back
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdminSlot {
    /// The slot used by ZeppelinOS `AdminUpgradeabilityProxy` contracts
    #[default]
    ZeppelinOs,
    /// The slot specified by EIP-1967
    Eip1967,
    /// Do not read the admin back
    Unchecked,
}

impl AdminSlot {
    /// The storage slot, if one is checked
    pub fn slot(self) -> Option<B256> {
        match self {
            AdminSlot::ZeppelinOs => Some(ZEPPELIN_OS_ADMIN_STORAGE_SLOT),
            AdminSlot::Eip1967 => Some(PROXY_ADMIN_STORAGE_SLOT),
            AdminSlot::Unchecked => None,
        }
    }
}

/// The recorded progress of an upgradeable deployment, as persisted per contract
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentProgress {
    /// The confirmed implementation address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation: Option<Address>,
    /// The confirmed proxy address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<Address>,
    /// The admin the proxy was handed to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin: Option<Address>,
    /// Whether the proxied initializer has run
    #[serde(default)]
    pub initialized: bool,
}

impl DeploymentProgress {
    /// Whether every step has completed
    pub fn is_complete(&self) -> bool {
        self.implementation.is_some()
            && self.proxy.is_some()
            && self.admin.is_some()
            && self.initialized
    }

    /// Whether no step has completed
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Check that the recorded steps respect the deployment ordering: a proxy
    /// is only recorded on top of an implementation, and proxy-bound steps
    /// only on top of a proxy. Zero addresses are never valid.
    pub fn validate(&self) -> Result<(), DeployError> {
        let recorded = [
            (DeployStep::ImplementationDeploy, self.implementation),
            (DeployStep::ProxyDeploy, self.proxy),
            (DeployStep::AdminChange, self.admin),
        ];
        if let Some((step, _)) = recorded
            .iter()
            .find(|(_, addr)| addr.is_some_and(|addr| addr.is_zero()))
        {
            return Err(DeployError::Precondition(format!(
                "recorded {step} address is the zero address"
            )));
        }

        if self.proxy.is_some() && self.implementation.is_none() {
            return Err(DeployError::Precondition(
                "proxy recorded without a confirmed implementation".to_string(),
            ));
        }

        if (self.admin.is_some() || self.initialized) && self.proxy.is_none() {
            return Err(DeployError::Precondition(
                "proxy-bound step recorded without a confirmed proxy".to_string(),
            ));
        }

        Ok(())
    }

    /// The steps recorded as complete, in execution order
    pub fn completed_steps(&self) -> Vec<DeployStep> {
        let mut steps = Vec::new();
        if self.implementation.is_some() {
            steps.push(DeployStep::ImplementationDeploy);
        }
        if self.proxy.is_some() {
            steps.push(DeployStep::ProxyDeploy);
        }
        if self.admin.is_some() {
            steps.push(DeployStep::AdminChange);
        }
        if self.initialized {
            steps.push(DeployStep::Initialize);
        }
        steps
    }
}

impl Display for DeploymentProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        /// Formats a possibly-absent address
        fn or_dash(addr: Option<Address>) -> String {
            addr.map_or_else(|| "-".to_string(), |addr| addr.to_string())
        }

        write!(
            f,
            "implementation={}, proxy={}, admin={}, initialized={}",
            or_dash(self.implementation),
            or_dash(self.proxy),
            or_dash(self.admin),
            self.initialized
        )
    }
}

/// The result of a completed upgradeable deployment
#[derive(Debug, Clone)]
pub struct UpgradeableDeployment {
    /// The implementation contract's address
    pub implementation: Address,
    /// The proxy contract's address, the stable identity of the contract
    pub proxy: Address,
    /// The proxy's admin
    pub admin: Address,
    /// Receipts of the transactions sent during this run, in order.
    /// Steps completed by an earlier run have no receipt here.
    pub receipts: Vec<(DeployStep, Receipt)>,
}
