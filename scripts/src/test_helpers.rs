//! In-memory stand-ins for the chain and the deployments file, used to drive
//! the orchestrator in tests

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use alloy::{
    dyn_abi::DynSolValue,
    json_abi::JsonAbi,
    primitives::{address, keccak256, Address, Bytes, B256},
};
use async_trait::async_trait;

use crate::{
    backend::{encode_call, encode_deploy_code, DeploymentBackend},
    constants::{DEFAULT_ADMIN_CHANGE_METHOD, DEFAULT_INITIALIZER, DEFAULT_PROXY_CONTRACT},
    deployments::DeploymentLedger,
    errors::{BackendError, DeployError},
    types::{ContractDescriptor, DeployedHandle, DeploymentProgress, Receipt},
};

/// The account the mock chain deploys from by default
pub const MOCK_DEPLOYER: Address = address!("627306090abab3a6e1400e9345bc60c78a8bef57");

// ---------------
// | Descriptors |
// ---------------

/// An implementation contract with a no-argument `initialize()`
pub fn implementation_descriptor(name: &str) -> ContractDescriptor {
    implementation_descriptor_with(name, "function initialize()")
}

/// An implementation contract whose initializer has the given signature
pub fn implementation_descriptor_with(name: &str, initializer: &str) -> ContractDescriptor {
    let abi = JsonAbi::parse([
        initializer,
        "function totalSupply() view returns (uint256)",
        "function transfer(address to, uint256 amount) returns (bool)",
    ])
    .unwrap();

    let bytecode = [&[0x60, 0x80, 0x60, 0x40][..], name.as_bytes()].concat();
    ContractDescriptor::new(name, abi, Bytes::from(bytecode))
}

/// An admin-upgradeable proxy taking its implementation at construction
pub fn proxy_descriptor() -> ContractDescriptor {
    let abi = JsonAbi::parse([
        "constructor(address _implementation)",
        "function changeAdmin(address newAdmin)",
        "function upgradeTo(address newImplementation)",
        "function admin() returns (address)",
        "function implementation() returns (address)",
    ])
    .unwrap();

    ContractDescriptor::new(
        DEFAULT_PROXY_CONTRACT,
        abi,
        Bytes::from_static(&[0x60, 0x80, 0x60, 0x40, 0x52]),
    )
}

// --------------
// | Mock chain |
// --------------

/// A transaction sent to the mock chain
#[derive(Debug, Clone, PartialEq)]
pub enum MockTransaction {
    /// A contract creation
    Deploy {
        /// The name of the deployed contract
        contract: String,
        /// The constructor arguments
        args: Vec<DynSolValue>,
        /// Whether the creation succeeded
        success: bool,
    },
    /// A call against a deployed address
    Call {
        /// The called address
        to: Address,
        /// The called method
        method: String,
        /// The sender
        from: Address,
        /// Whether the call succeeded
        success: bool,
    },
}

impl MockTransaction {
    /// Whether this is a contract creation
    pub fn is_deploy(&self) -> bool {
        matches!(self, MockTransaction::Deploy { .. })
    }

    /// The called method, if this is a call
    pub fn method(&self) -> Option<&str> {
        match self {
            MockTransaction::Call { method, .. } => Some(method),
            MockTransaction::Deploy { .. } => None,
        }
    }
}

/// A contract living on the mock chain
#[derive(Debug, Clone)]
enum MockContract {
    /// A plain contract, holding its own storage
    Implementation {
        /// The contract's interface
        descriptor: Arc<ContractDescriptor>,
        /// Number of times the initializer ran against this storage
        initializations: u32,
    },
    /// A proxy delegating into an implementation
    Proxy {
        /// The implementation calls are delegated to
        implementation: Address,
        /// The proxy's admin
        admin: Address,
        /// Number of times the initializer ran against the proxy's storage
        initializations: u32,
    },
}

/// The mutable state of a mock chain
#[derive(Debug, Default)]
struct ChainState {
    /// The deployer's next nonce
    nonce: u64,
    /// The deployed contracts
    contracts: HashMap<Address, MockContract>,
    /// Every transaction sent, in order
    transactions: Vec<MockTransaction>,
    /// Contract or method names whose transactions revert
    failures: HashSet<String>,
}

/// An in-memory chain with admin-upgradeable proxy semantics.
///
/// The proxy is recognized by name. Its admin is its deployer, only the admin
/// may call the admin-change method, and any other method is delegated to the
/// implementation. When the proxy is transparent, the admin is refused the
/// delegated methods. The initializer runs at most once per storage.
#[derive(Debug, Clone)]
pub struct MockChain {
    /// The account transactions are signed by
    deployer: Address,
    /// The artifact name deployed contracts are treated as proxies under
    proxy_contract: String,
    /// The proxy's admin-change method
    admin_change_method: String,
    /// The implementation's one-shot initializer
    initializer: String,
    /// Whether the admin is refused delegated calls
    transparent: bool,
    /// The chain's state, shared between clones
    state: Arc<Mutex<ChainState>>,
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChain {
    /// A fresh chain with a transparent proxy and the default deployer
    pub fn new() -> Self {
        Self {
            deployer: MOCK_DEPLOYER,
            proxy_contract: DEFAULT_PROXY_CONTRACT.to_string(),
            admin_change_method: DEFAULT_ADMIN_CHANGE_METHOD.to_string(),
            initializer: DEFAULT_INITIALIZER.to_string(),
            transparent: true,
            state: Arc::default(),
        }
    }

    /// Set whether the proxy's admin is refused delegated calls
    pub fn with_transparency(mut self, transparent: bool) -> Self {
        self.transparent = transparent;
        self
    }

    /// Make every transaction deploying the named contract, or calling the
    /// named method, revert
    pub fn fail_on(&self, name: &str) {
        self.state.lock().unwrap().failures.insert(name.to_string());
    }

    /// Stop injecting failures
    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failures.clear();
    }

    /// Every transaction sent so far, in order
    pub fn transactions(&self) -> Vec<MockTransaction> {
        self.state.lock().unwrap().transactions.clone()
    }

    /// The number of successful contract creations
    pub fn deploy_count(&self) -> usize {
        self.transactions()
            .iter()
            .filter(|tx| matches!(tx, MockTransaction::Deploy { success: true, .. }))
            .count()
    }

    /// The number of successful calls to `method`
    pub fn call_count(&self, method: &str) -> usize {
        self.transactions()
            .iter()
            .filter(|tx| matches!(tx, MockTransaction::Call { success: true, .. }))
            .filter(|tx| tx.method() == Some(method))
            .count()
    }

    /// The admin of the proxy at `proxy`
    pub fn proxy_admin(&self, proxy: Address) -> Option<Address> {
        match self.state.lock().unwrap().contracts.get(&proxy) {
            Some(MockContract::Proxy { admin, .. }) => Some(*admin),
            _ => None,
        }
    }

    /// The implementation the proxy at `proxy` delegates to
    pub fn proxy_implementation(&self, proxy: Address) -> Option<Address> {
        match self.state.lock().unwrap().contracts.get(&proxy) {
            Some(MockContract::Proxy { implementation, .. }) => Some(*implementation),
            _ => None,
        }
    }

    /// The number of times the initializer ran against the storage at `address`
    pub fn initializations(&self, address: Address) -> u32 {
        match self.state.lock().unwrap().contracts.get(&address) {
            Some(MockContract::Implementation {
                initializations, ..
            })
            | Some(MockContract::Proxy {
                initializations, ..
            }) => *initializations,
            None => 0,
        }
    }

    /// Execute a call against the contract at `to`, returning whether it succeeded
    fn execute(
        &self,
        state: &mut ChainState,
        to: Address,
        method: &str,
        args: &[DynSolValue],
        from: Address,
    ) -> bool {
        let Some(contract) = state.contracts.get(&to).cloned() else {
            return false;
        };

        match contract {
            MockContract::Implementation { descriptor, .. } => {
                descriptor.has_function(method) && self.run_business_call(state, to, method)
            }
            MockContract::Proxy {
                implementation,
                admin,
                ..
            } => {
                if method == self.admin_change_method {
                    let new_admin = match args {
                        [DynSolValue::Address(new_admin)] if from == admin => *new_admin,
                        _ => return false,
                    };
                    if let Some(MockContract::Proxy { admin, .. }) = state.contracts.get_mut(&to)
                    {
                        *admin = new_admin;
                    }
                    return true;
                }

                if self.transparent && from == admin {
                    return false;
                }

                let delegated = match state.contracts.get(&implementation) {
                    Some(MockContract::Implementation { descriptor, .. }) => {
                        descriptor.has_function(method)
                    }
                    _ => false,
                };
                delegated && self.run_business_call(state, to, method)
            }
        }
    }

    /// Run `method` against the storage at `storage`
    fn run_business_call(&self, state: &mut ChainState, storage: Address, method: &str) -> bool {
        if method != self.initializer {
            return true;
        }

        let initializations = match state.contracts.get_mut(&storage) {
            Some(MockContract::Implementation {
                initializations, ..
            })
            | Some(MockContract::Proxy {
                initializations, ..
            }) => initializations,
            None => return false,
        };
        if *initializations > 0 {
            return false;
        }

        *initializations += 1;
        true
    }
}

/// A deterministic hash for the `index`th transaction
fn tx_hash(index: usize) -> B256 {
    keccak256((index as u64).to_be_bytes())
}

#[async_trait]
impl DeploymentBackend for MockChain {
    fn deployer(&self) -> Address {
        self.deployer
    }

    async fn deploy(
        &self,
        descriptor: Arc<ContractDescriptor>,
        args: &[DynSolValue],
    ) -> Result<(DeployedHandle, Receipt), BackendError> {
        encode_deploy_code(&descriptor, args)?;

        let mut state = self.state.lock().unwrap();
        let index = state.transactions.len();
        let address = self.deployer.create(state.nonce);
        state.nonce += 1;

        let contract = if descriptor.name == self.proxy_contract {
            match args {
                [DynSolValue::Address(implementation)] => Some(MockContract::Proxy {
                    implementation: *implementation,
                    admin: self.deployer,
                    initializations: 0,
                }),
                _ => None,
            }
        } else {
            Some(MockContract::Implementation {
                descriptor: descriptor.clone(),
                initializations: 0,
            })
        };

        let contract = contract.filter(|_| !state.failures.contains(&descriptor.name));
        state.transactions.push(MockTransaction::Deploy {
            contract: descriptor.name.clone(),
            args: args.to_vec(),
            success: contract.is_some(),
        });

        let Some(contract) = contract else {
            return Err(BackendError::Reverted(tx_hash(index)));
        };
        state.contracts.insert(address, contract);

        let receipt = Receipt {
            tx_hash: tx_hash(index),
            block_number: Some(index as u64 + 1),
        };
        Ok((DeployedHandle::new(address, descriptor), receipt))
    }

    async fn call(
        &self,
        handle: &DeployedHandle,
        method: &str,
        args: &[DynSolValue],
        from: Address,
    ) -> Result<Receipt, BackendError> {
        encode_call(handle.descriptor(), method, args)?;
        if from != self.deployer {
            return Err(BackendError::NoSigner(from));
        }

        let mut state = self.state.lock().unwrap();
        let index = state.transactions.len();
        state.nonce += 1;

        let success = !state.failures.contains(method)
            && self.execute(&mut state, handle.address(), method, args, from);
        state.transactions.push(MockTransaction::Call {
            to: handle.address(),
            method: method.to_string(),
            from,
            success,
        });

        if !success {
            return Err(BackendError::Reverted(tx_hash(index)));
        }

        Ok(Receipt {
            tx_hash: tx_hash(index),
            block_number: Some(index as u64 + 1),
        })
    }

    async fn attach(
        &self,
        address: Address,
        descriptor: Arc<ContractDescriptor>,
    ) -> Result<DeployedHandle, BackendError> {
        if !self.state.lock().unwrap().contracts.contains_key(&address) {
            return Err(BackendError::NoCode(address));
        }

        Ok(DeployedHandle::new(address, descriptor))
    }

    async fn storage_address(
        &self,
        address: Address,
        _slot: B256,
    ) -> Result<Address, BackendError> {
        Ok(self.proxy_admin(address).unwrap_or(Address::ZERO))
    }
}

// ----------
// | Ledger |
// ----------

/// A deployments record held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    /// The recorded progress, keyed by contract name
    records: HashMap<String, DeploymentProgress>,
    /// The number of writes made
    writes: usize,
    /// The number of writes after which every write fails
    fail_after: Option<usize>,
}

impl MemoryLedger {
    /// A ledger holding `progress` for `contract`
    pub fn with(mut self, contract: &str, progress: DeploymentProgress) -> Self {
        self.records.insert(contract.to_string(), progress);
        self
    }

    /// Fail every write once `writes` writes have succeeded
    pub fn failing_after(mut self, writes: usize) -> Self {
        self.fail_after = Some(writes);
        self
    }

    /// The number of writes made
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl DeploymentLedger for MemoryLedger {
    fn load(&self, contract: &str) -> Result<DeploymentProgress, DeployError> {
        Ok(self.records.get(contract).cloned().unwrap_or_default())
    }

    fn record(
        &mut self,
        contract: &str,
        progress: &DeploymentProgress,
    ) -> Result<(), DeployError> {
        if self.fail_after.is_some_and(|limit| self.writes >= limit) {
            return Err(DeployError::WriteDeployments("disk full".to_string()));
        }

        self.records.insert(contract.to_string(), progress.clone());
        self.writes += 1;
        Ok(())
    }
}
