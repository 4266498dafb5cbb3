//! The deployment backend: sends transactions and waits for their confirmation.
//!
//! Every transaction-sending method returns only once the transaction is
//! confirmed under the backend's [`ConfirmationPolicy`]. A submitted but
//! unconfirmed transaction is reported as an error, never as success.

pub mod rpc;

use std::{sync::Arc, time::Duration};

use alloy::{
    dyn_abi::{DynSolValue, JsonAbiExt},
    primitives::{Address, Bytes, B256},
};
use async_trait::async_trait;

use crate::{
    constants::{DEFAULT_CONFIRMATIONS, DEFAULT_CONFIRMATION_TIMEOUT_SECS},
    errors::BackendError,
    types::{ContractDescriptor, DeployedHandle, Receipt},
};

/// How long, and for how many blocks, a backend waits on a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    /// The number of confirmations required
    pub confirmations: u64,
    /// How long to wait before giving up on the confirmations
    pub timeout: Duration,
}

impl ConfirmationPolicy {
    /// Create a new policy
    pub fn new(confirmations: u64, timeout: Duration) -> Self {
        Self {
            confirmations,
            timeout,
        }
    }
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_CONFIRMATIONS,
            Duration::from_secs(DEFAULT_CONFIRMATION_TIMEOUT_SECS),
        )
    }
}

/// Sends contract-creation and state-changing transactions, blocking until
/// each is confirmed
#[async_trait]
pub trait DeploymentBackend: Send + Sync {
    /// The account the backend deploys from
    fn deployer(&self) -> Address;

    /// Deploy `descriptor` with the given constructor arguments, returning a
    /// handle bound to the confirmed address
    async fn deploy(
        &self,
        descriptor: Arc<ContractDescriptor>,
        args: &[DynSolValue],
    ) -> Result<(DeployedHandle, Receipt), BackendError>;

    /// Call `method` on `handle` as `from`, returning the confirmed receipt
    async fn call(
        &self,
        handle: &DeployedHandle,
        method: &str,
        args: &[DynSolValue],
        from: Address,
    ) -> Result<Receipt, BackendError>;

    /// View an existing address through a different interface. Sends nothing.
    fn reinterpret(
        &self,
        address: Address,
        descriptor: Arc<ContractDescriptor>,
    ) -> DeployedHandle {
        DeployedHandle::new(address, descriptor)
    }

    /// Bind a previously deployed address to an interface, checking that
    /// contract code exists there
    async fn attach(
        &self,
        address: Address,
        descriptor: Arc<ContractDescriptor>,
    ) -> Result<DeployedHandle, BackendError>;

    /// Read an address stored in `slot` of the contract at `address`
    async fn storage_address(
        &self,
        address: Address,
        slot: B256,
    ) -> Result<Address, BackendError>;
}

/// Prepare the creation code for `descriptor`: its bytecode followed by the
/// ABI-encoded constructor arguments
pub fn encode_deploy_code(
    descriptor: &ContractDescriptor,
    args: &[DynSolValue],
) -> Result<Bytes, BackendError> {
    let encoded_args = match descriptor.abi.constructor() {
        Some(constructor) => constructor
            .abi_encode_input(args)
            .map_err(|e| BackendError::Encoding(e.to_string()))?,
        None if args.is_empty() => Vec::new(),
        None => {
            return Err(BackendError::Encoding(format!(
                "`{}` takes no constructor arguments, got {}",
                descriptor.name,
                args.len()
            )))
        }
    };

    Ok([descriptor.bytecode.as_ref(), encoded_args.as_slice()].concat().into())
}

/// Prepare calldata for `method(args)` against `descriptor`'s ABI.
///
/// Overloads are disambiguated by arity.
pub fn encode_call(
    descriptor: &ContractDescriptor,
    method: &str,
    args: &[DynSolValue],
) -> Result<Bytes, BackendError> {
    let overloads = descriptor
        .abi
        .function(method)
        .filter(|overloads| !overloads.is_empty())
        .ok_or_else(|| BackendError::UnknownMethod {
            contract: descriptor.name.clone(),
            method: method.to_string(),
        })?;

    let function = overloads
        .iter()
        .find(|function| function.inputs.len() == args.len())
        .ok_or_else(|| {
            BackendError::Encoding(format!(
                "`{}.{method}` takes no overload with {} argument(s)",
                descriptor.name,
                args.len()
            ))
        })?;

    function
        .abi_encode_input(args)
        .map(Bytes::from)
        .map_err(|e| BackendError::Encoding(e.to_string()))
}
