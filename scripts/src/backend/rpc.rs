//! A deployment backend talking JSON-RPC to a node, signing with a local key

use std::{str::FromStr, sync::Arc};

use alloy::{
    dyn_abi::DynSolValue,
    network::{Ethereum, TransactionBuilder},
    primitives::{Address, B256, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
    transports::http::reqwest::Url,
};
use async_trait::async_trait;
use tracing::{debug, info};

use super::{encode_call, encode_deploy_code, ConfirmationPolicy, DeploymentBackend};
use crate::{
    constants::{NUM_BYTES_ADDRESS, NUM_BYTES_STORAGE_SLOT},
    errors::{BackendError, DeployError},
    types::{ContractDescriptor, DeployedHandle, Receipt},
};

/// The provider type used by the backend
pub type Wallet = DynProvider<Ethereum>;

/// A backend sending transactions from a single local private key
pub struct RpcBackend {
    /// The signing provider
    provider: Wallet,
    /// The address of the signing key
    deployer: Address,
    /// The chain id reported by the node at connection time
    chain_id: u64,
    /// How long to wait on each transaction
    policy: ConfirmationPolicy,
    /// The gas limit attached to every transaction
    gas_limit: Option<u64>,
}

impl RpcBackend {
    /// Connect to the node at `rpc_url`, signing with `priv_key`
    pub async fn connect(
        rpc_url: &str,
        priv_key: &str,
        policy: ConfirmationPolicy,
        gas_limit: Option<u64>,
    ) -> Result<Self, DeployError> {
        let signer = PrivateKeySigner::from_str(priv_key)
            .map_err(|e| DeployError::ClientInitialization(e.to_string()))?;
        let deployer = signer.address();

        let url =
            Url::parse(rpc_url).map_err(|e| DeployError::ClientInitialization(e.to_string()))?;
        let provider = DynProvider::new(ProviderBuilder::new().wallet(signer).connect_http(url));

        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(|e| DeployError::ClientInitialization(e.to_string()))?;

        info!("connected to chain {chain_id} at {rpc_url} as {deployer}");
        Ok(Self {
            provider,
            deployer,
            chain_id,
            policy,
            gas_limit,
        })
    }

    /// The chain id reported by the node
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Attach the configured gas limit, if any
    fn with_gas(&self, tx: TransactionRequest) -> TransactionRequest {
        match self.gas_limit {
            Some(gas_limit) => tx.with_gas_limit(gas_limit),
            None => tx,
        }
    }

    /// Send a transaction and wait for it under the confirmation policy,
    /// returning the receipt and the created contract address, if any
    async fn send_and_confirm(
        &self,
        tx: TransactionRequest,
    ) -> Result<(Receipt, Option<Address>), BackendError> {
        let pending = self
            .provider
            .send_transaction(self.with_gas(tx))
            .await
            .map_err(|e| BackendError::Rejected(e.to_string()))?;
        let tx_hash = *pending.tx_hash();
        debug!("submitted transaction {tx_hash:#x}");

        let receipt = pending
            .with_required_confirmations(self.policy.confirmations)
            .with_timeout(Some(self.policy.timeout))
            .get_receipt()
            .await
            .map_err(|e| BackendError::Unconfirmed {
                tx_hash,
                reason: e.to_string(),
            })?;

        if !receipt.status() {
            return Err(BackendError::Reverted(tx_hash));
        }

        let confirmed = Receipt {
            tx_hash,
            block_number: receipt.block_number,
        };
        Ok((confirmed, receipt.contract_address))
    }
}

#[async_trait]
impl DeploymentBackend for RpcBackend {
    fn deployer(&self) -> Address {
        self.deployer
    }

    async fn deploy(
        &self,
        descriptor: Arc<ContractDescriptor>,
        args: &[DynSolValue],
    ) -> Result<(DeployedHandle, Receipt), BackendError> {
        let code = encode_deploy_code(&descriptor, args)?;
        let tx = TransactionRequest::default()
            .with_from(self.deployer)
            .with_deploy_code(code);

        let (receipt, created) = self.send_and_confirm(tx).await?;
        let address = created.ok_or(BackendError::MissingContractAddress(receipt.tx_hash))?;

        Ok((DeployedHandle::new(address, descriptor), receipt))
    }

    async fn call(
        &self,
        handle: &DeployedHandle,
        method: &str,
        args: &[DynSolValue],
        from: Address,
    ) -> Result<Receipt, BackendError> {
        if from != self.deployer {
            return Err(BackendError::NoSigner(from));
        }

        let calldata = encode_call(handle.descriptor(), method, args)?;
        let tx = TransactionRequest::default()
            .with_from(from)
            .with_to(handle.address())
            .with_input(calldata);

        let (receipt, _) = self.send_and_confirm(tx).await?;
        Ok(receipt)
    }

    async fn attach(
        &self,
        address: Address,
        descriptor: Arc<ContractDescriptor>,
    ) -> Result<DeployedHandle, BackendError> {
        let code = self
            .provider
            .get_code_at(address)
            .await
            .map_err(|e| BackendError::Rpc(e.to_string()))?;
        if code.is_empty() {
            return Err(BackendError::NoCode(address));
        }

        Ok(DeployedHandle::new(address, descriptor))
    }

    async fn storage_address(
        &self,
        address: Address,
        slot: B256,
    ) -> Result<Address, BackendError> {
        let word: B256 = self
            .provider
            .get_storage_at(address, U256::from_be_bytes(slot.0))
            .await
            .map_err(|e| BackendError::Rpc(e.to_string()))?
            .to_be_bytes::<NUM_BYTES_STORAGE_SLOT>()
            .into();

        Ok(Address::from_slice(
            &word[NUM_BYTES_STORAGE_SLOT - NUM_BYTES_ADDRESS..NUM_BYTES_STORAGE_SLOT],
        ))
    }
}
