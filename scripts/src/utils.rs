//! Utilities for the deploy scripts.

use alloy::dyn_abi::{DynSolType, DynSolValue, Specifier};
use itertools::Itertools;
use tracing::info;

use crate::{
    backend::{rpc::RpcBackend, ConfirmationPolicy},
    errors::DeployError,
    types::ContractDescriptor,
};

/// Connects to the node at `rpc_url` with the deployer's private key, checking
/// that the node is on the expected network if one is given
pub async fn setup_backend(
    rpc_url: &str,
    priv_key: &str,
    policy: ConfirmationPolicy,
    gas_limit: Option<u64>,
    expected_chain_id: Option<u64>,
) -> Result<RpcBackend, DeployError> {
    let backend = RpcBackend::connect(rpc_url, priv_key, policy, gas_limit).await?;

    if let Some(expected) = expected_chain_id {
        if backend.chain_id() != expected {
            return Err(DeployError::Precondition(format!(
                "expected chain {expected}, but {rpc_url} is on chain {}",
                backend.chain_id()
            )));
        }
    }

    Ok(backend)
}

/// Coerces string arguments into values for `descriptor`'s `initializer`,
/// picking the overload whose arity matches
pub fn parse_init_args(
    descriptor: &ContractDescriptor,
    initializer: &str,
    raw: &[String],
) -> Result<Vec<DynSolValue>, DeployError> {
    let function = descriptor
        .abi
        .function(initializer)
        .and_then(|overloads| overloads.iter().find(|f| f.inputs.len() == raw.len()))
        .ok_or_else(|| {
            DeployError::CalldataConstruction(format!(
                "`{}` has no `{initializer}` taking {} argument(s)",
                descriptor.name,
                raw.len()
            ))
        })?;

    let values = function
        .inputs
        .iter()
        .zip(raw)
        .map(|(param, value)| {
            let ty: DynSolType = param
                .resolve()
                .map_err(|e| DeployError::CalldataConstruction(e.to_string()))?;
            ty.coerce_str(value).map_err(|e| {
                DeployError::CalldataConstruction(format!("`{}` as {ty}: {e}", value))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if !values.is_empty() {
        info!(
            "{}.{initializer}({})",
            descriptor.name,
            raw.iter().join(", ")
        );
    }

    Ok(values)
}
