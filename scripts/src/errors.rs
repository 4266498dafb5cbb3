//! Definitions of errors that can occur while deploying an upgradeable contract

use alloy::primitives::{Address, B256};
use thiserror::Error;

use crate::types::{DeployStep, DeploymentProgress};

/// A result type whose error is a [`DeployError`]
pub type DeployResult<T> = Result<T, DeployError>;

/// Errors that can occur while deploying and wiring an upgradeable contract
#[derive(Debug, Error)]
pub enum DeployError {
    /// The requested contract name could not be resolved to exactly one artifact.
    /// No transactions are sent when this occurs.
    #[error("error resolving artifact: {0}")]
    Resolution(String),
    /// A deployment or call transaction was rejected, reverted, or never confirmed
    #[error("transaction failed during {step}: {source} (progress: {progress})")]
    Transaction {
        /// The step whose transaction failed
        step: DeployStep,
        /// The steps that completed before the failure, with their addresses
        progress: DeploymentProgress,
        /// The underlying backend error
        #[source]
        source: BackendError,
    },
    /// A step was confirmed on-chain but its progress could not be recorded
    #[error("{step} confirmed but not recorded: {source} (progress: {progress})")]
    Record {
        /// The confirmed step whose record failed
        step: DeployStep,
        /// The confirmed progress, including the unrecorded step
        progress: DeploymentProgress,
        /// The underlying ledger error
        #[source]
        source: Box<DeployError>,
    },
    /// An input or recorded state failed validation before any transaction was sent
    #[error("precondition violated: {0}")]
    Precondition(String),
    /// Error parsing a compilation artifact
    #[error("error parsing artifact: {0}")]
    ArtifactParsing(String),
    /// Error reading the deployments file
    #[error("error reading deployments: {0}")]
    ReadDeployments(String),
    /// Error writing the deployments file
    #[error("error writing deployments: {0}")]
    WriteDeployments(String),
    /// Error initializing the RPC client
    #[error("error initializing client: {0}")]
    ClientInitialization(String),
    /// Error constructing calldata for a contract method
    #[error("error constructing calldata: {0}")]
    CalldataConstruction(String),
    /// Error reading state from a deployed contract
    #[error("error interacting with contract: {0}")]
    ContractInteraction(String),
}

impl DeployError {
    /// The step that failed or could not be recorded, if any
    pub fn failed_step(&self) -> Option<DeployStep> {
        match self {
            DeployError::Transaction { step, .. } | DeployError::Record { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// The progress confirmed on-chain before the error, if any transaction was sent
    pub fn progress(&self) -> Option<&DeploymentProgress> {
        match self {
            DeployError::Transaction { progress, .. } | DeployError::Record { progress, .. } => {
                Some(progress)
            }
            _ => None,
        }
    }
}

/// Errors surfaced by a deployment backend while sending or confirming a transaction
#[derive(Debug, Error)]
pub enum BackendError {
    /// The node refused the transaction
    #[error("transaction rejected: {0}")]
    Rejected(String),
    /// The transaction was mined but reverted
    #[error("transaction {0:#x} reverted")]
    Reverted(B256),
    /// The transaction was submitted but its confirmation could not be obtained
    #[error("transaction {tx_hash:#x} unconfirmed: {reason}")]
    Unconfirmed {
        /// Hash of the submitted transaction
        tx_hash: B256,
        /// Why the confirmation wait ended
        reason: String,
    },
    /// A contract-creation receipt did not carry the created address
    #[error("creation receipt {0:#x} carries no contract address")]
    MissingContractAddress(B256),
    /// The requested method is absent from the handle's ABI
    #[error("no method `{method}` in the ABI of `{contract}`")]
    UnknownMethod {
        /// Name of the contract whose ABI was searched
        contract: String,
        /// Name of the method that was not found
        method: String,
    },
    /// The arguments could not be ABI-encoded
    #[error("error encoding arguments: {0}")]
    Encoding(String),
    /// The backend cannot sign transactions for the requested sender
    #[error("no signer available for {0}")]
    NoSigner(Address),
    /// No contract code exists at the address
    #[error("no contract code at {0}")]
    NoCode(Address),
    /// The proxy's admin after the admin change is not the requested one
    #[error("proxy admin is {actual}, expected {expected}")]
    AdminMismatch {
        /// The admin that was requested
        expected: Address,
        /// The admin read back from the proxy
        actual: Address,
    },
    /// Any other error talking to the node
    #[error("rpc error: {0}")]
    Rpc(String),
}
