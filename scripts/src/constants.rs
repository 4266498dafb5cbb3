//! Constants used in the deploy scripts

use alloy::primitives::{b256, B256};

/// The default RPC URL, a local development node
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8000";

/// The default number of confirmations to wait for on each transaction
pub const DEFAULT_CONFIRMATIONS: u64 = 1;

/// The default number of seconds to wait for a transaction's confirmations
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 120;

/// The default directory holding compiled contract artifacts
pub const DEFAULT_ARTIFACTS_DIR: &str = "build/contracts";

/// The default path of the deployments file
pub const DEFAULT_DEPLOYMENTS_PATH: &str = "deployments.json";

/// The artifact name of the proxy contract
pub const DEFAULT_PROXY_CONTRACT: &str = "AdminUpgradeabilityProxy";

/// The proxy method transferring admin rights
pub const DEFAULT_ADMIN_CHANGE_METHOD: &str = "changeAdmin";

/// The implementation's one-shot initializer
pub const DEFAULT_INITIALIZER: &str = "initialize";

/// The storage slot containing the proxy admin address in an EIP-1967 proxy.
///
/// This is specified in EIP1967: https://eips.ethereum.org/EIPS/eip-1967#admin-address
pub const PROXY_ADMIN_STORAGE_SLOT: B256 =
    b256!("b53127684a568b3173ae13b9f8a6016e243e63b6e8ee1178d6a717850b5d6103");

/// The storage slot containing the proxy admin address in a ZeppelinOS
/// `AdminUpgradeabilityProxy`, `keccak256("org.zeppelinos.proxy.admin")`
pub const ZEPPELIN_OS_ADMIN_STORAGE_SLOT: B256 =
    b256!("10d6a54a4754c8869d6886b5f5d7fbfa5b4522237ea5c60d11bc4e7a1ff9390b");

/// The number of bytes stored in a single storage slot
pub const NUM_BYTES_STORAGE_SLOT: usize = 32;

/// The number of bytes in an Ethereum address
pub const NUM_BYTES_ADDRESS: usize = 20;

/// The extension of a compiled artifact file
pub const ARTIFACT_EXTENSION: &str = "json";

/// The extension of the per-source directories in a Foundry `out/` tree
pub const SOLIDITY_SOURCE_EXTENSION: &str = "sol";
