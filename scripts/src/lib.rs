//! Scripts for deploying contracts behind admin-upgradeable proxies.

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

pub mod backend;
pub mod cli;
mod commands;
pub mod constants;
pub mod deployments;
pub mod errors;
pub mod orchestrator;
pub mod resolver;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
pub mod types;
pub mod utils;
