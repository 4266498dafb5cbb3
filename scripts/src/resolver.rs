//! Resolution of logical contract names into deployable descriptors.
//!
//! Resolvers are explicit objects handed to the orchestrator; there is no
//! ambient registry of artifacts.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use alloy::{json_abi::JsonAbi, primitives::Bytes};
use itertools::Itertools;
use serde::Deserialize;
use tracing::debug;

use crate::{
    constants::{ARTIFACT_EXTENSION, SOLIDITY_SOURCE_EXTENSION},
    errors::DeployError,
    types::ContractDescriptor,
};

/// Turns a contract name into a deployable descriptor. Pure lookup, no side effects.
pub trait ArtifactResolver {
    /// Resolve `name` to exactly one descriptor
    fn resolve(&self, name: &str) -> Result<ContractDescriptor, DeployError>;
}

/// A resolver over an explicit in-memory set of descriptors
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    /// The registered descriptors, keyed by name
    descriptors: HashMap<String, ContractDescriptor>,
}

impl StaticResolver {
    /// Create an empty resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor under its name, replacing any earlier one
    pub fn insert(&mut self, descriptor: ContractDescriptor) {
        self.descriptors.insert(descriptor.name.clone(), descriptor);
    }

    /// Builder form of [`StaticResolver::insert`]
    pub fn with(mut self, descriptor: ContractDescriptor) -> Self {
        self.insert(descriptor);
        self
    }
}

impl ArtifactResolver for StaticResolver {
    fn resolve(&self, name: &str) -> Result<ContractDescriptor, DeployError> {
        self.descriptors
            .get(name)
            .cloned()
            .ok_or_else(|| DeployError::Resolution(format!("unknown contract `{name}`")))
    }
}

/// A resolver reading compiler artifacts from a directory.
///
/// Both the Truffle layout (`<dir>/<Name>.json`, bytecode as a hex string) and
/// the Foundry layout (`<dir>/<Name>.sol/<Name>.json`, bytecode under `object`)
/// are understood.
#[derive(Debug, Clone)]
pub struct ArtifactDirResolver {
    /// The directory holding the artifacts
    dir: PathBuf,
}

/// The subset of a compiler artifact needed to deploy a contract
#[derive(Deserialize)]
struct ArtifactFile {
    /// The contract's ABI
    abi: JsonAbi,
    /// The contract's creation bytecode
    bytecode: ArtifactBytecode,
}

/// Creation bytecode as laid out by the different toolchains
#[derive(Deserialize)]
#[serde(untagged)]
enum ArtifactBytecode {
    /// A bare hex string
    Hex(String),
    /// An object whose `object` field holds the hex string
    Object {
        /// The hex-encoded bytecode
        object: String,
    },
}

impl ArtifactBytecode {
    /// The hex string, in either layout
    fn hex(&self) -> &str {
        match self {
            ArtifactBytecode::Hex(hex) => hex,
            ArtifactBytecode::Object { object } => object,
        }
    }
}

impl ArtifactDirResolver {
    /// Create a resolver over `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory holding the artifacts
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The paths at which an artifact for `name` may live
    fn candidate_paths(&self, name: &str) -> [PathBuf; 2] {
        let file_name = format!("{name}.{ARTIFACT_EXTENSION}");
        [
            self.dir.join(&file_name),
            self.dir
                .join(format!("{name}.{SOLIDITY_SOURCE_EXTENSION}"))
                .join(&file_name),
        ]
    }

    /// Parse the artifact at `path` into a descriptor named `name`
    fn read_artifact(name: &str, path: &Path) -> Result<ContractDescriptor, DeployError> {
        let contents =
            fs::read_to_string(path).map_err(|e| DeployError::ArtifactParsing(e.to_string()))?;
        let artifact: ArtifactFile = serde_json::from_str(&contents).map_err(|e| {
            DeployError::ArtifactParsing(format!("{}: {e}", path.display()))
        })?;

        let hex = artifact.bytecode.hex();
        if hex.contains("__") {
            return Err(DeployError::ArtifactParsing(format!(
                "{}: bytecode has unlinked library placeholders",
                path.display()
            )));
        }
        let bytecode =
            Bytes::from_str(hex).map_err(|e| DeployError::ArtifactParsing(e.to_string()))?;

        Ok(ContractDescriptor::new(name, artifact.abi, bytecode))
    }
}

impl ArtifactResolver for ArtifactDirResolver {
    fn resolve(&self, name: &str) -> Result<ContractDescriptor, DeployError> {
        if name.is_empty() || name.contains(['/', '\\', '.']) {
            return Err(DeployError::Resolution(format!(
                "`{name}` is not a valid contract name"
            )));
        }

        let descriptors = self
            .candidate_paths(name)
            .into_iter()
            .filter(|path| path.is_file())
            .map(|path| {
                debug!("reading artifact for `{name}` from {}", path.display());
                Self::read_artifact(name, &path)
            })
            .collect::<Result<Vec<_>, _>>()?;

        // The same artifact copied into both layouts is not ambiguous
        let mut distinct = descriptors
            .into_iter()
            .unique_by(|descriptor| descriptor.code_hash())
            .collect_vec();

        let descriptor = match distinct.len() {
            0 => {
                return Err(DeployError::Resolution(format!(
                    "no artifact for `{name}` in {}",
                    self.dir.display()
                )))
            }
            1 => distinct.remove(0),
            n => {
                return Err(DeployError::Resolution(format!(
                    "`{name}` resolves to {n} distinct artifacts in {}",
                    self.dir.display()
                )))
            }
        };

        if descriptor.bytecode.is_empty() {
            return Err(DeployError::Resolution(format!(
                "`{name}` has no creation bytecode and cannot be deployed"
            )));
        }

        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tempfile::TempDir;

    /// A minimal Truffle artifact
    fn truffle_artifact(bytecode: &str) -> String {
        json!({
            "contractName": "TeslaShare",
            "abi": [
                {
                    "type": "function",
                    "name": "initialize",
                    "inputs": [],
                    "outputs": [],
                    "stateMutability": "nonpayable"
                }
            ],
            "bytecode": bytecode,
        })
        .to_string()
    }

    /// A minimal Foundry artifact
    fn foundry_artifact(bytecode: &str) -> String {
        json!({
            "abi": [
                {
                    "type": "function",
                    "name": "initialize",
                    "inputs": [],
                    "outputs": [],
                    "stateMutability": "nonpayable"
                }
            ],
            "bytecode": { "object": bytecode, "sourceMap": "" },
        })
        .to_string()
    }

    #[test]
    fn resolves_truffle_layout() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("TeslaShare.json"), truffle_artifact("0x6080")).unwrap();

        let descriptor = ArtifactDirResolver::new(dir.path()).resolve("TeslaShare").unwrap();
        assert_eq!(descriptor.name, "TeslaShare");
        assert_eq!(descriptor.bytecode, Bytes::from_static(&[0x60, 0x80]));
        assert!(descriptor.has_function("initialize"));
    }

    #[test]
    fn resolves_foundry_layout() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("TeslaShare.sol")).unwrap();
        fs::write(
            dir.path().join("TeslaShare.sol").join("TeslaShare.json"),
            foundry_artifact("0x6080"),
        )
        .unwrap();

        let descriptor = ArtifactDirResolver::new(dir.path()).resolve("TeslaShare").unwrap();
        assert_eq!(descriptor.bytecode, Bytes::from_static(&[0x60, 0x80]));
    }

    #[test]
    fn resolution_is_idempotent() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("TeslaShare.json"), truffle_artifact("0x60806040")).unwrap();
        let resolver = ArtifactDirResolver::new(dir.path());

        let first = resolver.resolve("TeslaShare").unwrap();
        let second = resolver.resolve("TeslaShare").unwrap();
        assert_eq!(first.code_hash(), second.code_hash());
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_name_is_a_resolution_error() {
        let dir = TempDir::new().unwrap();
        let err = ArtifactDirResolver::new(dir.path()).resolve("Missing").unwrap_err();
        assert!(matches!(err, DeployError::Resolution(_)));
    }

    #[test]
    fn conflicting_layouts_are_ambiguous() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("TeslaShare.json"), truffle_artifact("0x6080")).unwrap();
        fs::create_dir(dir.path().join("TeslaShare.sol")).unwrap();
        fs::write(
            dir.path().join("TeslaShare.sol").join("TeslaShare.json"),
            foundry_artifact("0x6081"),
        )
        .unwrap();

        let err = ArtifactDirResolver::new(dir.path()).resolve("TeslaShare").unwrap_err();
        assert!(matches!(err, DeployError::Resolution(_)));
    }

    #[test]
    fn interface_without_bytecode_is_not_deployable() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("TeslaShare.json"), truffle_artifact("0x")).unwrap();

        let err = ArtifactDirResolver::new(dir.path()).resolve("TeslaShare").unwrap_err();
        assert!(matches!(err, DeployError::Resolution(_)));
    }

    #[test]
    fn unlinked_bytecode_is_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("TeslaShare.json"),
            truffle_artifact("0x73__SafeMath______________________________6080"),
        )
        .unwrap();

        let err = ArtifactDirResolver::new(dir.path()).resolve("TeslaShare").unwrap_err();
        assert!(matches!(err, DeployError::ArtifactParsing(_)));
    }

    #[test]
    fn path_like_names_are_rejected() {
        let dir = TempDir::new().unwrap();
        let err = ArtifactDirResolver::new(dir.path()).resolve("../TeslaShare").unwrap_err();
        assert!(matches!(err, DeployError::Resolution(_)));
    }

    #[test]
    fn static_resolver_looks_up_registered_names() {
        let descriptor = ContractDescriptor::new(
            "TeslaShare",
            JsonAbi::default(),
            Bytes::from_static(&[0x60, 0x80]),
        );
        let resolver = StaticResolver::new().with(descriptor.clone());

        assert_eq!(resolver.resolve("TeslaShare").unwrap(), descriptor);
        assert!(matches!(
            resolver.resolve("Tesla"),
            Err(DeployError::Resolution(_))
        ));
    }
}
