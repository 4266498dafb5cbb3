//! Persisted deployment records.
//!
//! Each network has its own deployments file mapping a contract name to the
//! progress of its upgradeable deployment. The file is read before a run, to
//! resume from the last confirmed step, and rewritten after every step.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{errors::DeployError, types::DeploymentProgress};

/// A store of per-contract deployment progress
pub trait DeploymentLedger {
    /// The recorded progress for `contract`, empty if nothing was recorded
    fn load(&self, contract: &str) -> Result<DeploymentProgress, DeployError>;

    /// Record the progress for `contract`, replacing the previous record
    fn record(&mut self, contract: &str, progress: &DeploymentProgress)
        -> Result<(), DeployError>;
}

/// The on-disk layout of a deployments file
#[derive(Debug, Default, Serialize, Deserialize)]
struct DeploymentsDocument {
    /// The chain the recorded addresses live on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    chain_id: Option<u64>,
    /// The recorded progress, keyed by contract name
    #[serde(default)]
    deployments: BTreeMap<String, DeploymentProgress>,
}

/// A JSON deployments file for a single network
#[derive(Debug)]
pub struct DeploymentsFile {
    /// Where the file lives
    path: PathBuf,
    /// The file's current contents
    document: DeploymentsDocument,
}

impl DeploymentsFile {
    /// Open the deployments file at `path` for the network `chain_id`.
    ///
    /// A missing file is an empty record. A file written for a different
    /// network is rejected.
    pub fn open(path: impl Into<PathBuf>, chain_id: u64) -> Result<Self, DeployError> {
        let path = path.into();
        let mut document = if path.exists() {
            let contents = fs::read_to_string(&path)
                .map_err(|e| DeployError::ReadDeployments(e.to_string()))?;
            serde_json::from_str::<DeploymentsDocument>(&contents)
                .map_err(|e| DeployError::ReadDeployments(format!("{}: {e}", path.display())))?
        } else {
            debug!("no deployments file at {}, starting empty", path.display());
            DeploymentsDocument::default()
        };

        match document.chain_id {
            Some(recorded) if recorded != chain_id => {
                return Err(DeployError::Precondition(format!(
                    "{} records chain {recorded}, but the node is on chain {chain_id}",
                    path.display()
                )));
            }
            Some(_) => {}
            None => document.chain_id = Some(chain_id),
        }

        Ok(Self { path, document })
    }

    /// Where the file lives
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The names of every contract with a record
    pub fn contracts(&self) -> impl Iterator<Item = &str> {
        self.document.deployments.keys().map(String::as_str)
    }

    /// Write the document to disk, replacing the file atomically
    fn persist(&self) -> Result<(), DeployError> {
        let contents = serde_json::to_string_pretty(&self.document)
            .map_err(|e| DeployError::WriteDeployments(e.to_string()))?;

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, contents).map_err(|e| DeployError::WriteDeployments(e.to_string()))?;
        fs::rename(&tmp_path, &self.path)
            .map_err(|e| DeployError::WriteDeployments(e.to_string()))
    }
}

impl DeploymentLedger for DeploymentsFile {
    fn load(&self, contract: &str) -> Result<DeploymentProgress, DeployError> {
        Ok(self
            .document
            .deployments
            .get(contract)
            .cloned()
            .unwrap_or_default())
    }

    fn record(
        &mut self,
        contract: &str,
        progress: &DeploymentProgress,
    ) -> Result<(), DeployError> {
        self.document
            .deployments
            .insert(contract.to_string(), progress.clone());
        self.persist()
    }
}
