//! Deployment descriptor (`deployed-<network>.json`) loading

use indexmap::IndexMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Directories searched for the descriptor, relative to the project root
const SEARCH_DIRS: &[&str] = &[".", ".."];

/// Networks whose descriptor is never deleted
pub const PROTECTED_NETWORKS: &[&str] = &["mainnet", "goerli", "rinkeby", "mainnet-test"];

const ROLE_PREFIX: &str = "app:";

/// One deployed application, as recorded under an `app:<role>` key
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInfo {
    #[serde(default)]
    pub base_address: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub name: String,
    /// On-chain app identifier
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub ipfs_cid: String,
    #[serde(default, rename = "contentURI")]
    pub content_uri: String,
    #[serde(default)]
    pub proxy_address: String,
}

/// Addresses produced by a previous deployment run. Read-only once loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawDescriptor")]
pub struct DeploymentDescriptor {
    pub dao_address: String,
    /// Role name (without the `app:` prefix) to app record, in file order
    pub roles: IndexMap<String, AppInfo>,
}

#[derive(Deserialize)]
struct RawDescriptor {
    #[serde(rename = "daoAddress", default)]
    dao_address: String,
    #[serde(flatten)]
    rest: IndexMap<String, serde_json::Value>,
}

impl TryFrom<RawDescriptor> for DeploymentDescriptor {
    type Error = serde_json::Error;

    fn try_from(raw: RawDescriptor) -> Result<Self, Self::Error> {
        let mut roles = IndexMap::new();
        for (key, value) in raw.rest {
            if let Some(role) = key.strip_prefix(ROLE_PREFIX) {
                roles.insert(role.to_string(), serde_json::from_value(value)?);
            }
        }

        Ok(Self {
            dao_address: raw.dao_address,
            roles,
        })
    }
}

impl DeploymentDescriptor {
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    pub fn from_file(path: &Path) -> Result<Self, DescriptorError> {
        let content = std::fs::read_to_string(path).map_err(|e| DescriptorError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&content).map_err(|e| DescriptorError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// `deployed-<network>.json`
pub fn file_name(network: &str) -> String {
    format!("deployed-{}.json", network)
}

/// Locate the descriptor for `network` in the project root or its parent
pub fn locate(project_root: &Path, network: &str) -> Option<PathBuf> {
    let name = file_name(network);
    SEARCH_DIRS
        .iter()
        .map(|dir| project_root.join(dir).join(&name))
        .find(|path| path.is_file())
}

/// Load the descriptor for `network`, if one exists
pub fn find(
    project_root: &Path,
    network: &str,
) -> Result<Option<(DeploymentDescriptor, PathBuf)>, DescriptorError> {
    let Some(path) = locate(project_root, network) else {
        log::debug!(
            "No {} found near {}",
            file_name(network),
            project_root.display()
        );
        return Ok(None);
    };

    let descriptor = DeploymentDescriptor::from_file(&path)?;
    log::info!("Loaded deployment descriptor: {}", path.display());
    Ok(Some((descriptor, path)))
}

/// Delete the descriptor of a local network before a fresh deployment.
///
/// Returns the removed path, or `None` when there was nothing to remove.
pub fn remove(project_root: &Path, network: &str) -> Result<Option<PathBuf>, DescriptorError> {
    let Some(path) = locate(project_root, network) else {
        return Ok(None);
    };

    if PROTECTED_NETWORKS.contains(&network) {
        return Err(DescriptorError::Protected {
            network: network.to_string(),
            path,
        });
    }

    std::fs::remove_file(&path).map_err(|e| DescriptorError::Io {
        path: path.clone(),
        source: e,
    })?;
    log::info!("Removed {}", path.display());
    Ok(Some(path))
}

#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("Failed to read deployment descriptor '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse deployment descriptor '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Refusing to remove '{}' on network {network}", path.display())]
    Protected { network: String, path: PathBuf },
}
