//! Reads policy documents from files.

use crate::k8s::{AdminNetworkPolicy, BaselineAdminNetworkPolicy, NetworkPolicy};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Policy documents of every supported kind.
#[derive(Clone, Debug, Default)]
pub struct Documents {
    pub network_policies: Vec<NetworkPolicy>,
    pub admin_network_policies: Vec<AdminNetworkPolicy>,
    pub baseline_admin_network_policies: Vec<BaselineAdminNetworkPolicy>,
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

// === impl Documents ===

impl Documents {
    /// Loads a single file, or every `.yaml`, `.yml` and `.json` file directly inside a
    /// directory in name order.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let io = |source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut docs = Self::default();
        if path.is_dir() {
            let mut files = std::fs::read_dir(path)
                .map_err(io)?
                .map(|e| e.map(|e| e.path()))
                .collect::<Result<Vec<_>, _>>()
                .map_err(io)?;
            files.retain(|f| {
                f.is_file()
                    && matches!(
                        f.extension().and_then(|e| e.to_str()),
                        Some("yaml" | "yml" | "json")
                    )
            });
            files.sort();
            for file in files {
                docs.extend(Self::load_file(&file)?);
            }
        } else {
            docs = Self::load_file(path)?;
        }
        Ok(docs)
    }

    fn load_file(path: &Path) -> Result<Self, LoadError> {
        let contents = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents).map_err(|source| LoadError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parses a stream of YAML (or JSON) documents. `List` objects are unwrapped and documents
    /// of other kinds are skipped.
    pub fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
        let mut docs = Self::default();
        for document in serde_yaml::Deserializer::from_str(contents) {
            let value = serde_yaml::Value::deserialize(document)?;
            docs.push(value)?;
        }
        Ok(docs)
    }

    pub fn extend(&mut self, other: Self) {
        self.network_policies.extend(other.network_policies);
        self.admin_network_policies
            .extend(other.admin_network_policies);
        self.baseline_admin_network_policies
            .extend(other.baseline_admin_network_policies);
    }

    pub fn len(&self) -> usize {
        self.network_policies.len()
            + self.admin_network_policies.len()
            + self.baseline_admin_network_policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&mut self, value: serde_yaml::Value) -> Result<(), serde_yaml::Error> {
        if value.is_null() {
            return Ok(());
        }
        let kind = value
            .get("kind")
            .and_then(|k| k.as_str())
            .unwrap_or_default()
            .to_string();
        match kind.as_str() {
            "List" => {
                let items = value
                    .get("items")
                    .and_then(|i| i.as_sequence())
                    .cloned()
                    .unwrap_or_default();
                for item in items {
                    self.push(item)?;
                }
            }
            "NetworkPolicy" => self.network_policies.push(serde_yaml::from_value(value)?),
            "AdminNetworkPolicy" => self
                .admin_network_policies
                .push(serde_yaml::from_value(value)?),
            "BaselineAdminNetworkPolicy" => self
                .baseline_admin_network_policies
                .push(serde_yaml::from_value(value)?),
            kind => debug!(%kind, "Skipping document"),
        }
        Ok(())
    }
}
