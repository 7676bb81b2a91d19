//! # File Provider
//!
//! Reads the mesh inventory from a YAML file. The file is re-read on every
//! poll, so edits are picked up without restarting the control plane.
//!
//! Schema:
//!
//! ```yaml
//! nodes:
//!   <node-id>:
//!     - name: <cluster-name>
//!       annotations: { <key>: <value> }
//!       endpoints:
//!         - address: <string>
//!           port: <int>
//!           annotations: { <key>: <value> }
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{ClusterSpec, NodeInventory, ServiceProvider};
use crate::errors::Result;

/// A [`ServiceProvider`] backed by a YAML inventory file.
#[derive(Debug, Clone)]
pub struct FileProvider {
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct InventoryFile {
    #[serde(default)]
    nodes: std::collections::HashMap<String, Vec<ClusterSpec>>,
}

impl FileProvider {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    fn read_inventory(&self) -> Result<InventoryFile> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            crate::Error::provider_with_source(
                format!("failed to read inventory file '{}'", self.path.display()),
                Box::new(e),
            )
        })?;

        serde_yaml::from_str(&content).map_err(|e| {
            crate::Error::provider_with_source(
                format!("failed to parse inventory file '{}'", self.path.display()),
                Box::new(e),
            )
        })
    }
}

#[async_trait]
impl ServiceProvider for FileProvider {
    async fn get_clusters(&self) -> Result<NodeInventory> {
        let inventory = self.read_inventory()?;
        debug!(
            path = %self.path.display(),
            nodes = inventory.nodes.len(),
            "read inventory file"
        );
        Ok(inventory.nodes)
    }
}
