//! TOML fixture files that populate a catalog at startup.
//!
//! Nodes are applied in file order, so a parent must appear before its
//! children. Any failure aborts the load and is reported with the node id.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use catalog_core::{CatalogError, CatalogService, Role, TargetKind, VersionId};
use common::{Attributes, NodeId, NodeKind, WorldCoordinate};
use serde::Deserialize;

use crate::error::{HostError, HostResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(bound = "K: NodeKind")]
pub struct SeedFile<K> {
    #[serde(default)]
    pub nodes: Vec<SeedNode<K>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(bound = "K: NodeKind")]
pub struct SeedNode<K> {
    pub id: String,
    pub kind: K,
    pub label: String,
    pub parent: Option<String>,
    /// Dimension name to value; names are checked against the facet set.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub coordinate: Option<WorldCoordinate>,
    /// Currently published version number of a versioned node.
    pub version: Option<u32>,
    #[serde(default)]
    pub permissions: Vec<SeedGrant>,
}

/// Grant applied to the published version of a seeded layer.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedGrant {
    pub role: Role,
    pub target_kind: TargetKind,
    pub target: String,
}

impl<K: NodeKind> SeedFile<K> {
    pub fn load<P: AsRef<Path>>(path: P) -> HostResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|err| HostError::Seed {
            origin: path.display().to_string(),
            message: err.to_string(),
        })
    }

    /// Inserts every node into `service`. Returns the number applied.
    pub fn apply(&self, service: &CatalogService<K>) -> HostResult<usize> {
        for node in &self.nodes {
            node.apply(service)?;
        }
        log::info!("seeded {} node(s)", self.nodes.len());
        Ok(self.nodes.len())
    }
}

impl<K: NodeKind> SeedNode<K> {
    fn apply(&self, service: &CatalogService<K>) -> HostResult<()> {
        let id = NodeId::new(self.id.as_str());
        let parent = self.parent.as_deref().map(NodeId::from);
        let attributes = Attributes::try_from_pairs(&self.attributes)
            .map_err(CatalogError::from)?;

        match self.version {
            Some(number) => {
                let version = VersionId::new(number).ok_or_else(|| HostError::Seed {
                    origin: format!("node {}", self.id),
                    message: "version numbers start at 1".into(),
                })?;
                service.insert_versioned_node(
                    id.clone(),
                    self.kind,
                    &self.label,
                    parent.as_ref(),
                    attributes,
                    version,
                )?;
            }
            None => {
                service.insert_node_with_id(
                    id.clone(),
                    self.kind,
                    &self.label,
                    parent.as_ref(),
                    attributes,
                )?;
            }
        }

        if let Some(coordinate) = self.coordinate {
            service.set_coordinate(&id, Some(coordinate))?;
        }

        if !self.permissions.is_empty() {
            let published = service.get_layer_detail(&id)?.published.version;
            for grant in &self.permissions {
                service.assign_permission(
                    &id,
                    published,
                    grant.role,
                    grant.target_kind,
                    &grant.target,
                )?;
            }
        }

        log::debug!("seeded {} {}", self.kind, self.id);
        Ok(())
    }
}
