//! Draft/publish versioning for layer nodes.
//!
//! Each registered layer always has exactly one `Published` version. At most
//! one further version may be open as `Draft` or `InReview`. Every operation
//! validates before it mutates, so a failed call leaves the history as it was.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::SystemTime;

use common::NodeId;
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;

pub mod permissions;

pub use permissions::{PermissionSet, Role, RoleFlags, RoleGrants, TargetKind};

pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Per-layer version number, rendered as `v1`, `v2`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(NonZeroU32);

impl VersionId {
    pub const FIRST: VersionId = VersionId(NonZeroU32::MIN);

    pub fn new(number: u32) -> Option<Self> {
        NonZeroU32::new(number).map(Self)
    }

    pub fn number(&self) -> u32 {
        self.0.get()
    }

    fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseVersionIdError(String);

impl fmt::Display for ParseVersionIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid version id '{}'", self.0)
    }
}

impl std::error::Error for ParseVersionIdError {}

impl FromStr for VersionId {
    type Err = ParseVersionIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().strip_prefix('v').unwrap_or(s.trim());
        digits
            .parse::<u32>()
            .ok()
            .and_then(VersionId::new)
            .ok_or_else(|| ParseVersionIdError(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    Published,
    Draft,
    InReview,
    /// A formerly published version replaced by a later approval.
    Superseded,
}

impl VersionStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, VersionStatus::Draft | VersionStatus::InReview)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerVersion {
    pub version: VersionId,
    pub status: VersionStatus,
    pub created_at: SystemTime,
    pub last_updated_at: SystemTime,
    pub description: Option<String>,
    pub permissions: PermissionSet,
}

impl LayerVersion {
    fn published(version: VersionId) -> Self {
        let now = SystemTime::now();
        Self {
            version,
            status: VersionStatus::Published,
            created_at: now,
            last_updated_at: now,
            description: None,
            permissions: PermissionSet::new(),
        }
    }

    /// A working copy that takes the content of `self` but none of its identity.
    fn draft_from(&self, version: VersionId) -> Self {
        let now = SystemTime::now();
        Self {
            version,
            status: VersionStatus::Draft,
            created_at: now,
            last_updated_at: now,
            description: self.description.clone(),
            permissions: self.permissions.clone(),
        }
    }

    fn touch(&mut self) {
        self.last_updated_at = SystemTime::now();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerHistory {
    versions: Vec<LayerVersion>,
    /// Highest number ever issued, including discarded drafts.
    high_water: VersionId,
}

impl LayerHistory {
    fn starting_at(version: VersionId) -> Self {
        Self {
            versions: vec![LayerVersion::published(version)],
            high_water: version,
        }
    }

    pub fn versions(&self) -> &[LayerVersion] {
        &self.versions
    }

    fn published_index(&self) -> Option<usize> {
        self.versions
            .iter()
            .position(|version| version.status == VersionStatus::Published)
    }

    fn open_index(&self) -> Option<usize> {
        self.versions.iter().position(|version| version.status.is_open())
    }

    fn index_of(&self, version: VersionId) -> Option<usize> {
        self.versions
            .iter()
            .position(|candidate| candidate.version == version)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DraftWorkflow {
    layers: HashMap<NodeId, LayerHistory>,
}

impl DraftWorkflow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking a layer at `v1`. Returns the active published version;
    /// already-registered layers are left untouched.
    pub fn register_layer(&mut self, layer_id: NodeId) -> VersionId {
        self.register_layer_at(layer_id, VersionId::FIRST)
    }

    /// Starts tracking a layer whose current published version is `version`.
    pub fn register_layer_at(&mut self, layer_id: NodeId, version: VersionId) -> VersionId {
        let history = self
            .layers
            .entry(layer_id)
            .or_insert_with(|| LayerHistory::starting_at(version));
        history
            .published_index()
            .map(|index| history.versions[index].version)
            .unwrap_or(version)
    }

    pub fn unregister_layer(&mut self, layer_id: &NodeId) -> Option<LayerHistory> {
        self.layers.remove(layer_id)
    }

    pub fn is_registered(&self, layer_id: &NodeId) -> bool {
        self.layers.contains_key(layer_id)
    }

    pub fn begin_draft(&mut self, layer_id: &NodeId) -> WorkflowResult<VersionId> {
        let history = self.history_mut(layer_id)?;
        if history.open_index().is_some() {
            return Err(WorkflowError::DraftAlreadyInProgress(layer_id.clone()));
        }
        let published = published_of(history, layer_id)?;

        let version = history.high_water.next();
        let draft = history.versions[published].draft_from(version);
        history.versions.push(draft);
        history.high_water = version;

        log::info!("layer {layer_id}: draft {version} opened");
        Ok(version)
    }

    pub fn submit_for_review(&mut self, layer_id: &NodeId) -> WorkflowResult<VersionId> {
        let history = self.history_mut(layer_id)?;
        let draft = history
            .open_index()
            .filter(|index| history.versions[*index].status == VersionStatus::Draft)
            .ok_or_else(|| WorkflowError::NoDraftInProgress(layer_id.clone()))?;

        let version = &mut history.versions[draft];
        version.status = VersionStatus::InReview;
        version.touch();

        log::info!("layer {layer_id}: {} submitted for review", version.version);
        Ok(version.version)
    }

    /// Publishes the version under review; the previous published version
    /// stays in the history as `Superseded`.
    pub fn approve(&mut self, layer_id: &NodeId) -> WorkflowResult<VersionId> {
        let history = self.history_mut(layer_id)?;
        let review = history
            .open_index()
            .filter(|index| history.versions[*index].status == VersionStatus::InReview)
            .ok_or_else(|| WorkflowError::NotInReview(layer_id.clone()))?;
        let published = published_of(history, layer_id)?;

        let now = SystemTime::now();
        let previous = &mut history.versions[published];
        previous.status = VersionStatus::Superseded;
        previous.last_updated_at = now;
        let approved = &mut history.versions[review];
        approved.status = VersionStatus::Published;
        approved.last_updated_at = now;

        log::info!("layer {layer_id}: {} published", approved.version);
        Ok(approved.version)
    }

    /// Discards the open draft or review without leaving a trace.
    pub fn cancel_draft(&mut self, layer_id: &NodeId) -> WorkflowResult<VersionId> {
        let history = self.history_mut(layer_id)?;
        let open = history
            .open_index()
            .ok_or_else(|| WorkflowError::NoDraftInProgress(layer_id.clone()))?;

        let discarded = history.versions.remove(open);
        log::info!("layer {layer_id}: draft {} discarded", discarded.version);
        Ok(discarded.version)
    }

    pub fn update_draft_description(
        &mut self,
        layer_id: &NodeId,
        description: Option<String>,
    ) -> WorkflowResult<()> {
        let history = self.history_mut(layer_id)?;
        let draft = history
            .open_index()
            .filter(|index| history.versions[*index].status == VersionStatus::Draft)
            .ok_or_else(|| WorkflowError::NoDraftInProgress(layer_id.clone()))?;

        let version = &mut history.versions[draft];
        version.description = description;
        version.touch();
        Ok(())
    }

    /// Adds `target_id` to a role bucket of `version`. Returns false when it
    /// was already present.
    pub fn assign_permission(
        &mut self,
        layer_id: &NodeId,
        version: VersionId,
        role: Role,
        target_kind: TargetKind,
        target_id: &str,
    ) -> WorkflowResult<bool> {
        let entry = self.editable_version_mut(layer_id, version)?;
        let changed = entry.permissions.grant(role, target_kind, target_id);
        if changed {
            entry.touch();
            log::debug!("layer {layer_id} {version}: granted {role:?} to {target_kind:?} {target_id}");
        }
        Ok(changed)
    }

    pub fn revoke_permission(
        &mut self,
        layer_id: &NodeId,
        version: VersionId,
        role: Role,
        target_kind: TargetKind,
        target_id: &str,
    ) -> WorkflowResult<bool> {
        let entry = self.editable_version_mut(layer_id, version)?;
        let changed = entry.permissions.revoke(role, target_kind, target_id);
        if changed {
            entry.touch();
            log::debug!("layer {layer_id} {version}: revoked {role:?} from {target_kind:?} {target_id}");
        }
        Ok(changed)
    }

    pub fn published_version(&self, layer_id: &NodeId) -> WorkflowResult<&LayerVersion> {
        let history = self.history(layer_id)?;
        let index = published_of(history, layer_id)?;
        Ok(&history.versions[index])
    }

    pub fn open_draft(&self, layer_id: &NodeId) -> WorkflowResult<Option<&LayerVersion>> {
        let history = self.history(layer_id)?;
        Ok(history.open_index().map(|index| &history.versions[index]))
    }

    /// All retained versions, oldest first.
    pub fn versions(&self, layer_id: &NodeId) -> WorkflowResult<&[LayerVersion]> {
        Ok(self.history(layer_id)?.versions())
    }

    pub fn version(&self, layer_id: &NodeId, version: VersionId) -> WorkflowResult<&LayerVersion> {
        let history = self.history(layer_id)?;
        history
            .index_of(version)
            .map(|index| &history.versions[index])
            .ok_or_else(|| WorkflowError::VersionNotFound {
                layer: layer_id.clone(),
                version,
            })
    }

    pub fn roles_for(
        &self,
        layer_id: &NodeId,
        version: VersionId,
        target_kind: TargetKind,
        target_id: &str,
    ) -> WorkflowResult<RoleFlags> {
        Ok(self
            .version(layer_id, version)?
            .permissions
            .roles_for(target_kind, target_id))
    }

    fn history(&self, layer_id: &NodeId) -> WorkflowResult<&LayerHistory> {
        self.layers
            .get(layer_id)
            .ok_or_else(|| WorkflowError::LayerNotVersioned(layer_id.clone()))
    }

    fn history_mut(&mut self, layer_id: &NodeId) -> WorkflowResult<&mut LayerHistory> {
        self.layers
            .get_mut(layer_id)
            .ok_or_else(|| WorkflowError::LayerNotVersioned(layer_id.clone()))
    }

    fn editable_version_mut(
        &mut self,
        layer_id: &NodeId,
        version: VersionId,
    ) -> WorkflowResult<&mut LayerVersion> {
        let history = self.history_mut(layer_id)?;
        let index = history
            .index_of(version)
            .ok_or_else(|| WorkflowError::VersionNotFound {
                layer: layer_id.clone(),
                version,
            })?;
        let entry = &mut history.versions[index];
        if entry.status == VersionStatus::Superseded {
            return Err(WorkflowError::VersionNotEditable {
                layer: layer_id.clone(),
                version,
            });
        }
        Ok(entry)
    }
}

fn published_of(history: &LayerHistory, layer_id: &NodeId) -> WorkflowResult<usize> {
    // registration always creates a published version and approval swaps one
    // for another, so a missing one means the layer was never registered
    history
        .published_index()
        .ok_or_else(|| WorkflowError::LayerNotVersioned(layer_id.clone()))
}
