use common::{NodeId, UnknownFacetDimension};
use thiserror::Error;

use crate::workflow::VersionId;

/// Tree-shape violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("a {child} cannot be placed under {parent}")]
    InvalidParentKind { parent: String, child: String },
    #[error("parent node {0} not found")]
    ParentNotFound(NodeId),
    #[error("node {0} not found")]
    NodeNotFound(NodeId),
    #[error("node {0} has children; removal requires cascade")]
    NodeHasChildren(NodeId),
    #[error("node id {0} already exists")]
    DuplicateNodeId(NodeId),
}

/// Illegal draft/publish transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("layer {0} already has a draft in progress")]
    DraftAlreadyInProgress(NodeId),
    #[error("layer {0} has no draft in progress")]
    NoDraftInProgress(NodeId),
    #[error("layer {0} has no version awaiting review")]
    NotInReview(NodeId),
    #[error("node {0} does not carry a version history")]
    LayerNotVersioned(NodeId),
    #[error("layer {layer} has no version {version}")]
    VersionNotFound { layer: NodeId, version: VersionId },
    #[error("version {version} of layer {layer} is historical and cannot be edited")]
    VersionNotEditable { layer: NodeId, version: VersionId },
}

/// Malformed spatial input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("invalid coordinate '{0}': expected \"lon,lat\"")]
    InvalidCoordinateFormat(String),
    #[error("map scale must be a positive number, got {0}")]
    InvalidScale(f64),
    #[error("viewport dimensions must be positive, got {width}x{height}")]
    InvalidViewport { width: f64, height: f64 },
    #[error("node {0} has no coordinate and no placed ancestor")]
    Unplaceable(NodeId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error(transparent)]
    UnknownFacetDimension(#[from] UnknownFacetDimension),
}

impl FilterError {
    pub fn dimension_name(&self) -> &str {
        match self {
            FilterError::UnknownFacetDimension(UnknownFacetDimension(name)) => name,
        }
    }
}

/// Errors surfaced by the catalog engine.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Structural(#[from] StructuralError),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error("lock poisoned during {0}")]
    LockPoisoned(&'static str),
    #[error("catalog persistence failed: {0}")]
    Persistence(String),
}

impl From<UnknownFacetDimension> for CatalogError {
    fn from(err: UnknownFacetDimension) -> Self {
        CatalogError::Filter(FilterError::from(err))
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;

pub(crate) fn invalid_parent_kind(parent: impl ToString, child: impl ToString) -> StructuralError {
    StructuralError::InvalidParentKind {
        parent: parent.to_string(),
        child: child.to_string(),
    }
}
