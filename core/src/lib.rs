pub mod error;
pub mod filter;
pub mod geo;
pub mod service;
pub mod tree;
pub mod workflow;

pub use error::{
    CatalogError, CatalogResult, FilterError, GeometryError, StructuralError, WorkflowError,
};
pub use filter::{FacetFilter, FacetFilterState, matches_all_active_facets};
pub use geo::{GeoProjector, MapView, ProjectionSettings};
pub use service::{
    CatalogService, CatalogSnapshot, CatalogSnapshotSink, EpochSnapshot, LayerDetail,
    MapPlacement, ObjectDetail,
};
pub use tree::CatalogTree;
pub use workflow::{
    DraftWorkflow, LayerVersion, PermissionSet, Role, RoleFlags, TargetKind, VersionId,
    VersionStatus,
};

pub use common::node::{LayerKind, Node, NodeId, NodeKind, RosterKind};
