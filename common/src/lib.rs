pub mod attr;
pub mod geo;
pub mod node;

pub use attr::{AttributeContainer, Attributes, FacetDimension, UnknownFacetDimension};
pub use geo::{ScreenPercent, ScreenPoint, Viewport, WorldCoordinate};
pub use node::{LayerKind, Node, NodeId, NodeKind, RosterKind};
