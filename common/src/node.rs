use std::fmt;
use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::attr::{AttributeContainer, Attributes};
use crate::geo::WorldCoordinate;

/// Stable identifier for a catalog node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Level table for one hierarchy. Each kind names the only kind allowed
/// directly above it; the root kind has none and the leaf kind has no child.
pub trait NodeKind:
    Copy + Eq + Hash + fmt::Debug + fmt::Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// All kinds, root first.
    const LEVELS: &'static [Self];

    fn parent_kind(&self) -> Option<Self>;

    /// Whether nodes of this kind carry a draft/publish version history.
    fn is_versioned(&self) -> bool {
        false
    }

    fn root() -> Self {
        Self::LEVELS[0]
    }

    fn child_kind(&self) -> Option<Self> {
        Self::LEVELS
            .iter()
            .copied()
            .find(|kind| kind.parent_kind() == Some(*self))
    }

    fn is_root(&self) -> bool {
        self.parent_kind().is_none()
    }

    fn is_leaf(&self) -> bool {
        self.child_kind().is_none()
    }
}

/// Data Layers hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Category,
    Layer,
    Object,
    Field,
}

impl NodeKind for LayerKind {
    const LEVELS: &'static [Self] = &[
        LayerKind::Category,
        LayerKind::Layer,
        LayerKind::Object,
        LayerKind::Field,
    ];

    fn parent_kind(&self) -> Option<Self> {
        match self {
            LayerKind::Category => None,
            LayerKind::Layer => Some(LayerKind::Category),
            LayerKind::Object => Some(LayerKind::Layer),
            LayerKind::Field => Some(LayerKind::Object),
        }
    }

    fn is_versioned(&self) -> bool {
        matches!(self, LayerKind::Layer)
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LayerKind::Category => "category",
            LayerKind::Layer => "layer",
            LayerKind::Object => "object",
            LayerKind::Field => "field",
        };
        f.write_str(name)
    }
}

/// Organizational Roster hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RosterKind {
    District,
    Sector,
    Unit,
    Asset,
}

impl NodeKind for RosterKind {
    const LEVELS: &'static [Self] = &[
        RosterKind::District,
        RosterKind::Sector,
        RosterKind::Unit,
        RosterKind::Asset,
    ];

    fn parent_kind(&self) -> Option<Self> {
        match self {
            RosterKind::District => None,
            RosterKind::Sector => Some(RosterKind::District),
            RosterKind::Unit => Some(RosterKind::Sector),
            RosterKind::Asset => Some(RosterKind::Unit),
        }
    }
}

impl fmt::Display for RosterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RosterKind::District => "district",
            RosterKind::Sector => "sector",
            RosterKind::Unit => "unit",
            RosterKind::Asset => "asset",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node<K> {
    id: NodeId,
    kind: K,
    label: String,
    parent_id: Option<NodeId>,
    attributes: Attributes,
    coordinate: Option<WorldCoordinate>,
    children: Vec<NodeId>,
}

impl<K: NodeKind> Node<K> {
    pub fn new(
        id: NodeId,
        kind: K,
        label: impl Into<String>,
        parent_id: Option<NodeId>,
        attributes: Attributes,
    ) -> Self {
        Self {
            id,
            kind,
            label: label.into(),
            parent_id,
            attributes,
            coordinate: None,
            children: Vec::new(),
        }
    }

    pub fn with_coordinate(mut self, coordinate: WorldCoordinate) -> Self {
        self.coordinate = Some(coordinate);
        self
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn kind(&self) -> K {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn parent_id(&self) -> Option<&NodeId> {
        self.parent_id.as_ref()
    }

    pub fn coordinate(&self) -> Option<WorldCoordinate> {
        self.coordinate
    }

    /// Child ids in display order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn set_coordinate(&mut self, coordinate: Option<WorldCoordinate>) {
        self.coordinate = coordinate;
    }

    pub fn set_parent(&mut self, parent_id: Option<NodeId>) {
        self.parent_id = parent_id;
    }

    pub fn push_child(&mut self, child: NodeId) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    pub fn remove_child(&mut self, child: &NodeId) {
        self.children.retain(|candidate| candidate != child);
    }
}

impl<K> AttributeContainer for Node<K> {
    fn attributes(&self) -> &Attributes {
        &self.attributes
    }
}
