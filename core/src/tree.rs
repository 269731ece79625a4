use std::collections::{BTreeSet, HashMap};

use common::{AttributeContainer, Attributes, FacetDimension, Node, NodeId, NodeKind, WorldCoordinate};
use serde::{Deserialize, Serialize};

use crate::error::{StructuralError, invalid_parent_kind};

pub type TreeResult<T> = Result<T, StructuralError>;

/// Generic N-level hierarchy. Legal parent/child pairs come from the kind
/// table of `K`; the tree itself knows nothing about which hierarchy it holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "K: NodeKind")]
pub struct CatalogTree<K> {
    nodes: HashMap<NodeId, Node<K>>,
    roots: Vec<NodeId>,
}

impl<K> Default for CatalogTree<K> {
    fn default() -> Self {
        Self {
            nodes: HashMap::new(),
            roots: Vec::new(),
        }
    }
}

impl<K: NodeKind> CatalogTree<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node under `parent_id` with a freshly generated identifier.
    pub fn add_node(
        &mut self,
        kind: K,
        label: impl Into<String>,
        parent_id: Option<&NodeId>,
        attributes: Attributes,
    ) -> TreeResult<NodeId> {
        self.insert_node_with_id(NodeId::generate(), kind, label, parent_id, attributes)
    }

    /// Adds a node with a caller-chosen identifier.
    pub fn insert_node_with_id(
        &mut self,
        id: NodeId,
        kind: K,
        label: impl Into<String>,
        parent_id: Option<&NodeId>,
        attributes: Attributes,
    ) -> TreeResult<NodeId> {
        if self.nodes.contains_key(&id) {
            return Err(StructuralError::DuplicateNodeId(id));
        }
        self.check_placement(kind, parent_id)?;

        let node = Node::new(id.clone(), kind, label, parent_id.cloned(), attributes);
        self.nodes.insert(id.clone(), node);
        self.attach(&id, parent_id);
        Ok(id)
    }

    pub fn set_coordinate(
        &mut self,
        id: &NodeId,
        coordinate: Option<WorldCoordinate>,
    ) -> TreeResult<()> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| StructuralError::NodeNotFound(id.clone()))?;
        node.set_coordinate(coordinate);
        Ok(())
    }

    /// Removes a node, and with `cascade` its whole subtree. Returns the
    /// removed nodes in pre-order.
    pub fn remove_node(&mut self, id: &NodeId, cascade: bool) -> TreeResult<Vec<Node<K>>> {
        let node = self.node(id)?;
        if !cascade && !node.children().is_empty() {
            return Err(StructuralError::NodeHasChildren(id.clone()));
        }
        let parent_id = node.parent_id().cloned();
        let subtree: Vec<NodeId> = self.walk(id).map(|node| node.id().clone()).collect();

        self.detach(id, parent_id.as_ref());
        Ok(subtree
            .iter()
            .filter_map(|member| self.nodes.remove(member))
            .collect())
    }

    /// Re-parents a node, applying the same kind rules as insertion.
    pub fn move_node(&mut self, id: &NodeId, new_parent_id: &NodeId) -> TreeResult<()> {
        let node = self.node(id)?;
        let kind = node.kind();
        let old_parent = node.parent_id().cloned();
        self.check_placement(kind, Some(new_parent_id))?;

        if old_parent.as_ref() == Some(new_parent_id) {
            return Ok(());
        }

        self.detach(id, old_parent.as_ref());
        if let Some(node) = self.nodes.get_mut(id) {
            node.set_parent(Some(new_parent_id.clone()));
        }
        self.attach(id, Some(new_parent_id));
        Ok(())
    }

    pub fn get_node(&self, id: &NodeId) -> Option<&Node<K>> {
        self.nodes.get(id)
    }

    pub fn node(&self, id: &NodeId) -> TreeResult<&Node<K>> {
        self.nodes
            .get(id)
            .ok_or_else(|| StructuralError::NodeNotFound(id.clone()))
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Root nodes in insertion order.
    pub fn roots(&self) -> Vec<&Node<K>> {
        self.roots
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .collect()
    }

    pub fn get_children(&self, id: &NodeId) -> TreeResult<Vec<&Node<K>>> {
        let node = self.node(id)?;
        Ok(node
            .children()
            .iter()
            .filter_map(|child| self.nodes.get(child))
            .collect())
    }

    /// Ancestors ordered from the direct parent up to the root.
    pub fn get_ancestors(&self, id: &NodeId) -> TreeResult<Vec<&Node<K>>> {
        let mut ancestors = Vec::new();
        let mut cursor = self.node(id)?.parent_id();
        while let Some(parent_id) = cursor {
            let Some(parent) = self.nodes.get(parent_id) else {
                break;
            };
            ancestors.push(parent);
            cursor = parent.parent_id();
        }
        Ok(ancestors)
    }

    /// Strict descendants of `kind`, in display order.
    pub fn get_descendants_of_kind(&self, id: &NodeId, kind: K) -> TreeResult<Vec<&Node<K>>> {
        self.node(id)?;
        Ok(self
            .walk(id)
            .skip(1)
            .filter(|node| node.kind() == kind)
            .collect())
    }

    /// The node and every descendant, pre-order.
    pub fn subtree(&self, id: &NodeId) -> TreeResult<Vec<&Node<K>>> {
        self.node(id)?;
        Ok(self.walk(id).collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node<K>> {
        self.nodes.values()
    }

    /// Distinct values present for `dimension` anywhere in the tree.
    pub fn known_values(&self, dimension: FacetDimension) -> BTreeSet<String> {
        self.nodes
            .values()
            .filter_map(|node| node.attribute(dimension))
            .map(str::to_string)
            .collect()
    }

    fn check_placement(&self, kind: K, parent_id: Option<&NodeId>) -> TreeResult<()> {
        match parent_id {
            None if kind.is_root() => Ok(()),
            None => Err(invalid_parent_kind("root", kind)),
            Some(parent_id) => {
                let parent = self
                    .nodes
                    .get(parent_id)
                    .ok_or_else(|| StructuralError::ParentNotFound(parent_id.clone()))?;
                if kind.parent_kind() == Some(parent.kind()) {
                    Ok(())
                } else {
                    Err(invalid_parent_kind(parent.kind(), kind))
                }
            }
        }
    }

    fn attach(&mut self, id: &NodeId, parent_id: Option<&NodeId>) {
        match parent_id.and_then(|parent_id| self.nodes.get_mut(parent_id)) {
            Some(parent) => parent.push_child(id.clone()),
            None => {
                if !self.roots.contains(id) {
                    self.roots.push(id.clone());
                }
            }
        }
    }

    fn detach(&mut self, id: &NodeId, parent_id: Option<&NodeId>) {
        match parent_id.and_then(|parent_id| self.nodes.get_mut(parent_id)) {
            Some(parent) => parent.remove_child(id),
            None => self.roots.retain(|candidate| candidate != id),
        }
    }

    fn walk<'a>(&'a self, id: &NodeId) -> Walk<'a, K> {
        Walk {
            tree: self,
            stack: vec![id.clone()],
        }
    }
}

/// Depth-first, pre-order traversal honouring child display order.
struct Walk<'a, K> {
    tree: &'a CatalogTree<K>,
    stack: Vec<NodeId>,
}

impl<'a, K: NodeKind> Iterator for Walk<'a, K> {
    type Item = &'a Node<K>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.stack.pop() {
            if let Some(node) = self.tree.nodes.get(&id) {
                self.stack.extend(node.children().iter().rev().cloned());
                return Some(node);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{LayerKind, RosterKind};

    fn id(raw: &str) -> NodeId {
        NodeId::from(raw)
    }

    fn layer_tree() -> CatalogTree<LayerKind> {
        let mut tree = CatalogTree::new();
        tree.insert_node_with_id(id("weather"), LayerKind::Category, "Weather", None, Attributes::new())
            .expect("weather");
        tree.insert_node_with_id(
            id("radar-precip"),
            LayerKind::Layer,
            "Radar Precipitation",
            Some(&id("weather")),
            Attributes::new().with(FacetDimension::Region, "gulf-coast"),
        )
        .expect("radar");
        tree.insert_node_with_id(
            id("warnings"),
            LayerKind::Layer,
            "Active Weather Warnings",
            Some(&id("weather")),
            Attributes::new().with(FacetDimension::Region, "mid-atlantic"),
        )
        .expect("warnings");
        tree.insert_node_with_id(
            id("storm-cells"),
            LayerKind::Object,
            "Storm Cells",
            Some(&id("radar-precip")),
            Attributes::new(),
        )
        .expect("storm cells");
        tree.insert_node_with_id(
            id("reflectivity"),
            LayerKind::Field,
            "Reflectivity (dBZ)",
            Some(&id("storm-cells")),
            Attributes::new(),
        )
        .expect("reflectivity");
        tree
    }

    #[test]
    fn add_node_generates_unique_ids() {
        let mut tree = CatalogTree::new();
        let a = tree
            .add_node(RosterKind::District, "North", None, Attributes::new())
            .expect("district");
        let b = tree
            .add_node(RosterKind::District, "North", None, Attributes::new())
            .expect("district");

        assert_ne!(a, b);
        assert_eq!(tree.roots().len(), 2);
    }

    #[test]
    fn object_under_category_is_rejected() {
        let mut tree = layer_tree();

        let err = tree
            .add_node(LayerKind::Object, "Orphan", Some(&id("weather")), Attributes::new())
            .expect_err("objects belong under layers");

        assert_eq!(
            err,
            StructuralError::InvalidParentKind {
                parent: "category".into(),
                child: "object".into(),
            }
        );
        assert_eq!(tree.len(), 5);
    }

    #[test]
    fn non_root_kind_requires_parent() {
        let mut tree: CatalogTree<LayerKind> = CatalogTree::new();

        let err = tree
            .add_node(LayerKind::Layer, "Floating", None, Attributes::new())
            .expect_err("layers need a category");

        assert!(matches!(err, StructuralError::InvalidParentKind { .. }));
        assert!(tree.is_empty());
    }

    #[test]
    fn leaf_kind_cannot_have_children() {
        let mut tree = layer_tree();

        let err = tree
            .add_node(LayerKind::Field, "Nested", Some(&id("reflectivity")), Attributes::new())
            .expect_err("fields are leaves");

        assert!(matches!(err, StructuralError::InvalidParentKind { .. }));
    }

    #[test]
    fn unknown_parent_is_reported() {
        let mut tree = layer_tree();

        let err = tree
            .add_node(LayerKind::Layer, "Lost", Some(&id("nowhere")), Attributes::new())
            .expect_err("parent missing");

        assert_eq!(err, StructuralError::ParentNotFound(id("nowhere")));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut tree = layer_tree();

        let err = tree
            .insert_node_with_id(id("weather"), LayerKind::Category, "Again", None, Attributes::new())
            .expect_err("duplicate id");

        assert_eq!(err, StructuralError::DuplicateNodeId(id("weather")));
    }

    #[test]
    fn children_follow_insertion_order() {
        let tree = layer_tree();

        let labels: Vec<_> = tree
            .get_children(&id("weather"))
            .expect("children")
            .into_iter()
            .map(|node| node.id().clone())
            .collect();

        assert_eq!(labels, vec![id("radar-precip"), id("warnings")]);
    }

    #[test]
    fn ancestors_run_from_parent_to_root() {
        let tree = layer_tree();

        let ancestors: Vec<_> = tree
            .get_ancestors(&id("reflectivity"))
            .expect("ancestors")
            .into_iter()
            .map(|node| node.id().clone())
            .collect();

        assert_eq!(ancestors, vec![id("storm-cells"), id("radar-precip"), id("weather")]);
    }

    #[test]
    fn descendants_of_kind_skip_other_levels() {
        let tree = layer_tree();

        let layers = tree
            .get_descendants_of_kind(&id("weather"), LayerKind::Layer)
            .expect("layers");
        let fields = tree
            .get_descendants_of_kind(&id("weather"), LayerKind::Field)
            .expect("fields");

        assert_eq!(layers.len(), 2);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].id(), &id("reflectivity"));
    }

    #[test]
    fn remove_without_cascade_refuses_parents() {
        let mut tree = layer_tree();

        let err = tree
            .remove_node(&id("radar-precip"), false)
            .expect_err("has children");

        assert_eq!(err, StructuralError::NodeHasChildren(id("radar-precip")));
        assert_eq!(tree.len(), 5);
    }

    #[test]
    fn cascade_removes_subtree_and_detaches() {
        let mut tree = layer_tree();

        let removed = tree.remove_node(&id("radar-precip"), true).expect("cascade");

        assert_eq!(removed.len(), 3);
        assert!(!tree.contains(&id("storm-cells")));
        assert!(!tree.contains(&id("reflectivity")));
        let remaining = tree.get_children(&id("weather")).expect("children");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id(), &id("warnings"));
    }

    #[test]
    fn removing_a_leaf_needs_no_cascade() {
        let mut tree = layer_tree();

        let removed = tree.remove_node(&id("reflectivity"), false).expect("leaf");

        assert_eq!(removed.len(), 1);
        assert!(tree.get_children(&id("storm-cells")).expect("children").is_empty());
    }

    #[test]
    fn removing_a_root_updates_roots() {
        let mut tree = layer_tree();

        tree.remove_node(&id("weather"), true).expect("cascade");

        assert!(tree.roots().is_empty());
        assert!(tree.is_empty());
    }

    #[test]
    fn move_layer_to_other_category() {
        let mut tree = layer_tree();
        tree.insert_node_with_id(id("resources"), LayerKind::Category, "Resources", None, Attributes::new())
            .expect("resources");

        tree.move_node(&id("warnings"), &id("resources")).expect("move");

        let node = tree.node(&id("warnings")).expect("warnings");
        assert_eq!(node.parent_id(), Some(&id("resources")));
        assert_eq!(tree.get_children(&id("weather")).expect("children").len(), 1);
        assert_eq!(tree.get_children(&id("resources")).expect("children").len(), 1);
    }

    #[test]
    fn move_revalidates_kind() {
        let mut tree = layer_tree();

        let err = tree
            .move_node(&id("storm-cells"), &id("weather"))
            .expect_err("object under category");

        assert!(matches!(err, StructuralError::InvalidParentKind { .. }));
        let node = tree.node(&id("storm-cells")).expect("storm cells");
        assert_eq!(node.parent_id(), Some(&id("radar-precip")));
    }

    #[test]
    fn known_values_are_distinct() {
        let mut tree = layer_tree();
        tree.insert_node_with_id(
            id("gauges"),
            LayerKind::Layer,
            "River Gauges",
            Some(&id("weather")),
            Attributes::new().with(FacetDimension::Region, "gulf-coast"),
        )
        .expect("gauges");

        let regions = tree.known_values(FacetDimension::Region);

        assert_eq!(regions.len(), 2);
        assert!(regions.contains("gulf-coast"));
        assert!(regions.contains("mid-atlantic"));
        assert!(tree.known_values(FacetDimension::Incident).is_empty());
    }

    #[test]
    fn missing_nodes_are_reported() {
        let tree = layer_tree();

        assert_eq!(
            tree.get_children(&id("ghost")).map(|c| c.len()),
            Err(StructuralError::NodeNotFound(id("ghost")))
        );
        assert!(tree.get_ancestors(&id("ghost")).is_err());
    }
}
