//! Facet selection state and visibility propagation.
//!
//! Only leaf or near-leaf nodes carry facet attributes. A node is visible
//! when it, or at least one of its descendants, satisfies every active facet
//! dimension at once. An empty selection places no restriction on its
//! dimension: that is how "All Regions" is expressed.

use std::collections::{BTreeSet, HashSet};

use common::{AttributeContainer, FacetDimension, Node, NodeId, NodeKind};
use serde::{Deserialize, Serialize};

use crate::error::FilterError;
use crate::tree::{CatalogTree, TreeResult};

/// Session-scoped facet selections, created empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetFilterState {
    region: BTreeSet<String>,
    incident: BTreeSet<String>,
}

impl FacetFilterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selection(&self, dimension: FacetDimension) -> &BTreeSet<String> {
        match dimension {
            FacetDimension::Region => &self.region,
            FacetDimension::Incident => &self.incident,
        }
    }

    fn selection_mut(&mut self, dimension: FacetDimension) -> &mut BTreeSet<String> {
        match dimension {
            FacetDimension::Region => &mut self.region,
            FacetDimension::Incident => &mut self.incident,
        }
    }

    /// Replaces the whole selection for `dimension`.
    pub fn set_facet_selection<I, V>(&mut self, dimension: FacetDimension, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let replacement: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        *self.selection_mut(dimension) = replacement;
    }

    /// Adds `value` if absent, removes it if present. Returns whether the
    /// value is selected afterwards.
    pub fn toggle_facet_value(&mut self, dimension: FacetDimension, value: &str) -> bool {
        let selection = self.selection_mut(dimension);
        if selection.remove(value) {
            false
        } else {
            selection.insert(value.to_string());
            true
        }
    }

    pub fn clear_selection(&mut self, dimension: FacetDimension) {
        self.selection_mut(dimension).clear();
    }

    /// Selects every value currently known to `tree` for `dimension`.
    pub fn select_all<K: NodeKind>(&mut self, dimension: FacetDimension, tree: &CatalogTree<K>) {
        *self.selection_mut(dimension) = tree.known_values(dimension);
    }

    /// Drives the tri-state "Select All" checkbox: every value known to the
    /// tree is selected. Stale extras do not count towards coverage, and a
    /// dimension with no known values is never fully selected.
    pub fn is_everything_selected<K: NodeKind>(
        &self,
        dimension: FacetDimension,
        tree: &CatalogTree<K>,
    ) -> bool {
        let known = tree.known_values(dimension);
        !known.is_empty() && known.is_subset(self.selection(dimension))
    }

    pub fn set_facet_selection_by_name<I, V>(
        &mut self,
        dimension: &str,
        values: I,
    ) -> Result<(), FilterError>
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let dimension = dimension.parse::<FacetDimension>()?;
        self.set_facet_selection(dimension, values);
        Ok(())
    }

    pub fn toggle_facet_value_by_name(
        &mut self,
        dimension: &str,
        value: &str,
    ) -> Result<bool, FilterError> {
        let dimension = dimension.parse::<FacetDimension>()?;
        Ok(self.toggle_facet_value(dimension, value))
    }

    pub fn is_unrestricted(&self) -> bool {
        self.region.is_empty() && self.incident.is_empty()
    }
}

/// Whether `node` satisfies every active dimension of `state`.
pub fn matches_all_active_facets<N: AttributeContainer>(node: &N, state: &FacetFilterState) -> bool {
    FacetDimension::ALL.iter().all(|dimension| {
        let selection = state.selection(*dimension);
        selection.is_empty()
            || node
                .attribute(*dimension)
                .is_some_and(|value| selection.contains(value))
    })
}

/// Read-only visibility view over a tree for one filter state.
pub struct FacetFilter<'a, K> {
    tree: &'a CatalogTree<K>,
    state: &'a FacetFilterState,
}

impl<'a, K: NodeKind> FacetFilter<'a, K> {
    pub fn new(tree: &'a CatalogTree<K>, state: &'a FacetFilterState) -> Self {
        Self { tree, state }
    }

    pub fn is_visible(&self, id: &NodeId) -> TreeResult<bool> {
        Ok(self
            .tree
            .subtree(id)?
            .into_iter()
            .any(|node| matches_all_active_facets(node, self.state)))
    }

    pub fn visible_roots(&self) -> Vec<&'a Node<K>> {
        let visible = self.visible_ids();
        self.tree
            .roots()
            .into_iter()
            .filter(|node| visible.contains(node.id()))
            .collect()
    }

    pub fn visible_children(&self, id: &NodeId) -> TreeResult<Vec<&'a Node<K>>> {
        let children = self.tree.get_children(id)?;
        let mut visible = Vec::with_capacity(children.len());
        for child in children {
            if self.is_visible(child.id())? {
                visible.push(child);
            }
        }
        Ok(visible)
    }

    /// Every visible node id, computed in one pass by pushing matches up
    /// through their ancestors.
    pub fn visible_ids(&self) -> HashSet<NodeId> {
        let mut visible = HashSet::new();
        for node in self.tree.iter() {
            if !matches_all_active_facets(node, self.state) || visible.contains(node.id()) {
                continue;
            }
            visible.insert(node.id().clone());
            let mut cursor = node.parent_id();
            while let Some(parent_id) = cursor {
                if !visible.insert(parent_id.clone()) {
                    break;
                }
                cursor = self.tree.get_node(parent_id).and_then(|parent| parent.parent_id());
            }
        }
        visible
    }
}
