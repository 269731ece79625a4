use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use common::{
    Attributes, FacetDimension, LayerKind, Node, NodeId, NodeKind, RosterKind, ScreenPercent,
    ScreenPoint, WorldCoordinate,
};
use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, CatalogResult, GeometryError, WorkflowError};
use crate::filter::{FacetFilter, FacetFilterState};
use crate::geo::{GeoProjector, MapView, ProjectionSettings};
use crate::tree::CatalogTree;
use crate::workflow::{DraftWorkflow, LayerVersion, Role, TargetKind, VersionId};

/// Hook for an external persistence collaborator. Called with the state a
/// mutation would produce; the mutation is discarded when `save` fails.
pub trait CatalogSnapshotSink<K: NodeKind>: Send + Sync {
    fn save(&self, snapshot: &CatalogSnapshot<K>) -> CatalogResult<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "K: NodeKind")]
struct CatalogState<K> {
    tree: CatalogTree<K>,
    workflow: DraftWorkflow,
}

impl<K> Default for CatalogState<K> {
    fn default() -> Self {
        Self {
            tree: CatalogTree::default(),
            workflow: DraftWorkflow::default(),
        }
    }
}

struct Epochs {
    global: AtomicU64,
    tree: AtomicU64,
    workflow: AtomicU64,
}

impl Default for Epochs {
    fn default() -> Self {
        Self {
            global: AtomicU64::new(1),
            tree: AtomicU64::new(1),
            workflow: AtomicU64::new(1),
        }
    }
}

impl Epochs {
    fn snapshot(&self) -> EpochSnapshot {
        EpochSnapshot {
            global: self.global.load(Ordering::SeqCst),
            tree: self.tree.load(Ordering::SeqCst),
            workflow: self.workflow.load(Ordering::SeqCst),
        }
    }

    /// Counters as they will read once a mutation touching `touched` commits.
    fn advanced(&self, touched: Touched) -> EpochSnapshot {
        let mut next = self.snapshot();
        next.global = next_epoch(next.global);
        if touched.tree() {
            next.tree = next_epoch(next.tree);
        }
        if touched.workflow() {
            next.workflow = next_epoch(next.workflow);
        }
        next
    }

    fn bump(&self, touched: Touched, label: &'static str) {
        if touched.tree() {
            bump_epoch(&self.tree, label);
        }
        if touched.workflow() {
            bump_epoch(&self.workflow, label);
        }
        bump_epoch(&self.global, label);
    }

    fn from_snapshot(snapshot: &EpochSnapshot) -> Self {
        Self {
            global: AtomicU64::new(snapshot.global.max(1)),
            tree: AtomicU64::new(snapshot.tree.max(1)),
            workflow: AtomicU64::new(snapshot.workflow.max(1)),
        }
    }
}

fn next_epoch(current: u64) -> u64 {
    current.wrapping_add(1).max(1)
}

fn bump_epoch(counter: &AtomicU64, label: &'static str) {
    let mut current = counter.load(Ordering::SeqCst);
    loop {
        let next = next_epoch(current);
        match counter.compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => break,
            Err(observed) => current = observed,
        }
    }
    log::trace!(
        "catalog epoch bump for {label}: now {}",
        counter.load(Ordering::SeqCst)
    );
}

#[derive(Debug, Clone, Copy)]
enum Touched {
    Tree,
    Workflow,
    Both,
}

impl Touched {
    fn tree(self) -> bool {
        matches!(self, Touched::Tree | Touched::Both)
    }

    fn workflow(self) -> bool {
        matches!(self, Touched::Workflow | Touched::Both)
    }
}

/// Everything a detail modal needs for one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "K: NodeKind")]
pub struct LayerDetail<K> {
    pub layer: Node<K>,
    pub published: LayerVersion,
    pub draft: Option<LayerVersion>,
    pub objects: Vec<ObjectDetail<K>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "K: NodeKind")]
pub struct ObjectDetail<K> {
    pub object: Node<K>,
    pub fields: Vec<Node<K>>,
}

/// Where a node's marker goes on the current map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapPlacement {
    pub node_id: NodeId,
    pub coordinate: WorldCoordinate,
    pub screen: ScreenPercent,
    /// True when the coordinate was derived from an ancestor.
    pub synthetic: bool,
}

/// Query and command surface over one catalog hierarchy.
pub struct CatalogService<K: NodeKind> {
    state: RwLock<CatalogState<K>>,
    epochs: Epochs,
    projector: GeoProjector,
    persistence: Option<Arc<dyn CatalogSnapshotSink<K>>>,
}

impl<K: NodeKind> Default for CatalogService<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: NodeKind> CatalogService<K> {
    pub fn new() -> Self {
        Self::with_settings(ProjectionSettings::default(), None)
    }

    pub fn with_settings(
        settings: ProjectionSettings,
        persistence: Option<Arc<dyn CatalogSnapshotSink<K>>>,
    ) -> Self {
        Self {
            state: RwLock::new(CatalogState::default()),
            epochs: Epochs::default(),
            projector: GeoProjector::new(settings),
            persistence,
        }
    }

    pub fn from_snapshot(
        snapshot: CatalogSnapshot<K>,
        settings: ProjectionSettings,
        persistence: Option<Arc<dyn CatalogSnapshotSink<K>>>,
    ) -> Self {
        let CatalogSnapshot {
            epochs,
            tree,
            workflow,
        } = snapshot;

        Self {
            state: RwLock::new(CatalogState { tree, workflow }),
            epochs: Epochs::from_snapshot(&epochs),
            projector: GeoProjector::new(settings),
            persistence,
        }
    }

    fn with_state_read<F, T>(&self, op: &'static str, func: F) -> CatalogResult<T>
    where
        F: FnOnce(&CatalogState<K>) -> CatalogResult<T>,
    {
        let guard = self
            .state
            .read()
            .map_err(|_| CatalogError::LockPoisoned(op))?;
        func(&guard)
    }

    /// Applies one mutation under the write lock. With a snapshot sink the
    /// change is staged on a copy and only installed once the sink accepts
    /// it; epochs move only on commit.
    fn mutate<F, T>(&self, op: &'static str, touched: Touched, func: F) -> CatalogResult<T>
    where
        F: FnOnce(&mut CatalogState<K>) -> CatalogResult<T>,
    {
        let mut guard = self
            .state
            .write()
            .map_err(|_| CatalogError::LockPoisoned(op))?;

        let value = match &self.persistence {
            Some(hook) => {
                let mut staged = (*guard).clone();
                let value = func(&mut staged)?;
                let snapshot = CatalogSnapshot {
                    epochs: self.epochs.advanced(touched),
                    tree: staged.tree,
                    workflow: staged.workflow,
                };
                hook.save(&snapshot).inspect_err(|err| {
                    log::warn!("catalog {op} discarded, snapshot rejected: {err}");
                })?;
                *guard = CatalogState {
                    tree: snapshot.tree,
                    workflow: snapshot.workflow,
                };
                value
            }
            None => func(&mut guard)?,
        };

        self.epochs.bump(touched, op);
        Ok(value)
    }

    pub fn projector(&self) -> &GeoProjector {
        &self.projector
    }

    // ---- tree commands ----

    pub fn add_node(
        &self,
        kind: K,
        label: &str,
        parent_id: Option<&NodeId>,
        attributes: Attributes,
    ) -> CatalogResult<NodeId> {
        self.insert(NodeId::generate(), kind, label, parent_id, attributes, None)
    }

    pub fn insert_node_with_id(
        &self,
        id: NodeId,
        kind: K,
        label: &str,
        parent_id: Option<&NodeId>,
        attributes: Attributes,
    ) -> CatalogResult<NodeId> {
        self.insert(id, kind, label, parent_id, attributes, None)
    }

    /// Inserts a versioned node whose published version is already `version`.
    pub fn insert_versioned_node(
        &self,
        id: NodeId,
        kind: K,
        label: &str,
        parent_id: Option<&NodeId>,
        attributes: Attributes,
        version: VersionId,
    ) -> CatalogResult<NodeId> {
        if !kind.is_versioned() {
            return Err(WorkflowError::LayerNotVersioned(id).into());
        }
        self.insert(id, kind, label, parent_id, attributes, Some(version))
    }

    fn insert(
        &self,
        id: NodeId,
        kind: K,
        label: &str,
        parent_id: Option<&NodeId>,
        attributes: Attributes,
        version: Option<VersionId>,
    ) -> CatalogResult<NodeId> {
        let touched = if kind.is_versioned() {
            Touched::Both
        } else {
            Touched::Tree
        };
        self.mutate("insert_node", touched, |state| {
            let id = state
                .tree
                .insert_node_with_id(id, kind, label, parent_id, attributes)?;
            if kind.is_versioned() {
                let version = version.unwrap_or(VersionId::FIRST);
                state.workflow.register_layer_at(id.clone(), version);
            }
            log::debug!("catalog: added {kind} {id}");
            Ok(id)
        })
    }

    /// Sets or clears the authoritative coordinate of a node.
    pub fn set_coordinate(
        &self,
        id: &NodeId,
        coordinate: Option<WorldCoordinate>,
    ) -> CatalogResult<()> {
        if let Some(coordinate) = coordinate {
            if !coordinate.is_valid() {
                return Err(GeometryError::InvalidCoordinateFormat(format!(
                    "{},{}",
                    coordinate.lon, coordinate.lat
                ))
                .into());
            }
        }
        self.mutate("set_coordinate", Touched::Tree, |state| {
            state.tree.set_coordinate(id, coordinate)?;
            Ok(())
        })
    }

    /// Removes a node (and its subtree when `cascade`), dropping the version
    /// history of any removed layer. Returns the removed ids, pre-order.
    pub fn remove_node(&self, id: &NodeId, cascade: bool) -> CatalogResult<Vec<NodeId>> {
        self.mutate("remove_node", Touched::Both, |state| {
            let removed = state.tree.remove_node(id, cascade)?;
            let ids: Vec<NodeId> = removed
                .into_iter()
                .map(|node| {
                    if node.kind().is_versioned() {
                        state.workflow.unregister_layer(node.id());
                    }
                    node.id().clone()
                })
                .collect();
            log::debug!("catalog: removed {} node(s) from {id}", ids.len());
            Ok(ids)
        })
    }

    pub fn move_node(&self, id: &NodeId, new_parent_id: &NodeId) -> CatalogResult<()> {
        self.mutate("move_node", Touched::Tree, |state| {
            state.tree.move_node(id, new_parent_id)?;
            log::debug!("catalog: moved {id} under {new_parent_id}");
            Ok(())
        })
    }

    // ---- tree queries ----

    pub fn get_node(&self, id: &NodeId) -> CatalogResult<Node<K>> {
        self.with_state_read("get_node", |state| Ok(state.tree.node(id)?.clone()))
    }

    pub fn get_children(&self, id: &NodeId) -> CatalogResult<Vec<Node<K>>> {
        self.with_state_read("get_children", |state| {
            Ok(cloned(state.tree.get_children(id)?))
        })
    }

    pub fn get_ancestors(&self, id: &NodeId) -> CatalogResult<Vec<Node<K>>> {
        self.with_state_read("get_ancestors", |state| {
            Ok(cloned(state.tree.get_ancestors(id)?))
        })
    }

    pub fn get_descendants_of_kind(&self, id: &NodeId, kind: K) -> CatalogResult<Vec<Node<K>>> {
        self.with_state_read("get_descendants_of_kind", |state| {
            Ok(cloned(state.tree.get_descendants_of_kind(id, kind)?))
        })
    }

    pub fn roots(&self) -> CatalogResult<Vec<Node<K>>> {
        self.with_state_read("roots", |state| Ok(cloned(state.tree.roots())))
    }

    // ---- filtering ----

    pub fn list_visible_roots(&self, filter: &FacetFilterState) -> CatalogResult<Vec<Node<K>>> {
        self.with_state_read("list_visible_roots", |state| {
            Ok(cloned(FacetFilter::new(&state.tree, filter).visible_roots()))
        })
    }

    pub fn list_visible_children(
        &self,
        parent_id: &NodeId,
        filter: &FacetFilterState,
    ) -> CatalogResult<Vec<Node<K>>> {
        self.with_state_read("list_visible_children", |state| {
            Ok(cloned(
                FacetFilter::new(&state.tree, filter).visible_children(parent_id)?,
            ))
        })
    }

    pub fn is_visible(&self, id: &NodeId, filter: &FacetFilterState) -> CatalogResult<bool> {
        self.with_state_read("is_visible", |state| {
            Ok(FacetFilter::new(&state.tree, filter).is_visible(id)?)
        })
    }

    pub fn known_values(&self, dimension: FacetDimension) -> CatalogResult<Vec<String>> {
        self.with_state_read("known_values", |state| {
            Ok(state.tree.known_values(dimension).into_iter().collect())
        })
    }

    pub fn select_all(
        &self,
        filter: &mut FacetFilterState,
        dimension: FacetDimension,
    ) -> CatalogResult<()> {
        self.with_state_read("select_all", |state| {
            filter.select_all(dimension, &state.tree);
            Ok(())
        })
    }

    pub fn is_everything_selected(
        &self,
        filter: &FacetFilterState,
        dimension: FacetDimension,
    ) -> CatalogResult<bool> {
        self.with_state_read("is_everything_selected", |state| {
            Ok(filter.is_everything_selected(dimension, &state.tree))
        })
    }

    // ---- workflow ----

    pub fn begin_draft(&self, layer_id: &NodeId) -> CatalogResult<VersionId> {
        self.mutate("begin_draft", Touched::Workflow, |state| {
            state.tree.node(layer_id)?;
            Ok(state.workflow.begin_draft(layer_id)?)
        })
    }

    pub fn submit_for_review(&self, layer_id: &NodeId) -> CatalogResult<VersionId> {
        self.mutate("submit_for_review", Touched::Workflow, |state| {
            state.tree.node(layer_id)?;
            Ok(state.workflow.submit_for_review(layer_id)?)
        })
    }

    pub fn approve(&self, layer_id: &NodeId) -> CatalogResult<VersionId> {
        self.mutate("approve", Touched::Workflow, |state| {
            state.tree.node(layer_id)?;
            Ok(state.workflow.approve(layer_id)?)
        })
    }

    pub fn cancel_draft(&self, layer_id: &NodeId) -> CatalogResult<VersionId> {
        self.mutate("cancel_draft", Touched::Workflow, |state| {
            state.tree.node(layer_id)?;
            Ok(state.workflow.cancel_draft(layer_id)?)
        })
    }

    pub fn update_draft_description(
        &self,
        layer_id: &NodeId,
        description: Option<String>,
    ) -> CatalogResult<()> {
        self.mutate("update_draft_description", Touched::Workflow, |state| {
            state.tree.node(layer_id)?;
            Ok(state.workflow.update_draft_description(layer_id, description)?)
        })
    }

    pub fn assign_permission(
        &self,
        layer_id: &NodeId,
        version: VersionId,
        role: Role,
        target_kind: TargetKind,
        target_id: &str,
    ) -> CatalogResult<bool> {
        self.mutate("assign_permission", Touched::Workflow, |state| {
            state.tree.node(layer_id)?;
            Ok(state
                .workflow
                .assign_permission(layer_id, version, role, target_kind, target_id)?)
        })
    }

    pub fn revoke_permission(
        &self,
        layer_id: &NodeId,
        version: VersionId,
        role: Role,
        target_kind: TargetKind,
        target_id: &str,
    ) -> CatalogResult<bool> {
        self.mutate("revoke_permission", Touched::Workflow, |state| {
            state.tree.node(layer_id)?;
            Ok(state
                .workflow
                .revoke_permission(layer_id, version, role, target_kind, target_id)?)
        })
    }

    pub fn layer_versions(&self, layer_id: &NodeId) -> CatalogResult<Vec<LayerVersion>> {
        self.with_state_read("layer_versions", |state| {
            Ok(state.workflow.versions(layer_id)?.to_vec())
        })
    }

    /// Layer node, its published version and open draft, and the objects
    /// and fields beneath it.
    pub fn get_layer_detail(&self, layer_id: &NodeId) -> CatalogResult<LayerDetail<K>> {
        self.with_state_read("get_layer_detail", |state| {
            let layer = state.tree.node(layer_id)?.clone();
            let published = state.workflow.published_version(layer_id)?.clone();
            let draft = state.workflow.open_draft(layer_id)?.cloned();

            let mut objects = Vec::new();
            for object in state.tree.get_children(layer_id)? {
                let fields = cloned(state.tree.get_children(object.id())?);
                objects.push(ObjectDetail {
                    object: object.clone(),
                    fields,
                });
            }

            Ok(LayerDetail {
                layer,
                published,
                draft,
                objects,
            })
        })
    }

    // ---- map placement ----

    /// Resolves a node's world position and projects it onto the current map.
    /// An authoritative coordinate wins; otherwise one is synthesized from
    /// the nearest ancestor that can be placed.
    pub fn place_entity_on_map(&self, node_id: &NodeId, view: &MapView) -> CatalogResult<MapPlacement> {
        let (coordinate, synthetic) = self.with_state_read("place_entity_on_map", |state| {
            self.resolve_coordinate(&state.tree, node_id)
        })?;
        let screen = self.projector.map_to_screen(view, coordinate)?;

        Ok(MapPlacement {
            node_id: node_id.clone(),
            coordinate,
            screen,
            synthetic,
        })
    }

    pub fn screen_to_world(
        &self,
        view: &MapView,
        click_offset: ScreenPoint,
    ) -> CatalogResult<WorldCoordinate> {
        Ok(self.projector.map_to_world(view, click_offset)?)
    }

    fn resolve_coordinate(
        &self,
        tree: &CatalogTree<K>,
        node_id: &NodeId,
    ) -> CatalogResult<(WorldCoordinate, bool)> {
        let node = tree.node(node_id)?;
        if let Some(coordinate) = node.coordinate() {
            return Ok((coordinate, false));
        }

        // chain[0] is the node itself, then parent up to root
        let mut chain = vec![node];
        chain.extend(tree.get_ancestors(node_id)?);
        let anchor = chain
            .iter()
            .position(|member| member.coordinate().is_some())
            .ok_or_else(|| GeometryError::Unplaceable(node_id.clone()))?;

        let mut coordinate = chain[anchor]
            .coordinate()
            .ok_or_else(|| GeometryError::Unplaceable(node_id.clone()))?;
        for member in chain[..anchor].iter().rev() {
            coordinate = self
                .projector
                .synthetic_child_coordinate(coordinate, member.id().as_str());
        }
        Ok((coordinate, true))
    }

    // ---- epochs and snapshots ----

    /// Cumulative change counter across tree and workflow.
    pub fn epoch(&self) -> u64 {
        self.epochs.global.load(Ordering::SeqCst)
    }

    pub fn tree_epoch(&self) -> u64 {
        self.epochs.tree.load(Ordering::SeqCst)
    }

    pub fn workflow_epoch(&self) -> u64 {
        self.epochs.workflow.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> CatalogResult<CatalogSnapshot<K>> {
        self.with_state_read("snapshot", |state| {
            Ok(CatalogSnapshot {
                epochs: self.epochs.snapshot(),
                tree: state.tree.clone(),
                workflow: state.workflow.clone(),
            })
        })
    }
}

impl CatalogService<LayerKind> {
    pub fn list_visible_categories(&self, filter: &FacetFilterState) -> CatalogResult<Vec<Node<LayerKind>>> {
        self.list_visible_roots(filter)
    }

    pub fn list_visible_layers_in_category(
        &self,
        category_id: &NodeId,
        filter: &FacetFilterState,
    ) -> CatalogResult<Vec<Node<LayerKind>>> {
        self.list_visible_children(category_id, filter)
    }
}

impl CatalogService<RosterKind> {
    pub fn list_visible_districts(&self, filter: &FacetFilterState) -> CatalogResult<Vec<Node<RosterKind>>> {
        self.list_visible_roots(filter)
    }

    pub fn list_visible_sectors_in_district(
        &self,
        district_id: &NodeId,
        filter: &FacetFilterState,
    ) -> CatalogResult<Vec<Node<RosterKind>>> {
        self.list_visible_children(district_id, filter)
    }
}

fn cloned<K: NodeKind>(nodes: Vec<&Node<K>>) -> Vec<Node<K>> {
    nodes.into_iter().cloned().collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "K: NodeKind")]
pub struct CatalogSnapshot<K> {
    pub epochs: EpochSnapshot,
    pub tree: CatalogTree<K>,
    pub workflow: DraftWorkflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochSnapshot {
    pub global: u64,
    pub tree: u64,
    pub workflow: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicBool;

    use crate::error::StructuralError;
    use common::Viewport;

    #[derive(Default)]
    struct RecordingSink {
        saved: Mutex<Vec<EpochSnapshot>>,
    }

    impl CatalogSnapshotSink<LayerKind> for RecordingSink {
        fn save(&self, snapshot: &CatalogSnapshot<LayerKind>) -> CatalogResult<()> {
            self.saved
                .lock()
                .map_err(|_| CatalogError::LockPoisoned("recording sink"))?
                .push(snapshot.epochs);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FlakySink {
        failing: AtomicBool,
    }

    impl CatalogSnapshotSink<LayerKind> for FlakySink {
        fn save(&self, _snapshot: &CatalogSnapshot<LayerKind>) -> CatalogResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(CatalogError::Persistence("disk full".into()));
            }
            Ok(())
        }
    }

    fn id(raw: &str) -> NodeId {
        NodeId::from(raw)
    }

    fn view() -> MapView {
        MapView::new("-90.0715,29.9511", 72_223.819286, Viewport::new(1200.0, 800.0))
    }

    #[test]
    fn adding_a_layer_registers_v1() {
        let service = CatalogService::<LayerKind>::new();
        let category = service
            .add_node(LayerKind::Category, "Weather", None, Attributes::new())
            .expect("category");
        let layer = service
            .add_node(LayerKind::Layer, "Radar", Some(&category), Attributes::new())
            .expect("layer");

        let versions = service.layer_versions(&layer).expect("versions");

        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version, VersionId::FIRST);
    }

    #[test]
    fn versioned_insert_rejects_plain_kinds() {
        let service = CatalogService::<LayerKind>::new();

        let err = service
            .insert_versioned_node(
                id("weather"),
                LayerKind::Category,
                "Weather",
                None,
                Attributes::new(),
                VersionId::FIRST,
            )
            .expect_err("categories are not versioned");

        assert!(matches!(err, CatalogError::Workflow(WorkflowError::LayerNotVersioned(_))));
        assert!(service.roots().expect("roots").is_empty());
    }

    #[test]
    fn epochs_move_only_on_success() {
        let service = CatalogService::<LayerKind>::new();
        let start = service.epoch();

        service
            .insert_node_with_id(id("weather"), LayerKind::Category, "Weather", None, Attributes::new())
            .expect("category");
        let after_insert = service.epoch();
        let tree_epoch = service.tree_epoch();

        let err = service
            .insert_node_with_id(id("orphan"), LayerKind::Object, "Orphan", Some(&id("weather")), Attributes::new())
            .expect_err("object under category");

        assert!(matches!(err, CatalogError::Structural(StructuralError::InvalidParentKind { .. })));
        assert!(after_insert > start);
        assert_eq!(service.epoch(), after_insert);
        assert_eq!(service.tree_epoch(), tree_epoch);
    }

    #[test]
    fn sink_receives_each_mutation() {
        let sink = Arc::new(RecordingSink::default());
        let service =
            CatalogService::<LayerKind>::with_settings(ProjectionSettings::default(), Some(sink.clone()));

        service
            .insert_node_with_id(id("weather"), LayerKind::Category, "Weather", None, Attributes::new())
            .expect("category");
        service
            .insert_node_with_id(id("radar"), LayerKind::Layer, "Radar", Some(&id("weather")), Attributes::new())
            .expect("layer");
        service.begin_draft(&id("radar")).expect("draft");

        let saved = sink.saved.lock().expect("sink lock");
        assert_eq!(saved.len(), 3);
        assert!(saved[2].workflow > saved[0].workflow);
    }

    #[test]
    fn rejected_snapshot_leaves_state_untouched() {
        let sink = Arc::new(FlakySink::default());
        let service =
            CatalogService::<LayerKind>::with_settings(ProjectionSettings::default(), Some(sink.clone()));
        service
            .insert_node_with_id(id("weather"), LayerKind::Category, "Weather", None, Attributes::new())
            .expect("category");
        service
            .insert_node_with_id(id("radar"), LayerKind::Layer, "Radar", Some(&id("weather")), Attributes::new())
            .expect("layer");
        let epoch = service.epoch();

        sink.failing.store(true, Ordering::SeqCst);
        let add_err = service
            .add_node(LayerKind::Category, "Resources", None, Attributes::new())
            .expect_err("persistence fails");
        let draft_err = service.begin_draft(&id("radar")).expect_err("persistence fails");

        assert!(matches!(add_err, CatalogError::Persistence(_)));
        assert!(matches!(draft_err, CatalogError::Persistence(_)));
        assert_eq!(service.roots().expect("roots").len(), 1);
        assert_eq!(service.layer_versions(&id("radar")).expect("versions").len(), 1);
        assert_eq!(service.epoch(), epoch);

        sink.failing.store(false, Ordering::SeqCst);
        assert_eq!(
            service.begin_draft(&id("radar")).expect("retry succeeds"),
            VersionId::new(2).expect("non-zero")
        );
    }

    #[test]
    fn sink_sees_epochs_of_the_committed_state() {
        let sink = Arc::new(RecordingSink::default());
        let service =
            CatalogService::<LayerKind>::with_settings(ProjectionSettings::default(), Some(sink.clone()));

        service
            .insert_node_with_id(id("weather"), LayerKind::Category, "Weather", None, Attributes::new())
            .expect("category");

        let saved = sink.saved.lock().expect("sink lock");
        assert_eq!(saved[0], service.snapshot().expect("snapshot").epochs);
    }

    #[test]
    fn removing_a_layer_drops_its_history() {
        let service = CatalogService::<LayerKind>::new();
        service
            .insert_node_with_id(id("weather"), LayerKind::Category, "Weather", None, Attributes::new())
            .expect("category");
        service
            .insert_node_with_id(id("radar"), LayerKind::Layer, "Radar", Some(&id("weather")), Attributes::new())
            .expect("layer");

        let removed = service.remove_node(&id("weather"), true).expect("cascade");

        assert_eq!(removed, vec![id("weather"), id("radar")]);
        assert!(service.layer_versions(&id("radar")).is_err());
    }

    #[test]
    fn workflow_on_missing_node_is_structural() {
        let service = CatalogService::<LayerKind>::new();

        let err = service.begin_draft(&id("ghost")).expect_err("missing");

        assert!(matches!(err, CatalogError::Structural(StructuralError::NodeNotFound(_))));
    }

    #[test]
    fn roster_nodes_have_no_workflow() {
        let service = CatalogService::<RosterKind>::new();
        service
            .insert_node_with_id(id("north"), RosterKind::District, "North", None, Attributes::new())
            .expect("district");

        let err = service.begin_draft(&id("north")).expect_err("not versioned");

        assert!(matches!(err, CatalogError::Workflow(WorkflowError::LayerNotVersioned(_))));
    }

    #[test]
    fn authoritative_coordinate_wins() {
        let service = CatalogService::<RosterKind>::new();
        service
            .insert_node_with_id(id("north"), RosterKind::District, "North", None, Attributes::new())
            .expect("district");
        service
            .set_coordinate(&id("north"), Some(WorldCoordinate::new(29.9511, -90.0715)))
            .expect("coordinate");

        let placement = service.place_entity_on_map(&id("north"), &view()).expect("placement");

        assert!(!placement.synthetic);
        assert!((placement.screen.x - 50.0).abs() < 1e-9);
        assert!((placement.screen.y - 50.0).abs() < 1e-9);
    }

    #[test]
    fn missing_coordinate_is_synthesized_through_ancestors() {
        let service = CatalogService::<RosterKind>::new();
        let origin = WorldCoordinate::new(29.9511, -90.0715);
        service
            .insert_node_with_id(id("north"), RosterKind::District, "North", None, Attributes::new())
            .expect("district");
        service.set_coordinate(&id("north"), Some(origin)).expect("coordinate");
        service
            .insert_node_with_id(id("sector-1"), RosterKind::Sector, "Sector 1", Some(&id("north")), Attributes::new())
            .expect("sector");
        service
            .insert_node_with_id(id("engine-12"), RosterKind::Unit, "Engine 12", Some(&id("sector-1")), Attributes::new())
            .expect("unit");

        let placement = service
            .place_entity_on_map(&id("engine-12"), &view())
            .expect("placement");
        let again = service
            .place_entity_on_map(&id("engine-12"), &view())
            .expect("placement");

        let projector = GeoProjector::default();
        let sector = projector.synthetic_child_coordinate(origin, "sector-1");
        let expected = projector.synthetic_child_coordinate(sector, "engine-12");
        assert!(placement.synthetic);
        assert_eq!(placement.coordinate, expected);
        assert_eq!(placement, again);
    }

    #[test]
    fn unplaceable_nodes_are_reported() {
        let service = CatalogService::<LayerKind>::new();
        service
            .insert_node_with_id(id("weather"), LayerKind::Category, "Weather", None, Attributes::new())
            .expect("category");

        let err = service
            .place_entity_on_map(&id("weather"), &view())
            .expect_err("no coordinate anywhere");

        assert!(matches!(err, CatalogError::Geometry(GeometryError::Unplaceable(_))));
    }

    #[test]
    fn invalid_coordinates_are_not_stored() {
        let service = CatalogService::<RosterKind>::new();
        service
            .insert_node_with_id(id("north"), RosterKind::District, "North", None, Attributes::new())
            .expect("district");

        let err = service
            .set_coordinate(&id("north"), Some(WorldCoordinate::new(95.0, 0.0)))
            .expect_err("latitude out of range");

        assert!(matches!(err, CatalogError::Geometry(GeometryError::InvalidCoordinateFormat(_))));
        assert!(service.get_node(&id("north")).expect("node").coordinate().is_none());
    }

    #[test]
    fn snapshot_restores_state() {
        let service = CatalogService::<LayerKind>::new();
        service
            .insert_node_with_id(id("weather"), LayerKind::Category, "Weather", None, Attributes::new())
            .expect("category");
        service
            .insert_node_with_id(id("radar"), LayerKind::Layer, "Radar", Some(&id("weather")), Attributes::new())
            .expect("layer");
        service.begin_draft(&id("radar")).expect("draft");

        let json = serde_json::to_string(&service.snapshot().expect("snapshot")).expect("encode");
        let decoded: CatalogSnapshot<LayerKind> = serde_json::from_str(&json).expect("decode");
        let restored = CatalogService::from_snapshot(decoded, ProjectionSettings::default(), None);

        assert_eq!(restored.epoch(), service.epoch());
        assert_eq!(restored.get_children(&id("weather")).expect("children").len(), 1);
        assert!(matches!(
            restored.begin_draft(&id("radar")),
            Err(CatalogError::Workflow(WorkflowError::DraftAlreadyInProgress(_)))
        ));
    }
}
