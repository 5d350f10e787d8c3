//! The node arena and its structural operations.
//!
//! ```text
//!            StateTree
//!   ┌──────────────────────────────┐
//!   │ nodes: NodeId → StateNode    │      mutation handles
//!   │ dirty: BTreeSet<NodeId>  ◄───┼──── MapFeature / ListFeature /
//!   │ released (pending Detach)    │     ScalarFeature, insert_node, ...
//!   │ attach / property listeners  │
//!   └──────────────┬───────────────┘
//!                  │ take_dirty()
//!                  ▼
//!           ChangeCollector::flush
//! ```
//!
//! The tree only records *which* nodes have pending changes. Every mutation
//! logs into its feature and inserts the owner into `dirty`; nothing else is
//! computed until flush.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::Deref;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::feature::{Feature, FeatureKind, FeatureShape, ListItem, NodeList, NodeMap, ScalarSlot};
use crate::listener::{Listener, ListenerId, ListenerRegistry};
use crate::node::{NodeId, StateNode, SyncState};

/// Id of the root node of every tree.
pub const ROOT_ID: NodeId = NodeId::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachPhase {
    Attached,
    Detached,
}

/// Fired once for every node whose attach state changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachEvent {
    pub node: NodeId,
    pub phase: AttachPhase,
}

/// Fired after a map property changed value.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange {
    pub node: NodeId,
    pub feature: FeatureKind,
    pub property: String,
    pub old_value: Option<Value>,
    pub value: Option<Value>,
    /// The write came from the renderer and was not echoed back.
    pub from_client: bool,
}

pub struct StateTree {
    nodes: FxHashMap<NodeId, StateNode>,
    next_id: u32,
    dirty: BTreeSet<NodeId>,
    released: Vec<NodeId>,
    attach_listeners: ListenerRegistry<AttachEvent>,
    property_listeners: ListenerRegistry<PropertyChange>,
}

impl Default for StateTree {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTree {
    /// A tree holding only its attached root.
    pub fn new() -> Self {
        let mut root = StateNode::new(ROOT_ID);
        root.attached = true;

        let mut nodes = FxHashMap::default();
        nodes.insert(ROOT_ID, root);
        let mut dirty = BTreeSet::new();
        dirty.insert(ROOT_ID);

        Self {
            nodes,
            next_id: ROOT_ID.get() + 1,
            dirty,
            released: Vec::new(),
            attach_listeners: ListenerRegistry::default(),
            property_listeners: ListenerRegistry::default(),
        }
    }

    pub fn root(&self) -> NodeId {
        ROOT_ID
    }

    /// A new detached node without features.
    pub fn create_node(&mut self) -> NodeId {
        let id = NodeId::new(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, StateNode::new(id));
        id
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    pub fn node(&self, node: NodeId) -> Option<&StateNode> {
        self.nodes.get(&node)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_attached(&self, node: NodeId) -> bool {
        self.nodes.get(&node).is_some_and(|n| n.attached)
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(&node).and_then(|n| n.parent)
    }

    /// Nodes with changes waiting for the next flush.
    pub fn dirty_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.dirty.iter().copied()
    }

    fn expect_node(&self, node: NodeId) -> &StateNode {
        match self.nodes.get(&node) {
            Some(n) => n,
            None => panic!("node {node} does not exist in this tree"),
        }
    }

    fn expect_node_mut(&mut self, node: NodeId) -> &mut StateNode {
        match self.nodes.get_mut(&node) {
            Some(n) => n,
            None => panic!("node {node} does not exist in this tree"),
        }
    }

    // ---------------------------------------------------------------------
    // Features
    // ---------------------------------------------------------------------

    /// The node's feature of `kind`, created on first access.
    ///
    /// Creating a feature is not a change; the same instance is returned for
    /// the node's lifetime.
    ///
    /// # Panics
    /// If the node does not exist.
    pub fn get_feature(&mut self, node: NodeId, kind: FeatureKind) -> &Feature {
        self.expect_node_mut(node).feature_mut(kind)
    }

    pub fn has_feature(&self, node: NodeId, kind: FeatureKind) -> bool {
        self.nodes.get(&node).is_some_and(|n| n.has_feature(kind))
    }

    /// Read access without creating the feature.
    pub fn feature(&self, node: NodeId, kind: FeatureKind) -> Option<&Feature> {
        self.nodes.get(&node).and_then(|n| n.feature(kind))
    }

    pub fn map_ref(&self, node: NodeId, kind: FeatureKind) -> Option<&NodeMap> {
        self.feature(node, kind).and_then(Feature::as_map)
    }

    pub fn list_ref(&self, node: NodeId, kind: FeatureKind) -> Option<&NodeList> {
        self.feature(node, kind).and_then(Feature::as_list)
    }

    pub fn scalar_ref(&self, node: NodeId, kind: FeatureKind) -> Option<&Value> {
        self.feature(node, kind)
            .and_then(Feature::as_scalar)
            .and_then(ScalarSlot::get)
    }

    /// Write handle for a map feature.
    ///
    /// # Panics
    /// If the node does not exist or `kind` is not map-shaped.
    pub fn map(&mut self, node: NodeId, kind: FeatureKind) -> MapFeature<'_> {
        assert_eq!(kind.shape(), FeatureShape::Map, "{kind:?} is not a map feature");
        let state = match self.nodes.get_mut(&node) {
            Some(n) => n,
            None => panic!("node {node} does not exist in this tree"),
        };
        let tracked = state.tracks_changes();
        MapFeature {
            map: state.feature_mut(kind).map_mut(),
            dirty: &mut self.dirty,
            node,
            tracked,
        }
    }

    /// Write handle for a value-list feature. Node lists are edited through
    /// [`insert_node`](Self::insert_node) and [`remove_node`](Self::remove_node).
    ///
    /// # Panics
    /// If the node does not exist or `kind` is not a value list.
    pub fn list(&mut self, node: NodeId, kind: FeatureKind) -> ListFeature<'_> {
        assert_eq!(
            kind.shape(),
            FeatureShape::ValueList,
            "{kind:?} is not a value list feature"
        );
        let state = match self.nodes.get_mut(&node) {
            Some(n) => n,
            None => panic!("node {node} does not exist in this tree"),
        };
        let tracked = state.tracks_changes();
        ListFeature {
            list: state.feature_mut(kind).list_mut(),
            dirty: &mut self.dirty,
            node,
            tracked,
        }
    }

    /// Write handle for a scalar feature.
    ///
    /// # Panics
    /// If the node does not exist or `kind` is not scalar-shaped.
    pub fn scalar(&mut self, node: NodeId, kind: FeatureKind) -> ScalarFeature<'_> {
        assert_eq!(kind.shape(), FeatureShape::Scalar, "{kind:?} is not a scalar feature");
        let state = match self.nodes.get_mut(&node) {
            Some(n) => n,
            None => panic!("node {node} does not exist in this tree"),
        };
        let tracked = state.tracks_changes();
        ScalarFeature {
            slot: state.feature_mut(kind).scalar_mut(),
            dirty: &mut self.dirty,
            node,
            tracked,
        }
    }

    /// Write a client-originated map value without logging it.
    /// Returns the previous value, or `None` if the value was unchanged.
    pub(crate) fn write_unlogged(
        &mut self,
        node: NodeId,
        kind: FeatureKind,
        key: &str,
        value: Value,
    ) -> Option<Option<Value>> {
        let map = self.expect_node_mut(node).feature_mut(kind).map_mut();
        let old = map.get(key).cloned();
        map.put(key.to_owned(), value, false).then_some(old)
    }

    // ---------------------------------------------------------------------
    // Structure
    // ---------------------------------------------------------------------

    /// Insert `child` at `index` of the node list `kind` on `parent`.
    ///
    /// # Panics
    /// If `kind` is not a node list, `child` already has a parent, `child` is
    /// the root or an ancestor of `parent`, or `index` is out of bounds.
    pub fn insert_node(&mut self, parent: NodeId, kind: FeatureKind, index: usize, child: NodeId) {
        assert_eq!(
            kind.shape(),
            FeatureShape::NodeList,
            "{kind:?} is not a node list feature"
        );
        assert_ne!(child, ROOT_ID, "the root node cannot be a child");
        let child_state = self.expect_node(child);
        if let Some(current) = child_state.parent {
            panic!("node {child} already has parent {current}; remove it first");
        }
        let mut cursor = Some(parent);
        while let Some(ancestor) = cursor {
            assert_ne!(ancestor, child, "adding {child} under {parent} would create a cycle");
            cursor = self.expect_node(ancestor).parent;
        }

        let parent_state = self.expect_node_mut(parent);
        let tracked = parent_state.tracks_changes();
        let parent_attached = parent_state.attached;
        parent_state
            .feature_mut(kind)
            .list_mut()
            .splice(index, 0, vec![ListItem::Node(child)], tracked);
        if tracked {
            self.dirty.insert(parent);
        }
        self.expect_node_mut(child).parent = Some(parent);

        if parent_attached {
            self.propagate_attach(child, true);
        }
    }

    /// Remove `child` from the node list `kind` on `parent`.
    ///
    /// # Panics
    /// If `child` is not in that list.
    pub fn remove_node(&mut self, parent: NodeId, kind: FeatureKind, child: NodeId) {
        assert_eq!(
            kind.shape(),
            FeatureShape::NodeList,
            "{kind:?} is not a node list feature"
        );
        let parent_state = self.expect_node_mut(parent);
        let tracked = parent_state.tracks_changes();
        let list = parent_state.feature_mut(kind).list_mut();
        let index = match list.position_of_node(child) {
            Some(index) => index,
            None => panic!("node {child} is not in {kind:?} of {parent}"),
        };
        list.splice(index, 1, Vec::new(), tracked);
        if tracked {
            self.dirty.insert(parent);
        }

        let child_state = self.expect_node_mut(child);
        child_state.parent = None;
        if child_state.attached {
            self.propagate_attach(child, false);
        }
    }

    pub fn add_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        self.insert_node(parent, FeatureKind::ElementChildren, index, child);
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        let len = self.children(parent).len();
        self.add_child(parent, len, child);
    }

    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        self.remove_node(parent, FeatureKind::ElementChildren, child);
    }

    /// Detach `node` from whichever node list holds it. No-op for parentless nodes.
    pub fn remove_from_parent(&mut self, node: NodeId) {
        let Some(parent) = self.parent(node) else {
            return;
        };
        let kind = self
            .expect_node(parent)
            .features()
            .find(|f| f.as_list().is_some_and(|l| l.position_of_node(node).is_some()))
            .map(Feature::kind);
        match kind {
            Some(kind) => self.remove_node(parent, kind, node),
            None => panic!("node {node} names {parent} as parent but is not in any of its lists"),
        }
    }

    /// Element children in order.
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.list_ref(node, FeatureKind::ElementChildren)
            .map(|l| l.nodes().collect())
            .unwrap_or_default()
    }

    /// Set the attach state of `start` and its subtree, then notify listeners
    /// parents first.
    fn propagate_attach(&mut self, start: NodeId, attached: bool) {
        let phase = if attached {
            AttachPhase::Attached
        } else {
            AttachPhase::Detached
        };
        let mut events = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get_mut(&id) else {
                continue;
            };
            if node.attached == attached {
                continue;
            }
            node.attached = attached;
            if attached || node.sync == SyncState::Sent {
                self.dirty.insert(id);
            }
            events.push(AttachEvent { node: id, phase });
            stack.extend(node.child_nodes().into_iter().rev());
        }
        log::trace!("{} node(s) {:?} from {start}", events.len(), phase);
        let mut drain = false;
        for event in events {
            drain |= self.attach_listeners.enqueue(event);
        }
        if drain {
            while let Some(event) = self.attach_listeners.next_queued() {
                self.dispatch_attach(event);
            }
        }
    }

    /// Remove a detached, parentless subtree from the arena.
    ///
    /// Nodes the renderer still knows about get their `Detach` at the next
    /// flush. Returns the number of nodes removed.
    ///
    /// # Panics
    /// If `node` is the root, attached, or still has a parent.
    pub fn release(&mut self, node: NodeId) -> usize {
        assert_ne!(node, ROOT_ID, "the root node cannot be released");
        let state = self.expect_node(node);
        assert!(!state.attached, "node {node} is attached; detach it before releasing");
        assert!(
            state.parent.is_none(),
            "node {node} still has a parent; remove it first"
        );

        let mut count = 0;
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            let Some(state) = self.nodes.remove(&id) else {
                continue;
            };
            stack.extend(state.child_nodes());
            self.dirty.remove(&id);
            if state.sync == SyncState::Sent {
                self.released.push(id);
            }
            self.attach_listeners.drop_node(id);
            self.property_listeners.drop_node(id);
            count += 1;
        }
        log::debug!("released {count} node(s) rooted at {node}");
        count
    }

    // ---------------------------------------------------------------------
    // Listeners
    // ---------------------------------------------------------------------

    pub fn add_attach_listener<F>(&mut self, node: NodeId, listener: F) -> ListenerId
    where
        F: FnMut(&mut StateTree, &AttachEvent) + Send + 'static,
    {
        self.expect_node(node);
        self.attach_listeners.add(node, Box::new(listener))
    }

    pub fn remove_attach_listener(&mut self, id: ListenerId) -> bool {
        self.attach_listeners.remove(id)
    }

    /// Listen for value changes of the element property `name` on `node`.
    pub fn add_property_listener<F>(&mut self, node: NodeId, name: &str, mut listener: F) -> ListenerId
    where
        F: FnMut(&mut StateTree, &PropertyChange) + Send + 'static,
    {
        self.expect_node(node);
        let name = name.to_owned();
        let filtered: Listener<PropertyChange> =
            Box::new(move |tree: &mut StateTree, change: &PropertyChange| {
                if change.feature == FeatureKind::ElementProperties && change.property == name {
                    listener(tree, change);
                }
            });
        self.property_listeners.add(node, filtered)
    }

    pub fn remove_property_listener(&mut self, id: ListenerId) -> bool {
        self.property_listeners.remove(id)
    }

    /// Notify property listeners. A change raised from inside a listener is
    /// delivered after the current one.
    pub(crate) fn fire_property_change(&mut self, change: PropertyChange) {
        if !self.property_listeners.enqueue(change) {
            return;
        }
        while let Some(change) = self.property_listeners.next_queued() {
            self.dispatch_property(change);
        }
    }

    fn dispatch_property(&mut self, change: PropertyChange) {
        let node = change.node;
        let mut listeners = self.property_listeners.checkout(node);
        if listeners.is_empty() {
            return;
        }
        for (id, listener) in listeners.iter_mut() {
            if !self.property_listeners.is_removed(*id) {
                listener(self, &change);
            }
        }
        if self.nodes.contains_key(&node) {
            self.property_listeners.restore(node, listeners);
        } else {
            self.property_listeners.discard(listeners);
        }
    }

    fn dispatch_attach(&mut self, event: AttachEvent) {
        let mut listeners = self.attach_listeners.checkout(event.node);
        if listeners.is_empty() {
            return;
        }
        for (id, listener) in listeners.iter_mut() {
            if !self.attach_listeners.is_removed(*id) {
                listener(self, &event);
            }
        }
        if self.nodes.contains_key(&event.node) {
            self.attach_listeners.restore(event.node, listeners);
        } else {
            self.attach_listeners.discard(listeners);
        }
    }

    // ---------------------------------------------------------------------
    // Flush support
    // ---------------------------------------------------------------------

    pub(crate) fn take_dirty(&mut self) -> BTreeSet<NodeId> {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn take_released(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.released)
    }

    pub(crate) fn node_mut(&mut self, node: NodeId) -> Option<&mut StateNode> {
        self.nodes.get_mut(&node)
    }
}

impl fmt::Debug for StateTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateTree")
            .field("nodes", &self.nodes.len())
            .field("next_id", &self.next_id)
            .field("dirty", &self.dirty)
            .field("released", &self.released)
            .field("attach_listeners", &self.attach_listeners.len())
            .field("property_listeners", &self.property_listeners.len())
            .finish()
    }
}

// -------------------------------------------------------------------------
// Mutation handles
// -------------------------------------------------------------------------

/// Mutable view of a map feature. Reads go through `Deref<Target = NodeMap>`.
pub struct MapFeature<'a> {
    map: &'a mut NodeMap,
    dirty: &'a mut BTreeSet<NodeId>,
    node: NodeId,
    tracked: bool,
}

impl MapFeature<'_> {
    /// Returns `false` if the key already held an equal value.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) -> bool {
        let changed = self.map.put(key.into(), value.into(), self.tracked);
        self.mark(changed);
        changed
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let previous = self.map.remove(key, self.tracked);
        self.mark(previous.is_some());
        previous
    }

    pub fn clear(&mut self) {
        let had_values = !self.map.is_empty();
        self.map.clear(self.tracked);
        self.mark(had_values);
    }

    fn mark(&mut self, changed: bool) {
        if changed && self.tracked {
            self.dirty.insert(self.node);
        }
    }
}

impl Deref for MapFeature<'_> {
    type Target = NodeMap;

    fn deref(&self) -> &NodeMap {
        &*self.map
    }
}

/// Mutable view of a value-list feature.
pub struct ListFeature<'a> {
    list: &'a mut NodeList,
    dirty: &'a mut BTreeSet<NodeId>,
    node: NodeId,
    tracked: bool,
}

impl ListFeature<'_> {
    pub fn push(&mut self, value: impl Into<Value>) {
        let len = self.list.len();
        self.splice(len, 0, vec![value.into()]);
    }

    pub fn insert(&mut self, index: usize, value: impl Into<Value>) {
        self.splice(index, 0, vec![value.into()]);
    }

    /// # Panics
    /// If `index` is out of bounds.
    pub fn remove(&mut self, index: usize) -> Value {
        match self.splice(index, 1, Vec::new()).pop() {
            Some(ListItem::Value(value)) => value,
            other => panic!("unexpected item {other:?} in value list"),
        }
    }

    /// Remove the first occurrence of `value`. Returns whether it was present.
    pub fn remove_value(&mut self, value: &Value) -> bool {
        match self.list.position_of_value(value) {
            Some(index) => {
                self.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        let len = self.list.len();
        if len > 0 {
            self.splice(0, len, Vec::new());
        }
    }

    /// # Panics
    /// If `index + remove` is out of bounds.
    pub fn splice(&mut self, index: usize, remove: usize, add: Vec<Value>) -> Vec<ListItem> {
        let add: Vec<ListItem> = add.into_iter().map(ListItem::Value).collect();
        let changed = remove > 0 || !add.is_empty();
        let removed = self.list.splice(index, remove, add, self.tracked);
        if changed && self.tracked {
            self.dirty.insert(self.node);
        }
        removed
    }
}

impl Deref for ListFeature<'_> {
    type Target = NodeList;

    fn deref(&self) -> &NodeList {
        &*self.list
    }
}

/// Mutable view of a scalar feature.
pub struct ScalarFeature<'a> {
    slot: &'a mut ScalarSlot,
    dirty: &'a mut BTreeSet<NodeId>,
    node: NodeId,
    tracked: bool,
}

impl ScalarFeature<'_> {
    pub fn get(&self) -> Option<&Value> {
        self.slot.get()
    }

    /// Returns `false` if the slot already held an equal value.
    pub fn set(&mut self, value: Option<Value>) -> bool {
        let changed = self.slot.set(value, self.tracked);
        if changed && self.tracked {
            self.dirty.insert(self.node);
        }
        changed
    }
}

// =========================================================================
// Tests
// =========================================================================
