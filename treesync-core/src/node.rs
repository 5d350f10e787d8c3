use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::feature::{Feature, FeatureKind, FeatureShape};

/// Arena index of a [`StateNode`]. Assigned once per tree and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u32);

impl NodeId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether the renderer currently knows the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Unsent,
    Sent,
}

/// A node of the state tree.
///
/// Features are keyed by wire id so iteration follows the id table. They are
/// boxed so a feature keeps its address for the node's whole lifetime.
#[derive(Debug)]
pub struct StateNode {
    id: NodeId,
    pub(crate) parent: Option<NodeId>,
    pub(crate) features: BTreeMap<u32, Box<Feature>>,
    pub(crate) attached: bool,
    pub(crate) sync: SyncState,
}

impl StateNode {
    pub(crate) fn new(id: NodeId) -> Self {
        Self {
            id,
            parent: None,
            features: BTreeMap::new(),
            attached: false,
            sync: SyncState::Unsent,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn sync_state(&self) -> SyncState {
        self.sync
    }

    pub fn has_feature(&self, kind: FeatureKind) -> bool {
        self.features.contains_key(&kind.id())
    }

    pub fn feature(&self, kind: FeatureKind) -> Option<&Feature> {
        self.features.get(&kind.id()).map(Box::as_ref)
    }

    pub fn features(&self) -> impl Iterator<Item = &Feature> {
        self.features.values().map(Box::as_ref)
    }

    /// Any feature has unflushed changes.
    pub fn is_dirty(&self) -> bool {
        self.features.values().any(|f| f.has_changes())
    }

    /// Mutations are logged only when the renderer knows the node or will
    /// learn about it at the next flush.
    pub(crate) fn tracks_changes(&self) -> bool {
        self.attached || self.sync == SyncState::Sent
    }

    pub(crate) fn feature_mut(&mut self, kind: FeatureKind) -> &mut Feature {
        let owner = self.id;
        self.features
            .entry(kind.id())
            .or_insert_with(|| Box::new(Feature::new(kind, owner)))
    }

    /// Child nodes across all node-list features, in feature id then list order.
    pub fn child_nodes(&self) -> Vec<NodeId> {
        self.features
            .values()
            .filter(|f| f.kind().shape() == FeatureShape::NodeList)
            .filter_map(|f| f.as_list())
            .flat_map(|list| list.nodes())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_created_once() {
        let mut node = StateNode::new(NodeId::new(5));
        let first: *const Feature = node.feature_mut(FeatureKind::ElementProperties);
        let second: *const Feature = node.feature_mut(FeatureKind::ElementProperties);
        assert_eq!(first, second);
        assert_eq!(node.features().count(), 1);
    }

    #[test]
    fn test_has_feature_has_no_side_effect() {
        let node = StateNode::new(NodeId::new(5));
        assert!(!node.has_feature(FeatureKind::ClassList));
        assert!(!node.has_feature(FeatureKind::ClassList));
        assert_eq!(node.features().count(), 0);
    }

    #[test]
    fn test_new_node_is_clean_and_detached() {
        let node = StateNode::new(NodeId::new(2));
        assert!(!node.is_dirty());
        assert!(!node.is_attached());
        assert!(!node.tracks_changes());
        assert_eq!(node.sync_state(), SyncState::Unsent);
    }

    #[test]
    fn test_node_id_display() {
        assert_eq!(NodeId::new(12).to_string(), "#12");
    }
}
