//! Renderer-side mirror of a state tree, rebuilt from change records only.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use serde_json::Value;
use thiserror::Error;

use crate::change::ChangeRecord;
use crate::feature::{FeatureData, FeatureKind, FeatureShape, ListItem};
use crate::node::NodeId;
use crate::tree::StateTree;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplicaError {
    #[error("record for unknown node {0}")]
    UnknownNode(NodeId),

    #[error("node {0} attached twice")]
    DuplicateAttach(NodeId),

    #[error("unknown feature id {0}")]
    UnknownFeature(u32),

    #[error("record does not match the shape of {kind:?} on node {node}")]
    ShapeMismatch { node: NodeId, kind: FeatureKind },

    #[error("splice {index}+{remove} out of bounds for {kind:?} of length {len} on node {node}")]
    SpliceOutOfBounds {
        node: NodeId,
        kind: FeatureKind,
        index: u32,
        remove: u32,
        len: usize,
    },
}

/// Mirrored payload of one feature.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplicaFeature {
    Map(BTreeMap<String, Value>),
    List(Vec<ListItem>),
    Scalar(Option<Value>),
}

impl ReplicaFeature {
    fn empty(shape: FeatureShape) -> Self {
        match shape {
            FeatureShape::Map => ReplicaFeature::Map(BTreeMap::new()),
            FeatureShape::ValueList | FeatureShape::NodeList => ReplicaFeature::List(Vec::new()),
            FeatureShape::Scalar => ReplicaFeature::Scalar(None),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            ReplicaFeature::Map(map) => map.is_empty(),
            ReplicaFeature::List(list) => list.is_empty(),
            ReplicaFeature::Scalar(value) => value.is_none(),
        }
    }

    fn of(data: &FeatureData) -> Self {
        match data {
            FeatureData::Map(map) => ReplicaFeature::Map(
                map.iter().map(|(k, v)| (k.to_owned(), v.clone())).collect(),
            ),
            FeatureData::List(list) => ReplicaFeature::List(list.items().to_vec()),
            FeatureData::Scalar(slot) => ReplicaFeature::Scalar(slot.get().cloned()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplicaNode {
    features: BTreeMap<u32, ReplicaFeature>,
}

impl ReplicaNode {
    pub fn feature(&self, kind: FeatureKind) -> Option<&ReplicaFeature> {
        self.features.get(&kind.id())
    }

    pub fn map_value(&self, kind: FeatureKind, key: &str) -> Option<&Value> {
        match self.feature(kind)? {
            ReplicaFeature::Map(map) => map.get(key),
            _ => None,
        }
    }

    pub fn list(&self, kind: FeatureKind) -> &[ListItem] {
        match self.feature(kind) {
            Some(ReplicaFeature::List(items)) => items,
            _ => &[],
        }
    }

    pub fn scalar(&self, kind: FeatureKind) -> Option<&Value> {
        match self.feature(kind)? {
            ReplicaFeature::Scalar(value) => value.as_ref(),
            _ => None,
        }
    }

    /// Non-empty features by id.
    fn snapshot(&self) -> BTreeMap<u32, ReplicaFeature> {
        self.features
            .iter()
            .filter(|(_, f)| !f.is_empty())
            .map(|(id, f)| (*id, f.clone()))
            .collect()
    }
}

/// The renderer's view, built by replaying records from empty.
#[derive(Debug, Clone, Default)]
pub struct Replica {
    nodes: FxHashMap<NodeId, ReplicaNode>,
}

impl Replica {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: NodeId) -> Option<&ReplicaNode> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Replay `records` in order, stopping at the first invalid one.
    ///
    /// A node spliced into a list may be attached later in the same batch,
    /// but must be known once the batch ends.
    pub fn apply(&mut self, records: &[ChangeRecord]) -> Result<(), ReplicaError> {
        records.iter().try_for_each(|record| self.apply_one(record))?;
        let spliced = records.iter().filter_map(|record| match record {
            ChangeRecord::Splice { add, .. } => Some(add),
            _ => None,
        });
        match spliced
            .flatten()
            .filter_map(ListItem::as_node)
            .find(|node| !self.nodes.contains_key(node))
        {
            Some(node) => Err(ReplicaError::UnknownNode(node)),
            None => Ok(()),
        }
    }

    fn apply_one(&mut self, record: &ChangeRecord) -> Result<(), ReplicaError> {
        match record {
            ChangeRecord::Attach { node } => {
                if self.nodes.insert(*node, ReplicaNode::default()).is_some() {
                    return Err(ReplicaError::DuplicateAttach(*node));
                }
            }
            ChangeRecord::Detach { node } => {
                self.nodes
                    .remove(node)
                    .ok_or(ReplicaError::UnknownNode(*node))?;
            }
            ChangeRecord::Put {
                node,
                feature,
                key,
                value,
            } => match self.feature_mut(*node, *feature)? {
                (_, ReplicaFeature::Map(map)) => {
                    map.insert(key.clone(), value.clone());
                }
                (kind, _) => return Err(ReplicaError::ShapeMismatch { node: *node, kind }),
            },
            ChangeRecord::Remove { node, feature, key } => {
                match self.feature_mut(*node, *feature)? {
                    (_, ReplicaFeature::Map(map)) => {
                        map.remove(key);
                    }
                    (kind, _) => return Err(ReplicaError::ShapeMismatch { node: *node, kind }),
                }
            }
            ChangeRecord::Splice {
                node,
                feature,
                index,
                remove,
                add,
            } => match self.feature_mut(*node, *feature)? {
                (kind, ReplicaFeature::List(items)) => {
                    let start = *index as usize;
                    let end = start + *remove as usize;
                    if end > items.len() {
                        return Err(ReplicaError::SpliceOutOfBounds {
                            node: *node,
                            kind,
                            index: *index,
                            remove: *remove,
                            len: items.len(),
                        });
                    }
                    items.splice(start..end, add.iter().cloned()).for_each(drop);
                }
                (kind, _) => return Err(ReplicaError::ShapeMismatch { node: *node, kind }),
            },
            ChangeRecord::Set {
                node,
                feature,
                value,
            } => match self.feature_mut(*node, *feature)? {
                (_, ReplicaFeature::Scalar(slot)) => *slot = value.clone(),
                (kind, _) => return Err(ReplicaError::ShapeMismatch { node: *node, kind }),
            },
        }
        Ok(())
    }

    fn feature_mut(
        &mut self,
        node: NodeId,
        feature: u32,
    ) -> Result<(FeatureKind, &mut ReplicaFeature), ReplicaError> {
        let kind = FeatureKind::from_id(feature).ok_or(ReplicaError::UnknownFeature(feature))?;
        let replica_node = self
            .nodes
            .get_mut(&node)
            .ok_or(ReplicaError::UnknownNode(node))?;
        let slot = replica_node
            .features
            .entry(feature)
            .or_insert_with(|| ReplicaFeature::empty(kind.shape()));
        Ok((kind, slot))
    }

    /// Whether this replica holds exactly the nodes of `tree` the renderer
    /// should know about (attached ones), with identical non-empty payloads.
    pub fn mirrors(&self, tree: &StateTree) -> bool {
        let mut expected = 0;
        let mut pending = vec![tree.root()];
        while let Some(id) = pending.pop() {
            let Some(node) = tree.node(id) else {
                return false;
            };
            let Some(mirror) = self.nodes.get(&id) else {
                return false;
            };
            let payloads: BTreeMap<u32, ReplicaFeature> = node
                .features()
                .map(|f| (f.kind().id(), ReplicaFeature::of(f.data())))
                .filter(|(_, f)| !f.is_empty())
                .collect();
            if payloads != mirror.snapshot() {
                return false;
            }
            expected += 1;
            pending.extend(node.child_nodes());
        }
        expected == self.nodes.len()
    }
}
