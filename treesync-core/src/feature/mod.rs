//! Features: typed payloads owned by a single state node.
//!
//! ```text
//!   FeatureKind ──(registry)──► wire id
//!        │
//!        └─ shape() ─► Map ──────► NodeMap     (key → value, per-key log)
//!                      ValueList ┐
//!                      NodeList ─┴► NodeList    (items, splice log)
//!                      Scalar ───► ScalarSlot  (value, changed flag)
//! ```
//!
//! Payloads never mark anything dirty themselves. Writes go through the
//! handles in [`crate::tree`], which log into the payload and put the owner in
//! the tree's dirty set in one step.

mod kind;
mod list;
mod map;
mod registry;
mod scalar;

pub use kind::{FeatureKind, FeatureShape};
pub use list::{ListItem, NodeList};
pub use map::NodeMap;
pub use registry::{FeatureRegistry, RegistryBuilder, FEATURE_IDS};
pub use scalar::ScalarSlot;

pub(crate) use map::MapChange;

use crate::change::ChangeRecord;
use crate::node::NodeId;

/// Payload of a feature, by shape.
#[derive(Debug, Clone)]
pub enum FeatureData {
    Map(NodeMap),
    List(NodeList),
    Scalar(ScalarSlot),
}

/// A typed payload attached to exactly one node.
#[derive(Debug, Clone)]
pub struct Feature {
    kind: FeatureKind,
    owner: NodeId,
    data: FeatureData,
}

impl Feature {
    pub(crate) fn new(kind: FeatureKind, owner: NodeId) -> Self {
        let data = match kind.shape() {
            FeatureShape::Map => FeatureData::Map(NodeMap::default()),
            FeatureShape::ValueList | FeatureShape::NodeList => {
                FeatureData::List(NodeList::default())
            }
            FeatureShape::Scalar => FeatureData::Scalar(ScalarSlot::default()),
        };
        Self { kind, owner, data }
    }

    pub fn kind(&self) -> FeatureKind {
        self.kind
    }

    pub fn owner(&self) -> NodeId {
        self.owner
    }

    pub fn data(&self) -> &FeatureData {
        &self.data
    }

    pub fn as_map(&self) -> Option<&NodeMap> {
        match &self.data {
            FeatureData::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&NodeList> {
        match &self.data {
            FeatureData::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&ScalarSlot> {
        match &self.data {
            FeatureData::Scalar(slot) => Some(slot),
            _ => None,
        }
    }

    pub(crate) fn map_mut(&mut self) -> &mut NodeMap {
        match &mut self.data {
            FeatureData::Map(map) => map,
            _ => panic!("{:?} is not a map feature", self.kind),
        }
    }

    pub(crate) fn list_mut(&mut self) -> &mut NodeList {
        match &mut self.data {
            FeatureData::List(list) => list,
            _ => panic!("{:?} is not a list feature", self.kind),
        }
    }

    pub(crate) fn scalar_mut(&mut self) -> &mut ScalarSlot {
        match &mut self.data {
            FeatureData::Scalar(slot) => slot,
            _ => panic!("{:?} is not a scalar feature", self.kind),
        }
    }

    pub fn has_changes(&self) -> bool {
        match &self.data {
            FeatureData::Map(map) => map.has_changes(),
            FeatureData::List(list) => list.has_changes(),
            FeatureData::Scalar(slot) => slot.has_changes(),
        }
    }

    pub(crate) fn clear_changes(&mut self) {
        match &mut self.data {
            FeatureData::Map(map) => map.clear_changes(),
            FeatureData::List(list) => list.clear_changes(),
            FeatureData::Scalar(slot) => slot.clear_changes(),
        }
    }

    /// Drain the change log into `out`.
    pub(crate) fn collect_changes(&mut self, out: &mut Vec<ChangeRecord>) {
        let node = self.owner;
        let feature = self.kind.id();
        match &mut self.data {
            FeatureData::Map(map) => {
                out.extend(map.drain_changes().into_iter().map(|change| match change {
                    MapChange::Put(key, value) => ChangeRecord::Put {
                        node,
                        feature,
                        key,
                        value,
                    },
                    MapChange::Remove(key) => ChangeRecord::Remove { node, feature, key },
                }));
            }
            FeatureData::List(list) => {
                out.extend(list.drain_changes().into_iter().map(|splice| {
                    ChangeRecord::Splice {
                        node,
                        feature,
                        index: splice.index as u32,
                        remove: splice.remove as u32,
                        add: splice.add,
                    }
                }));
            }
            FeatureData::Scalar(slot) => {
                if slot.has_changes() {
                    slot.clear_changes();
                    out.push(ChangeRecord::Set {
                        node,
                        feature,
                        value: slot.get().cloned(),
                    });
                }
            }
        }
    }

    /// Emit the whole payload as if it were built from empty, then clear the log.
    pub(crate) fn collect_full(&mut self, out: &mut Vec<ChangeRecord>) {
        let node = self.owner;
        let feature = self.kind.id();
        match &self.data {
            FeatureData::Map(map) => {
                out.extend(map.iter().map(|(key, value)| ChangeRecord::Put {
                    node,
                    feature,
                    key: key.to_owned(),
                    value: value.clone(),
                }));
            }
            FeatureData::List(list) => {
                if !list.is_empty() {
                    out.push(ChangeRecord::Splice {
                        node,
                        feature,
                        index: 0,
                        remove: 0,
                        add: list.items().to_vec(),
                    });
                }
            }
            FeatureData::Scalar(slot) => {
                if let Some(value) = slot.get() {
                    out.push(ChangeRecord::Set {
                        node,
                        feature,
                        value: Some(value.clone()),
                    });
                }
            }
        }
        self.clear_changes();
    }
}
