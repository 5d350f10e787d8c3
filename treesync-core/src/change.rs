//! Outgoing change records.
//!
//! Serialized (serde, externally tagged) as e.g.
//! `{"put":{"node":4,"feature":1,"key":"value","value":"hi"}}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::feature::ListItem;
use crate::node::NodeId;

/// One unit of change sent to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeRecord {
    /// The node became known to the renderer. Precedes all of its feature records.
    Attach { node: NodeId },
    /// The node left the live tree; the renderer may drop it.
    Detach { node: NodeId },
    /// Map entry added or updated.
    Put {
        node: NodeId,
        feature: u32,
        key: String,
        value: Value,
    },
    /// Map entry removed.
    Remove {
        node: NodeId,
        feature: u32,
        key: String,
    },
    /// List edit: remove `remove` items at `index`, then insert `add` there.
    Splice {
        node: NodeId,
        feature: u32,
        index: u32,
        remove: u32,
        add: Vec<ListItem>,
    },
    /// Scalar replaced; `None` clears it.
    Set {
        node: NodeId,
        feature: u32,
        value: Option<Value>,
    },
}

impl ChangeRecord {
    pub fn node(&self) -> NodeId {
        match self {
            ChangeRecord::Attach { node }
            | ChangeRecord::Detach { node }
            | ChangeRecord::Put { node, .. }
            | ChangeRecord::Remove { node, .. }
            | ChangeRecord::Splice { node, .. }
            | ChangeRecord::Set { node, .. } => *node,
        }
    }

    /// Feature id, or `None` for node-level records.
    pub fn feature(&self) -> Option<u32> {
        match self {
            ChangeRecord::Attach { .. } | ChangeRecord::Detach { .. } => None,
            ChangeRecord::Put { feature, .. }
            | ChangeRecord::Remove { feature, .. }
            | ChangeRecord::Splice { feature, .. }
            | ChangeRecord::Set { feature, .. } => Some(*feature),
        }
    }
}
