use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::node::NodeId;

/// Element of a list feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ListItem {
    Value(Value),
    Node(NodeId),
}

impl ListItem {
    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            ListItem::Node(id) => Some(*id),
            ListItem::Value(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            ListItem::Value(value) => Some(value),
            ListItem::Node(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Splice {
    pub index: usize,
    pub remove: usize,
    pub add: Vec<ListItem>,
}

/// List-shaped feature payload. The change log is the sequence of splices
/// applied since the last flush, replayable in order.
#[derive(Debug, Clone, Default)]
pub struct NodeList {
    items: Vec<ListItem>,
    changes: Vec<Splice>,
}

impl NodeList {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ListItem> {
        self.items.get(index)
    }

    pub fn items(&self) -> &[ListItem] {
        &self.items
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.items.iter().filter_map(ListItem::as_node)
    }

    pub fn position_of_node(&self, node: NodeId) -> Option<usize> {
        self.items.iter().position(|item| item.as_node() == Some(node))
    }

    pub fn position_of_value(&self, value: &Value) -> Option<usize> {
        self.items.iter().position(|item| item.as_value() == Some(value))
    }

    /// # Panics
    /// If `index + remove` runs past the end of the list.
    pub(crate) fn splice(
        &mut self,
        index: usize,
        remove: usize,
        add: Vec<ListItem>,
        log: bool,
    ) -> Vec<ListItem> {
        assert!(
            index + remove <= self.items.len(),
            "splice {index}+{remove} out of bounds for list of length {}",
            self.items.len()
        );
        if log {
            self.log(index, remove, &add);
        }
        self.items.splice(index..index + remove, add).collect()
    }

    fn log(&mut self, index: usize, remove: usize, add: &[ListItem]) {
        // Consecutive insertions at the end of the previous one collapse into one splice.
        if remove == 0 {
            if let Some(last) = self.changes.last_mut() {
                if last.remove == 0 && last.index + last.add.len() == index {
                    last.add.extend_from_slice(add);
                    return;
                }
            }
        }
        self.changes.push(Splice {
            index,
            remove,
            add: add.to_vec(),
        });
    }

    pub(crate) fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    pub(crate) fn clear_changes(&mut self) {
        self.changes.clear();
    }

    /// Take the change log for sending.
    ///
    /// A node that was inserted and removed again since the last flush never
    /// reaches the renderer, so the log must not mention it. In that case the
    /// whole log collapses into one splice replacing the list as it was at
    /// the last flush with the current items.
    pub(crate) fn drain_changes(&mut self) -> Vec<Splice> {
        let changes = std::mem::take(&mut self.changes);
        let transient = changes
            .iter()
            .flat_map(|splice| splice.add.iter())
            .filter_map(ListItem::as_node)
            .any(|node| self.position_of_node(node).is_none());
        if !transient {
            return changes;
        }
        let (added, removed) = changes
            .iter()
            .fold((0, 0), |(a, r), splice| (a + splice.add.len(), r + splice.remove));
        let remove = self.items.len() + removed - added;
        if remove == 0 && self.items.is_empty() {
            return Vec::new();
        }
        vec![Splice {
            index: 0,
            remove,
            add: self.items.clone(),
        }]
    }
}
