//! Turns the tree's pending changes into an ordered list of records.

use rustc_hash::FxHashSet;

use crate::change::ChangeRecord;
use crate::node::{NodeId, SyncState};
use crate::tree::StateTree;

/// Running totals across flushes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectorStats {
    pub flushes: u64,
    pub records: u64,
    pub nodes_visited: u64,
}

#[derive(Debug, Default)]
pub struct ChangeCollector {
    stats: CollectorStats,
}

impl ChangeCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &CollectorStats {
        &self.stats
    }

    /// Drain every pending change of `tree`.
    ///
    /// Dirty nodes are visited in id order, except that a dirty ancestor is
    /// always emitted before its dirty descendants. A second flush without
    /// intervening mutations returns nothing.
    pub fn flush(&mut self, tree: &mut StateTree) -> Vec<ChangeRecord> {
        let dirty = tree.take_dirty();
        let mut records = Vec::new();
        let mut done = FxHashSet::default();

        for &id in &dirty {
            if done.contains(&id) {
                continue;
            }
            let mut chain = vec![id];
            let mut cursor = tree.parent(id);
            while let Some(ancestor) = cursor {
                if dirty.contains(&ancestor) && !done.contains(&ancestor) {
                    chain.push(ancestor);
                }
                cursor = tree.parent(ancestor);
            }
            for node in chain.into_iter().rev() {
                if done.insert(node) {
                    emit_node(tree, node, &mut records);
                }
            }
        }

        for node in tree.take_released() {
            records.push(ChangeRecord::Detach { node });
        }

        self.stats.flushes += 1;
        self.stats.nodes_visited += done.len() as u64;
        self.stats.records += records.len() as u64;
        if !records.is_empty() {
            log::debug!(
                "flushed {} record(s) from {} node(s)",
                records.len(),
                done.len()
            );
        }
        records
    }
}

fn emit_node(tree: &mut StateTree, id: NodeId, out: &mut Vec<ChangeRecord>) {
    let Some(node) = tree.node_mut(id) else {
        return;
    };
    match (node.attached, node.sync) {
        (true, SyncState::Unsent) => {
            out.push(ChangeRecord::Attach { node: id });
            for feature in node.features.values_mut() {
                feature.collect_full(out);
            }
            node.sync = SyncState::Sent;
        }
        (true, SyncState::Sent) => {
            for feature in node.features.values_mut() {
                feature.collect_changes(out);
            }
        }
        (false, SyncState::Sent) => {
            out.push(ChangeRecord::Detach { node: id });
            for feature in node.features.values_mut() {
                feature.clear_changes();
            }
            node.sync = SyncState::Unsent;
        }
        (false, SyncState::Unsent) => {
            for feature in node.features.values_mut() {
                feature.clear_changes();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{FeatureKind, ListItem};
    use serde_json::json;

    #[test]
    fn test_first_flush_attaches_root() {
        let mut tree = StateTree::new();
        let mut collector = ChangeCollector::new();
        let records = collector.flush(&mut tree);
        assert_eq!(records, vec![ChangeRecord::Attach { node: tree.root() }]);
        assert!(collector.flush(&mut tree).is_empty());
        assert_eq!(collector.stats().flushes, 2);
    }

    #[test]
    fn test_new_child_emits_attach_with_full_state() {
        let mut tree = StateTree::new();
        let mut collector = ChangeCollector::new();
        collector.flush(&mut tree);

        let child = tree.create_node();
        tree.map(child, FeatureKind::ElementProperties).put("value", "a");
        tree.append_child(tree.root(), child);

        let records = collector.flush(&mut tree);
        assert_eq!(
            records,
            vec![
                ChangeRecord::Splice {
                    node: tree.root(),
                    feature: 2,
                    index: 0,
                    remove: 0,
                    add: vec![ListItem::Node(child)],
                },
                ChangeRecord::Attach { node: child },
                ChangeRecord::Put {
                    node: child,
                    feature: 1,
                    key: "value".into(),
                    value: json!("a"),
                },
            ]
        );
    }

    #[test]
    fn test_parent_precedes_lower_id_child() {
        let mut tree = StateTree::new();
        let mut collector = ChangeCollector::new();
        collector.flush(&mut tree);

        let child = tree.create_node();
        let parent = tree.create_node();
        tree.append_child(parent, child);
        tree.append_child(tree.root(), parent);

        let nodes: Vec<_> = collector
            .flush(&mut tree)
            .iter()
            .filter(|r| matches!(r, ChangeRecord::Attach { .. }))
            .map(ChangeRecord::node)
            .collect();
        assert_eq!(nodes, vec![parent, child]);
    }

    #[test]
    fn test_detach_after_sent() {
        let mut tree = StateTree::new();
        let mut collector = ChangeCollector::new();
        let child = tree.create_node();
        tree.append_child(tree.root(), child);
        collector.flush(&mut tree);

        tree.remove_child(tree.root(), child);
        let records = collector.flush(&mut tree);
        assert!(records.contains(&ChangeRecord::Detach { node: child }));
        assert_eq!(tree.node(child).unwrap().sync_state(), SyncState::Unsent);
    }

    #[test]
    fn test_never_sent_node_removed_before_flush_is_silent() {
        let mut tree = StateTree::new();
        let mut collector = ChangeCollector::new();
        collector.flush(&mut tree);

        let child = tree.create_node();
        tree.append_child(tree.root(), child);
        tree.remove_child(tree.root(), child);

        let records = collector.flush(&mut tree);
        assert!(records.iter().all(|r| r.node() != child));
    }

    #[test]
    fn test_released_sent_node_still_detaches() {
        let mut tree = StateTree::new();
        let mut collector = ChangeCollector::new();
        let child = tree.create_node();
        tree.append_child(tree.root(), child);
        collector.flush(&mut tree);

        tree.remove_child(tree.root(), child);
        tree.release(child);
        let records = collector.flush(&mut tree);
        assert_eq!(records.last(), Some(&ChangeRecord::Detach { node: child }));
    }

    #[test]
    fn test_move_within_window_is_incremental() {
        let mut tree = StateTree::new();
        let mut collector = ChangeCollector::new();
        let a = tree.create_node();
        let b = tree.create_node();
        tree.append_child(tree.root(), a);
        tree.append_child(tree.root(), b);
        collector.flush(&mut tree);

        tree.remove_child(tree.root(), b);
        tree.add_child(a, 0, b);
        let records = collector.flush(&mut tree);
        assert!(records
            .iter()
            .all(|r| !matches!(r, ChangeRecord::Attach { .. } | ChangeRecord::Detach { .. })));
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_transient_child_is_never_referenced() {
        let mut tree = StateTree::new();
        let mut collector = ChangeCollector::new();
        collector.flush(&mut tree);

        let tmp = tree.create_node();
        let keep = tree.create_node();
        tree.append_child(tree.root(), tmp);
        tree.append_child(tree.root(), keep);
        tree.remove_child(tree.root(), tmp);

        let records = collector.flush(&mut tree);
        assert_eq!(
            records,
            vec![
                ChangeRecord::Splice {
                    node: tree.root(),
                    feature: 2,
                    index: 0,
                    remove: 0,
                    add: vec![ListItem::Node(keep)],
                },
                ChangeRecord::Attach { node: keep },
            ]
        );
    }
}
