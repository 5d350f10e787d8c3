//! Merges renderer-originated property values into the tree.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::feature::{FeatureKind, FeatureShape};
use crate::node::NodeId;
use crate::tree::{PropertyChange, StateTree};

/// A property value read back by the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyUpdate {
    pub node: NodeId,
    pub feature: u32,
    pub property: String,
    pub value: Value,
}

/// Malformed input from the renderer. Fatal for the session that sent it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unknown feature id {0}")]
    UnknownFeature(u32),

    #[error("feature {kind:?} (id {id}) does not hold properties")]
    NotAMap { kind: FeatureKind, id: u32 },

    #[error("client batch {received} out of order, expected {expected}")]
    OutOfOrder { expected: u64, received: u64 },

    #[error("client batch has {count} updates, limit is {limit}")]
    BatchTooLarge { count: usize, limit: usize },
}

#[derive(Debug, Clone, Default)]
pub struct ApplierConfig {
    /// Reject element property updates not listed in the node's
    /// `SynchronizedProperties`.
    pub enforce_sync_allowlist: bool,
}

/// What happened to a single update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The tree already held this value.
    Unchanged,
    /// Target node is gone or detached; dropped.
    Stale,
    /// Property is not synchronized; dropped.
    Rejected,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplierStats {
    pub applied: u64,
    pub unchanged: u64,
    pub stale: u64,
    pub rejected: u64,
}

#[derive(Debug, Default)]
pub struct ClientUpdateApplier {
    config: ApplierConfig,
    stats: ApplierStats,
}

impl ClientUpdateApplier {
    pub fn new(config: ApplierConfig) -> Self {
        Self {
            config,
            stats: ApplierStats::default(),
        }
    }

    pub fn config(&self) -> &ApplierConfig {
        &self.config
    }

    pub fn stats(&self) -> &ApplierStats {
        &self.stats
    }

    /// Apply one update. On error the tree is untouched.
    pub fn apply(
        &mut self,
        tree: &mut StateTree,
        update: PropertyUpdate,
    ) -> Result<ApplyOutcome, ProtocolError> {
        let kind = resolve_map_feature(update.feature)?;
        let outcome = self.apply_resolved(tree, kind, update);
        match outcome {
            ApplyOutcome::Applied => self.stats.applied += 1,
            ApplyOutcome::Unchanged => self.stats.unchanged += 1,
            ApplyOutcome::Stale => self.stats.stale += 1,
            ApplyOutcome::Rejected => self.stats.rejected += 1,
        }
        Ok(outcome)
    }

    /// Apply updates in order. Every feature id is checked first, so a bad
    /// batch leaves the tree untouched.
    pub fn apply_batch(
        &mut self,
        tree: &mut StateTree,
        updates: Vec<PropertyUpdate>,
    ) -> Result<Vec<ApplyOutcome>, ProtocolError> {
        for update in &updates {
            resolve_map_feature(update.feature)?;
        }
        updates
            .into_iter()
            .map(|update| self.apply(tree, update))
            .collect()
    }

    fn apply_resolved(
        &self,
        tree: &mut StateTree,
        kind: FeatureKind,
        update: PropertyUpdate,
    ) -> ApplyOutcome {
        let PropertyUpdate {
            node,
            property,
            value,
            ..
        } = update;

        if !tree.is_attached(node) {
            log::debug!("dropping stale update of {property:?} for detached node {node}");
            return ApplyOutcome::Stale;
        }

        if self.config.enforce_sync_allowlist
            && kind == FeatureKind::ElementProperties
            && !is_synchronized(tree, node, &property)
        {
            log::warn!("rejecting update of unsynchronized property {property:?} on {node}");
            return ApplyOutcome::Rejected;
        }

        let Some(old_value) = tree.write_unlogged(node, kind, &property, value.clone()) else {
            return ApplyOutcome::Unchanged;
        };
        tree.fire_property_change(PropertyChange {
            node,
            feature: kind,
            property,
            old_value,
            value: Some(value),
            from_client: true,
        });
        ApplyOutcome::Applied
    }
}

fn resolve_map_feature(id: u32) -> Result<FeatureKind, ProtocolError> {
    let kind = FeatureKind::from_id(id).ok_or(ProtocolError::UnknownFeature(id))?;
    if kind.shape() != FeatureShape::Map {
        return Err(ProtocolError::NotAMap { kind, id });
    }
    Ok(kind)
}

fn is_synchronized(tree: &StateTree, node: NodeId, property: &str) -> bool {
    tree.list_ref(node, FeatureKind::SynchronizedProperties)
        .is_some_and(|list| {
            list.items()
                .iter()
                .any(|item| item.as_value().and_then(Value::as_str) == Some(property))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::ChangeCollector;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn update(node: NodeId, feature: u32, property: &str, value: Value) -> PropertyUpdate {
        PropertyUpdate {
            node,
            feature,
            property: property.into(),
            value,
        }
    }

    fn attached_tree() -> (StateTree, NodeId, ChangeCollector) {
        let mut tree = StateTree::new();
        let node = tree.create_node();
        tree.append_child(tree.root(), node);
        let mut collector = ChangeCollector::new();
        collector.flush(&mut tree);
        (tree, node, collector)
    }

    #[test]
    fn test_applied_value_is_not_echoed() {
        let (mut tree, node, mut collector) = attached_tree();
        let mut applier = ClientUpdateApplier::default();

        let outcome = applier
            .apply(&mut tree, update(node, 1, "value", json!("typed")))
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied);
        assert_eq!(
            tree.map_ref(node, FeatureKind::ElementProperties).unwrap().get("value"),
            Some(&json!("typed"))
        );
        assert!(collector.flush(&mut tree).is_empty());
    }

    #[test]
    fn test_same_value_is_unchanged() {
        let (mut tree, node, _) = attached_tree();
        let mut applier = ClientUpdateApplier::default();
        applier.apply(&mut tree, update(node, 1, "v", json!(1))).unwrap();
        let outcome = applier.apply(&mut tree, update(node, 1, "v", json!(1))).unwrap();
        assert_eq!(outcome, ApplyOutcome::Unchanged);
        assert_eq!(applier.stats().unchanged, 1);
    }

    #[test]
    fn test_unknown_feature_is_protocol_error() {
        let (mut tree, node, mut collector) = attached_tree();
        let mut applier = ClientUpdateApplier::default();
        let err = applier
            .apply(&mut tree, update(node, 99, "value", json!(1)))
            .unwrap_err();
        assert_eq!(err, ProtocolError::UnknownFeature(99));
        assert!(!tree.has_feature(node, FeatureKind::ElementProperties));
        assert!(collector.flush(&mut tree).is_empty());
    }

    #[test]
    fn test_list_feature_is_protocol_error() {
        let (mut tree, node, _) = attached_tree();
        let mut applier = ClientUpdateApplier::default();
        let err = applier
            .apply(&mut tree, update(node, 11, "x", json!(1)))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::NotAMap { id: 11, .. }));
    }

    #[test]
    fn test_bad_batch_applies_nothing() {
        let (mut tree, node, _) = attached_tree();
        let mut applier = ClientUpdateApplier::default();
        let result = applier.apply_batch(
            &mut tree,
            vec![
                update(node, 1, "first", json!(1)),
                update(node, 1000, "second", json!(2)),
            ],
        );
        assert!(result.is_err());
        assert!(!tree.has_feature(node, FeatureKind::ElementProperties));
    }

    #[test]
    fn test_detached_node_is_stale() {
        let (mut tree, node, _) = attached_tree();
        tree.remove_child(tree.root(), node);
        let mut applier = ClientUpdateApplier::default();
        let outcome = applier.apply(&mut tree, update(node, 1, "v", json!(1))).unwrap();
        assert_eq!(outcome, ApplyOutcome::Stale);
        assert!(!tree.has_feature(node, FeatureKind::ElementProperties));

        let missing = NodeId::new(4242);
        let outcome = applier.apply(&mut tree, update(missing, 1, "v", json!(1))).unwrap();
        assert_eq!(outcome, ApplyOutcome::Stale);
        assert_eq!(applier.stats().stale, 2);
    }

    #[test]
    fn test_listener_changes_are_sent() {
        let (mut tree, node, mut collector) = attached_tree();
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            tree.add_property_listener(node, "value", move |tree, change| {
                seen.lock().unwrap().push(change.clone());
                let upper = change
                    .value
                    .as_ref()
                    .and_then(Value::as_str)
                    .map(str::to_uppercase)
                    .unwrap_or_default();
                tree.map(change.node, FeatureKind::ElementAttributes)
                    .put("title", upper);
            });
        }

        let mut applier = ClientUpdateApplier::default();
        applier
            .apply(&mut tree, update(node, 1, "value", json!("abc")))
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].from_client);
        assert_eq!(seen[0].old_value, None);

        let records = collector.flush(&mut tree);
        assert_eq!(
            records,
            vec![crate::ChangeRecord::Put {
                node,
                feature: 3,
                key: "title".into(),
                value: json!("ABC"),
            }]
        );
    }

    #[test]
    fn test_client_update_reaches_derived_listeners() {
        let (mut tree, node, mut collector) = attached_tree();
        tree.add_property_listener(node, "value", |tree, change| {
            if let Some(value) = change.value.clone() {
                tree.set_property(change.node, "derived", value);
            }
        });
        let derived = Arc::new(Mutex::new(0));
        {
            let derived = Arc::clone(&derived);
            tree.add_property_listener(node, "derived", move |_, _| {
                *derived.lock().unwrap() += 1;
            });
        }

        tree.set_property(node, "value", "direct");
        assert_eq!(*derived.lock().unwrap(), 1);
        collector.flush(&mut tree);

        let mut applier = ClientUpdateApplier::default();
        applier
            .apply(&mut tree, update(node, 1, "value", json!("typed")))
            .unwrap();
        assert_eq!(*derived.lock().unwrap(), 2);
        assert_eq!(
            collector.flush(&mut tree),
            vec![crate::ChangeRecord::Put {
                node,
                feature: 1,
                key: "derived".into(),
                value: json!("typed"),
            }]
        );
    }

    #[test]
    fn test_allowlist_rejects_unsynchronized_property() {
        let (mut tree, node, _) = attached_tree();
        tree.list(node, FeatureKind::SynchronizedProperties).push("value");
        let mut applier = ClientUpdateApplier::new(ApplierConfig {
            enforce_sync_allowlist: true,
        });

        let ok = applier.apply(&mut tree, update(node, 1, "value", json!("a"))).unwrap();
        let rejected = applier.apply(&mut tree, update(node, 1, "secret", json!("b"))).unwrap();
        assert_eq!(ok, ApplyOutcome::Applied);
        assert_eq!(rejected, ApplyOutcome::Rejected);

        let props = tree.map_ref(node, FeatureKind::ElementProperties).unwrap();
        assert!(props.contains_key("value"));
        assert!(!props.contains_key("secret"));
    }
}
