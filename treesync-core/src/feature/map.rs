use std::collections::BTreeMap;

use serde_json::Value;

/// Map-shaped feature payload with a per-key change log.
///
/// The log remembers, for every key touched since the last flush, whether the
/// key existed at that flush. That is enough to emit one record per key and
/// to skip keys that were added and removed again in between.
#[derive(Debug, Clone, Default)]
pub struct NodeMap {
    values: BTreeMap<String, Value>,
    changes: BTreeMap<String, bool>,
}

/// Net effect of the log on one key.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MapChange {
    Put(String, Value),
    Remove(String),
}

impl NodeMap {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns `false` when `key` already held an equal value.
    pub(crate) fn put(&mut self, key: String, value: Value, log: bool) -> bool {
        let existed = match self.values.get(&key) {
            Some(current) if *current == value => return false,
            Some(_) => true,
            None => false,
        };
        if log {
            self.changes.entry(key.clone()).or_insert(existed);
        }
        self.values.insert(key, value);
        true
    }

    pub(crate) fn remove(&mut self, key: &str, log: bool) -> Option<Value> {
        let previous = self.values.remove(key)?;
        if log {
            self.changes.entry(key.to_owned()).or_insert(true);
        }
        Some(previous)
    }

    pub(crate) fn clear(&mut self, log: bool) {
        let values = std::mem::take(&mut self.values);
        if log {
            for key in values.into_keys() {
                self.changes.entry(key).or_insert(true);
            }
        }
    }

    pub(crate) fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    pub(crate) fn clear_changes(&mut self) {
        self.changes.clear();
    }

    pub(crate) fn drain_changes(&mut self) -> Vec<MapChange> {
        let changes = std::mem::take(&mut self.changes);
        changes
            .into_iter()
            .filter_map(|(key, existed)| match self.values.get(&key) {
                Some(value) => Some(MapChange::Put(key, value.clone())),
                None if existed => Some(MapChange::Remove(key)),
                None => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_put_logs_once_per_key() {
        let mut map = NodeMap::default();
        map.put("a".into(), json!(1), true);
        map.put("a".into(), json!(2), true);
        assert_eq!(map.drain_changes(), vec![MapChange::Put("a".into(), json!(2))]);
        assert!(!map.has_changes());
    }

    #[test]
    fn test_equal_value_is_not_a_change() {
        let mut map = NodeMap::default();
        assert!(map.put("a".into(), json!("x"), true));
        map.clear_changes();
        assert!(!map.put("a".into(), json!("x"), true));
        assert!(!map.has_changes());
    }

    #[test]
    fn test_added_then_removed_emits_nothing() {
        let mut map = NodeMap::default();
        map.put("tmp".into(), json!(true), true);
        map.remove("tmp", true);
        assert!(map.has_changes());
        assert!(map.drain_changes().is_empty());
    }

    #[test]
    fn test_existing_then_removed_emits_remove() {
        let mut map = NodeMap::default();
        map.put("a".into(), json!(1), true);
        map.clear_changes();
        map.put("a".into(), json!(5), true);
        map.remove("a", true);
        assert_eq!(map.drain_changes(), vec![MapChange::Remove("a".into())]);
    }

    #[test]
    fn test_unlogged_put_leaves_log_empty() {
        let mut map = NodeMap::default();
        assert!(map.put("value".into(), json!("typed"), false));
        assert!(!map.has_changes());
        assert_eq!(map.get("value"), Some(&json!("typed")));
    }

    #[test]
    fn test_clear_logs_every_key() {
        let mut map = NodeMap::default();
        map.put("a".into(), json!(1), false);
        map.put("b".into(), json!(2), false);
        map.clear(true);
        assert!(map.is_empty());
        assert_eq!(
            map.drain_changes(),
            vec![MapChange::Remove("a".into()), MapChange::Remove("b".into())]
        );
    }
}
