//! DOM-flavoured helpers over the raw feature API.

use serde_json::Value;

use crate::feature::FeatureKind;
use crate::node::NodeId;
use crate::tree::{PropertyChange, StateTree};

/// Key of the tag name in `ElementData`.
pub const TAG_KEY: &str = "tag";

impl StateTree {
    /// A detached element node with the given tag.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        let node = self.create_node();
        self.map(node, FeatureKind::ElementData).put(TAG_KEY, tag);
        node
    }

    /// A detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        let node = self.create_node();
        self.set_text(node, text);
        node
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        self.map_ref(node, FeatureKind::ElementData)
            .and_then(|m| m.get(TAG_KEY))
            .and_then(Value::as_str)
    }

    pub fn set_text(&mut self, node: NodeId, text: &str) {
        self.scalar(node, FeatureKind::TextNode)
            .set(Some(Value::from(text)));
    }

    pub fn text(&self, node: NodeId) -> Option<&str> {
        self.scalar_ref(node, FeatureKind::TextNode)
            .and_then(Value::as_str)
    }

    // -- properties ---------------------------------------------------------

    /// Set an element property and notify its listeners if the value changed.
    pub fn set_property(&mut self, node: NodeId, name: &str, value: impl Into<Value>) {
        let value = value.into();
        let mut properties = self.map(node, FeatureKind::ElementProperties);
        let old_value = properties.get(name).cloned();
        if !properties.put(name, value.clone()) {
            return;
        }
        self.fire_property_change(PropertyChange {
            node,
            feature: FeatureKind::ElementProperties,
            property: name.to_owned(),
            old_value,
            value: Some(value),
            from_client: false,
        });
    }

    pub fn remove_property(&mut self, node: NodeId, name: &str) -> Option<Value> {
        let old_value = self.map(node, FeatureKind::ElementProperties).remove(name)?;
        self.fire_property_change(PropertyChange {
            node,
            feature: FeatureKind::ElementProperties,
            property: name.to_owned(),
            old_value: Some(old_value.clone()),
            value: None,
            from_client: false,
        });
        Some(old_value)
    }

    pub fn property(&self, node: NodeId, name: &str) -> Option<&Value> {
        self.map_ref(node, FeatureKind::ElementProperties)
            .and_then(|m| m.get(name))
    }

    pub fn has_property(&self, node: NodeId, name: &str) -> bool {
        self.property(node, name).is_some()
    }

    // -- attributes ---------------------------------------------------------

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        self.map(node, FeatureKind::ElementAttributes).put(name, value);
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) -> Option<Value> {
        self.map(node, FeatureKind::ElementAttributes).remove(name)
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.map_ref(node, FeatureKind::ElementAttributes)
            .and_then(|m| m.get(name))
            .and_then(Value::as_str)
    }

    // -- classes ------------------------------------------------------------

    /// Returns `false` if the class was already present.
    pub fn add_class_name(&mut self, node: NodeId, class: &str) -> bool {
        let mut classes = self.list(node, FeatureKind::ClassList);
        let value = Value::from(class);
        if classes.position_of_value(&value).is_some() {
            return false;
        }
        classes.push(value);
        true
    }

    pub fn remove_class_name(&mut self, node: NodeId, class: &str) -> bool {
        self.list(node, FeatureKind::ClassList)
            .remove_value(&Value::from(class))
    }

    pub fn has_class_name(&self, node: NodeId, class: &str) -> bool {
        let value = Value::from(class);
        self.list_ref(node, FeatureKind::ClassList)
            .is_some_and(|l| l.position_of_value(&value).is_some())
    }

    // -- DOM listeners ------------------------------------------------------

    /// Ask the renderer to report `event`, sending along the given event data
    /// expressions. Expressions accumulate across calls.
    pub fn add_event_listener(&mut self, node: NodeId, event: &str, data: &[&str]) {
        let mut listeners = self.map(node, FeatureKind::ElementListeners);
        let mut expressions: Vec<Value> = listeners
            .get(event)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for expression in data {
            let expression = Value::from(*expression);
            if !expressions.contains(&expression) {
                expressions.push(expression);
            }
        }
        listeners.put(event, Value::Array(expressions));
    }

    pub fn remove_event_listener(&mut self, node: NodeId, event: &str) -> bool {
        self.map(node, FeatureKind::ElementListeners)
            .remove(event)
            .is_some()
    }
}
