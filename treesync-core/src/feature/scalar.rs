use serde_json::Value;

/// Single-value feature payload.
#[derive(Debug, Clone, Default)]
pub struct ScalarSlot {
    value: Option<Value>,
    changed: bool,
}

impl ScalarSlot {
    pub fn get(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Returns `false` when the slot already held an equal value.
    pub(crate) fn set(&mut self, value: Option<Value>, log: bool) -> bool {
        if self.value == value {
            return false;
        }
        self.value = value;
        self.changed |= log;
        true
    }

    pub(crate) fn has_changes(&self) -> bool {
        self.changed
    }

    pub(crate) fn clear_changes(&mut self) {
        self.changed = false;
    }
}
