//! Feature kind ↔ wire id table.
//!
//! The ids below are shared with the renderer. Changing an existing entry is a
//! breaking protocol change; a new kind must take an id that no other kind has
//! ever used.

use std::sync::LazyLock;

use rustc_hash::FxHashMap;

use super::kind::FeatureKind;

/// Published id of every feature kind.
pub const FEATURE_IDS: [(FeatureKind, u32); 24] = [
    (FeatureKind::ElementData, 0),
    (FeatureKind::ElementProperties, 1),
    (FeatureKind::ElementChildren, 2),
    (FeatureKind::ElementAttributes, 3),
    (FeatureKind::ElementListeners, 4),
    (FeatureKind::PushConfiguration, 5),
    (FeatureKind::PushConfigurationParameters, 6),
    (FeatureKind::TextNode, 7),
    (FeatureKind::PollConfiguration, 8),
    (FeatureKind::ReconnectDialogConfiguration, 9),
    (FeatureKind::LoadingIndicatorConfiguration, 10),
    (FeatureKind::ClassList, 11),
    (FeatureKind::ElementStyleProperties, 12),
    (FeatureKind::SynchronizedProperties, 13),
    (FeatureKind::SynchronizedPropertyEvents, 14),
    (FeatureKind::ComponentMapping, 15),
    (FeatureKind::Template, 16),
    (FeatureKind::TemplateModelMap, 17),
    (FeatureKind::TemplateOverrides, 18),
    (FeatureKind::OverrideData, 19),
    (FeatureKind::ParentGenerator, 20),
    (FeatureKind::TemplateModelList, 21),
    (FeatureKind::PublishedServerEventHandlers, 22),
    (FeatureKind::PolymerServerEventHandlers, 23),
];

static GLOBAL: LazyLock<FeatureRegistry> = LazyLock::new(|| {
    FEATURE_IDS
        .iter()
        .fold(FeatureRegistry::builder(), |builder, &(kind, id)| {
            builder.register(kind, id)
        })
        .build()
});

/// Bidirectional feature kind / id mapping.
///
/// Lookups of unregistered kinds panic: they mean the build is inconsistent,
/// not that a peer misbehaved. Unknown *ids* come off the wire and are
/// reported as `None` so callers can turn them into protocol errors.
#[derive(Debug, Clone)]
pub struct FeatureRegistry {
    ids: FxHashMap<FeatureKind, u32>,
    kinds: FxHashMap<u32, FeatureKind>,
}

/// Collects registrations before freezing them into a [`FeatureRegistry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    ids: FxHashMap<FeatureKind, u32>,
    kinds: FxHashMap<u32, FeatureKind>,
}

impl RegistryBuilder {
    /// Register `kind` under `id`.
    ///
    /// # Panics
    /// If the kind or the id is already taken.
    pub fn register(mut self, kind: FeatureKind, id: u32) -> Self {
        if let Some(previous) = self.ids.get(&kind) {
            panic!("feature {kind:?} registered twice (ids {previous} and {id})");
        }
        if let Some(other) = self.kinds.get(&id) {
            panic!("feature id {id} is already used by {other:?}, cannot assign it to {kind:?}");
        }
        self.ids.insert(kind, id);
        self.kinds.insert(id, kind);
        self
    }

    pub fn build(self) -> FeatureRegistry {
        FeatureRegistry {
            ids: self.ids,
            kinds: self.kinds,
        }
    }
}

impl FeatureRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// The process-wide table built from [`FEATURE_IDS`] on first use.
    pub fn global() -> &'static FeatureRegistry {
        &GLOBAL
    }

    /// # Panics
    /// If `kind` was never registered.
    pub fn id_of(&self, kind: FeatureKind) -> u32 {
        match self.ids.get(&kind) {
            Some(id) => *id,
            None => panic!("feature {kind:?} is not registered"),
        }
    }

    pub fn kind_of(&self, id: u32) -> Option<FeatureKind> {
        self.kinds.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Registered pairs sorted by id.
    pub fn entries(&self) -> Vec<(FeatureKind, u32)> {
        let mut entries: Vec<_> = self.ids.iter().map(|(&k, &id)| (k, id)).collect();
        entries.sort_by_key(|&(_, id)| id);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_ids_match_published_values() {
        // Mirrors the renderer's constants; update both sides together.
        let expected = [
            (FeatureKind::ElementData, 0),
            (FeatureKind::ElementProperties, 1),
            (FeatureKind::ElementChildren, 2),
            (FeatureKind::ElementAttributes, 3),
            (FeatureKind::ElementListeners, 4),
            (FeatureKind::PushConfiguration, 5),
            (FeatureKind::PushConfigurationParameters, 6),
            (FeatureKind::TextNode, 7),
            (FeatureKind::PollConfiguration, 8),
            (FeatureKind::ReconnectDialogConfiguration, 9),
            (FeatureKind::LoadingIndicatorConfiguration, 10),
            (FeatureKind::ClassList, 11),
            (FeatureKind::ElementStyleProperties, 12),
            (FeatureKind::SynchronizedProperties, 13),
            (FeatureKind::SynchronizedPropertyEvents, 14),
            (FeatureKind::ComponentMapping, 15),
            (FeatureKind::Template, 16),
            (FeatureKind::TemplateModelMap, 17),
            (FeatureKind::TemplateOverrides, 18),
            (FeatureKind::OverrideData, 19),
            (FeatureKind::ParentGenerator, 20),
            (FeatureKind::TemplateModelList, 21),
            (FeatureKind::PublishedServerEventHandlers, 22),
            (FeatureKind::PolymerServerEventHandlers, 23),
        ];

        let registry = FeatureRegistry::global();
        assert_eq!(
            expected.len(),
            registry.len(),
            "The number of expected features is not up to date"
        );
        for (kind, id) in expected {
            assert_eq!(registry.id_of(kind), id, "Unexpected id for {kind:?}");
            assert_eq!(registry.kind_of(id), Some(kind));
        }
    }

    #[test]
    fn test_every_kind_is_registered() {
        let registry = FeatureRegistry::global();
        for kind in FeatureKind::ALL {
            let _ = registry.id_of(kind);
        }
    }

    #[test]
    fn test_unknown_id_is_none() {
        assert_eq!(FeatureRegistry::global().kind_of(24), None);
        assert_eq!(FeatureRegistry::global().kind_of(u32::MAX), None);
    }

    #[test]
    #[should_panic(expected = "is not registered")]
    fn test_unregistered_kind_panics() {
        let registry = FeatureRegistry::builder()
            .register(FeatureKind::ElementData, 0)
            .build();
        registry.id_of(FeatureKind::ElementProperties);
    }

    #[test]
    #[should_panic(expected = "already used by")]
    fn test_duplicate_id_panics() {
        FeatureRegistry::builder()
            .register(FeatureKind::ElementData, 0)
            .register(FeatureKind::ElementProperties, 0);
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn test_duplicate_kind_panics() {
        FeatureRegistry::builder()
            .register(FeatureKind::ElementData, 0)
            .register(FeatureKind::ElementData, 1);
    }

    #[test]
    fn test_entries_sorted_by_id() {
        let entries = FeatureRegistry::global().entries();
        assert_eq!(entries.len(), 24);
        assert!(entries.windows(2).all(|w| w[0].1 < w[1].1));
    }
}
