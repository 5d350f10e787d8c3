use super::registry::FeatureRegistry;

/// Every feature a [`StateNode`](crate::StateNode) can carry.
///
/// The set is closed: the numeric id of each kind lives in the
/// [`FeatureRegistry`] table and is shared byte-for-byte with the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FeatureKind {
    /// Tag name, visibility and other element-level data.
    ElementData,
    /// DOM properties.
    ElementProperties,
    /// Ordered child elements.
    ElementChildren,
    /// DOM attributes.
    ElementAttributes,
    /// DOM event type → event data expressions sent along with the event.
    ElementListeners,
    PushConfiguration,
    PushConfigurationParameters,
    /// Text content of a text node.
    TextNode,
    PollConfiguration,
    ReconnectDialogConfiguration,
    LoadingIndicatorConfiguration,
    /// CSS class names.
    ClassList,
    /// Inline style declarations.
    ElementStyleProperties,
    /// Properties the client pushes back to the server.
    SynchronizedProperties,
    /// Events that trigger a push of the synchronized properties.
    SynchronizedPropertyEvents,
    ComponentMapping,
    Template,
    TemplateModelMap,
    TemplateOverrides,
    OverrideData,
    ParentGenerator,
    /// Ordered model sub-nodes.
    TemplateModelList,
    PublishedServerEventHandlers,
    PolymerServerEventHandlers,
}

/// Payload family of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureShape {
    /// String keys to JSON values.
    Map,
    /// Ordered JSON values.
    ValueList,
    /// Ordered references to owned child nodes.
    NodeList,
    /// A single optional JSON value.
    Scalar,
}

impl FeatureKind {
    /// All kinds, in wire-id order.
    pub const ALL: [FeatureKind; 24] = [
        FeatureKind::ElementData,
        FeatureKind::ElementProperties,
        FeatureKind::ElementChildren,
        FeatureKind::ElementAttributes,
        FeatureKind::ElementListeners,
        FeatureKind::PushConfiguration,
        FeatureKind::PushConfigurationParameters,
        FeatureKind::TextNode,
        FeatureKind::PollConfiguration,
        FeatureKind::ReconnectDialogConfiguration,
        FeatureKind::LoadingIndicatorConfiguration,
        FeatureKind::ClassList,
        FeatureKind::ElementStyleProperties,
        FeatureKind::SynchronizedProperties,
        FeatureKind::SynchronizedPropertyEvents,
        FeatureKind::ComponentMapping,
        FeatureKind::Template,
        FeatureKind::TemplateModelMap,
        FeatureKind::TemplateOverrides,
        FeatureKind::OverrideData,
        FeatureKind::ParentGenerator,
        FeatureKind::TemplateModelList,
        FeatureKind::PublishedServerEventHandlers,
        FeatureKind::PolymerServerEventHandlers,
    ];

    pub fn shape(self) -> FeatureShape {
        use FeatureKind::*;
        match self {
            ElementChildren | TemplateModelList => FeatureShape::NodeList,
            ClassList
            | SynchronizedProperties
            | SynchronizedPropertyEvents
            | PublishedServerEventHandlers => FeatureShape::ValueList,
            TextNode | ComponentMapping | ParentGenerator => FeatureShape::Scalar,
            ElementData
            | ElementProperties
            | ElementAttributes
            | ElementListeners
            | PushConfiguration
            | PushConfigurationParameters
            | PollConfiguration
            | ReconnectDialogConfiguration
            | LoadingIndicatorConfiguration
            | ElementStyleProperties
            | Template
            | TemplateModelMap
            | TemplateOverrides
            | OverrideData
            | PolymerServerEventHandlers => FeatureShape::Map,
        }
    }

    /// Wire id from the process-wide registry.
    #[inline]
    pub fn id(self) -> u32 {
        FeatureRegistry::global().id_of(self)
    }

    /// Reverse lookup through the process-wide registry.
    #[inline]
    pub fn from_id(id: u32) -> Option<FeatureKind> {
        FeatureRegistry::global().kind_of(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_lists_are_children_and_model_list() {
        let node_lists: Vec<FeatureKind> = FeatureKind::ALL
            .iter()
            .copied()
            .filter(|k| k.shape() == FeatureShape::NodeList)
            .collect();
        assert_eq!(
            node_lists,
            vec![FeatureKind::ElementChildren, FeatureKind::TemplateModelList]
        );
    }

    #[test]
    fn test_all_is_in_id_order() {
        for (position, kind) in FeatureKind::ALL.iter().enumerate() {
            assert_eq!(kind.id() as usize, position, "{kind:?}");
        }
    }
}
