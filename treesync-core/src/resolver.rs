//! Which element properties the renderer must push back, and on which events.
//!
//! Component types describe themselves with a static [`TypeDescriptor`]: their
//! superclass, implemented interfaces and accessors, some of which carry a
//! [`Synchronize`] declaration. Resolution walks that hierarchy once per type:
//!
//! ```text
//!   Base ── getFoo @sync(bar → baz)
//!    ▲
//!   Sub ─── getFoo @sync(foo → bar)      replaces Base::getFoo
//!           getBaz @sync(foo → bar)      merged by property name
//!
//!   resolved: bar → {foo}
//! ```
//!
//! Types are ordered from most general to most specific, with every interface
//! ahead of every class, so a class declaration outranks an interface one
//! even when the interface is implemented further down the hierarchy.
//! Reducing by accessor name, a declaring override replaces the inherited
//! binding and a plain override keeps it. Distinct accessors naming the same
//! property union their event sets.

use std::any::TypeId;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;

use crate::feature::FeatureKind;
use crate::node::NodeId;
use crate::tree::StateTree;

static CACHE: LazyLock<RwLock<FxHashMap<TypeId, Arc<SynchronizedProperties>>>> =
    LazyLock::new(|| RwLock::new(FxHashMap::default()));

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

/// Marks an accessor's property as pushed back by the renderer on `events`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synchronize {
    events: Vec<String>,
    property: Option<String>,
}

impl Synchronize {
    pub fn on(event: impl Into<String>) -> Self {
        Self::on_events([event])
    }

    /// # Panics
    /// If `events` is empty.
    pub fn on_events<I, S>(events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let events: Vec<String> = events.into_iter().map(Into::into).collect();
        assert!(!events.is_empty(), "a synchronized property needs at least one event");
        Self {
            events,
            property: None,
        }
    }

    /// Override the property name, which otherwise follows the accessor.
    pub fn property(mut self, name: impl Into<String>) -> Self {
        self.property = Some(name.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accessor {
    name: String,
    synchronize: Option<Synchronize>,
}

impl Accessor {
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            synchronize: None,
        }
    }

    pub fn synchronized(name: impl Into<String>, synchronize: Synchronize) -> Self {
        Self {
            name: name.into(),
            synchronize: Some(synchronize),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Class,
    Interface,
}

/// Static description of a component type's accessor hierarchy.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    name: String,
    kind: TypeKind,
    superclass: Option<Arc<TypeDescriptor>>,
    interfaces: Vec<Arc<TypeDescriptor>>,
    accessors: Vec<Accessor>,
}

impl TypeDescriptor {
    pub fn class(name: impl Into<String>) -> Self {
        Self::new(name.into(), TypeKind::Class)
    }

    pub fn interface(name: impl Into<String>) -> Self {
        Self::new(name.into(), TypeKind::Interface)
    }

    fn new(name: String, kind: TypeKind) -> Self {
        Self {
            name,
            kind,
            superclass: None,
            interfaces: Vec::new(),
            accessors: Vec::new(),
        }
    }

    /// # Panics
    /// If `self` is an interface or `superclass` is not a class.
    pub fn extends(mut self, superclass: Arc<TypeDescriptor>) -> Self {
        assert_eq!(self.kind, TypeKind::Class, "interface {} cannot extend a class", self.name);
        assert_eq!(
            superclass.kind,
            TypeKind::Class,
            "{} is not a class",
            superclass.name
        );
        self.superclass = Some(superclass);
        self
    }

    /// # Panics
    /// If `interface` is not an interface.
    pub fn implements(mut self, interface: Arc<TypeDescriptor>) -> Self {
        assert_eq!(
            interface.kind,
            TypeKind::Interface,
            "{} is not an interface",
            interface.name
        );
        self.interfaces.push(interface);
        self
    }

    pub fn accessor(mut self, accessor: Accessor) -> Self {
        self.accessors.push(accessor);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }
}

/// A type whose synchronized properties can be resolved and cached.
pub trait Component: 'static {
    fn descriptor() -> TypeDescriptor;
}

// ---------------------------------------------------------------------------
// Resolved metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynchronizedPropertyInfo {
    pub property: String,
    pub event_names: BTreeSet<String>,
}

/// Resolved set for one component type, sorted by property name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynchronizedProperties {
    infos: Vec<SynchronizedPropertyInfo>,
    by_event: BTreeMap<String, Vec<String>>,
}

impl SynchronizedProperties {
    fn from_map(properties: BTreeMap<String, BTreeSet<String>>) -> Self {
        let mut by_event: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (property, events) in &properties {
            for event in events {
                by_event.entry(event.clone()).or_default().push(property.clone());
            }
        }
        let infos = properties
            .into_iter()
            .map(|(property, event_names)| SynchronizedPropertyInfo {
                property,
                event_names,
            })
            .collect();
        Self { infos, by_event }
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    pub fn get(&self, property: &str) -> Option<&SynchronizedPropertyInfo> {
        self.infos
            .binary_search_by(|info| info.property.as_str().cmp(property))
            .ok()
            .map(|index| &self.infos[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = &SynchronizedPropertyInfo> {
        self.infos.iter()
    }

    /// Properties the renderer reads back when `event` fires.
    pub fn properties_for_event(&self, event: &str) -> &[String] {
        self.by_event.get(event).map(Vec::as_slice).unwrap_or_default()
    }

    /// All events that trigger a push, sorted.
    pub fn events(&self) -> impl Iterator<Item = &str> {
        self.by_event.keys().map(String::as_str)
    }

    /// Add the properties and events to the node's `SynchronizedProperties`
    /// and `SynchronizedPropertyEvents` lists, skipping entries already there.
    pub fn install(&self, tree: &mut StateTree, node: NodeId) {
        append_missing(
            tree,
            node,
            FeatureKind::SynchronizedProperties,
            self.infos.iter().map(|info| info.property.as_str()),
        );
        append_missing(tree, node, FeatureKind::SynchronizedPropertyEvents, self.events());
    }
}

fn append_missing<'a>(
    tree: &mut StateTree,
    node: NodeId,
    kind: FeatureKind,
    names: impl Iterator<Item = &'a str>,
) {
    let mut list = tree.list(node, kind);
    for name in names {
        let value = Value::from(name);
        if list.position_of_value(&value).is_none() {
            list.push(value);
        }
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Process-wide, lazily filled cache of resolved metadata per component type.
pub struct SynchronizedPropertyResolver;

impl SynchronizedPropertyResolver {
    /// Resolve `T`, computing its metadata on first use.
    pub fn resolve<T: Component>() -> Arc<SynchronizedProperties> {
        let type_id = TypeId::of::<T>();
        {
            let cache = CACHE.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(found) = cache.get(&type_id) {
                return Arc::clone(found);
            }
        }

        let descriptor = T::descriptor();
        let resolved = Arc::new(Self::resolve_descriptor(&descriptor));
        log::debug!(
            "resolved {} synchronized properties for {}",
            resolved.len(),
            descriptor.name()
        );

        let mut cache = CACHE.write().unwrap_or_else(PoisonError::into_inner);
        // Another thread may have resolved the same type meanwhile; keep its result.
        Arc::clone(cache.entry(type_id).or_insert(resolved))
    }

    /// Uncached resolution of a descriptor hierarchy.
    pub fn resolve_descriptor(descriptor: &TypeDescriptor) -> SynchronizedProperties {
        let mut ordered = Vec::new();
        let mut seen = FxHashSet::default();
        collect_general_first(descriptor, &mut seen, &mut ordered);

        let mut bindings: BTreeMap<&str, (String, &[String])> = BTreeMap::new();
        for ty in ordered {
            for accessor in &ty.accessors {
                if let Some(sync) = &accessor.synchronize {
                    let property = sync
                        .property
                        .clone()
                        .unwrap_or_else(|| bean_property_name(&accessor.name));
                    bindings.insert(accessor.name.as_str(), (property, sync.events.as_slice()));
                }
            }
        }

        let mut properties: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (property, events) in bindings.into_values() {
            properties
                .entry(property)
                .or_default()
                .extend(events.iter().cloned());
        }
        SynchronizedProperties::from_map(properties)
    }
}

/// Post-order walk: interfaces in declaration order, then the superclass
/// chain, then the type itself. Each type is visited once.
fn collect_general_first<'a>(
    ty: &'a TypeDescriptor,
    seen: &mut FxHashSet<&'a str>,
    out: &mut Vec<&'a TypeDescriptor>,
) {
    if !seen.insert(ty.name.as_str()) {
        return;
    }
    for interface in &ty.interfaces {
        collect_general_first(interface, seen, out);
    }
    if let Some(superclass) = &ty.superclass {
        collect_general_first(superclass, seen, out);
    }
    out.push(ty);
}

/// `getFoo` / `isFoo` → `foo`; other names are kept as they are.
fn bean_property_name(accessor: &str) -> String {
    let stripped = ["get", "is"].iter().find_map(|prefix| {
        accessor
            .strip_prefix(*prefix)
            .filter(|rest| rest.starts_with(|c: char| c.is_uppercase()))
    });
    let Some(stripped) = stripped else {
        return accessor.to_owned();
    };

    let mut chars = stripped.chars();
    match (chars.next(), chars.next()) {
        // Acronyms such as `URL` keep their case.
        (Some(_), Some(second)) if second.is_uppercase() => stripped.to_owned(),
        (Some(first), _) => first
            .to_lowercase()
            .chain(stripped[first.len_utf8()..].chars())
            .collect(),
        (None, _) => String::new(),
    }
}
