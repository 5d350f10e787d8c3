//! # treesync-core: Server-side state tree with incremental sync
//!
//! Holds the authoritative tree of nodes and their typed features, records
//! every mutation, and turns pending changes into ordered records for a remote
//! renderer. Values read back by the renderer are merged in without being
//! echoed.
//!
//! ## Architecture
//!
//! ```text
//!  application code            renderer
//!        │                        ▲   │
//!        ▼ map()/list()/...       │   │ PropertyUpdate
//! ┌─────────────┐  flush   ┌──────┴───┴──┐
//! │ StateTree   ├─────────►│ChangeRecord │
//! │ (arena +    │          │ stream      │
//! │  dirty set) │◄─────────┤             │
//! └──────┬──────┘  apply   └─────────────┘
//!        │   ClientUpdateApplier
//!        ▼
//! ┌─────────────┐        ┌──────────────────────────────┐
//! │ Feature     │        │ SynchronizedPropertyResolver │
//! │ (map/list/  │        │ type → property → events     │
//! │  scalar)    │        └──────────────────────────────┘
//! └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`feature`]: Feature kinds, the wire id registry, payloads
//! - [`tree`]: Node arena, structure, listeners, mutation handles
//! - [`collector`]: Dirty-set flush into [`ChangeRecord`]s
//! - [`applier`]: Renderer property updates
//! - [`resolver`]: Synchronized property metadata per component type
//! - [`replica`]: Renderer-side mirror used to check record streams

pub mod applier;
pub mod change;
pub mod collector;
pub mod element;
pub mod feature;
pub mod listener;
pub mod node;
pub mod replica;
pub mod resolver;
pub mod tree;

pub use applier::{
    ApplierConfig, ApplierStats, ApplyOutcome, ClientUpdateApplier, PropertyUpdate, ProtocolError,
};
pub use change::ChangeRecord;
pub use collector::{ChangeCollector, CollectorStats};
pub use feature::{
    Feature, FeatureData, FeatureKind, FeatureRegistry, FeatureShape, ListItem, NodeList, NodeMap,
    ScalarSlot,
};
pub use listener::ListenerId;
pub use node::{NodeId, StateNode, SyncState};
pub use replica::{Replica, ReplicaError, ReplicaFeature, ReplicaNode};
pub use resolver::{
    Accessor, Component, Synchronize, SynchronizedProperties, SynchronizedPropertyInfo,
    SynchronizedPropertyResolver, TypeDescriptor, TypeKind,
};
pub use tree::{
    AttachEvent, AttachPhase, ListFeature, MapFeature, PropertyChange, ScalarFeature, StateTree,
    ROOT_ID,
};
