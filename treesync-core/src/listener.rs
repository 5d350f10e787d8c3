//! Removable per-node listener registrations.
//!
//! Listeners receive `&mut StateTree`, so during dispatch the tree checks a
//! node's listeners out of the registry, runs them, and hands them back.
//! Registrations added or removed while a node's listeners are checked out
//! are reconciled on [`ListenerRegistry::restore`].
//!
//! Events raised by a listener are queued and dispatched once the current
//! event is done, against the registrations in place at that time.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::node::NodeId;
use crate::tree::StateTree;

/// Callback invoked with the tree and the event.
pub type Listener<E> = Box<dyn FnMut(&mut StateTree, &E) + Send>;

/// Handle returned by `add_*_listener`, used to remove the registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub(crate) type Registration<E> = (ListenerId, Listener<E>);

pub(crate) struct ListenerRegistry<E> {
    next_id: u64,
    by_node: FxHashMap<NodeId, Vec<Registration<E>>>,
    owners: FxHashMap<ListenerId, NodeId>,
    /// Removed while checked out.
    removed: FxHashSet<ListenerId>,
    queued: VecDeque<E>,
    dispatching: bool,
}

impl<E> Default for ListenerRegistry<E> {
    fn default() -> Self {
        Self {
            next_id: 1,
            by_node: FxHashMap::default(),
            owners: FxHashMap::default(),
            removed: FxHashSet::default(),
            queued: VecDeque::new(),
            dispatching: false,
        }
    }
}

impl<E> ListenerRegistry<E> {
    pub fn add(&mut self, node: NodeId, listener: Listener<E>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.by_node.entry(node).or_default().push((id, listener));
        self.owners.insert(id, node);
        id
    }

    /// Returns `false` if the registration no longer exists.
    pub fn remove(&mut self, id: ListenerId) -> bool {
        let Some(node) = self.owners.remove(&id) else {
            return false;
        };
        if let Some(listeners) = self.by_node.get_mut(&node) {
            if let Some(pos) = listeners.iter().position(|(lid, _)| *lid == id) {
                listeners.remove(pos);
                if listeners.is_empty() {
                    self.by_node.remove(&node);
                }
                return true;
            }
        }
        self.removed.insert(id);
        true
    }

    pub fn checkout(&mut self, node: NodeId) -> Vec<Registration<E>> {
        self.by_node.remove(&node).unwrap_or_default()
    }

    pub fn is_removed(&self, id: ListenerId) -> bool {
        self.removed.contains(&id)
    }

    pub fn restore(&mut self, node: NodeId, listeners: Vec<Registration<E>>) {
        let mut kept: Vec<_> = listeners
            .into_iter()
            .filter(|(id, _)| !self.removed.remove(id))
            .collect();
        if let Some(added) = self.by_node.remove(&node) {
            kept.extend(added);
        }
        if !kept.is_empty() {
            self.by_node.insert(node, kept);
        }
    }

    /// Forget checked-out listeners of a node that no longer exists.
    pub fn discard(&mut self, listeners: Vec<Registration<E>>) {
        for (id, _) in listeners {
            self.removed.remove(&id);
            self.owners.remove(&id);
        }
    }

    pub fn drop_node(&mut self, node: NodeId) {
        self.by_node.remove(&node);
        self.owners.retain(|_, owner| *owner != node);
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// Queue `event`. Returns `true` if no dispatch is running, in which case
    /// the caller drains the queue with [`ListenerRegistry::next_queued`].
    pub fn enqueue(&mut self, event: E) -> bool {
        self.queued.push_back(event);
        !std::mem::replace(&mut self.dispatching, true)
    }

    pub fn next_queued(&mut self) -> Option<E> {
        let event = self.queued.pop_front();
        if event.is_none() {
            self.dispatching = false;
        }
        event
    }
}
