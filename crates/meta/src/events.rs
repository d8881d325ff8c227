use std::collections::BTreeMap;

use meta_names::Name;
use meta_values::Value;

use crate::sealed::SealedMeta;
use crate::tree::NodeId;

/// A change observed below a listener-bearing node.
///
/// `path` is relative to the node the listener is registered on, built
/// from qualified names (`x[1].y`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    ValueChanged {
        path: Name,
        old: Option<Value>,
        new: Option<Value>,
    },
    NodeChanged {
        path: Name,
        old: Vec<SealedMeta>,
        new: Vec<SealedMeta>,
    },
}

impl ChangeEvent {
    pub fn path(&self) -> &Name {
        match self {
            ChangeEvent::ValueChanged { path, .. } | ChangeEvent::NodeChanged { path, .. } => path,
        }
    }

    pub(crate) fn with_path(&self, path: Name) -> ChangeEvent {
        match self {
            ChangeEvent::ValueChanged { old, new, .. } => ChangeEvent::ValueChanged {
                path,
                old: old.clone(),
                new: new.clone(),
            },
            ChangeEvent::NodeChanged { old, new, .. } => ChangeEvent::NodeChanged {
                path,
                old: old.clone(),
                new: new.clone(),
            },
        }
    }
}

/// Handle returned by listener registration. Keep it to unregister; a
/// listener that is never released lives as long as its node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

pub(crate) type Listener = Box<dyn FnMut(ChangeEvent) + Send + Sync>;

/// Listener registry shared by all nodes of one tree.
pub(crate) struct Listeners {
    next_listener_id: u64,
    listeners: BTreeMap<u64, (NodeId, Listener)>,
}

impl Listeners {
    pub(crate) fn new() -> Self {
        Self {
            next_listener_id: 1,
            listeners: BTreeMap::new(),
        }
    }

    pub(crate) fn add(&mut self, node: NodeId, listener: Listener) -> ListenerId {
        let id = self.next_listener_id;
        self.next_listener_id = self.next_listener_id.saturating_add(1);
        self.listeners.insert(id, (node, listener));
        ListenerId(id)
    }

    /// Returns the node the listener was registered on.
    pub(crate) fn remove(&mut self, id: ListenerId) -> Option<NodeId> {
        self.listeners.remove(&id.0).map(|(node, _)| node)
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Calls the listener if it is still registered.
    pub(crate) fn notify(&mut self, id: ListenerId, event: ChangeEvent) {
        if let Some((_, listener)) = self.listeners.get_mut(&id.0) {
            listener(event);
        }
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("next_listener_id", &self.next_listener_id)
            .field("count", &self.listeners.len())
            .finish()
    }
}
