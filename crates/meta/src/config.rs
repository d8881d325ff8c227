use crate::error::Result;
use crate::events::{ChangeEvent, ListenerId};
use crate::meta::Meta;
use crate::sealed::SealedMeta;
use crate::tree::{MetaTree, NodeId, NodeMut, NodeRef};

/// A tree whose root collects the change events of the whole tree.
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use meta_tree::{ChangeEvent, Configuration};
///
/// let mut config = Configuration::new("app");
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = Arc::clone(&seen);
/// config.add_listener(move |e: ChangeEvent| sink.lock().unwrap().push(e.path().to_string()));
///
/// config.root_mut().set_value("server.port", 80).unwrap();
/// assert_eq!(*seen.lock().unwrap(), ["server", "server.port"]);
/// ```
#[derive(Debug)]
pub struct Configuration {
    tree: MetaTree,
}

impl Configuration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            tree: MetaTree::new(name),
        }
    }

    pub fn from_meta<M: Meta + ?Sized>(meta: &M) -> Self {
        Self {
            tree: MetaTree::from_meta(meta),
        }
    }

    /// Registers a listener for every change in the tree. Keep the id and
    /// pass it to [`Configuration::remove_listener`] when done.
    pub fn add_listener<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(ChangeEvent) + Send + Sync + 'static,
    {
        self.tree.on_root_change(listener)
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.tree.off_change(id)
    }

    pub fn root(&self) -> NodeRef<'_> {
        self.tree.root()
    }

    pub fn root_mut(&mut self) -> NodeMut<'_> {
        self.tree.root_mut()
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<NodeMut<'_>> {
        self.tree.node_mut(id)
    }

    /// Merges `meta` over the root; see [`NodeMut::update`].
    pub fn update(&mut self, meta: &dyn Meta) -> Result<()> {
        self.tree.root_mut().update(meta)
    }

    pub fn tree(&self) -> &MetaTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut MetaTree {
        &mut self.tree
    }

    pub fn seal(&self) -> SealedMeta {
        self.tree.seal()
    }

    pub fn into_tree(self) -> MetaTree {
        self.tree
    }
}

impl From<MetaTree> for Configuration {
    fn from(tree: MetaTree) -> Self {
        Self { tree }
    }
}
