//! Arena-backed mutable trees.
//!
//! Every node of a [`MetaTree`] lives in one arena and is addressed by a
//! generational [`NodeId`]. A node records its parent as an id, never as an
//! owning reference; ownership flows strictly from a group to its members.
//! Freed slots bump their generation, so an id that outlived its node fails
//! with [`MetaError::StaleNode`] instead of reaching a recycled slot.
//!
//! Mutations go through [`NodeMut`]. Every mutation that changes state
//! notifies the listeners registered on the mutated node and on each of its
//! ancestors; see [`MetaTree::on_change`].

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use indexmap::IndexMap;
use meta_names::{is_valid_element_name, Name, NameToken, Query};
use meta_values::Value;
use tracing::{debug, trace};

use crate::error::{MetaError, Result};
use crate::events::{ChangeEvent, ListenerId, Listeners};
use crate::merge::{rule_for, MergeRule};
use crate::meta::{qualified_token, select, Meta, MetaRef};
use crate::sealed::{visible, SealedMeta};

static NEXT_ARENA: AtomicU32 = AtomicU32::new(1);

const ROOT_INDEX: u32 = u32::MAX;

/// Address of a node inside one [`MetaTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    arena: u32,
    index: u32,
    generation: u32,
}

#[derive(Debug)]
pub(crate) struct NodeData {
    name: String,
    parent: Option<NodeId>,
    values: IndexMap<String, Value>,
    nodes: IndexMap<String, Vec<NodeId>>,
    listeners: Vec<ListenerId>,
}

impl NodeData {
    fn new(name: String, parent: Option<NodeId>) -> Self {
        Self {
            name,
            parent,
            values: IndexMap::new(),
            nodes: IndexMap::new(),
            listeners: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    data: Option<NodeData>,
}

/// A mutable tree with a designated root and any number of detached nodes.
#[derive(Debug)]
pub struct MetaTree {
    arena: u32,
    root: NodeData,
    slots: Vec<Slot>,
    free: Vec<u32>,
    listeners: Listeners,
}

/// Checks every value and group name of `meta`, recursively.
fn check_names<M: Meta + ?Sized>(meta: &M) -> Result<()> {
    for name in meta.value_names(true) {
        if !is_valid_element_name(name) {
            return Err(MetaError::InvalidName(name.to_string()));
        }
    }
    for name in meta.node_names(true) {
        if !is_valid_element_name(name) {
            return Err(MetaError::InvalidName(name.to_string()));
        }
        for child in meta.local_nodes(name) {
            check_names(&child)?;
        }
    }
    Ok(())
}

fn check_entry(entry: &str) -> Result<()> {
    if entry.is_empty() || !is_valid_element_name(entry) {
        return Err(MetaError::InvalidName(entry.to_string()));
    }
    Ok(())
}

/// The name a node is stored under: its own name, or its `@name` value
/// when the own name is empty.
fn element_name<M: Meta + ?Sized>(meta: &M) -> Result<String> {
    if !meta.name().is_empty() {
        return Ok(meta.name().to_string());
    }
    meta.local_value("@name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .ok_or(MetaError::AnonymousNode)
}

/// The last token of a mutation path, which must not carry a query.
fn leaf_entry<'n>(path: &'n Name, text: &str) -> Result<&'n str> {
    match path.last_token() {
        Some(token) if token.query.is_none() => {
            check_entry(&token.entry)?;
            Ok(&token.entry)
        }
        _ => Err(MetaError::InvalidName(text.to_string())),
    }
}

impl MetaTree {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            arena: NEXT_ARENA.fetch_add(1, Ordering::Relaxed),
            root: NodeData::new(name.into(), None),
            slots: Vec::new(),
            free: Vec::new(),
            listeners: Listeners::new(),
        }
    }

    /// Deep copy of `meta`; the root takes its name.
    pub fn from_meta<M: Meta + ?Sized>(meta: &M) -> Self {
        let mut tree = Self::new(meta.name());
        let root = tree.root_id();
        tree.fill(root, meta);
        tree
    }

    pub fn root_id(&self) -> NodeId {
        NodeId {
            arena: self.arena,
            index: ROOT_INDEX,
            generation: 0,
        }
    }

    pub fn root(&self) -> NodeRef<'_> {
        NodeRef {
            tree: self,
            id: self.root_id(),
            data: &self.root,
        }
    }

    pub fn root_mut(&mut self) -> NodeMut<'_> {
        let id = self.root_id();
        NodeMut { tree: self, id }
    }

    pub fn node(&self, id: NodeId) -> Result<NodeRef<'_>> {
        let data = self.data(id)?;
        Ok(NodeRef {
            tree: self,
            id,
            data,
        })
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<NodeMut<'_>> {
        self.data(id)?;
        Ok(NodeMut { tree: self, id })
    }

    /// Creates a detached node. Attach it with [`NodeMut::attach_node`].
    pub fn create_node(&mut self, name: &str) -> Result<NodeId> {
        check_entry(name)?;
        Ok(self.alloc(name.to_string(), None))
    }

    /// Frees a node and its subtree, detaching it first if needed.
    pub fn release(&mut self, id: NodeId) -> Result<()> {
        if id == self.root_id() {
            return Err(MetaError::RootNode("released"));
        }
        self.detach(id)?;
        self.free_subtree(id);
        debug!(node = ?id, "released subtree");
        Ok(())
    }

    /// Number of live nodes, root and detached nodes included.
    pub fn len(&self) -> usize {
        1 + self.slots.iter().filter(|s| s.data.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        Meta::is_empty(&self.root())
    }

    /// Snapshot of the root subtree.
    pub fn seal(&self) -> SealedMeta {
        self.root().seal()
    }

    /// Registers a listener on `node`. It receives every change made to
    /// `node` or below it, with paths relative to `node`, synchronously and
    /// in registration order. Listeners on deeper nodes run first.
    pub fn on_change<F>(&mut self, node: NodeId, listener: F) -> Result<ListenerId>
    where
        F: FnMut(ChangeEvent) + Send + Sync + 'static,
    {
        self.data(node)?;
        let id = self.listeners.add(node, Box::new(listener));
        self.data_mut(node)?.listeners.push(id);
        Ok(id)
    }

    /// [`MetaTree::on_change`] on the root, which always exists.
    pub fn on_root_change<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(ChangeEvent) + Send + Sync + 'static,
    {
        let root = self.root_id();
        let id = self.listeners.add(root, Box::new(listener));
        self.root.listeners.push(id);
        id
    }

    /// Unregisters a listener. Returns `false` if it was already gone.
    pub fn off_change(&mut self, id: ListenerId) -> bool {
        match self.listeners.remove(id) {
            Some(node) => {
                if let Ok(data) = self.data_mut(node) {
                    data.listeners.retain(|l| *l != id);
                }
                true
            }
            None => false,
        }
    }

    pub(crate) fn data(&self, id: NodeId) -> Result<&NodeData> {
        if id.arena != self.arena {
            return Err(MetaError::StaleNode);
        }
        if id.index == ROOT_INDEX {
            return Ok(&self.root);
        }
        match self.slots.get(id.index as usize) {
            Some(Slot {
                generation,
                data: Some(data),
            }) if *generation == id.generation => Ok(data),
            _ => Err(MetaError::StaleNode),
        }
    }

    fn data_mut(&mut self, id: NodeId) -> Result<&mut NodeData> {
        if id.arena != self.arena {
            return Err(MetaError::StaleNode);
        }
        if id.index == ROOT_INDEX {
            return Ok(&mut self.root);
        }
        match self.slots.get_mut(id.index as usize) {
            Some(Slot {
                generation,
                data: Some(data),
            }) if *generation == id.generation => Ok(data),
            _ => Err(MetaError::StaleNode),
        }
    }

    fn alloc(&mut self, name: String, parent: Option<NodeId>) -> NodeId {
        let data = NodeData::new(name, parent);
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.data = Some(data);
            NodeId {
                arena: self.arena,
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                data: Some(data),
            });
            NodeId {
                arena: self.arena,
                index,
                generation: 0,
            }
        }
    }

    fn free_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if current.arena != self.arena || current.index == ROOT_INDEX {
                continue;
            }
            let Some(slot) = self.slots.get_mut(current.index as usize) else {
                continue;
            };
            if slot.generation != current.generation {
                continue;
            }
            let Some(data) = slot.data.take() else {
                continue;
            };
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(current.index);
            for listener in data.listeners {
                self.listeners.remove(listener);
            }
            stack.extend(data.nodes.into_values().flatten());
        }
    }

    /// Copies the values and groups of `src` into the existing node `id`.
    fn fill<M: Meta + ?Sized>(&mut self, id: NodeId, src: &M) {
        let values: IndexMap<String, Value> = src
            .value_names(true)
            .into_iter()
            .filter_map(|n| {
                src.local_value(n)
                    .map(|v| v.clone().normalize())
                    .filter(|v| !v.is_null())
                    .map(|v| (n.to_string(), v))
            })
            .collect();
        let mut groups = IndexMap::new();
        for group in src.node_names(true) {
            let children: Vec<NodeId> = src
                .local_nodes(group)
                .iter()
                .map(|child| {
                    let child_id = self.alloc(group.to_string(), Some(id));
                    self.fill(child_id, child);
                    child_id
                })
                .collect();
            if !children.is_empty() {
                groups.insert(group.to_string(), children);
            }
        }
        if let Ok(data) = self.data_mut(id) {
            data.values = values;
            data.nodes = groups;
        }
    }

    /// Deep copy of `src` as a new detached node called `name`.
    fn copy_in<M: Meta + ?Sized>(&mut self, src: &M, name: &str) -> NodeId {
        let id = self.alloc(name.to_string(), None);
        self.fill(id, src);
        id
    }

    /// Moves the nodes of another tree into this arena, detached.
    fn move_in(&mut self, other: &mut MetaTree, data: NodeData, name: &str) -> NodeId {
        let id = self.alloc(name.to_string(), None);
        let mut groups = IndexMap::new();
        for (group, children) in data.nodes {
            let mut moved = Vec::with_capacity(children.len());
            for child in children {
                let Some(child_data) = other.take_data(child) else {
                    continue;
                };
                let child_id = self.move_in(other, child_data, &group);
                if let Ok(d) = self.data_mut(child_id) {
                    d.parent = Some(id);
                }
                moved.push(child_id);
            }
            if !moved.is_empty() {
                groups.insert(group, moved);
            }
        }
        if let Ok(d) = self.data_mut(id) {
            d.values = data.values;
            d.nodes = groups;
        }
        id
    }

    fn take_data(&mut self, id: NodeId) -> Option<NodeData> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.data.take()
    }

    fn is_ancestor_or_self(&self, candidate: NodeId, of: NodeId) -> bool {
        let mut current = Some(of);
        while let Some(id) = current {
            if id == candidate {
                return true;
            }
            current = self.data(id).ok().and_then(|d| d.parent);
        }
        false
    }

    /// Position of `id` inside its group and the group size.
    fn group_position(&self, id: NodeId) -> Option<(usize, usize)> {
        let data = self.data(id).ok()?;
        let parent = self.data(data.parent?).ok()?;
        let group = parent.nodes.get(&data.name)?;
        Some((group.iter().position(|c| *c == id)?, group.len()))
    }

    fn token_for(&self, id: NodeId) -> NameToken {
        let name = self.data(id).map(|d| d.name.as_str()).unwrap_or_default();
        match self.group_position(id) {
            Some((index, len)) => qualified_token(name, index, len),
            None => NameToken::new(name),
        }
    }

    fn has_listeners_above(&self, id: NodeId) -> bool {
        if self.listeners.len() == 0 {
            return false;
        }
        let mut current = Some(id);
        while let Some(node) = current {
            match self.data(node) {
                Ok(data) if !data.listeners.is_empty() => return true,
                Ok(data) => current = data.parent,
                Err(_) => return false,
            }
        }
        false
    }

    /// Delivers `event` (path relative to `id`) to `id` and its ancestors.
    fn fire(&mut self, id: NodeId, event: ChangeEvent) {
        let mut deliveries = Vec::new();
        let mut path = event.path().clone();
        let mut current = id;
        while let Ok(data) = self.data(current) {
            if !data.listeners.is_empty() {
                deliveries.push((data.listeners.clone(), path.clone()));
            }
            let Some(parent) = data.parent else {
                break;
            };
            path = Name::from(self.token_for(current)).plus(&path);
            current = parent;
        }
        for (listeners, path) in deliveries {
            trace!(path = %path, listeners = listeners.len(), "delivering change event");
            let scoped = event.with_path(path);
            for listener in listeners {
                self.listeners.notify(listener, scoped.clone());
            }
        }
    }

    fn seal_group(&self, parent: NodeId, entry: &str) -> Vec<SealedMeta> {
        match self.node(parent) {
            Ok(node) => node.nodes(entry).iter().map(|m| m.seal()).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn group_ids(&self, parent: NodeId, entry: &str) -> Result<Vec<NodeId>> {
        Ok(self.data(parent)?.nodes.get(entry).cloned().unwrap_or_default())
    }

    /// Ids selected by `token` among the children of `parent`.
    fn select_children(
        &self,
        parent: NodeId,
        token: &NameToken,
        path: &Name,
    ) -> Result<Vec<NodeId>> {
        let node = self.node(parent)?;
        let selected = select(node.nodes(&token.entry), token.query.as_ref(), path)?;
        Ok(selected
            .into_iter()
            .filter_map(|m| m.as_node().map(NodeRef::id))
            .collect())
    }

    /// Node addressed by every token of `path` but the last. Missing
    /// intermediate nodes are created when `create` is set.
    fn parent_for(&mut self, id: NodeId, path: &Name, create: bool) -> Result<Option<NodeId>> {
        let mut current = id;
        let tokens = path.tokens();
        for token in &tokens[..tokens.len().saturating_sub(1)] {
            let found = self.select_children(current, token, path)?;
            current = match found.first() {
                Some(child) => *child,
                None if create => self.create_child(current, &token.entry)?,
                None => return Ok(None),
            };
        }
        Ok(Some(current))
    }

    fn create_child(&mut self, parent: NodeId, entry: &str) -> Result<NodeId> {
        check_entry(entry)?;
        let child = self.alloc(entry.to_string(), None);
        self.append_children(parent, entry, &[child])?;
        Ok(child)
    }

    fn append_children(&mut self, parent: NodeId, entry: &str, children: &[NodeId]) -> Result<()> {
        if children.is_empty() {
            return Ok(());
        }
        let listening = self.has_listeners_above(parent);
        let old = if listening {
            self.seal_group(parent, entry)
        } else {
            Vec::new()
        };
        for child in children {
            let data = self.data_mut(*child)?;
            data.parent = Some(parent);
            data.name = entry.to_string();
        }
        self.data_mut(parent)?
            .nodes
            .entry(entry.to_string())
            .or_default()
            .extend_from_slice(children);
        debug!(node = ?parent, group = %entry, added = children.len(), "attached child nodes");
        if listening {
            let new = self.seal_group(parent, entry);
            self.fire(
                parent,
                ChangeEvent::NodeChanged {
                    path: Name::single(entry),
                    old,
                    new,
                },
            );
        }
        Ok(())
    }

    /// Replaces group `entry` with `children`; previous members not kept
    /// are freed. An empty list removes the group.
    fn replace_group(&mut self, parent: NodeId, entry: &str, children: Vec<NodeId>) -> Result<()> {
        let previous = self.group_ids(parent, entry)?;
        if previous.is_empty() && children.is_empty() {
            return Ok(());
        }
        let listening = self.has_listeners_above(parent);
        let old = if listening {
            self.seal_group(parent, entry)
        } else {
            Vec::new()
        };
        for child in &children {
            let data = self.data_mut(*child)?;
            data.parent = Some(parent);
            data.name = entry.to_string();
        }
        let kept: HashSet<NodeId> = children.iter().copied().collect();
        {
            let data = self.data_mut(parent)?;
            if children.is_empty() {
                data.nodes.shift_remove(entry);
            } else if let Some(group) = data.nodes.get_mut(entry) {
                *group = children;
            } else {
                data.nodes.insert(entry.to_string(), children);
            }
        }
        for id in previous {
            if !kept.contains(&id) {
                self.free_subtree(id);
            }
        }
        debug!(node = ?parent, group = %entry, size = kept.len(), "replaced child group");
        if listening {
            let new = self.seal_group(parent, entry);
            if old != new {
                self.fire(
                    parent,
                    ChangeEvent::NodeChanged {
                        path: Name::single(entry),
                        old,
                        new,
                    },
                );
            }
        }
        Ok(())
    }

    /// Removes and frees the given members of group `entry`.
    fn remove_children(&mut self, parent: NodeId, entry: &str, which: &[NodeId]) -> Result<()> {
        if which.is_empty() {
            return Ok(());
        }
        let listening = self.has_listeners_above(parent);
        let old = if listening {
            self.seal_group(parent, entry)
        } else {
            Vec::new()
        };
        let removed: HashSet<NodeId> = which.iter().copied().collect();
        {
            let data = self.data_mut(parent)?;
            if let Some(group) = data.nodes.get_mut(entry) {
                group.retain(|c| !removed.contains(c));
                if group.is_empty() {
                    data.nodes.shift_remove(entry);
                }
            }
        }
        for id in which {
            self.free_subtree(*id);
        }
        debug!(node = ?parent, group = %entry, removed = which.len(), "removed child nodes");
        if listening {
            let new = self.seal_group(parent, entry);
            self.fire(
                parent,
                ChangeEvent::NodeChanged {
                    path: Name::single(entry),
                    old,
                    new,
                },
            );
        }
        Ok(())
    }

    /// Unlinks `id` from its parent without freeing it.
    fn detach(&mut self, id: NodeId) -> Result<()> {
        let (parent, name) = {
            let data = self.data(id)?;
            match data.parent {
                Some(parent) => (parent, data.name.clone()),
                None => return Ok(()),
            }
        };
        let listening = self.has_listeners_above(parent);
        let old = if listening {
            self.seal_group(parent, &name)
        } else {
            Vec::new()
        };
        {
            let data = self.data_mut(parent)?;
            if let Some(group) = data.nodes.get_mut(&name) {
                group.retain(|c| *c != id);
                if group.is_empty() {
                    data.nodes.shift_remove(&name);
                }
            }
        }
        self.data_mut(id)?.parent = None;
        debug!(node = ?id, from = ?parent, "detached node");
        if listening {
            let new = self.seal_group(parent, &name);
            self.fire(
                parent,
                ChangeEvent::NodeChanged {
                    path: Name::single(name),
                    old,
                    new,
                },
            );
        }
        Ok(())
    }

    /// Stores `value` under `entry`; `Null` removes. Equal values and
    /// removal of absent values change nothing and fire nothing.
    fn write_value(&mut self, id: NodeId, entry: &str, value: Value) -> Result<()> {
        let value = value.normalize();
        let old = {
            let data = self.data_mut(id)?;
            let old = data.values.get(entry).cloned();
            if value.is_null() {
                if old.is_none() {
                    return Ok(());
                }
                data.values.shift_remove(entry);
            } else {
                if old.as_ref() == Some(&value) {
                    return Ok(());
                }
                data.values.insert(entry.to_string(), value.clone());
            }
            old
        };
        if self.has_listeners_above(id) {
            let new = (!value.is_null()).then_some(value);
            self.fire(
                id,
                ChangeEvent::ValueChanged {
                    path: Name::single(entry),
                    old,
                    new,
                },
            );
        }
        Ok(())
    }

    fn set_value_at(&mut self, id: NodeId, text: &str, value: Value, append: bool) -> Result<()> {
        let value = value.normalize();
        let path = Name::parse(text)?;
        let entry = leaf_entry(&path, text)?;
        let Some(target) = self.parent_for(id, &path, !value.is_null())? else {
            return Ok(());
        };
        let value = match (append, self.data(target)?.values.get(entry)) {
            (true, Some(old)) => old.clone().append(value),
            _ => value,
        };
        self.write_value(target, entry, value)
    }

    fn remove_node_at(&mut self, id: NodeId, text: &str) -> Result<()> {
        let path = Name::parse(text)?;
        let Some(last) = path.last_token() else {
            return Ok(());
        };
        let Some(parent) = self.parent_for(id, &path, false)? else {
            return Ok(());
        };
        let group = self.group_ids(parent, &last.entry)?;
        let which = match &last.query {
            None => group,
            Some(Query::Index(index)) => group.get(*index).copied().into_iter().collect(),
            Some(Query::Filter(_)) => self.select_children(parent, last, &path)?,
        };
        self.remove_children(parent, &last.entry, &which)
    }

    fn set_node_at<M: Meta>(&mut self, id: NodeId, text: &str, nodes: &[M]) -> Result<()> {
        let path = Name::parse(text)?;
        let entry = leaf_entry(&path, text)?;
        for node in nodes {
            check_names(node)?;
        }
        let Some(parent) = self.parent_for(id, &path, !nodes.is_empty())? else {
            return Ok(());
        };
        let children = nodes.iter().map(|n| self.copy_in(n, entry)).collect();
        self.replace_group(parent, entry, children)
    }

    fn put_node_as<M: Meta + ?Sized>(&mut self, id: NodeId, name: &str, node: &M) -> Result<()> {
        if node.is_empty() {
            return Ok(());
        }
        check_entry(name)?;
        check_names(node)?;
        let child = self.copy_in(node, name);
        self.append_children(id, name, &[child])
    }

    fn check_attachable(&self, parent: NodeId, child: NodeId) -> Result<()> {
        self.data(child)?;
        if child == self.root_id() {
            return Err(MetaError::RootNode("attached"));
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(MetaError::CyclicAttachment);
        }
        Ok(())
    }

    fn attach_as(&mut self, parent: NodeId, name: &str, child: NodeId) -> Result<()> {
        check_entry(name)?;
        self.check_attachable(parent, child)?;
        self.detach(child)?;
        self.append_children(parent, name, &[child])
    }

    fn attach_item(&mut self, parent: NodeId, name: &str, children: &[NodeId]) -> Result<()> {
        check_entry(name)?;
        for child in children {
            self.check_attachable(parent, *child)?;
        }
        for child in children {
            self.detach(*child)?;
        }
        self.replace_group(parent, name, children.to_vec())
    }

    fn attach_tree(&mut self, parent: NodeId, mut other: MetaTree) -> Result<NodeId> {
        let name = element_name(&other.root())?;
        check_entry(&name)?;
        let root = std::mem::replace(&mut other.root, NodeData::new(String::new(), None));
        let child = self.move_in(&mut other, root, &name);
        self.append_children(parent, &name, &[child])?;
        Ok(child)
    }

    fn request_node(&mut self, id: NodeId, text: &str) -> Result<NodeId> {
        let path = Name::parse(text)?;
        let Some(last) = path.last_token() else {
            return Err(MetaError::InvalidName(text.to_string()));
        };
        let Some(parent) = self.parent_for(id, &path, true)? else {
            return Err(MetaError::PathNotFound(text.to_string()));
        };
        match self.select_children(parent, last, &path)?.first() {
            Some(child) => Ok(*child),
            None => self.create_child(parent, &last.entry),
        }
    }

    fn rename(&mut self, id: NodeId, name: &str) -> Result<()> {
        let data = self.data(id)?;
        if data.parent.is_some() {
            return Err(MetaError::RenameOfAttachedNode {
                name: data.name.clone(),
            });
        }
        if id != self.root_id() {
            check_entry(name)?;
        }
        self.data_mut(id)?.name = name.to_string();
        Ok(())
    }

    /// Rewrites node `id` to equal `target` through the notifying setters,
    /// descending into groups that hold a single node on both sides.
    fn apply(&mut self, id: NodeId, target: &SealedMeta) -> Result<()> {
        let current: Vec<String> = self
            .node(id)?
            .value_names(true)
            .into_iter()
            .map(str::to_string)
            .collect();
        for name in &current {
            if target.value(name).is_none() {
                self.write_value(id, name, Value::Null)?;
            }
        }
        for name in target.value_names(true) {
            if let Some(value) = target.value(name) {
                self.write_value(id, name, value.clone())?;
            }
        }

        let groups: Vec<String> = self
            .node(id)?
            .node_names(true)
            .into_iter()
            .map(str::to_string)
            .collect();
        for name in &groups {
            if target.nodes(name).is_empty() {
                self.replace_group(id, name, Vec::new())?;
            }
        }
        for name in target.node_names(true) {
            let wanted = target.nodes(name);
            let existing = self.group_ids(id, name)?;
            if existing.len() == 1 && wanted.len() == 1 {
                self.apply(existing[0], &wanted[0])?;
                continue;
            }
            let same = {
                let node = self.node(id)?;
                let have = node.nodes(name);
                have.len() == wanted.len() && have.iter().zip(wanted).all(|(h, w)| h.seal() == *w)
            };
            if !same {
                let children = wanted.iter().map(|w| self.copy_in(w, name)).collect();
                self.replace_group(id, name, children)?;
            }
        }
        Ok(())
    }

    fn update(&mut self, id: NodeId, meta: &dyn Meta) -> Result<()> {
        check_names(meta)?;
        let current = self.node(id)?.seal();
        let merged = rule_for(meta).merge(meta, &current);
        debug!(node = ?id, "updating node from merge");
        self.apply(id, &merged)
    }

    fn update_node_at<M: Meta>(
        &mut self,
        id: NodeId,
        text: &str,
        rule: &dyn MergeRule,
        elements: &[M],
    ) -> Result<()> {
        let path = Name::parse(text)?;
        let entry = leaf_entry(&path, text)?;
        let Some(parent) = self.parent_for(id, &path, !elements.is_empty())? else {
            return Ok(());
        };
        let existing = self.group_ids(parent, entry)?;
        if existing.is_empty() {
            return self.set_node_at(parent, entry, elements);
        }
        if existing.len() != elements.len() {
            return Err(MetaError::MergeDimensionMismatch {
                expected: existing.len(),
                actual: elements.len(),
            });
        }
        for element in elements {
            check_names(element)?;
        }
        for (child, element) in existing.into_iter().zip(elements) {
            let current = self.node(child)?.seal();
            let merged = rule.merge(element, &current);
            self.apply(child, &merged)?;
        }
        Ok(())
    }
}

impl Meta for MetaTree {
    fn name(&self) -> &str {
        &self.root.name
    }

    fn value_names(&self, include_hidden: bool) -> Vec<&str> {
        self.root().value_names(include_hidden)
    }

    fn node_names(&self, include_hidden: bool) -> Vec<&str> {
        self.root().node_names(include_hidden)
    }

    fn local_value(&self, name: &str) -> Option<&Value> {
        self.root.values.get(name)
    }

    fn local_nodes(&self, name: &str) -> Vec<MetaRef<'_>> {
        self.root().nodes(name)
    }
}

/// Read handle to one node of a [`MetaTree`].
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    tree: &'a MetaTree,
    id: NodeId,
    data: &'a NodeData,
}

impl<'a> NodeRef<'a> {
    pub fn id(self) -> NodeId {
        self.id
    }

    pub fn tree(self) -> &'a MetaTree {
        self.tree
    }

    pub fn name(self) -> &'a str {
        &self.data.name
    }

    pub fn value(self, name: &str) -> Option<&'a Value> {
        self.data.values.get(name)
    }

    pub fn nodes(self, name: &str) -> Vec<MetaRef<'a>> {
        self.child_ids(name)
            .iter()
            .filter_map(|id| self.tree.node(*id).ok().map(MetaRef::Node))
            .collect()
    }

    pub fn child_ids(self, name: &str) -> &'a [NodeId] {
        self.data.nodes.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn value_names(self, include_hidden: bool) -> Vec<&'a str> {
        visible(self.data.values.keys(), include_hidden)
    }

    pub fn node_names(self, include_hidden: bool) -> Vec<&'a str> {
        visible(self.data.nodes.keys(), include_hidden)
    }

    pub fn parent(self) -> Option<NodeRef<'a>> {
        self.tree.node(self.data.parent?).ok()
    }

    pub fn is_attached(self) -> bool {
        self.data.parent.is_some()
    }

    pub fn index_in_group(self) -> Option<usize> {
        self.tree.group_position(self.id).map(|(index, _)| index)
    }

    /// The local name, indexed when the node shares its group.
    pub fn qualified_name(self) -> NameToken {
        self.tree.token_for(self.id)
    }

    /// Qualified names from the topmost ancestor down to this node.
    pub fn full_name(self) -> Name {
        let mut tokens = Vec::new();
        let mut current = Some(self);
        while let Some(node) = current {
            if node.data.parent.is_none() {
                break;
            }
            tokens.push(node.qualified_name());
            current = node.parent();
        }
        tokens.reverse();
        Name::from_tokens(tokens)
    }
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("name", &self.data.name)
            .finish()
    }
}

impl Meta for NodeRef<'_> {
    fn name(&self) -> &str {
        NodeRef::name(*self)
    }

    fn value_names(&self, include_hidden: bool) -> Vec<&str> {
        NodeRef::value_names(*self, include_hidden)
    }

    fn node_names(&self, include_hidden: bool) -> Vec<&str> {
        NodeRef::node_names(*self, include_hidden)
    }

    fn local_value(&self, name: &str) -> Option<&Value> {
        NodeRef::value(*self, name)
    }

    fn local_nodes(&self, name: &str) -> Vec<MetaRef<'_>> {
        NodeRef::nodes(*self, name)
    }
}

/// Mutable handle to one node of a [`MetaTree`].
///
/// ```
/// use meta_tree::{Meta, MetaTree};
///
/// let mut tree = MetaTree::new("config");
/// let mut root = tree.root_mut();
/// root.set_value("device.port", 8080).unwrap();
/// root.put_value("tags", "a").unwrap();
/// root.put_value("tags", "b").unwrap();
///
/// assert_eq!(tree.root().get_value("device.port").unwrap().as_i64(), Some(8080));
/// assert_eq!(tree.root().get_value("tags").unwrap().to_string(), "[a, b]");
/// ```
pub struct NodeMut<'a> {
    tree: &'a mut MetaTree,
    id: NodeId,
}

impl<'a> NodeMut<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn view(&self) -> Result<NodeRef<'_>> {
        self.tree.node(self.id)
    }

    /// Replaces the value at `path`, creating intermediate nodes. `Null`
    /// removes the value.
    pub fn set_value(&mut self, path: &str, value: impl Into<Value>) -> Result<()> {
        self.tree.set_value_at(self.id, path, value.into(), false)
    }

    /// Appends to the value at `path`, or sets it if absent.
    pub fn put_value(&mut self, path: &str, value: impl Into<Value>) -> Result<()> {
        self.tree.set_value_at(self.id, path, value.into(), true)
    }

    pub fn put_values<I>(&mut self, path: &str, values: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let value = Value::list(values.into_iter().map(Into::into));
        self.tree.set_value_at(self.id, path, value, true)
    }

    pub fn remove_value(&mut self, path: &str) -> Result<()> {
        self.tree.set_value_at(self.id, path, Value::Null, false)
    }

    /// Replaces the group at `path` with copies of `nodes`, renamed to the
    /// group name. An empty slice removes the group.
    pub fn set_node<M: Meta>(&mut self, path: &str, nodes: &[M]) -> Result<()> {
        self.tree.set_node_at(self.id, path, nodes)
    }

    /// Appends a copy of `node` to the group named after it. A node with
    /// an empty name needs a string `@name` value. Empty nodes are ignored.
    pub fn put_node<M: Meta + ?Sized>(&mut self, node: &M) -> Result<()> {
        if node.is_empty() {
            return Ok(());
        }
        let name = element_name(node)?;
        self.tree.put_node_as(self.id, &name, node)
    }

    pub fn put_node_as<M: Meta + ?Sized>(&mut self, name: &str, node: &M) -> Result<()> {
        self.tree.put_node_as(self.id, name, node)
    }

    /// Removes the group at `path`; `x[i]` removes one member and
    /// `x[k=v]` every matching member.
    pub fn remove_node(&mut self, path: &str) -> Result<()> {
        self.tree.remove_node_at(self.id, path)
    }

    /// Moves the live node `child` into the group named after it. The node
    /// is detached from its previous parent first.
    pub fn attach_node(&mut self, child: NodeId) -> Result<()> {
        let name = element_name(&self.tree.node(child)?)?;
        self.tree.attach_as(self.id, &name, child)
    }

    pub fn attach_node_as(&mut self, name: &str, child: NodeId) -> Result<()> {
        self.tree.attach_as(self.id, name, child)
    }

    /// Replaces group `name` with the live nodes `children`.
    pub fn attach_node_item(&mut self, name: &str, children: &[NodeId]) -> Result<()> {
        self.tree.attach_item(self.id, name, children)
    }

    /// Moves all nodes of `other` into this tree under this node, without
    /// copying values. Listeners registered in `other` are dropped.
    pub fn attach_tree(&mut self, other: MetaTree) -> Result<NodeId> {
        self.tree.attach_tree(self.id, other)
    }

    /// The first node at `path`, created if missing.
    pub fn request_node(&mut self, path: &str) -> Result<NodeMut<'_>> {
        let id = self.tree.request_node(self.id, path)?;
        Ok(NodeMut {
            tree: &mut *self.tree,
            id,
        })
    }

    /// Renames a detached node.
    pub fn rename(&mut self, name: &str) -> Result<()> {
        self.tree.rename(self.id, name)
    }

    /// Merges `meta` over this node, with `meta` as the main side. The
    /// rule comes from its `@mergeRule` value: `join`, otherwise replace.
    pub fn update(&mut self, meta: &dyn Meta) -> Result<()> {
        self.tree.update(self.id, meta)
    }

    /// Merges each of `elements` over the member at the same position of
    /// the group at `path`. Sizes must match unless the group is absent.
    pub fn update_node<M: Meta>(
        &mut self,
        path: &str,
        rule: &dyn MergeRule,
        elements: &[M],
    ) -> Result<()> {
        self.tree.update_node_at(self.id, path, rule, elements)
    }

    pub fn on_change<F>(&mut self, listener: F) -> Result<ListenerId>
    where
        F: FnMut(ChangeEvent) + Send + Sync + 'static,
    {
        self.tree.on_change(self.id, listener)
    }
}

impl Meta for NodeMut<'_> {
    fn name(&self) -> &str {
        self.tree.data(self.id).map(|d| d.name.as_str()).unwrap_or_default()
    }

    fn value_names(&self, include_hidden: bool) -> Vec<&str> {
        self.view()
            .map(|n| n.value_names(include_hidden))
            .unwrap_or_default()
    }

    fn node_names(&self, include_hidden: bool) -> Vec<&str> {
        self.view()
            .map(|n| n.node_names(include_hidden))
            .unwrap_or_default()
    }

    fn local_value(&self, name: &str) -> Option<&Value> {
        self.tree.data(self.id).ok()?.values.get(name)
    }

    fn local_nodes(&self, name: &str) -> Vec<MetaRef<'_>> {
        self.view().map(|n| n.nodes(name)).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder(tree: &mut MetaTree, node: NodeId) -> Arc<Mutex<Vec<ChangeEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        tree.on_change(node, move |e| sink.lock().unwrap().push(e))
            .unwrap();
        events
    }

    #[test]
    fn test_set_value_creates_intermediate_nodes() {
        let mut tree = MetaTree::new("root");
        tree.root_mut().set_value("a.b.c", 1).unwrap();
        let root = tree.root();
        let a = root.get_meta("a").unwrap().as_node().unwrap();
        assert!(a.is_attached());
        assert_eq!(a.parent().unwrap().id(), tree.root_id());
        assert_eq!(tree.root().get_value("a.b.c").unwrap(), &Value::from(1));
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_set_null_removes() {
        let mut tree = MetaTree::new("root");
        let mut root = tree.root_mut();
        root.set_value("x", 1).unwrap();
        root.set_value("x", Value::Null).unwrap();
        assert!(!tree.root().has_value("x").unwrap());
        // nothing is created for a removal
        tree.root_mut().set_value("a.b", Value::Null).unwrap();
        assert!(!tree.root().has_meta("a").unwrap());
    }

    #[test]
    fn test_value_names_cannot_carry_queries() {
        let mut tree = MetaTree::new("root");
        assert!(matches!(
            tree.root_mut().set_value("x[1]", 1),
            Err(MetaError::InvalidName(_))
        ));
        assert!(matches!(
            tree.root_mut().set_value("a$b", 1),
            Err(MetaError::InvalidName(_))
        ));
    }

    #[test]
    fn test_attach_moves_node() {
        let mut tree = MetaTree::new("root");
        let a = tree.root_mut().request_node("a").unwrap().id();
        let b = tree.root_mut().request_node("b").unwrap().id();
        let c = tree.create_node("c").unwrap();
        tree.node_mut(c).unwrap().set_value("v", 1).unwrap();

        tree.node_mut(a).unwrap().attach_node(c).unwrap();
        assert_eq!(tree.node(c).unwrap().parent().unwrap().id(), a);

        tree.node_mut(b).unwrap().attach_node(c).unwrap();
        assert_eq!(tree.node(c).unwrap().parent().unwrap().id(), b);
        assert!(!tree.root().has_meta("a.c").unwrap());
        assert_eq!(tree.root().get_value("b.c.v").unwrap(), &Value::from(1));
    }

    #[test]
    fn test_attach_rejects_cycles_and_root() {
        let mut tree = MetaTree::new("root");
        let a = tree.root_mut().request_node("a").unwrap().id();
        let b = tree.node_mut(a).unwrap().request_node("b").unwrap().id();
        assert!(matches!(
            tree.node_mut(b).unwrap().attach_node(a),
            Err(MetaError::CyclicAttachment)
        ));
        assert!(matches!(
            tree.node_mut(a).unwrap().attach_node(a),
            Err(MetaError::CyclicAttachment)
        ));
        let root = tree.root_id();
        assert!(matches!(
            tree.node_mut(b).unwrap().attach_node(root),
            Err(MetaError::RootNode(_))
        ));
    }

    #[test]
    fn test_rename_only_when_detached() {
        let mut tree = MetaTree::new("root");
        let a = tree.root_mut().request_node("a").unwrap().id();
        assert!(matches!(
            tree.node_mut(a).unwrap().rename("z"),
            Err(MetaError::RenameOfAttachedNode { name }) if name == "a"
        ));
        let d = tree.create_node("d").unwrap();
        tree.node_mut(d).unwrap().rename("e").unwrap();
        assert_eq!(tree.node(d).unwrap().name(), "e");
    }

    #[test]
    fn test_stale_ids() {
        let mut tree = MetaTree::new("root");
        let a = tree.root_mut().request_node("a").unwrap().id();
        tree.root_mut().remove_node("a").unwrap();
        assert!(matches!(tree.node(a), Err(MetaError::StaleNode)));
        // the slot is recycled under a new generation
        let b = tree.create_node("b").unwrap();
        assert_ne!(a, b);
        assert!(tree.node(a).is_err());

        let other = MetaTree::new("other");
        assert!(matches!(other.node(b), Err(MetaError::StaleNode)));
        assert!(matches!(tree.release(tree.root_id()), Err(MetaError::RootNode(_))));
    }

    #[test]
    fn test_remove_node_by_index_and_filter() {
        let mut tree = MetaTree::new("root");
        let mut root = tree.root_mut();
        for letter in ["a", "b", "c", "b"] {
            let mut ch = MetaTree::new("channel");
            ch.root_mut().set_value("letter", letter).unwrap();
            root.put_node(&ch).unwrap();
        }
        root.remove_node("channel[0]").unwrap();
        assert_eq!(tree.root().meta_list("channel").unwrap().len(), 3);
        tree.root_mut().remove_node("channel[letter=b]").unwrap();
        let root = tree.root();
        let left = root.meta_list("channel").unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].value("letter"), Some(&Value::from("c")));
        // out of range index removes nothing
        tree.root_mut().remove_node("channel[9]").unwrap();
        assert_eq!(tree.root().meta_list("channel").unwrap().len(), 1);
        tree.root_mut().remove_node("channel").unwrap();
        assert!(tree.root().node_names(true).is_empty());
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_put_node_naming() {
        let mut tree = MetaTree::new("root");
        let mut anon = MetaTree::new("");
        anon.root_mut().set_value("v", 1).unwrap();
        assert!(matches!(
            tree.root_mut().put_node(&anon),
            Err(MetaError::AnonymousNode)
        ));
        anon.root_mut().set_value("@name", "named").unwrap();
        tree.root_mut().put_node(&anon).unwrap();
        assert!(tree.root().has_meta("named").unwrap());
        // empty trees are ignored even without a name
        tree.root_mut().put_node(&MetaTree::new("")).unwrap();
        assert_eq!(tree.root().node_names(true), ["named"]);
    }

    #[test]
    fn test_qualified_and_full_names() {
        let mut tree = MetaTree::new("root");
        let x0 = tree.root_mut().request_node("x").unwrap().id();
        assert_eq!(tree.node(x0).unwrap().qualified_name().to_string(), "x");
        let x1 = tree.create_node("x").unwrap();
        tree.root_mut().attach_node(x1).unwrap();
        let y = tree.node_mut(x1).unwrap().request_node("y").unwrap().id();
        assert_eq!(tree.node(x0).unwrap().qualified_name().to_string(), "x[0]");
        assert_eq!(tree.node(y).unwrap().full_name().to_string(), "x[1].y");
        assert_eq!(tree.node(x1).unwrap().index_in_group(), Some(1));
    }

    #[test]
    fn test_events_bubble_with_relative_paths() {
        let mut tree = MetaTree::new("root");
        let x = tree.root_mut().request_node("x").unwrap().id();
        let root = tree.root_id();
        let root_events = recorder(&mut tree, root);
        let x_events = recorder(&mut tree, x);

        tree.node_mut(x).unwrap().set_value("y", 5).unwrap();
        assert_eq!(x_events.lock().unwrap()[0].path().to_string(), "y");
        assert_eq!(root_events.lock().unwrap()[0].path().to_string(), "x.y");
    }

    #[test]
    fn test_no_event_for_noop() {
        let mut tree = MetaTree::new("root");
        tree.root_mut().set_value("a", 1).unwrap();
        let root = tree.root_id();
        let events = recorder(&mut tree, root);
        tree.root_mut().set_value("a", 1).unwrap();
        tree.root_mut().remove_value("missing").unwrap();
        tree.root_mut().remove_node("missing").unwrap();
        tree.root_mut().put_value("a", Value::Null).unwrap();
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_off_change_and_freed_listeners() {
        let mut tree = MetaTree::new("root");
        let a = tree.root_mut().request_node("a").unwrap().id();
        let counter = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&counter);
        let id = tree
            .on_change(a, move |_| *sink.lock().unwrap() += 1)
            .unwrap();
        tree.node_mut(a).unwrap().set_value("v", 1).unwrap();
        assert!(tree.off_change(id));
        assert!(!tree.off_change(id));
        tree.node_mut(a).unwrap().set_value("v", 2).unwrap();
        assert_eq!(*counter.lock().unwrap(), 1);

        let sink = Arc::clone(&counter);
        let id = tree.on_change(a, move |_| *sink.lock().unwrap() += 1).unwrap();
        tree.root_mut().remove_node("a").unwrap();
        assert!(!tree.off_change(id));
    }

    #[test]
    fn test_attach_tree_moves_values() {
        let mut other = MetaTree::new("sub");
        other.root_mut().set_value("deep.v", 3).unwrap();
        let mut tree = MetaTree::new("root");
        let sub = tree.root_mut().attach_tree(other).unwrap();
        assert_eq!(tree.node(sub).unwrap().full_name().to_string(), "sub");
        assert_eq!(tree.root().get_value("sub.deep.v").unwrap(), &Value::from(3));
        assert_eq!(tree.len(), 3);
    }
}
