//! Lazily loaded folder tree of a remote endpoint, for folder pickers.
//!
//! Nodes live in an arena owned by [`RemoteTree`]; children are owned by
//! index and the parent link is a plain back-reference used for path
//! lookups and change bubbling. Every load bumps the node's generation so a
//! response that arrives after a newer request is discarded.

use std::future::Future;

use tracing::{debug, error};

use crate::error::{ClientError, Result};
use crate::types::TreeEntry;

pub type NodeId = usize;

type TreeObserver = Box<dyn FnMut(NodeId) + Send>;

/// Lists the immediate children of `path` on `endpoint_uri`.
pub trait RemoteLister {
    fn list(
        &self,
        endpoint_uri: &str,
        path: &str,
    ) -> impl Future<Output = Result<Vec<TreeEntry>>> + Send;
}

pub struct TreeNode {
    path: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    loading: bool,
    loaded: bool,
    collapsed: bool,
    generation: u64,
    observer: Option<TreeObserver>,
}

impl TreeNode {
    fn new(path: String, parent: Option<NodeId>) -> Self {
        Self {
            path,
            parent,
            children: Vec::new(),
            loading: false,
            loaded: false,
            collapsed: true,
            generation: 0,
            observer: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_collapsed(&self) -> bool {
        self.collapsed
    }
}

/// Issued by [`RemoteTree::begin_load`]; hand it back with the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub node: NodeId,
    pub generation: u64,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Children applied. `reveal` is the child to descend into next.
    Loaded { reveal: Option<NodeId> },
    /// A newer load was issued for the node; the response was dropped.
    Stale,
}

pub struct RemoteTree<L> {
    lister: L,
    endpoint_uri: String,
    root_label: String,
    nodes: Vec<TreeNode>,
}

impl<L: RemoteLister> RemoteTree<L> {
    pub const ROOT: NodeId = 0;

    pub fn new(lister: L, endpoint_uri: impl Into<String>, root_path: impl Into<String>) -> Self {
        Self {
            lister,
            endpoint_uri: endpoint_uri.into(),
            root_label: "Root".to_string(),
            nodes: vec![TreeNode::new(root_path.into(), None)],
        }
    }

    /// Label shown for a node whose path is empty.
    pub fn with_root_label(mut self, label: impl Into<String>) -> Self {
        self.root_label = label.into();
        self
    }

    pub fn endpoint_uri(&self) -> &str {
        &self.endpoint_uri
    }

    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    pub fn get_path(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(TreeNode::path)
    }

    pub fn get_name(&self, id: NodeId) -> Option<&str> {
        let path = self.node(id)?.path.trim_end_matches('/');
        if path.is_empty() {
            return Some(self.root_label.as_str());
        }
        path.rsplit('/').next()
    }

    /// Looks `path` up among the nodes reachable from the root. Children
    /// dropped by a reload are not reachable.
    pub fn find(&self, path: &str) -> Option<NodeId> {
        let wanted = normalize(path);
        let mut pending = vec![Self::ROOT];
        while let Some(id) = pending.pop() {
            let node = &self.nodes[id];
            if normalize(&node.path) == wanted {
                return Some(id);
            }
            pending.extend(node.children.iter().rev().copied());
        }
        None
    }

    pub fn set_observer(&mut self, id: NodeId, observer: impl FnMut(NodeId) + Send + 'static) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.observer = Some(Box::new(observer));
        }
    }

    /// Returns `None` if `parent` is not a node of this tree.
    pub fn append_child(&mut self, parent: NodeId, path: impl Into<String>) -> Option<NodeId> {
        let id = self.nodes.len();
        self.nodes.get_mut(parent)?.children.push(id);
        self.nodes.push(TreeNode::new(path.into(), Some(parent)));
        Some(id)
    }

    pub fn set_collapsed(&mut self, id: NodeId, collapsed: bool) {
        if let Some(node) = self.nodes.get_mut(id) {
            if node.collapsed != collapsed {
                node.collapsed = collapsed;
                self.notify(id);
            }
        }
    }

    /// Marks the node loading and issues a ticket for the request.
    pub fn begin_load(&mut self, id: NodeId) -> Result<LoadTicket> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| ClientError::validation(format!("unknown tree node {id}")))?;
        node.generation += 1;
        node.loading = true;
        Ok(LoadTicket {
            node: id,
            generation: node.generation,
            path: node.path.clone(),
        })
    }

    /// Applies a listing response. Only collections become children; known
    /// children are kept with their own subtrees.
    pub fn complete_load(
        &mut self,
        ticket: LoadTicket,
        response: Result<Vec<TreeEntry>>,
        initial_path: Option<&str>,
    ) -> Result<LoadOutcome> {
        let id = ticket.node;
        if self.nodes.get(id).map(|n| n.generation) != Some(ticket.generation) {
            debug!("dropping stale listing of '{}'", ticket.path);
            return Ok(LoadOutcome::Stale);
        }

        let entries = match response {
            Ok(entries) => entries,
            Err(e) => {
                error!("cannot list '{}' on {}: {e}", ticket.path, self.endpoint_uri);
                self.nodes[id].loading = false;
                self.notify(id);
                return Err(e);
            }
        };

        let previous = std::mem::take(&mut self.nodes[id].children);
        for entry in entries.into_iter().filter(TreeEntry::is_collection) {
            let known = previous
                .iter()
                .copied()
                .find(|child| normalize(&self.nodes[*child].path) == normalize(&entry.path));
            match known {
                Some(child) => self.nodes[id].children.push(child),
                None => {
                    let _ = self.append_child(id, entry.path);
                }
            }
        }

        let node = &mut self.nodes[id];
        node.loading = false;
        node.loaded = true;
        if node.parent.is_none() || initial_path.is_some() {
            node.collapsed = false;
        }

        let reveal = initial_path.and_then(|target| {
            self.nodes[id]
                .children
                .iter()
                .copied()
                .find(|child| is_strict_ancestor(&self.nodes[*child].path, target))
        });
        self.notify(id);
        Ok(LoadOutcome::Loaded { reveal })
    }

    /// Loads the node's children. With `initial_path`, keeps loading down the
    /// child that leads to it, expanding each level on the way.
    pub async fn load(&mut self, id: NodeId, initial_path: Option<&str>) -> Result<()> {
        let mut current = id;
        loop {
            let ticket = self.begin_load(current)?;
            let response = self.lister.list(&self.endpoint_uri, &ticket.path).await;
            match self.complete_load(ticket, response, initial_path)? {
                LoadOutcome::Loaded { reveal: Some(child) } => current = child,
                LoadOutcome::Loaded { reveal: None } | LoadOutcome::Stale => return Ok(()),
            }
        }
    }

    /// Bubbles a change from `origin` up to the root, then runs the
    /// observers from the root down to `origin`.
    fn notify(&mut self, origin: NodeId) {
        let mut chain = Vec::new();
        let mut cursor = Some(origin);
        while let Some(id) = cursor {
            chain.push(id);
            cursor = self.nodes[id].parent;
        }
        for id in chain.into_iter().rev() {
            if let Some(mut observer) = self.nodes[id].observer.take() {
                observer(origin);
                self.nodes[id].observer = Some(observer);
            }
        }
    }
}

fn normalize(path: &str) -> &str {
    path.trim_matches('/')
}

fn is_strict_ancestor(candidate: &str, target: &str) -> bool {
    let (candidate, target) = (normalize(candidate), normalize(target));
    !candidate.is_empty()
        && target.len() > candidate.len()
        && target.starts_with(candidate)
        && target[candidate.len()..].starts_with('/')
}
