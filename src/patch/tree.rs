use serde::{Deserialize, Serialize};

use super::types::{Conflict, Node, Operation, PatchStats, RawPatch, Stamp};
use crate::status::TaskConfig;

/// One node of a patch, with the operations that reconcile it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PatchTreeNode {
    #[serde(default)]
    pub base: String,
    #[serde(default)]
    pub node: Node,
    #[serde(default)]
    pub children: Vec<PatchTreeNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_operation: Option<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_operation: Option<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict: Option<Conflict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub move_source_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub move_target_path: Option<String>,
    /// Creation time, only set on the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stamp: Option<Stamp>,
}

impl PatchTreeNode {
    pub fn has_own_operation(&self) -> bool {
        self.data_operation.is_some() || self.path_operation.is_some() || self.conflict.is_some()
    }

    /// True if this node or any descendant carries an operation or conflict.
    pub fn has_operations(&self) -> bool {
        self.has_own_operation() || self.children.iter().any(PatchTreeNode::has_operations)
    }

    /// Flips the direction of every data or path operation in the subtree.
    /// When both are present on a node only the data operation is flipped.
    pub fn reverse_operations(&mut self) {
        if let Some(op) = self.data_operation.as_mut() {
            op.dir = op.dir.reversed();
        } else if let Some(op) = self.path_operation.as_mut() {
            op.dir = op.dir.reversed();
        }
        for child in &mut self.children {
            child.reverse_operations();
        }
    }

    /// Depth-first, parents before children.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a PatchTreeNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    pub fn name(&self) -> &str {
        let path = self.node.path.trim_end_matches('/');
        path.rsplit('/').next().unwrap_or(path)
    }
}

/// A sync history entry, normalized so that directions read left to right
/// whichever endpoint produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    /// Key of the entry in the history page.
    pub timestamp: String,
    pub root: PatchTreeNode,
    pub stats: PatchStats,
    pub error: Option<String>,
}

impl Patch {
    /// Returns `None` for entries without a root. Operations are flipped
    /// when the agent computed the patch from the task's right endpoint.
    pub fn new(raw: RawPatch, config: &TaskConfig, timestamp: impl Into<String>) -> Option<Self> {
        let mut root = raw.root?;
        if raw.stats.source == config.right_uri {
            root.reverse_operations();
        }
        Some(Self {
            timestamp: timestamp.into(),
            root,
            stats: raw.stats,
            error: raw.error,
        })
    }

    pub fn stamp(&self) -> Option<Stamp> {
        self.root.stamp
    }

    pub fn has_operations(&self) -> bool {
        self.root.has_operations()
    }

    pub fn operation_count(&self) -> usize {
        let mut count = 0;
        self.root.walk(&mut |node| {
            if node.has_own_operation() {
                count += 1;
            }
        });
        count
    }

    /// Sorts descending by root stamp; entries without a stamp go last.
    pub fn sort_newest_first(patches: &mut [Patch]) {
        patches.sort_by(|a, b| b.stamp().cmp(&a.stamp()));
    }
}
