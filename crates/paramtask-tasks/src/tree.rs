//! Introspection trees of composed tasks

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use serde::Serialize;
use tracing::{trace, warn};

use crate::task::{Task, TaskId};

/// Kind of a tree node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// A single task
    Task,
    /// A series or parallel composition
    Composite,
}

/// A node of a composition tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    /// Display label: task name and rendered parameters, or `<series>`/`<parallel>`
    pub label: String,
    /// Node kind
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Child nodes, in member order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Create a leaf node
    pub fn leaf(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            kind: NodeKind::Task,
            children: Vec::new(),
        }
    }

    /// Create a composite node
    pub fn composite(label: impl Into<String>, children: Vec<TreeNode>) -> Self {
        Self {
            label: label.into(),
            kind: NodeKind::Composite,
            children,
        }
    }

    /// Number of nodes in this subtree
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(TreeNode::size).sum::<usize>()
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, prefix: &str, last: bool, root: bool) -> fmt::Result {
        if root {
            writeln!(f, "{}", self.label)?;
        } else {
            let branch = if last { "└── " } else { "├── " };
            writeln!(f, "{prefix}{branch}{}", self.label)?;
        }

        let child_prefix = match (root, last) {
            (true, _) => String::new(),
            (false, true) => format!("{prefix}    "),
            (false, false) => format!("{prefix}│   "),
        };
        for (i, child) in self.children.iter().enumerate() {
            child.render(f, &child_prefix, i + 1 == self.children.len(), false)?;
        }
        Ok(())
    }
}

impl fmt::Display for TreeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, "", true, true)
    }
}

/// Side-table of composition trees keyed by task identity.
///
/// Entries hold a clone of the task so its identity stays unique while the
/// entry exists. A disabled registry records nothing and never fails.
#[derive(Debug)]
pub struct TreeRegistry {
    enabled: bool,
    warned: AtomicBool,
    entries: RwLock<HashMap<TaskId, (Task, TreeNode)>>,
}

impl TreeRegistry {
    /// Create a registry
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            warned: AtomicBool::new(false),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry that records nothing
    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record the tree of a task
    pub fn record(&self, task: &Task, node: TreeNode) {
        if !self.enabled {
            if !self.warned.swap(true, Ordering::Relaxed) {
                warn!("composition metadata is disabled; trees will not be recorded");
            }
            return;
        }
        trace!(task = %task.display_name(), nodes = node.size(), "recording tree");
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task.id(), (task.clone(), node));
    }

    /// Recorded tree of a task
    pub fn get(&self, task: &Task) -> Option<TreeNode> {
        if !self.enabled {
            return None;
        }
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&task.id())
            .map(|(_, node)| node.clone())
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TreeRegistry {
    fn default() -> Self {
        Self::new(true)
    }
}
