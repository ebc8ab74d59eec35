//! The BFS tree model and its serialized document form.
//!
//! An [`AccountNode`] exclusively owns its children, so the crawl result is a
//! tree: an address reached through two different parents appears twice.
//! Nodes are addressed during a crawl by [`NodePath`], the sequence of child
//! indices leading from the root.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::CheckpointError;

// ==============================================================================
// Account Node
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountNode {
    address: String,
    depth: u32,
    children: Vec<AccountNode>,
}

/// Child-index path from the root to a node. The empty path is the root.
pub type NodePath = Vec<usize>;

impl AccountNode {
    /// Create a root node (depth 0).
    pub fn root(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            depth: 0,
            children: Vec::new(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn children(&self) -> &[AccountNode] {
        &self.children
    }

    /// Append a child one level below this node and return its index.
    pub fn add_child(&mut self, address: impl Into<String>) -> usize {
        self.children.push(Self {
            address: address.into(),
            depth: self.depth + 1,
            children: Vec::new(),
        });
        self.children.len() - 1
    }

    pub fn node_at(&self, path: &[usize]) -> Option<&AccountNode> {
        path.iter()
            .try_fold(self, |node, &idx| node.children.get(idx))
    }

    pub fn node_at_mut(&mut self, path: &[usize]) -> Option<&mut AccountNode> {
        path.iter()
            .try_fold(self, |node, &idx| node.children.get_mut(idx))
    }

    /// Total number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Self::node_count).sum::<usize>()
    }

    /// Depth of the deepest node in this subtree.
    pub fn max_depth(&self) -> u32 {
        self.children
            .iter()
            .map(Self::max_depth)
            .max()
            .unwrap_or(self.depth)
    }

    /// Every distinct address in the subtree.
    pub fn addresses(&self) -> HashSet<String> {
        let mut seen = HashSet::new();
        self.walk(&mut |node| {
            seen.insert(node.address.clone());
        });
        seen
    }

    /// `(parent, child)` address pairs in pre-order. This is the edge list
    /// handed to graph tooling downstream of the crawl.
    pub fn edges(&self) -> Vec<(String, String)> {
        let mut edges = Vec::new();
        self.walk(&mut |node| {
            for child in &node.children {
                edges.push((node.address.clone(), child.address.clone()));
            }
        });
        edges
    }

    /// Paths of all nodes at `depth`, in level (BFS) order.
    pub fn level_paths(&self, depth: u32) -> Vec<NodePath> {
        let mut out = Vec::new();
        let mut queue: VecDeque<(NodePath, &AccountNode)> = VecDeque::new();
        queue.push_back((Vec::new(), self));

        while let Some((path, node)) = queue.pop_front() {
            if node.depth == depth {
                out.push(path);
                continue;
            }
            for (idx, child) in node.children.iter().enumerate() {
                let mut child_path = path.clone();
                child_path.push(idx);
                queue.push_back((child_path, child));
            }
        }
        out
    }

    fn walk(&self, visit: &mut impl FnMut(&AccountNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

// ==============================================================================
// Document Form
// ==============================================================================

/// Nested JSON form of an [`AccountNode`] tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDocument {
    #[serde(default)]
    pub address: String,
    pub depth: u32,
    #[serde(default)]
    pub children: Vec<NodeDocument>,
}

pub fn serialize(node: &AccountNode) -> NodeDocument {
    NodeDocument {
        address: node.address.clone(),
        depth: node.depth,
        children: node.children.iter().map(serialize).collect(),
    }
}

/// Rebuild a tree from its document form, rejecting depth fields that
/// disagree with the nesting level and empty addresses.
pub fn deserialize(doc: &NodeDocument) -> Result<AccountNode, CheckpointError> {
    deserialize_at(doc, 0)
}

fn deserialize_at(doc: &NodeDocument, expected_depth: u32) -> Result<AccountNode, CheckpointError> {
    if doc.address.trim().is_empty() {
        return Err(CheckpointError::Malformed(format!(
            "node at depth {expected_depth} has a missing or empty address"
        )));
    }
    if doc.depth != expected_depth {
        return Err(CheckpointError::Malformed(format!(
            "node {} has depth {} but sits at nesting level {expected_depth}",
            doc.address, doc.depth
        )));
    }

    let children = doc
        .children
        .iter()
        .map(|child| deserialize_at(child, expected_depth + 1))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(AccountNode {
        address: doc.address.clone(),
        depth: doc.depth,
        children,
    })
}

// ==============================================================================
// Tests
// ==============================================================================
