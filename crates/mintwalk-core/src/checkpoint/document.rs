use serde::{Deserialize, Serialize};

use crate::error::CheckpointError;
use crate::node::{self, AccountNode, NodeDocument, NodePath};

/// Crawl progress after a completed step.
///
/// `frontier` holds the addresses of every node at depth `step`, in level
/// order; those are the nodes the next step expands. `unexpanded` carries
/// addresses whose transfers could not be fetched in earlier steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub root: AccountNode,
    pub frontier: Vec<String>,
    pub step: u32,
    pub unexpanded: Vec<String>,
}

#[derive(Serialize)]
struct DocumentRef<'a> {
    root: NodeDocument,
    frontier: &'a [String],
    step: u32,
    #[serde(skip_serializing_if = "is_empty")]
    unexpanded: &'a [String],
}

#[derive(Deserialize)]
struct DocumentOwned {
    root: NodeDocument,
    frontier: Vec<String>,
    step: u32,
    #[serde(default)]
    unexpanded: Vec<String>,
}

impl Checkpoint {
    /// Check the invariants and return the tree paths of the frontier nodes.
    pub fn frontier_paths(&self) -> Result<Vec<NodePath>, CheckpointError> {
        frontier_paths(&self.root, &self.frontier, self.step)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, CheckpointError> {
        encode(&self.root, &self.frontier, self.step, &self.unexpanded)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, CheckpointError> {
        let doc: DocumentOwned = serde_json::from_slice(bytes)
            .map_err(|e| CheckpointError::Malformed(format!("invalid checkpoint JSON: {e}")))?;
        let root = node::deserialize(&doc.root)?;

        let checkpoint = Self {
            root,
            frontier: doc.frontier,
            step: doc.step,
            unexpanded: doc.unexpanded,
        };
        checkpoint.frontier_paths()?;
        Ok(checkpoint)
    }
}

/// Pretty JSON for a checkpoint, validated first so an unloadable document
/// is never written.
pub(super) fn encode(
    root: &AccountNode,
    frontier: &[String],
    step: u32,
    unexpanded: &[String],
) -> Result<Vec<u8>, CheckpointError> {
    frontier_paths(root, frontier, step)?;
    let doc = DocumentRef {
        root: node::serialize(root),
        frontier,
        step,
        unexpanded,
    };
    serde_json::to_vec_pretty(&doc)
        .map_err(|e| CheckpointError::Malformed(format!("encode checkpoint: {e}")))
}

fn is_empty(list: &&[String]) -> bool {
    list.is_empty()
}

fn frontier_paths(
    root: &AccountNode,
    frontier: &[String],
    step: u32,
) -> Result<Vec<NodePath>, CheckpointError> {
    let deepest = root.max_depth();
    if deepest > step {
        return Err(CheckpointError::Malformed(format!(
            "tree reaches depth {deepest} but checkpoint step is {step}"
        )));
    }

    let paths = root.level_paths(step);
    let level: Vec<&str> = paths
        .iter()
        .filter_map(|path| root.node_at(path))
        .map(AccountNode::address)
        .collect();
    let matches = level.len() == frontier.len()
        && level.iter().zip(frontier).all(|(a, b)| *a == b.as_str());
    if !matches {
        return Err(CheckpointError::Malformed(format!(
            "frontier of {} addresses does not match the {} nodes at depth {step}",
            frontier.len(),
            level.len()
        )));
    }
    Ok(paths)
}
