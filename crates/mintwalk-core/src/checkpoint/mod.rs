//! Resumable crawl snapshots.
//!
//! A [`Checkpoint`] captures the tree, the frontier still to be expanded and
//! the step index after a completed BFS step. [`CheckpointStore`] persists
//! one immutable JSON document per step.

mod document;
mod store;

pub use document::Checkpoint;
pub use store::CheckpointStore;
