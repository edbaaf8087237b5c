//! Workflow graph: adjacency structure, blob codec and queries

pub mod labeled;
pub mod store;
pub mod types;

pub use labeled::LabelSource;
pub use types::{Graph, IdMapping, NodeEntry, Outputs, ROOT_KEY};
