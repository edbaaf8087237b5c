//! Workflow graph engine: graph store, node types, dispatch and structural edits

pub mod actions;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod graph;
pub mod loader;
pub mod nodes;
pub mod persistence;
pub mod service;
pub mod trash;
pub mod workflow;

pub use actions::{ActionHistory, NodeAction};
pub use config::EngineConfig;
pub use dispatch::DispatchEngine;
pub use graph::Graph;
pub use loader::{build_workflow, WorkflowFixture, WorkflowLoader};
pub use nodes::NodeTypeRegistry;
pub use service::{NodeMove, NodeService, NodeValues, ReplacedNode, UpdatedNode};
pub use workflow::Workflow;
