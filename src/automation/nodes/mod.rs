//! Node types, their registry and the builtin service

pub mod node_types;
pub mod registry;
pub mod scripted;

pub use node_types::{builtin_types, has_node_on_edge, BuiltinNodeType, NodeKind, NodeType};
pub use registry::NodeTypeRegistry;
pub use scripted::{ScriptedConfig, ScriptedService};
