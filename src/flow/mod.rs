//! Core primitives: node identities, services, dispatch context and errors

pub mod context;
pub mod error;
pub mod node;
pub mod service;

pub use context::{DispatchContext, DispatchRecord};
pub use error::{DispatchError, FlowError, GraphError, NodeError, TrashError};
pub use node::{AutomationNode, NodeExport, NodeId, Placement, Position, WorkflowId};
pub use service::{DispatchResult, Edge, Service, ServiceError};
