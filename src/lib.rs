// SPDX-License-Identifier: MIT

//! Automation workflow graph engine
//!
//! - [`flow`]: node identities, the service seam, the dispatch context and errors
//! - [`automation`]: the graph store, node types, the dispatch engine and the
//!   structural mutations with their undo/redo actions

pub mod automation;
pub mod flow;
