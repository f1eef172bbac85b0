//! A minimal state graph for native tool calling.
//!
//! Nodes take the state by value and return it together with a [`Next`]
//! that says where to go. [`StateGraph`] collects the nodes and their
//! default order, [`CompiledGraph`] runs them.

mod compiled;
mod node;
mod prebuilt;
mod state_graph;

pub use compiled::CompiledGraph;
pub use node::{Next, Node};
pub use prebuilt::{
    CHATBOT, ChatbotNode, MessageObserver, TOOLS, ToolsNode, tool_agent,
    tools_condition,
};
pub use state_graph::StateGraph;

use crate::model_client::ModelError;

/// Errors raised while building or running a graph.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// An edge or a route names a node that was never added.
    #[error("node not found: {0}")]
    NodeNotFound(String),
    /// The graph has no edges to start from.
    #[error("graph has no nodes to run")]
    Empty,
    /// The run did not end within the step limit.
    #[error("graph did not finish within {0} steps")]
    StepLimitExceeded(usize),
    /// The cancellation token fired.
    #[error("graph run cancelled")]
    Cancelled,
    /// A node failed to reach the model.
    #[error("model request failed: {0}")]
    Model(#[from] ModelError),
}
