use async_trait::async_trait;

use super::GraphError;

/// A step in a graph.
///
/// A node receives the current state, returns the updated state and the
/// next hop.
#[async_trait]
pub trait Node<S>: Send + Sync
where
    S: Send + 'static,
{
    /// The unique id of the node inside its graph.
    fn id(&self) -> &str;

    /// Runs the node once.
    async fn run(&self, state: S) -> Result<(S, Next), GraphError>;
}

/// Where a graph goes after a node has run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Next {
    /// Follow the default edge order.
    Continue,
    /// Jump to the node with this id.
    Node(String),
    /// Stop and return the state.
    End,
}
