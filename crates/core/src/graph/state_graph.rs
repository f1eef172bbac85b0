use std::collections::HashMap;

use super::{CompiledGraph, GraphError, Node};

/// Collects nodes and their default order before running.
pub struct StateGraph<S> {
    nodes: HashMap<String, Box<dyn Node<S>>>,
    edge_order: Vec<String>,
}

impl<S: Send + 'static> Default for StateGraph<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Send + 'static> StateGraph<S> {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            edge_order: Vec::new(),
        }
    }

    /// Adds a node under its own id.
    pub fn add_node(&mut self, node: impl Node<S> + 'static) -> &mut Self {
        self.nodes.insert(node.id().to_owned(), Box::new(node));
        self
    }

    /// Appends a node id to the default order. The first id is the entry
    /// point.
    pub fn add_edge(&mut self, to_id: impl Into<String>) -> &mut Self {
        self.edge_order.push(to_id.into());
        self
    }

    /// Checks that every edge names a known node and freezes the graph.
    pub fn compile(self) -> Result<CompiledGraph<S>, GraphError> {
        if self.edge_order.is_empty() {
            return Err(GraphError::Empty);
        }
        if let Some(id) =
            self.edge_order.iter().find(|id| !self.nodes.contains_key(*id))
        {
            return Err(GraphError::NodeNotFound(id.clone()));
        }
        Ok(CompiledGraph::new(self.nodes, self.edge_order))
    }
}
