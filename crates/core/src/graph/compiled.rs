use std::collections::HashMap;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::{GraphError, Next, Node};

/// A validated graph, ready to run.
pub struct CompiledGraph<S> {
    nodes: HashMap<String, Box<dyn Node<S>>>,
    edge_order: Vec<String>,
    max_steps: Option<usize>,
    cancel: CancellationToken,
}

impl<S: Send + 'static> CompiledGraph<S> {
    pub(super) fn new(
        nodes: HashMap<String, Box<dyn Node<S>>>,
        edge_order: Vec<String>,
    ) -> Self {
        Self {
            nodes,
            edge_order,
            max_steps: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Limits the number of node runs per invocation. `None` means
    /// unbounded.
    #[inline]
    pub fn with_max_steps(mut self, max_steps: Option<usize>) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Sets the token that cancels running invocations.
    #[inline]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Runs the graph from its entry node until a node returns
    /// [`Next::End`] or the default order runs out.
    pub async fn invoke(&self, state: S) -> Result<S, GraphError> {
        let mut state = state;
        let mut current_id = self
            .edge_order
            .first()
            .cloned()
            .ok_or(GraphError::Empty)?;
        let mut steps = 0;

        loop {
            if let Some(max_steps) = self.max_steps {
                if steps >= max_steps {
                    warn!("graph stopped after {steps} steps");
                    return Err(GraphError::StepLimitExceeded(max_steps));
                }
            }
            steps += 1;

            let node = self
                .nodes
                .get(&current_id)
                .ok_or_else(|| GraphError::NodeNotFound(current_id.clone()))?;
            let span = debug_span!("graph node", id = %current_id, step = steps);
            let (new_state, next) = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(GraphError::Cancelled),
                res = node.run(state).instrument(span) => res?,
            };
            state = new_state;
            trace!("{current_id} -> {next:?}");

            match next {
                Next::End => return Ok(state),
                Next::Node(id) => current_id = id,
                Next::Continue => {
                    let pos = self
                        .edge_order
                        .iter()
                        .position(|x| x == &current_id);
                    // A node reached by a jump may not be in the order.
                    let Some(next_id) =
                        pos.and_then(|pos| self.edge_order.get(pos + 1))
                    else {
                        return Ok(state);
                    };
                    current_id = next_id.clone();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::graph::StateGraph;

    type Trail = Vec<&'static str>;

    struct Push {
        id: &'static str,
        next: Next,
    }

    #[async_trait]
    impl Node<Trail> for Push {
        fn id(&self) -> &str {
            self.id
        }

        async fn run(
            &self,
            mut state: Trail,
        ) -> Result<(Trail, Next), GraphError> {
            state.push(self.id);
            Ok((state, self.next.clone()))
        }
    }

    fn push(id: &'static str, next: Next) -> Push {
        Push { id, next }
    }

    #[tokio::test]
    async fn test_default_order_and_jumps() {
        let mut graph = StateGraph::<Trail>::new();
        graph
            .add_node(push("a", Next::Continue))
            .add_node(push("b", Next::Node("d".to_owned())))
            .add_node(push("c", Next::Continue))
            .add_node(push("d", Next::Continue))
            .add_edge("a")
            .add_edge("b")
            .add_edge("c");
        let graph = graph.compile().unwrap();

        // `d` is off the default order, so `Continue` ends the run there.
        assert_eq!(graph.invoke(vec![]).await.unwrap(), ["a", "b", "d"]);
    }

    #[tokio::test]
    async fn test_compile_errors() {
        let mut graph = StateGraph::<Trail>::new();
        graph.add_node(push("a", Next::End)).add_edge("a").add_edge("z");
        assert!(matches!(
            graph.compile(),
            Err(GraphError::NodeNotFound(id)) if id == "z"
        ));

        let graph = StateGraph::<Trail>::new();
        assert!(matches!(graph.compile(), Err(GraphError::Empty)));
    }

    #[tokio::test]
    async fn test_step_limit_and_cancel() {
        let mut graph = StateGraph::<Trail>::new();
        graph
            .add_node(push("ping", Next::Node("pong".to_owned())))
            .add_node(push("pong", Next::Node("ping".to_owned())))
            .add_edge("ping");
        let graph = graph.compile().unwrap().with_max_steps(Some(5));
        assert!(matches!(
            graph.invoke(vec![]).await,
            Err(GraphError::StepLimitExceeded(5))
        ));

        let token = CancellationToken::new();
        token.cancel();
        let graph = graph.with_cancellation(token);
        assert!(matches!(
            graph.invoke(vec![]).await,
            Err(GraphError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_unknown_jump_target() {
        let mut graph = StateGraph::<Trail>::new();
        graph
            .add_node(push("a", Next::Node("nowhere".to_owned())))
            .add_edge("a");
        let graph = graph.compile().unwrap();
        assert!(matches!(
            graph.invoke(vec![]).await,
            Err(GraphError::NodeNotFound(id)) if id == "nowhere"
        ));
    }
}
