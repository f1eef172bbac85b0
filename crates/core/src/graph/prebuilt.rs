use std::sync::Arc;

use async_trait::async_trait;
use stepwise_model::{ModelMessage, ResponseFormat, ToolCallResult};

use super::{CompiledGraph, GraphError, Next, Node, StateGraph};
use crate::model_client::ModelClient;
use crate::tool::Registry;
use crate::transcript::Transcript;

/// Id of the node that talks to the model.
pub const CHATBOT: &str = "chatbot";
/// Id of the node that runs requested tool calls.
pub const TOOLS: &str = "tools";

/// Callback that sees every message a node appends.
pub type MessageObserver = Arc<dyn Fn(&ModelMessage) + Send + Sync>;

/// Routes to the tools node if the message asks for tool calls, otherwise
/// ends the run.
pub fn tools_condition(msg: &ModelMessage) -> Next {
    match msg {
        ModelMessage::Assistant { tool_calls, .. } if !tool_calls.is_empty() => {
            Next::Node(TOOLS.to_owned())
        }
        _ => Next::End,
    }
}

/// Sends the transcript and the tool definitions to the model and appends
/// the reply.
pub struct ChatbotNode {
    model_client: ModelClient,
    tools: Arc<Registry>,
    observer: Option<MessageObserver>,
}

impl ChatbotNode {
    /// Creates the node.
    #[inline]
    pub fn new(
        model_client: ModelClient,
        tools: Arc<Registry>,
        observer: Option<MessageObserver>,
    ) -> Self {
        Self {
            model_client,
            tools,
            observer,
        }
    }
}

#[async_trait]
impl Node<Transcript> for ChatbotNode {
    fn id(&self) -> &str {
        CHATBOT
    }

    async fn run(
        &self,
        mut state: Transcript,
    ) -> Result<(Transcript, Next), GraphError> {
        let request =
            state.to_request(self.tools.definitions(), ResponseFormat::Text);
        let response = self.model_client.send_request(request, |_| {}).await?;
        debug!(
            "model replied with {} tool call(s)",
            response.tool_calls.len()
        );

        let msg = ModelMessage::Assistant {
            content: response.text,
            tool_calls: response.tool_calls,
        };
        if let Some(observer) = &self.observer {
            observer(&msg);
        }
        let next = tools_condition(&msg);
        state.push(msg);
        Ok((state, next))
    }
}

/// Runs every tool call of the last assistant message and appends one
/// `tool` message per call.
pub struct ToolsNode {
    tools: Arc<Registry>,
    observer: Option<MessageObserver>,
}

impl ToolsNode {
    /// Creates the node.
    #[inline]
    pub fn new(tools: Arc<Registry>, observer: Option<MessageObserver>) -> Self {
        Self { tools, observer }
    }
}

#[async_trait]
impl Node<Transcript> for ToolsNode {
    fn id(&self) -> &str {
        TOOLS
    }

    async fn run(
        &self,
        mut state: Transcript,
    ) -> Result<(Transcript, Next), GraphError> {
        let calls = match state.last() {
            Some(ModelMessage::Assistant { tool_calls, .. }) => tool_calls.clone(),
            _ => vec![],
        };
        for call in calls {
            let content = match self.tools.invoke(&call.name, call.arguments).await
            {
                Ok(output) => output,
                Err(err) => err.reason().into_owned(),
            };
            let msg = ModelMessage::Tool(ToolCallResult {
                id: call.id,
                content,
            });
            if let Some(observer) = &self.observer {
                observer(&msg);
            }
            state.push(msg);
        }
        Ok((state, Next::Node(CHATBOT.to_owned())))
    }
}

/// Builds the two-node agent: the chatbot calls the model, and whenever the
/// reply asks for tools the tools node runs them and hands back.
pub fn tool_agent(
    model_client: ModelClient,
    tools: Arc<Registry>,
    observer: Option<MessageObserver>,
) -> Result<CompiledGraph<Transcript>, GraphError> {
    let mut graph = StateGraph::<Transcript>::new();
    graph
        .add_node(ChatbotNode::new(
            model_client,
            Arc::clone(&tools),
            observer.clone(),
        ))
        .add_node(ToolsNode::new(tools, observer))
        .add_edge(CHATBOT)
        .add_edge(TOOLS);
    graph.compile()
}

#[cfg(test)]
mod tests {
    use std::future::ready;
    use std::sync::Mutex;

    use serde::Deserialize;
    use serde_json::{Value, json};
    use stepwise_model::ToolCallRequest;
    use stepwise_test_model::{PresetEvent, PresetResponse, TestModelProvider};

    use super::*;
    use crate::tool::{Tool, ToolResult};

    struct Lookup {
        schema: Value,
    }

    #[derive(Deserialize)]
    struct LookupInput {
        employee_id: i64,
    }

    impl Tool for Lookup {
        type Input = LookupInput;

        fn name(&self) -> &str {
            "get_employee_by_id"
        }

        fn description(&self) -> &str {
            "Fetch one employee"
        }

        fn parameter_schema(&self) -> &Value {
            &self.schema
        }

        fn execute(
            &self,
            input: Self::Input,
        ) -> impl Future<Output = ToolResult> + Send + 'static {
            ready(Ok(json!({ "id": input.employee_id, "name": "Ada" }).to_string()))
        }
    }

    fn registry() -> Arc<Registry> {
        Arc::new(Registry::default().with_tool(Lookup {
            schema: json!({
                "type": "object",
                "properties": { "employee_id": { "type": "integer" } },
                "required": ["employee_id"],
            }),
        }))
    }

    fn call(id: &str, name: &str, arguments: Value) -> ToolCallRequest {
        ToolCallRequest {
            id: id.to_owned(),
            name: name.to_owned(),
            arguments,
        }
    }

    #[test]
    fn test_tools_condition() {
        assert_eq!(tools_condition(&ModelMessage::assistant("done")), Next::End);
        assert_eq!(tools_condition(&ModelMessage::user("hi")), Next::End);
        let msg = ModelMessage::Assistant {
            content: String::new(),
            tool_calls: vec![call("1", "list_employees", json!({}))],
        };
        assert_eq!(tools_condition(&msg), Next::Node(TOOLS.to_owned()));
    }

    #[tokio::test]
    async fn test_tool_round_trip() {
        let provider = TestModelProvider::default();
        provider.push_response(PresetResponse::tool_calls([
            call("call_1", "get_employee_by_id", json!({ "employee_id": 1 })),
            call("call_2", "drop_table", json!({})),
        ]));
        provider.push_response(PresetResponse::with_events([
            PresetEvent::MessageDelta("Employee 1 is Ada.".to_owned()),
        ]));

        let seen = Arc::new(Mutex::new(vec![]));
        let observer: MessageObserver = {
            let seen = Arc::clone(&seen);
            Arc::new(move |msg: &ModelMessage| {
                seen.lock().unwrap().push(msg.role());
            })
        };
        let graph = tool_agent(
            ModelClient::new(provider.clone()),
            registry(),
            Some(observer),
        )
        .unwrap();

        let mut state = Transcript::default();
        state.push_user("Who is employee 1?");
        let state = graph.invoke(state).await.unwrap();

        assert_eq!(provider.request_count(), 2);
        assert_eq!(
            *seen.lock().unwrap(),
            ["assistant", "tool", "tool", "assistant"]
        );
        assert_eq!(state.last().unwrap().content(), "Employee 1 is Ada.");

        let requests = provider.requests();
        assert_eq!(requests[0].response_format, ResponseFormat::Text);
        assert_eq!(requests[0].tools.len(), 1);
        let ModelMessage::Tool(found) = &requests[1].messages[2] else {
            panic!("expected a tool result");
        };
        assert_eq!(found.id, "call_1");
        assert_eq!(
            serde_json::from_str::<Value>(&found.content).unwrap(),
            json!({ "id": 1, "name": "Ada" })
        );
        let ModelMessage::Tool(missing) = &requests[1].messages[3] else {
            panic!("expected a tool result");
        };
        assert_eq!(missing.content, "Unknown tool: drop_table");
    }

    #[tokio::test]
    async fn test_plain_reply_ends_run() {
        let provider = TestModelProvider::default();
        provider.push_response(PresetResponse::text("Hello!"));

        let graph =
            tool_agent(ModelClient::new(provider.clone()), registry(), None)
                .unwrap();
        let state = graph
            .invoke(Transcript::from(vec![ModelMessage::user("hi")]))
            .await
            .unwrap();
        assert_eq!(state.len(), 2);
        assert_eq!(provider.request_count(), 1);
    }
}
