use serde::{Deserialize, Serialize};
use serde_json::Value;
use stepwise_model::{
    ModelMessage, ModelRequest, ModelTool, ResponseFormat, ToolCallRequest,
};

use crate::OpenAIConfig;

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionToolCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionToolCall>,
}

impl ToolCall {
    /// Merges a streamed fragment into this call.
    pub fn merge(&mut self, fragment: ToolCall) {
        if let Some(id) = fragment.id {
            self.id.get_or_insert_default().push_str(&id);
        }
        if let Some(ty) = fragment.r#type {
            // The type is sent whole, not in pieces.
            self.r#type = Some(ty);
        }
        let Some(function) = fragment.function else {
            return;
        };
        let target = self.function.get_or_insert_default();
        if let Some(name) = function.name {
            target.name.get_or_insert_default().push_str(&name);
        }
        if let Some(arguments) = function.arguments {
            target.arguments.get_or_insert_default().push_str(&arguments);
        }
    }

    /// Converts an assembled call into the provider-neutral request.
    ///
    /// Arguments that are not valid JSON are passed along as a string so
    /// the tool layer can report them.
    pub fn into_request(self) -> ToolCallRequest {
        let function = self.function.unwrap_or_default();
        let raw_args = function.arguments.unwrap_or_default();
        let arguments = if raw_args.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(&raw_args).unwrap_or(Value::String(raw_args))
        };
        ToolCallRequest {
            id: self.id.unwrap_or_default(),
            name: function.name.unwrap_or_default(),
            arguments,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Delta {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
struct FunctionTool {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
struct Tool {
    r#type: &'static str,
    function: FunctionTool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<ToolCall>>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
struct ResponseFormatParam {
    r#type: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormatParam>,
    stream: bool,
}

// -----------
// Conversions
// -----------

pub fn create_request(
    req: &ModelRequest,
    config: &OpenAIConfig,
) -> ChatCompletionRequest {
    let response_format = match req.response_format {
        ResponseFormat::Text => None,
        ResponseFormat::JsonObject => Some(ResponseFormatParam {
            r#type: "json_object",
        }),
    };
    ChatCompletionRequest {
        model: config.model.clone(),
        messages: req.messages.iter().map(create_message).collect(),
        tools: req.tools.iter().map(create_tool).collect(),
        response_format,
        stream: true,
    }
}

fn create_message(msg: &ModelMessage) -> Message {
    match msg {
        ModelMessage::System { content } => Message::System {
            content: content.clone(),
        },
        ModelMessage::User { content } => Message::User {
            content: content.clone(),
        },
        ModelMessage::Assistant {
            content,
            tool_calls,
        } => {
            let tool_calls = (!tool_calls.is_empty())
                .then(|| tool_calls.iter().map(create_tool_call).collect());
            // The API rejects an empty string next to tool calls.
            let content = if content.is_empty() && tool_calls.is_some() {
                None
            } else {
                Some(content.clone())
            };
            Message::Assistant {
                content,
                tool_calls,
            }
        }
        ModelMessage::Tool(result) => Message::Tool {
            tool_call_id: result.id.clone(),
            content: result.content.clone(),
        },
    }
}

fn create_tool_call(req: &ToolCallRequest) -> ToolCall {
    let arguments = match &req.arguments {
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    };
    ToolCall {
        index: None,
        id: Some(req.id.clone()),
        r#type: Some("function".to_owned()),
        function: Some(FunctionToolCall {
            name: Some(req.name.clone()),
            arguments: Some(arguments),
        }),
    }
}

fn create_tool(tool: &ModelTool) -> Tool {
    Tool {
        r#type: "function",
        function: FunctionTool {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use stepwise_model::ToolCallResult;

    use super::*;
    use crate::OpenAIConfigBuilder;

    #[test]
    fn test_create_json_mode_request() {
        let request = ModelRequest {
            messages: vec![
                ModelMessage::system("Return exactly ONE JSON object."),
                ModelMessage::user("What is 5 / 2 * 3^4?"),
            ],
            tools: vec![],
            response_format: ResponseFormat::JsonObject,
        };
        let config = OpenAIConfigBuilder::with_api_key("xxx")
            .with_model("custom")
            .build();
        let payload =
            serde_json::to_value(create_request(&request, &config)).unwrap();
        assert_eq!(
            payload,
            json!({
                "model": "custom",
                "messages": [
                    { "role": "system", "content": "Return exactly ONE JSON object." },
                    { "role": "user", "content": "What is 5 / 2 * 3^4?" }
                ],
                "response_format": { "type": "json_object" },
                "stream": true
            })
        );
    }

    #[test]
    fn test_create_tool_round() {
        let request = ModelRequest {
            messages: vec![
                ModelMessage::user("Delete employee with id 2"),
                ModelMessage::Assistant {
                    content: String::new(),
                    tool_calls: vec![ToolCallRequest {
                        id: "call_1".to_owned(),
                        name: "delete_employee".to_owned(),
                        arguments: json!({ "employee_id": 2 }),
                    }],
                },
                ModelMessage::Tool(ToolCallResult {
                    id: "call_1".to_owned(),
                    content: "Employee with id 2 deleted.".to_owned(),
                }),
            ],
            tools: vec![ModelTool {
                name: "delete_employee".to_owned(),
                description: "Delete an employee by ID.".to_owned(),
                parameters: json!({ "type": "object" }),
            }],
            response_format: ResponseFormat::Text,
        };
        let config = OpenAIConfigBuilder::with_api_key("xxx").build();
        let payload =
            serde_json::to_value(create_request(&request, &config)).unwrap();

        assert!(payload.get("response_format").is_none());
        assert_eq!(payload["tools"][0]["type"], "function");
        let assistant = &payload["messages"][1];
        assert_eq!(assistant["content"], Value::Null);
        assert_eq!(
            assistant["tool_calls"][0]["function"]["arguments"],
            r#"{"employee_id":2}"#
        );
        assert_eq!(payload["messages"][2]["tool_call_id"], "call_1");
    }

    #[test]
    fn test_merge_fragments() {
        let mut call = ToolCall {
            index: Some(0),
            id: Some("call_".to_owned()),
            r#type: Some("function".to_owned()),
            function: Some(FunctionToolCall {
                name: Some("get_employee".to_owned()),
                arguments: Some(r#"{"employee"#.to_owned()),
            }),
        };
        call.merge(ToolCall {
            index: Some(0),
            id: Some("9".to_owned()),
            r#type: None,
            function: Some(FunctionToolCall {
                name: Some("_by_id".to_owned()),
                arguments: Some(r#"_id": 7}"#.to_owned()),
            }),
        });
        let req = call.into_request();
        assert_eq!(req.id, "call_9");
        assert_eq!(req.name, "get_employee_by_id");
        assert_eq!(req.arguments, json!({ "employee_id": 7 }));
    }
}
