use std::pin::Pin;
use std::task::{self, Poll};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::provider::ModelProviderError;

/// A streamed reply from a model provider.
///
/// The caller pulls events until the reply completes and assembles the
/// text and tool calls from them.
pub trait ModelResponse: Sized + Send + 'static {
    /// The error type that may be returned by the provider.
    type Error: ModelProviderError;

    /// Polls for the next event of the reply.
    ///
    /// Returns `Ready(Ok(Some(_)))` for every event, `Ready(Ok(None))` once
    /// the reply is complete and on every later call, `Ready(Err(_))` when
    /// the stream fails, and `Pending` after arranging for the task to be
    /// woken when more data arrives.
    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>>;
}

/// Why the model stopped generating.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFinishReason {
    /// The reply ends with tool calls.
    ToolCalls,
    /// The reply is complete.
    Stop,
    /// The reply was cut off by the token limit.
    Length,
}

/// A native tool call requested by the model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Id that the matching tool result must echo.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// The arguments to pass to the function, usually a JSON object.
    pub arguments: Value,
}

/// One event of a streamed reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelResponseEvent {
    /// The reply is complete.
    Completed(ModelFinishReason),
    /// A chunk of reply text.
    MessageDelta(String),
    /// A fully assembled tool call.
    ToolCall(ToolCallRequest),
}
