use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::stream::{self, BoxStream};
use futures_util::{Stream, StreamExt};
use pin_project_lite::pin_project;
use stepwise_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
};

use crate::Error;
use crate::io::Sse;
use crate::proto::{ChatCompletionChunk, ToolCall};

/// Turns completion chunks into response events.
///
/// Text deltas are forwarded as soon as they arrive. Tool calls are streamed
/// by the server in fragments, so they are only emitted once the finish
/// reason shows up, followed by the `Completed` event.
struct Accumulator {
    sse: Sse,
    id: Option<String>,
    tool_calls: Vec<ToolCall>,
    pending: VecDeque<ModelResponseEvent>,
    done: bool,
}

impl Accumulator {
    fn new(sse: Sse) -> Self {
        Self {
            sse,
            id: None,
            tool_calls: vec![],
            pending: VecDeque::new(),
            done: false,
        }
    }

    async fn next_event(&mut self) -> Result<Option<ModelResponseEvent>, Error> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            if self.done {
                return Ok(None);
            }

            let sse_event = self.sse.next_event().await.map_err(|err| {
                Error::new(format!("{err}"), ErrorKind::Other)
            })?;
            let Some(sse_event) = sse_event else {
                // The server hung up without a finish reason, still hand
                // out whatever tool calls were assembled.
                self.finish(None);
                continue;
            };
            trace!("got sse event: {sse_event}");
            if sse_event == "[DONE]" {
                self.finish(None);
                continue;
            }

            let chunk = serde_json::from_str::<ChatCompletionChunk>(&sse_event)
                .map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))?;
            if self.id.get_or_insert_with(|| chunk.id.clone()) != &chunk.id {
                return Err(Error::new("chunk id mismatch", ErrorKind::Other));
            }

            // The trailing usage chunk has no choices.
            for choice in chunk.choices {
                if let Some(content) = choice.delta.content {
                    if !content.is_empty() {
                        self.pending
                            .push_back(ModelResponseEvent::MessageDelta(content));
                    }
                }
                for fragment in choice.delta.tool_calls.into_iter().flatten() {
                    match self
                        .tool_calls
                        .iter_mut()
                        .find(|t| t.index == fragment.index)
                    {
                        Some(partial) => partial.merge(fragment),
                        None => self.tool_calls.push(fragment),
                    }
                }
                if let Some(reason) = choice.finish_reason {
                    let reason = match reason.as_str() {
                        "tool_calls" => ModelFinishReason::ToolCalls,
                        "length" => ModelFinishReason::Length,
                        "content_filter" => {
                            return Err(Error::new(
                                "response blocked by content filter",
                                ErrorKind::Moderated,
                            ));
                        }
                        _ => ModelFinishReason::Stop,
                    };
                    self.finish(Some(reason));
                }
            }
        }
    }

    fn finish(&mut self, reason: Option<ModelFinishReason>) {
        if self.done {
            return;
        }
        self.done = true;
        let has_tool_calls = !self.tool_calls.is_empty();
        for call in self.tool_calls.drain(..) {
            self.pending
                .push_back(ModelResponseEvent::ToolCall(call.into_request()));
        }
        let reason = reason.unwrap_or(if has_tool_calls {
            ModelFinishReason::ToolCalls
        } else {
            ModelFinishReason::Stop
        });
        self.pending.push_back(ModelResponseEvent::Completed(reason));
    }
}

pin_project! {
    pub struct OpenAIResponse {
        #[pin]
        events: BoxStream<'static, Result<ModelResponseEvent, Error>>,
    }
}

impl OpenAIResponse {
    pub fn from_sse(sse: Sse) -> Self {
        let events = stream::unfold(
            Some(Accumulator::new(sse)),
            |acc| async move {
                let mut acc = acc?;
                match acc.next_event().await {
                    Ok(Some(event)) => Some((Ok(event), Some(acc))),
                    Ok(None) => None,
                    // Stop pulling after the first error.
                    Err(err) => Some((Err(err), None)),
                }
            },
        )
        .boxed();
        Self { events }
    }
}

impl ModelResponse for OpenAIResponse {
    type Error = Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        self.project().events.poll_next(cx).map(Option::transpose)
    }
}
