use std::collections::VecDeque;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::task::{self, Poll, ready};
use std::time::Duration;

use stepwise_model::{
    ErrorKind, ModelMessage, ModelProvider, ModelProviderError, ModelRequest,
    ModelResponse, ModelResponseEvent, ResponseFormat,
};
use tokio::time::{Sleep, sleep};

#[derive(Debug)]
struct FakeModelProviderError(ErrorKind);

impl Display for FakeModelProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Error for FakeModelProviderError {}

impl ModelProviderError for FakeModelProviderError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

/// Replies with a JSON step object echoing the last user message, one
/// character-ish chunk at a time.
#[derive(Debug)]
struct FakeModelResponse {
    fake_items: VecDeque<String>,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl FakeModelResponse {
    fn new(input: &str) -> Self {
        let body = serde_json::json!({ "step": "result", "content": input })
            .to_string();
        let fake_items = body
            .as_bytes()
            .chunks(4)
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect();
        Self {
            fake_items,
            sleep: None,
        }
    }
}

impl ModelResponse for FakeModelResponse {
    type Error = FakeModelProviderError;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        // SAFETY: This type does not require to be pinned.
        let this = unsafe { self.get_unchecked_mut() };
        if let Some(sleep) = &mut this.sleep {
            ready!(sleep.as_mut().poll(cx));
            this.sleep = None;

            return match this.fake_items.pop_front() {
                Some(item) => {
                    Poll::Ready(Ok(Some(ModelResponseEvent::MessageDelta(item))))
                }
                None => Poll::Ready(Ok(None)),
            };
        }
        this.sleep = Some(Box::pin(sleep(Duration::from_millis(1))));
        Pin::new(this).poll_next_event(cx)
    }
}

struct FakeModelProvider;

impl ModelProvider for FakeModelProvider {
    type Error = FakeModelProviderError;
    type Response = FakeModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let result = 'blk: {
            if req.response_format != ResponseFormat::JsonObject {
                break 'blk Err(FakeModelProviderError(ErrorKind::Other));
            }
            let last_user = req.messages.iter().rev().find_map(|msg| match msg {
                ModelMessage::User { content } => Some(content.as_str()),
                _ => None,
            });
            match last_user {
                Some(text) => Ok(FakeModelResponse::new(text)),
                None => Err(FakeModelProviderError(ErrorKind::Moderated)),
            }
        };
        ready(result)
    }
}

mod tests {
    use std::future::poll_fn;

    use serde_json::Value;

    use super::*;

    #[tokio::test]
    async fn test_completion() {
        let provider = FakeModelProvider;
        let req = ModelRequest {
            messages: vec![
                ModelMessage::system("Answer in JSON."),
                ModelMessage::user("Good morning"),
            ],
            tools: vec![],
            response_format: ResponseFormat::JsonObject,
        };
        let mut resp = provider.send_request(&req).await.unwrap();

        let mut body = String::new();
        loop {
            let resp_fut =
                poll_fn(|cx| Pin::new(&mut resp).poll_next_event(cx));
            match resp_fut.await {
                Ok(Some(ModelResponseEvent::MessageDelta(delta))) => {
                    body.push_str(&delta);
                }
                Ok(Some(event)) => unreachable!("unexpected event: {event:?}"),
                Ok(None) => break,
                Err(err) => unreachable!("unexpected error: {err:?}"),
            }
        }

        let obj: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(obj["step"], "result");
        assert_eq!(obj["content"], "Good morning");
    }

    #[tokio::test]
    async fn test_error() {
        let provider = FakeModelProvider;
        let req = ModelRequest {
            messages: vec![ModelMessage::user("Hi")],
            ..Default::default()
        };
        let err = provider.send_request(&req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Other);

        let req = ModelRequest {
            messages: vec![],
            tools: vec![],
            response_format: ResponseFormat::JsonObject,
        };
        let err = provider.send_request(&req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Moderated);
    }
}
