use std::future::poll_fn;
use std::pin::{Pin, pin};
use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoff;
use stepwise_model::{
    ErrorKind, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent, ToolCallRequest,
};
use tracing::Instrument;

type SendRequestResult = Result<ModelClientResponse, ModelError>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
#[rustfmt::skip]
type HandlerFn = Arc<
    dyn Fn(ModelRequest, Box<dyn Fn(&str) + Send + 'static>)
        -> BoxedSendRequestFuture + Send + Sync
>;

/// An error returned by the model client.
///
/// The provider error is flattened into its kind and message so callers
/// don't need to know the provider type.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ModelError {
    kind: ErrorKind,
    message: String,
}

impl ModelError {
    fn from_provider<E: ModelProviderError>(err: &E) -> Self {
        Self {
            kind: err.kind(),
            message: format!("{err}"),
        }
    }

    /// Returns the kind reported by the provider.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// A wrapper around a model provider that maintains an execution
/// environment for the provider and provides a type-erased interface
/// for the other modules.
#[derive(Clone)]
pub struct ModelClient {
    handler_fn: HandlerFn,
}

impl ModelClient {
    /// Creates a client that reports every provider error as is.
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        Self::build(provider, None)
    }

    /// Creates a client that retries rate-limited requests with the given
    /// backoff policy. Other errors are returned immediately.
    #[inline]
    pub fn with_retry<P: ModelProvider + 'static>(
        provider: P,
        policy: ExponentialBackoff,
    ) -> Self {
        Self::build(provider, Some(policy))
    }

    fn build<P: ModelProvider + 'static>(
        provider: P,
        retry: Option<ExponentialBackoff>,
    ) -> Self {
        let provider = Arc::new(provider);
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        let handler_fn: HandlerFn = Arc::new(move |req, on_delta| {
            let provider = Arc::clone(&provider);
            let retry = retry.clone();
            Box::pin(
                async move {
                    trace!("got a request: {:?}", req);
                    let resp_or_err = match retry {
                        Some(policy) => {
                            send_with_retry(&*provider, &req, policy).await
                        }
                        None => provider.send_request(&req).await,
                    };
                    handle_response::<P>(resp_or_err, on_delta).await
                }
                .instrument(trace_span!("model client req")),
            )
        });
        Self { handler_fn }
    }

    /// Sends a request and returns the response.
    ///
    /// `on_delta` receives the reply text as it streams in.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. The response stops streaming further
    /// events when this operation is cancelled.
    #[inline]
    pub async fn send_request(
        &self,
        req: ModelRequest,
        on_delta: impl Fn(&str) + Send + 'static,
    ) -> Result<ModelClientResponse, ModelError> {
        (self.handler_fn)(req, Box::new(on_delta)).await
    }
}

/// A completely received response from the model client.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelClientResponse {
    /// The concatenated reply text.
    pub text: String,
    /// Tool calls requested by the model.
    pub tool_calls: Vec<ToolCallRequest>,
    /// The reason the model finished generating.
    pub finish_reason: Option<ModelFinishReason>,
}

async fn send_with_retry<P: ModelProvider>(
    provider: &P,
    req: &ModelRequest,
    policy: ExponentialBackoff,
) -> Result<P::Response, P::Error> {
    backoff::future::retry_notify(
        policy,
        || {
            let fut = provider.send_request(req);
            async move {
                fut.await.map_err(|err| {
                    if err.kind().is_transient() {
                        backoff::Error::transient(err)
                    } else {
                        backoff::Error::permanent(err)
                    }
                })
            }
        },
        |err: P::Error, wait: Duration| {
            warn!("model request failed ({err}), retrying in {wait:?}");
        },
    )
    .await
}

async fn handle_response<P: ModelProvider + 'static>(
    resp_or_err: Result<P::Response, P::Error>,
    on_delta: Box<dyn Fn(&str) + Send + 'static>,
) -> SendRequestResult {
    let resp = match resp_or_err {
        Ok(resp) => resp,
        Err(err) => {
            error!("got an error: {err:?}");
            return Err(ModelError::from_provider(&err));
        }
    };

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    let mut finish_reason = None;

    trace!("start receiving events");

    let mut pinned_resp = pin!(resp);
    loop {
        let event_or_err =
            poll_fn(|cx| pinned_resp.as_mut().poll_next_event(cx)).await;
        let event = match event_or_err {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(err) => {
                error!("got an error: {err:?}");
                return Err(ModelError::from_provider(&err));
            }
        };
        trace!("got an event: {event:?}");

        match event {
            ModelResponseEvent::MessageDelta(delta) => {
                text.push_str(&delta);
                on_delta(&delta);
            }
            ModelResponseEvent::ToolCall(req) => {
                tool_calls.push(req);
            }
            ModelResponseEvent::Completed(reason) => {
                if reason == ModelFinishReason::Length {
                    warn!("reply was cut off by the token limit");
                }
                finish_reason = Some(reason);
            }
        }
    }

    trace!("finished a request");

    Ok(ModelClientResponse {
        text,
        tool_calls,
        finish_reason,
    })
}
