use std::error::Error;

use crate::error::ErrorKind;
use crate::request::ModelRequest;
use crate::response::ModelResponse;

/// Errors reported by a provider, classified so callers can decide whether
/// to retry.
pub trait ModelProviderError: Error + Send + Sync + 'static {
    /// Returns the classification of the error.
    fn kind(&self) -> ErrorKind;
}

/// A completion endpoint.
///
/// A provider is constructed once by the caller and passed to whoever
/// needs it; there is no global client. Once created it should behave like
/// a stateless object, and be prepared for being dropped anytime.
pub trait ModelProvider: Send + Sync {
    /// Errors from sending a request or reading its reply.
    type Error: ModelProviderError;

    /// The streamed reply.
    type Response: ModelResponse<Error = Self::Error>;

    /// Sends the conversation to the model and starts streaming the reply.
    ///
    /// The returned future must not borrow `self` or `req`.
    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static;
}
