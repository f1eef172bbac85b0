//! Provider-neutral types for talking to a completion API.
//!
//! Everything that goes over the wire to a model (the message history, tool
//! definitions, the requested output format) and everything that comes back
//! (streamed deltas, tool call requests, the finish reason) is described
//! here. Providers implement [`ModelProvider`] and [`ModelResponse`]; the
//! rest of the workspace only ever sees these types.
//!
//! Messages are plain data and serializable, so a transcript can be exported
//! and later replayed into an identical request.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
