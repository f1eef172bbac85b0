//! Core logic: the JSON step protocol, the transcript, the tool registry,
//! the step-protocol turn loop and a small graph orchestrator for native
//! tool calling.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

pub mod graph;
mod model_client;
pub mod step;
pub mod tool;
pub mod transcript;
mod turn_loop;

pub use model_client::{ModelClient, ModelClientResponse, ModelError};
pub use step::{Step, StepError, StepKind};
pub use tool::{Registry, Tool};
pub use transcript::Transcript;
pub use turn_loop::{
    LoopError, LoopEvent, ParseFailurePolicy, TerminalSteps, TurnLoop,
    TurnLoopBuilder, TurnOutcome,
};

/// Re-exported so callers can build retry policies and cancellation tokens
/// without depending on the crates directly.
pub use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
pub use tokio_util::sync::CancellationToken;
