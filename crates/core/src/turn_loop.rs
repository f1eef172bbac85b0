mod builder;
#[cfg(test)]
mod tests;

use std::fmt::{self, Debug};

use serde_json::Value;
use stepwise_model::ResponseFormat;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::model_client::{ModelClient, ModelError};
use crate::step::{Step, StepError, StepKind};
use crate::tool::Registry;
use crate::transcript::Transcript;
pub use builder::TurnLoopBuilder;

/// Which steps end a turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TerminalSteps {
    /// A `result` step ends the turn.
    #[default]
    Result,
    /// An `output` step ends the turn.
    Output,
    /// Every reply ends the turn.
    Any,
}

impl TerminalSteps {
    /// Returns `true` if a step of this kind ends the turn.
    #[inline]
    pub fn is_terminal(&self, kind: StepKind) -> bool {
        match self {
            TerminalSteps::Result => kind == StepKind::Result,
            TerminalSteps::Output => kind == StepKind::Output,
            TerminalSteps::Any => true,
        }
    }
}

/// What to do with a reply that is not a valid step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ParseFailurePolicy {
    /// Report the reply and end the turn with an error.
    #[default]
    Abort,
    /// Report the reply, keep it in the transcript and ask again.
    Skip,
}

/// Something that happened during a turn, reported to the observer.
#[derive(Debug)]
pub enum LoopEvent<'a> {
    /// A reply was decoded.
    Step(&'a Step),
    /// A reply could not be decoded.
    InvalidReply {
        /// The raw reply text.
        raw: &'a str,
        /// Why decoding failed.
        error: &'a StepError,
    },
    /// A tool is about to be called.
    ToolCall {
        /// The tool name.
        function: &'a str,
        /// The tool input.
        input: &'a Value,
    },
    /// A tool call finished and its output was fed back.
    Observation(&'a str),
}

/// How a turn ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnOutcome {
    /// The terminal step.
    pub step: Step,
    /// The number of model calls made during the turn.
    pub rounds: usize,
}

impl TurnOutcome {
    /// Returns the final text of the turn.
    #[inline]
    pub fn content(&self) -> &str {
        self.step.content()
    }
}

/// Errors that end a turn early.
#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    /// The model request failed.
    #[error("model request failed: {0}")]
    Model(#[from] ModelError),
    /// The reply could not be decoded and the policy is to abort.
    #[error("invalid reply from the model: {source}")]
    InvalidReply {
        /// The raw reply text.
        raw: String,
        /// Why decoding failed.
        #[source]
        source: StepError,
    },
    /// The turn did not reach a terminal step within the round limit.
    #[error("no terminal step after {0} rounds")]
    TurnLimitExceeded(usize),
    /// The cancellation token fired.
    #[error("turn cancelled")]
    Cancelled,
}

type Observer = Box<dyn Fn(LoopEvent<'_>) + Send + Sync>;

/// The step-protocol loop.
///
/// Each turn appends the user input, then repeatedly sends the whole
/// transcript to the model and handles exactly one step per reply until a
/// terminal step arrives. `action` steps are resolved in the tool registry
/// and their output goes back to the model as an `observe` step. The
/// transcript is kept between turns.
pub struct TurnLoop {
    model_client: ModelClient,
    tools: Registry,
    transcript: Transcript,
    terminal: TerminalSteps,
    on_parse_failure: ParseFailurePolicy,
    max_rounds: Option<usize>,
    cancel: CancellationToken,
    observer: Option<Observer>,
}

impl TurnLoop {
    /// Returns the transcript so far.
    #[inline]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Returns the registered tools.
    #[inline]
    pub fn tools(&self) -> &Registry {
        &self.tools
    }

    /// Returns the token that cancels the running turn.
    #[inline]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Runs one user turn to its terminal step.
    ///
    /// # Cancel safety
    ///
    /// Cancelling the token abandons the pending model or tool call. The
    /// transcript keeps everything appended before that point.
    pub async fn run_turn(
        &mut self,
        input: &str,
    ) -> Result<TurnOutcome, LoopError> {
        self.transcript.push_user(input);
        let span = info_span!("turn", messages = self.transcript.len());
        self.run_rounds().instrument(span).await
    }

    async fn run_rounds(&mut self) -> Result<TurnOutcome, LoopError> {
        let mut rounds = 0;
        loop {
            if let Some(max_rounds) = self.max_rounds {
                if rounds >= max_rounds {
                    warn!("giving up after {rounds} rounds");
                    return Err(LoopError::TurnLimitExceeded(max_rounds));
                }
            }
            rounds += 1;

            let request = self
                .transcript
                .to_request(vec![], ResponseFormat::JsonObject);
            let response = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(LoopError::Cancelled),
                resp = self.model_client.send_request(request, |_| {}) => resp?,
            };
            let raw = response.text;

            let step = match Step::decode(&raw) {
                Ok(step) => step,
                Err(error) => {
                    warn!("invalid reply in round {rounds}: {error}");
                    self.notify(LoopEvent::InvalidReply { raw: &raw, error: &error });
                    match self.on_parse_failure {
                        ParseFailurePolicy::Abort => {
                            return Err(LoopError::InvalidReply {
                                raw,
                                source: error,
                            });
                        }
                        ParseFailurePolicy::Skip => {
                            self.transcript.push_assistant(raw);
                            continue;
                        }
                    }
                }
            };
            debug!("round {rounds}: {} step", step.kind());
            self.transcript.push_assistant(raw);
            self.notify(LoopEvent::Step(&step));

            if self.terminal.is_terminal(step.kind()) {
                return Ok(TurnOutcome { step, rounds });
            }

            if let Step::Action {
                function, input, ..
            } = &step
            {
                self.notify(LoopEvent::ToolCall { function, input });
                let output = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(LoopError::Cancelled),
                    output = self.tools.observe(function, input.clone()) => output,
                };
                self.notify(LoopEvent::Observation(&output));
                self.transcript.push_observation(output);
            }
        }
    }

    fn notify(&self, event: LoopEvent<'_>) {
        if let Some(observer) = &self.observer {
            observer(event);
        }
    }
}

impl Debug for TurnLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TurnLoop")
            .field("tools", &self.tools)
            .field("messages", &self.transcript.len())
            .field("terminal", &self.terminal)
            .field("on_parse_failure", &self.on_parse_failure)
            .field("max_rounds", &self.max_rounds)
            .finish_non_exhaustive()
    }
}
