use tokio_util::sync::CancellationToken;

use super::{
    LoopEvent, Observer, ParseFailurePolicy, TerminalSteps, TurnLoop,
};
use crate::model_client::ModelClient;
use crate::tool::{Registry, Tool};
use crate::transcript::Transcript;

/// [`TurnLoop`] builder.
pub struct TurnLoopBuilder {
    model_client: ModelClient,
    system_prompt: Option<String>,
    transcript: Option<Transcript>,
    tools: Registry,
    terminal: TerminalSteps,
    on_parse_failure: ParseFailurePolicy,
    max_rounds: Option<usize>,
    cancel: Option<CancellationToken>,
    observer: Option<Observer>,
}

impl TurnLoopBuilder {
    /// Creates a new builder that talks to the model through `model_client`.
    #[inline]
    pub fn new(model_client: ModelClient) -> Self {
        Self {
            model_client,
            system_prompt: None,
            transcript: None,
            tools: Registry::default(),
            terminal: TerminalSteps::default(),
            on_parse_failure: ParseFailurePolicy::default(),
            max_rounds: None,
            cancel: None,
            observer: None,
        }
    }

    /// Sets the system prompt that opens the transcript.
    #[inline]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Resumes from an existing transcript. The system prompt is ignored
    /// when a transcript is given.
    #[inline]
    pub fn with_transcript(mut self, transcript: Transcript) -> Self {
        self.transcript = Some(transcript);
        self
    }

    /// Registers a tool.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.tools.add_tool(tool);
        self
    }

    /// Replaces the tool registry.
    #[inline]
    pub fn with_tools(mut self, tools: Registry) -> Self {
        self.tools = tools;
        self
    }

    /// Sets which steps end a turn.
    #[inline]
    pub fn terminal_steps(mut self, terminal: TerminalSteps) -> Self {
        self.terminal = terminal;
        self
    }

    /// Sets what happens with replies that are not valid steps.
    #[inline]
    pub fn on_parse_failure(mut self, policy: ParseFailurePolicy) -> Self {
        self.on_parse_failure = policy;
        self
    }

    /// Limits the number of model calls per turn. `None` means unbounded.
    #[inline]
    pub fn max_rounds(mut self, max_rounds: Option<usize>) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Sets the token that cancels running turns.
    #[inline]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Attaches a callback that sees every step, tool call and observation.
    #[inline]
    pub fn on_event(
        mut self,
        observer: impl Fn(LoopEvent<'_>) + Send + Sync + 'static,
    ) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Builds the loop.
    pub fn build(self) -> TurnLoop {
        let Self {
            model_client,
            system_prompt,
            transcript,
            tools,
            terminal,
            on_parse_failure,
            max_rounds,
            cancel,
            observer,
        } = self;

        let transcript = match (transcript, system_prompt) {
            (Some(transcript), _) => transcript,
            (None, Some(prompt)) => Transcript::with_system_prompt(prompt),
            (None, None) => Transcript::default(),
        };
        TurnLoop {
            model_client,
            tools,
            transcript,
            terminal,
            on_parse_failure,
            max_rounds,
            cancel: cancel.unwrap_or_default(),
            observer,
        }
    }
}
