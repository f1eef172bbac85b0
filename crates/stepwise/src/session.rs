use std::sync::Arc;

use reqwest::Client;
use stepwise_core::graph::{CompiledGraph, GraphError, MessageObserver, tool_agent};
use stepwise_core::tool::Approval;
use stepwise_core::{
    CancellationToken, LoopError, LoopEvent, ModelClient, ParseFailurePolicy,
    Registry, Transcript, TurnLoop, TurnLoopBuilder,
};
use stepwise_model::{ModelMessage, ModelProvider};

use crate::presets::{Preset, ToolSet};
use crate::store::EmployeeStore;
use crate::tools::*;

type StepObserver = Box<dyn Fn(LoopEvent<'_>) + Send + Sync>;
type ApprovalHandler = Arc<dyn Fn(Approval) + Send + Sync>;

/// Errors raised while building or talking to a [`Session`].
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The preset needs the employee database but none was given.
    #[error("the `{0}` preset needs an employee database")]
    MissingStore(Preset),
    /// A step-protocol turn failed.
    #[error(transparent)]
    Turn(#[from] LoopError),
    /// A graph run failed.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder {
    model_client: ModelClient,
    preset: Preset,
    system_prompt: Option<String>,
    max_rounds: Option<usize>,
    on_parse_failure: ParseFailurePolicy,
    cancel: CancellationToken,
    on_step: Option<StepObserver>,
    on_message: Option<MessageObserver>,
    on_approval: Option<ApprovalHandler>,
    store: Option<EmployeeStore>,
    http_client: Option<Client>,
}

impl SessionBuilder {
    /// Creates a session builder with a specified model provider.
    pub fn with_model_provider<M: ModelProvider + 'static>(
        provider: M,
    ) -> Self {
        Self::with_model_client(ModelClient::new(provider))
    }

    /// Creates a session builder on top of a configured model client, for
    /// example one that retries rate-limited requests.
    pub fn with_model_client(model_client: ModelClient) -> Self {
        Self {
            model_client,
            preset: Preset::default(),
            system_prompt: None,
            max_rounds: None,
            on_parse_failure: ParseFailurePolicy::default(),
            cancel: CancellationToken::new(),
            on_step: None,
            on_message: None,
            on_approval: None,
            store: None,
            http_client: None,
        }
    }

    /// Selects the preset.
    #[inline]
    pub fn with_preset(mut self, preset: Preset) -> Self {
        self.preset = preset;
        self
    }

    /// Replaces the preset's system prompt.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Limits the model calls per query. `None` means unbounded.
    #[inline]
    pub fn max_rounds(mut self, max_rounds: Option<usize>) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Sets what happens with replies that are not valid steps.
    #[inline]
    pub fn on_parse_failure(mut self, policy: ParseFailurePolicy) -> Self {
        self.on_parse_failure = policy;
        self
    }

    /// Sets the token that cancels the running query.
    #[inline]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Attaches a callback that sees every step, tool call and observation
    /// of the step protocol.
    #[inline]
    pub fn on_step(
        mut self,
        on_step: impl Fn(LoopEvent<'_>) + Send + Sync + 'static,
    ) -> Self {
        self.on_step = Some(Box::new(on_step));
        self
    }

    /// Attaches a callback that sees every message appended by the
    /// native tool-calling agent.
    #[inline]
    pub fn on_message(
        mut self,
        on_message: impl Fn(&ModelMessage) + Send + Sync + 'static,
    ) -> Self {
        self.on_message = Some(Arc::new(on_message));
        self
    }

    /// Attaches a callback that answers approvals for tools with side
    /// effects. Without it such tools run unattended.
    #[inline]
    pub fn on_approval(
        mut self,
        on_approval: impl Fn(Approval) + Send + Sync + 'static,
    ) -> Self {
        self.on_approval = Some(Arc::new(on_approval));
        self
    }

    /// Sets the employee database used by the `employees` preset.
    #[inline]
    pub fn with_store(mut self, store: EmployeeStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the HTTP client shared by the network tools.
    #[inline]
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Builds a new session.
    pub fn build(self) -> Result<Session, SessionError> {
        let Self {
            model_client,
            preset,
            system_prompt,
            max_rounds,
            on_parse_failure,
            cancel,
            on_step,
            on_message,
            on_approval,
            store,
            http_client,
        } = self;

        let mut tools = Registry::default();
        if let Some(on_approval) = on_approval {
            tools.on_approval(move |approval| on_approval(approval));
        }
        let http_client = http_client.unwrap_or_default();
        match preset.tool_set() {
            ToolSet::None => {}
            ToolSet::Weather => tools.add_tool(WeatherTool::new(http_client)),
            ToolSet::WeatherAndShell => {
                tools.add_tool(WeatherTool::new(http_client));
                tools.add_tool(RunCommandTool::new());
            }
            ToolSet::Employees => {
                let store =
                    store.ok_or(SessionError::MissingStore(preset))?;
                register_employee_tools(&mut tools, &store);
            }
        }
        let system_prompt =
            system_prompt.unwrap_or_else(|| preset.system_prompt());
        debug!(
            "building {preset} session with tools: {:?}",
            tools.names().collect::<Vec<_>>()
        );

        let agent = match preset.terminal_steps() {
            Some(terminal) => {
                let mut builder = TurnLoopBuilder::new(model_client)
                    .with_system_prompt(system_prompt)
                    .with_tools(tools)
                    .terminal_steps(terminal)
                    .on_parse_failure(on_parse_failure)
                    .max_rounds(max_rounds)
                    .with_cancellation(cancel);
                if let Some(on_step) = on_step {
                    builder = builder.on_event(on_step);
                }
                Agent::Steps(builder.build())
            }
            None => {
                let graph = tool_agent(model_client, Arc::new(tools), on_message)?
                    .with_max_steps(max_rounds)
                    .with_cancellation(cancel);
                Agent::Graph {
                    graph,
                    system_prompt,
                }
            }
        };

        Ok(Session { preset, agent })
    }
}

enum Agent {
    Steps(TurnLoop),
    Graph {
        graph: CompiledGraph<Transcript>,
        system_prompt: String,
    },
}

/// A chat session, like a window that displays messages and has an input
/// box.
///
/// Step-protocol presets keep the transcript across messages. The
/// `employees` preset starts every message from the system prompt alone.
pub struct Session {
    preset: Preset,
    agent: Agent,
}

impl Session {
    /// Returns the preset the session was built with.
    #[inline]
    pub fn preset(&self) -> Preset {
        self.preset
    }

    /// Returns the step-protocol transcript, if the preset has one.
    pub fn transcript(&self) -> Option<&Transcript> {
        match &self.agent {
            Agent::Steps(turn_loop) => Some(turn_loop.transcript()),
            Agent::Graph { .. } => None,
        }
    }

    /// Sends a message and waits for the final answer.
    pub async fn send_message(
        &mut self,
        message: &str,
    ) -> Result<String, SessionError> {
        match &mut self.agent {
            Agent::Steps(turn_loop) => {
                let outcome = turn_loop.run_turn(message).await?;
                debug!("turn finished after {} round(s)", outcome.rounds);
                Ok(outcome.content().to_owned())
            }
            Agent::Graph {
                graph,
                system_prompt,
            } => {
                let mut state = Transcript::with_system_prompt(system_prompt.as_str());
                state.push_user(message);
                let state = graph.invoke(state).await?;
                Ok(state
                    .last()
                    .map(|msg| msg.content().to_owned())
                    .unwrap_or_default())
            }
        }
    }
}
