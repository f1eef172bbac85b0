//! Transcript-related types.

use serde::{Deserialize, Serialize};
use stepwise_model::{ModelMessage, ModelRequest, ModelTool, ResponseFormat};

use crate::step::Step;

/// The ordered messages of one conversation.
///
/// A transcript is append-only. It serializes as a plain JSON array of
/// role-tagged messages, so it can be exported and replayed later.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<ModelMessage>,
}

impl Transcript {
    /// Creates a transcript that starts with a system prompt.
    #[inline]
    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![ModelMessage::system(prompt)],
        }
    }

    /// Appends a message.
    #[inline]
    pub fn push(&mut self, msg: ModelMessage) {
        self.messages.push(msg);
    }

    /// Appends a user message.
    #[inline]
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push(ModelMessage::user(content));
    }

    /// Appends an assistant message.
    #[inline]
    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.push(ModelMessage::assistant(content));
    }

    /// Appends a tool output as an `observe` step sent by the user.
    #[inline]
    pub fn push_observation(&mut self, output: impl Into<String>) {
        self.push_user(Step::observe(output).to_json());
    }

    /// Returns the messages, oldest first.
    #[inline]
    pub fn messages(&self) -> &[ModelMessage] {
        &self.messages
    }

    /// Returns the most recent message.
    #[inline]
    pub fn last(&self) -> Option<&ModelMessage> {
        self.messages.last()
    }

    /// Returns the number of messages.
    #[inline]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns `true` if the transcript has no messages.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Builds the request that sends the whole transcript to the model.
    pub fn to_request(
        &self,
        tools: Vec<ModelTool>,
        response_format: ResponseFormat,
    ) -> ModelRequest {
        ModelRequest {
            messages: self.messages.clone(),
            tools,
            response_format,
        }
    }
}

impl From<Vec<ModelMessage>> for Transcript {
    #[inline]
    fn from(messages: Vec<ModelMessage>) -> Self {
        Self { messages }
    }
}
