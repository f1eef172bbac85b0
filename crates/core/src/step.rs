//! The JSON step protocol spoken by the prompted models.
//!
//! Every model reply is a single JSON object whose `step` field names one
//! stage of the reasoning. Replies are decoded once into [`Step`] and the
//! rest of the crate only ever matches on the enum.

use std::fmt::{self, Display};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One decoded model reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "lowercase")]
pub enum Step {
    /// The model restates the problem.
    #[serde(alias = "analyze")]
    Analyse {
        /// Free-form text.
        #[serde(default, deserialize_with = "lenient_text")]
        content: String,
    },
    /// The model reasons about the problem.
    Think {
        /// Free-form text.
        #[serde(default, deserialize_with = "lenient_text")]
        content: String,
    },
    /// An intermediate or final answer.
    Output {
        /// Free-form text.
        #[serde(default, deserialize_with = "lenient_text")]
        content: String,
    },
    /// The model checks its own output.
    Validate {
        /// Free-form text.
        #[serde(default, deserialize_with = "lenient_text")]
        content: String,
    },
    /// The final answer of a chain of thought.
    Result {
        /// Free-form text.
        #[serde(default, deserialize_with = "lenient_text")]
        content: String,
    },
    /// The model plans how to use its tools.
    Plan {
        /// Free-form text.
        #[serde(default, deserialize_with = "lenient_text")]
        content: String,
    },
    /// The model asks for a tool to be called.
    Action {
        /// Free-form text.
        #[serde(default, deserialize_with = "lenient_text")]
        content: String,
        /// Name of the tool to call.
        function: String,
        /// Input for the tool, either an object of named arguments or a
        /// single scalar.
        #[serde(default)]
        input: Value,
    },
    /// The result of a tool call, written by the loop.
    Observe {
        /// The tool output.
        #[serde(alias = "content", default, deserialize_with = "lenient_text")]
        output: String,
    },
    /// A step whose name is outside the vocabulary above.
    ///
    /// It only ends a turn when every reply does.
    #[serde(skip)]
    Other {
        /// The step name as sent, lowercased.
        name: String,
        /// Free-form text.
        content: String,
    },
}

/// The name of a step, without its payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum StepKind {
    Analyse,
    Think,
    Output,
    Validate,
    Result,
    Plan,
    Action,
    Observe,
    Other,
}

impl StepKind {
    /// Returns the wire name of the step.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Analyse => "analyse",
            StepKind::Think => "think",
            StepKind::Output => "output",
            StepKind::Validate => "validate",
            StepKind::Result => "result",
            StepKind::Plan => "plan",
            StepKind::Action => "action",
            StepKind::Observe => "observe",
            StepKind::Other => "other",
        }
    }

    fn from_wire(name: &str) -> Option<Self> {
        Some(match name {
            "analyse" | "analyze" => StepKind::Analyse,
            "think" => StepKind::Think,
            "output" => StepKind::Output,
            "validate" => StepKind::Validate,
            "result" => StepKind::Result,
            "plan" => StepKind::Plan,
            "action" => StepKind::Action,
            "observe" => StepKind::Observe,
            _ => return None,
        })
    }
}

impl Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a reply could not be decoded into a [`Step`].
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// The reply is not JSON at all.
    #[error("response is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    /// The reply is JSON but not an object.
    #[error("expected a JSON object")]
    NotAnObject,
    /// The object has no string `step` field.
    #[error("missing `step` field")]
    MissingStep,
    /// The step is known but its fields don't fit.
    #[error("malformed `{step}` step: {source}")]
    Malformed {
        /// The step that failed.
        step: StepKind,
        /// The underlying decode error.
        #[source]
        source: serde_json::Error,
    },
}

impl Step {
    /// Decodes a raw model reply.
    ///
    /// Surrounding whitespace is ignored and the step name is trimmed and
    /// matched case-insensitively. Names outside the vocabulary decode to
    /// [`Step::Other`].
    pub fn decode(raw: &str) -> Result<Self, StepError> {
        let value: Value =
            serde_json::from_str(raw.trim()).map_err(StepError::InvalidJson)?;
        let Value::Object(mut object) = value else {
            return Err(StepError::NotAnObject);
        };
        let name = match object.get("step") {
            Some(Value::String(name)) => name.trim().to_ascii_lowercase(),
            _ => return Err(StepError::MissingStep),
        };
        let Some(kind) = StepKind::from_wire(&name) else {
            trace!("unrecognised step `{name}`");
            let content = match object.remove("content") {
                Some(Value::String(text)) => text,
                None | Some(Value::Null) => String::new(),
                Some(other) => other.to_string(),
            };
            return Ok(Step::Other { name, content });
        };
        object.insert("step".to_owned(), Value::String(kind.as_str().to_owned()));
        serde_json::from_value(Value::Object(object))
            .map_err(|source| StepError::Malformed { step: kind, source })
    }

    /// Creates an observation step.
    #[inline]
    pub fn observe(output: impl Into<String>) -> Self {
        Step::Observe {
            output: output.into(),
        }
    }

    /// Returns the kind of this step.
    pub fn kind(&self) -> StepKind {
        match self {
            Step::Analyse { .. } => StepKind::Analyse,
            Step::Think { .. } => StepKind::Think,
            Step::Output { .. } => StepKind::Output,
            Step::Validate { .. } => StepKind::Validate,
            Step::Result { .. } => StepKind::Result,
            Step::Plan { .. } => StepKind::Plan,
            Step::Action { .. } => StepKind::Action,
            Step::Observe { .. } => StepKind::Observe,
            Step::Other { .. } => StepKind::Other,
        }
    }

    /// Returns the step name as it appears on the wire.
    pub fn name(&self) -> &str {
        match self {
            Step::Other { name, .. } => name,
            _ => self.kind().as_str(),
        }
    }

    /// Returns the text carried by the step.
    ///
    /// For observations this is the tool output.
    pub fn content(&self) -> &str {
        match self {
            Step::Analyse { content }
            | Step::Think { content }
            | Step::Output { content }
            | Step::Validate { content }
            | Step::Result { content }
            | Step::Plan { content }
            | Step::Action { content, .. }
            | Step::Other { content, .. } => content,
            Step::Observe { output } => output,
        }
    }

    /// Encodes the step as a compact JSON object.
    pub fn to_json(&self) -> String {
        // Only `Other` is skipped by serde.
        serde_json::to_string(self).unwrap_or_else(|_| {
            let mut object = Map::new();
            object.insert("step".to_owned(), self.name().into());
            object.insert("content".to_owned(), self.content().into());
            Value::Object(object).to_string()
        })
    }
}

// Models sometimes answer with a number or an object where text is expected
// (e.g. `"content": 202.5`). Keep such values as their JSON text.
fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}
