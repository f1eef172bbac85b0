use std::future::ready;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use stepwise_model::{ModelMessage, ResponseFormat};
use stepwise_test_model::{PresetResponse, TestModelProvider};
use tokio_util::sync::CancellationToken;

use super::*;
use crate::tool::{Error as ToolError, Tool, ToolResult};

struct Weather {
    schema: Value,
}

#[derive(Deserialize)]
struct WeatherInput {
    city: String,
}

impl Weather {
    fn new() -> Self {
        Self {
            schema: json!({
                "type": "object",
                "properties": { "city": { "type": "string" } },
                "required": ["city"],
            }),
        }
    }
}

impl Tool for Weather {
    type Input = WeatherInput;

    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Current weather for a city"
    }

    fn parameter_schema(&self) -> &Value {
        &self.schema
    }

    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        ready(match input.city.as_str() {
            "Atlantis" => {
                Err(ToolError::execution_error().with_reason("city not found"))
            }
            city => Ok(format!("The weather in {city} is Sunny +21°C.")),
        })
    }
}

fn script(provider: &TestModelProvider, steps: &[Value]) {
    for step in steps {
        provider.push_response(PresetResponse::json(step.clone()));
    }
}

fn user_contents(messages: &[ModelMessage]) -> Vec<&str> {
    messages
        .iter()
        .filter(|m| matches!(m, ModelMessage::User { .. }))
        .map(ModelMessage::content)
        .collect()
}

#[tokio::test]
async fn test_chain_of_thought_stops_on_result() {
    let provider = TestModelProvider::default();
    script(
        &provider,
        &[
            json!({ "step": "analyse", "content": "The user asks for 2 + 2." }),
            json!({ "step": "think", "content": "Add the numbers." }),
            json!({ "step": "output", "content": "4" }),
            json!({ "step": "validate", "content": "2 + 2 is 4." }),
            json!({ "step": "result", "content": "2 + 2 = 4" }),
            // Never requested.
            json!({ "step": "result", "content": "unused" }),
        ],
    );

    let seen = Arc::new(Mutex::new(vec![]));
    let mut turn_loop = TurnLoopBuilder::new(ModelClient::new(provider.clone()))
        .with_system_prompt("Think step by step.")
        .on_event({
            let seen = Arc::clone(&seen);
            move |event| {
                if let LoopEvent::Step(step) = event {
                    seen.lock().unwrap().push(step.kind());
                }
            }
        })
        .build();

    let outcome = turn_loop.run_turn("What is 2 + 2?").await.unwrap();
    assert_eq!(outcome.content(), "2 + 2 = 4");
    assert_eq!(outcome.rounds, 5);
    assert_eq!(provider.request_count(), 5);
    assert_eq!(provider.remaining(), 1);
    assert_eq!(
        *seen.lock().unwrap(),
        [
            StepKind::Analyse,
            StepKind::Think,
            StepKind::Output,
            StepKind::Validate,
            StepKind::Result,
        ]
    );

    // System, user, then one assistant message per step.
    assert_eq!(turn_loop.transcript().len(), 7);
    let requests = provider.requests();
    assert!(
        requests
            .iter()
            .all(|r| r.response_format == ResponseFormat::JsonObject)
    );
    assert_eq!(requests[4].messages.len(), 6);
}

#[tokio::test]
async fn test_action_observe_output() {
    let provider = TestModelProvider::default();
    script(
        &provider,
        &[
            json!({ "step": "plan", "content": "Look up the weather." }),
            json!({ "step": "action", "function": "get_weather", "input": "Paris" }),
            json!({ "step": "output", "content": "It is sunny in Paris." }),
        ],
    );

    let mut turn_loop = TurnLoopBuilder::new(ModelClient::new(provider.clone()))
        .with_tool(Weather::new())
        .terminal_steps(TerminalSteps::Output)
        .build();

    let outcome = turn_loop.run_turn("Weather in Paris?").await.unwrap();
    assert_eq!(outcome.content(), "It is sunny in Paris.");

    let last_request = provider.requests().pop().unwrap();
    let users = user_contents(&last_request.messages);
    assert_eq!(users.len(), 2);
    assert_eq!(
        serde_json::from_str::<Value>(users[1]).unwrap(),
        json!({
            "step": "observe",
            "output": "The weather in Paris is Sunny +21°C.",
        })
    );
    // Step replies are never sent with native tool definitions.
    assert!(last_request.tools.is_empty());
}

#[tokio::test]
async fn test_unknown_tool_is_observed() {
    let provider = TestModelProvider::default();
    script(
        &provider,
        &[
            json!({ "step": "action", "function": "get_wether", "input": { "city": "Oslo" } }),
            json!({ "step": "action", "function": "get_weather", "input": { "city": "Atlantis" } }),
            json!({ "step": "output", "content": "Sorry." }),
        ],
    );

    let mut turn_loop = TurnLoopBuilder::new(ModelClient::new(provider.clone()))
        .with_tool(Weather::new())
        .terminal_steps(TerminalSteps::Output)
        .build();
    turn_loop.run_turn("Weather?").await.unwrap();

    let requests = provider.requests();
    let after_unknown = user_contents(&requests[1].messages);
    assert_eq!(after_unknown.len(), 2);
    assert_eq!(
        after_unknown[1],
        r#"{"step":"observe","output":"Unknown tool: get_wether"}"#
    );

    let after_failure = user_contents(&requests[2].messages);
    assert_eq!(after_failure.len(), 3);
    assert_eq!(
        after_failure[2],
        r#"{"step":"observe","output":"Tool error: city not found"}"#
    );
}

#[tokio::test]
async fn test_parse_failure_policies() {
    let provider = TestModelProvider::default();
    provider.push_response(PresetResponse::text("Sure! The answer is 4."));

    let mut turn_loop =
        TurnLoopBuilder::new(ModelClient::new(provider.clone())).build();
    let err = turn_loop.run_turn("2 + 2?").await.unwrap_err();
    let LoopError::InvalidReply { raw, source } = err else {
        panic!("expected an invalid reply");
    };
    assert_eq!(raw, "Sure! The answer is 4.");
    assert!(matches!(source, StepError::InvalidJson(_)));
    // The raw reply is not kept on abort.
    assert_eq!(turn_loop.transcript().len(), 1);

    let provider = TestModelProvider::default();
    provider.push_response(PresetResponse::json(json!({ "content": "4?" })));
    provider.push_response(PresetResponse::json(
        json!({ "step": "result", "content": "4" }),
    ));
    let mut turn_loop = TurnLoopBuilder::new(ModelClient::new(provider.clone()))
        .on_parse_failure(ParseFailurePolicy::Skip)
        .build();
    let outcome = turn_loop.run_turn("2 + 2?").await.unwrap();
    assert_eq!(outcome.content(), "4");
    assert_eq!(outcome.rounds, 2);
    assert_eq!(provider.request_count(), 2);
}

#[tokio::test]
async fn test_unrecognised_step_ends_turn_when_any_step_does() {
    let provider = TestModelProvider::default();
    script(
        &provider,
        &[json!({
            "step": "answer",
            "content": "Paris is the capital of France.",
        })],
    );

    let mut turn_loop = TurnLoopBuilder::new(ModelClient::new(provider.clone()))
        .with_system_prompt("Output JSON with the keys: step, content.")
        .terminal_steps(TerminalSteps::Any)
        .build();

    let outcome = turn_loop.run_turn("Capital of France?").await.unwrap();
    assert_eq!(outcome.content(), "Paris is the capital of France.");
    assert_eq!(outcome.step.name(), "answer");
    assert_eq!(outcome.rounds, 1);
    assert_eq!(turn_loop.transcript().len(), 3);
}

#[tokio::test]
async fn test_unrecognised_step_is_reported_and_loop_continues() {
    let provider = TestModelProvider::default();
    script(
        &provider,
        &[
            json!({ "step": "reflect", "content": "Let me double check." }),
            json!({ "step": "result", "content": "2 + 2 = 4" }),
        ],
    );

    let seen = Arc::new(Mutex::new(vec![]));
    let mut turn_loop = TurnLoopBuilder::new(ModelClient::new(provider.clone()))
        .on_event({
            let seen = Arc::clone(&seen);
            move |event| match event {
                LoopEvent::Step(step) => {
                    seen.lock().unwrap().push(step.name().to_owned())
                }
                LoopEvent::InvalidReply { .. } => {
                    seen.lock().unwrap().push("invalid".to_owned())
                }
                _ => {}
            }
        })
        .build();

    let outcome = turn_loop.run_turn("What is 2 + 2?").await.unwrap();
    assert_eq!(outcome.content(), "2 + 2 = 4");
    assert_eq!(outcome.rounds, 2);
    assert_eq!(*seen.lock().unwrap(), ["reflect", "result"]);
    // The unrecognised reply stays in the transcript.
    assert_eq!(provider.requests()[1].messages.len(), 2);
}

#[tokio::test]
async fn test_any_step_ends_turn_and_history_is_kept() {
    let provider = TestModelProvider::default();
    script(
        &provider,
        &[
            json!({ "step": "think", "content": "Hello there." }),
            json!({ "step": "output", "content": "You said hi." }),
        ],
    );

    let mut turn_loop = TurnLoopBuilder::new(ModelClient::new(provider.clone()))
        .with_system_prompt("You are honest.")
        .terminal_steps(TerminalSteps::Any)
        .build();

    let first = turn_loop.run_turn("hi").await.unwrap();
    assert_eq!(first.content(), "Hello there.");
    let second = turn_loop.run_turn("what did I say?").await.unwrap();
    assert_eq!(second.content(), "You said hi.");

    let requests = provider.requests();
    assert_eq!(requests[1].messages.len(), 4);
    assert_eq!(user_contents(&requests[1].messages), ["hi", "what did I say?"]);
}

#[tokio::test]
async fn test_turn_limit() {
    let provider = TestModelProvider::default();
    script(
        &provider,
        &[
            json!({ "step": "think", "content": "Hmm." }),
            json!({ "step": "think", "content": "Hmm..." }),
            json!({ "step": "result", "content": "Too late." }),
        ],
    );

    let mut turn_loop = TurnLoopBuilder::new(ModelClient::new(provider.clone()))
        .max_rounds(Some(2))
        .build();
    let err = turn_loop.run_turn("Think hard.").await.unwrap_err();
    assert!(matches!(err, LoopError::TurnLimitExceeded(2)));
    assert_eq!(provider.request_count(), 2);
}

#[tokio::test]
async fn test_cancellation() {
    let mut provider = TestModelProvider::default();
    provider.set_delay(Duration::from_secs(60));
    provider.push_response(PresetResponse::json(
        json!({ "step": "result", "content": "slow" }),
    ));

    let token = CancellationToken::new();
    let mut turn_loop = TurnLoopBuilder::new(ModelClient::new(provider))
        .with_cancellation(token.clone())
        .build();

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
    });
    let err = turn_loop.run_turn("Take your time.").await.unwrap_err();
    assert!(matches!(err, LoopError::Cancelled));
    canceller.await.unwrap();
}

#[tokio::test]
async fn test_replayed_transcript_sends_same_payload() {
    let provider = TestModelProvider::default();
    script(
        &provider,
        &[
            json!({ "step": "plan", "content": "Check the weather." }),
            json!({ "step": "action", "function": "get_weather", "input": { "city": "Rome" } }),
            json!({ "step": "output", "content": "Sunny." }),
        ],
    );
    let mut turn_loop = TurnLoopBuilder::new(ModelClient::new(provider.clone()))
        .with_system_prompt("Use tools.")
        .with_tool(Weather::new())
        .terminal_steps(TerminalSteps::Output)
        .build();
    turn_loop.run_turn("Rome?").await.unwrap();

    let exported = serde_json::to_string(turn_loop.transcript()).unwrap();
    let replayed: Transcript = serde_json::from_str(&exported).unwrap();

    let next = json!({ "step": "output", "content": "Still sunny." });
    provider.push_response(PresetResponse::json(next.clone()));
    turn_loop.run_turn("And now?").await.unwrap();

    let replay_provider = TestModelProvider::default();
    replay_provider.push_response(PresetResponse::json(next));
    let mut replayed_loop =
        TurnLoopBuilder::new(ModelClient::new(replay_provider.clone()))
            .with_transcript(replayed)
            .with_tool(Weather::new())
            .terminal_steps(TerminalSteps::Output)
            .build();
    replayed_loop.run_turn("And now?").await.unwrap();

    assert_eq!(
        provider.requests().last(),
        replay_provider.requests().last()
    );
}
