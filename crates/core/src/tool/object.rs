use std::pin::Pin;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tracing::Instrument;

use super::{Approval, ApprovalResult, Error, Tool, ToolResult};

pub(crate) type ApprovalHandler = Box<dyn Fn(Approval) + Send + Sync>;
pub(crate) type ToolFuture = Pin<Box<dyn Future<Output = ToolResult> + Send>>;

pub(crate) trait ToolObject: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameter_schema(&self) -> &Value;

    fn execute(
        self: Arc<Self>,
        arguments: Value,
        on_approval: Option<&ApprovalHandler>,
    ) -> ToolFuture;
}

pub(crate) struct ToolObjectImpl<T: Tool>(pub T);

impl<T: Tool> ToolObject for ToolObjectImpl<T> {
    #[inline]
    fn name(&self) -> &str {
        self.0.name()
    }

    #[inline]
    fn description(&self) -> &str {
        self.0.description()
    }

    #[inline]
    fn parameter_schema(&self) -> &Value {
        self.0.parameter_schema()
    }

    fn execute(
        self: Arc<Self>,
        arguments: Value,
        on_approval: Option<&ApprovalHandler>,
    ) -> ToolFuture {
        let arguments = bind_scalar(arguments, self.parameter_schema());
        let input: T::Input = match serde_json::from_value(arguments) {
            Ok(input) => input,
            Err(err) => {
                let reason = format!("{err}");
                return Box::pin(std::future::ready(ToolResult::Err(
                    Error::invalid_input().with_reason(reason),
                )));
            }
        };

        let approval_rx = match self.0.make_approval(&input) {
            Some(approval) => {
                let (approval_tx, approval_rx) = oneshot::channel();
                let approval = approval.bind(self.name(), move |result| {
                    approval_tx.send(result).ok();
                });
                match on_approval {
                    Some(on_approval) => on_approval(approval),
                    // No approval handler provided, assuming unattended mode.
                    None => approval.approve(),
                }
                Some(approval_rx)
            }
            None => None,
        };

        Box::pin(
            async move {
                if let Some(approval_rx) = approval_rx {
                    let result = approval_rx
                        .await
                        .unwrap_or(ApprovalResult::Rejected(None));
                    trace!("tool call approval result: {result:?}");
                    if let ApprovalResult::Rejected(reason) = result {
                        let err = Error::rejected();
                        return Err(match reason {
                            Some(reason) => err.with_reason(reason),
                            None => err,
                        });
                    }
                }
                self.0.execute(input).await
            }
            .instrument(debug_span!("tool execute")),
        )
    }
}

/// Wraps a non-object input into an object when the schema names exactly
/// one required property, e.g. `"Paris"` becomes `{"city": "Paris"}`.
fn bind_scalar(arguments: Value, schema: &Value) -> Value {
    if arguments.is_object() {
        return arguments;
    }
    let required = schema
        .get("required")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    match required {
        [Value::String(name)] => {
            let mut object = Map::new();
            object.insert(name.clone(), arguments);
            Value::Object(object)
        }
        // An absent input for a tool without parameters.
        [] if arguments.is_null() => Value::Object(Map::new()),
        _ => arguments,
    }
}
