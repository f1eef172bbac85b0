use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::future::ready;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use stepwise_model::ModelTool;

use super::object::{ApprovalHandler, ToolObject, ToolObjectImpl};
use super::{Approval, Error, ErrorKind, Tool, ToolResult};

/// The set of tools a model may call, looked up by name.
///
/// Tools are kept sorted by name so the definitions sent to the model are
/// the same on every request.
#[derive(Default)]
pub struct Registry {
    tools: BTreeMap<String, Arc<dyn ToolObject>>,
    on_approval: Option<ApprovalHandler>,
}

impl Registry {
    /// Registers a tool, replacing any tool with the same name.
    pub fn add_tool<T: Tool>(&mut self, tool: T) {
        let name = tool.name().to_owned();
        self.tools.insert(name, Arc::new(ToolObjectImpl(tool)));
    }

    /// Registers a tool.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.add_tool(tool);
        self
    }

    /// Sets the handler that answers approvals for tools with side effects.
    ///
    /// Without a handler every approval is granted.
    #[inline]
    pub fn on_approval<F: Fn(Approval) + Send + Sync + 'static>(
        &mut self,
        on_approval: F,
    ) {
        self.on_approval = Some(Box::new(on_approval));
    }

    /// Returns `true` if a tool with the name is registered.
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Returns the names of the registered tools.
    #[inline]
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    /// Returns the definitions advertised to the model for native tool
    /// calling.
    pub fn definitions(&self) -> Vec<ModelTool> {
        self.tools
            .values()
            .map(|tool| ModelTool {
                name: tool.name().to_owned(),
                description: tool.description().to_owned(),
                parameters: tool.parameter_schema().clone(),
            })
            .collect()
    }

    /// Calls a tool by name.
    ///
    /// An unknown name is reported as a [`NotFound`] error instead of
    /// panicking.
    ///
    /// [`NotFound`]: ErrorKind::NotFound
    pub fn invoke(
        &self,
        name: &str,
        arguments: Value,
    ) -> Pin<Box<dyn Future<Output = ToolResult> + Send>> {
        let Some(tool) = self.tools.get(name) else {
            warn!("tool not found: {name}");
            return Box::pin(ready(Err(
                Error::not_found().with_reason(format!("Unknown tool: {name}"))
            )));
        };
        trace!("invoking {name} with args: {arguments}");
        Arc::clone(tool).execute(arguments, self.on_approval.as_ref())
    }

    /// Calls a tool by name and turns the outcome into observation text.
    ///
    /// Failures never escape: an unknown name reads `Unknown tool: <name>`
    /// and any other error reads `Tool error: <reason>`.
    pub async fn observe(&self, name: &str, arguments: Value) -> String {
        match self.invoke(name, arguments).await {
            Ok(output) => output,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                format!("Unknown tool: {name}")
            }
            Err(err) => format!("Tool error: {}", err.reason()),
        }
    }
}

impl Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("on_approval", &self.on_approval.is_some())
            .finish()
    }
}
