use std::env;
use std::io;
use std::process::Output;

use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::Value;
use stepwise_core::tool::{Approval, Error as ToolError, Tool, ToolResult};
use tokio::process::Command;

#[derive(Deserialize, JsonSchema)]
pub struct RunCommandParameters {
    #[schemars(description = "The shell command to run.")]
    cmd: String,
}

/// A tool for running shell commands.
///
/// Every call asks for approval first.
pub struct RunCommandTool {
    parameter_schema: Value,
}

impl RunCommandTool {
    /// Creates a new shell tool.
    #[inline]
    pub fn new() -> Self {
        RunCommandTool {
            parameter_schema: schema_for!(RunCommandParameters).to_value(),
        }
    }
}

impl Default for RunCommandTool {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for RunCommandTool {
    type Input = RunCommandParameters;

    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Executes a local shell command and returns its exit code together with stdout and stderr."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn make_approval(&self, input: &Self::Input) -> Option<Approval> {
        Some(Approval::new(&input.cmd))
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: RunCommandParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        async move {
            debug!("running command: {}", input.cmd);
            run_command(&input.cmd).await.map_err(|err| {
                ToolError::execution_error().with_reason(format!("{err}"))
            })
        }
    }
}

#[inline]
fn create_command_with_inferred_shell() -> Command {
    let Some(shell) = env::var_os("SHELL") else {
        return Command::new("/bin/sh");
    };
    Command::new(shell)
}

async fn run_command(cmd: &str) -> Result<String, io::Error> {
    let output = create_command_with_inferred_shell()
        .arg("-c")
        .arg(cmd)
        .output()
        .await?;
    Ok(format_output(&output))
}

fn format_output(output: &Output) -> String {
    let mut result = match output.status.code() {
        Some(code) => format!("Command executed with exit code {code}"),
        None => "Command terminated by a signal".to_owned(),
    };
    if !output.stdout.is_empty() {
        result.push_str("\n==> STDOUT <==\n");
        result.push_str(&String::from_utf8_lossy(&output.stdout));
    }
    if !output.stderr.is_empty() {
        result.push_str("\n==> STDERR <==\n");
        result.push_str(&String::from_utf8_lossy(&output.stderr));
    }
    result
}
