use std::time::Duration;

use reqwest::{Client, StatusCode};
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::Value;
use stepwise_core::tool::{Error as ToolError, Tool, ToolResult};

const WTTR_URL: &str = "https://wttr.in";
const TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Deserialize, JsonSchema)]
pub struct WeatherToolParameters {
    #[schemars(description = "Name of the city, e.g. \"Paris\".")]
    city: String,
}

/// A tool that reports the current weather of a city via wttr.in.
pub struct WeatherTool {
    client: Client,
    base_url: String,
    parameter_schema: Value,
}

impl WeatherTool {
    /// Creates a new weather tool that shares the given HTTP client.
    #[inline]
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, WTTR_URL)
    }

    /// Creates a weather tool that queries another wttr.in-compatible host.
    pub fn with_base_url(client: Client, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client,
            base_url,
            parameter_schema: schema_for!(WeatherToolParameters).to_value(),
        }
    }
}

impl Tool for WeatherTool {
    type Input = WeatherToolParameters;

    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Returns the current weather condition and temperature of a city."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: WeatherToolParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let url = format!("{}/{}?format=%C+%t", self.base_url, input.city);
        let request = self.client.get(url).timeout(TIMEOUT);
        async move {
            let resp = request.send().await.map_err(|err| {
                ToolError::execution_error().with_reason(format!("{err}"))
            })?;
            if resp.status() != StatusCode::OK {
                debug!("weather lookup failed with {}", resp.status());
                return Ok("Something went wrong.".to_owned());
            }
            let body = resp.text().await.map_err(|err| {
                ToolError::execution_error().with_reason(format!("{err}"))
            })?;
            Ok(format!("The weather in {} is {}.", input.city, body.trim()))
        }
    }
}

#[cfg(test)]
mod tests {
    use stepwise_core::tool::{ErrorKind, Registry};

    use super::*;

    #[tokio::test]
    async fn test_unreachable_host_is_a_tool_error() {
        let tool = WeatherTool::with_base_url(Client::new(), "http://127.0.0.1:9/");
        assert_eq!(tool.base_url, "http://127.0.0.1:9");

        let registry = Registry::default().with_tool(tool);
        let err = registry
            .invoke("get_weather", Value::String("Paris".to_owned()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExecutionError);
    }
}
