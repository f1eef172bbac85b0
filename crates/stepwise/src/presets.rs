//! Ready-made agent configurations.
//!
//! A preset bundles a system prompt, the step that ends a turn and the
//! tools the model may call.

use std::fmt::{self, Display};
use std::str::FromStr;

use stepwise_core::TerminalSteps;

/// A ready-made agent configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Preset {
    /// Chain of thought through `analyse`, `think`, `output`, `validate`
    /// and `result` steps.
    #[default]
    Cot,
    /// The Nova persona, speaking the same step protocol.
    Persona,
    /// A single reply per query that admits it has no live data.
    Honest,
    /// A single reply per query from a general assistant.
    Assistant,
    /// Plan, act and observe with the weather tool.
    Weather,
    /// Plan, act and observe with the weather and shell tools.
    Operator,
    /// Native tool calling over the employee database.
    Employees,
}

/// The tools a preset hands to the model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolSet {
    /// No tools.
    None,
    /// `get_weather`.
    Weather,
    /// `get_weather` and `run_command`.
    WeatherAndShell,
    /// The employee database tools.
    Employees,
}

impl Preset {
    /// Every preset, in display order.
    pub const ALL: [Preset; 7] = [
        Preset::Cot,
        Preset::Persona,
        Preset::Honest,
        Preset::Assistant,
        Preset::Weather,
        Preset::Operator,
        Preset::Employees,
    ];

    /// Returns the name used on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            Preset::Cot => "cot",
            Preset::Persona => "persona",
            Preset::Honest => "honest",
            Preset::Assistant => "assistant",
            Preset::Weather => "weather",
            Preset::Operator => "operator",
            Preset::Employees => "employees",
        }
    }

    /// Returns the system prompt that opens the transcript.
    pub fn system_prompt(&self) -> String {
        match self {
            Preset::Cot => include_str!("prompts/cot.md").to_owned(),
            Preset::Persona => include_str!("prompts/persona.md").to_owned(),
            Preset::Honest => include_str!("prompts/honest.md").to_owned(),
            Preset::Assistant => {
                include_str!("prompts/assistant.md").to_owned()
            }
            Preset::Weather => include_str!("prompts/weather.md").to_owned(),
            Preset::Operator => include_str!("prompts/operator.md")
                .replace("{{HOST_OS}}", host_os()),
            Preset::Employees => {
                include_str!("prompts/employees.md").to_owned()
            }
        }
    }

    /// Returns the steps that end a turn of the step protocol.
    ///
    /// Returns `None` for presets that use native tool calling instead.
    pub fn terminal_steps(&self) -> Option<TerminalSteps> {
        match self {
            Preset::Cot | Preset::Persona => Some(TerminalSteps::Result),
            Preset::Honest | Preset::Assistant => Some(TerminalSteps::Any),
            Preset::Weather | Preset::Operator => Some(TerminalSteps::Output),
            Preset::Employees => None,
        }
    }

    /// Returns the tools the preset hands to the model.
    pub fn tool_set(&self) -> ToolSet {
        match self {
            Preset::Weather => ToolSet::Weather,
            Preset::Operator => ToolSet::WeatherAndShell,
            Preset::Employees => ToolSet::Employees,
            _ => ToolSet::None,
        }
    }

    /// Returns `true` if the preset runs on native tool calling.
    #[inline]
    pub fn uses_graph(&self) -> bool {
        self.terminal_steps().is_none()
    }
}

impl Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown preset name.
#[derive(Debug, thiserror::Error)]
#[error("unknown preset `{0}`, expected one of: cot, persona, honest, assistant, weather, operator, employees")]
pub struct UnknownPreset(String);

impl FromStr for Preset {
    type Err = UnknownPreset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Preset::ALL
            .into_iter()
            .find(|preset| preset.name() == name)
            .ok_or_else(|| UnknownPreset(s.to_owned()))
    }
}

#[inline]
fn host_os() -> &'static str {
    match std::env::consts::OS {
        "linux" => "Linux",
        "macos" => "macOS",
        "windows" => "Windows",
        _ => "some other OS",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        for preset in Preset::ALL {
            assert_eq!(preset.name().parse::<Preset>().unwrap(), preset);
        }
        assert_eq!(" COT ".parse::<Preset>().unwrap(), Preset::Cot);
        assert!("nova".parse::<Preset>().is_err());
    }

    #[test]
    fn test_terminal_policy() {
        assert_eq!(Preset::Cot.terminal_steps(), Some(TerminalSteps::Result));
        assert_eq!(Preset::Honest.terminal_steps(), Some(TerminalSteps::Any));
        assert_eq!(
            Preset::Operator.terminal_steps(),
            Some(TerminalSteps::Output)
        );
        assert!(Preset::Employees.uses_graph());
        assert!(!Preset::Weather.uses_graph());
    }

    #[test]
    fn test_prompts() {
        assert!(Preset::Cot.system_prompt().contains("thinking..."));
        assert!(Preset::Persona.system_prompt().contains("Nova"));
        let operator = Preset::Operator.system_prompt();
        assert!(operator.contains("run_command"));
        assert!(!operator.contains("{{HOST_OS}}"));
        assert_eq!(Preset::Operator.tool_set(), ToolSet::WeatherAndShell);
        assert_eq!(Preset::Assistant.tool_set(), ToolSet::None);
    }
}
