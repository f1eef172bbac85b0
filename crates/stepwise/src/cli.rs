use std::path::PathBuf;

use clap::{Parser, Subcommand};
use stepwise::Preset;

/// Prompting patterns against an OpenAI-compatible chat model.
#[derive(Debug, Parser)]
#[command(name = "stepwise", version, about)]
pub struct Cli {
    /// API key of the completion endpoint.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// Base URL of the completion endpoint.
    #[arg(
        long,
        env = "OPENAI_BASE_URL",
        default_value = "https://api.openai.com/v1",
        global = true
    )]
    pub base_url: String,

    /// Chat model to talk to.
    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4.1", global = true)]
    pub model: String,

    /// Maximum model calls per query. Unbounded when omitted.
    #[arg(long, env = "STEPWISE_MAX_ROUNDS", global = true)]
    pub max_rounds: Option<usize>,

    /// Retry rate-limited requests with exponential backoff.
    #[arg(long, global = true)]
    pub retry: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Chat with one of the step-protocol presets.
    Chat {
        /// cot, persona, honest, assistant, weather or operator.
        #[arg(short, long, default_value_t = Preset::Cot)]
        preset: Preset,

        /// Ask the reply to a malformed step again instead of giving up.
        #[arg(long)]
        skip_invalid: bool,

        /// Answer a single query and exit.
        #[arg(short, long)]
        query: Option<String>,
    },
    /// Manage employee records in natural language.
    Employees {
        /// SQLite database file.
        #[arg(long, env = "STEPWISE_EMPLOYEES_DB", default_value = "employees.db")]
        db: PathBuf,
    },
    /// Encode text into token ids and decode ids back into text.
    Tokenize {
        /// Model whose tokenizer is used.
        #[arg(long, default_value = "gpt-4o")]
        tokenizer: String,

        /// Text to encode.
        #[arg(default_value = "Hello, I am aryan")]
        text: String,

        /// Comma-separated token ids to decode. Defaults to the encoded ids.
        #[arg(long, value_delimiter = ',')]
        decode: Vec<u32>,
    },
}
