//! The `stepwise` command line.

#[macro_use]
extern crate tracing;

mod cli;

use std::io::Write as _;
use std::time::Duration;

use anyhow::{Context as _, bail};
use clap::Parser as _;
use cli::{Cli, Command};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use stepwise::core::tool::Approval;
use stepwise::core::{
    ExponentialBackoff, LoopEvent, ModelClient, ParseFailurePolicy, Step,
    TerminalSteps,
};
use stepwise::store::EmployeeStore;
use stepwise::{Preset, Session, SessionBuilder};
use stepwise_model::ModelMessage;
use stepwise_openai_model::{OpenAIConfigBuilder, OpenAIProvider};
use tokio::io::{self, AsyncBufReadExt};
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::sleep;

enum SessionEvent {
    Step(Step),
    InvalidReply(String),
    Observation(String),
    Message(ModelMessage),
    Approval(Approval),
}

const BAR_CHAR: &str = "▎";

const EMPLOYEES_BANNER: &str = "\
Employee records assistant. Try for example:
  - Add an employee named John Doe, 30, in DevOps with a salary of 90000
  - List all employees
  - Show employee 1
  - Raise the salary of employee 1 to 120000
  - Delete employee 1
";

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Command::Tokenize {
            tokenizer,
            text,
            decode,
        } => tokenize(tokenizer, text, decode),
        Command::Chat {
            preset,
            skip_invalid,
            query,
        } => {
            if preset.uses_graph() {
                bail!("use the `employees` command for the employee database");
            }
            let policy = if *skip_invalid {
                ParseFailurePolicy::Skip
            } else {
                ParseFailurePolicy::Abort
            };
            let builder = session_builder(&cli)?
                .with_preset(*preset)
                .on_parse_failure(policy);
            chat(builder, query.as_deref(), None).await
        }
        Command::Employees { db } => {
            let store = EmployeeStore::open(db).with_context(|| {
                format!("cannot open employee database {}", db.display())
            })?;
            let builder = session_builder(&cli)?
                .with_preset(Preset::Employees)
                .with_store(store);
            chat(builder, None, Some(EMPLOYEES_BANNER)).await
        }
    }
}

fn session_builder(cli: &Cli) -> anyhow::Result<SessionBuilder> {
    let api_key = cli
        .api_key
        .clone()
        .context("OPENAI_API_KEY is not set, pass --api-key or set it in .env")?;
    let config = OpenAIConfigBuilder::with_api_key(api_key)
        .with_base_url(&cli.base_url)
        .with_model(&cli.model)
        .build();
    debug!("using {config:?}");
    let provider = OpenAIProvider::new(config);

    let model_client = if cli.retry {
        ModelClient::with_retry(provider, ExponentialBackoff::default())
    } else {
        ModelClient::new(provider)
    };
    Ok(SessionBuilder::with_model_client(model_client).max_rounds(cli.max_rounds))
}

async fn chat(
    builder: SessionBuilder,
    query: Option<&str>,
    banner: Option<&str>,
) -> anyhow::Result<()> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();

    let mut session = builder
        .on_step({
            let event_tx = event_tx.clone();
            move |event| {
                let event = match event {
                    LoopEvent::Step(step) => SessionEvent::Step(step.clone()),
                    LoopEvent::InvalidReply { raw, .. } => {
                        SessionEvent::InvalidReply(raw.to_owned())
                    }
                    // The action step already shows the call.
                    LoopEvent::ToolCall { .. } => return,
                    LoopEvent::Observation(output) => {
                        SessionEvent::Observation(output.to_owned())
                    }
                };
                event_tx.send(event).ok();
            }
        })
        .on_message({
            let event_tx = event_tx.clone();
            move |msg| {
                event_tx.send(SessionEvent::Message(msg.clone())).ok();
            }
        })
        .on_approval({
            let event_tx = event_tx.clone();
            move |approval| {
                event_tx.send(SessionEvent::Approval(approval)).ok();
            }
        })
        .build()?;
    let terminal = session.preset().terminal_steps();

    if let Some(query) = query {
        return send(&mut session, query, &mut event_rx, terminal).await;
    }

    if let Some(banner) = banner {
        println!("{}", banner.bright_black());
    }
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = read_line().await else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }
        if let Err(err) = send(&mut session, line, &mut event_rx, terminal).await
        {
            println!("{}❌ {err:#}", BAR_CHAR.bright_red());
        }
    }
    Ok(())
}

async fn send(
    session: &mut Session,
    message: &str,
    event_rx: &mut mpsc::UnboundedReceiver<SessionEvent>,
    terminal: Option<TerminalSteps>,
) -> anyhow::Result<()> {
    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")?
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
    let mut progress_bar: Option<ProgressBar> = None;

    let reply = session.send_message(message);
    tokio::pin!(reply);

    let result = loop {
        // Create a new progress bar if it has been finished.
        progress_bar
            .get_or_insert_with(|| {
                let progress_bar = ProgressBar::new_spinner();
                progress_bar.set_style(progress_style.clone());
                progress_bar.set_message("🤔 Thinking...");
                progress_bar
            })
            .inc(1);

        select! {
            result = &mut reply => break result,
            Some(event) = event_rx.recv() => {
                if let Some(progress_bar) = progress_bar.take() {
                    progress_bar.finish_and_clear();
                }
                render(event, terminal).await;
            }
            _ = sleep(Duration::from_millis(100)) => {}
        }
    };
    if let Some(progress_bar) = progress_bar.take() {
        progress_bar.finish_and_clear();
    }

    // Events sent right before the reply resolved.
    while let Ok(event) = event_rx.try_recv() {
        render(event, terminal).await;
    }

    let answer = result?;
    println!("{}🤖 {}", BAR_CHAR.bright_cyan(), answer.bright_white());
    Ok(())
}

async fn render(event: SessionEvent, terminal: Option<TerminalSteps>) {
    match event {
        SessionEvent::Step(step) => {
            // The terminal step is printed as the answer.
            if terminal.is_some_and(|t| t.is_terminal(step.kind())) {
                return;
            }
            match &step {
                Step::Action {
                    function, input, ..
                } => println!(
                    "{}🛠️  {}({})",
                    BAR_CHAR.bright_yellow(),
                    function.bold(),
                    input
                ),
                _ => println!(
                    "{}🧠 {}: {}",
                    BAR_CHAR.bright_black(),
                    step.name(),
                    step.content().bright_black()
                ),
            }
        }
        SessionEvent::InvalidReply(raw) => {
            println!(
                "{}⚠️  Invalid reply: {}",
                BAR_CHAR.bright_red(),
                raw.trim().bright_black()
            );
        }
        SessionEvent::Observation(output) => {
            println!("{}👀 {}", BAR_CHAR.bright_blue(), output.trim());
        }
        SessionEvent::Message(msg) => match msg {
            ModelMessage::Assistant { tool_calls, .. } => {
                for call in tool_calls {
                    println!(
                        "{}🛠️  {}({})",
                        BAR_CHAR.bright_yellow(),
                        call.name.bold(),
                        call.arguments
                    );
                }
            }
            ModelMessage::Tool(result) => {
                println!("{}👀 {}", BAR_CHAR.bright_blue(), result.content.trim());
            }
            _ => {}
        },
        SessionEvent::Approval(approval) => {
            let bar = BAR_CHAR.bright_yellow();
            println!("\n{bar}⚠️  Agent wants to run command:");
            println!("{bar}{}", approval.what().bright_white().bold());
            print!("Proceed? [Y/n]: ");
            std::io::stdout().flush().ok();

            let Some(line) = read_line().await else {
                approval.reject(None);
                return;
            };
            let line = line.trim();
            if line.is_empty() || line.eq_ignore_ascii_case("y") {
                approval.approve();
            } else {
                approval.reject(None);
            }

            println!();
        }
    }
}

fn tokenize(model: &str, text: &str, decode: &[u32]) -> anyhow::Result<()> {
    let bpe = tiktoken_rs::get_bpe_from_model(model)
        .with_context(|| format!("no tokenizer for model {model}"))?;

    let tokens = bpe.encode_with_special_tokens(text);
    println!("Tokens: {tokens:?}");

    let ids = if decode.is_empty() {
        tokens
    } else {
        decode.to_vec()
    };
    let decoded = bpe.decode(ids).context("cannot decode token ids")?;
    println!("Decoded: {decoded}");
    Ok(())
}

async fn read_line() -> Option<String> {
    let mut stdin = io::BufReader::new(io::stdin());
    let mut line = String::new();

    match stdin.read_line(&mut line).await {
        Ok(count) => {
            if count == 0 {
                return None;
            }
            Some(line)
        }
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}
