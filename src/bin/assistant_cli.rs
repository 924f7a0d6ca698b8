//! Ops Assistant CLI
//!
//! Runs instructions against the seeded in-memory store, either once
//! (`--text`) or as an interactive session.
//!
//! ```bash
//! cargo run --bin assistant_cli --features cli -- --role operator --text "urgent reports"
//! cargo run --bin assistant_cli --features cli -- --role viewer
//! ```

use std::collections::HashSet;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use ops_assistant::assistant::{
    parse_capabilities, AssistantPipeline, CallerContext, Capability, InMemoryDataStore,
    PermissionProvider, Query, ResponseEnvelope, StaticPermissionProvider,
};
use ops_assistant::config::AssistantConfig;

#[derive(Parser)]
#[command(name = "assistant_cli")]
#[command(version)]
#[command(about = "Talk to the ops assistant against an in-memory report store")]
#[command(long_about = None)]
struct Cli {
    /// Run a single instruction and exit
    #[arg(long, short)]
    text: Option<String>,

    /// Caller identity recorded with each query
    #[arg(long, default_value = "cli", env = "ASSISTANT_CALLER_ID")]
    caller: String,

    /// Role to act as (admin, operator, viewer, citizen); repeatable
    #[arg(long, short)]
    role: Vec<String>,

    /// Capability granted directly; repeatable or comma-separated
    #[arg(long, short)]
    permission: Vec<String>,

    /// Output format
    #[arg(long, short = 'o', default_value = "pretty", value_enum)]
    format: OutputFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
    Pretty,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = AssistantConfig::from_env()?;
    let store = Arc::new(InMemoryDataStore::seeded());
    let pipeline = AssistantPipeline::from_config(store, &config)?;
    let capabilities = resolve_capabilities(&cli);

    if let Some(text) = &cli.text {
        let envelope = pipeline
            .process(&Query::new(text.clone(), cli.caller.clone(), capabilities))
            .await;
        print_envelope(&envelope, cli.format)?;
        return Ok(());
    }

    if cli.format != OutputFormat::Json {
        let mut granted: Vec<&str> = capabilities.iter().map(Capability::as_str).collect();
        granted.sort_unstable();
        println!("Ops assistant ({} intents). Ctrl-D to quit.", pipeline.registry().len());
        println!("Capabilities: {}", if granted.is_empty() { "none".to_string() } else { granted.join(", ") });
    }

    let mut editor = DefaultEditor::new()?;
    loop {
        match editor.readline("assistant> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if matches!(line, "quit" | "exit") {
                    break;
                }
                let _ = editor.add_history_entry(line);
                let envelope = pipeline
                    .process(&Query::new(line, cli.caller.clone(), capabilities.iter().copied()))
                    .await;
                print_envelope(&envelope, cli.format)?;
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

fn resolve_capabilities(cli: &Cli) -> HashSet<Capability> {
    let mut capabilities: HashSet<Capability> = cli
        .permission
        .iter()
        .flat_map(|p| parse_capabilities(p))
        .collect();
    if !cli.role.is_empty() {
        let caller = CallerContext::new(cli.caller.clone(), cli.role.clone());
        capabilities.extend(StaticPermissionProvider::new().capabilities(&caller));
    }
    capabilities
}

fn print_envelope(envelope: &ResponseEnvelope, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(envelope)?),
        OutputFormat::Text => println!("{}", envelope.natural_response),
        OutputFormat::Pretty => {
            println!("{}", envelope.natural_response);
            println!(
                "  [{} -> {}, {:?} {:.1}]",
                envelope.intent,
                envelope.action,
                envelope.resolution,
                envelope.confidence
            );
        }
    }
    Ok(())
}
