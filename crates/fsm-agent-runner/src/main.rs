//! A small demonstration harness: runs one FSM document against one
//! subprocess tool server.
//!
//! This is explicitly not the "CLI/HTTP surface" spec §1 places out of
//! scope — there is no package format, no multi-agent registry, nothing
//! beyond what it takes to run one FSM end to end from a terminal. Every
//! `llm` state in the document it runs is expected to name its service
//! `"interactive"`: this binary answers that service itself, printing the
//! composed prompt stack and reading a reply line from stdin.

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use fsm_rt::error::Result as FsmResult;
use fsm_rt::observability::tracing_setup;
use fsm_rt::schema::Schema;
use fsm_rt::store::{parse_fsm_document, LlmClient, LlmClientRegistry};
use fsm_rt::{start_fsm, EngineConfig, Event, FsmError, RunContext, SessionOutcome, XitionId, START};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

const INTERACTIVE_SERVICE: &str = "interactive";

#[derive(Debug, Parser)]
#[command(name = "fsm-agent-runner")]
#[command(about = "Run one FSM document against one subprocess tool server", long_about = None)]
struct Cli {
    /// Path to the FSM document (JSON).
    #[arg(value_name = "FSM_DOC")]
    fsm_doc: PathBuf,

    /// The tool server command to spawn for the document's `bridge/start`
    /// state to claim. Overrides whatever `command` the document itself
    /// names, so the same document can be pointed at different servers.
    #[arg(value_name = "TOOL_SERVER_COMMAND")]
    tool_server_command: String,

    /// Arguments passed to the tool server command.
    #[arg(value_name = "ARGS", trailing_var_arg = true)]
    tool_server_args: Vec<String>,

    /// The initial event's `[start, *]` destination state. Defaults to
    /// whichever state the document's own `[start, *]` transition names.
    #[arg(long, default_value = "")]
    entry_state: String,

    /// The initial event payload, as a JSON object.
    #[arg(long, default_value = "{}")]
    input: String,
}

/// Prompts on stdout, reads one reply line from stdin — a human standing in
/// for the model this harness has no business embedding.
struct InteractiveClient;

#[async_trait]
impl LlmClient for InteractiveClient {
    async fn invoke(&self, prompts: &[String], _schema: &Schema) -> FsmResult<String> {
        println!("--- llm prompt ---");
        for prompt in prompts {
            println!("{prompt}");
        }
        print!("> ");
        io::stdout().flush().ok();
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line).map_err(FsmError::Io)?;
        Ok(line)
    }
}

/// Points every `bridge/start` state in `fsm` at `command`/`args`, so the
/// one tool server the caller named on the command line is what actually
/// gets spawned regardless of what the document itself says.
fn wire_tool_server(fsm: &mut fsm_rt::FsmDefinition, command: &str, args: &[String]) {
    for state in &mut fsm.states {
        if state.action.as_deref() != Some("bridge/start") {
            continue;
        }
        if let serde_json::Value::Object(config) = &mut state.config {
            config.insert("command".to_string(), serde_json::Value::String(command.to_string()));
            config.insert(
                "args".to_string(),
                serde_json::Value::Array(args.iter().cloned().map(serde_json::Value::String).collect()),
            );
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_setup::init_tracing();

    let cli = Cli::parse();

    let doc_text = std::fs::read_to_string(&cli.fsm_doc)
        .with_context(|| format!("reading FSM document {}", cli.fsm_doc.display()))?;
    let doc_value: serde_json::Value =
        serde_json::from_str(&doc_text).context("FSM document is not valid JSON")?;
    let mut fsm = parse_fsm_document(&doc_value).context("FSM document failed validation")?;
    wire_tool_server(&mut fsm, &cli.tool_server_command, &cli.tool_server_args);

    let entry_state = if cli.entry_state.is_empty() {
        fsm.xitions
            .iter()
            .find(|x| x.id.from == START)
            .map(|x| x.id.to.clone())
            .context("FSM document has no [start, *] transition; pass --entry-state explicitly")?
    } else {
        cli.entry_state.clone()
    };

    let input_value: serde_json::Value =
        serde_json::from_str(&cli.input).context("--input is not valid JSON")?;

    let actions = fsm_rt::actions::builtin_actions();
    let llm_clients =
        LlmClientRegistry::builder().register(INTERACTIVE_SERVICE, InteractiveClient).build();
    let context = RunContext::new().with_actions(actions).with_extension(llm_clients);

    let handle = start_fsm(Arc::new(fsm), context, EngineConfig::default())?;

    tracing::info!(
        tool_server = %cli.tool_server_command,
        entry_state = %entry_state,
        "starting session"
    );

    let initial_event = Event::with_payload_value(XitionId::new(START, entry_state), input_value)
        .map_err(|e| anyhow::anyhow!(e))?;
    handle.submit(initial_event).context("submitting the initial event")?;

    let outcome = handle.await_completion().await.context("awaiting session completion")?;
    match outcome {
        SessionOutcome::Completed { trail, .. } => {
            println!("session completed, {} transitions crossed", trail.len());
        }
        SessionOutcome::Cancelled { trail } => {
            println!("session cancelled, {} transitions crossed", trail.len());
        }
        SessionOutcome::Failed { trail, error } => {
            eprintln!("session failed after {} transitions: {error}", trail.len());
            std::process::exit(1);
        }
    }
    Ok(())
}
