//! `testpilot`: drive test generation and execution from a terminal.

mod config;
mod render;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use testpilot_client::{ReqwestTransport, SessionId};
use testpilot_core::{
    ExecutionStart, GenerationStart, PollKind, PollState, ViewSnapshot, Workbench,
    init_observability,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "testpilot")]
#[command(about = "Generate and execute web tests through the testpilot service", long_about = None)]
struct Cli {
    /// Service root, e.g. http://localhost:8000 (overrides TESTPILOT_API_BASE)
    #[arg(long, global = true)]
    api_base: Option<String>,
    /// Print sessions as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all sessions
    List,
    /// Show one session with its test cases
    Show { id: String },
    /// Generate test cases for a URL and wait until they exist
    Generate {
        #[arg(long)]
        url: String,
        #[arg(long, default_value_t = 5)]
        count: u32,
    },
    /// Execute a session's tests and wait for the results
    Execute { id: String },
    /// Write a session's test cases to tests-<id>.csv
    Export {
        id: String,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
}

const PROGRESS_EVERY: Duration = Duration::from_secs(5);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    config::init();
    init_observability();
    let cli = Cli::parse();
    let (client_config, workbench_config) = config::load(cli.api_base)?;
    let transport = Arc::new(ReqwestTransport::new(client_config)?);
    let workbench = Workbench::open(transport, workbench_config).await;
    let result = run(&workbench, cli.command, cli.json).await;
    workbench.shutdown();
    result
}

async fn run(
    workbench: &Workbench,
    command: Commands,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::List => {
            let snapshot = workbench.snapshot();
            if let Some(error) = snapshot.error {
                return Err(error.into());
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot.sessions)?);
            } else {
                print!("{}", render::session_list(&snapshot.sessions));
            }
        }
        Commands::Show { id } => {
            let id = SessionId::from(id);
            let session = workbench
                .select(&id)
                .await
                .ok_or_else(|| format!("session not found: {id}"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&session)?);
            } else {
                print!("{}", render::session_detail(&session));
            }
        }
        Commands::Generate { url, count } => {
            let session_id = match workbench.generate(&url, count).await? {
                GenerationStart::Polling(id) => id,
                GenerationStart::NoSession => {
                    println!("generation accepted; the server did not report a session id");
                    return Ok(());
                }
                GenerationStart::Superseded => return Err("generation was cancelled".into()),
            };
            println!("generating test cases in session {session_id}");
            let state = follow(
                workbench,
                PollKind::Generation,
                &session_id,
                workbench.generation().wait(),
            )
            .await;
            finish(workbench, state, &session_id, json)?;
        }
        Commands::Execute { id } => {
            let id = SessionId::from(id);
            workbench.select(&id).await;
            match workbench.execute(&id).await? {
                ExecutionStart::Started => {}
                ExecutionStart::AlreadyRunning => return Err("an execution is already running".into()),
                ExecutionStart::Cancelled => return Err("execution was cancelled".into()),
            }
            println!("executing session {id}");
            let state =
                follow(workbench, PollKind::Execution, &id, workbench.execution().wait()).await;
            finish(workbench, state, &id, json)?;
        }
        Commands::Export { id, out } => {
            let id = SessionId::from(id);
            workbench.select(&id).await;
            let export = workbench
                .export_csv(&id)
                .ok_or_else(|| format!("session not found: {id}"))?;
            let path = export.write_to(&out)?;
            println!("wrote {}", path.display());
        }
    }
    Ok(())
}

/// Prints a progress line every few seconds until `settled` resolves or the
/// user interrupts.
async fn follow(
    workbench: &Workbench,
    kind: PollKind,
    session_id: &SessionId,
    settled: impl Future<Output = PollState>,
) -> PollState {
    tokio::pin!(settled);
    let mut ticker = tokio::time::interval(PROGRESS_EVERY);
    loop {
        tokio::select! {
            state = &mut settled => return state,
            _ = ticker.tick() => {
                let snapshot = workbench.snapshot();
                println!("{}", render::progress_line(kind, &snapshot, snapshot.session(session_id)));
            }
            _ = tokio::signal::ctrl_c() => {
                info!(event = "cli.interrupted", domain = "cli", kind = kind.as_str());
                workbench.shutdown();
                return PollState::Cancelled;
            }
        }
    }
}

fn finish(
    workbench: &Workbench,
    state: PollState,
    session_id: &SessionId,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = workbench.snapshot();
    if state != PollState::Completed {
        let reason = snapshot
            .error
            .clone()
            .unwrap_or_else(|| format!("stopped in state {state:?}"));
        return Err(reason.into());
    }
    print_session(&snapshot, session_id, json)
}

fn print_session(
    snapshot: &ViewSnapshot,
    session_id: &SessionId,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = snapshot
        .selected
        .as_ref()
        .filter(|s| &s.session_id == session_id)
        .or_else(|| snapshot.session(session_id))
        .ok_or_else(|| format!("session not found: {session_id}"))?;
    if json {
        println!("{}", serde_json::to_string_pretty(session)?);
    } else {
        print!("{}", render::session_detail(session));
    }
    Ok(())
}
