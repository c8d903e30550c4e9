//! REPL driver: builds a [`Core`] handle once at startup, wires it into a
//! [`Router`], then reads lines from stdin until `exit`/`quit`.
//!
//! Concrete LLM, embedding, and document-store providers are external
//! collaborators this workspace never assumes a vendor for; this binary
//! wires the same in-memory fakes the test suite uses so the cascade is
//! runnable end to end without network access.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use assistant_core::config::Config;
use assistant_core::testing::{fake_embedder, FakeLlmClient};
use assistant_core::Core;
use assistant_router::discovery::{DiscoveryAgent, SessionManager};
use assistant_router::metrics::Metrics;
use assistant_router::planner::MultiStepPlanner;
use assistant_router::summarizer::EpisodicSummarizer;
use assistant_router::testing::{FakeEntityStore, FakeRetrievalService};
use assistant_router::tools::ToolExecutor;
use assistant_router::{LlmAgentLoop, Router};
use clap::Parser;

#[derive(Parser)]
#[command(name = "assistant-cli")]
#[command(about = "Conversational task assistant REPL")]
#[command(version)]
struct Cli {
    /// TOML configuration file path. Missing sections fall back to defaults.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable debug-level logging (equivalent to `ASSISTANT_LOG=debug`).
    #[arg(short, long)]
    verbose: bool,

    /// User id to attribute this session's actions to.
    #[arg(long, default_value = "local")]
    user: String,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_env("ASSISTANT_LOG")
        .or_else(|_| tracing_subscriber::EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            Ok(Config::from_toml(&raw)?)
        }
        None => Ok(Config::default()),
    }
}

fn build_router(core: &Core) -> Router {
    let summarizer = Arc::new(EpisodicSummarizer::new(Arc::clone(&core.memory), Arc::clone(&core.llm)));
    let executor = Arc::new(ToolExecutor::new(
        Arc::clone(&core.memory),
        Arc::clone(&core.entities),
        Arc::clone(&core.retrieval),
        Arc::clone(&core.embedder),
        core.config.clone(),
        summarizer,
    ));
    let discovery = if core.config.discovery.enabled {
        let sessions = Arc::new(SessionManager::new());
        Some(Arc::new(DiscoveryAgent::new(Arc::clone(&core.memory), Arc::clone(&core.llm), sessions, core.config.clone())))
    } else {
        None
    };
    let agent_loop = LlmAgentLoop::new(Arc::clone(&core.llm), Arc::clone(&executor), core.config.clone());
    let planner = MultiStepPlanner::new(Arc::clone(&core.llm), Arc::clone(&executor), Arc::clone(&core.memory), discovery.clone());
    let metrics = Arc::new(Metrics::new());
    Router::new(executor, agent_loop, planner, discovery, Arc::clone(&core.memory), metrics, core.config.clone())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_ref())?;
    let core = Core::new(
        Arc::new(FakeLlmClient::new()),
        fake_embedder(),
        Arc::new(FakeEntityStore::new()),
        Arc::new(FakeRetrievalService::new()),
        config,
    );
    let router = build_router(&core);
    let session_id = uuid::Uuid::new_v4().to_string();

    println!("Conversational task assistant. Type 'exit' or 'quit' to leave.");
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.eq_ignore_ascii_case("exit") || trimmed.eq_ignore_ascii_case("quit") {
            break;
        }

        match router.handle(trimmed, &cli.user, &session_id).await {
            Ok(response) => {
                println!("{}", response.text);
                if response.truncated {
                    println!("(stopped early; some steps did not complete)");
                }
            }
            Err(err) => println!("{}", err.user_message()),
        }
    }

    Ok(())
}
