//! `grip` — command-line front end for the grip agent engine: run one
//! turn, hold an interactive chat, and inspect/manage sessions,
//! memory, workflows, MCP servers, trust, and configuration.

mod app;
mod commands;

use app::AppContext;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "grip", version, about = "grip — an autonomous AI agent platform")]
struct Cli {
    /// Path to the configuration file (defaults to ~/.grip/config.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single turn and print the response.
    Run {
        message: String,
        #[arg(long, default_value = "cli:default")]
        session: String,
        #[arg(long)]
        model: Option<String>,
    },
    /// Start an interactive chat REPL against one session.
    Chat {
        #[arg(long, default_value = "cli:default")]
        session: String,
        #[arg(long)]
        model: Option<String>,
    },
    /// Inspect and manage durable sessions.
    Session {
        #[command(subcommand)]
        action: commands::session::SessionAction,
    },
    /// Search, inspect, and compact long-term memory.
    Memory {
        #[command(subcommand)]
        action: commands::memory::MemoryAction,
    },
    /// Run, validate, and list multi-step agent workflows.
    Workflow {
        #[command(subcommand)]
        action: commands::workflow::WorkflowAction,
    },
    /// Manage MCP server connections and OAuth logins.
    Mcp {
        #[command(subcommand)]
        action: commands::mcp::McpAction,
    },
    /// Manage directory trust grants for filesystem tools.
    Trust {
        #[command(subcommand)]
        action: commands::trust::TrustAction,
    },
    /// Inspect and edit the configuration file.
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Generate shell completion scripts.
    Completions { shell: clap_complete::Shell },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    // `completions` and `config` only touch argv/the config file — skip
    // standing up sessions, memory, and MCP connections for them.
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        let name = cmd.get_name().to_string();
        clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
        return ExitCode::SUCCESS;
    }
    if let Commands::Config { action } = cli.command {
        return match commands::config::dispatch(cli.config.as_deref(), action).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("grip: {e}");
                ExitCode::FAILURE
            }
        };
    }

    let ctx = match AppContext::build(cli.config.as_deref()).await {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("grip: failed to initialize: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Run { message, session, model } => {
            commands::run::run(&ctx, &message, &session, model.as_deref()).await
        }
        Commands::Chat { session, model } => commands::chat::chat(&ctx, &session, model.as_deref()).await,
        Commands::Session { action } => commands::session::dispatch(&ctx, action).await,
        Commands::Memory { action } => commands::memory::dispatch(&ctx, action).await,
        Commands::Workflow { action } => commands::workflow::dispatch(&ctx, action).await,
        Commands::Mcp { action } => commands::mcp::dispatch(&ctx, action).await,
        Commands::Trust { action } => commands::trust::dispatch(&ctx, action).await,
        Commands::Config { .. } | Commands::Completions { .. } => unreachable!("handled above"),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("grip: {e}");
            ExitCode::FAILURE
        }
    }
}
