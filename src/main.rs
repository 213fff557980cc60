use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use rmcp::{ServiceExt, transport::stdio};

use mcp_tasks::config::Config;
use mcp_tasks::engine::Engine;
use mcp_tasks::git::CliGit;
use mcp_tasks::server::McpTasksServer;

#[derive(Parser)]
#[command(name = "mcp-tasks", version, about = "Task-management MCP server")]
struct Cli {
    /// Base directory to serve (defaults to the current directory)
    #[arg(long, value_name = "PATH")]
    dir: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace); logs go to stderr
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let base_dir = match cli.dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to resolve current directory")?,
    };
    let config = Config::load(&base_dir)?;
    log::info!(
        "serving {} over stdio (git: {}, branches: {}, worktrees: {})",
        base_dir.display(),
        config.use_git,
        config.branch_management(),
        config.worktree_management,
    );

    let engine = Engine::new(config, Box::new(CliGit::new()));
    let service = McpTasksServer::new(engine)
        .serve(stdio())
        .await
        .context("Failed to start MCP server on stdio")?;
    service.waiting().await?;
    Ok(())
}
