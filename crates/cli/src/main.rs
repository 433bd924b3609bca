//! Thin demonstration binary for the CodeWeaver indexing core: exercises `Indexer` and
//! `QueryPipeline` directly over a project directory. No daemon process, no IPC wire
//! transport, no TUI — a command per core operation, printed to stdout.

mod bootstrap;
mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use codeweaver_core::config::IndexerSettings;

#[derive(Parser)]
#[command(name = "codeweaver", about = "CodeWeaver indexing and retrieval core")]
struct Cli {
  /// Project root to operate on. Defaults to the current directory.
  #[arg(long, global = true)]
  project: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Run one indexing pass over the project.
  Index {
    /// Force a full reindex, ignoring the checkpoint fingerprint comparison.
    #[arg(long)]
    force: bool,
  },
  /// Index once, then watch the project for changes until interrupted.
  Watch,
  /// Run a find_code query against the index.
  Search {
    query: String,
    /// Restrict results to one or more languages (repeatable).
    #[arg(long = "lang")]
    focus_language: Vec<String>,
    #[arg(long)]
    token_limit: Option<usize>,
    #[arg(long)]
    json: bool,
  },
  /// Print the health-query snapshot and failover state.
  Health {
    #[arg(long)]
    json: bool,
  },
  /// Configuration file management.
  Config {
    #[command(subcommand)]
    action: ConfigAction,
  },
}

#[derive(Subcommand)]
enum ConfigAction {
  /// Write a commented default config to `.codeweaver/codeweaver.toml`.
  Init,
  /// Print the effective, resolved configuration.
  Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let cli = Cli::parse();
  let project_root = cli.project.unwrap_or_else(bootstrap::default_project_root);

  let settings = IndexerSettings::load_for_project(&project_root);
  logging::init(&settings.logging);

  match cli.command {
    Command::Index { force } => commands::index::run(project_root, force).await,
    Command::Watch => commands::watch::run(project_root).await,
    Command::Search { query, focus_language, token_limit, json } => commands::search::run(project_root, query, focus_language, token_limit, json).await,
    Command::Health { json } => commands::health::run(project_root, json).await,
    Command::Config { action } => match action {
      ConfigAction::Init => commands::config::init(&project_root),
      ConfigAction::Show => commands::config::show(&project_root),
    },
  }
}
