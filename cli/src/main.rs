// Agentkit CLI - Command Line Interface Entry Point

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use agentkit_config::{AgentConfig, ConfigLoader, editor, parse_overrides};
use agentkit_core::ports::TraceStore;
use agentkit_core::tools::sql::is_sql_query_safe;
use agentkit_state::StateDb;

/// Agentkit - action-plan routed multi-tool chat agent
#[derive(Parser, Debug)]
#[command(name = "agentkit")]
#[command(version, about, long_about = None)]
struct TopCli {
  #[clap(flatten)]
  config_overrides: CliConfigOverrides,

  /// Project directory holding `.agentkit/agent.toml`
  #[arg(short = 'd', long = "dir", global = true)]
  dir: Option<PathBuf>,

  /// Extra config file loaded on top of global and project config
  #[arg(long = "config-file", global = true)]
  config_file: Option<PathBuf>,

  #[clap(subcommand)]
  command: Commands,
}

/// CLI configuration overrides
#[derive(Debug, clap::Args)]
struct CliConfigOverrides {
  /// Configuration override in key=value format
  #[arg(short = 'c', long = "config", value_name = "KEY=VALUE", global = true)]
  overrides: Vec<String>,
}

/// Available commands
#[derive(Debug, Subcommand)]
enum Commands {
  /// Configuration management
  Config {
    #[command(subcommand)]
    config_command: ConfigCommands,
  },

  /// List the configured action plans
  Plans,

  /// Check a SQL statement against the read-only safety filter
  CheckSql {
    /// Statement to check
    statement: String,
  },

  /// Show recently recorded runs
  ///
  /// Runs are written by an agent using `StateDb` as its trace store.
  Traces {
    /// State database, defaults to ~/.agentkit/state.db
    #[arg(long = "db")]
    db: Option<PathBuf>,

    /// Maximum number of runs to show
    #[arg(short = 'n', long = "limit", default_value_t = 20)]
    limit: usize,
  },

  /// Show feedback recorded for one run
  ///
  /// Feedback is written by an agent using `StateDb` as its trace store.
  Feedback {
    /// Run id
    run_id: String,

    /// State database, defaults to ~/.agentkit/state.db
    #[arg(long = "db")]
    db: Option<PathBuf>,
  },
}

/// Configuration commands
#[derive(Debug, Subcommand)]
enum ConfigCommands {
  /// Show the merged configuration
  Show,

  /// Validate the merged configuration
  Validate,

  /// Set a value in the project configuration file
  Set {
    /// Dotted configuration key
    key: String,

    /// Configuration value
    value: String,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let cli = TopCli::parse();

  match cli.command {
    Commands::Config { ref config_command } => handle_config_command(&cli, config_command)?,
    Commands::Plans => list_plans(&load_config(&cli)?),
    Commands::CheckSql { ref statement } => check_sql(statement)?,
    Commands::Traces { ref db, limit } => list_traces(db.clone(), limit).await?,
    Commands::Feedback { ref run_id, ref db } => list_feedback(run_id, db.clone()).await?,
  }

  Ok(())
}

fn config_loader(cli: &TopCli) -> Result<ConfigLoader> {
  let project_dir = match &cli.dir {
    Some(dir) => dir.clone(),
    None => std::env::current_dir().context("failed to read current directory")?,
  };
  let mut loader = ConfigLoader::new().with_project_dir(project_dir);
  if let Some(path) = &cli.config_file {
    loader = loader.with_file(path.clone());
  }
  Ok(loader)
}

fn load_config(cli: &TopCli) -> Result<AgentConfig> {
  let overrides = parse_overrides(&cli.config_overrides.overrides)?;
  config_loader(cli)?.load_with_cli_overrides(overrides)
}

/// Handle config commands
fn handle_config_command(cli: &TopCli, cmd: &ConfigCommands) -> Result<()> {
  match cmd {
    ConfigCommands::Show => {
      let config = load_config(cli)?;
      print!("{}", toml::to_string_pretty(&config).context("failed to render config")?);
    }
    ConfigCommands::Validate => {
      let config = load_config(cli)?;
      config.validate()?;
      println!(
        "Configuration is valid: {} tools, {} action plans.",
        config.tools.len(),
        config.action_plans.len()
      );
    }
    ConfigCommands::Set { key, value } => {
      let path = config_loader(cli)?
        .project_config_path()
        .context("no project directory")?;
      editor::set_value(&path, key, value)?;
      println!("Set {key} = {value} in {}", path.display());
    }
  }
  Ok(())
}

fn list_plans(config: &AgentConfig) {
  if config.action_plans.is_empty() {
    println!("No action plans configured.");
    return;
  }
  for (name, plan) in config.action_plans.iter() {
    println!("{name}: {}", plan.description);
    for (index, step) in plan.actions.iter().enumerate() {
      println!("  {}. {}", index + 1, step.join(", "));
    }
  }
}

fn check_sql(statement: &str) -> Result<()> {
  if !is_sql_query_safe(statement) {
    bail!("statement rejected: it contains forbidden keywords (DML, DDL statements)");
  }
  println!("Statement is read-only.");
  Ok(())
}

async fn open_state(db: Option<PathBuf>) -> Result<StateDb> {
  let path = db.unwrap_or_else(StateDb::default_path);
  info!("Opening state database at {}", path.display());
  StateDb::open(&path)
    .await
    .with_context(|| format!("failed to open {}", path.display()))
}

async fn list_traces(db: Option<PathBuf>, limit: usize) -> Result<()> {
  let state = open_state(db).await?;
  let runs = state.list_runs(limit).await?;
  if runs.is_empty() {
    println!("No runs recorded.");
  }
  for run in runs {
    let status = match (&run.finished_at, &run.error) {
      (None, _) => "running".to_string(),
      (Some(_), Some(error)) => format!("failed: {error}"),
      (Some(_), None) => "completed".to_string(),
    };
    println!("{}  {}  {status}", run.started_at.to_rfc3339(), run.run_id);
    println!("    {}", run.tags.join(" "));
  }
  state.close().await;
  Ok(())
}

async fn list_feedback(run_id: &str, db: Option<PathBuf>) -> Result<()> {
  let state = open_state(db).await?;
  let records = state.list_feedback(run_id).await?;
  if records.is_empty() {
    println!("No feedback for run {run_id}.");
  }
  for record in records {
    println!("{}", serde_json::to_string(&record).context("failed to render feedback")?);
  }
  state.close().await;
  Ok(())
}
