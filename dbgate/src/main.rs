//! dbgate: read-only, project-aware database gateway.
//!
//! The binary loads the project registry and serves tool calls as JSON
//! lines over stdin/stdout. Logs go to stderr.
//!
//! # Security Guarantees
//! - Read-only database operations only
//! - Callers never supply SQL text
//! - No credentials stored or logged

mod serve;

use clap::{Args, Parser, Subcommand, ValueEnum};
use dbgate_core::{
    Gateway, LogFormat, ProjectRegistry, init_logging, payload::to_payload, tools::tool_definitions,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "dbgate")]
#[command(about = "Read-only, project-aware database gateway")]
#[command(version)]
#[command(long_about = "
dbgate - Read-only, project-aware database gateway

Serves structured, read-only queries against several independently
configured databases (projects). Requests arrive as JSON lines on stdin,
one response per line is written to stdout:

  {\"id\": 1, \"tool\": \"select_query\", \"arguments\": {\"project\": \"shop\", \"table\": \"users\"}}

TOOLS:
- list_projects
- list_tables
- describe_table
- select_query

SUPPORTED DATABASES:
- MySQL / MariaDB (driver: mysql)
- PostgreSQL (driver: pgsql)
- SQLite (driver: sqlite)
- SQL Server (driver: sqlsrv)

EXAMPLES:
  dbgate --config projects.json serve
  dbgate --config projects.json check shop
  dbgate tools
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Project configuration file
    #[arg(long, env = "DBGATE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Serve tool calls as JSON lines on stdin/stdout (default)
    Serve,
    /// List configured projects
    Projects,
    /// Test connectivity of one project
    Check {
        /// Project identifier
        project: String,
    },
    /// Print the tool catalogue as JSON
    Tools,
}

#[derive(Args)]
pub struct GlobalArgs {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all logs except errors")]
    pub quiet: bool,

    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormatArg::Text, global = true)]
    pub log_format: LogFormatArg,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum LogFormatArg {
    /// Human-readable lines
    Text,
    /// One JSON object per event
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Text => Self::Text,
            LogFormatArg::Json => Self::Json,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.global.verbose, cli.global.quiet, cli.global.log_format.into())?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Tools => {
            println!("{}", serde_json::to_string_pretty(&tool_definitions())?);
            Ok(())
        }
        Command::Projects => {
            let registry = load_registry(cli.config.as_ref())?;
            for project in registry.iter() {
                println!(
                    "{}\t{}\t{}",
                    project.id(),
                    project.database_type().driver_name(),
                    project.database_label()
                );
            }
            Ok(())
        }
        Command::Check { project } => {
            let gateway = Gateway::new(load_registry(cli.config.as_ref())?);
            check_project(&gateway, &project).await
        }
        Command::Serve => {
            let gateway = Arc::new(Gateway::new(load_registry(cli.config.as_ref())?));
            info!(
                "Serving {} project(s): {}",
                gateway.resolver().registry().len(),
                gateway.resolver().list_available_projects().join(", ")
            );

            let outcome = serve::run(
                Arc::clone(&gateway),
                tokio::io::stdin(),
                tokio::io::stdout(),
            )
            .await;
            gateway.resolver().close_all().await;
            outcome
        }
    }
}

fn load_registry(path: Option<&PathBuf>) -> anyhow::Result<ProjectRegistry> {
    let registry = match path {
        Some(path) => ProjectRegistry::from_file(path)?,
        None => ProjectRegistry::from_env()?,
    };
    Ok(registry)
}

/// Opens the project's pool and runs one trivial query.
async fn check_project(gateway: &Gateway, project: &str) -> anyhow::Result<()> {
    info!("Testing connection for project '{}'...", project);

    let outcome = gateway.resolver().check(project).await;
    gateway.resolver().close_all().await;

    match outcome {
        Ok(resolved) => {
            println!(
                "Connection to project '{}' ({}) successful",
                resolved.project.id(),
                resolved.project.database_type()
            );
            Ok(())
        }
        Err(e) => {
            let payload = to_payload(&e.into());
            error!("Connection test failed: {}", payload.message);
            println!("{}", serde_json::to_string_pretty(&payload)?);
            anyhow::bail!("connection test failed for project '{}'", project)
        }
    }
}
