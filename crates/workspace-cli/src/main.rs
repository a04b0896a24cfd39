//! tiangong: command line access to the MCP services of a workspace
//!
//! Services and their credentials come from a TOML secrets file. Every command
//! opens at most one session and closes it before returning.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use workspace_core::secrets::SECRETS_ENV_VAR;
use workspace_core::{ErrorKind, InvocationResult, SecretsProvider, SessionAdapter, Workspace, WorkspaceError};

#[derive(Debug, Parser)]
#[command(name = "tiangong")]
#[command(about = "Workspace CLI for MCP services", version)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Path to the secrets file
    #[arg(long, global = true, env = SECRETS_ENV_VAR)]
    secrets: Option<PathBuf>,

    /// Timeout in seconds, overriding each service's own
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Work with MCP services
    Mcp {
        #[command(subcommand)]
        action: McpAction,
    },
}

#[derive(Debug, Subcommand)]
enum McpAction {
    /// List configured services
    Services,
    /// List the tools a service advertises
    Tools {
        /// Service name
        service: String,
    },
    /// Invoke a tool
    Invoke {
        /// Service name
        service: String,

        /// Tool name
        tool: String,

        /// Arguments as a JSON object
        #[arg(short, long)]
        args: Option<String>,

        /// Read the arguments from a JSON file
        #[arg(long)]
        args_file: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays parseable
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let json = cli.json;
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(&err, json),
    }
}

fn run(cli: Cli) -> Result<()> {
    let adapter = SessionAdapter::new()?
        .watch_interrupts(true)
        .with_timeout(cli.timeout.map(Duration::from_secs));
    let provider = SecretsProvider::discover(cli.secrets);
    debug!("Using secrets file {}", provider.path().display());
    let workspace = Workspace::load(&provider, adapter)?;

    match cli.command {
        Commands::Mcp { action } => match action {
            McpAction::Services => commands::services(&workspace, cli.json),
            McpAction::Tools { service } => commands::tools(&workspace, &service, cli.json),
            McpAction::Invoke {
                service,
                tool,
                args,
                args_file,
            } => {
                let arguments = commands::parse_arguments(args.as_deref(), args_file.as_deref())?;
                commands::invoke(&workspace, &service, &tool, arguments, cli.json)
            }
        },
    }
}

/// Print the error and pick the exit code from its kind
fn report(err: &anyhow::Error, json: bool) -> ExitCode {
    let internal;
    let workspace_err = match find_workspace_error(err) {
        Some(e) => e,
        None => {
            internal = WorkspaceError::Internal(format!("{:#}", err));
            &internal
        }
    };
    debug!("Command failed with {}", workspace_err.kind().tag());

    if json {
        let failure = InvocationResult::failure(workspace_err);
        match serde_json::to_string_pretty(&failure) {
            Ok(out) => println!("{}", out),
            Err(_) => eprintln!("{:#}", err),
        }
    } else {
        commands::print_error(err);
    }

    ExitCode::from(exit_code(err))
}

fn find_workspace_error(err: &anyhow::Error) -> Option<&WorkspaceError> {
    err.chain().find_map(|e| e.downcast_ref::<WorkspaceError>())
}

/// Exit code of the workspace error behind `err`; anything else is internal
fn exit_code(err: &anyhow::Error) -> u8 {
    match find_workspace_error(err) {
        Some(e) => e.kind().exit_code(),
        None => ErrorKind::Internal.exit_code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_exit_code_from_workspace_error() {
        let err = anyhow::Error::new(WorkspaceError::UnknownService {
            name: "unknownsvc".into(),
            available: vec!["weather".into()],
        });
        assert_eq!(exit_code(&err), 4);
    }

    #[test]
    fn test_exit_code_found_behind_context() {
        let err = Err::<(), _>(WorkspaceError::CredentialNotFound { name: "maps".into() })
            .context("Failed to list tools")
            .unwrap_err();
        assert_eq!(exit_code(&err), 5);
        assert!(matches!(
            find_workspace_error(&err),
            Some(WorkspaceError::CredentialNotFound { .. })
        ));
    }

    #[test]
    fn test_exit_code_for_foreign_error_is_internal() {
        let err = anyhow::anyhow!("disk on fire");
        assert_eq!(exit_code(&err), ErrorKind::Internal.exit_code());
        assert!(find_workspace_error(&err).is_none());
    }

    #[test]
    fn test_timeout_flag_rejects_zero() {
        let parsed = Cli::try_parse_from(["tiangong", "--timeout", "0", "mcp", "services"]);
        assert!(parsed.is_err());

        let cli = Cli::try_parse_from(["tiangong", "--timeout", "5", "mcp", "services"]).unwrap();
        assert_eq!(cli.timeout, Some(5));
    }

    #[test]
    fn test_invoke_arguments_parse() {
        let cli = Cli::try_parse_from([
            "tiangong", "mcp", "invoke", "weather", "getForecast", "--args", r#"{"city":"Paris"}"#,
        ])
        .unwrap();
        match cli.command {
            Commands::Mcp {
                action: McpAction::Invoke { service, tool, args, args_file },
            } => {
                assert_eq!(service, "weather");
                assert_eq!(tool, "getForecast");
                assert_eq!(args.as_deref(), Some(r#"{"city":"Paris"}"#));
                assert!(args_file.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
