//! CLI commands implementation

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use workspace_core::{InvocationResult, ServiceConfig, ToolDescriptor, TransportKind, Workspace, WorkspaceError};

// ANSI color codes
const RED: &str = "\x1b[91m";
const YELLOW: &str = "\x1b[93m";
const CYAN: &str = "\x1b[96m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// What `services --json` exposes; env and credentials stay out
#[derive(Debug, Serialize)]
struct ServiceSummary<'a> {
    name: &'a str,
    transport: TransportKind,
    endpoint: &'a str,
}

impl<'a> From<&'a ServiceConfig> for ServiceSummary<'a> {
    fn from(config: &'a ServiceConfig) -> Self {
        Self {
            name: &config.name,
            transport: config.transport,
            endpoint: &config.endpoint,
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to encode output")?;
    println!("{}", out);
    Ok(())
}

pub fn print_error(err: &anyhow::Error) {
    eprintln!("{}error:{} {:#}", RED, RESET, err);
}

/// List configured services in name order
pub fn services(workspace: &Workspace, json: bool) -> Result<()> {
    let services = workspace.list_services();

    if json {
        let summaries: Vec<ServiceSummary> = services.into_iter().map(Into::into).collect();
        return print_json(&summaries);
    }

    println!("{}Configured MCP services{}", BOLD, RESET);
    for service in services {
        println!("{}", format_service(service));
    }
    Ok(())
}

fn format_service(service: &ServiceConfig) -> String {
    format!(
        "- {} ({}) {}->{} {}",
        service.name, service.transport, DIM, RESET, service.endpoint
    )
}

/// List the tools one service advertises
pub fn tools(workspace: &Workspace, service: &str, json: bool) -> Result<()> {
    let tools = workspace.list_tools(service)?;

    if json {
        return print_json(&tools);
    }

    if tools.is_empty() {
        println!("No tools advertised by service '{}'.", service);
        return Ok(());
    }

    println!("{}Tools of {}{}", BOLD, service, RESET);
    for tool in &tools {
        println!("{}", format_tool(tool));
    }
    Ok(())
}

fn format_tool(tool: &ToolDescriptor) -> String {
    match tool.description.as_deref().map(str::trim) {
        Some(description) if !description.is_empty() => {
            format!("- {}{}{}: {}", CYAN, tool.name, RESET, description)
        }
        _ => format!("- {}{}{}", CYAN, tool.name, RESET),
    }
}

/// Invoke one tool and print its result
pub fn invoke(workspace: &Workspace, service: &str, tool: &str, arguments: Value, json: bool) -> Result<()> {
    let result = workspace.invoke(service, tool, arguments)?;

    if json {
        return print_json(&result);
    }

    println!("{}Tool result:{}", BOLD, RESET);
    println!("{}", format_payload(&result.payload)?);
    print_attachments(&result)?;
    Ok(())
}

fn print_attachments(result: &InvocationResult) -> Result<()> {
    if result.attachments.is_empty() {
        return Ok(());
    }

    println!();
    println!("{}Attachments:{}", YELLOW, RESET);
    for attachment in &result.attachments {
        println!("{}", format_payload(attachment)?);
    }
    Ok(())
}

/// Strings print as-is, everything else as pretty JSON
fn format_payload(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Null => Ok(String::new()),
        other => serde_json::to_string_pretty(other).context("Failed to encode tool result"),
    }
}

/// Build the tool arguments from `--args` or `--args-file`; none means `{}`
pub fn parse_arguments(inline: Option<&str>, file: Option<&Path>) -> Result<Value, WorkspaceError> {
    let raw = match (inline, file) {
        (Some(_), Some(_)) => {
            return Err(WorkspaceError::InvalidArguments(
                "use either --args or --args-file, not both".to_string(),
            ))
        }
        (Some(inline), None) => inline.to_string(),
        (None, Some(path)) => std::fs::read_to_string(path).map_err(|e| {
            WorkspaceError::InvalidArguments(format!("cannot read {}: {}", path.display(), e))
        })?,
        (None, None) => return Ok(Value::Object(Default::default())),
    };

    let value: Value = serde_json::from_str(&raw)
        .map_err(|e| WorkspaceError::InvalidArguments(format!("arguments are not valid JSON: {}", e)))?;
    if !value.is_object() {
        return Err(WorkspaceError::InvalidArguments(
            "tool arguments must be a JSON object".to_string(),
        ));
    }
    Ok(value)
}
