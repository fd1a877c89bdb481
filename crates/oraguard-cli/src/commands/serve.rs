//! Serve command: line-delimited JSON tool dispatch over stdio.
//!
//! One request object per line in, one response object per line out,
//! the same framing discipline the executor protocol uses. Tool names
//! and payload shapes are the agent-facing contract; this shim only
//! parses arguments and forwards to the pipeline.

use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use oraguard_gateway::Gateway;

/// One request line.
#[derive(Debug, Deserialize)]
struct ToolRequest {
    /// Echoed back so the caller can correlate responses.
    #[serde(default)]
    id: Option<Value>,
    tool: String,
    #[serde(default)]
    arguments: Value,
}

/// One response line.
#[derive(Debug, Serialize)]
struct ToolReply {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ToolReply {
    fn ok(id: Option<Value>, result: Value) -> Self {
        Self {
            id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    fn err(id: Option<Value>, error: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct QueryArgs {
    query: String,
}

#[derive(Debug, Deserialize)]
struct ExecuteArgs {
    query: String,
    #[serde(default)]
    approval_token: String,
}

#[derive(Debug, Deserialize)]
struct DescribeArgs {
    table_name: String,
}

#[derive(Debug, Deserialize)]
struct ListArgs {
    #[serde(default)]
    schema: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResourceArgs {
    uri: String,
}

/// Runs the stdio serve loop until stdin closes.
pub fn run(config_dir: &Path) -> Result<()> {
    let gateway = super::build_gateway(config_dir)?;
    info!("oraguard serving tools on stdio");

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read request line")?;
        if line.trim().is_empty() {
            continue;
        }

        let reply = match parse_request(&line) {
            Ok(request) => dispatch(&gateway, request),
            Err(message) => ToolReply::err(None, message),
        };

        let mut stdout = io::stdout().lock();
        serde_json::to_writer(&mut stdout, &reply).context("failed to encode response")?;
        writeln!(stdout).context("failed to write response")?;
        stdout.flush().context("failed to flush response")?;
    }

    info!("stdin closed, shutting down");
    gateway.shutdown();
    Ok(())
}

fn parse_request(line: &str) -> Result<ToolRequest, String> {
    serde_json::from_str(line).map_err(|e| format!("malformed request: {e}"))
}

fn dispatch(gateway: &Gateway, request: ToolRequest) -> ToolReply {
    let ToolRequest { id, tool, arguments } = request;
    match tool.as_str() {
        "preview_query" => match parse_args::<QueryArgs>(arguments) {
            Ok(args) => reply_json(id, &gateway.preview(&args.query)),
            Err(message) => ToolReply::err(id, message),
        },
        "query_oracle" => match parse_args::<ExecuteArgs>(arguments) {
            Ok(args) => match gateway.execute(&args.query, &args.approval_token) {
                Ok(response) => reply_json(id, &response),
                Err(e) => ToolReply::err(id, e.to_string()),
            },
            Err(message) => ToolReply::err(id, message),
        },
        "describe_table" => match parse_args::<DescribeArgs>(arguments) {
            Ok(args) => match gateway.describe_table(&args.table_name) {
                Ok(response) => reply_json(id, &response),
                Err(e) => ToolReply::err(id, e.to_string()),
            },
            Err(message) => ToolReply::err(id, message),
        },
        "list_tables" => match parse_args::<ListArgs>(arguments) {
            Ok(args) => match gateway.list_tables(args.schema.as_deref()) {
                Ok(response) => reply_json(id, &response),
                Err(e) => ToolReply::err(id, e.to_string()),
            },
            Err(message) => ToolReply::err(id, message),
        },
        "read_resource" => match parse_args::<ResourceArgs>(arguments) {
            Ok(args) => match gateway.read_resource(&args.uri) {
                Ok(value) => ToolReply::ok(id, value),
                Err(e) => ToolReply::err(id, e.to_string()),
            },
            Err(message) => ToolReply::err(id, message),
        },
        "health" => reply_json(id, &gateway.health()),
        unknown => ToolReply::err(id, format!("Unknown tool: {unknown}")),
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(arguments: Value) -> Result<T, String> {
    // An omitted arguments field arrives as null; treat it like {} so
    // tools with no required arguments still work.
    let arguments = if arguments.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        arguments
    };
    serde_json::from_value(arguments).map_err(|e| format!("invalid arguments: {e}"))
}

fn reply_json<T: Serialize>(id: Option<Value>, payload: &T) -> ToolReply {
    match serde_json::to_value(payload) {
        Ok(value) => ToolReply::ok(id, value),
        Err(e) => ToolReply::err(id, format!("failed to encode result: {e}")),
    }
}
