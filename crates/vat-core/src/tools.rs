//! ============================================================================
//! Tool Surface - JSON dispatch of the four memory operations
//! ============================================================================
//! Request:  {"id": .., "tool": "record|retrieve|recent|visualize", "arguments": {..}}
//! Response: {"id": .., "result": ..} or {"id": .., "error": ".."}
//! ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::memory::{MemoryManager, DEFAULT_RECENT_LIMIT, DEFAULT_TOP_K};
use crate::types::MemoryError;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: &'static str, reason: String },

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolRequest {
    #[serde(default)]
    pub id: Value,
    pub tool: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResponse {
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResponse {
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: Value, error: impl ToString) -> Self {
        Self {
            id,
            result: None,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RecordArgs {
    content: String,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct RetrieveArgs {
    query: String,
    #[serde(default, alias = "topK")]
    top_k: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RecentArgs {
    #[serde(default)]
    limit: Option<u32>,
}

fn parse_args<T: serde::de::DeserializeOwned>(
    tool: &'static str,
    arguments: Value,
) -> Result<T, ToolError> {
    let arguments = match arguments {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments {
        tool,
        reason: e.to_string(),
    })
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|e| {
        ToolError::Memory(MemoryError::Store(format!("Failed to serialize result: {}", e)))
    })
}

/// Run one tool call against `manager`
pub async fn call(manager: &MemoryManager, tool: &str, arguments: Value) -> Result<Value, ToolError> {
    debug!("Tool call: {}", tool);
    match tool {
        "record" => {
            let args: RecordArgs = parse_args("record", arguments)?;
            let outcome = manager.record(&args.content, args.metadata).await?;
            to_json(&outcome)
        }
        "retrieve" => {
            let args: RetrieveArgs = parse_args("retrieve", arguments)?;
            let entries = manager
                .retrieve(&args.query, args.top_k.unwrap_or(DEFAULT_TOP_K))
                .await?;
            to_json(&entries)
        }
        "recent" => {
            let args: RecentArgs = parse_args("recent", arguments)?;
            let entries = manager
                .recent(args.limit.unwrap_or(DEFAULT_RECENT_LIMIT))
                .await?;
            to_json(&entries)
        }
        "visualize" => {
            let report = manager.visualize().await?;
            Ok(Value::String(report.to_string()))
        }
        other => Err(ToolError::UnknownTool(other.to_string())),
    }
}

/// Parse one JSON line, dispatch it and build the response line
pub async fn handle_line(manager: &MemoryManager, line: &str) -> ToolResponse {
    let request: ToolRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejected malformed request: {}", e);
            return ToolResponse::err(Value::Null, format!("Malformed request: {}", e));
        }
    };

    match call(manager, &request.tool, request.arguments).await {
        Ok(result) => ToolResponse::ok(request.id, result),
        Err(e) => ToolResponse::err(request.id, e),
    }
}
