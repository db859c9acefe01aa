//! JSON-RPC 2.0 envelopes and the typed argument/result shapes for each
//! tool exposed by the dispatcher.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use weftgraph_core::errors::ToolError;
use weftgraph_core::types::{EpisodeFormat, FactRecord, NodeRecord};

/// A JSON-RPC 2.0 request envelope. The dispatcher only understands
/// `method = "tool"`; anything else is rejected with a method-not-found
/// error.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<ToolCall>,
    #[serde(default)]
    pub id: Option<Value>,
}

fn jsonrpc_version() -> String {
    "2.0".to_string()
}

/// `params` of a `method = "tool"` request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub input: Value,
}

/// A JSON-RPC 2.0 response envelope: exactly one of `result` or `error` is
/// populated, matching the spec's "success or typed error, never both"
/// contract.
#[derive(Debug, Clone, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Value,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// JSON-RPC reserved range for "method not found".
pub const METHOD_NOT_FOUND: i64 = -32601;
/// JSON-RPC reserved range for "invalid params".
pub const INVALID_PARAMS: i64 = -32602;
/// JSON-RPC reserved range for "parse error".
pub const PARSE_ERROR: i64 = -32700;

/// Application-defined error codes, one per [`ToolError`] variant. Kept
/// outside the JSON-RPC-reserved range (-32768..-32000).
fn tool_error_code(err: &ToolError) -> i64 {
    match err {
        ToolError::NotInitialized(_) => -31000,
        ToolError::InvalidArgument(_) => -31001,
        ToolError::NotFound(_) => -31002,
        ToolError::PermissionDenied(_) => -31003,
        ToolError::AuthRequired(_) => -31004,
        ToolError::AuthInvalid(_) => -31005,
        ToolError::ExtractionFailed(_) => -31006,
        ToolError::BackendUnavailable(_) => -31007,
        ToolError::Internal(_) => -31008,
    }
}

impl From<ToolError> for RpcError {
    fn from(err: ToolError) -> Self {
        RpcError {
            code: tool_error_code(&err),
            message: err.to_string(),
            data: None,
        }
    }
}

// ---- add_episode ----------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AddEpisodeArgs {
    pub name: String,
    pub body: String,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub source_description: Option<String>,
    #[serde(default)]
    pub uuid: Option<Uuid>,
}

impl AddEpisodeArgs {
    pub fn parsed_format(&self) -> Result<EpisodeFormat, ToolError> {
        match &self.format {
            None => Ok(EpisodeFormat::Text),
            Some(raw) => raw
                .parse()
                .map_err(|e: String| ToolError::InvalidArgument(e)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AddEpisodeResult {
    pub queued: bool,
    pub position: usize,
}

// ---- search_nodes -----------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SearchNodesArgs {
    pub query: String,
    #[serde(default)]
    pub namespaces: Option<Vec<String>>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub center_uuid: Option<Uuid>,
    #[serde(default)]
    pub label_filter: Option<String>,
}

fn default_limit() -> usize {
    10
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchNodesResult {
    pub message: String,
    pub nodes: Vec<NodeRecord>,
}

// ---- search_facts -----------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SearchFactsArgs {
    pub query: String,
    #[serde(default)]
    pub namespaces: Option<Vec<String>>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub center_uuid: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchFactsResult {
    pub message: String,
    pub facts: Vec<FactRecord>,
}

// ---- get_entity_edge ----------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct GetEntityEdgeArgs {
    pub uuid: Uuid,
}

// ---- get_episodes -----------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct GetEpisodesArgs {
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default = "default_limit")]
    pub last_n: usize,
}

// ---- delete_entity_edge / delete_episode -------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct UuidArgs {
    pub uuid: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResult {
    pub message: String,
}

// ---- clear_graph --------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ClearGraphArgs {
    #[serde(default)]
    pub auth: Option<String>,
}

// ---- status -------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResult {
    pub status: String,
    pub message: String,
}
