//! Transports for the JSON-RPC tool-dispatch protocol: `sse` (the default,
//! an axum HTTP server) and `stdio` (line-delimited, for embedding under a
//! process manager that pipes stdin/stdout).

pub mod sse;
pub mod stdio;

use crate::dispatcher::ToolDispatcher;
use crate::protocol::{RpcError, RpcRequest, RpcResponse, ToolCall};
use serde_json::Value;
use std::sync::Arc;

/// Runs one already-parsed JSON-RPC request through the dispatcher and
/// builds the matching response envelope. Shared by both transports so
/// neither has to duplicate the method/params validation.
pub async fn handle_request(dispatcher: &Arc<ToolDispatcher>, request: RpcRequest) -> RpcResponse {
    let id = request.id.unwrap_or(Value::Null);

    if request.method != "tool" {
        return RpcResponse::failure(
            id,
            RpcError {
                code: crate::protocol::METHOD_NOT_FOUND,
                message: format!("unknown method: {}", request.method),
                data: None,
            },
        );
    }

    let Some(ToolCall { name, input }) = request.params else {
        return RpcResponse::failure(
            id,
            RpcError {
                code: crate::protocol::INVALID_PARAMS,
                message: "missing params.name/params.input for method \"tool\"".to_string(),
                data: None,
            },
        );
    };

    match dispatcher.dispatch(&name, input).await {
        Ok(result) => RpcResponse::success(id, result),
        Err(err) => RpcResponse::failure(id, err.into()),
    }
}
