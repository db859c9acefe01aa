//! Line-delimited JSON-RPC over stdin/stdout, without the SSE handshake.
//! Each line on stdin is one JSON-RPC request; each response is written as
//! one line on stdout.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, warn};

use crate::dispatcher::ToolDispatcher;
use crate::protocol::{RpcError, RpcResponse, PARSE_ERROR};
use crate::transport::handle_request;

/// Serve the `stdio` transport until stdin closes.
pub async fn serve(dispatcher: Arc<ToolDispatcher>) -> std::io::Result<()> {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();

    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str(trimmed) {
            Ok(request) => handle_request(&dispatcher, request).await,
            Err(err) => {
                warn!(error = %err, "failed to parse stdio json-rpc request");
                RpcResponse::failure(
                    serde_json::Value::Null,
                    RpcError {
                        code: PARSE_ERROR,
                        message: format!("invalid JSON-RPC request: {err}"),
                        data: None,
                    },
                )
            }
        };

        let serialized = serde_json::to_string(&response)
            .unwrap_or_else(|_| "{\"jsonrpc\":\"2.0\",\"error\":{\"code\":-32603,\"message\":\"failed to serialize response\"},\"id\":null}".to_string());

        if let Err(err) = stdout.write_all(serialized.as_bytes()).await {
            error!(error = %err, "failed to write stdio json-rpc response");
            break;
        }
        if let Err(err) = stdout.write_all(b"\n").await {
            error!(error = %err, "failed to write stdio newline");
            break;
        }
        if let Err(err) = stdout.flush().await {
            error!(error = %err, "failed to flush stdio response");
            break;
        }
    }

    Ok(())
}
