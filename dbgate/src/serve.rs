//! JSON-lines transport.
//!
//! Each input line is one request: `{"id": ..., "tool": "...", "arguments": {...}}`.
//! Requests are served concurrently; each produces exactly one response
//! line carrying the same `id` and either `result` or `error`. Responses
//! may be written out of order. A single writer task owns the output so
//! lines never interleave.

use dbgate_core::{ErrorPayload, Gateway};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

/// Responses buffered between request tasks and the writer.
const RESPONSE_BUFFER: usize = 64;

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Value,
    tool: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Serialize)]
pub(crate) struct Response {
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorPayload>,
}

impl Response {
    fn from_outcome(id: Value, outcome: Result<Value, ErrorPayload>) -> Self {
        match outcome {
            Ok(result) => Self {
                id,
                result: Some(result),
                error: None,
            },
            Err(error) => Self {
                id,
                result: None,
                error: Some(error),
            },
        }
    }
}

/// Serves one request line.
///
/// Lines that are not a valid request still get a response; its `id` is
/// echoed when it can be recovered, otherwise it is null.
pub(crate) async fn handle_line(gateway: &Gateway, line: &str) -> Response {
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejecting malformed request line: {}", e);
            let id = serde_json::from_str::<Value>(line)
                .ok()
                .and_then(|v| v.get("id").cloned())
                .unwrap_or(Value::Null);
            return Response::from_outcome(id, Err(ErrorPayload::invalid_request(e)));
        }
    };

    debug!("Calling tool '{}' (id {})", request.tool, request.id);
    let outcome = gateway.call_tool(&request.tool, &request.arguments).await;
    Response::from_outcome(request.id, outcome)
}

/// Reads requests until EOF, then waits for in-flight calls to finish.
///
/// # Errors
/// Returns error if reading input or writing output fails
pub(crate) async fn run<R, W>(gateway: Arc<Gateway>, input: R, output: W) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<Response>(RESPONSE_BUFFER);
    let writer = tokio::spawn(write_responses(rx, output));

    let mut lines = BufReader::new(input).lines();
    let mut calls = JoinSet::new();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let gateway = Arc::clone(&gateway);
        let tx = tx.clone();
        calls.spawn(async move {
            let response = handle_line(&gateway, &line).await;
            if tx.send(response).await.is_err() {
                error!("Response writer stopped; dropping response");
            }
        });
    }
    drop(tx);

    while let Some(joined) = calls.join_next().await {
        if let Err(e) = joined {
            error!("Request task failed: {}", e);
        }
    }

    writer.await??;
    Ok(())
}

async fn write_responses<W>(mut rx: mpsc::Receiver<Response>, mut output: W) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut frame = serde_json::to_vec(&response)?;
        frame.push(b'\n');
        output.write_all(&frame).await?;
        output.flush().await?;
    }
    Ok(())
}
