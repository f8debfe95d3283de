//! stdio transport: newline-delimited JSON-RPC on stdin/stdout.
//!
//! One message (or batch) per line. Lines are handled strictly in order and
//! every output is written as a single line, so stdout carries nothing but
//! protocol frames.

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::handler::{McpHandler, Notifier};
use super::protocol::{InboundBatch, JsonRpcResponse};

/// Serve MCP over a line-oriented byte stream until EOF or shutdown.
pub async fn serve_stdio<R, W>(
    handler: Arc<McpHandler>,
    reader: R,
    mut writer: W,
    shutdown: CancellationToken,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!("MCP stdio transport ready");
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("stdio transport shutting down");
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            info!("stdin closed, stopping");
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        for frame in handle_line(&handler, line).await {
            write_frame(&mut writer, &frame).await?;
        }
    }

    writer.flush().await
}

/// Everything to write back for one input line, in order: notifications
/// emitted while handling, then the response (or batch of responses).
async fn handle_line(handler: &McpHandler, line: &str) -> Vec<Value> {
    let batch = match InboundBatch::parse(line.as_bytes()) {
        Ok(batch) => batch,
        Err(e) => {
            debug!("stdio: rejecting line: {}", e);
            return vec![e.to_response().into_value()];
        }
    };
    let is_batch = batch.is_batch;

    let emitted = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&emitted);
    let notifier = Notifier::new(move |notification| sink.lock().push(notification.into_value()));

    let mut responses = Vec::new();
    for request in batch.into_requests() {
        let id = request.id.clone();
        let is_notification = request.is_notification();
        match handler.handle_request(request, &notifier).await {
            Ok(Some(response)) => responses.push(response.into_value()),
            Ok(None) => {}
            Err(e) => {
                error!("MCP: Request failed: {:#}", anyhow::Error::new(e));
                if !is_notification {
                    responses.push(JsonRpcResponse::internal_error(id).into_value());
                }
            }
        }
    }

    let mut frames = std::mem::take(&mut *emitted.lock());
    if is_batch {
        if !responses.is_empty() {
            frames.push(Value::Array(responses));
        }
    } else {
        frames.extend(responses);
    }
    frames
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &Value) -> std::io::Result<()> {
    let mut line = serde_json::to_vec(frame)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await
}
