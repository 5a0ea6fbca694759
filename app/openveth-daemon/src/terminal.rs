//! Interactive terminal bridge.
//!
//! Upgrades the request to a WebSocket, opens a TTY exec (`bash`)
//! inside the target container and pumps bytes in both directions.
//! TTY execs yield a single raw byte stream with no framing, so no
//! demultiplexing happens here. Either direction ending tears the
//! whole session down.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::Response;
use bollard::exec::{CreateExecOptions, StartExecResults};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::api::AppState;
use crate::error::{ApiError, Result};

/// Outbound chunk size toward the client.
const CHUNK_SIZE: usize = 1024;

#[derive(Debug, Deserialize)]
pub struct TerminalQuery {
    node: Option<String>,
}

/// `GET /api/v1/terminal?node=<name>`: bidirectional TTY session.
///
/// The name check runs before the upgrade so a bad request is rejected
/// over plain HTTP.
pub async fn handle_terminal(
    State(state): State<AppState>,
    Query(query): Query<TerminalQuery>,
    ws: Option<WebSocketUpgrade>,
) -> Result<Response> {
    let node = query
        .node
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError::BadRequest("node name is required".to_string()))?;

    let ws =
        ws.ok_or_else(|| ApiError::BadRequest("websocket upgrade required".to_string()))?;

    Ok(ws.on_upgrade(move |socket| async move {
        debug!(node = %node, "terminal session opened");
        if let Err(e) = bridge_session(&state, socket, &node).await {
            warn!(node = %node, "terminal session failed: {e}");
        }
        debug!(node = %node, "terminal session closed");
    }))
}

/// Runs the two pump directions until either side ends, then lets both
/// streams drop, which closes the exec stream and the client socket.
async fn bridge_session(state: &AppState, socket: WebSocket, node: &str) -> Result<()> {
    let docker = state.manager.docker();

    let exec = CreateExecOptions {
        cmd: Some(vec!["bash"]),
        attach_stdin: Some(true),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        tty: Some(true),
        ..Default::default()
    };
    let created = docker
        .create_exec(node, exec)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to create exec: {e}")))?;

    let started = docker
        .start_exec(&created.id, None)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to attach to exec: {e}")))?;
    let StartExecResults::Attached {
        mut output,
        mut input,
    } = started
    else {
        return Err(ApiError::Internal(
            "exec started detached, no stream".to_string(),
        ));
    };

    let (mut ws_sink, mut ws_stream) = socket.split();

    // Engine -> client.
    let outbound = async move {
        while let Some(chunk) = output.next().await {
            let Ok(frame) = chunk else { break };
            let bytes = frame.into_bytes();
            for piece in bytes.chunks(CHUNK_SIZE) {
                let text = String::from_utf8_lossy(piece).into_owned();
                if ws_sink.send(Message::Text(text)).await.is_err() {
                    return;
                }
            }
        }
    };

    // Client -> engine.
    let inbound = async move {
        while let Some(Ok(message)) = ws_stream.next().await {
            let payload = match message {
                Message::Text(text) => text.into_bytes(),
                Message::Binary(bytes) => bytes,
                Message::Close(_) => break,
                Message::Ping(_) | Message::Pong(_) => continue,
            };
            if input.write_all(&payload).await.is_err() {
                break;
            }
        }
    };

    tokio::select! {
        () = outbound => {}
        () = inbound => {}
    }

    Ok(())
}
