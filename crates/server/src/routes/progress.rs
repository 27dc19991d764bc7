use axum::{
    Router,
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
    routing::get,
};
use db::models::batch_job::BatchJob;
use services::services::progress::ProgressEvent;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// WebSocket subscription for a job's progress stream.
///
/// On connect the client receives the current aggregate snapshot, then one
/// event per status transition until the job reaches a terminal state (the
/// final event is followed by a close). Subscribing to an already-terminal
/// job yields the final aggregate once and closes.
pub async fn job_progress_ws(
    Path(job_id): Path<Uuid>,
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    // reject unknown jobs before upgrading
    BatchJob::find_by_id(&state.db.pool, job_id).await?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, job_id)))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, job_id: Uuid) {
    // Subscribe before reading the snapshot so no transition between the two
    // is lost; duplicates are fine, consumers are idempotent on
    // (poster_id, status).
    let mut rx = state.tracker.hub().subscribe(job_id);

    let snapshot = match state.tracker.snapshot(job_id).await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            tracing::error!(job_id = %job_id, "failed to build progress snapshot: {err}");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };
    let already_terminal = matches!(
        &snapshot,
        ProgressEvent::Snapshot { progress, .. } if progress.status.is_terminal()
    );
    if send_event(&mut socket, &snapshot).await.is_err() {
        return;
    }
    if already_terminal {
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => {
                    let is_final = event.is_final();
                    if send_event(&mut socket, &event).await.is_err() {
                        // failing subscribers are dropped, the worker is unaffected
                        tracing::debug!(job_id = %job_id, "subscriber send failed, dropping");
                        return;
                    }
                    if is_final {
                        let _ = socket.send(Message::Close(None)).await;
                        return;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(job_id = %job_id, skipped, "progress subscriber lagging");
                }
                Err(RecvError::Closed) => {
                    // Channel torn down right after the final event; deliver
                    // the terminal aggregate from the repository instead.
                    if let Ok(snapshot) = state.tracker.snapshot(job_id).await {
                        let _ = send_event(&mut socket, &snapshot).await;
                    }
                    let _ = socket.send(Message::Close(None)).await;
                    return;
                }
            },
            incoming = socket.recv() => match incoming {
                None | Some(Ok(Message::Close(_))) => {
                    tracing::debug!(job_id = %job_id, "progress subscriber disconnected");
                    return;
                }
                Some(Err(err)) => {
                    tracing::debug!(job_id = %job_id, "progress socket error: {err}");
                    return;
                }
                // pings are answered by axum, other frames are ignored
                Some(Ok(_)) => {}
            },
        }
    }
}

async fn send_event(socket: &mut WebSocket, event: &ProgressEvent) -> Result<(), axum::Error> {
    let text = serde_json::to_string(event)
        .unwrap_or_else(|_| r#"{"type":"error","message":"serialisation failed"}"#.to_string());
    socket.send(Message::Text(text.into())).await
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/jobs/{job_id}/ws", get(job_progress_ws))
}
