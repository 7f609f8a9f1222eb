//! Live console sessions. Each WebSocket connection binds to one container,
//! relays its log stream outbound, and executes ad-hoc in-container commands
//! inbound, until either side disconnects.
//!
//! Two tasks produce outbound frames (the log relay and the command loop);
//! both funnel through one writer task that owns the sink, so the transport
//! never sees concurrent writers. Log frames and command results may
//! interleave; command results never interleave with each other.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use quarry_core::ContainerIdentity;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::{Instrument, info_span};

use crate::docker::ContainerRuntime;
use crate::state::AppState;

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttachFrame {
    server_name: String,
    user_email: String,
}

#[derive(Debug, serde::Deserialize)]
struct CommandFrame {
    action: String,
    #[serde(default)]
    command: String,
}

#[derive(Debug, PartialEq, Eq)]
enum Inbound {
    Execute(String),
    Ignore,
    Malformed,
}

fn parse_attach(text: &str) -> Option<ContainerIdentity> {
    let frame = serde_json::from_str::<AttachFrame>(text).ok()?;
    if frame.server_name.trim().is_empty() || frame.user_email.trim().is_empty() {
        return None;
    }
    Some(ContainerIdentity::resolve(
        frame.server_name.trim(),
        frame.user_email.trim(),
    ))
}

/// Only `action == "command"` with a non-empty command executes; other
/// actions are ignored, unparseable frames get an in-band error.
fn parse_inbound(text: &str) -> Inbound {
    match serde_json::from_str::<CommandFrame>(text) {
        Ok(frame) if frame.action == "command" => {
            let command = frame.command.trim();
            if command.is_empty() {
                Inbound::Ignore
            } else {
                Inbound::Execute(command.to_string())
            }
        }
        Ok(_) => Inbound::Ignore,
        Err(_) => Inbound::Malformed,
    }
}

pub async fn console_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_session(state, socket))
}

async fn handle_session(state: AppState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();

    // Exactly one control frame binds the session to an identity. A malformed
    // frame never attaches: no log-follow subprocess is spawned.
    let first = match receiver.next().await {
        Some(Ok(Message::Text(text))) => parse_attach(&text),
        _ => None,
    };
    let Some(identity) = first else {
        let _ = sender
            .send(Message::Text(
                "error: first frame must be {\"serverName\",\"userEmail\"}".to_string(),
            ))
            .await;
        let _ = sender.send(Message::Close(None)).await;
        return;
    };

    let span = info_span!("console", container = %identity);
    async move {
        let runtime = state.lifecycle.runtime().clone();

        let mut child = match runtime.follow_logs(identity.as_str()) {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(error = %e, "failed to spawn log follow");
                let _ = sender
                    .send(Message::Text(format!("error: failed to attach logs: {e}")))
                    .await;
                let _ = sender.send(Message::Close(None)).await;
                return;
            }
        };

        let (tx, mut rx) = mpsc::channel::<Message>(64);

        let mut writer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if sender.send(msg).await.is_err() {
                    break;
                }
            }
        });

        // The follow subprocess mirrors the container's stdout and stderr;
        // relay both. End-of-stream ends only the relay, not the session.
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(relay_stream(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(relay_stream(stderr, tx.clone()));
        }

        tracing::info!("console session attached");

        loop {
            // Wake on writer exit too, so an outbound write failure closes
            // the session even when the peer sends nothing further.
            let msg = tokio::select! {
                msg = receiver.next() => msg,
                _ = &mut writer => break,
            };
            let Some(Ok(msg)) = msg else { break };
            match msg {
                Message::Text(text) => match parse_inbound(&text) {
                    Inbound::Execute(command) => {
                        // One command at a time; the loop blocks until the
                        // in-container execution finishes.
                        let result = match runtime.exec(identity.as_str(), &command).await {
                            Ok(out) => out.output,
                            Err(e) => format!("error: command failed: {e}"),
                        };
                        if tx.send(Message::Text(result)).await.is_err() {
                            break;
                        }
                    }
                    Inbound::Ignore => {}
                    Inbound::Malformed => {
                        if tx
                            .send(Message::Text("error: invalid command frame".to_string()))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                },
                Message::Close(_) => break,
                _ => {}
            }
        }

        // Teardown must not leak the follow subprocess. The relay tasks wind
        // down on their own once the pipes close; a brief overlap with the
        // writer is tolerated.
        let _ = child.start_kill();
        writer.abort();
        tracing::info!("console session closed");
    }
    .instrument(span)
    .await
}

async fn relay_stream(
    mut stream: impl tokio::io::AsyncRead + Unpin + Send + 'static,
    tx: mpsc::Sender<Message>,
) {
    let mut buf = vec![0u8; 8 * 1024];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                if tx.send(Message::Text(chunk)).await.is_err() {
                    break;
                }
            }
        }
    }
}
