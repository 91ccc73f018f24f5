// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket endpoint.
//!
//! Protocol: `{"type":"register","publicKey":...}` → `{"type":"registered"}`;
//! `{"type":"message","to":...,"envelope":...}` routed to `to`;
//! `{"type":"ping"}` → `{"type":"pong"}`. Invalid envelopes earn an
//! error frame on the sender's socket and are not routed.

use crate::state::RelayState;
use crate::RelayError;
use anima_agora::keys::verifying_key_from_hex;
use anima_agora::{ClientFrame, ServerFrame};
use anima_core::Clock;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt as _, StreamExt as _};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

static CONN_SEQ: AtomicU64 = AtomicU64::new(1);

pub async fn ws_handler<C: Clock + 'static>(
    State(state): State<Arc<RelayState<C>>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket<C: Clock + 'static>(socket: WebSocket, state: Arc<RelayState<C>>) {
    let conn_id = CONN_SEQ.fetch_add(1, Ordering::SeqCst);
    let (mut sink, mut stream) = socket.split();

    // Single writer: both routed envelopes and protocol replies go
    // through this queue.
    let (tx, mut rx) = mpsc::channel::<ServerFrame>(64);
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&frame) else {
                continue;
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mut registered: Option<String> = None;

    while let Some(message) = stream.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            _ => continue,
        };

        let frame: ClientFrame = match serde_json::from_str(&text) {
            Ok(frame) => frame,
            Err(e) => {
                let _ = tx
                    .send(ServerFrame::Error {
                        message: format!("unparseable frame: {e}"),
                    })
                    .await;
                continue;
            }
        };

        match frame {
            ClientFrame::Register { public_key } => {
                if verifying_key_from_hex(&public_key).is_err() {
                    let _ = tx
                        .send(ServerFrame::Error {
                            message: "invalid public key".to_string(),
                        })
                        .await;
                    continue;
                }
                state.register_ws(&public_key, tx.clone(), conn_id);
                registered = Some(public_key);
                let _ = tx.send(ServerFrame::Registered).await;
            }

            ClientFrame::Ping => {
                if let Some(key) = &registered {
                    state.touch_ws(key);
                }
                let _ = tx.send(ServerFrame::Pong).await;
            }

            ClientFrame::Message { to, envelope } => {
                let Some(sender_key) = &registered else {
                    let _ = tx
                        .send(ServerFrame::Error {
                            message: "not registered".to_string(),
                        })
                        .await;
                    continue;
                };
                if let Err(e) = state.validate_outbound(&envelope, sender_key) {
                    let _ = tx
                        .send(ServerFrame::Error {
                            message: e.to_string(),
                        })
                        .await;
                    continue;
                }
                match state.route(&to, envelope) {
                    Ok(outcome) => debug!(conn_id, ?outcome, "ws envelope routed"),
                    Err(RelayError::UnknownRecipient(to)) => {
                        let _ = tx
                            .send(ServerFrame::Error {
                                message: format!("unknown recipient: {to}"),
                            })
                            .await;
                    }
                    Err(e) => {
                        warn!(conn_id, error = %e, "ws route failed");
                        let _ = tx
                            .send(ServerFrame::Error {
                                message: e.to_string(),
                            })
                            .await;
                    }
                }
            }
        }
    }

    if let Some(key) = registered {
        state.unregister_ws(&key, conn_id);
    }
    drop(tx);
    let _ = writer.await;
}
