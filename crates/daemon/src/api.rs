// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Loop-control HTTP surface.
//!
//! `POST /api/loop/{start,pause,resume,stop,restart}`,
//! `GET /api/loop/status`, `POST /api/message`, and the `/ws` event
//! stream. When an `api_token` is configured every `/api/*` request
//! must carry it as a bearer token; the event stream stays open.

use crate::control::LoopControl;
use crate::DaemonError;
use anima_bus::TinyBus;
use anima_core::{kinds, BusMessage, Clock, LoopStatus};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

/// Shared context behind the API.
pub struct ApiCtx<C: Clock> {
    pub control: LoopControl,
    pub bus: TinyBus<C>,
    pub clock: C,
    pub api_token: Option<String>,
}

pub fn router<C: Clock + 'static>(ctx: Arc<ApiCtx<C>>) -> Router {
    Router::new()
        .route("/api/loop/start", post(start::<C>))
        .route("/api/loop/pause", post(pause::<C>))
        .route("/api/loop/resume", post(resume::<C>))
        .route("/api/loop/stop", post(stop::<C>))
        .route("/api/loop/restart", post(restart::<C>))
        .route("/api/loop/status", get(status::<C>))
        .route("/api/message", post(message::<C>))
        .route("/ws", any(ws_handler::<C>))
        .with_state(ctx)
}

enum ApiError {
    Unauthorized,
    Conflict(String),
    Bus(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "unauthorized"})),
            )
                .into_response(),
            ApiError::Conflict(message) => {
                (StatusCode::CONFLICT, Json(json!({"error": message}))).into_response()
            }
            ApiError::Bus(message) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"error": message})),
            )
                .into_response(),
        }
    }
}

fn authorize<C: Clock>(ctx: &ApiCtx<C>, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = &ctx.api_token else {
        return Ok(());
    };
    let presented = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if presented == Some(expected.as_str()) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

fn loop_result(result: Result<LoopStatus, DaemonError>) -> Result<Response, ApiError> {
    match result {
        Ok(status) => Ok(Json(status).into_response()),
        Err(e) => Err(ApiError::Conflict(e.to_string())),
    }
}

async fn start<C: Clock + 'static>(
    State(ctx): State<Arc<ApiCtx<C>>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    authorize(&ctx, &headers)?;
    loop_result(ctx.control.start(ctx.clock.epoch_ms()))
}

async fn pause<C: Clock + 'static>(
    State(ctx): State<Arc<ApiCtx<C>>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    authorize(&ctx, &headers)?;
    loop_result(ctx.control.pause(ctx.clock.epoch_ms()))
}

async fn resume<C: Clock + 'static>(
    State(ctx): State<Arc<ApiCtx<C>>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    authorize(&ctx, &headers)?;
    loop_result(ctx.control.resume(ctx.clock.epoch_ms()))
}

async fn stop<C: Clock + 'static>(
    State(ctx): State<Arc<ApiCtx<C>>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    authorize(&ctx, &headers)?;
    loop_result(ctx.control.stop(ctx.clock.epoch_ms()))
}

async fn restart<C: Clock + 'static>(
    State(ctx): State<Arc<ApiCtx<C>>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    authorize(&ctx, &headers)?;
    loop_result(ctx.control.restart(ctx.clock.epoch_ms()))
}

async fn status<C: Clock + 'static>(
    State(ctx): State<Arc<ApiCtx<C>>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    authorize(&ctx, &headers)?;
    Ok(Json(ctx.control.status()).into_response())
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    text: String,
}

/// Inject a user message. It reaches the live session when one is
/// accepting input, otherwise the next Ego prompt.
async fn message<C: Clock + 'static>(
    State(ctx): State<Arc<ApiCtx<C>>>,
    headers: HeaderMap,
    Json(body): Json<MessageBody>,
) -> Result<Response, ApiError> {
    authorize(&ctx, &headers)?;
    let msg = BusMessage::new(
        kinds::USER_MESSAGE,
        json!({"text": body.text}),
        ctx.clock.epoch_ms(),
    )
    .with_source("ui");
    ctx.bus
        .publish(msg)
        .map_err(|e| ApiError::Bus(e.to_string()))?;
    Ok(Json(json!({"ok": true})).into_response())
}

async fn ws_handler<C: Clock + 'static>(
    State(ctx): State<Arc<ApiCtx<C>>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| stream_events(socket, ctx))
}

/// Forward loop events to one UI client until it goes away.
async fn stream_events<C: Clock>(mut socket: WebSocket, ctx: Arc<ApiCtx<C>>) {
    let mut events = ctx.control.subscribe();
    loop {
        tokio::select! {
            event = events.recv() => {
                let Ok(event) = event else {
                    // Lagged or closed; a UI can always resubscribe
                    debug!("ui event stream ended");
                    break;
                };
                let Ok(text) = serde_json::to_string(&event) else {
                    continue;
                };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(_)) => {} // UI pings are ignored
                    _ => break,
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
