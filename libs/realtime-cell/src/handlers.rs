use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::{Json, Response},
    Extension,
};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use shared_models::error::AppError;
use shared_models::{Identity, User};

use crate::error::RealtimeError;
use crate::models::{ClientMessage, PollQuery, PollResponse, RealtimeEvent, RelayOutcome, RoomId, SignalPost};
use crate::services::{NotificationDispatcher, RealtimeHub, TransportHandle};

/// Realtime layer health and connection counts
pub async fn realtime_health(State(hub): State<RealtimeHub>) -> Json<Value> {
    let stats = hub.stats().await;

    Json(json!({
        "status": "healthy",
        "service": "realtime",
        "stats": stats,
        "poll_interval_ms": hub.config().poll_interval_ms,
    }))
}

// ==============================================================================
// PUSH CHANNEL
// ==============================================================================

/// A request that cannot be upgraded gets 503 so the client switches to polling.
pub async fn websocket_handler(
    State(hub): State<RealtimeHub>,
    Extension(user): Extension<User>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, AppError> {
    let identity = user.identity();
    let ws = ws.map_err(|rejection| {
        warn!("WebSocket upgrade for {} failed: {}", identity, rejection);
        RealtimeError::TransportUnavailable(rejection.to_string())
    })?;

    info!("WebSocket upgrade requested by {}", identity);
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, hub, identity)))
}

async fn handle_socket(socket: WebSocket, hub: RealtimeHub, identity: Identity) {
    let (mut sender, mut receiver) = socket.split();
    let (handle, mut events) = hub.connect_push(&identity).await;

    // Writer: drains this connection's buffer in order.
    let writer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to serialize {}: {}", event.name(), e);
                    continue;
                }
            };
            if let Err(e) = sender.send(Message::Text(text.into())).await {
                debug!("WebSocket send failed, stopping writer: {}", e);
                break;
            }
        }
    });

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if let Err(e) = apply_frame(&hub, &handle, &identity, text.as_str()).await {
                    warn!("Rejected frame from {}: {}", identity, e);
                    NotificationDispatcher::deliver_to(
                        &handle,
                        &RealtimeEvent::Error { message: e.to_string() },
                    )
                    .await;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket error for {}: {}", identity, e);
                break;
            }
        }
    }

    hub.disconnect(handle.id()).await;
    writer.abort();
    info!("WebSocket closed for {}", identity);
}

async fn apply_frame(
    hub: &RealtimeHub,
    handle: &TransportHandle,
    identity: &Identity,
    text: &str,
) -> Result<(), RealtimeError> {
    let message: ClientMessage =
        serde_json::from_str(text).map_err(|e| RealtimeError::InvalidMessage(e.to_string()))?;
    hub.handle_client_message(handle, identity, message).await
}

// ==============================================================================
// FALLBACK TRANSPORT
// ==============================================================================

pub async fn poll_signals(
    State(hub): State<RealtimeHub>,
    Extension(user): Extension<User>,
    Query(query): Query<PollQuery>,
) -> Result<Json<PollResponse>, AppError> {
    let response = hub.poll(&user.identity(), query.room, query.since).await?;
    Ok(Json(response))
}

pub async fn post_signal(
    State(hub): State<RealtimeHub>,
    Extension(user): Extension<User>,
    Json(post): Json<SignalPost>,
) -> Result<Json<Value>, AppError> {
    let outcome = hub.post_signal(&user.identity(), post).await?;
    Ok(Json(relay_outcome_body(outcome)))
}

pub async fn join_room(
    State(hub): State<RealtimeHub>,
    Extension(user): Extension<User>,
    Path(room_id): Path<RoomId>,
) -> Result<Json<Value>, AppError> {
    let view = hub.join_room_polling(&user.identity(), room_id).await?;

    Ok(Json(json!({
        "success": true,
        "room": view,
    })))
}

pub async fn close_polling(
    State(hub): State<RealtimeHub>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let closed = hub.close_polling(&user.identity()).await;

    Ok(Json(json!({
        "success": closed,
    })))
}

fn relay_outcome_body(outcome: RelayOutcome) -> Value {
    match outcome {
        RelayOutcome::Delivered { recipients } => json!({
            "success": true,
            "delivered": recipients,
        }),
        RelayOutcome::TargetAbsent => json!({
            "success": true,
            "delivered": 0,
            "message": "Peer has not joined the room yet",
        }),
    }
}
