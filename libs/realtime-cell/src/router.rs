use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_utils::extractor::identity_middleware;

use crate::handlers::*;
use crate::services::RealtimeHub;

/// Push channel, polling fallback and room membership routes.
pub fn realtime_routes(hub: RealtimeHub) -> Router {
    let public_routes = Router::new()
        .route("/health", get(realtime_health));

    let protected_routes = Router::new()
        .route("/ws", get(websocket_handler))
        .route("/signal", get(poll_signals).post(post_signal).delete(close_polling))
        .route("/rooms/{room_id}/join", post(join_room))
        .layer(middleware::from_fn(identity_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(hub)
}
