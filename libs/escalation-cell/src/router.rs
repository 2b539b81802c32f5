use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_utils::extractor::identity_middleware;

use crate::handlers::*;
use crate::services::EscalationService;

pub fn escalation_routes(service: EscalationService) -> Router {
    let protected_routes = Router::new()
        .route("/", post(create_escalation))
        .route("/{request_id}", get(get_escalation))
        .route("/{request_id}/accept", post(accept_escalation))
        .route("/{request_id}/reject", post(reject_escalation))
        .route("/{request_id}/connection-type", post(choose_connection_type))
        .route("/{request_id}/accept-connection", post(accept_connection))
        .route("/{request_id}/reject-connection", post(reject_connection))
        .route("/chains/{chain_id}", get(get_chain))
        .route("/doctors", get(list_doctors))
        .route("/doctors/availability", put(update_availability))
        .layer(middleware::from_fn(identity_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(service)
}
