use axum::{routing::get, Router};

use escalation_cell::{escalation_routes, EscalationService};
use realtime_cell::{realtime_routes, RealtimeHub};

pub fn create_router(hub: RealtimeHub, escalations: EscalationService) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic realtime API is running!" }))
        .nest("/realtime", realtime_routes(hub))
        .nest("/escalations", escalation_routes(escalations))
}
