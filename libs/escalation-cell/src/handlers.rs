use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_models::{error::AppError, User};

use crate::error::EscalationError;
use crate::models::{AvailabilityUpdate, ChooseConnectionTypeRequest, CreateEscalationRequest};
use crate::services::EscalationService;

fn require_patient(user: &User) -> Result<(), AppError> {
    if user.is_doctor() {
        return Err(AppError::Forbidden("Only patients can do this".to_string()));
    }
    Ok(())
}

fn require_doctor(user: &User) -> Result<(), AppError> {
    if !user.is_doctor() {
        return Err(AppError::Forbidden("Only doctors can do this".to_string()));
    }
    Ok(())
}

// ==============================================================================
// ESCALATION
// ==============================================================================

/// Ask for a doctor. "Nobody online" is an outcome, not an error.
pub async fn create_escalation(
    State(service): State<EscalationService>,
    Extension(user): Extension<User>,
    Json(body): Json<CreateEscalationRequest>,
) -> Result<Json<Value>, AppError> {
    require_patient(&user)?;
    info!("Escalation requested by patient {}", user.id);

    match service.create(&user.id, body.specialty).await {
        Ok(dispatched) => Ok(Json(json!({
            "outcome": "requested",
            "request": dispatched.request,
            "doctor": dispatched.doctor,
            "attempt": dispatched.attempt,
            "total_online": dispatched.total_online,
        }))),
        Err(e @ EscalationError::NoDoctorAvailable) => Ok(Json(json!({
            "outcome": "no_doctor_available",
            "message": e.to_string(),
        }))),
        Err(e) => Err(e.into()),
    }
}

pub async fn get_escalation(
    State(service): State<EscalationService>,
    Extension(user): Extension<User>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let request = service.get_request(request_id).await?;

    let involved = if user.is_doctor() {
        request.doctor_id == user.id
    } else {
        request.patient_id == user.id
    };
    if !involved {
        return Err(AppError::Forbidden("Not a party to this request".to_string()));
    }

    Ok(Json(json!({ "request": request })))
}

pub async fn accept_escalation(
    State(service): State<EscalationService>,
    Extension(user): Extension<User>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    require_doctor(&user)?;
    let request = service.accept(request_id, &user.id).await?;

    Ok(Json(json!({
        "success": true,
        "request": request,
    })))
}

pub async fn reject_escalation(
    State(service): State<EscalationService>,
    Extension(user): Extension<User>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    require_doctor(&user)?;
    let result = service.reject(request_id, &user.id).await?;

    Ok(Json(json!({
        "success": true,
        "rejected": result.rejected,
        "next": result.next,
    })))
}

pub async fn choose_connection_type(
    State(service): State<EscalationService>,
    Extension(user): Extension<User>,
    Path(request_id): Path<Uuid>,
    Json(body): Json<ChooseConnectionTypeRequest>,
) -> Result<Json<Value>, AppError> {
    require_patient(&user)?;
    let request = service
        .choose_connection_type(request_id, &user.id, body.connection_type)
        .await?;

    Ok(Json(json!({
        "success": true,
        "request": request,
    })))
}

pub async fn accept_connection(
    State(service): State<EscalationService>,
    Extension(user): Extension<User>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    require_doctor(&user)?;
    let response = service.accept_connection(request_id, &user.id).await?;

    Ok(Json(json!({
        "success": true,
        "request_id": response.request_id,
        "room_id": response.room_id,
        "connection_type": response.connection_type,
        "redirect": response.redirect,
    })))
}

pub async fn reject_connection(
    State(service): State<EscalationService>,
    Extension(user): Extension<User>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    require_doctor(&user)?;
    let request = service.reject_connection(request_id, &user.id).await?;

    Ok(Json(json!({
        "success": true,
        "request": request,
    })))
}

pub async fn get_chain(
    State(service): State<EscalationService>,
    Extension(user): Extension<User>,
    Path(chain_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let view = service.get_chain(chain_id).await?;

    let involved = view.chain.patient_id == user.id
        || (user.is_doctor() && view.requests.iter().any(|r| r.doctor_id == user.id));
    if !involved {
        return Err(AppError::Forbidden("Not a party to this chain".to_string()));
    }

    Ok(Json(json!({
        "chain": view.chain,
        "requests": view.requests,
    })))
}

// ==============================================================================
// DOCTORS
// ==============================================================================

pub async fn list_doctors(State(service): State<EscalationService>) -> Result<Json<Value>, AppError> {
    let doctors = service.list_doctors().await?;
    let online = doctors.iter().filter(|d| d.is_online()).count();
    debug!("Listing {} doctors ({} online)", doctors.len(), online);

    Ok(Json(json!({
        "doctors": doctors,
        "online_count": online,
    })))
}

pub async fn update_availability(
    State(service): State<EscalationService>,
    Extension(user): Extension<User>,
    Json(body): Json<AvailabilityUpdate>,
) -> Result<Json<Value>, AppError> {
    require_doctor(&user)?;
    let doctor = service.set_availability(&user.id, body.online).await?;

    Ok(Json(json!({
        "success": true,
        "doctor": doctor,
    })))
}
