use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use realtime_cell::{RealtimeEvent, RealtimeHub, SessionObserver};
use shared_config::AppConfig;
use shared_database::{DoctorStore, EscalationStore};
use shared_models::{
    Attempt, ChainOutcome, ConnectionStatus, ConnectionType, ConsultationRoom, Doctor,
    EscalationChain, EscalationRequest, EscalationStatus, ExhaustionReason, Identity,
    RejectionReason,
};

use crate::error::EscalationError;
use crate::models::{
    exhaustion_message, AcceptConnectionResponse, ChainStep, ChainView, Dispatched, RejectResult,
};
use crate::services::availability::AvailabilityService;
use crate::services::lifecycle::EscalationLifecycle;
use crate::services::matching::DoctorMatchingPolicy;
use crate::services::sessions::RoomEndRecorder;
use crate::services::timeout::ResponseTimers;

/// Drives escalation requests from creation to an established consultation.
///
/// Every mutate-then-notify sequence runs under one async mutex, so two
/// racing rejections never reserve the same doctor and two racing
/// connection accepts never open two rooms.
#[derive(Clone)]
pub struct EscalationService {
    store: Arc<dyn EscalationStore>,
    doctors: Arc<dyn DoctorStore>,
    hub: RealtimeHub,
    matching: DoctorMatchingPolicy,
    availability: AvailabilityService,
    lifecycle: EscalationLifecycle,
    timers: ResponseTimers,
    response_timeout: Option<Duration>,
    transitions: Arc<Mutex<()>>,
}

impl EscalationService {
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn EscalationStore>,
        doctors: Arc<dyn DoctorStore>,
        hub: RealtimeHub,
    ) -> Self {
        Self {
            matching: DoctorMatchingPolicy::new(config, doctors.clone()),
            availability: AvailabilityService::new(doctors.clone(), hub.clone()),
            lifecycle: EscalationLifecycle::new(),
            timers: ResponseTimers::new(),
            response_timeout: config.escalation_response_timeout(),
            transitions: Arc::new(Mutex::new(())),
            store,
            doctors,
            hub,
        }
    }

    /// Observer to register with the realtime hub so ended sessions are recorded.
    pub fn session_observer(&self) -> Arc<dyn SessionObserver> {
        Arc::new(RoomEndRecorder::new(self.store.clone()))
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.pending()
    }

    // ==========================================================================
    // ESCALATION
    // ==========================================================================

    pub async fn create(&self, patient_id: &str, specialty: Option<String>) -> Result<Dispatched, EscalationError> {
        let _guard = self.transitions.lock().await;
        debug!("Creating escalation for patient {}", patient_id);

        let total_online = self.availability.online_count().await?;
        if total_online == 0 {
            info!("Escalation for patient {} found no doctor online", patient_id);
            return Err(EscalationError::NoDoctorAvailable);
        }

        let mut chain = EscalationChain::new(patient_id, specialty);
        let request_id = Uuid::new_v4();
        let doctor = self
            .matching
            .select_next(&[], chain.specialty.as_deref(), request_id)
            .await?
            .ok_or(EscalationError::NoDoctorAvailable)?;

        let request = new_request(request_id, &chain, &doctor, Vec::new());
        chain.attempts.push(attempt_for(&request));

        self.store.insert_chain(chain).await?;
        self.store.insert_request(request.clone()).await?;

        Ok(self.dispatch(request, &doctor, total_online).await)
    }

    pub async fn accept(&self, request_id: Uuid, doctor_id: &str) -> Result<EscalationRequest, EscalationError> {
        let _guard = self.transitions.lock().await;

        let mut request = self.load_request(request_id).await?;
        ensure_doctor(&request, doctor_id)?;
        self.lifecycle.validate_status_transition(&request, EscalationStatus::Accepted)?;

        // Everything the transition reads is loaded before the first write.
        let doctor = self
            .doctors
            .get_doctor(&request.doctor_id)
            .await?
            .ok_or_else(|| EscalationError::DoctorNotFound(request.doctor_id.clone()))?;
        let mut chain = self.load_chain(request.chain_id).await?;
        self.timers.cancel(request_id);

        request.status = EscalationStatus::Accepted;
        request.responded_at = Some(Utc::now());
        self.store.update_request(request.clone()).await?;

        chain.outcome = ChainOutcome::Accepted { request_id };
        chain.updated_at = Utc::now();
        self.store.update_chain(chain).await?;

        self.availability.restore(&request.doctor_id, request_id).await?;

        info!("Doctor {} accepted request {}", doctor.id, request_id);
        self.hub
            .notify(
                &Identity::User(request.patient_id.clone()),
                RealtimeEvent::DoctorAccepted {
                    request_id,
                    doctor_id: doctor.id.clone(),
                    doctor_name: doctor.full_name(),
                },
            )
            .await;

        Ok(request)
    }

    pub async fn reject(&self, request_id: Uuid, doctor_id: &str) -> Result<RejectResult, EscalationError> {
        let _guard = self.transitions.lock().await;

        let request = self.load_request(request_id).await?;
        ensure_doctor(&request, doctor_id)?;
        self.timers.cancel(request_id);

        self.reject_locked(request, RejectionReason::Declined).await
    }

    /// Timeout path. A request answered in the meantime is left alone.
    pub async fn expire(&self, request_id: Uuid) -> Result<Option<RejectResult>, EscalationError> {
        let _guard = self.transitions.lock().await;
        self.timers.forget(request_id);

        let request = self.load_request(request_id).await?;
        if request.status != EscalationStatus::Pending {
            debug!("Request {} answered before its timer fired", request_id);
            return Ok(None);
        }

        warn!("Doctor {} did not answer request {} in time", request.doctor_id, request_id);
        self.hub
            .notify(
                &Identity::Doctor(request.doctor_id.clone()),
                RealtimeEvent::EscalationExpired { request_id },
            )
            .await;

        self.reject_locked(request, RejectionReason::TimedOut).await.map(Some)
    }

    async fn reject_locked(
        &self,
        mut request: EscalationRequest,
        reason: RejectionReason,
    ) -> Result<RejectResult, EscalationError> {
        self.lifecycle.validate_status_transition(&request, EscalationStatus::Rejected)?;

        let doctor_id = request.doctor_id.clone();
        request.status = EscalationStatus::Rejected;
        request.rejection_reason = Some(reason);
        request.responded_at = Some(Utc::now());
        request.record_tried(&doctor_id);
        self.store.update_request(request.clone()).await?;

        self.availability.restore(&doctor_id, request.id).await?;
        info!("Request {} rejected by doctor {} ({:?})", request.id, doctor_id, reason);

        let mut chain = self.load_chain(request.chain_id).await?;
        let next = self.advance_chain(&mut chain, &request).await?;
        chain.updated_at = Utc::now();
        self.store.update_chain(chain).await?;

        Ok(RejectResult {
            rejected: request,
            next,
        })
    }

    /// Sends the chain to the next untried doctor, or ends it.
    async fn advance_chain(
        &self,
        chain: &mut EscalationChain,
        rejected: &EscalationRequest,
    ) -> Result<ChainStep, EscalationError> {
        let tried = rejected.tried_doctor_ids.clone();
        let total_online = self.availability.online_count().await?;

        if total_online == 0 {
            return Ok(self.exhaust(chain, ExhaustionReason::NoneOnline, tried.len()).await);
        }
        if tried.len() >= total_online as usize {
            return Ok(self.exhaust(chain, ExhaustionReason::AllContacted, tried.len()).await);
        }

        let request_id = Uuid::new_v4();
        let Some(doctor) = self
            .matching
            .select_next(&tried, chain.specialty.as_deref(), request_id)
            .await?
        else {
            return Ok(self.exhaust(chain, ExhaustionReason::AllContacted, tried.len()).await);
        };

        let request = new_request(request_id, chain, &doctor, tried);
        chain.attempts.push(attempt_for(&request));
        self.store.insert_request(request.clone()).await?;

        info!(
            "Chain {} retrying with doctor {} (attempt {}/{})",
            chain.id, doctor.id, request.attempt_number, total_online
        );
        Ok(ChainStep::Retried(self.dispatch(request, &doctor, total_online).await))
    }

    async fn exhaust(&self, chain: &mut EscalationChain, reason: ExhaustionReason, contacted: usize) -> ChainStep {
        let message = exhaustion_message(reason, contacted);
        chain.outcome = ChainOutcome::Exhausted { reason };

        info!("Chain {} exhausted: {}", chain.id, message);
        self.hub
            .notify(
                &Identity::User(chain.patient_id.clone()),
                RealtimeEvent::NoDoctorsAvailable {
                    chain_id: chain.id,
                    reason,
                    message: message.clone(),
                },
            )
            .await;

        ChainStep::Exhausted {
            chain_id: chain.id,
            reason,
            message,
        }
    }

    /// Notifies the selected doctor and arms the response timer.
    async fn dispatch(&self, request: EscalationRequest, doctor: &Doctor, total_online: u32) -> Dispatched {
        let report = self
            .hub
            .notify(
                &Identity::Doctor(doctor.id.clone()),
                RealtimeEvent::EscalationRequest {
                    request_id: request.id,
                    chain_id: request.chain_id,
                    patient_id: request.patient_id.clone(),
                    specialty: request.specialty.clone(),
                    attempt: request.attempt_number,
                    total_online,
                },
            )
            .await;

        if report.delivered == 0 {
            debug!("Doctor {} has no live connection for request {}", doctor.id, request.id);
        }

        self.schedule_timeout(request.id);

        Dispatched {
            attempt: request.attempt_number,
            doctor: doctor.summary(),
            request,
            total_online,
        }
    }

    fn schedule_timeout(&self, request_id: Uuid) {
        let Some(delay) = self.response_timeout else {
            return;
        };

        let service = self.clone();
        self.timers.schedule(request_id, delay, async move {
            if let Err(e) = service.expire(request_id).await {
                error!("Failed to expire request {}: {}", request_id, e);
            }
        });
    }

    // ==========================================================================
    // CONNECTION HANDSHAKE
    // ==========================================================================

    pub async fn choose_connection_type(
        &self,
        request_id: Uuid,
        patient_id: &str,
        connection_type: ConnectionType,
    ) -> Result<EscalationRequest, EscalationError> {
        let _guard = self.transitions.lock().await;

        let mut request = self.load_request(request_id).await?;
        ensure_patient(&request, patient_id)?;
        self.lifecycle.validate_connection_step(&request)?;

        request.connection_type = Some(connection_type);
        request.connection_status = ConnectionStatus::Pending;
        self.store.update_request(request.clone()).await?;

        info!("Patient {} chose {} for request {}", patient_id, connection_type.as_str(), request_id);
        self.hub
            .notify(
                &Identity::Doctor(request.doctor_id.clone()),
                RealtimeEvent::ConnectionRequest {
                    request_id,
                    patient_id: request.patient_id.clone(),
                    connection_type,
                },
            )
            .await;

        Ok(request)
    }

    pub async fn accept_connection(
        &self,
        request_id: Uuid,
        doctor_id: &str,
    ) -> Result<AcceptConnectionResponse, EscalationError> {
        let _guard = self.transitions.lock().await;

        let mut request = self.load_request(request_id).await?;
        ensure_doctor(&request, doctor_id)?;
        self.lifecycle.validate_connection_step(&request)?;
        self.lifecycle.validate_status_transition(&request, EscalationStatus::Completed)?;

        let connection_type = request.connection_type.unwrap_or_default();
        let room = ConsultationRoom::new(request_id, &request.patient_id, &request.doctor_id, connection_type);
        let redirect = room.redirect_path();
        let room_id = room.id;
        self.store.insert_room(room).await?;

        request.connection_type = Some(connection_type);
        request.connection_status = ConnectionStatus::Accepted;
        request.status = EscalationStatus::Completed;
        request.room_id = Some(room_id);
        self.store.update_request(request.clone()).await?;

        let patient = Identity::User(request.patient_id.clone());
        let doctor = Identity::Doctor(request.doctor_id.clone());
        self.hub.open_room(room_id, vec![patient.clone(), doctor.clone()]).await;

        let event = RealtimeEvent::ConnectionAccepted {
            request_id,
            room_id,
            connection_type,
            redirect: redirect.clone(),
        };
        self.hub.notify(&patient, event.clone()).await;
        self.hub.notify(&doctor, event).await;

        info!("Request {} completed with {} room {}", request_id, connection_type.as_str(), room_id);
        Ok(AcceptConnectionResponse {
            request_id,
            room_id,
            connection_type,
            redirect,
        })
    }

    pub async fn reject_connection(&self, request_id: Uuid, doctor_id: &str) -> Result<EscalationRequest, EscalationError> {
        let _guard = self.transitions.lock().await;

        let mut request = self.load_request(request_id).await?;
        ensure_doctor(&request, doctor_id)?;
        self.lifecycle.validate_connection_step(&request)?;

        request.connection_status = ConnectionStatus::Rejected;
        self.store.update_request(request.clone()).await?;

        info!("Doctor {} declined the connection for request {}", doctor_id, request_id);
        self.hub
            .notify(
                &Identity::User(request.patient_id.clone()),
                RealtimeEvent::ConnectionRejected { request_id },
            )
            .await;

        Ok(request)
    }

    // ==========================================================================
    // DOCTORS
    // ==========================================================================

    pub async fn list_doctors(&self) -> Result<Vec<Doctor>, EscalationError> {
        Ok(self.doctors.list_doctors().await?)
    }

    pub async fn set_availability(&self, doctor_id: &str, online: bool) -> Result<Doctor, EscalationError> {
        let _guard = self.transitions.lock().await;
        self.availability.set_online(doctor_id, online).await
    }

    // ==========================================================================
    // QUERIES
    // ==========================================================================

    pub async fn get_request(&self, request_id: Uuid) -> Result<EscalationRequest, EscalationError> {
        self.load_request(request_id).await
    }

    pub async fn get_chain(&self, chain_id: Uuid) -> Result<ChainView, EscalationError> {
        let chain = self.load_chain(chain_id).await?;
        let mut requests = self.store.requests_for_chain(chain_id).await?;
        requests.sort_by_key(|r| r.attempt_number);

        Ok(ChainView { chain, requests })
    }

    async fn load_request(&self, request_id: Uuid) -> Result<EscalationRequest, EscalationError> {
        self.store
            .get_request(request_id)
            .await?
            .ok_or(EscalationError::RequestNotFound(request_id))
    }

    async fn load_chain(&self, chain_id: Uuid) -> Result<EscalationChain, EscalationError> {
        self.store
            .get_chain(chain_id)
            .await?
            .ok_or(EscalationError::ChainNotFound(chain_id))
    }
}

fn new_request(id: Uuid, chain: &EscalationChain, doctor: &Doctor, tried: Vec<String>) -> EscalationRequest {
    EscalationRequest {
        id,
        chain_id: chain.id,
        attempt_number: tried.len() as u32 + 1,
        patient_id: chain.patient_id.clone(),
        doctor_id: doctor.id.clone(),
        specialty: chain.specialty.clone(),
        status: EscalationStatus::Pending,
        connection_type: None,
        connection_status: ConnectionStatus::NotRequested,
        tried_doctor_ids: tried,
        rejection_reason: None,
        room_id: None,
        created_at: Utc::now(),
        responded_at: None,
    }
}

fn attempt_for(request: &EscalationRequest) -> Attempt {
    Attempt {
        request_id: request.id,
        doctor_id: request.doctor_id.clone(),
        attempt_number: request.attempt_number,
        started_at: request.created_at,
    }
}

fn ensure_doctor(request: &EscalationRequest, doctor_id: &str) -> Result<(), EscalationError> {
    if request.doctor_id != doctor_id {
        warn!("Doctor {} tried to act on request {} assigned to {}", doctor_id, request.id, request.doctor_id);
        return Err(EscalationError::NotAssigned(format!(
            "Request {} is not assigned to this doctor",
            request.id
        )));
    }
    Ok(())
}

fn ensure_patient(request: &EscalationRequest, patient_id: &str) -> Result<(), EscalationError> {
    if request.patient_id != patient_id {
        return Err(EscalationError::NotAssigned(format!(
            "Request {} belongs to another patient",
            request.id
        )));
    }
    Ok(())
}
