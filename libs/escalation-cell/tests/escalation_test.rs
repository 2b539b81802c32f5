use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_test::assert_ok;

use escalation_cell::*;
use realtime_cell::{RealtimeEvent, RealtimeHub, SignalKind};
use shared_config::AppConfig;
use shared_database::{DoctorStore, EscalationStore, InMemoryStore, StoreError};
use shared_models::{
    Availability, ChainOutcome, ConnectionStatus, ConnectionType, Doctor, EscalationStatus,
    ExhaustionReason, Identity, RejectionReason,
};
use shared_utils::test_utils::{TestConfig, TestDoctors};

struct Harness {
    service: EscalationService,
    hub: RealtimeHub,
    store: InMemoryStore,
}

async fn harness_with(config: AppConfig, doctors: Vec<Doctor>) -> Harness {
    let store = InMemoryStore::with_doctors(doctors).await;
    let hub = RealtimeHub::new(Arc::new(config.clone()));
    let service = EscalationService::new(&config, Arc::new(store.clone()), Arc::new(store.clone()), hub.clone());
    Harness { service, hub, store }
}

async fn harness(doctors: Vec<Doctor>) -> Harness {
    harness_with(TestConfig::default().to_app_config(), doctors).await
}

fn patient() -> Identity {
    Identity::User("p1".to_string())
}

fn doctor(id: &str) -> Identity {
    Identity::Doctor(id.to_string())
}

fn drain(rx: &mut mpsc::Receiver<RealtimeEvent>) -> Vec<RealtimeEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

async fn availability(store: &InMemoryStore, doctor_id: &str) -> Availability {
    store.get_doctor(doctor_id).await.unwrap().unwrap().availability
}

#[tokio::test]
async fn test_create_reserves_doctor_and_notifies_them() {
    let h = harness(vec![TestDoctors::general("d1")]).await;
    let (_handle, mut doctor_rx) = h.hub.connect_push(&doctor("d1")).await;

    let dispatched = assert_ok!(h.service.create("p1", None).await);

    assert_eq!(dispatched.doctor.id, "d1");
    assert_eq!(dispatched.attempt, 1);
    assert_eq!(dispatched.total_online, 1);
    assert_eq!(dispatched.request.status, EscalationStatus::Pending);
    assert_eq!(
        availability(&h.store, "d1").await,
        Availability::Reserved { request_id: dispatched.request.id }
    );

    let events = drain(&mut doctor_rx);
    assert_matches!(
        &events[..],
        [RealtimeEvent::EscalationRequest { request_id, attempt: 1, total_online: 1, .. }]
            if *request_id == dispatched.request.id
    );
}

#[tokio::test]
async fn test_create_with_nobody_online() {
    let h = harness(vec![TestDoctors::offline("d1")]).await;
    let (_handle, mut doctor_rx) = h.hub.connect_push(&doctor("d1")).await;

    let result = h.service.create("p1", None).await;

    assert_matches!(result, Err(EscalationError::NoDoctorAvailable));
    assert!(drain(&mut doctor_rx).is_empty());
}

#[tokio::test]
async fn test_reject_retries_then_exhausts() {
    let h = harness(vec![TestDoctors::general("d1"), TestDoctors::general("d2")]).await;
    let (_p, mut patient_rx) = h.hub.connect_push(&patient()).await;
    let (_d2, mut d2_rx) = h.hub.connect_push(&doctor("d2")).await;

    let first = h.service.create("p1", None).await.unwrap();
    assert_eq!(first.doctor.id, "d1");

    let result = h.service.reject(first.request.id, "d1").await.unwrap();
    assert_eq!(result.rejected.status, EscalationStatus::Rejected);
    assert_eq!(result.rejected.rejection_reason, Some(RejectionReason::Declined));
    let second = match result.next {
        ChainStep::Retried(dispatched) => dispatched,
        other => panic!("expected a retry, got {:?}", other),
    };
    assert_eq!(second.doctor.id, "d2");
    assert_eq!((second.attempt, second.total_online), (2, 2));
    assert_eq!(second.request.tried_doctor_ids, vec!["d1".to_string()]);
    assert_eq!(second.request.chain_id, first.request.chain_id);
    assert_matches!(
        &drain(&mut d2_rx)[..],
        [RealtimeEvent::EscalationRequest { attempt: 2, total_online: 2, .. }]
    );

    let result = h.service.reject(second.request.id, "d2").await.unwrap();
    assert_matches!(
        &result.next,
        ChainStep::Exhausted { reason: ExhaustionReason::AllContacted, message, .. }
            if message == "All 2 available doctor(s) have been contacted."
    );
    assert_matches!(
        &drain(&mut patient_rx)[..],
        [RealtimeEvent::NoDoctorsAvailable { reason: ExhaustionReason::AllContacted, .. }]
    );

    let view = h.service.get_chain(first.request.chain_id).await.unwrap();
    assert_eq!(view.chain.attempts.len(), 2);
    assert_eq!(view.requests.len(), 2);
    assert_eq!(
        view.chain.outcome,
        ChainOutcome::Exhausted { reason: ExhaustionReason::AllContacted }
    );

    // Both doctors are back online once their requests resolved.
    assert_eq!(availability(&h.store, "d1").await, Availability::Online);
    assert_eq!(availability(&h.store, "d2").await, Availability::Online);
}

#[tokio::test]
async fn test_chain_never_asks_a_doctor_twice() {
    let ids = ["d1", "d2", "d3", "d4"];
    let h = harness(ids.iter().map(|id| TestDoctors::general(id)).collect()).await;

    let mut current = h.service.create("p1", None).await.unwrap();
    let chain_id = current.request.chain_id;
    loop {
        let result = h
            .service
            .reject(current.request.id, &current.request.doctor_id)
            .await
            .unwrap();
        match result.next {
            ChainStep::Retried(next) => current = next,
            ChainStep::Exhausted { reason, .. } => {
                assert_eq!(reason, ExhaustionReason::AllContacted);
                break;
            }
        }
    }

    let view = h.service.get_chain(chain_id).await.unwrap();
    let asked: Vec<String> = view.chain.attempts.iter().map(|a| a.doctor_id.clone()).collect();
    let unique: HashSet<&String> = asked.iter().collect();
    assert_eq!(asked.len(), ids.len());
    assert_eq!(unique.len(), ids.len());

    let last = view.requests.last().unwrap();
    assert_eq!(last.tried_doctor_ids.len(), ids.len());
}

#[tokio::test]
async fn test_doctor_who_went_offline_stays_offline() {
    let h = harness(vec![TestDoctors::general("d1")]).await;
    let (_p, mut patient_rx) = h.hub.connect_push(&patient()).await;

    let dispatched = h.service.create("p1", None).await.unwrap();
    h.service.set_availability("d1", false).await.unwrap();
    drain(&mut patient_rx);

    let result = h.service.reject(dispatched.request.id, "d1").await.unwrap();

    assert_eq!(availability(&h.store, "d1").await, Availability::Offline);
    assert_matches!(
        result.next,
        ChainStep::Exhausted { reason: ExhaustionReason::NoneOnline, .. }
    );
    assert_matches!(
        &drain(&mut patient_rx)[..],
        [RealtimeEvent::NoDoctorsAvailable { reason: ExhaustionReason::NoneOnline, .. }]
    );
}

#[tokio::test]
async fn test_accept_notifies_patient_and_restores_doctor() {
    let h = harness(vec![TestDoctors::general("d1")]).await;
    let (_p, mut patient_rx) = h.hub.connect_push(&patient()).await;

    let dispatched = h.service.create("p1", None).await.unwrap();
    let accepted = h.service.accept(dispatched.request.id, "d1").await.unwrap();

    assert_eq!(accepted.status, EscalationStatus::Accepted);
    assert!(accepted.responded_at.is_some());
    assert_eq!(availability(&h.store, "d1").await, Availability::Online);
    assert_matches!(
        &drain(&mut patient_rx)[..],
        [RealtimeEvent::DoctorAccepted { doctor_id, doctor_name, .. }]
            if doctor_id == "d1" && doctor_name == "Grace d1"
    );

    let view = h.service.get_chain(accepted.chain_id).await.unwrap();
    assert_eq!(view.chain.outcome, ChainOutcome::Accepted { request_id: accepted.id });
}

#[tokio::test]
async fn test_second_accept_is_invalid_state() {
    let h = harness(vec![TestDoctors::general("d1")]).await;
    let dispatched = h.service.create("p1", None).await.unwrap();

    h.service.accept(dispatched.request.id, "d1").await.unwrap();
    let again = h.service.accept(dispatched.request.id, "d1").await;
    assert_matches!(again, Err(EscalationError::InvalidState { .. }));

    let reject = h.service.reject(dispatched.request.id, "d1").await;
    assert_matches!(reject, Err(EscalationError::InvalidState { .. }));
}

#[tokio::test]
async fn test_only_target_doctor_may_respond() {
    let h = harness(vec![TestDoctors::general("d1"), TestDoctors::general("d2")]).await;
    let dispatched = h.service.create("p1", None).await.unwrap();

    let result = h.service.accept(dispatched.request.id, "d2").await;
    assert_matches!(result, Err(EscalationError::NotAssigned(_)));

    let unknown = h.service.accept(uuid::Uuid::new_v4(), "d1").await;
    assert_matches!(unknown, Err(EscalationError::RequestNotFound(_)));
}

#[tokio::test]
async fn test_video_connection_opens_one_room() {
    let h = harness(vec![TestDoctors::general("d1")]).await;
    let (_p, mut patient_rx) = h.hub.connect_push(&patient()).await;
    let (_d, mut doctor_rx) = h.hub.connect_push(&doctor("d1")).await;

    let dispatched = h.service.create("p1", None).await.unwrap();
    let request_id = dispatched.request.id;
    h.service.accept(request_id, "d1").await.unwrap();
    drain(&mut patient_rx);
    drain(&mut doctor_rx);

    let chosen = h
        .service
        .choose_connection_type(request_id, "p1", ConnectionType::Video)
        .await
        .unwrap();
    assert_eq!(chosen.connection_status, ConnectionStatus::Pending);
    assert_matches!(
        &drain(&mut doctor_rx)[..],
        [RealtimeEvent::ConnectionRequest { connection_type: ConnectionType::Video, .. }]
    );

    let response = h.service.accept_connection(request_id, "d1").await.unwrap();
    assert_eq!(response.connection_type, ConnectionType::Video);
    assert_eq!(response.redirect, format!("/consultation/video/{}", response.room_id));

    for rx in [&mut patient_rx, &mut doctor_rx] {
        assert_matches!(
            &drain(rx)[..],
            [RealtimeEvent::ConnectionAccepted { room_id, .. }] if *room_id == response.room_id
        );
    }

    let again = h.service.accept_connection(request_id, "d1").await;
    assert_matches!(again, Err(EscalationError::InvalidState { .. }));
    assert_eq!(h.store.room_count().await, 1);

    let request = h.service.get_request(request_id).await.unwrap();
    assert_eq!(request.status, EscalationStatus::Completed);
    assert_eq!(request.connection_status, ConnectionStatus::Accepted);
    assert_eq!(request.room_id, Some(response.room_id));
    assert!(h.hub.relay().room(response.room_id).await.is_some());
}

#[tokio::test]
async fn test_concurrent_accept_connection_creates_single_room() {
    let h = harness(vec![TestDoctors::general("d1")]).await;
    let dispatched = h.service.create("p1", None).await.unwrap();
    let request_id = dispatched.request.id;
    h.service.accept(request_id, "d1").await.unwrap();

    let (first, second) = tokio::join!(
        h.service.accept_connection(request_id, "d1"),
        h.service.accept_connection(request_id, "d1"),
    );

    let successes = [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1);
    let loser = if first.is_ok() { second } else { first };
    assert_matches!(loser, Err(EscalationError::InvalidState { .. }));
    assert_eq!(h.store.room_count().await, 1);
}

#[tokio::test]
async fn test_accept_connection_defaults_to_chat() {
    let h = harness(vec![TestDoctors::general("d1")]).await;
    let dispatched = h.service.create("p1", None).await.unwrap();
    h.service.accept(dispatched.request.id, "d1").await.unwrap();

    let response = h.service.accept_connection(dispatched.request.id, "d1").await.unwrap();

    assert_eq!(response.connection_type, ConnectionType::Chat);
    assert!(response.redirect.starts_with("/consultation/chat/"));
}

#[tokio::test]
async fn test_connection_steps_require_accepted_request() {
    let h = harness(vec![TestDoctors::general("d1")]).await;
    let dispatched = h.service.create("p1", None).await.unwrap();
    let request_id = dispatched.request.id;

    let early = h
        .service
        .choose_connection_type(request_id, "p1", ConnectionType::Chat)
        .await;
    assert_matches!(early, Err(EscalationError::InvalidState { .. }));

    h.service.accept(request_id, "d1").await.unwrap();
    let stranger = h
        .service
        .choose_connection_type(request_id, "p2", ConnectionType::Chat)
        .await;
    assert_matches!(stranger, Err(EscalationError::NotAssigned(_)));
}

#[tokio::test]
async fn test_reject_connection_notifies_patient() {
    let h = harness(vec![TestDoctors::general("d1")]).await;
    let (_p, mut patient_rx) = h.hub.connect_push(&patient()).await;
    let dispatched = h.service.create("p1", None).await.unwrap();
    let request_id = dispatched.request.id;
    h.service.accept(request_id, "d1").await.unwrap();
    drain(&mut patient_rx);

    let request = h.service.reject_connection(request_id, "d1").await.unwrap();

    assert_eq!(request.connection_status, ConnectionStatus::Rejected);
    assert_eq!(request.status, EscalationStatus::Accepted);
    assert_matches!(
        &drain(&mut patient_rx)[..],
        [RealtimeEvent::ConnectionRejected { .. }]
    );

    let late = h.service.accept_connection(request_id, "d1").await;
    assert_matches!(late, Err(EscalationError::InvalidState { .. }));
}

#[tokio::test]
async fn test_expired_request_moves_to_next_doctor() {
    let h = harness(vec![TestDoctors::general("d1"), TestDoctors::general("d2")]).await;
    let (_d1, mut d1_rx) = h.hub.connect_push(&doctor("d1")).await;
    let dispatched = h.service.create("p1", None).await.unwrap();
    drain(&mut d1_rx);

    let result = h.service.expire(dispatched.request.id).await.unwrap().unwrap();

    assert_eq!(result.rejected.rejection_reason, Some(RejectionReason::TimedOut));
    assert_matches!(&result.next, ChainStep::Retried(next) if next.doctor.id == "d2");
    assert_matches!(
        &drain(&mut d1_rx)[..],
        [RealtimeEvent::EscalationExpired { request_id }] if *request_id == dispatched.request.id
    );
    assert_eq!(availability(&h.store, "d1").await, Availability::Online);
}

#[tokio::test]
async fn test_expire_after_answer_is_noop() {
    let h = harness(vec![TestDoctors::general("d1")]).await;
    let dispatched = h.service.create("p1", None).await.unwrap();
    h.service.accept(dispatched.request.id, "d1").await.unwrap();

    let result = h.service.expire(dispatched.request.id).await.unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_answering_cancels_response_timer() {
    let config = TestConfig {
        escalation_response_timeout_secs: Some(60),
        ..Default::default()
    };
    let h = harness_with(config.to_app_config(), vec![TestDoctors::general("d1")]).await;

    let dispatched = h.service.create("p1", None).await.unwrap();
    assert_eq!(h.service.pending_timers(), 1);

    h.service.accept(dispatched.request.id, "d1").await.unwrap();
    assert_eq!(h.service.pending_timers(), 0);
}

#[tokio::test]
async fn test_unanswered_request_times_out_to_next_doctor() {
    let config = TestConfig {
        escalation_response_timeout_secs: Some(1),
        ..Default::default()
    };
    let h = harness_with(
        config.to_app_config(),
        vec![TestDoctors::general("d1"), TestDoctors::general("d2")],
    )
    .await;
    let (_d1, mut d1_rx) = h.hub.connect_push(&doctor("d1")).await;

    let first = h.service.create("p1", None).await.unwrap();
    assert_eq!(first.doctor.id, "d1");
    drain(&mut d1_rx);

    tokio::time::sleep(Duration::from_millis(1500)).await;

    let expired = h.service.get_request(first.request.id).await.unwrap();
    assert_eq!(expired.status, EscalationStatus::Rejected);
    assert_eq!(expired.rejection_reason, Some(RejectionReason::TimedOut));
    assert!(drain(&mut d1_rx)
        .iter()
        .any(|e| matches!(e, RealtimeEvent::EscalationExpired { request_id } if *request_id == first.request.id)));
    assert_eq!(availability(&h.store, "d1").await, Availability::Online);

    let view = h.service.get_chain(first.request.chain_id).await.unwrap();
    let second = view
        .requests
        .iter()
        .find(|r| r.attempt_number == 2)
        .expect("second attempt dispatched by the timer");
    assert_eq!(second.doctor_id, "d2");
    assert_matches!(availability(&h.store, "d2").await, Availability::Reserved { request_id } if request_id == second.id);

    h.service.accept(second.id, "d2").await.unwrap();
    assert_eq!(h.service.pending_timers(), 0);
}

/// Doctor records that disappear on demand.
struct VanishingDoctors {
    inner: InMemoryStore,
    gone: AtomicBool,
}

#[async_trait]
impl DoctorStore for VanishingDoctors {
    async fn get_doctor(&self, doctor_id: &str) -> Result<Option<Doctor>, StoreError> {
        if self.gone.load(Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner.get_doctor(doctor_id).await
    }

    async fn list_doctors(&self) -> Result<Vec<Doctor>, StoreError> {
        self.inner.list_doctors().await
    }

    async fn set_availability(&self, doctor_id: &str, availability: Availability) -> Result<Doctor, StoreError> {
        self.inner.set_availability(doctor_id, availability).await
    }
}

#[tokio::test]
async fn test_failed_accept_leaves_request_pending() {
    let config = TestConfig::default().to_app_config();
    let store = InMemoryStore::with_doctors(vec![TestDoctors::general("d1")]).await;
    let doctors = Arc::new(VanishingDoctors {
        inner: store.clone(),
        gone: AtomicBool::new(false),
    });
    let hub = RealtimeHub::new(Arc::new(config.clone()));
    let service = EscalationService::new(&config, Arc::new(store.clone()), doctors.clone(), hub);

    let dispatched = service.create("p1", None).await.unwrap();
    doctors.gone.store(true, Ordering::SeqCst);

    let result = service.accept(dispatched.request.id, "d1").await;
    assert_matches!(result, Err(EscalationError::DoctorNotFound(_)));

    let request = service.get_request(dispatched.request.id).await.unwrap();
    assert_eq!(request.status, EscalationStatus::Pending);
    let view = service.get_chain(dispatched.request.chain_id).await.unwrap();
    assert_eq!(view.chain.outcome, ChainOutcome::InProgress);
}

#[tokio::test]
async fn test_specialty_preference() {
    let h = harness(vec![
        TestDoctors::specialist("d1", "Cardiology"),
        TestDoctors::general("d2"),
    ])
    .await;

    let preferred = h.service.create("p1", None).await.unwrap();
    assert_eq!(preferred.doctor.id, "d2");

    let asked = h.service.create("p2", Some("cardiology".to_string())).await.unwrap();
    assert_eq!(asked.doctor.id, "d1");
}

#[tokio::test]
async fn test_availability_toggle_reaches_patients() {
    let h = harness(vec![TestDoctors::offline("d1")]).await;
    let (_p, mut patient_rx) = h.hub.connect_push(&patient()).await;
    let (_d, mut doctor_rx) = h.hub.connect_push(&doctor("d2")).await;

    let updated = h.service.set_availability("d1", true).await.unwrap();

    assert!(updated.is_online());
    assert_matches!(
        &drain(&mut patient_rx)[..],
        [RealtimeEvent::DoctorAvailability { online: true, online_count: 1, .. }]
    );
    assert!(drain(&mut doctor_rx).is_empty(), "Only patients are told");

    let missing = h.service.set_availability("nobody", true).await;
    assert_matches!(missing, Err(EscalationError::DoctorNotFound(_)));
}

#[tokio::test]
async fn test_ending_session_marks_room_ended() {
    let h = harness(vec![TestDoctors::general("d1")]).await;
    h.hub.set_session_observer(h.service.session_observer()).await;

    let dispatched = h.service.create("p1", None).await.unwrap();
    h.service.accept(dispatched.request.id, "d1").await.unwrap();
    let response = h.service.accept_connection(dispatched.request.id, "d1").await.unwrap();

    let (patient_handle, _p) = h.hub.connect_push(&patient()).await;
    let (doctor_handle, _d) = h.hub.connect_push(&doctor("d1")).await;
    h.hub.join_room(response.room_id, &patient_handle, &patient()).await.unwrap();
    h.hub.join_room(response.room_id, &doctor_handle, &doctor("d1")).await.unwrap();

    h.hub
        .relay_signal(response.room_id, &doctor_handle, &doctor("d1"), SignalKind::End, json!(null))
        .await
        .unwrap();

    let room = h.store.get_room(response.room_id).await.unwrap().unwrap();
    assert!(room.is_ended());
    assert_eq!(room.ended_by, Some(doctor("d1")));
}
