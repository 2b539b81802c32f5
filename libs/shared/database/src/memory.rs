use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shared_models::{
    Availability, ConsultationRoom, Doctor, EscalationChain, EscalationRequest,
};

use crate::store::{DoctorStore, EscalationStore, StoreError, StoreResult};

#[derive(Default)]
struct Tables {
    chains: HashMap<Uuid, EscalationChain>,
    requests: HashMap<Uuid, EscalationRequest>,
    rooms: HashMap<Uuid, ConsultationRoom>,
    doctors: BTreeMap<String, Doctor>,
}

/// Process-local store used by the api binary and by tests.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_doctors(doctors: Vec<Doctor>) -> Self {
        let store = Self::new();
        {
            let mut tables = store.tables.write().await;
            for doctor in doctors {
                tables.doctors.insert(doctor.id.clone(), doctor);
            }
        }
        store
    }

    pub async fn room_count(&self) -> usize {
        self.tables.read().await.rooms.len()
    }
}

#[async_trait]
impl EscalationStore for InMemoryStore {
    async fn insert_chain(&self, chain: EscalationChain) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.chains.contains_key(&chain.id) {
            return Err(StoreError::Duplicate(format!("chain {}", chain.id)));
        }
        debug!("Stored escalation chain {}", chain.id);
        tables.chains.insert(chain.id, chain);
        Ok(())
    }

    async fn get_chain(&self, chain_id: Uuid) -> StoreResult<Option<EscalationChain>> {
        Ok(self.tables.read().await.chains.get(&chain_id).cloned())
    }

    async fn update_chain(&self, chain: EscalationChain) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        match tables.chains.get_mut(&chain.id) {
            Some(existing) => {
                *existing = chain;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("chain {}", chain.id))),
        }
    }

    async fn insert_request(&self, request: EscalationRequest) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.requests.contains_key(&request.id) {
            return Err(StoreError::Duplicate(format!("request {}", request.id)));
        }
        debug!("Stored escalation request {}", request.id);
        tables.requests.insert(request.id, request);
        Ok(())
    }

    async fn get_request(&self, request_id: Uuid) -> StoreResult<Option<EscalationRequest>> {
        Ok(self.tables.read().await.requests.get(&request_id).cloned())
    }

    async fn update_request(&self, request: EscalationRequest) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        match tables.requests.get_mut(&request.id) {
            Some(existing) => {
                *existing = request;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("request {}", request.id))),
        }
    }

    async fn requests_for_chain(&self, chain_id: Uuid) -> StoreResult<Vec<EscalationRequest>> {
        let tables = self.tables.read().await;
        let mut requests: Vec<EscalationRequest> = tables
            .requests
            .values()
            .filter(|r| r.chain_id == chain_id)
            .cloned()
            .collect();
        requests.sort_by_key(|r| r.attempt_number);
        Ok(requests)
    }

    async fn insert_room(&self, room: ConsultationRoom) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.rooms.contains_key(&room.id) {
            return Err(StoreError::Duplicate(format!("room {}", room.id)));
        }
        tables.rooms.insert(room.id, room);
        Ok(())
    }

    async fn get_room(&self, room_id: Uuid) -> StoreResult<Option<ConsultationRoom>> {
        Ok(self.tables.read().await.rooms.get(&room_id).cloned())
    }

    async fn update_room(&self, room: ConsultationRoom) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        match tables.rooms.get_mut(&room.id) {
            Some(existing) => {
                *existing = room;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("room {}", room.id))),
        }
    }
}

#[async_trait]
impl DoctorStore for InMemoryStore {
    async fn get_doctor(&self, doctor_id: &str) -> StoreResult<Option<Doctor>> {
        Ok(self.tables.read().await.doctors.get(doctor_id).cloned())
    }

    async fn list_doctors(&self) -> StoreResult<Vec<Doctor>> {
        Ok(self.tables.read().await.doctors.values().cloned().collect())
    }

    async fn set_availability(&self, doctor_id: &str, availability: Availability) -> StoreResult<Doctor> {
        let mut tables = self.tables.write().await;
        let doctor = tables
            .doctors
            .get_mut(doctor_id)
            .ok_or_else(|| StoreError::NotFound(format!("doctor {}", doctor_id)))?;
        doctor.availability = availability;
        doctor.updated_at = Utc::now();
        Ok(doctor.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_doctors_listed_lowest_id_first() {
        let store = InMemoryStore::with_doctors(vec![
            Doctor::new("doc-b", "Bea", "Ray", None),
            Doctor::new("doc-a", "Ann", "Lee", None),
        ])
        .await;

        let ids: Vec<String> = store.list_doctors().await.unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["doc-a", "doc-b"]);
    }

    #[tokio::test]
    async fn test_set_availability_unknown_doctor() {
        let store = InMemoryStore::new();
        let result = store.set_availability("missing", Availability::Online).await;
        assert_matches!(result, Err(StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_missing_chain_fails() {
        let store = InMemoryStore::new();
        let chain = EscalationChain::new("p1", None);
        let result = store.update_chain(chain).await;
        assert_matches!(result, Err(StoreError::NotFound(_)));
    }
}
