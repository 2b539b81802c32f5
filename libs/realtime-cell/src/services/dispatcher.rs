use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::models::{DeliveryReport, HandleId, RealtimeEvent, Topic};
use crate::services::transport::TransportHandle;

/// Best-effort publish/subscribe over transport handles.
///
/// Delivery is at-most-once per handle with no acknowledgement or replay.
#[derive(Clone, Default)]
pub struct NotificationDispatcher {
    topics: Arc<RwLock<HashMap<Topic, HashMap<HandleId, TransportHandle>>>>,
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, handle: &TransportHandle, topic: Topic) {
        let mut topics = self.topics.write().await;
        debug!("Handle {} subscribed to {}", handle.id(), topic);
        topics.entry(topic).or_default().insert(handle.id(), handle.clone());
    }

    pub async fn unsubscribe(&self, handle_id: HandleId, topic: &Topic) {
        let mut topics = self.topics.write().await;
        if let Some(members) = topics.get_mut(topic) {
            members.remove(&handle_id);
            if members.is_empty() {
                topics.remove(topic);
            }
        }
    }

    /// Drops the handle from every topic and returns the topics it was in.
    pub async fn unsubscribe_all(&self, handle_id: HandleId) -> Vec<Topic> {
        let mut topics = self.topics.write().await;
        let mut removed = Vec::new();

        topics.retain(|topic, members| {
            if members.remove(&handle_id).is_some() {
                removed.push(topic.clone());
            }
            !members.is_empty()
        });

        removed
    }

    pub async fn members(&self, topic: &Topic) -> Vec<HandleId> {
        self.topics
            .read()
            .await
            .get(topic)
            .map(|members| members.keys().copied().collect())
            .unwrap_or_default()
    }

    pub async fn is_subscribed(&self, handle_id: HandleId, topic: &Topic) -> bool {
        self.topics
            .read()
            .await
            .get(topic)
            .map(|members| members.contains_key(&handle_id))
            .unwrap_or(false)
    }

    pub async fn publish(&self, topic: &Topic, event: &RealtimeEvent) -> DeliveryReport {
        self.publish_except(topic, event, None).await
    }

    /// Delivers to every member of `topic` except `excluded`.
    pub async fn publish_except(
        &self,
        topic: &Topic,
        event: &RealtimeEvent,
        excluded: Option<HandleId>,
    ) -> DeliveryReport {
        // Snapshot members so delivery never runs under the topic lock.
        let recipients: Vec<TransportHandle> = {
            let topics = self.topics.read().await;
            match topics.get(topic) {
                Some(members) => members
                    .values()
                    .filter(|h| Some(h.id()) != excluded)
                    .cloned()
                    .collect(),
                None => Vec::new(),
            }
        };

        let mut report = DeliveryReport::default();
        for handle in &recipients {
            report.merge(Self::deliver_to(handle, event).await);
        }

        debug!(
            "Published {} to {} ({} delivered, {} failed)",
            event.name(),
            topic,
            report.delivered,
            report.failed
        );
        report
    }

    /// Single-handle delivery. A failure is logged and counted, never raised.
    pub async fn deliver_to(handle: &TransportHandle, event: &RealtimeEvent) -> DeliveryReport {
        match handle.deliver(event).await {
            Ok(()) => DeliveryReport { delivered: 1, failed: 0 },
            Err(e) => {
                warn!("Failed to deliver {} to handle {}: {}", event.name(), handle.id(), e);
                DeliveryReport { delivered: 0, failed: 1 }
            }
        }
    }

    pub async fn topic_count(&self) -> usize {
        self.topics.read().await.len()
    }
}
