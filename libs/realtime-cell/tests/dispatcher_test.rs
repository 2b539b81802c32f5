use tokio_test::{assert_err, assert_ok};

use realtime_cell::*;
use shared_models::Identity;
use uuid::Uuid;

fn availability_event(online_count: u32) -> RealtimeEvent {
    RealtimeEvent::DoctorAvailability {
        doctor_id: "d1".to_string(),
        online: true,
        online_count,
    }
}

#[tokio::test]
async fn test_publish_reaches_every_subscriber() {
    let dispatcher = NotificationDispatcher::new();
    let topic = Topic::room(Uuid::new_v4());
    let (a, mut rx_a) = TransportHandle::push(8);
    let (b, mut rx_b) = TransportHandle::push(8);

    dispatcher.subscribe(&a, topic.clone()).await;
    dispatcher.subscribe(&b, topic.clone()).await;

    let report = dispatcher.publish(&topic, &availability_event(1)).await;
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(rx_a.try_recv().unwrap(), availability_event(1));
    assert_eq!(rx_b.try_recv().unwrap(), availability_event(1));
}

#[tokio::test]
async fn test_publish_except_skips_sender() {
    let dispatcher = NotificationDispatcher::new();
    let topic = Topic::room(Uuid::new_v4());
    let (sender, mut rx_sender) = TransportHandle::push(8);
    let (peer, mut rx_peer) = TransportHandle::push(8);

    dispatcher.subscribe(&sender, topic.clone()).await;
    dispatcher.subscribe(&peer, topic.clone()).await;

    let report = dispatcher
        .publish_except(&topic, &availability_event(2), Some(sender.id()))
        .await;

    assert_eq!(report.delivered, 1);
    assert_ok!(rx_peer.try_recv());
    assert_err!(rx_sender.try_recv(), "Sender must not receive its own event");
}

#[tokio::test]
async fn test_failed_handle_does_not_block_others() {
    let dispatcher = NotificationDispatcher::new();
    let topic = Topic::identity(&Identity::Doctor("d1".into()));
    let (dead, rx_dead) = TransportHandle::push(8);
    let (full, _rx_full) = TransportHandle::push(1);
    let (live, mut rx_live) = TransportHandle::push(8);
    drop(rx_dead);

    full.deliver(&availability_event(0)).await.unwrap();

    for handle in [&dead, &full, &live] {
        dispatcher.subscribe(handle, topic.clone()).await;
    }

    let report = dispatcher.publish(&topic, &availability_event(3)).await;
    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, 2);
    assert_eq!(rx_live.try_recv().unwrap(), availability_event(3));
}

#[tokio::test]
async fn test_publish_to_empty_topic_is_noop() {
    let dispatcher = NotificationDispatcher::new();
    let report = dispatcher
        .publish(&Topic::room(Uuid::new_v4()), &availability_event(0))
        .await;
    assert_eq!(report, DeliveryReport::default());
}

#[tokio::test]
async fn test_unsubscribe_all_removes_handle_everywhere() {
    let dispatcher = NotificationDispatcher::new();
    let (handle, _rx) = TransportHandle::push(8);
    let room = Topic::room(Uuid::new_v4());
    let personal = Topic::identity(&Identity::User("p1".into()));

    dispatcher.subscribe(&handle, room.clone()).await;
    dispatcher.subscribe(&handle, personal.clone()).await;
    assert_eq!(dispatcher.topic_count().await, 2);

    let removed = dispatcher.unsubscribe_all(handle.id()).await;
    assert_eq!(removed.len(), 2);
    assert!(!dispatcher.is_subscribed(handle.id(), &room).await);
    assert!(dispatcher.members(&personal).await.is_empty());
    assert_eq!(dispatcher.topic_count().await, 0);
}
