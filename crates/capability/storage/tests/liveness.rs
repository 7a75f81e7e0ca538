use domain::{HubRecord, HubState};
use fleet_storage::{InMemoryLivenessStore, LivenessStore};
use futures::StreamExt;

fn hub(hub_id: &str, partition_id: u32, state: HubState) -> HubRecord {
    HubRecord::new(hub_id, Some("place-1".to_string()), partition_id, state)
}

#[tokio::test]
async fn connect_transition_is_reported_once() {
    let store = InMemoryLivenessStore::with_hubs([hub("HUB-0001", 0, HubState::Offline)]);

    let first = store.mark_connected("HUB-0001").await.expect("connect");
    assert!(!first.is_empty());
    assert_eq!(first.get("hubconn:state"), Some("ONLINE"));

    let second = store.mark_connected("HUB-0001").await.expect("connect again");
    assert!(second.is_empty());
    assert_eq!(store.state_of("HUB-0001"), Some(HubState::Online));
}

#[tokio::test]
async fn disconnect_transition_is_reported_once() {
    let store = InMemoryLivenessStore::with_hubs([hub("HUB-0001", 0, HubState::Online)]);

    let first = store
        .mark_disconnected("HUB-0001")
        .await
        .expect("disconnect");
    assert_eq!(first.get("hubconn:state"), Some("OFFLINE"));

    let second = store
        .mark_disconnected("HUB-0001")
        .await
        .expect("disconnect again");
    assert!(second.is_empty());
}

#[tokio::test]
async fn down_is_terminal() {
    let store = InMemoryLivenessStore::with_hubs([hub("HUB-0001", 0, HubState::Down)]);

    assert!(store.mark_connected("HUB-0001").await.expect("connect").is_empty());
    assert!(
        store
            .mark_disconnected("HUB-0001")
            .await
            .expect("disconnect")
            .is_empty()
    );
    assert_eq!(store.state_of("HUB-0001"), Some(HubState::Down));
}

#[tokio::test]
async fn unknown_hub_is_not_found() {
    let store = InMemoryLivenessStore::new();

    let err = store.mark_connected("HUB-404").await.expect_err("not found");
    assert!(err.is_not_found());
    let found = store.find_by_id("HUB-404").await.expect("find");
    assert!(found.is_none());
}

#[tokio::test]
async fn stream_by_partition_filters_and_restarts() {
    let store = InMemoryLivenessStore::with_hubs([
        hub("HUB-0002", 5, HubState::Online),
        hub("HUB-0001", 5, HubState::Down),
        hub("HUB-0003", 6, HubState::Online),
    ]);

    let first: Vec<String> = store
        .stream_by_partition(5)
        .map(|item| item.expect("record").hub_id)
        .collect()
        .await;
    assert_eq!(first, vec!["HUB-0001".to_string(), "HUB-0002".to_string()]);

    let again = store.stream_by_partition(5).count().await;
    assert_eq!(again, 2);
    assert_eq!(store.stream_by_partition(7).count().await, 0);
}
