use std::sync::Arc;
use std::time::Duration;

use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::backend::EventSubscription;
use crate::backend::MemoryBackend;
use crate::backend::MockKvBackend;
use crate::index::MatchValue;
use crate::index::TriggerExtractor;
use crate::test_utils;
use crate::types::BackendEvent;
use crate::types::EventKind;
use crate::types::StoredObject;

/// Indexes payloads of the form `<zone>:<rest>` on their zone field.
struct ZoneExtractor;

impl TriggerExtractor for ZoneExtractor {
    fn extract_triggers(
        &self,
        payload: &[u8],
    ) -> Vec<MatchValue> {
        let text = String::from_utf8_lossy(payload);
        match text.split_once(':') {
            Some((zone, _)) => vec![MatchValue::new("zone", zone)],
            None => Vec::new(),
        }
    }

    fn matches(
        &self,
        payload: &[u8],
    ) -> bool {
        payload.starts_with(b"keep")
    }
}

fn namespaced_store(backend: Arc<MemoryBackend>) -> ObjectStore {
    ObjectStore::new(backend, "/registry/widgets", Scope::Namespaced)
}

async fn create(
    store: &ObjectStore,
    identity: &crate::ResourceIdentity,
    payload: &[u8],
) -> StoredObject {
    let payload = payload.to_vec();
    store
        .simple_update(identity, move |_| Ok((payload.clone(), None)))
        .await
        .expect("should succeed")
}

/// # Case 1: the full event lifecycle arrives in commit order
///
/// ## Criterias:
/// 1. create, update and delete arrive as distinct kinds with parsed identities
/// 2. revisions increase monotonically for the watched key
#[tokio::test]
async fn test_watch_lifecycle_case1() {
    test_utils::enable_logger();
    let store = namespaced_store(Arc::new(MemoryBackend::new()));
    let identity = test_utils::widget("t1", "default", "widget-a");

    let mut stream = store
        .watch(&ListScope::All, WatchFilter::everything(), CancellationToken::new())
        .await
        .expect("should succeed");

    create(&store, &identity, b"one").await;
    create(&store, &identity, b"two").await;
    store.delete(&identity, None).await.expect("should succeed");

    let first = stream.next_event().await.expect("should receive");
    assert_eq!(EventKind::Created, first.kind);
    assert_eq!(identity, first.identity);

    let second = stream.next_event().await.expect("should receive");
    assert_eq!(EventKind::Updated, second.kind);
    assert!(second.revision > first.revision);
    assert_eq!(
        b"two".to_vec(),
        second.object.as_ref().expect("should carry state").payload
    );

    let third = stream.next_event().await.expect("should receive");
    assert_eq!(EventKind::Deleted, third.kind);
    assert!(third.revision > second.revision);
}

/// # Case 2: scope bounds the watched key range
#[tokio::test]
async fn test_watch_scope_case2() {
    let store = namespaced_store(Arc::new(MemoryBackend::new()));

    let mut stream = store
        .watch(
            &ListScope::Namespace {
                account_id: "t1".to_string(),
                namespace: "default".to_string(),
            },
            WatchFilter::everything(),
            CancellationToken::new(),
        )
        .await
        .expect("should succeed");

    create(&store, &test_utils::widget("t1", "other", "noise"), b"x").await;
    create(&store, &test_utils::widget("t2", "default", "noise"), b"y").await;
    create(&store, &test_utils::widget("t1", "default", "signal"), b"z").await;

    let event = stream.next_event().await.expect("should receive");
    assert_eq!(test_utils::widget("t1", "default", "signal"), event.identity);
}

/// # Case 3: trigger pre-filtering with linear fallback
///
/// ## Setup:
/// 1. the kind indexes payloads on their zone field
/// 2. the subscription selects zone=us-east
///
/// ## Criterias:
/// 1. indexed objects are matched by trigger value comparison
/// 2. objects yielding no trigger values fall back to the linear predicate
#[tokio::test]
async fn test_watch_trigger_filter_case3() {
    let store = namespaced_store(Arc::new(MemoryBackend::new()))
        .with_extractor(Arc::new(ZoneExtractor));

    let mut stream = store
        .watch(
            &ListScope::All,
            WatchFilter::with_trigger(MatchValue::new("zone", "us-east")),
            CancellationToken::new(),
        )
        .await
        .expect("should succeed");

    create(&store, &test_utils::widget("t1", "default", "a"), b"eu-west:a").await;
    create(&store, &test_utils::widget("t1", "default", "b"), b"us-east:b").await;
    // No zone field: the linear predicate decides.
    create(&store, &test_utils::widget("t1", "default", "c"), b"drop-me").await;
    create(&store, &test_utils::widget("t1", "default", "d"), b"keep-me").await;

    let matched = stream.next_event().await.expect("should receive");
    assert_eq!(test_utils::widget("t1", "default", "b"), matched.identity);
    assert_eq!(vec![MatchValue::new("zone", "us-east")], matched.triggers);

    let fallback = stream.next_event().await.expect("should receive");
    assert_eq!(test_utils::widget("t1", "default", "d"), fallback.identity);
    assert!(fallback.triggers.is_empty());
}

/// # Case 4: cancellation stops delivery and ends the stream
#[tokio::test]
async fn test_watch_cancellation_case4() {
    let store = namespaced_store(Arc::new(MemoryBackend::new()));
    let cancel = CancellationToken::new();

    let mut stream = store
        .watch(&ListScope::All, WatchFilter::everything(), cancel.clone())
        .await
        .expect("should succeed");

    create(&store, &test_utils::widget("t1", "default", "a"), b"one").await;
    let event = stream.next_event().await.expect("should receive");
    assert_eq!(EventKind::Created, event.kind);

    stream.cancel();
    // Drain until the forwarder acknowledges the cancellation.
    while stream.next_event().await.is_some() {}

    // Writes after the acknowledged cancellation are never observed.
    create(&store, &test_utils::widget("t1", "default", "b"), b"two").await;
    assert!(stream.next_event().await.is_none());
}

/// # Case 5: per-key ordering survives a reordering transport
///
/// ## Setup:
/// 1. a scripted subscription delivers revisions out of order across keys
///    and a stale revision within one key
///
/// ## Criterias:
/// 1. stale per-key revisions are dropped
/// 2. unrelated keys pass through regardless of their relative order
#[tokio::test]
async fn test_watch_reordered_transport_case5() {
    let (tx, subscription) = EventSubscription::detached();

    let mut mock = MockKvBackend::new();
    let mut slot = Some(subscription);
    mock.expect_subscribe()
        .times(1)
        .returning(move |_| Ok(slot.take().expect("single subscription")));

    let store = ObjectStore::new(Arc::new(mock), "/registry/widgets", Scope::Namespaced);
    let mut stream = store
        .watch(&ListScope::All, WatchFilter::everything(), CancellationToken::new())
        .await
        .expect("should succeed");

    let event = |name: &str, revision: u64| BackendEvent {
        kind: EventKind::Updated,
        key: format!("/registry/widgets/t1/default/{}", name),
        object: Some(StoredObject {
            payload: b"state".to_vec(),
            version: revision,
            ttl: None,
        }),
        revision,
    };

    tx.send(event("a", 5)).expect("should send");
    // Cross-key: lower revision on an unrelated key is fine.
    tx.send(event("b", 3)).expect("should send");
    // Same key: stale revision must be dropped.
    tx.send(event("a", 4)).expect("should send");
    tx.send(event("a", 6)).expect("should send");
    drop(tx);

    // Consumed through the Stream impl rather than next_event.
    let mut delivered = Vec::new();
    while let Some(event) = stream.next().await {
        delivered.push((event.identity.name.clone(), event.revision));
    }
    assert_eq!(
        vec![
            ("a".to_string(), 5),
            ("b".to_string(), 3),
            ("a".to_string(), 6)
        ],
        delivered
    );
}

/// # Case 6: dropping the stream releases the backend subscription
#[tokio::test]
async fn test_watch_drop_releases_case6() {
    let store = namespaced_store(Arc::new(MemoryBackend::new()));

    let stream = store
        .watch(&ListScope::All, WatchFilter::everything(), CancellationToken::new())
        .await
        .expect("should succeed");
    drop(stream);

    // Give the forwarder a moment to observe the cancellation; writes after
    // that must not pile up anywhere.
    tokio::time::sleep(Duration::from_millis(20)).await;
    create(&store, &test_utils::widget("t1", "default", "a"), b"one").await;
}
