
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Barrier;

use argus_store::Error;
use argus_store::EventKind;
use argus_store::ListScope;
use argus_store::PageRequest;
use argus_store::StorageError;
use argus_store::WatchFilter;
use commons::{counter_payload, increment, memory_store, read_counter, widget};
use tokio_util::sync::CancellationToken;

/// # Case 1: two writers racing on the same counter
///
/// ## Setup:
/// 1. "widget/a" under account t1 starts at counter 0
/// 2. two tasks increment concurrently; a barrier inside the first transform
///    attempt forces both to read the same stale state
///
/// ## Criterias:
/// 1. the loser observes the conflict internally, re-reads and re-applies
///    its transform against the winner's state
/// 2. the final counter is 2, never 1
/// 3. the losing transform ran at least twice
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_increment_case1() {
    let store = memory_store("/registry/widgets");
    let identity = widget("t1", "default", "a");

    store
        .simple_update(&identity, |_| Ok((counter_payload(0), None)))
        .await
        .expect("should succeed");

    let barrier = Arc::new(Barrier::new(2));
    let invocations = Arc::new(AtomicU32::new(0));
    let mut handles = Vec::new();
    for _ in 0..2 {
        let store = Arc::clone(&store);
        let identity = identity.clone();
        let barrier = Arc::clone(&barrier);
        let invocations = Arc::clone(&invocations);
        handles.push(tokio::spawn(async move {
            let cancel = CancellationToken::new();
            let mut first_attempt = true;
            store
                .guarded_update(&identity, &cancel, false, move |current, _| {
                    invocations.fetch_add(1, Ordering::SeqCst);
                    if first_attempt {
                        first_attempt = false;
                        // Hold both writers at the same observed state.
                        barrier.wait();
                    }
                    let counter = read_counter(&current.expect("should exist").payload);
                    Ok((counter_payload(counter + 1), None))
                })
                .await
                .expect("should succeed");
        }));
    }
    for handle in handles {
        handle.await.expect("should succeed");
    }

    let read = store.get(&identity).await.expect("should succeed");
    assert_eq!(2, read_counter(&read.payload));
    assert!(
        invocations.load(Ordering::SeqCst) >= 3,
        "the losing writer should have re-applied its transform"
    );
}

/// # Case 2: version-conditioned delete end to end
///
/// ## Criterias:
/// 1. a stale precondition fails with Conflict
/// 2. the live version succeeds and the follow-up Get is NotFound
#[tokio::test]
async fn test_delete_precondition_case2() {
    let store = memory_store("/registry/widgets");
    let identity = widget("t1", "default", "a");

    let cancel = CancellationToken::new();
    let created = store
        .guarded_update(&identity, &cancel, true, |current, _| increment(current))
        .await
        .expect("should succeed");
    let updated = store
        .guarded_update(&identity, &cancel, false, |current, _| increment(current))
        .await
        .expect("should succeed");
    assert!(updated.version > created.version);

    assert!(matches!(
        store.delete(&identity, Some(created.version)).await,
        Err(Error::Storage(StorageError::Conflict { .. }))
    ));

    store
        .delete(&identity, Some(updated.version))
        .await
        .expect("should succeed");
    assert!(matches!(
        store.get(&identity).await,
        Err(Error::Storage(StorageError::NotFound { .. }))
    ));
}

/// # Case 3: watch across a full lifecycle, then cancellation
#[tokio::test]
async fn test_watch_lifecycle_case3() {
    let store = memory_store("/registry/widgets");
    let identity = widget("t1", "default", "a");
    let cancel = CancellationToken::new();

    let mut stream = store
        .watch(&ListScope::Account("t1".to_string()), WatchFilter::everything(), cancel.clone())
        .await
        .expect("should succeed");

    let update_cancel = CancellationToken::new();
    store
        .guarded_update(&identity, &update_cancel, true, |current, _| increment(current))
        .await
        .expect("should succeed");
    store
        .guarded_update(&identity, &update_cancel, false, |current, _| increment(current))
        .await
        .expect("should succeed");
    store.delete(&identity, None).await.expect("should succeed");

    let kinds: Vec<EventKind> = vec![
        stream.next_event().await.expect("should receive").kind,
        stream.next_event().await.expect("should receive").kind,
        stream.next_event().await.expect("should receive").kind,
    ];
    assert_eq!(
        vec![EventKind::Created, EventKind::Updated, EventKind::Deleted],
        kinds
    );

    cancel.cancel();
    while stream.next_event().await.is_some() {}
}

/// # Case 4: paged listing through the facade
#[tokio::test]
async fn test_paged_list_case4() {
    let backend = Arc::new(argus_store::MemoryBackend::new());
    let store = argus_store::ObjectStore::new(backend, "/registry/widgets", argus_store::Scope::Namespaced)
        .with_paging(true);

    for name in ["a", "b", "c", "d", "e"] {
        store
            .simple_update(&widget("t1", "default", name), |_| {
                Ok((b"payload".to_vec(), None))
            })
            .await
            .expect("should succeed");
    }

    let mut names = Vec::new();
    let mut token = None;
    loop {
        let page = store
            .list(
                &ListScope::All,
                Some(PageRequest {
                    limit: 2,
                    continue_after: token.clone(),
                }),
            )
            .await
            .expect("should succeed");
        names.extend(page.items.iter().map(|item| item.0.name.clone()));
        match page.continue_after {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    assert_eq!(vec!["a", "b", "c", "d", "e"], names);
}

/// # Case 5: the count watermark follows successful updates
#[tokio::test]
async fn test_count_watermark_case5() {
    let store = memory_store("/registry/widgets");
    let cancel = CancellationToken::new();

    for name in ["a", "b", "c"] {
        store
            .guarded_update(&widget("t1", "default", name), &cancel, true, |current, _| {
                increment(current)
            })
            .await
            .expect("should succeed");
    }
    assert_eq!(3, store.count_watermark().current());

    store
        .delete(&widget("t1", "default", "c"), None)
        .await
        .expect("should succeed");
    // Running maximum: deletes never lower it.
    assert_eq!(3, store.count_watermark().current());
}
