//! # Caching Creator Behaviour
//!
//! Exercises [`CachingCreator`] against counting fakes: deduplication,
//! failure handling on either side of the remote call, in-process
//! concurrency, lost races and timeouts.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{info, FakeCreator, FlakyIndex, RacingIndex};
use doarama_cache::{
    ActivityIndex, CachingCreator, CreateError, CreationOutcome, ForgetError, MemoryIndex,
    RemoteError,
};
use doarama_core::{ActivityId, ActivityInfo, Fingerprint};

#[tokio::test]
async fn example_scenario_creates_once_then_hits() {
    let remote = Arc::new(FakeCreator::new());
    let cache = CachingCreator::new(Arc::clone(&remote), MemoryIndex::new());

    let first = cache.create("trackA.igc", &b"trackA"[..], &info(23)).await.unwrap();
    assert_eq!(first.activity_id, ActivityId::new(101));
    assert_eq!(first.outcome, CreationOutcome::Created);
    assert_eq!(remote.calls(), 1);

    let expected = Fingerprint::compute(b"trackA", &info(23)).unwrap();
    assert_eq!(first.fingerprint, expected);
    assert_eq!(
        cache.index().lookup(&expected).await.unwrap(),
        Some(ActivityId::new(101))
    );

    let second = cache.create("trackA.igc", &b"trackA"[..], &info(23)).await.unwrap();
    assert_eq!(second.activity_id, ActivityId::new(101));
    assert_eq!(second.outcome, CreationOutcome::Cached);
    assert_eq!(remote.calls(), 1, "cache hit must not call the remote service");
    assert_eq!(cache.index().count().await.unwrap(), 1);
}

#[tokio::test]
async fn different_content_with_same_info_creates_two_entries() {
    let remote = Arc::new(FakeCreator::new());
    let cache = CachingCreator::new(Arc::clone(&remote), MemoryIndex::new());

    let a = cache.create_from_bytes("a", b"trackA", &info(23)).await.unwrap();
    let b = cache.create_from_bytes("b", b"trackB", &info(23)).await.unwrap();

    assert_ne!(a.activity_id, b.activity_id);
    assert_eq!(a.fingerprint.info, b.fingerprint.info);
    assert_ne!(a.fingerprint.track, b.fingerprint.track);
    assert_eq!(remote.calls(), 2);
    assert_eq!(cache.index().count().await.unwrap(), 2);
}

#[tokio::test]
async fn different_info_with_same_content_creates_two_entries() {
    let remote = Arc::new(FakeCreator::new());
    let cache = CachingCreator::new(Arc::clone(&remote), MemoryIndex::new());

    let plain = ActivityInfo::with_type(23u32);
    let named = ActivityInfo::with_type(23u32).user_name("Ada");

    let a = cache.create_from_bytes("a", b"trackA", &plain).await.unwrap();
    let b = cache.create_from_bytes("a", b"trackA", &named).await.unwrap();
    assert_ne!(a.activity_id, b.activity_id);
    assert_eq!(remote.calls(), 2);
}

#[tokio::test]
async fn remote_failure_leaves_no_entry_and_retry_calls_again() {
    let remote = Arc::new(FakeCreator::new());
    let cache = CachingCreator::new(Arc::clone(&remote), MemoryIndex::new());

    remote.fail_creates(true);
    let err = cache
        .create_from_bytes("a", b"trackA", &info(23))
        .await
        .unwrap_err();
    assert!(matches!(err, CreateError::Remote(RemoteError::Rejected { status: 500, .. })));
    assert!(err.is_side_effect_free());
    assert_eq!(cache.index().count().await.unwrap(), 0);

    remote.fail_creates(false);
    let retried = cache.create_from_bytes("a", b"trackA", &info(23)).await.unwrap();
    assert_eq!(retried.outcome, CreationOutcome::Created);
    assert_eq!(remote.calls(), 2, "retry must reach the remote service");
}

#[tokio::test]
async fn read_failure_is_reported_before_any_remote_call() {
    struct BrokenReader;

    impl tokio::io::AsyncRead for BrokenReader {
        fn poll_read(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Err(std::io::Error::other("unplugged")))
        }
    }

    let remote = Arc::new(FakeCreator::new());
    let cache = CachingCreator::new(Arc::clone(&remote), MemoryIndex::new());

    let err = cache.create("a", BrokenReader, &info(23)).await.unwrap_err();
    assert!(matches!(err, CreateError::Read(_)));
    assert_eq!(remote.calls(), 0);
}

#[tokio::test]
async fn lookup_failure_aborts_before_remote_call() {
    let remote = Arc::new(FakeCreator::new());
    let index = FlakyIndex::default();
    index.fail_lookup.store(true, Ordering::SeqCst);
    let cache = CachingCreator::new(Arc::clone(&remote), index);

    let err = cache
        .create_from_bytes("a", b"trackA", &info(23))
        .await
        .unwrap_err();
    assert!(matches!(err, CreateError::Lookup(_)));
    assert_eq!(remote.calls(), 0);
}

#[tokio::test]
async fn persistence_failure_still_reports_the_new_activity() {
    let remote = Arc::new(FakeCreator::new());
    let index = FlakyIndex::default();
    index.fail_insert.store(true, Ordering::SeqCst);
    let cache = CachingCreator::new(Arc::clone(&remote), index);

    let err = cache
        .create_from_bytes("a", b"trackA", &info(23))
        .await
        .unwrap_err();
    match &err {
        CreateError::Persistence {
            activity_id,
            fingerprint,
            ..
        } => {
            assert_eq!(*activity_id, ActivityId::new(101));
            assert_eq!(*fingerprint, Fingerprint::compute(b"trackA", &info(23)).unwrap());
        }
        other => panic!("expected Persistence, got {other:?}"),
    }
    assert_eq!(err.activity_id(), Some(ActivityId::new(101)));
    assert!(!err.is_side_effect_free());

    // The orphan was not recorded, so the next call creates again.
    cache.index().fail_insert.store(false, Ordering::SeqCst);
    let next = cache.create_from_bytes("a", b"trackA", &info(23)).await.unwrap();
    assert_eq!(next.activity_id, ActivityId::new(102));
    assert_eq!(remote.calls(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_identical_calls_create_exactly_once() {
    let remote = Arc::new(FakeCreator::new());
    remote.set_delay(Duration::from_millis(25));
    let cache = Arc::new(CachingCreator::new(Arc::clone(&remote), MemoryIndex::new()));

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let cache = Arc::clone(&cache);
        tasks.push(tokio::spawn(async move {
            cache.create_from_bytes("a", b"trackA", &info(23)).await
        }));
    }

    let mut ids = Vec::new();
    let mut created = 0;
    for task in tasks {
        let creation = task.await.unwrap().unwrap();
        if creation.outcome == CreationOutcome::Created {
            created += 1;
        }
        ids.push(creation.activity_id);
    }

    assert_eq!(remote.calls(), 1);
    assert_eq!(created, 1);
    assert!(ids.iter().all(|id| *id == ActivityId::new(101)));
    assert_eq!(cache.index().count().await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_distinct_calls_proceed_in_parallel() {
    let remote = Arc::new(FakeCreator::new());
    remote.set_delay(Duration::from_millis(200));
    let cache = Arc::new(CachingCreator::new(Arc::clone(&remote), MemoryIndex::new()));

    let started = std::time::Instant::now();
    let mut tasks = Vec::new();
    for i in 0..8u8 {
        let cache = Arc::clone(&cache);
        tasks.push(tokio::spawn(async move {
            cache.create_from_bytes("t", &[i], &info(23)).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(remote.calls(), 8);
    assert!(
        started.elapsed() < Duration::from_millis(1_200),
        "distinct fingerprints must not serialize behind one lock"
    );
}

#[tokio::test]
async fn lost_race_deletes_own_duplicate_and_adopts_winner() {
    let remote = Arc::new(FakeCreator::new());
    let cache = CachingCreator::new(
        Arc::clone(&remote),
        RacingIndex::with_winner(ActivityId::new(7)),
    );

    let creation = cache.create_from_bytes("a", b"trackA", &info(23)).await.unwrap();
    assert_eq!(creation.activity_id, ActivityId::new(7));
    assert_eq!(creation.outcome, CreationOutcome::Adopted);
    assert_eq!(remote.deleted(), vec![ActivityId::new(101)]);

    let entries = cache.index().entries().await.unwrap();
    assert_eq!(entries.len(), 1, "the loser must not add a second entry");
    assert_eq!(entries[0].activity_id, ActivityId::new(7));
}

#[tokio::test]
async fn lost_race_to_the_same_id_deletes_nothing() {
    let remote = Arc::new(FakeCreator::new());
    let cache = CachingCreator::new(
        Arc::clone(&remote),
        RacingIndex::with_winner(ActivityId::new(101)),
    );

    let creation = cache.create_from_bytes("a", b"trackA", &info(23)).await.unwrap();
    assert_eq!(creation.activity_id, ActivityId::new(101));
    assert_eq!(creation.outcome, CreationOutcome::Adopted);
    assert!(!creation.is_new());
    assert!(remote.deleted().is_empty(), "the recorded activity must survive");
    assert_eq!(cache.index().count().await.unwrap(), 1);
}

#[tokio::test]
async fn lost_race_with_failed_cleanup_reports_both_ids() {
    let remote = Arc::new(FakeCreator::new());
    remote.fail_deletes(true);
    let cache = CachingCreator::new(
        Arc::clone(&remote),
        RacingIndex::with_winner(ActivityId::new(7)),
    );

    let err = cache
        .create_from_bytes("a", b"trackA", &info(23))
        .await
        .unwrap_err();
    match err {
        CreateError::Duplicate {
            activity_id,
            winner,
            cleanup,
            ..
        } => {
            assert_eq!(activity_id, ActivityId::new(101));
            assert_eq!(winner, ActivityId::new(7));
            assert!(matches!(cleanup, RemoteError::Transport(_)));
        }
        other => panic!("expected Duplicate, got {other:?}"),
    }
    assert_eq!(cache.index().count().await.unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn hung_remote_call_times_out_and_releases_lock() {
    let remote = Arc::new(FakeCreator::new());
    remote.set_delay(Duration::from_secs(600));
    let cache = CachingCreator::new(Arc::clone(&remote), MemoryIndex::new())
        .with_remote_timeout(Some(Duration::from_millis(50)));

    let err = cache
        .create_from_bytes("a", b"trackA", &info(23))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CreateError::Remote(RemoteError::Timeout { elapsed_ms: 50 })
    ));
    assert_eq!(cache.index().count().await.unwrap(), 0);

    remote.set_delay(Duration::ZERO);
    let retried = cache.create_from_bytes("a", b"trackA", &info(23)).await.unwrap();
    assert_eq!(retried.outcome, CreationOutcome::Created);
    assert_eq!(remote.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn cancelled_call_releases_lock() {
    let remote = Arc::new(FakeCreator::new());
    remote.set_delay(Duration::from_secs(600));
    let cache = CachingCreator::new(Arc::clone(&remote), MemoryIndex::new())
        .with_remote_timeout(None);

    let abandoned = tokio::time::timeout(
        Duration::from_millis(10),
        cache.create_from_bytes("a", b"trackA", &info(23)),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(cache.index().count().await.unwrap(), 0);

    remote.set_delay(Duration::ZERO);
    let creation = cache.create_from_bytes("a", b"trackA", &info(23)).await.unwrap();
    assert_eq!(creation.outcome, CreationOutcome::Created);
}

#[tokio::test]
async fn forget_activity_deletes_remotely_and_unindexes() {
    let remote = Arc::new(FakeCreator::new());
    let cache = CachingCreator::new(Arc::clone(&remote), MemoryIndex::new());

    let first = cache.create_from_bytes("a", b"trackA", &info(23)).await.unwrap();
    assert_eq!(cache.forget_activity(first.activity_id).await.unwrap(), 1);
    assert_eq!(remote.deleted(), vec![first.activity_id]);

    let again = cache.create_from_bytes("a", b"trackA", &info(23)).await.unwrap();
    assert_eq!(again.outcome, CreationOutcome::Created);
    assert_ne!(again.activity_id, first.activity_id);
}

#[tokio::test]
async fn forget_activity_keeps_entry_when_remote_delete_fails() {
    let remote = Arc::new(FakeCreator::new());
    let cache = CachingCreator::new(Arc::clone(&remote), MemoryIndex::new());
    let first = cache.create_from_bytes("a", b"trackA", &info(23)).await.unwrap();

    remote.fail_deletes(true);
    let err = cache.forget_activity(first.activity_id).await.unwrap_err();
    assert!(matches!(err, ForgetError::Remote { .. }));
    assert_eq!(cache.index().count().await.unwrap(), 1);
}
