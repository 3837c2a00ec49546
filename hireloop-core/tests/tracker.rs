mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{init_test_tracing, tracker_for, ScriptedSurface, SEARCH_URL};
use hireloop_core::{ManualClock, TabStatus};

#[tokio::test(start_paused = true)]
async fn acquire_reuses_the_same_tab() {
    init_test_tracing();
    let surface = Arc::new(ScriptedSurface::new());
    let tracker = tracker_for(surface.clone(), Arc::new(ManualClock::default()));

    let first = tracker.acquire().await.unwrap();
    let second = tracker.acquire().await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(first.status, TabStatus::Ready);
    assert_eq!(surface.opened(), 1);
}

#[tokio::test(start_paused = true)]
async fn acquire_prefers_the_most_recently_active_tab() {
    init_test_tracing();
    let surface = Arc::new(ScriptedSurface::new());
    let clock = Arc::new(ManualClock::default());
    let tracker = tracker_for(surface.clone(), clock.clone());

    let a = tracker.acquire().await.unwrap();
    clock.advance(chrono::Duration::seconds(5));
    let b = tracker.force_new().await.unwrap();
    assert_ne!(a.id, b.id);
    assert!(b.forced);
    assert_eq!(b.status, TabStatus::ForcedNew);

    assert_eq!(tracker.acquire().await.unwrap().id, b.id);
    clock.advance(chrono::Duration::seconds(5));
    tracker.touch(&a.id);
    assert_eq!(tracker.acquire().await.unwrap().id, a.id);
}

#[tokio::test(start_paused = true)]
async fn reclaim_stale_removes_exactly_the_idle_tabs() {
    init_test_tracing();
    let surface = Arc::new(ScriptedSurface::new());
    let clock = Arc::new(ManualClock::default());
    let tracker = tracker_for(surface.clone(), clock.clone());

    let old_a = tracker.force_new().await.unwrap();
    let old_b = tracker.force_new().await.unwrap();
    clock.advance(chrono::Duration::minutes(20));
    let fresh = tracker.force_new().await.unwrap();
    clock.advance(chrono::Duration::minutes(15));

    // old tabs idle 35 minutes, fresh one 15
    let reclaimed = tracker.reclaim_stale(Duration::from_secs(30 * 60)).await;
    assert_eq!(reclaimed, 2);

    let left: Vec<_> = tracker.list().into_iter().map(|t| t.id).collect();
    assert_eq!(left, vec![fresh.id.clone()]);
    let mut closed = surface.closed();
    closed.sort();
    let mut expected = vec![old_a.id, old_b.id];
    expected.sort();
    assert_eq!(closed, expected);

    assert_eq!(tracker.reclaim_stale(Duration::from_secs(30 * 60)).await, 0);
}

#[tokio::test(start_paused = true)]
async fn unready_surface_yields_a_partial_tab_after_bounded_polling() {
    init_test_tracing();
    let surface = Arc::new(ScriptedSurface::new().with_ping(false, SEARCH_URL, 0));
    let tracker = tracker_for(surface.clone(), Arc::new(ManualClock::default()));

    let tab = tracker.acquire().await.unwrap();
    assert_eq!(tab.status, TabStatus::Partial);
    assert_eq!(surface.count("ping"), 3);
}

#[tokio::test(start_paused = true)]
async fn reset_releases_everything() {
    init_test_tracing();
    let surface = Arc::new(ScriptedSurface::new());
    let tracker = tracker_for(surface.clone(), Arc::new(ManualClock::default()));

    tracker.acquire().await.unwrap();
    tracker.force_new().await.unwrap();
    assert_eq!(tracker.reset().await, 2);
    assert!(tracker.is_empty());
    assert_eq!(surface.closed().len(), 2);

    // a fresh acquire opens a new tab instead of resurrecting a closed one
    let tab = tracker.acquire().await.unwrap();
    assert_eq!(tab.id, "tab-2");
}
