mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{init_test_tracing, ScriptedSurface, SEARCH_URL};
use hireloop_core::model::PageType;
use hireloop_core::{
    ActionExecutor, ActionKind, ActionOutput, ExecutorState, PlannedAction, RunContext,
    SettleDelays, UserPreferences, UserProfile,
};
use hireloop_drivers::{SurfaceError, SurfaceRequest};
use serde_json::{json, Map};

fn ctx() -> RunContext {
    RunContext {
        page_type: PageType::SearchResults,
        jobs_found_count: 0,
        search_query: "rust engineer".into(),
        location: "Berlin".into(),
        user_preferences: UserPreferences::default(),
        user_profile: UserProfile {
            full_name: "Ada Lovelace".into(),
            email: "ada@example.com".into(),
            ..UserProfile::default()
        },
        current_url: SEARCH_URL.into(),
        target_url: "https://www.linkedin.com/jobs/".into(),
    }
}

fn executor(surface: Arc<ScriptedSurface>) -> ActionExecutor {
    ActionExecutor::new(surface, SettleDelays::default())
}

#[tokio::test(start_paused = true)]
async fn navigate_defaults_to_the_target_url() {
    init_test_tracing();
    let surface = Arc::new(ScriptedSurface::new());
    let mut ex = executor(surface.clone());
    assert_eq!(ex.state(), ExecutorState::Idle);

    let r = ex
        .execute(&"tab-0".into(), &PlannedAction::new(ActionKind::Navigate, "on site"), &ctx())
        .await;
    assert!(r.success, "{r:?}");
    assert_eq!(ex.state(), ExecutorState::Idle);
    assert!(ex.current_action().is_none());
    assert_eq!(
        surface.requests(),
        vec![SurfaceRequest::Navigate {
            url: "https://www.linkedin.com/jobs/".into()
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn search_uses_context_and_rejects_blank_keywords() {
    init_test_tracing();
    let surface = Arc::new(ScriptedSurface::new());
    let mut ex = executor(surface.clone());

    let r = ex
        .execute(&"tab-0".into(), &PlannedAction::new(ActionKind::Search, "results"), &ctx())
        .await;
    assert!(r.success);
    assert_eq!(
        surface.requests(),
        vec![SurfaceRequest::PerformSearch {
            keywords: "rust engineer".into(),
            location: "Berlin".into(),
        }]
    );

    let mut blank = ctx();
    blank.search_query = "   ".into();
    let r = ex
        .execute(&"tab-0".into(), &PlannedAction::new(ActionKind::Search, "results"), &blank)
        .await;
    assert!(!r.success);
    assert!(!r.retryable);
    assert_eq!(ex.state(), ExecutorState::Failed);
    assert_eq!(surface.count("performSearch"), 1);
}

#[tokio::test(start_paused = true)]
async fn unknown_action_names_fail_without_retry() {
    init_test_tracing();
    let surface = Arc::new(ScriptedSurface::new());
    let mut ex = executor(surface.clone());

    let r = ex
        .execute_named(&"tab-0".into(), "DANCE", Map::new(), &ctx())
        .await;
    assert!(!r.success);
    assert!(!r.retryable);
    assert_eq!(r.message, "unknown action");
    assert_eq!(ex.state(), ExecutorState::Failed);
    assert!(surface.requests().is_empty());

    let r = ex
        .execute_named(&"tab-0".into(), "next-page", Map::new(), &ctx())
        .await;
    // parsed fine; the scripted surface has no next page
    assert!(!r.success);
    assert_eq!(r.error.as_deref(), Some("no next page"));
    assert_eq!(surface.count("navigateNextPage"), 1);
}

#[tokio::test(start_paused = true)]
async fn pipeline_steps_are_handed_back() {
    init_test_tracing();
    let surface = Arc::new(ScriptedSurface::new());
    let mut ex = executor(surface.clone());

    for kind in [ActionKind::Extract, ActionKind::Analyze, ActionKind::ApplyBest] {
        let r = ex
            .execute(&"tab-0".into(), &PlannedAction::new(kind, "pipeline"), &ctx())
            .await;
        assert!(r.success);
        assert_eq!(r.output, ActionOutput::Handoff(kind));
    }
    assert!(surface.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn transport_failures_are_flagged_retryable() {
    init_test_tracing();
    let surface = Arc::new(ScriptedSurface::new());
    let mut ex = executor(surface.clone());

    surface.fail_next(SurfaceError::Disconnected("socket closed".into()));
    let r = ex
        .execute(&"tab-0".into(), &PlannedAction::new(ActionKind::GoBack, "previous page"), &ctx())
        .await;
    assert!(!r.success);
    assert!(r.retryable);

    surface.fail_next(SurfaceError::Script("TypeError".into()));
    let r = ex
        .execute(&"tab-0".into(), &PlannedAction::new(ActionKind::Scroll, "more cards"), &ctx())
        .await;
    assert!(!r.success);
    assert!(!r.retryable);

    let r = ex
        .execute(&"tab-0".into(), &PlannedAction::new(ActionKind::Scroll, "more cards"), &ctx())
        .await;
    assert!(r.success);
    assert_eq!(
        surface.requests().last(),
        Some(&SurfaceRequest::Scroll { pixels: 800 })
    );
}

#[tokio::test(start_paused = true)]
async fn wait_sleeps_for_the_requested_time() {
    init_test_tracing();
    let mut ex = executor(Arc::new(ScriptedSurface::new()));

    let start = tokio::time::Instant::now();
    let action = PlannedAction::new(ActionKind::Wait, "page settles").with_param("ms", json!(1500));
    let r = ex.execute(&"tab-0".into(), &action, &ctx()).await;
    assert!(r.success);
    assert_eq!(start.elapsed(), Duration::from_millis(1500));
}

#[tokio::test(start_paused = true)]
async fn apply_rehearses_or_submits_with_profile_fields() {
    init_test_tracing();
    let surface = Arc::new(ScriptedSurface::new());
    let mut ex = executor(surface.clone());
    let link = "https://www.linkedin.com/jobs/view/7/";

    let dry = PlannedAction::new(ActionKind::ApplyBest, "rehearsed").with_param("link", json!(link));
    let r = ex.execute(&"tab-0".into(), &dry, &ctx()).await;
    assert!(r.success);
    assert_eq!(r.message, "application rehearsed");

    let live = dry.clone().with_param("submit", json!(true));
    let r = ex.execute(&"tab-0".into(), &live, &ctx()).await;
    assert!(r.success);
    match r.output {
        ActionOutput::Applied(reply) => assert!(reply.submitted),
        other => panic!("unexpected output {other:?}"),
    }

    let applied = surface.applied();
    assert_eq!(applied.len(), 2);
    assert!(!applied[0].submit);
    assert!(applied[1].submit);
    assert_eq!(applied[1].link, link);
    assert_eq!(applied[1].applicant.email, "ada@example.com");
}
