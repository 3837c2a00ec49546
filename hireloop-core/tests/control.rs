mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{init_test_tracing, memory_store, test_config, tracker_for, ScriptedCompletion, ScriptedSurface};
use hireloop_actors::{keys, spawn_actor, StoreHandle};
use hireloop_common::HireloopError;
use hireloop_config::{RunSettings, SubmissionMode};
use hireloop_core::{
    ClientFactory, ControlActor, ControlHandle, ControlParts, EventBus, ManualClock, RunOutcome,
    RunState,
};
use hireloop_llm::SharedCompletionClient;
use tokio_util::sync::CancellationToken;

struct FixedFactory {
    client: Arc<ScriptedCompletion>,
    credentials: Mutex<Vec<Option<String>>>,
    fail: bool,
}

#[async_trait]
impl ClientFactory for FixedFactory {
    async fn build(&self, credential: Option<String>) -> anyhow::Result<SharedCompletionClient> {
        self.credentials.lock().unwrap().push(credential);
        if self.fail {
            anyhow::bail!("no completion credential configured");
        }
        Ok(self.client.clone())
    }
}

struct Setup {
    control: ControlHandle,
    factory: Arc<FixedFactory>,
    store: StoreHandle,
    surface: Arc<ScriptedSurface>,
}

async fn setup(fail: bool) -> Setup {
    let mut config = test_config();
    // runs here only end when stopped
    config.orchestrator.max_idle_iterations = 10_000;

    let surface = Arc::new(ScriptedSurface::new());
    let store = memory_store().await;
    let factory = Arc::new(FixedFactory {
        client: Arc::new(ScriptedCompletion::always("{}")),
        credentials: Mutex::new(Vec::new()),
        fail,
    });
    let parts = ControlParts {
        config: Arc::new(config),
        surface: surface.clone(),
        tracker: tracker_for(surface.clone(), Arc::new(ManualClock::default())),
        store: store.clone(),
        events: EventBus::new(1024),
        limiter: None,
        factory: factory.clone(),
    };
    let addr = spawn_actor(ControlActor::new(parts, CancellationToken::new()), 16).addr;
    Setup {
        control: ControlHandle::new(addr),
        factory,
        store,
        surface,
    }
}

/// One-second pause between iterations so the loop task yields.
fn settings() -> RunSettings {
    RunSettings {
        search_delay_seconds: 1,
        apply_delay_seconds: 0,
        ..RunSettings::default()
    }
}

#[tokio::test]
async fn start_stop_lifecycle() {
    init_test_tracing();
    let s = setup(false).await;

    assert!(matches!(s.control.stop().await, Err(HireloopError::NotRunning)));

    let run_id = s.control.start(settings()).await.unwrap();
    let status = s.control.get_status().await.unwrap();
    assert_eq!(status.state, RunState::Running);
    assert_eq!(status.run_id, Some(run_id));

    assert!(matches!(
        s.control.start(settings()).await,
        Err(HireloopError::AlreadyRunning)
    ));

    s.control.stop().await.unwrap();
    let last = tokio::time::timeout(Duration::from_secs(10), s.control.wait_for_stop(run_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(last.state, RunState::Stopped);
    assert_eq!(last.outcome, Some(RunOutcome::Stopped));

    assert!(matches!(s.control.stop().await, Err(HireloopError::NotRunning)));

    // a finished run does not block the next one
    let next = s.control.start(settings()).await.unwrap();
    assert_ne!(next, run_id);
    s.control.stop().await.unwrap();
    tokio::time::timeout(Duration::from_secs(10), s.control.wait_for_stop(next))
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn stored_credential_reaches_the_client_factory() {
    init_test_tracing();
    let s = setup(false).await;

    s.control.set_credential("   ").await.unwrap();
    let first = s.control.start(settings()).await.unwrap();
    s.control.stop().await.unwrap();
    s.control.wait_for_stop(first).await.unwrap();

    s.control.set_credential("  sk-test-123 ").await.unwrap();
    assert_eq!(
        s.store.get_string(keys::API_CREDENTIAL).await.as_deref(),
        Some("sk-test-123")
    );
    let second = s.control.start(settings()).await.unwrap();
    s.control.stop().await.unwrap();
    s.control.wait_for_stop(second).await.unwrap();

    assert_eq!(
        *s.factory.credentials.lock().unwrap(),
        vec![None, Some("sk-test-123".to_string())]
    );
}

#[tokio::test]
async fn factory_failure_is_a_config_error() {
    init_test_tracing();
    let s = setup(true).await;

    let err = s.control.start(settings()).await.unwrap_err();
    assert!(matches!(err, HireloopError::Config(ref msg) if msg.contains("no completion credential")));
    let status = s.control.get_status().await.unwrap();
    assert_eq!(status.state, RunState::Stopped);
    assert_eq!(status.run_id, None);
    assert_eq!(s.surface.opened(), 0);
}

#[tokio::test]
async fn resources_can_be_listed_closed_and_reset() {
    init_test_tracing();
    let s = setup(false).await;

    let run_id = s.control.start(settings()).await.unwrap();
    let mut events = s.control.subscribe().await.unwrap();
    // the first iteration announces itself once the tab is open
    tokio::time::timeout(Duration::from_secs(10), async {
        while s.surface.opened() == 0 {
            let _ = events.recv().await;
        }
    })
    .await
    .unwrap();
    s.control.stop().await.unwrap();
    s.control.wait_for_stop(run_id).await.unwrap();

    let tabs = s.control.list_resources().await.unwrap();
    assert_eq!(tabs.len(), 1);
    assert!(matches!(
        s.control.close_resource("tab-missing").await,
        Err(HireloopError::ResourceNotFound(id)) if id == "tab-missing"
    ));
    s.control.close_resource(&tabs[0].id).await.unwrap();
    assert!(s.control.list_resources().await.unwrap().is_empty());
    assert_eq!(s.surface.closed(), vec![tabs[0].id.clone()]);
    assert_eq!(s.control.reset_resources().await.unwrap(), 0);
}

#[tokio::test]
async fn submission_mode_can_be_switched() {
    init_test_tracing();
    let s = setup(false).await;
    s.control
        .set_submission_mode(SubmissionMode::Live)
        .await
        .unwrap();

    let mut events = s.control.subscribe().await.unwrap();
    let run_id = s.control.start(settings()).await.unwrap();
    let started = tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(started.message.starts_with("run started (live"));
    s.control.stop().await.unwrap();
    s.control.wait_for_stop(run_id).await.unwrap();
}
