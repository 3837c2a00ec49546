#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use hireloop_actors::{spawn_actor, StoreActor, StoreHandle};
use hireloop_common::observability::{init_logging, LogConfig};
use hireloop_common::LogFormat;
use hireloop_config::{HireloopConfig, OrchestratorConfig, RunSettings};
use hireloop_core::{
    EventBus, ListingMetadata, ListingRecord, ManualClock, ResourceTracker, TrackerConfig,
};
use hireloop_drivers::{
    ApplicantFields, PageSurface, PingReply, RawDetail, RawListing, SurfaceError, SurfaceRequest,
    TabId,
};
use hireloop_llm::{CompletionClient, LlmError, LlmResponse};
use serde_json::{json, Value};

static INIT_PATH: OnceLock<std::path::PathBuf> = OnceLock::new();

pub fn init_test_tracing() {
    let _ = INIT_PATH.get_or_init(|| {
        let config = LogConfig {
            app_name: "hireloop-core-tests",
            emit_stderr: true,
            format: if std::env::var("HIRELOOP_LOG_FORMAT")
                .map(|raw| raw.trim().eq_ignore_ascii_case("json"))
                .unwrap_or(false)
            {
                LogFormat::Json
            } else {
                LogFormat::Text
            },
            default_filter: "debug".into(),
            ..LogConfig::default()
        };

        init_logging(config).unwrap_or_default()
    });
}

pub const SEARCH_URL: &str = "https://www.linkedin.com/jobs/search/?keywords=rust";

pub fn raw(title: &str, id: u32) -> RawListing {
    RawListing {
        title: title.into(),
        company: "Acme".into(),
        location: "Berlin".into(),
        link: Some(format!("https://www.linkedin.com/jobs/view/{id}/")),
        snippet: format!("{title} working on backend services"),
    }
}

pub fn record(title: &str, id: u32) -> ListingRecord {
    ListingRecord {
        identity: format!("https://www.linkedin.com/jobs/view/{id}"),
        title: title.into(),
        employer: "Acme".into(),
        location: "Berlin".into(),
        short_description: String::new(),
        full_description: None,
        requirements: None,
        benefits: None,
        compensation: None,
        metadata: ListingMetadata::default(),
        link: Some(format!("https://www.linkedin.com/jobs/view/{id}/")),
    }
}

pub fn long_description() -> String {
    "We build reliable async services in Rust with tokio and sqlx. ".repeat(6)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub link: String,
    pub submit: bool,
    pub applicant: ApplicantFields,
}

struct SurfaceState {
    ping: PingReply,
    pages: VecDeque<Vec<RawListing>>,
    details: VecDeque<RawDetail>,
    next_page_ok: bool,
    failures: VecDeque<SurfaceError>,
    requests: Vec<(TabId, SurfaceRequest)>,
    applied: Vec<Applied>,
    closed: Vec<TabId>,
}

/// In-memory page surface answering from a script.
///
/// `ExtractListings` pops the next page; the last page repeats once the
/// queue is down to one. `ExtractDetail` works the same way over details.
/// Injected failures are returned by the next `send`, in order.
pub struct ScriptedSurface {
    opened: AtomicUsize,
    state: Mutex<SurfaceState>,
}

impl Default for ScriptedSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedSurface {
    pub fn new() -> Self {
        Self {
            opened: AtomicUsize::new(0),
            state: Mutex::new(SurfaceState {
                ping: PingReply {
                    ready: true,
                    url: SEARCH_URL.into(),
                    listing_count: 0,
                },
                pages: VecDeque::from([Vec::new()]),
                details: VecDeque::from([RawDetail {
                    description: long_description(),
                    ..RawDetail::default()
                }]),
                next_page_ok: false,
                failures: VecDeque::new(),
                requests: Vec::new(),
                applied: Vec::new(),
                closed: Vec::new(),
            }),
        }
    }

    pub fn with_ping(self, ready: bool, url: &str, listing_count: usize) -> Self {
        self.state.lock().unwrap().ping = PingReply {
            ready,
            url: url.into(),
            listing_count,
        };
        self
    }

    pub fn with_pages(self, pages: Vec<Vec<RawListing>>) -> Self {
        self.state.lock().unwrap().pages = pages.into();
        self
    }

    pub fn with_details(self, details: Vec<RawDetail>) -> Self {
        self.state.lock().unwrap().details = details.into();
        self
    }

    pub fn with_next_page(self, ok: bool) -> Self {
        self.state.lock().unwrap().next_page_ok = ok;
        self
    }

    pub fn fail_next(&self, error: SurfaceError) {
        self.state.lock().unwrap().failures.push_back(error);
    }

    pub fn requests(&self) -> Vec<SurfaceRequest> {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn count(&self, action: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|(_, r)| r.action() == action)
            .count()
    }

    pub fn applied(&self) -> Vec<Applied> {
        self.state.lock().unwrap().applied.clone()
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> Vec<TabId> {
        self.state.lock().unwrap().closed.clone()
    }
}

fn pop_or_repeat<T: Clone + Default>(queue: &mut VecDeque<T>) -> T {
    if queue.len() > 1 {
        queue.pop_front().unwrap_or_default()
    } else {
        queue.front().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl PageSurface for ScriptedSurface {
    async fn open_tab(&self, _url: &str) -> Result<TabId, SurfaceError> {
        let n = self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(format!("tab-{n}"))
    }

    async fn close_tab(&self, tab: &TabId) -> Result<(), SurfaceError> {
        self.state.lock().unwrap().closed.push(tab.clone());
        Ok(())
    }

    async fn send(&self, tab: &TabId, request: SurfaceRequest) -> Result<Value, SurfaceError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push((tab.clone(), request.clone()));
        if let Some(err) = state.failures.pop_front() {
            return Err(err);
        }
        let reply = match request {
            SurfaceRequest::Ping => serde_json::to_value(&state.ping).unwrap(),
            SurfaceRequest::ExtractListings => {
                let page = pop_or_repeat(&mut state.pages);
                json!({ "listings": page })
            }
            SurfaceRequest::ExtractDetail => {
                let detail = pop_or_repeat(&mut state.details);
                serde_json::to_value(detail).unwrap()
            }
            SurfaceRequest::NavigateNextPage => {
                if state.next_page_ok {
                    json!({ "ok": true })
                } else {
                    json!({ "ok": false, "message": "no next page" })
                }
            }
            SurfaceRequest::Apply {
                link,
                submit,
                applicant,
            } => {
                state.applied.push(Applied {
                    link,
                    submit,
                    applicant,
                });
                json!({ "submitted": submit })
            }
            _ => json!({ "ok": true }),
        };
        Ok(reply)
    }
}

type Responder = dyn Fn(&str) -> Result<String, LlmError> + Send + Sync;

/// Completion client answering through a closure over the prompt. Every
/// prompt is recorded.
pub struct ScriptedCompletion {
    respond: Box<Responder>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    pub fn new(respond: impl Fn(&str) -> Result<String, LlmError> + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Same answer for both stages.
    pub fn always(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(text.clone()))
    }

    /// Separate answers for the quick and the detailed screen.
    pub fn staged(prescreen: &str, deep: &str) -> Self {
        let (pre, deep) = (prescreen.to_string(), deep.to_string());
        Self::new(move |prompt| {
            if is_deep(prompt) {
                Ok(deep.clone())
            } else {
                Ok(pre.clone())
            }
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn deep_calls(&self) -> usize {
        self.prompts().iter().filter(|p| is_deep(p)).count()
    }

    pub fn prescreen_calls(&self) -> usize {
        self.prompts().iter().filter(|p| !is_deep(p)).count()
    }
}

pub fn is_deep(prompt: &str) -> bool {
    prompt.starts_with("Detailed screen")
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn generate(
        &self,
        prompt: &str,
        _system_prompt: Option<&str>,
        _max_tokens: Option<u32>,
        _temperature: Option<f32>,
    ) -> Result<LlmResponse, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let text = (self.respond)(prompt)?;
        Ok(LlmResponse {
            text,
            model: Some("scripted".into()),
            tokens_used: None,
        })
    }

    async fn health_check(&self) -> Result<bool, LlmError> {
        Ok(true)
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

pub async fn memory_store() -> StoreHandle {
    let actor = StoreActor::in_memory().await.unwrap();
    StoreHandle::new(spawn_actor(actor, 64).addr)
}

/// Config with every delay at zero. Loop tests run on the real clock
/// because the store answers from its own worker thread.
pub fn test_config() -> HireloopConfig {
    let mut config = HireloopConfig::default();
    config.orchestrator = OrchestratorConfig {
        ready_attempts: 3,
        ready_interval_ms: 0,
        detail_attempts: 3,
        min_description_chars: 200,
        detail_retry_delay_ms: 0,
        inter_batch_delay_ms: 0,
        max_idle_iterations: 3,
        error_cooldown_secs: 0,
        surface_retry_base_ms: 1,
        surface_retry_max_ms: 1,
        navigate_settle_ms: 0,
        search_settle_ms: 0,
        next_page_settle_ms: 0,
        scroll_settle_ms: 0,
        go_back_settle_ms: 0,
        open_listing_settle_ms: 0,
        apply_settle_ms: 0,
        wait_default_ms: 0,
        ..OrchestratorConfig::default()
    };
    config.run = RunSettings {
        search_delay_seconds: 0,
        apply_delay_seconds: 0,
        ..RunSettings::default()
    };
    config
}

pub fn tracker_for(surface: Arc<dyn PageSurface>, clock: Arc<ManualClock>) -> ResourceTracker {
    ResourceTracker::new(
        surface,
        clock,
        TrackerConfig {
            start_url: SEARCH_URL.into(),
            ready_attempts: 3,
            ready_interval: std::time::Duration::from_secs(1),
        },
    )
}

pub fn event_bus() -> EventBus {
    EventBus::new(256)
}
