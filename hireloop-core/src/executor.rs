//! Executes one planned action at a time against a tab.
use crate::model::RunContext;
use crate::planner::{ActionKind, PlannedAction};
use hireloop_drivers::{
    decode, AckReply, ApplyReply, PageSurface, SurfaceError, SurfaceRequest, TabId,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_SCROLL_PIXELS: i64 = 800;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Idle,
    Executing,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutput {
    None,
    /// The loop runs this step itself (extraction, analysis, candidate
    /// selection).
    Handoff(ActionKind),
    Applied(ApplyReply),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
    pub error: Option<String>,
    pub retryable: bool,
    pub output: ActionOutput,
}

impl ActionResult {
    fn ok(message: impl Into<String>, output: ActionOutput) -> Self {
        Self {
            success: true,
            message: message.into(),
            error: None,
            retryable: false,
            output,
        }
    }

    fn failed(message: impl Into<String>, error: impl Into<String>, retryable: bool) -> Self {
        Self {
            success: false,
            message: message.into(),
            error: Some(error.into()),
            retryable,
            output: ActionOutput::None,
        }
    }

    fn from_surface(kind: ActionKind, e: &SurfaceError) -> Self {
        Self::failed(format!("{kind} failed"), e.to_string(), e.is_retryable())
    }
}

/// Settle time after each kind of surface call.
#[derive(Debug, Clone)]
pub struct SettleDelays {
    pub navigate: Duration,
    pub search: Duration,
    pub next_page: Duration,
    pub scroll: Duration,
    pub go_back: Duration,
    pub apply: Duration,
    pub wait_default: Duration,
}

impl Default for SettleDelays {
    fn default() -> Self {
        Self {
            navigate: Duration::from_secs(3),
            search: Duration::from_secs(3),
            next_page: Duration::from_secs(3),
            scroll: Duration::from_secs(2),
            go_back: Duration::from_secs(2),
            apply: Duration::from_secs(2),
            wait_default: Duration::from_secs(2),
        }
    }
}

impl SettleDelays {
    pub fn from_config(config: &hireloop_config::OrchestratorConfig) -> Self {
        let ms = Duration::from_millis;
        Self {
            navigate: ms(config.navigate_settle_ms),
            search: ms(config.search_settle_ms),
            next_page: ms(config.next_page_settle_ms),
            scroll: ms(config.scroll_settle_ms),
            go_back: ms(config.go_back_settle_ms),
            apply: ms(config.apply_settle_ms),
            wait_default: ms(config.wait_default_ms),
        }
    }
}

pub struct ActionExecutor {
    surface: Arc<dyn PageSurface>,
    delays: SettleDelays,
    state: ExecutorState,
    current: Option<PlannedAction>,
}

impl ActionExecutor {
    pub fn new(surface: Arc<dyn PageSurface>, delays: SettleDelays) -> Self {
        Self {
            surface,
            delays,
            state: ExecutorState::Idle,
            current: None,
        }
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    pub fn current_action(&self) -> Option<&PlannedAction> {
        self.current.as_ref()
    }

    /// Parse `name` into an [`ActionKind`] and execute it. Unknown names are
    /// a failed, non-retryable result.
    pub async fn execute_named(
        &mut self,
        tab: &TabId,
        name: &str,
        parameters: Map<String, Value>,
        ctx: &RunContext,
    ) -> ActionResult {
        match name.parse::<ActionKind>() {
            Ok(kind) => {
                let action = PlannedAction {
                    kind,
                    parameters,
                    expected_outcome: String::new(),
                };
                self.execute(tab, &action, ctx).await
            }
            Err(e) => {
                warn!(%name, "executor.unknown_action");
                self.state = ExecutorState::Failed;
                ActionResult::failed("unknown action", e.to_string(), false)
            }
        }
    }

    pub async fn execute(
        &mut self,
        tab: &TabId,
        action: &PlannedAction,
        ctx: &RunContext,
    ) -> ActionResult {
        self.state = ExecutorState::Executing;
        self.current = Some(action.clone());
        debug!(%tab, kind = %action.kind, "executor.execute");

        let result = self.dispatch(tab, action, ctx).await;

        self.state = if result.success {
            ExecutorState::Idle
        } else {
            ExecutorState::Failed
        };
        self.current = None;
        if !result.success {
            warn!(
                %tab,
                kind = %action.kind,
                error = result.error.as_deref().unwrap_or_default(),
                retryable = result.retryable,
                "executor.failed"
            );
        }
        result
    }

    async fn dispatch(&self, tab: &TabId, action: &PlannedAction, ctx: &RunContext) -> ActionResult {
        let kind = action.kind;
        match kind {
            ActionKind::Navigate => {
                let url = action.str_param("url").unwrap_or(&ctx.target_url).to_string();
                if url.is_empty() {
                    return ActionResult::failed("navigate skipped", "missing url", false);
                }
                let res = self.surface.send(tab, SurfaceRequest::Navigate { url: url.clone() }).await;
                self.settle(self.delays.navigate).await;
                self.ack(kind, res, format!("navigated to {url}"))
            }
            ActionKind::Search => {
                let keywords = action.str_param("keywords").unwrap_or(&ctx.search_query).to_string();
                let location = action.str_param("location").unwrap_or(&ctx.location).to_string();
                if keywords.trim().is_empty() {
                    return ActionResult::failed("search skipped", "no search keywords configured", false);
                }
                let res = self
                    .surface
                    .send(
                        tab,
                        SurfaceRequest::PerformSearch {
                            keywords: keywords.clone(),
                            location,
                        },
                    )
                    .await;
                self.settle(self.delays.search).await;
                self.ack(kind, res, format!("searched for {keywords}"))
            }
            ActionKind::Extract | ActionKind::Analyze => {
                ActionResult::ok(format!("{kind} handed to pipeline"), ActionOutput::Handoff(kind))
            }
            ActionKind::ApplyBest => {
                let Some(link) = action.str_param("link") else {
                    return ActionResult::ok("candidate selection handed to pipeline", ActionOutput::Handoff(kind));
                };
                let submit = action.bool_param("submit").unwrap_or(false);
                let res = self
                    .surface
                    .send(
                        tab,
                        SurfaceRequest::Apply {
                            link: link.to_string(),
                            submit,
                            applicant: ctx.user_profile.applicant_fields(),
                        },
                    )
                    .await;
                self.settle(self.delays.apply).await;
                match res.and_then(decode::<ApplyReply>) {
                    Ok(reply) if reply.submitted == submit => {
                        let message = if submit { "application submitted" } else { "application rehearsed" };
                        ActionResult::ok(message, ActionOutput::Applied(reply))
                    }
                    Ok(reply) => ActionResult::failed(
                        "application not completed",
                        reply.message.unwrap_or_else(|| "form did not submit".into()),
                        false,
                    ),
                    Err(e) => ActionResult::from_surface(kind, &e),
                }
            }
            ActionKind::NextPage => {
                let res = self.surface.send(tab, SurfaceRequest::NavigateNextPage).await;
                self.settle(self.delays.next_page).await;
                self.ack(kind, res, "moved to next page")
            }
            ActionKind::Scroll => {
                let pixels = action.i64_param("pixels").unwrap_or(DEFAULT_SCROLL_PIXELS);
                let res = self.surface.send(tab, SurfaceRequest::Scroll { pixels }).await;
                self.settle(self.delays.scroll).await;
                match res {
                    Ok(_) => ActionResult::ok(format!("scrolled {pixels}px"), ActionOutput::None),
                    Err(e) => ActionResult::from_surface(kind, &e),
                }
            }
            ActionKind::GoBack => {
                let res = self.surface.send(tab, SurfaceRequest::GoBack).await;
                self.settle(self.delays.go_back).await;
                self.ack(kind, res, "went back")
            }
            ActionKind::Wait => {
                let wait = action
                    .u64_param("ms")
                    .map(Duration::from_millis)
                    .unwrap_or(self.delays.wait_default);
                self.settle(wait).await;
                ActionResult::ok(format!("waited {}ms", wait.as_millis()), ActionOutput::None)
            }
            ActionKind::Complete => ActionResult::ok("plan complete", ActionOutput::None),
        }
    }

    /// Only an explicit `"ok": false` counts as no effect; any other reply
    /// from a call that went through is success.
    fn ack(&self, kind: ActionKind, res: Result<Value, SurfaceError>, message: impl Into<String>) -> ActionResult {
        match res {
            Ok(value) if value.get("ok").and_then(Value::as_bool) == Some(false) => {
                let why = decode::<AckReply>(value).ok().and_then(|a| a.message);
                ActionResult::failed(
                    format!("{kind} had no effect"),
                    why.unwrap_or_else(|| "surface reported no effect".into()),
                    false,
                )
            }
            Ok(_) => ActionResult::ok(message, ActionOutput::None),
            Err(e) => ActionResult::from_surface(kind, &e),
        }
    }

    async fn settle(&self, delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
