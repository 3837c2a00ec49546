//! The orchestration loop.
//!
//! One [`RunLoop`] drives a single tab through plan, extract, screen and
//! apply until it is stopped, runs out of new listings, or reaches the
//! application limit. Iteration errors never end the run: they become an
//! error event followed by a cool-down.
//!
//! Cancellation is cooperative. The token is checked at the top of every
//! iteration and before every plan action; calls and timers already in
//! flight finish normally.
use crate::events::{EventBus, Severity, StatusEvent};
use crate::evaluator::{Evaluator, EvaluatorConfig};
use crate::executor::{ActionExecutor, ActionResult, SettleDelays};
use crate::extractor::{ContentExtractor, DetailQuality, ExtractorConfig, ListingsPage};
use crate::listing::classify_page;
use crate::model::{
    EvaluationResult, ListingRecord, PageType, RunContext, Stage, UserPreferences, UserProfile,
};
use crate::planner::{ActionKind, PlannedAction, Planner};
use crate::retry::RetryPolicy;
use crate::tracker::ResourceTracker;
use anyhow::Context as _;
use hireloop_actors::{keys, Addr, RateKey, RateLimiter, StoreHandle};
use hireloop_config::{HireloopConfig, RunSettings, SiteProfile, SubmissionMode};
use hireloop_drivers::{decode, PageSurface, PingReply, SurfaceError, SurfaceRequest, TabId};
use hireloop_llm::SharedCompletionClient;
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Stopped,
    Running,
}

/// Why a run ended. All three are normal endings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Stopped,
    Exhausted,
    LimitReached,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatus {
    pub state: RunState,
    pub run_id: Option<Uuid>,
    pub iteration: u64,
    pub new_listings: u64,
    pub evaluated: u64,
    pub applied: u32,
    pub idle_streak: u32,
    pub outcome: Option<RunOutcome>,
    pub last_event: Option<StatusEvent>,
}

impl Default for RunStatus {
    fn default() -> Self {
        Self {
            state: RunState::Stopped,
            run_id: None,
            iteration: 0,
            new_listings: 0,
            evaluated: 0,
            applied: 0,
            idle_streak: 0,
            outcome: None,
            last_event: None,
        }
    }
}

/// Everything a run borrows from its surroundings.
#[derive(Clone)]
pub struct LoopDeps {
    pub config: Arc<HireloopConfig>,
    pub surface: Arc<dyn PageSurface>,
    pub tracker: ResourceTracker,
    pub client: SharedCompletionClient,
    pub limiter: Option<Addr<RateLimiter>>,
    pub store: StoreHandle,
    pub events: EventBus,
    pub mode: watch::Receiver<SubmissionMode>,
    pub status: Arc<watch::Sender<RunStatus>>,
}

#[derive(Debug, Default)]
struct IterationReport {
    new_listings: usize,
    limit_reached: bool,
}

struct Candidate {
    record: ListingRecord,
    result: EvaluationResult,
}

pub struct RunLoop {
    run_id: Uuid,
    settings: RunSettings,
    cancel: CancellationToken,
    site: SiteProfile,
    surface: Arc<dyn PageSurface>,
    tracker: ResourceTracker,
    store: StoreHandle,
    events: EventBus,
    mode: watch::Receiver<SubmissionMode>,
    status: Arc<watch::Sender<RunStatus>>,
    extractor: ContentExtractor,
    evaluator: Evaluator,
    planner: Planner,
    executor: ActionExecutor,
    retry: RetryPolicy,
    processed: HashSet<String>,
    profile: UserProfile,
    prefs: UserPreferences,
    target_url: String,
    max_idle: u32,
    error_cooldown: Duration,
    stale_tab_max_age: Duration,
    iteration: u64,
    new_listings: u64,
    evaluated: u64,
    applied: u32,
    idle_streak: u32,
}

impl RunLoop {
    /// Build a run, loading the processed set, profile, preferences and last
    /// search URL from the store.
    pub async fn new(deps: LoopDeps, settings: RunSettings, cancel: CancellationToken) -> Self {
        let LoopDeps {
            config,
            surface,
            tracker,
            client,
            limiter,
            store,
            events,
            mode,
            status,
        } = deps;
        let o = &config.orchestrator;
        let site = config.browser.site.clone();
        let retry = RetryPolicy::from_config(o);

        let mut evaluator = Evaluator::new(client, EvaluatorConfig::from_config(o));
        if let Some(limiter) = limiter {
            evaluator = evaluator.with_rate_limiter(limiter, RateKey::completion());
        }

        let processed = store.load_processed().await;
        let profile: UserProfile = store.get_json(keys::USER_PROFILE).await;
        let prefs: UserPreferences = store.get_json(keys::USER_PREFERENCES).await;
        let target_url = store
            .get_string(keys::LAST_SEARCH_URL)
            .await
            .filter(|url| classify_page(url, &site) == PageType::SearchResults)
            .unwrap_or_else(|| site.start_url.clone());

        Self {
            run_id: Uuid::new_v4(),
            settings: settings.normalized(),
            cancel,
            extractor: ContentExtractor::new(surface.clone(), ExtractorConfig::from_config(&config), retry),
            executor: ActionExecutor::new(surface.clone(), SettleDelays::from_config(o)),
            planner: Planner::new(o.max_plan_steps),
            evaluator,
            retry,
            site,
            surface,
            tracker,
            store,
            events,
            mode,
            status,
            processed,
            profile,
            prefs,
            target_url,
            max_idle: o.max_idle_iterations.max(1),
            error_cooldown: o.error_cooldown(),
            stale_tab_max_age: o.stale_tab_max_age(),
            iteration: 0,
            new_listings: 0,
            evaluated: 0,
            applied: 0,
            idle_streak: 0,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub async fn run(self) -> RunOutcome {
        let span = tracing::info_span!("run", run_id = %self.run_id);
        self.drive().instrument(span).await
    }

    async fn drive(mut self) -> RunOutcome {
        let run_id = self.run_id;
        self.status.send_modify(|s| {
            *s = RunStatus {
                state: RunState::Running,
                run_id: Some(run_id),
                ..RunStatus::default()
            }
        });
        let mode = *self.mode.borrow();
        self.emit(
            Severity::Info,
            format!(
                "run started ({}, threshold {:.2}, {} already processed)",
                if mode.is_live() { "live" } else { "dry run" },
                self.settings.confidence_threshold,
                self.processed.len()
            ),
        );

        let outcome = loop {
            if self.cancel.is_cancelled() {
                break RunOutcome::Stopped;
            }
            self.iteration += 1;
            self.publish();

            match self.step().await {
                Ok(report) => {
                    self.new_listings += report.new_listings as u64;
                    if report.limit_reached {
                        break RunOutcome::LimitReached;
                    }
                    if report.new_listings == 0 {
                        self.idle_streak += 1;
                        debug!(idle_streak = self.idle_streak, "loop.idle");
                        if self.idle_streak >= self.max_idle {
                            break RunOutcome::Exhausted;
                        }
                    } else {
                        self.idle_streak = 0;
                    }
                }
                Err(e) => {
                    self.emit(
                        Severity::Error,
                        format!("iteration {} failed: {e:#}", self.iteration),
                    );
                    self.publish();
                    if self.cancel.is_cancelled() {
                        break RunOutcome::Stopped;
                    }
                    tokio::time::sleep(self.error_cooldown).await;
                    continue;
                }
            }

            self.publish();
            if self.cancel.is_cancelled() {
                break RunOutcome::Stopped;
            }
            tokio::time::sleep(Duration::from_secs(self.settings.search_delay_seconds)).await;
        };

        match outcome {
            RunOutcome::Stopped => self.emit(Severity::Info, "run stopped"),
            RunOutcome::Exhausted => self.emit(
                Severity::Success,
                format!(
                    "no new listings for {} iterations, run complete",
                    self.idle_streak
                ),
            ),
            RunOutcome::LimitReached => self.emit(
                Severity::Success,
                format!(
                    "reached {} applications, run complete",
                    self.settings.max_applications
                ),
            ),
        }
        self.publish();
        self.status.send_modify(|s| {
            s.state = RunState::Stopped;
            s.outcome = Some(outcome);
        });
        info!(?outcome, iterations = self.iteration, applied = self.applied, "loop.finished");
        outcome
    }

    async fn step(&mut self) -> anyhow::Result<IterationReport> {
        let reclaimed = self.tracker.reclaim_stale(self.stale_tab_max_age).await;
        if reclaimed > 0 {
            self.emit(Severity::Info, format!("closed {reclaimed} idle tab(s)"));
        }

        let tab = self
            .tracker
            .acquire()
            .await
            .context("no browser tab available")?;
        let tab_id = tab.id;

        let ping = match self.ping(&tab_id).await {
            Ok(ping) => ping,
            Err(e) => {
                if matches!(e, SurfaceError::TabClosed(_)) {
                    let _ = self.tracker.release(&tab_id).await;
                }
                return Err(anyhow::Error::new(e).context("tab did not answer"));
            }
        };
        let mut ctx = self.context(&tab_id, &ping);
        debug!(tab = %tab_id, page = ?ctx.page_type, listings = ctx.jobs_found_count, "loop.context");

        let mut plan = self.planner.next_plan(&ctx);
        if plan.is_fallback() {
            self.emit(Severity::Warning, "planning failed, falling back to a plain search");
        }

        let mut report = IterationReport::default();
        let mut searched = false;
        let mut fresh: Vec<ListingRecord> = Vec::new();
        let mut screened: Vec<Candidate> = Vec::new();

        while let Some(action) = plan.next_action() {
            if self.cancel.is_cancelled() {
                debug!(kind = %action.kind, "loop.plan.cancelled");
                break;
            }
            match action.kind {
                ActionKind::Extract => {
                    fresh = self.extract(&tab_id, &mut ctx, searched).await?;
                    report.new_listings += fresh.len();
                }
                ActionKind::Analyze => {
                    screened = self.analyze(&tab_id, &ctx, std::mem::take(&mut fresh)).await;
                }
                ActionKind::ApplyBest => {
                    if self.apply_best(&tab_id, &ctx, std::mem::take(&mut screened)).await {
                        report.limit_reached = true;
                        break;
                    }
                }
                ActionKind::Complete => plan.finish(),
                kind => {
                    let result = self.execute_with_retry(&tab_id, &action, &ctx).await;
                    if !result.success {
                        self.report_failure(&result);
                        continue;
                    }
                    match kind {
                        ActionKind::Search => {
                            searched = true;
                            self.after_search(&tab_id, &mut ctx).await;
                        }
                        ActionKind::Navigate | ActionKind::GoBack | ActionKind::NextPage => {
                            self.refresh_context(&tab_id, &mut ctx).await;
                        }
                        _ => {}
                    }
                }
            }
        }

        // Listings extracted but never screened come back next time.
        for record in fresh {
            self.extractor.forget(&record.identity);
        }
        self.publish();
        Ok(report)
    }

    async fn ping(&self, tab: &TabId) -> Result<PingReply, SurfaceError> {
        self.retry
            .run("ping", || self.surface.send(tab, SurfaceRequest::Ping))
            .await
            .and_then(decode::<PingReply>)
    }

    fn context(&self, tab: &TabId, ping: &PingReply) -> RunContext {
        let page_type = classify_page(&ping.url, &self.site);
        self.tracker
            .observe(tab, &ping.url, ping.ready, page_type.is_on_site());
        RunContext {
            page_type,
            jobs_found_count: ping.listing_count,
            search_query: self.prefs.keywords.clone(),
            location: self.prefs.location.clone(),
            user_preferences: self.prefs.clone(),
            user_profile: self.profile.clone(),
            current_url: ping.url.clone(),
            target_url: self.target_url.clone(),
        }
    }

    /// Re-ping after a page change; failures leave the context as it was.
    async fn refresh_context(&self, tab: &TabId, ctx: &mut RunContext) {
        match self.ping(tab).await {
            Ok(ping) => {
                let fresh = self.context(tab, &ping);
                ctx.page_type = fresh.page_type;
                ctx.jobs_found_count = fresh.jobs_found_count;
                ctx.current_url = fresh.current_url;
            }
            Err(e) => debug!(%tab, error = %e, "loop.refresh.failed"),
        }
    }

    async fn after_search(&mut self, tab: &TabId, ctx: &mut RunContext) {
        self.refresh_context(tab, ctx).await;
        if ctx.page_type != PageType::SearchResults {
            return;
        }
        self.target_url = ctx.current_url.clone();
        if let Err(e) = self
            .store
            .set_string(keys::LAST_SEARCH_URL, &ctx.current_url)
            .await
        {
            warn!(error = %e, "loop.last_search_url.persist_failed");
        }
    }

    async fn extract(
        &mut self,
        tab: &TabId,
        ctx: &mut RunContext,
        searched: bool,
    ) -> anyhow::Result<Vec<ListingRecord>> {
        let mut page = self.extract_once(tab).await?;
        // Only a page with no cards at all gets a fresh search; a page of
        // already processed cards is left for NEXT_PAGE.
        if page.scraped == 0 && ctx.page_type == PageType::SearchResults && !searched {
            debug!(%tab, "loop.extract.search_on_demand");
            let search = PlannedAction::new(ActionKind::Search, "results for the query");
            let result = self.execute_with_retry(tab, &search, ctx).await;
            if result.success {
                self.after_search(tab, ctx).await;
                page = self.extract_once(tab).await?;
            } else {
                self.report_failure(&result);
            }
        }
        let found = page.listings;
        if !found.is_empty() {
            self.emit(Severity::Info, format!("found {} new listing(s)", found.len()));
        }
        Ok(found)
    }

    /// Malformed or script-level failures count as an empty page.
    async fn extract_once(&mut self, tab: &TabId) -> anyhow::Result<ListingsPage> {
        match self.extractor.extract_page(tab, &self.processed).await {
            Ok(page) => Ok(page),
            Err(e @ (SurfaceError::Malformed(_) | SurfaceError::Script(_))) => {
                self.emit(Severity::Warning, format!("could not read listings: {e}"));
                Ok(ListingsPage::default())
            }
            Err(e) => Err(anyhow::Error::new(e).context("listing extraction failed")),
        }
    }

    async fn analyze(
        &mut self,
        tab: &TabId,
        ctx: &RunContext,
        records: Vec<ListingRecord>,
    ) -> Vec<Candidate> {
        if records.is_empty() {
            return Vec::new();
        }
        let prescreened = self
            .evaluator
            .prescreen_batch(&records, &self.profile, &self.prefs)
            .await;

        let mut passed = Vec::new();
        for (record, pre) in records.into_iter().zip(prescreened) {
            if pre.decision {
                passed.push(record);
                continue;
            }
            self.evaluated += 1;
            self.mark_processed(&record.identity).await;
            self.emit(
                Severity::Info,
                format!("skipped {} at {}: {}", record.title, record.employer, pre.rationale),
            );
        }

        let mut screened = Vec::new();
        let mut left_results = false;
        for record in passed {
            if self.cancel.is_cancelled() {
                self.extractor.forget(&record.identity);
                continue;
            }
            let (detailed, opened) = self.enrich(tab, &record).await;
            left_results |= opened;
            let deep = self
                .evaluator
                .deep_screen(&detailed, &self.profile.resume_text, &self.profile, &self.prefs)
                .await;
            self.evaluated += 1;
            self.mark_processed(&record.identity).await;
            self.emit(
                if deep.decision { Severity::Success } else { Severity::Info },
                format!(
                    "{} at {}: {} (score {}, confidence {:.2})",
                    detailed.title,
                    detailed.employer,
                    if deep.decision { "match" } else { "no match" },
                    deep.score,
                    deep.confidence
                ),
            );
            screened.push(Candidate {
                record: detailed,
                result: deep,
            });
            self.publish();
        }

        if left_results {
            self.return_to(tab, ctx).await;
        }
        screened
    }

    /// Open the listing and pull its full text. Returns the record to screen
    /// and whether the tab left the results page.
    async fn enrich(&mut self, tab: &TabId, record: &ListingRecord) -> (ListingRecord, bool) {
        let Some(link) = record.link.as_deref() else {
            debug!(identity = %record.identity, "loop.enrich.no_link");
            return (record.clone(), false);
        };
        if let Err(e) = self.extractor.open_listing(tab, link).await {
            self.emit(
                Severity::Warning,
                format!("could not open {}: {e}", record.title),
            );
            return (record.clone(), false);
        }
        match self.extractor.extract_detail(tab, record).await {
            Ok(outcome) => {
                if outcome.quality == DetailQuality::Degraded {
                    self.emit(
                        Severity::Warning,
                        format!(
                            "partial description for {} after {} attempts",
                            record.title, outcome.attempts
                        ),
                    );
                }
                (outcome.record, true)
            }
            Err(e) => {
                self.emit(
                    Severity::Warning,
                    format!("could not read details for {}: {e}", record.title),
                );
                (record.clone(), true)
            }
        }
    }

    /// Act on screened matches, best score first. Returns `true` once the
    /// application limit is reached.
    async fn apply_best(&mut self, tab: &TabId, ctx: &RunContext, screened: Vec<Candidate>) -> bool {
        let threshold = self.settings.confidence_threshold;
        let mut picks: Vec<Candidate> = screened
            .into_iter()
            .filter(|c| {
                c.result.stage == Stage::Deep && c.result.decision && c.result.confidence > threshold
            })
            .collect();
        picks.sort_by(|a, b| b.result.score.cmp(&a.result.score));

        let max = self.settings.max_applications;
        let mut acted = 0usize;
        for pick in picks {
            if self.cancel.is_cancelled() {
                break;
            }
            if self.applied >= max {
                if acted > 0 {
                    self.return_to(tab, ctx).await;
                }
                return true;
            }
            let Some(link) = pick.record.link.clone() else {
                self.emit(
                    Severity::Warning,
                    format!("no link to apply to {}", pick.record.title),
                );
                continue;
            };
            if acted > 0 {
                tokio::time::sleep(Duration::from_secs(self.settings.apply_delay_seconds)).await;
            }

            let mode = *self.mode.borrow();
            let action = PlannedAction::new(ActionKind::ApplyBest, "application sent")
                .with_param("link", json!(link))
                .with_param("submit", json!(mode.is_live()));
            let result = self.execute_with_retry(tab, &action, ctx).await;
            acted += 1;

            if !result.success {
                self.report_failure(&result);
                continue;
            }
            self.applied += 1;
            if mode.is_live() {
                if let Err(e) = self.store.increment(keys::APPLICATION_COUNTER).await {
                    warn!(error = %e, "loop.application_counter.persist_failed");
                }
                self.emit(
                    Severity::Success,
                    format!("applied to {} at {}", pick.record.title, pick.record.employer),
                );
            } else {
                self.emit(
                    Severity::Success,
                    format!(
                        "dry run: would apply to {} at {}",
                        pick.record.title, pick.record.employer
                    ),
                );
            }
            self.publish();
        }

        if acted > 0 {
            self.return_to(tab, ctx).await;
        }
        self.applied > 0 && self.applied >= max
    }

    /// Run an action, retrying failures the executor marks retryable. A live
    /// submission is never repeated.
    async fn execute_with_retry(
        &mut self,
        tab: &TabId,
        action: &PlannedAction,
        ctx: &RunContext,
    ) -> ActionResult {
        let submits = action.kind == ActionKind::ApplyBest && action.bool_param("submit") == Some(true);
        let attempts = if submits { 1 } else { self.retry.attempts.max(1) };
        let mut attempt = 1;
        loop {
            let result = self.executor.execute(tab, action, ctx).await;
            if result.success || !result.retryable || attempt >= attempts {
                return result;
            }
            tokio::time::sleep(self.retry.delay_for(attempt)).await;
            attempt += 1;
        }
    }

    async fn return_to(&mut self, tab: &TabId, ctx: &RunContext) {
        if ctx.current_url.is_empty() {
            return;
        }
        let back = PlannedAction::new(ActionKind::Navigate, "back on the results page")
            .with_param("url", json!(ctx.current_url));
        let result = self.execute_with_retry(tab, &back, ctx).await;
        if !result.success {
            self.report_failure(&result);
        }
    }

    async fn mark_processed(&mut self, identity: &str) {
        self.processed.insert(identity.to_string());
        if let Err(e) = self.store.mark_processed(identity).await {
            warn!(%identity, error = %e, "loop.processed.persist_failed");
        }
    }

    fn report_failure(&self, result: &ActionResult) {
        let detail = result.error.as_deref().unwrap_or("unknown error");
        self.emit(Severity::Warning, format!("{}: {detail}", result.message));
    }

    fn emit(&self, severity: Severity, message: impl Into<String>) {
        let event = self.events.emit(severity, message);
        self.status.send_modify(|s| s.last_event = Some(event));
    }

    fn publish(&self) {
        let (iteration, new_listings, evaluated, applied, idle_streak) = (
            self.iteration,
            self.new_listings,
            self.evaluated,
            self.applied,
            self.idle_streak,
        );
        self.status.send_modify(|s| {
            s.iteration = iteration;
            s.new_listings = new_listings;
            s.evaluated = evaluated;
            s.applied = applied;
            s.idle_streak = idle_streak;
        });
    }
}
