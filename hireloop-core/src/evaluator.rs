//! Two-stage screening against the completion service.
//!
//! Stage one (`prescreen`) is a cheap gate over the listing card; stage two
//! (`deep_screen`) reads the full posting and is authoritative. Completion
//! failures never escape: they become a rejected result with
//! [`EvalSource::Failure`].
use crate::model::{
    EvalSource, EvaluationResult, ListingRecord, Remoteness, Stage, UserPreferences, UserProfile,
};
use crate::parse::parse_result;
use crate::prompts::{deep_prompt, prescreen_prompt, SYSTEM_PROMPT};
use futures::future::join_all;
use hireloop_actors::{acquire_permit, Addr, RateKey, RateLimiter};
use hireloop_llm::SharedCompletionClient;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    pub batch_size: usize,
    pub inter_batch_delay: Duration,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            batch_size: 3,
            inter_batch_delay: Duration::from_secs(2),
        }
    }
}

impl EvaluatorConfig {
    pub fn from_config(config: &hireloop_config::OrchestratorConfig) -> Self {
        Self {
            batch_size: config.prescreen_batch_size.max(1),
            inter_batch_delay: Duration::from_millis(config.inter_batch_delay_ms),
        }
    }
}

pub struct Evaluator {
    client: SharedCompletionClient,
    limiter: Option<(Addr<RateLimiter>, RateKey)>,
    config: EvaluatorConfig,
}

impl Evaluator {
    pub fn new(client: SharedCompletionClient, config: EvaluatorConfig) -> Self {
        Self {
            client,
            limiter: None,
            config,
        }
    }

    /// Take a permit from `limiter` before every completion call.
    pub fn with_rate_limiter(mut self, limiter: Addr<RateLimiter>, key: RateKey) -> Self {
        self.limiter = Some((limiter, key));
        self
    }

    pub async fn prescreen(
        &self,
        record: &ListingRecord,
        profile: &UserProfile,
        prefs: &UserPreferences,
    ) -> EvaluationResult {
        if let Some(rejected) = preference_gate(record, prefs) {
            debug!(identity = %record.identity, rationale = %rejected.rationale, "evaluator.prescreen.excluded");
            return rejected;
        }
        let prompt = prescreen_prompt(record, profile, prefs);
        self.complete(Stage::Prescreen, &record.identity, &prompt).await
    }

    pub async fn deep_screen(
        &self,
        record: &ListingRecord,
        resume_text: &str,
        profile: &UserProfile,
        prefs: &UserPreferences,
    ) -> EvaluationResult {
        let prompt = deep_prompt(record, resume_text, profile, prefs);
        self.complete(Stage::Deep, &record.identity, &prompt).await
    }

    /// Prescreen `records` in fixed-size concurrent batches with a pause
    /// between batches. Results line up with `records`.
    pub async fn prescreen_batch(
        &self,
        records: &[ListingRecord],
        profile: &UserProfile,
        prefs: &UserPreferences,
    ) -> Vec<EvaluationResult> {
        let mut results = Vec::with_capacity(records.len());
        let mut batches = records.chunks(self.config.batch_size.max(1)).peekable();
        while let Some(batch) = batches.next() {
            let screened = join_all(batch.iter().map(|r| self.prescreen(r, profile, prefs))).await;
            results.extend(screened);
            if batches.peek().is_some() {
                tokio::time::sleep(self.config.inter_batch_delay).await;
            }
        }
        results
    }

    async fn complete(&self, stage: Stage, identity: &str, prompt: &str) -> EvaluationResult {
        if let Some((limiter, key)) = &self.limiter {
            if let Err(e) = acquire_permit(limiter, key).await {
                warn!(error = %e, "evaluator.rate_limiter.unavailable");
            }
        }
        match self
            .client
            .generate(prompt, Some(SYSTEM_PROMPT), None, None)
            .await
        {
            Ok(response) => {
                let result = parse_result(&response.text, stage);
                debug!(
                    %identity,
                    ?stage,
                    decision = result.decision,
                    confidence = result.confidence,
                    score = result.score,
                    source = ?result.source,
                    "evaluator.result"
                );
                result
            }
            Err(e) => {
                warn!(%identity, ?stage, error = %e, "evaluator.completion.failed");
                EvaluationResult::failure(stage, e.to_string())
            }
        }
    }
}

/// Hard preference conflicts that need no model call.
fn preference_gate(record: &ListingRecord, prefs: &UserPreferences) -> Option<EvaluationResult> {
    let haystack = format!(
        "{} {} {}",
        record.title, record.employer, record.short_description
    )
    .to_lowercase();
    let excluded = prefs
        .excluded_terms
        .iter()
        .map(|t| t.trim())
        .find(|t| !t.is_empty() && haystack.contains(&t.to_lowercase()));

    let rationale = match excluded {
        Some(term) => format!("excluded term: {term}"),
        None if prefs.remote_only && record.metadata.remoteness == Remoteness::Onsite => {
            "on-site role, remote only".to_string()
        }
        None => return None,
    };
    Some(EvaluationResult {
        decision: false,
        confidence: 1.0,
        score: 0,
        rationale,
        stage: Stage::Prescreen,
        source: EvalSource::Heuristic,
    })
}
