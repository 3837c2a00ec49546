//! Rule-based step generation.
use crate::model::RunContext;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    Navigate,
    Search,
    Extract,
    Analyze,
    ApplyBest,
    NextPage,
    Scroll,
    GoBack,
    Wait,
    Complete,
}

impl ActionKind {
    pub const ALL: [ActionKind; 10] = [
        ActionKind::Navigate,
        ActionKind::Search,
        ActionKind::Extract,
        ActionKind::Analyze,
        ActionKind::ApplyBest,
        ActionKind::NextPage,
        ActionKind::Scroll,
        ActionKind::GoBack,
        ActionKind::Wait,
        ActionKind::Complete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Navigate => "NAVIGATE",
            ActionKind::Search => "SEARCH",
            ActionKind::Extract => "EXTRACT",
            ActionKind::Analyze => "ANALYZE",
            ActionKind::ApplyBest => "APPLY_BEST",
            ActionKind::NextPage => "NEXT_PAGE",
            ActionKind::Scroll => "SCROLL",
            ActionKind::GoBack => "GO_BACK",
            ActionKind::Wait => "WAIT",
            ActionKind::Complete => "COMPLETE",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action kind: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for ActionKind {
    type Err = UnknownAction;

    /// Case-insensitive; `-` and spaces count as `_`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        ActionKind::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedAction {
    pub kind: ActionKind,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub expected_outcome: String,
}

impl PlannedAction {
    pub fn new(kind: ActionKind, expected_outcome: impl Into<String>) -> Self {
        Self {
            kind,
            parameters: Map::new(),
            expected_outcome: expected_outcome.into(),
        }
    }

    pub fn with_param(mut self, key: &str, value: Value) -> Self {
        self.parameters.insert(key.to_string(), value);
        self
    }

    pub fn str_param(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }

    pub fn u64_param(&self, key: &str) -> Option<u64> {
        self.parameters.get(key).and_then(Value::as_u64)
    }

    pub fn i64_param(&self, key: &str) -> Option<i64> {
        self.parameters.get(key).and_then(Value::as_i64)
    }

    pub fn bool_param(&self, key: &str) -> Option<bool> {
        self.parameters.get(key).and_then(Value::as_bool)
    }
}

/// An ordered list of actions consumed front to back.
#[derive(Debug, Clone)]
pub struct Plan {
    actions: Vec<PlannedAction>,
    cursor: usize,
    max_steps: usize,
    fallback: bool,
}

impl Plan {
    pub fn new(actions: Vec<PlannedAction>, max_steps: usize) -> Self {
        Self {
            actions,
            cursor: 0,
            max_steps,
            fallback: false,
        }
    }

    /// `[SEARCH, EXTRACT]`, used whenever plan construction fails.
    pub fn fallback(max_steps: usize) -> Self {
        Self {
            actions: vec![
                PlannedAction::new(ActionKind::Search, "results page for the saved query"),
                PlannedAction::new(ActionKind::Extract, "listings on the page"),
            ],
            cursor: 0,
            max_steps,
            fallback: true,
        }
    }

    /// Next action, advancing the cursor. `None` once complete.
    pub fn next_action(&mut self) -> Option<PlannedAction> {
        if self.is_complete() {
            return None;
        }
        let action = self.actions.get(self.cursor).cloned();
        self.cursor += 1;
        action
    }

    pub fn is_complete(&self) -> bool {
        self.cursor >= self.actions.len() || self.cursor >= self.max_steps
    }

    /// Jump the cursor to the end.
    pub fn finish(&mut self) {
        self.cursor = self.cursor.max(self.actions.len());
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    pub fn kinds(&self) -> Vec<ActionKind> {
        self.actions.iter().map(|a| a.kind).collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("invalid target url {url:?}: {source}")]
    InvalidTarget {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("search parameters: {0}")]
    Params(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct SearchParams<'a> {
    keywords: &'a str,
    location: &'a str,
}

#[derive(Debug, Clone)]
pub struct Planner {
    max_steps: usize,
}

impl Default for Planner {
    fn default() -> Self {
        Self { max_steps: 100 }
    }
}

impl Planner {
    pub fn new(max_steps: usize) -> Self {
        Self {
            max_steps: max_steps.max(1),
        }
    }

    pub fn next_plan(&self, ctx: &RunContext) -> Plan {
        match self.build(ctx) {
            Ok(actions) => {
                let plan = Plan::new(actions, self.max_steps);
                debug!(kinds = ?plan.kinds(), page = ?ctx.page_type, "planner.plan");
                plan
            }
            Err(e) => {
                warn!(error = %e, "planner.fallback");
                Plan::fallback(self.max_steps)
            }
        }
    }

    fn build(&self, ctx: &RunContext) -> Result<Vec<PlannedAction>, PlanError> {
        let target = Url::parse(ctx.target_url.trim()).map_err(|source| PlanError::InvalidTarget {
            url: ctx.target_url.clone(),
            source,
        })?;
        let search = serde_json::to_value(SearchParams {
            keywords: &ctx.search_query,
            location: &ctx.location,
        })?;

        let mut actions = Vec::with_capacity(8);
        if !ctx.page_type.is_on_site() {
            actions.push(
                PlannedAction::new(ActionKind::Navigate, "on the target site")
                    .with_param("url", json!(target.as_str())),
            );
        }
        if ctx.jobs_found_count == 0 {
            let mut search_action = PlannedAction::new(ActionKind::Search, "results for the query");
            if let Value::Object(params) = search {
                search_action.parameters = params;
            }
            actions.push(search_action);
            actions.push(PlannedAction::new(ActionKind::Wait, "results rendered"));
        }
        actions.extend([
            PlannedAction::new(ActionKind::Extract, "unseen listings"),
            PlannedAction::new(ActionKind::Analyze, "screened listings"),
            PlannedAction::new(ActionKind::ApplyBest, "applications for strong matches"),
            PlannedAction::new(ActionKind::NextPage, "next results page"),
        ]);
        Ok(actions)
    }
}
