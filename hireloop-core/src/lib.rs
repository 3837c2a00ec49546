//! The hireloop orchestration core.
//!
//! - [`tracker`]: tab registry with reuse, readiness polling and reclaiming
//! - [`extractor`]: listing and detail extraction with de-duplication
//! - [`evaluator`]: two-stage screening over a [`hireloop_llm::CompletionClient`]
//! - [`planner`]: rule-based plans over a closed action vocabulary
//! - [`executor`]: one action at a time against a [`hireloop_drivers::PageSurface`]
//! - [`runloop`]: the control loop tying them together
//! - [`control`]: the actor that starts, stops and inspects runs
pub mod clock;
pub mod control;
pub mod evaluator;
pub mod events;
pub mod executor;
pub mod extractor;
pub mod listing;
pub mod metadata;
pub mod model;
pub mod parse;
pub mod planner;
pub mod prompts;
pub mod retry;
pub mod runloop;
pub mod tracker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use control::{
    ClientFactory, ConfigClientFactory, ControlActor, ControlHandle, ControlMsg, ControlParts,
};
pub use evaluator::{Evaluator, EvaluatorConfig};
pub use events::{EventBus, Severity, StatusEvent};
pub use executor::{ActionExecutor, ActionOutput, ActionResult, ExecutorState, SettleDelays};
pub use extractor::{
    ContentExtractor, DetailOutcome, DetailQuality, ExtractorConfig, ListingsPage,
};
pub use model::{
    EvalSource, EvaluationResult, ListingMetadata, ListingRecord, PageType, RunContext, Stage,
    UserPreferences, UserProfile,
};
pub use parse::parse_result;
pub use planner::{ActionKind, Plan, PlannedAction, Planner};
pub use retry::RetryPolicy;
pub use runloop::{LoopDeps, RunLoop, RunOutcome, RunState, RunStatus};
pub use tracker::{ResourceTracker, TabResource, TabStatus, TrackerConfig};
