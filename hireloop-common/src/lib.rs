//! Common types and utilities shared across hireloop crates.
//!
//! This crate holds the workspace-wide error type and the observability
//! bootstrap. It stays dependency-light so every other crate can pull it in
//! without dragging the async stack along.
//!
//! - [`HireloopError`] and [`Result`]: errors surfaced by the control plane
//! - [`observability`]: centralised `tracing` initialisation
//! - [`LogFormat`]: text vs. JSON log encoding (shared with the config crate)
//!
//! # Examples
//!
//! ```rust
//! use hireloop_common::{HireloopError, Result};
//!
//! fn guard(running: bool) -> Result<()> {
//!     if running {
//!         return Err(HireloopError::AlreadyRunning);
//!     }
//!     Ok(())
//! }
//!
//! assert!(guard(false).is_ok());
//! assert_eq!(guard(true).unwrap_err().to_string(), "orchestrator is already running");
//! ```
use serde::{Deserialize, Serialize};

pub mod observability;

/// Output encoding for structured logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Error types surfaced by the orchestrator's control plane.
///
/// Component-level failures (page surface, completion service) have their
/// own typed errors in their crates and are converted into structured
/// results before they ever reach this type.
#[derive(thiserror::Error, Debug)]
pub enum HireloopError {
    /// Configuration was incomplete or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// `start` was requested while a loop task is still live.
    #[error("orchestrator is already running")]
    AlreadyRunning,

    /// `stop` was requested with no loop task.
    #[error("orchestrator is not running")]
    NotRunning,

    /// A tab resource id is not tracked.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// The persisted state store failed.
    #[error("store error: {0}")]
    Store(String),

    /// An actor mailbox or reply channel was dropped.
    #[error("mailbox closed: {0}")]
    Mailbox(String),

    /// Anything else bubbling up from glue code.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenient alias for results that use [`HireloopError`].
pub type Result<T> = std::result::Result<T, HireloopError>;
