//! The page automation contract: a tab-oriented surface that accepts typed
//! requests and answers with JSON payloads.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque tab handle issued by the surface.
pub type TabId = String;

/// Requests understood by every surface, tagged by action name on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SurfaceRequest {
    Ping,
    Navigate { url: String },
    PerformSearch { keywords: String, location: String },
    ExtractListings,
    ExtractDetail,
    ExpandDetail,
    OpenListing { link: String },
    NavigateNextPage,
    GoBack,
    Scroll { pixels: i64 },
    Apply {
        link: String,
        submit: bool,
        applicant: ApplicantFields,
    },
}

impl SurfaceRequest {
    pub fn action(&self) -> &'static str {
        match self {
            SurfaceRequest::Ping => "ping",
            SurfaceRequest::Navigate { .. } => "navigate",
            SurfaceRequest::PerformSearch { .. } => "performSearch",
            SurfaceRequest::ExtractListings => "extractListings",
            SurfaceRequest::ExtractDetail => "extractDetail",
            SurfaceRequest::ExpandDetail => "expandDetail",
            SurfaceRequest::OpenListing { .. } => "openListing",
            SurfaceRequest::NavigateNextPage => "navigateNextPage",
            SurfaceRequest::GoBack => "goBack",
            SurfaceRequest::Scroll { .. } => "scroll",
            SurfaceRequest::Apply { .. } => "apply",
        }
    }
}

/// Contact fields filled into an application form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicantFields {
    pub full_name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PingReply {
    pub ready: bool,
    pub url: String,
    pub listing_count: usize,
}

/// One listing card as scraped, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawListing {
    pub title: String,
    pub company: String,
    pub location: String,
    pub link: Option<String>,
    pub snippet: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingsReply {
    pub listings: Vec<RawListing>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawDetail {
    pub description: String,
    pub requirements: Option<String>,
    pub benefits: Option<String>,
    pub compensation: Option<String>,
}

/// Generic acknowledgement for side-effect requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AckReply {
    pub ok: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplyReply {
    pub submitted: bool,
    pub message: Option<String>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SurfaceError {
    #[error("page not ready: {0}")]
    NotReady(String),
    #[error("surface disconnected: {0}")]
    Disconnected(String),
    #[error("tab closed: {0}")]
    TabClosed(TabId),
    #[error("page script failed: {0}")]
    Script(String),
    #[error("malformed reply: {0}")]
    Malformed(String),
}

impl SurfaceError {
    /// Transport-level failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SurfaceError::NotReady(_) | SurfaceError::Disconnected(_))
    }
}

/// Decode a reply payload into its typed form.
pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T, SurfaceError> {
    serde_json::from_value(value).map_err(|e| SurfaceError::Malformed(e.to_string()))
}

#[async_trait]
pub trait PageSurface: Send + Sync {
    /// Open a new tab on `url` and return its handle.
    async fn open_tab(&self, url: &str) -> Result<TabId, SurfaceError>;

    async fn close_tab(&self, tab: &TabId) -> Result<(), SurfaceError>;

    async fn send(&self, tab: &TabId, request: SurfaceRequest) -> Result<Value, SurfaceError>;
}
