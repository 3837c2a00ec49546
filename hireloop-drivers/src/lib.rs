//! Page automation layer.
//!
//! - [`surface::PageSurface`]: the tab-oriented contract the orchestrator drives
//! - [`surface::SurfaceRequest`] and the reply structs: the wire protocol
//! - [`surface::SurfaceError`]: typed failures with a retry classification
//! - [`browser::driver::WebDriverSurface`]: `fantoccini` implementation
//! - [`browser::behavioral::BehavioralEngine`]: human-like timings and typing
pub mod browser;
pub mod surface;

pub use browser::driver::WebDriverSurface;
pub use surface::{
    decode, AckReply, ApplicantFields, ApplyReply, ListingsReply, PageSurface, PingReply,
    RawDetail, RawListing, SurfaceError, SurfaceRequest, TabId,
};
