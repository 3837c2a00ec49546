//! Actor runtime and shared infrastructure actors.
//!
//! - [`actor`]: `Actor` trait, mailboxes, request/reply helper
//! - [`system::ActorSystem`]: task tracking under one cancellation token
//! - [`rate::RateLimiter`]: token-bucket limiter for completion calls
//! - [`store::StoreActor`] / [`store::StoreHandle`]: SQLite-backed state
pub mod actor;
pub mod rate;
pub mod store;
pub mod system;

pub use actor::{spawn_actor, Actor, ActorHandle, Addr, Context};
pub use rate::{acquire_permit, RateKey, RateLimiter, RateMsg};
pub use store::{keys, StoreActor, StoreHandle, StoreMsg};
pub use system::ActorSystem;
