//! # Interview Sessions
//!
//! - **model**: conversation messages, sessions and the history shape check
//! - **store**: persistence interface and its memory/sled backends
//! - **lifecycle**: creating a new session from the greeting assets

pub mod lifecycle;
pub mod model;
pub mod store;

pub use lifecycle::{LifecycleError, SessionLifecycle};
pub use store::{InMemorySessionStore, SessionStore, SledSessionStore};
