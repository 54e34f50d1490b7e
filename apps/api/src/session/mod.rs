//! Voice session lifecycle.
//!
//! A session is live in this process: the state machine, its timer, and the
//! health math all run against an in-memory registry, with `voice_sessions`
//! rows as the persisted mirror. Terminal states are immutable; every
//! transition re-checks status under the registry lock, so a timer firing
//! late or a duplicate completion call is a no-op rather than a double bill.

pub mod controller;
pub mod errors;
pub mod handlers;
pub mod store;
pub mod transcript;
