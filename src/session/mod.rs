//! Per-user conversation sessions: what input the bot is waiting for.
//!
//! An entry is created on first contact, updated by onboarding, and
//! removed once the user reaches the ready state. There is no expiry.

pub mod state;
pub mod store;

pub use state::SessionState;
pub use store::{DbSessionStore, MemorySessionStore, SessionStore};
