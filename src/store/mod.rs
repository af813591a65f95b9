//! Persistence layer: libSQL-backed storage for users, events,
//! registrations and conversation sessions.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{Database, Event, PendingReminder, Registration, StartWindow, User};
