//! Unified `Database` trait: single async interface for all persistence.
//!
//! Users, events, registrations and conversation sessions all go through
//! this trait so that the bot and the notifier never see SQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DatabaseError;

/// A person talking to the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Internal numeric id.
    pub id: i64,
    /// Stable external chat identifier.
    pub identity: String,
    pub full_name: String,
    pub phone: Option<String>,
}

impl User {
    /// Both identity fields are recorded.
    pub fn is_complete(&self) -> bool {
        !self.full_name.is_empty() && self.phone.is_some()
    }
}

/// A scheduled event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub name: String,
    #[serde(rename = "date")]
    pub starts_at: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
}

/// A user's intent to attend an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub id: i64,
    pub user_id: i64,
    pub event_id: i64,
    pub notified: bool,
}

/// A not-yet-notified registration joined with its user and event.
#[derive(Debug, Clone)]
pub struct PendingReminder {
    pub registration_id: i64,
    pub user_id: i64,
    pub identity: String,
    pub event: Event,
}

/// Bounds on event start time for the reminder query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartWindow {
    pub from: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

/// Backend-agnostic database trait covering users, events, registrations
/// and sessions.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Users ───────────────────────────────────────────────────────

    /// Look up a user by external identity.
    async fn find_user_by_identity(&self, identity: &str) -> Result<Option<User>, DatabaseError>;

    /// Create a user with a full name.
    ///
    /// If a user with the same identity already exists it is returned
    /// unchanged: the name is set once.
    async fn create_user(&self, identity: &str, full_name: &str) -> Result<User, DatabaseError>;

    /// Record the user's phone number.
    async fn update_user_phone(&self, user_id: i64, phone: &str) -> Result<(), DatabaseError>;

    /// All users, oldest first.
    async fn list_users(&self) -> Result<Vec<User>, DatabaseError>;

    // ── Events ──────────────────────────────────────────────────────

    /// All events ordered by start time ascending.
    async fn list_events(&self) -> Result<Vec<Event>, DatabaseError>;

    /// Get an event by id.
    async fn get_event(&self, id: i64) -> Result<Option<Event>, DatabaseError>;

    /// Insert or update an event keyed by id.
    async fn upsert_event(&self, event: &Event) -> Result<(), DatabaseError>;

    /// Delete every registration and event. Returns the number of events removed.
    async fn delete_all_events(&self) -> Result<usize, DatabaseError>;

    // ── Registrations ───────────────────────────────────────────────

    /// Find the registration for a (user, event) pair.
    async fn find_registration(
        &self,
        user_id: i64,
        event_id: i64,
    ) -> Result<Option<Registration>, DatabaseError>;

    /// Insert a registration with `notified = false`.
    ///
    /// Returns `None` when the pair is already registered; the uniqueness
    /// constraint decides, not a prior read.
    async fn create_registration(
        &self,
        user_id: i64,
        event_id: i64,
    ) -> Result<Option<Registration>, DatabaseError>;

    /// Events the user is registered to, ordered by start time.
    async fn list_registrations_for_user(&self, user_id: i64) -> Result<Vec<Event>, DatabaseError>;

    /// Registration count per event, in catalog order.
    async fn count_registrations_per_event(&self) -> Result<Vec<(Event, i64)>, DatabaseError>;

    /// Every event with its registered users, in catalog order.
    async fn list_event_attendees(&self) -> Result<Vec<(Event, Vec<User>)>, DatabaseError>;

    /// Registrations with `notified = false`, optionally restricted to events
    /// starting inside `window`. Ordered by user, then event start.
    async fn list_pending_reminders(
        &self,
        window: Option<StartWindow>,
    ) -> Result<Vec<PendingReminder>, DatabaseError>;

    /// Set `notified = true` if it is currently false.
    ///
    /// Returns whether this call flipped the flag.
    async fn mark_registration_notified(&self, registration_id: i64) -> Result<bool, DatabaseError>;

    // ── Sessions ────────────────────────────────────────────────────

    /// Raw persisted session state for an identity.
    async fn get_session(&self, identity: &str) -> Result<Option<String>, DatabaseError>;

    /// Store the session state for an identity.
    async fn set_session(&self, identity: &str, state: &str) -> Result<(), DatabaseError>;

    /// Remove the session for an identity. Returns whether a row existed.
    async fn clear_session(&self, identity: &str) -> Result<bool, DatabaseError>;
}
