//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. Timestamps are stored as
//! RFC 3339 UTC strings with second precision so that lexical order equals
//! chronological order.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{Database, Event, PendingReminder, Registration, StartWindow, User};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to enable foreign keys: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical write format for timestamps.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(ndt.and_utc());
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(ndt.and_utc());
    }
    Err(DatabaseError::Serialization(format!(
        "unparsable timestamp {s:?}"
    )))
}

fn query_err(op: &str) -> impl Fn(libsql::Error) -> DatabaseError + '_ {
    move |e| DatabaseError::Query(format!("{op}: {e}"))
}

/// Map a libsql Row to a User.
///
/// Column order matches USER_COLUMNS starting at `offset`.
fn row_to_user(row: &libsql::Row, offset: i32) -> Result<User, libsql::Error> {
    Ok(User {
        id: row.get(offset)?,
        identity: row.get(offset + 1)?,
        full_name: row.get(offset + 2)?,
        phone: row.get::<Option<String>>(offset + 3)?,
    })
}

/// Map a libsql Row to an Event.
///
/// Column order matches EVENT_COLUMNS starting at `offset`.
fn row_to_event(row: &libsql::Row, offset: i32, op: &str) -> Result<Event, DatabaseError> {
    let starts_str: String = row.get(offset + 2).map_err(query_err(op))?;
    Ok(Event {
        id: row.get(offset).map_err(query_err(op))?,
        name: row.get(offset + 1).map_err(query_err(op))?,
        starts_at: parse_datetime(&starts_str)?,
        description: row
            .get::<Option<String>>(offset + 3)
            .map_err(query_err(op))?
            .unwrap_or_default(),
    })
}

fn row_to_registration(row: &libsql::Row) -> Result<Registration, libsql::Error> {
    let notified: i64 = row.get(3)?;
    Ok(Registration {
        id: row.get(0)?,
        user_id: row.get(1)?,
        event_id: row.get(2)?,
        notified: notified != 0,
    })
}

// ── Trait implementation ────────────────────────────────────────────

const USER_COLUMNS: &str = "id, identity, full_name, phone";

const EVENT_COLUMNS: &str = "id, name, starts_at, description";

const REGISTRATION_COLUMNS: &str = "id, user_id, event_id, notified";

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Users ───────────────────────────────────────────────────────

    async fn find_user_by_identity(&self, identity: &str) -> Result<Option<User>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE identity = ?1"),
                params![identity],
            )
            .await
            .map_err(query_err("find_user_by_identity"))?;

        match rows.next().await.map_err(query_err("find_user_by_identity"))? {
            Some(row) => Ok(Some(
                row_to_user(&row, 0).map_err(query_err("find_user_by_identity"))?,
            )),
            None => Ok(None),
        }
    }

    async fn create_user(&self, identity: &str, full_name: &str) -> Result<User, DatabaseError> {
        let now = format_datetime(&Utc::now());
        let inserted = self
            .conn()
            .execute(
                "INSERT INTO users (identity, full_name, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT (identity) DO NOTHING",
                params![identity, full_name, now],
            )
            .await
            .map_err(query_err("create_user"))?;

        if inserted == 0 {
            debug!(identity, "User already exists, keeping recorded name");
        }

        self.find_user_by_identity(identity)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "user".into(),
                id: identity.to_string(),
            })
    }

    async fn update_user_phone(&self, user_id: i64, phone: &str) -> Result<(), DatabaseError> {
        let now = format_datetime(&Utc::now());
        let updated = self
            .conn()
            .execute(
                "UPDATE users SET phone = ?2, updated_at = ?3 WHERE id = ?1",
                params![user_id, phone, now],
            )
            .await
            .map_err(query_err("update_user_phone"))?;

        if updated == 0 {
            return Err(DatabaseError::NotFound {
                entity: "user".into(),
                id: user_id.to_string(),
            });
        }
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"), ())
            .await
            .map_err(query_err("list_users"))?;

        let mut users = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err("list_users"))? {
            users.push(row_to_user(&row, 0).map_err(query_err("list_users"))?);
        }
        Ok(users)
    }

    // ── Events ──────────────────────────────────────────────────────

    async fn list_events(&self) -> Result<Vec<Event>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY starts_at ASC, id ASC"),
                (),
            )
            .await
            .map_err(query_err("list_events"))?;

        let mut events = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err("list_events"))? {
            events.push(row_to_event(&row, 0, "list_events")?);
        }
        Ok(events)
    }

    async fn get_event(&self, id: i64) -> Result<Option<Event>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(query_err("get_event"))?;

        match rows.next().await.map_err(query_err("get_event"))? {
            Some(row) => Ok(Some(row_to_event(&row, 0, "get_event")?)),
            None => Ok(None),
        }
    }

    async fn upsert_event(&self, event: &Event) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO events (id, name, starts_at, description) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (id) DO UPDATE SET name = ?2, starts_at = ?3, description = ?4",
                params![
                    event.id,
                    event.name.as_str(),
                    format_datetime(&event.starts_at),
                    event.description.as_str()
                ],
            )
            .await
            .map_err(query_err("upsert_event"))?;
        Ok(())
    }

    async fn delete_all_events(&self) -> Result<usize, DatabaseError> {
        self.conn()
            .execute("DELETE FROM registrations", ())
            .await
            .map_err(query_err("delete_all_events"))?;
        let count = self
            .conn()
            .execute("DELETE FROM events", ())
            .await
            .map_err(query_err("delete_all_events"))?;
        Ok(count as usize)
    }

    // ── Registrations ───────────────────────────────────────────────

    async fn find_registration(
        &self,
        user_id: i64,
        event_id: i64,
    ) -> Result<Option<Registration>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {REGISTRATION_COLUMNS} FROM registrations
                     WHERE user_id = ?1 AND event_id = ?2"
                ),
                params![user_id, event_id],
            )
            .await
            .map_err(query_err("find_registration"))?;

        match rows.next().await.map_err(query_err("find_registration"))? {
            Some(row) => Ok(Some(
                row_to_registration(&row).map_err(query_err("find_registration"))?,
            )),
            None => Ok(None),
        }
    }

    async fn create_registration(
        &self,
        user_id: i64,
        event_id: i64,
    ) -> Result<Option<Registration>, DatabaseError> {
        let now = format_datetime(&Utc::now());
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "INSERT INTO registrations (user_id, event_id, notified, created_at)
                     VALUES (?1, ?2, 0, ?3)
                     ON CONFLICT (user_id, event_id) DO NOTHING
                     RETURNING {REGISTRATION_COLUMNS}"
                ),
                params![user_id, event_id, now],
            )
            .await
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("FOREIGN KEY") {
                    DatabaseError::Constraint(format!("create_registration: {msg}"))
                } else {
                    DatabaseError::Query(format!("create_registration: {msg}"))
                }
            })?;

        match rows.next().await.map_err(query_err("create_registration"))? {
            Some(row) => Ok(Some(
                row_to_registration(&row).map_err(query_err("create_registration"))?,
            )),
            None => Ok(None),
        }
    }

    async fn list_registrations_for_user(&self, user_id: i64) -> Result<Vec<Event>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT e.id, e.name, e.starts_at, e.description
                 FROM registrations r JOIN events e ON e.id = r.event_id
                 WHERE r.user_id = ?1
                 ORDER BY e.starts_at ASC, e.id ASC",
                params![user_id],
            )
            .await
            .map_err(query_err("list_registrations_for_user"))?;

        let mut events = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(query_err("list_registrations_for_user"))?
        {
            events.push(row_to_event(&row, 0, "list_registrations_for_user")?);
        }
        Ok(events)
    }

    async fn count_registrations_per_event(&self) -> Result<Vec<(Event, i64)>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT e.id, e.name, e.starts_at, e.description, COUNT(r.id)
                 FROM events e LEFT JOIN registrations r ON r.event_id = e.id
                 GROUP BY e.id
                 ORDER BY e.starts_at ASC, e.id ASC",
                (),
            )
            .await
            .map_err(query_err("count_registrations_per_event"))?;

        let mut counts = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(query_err("count_registrations_per_event"))?
        {
            let event = row_to_event(&row, 0, "count_registrations_per_event")?;
            let count: i64 = row.get(4).map_err(query_err("count_registrations_per_event"))?;
            counts.push((event, count));
        }
        Ok(counts)
    }

    async fn list_event_attendees(&self) -> Result<Vec<(Event, Vec<User>)>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT e.id, e.name, e.starts_at, e.description,
                        u.id, u.identity, u.full_name, u.phone
                 FROM events e
                 LEFT JOIN registrations r ON r.event_id = e.id
                 LEFT JOIN users u ON u.id = r.user_id
                 ORDER BY e.starts_at ASC, e.id ASC, r.id ASC",
                (),
            )
            .await
            .map_err(query_err("list_event_attendees"))?;

        let mut out: Vec<(Event, Vec<User>)> = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err("list_event_attendees"))? {
            let event = row_to_event(&row, 0, "list_event_attendees")?;
            let attendee_id: Option<i64> = row.get(4).map_err(query_err("list_event_attendees"))?;

            if out.last().map(|(e, _)| e.id) != Some(event.id) {
                out.push((event, Vec::new()));
            }
            if attendee_id.is_some() {
                let user = row_to_user(&row, 4).map_err(query_err("list_event_attendees"))?;
                if let Some((_, users)) = out.last_mut() {
                    users.push(user);
                }
            }
        }
        Ok(out)
    }

    async fn list_pending_reminders(
        &self,
        window: Option<StartWindow>,
    ) -> Result<Vec<PendingReminder>, DatabaseError> {
        let base = "SELECT r.id, u.id, u.identity, e.id, e.name, e.starts_at, e.description
                    FROM registrations r
                    JOIN users u ON u.id = r.user_id
                    JOIN events e ON e.id = r.event_id
                    WHERE r.notified = 0";
        let order = "ORDER BY u.id ASC, e.starts_at ASC, e.id ASC";

        let mut rows = match window {
            Some(w) => {
                self.conn()
                    .query(
                        &format!("{base} AND e.starts_at >= ?1 AND e.starts_at <= ?2 {order}"),
                        params![format_datetime(&w.from), format_datetime(&w.until)],
                    )
                    .await
            }
            None => self.conn().query(&format!("{base} {order}"), ()).await,
        }
        .map_err(query_err("list_pending_reminders"))?;

        let mut pending = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err("list_pending_reminders"))? {
            pending.push(PendingReminder {
                registration_id: row.get(0).map_err(query_err("list_pending_reminders"))?,
                user_id: row.get(1).map_err(query_err("list_pending_reminders"))?,
                identity: row.get(2).map_err(query_err("list_pending_reminders"))?,
                event: row_to_event(&row, 3, "list_pending_reminders")?,
            });
        }
        Ok(pending)
    }

    async fn mark_registration_notified(&self, registration_id: i64) -> Result<bool, DatabaseError> {
        let updated = self
            .conn()
            .execute(
                "UPDATE registrations SET notified = 1 WHERE id = ?1 AND notified = 0",
                params![registration_id],
            )
            .await
            .map_err(query_err("mark_registration_notified"))?;
        Ok(updated > 0)
    }

    // ── Sessions ────────────────────────────────────────────────────

    async fn get_session(&self, identity: &str) -> Result<Option<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT state FROM sessions WHERE identity = ?1",
                params![identity],
            )
            .await
            .map_err(query_err("get_session"))?;

        match rows.next().await.map_err(query_err("get_session"))? {
            Some(row) => Ok(Some(row.get(0).map_err(query_err("get_session"))?)),
            None => Ok(None),
        }
    }

    async fn set_session(&self, identity: &str, state: &str) -> Result<(), DatabaseError> {
        let now = format_datetime(&Utc::now());
        self.conn()
            .execute(
                "INSERT INTO sessions (identity, state, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (identity) DO UPDATE SET state = ?2, updated_at = ?3",
                params![identity, state, now],
            )
            .await
            .map_err(query_err("set_session"))?;
        Ok(())
    }

    async fn clear_session(&self, identity: &str) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute("DELETE FROM sessions WHERE identity = ?1", params![identity])
            .await
            .map_err(query_err("clear_session"))?;
        Ok(count > 0)
    }
}
