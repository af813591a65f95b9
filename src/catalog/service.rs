//! CatalogService: read-side views over events and registrations.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;

use crate::error::DatabaseError;
use crate::messages;
use crate::store::Database;

use super::render::{render_schedule, render_statistics};

/// One attendee row in the export report.
#[derive(Debug, Clone, Serialize)]
pub struct Attendee {
    pub full_name: String,
    pub phone: Option<String>,
}

/// One event with its attendees in the export report.
#[derive(Debug, Clone, Serialize)]
pub struct EventReport {
    pub id: i64,
    pub name: String,
    pub date: DateTime<Utc>,
    pub attendees: Vec<Attendee>,
}

/// Lists events and registrations and renders them for display.
pub struct CatalogService {
    db: Arc<dyn Database>,
    offset: FixedOffset,
}

impl CatalogService {
    pub fn new(db: Arc<dyn Database>, offset: FixedOffset) -> Self {
        Self { db, offset }
    }

    /// Rendered catalog, or the "nothing scheduled" message.
    pub async fn list_upcoming(&self) -> Result<String, DatabaseError> {
        let events = self.db.list_events().await?;
        if events.is_empty() {
            return Ok(messages::NO_EVENTS.to_string());
        }
        Ok(render_schedule(&events, self.offset))
    }

    /// Rendered schedule of one user's registrations, or the
    /// "not registered" message.
    pub async fn list_for_user(&self, user_id: i64) -> Result<String, DatabaseError> {
        let events = self.db.list_registrations_for_user(user_id).await?;
        if events.is_empty() {
            return Ok(messages::NOT_REGISTERED.to_string());
        }
        Ok(render_schedule(&events, self.offset))
    }

    /// Registration counts per event, headed and enumerated.
    pub async fn statistics(&self) -> Result<String, DatabaseError> {
        let counts = self.db.count_registrations_per_event().await?;
        Ok(format!(
            "{}{}",
            messages::STATISTICS_HEADER,
            render_statistics(&counts)
        ))
    }

    /// Every event with its attendees, as pretty-printed JSON.
    pub async fn export_report(&self) -> Result<Vec<u8>, DatabaseError> {
        let report: Vec<EventReport> = self
            .db
            .list_event_attendees()
            .await?
            .into_iter()
            .map(|(event, users)| EventReport {
                id: event.id,
                name: event.name,
                date: event.starts_at,
                attendees: users
                    .into_iter()
                    .map(|u| Attendee {
                        full_name: u.full_name,
                        phone: u.phone,
                    })
                    .collect(),
            })
            .collect();

        serde_json::to_vec_pretty(&report).map_err(|e| DatabaseError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Event, LibSqlBackend};
    use chrono::TimeZone;

    fn event(id: i64, name: &str, d: u32, h: u32) -> Event {
        Event {
            id,
            name: name.into(),
            starts_at: Utc.with_ymd_and_hms(2024, 5, d, h, 0, 0).unwrap(),
            description: String::new(),
        }
    }

    async fn setup() -> (CatalogService, Arc<dyn Database>) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let catalog = CatalogService::new(Arc::clone(&db), FixedOffset::east_opt(0).unwrap());
        (catalog, db)
    }

    #[tokio::test]
    async fn empty_catalog_message() {
        let (catalog, _) = setup().await;
        assert_eq!(catalog.list_upcoming().await.unwrap(), messages::NO_EVENTS);
    }

    #[tokio::test]
    async fn upcoming_renders_all_events() {
        let (catalog, db) = setup().await;
        db.upsert_event(&event(2, "Concert", 21, 20)).await.unwrap();
        db.upsert_event(&event(1, "Opening", 21, 18)).await.unwrap();
        db.upsert_event(&event(3, "Breakfast", 22, 9)).await.unwrap();

        let text = catalog.list_upcoming().await.unwrap();
        assert_eq!(text.matches("<b>").count(), 2);
        let opening = text.find("Opening").unwrap();
        let concert = text.find("Concert").unwrap();
        assert!(opening < concert);
    }

    #[tokio::test]
    async fn user_view_lists_only_registrations() {
        let (catalog, db) = setup().await;
        db.upsert_event(&event(1, "Opening", 21, 18)).await.unwrap();
        db.upsert_event(&event(2, "Concert", 21, 20)).await.unwrap();
        let user = db.create_user("1", "Ann").await.unwrap();

        assert_eq!(catalog.list_for_user(user.id).await.unwrap(), messages::NOT_REGISTERED);

        db.create_registration(user.id, 2).await.unwrap();
        let text = catalog.list_for_user(user.id).await.unwrap();
        assert!(text.contains("Concert"));
        assert!(!text.contains("Opening"));
    }

    #[tokio::test]
    async fn statistics_in_catalog_order() {
        let (catalog, db) = setup().await;
        db.upsert_event(&event(1, "A", 21, 18)).await.unwrap();
        db.upsert_event(&event(2, "B", 21, 20)).await.unwrap();
        for identity in ["1", "2", "3"] {
            let user = db.create_user(identity, "X").await.unwrap();
            db.create_registration(user.id, 1).await.unwrap();
        }

        assert_eq!(
            catalog.statistics().await.unwrap(),
            "Statistics:\n1) A: 3\n\n2) B: 0\n\n"
        );
    }

    #[tokio::test]
    async fn export_lists_attendees() {
        let (catalog, db) = setup().await;
        db.upsert_event(&event(1, "A", 21, 18)).await.unwrap();
        let user = db.create_user("1", "Ann").await.unwrap();
        db.update_user_phone(user.id, "+79991234567").await.unwrap();
        db.create_registration(user.id, 1).await.unwrap();

        let bytes = catalog.export_report().await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json[0]["name"], "A");
        assert_eq!(json[0]["attendees"][0]["full_name"], "Ann");
        assert_eq!(json[0]["attendees"][0]["phone"], "+79991234567");
    }
}
