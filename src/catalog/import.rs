//! Event import from a JSON file: `[{id, name, date, description}]`.

use std::path::Path;

use crate::error::{DatabaseError, Error};
use crate::store::{Database, Event};

/// Counts from one import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub deleted: usize,
    pub upserted: usize,
}

/// Parse an event list.
pub fn parse_events(json: &str) -> Result<Vec<Event>, DatabaseError> {
    serde_json::from_str(json).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

/// Upsert every event by id. With `delete_all`, registrations and events are
/// wiped first.
pub async fn import_events(
    db: &dyn Database,
    events: &[Event],
    delete_all: bool,
) -> Result<ImportReport, DatabaseError> {
    let mut report = ImportReport::default();
    if delete_all {
        report.deleted = db.delete_all_events().await?;
        tracing::info!(deleted = report.deleted, "Deleted existing events");
    }
    for event in events {
        db.upsert_event(event).await?;
        report.upserted += 1;
    }
    Ok(report)
}

/// Read `path` and import its events.
pub async fn import_file(
    db: &dyn Database,
    path: &Path,
    delete_all: bool,
) -> Result<ImportReport, Error> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(crate::error::ConfigError::Io)?;
    let events = parse_events(&raw)?;
    let report = import_events(db, &events, delete_all).await?;
    tracing::info!(
        path = %path.display(),
        upserted = report.upserted,
        "Imported events"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;

    const SAMPLE: &str = r#"[
        {"id": 1, "name": "Opening", "date": "2024-05-21T18:00:00.000Z", "description": "Main hall"},
        {"id": 2, "name": "Concert", "date": "2024-05-21T20:00:00Z"}
    ]"#;

    #[test]
    fn parses_sample() {
        let events = parse_events(SAMPLE).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].description, "Main hall");
        assert_eq!(events[1].description, "");
        assert_eq!(events[1].starts_at.to_rfc3339(), "2024-05-21T20:00:00+00:00");
    }

    #[test]
    fn rejects_malformed() {
        assert!(matches!(
            parse_events(r#"[{"id": "x"}]"#),
            Err(DatabaseError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn import_upserts_by_id() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let events = parse_events(SAMPLE).unwrap();

        let report = import_events(&db, &events, false).await.unwrap();
        assert_eq!(report, ImportReport { deleted: 0, upserted: 2 });

        let mut renamed = events.clone();
        renamed[0].name = "Grand opening".into();
        import_events(&db, &renamed, false).await.unwrap();

        let stored = db.list_events().await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].name, "Grand opening");
    }

    #[tokio::test]
    async fn delete_all_wipes_first() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let events = parse_events(SAMPLE).unwrap();
        import_events(&db, &events, false).await.unwrap();

        let report = import_events(&db, &events[1..], true).await.unwrap();
        assert_eq!(report, ImportReport { deleted: 2, upserted: 1 });
        assert_eq!(db.list_events().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn import_file_reads_json() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        std::fs::write(&path, SAMPLE).unwrap();

        let report = import_file(&db, &path, false).await.unwrap();
        assert_eq!(report.upserted, 2);
    }
}
