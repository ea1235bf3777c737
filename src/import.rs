use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use serde::Deserialize;

use crate::engine::{Engine, EngineError, ImportReport};
use crate::model::{RecordStatus, StoredDocument};

/// A legacy export: the two document collections side by side.
/// `bookings` holds approved records, `bookingapproval` the pending ones.
#[derive(Debug, Default, Deserialize)]
pub struct LegacyExport {
    #[serde(default)]
    pub bookings: Vec<StoredDocument>,
    #[serde(default, rename = "bookingapproval")]
    pub booking_approval: Vec<StoredDocument>,
}

impl LegacyExport {
    pub fn parse(json: &str) -> Result<Self, ImportError> {
        serde_json::from_str(json).map_err(ImportError::Json)
    }

    /// Documents tagged with the status their collection implies.
    pub fn into_documents(self) -> Vec<(StoredDocument, RecordStatus)> {
        self.bookings
            .into_iter()
            .map(|d| (d, RecordStatus::Approved))
            .chain(self.booking_approval.into_iter().map(|d| (d, RecordStatus::Pending)))
            .collect()
    }
}

#[derive(Debug)]
pub enum ImportError {
    Io(io::Error),
    Json(serde_json::Error),
    Engine(EngineError),
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportError::Io(e) => write!(f, "reading export: {e}"),
            ImportError::Json(e) => write!(f, "parsing export: {e}"),
            ImportError::Engine(e) => write!(f, "restoring export: {e}"),
        }
    }
}

impl std::error::Error for ImportError {}

/// Load a JSON export file into an engine.
pub async fn import_file(engine: &Engine, path: &Path) -> Result<ImportReport, ImportError> {
    let json = fs::read_to_string(path).map_err(ImportError::Io)?;
    let export = LegacyExport::parse(&json)?;
    tracing::info!(
        path = %path.display(),
        approved = export.bookings.len(),
        pending = export.booking_approval.len(),
        "importing legacy export"
    );
    engine
        .import_documents(export.into_documents())
        .await
        .map_err(ImportError::Engine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Slot, SlotStatus};
    use crate::notify::NotifyHub;
    use chrono::NaiveDate;
    use std::path::PathBuf;
    use std::sync::Arc;

    const EXPORT: &str = r#"{
        "bookings": [
            {"hall": "emerald", "date": "2025-03-10", "slot": "FN (9:00 AM - 1:00 PM)",
             "eventName": "Orientation", "email": "a@ksr.edu"}
        ],
        "bookingapproval": [
            {"hall": "emerald", "date": "2025-03-10", "slot": "AN (1:00 PM - 4:00 PM)",
             "email": "b@ksr.edu"},
            {"hall": "emerald", "slot": "AN"},
            {"hall": "ruby", "date": "2025-03-10", "slot": "EV"}
        ]
    }"#;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("hallres_test_import").join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn collections_imply_status() {
        let docs = LegacyExport::parse(EXPORT).unwrap().into_documents();
        assert_eq!(docs.len(), 4);
        assert_eq!(docs[0].1, RecordStatus::Approved);
        assert!(docs[1..].iter().all(|(_, s)| *s == RecordStatus::Pending));
        assert_eq!(docs[0].0.event_name.as_deref(), Some("Orientation"));
    }

    #[test]
    fn missing_collections_default_empty() {
        let export = LegacyExport::parse("{}").unwrap();
        assert!(export.into_documents().is_empty());
        assert!(matches!(LegacyExport::parse("[1, 2]"), Err(ImportError::Json(_))));
    }

    #[tokio::test]
    async fn import_file_restores_and_skips() {
        let dir = test_dir("file");
        let path = dir.join("export.json");
        fs::write(&path, EXPORT).unwrap();
        let engine = Engine::new(dir.join("t.wal"), Arc::new(NotifyHub::new())).unwrap();

        let report = import_file(&engine, &path).await.unwrap();
        assert_eq!(report, ImportReport { restored: 2, skipped: 2 });

        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        assert_eq!(engine.classify_slot("emerald", date, Slot::Forenoon).await.unwrap(), SlotStatus::Booked);
        assert_eq!(engine.classify_slot("emerald", date, Slot::Afternoon).await.unwrap(), SlotStatus::Pending);
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let dir = test_dir("missing");
        let engine = Engine::new(dir.join("t.wal"), Arc::new(NotifyHub::new())).unwrap();
        let err = import_file(&engine, &dir.join("nope.json")).await.unwrap_err();
        assert!(matches!(err, ImportError::Io(_)));
    }
}
