use anyhow::{anyhow, Result};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

use crate::event::{DetectionEvent, LOG_TIME_FORMAT};
use crate::open_db_connection;

/// Durable append-only log of defect events.
///
/// Every append is a new row; identical events are not merged. There is no
/// update or delete.
pub trait EventSink: Send {
    /// Persist one event and return its opaque row key.
    fn append(&mut self, ev: &DetectionEvent) -> Result<i64>;
}

pub struct SqliteEventSink {
    conn: Connection,
}

impl SqliteEventSink {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = open_db_connection(db_path)?;
        let mut sink = Self { conn };
        sink.ensure_schema()?;
        Ok(sink)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS defect_logs (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              sheet_number TEXT,
              defect_type TEXT,
              length_meter REAL,
              timestamp TEXT,
              image_path TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_defect_logs_sheet ON defect_logs(sheet_number);
            "#,
        )?;
        ensure_columns(&self.conn, "defect_logs", &[("confidence", "REAL")])?;
        Ok(())
    }

    /// Events recorded for one sheet, in insertion order. Read-only.
    pub fn events_for_sheet(&self, sheet_id: &str) -> Result<Vec<DetectionEvent>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT defect_type, confidence, length_meter, timestamp, image_path
            FROM defect_logs WHERE sheet_number = ?1 ORDER BY id ASC
            "#,
        )?;
        let mut rows = stmt.query(params![sheet_id])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let defect_type: String = row.get(0)?;
            let confidence: Option<f64> = row.get(1)?;
            let length_meter: f64 = row.get(2)?;
            let timestamp: String = row.get(3)?;
            let image_path: String = row.get(4)?;
            let timestamp = NaiveDateTime::parse_from_str(&timestamp, LOG_TIME_FORMAT)
                .map_err(|e| anyhow!("corrupt defect log: timestamp '{}': {}", timestamp, e))?;
            out.push(DetectionEvent::new(
                sheet_id,
                defect_type,
                confidence.unwrap_or(0.0) as f32,
                length_meter,
                timestamp,
                image_path,
            ));
        }
        Ok(out)
    }

    pub fn row_count(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM defect_logs", [], |row| row.get(0))?)
    }
}

impl EventSink for SqliteEventSink {
    fn append(&mut self, ev: &DetectionEvent) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO defect_logs(sheet_number, defect_type, length_meter, timestamp, image_path, confidence)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                ev.sheet_id(),
                ev.defect_type(),
                ev.position_meters(),
                ev.log_time(),
                ev.image_path().to_string_lossy(),
                ev.confidence() as f64,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }
}

/// Adds any of `columns` missing from `table`. Lets older databases written
/// without the newer columns keep working.
pub(crate) fn ensure_columns(
    conn: &Connection,
    table: &str,
    columns: &[(&str, &str)],
) -> Result<()> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let existing = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for (name, ty) in columns {
        if !existing.iter().any(|col| col == name) {
            conn.execute_batch(&format!("ALTER TABLE {} ADD COLUMN {} {};", table, name, ty))?;
        }
    }
    Ok(())
}

/// Row kept by `InMemoryEventSink`.
#[derive(Clone, Debug)]
pub struct StoredEvent {
    pub id: i64,
    pub event: DetectionEvent,
}

/// In-process sink. Clones share the same rows, so a test can hand one clone
/// to a session and inspect the other.
#[derive(Clone, Debug, Default)]
pub struct InMemoryEventSink {
    rows: Arc<Mutex<Vec<StoredEvent>>>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<StoredEvent> {
        self.rows.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for InMemoryEventSink {
    fn append(&mut self, ev: &DetectionEvent) -> Result<i64> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| anyhow!("in-memory event sink lock poisoned"))?;
        let id = rows.len() as i64 + 1;
        rows.push(StoredEvent {
            id,
            event: ev.clone(),
        });
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn event(sheet: &str, kind: &str, pos: f64) -> DetectionEvent {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, 30, 15)
            .unwrap();
        DetectionEvent::new(sheet, kind, 0.62, pos, ts, format!("reports/{sheet}/images/x.jpg"))
    }

    #[test]
    fn sqlite_append_assigns_increasing_ids_without_dedup() -> Result<()> {
        let mut sink = SqliteEventSink::open(&crate::shared_memory_uri())?;
        let ev = event("S-1", "pit", 12.5);

        let a = sink.append(&ev)?;
        let b = sink.append(&ev)?;
        assert!(b > a);
        assert_eq!(sink.row_count()?, 2);
        Ok(())
    }

    #[test]
    fn sqlite_stores_log_timestamp_format() -> Result<()> {
        let mut sink = SqliteEventSink::open(&crate::shared_memory_uri())?;
        sink.append(&event("S-1", "pit", 12.5))?;

        let (ts, len): (String, f64) = sink.conn.query_row(
            "SELECT timestamp, length_meter FROM defect_logs",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        assert_eq!(ts, "2024-03-01 09:30:15");
        assert_eq!(len, 12.5);
        Ok(())
    }

    #[test]
    fn events_for_sheet_filters_and_keeps_order() -> Result<()> {
        let mut sink = SqliteEventSink::open(&crate::shared_memory_uri())?;
        sink.append(&event("S-1", "pit", 3.0))?;
        sink.append(&event("S-2", "scratch", 1.0))?;
        sink.append(&event("S-1", "scratch", 1.5))?;

        let events = sink.events_for_sheet("S-1")?;
        let kinds: Vec<(&str, f64)> = events
            .iter()
            .map(|e| (e.defect_type(), e.position_meters()))
            .collect();
        assert_eq!(kinds, vec![("pit", 3.0), ("scratch", 1.5)]);
        assert_eq!(events[0], event("S-1", "pit", 3.0));
        Ok(())
    }

    #[test]
    fn opens_legacy_table_without_confidence_column() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("legacy.db");
        let path = path.to_string_lossy().to_string();
        {
            let conn = Connection::open(&path)?;
            conn.execute_batch(
                "CREATE TABLE defect_logs (id INTEGER PRIMARY KEY AUTOINCREMENT, sheet_number TEXT, \
                 defect_type TEXT, length_meter REAL, timestamp TEXT, image_path TEXT);
                 INSERT INTO defect_logs(sheet_number, defect_type, length_meter, timestamp, image_path)
                 VALUES ('S-9', 'pit', 4.2, '2024-03-01 10:00:00', 'a.jpg');",
            )?;
        }

        let mut sink = SqliteEventSink::open(&path)?;
        sink.append(&event("S-9", "scratch", 5.0))?;
        let events = sink.events_for_sheet("S-9")?;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].confidence(), 0.0);
        Ok(())
    }

    #[test]
    fn in_memory_clones_share_rows() -> Result<()> {
        let sink = InMemoryEventSink::new();
        let mut writer = sink.clone();
        writer.append(&event("S-1", "pit", 1.0))?;
        writer.append(&event("S-1", "pit", 1.0))?;

        let rows = sink.rows();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2]);
        Ok(())
    }
}
