use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OpenFlags};

use super::record::{now_ms, DetectionRecord, NewDetectionRecord};
use super::store::{require_user, DetectionStore};
use crate::auth::AuthSession;

/// Local SQLite store for saved snapshots.
pub struct SqliteDetectionStore {
    conn: Connection,
}

impl SqliteDetectionStore {
    /// Open (or create) the database. `file:` URIs are opened in URI mode.
    pub fn open(db_path: &str) -> Result<Self> {
        let opened = if db_path.starts_with("file:") {
            Connection::open_with_flags(
                db_path,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_URI,
            )
        } else {
            Connection::open(db_path)
        };
        let conn = opened.with_context(|| format!("open detection database {}", db_path))?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let mut store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS detections (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              user_id TEXT NOT NULL,
              created_at INTEGER NOT NULL,
              detection_json TEXT NOT NULL,
              image_url TEXT NOT NULL,
              confidence INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_detections_user_created
              ON detections(user_id, created_at);
            "#,
        )?;
        Ok(())
    }
}

impl DetectionStore for SqliteDetectionStore {
    fn save(&mut self, auth: &AuthSession, record: NewDetectionRecord) -> Result<DetectionRecord> {
        let user = require_user(auth)?;
        let created_at = now_ms();
        let detection_json = serde_json::to_string(&record.detection_data)?;

        self.conn.execute(
            r#"
            INSERT INTO detections(user_id, created_at, detection_json, image_url, confidence)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                user.id,
                created_at,
                detection_json,
                record.image_url,
                i64::from(record.confidence)
            ],
        )?;
        let id = self.conn.last_insert_rowid();

        Ok(DetectionRecord {
            id,
            user_id: user.id.clone(),
            detection_data: record.detection_data,
            image_url: record.image_url,
            confidence: record.confidence,
            created_at,
        })
    }

    fn list(&mut self, auth: &AuthSession) -> Result<Vec<DetectionRecord>> {
        let user = require_user(auth)?;
        let rows = {
            let mut stmt = self.conn.prepare(
                r#"
                SELECT id, user_id, created_at, detection_json, image_url, confidence
                FROM detections
                WHERE user_id = ?1
                ORDER BY created_at DESC, id DESC
                "#,
            )?;
            let mut rows = stmt.query(params![user.id])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let id: i64 = row.get(0)?;
                let user_id: String = row.get(1)?;
                let created_at: i64 = row.get(2)?;
                let detection_json: String = row.get(3)?;
                let image_url: String = row.get(4)?;
                let confidence: i64 = row.get(5)?;
                out.push((id, user_id, created_at, detection_json, image_url, confidence));
            }
            out
        };

        let mut records = Vec::with_capacity(rows.len());
        for (id, user_id, created_at, detection_json, image_url, confidence) in rows {
            let detection_data = serde_json::from_str(&detection_json)
                .with_context(|| format!("corrupt detection record {}", id))?;
            let confidence = u8::try_from(confidence)
                .ok()
                .filter(|c| *c <= 100)
                .ok_or_else(|| anyhow!("corrupt detection record {}: confidence {}", id, confidence))?;
            records.push(DetectionRecord {
                id,
                user_id,
                detection_data,
                image_url,
                confidence,
                created_at,
            });
        }
        Ok(records)
    }
}
