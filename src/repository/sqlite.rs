// SQLite repository - durable tray storage
//
// Two tables: tray_headers (one row per tray) and tray_items (one row per
// inspected slot, cascade-deleted with its header). Timestamps are stored
// as RFC 3339 UTC strings so rows stay greppable and round-trippable.
// Durability comes from SQLite's own per-statement transactional
// guarantees; this layer adds no locking of its own.

use super::TrayRepository;
use crate::error::{Result, TrayError};
use crate::model::{Material, Tray};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;

pub struct SqliteRepository {
    conn: Connection,
}

impl SqliteRepository {
    /// Open (or create) a database file and ensure the schema exists
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    TrayError::Validation(format!(
                        "cannot create database directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        tracing::info!(db = %path.display(), "tray database opened");
        Ok(Self { conn })
    }

    /// Private in-memory database, handy for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Idempotent schema creation, safe to run on every open
    fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA busy_timeout=5000;
            -- Cascade delete from headers to items relies on FK enforcement
            PRAGMA foreign_keys=ON;

            CREATE TABLE IF NOT EXISTS tray_headers (
                tray_id TEXT PRIMARY KEY,
                rows INTEGER NOT NULL,
                cols INTEGER NOT NULL,
                batch_name TEXT,
                created_at TEXT NOT NULL,
                completed_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_headers_created ON tray_headers(created_at);

            CREATE TABLE IF NOT EXISTS tray_items (
                tray_id TEXT NOT NULL,
                row INTEGER NOT NULL,
                col INTEGER NOT NULL,
                result TEXT NOT NULL,
                image_path TEXT,
                detection_time TEXT NOT NULL,
                PRIMARY KEY (tray_id, row, col),
                FOREIGN KEY (tray_id) REFERENCES tray_headers(tray_id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_items_detection ON tray_items(tray_id, detection_time);
            "#,
        )
    }

    fn header_exists(&self, tray_id: &str) -> Result<bool> {
        let exists = self.conn.query_row(
            "SELECT COUNT(*) > 0 FROM tray_headers WHERE tray_id = ?1",
            params![tray_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }
}

impl TrayRepository for SqliteRepository {
    fn save_tray_header(&mut self, tray: &Tray) -> Result<()> {
        // Upsert overwrites ALL non-key columns, never a subset
        self.conn.execute(
            "INSERT INTO tray_headers (tray_id, rows, cols, batch_name, created_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(tray_id) DO UPDATE SET
                 rows = excluded.rows,
                 cols = excluded.cols,
                 batch_name = excluded.batch_name,
                 created_at = excluded.created_at,
                 completed_at = excluded.completed_at",
            params![
                tray.tray_id,
                tray.rows,
                tray.cols,
                tray.batch_name,
                tray.created_at,
                tray.completed_at
            ],
        )?;
        tracing::debug!(tray_id = %tray.tray_id, "tray header saved");
        Ok(())
    }

    fn update_tray_completion(
        &mut self,
        tray_id: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE tray_headers SET completed_at = ?2 WHERE tray_id = ?1",
            params![tray_id, completed_at],
        )?;
        if changed == 0 {
            return Err(TrayError::NotFound(tray_id.to_owned()));
        }
        Ok(())
    }

    fn save_material(&mut self, tray_id: &str, material: &Material) -> Result<()> {
        if !self.header_exists(tray_id)? {
            return Err(TrayError::NotFound(tray_id.to_owned()));
        }

        self.conn.execute(
            "INSERT INTO tray_items (tray_id, row, col, result, image_path, detection_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(tray_id, row, col) DO UPDATE SET
                 result = excluded.result,
                 image_path = excluded.image_path,
                 detection_time = excluded.detection_time",
            params![
                tray_id,
                material.row,
                material.col,
                material.result,
                material.image_path,
                material.detection_time
            ],
        )?;
        Ok(())
    }

    fn load_recent_trays(&mut self, limit: usize) -> Result<Vec<Tray>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(
            "SELECT tray_id, rows, cols, batch_name, created_at, completed_at
             FROM tray_headers
             ORDER BY created_at DESC, tray_id
             LIMIT ?1",
        )?;
        let mut trays = stmt
            .query_map(params![limit as i64], |row| {
                Ok(Tray {
                    tray_id: row.get(0)?,
                    rows: row.get(1)?,
                    cols: row.get(2)?,
                    batch_name: row.get(3)?,
                    created_at: row.get(4)?,
                    completed_at: row.get(5)?,
                    materials: HashMap::new(),
                })
            })?
            .collect::<rusqlite::Result<Vec<Tray>>>()?;

        let mut item_stmt = self.conn.prepare(
            "SELECT row, col, result, image_path, detection_time
             FROM tray_items
             WHERE tray_id = ?1
             ORDER BY detection_time ASC, row, col",
        )?;
        for tray in &mut trays {
            let materials = item_stmt
                .query_map(params![tray.tray_id], |row| {
                    Ok(Material {
                        row: row.get(0)?,
                        col: row.get(1)?,
                        result: row.get(2)?,
                        image_path: row.get(3)?,
                        detection_time: row.get(4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<Material>>>()?;
            for material in materials {
                tray.add_or_update_material(material);
            }
        }

        Ok(trays)
    }

    fn delete_tray(&mut self, tray_id: &str) -> Result<()> {
        let changed = self
            .conn
            .execute("DELETE FROM tray_headers WHERE tray_id = ?1", params![tray_id])?;
        if changed == 0 {
            return Err(TrayError::NotFound(tray_id.to_owned()));
        }
        tracing::debug!(tray_id, "tray deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creation_is_idempotent_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("trays.db");

        let now = Utc::now();
        {
            let mut repo = SqliteRepository::open(&db_path).unwrap();
            repo.save_tray_header(&Tray::new("t1", 2, 2, None, now).unwrap())
                .unwrap();
        }

        // Second open re-runs init_schema and still sees the data
        let mut repo = SqliteRepository::open(&db_path).unwrap();
        let loaded = repo.load_recent_trays(5).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].tray_id, "t1");
        assert_eq!(loaded[0].created_at, now);
    }

    #[test]
    fn deleting_header_cascades_to_items() {
        let mut repo = SqliteRepository::open_in_memory().unwrap();
        let now = Utc::now();
        repo.save_tray_header(&Tray::new("t1", 2, 2, None, now).unwrap())
            .unwrap();
        repo.save_material("t1", &Material::new(1, 1, "OK", None, now))
            .unwrap();

        repo.delete_tray("t1").unwrap();

        let orphans: i64 = repo
            .conn
            .query_row("SELECT COUNT(*) FROM tray_items", [], |row| row.get(0))
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn timestamps_round_trip_as_utc() {
        let mut repo = SqliteRepository::open_in_memory().unwrap();
        let created = "2026-03-01T08:30:15.250Z".parse::<DateTime<Utc>>().unwrap();
        repo.save_tray_header(&Tray::new("t1", 1, 1, None, created).unwrap())
            .unwrap();
        repo.save_material("t1", &Material::new(1, 1, "OK", None, created))
            .unwrap();

        let got = &repo.load_recent_trays(1).unwrap()[0];
        assert_eq!(got.created_at, created);
        assert_eq!(got.material_at(1, 1).unwrap().detection_time, created);
    }
}
