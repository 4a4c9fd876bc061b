use std::path::Path;

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::error::StoreError;
use crate::models::GlucoseRecord;
use crate::store::GlucoseStore;

const UPSERT_SQL: &str = "INSERT INTO glucose_logs (record_date, fasting, postprandial, bedtime)
     VALUES (?1, ?2, ?3, ?4)
     ON CONFLICT(record_date) DO UPDATE SET
        fasting = excluded.fasting,
        postprandial = excluded.postprandial,
        bedtime = excluded.bedtime";

const SELECT_COLUMNS: &str = "SELECT record_date, fasting, postprandial, bedtime FROM glucose_logs";

/// SQLite-backed [`GlucoseStore`].
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(StoreError::Unavailable)?;
        debug!(path = %path.display(), "opened glucose database");
        let db = Database { conn };
        db.ensure_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(StoreError::Unavailable)?;
        let db = Database { conn };
        db.ensure_schema()?;
        Ok(db)
    }

    fn migrate(&self) -> rusqlite::Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            debug!(from = version, to = 1, "migrating glucose schema");
            // Dates are ISO-8601 text so that ORDER BY is chronological.
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS glucose_logs (
                    record_date TEXT PRIMARY KEY NOT NULL
                        CHECK (date(record_date) IS record_date),
                    fasting REAL,
                    postprandial REAL,
                    bedtime REAL
                );

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    fn record_from_row(row: &rusqlite::Row) -> rusqlite::Result<GlucoseRecord> {
        Ok(GlucoseRecord {
            record_date: row.get(0)?,
            fasting: row.get(1)?,
            postprandial: row.get(2)?,
            bedtime: row.get(3)?,
        })
    }

    fn fetch(&self, date: NaiveDate) -> rusqlite::Result<Option<GlucoseRecord>> {
        self.conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE record_date = ?1"),
                params![date],
                Self::record_from_row,
            )
            .optional()
    }
}

impl GlucoseStore for Database {
    fn ensure_schema(&self) -> Result<(), StoreError> {
        self.migrate().map_err(StoreError::Unavailable)
    }

    fn upsert(&self, record: &GlucoseRecord) -> Result<GlucoseRecord, StoreError> {
        self.conn
            .execute(
                UPSERT_SQL,
                params![
                    record.record_date,
                    record.fasting,
                    record.postprandial,
                    record.bedtime
                ],
            )
            .map_err(StoreError::Write)?;
        debug!(date = %record.record_date, "upserted glucose record");

        // The row now holds exactly the bound values; no read-back.
        Ok(*record)
    }

    fn read_all(&self) -> Result<Vec<GlucoseRecord>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_COLUMNS} ORDER BY record_date ASC"))
            .map_err(StoreError::Read)?;
        let records = stmt
            .query_map([], Self::record_from_row)
            .map_err(StoreError::Read)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::Read)?;
        debug!(count = records.len(), "read glucose history");
        Ok(records)
    }

    fn get(&self, date: NaiveDate) -> Result<Option<GlucoseRecord>, StoreError> {
        self.fetch(date).map_err(StoreError::Read)
    }

    fn upsert_all(&self, records: &[GlucoseRecord]) -> Result<usize, StoreError> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(StoreError::Write)?;
        {
            let mut stmt = tx.prepare(UPSERT_SQL).map_err(StoreError::Write)?;
            for record in records {
                stmt.execute(params![
                    record.record_date,
                    record.fasting,
                    record.postprandial,
                    record.bedtime
                ])
                .map_err(StoreError::Write)?;
            }
        }
        tx.commit().map_err(StoreError::Write)?;
        debug!(count = records.len(), "upserted glucose batch");
        Ok(records.len())
    }
}
