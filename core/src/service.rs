use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::warn;

use crate::csv_transfer;
use crate::db::Database;
use crate::models::{GlucoseRecord, History, ImportSummary, ReadingInput, Submission};
use crate::store::GlucoseStore;

/// The entry-and-review flow over a [`GlucoseStore`].
///
/// Every view is rebuilt from a fresh `read_all()`; the service holds no
/// copy of the data between calls.
pub struct GlucoseService<S = Database> {
    store: S,
}

impl GlucoseService<Database> {
    pub fn open(db_path: &Path) -> Result<Self> {
        let db = Database::open(db_path)
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
        Self::new(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Database::open_in_memory()?)
    }
}

impl<S: GlucoseStore> GlucoseService<S> {
    /// Wrap `store`, making sure its schema exists first.
    pub fn new(store: S) -> Result<Self> {
        store
            .ensure_schema()
            .context("Failed to initialize the glucose table")?;
        Ok(Self { store })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Load the full history. An empty history is not an error.
    pub fn history(&self) -> Result<History> {
        Ok(History::new(self.store.read_all()?))
    }

    /// Validate and save one day's readings, then re-read the history.
    ///
    /// Validation and write errors fail the call; nothing is retried and
    /// `input` is left untouched for the caller to resubmit. Once the write
    /// has committed the call succeeds, and a failed re-read is reported in
    /// [`Submission::history`].
    pub fn submit(&self, input: &ReadingInput) -> Result<Submission> {
        let record = input.validate()?;
        let record = self.store.upsert(&record)?;
        let message = format!("Readings for {} saved.", record.date_string());
        let history = self.store.read_all().map(History::new);
        if let Err(e) = &history {
            warn!(date = %record.record_date, error = %e, "history refresh failed after save");
        }
        Ok(Submission {
            record,
            message,
            history,
        })
    }

    pub fn day(&self, date: NaiveDate) -> Result<Option<GlucoseRecord>> {
        Ok(self.store.get(date)?)
    }

    /// Write the full history as CSV. Returns the number of rows written.
    pub fn export_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let history = self.history()?;
        csv_transfer::write_csv(history.records(), writer)?;
        Ok(history.len())
    }

    /// Read records from CSV and upsert them as one batch.
    ///
    /// With `dry_run` the rows are parsed and counted but nothing is written.
    pub fn import_csv<R: Read>(&self, reader: R, dry_run: bool) -> Result<ImportSummary> {
        let rows = csv_transfer::parse_csv(reader)?;

        let existing: HashSet<NaiveDate> = self
            .store
            .read_all()?
            .into_iter()
            .map(|r| r.record_date)
            .collect();
        let mut seen = HashSet::new();
        let mut created = 0;
        let mut replaced = 0;
        for row in &rows {
            if existing.contains(&row.record_date) || !seen.insert(row.record_date) {
                replaced += 1;
            } else {
                created += 1;
            }
        }

        if !dry_run {
            self.store.upsert_all(&rows)?;
        }

        Ok(ImportSummary {
            rows_parsed: rows.len(),
            created,
            replaced,
            dry_run,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::error::StoreError;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn input(d: NaiveDate, f: f64, p: f64, b: f64) -> ReadingInput {
        ReadingInput {
            date: d,
            fasting: Some(f),
            postprandial: Some(p),
            bedtime: Some(b),
        }
    }

    /// Store whose connection "drops" for writes; counts attempts.
    struct FailingStore {
        writes: Cell<usize>,
        fail_schema: bool,
    }

    impl FailingStore {
        fn new(fail_schema: bool) -> Self {
            Self {
                writes: Cell::new(0),
                fail_schema,
            }
        }
    }

    impl GlucoseStore for FailingStore {
        fn ensure_schema(&self) -> Result<(), StoreError> {
            if self.fail_schema {
                Err(StoreError::Unavailable(rusqlite::Error::InvalidQuery))
            } else {
                Ok(())
            }
        }

        fn upsert(&self, _record: &GlucoseRecord) -> Result<GlucoseRecord, StoreError> {
            self.writes.set(self.writes.get() + 1);
            Err(StoreError::Write(rusqlite::Error::ExecuteReturnedResults))
        }

        fn read_all(&self) -> Result<Vec<GlucoseRecord>, StoreError> {
            Err(StoreError::Read(rusqlite::Error::InvalidQuery))
        }
    }

    #[test]
    fn test_history_empty_on_fresh_store() {
        let svc = GlucoseService::open_in_memory().unwrap();
        let history = svc.history().unwrap();
        assert!(history.is_empty());
    }

    #[test]
    fn test_submit_returns_message_and_fresh_history() {
        let svc = GlucoseService::open_in_memory().unwrap();
        let d = date(2024, 1, 1);
        let submission = svc.submit(&input(d, 5.6, 7.2, 6.0)).unwrap();

        assert_eq!(submission.record.record_date, d);
        assert_eq!(submission.message, "Readings for 2024-01-01 saved.");
        let history = submission.history.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history.records()[0], submission.record);
    }

    #[test]
    fn test_submit_twice_same_date_overwrites() {
        let svc = GlucoseService::open_in_memory().unwrap();
        let d = date(2024, 1, 1);
        svc.submit(&input(d, 5.6, 7.2, 6.0)).unwrap();
        let submission = svc.submit(&input(d, 5.8, 7.0, 6.1)).unwrap();

        let history = submission.history.unwrap();
        let records = history.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].fasting, Some(5.8));
        assert_eq!(records[0].postprandial, Some(7.0));
        assert_eq!(records[0].bedtime, Some(6.1));
    }

    #[test]
    fn test_submit_rejects_out_of_range_without_writing() {
        let svc = GlucoseService::open_in_memory().unwrap();
        let result = svc.submit(&input(date(2024, 1, 1), 5.6, 36.0, 6.0));
        assert!(result.is_err());
        assert!(svc.history().unwrap().is_empty());
    }

    #[test]
    fn test_submit_rounds_to_one_decimal() {
        let svc = GlucoseService::open_in_memory().unwrap();
        let submission = svc.submit(&input(date(2024, 1, 1), 5.64, 7.25, 6.0)).unwrap();
        assert_eq!(submission.record.fasting, Some(5.6));
        assert_eq!(submission.record.postprandial, Some(7.3));
    }

    #[test]
    fn test_write_failure_propagates_without_retry() {
        let svc = GlucoseService::new(FailingStore::new(false)).unwrap();
        let err = svc.submit(&input(date(2024, 1, 1), 5.6, 7.2, 6.0)).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::Write(_))
        ));
        assert_eq!(svc.store().writes.get(), 1);
    }

    /// Store that accepts writes but can no longer be read.
    struct UnreadableStore {
        writes: Cell<usize>,
    }

    impl GlucoseStore for UnreadableStore {
        fn ensure_schema(&self) -> Result<(), StoreError> {
            Ok(())
        }

        fn upsert(&self, record: &GlucoseRecord) -> Result<GlucoseRecord, StoreError> {
            self.writes.set(self.writes.get() + 1);
            Ok(*record)
        }

        fn read_all(&self) -> Result<Vec<GlucoseRecord>, StoreError> {
            Err(StoreError::Read(rusqlite::Error::InvalidQuery))
        }
    }

    #[test]
    fn test_committed_write_is_confirmed_when_refresh_fails() {
        let svc = GlucoseService::new(UnreadableStore {
            writes: Cell::new(0),
        })
        .unwrap();
        let d = date(2024, 1, 1);
        let submission = svc
            .submit(&ReadingInput {
                date: d,
                fasting: Some(5.6),
                postprandial: None,
                bedtime: None,
            })
            .unwrap();

        assert_eq!(svc.store().writes.get(), 1);
        assert_eq!(submission.record.fasting, Some(5.6));
        assert_eq!(submission.message, "Readings for 2024-01-01 saved.");
        assert!(matches!(submission.history, Err(StoreError::Read(_))));
    }

    #[test]
    fn test_read_failure_propagates() {
        let svc = GlucoseService::new(FailingStore::new(false)).unwrap();
        let err = svc.history().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::Read(_))
        ));
    }

    #[test]
    fn test_schema_failure_is_fatal() {
        let result = GlucoseService::new(FailingStore::new(true));
        let err = result.err().unwrap();
        assert!(format!("{err:#}").contains("storage unavailable"));
    }

    #[test]
    fn test_default_get_scans_read_all() {
        struct VecStore(Vec<GlucoseRecord>);
        impl GlucoseStore for VecStore {
            fn ensure_schema(&self) -> Result<(), StoreError> {
                Ok(())
            }
            fn upsert(&self, record: &GlucoseRecord) -> Result<GlucoseRecord, StoreError> {
                Ok(*record)
            }
            fn read_all(&self) -> Result<Vec<GlucoseRecord>, StoreError> {
                Ok(self.0.clone())
            }
        }

        let d = date(2024, 4, 4);
        let svc = GlucoseService::new(VecStore(vec![GlucoseRecord::empty(d)])).unwrap();
        assert_eq!(svc.day(d).unwrap(), Some(GlucoseRecord::empty(d)));
        assert!(svc.day(date(2024, 4, 5)).unwrap().is_none());
    }

    #[test]
    fn test_day_lookup() {
        let svc = GlucoseService::open_in_memory().unwrap();
        let d = date(2024, 2, 2);
        svc.submit(&input(d, 5.0, 6.0, 7.0)).unwrap();
        assert_eq!(svc.day(d).unwrap().unwrap().bedtime, Some(7.0));
        assert!(svc.day(date(2024, 2, 3)).unwrap().is_none());
    }

    #[test]
    fn test_export_then_import_into_fresh_store() {
        let svc = GlucoseService::open_in_memory().unwrap();
        svc.submit(&input(date(2024, 1, 1), 5.6, 7.2, 6.0)).unwrap();
        svc.submit(&ReadingInput {
            date: date(2024, 1, 2),
            fasting: None,
            postprandial: Some(8.1),
            bedtime: None,
        })
        .unwrap();

        let mut buf = Vec::new();
        assert_eq!(svc.export_csv(&mut buf).unwrap(), 2);

        let fresh = GlucoseService::open_in_memory().unwrap();
        let summary = fresh.import_csv(buf.as_slice(), false).unwrap();
        assert_eq!(summary.rows_parsed, 2);
        assert_eq!(summary.created, 2);
        assert_eq!(summary.replaced, 0);
        assert_eq!(fresh.history().unwrap(), svc.history().unwrap());
    }

    #[test]
    fn test_import_counts_replacements() {
        let svc = GlucoseService::open_in_memory().unwrap();
        svc.submit(&input(date(2024, 1, 1), 5.6, 7.2, 6.0)).unwrap();

        let csv = "record_date,fasting,postprandial,bedtime\n\
                   2024-01-01,5.9,,\n\
                   2024-01-02,6.0,7.5,6.2\n";
        let summary = svc.import_csv(csv.as_bytes(), false).unwrap();
        assert_eq!(summary.created, 1);
        assert_eq!(summary.replaced, 1);

        let jan1 = svc.day(date(2024, 1, 1)).unwrap().unwrap();
        assert_eq!(jan1.fasting, Some(5.9));
        assert_eq!(jan1.postprandial, None);
    }

    #[test]
    fn test_import_dry_run_writes_nothing() {
        let svc = GlucoseService::open_in_memory().unwrap();
        let csv = "record_date,fasting,postprandial,bedtime\n2024-01-02,6.0,7.5,6.2\n";
        let summary = svc.import_csv(csv.as_bytes(), true).unwrap();
        assert!(summary.dry_run);
        assert_eq!(summary.created, 1);
        assert!(svc.history().unwrap().is_empty());
    }

    #[test]
    fn test_import_with_bad_row_writes_nothing() {
        let svc = GlucoseService::open_in_memory().unwrap();
        let csv = "record_date,fasting,postprandial,bedtime\n\
                   2024-01-01,5.9,,\n\
                   2024-01-02,abc,,\n";
        assert!(svc.import_csv(csv.as_bytes(), false).is_err());
        assert!(svc.history().unwrap().is_empty());
    }
}
