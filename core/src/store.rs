use chrono::NaiveDate;

use crate::error::StoreError;
use crate::models::GlucoseRecord;

/// Durable, date-keyed storage for [`GlucoseRecord`]s.
///
/// Implementations are constructed explicitly and handed to
/// [`GlucoseService`](crate::service::GlucoseService); there is no global
/// connection.
pub trait GlucoseStore {
    /// Create the backing table if it does not exist. Safe to call repeatedly.
    fn ensure_schema(&self) -> Result<(), StoreError>;

    /// Insert `record`, or overwrite all three readings of the existing record
    /// for the same date. Absent readings overwrite stored values with NULL.
    ///
    /// The write is committed before this returns. Returns the record as
    /// written; a successful write is never reported as a failed read.
    fn upsert(&self, record: &GlucoseRecord) -> Result<GlucoseRecord, StoreError>;

    /// Every record, oldest date first. An empty table yields an empty `Vec`.
    fn read_all(&self) -> Result<Vec<GlucoseRecord>, StoreError>;

    fn get(&self, date: NaiveDate) -> Result<Option<GlucoseRecord>, StoreError> {
        Ok(self
            .read_all()?
            .into_iter()
            .find(|r| r.record_date == date))
    }

    /// Upsert a batch. Returns the number of rows written.
    ///
    /// The default writes one record at a time; implementations with
    /// transactions should override this so a failing row leaves nothing
    /// behind.
    fn upsert_all(&self, records: &[GlucoseRecord]) -> Result<usize, StoreError> {
        for record in records {
            self.upsert(record)?;
        }
        Ok(records.len())
    }
}
