use anyhow::{Result, bail};
use chrono::NaiveDate;
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Lowest accepted reading, in mmol/L.
pub const READING_MIN: f64 = 0.0;
/// Highest accepted reading, in mmol/L.
pub const READING_MAX: f64 = 35.0;

/// One day's measurements. `record_date` is the key; any reading may be absent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlucoseRecord {
    pub record_date: NaiveDate,
    pub fasting: Option<f64>,
    pub postprandial: Option<f64>,
    pub bedtime: Option<f64>,
}

impl GlucoseRecord {
    #[must_use]
    pub fn empty(record_date: NaiveDate) -> Self {
        Self {
            record_date,
            fasting: None,
            postprandial: None,
            bedtime: None,
        }
    }

    #[must_use]
    pub fn value(&self, kind: ReadingKind) -> Option<f64> {
        match kind {
            ReadingKind::Fasting => self.fasting,
            ReadingKind::Postprandial => self.postprandial,
            ReadingKind::Bedtime => self.bedtime,
        }
    }

    #[must_use]
    pub fn date_string(&self) -> String {
        self.record_date.format("%Y-%m-%d").to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingKind {
    Fasting,
    Postprandial,
    Bedtime,
}

pub const READING_KINDS: &[ReadingKind] = &[
    ReadingKind::Fasting,
    ReadingKind::Postprandial,
    ReadingKind::Bedtime,
];

impl ReadingKind {
    /// Human-facing name used in tables, chart legends and error messages.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Fasting => "Fasting",
            Self::Postprandial => "Post-meal 2h",
            Self::Bedtime => "Bedtime",
        }
    }

    /// Column name in `glucose_logs` and in CSV files.
    #[must_use]
    pub fn column(self) -> &'static str {
        match self {
            Self::Fasting => "fasting",
            Self::Postprandial => "postprandial",
            Self::Bedtime => "bedtime",
        }
    }
}

/// Values as entered by the user, before range checking.
#[derive(Debug, Clone)]
pub struct ReadingInput {
    pub date: NaiveDate,
    pub fasting: Option<f64>,
    pub postprandial: Option<f64>,
    pub bedtime: Option<f64>,
}

impl ReadingInput {
    /// Check every present value and produce the record to store.
    pub fn validate(&self) -> Result<GlucoseRecord> {
        let check = |kind: ReadingKind, value: Option<f64>| -> Result<Option<f64>> {
            value.map(|v| validate_reading(kind, v)).transpose()
        };
        Ok(GlucoseRecord {
            record_date: self.date,
            fasting: check(ReadingKind::Fasting, self.fasting)?,
            postprandial: check(ReadingKind::Postprandial, self.postprandial)?,
            bedtime: check(ReadingKind::Bedtime, self.bedtime)?,
        })
    }

    /// Fill readings left out of this input with the values already stored
    /// for the same day. The result is still written as a full row.
    #[must_use]
    pub fn merged_with(&self, existing: &GlucoseRecord) -> Self {
        Self {
            date: self.date,
            fasting: self.fasting.or(existing.fasting),
            postprandial: self.postprandial.or(existing.postprandial),
            bedtime: self.bedtime.or(existing.bedtime),
        }
    }
}

/// Round a reading to one decimal place and check it lies in
/// `READING_MIN..=READING_MAX`.
pub fn validate_reading(kind: ReadingKind, value: f64) -> Result<f64> {
    if !value.is_finite() {
        bail!("{} reading must be a number", kind.label());
    }
    let rounded = (value * 10.0).round() / 10.0;
    // -0.04 rounds to -0.0
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    if !(READING_MIN..=READING_MAX).contains(&rounded) {
        bail!(
            "{} reading must be between {READING_MIN:.1} and {READING_MAX:.1} mmol/L (got {value})",
            kind.label()
        );
    }
    Ok(rounded)
}

/// Min / max / mean of the present values of one series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

/// The full table as last read from the store, oldest date first.
///
/// Every view (table, chart, summary) is derived from this; nothing is kept
/// between reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct History {
    records: Vec<GlucoseRecord>,
}

impl History {
    #[must_use]
    pub fn new(records: Vec<GlucoseRecord>) -> Self {
        Self { records }
    }

    #[must_use]
    pub fn records(&self) -> &[GlucoseRecord] {
        &self.records
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.records.first()?;
        let last = self.records.last()?;
        Some((first.record_date, last.record_date))
    }

    /// Points for one chart line. Days without that reading are skipped.
    #[must_use]
    pub fn series(&self, kind: ReadingKind) -> Vec<(NaiveDate, f64)> {
        self.records
            .iter()
            .filter_map(|r| r.value(kind).map(|v| (r.record_date, v)))
            .collect()
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn summary(&self, kind: ReadingKind) -> Option<SeriesSummary> {
        let values: Vec<f64> = self.records.iter().filter_map(|r| r.value(kind)).collect();
        if values.is_empty() {
            return None;
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        Some(SeriesSummary {
            count: values.len(),
            min,
            max,
            mean,
        })
    }
}

/// Result of a confirmed entry: what was stored, the message to show, and the
/// history re-read after the write.
///
/// The write has already committed when this exists, so a failed re-read is
/// carried in `history` instead of failing the whole submission.
#[derive(Debug)]
pub struct Submission {
    pub record: GlucoseRecord,
    pub message: String,
    pub history: Result<History, StoreError>,
}

impl Serialize for Submission {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.history.is_ok() { 3 } else { 4 };
        let mut state = serializer.serialize_struct("Submission", len)?;
        state.serialize_field("record", &self.record)?;
        state.serialize_field("message", &self.message)?;
        match &self.history {
            Ok(history) => state.serialize_field("history", history)?,
            Err(e) => {
                state.serialize_field("history", &None::<History>)?;
                state.serialize_field("history_error", &e.to_string())?;
            }
        }
        state.end()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub rows_parsed: usize,
    pub created: usize,
    pub replaced: usize,
    pub dry_run: bool,
}
