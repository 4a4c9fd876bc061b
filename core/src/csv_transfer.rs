use std::io::{Read, Write};

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;

use crate::models::{GlucoseRecord, READING_KINDS, validate_reading};

const DATE_COLUMN: &str = "record_date";

/// Write records as CSV with the header
/// `record_date,fasting,postprandial,bedtime`. Absent readings are empty cells.
pub fn write_csv<W: Write>(records: &[GlucoseRecord], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header = vec![DATE_COLUMN];
    header.extend(READING_KINDS.iter().map(|k| k.column()));
    wtr.write_record(&header)
        .context("Failed to write CSV header")?;

    for record in records {
        let mut row = vec![record.date_string()];
        row.extend(
            READING_KINDS
                .iter()
                .map(|k| record.value(*k).map(|v| v.to_string()).unwrap_or_default()),
        );
        wtr.write_record(&row)
            .with_context(|| format!("Failed to write CSV row for {}", record.date_string()))?;
    }

    wtr.flush().context("Failed to flush CSV output")?;
    Ok(())
}

/// Parse records from CSV.
///
/// Columns are matched by name, case-insensitively, in any order. Reading
/// columns may be missing entirely (treated as absent). Rows with an empty
/// date are skipped; any other malformed cell, or a reading outside the
/// accepted range, fails the whole parse.
pub fn parse_csv<R: Read>(reader: R) -> Result<Vec<GlucoseRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().context("Failed to read CSV headers")?.clone();
    let col =
        |name: &str| -> Option<usize> { headers.iter().position(|h| h.eq_ignore_ascii_case(name)) };

    let Some(idx_date) = col(DATE_COLUMN) else {
        bail!("Missing required column: {DATE_COLUMN}");
    };
    let reading_idx: Vec<Option<usize>> = READING_KINDS.iter().map(|k| col(k.column())).collect();
    if reading_idx.iter().all(Option::is_none) {
        bail!(
            "CSV has no reading columns. Expected at least one of: {}",
            READING_KINDS
                .iter()
                .map(|k| k.column())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    let mut records = Vec::new();
    for (line_num, result) in rdr.records().enumerate() {
        let line = line_num + 2;
        let row = result.with_context(|| format!("Failed to parse CSV row {line}"))?;

        let date_str = row.get(idx_date).unwrap_or("");
        if date_str.is_empty() {
            continue; // skip blank rows
        }
        let record_date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            .with_context(|| format!("Row {line}: invalid date '{date_str}'. Use YYYY-MM-DD"))?;

        let mut values = [None; 3];
        for (slot, (kind, idx)) in values
            .iter_mut()
            .zip(READING_KINDS.iter().zip(&reading_idx))
        {
            let cell = idx.and_then(|i| row.get(i)).unwrap_or("");
            if cell.is_empty() {
                continue;
            }
            let value: f64 = cell.parse().with_context(|| {
                format!("Row {line}: invalid {} value '{cell}'", kind.column())
            })?;
            let value = validate_reading(*kind, value).with_context(|| format!("Row {line}"))?;
            *slot = Some(value);
        }

        records.push(GlucoseRecord {
            record_date,
            fasting: values[0],
            postprandial: values[1],
            bedtime: values[2],
        });
    }

    Ok(records)
}
