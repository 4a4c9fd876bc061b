use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use glyco_core::models::{History, READING_KINDS};
use glyco_core::service::GlucoseService;

use super::helpers::{fmt_reading, parse_date};
use crate::chart;

pub(crate) const EMPTY_MESSAGE: &str =
    "No readings recorded yet. Use `glyco log` to record today's values.";

pub(crate) fn cmd_show(svc: &GlucoseService, json: bool) -> Result<()> {
    let history = svc.history()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&history)?);
    } else {
        print_history(&history);
    }

    Ok(())
}

pub(crate) fn cmd_day(svc: &GlucoseService, date: Option<String>, json: bool) -> Result<()> {
    let date = parse_date(date)?;
    let date_str = date.format("%Y-%m-%d").to_string();

    match svc.day(date)? {
        Some(record) if json => println!("{}", serde_json::to_string_pretty(&record)?),
        Some(record) => {
            println!("{date_str}");
            for kind in READING_KINDS {
                println!(
                    "  {:<13} {}",
                    kind.label(),
                    fmt_reading(record.value(*kind))
                );
            }
        }
        None if json => println!(
            "{}",
            serde_json::json!({ "error": format!("No readings for {date_str}") })
        ),
        None => eprintln!("No readings for {date_str}"),
    }

    Ok(())
}

/// Table, chart and per-reading summary, or the empty-state notice.
pub(crate) fn print_history(history: &History) {
    if history.is_empty() {
        eprintln!("{EMPTY_MESSAGE}");
        return;
    }

    println!("{}", history_table(history));

    if let Some(chart) = chart::render(history, chart::DEFAULT_WIDTH, chart::DEFAULT_HEIGHT) {
        println!();
        println!("{chart}");
    }

    if let Some(summary) = summary_table(history) {
        println!();
        println!("{summary}");
    }
}

pub(crate) fn history_table(history: &History) -> String {
    #[derive(Tabled)]
    struct ReadingRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Fasting")]
        fasting: String,
        #[tabled(rename = "Post-meal 2h")]
        postprandial: String,
        #[tabled(rename = "Bedtime")]
        bedtime: String,
    }

    let rows: Vec<ReadingRow> = history
        .records()
        .iter()
        .map(|r| ReadingRow {
            date: r.date_string(),
            fasting: fmt_reading(r.fasting),
            postprandial: fmt_reading(r.postprandial),
            bedtime: fmt_reading(r.bedtime),
        })
        .collect();

    Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..4)).with(Alignment::right()))
        .to_string()
}

fn summary_table(history: &History) -> Option<String> {
    #[derive(Tabled)]
    struct SummaryRow {
        #[tabled(rename = "Reading")]
        reading: &'static str,
        #[tabled(rename = "Days")]
        count: usize,
        #[tabled(rename = "Min")]
        min: String,
        #[tabled(rename = "Avg")]
        mean: String,
        #[tabled(rename = "Max")]
        max: String,
    }

    let rows: Vec<SummaryRow> = READING_KINDS
        .iter()
        .filter_map(|kind| {
            history.summary(*kind).map(|s| SummaryRow {
                reading: kind.label(),
                count: s.count,
                min: format!("{:.1}", s.min),
                mean: format!("{:.1}", s.mean),
                max: format!("{:.1}", s.max),
            })
        })
        .collect();

    if rows.is_empty() {
        return None;
    }

    Some(
        Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(1..5)).with(Alignment::right()))
            .to_string(),
    )
}
