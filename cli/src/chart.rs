use std::fmt::Write;

use glyco_core::models::{History, READING_KINDS, ReadingKind};

pub const DEFAULT_WIDTH: usize = 48;
pub const DEFAULT_HEIGHT: usize = 10;

const LINE: char = '·';
const OVERLAP: char = '◆';

fn marker(kind: ReadingKind) -> char {
    match kind {
        ReadingKind::Fasting => '●',
        ReadingKind::Postprandial => '▲',
        ReadingKind::Bedtime => '■',
    }
}

fn is_marker(c: char) -> bool {
    c == OVERLAP || READING_KINDS.iter().any(|k| marker(*k) == c)
}

/// Render every reading series as a text line chart.
///
/// The x axis is calendar time (gaps between dates keep their width), the
/// y axis spans the lowest to highest reading. Returns `None` when there is
/// nothing to plot.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation
)]
pub fn render(history: &History, width: usize, height: usize) -> Option<String> {
    let (first, last) = history.date_range()?;
    let width = width.max(2);
    let height = height.max(3);

    let series: Vec<(ReadingKind, Vec<(usize, f64)>)> = {
        let span = (last - first).num_days().max(0) as f64;
        READING_KINDS
            .iter()
            .map(|kind| {
                let points = history
                    .series(*kind)
                    .into_iter()
                    .map(|(date, v)| {
                        let offset = (date - first).num_days() as f64;
                        let col = if span > 0.0 {
                            (offset / span * (width - 1) as f64).round() as usize
                        } else {
                            0
                        };
                        (col, v)
                    })
                    .collect();
                (*kind, points)
            })
            .collect()
    };

    let all_values = series.iter().flat_map(|(_, pts)| pts.iter().map(|(_, v)| *v));
    let (mut lo, mut hi) = all_values.fold(None, |acc: Option<(f64, f64)>, v| {
        Some(acc.map_or((v, v), |(lo, hi)| (lo.min(v), hi.max(v))))
    })?;
    if hi - lo < f64::EPSILON {
        lo -= 1.0;
        hi += 1.0;
    }

    let row_of = |v: f64| -> usize { ((hi - v) / (hi - lo) * (height - 1) as f64).round() as usize };
    let mut grid = vec![vec![' '; width]; height];

    // Connecting lines first so markers always land on top.
    for (_, points) in &series {
        for pair in points.windows(2) {
            let (c0, v0) = pair[0];
            let (c1, v1) = pair[1];
            for c in (c0 + 1)..c1 {
                let t = (c - c0) as f64 / (c1 - c0) as f64;
                let r = row_of(v0 + (v1 - v0) * t);
                if grid[r][c] == ' ' {
                    grid[r][c] = LINE;
                }
            }
        }
    }
    for (kind, points) in &series {
        let own = marker(*kind);
        for &(c, v) in points {
            let cell = &mut grid[row_of(v)][c];
            *cell = if is_marker(*cell) && *cell != own {
                OVERLAP
            } else {
                own
            };
        }
    }

    let mid = height / 2;
    let mut out = String::new();
    let _ = writeln!(out, " mmol/L");
    for (r, row) in grid.iter().enumerate() {
        let line: String = row.iter().collect();
        if r == 0 || r == mid || r == height - 1 {
            let v = hi - (hi - lo) * r as f64 / (height - 1) as f64;
            let _ = writeln!(out, "{v:>6.1} ┤{}", line.trim_end());
        } else {
            let _ = writeln!(out, "       │{}", line.trim_end());
        }
    }
    let _ = writeln!(out, "       └{}", "─".repeat(width));

    let first_label = first.format("%Y-%m-%d").to_string();
    if first == last {
        let _ = writeln!(out, "        {first_label}");
    } else {
        let last_label = last.format("%Y-%m-%d").to_string();
        let gap = width
            .saturating_sub(first_label.len() + last_label.len())
            .max(2);
        let _ = writeln!(out, "        {first_label}{}{last_label}", " ".repeat(gap));
    }

    let legend: Vec<String> = READING_KINDS
        .iter()
        .map(|k| format!("{} {}", marker(*k), k.label()))
        .collect();
    let _ = write!(out, "        {}", legend.join("   "));

    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use glyco_core::models::GlucoseRecord;

    fn record(d: u32, f: Option<f64>, p: Option<f64>, b: Option<f64>) -> GlucoseRecord {
        GlucoseRecord {
            record_date: NaiveDate::from_ymd_opt(2024, 1, d).unwrap(),
            fasting: f,
            postprandial: p,
            bedtime: b,
        }
    }

    #[test]
    fn test_render_empty_history_is_none() {
        assert!(render(&History::default(), DEFAULT_WIDTH, DEFAULT_HEIGHT).is_none());
    }

    #[test]
    fn test_render_all_null_history_is_none() {
        let history = History::new(vec![record(1, None, None, None)]);
        assert!(render(&history, DEFAULT_WIDTH, DEFAULT_HEIGHT).is_none());
    }

    #[test]
    fn test_render_has_axis_labels_and_legend() {
        let history = History::new(vec![
            record(1, Some(5.0), Some(8.0), Some(6.0)),
            record(3, Some(5.5), Some(7.0), Some(6.5)),
        ]);
        let chart = render(&history, 20, 8).unwrap();

        assert!(chart.contains("8.0 ┤"));
        assert!(chart.contains("5.0 ┤"));
        assert!(chart.contains("2024-01-01"));
        assert!(chart.contains("2024-01-03"));
        assert!(chart.contains("● Fasting"));
        assert!(chart.contains("▲ Post-meal 2h"));
        assert!(chart.contains("■ Bedtime"));
    }

    #[test]
    fn test_render_places_extremes_on_first_and_last_rows() {
        let history = History::new(vec![
            record(1, Some(4.0), None, None),
            record(2, Some(9.0), None, None),
        ]);
        let chart = render(&history, 10, 6).unwrap();
        let rows: Vec<&str> = chart.lines().skip(1).take(6).collect();

        // Highest reading at the top right, lowest at the bottom left
        assert!(rows[0].ends_with('●'));
        assert!(rows[5].contains("┤●"));
    }

    #[test]
    fn test_render_draws_connecting_line() {
        let history = History::new(vec![
            record(1, Some(5.0), None, None),
            record(10, Some(5.0), None, None),
        ]);
        let chart = render(&history, 12, 5).unwrap();
        assert!(chart.contains('·'));
    }

    #[test]
    fn test_render_marks_overlapping_points() {
        let history = History::new(vec![
            record(1, Some(6.0), Some(6.0), None),
            record(2, Some(5.0), Some(9.0), None),
        ]);
        let chart = render(&history, 10, 5).unwrap();
        assert!(chart.contains(OVERLAP));
    }

    #[test]
    fn test_render_single_day() {
        let history = History::new(vec![record(1, Some(5.6), Some(7.2), Some(6.0))]);
        let chart = render(&history, DEFAULT_WIDTH, DEFAULT_HEIGHT).unwrap();
        assert!(chart.contains("2024-01-01"));
        assert!(chart.contains('●'));
        assert!(chart.contains('▲'));
        assert!(chart.contains('■'));
    }
}
