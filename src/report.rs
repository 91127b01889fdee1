//! Batch Report Output
//!
//! Collects task outcomes into a `BatchReport` and writes it out:
//!
//! - the full report as pretty-printed JSON
//! - one CSV table per parameter, one row per (gauge, storm)
//! - a short console summary
//!
//! Absent values (a stage that did not run, an effect without a peak) are
//! written as empty CSV fields and `null` in JSON.

use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::pipeline::TaskOutcome;

/// Column headers of a parameter table, in output order.
pub const TABLE_COLUMNS: &[&str] = &[
    "Gauge",
    "Date",
    "Storm",
    "Storm Index",
    "Naive Storm Index",
    "Pre-effect Window",
    "Pre-effect Points",
    "Pre-effect Mean",
    "Pre-effect Stddev",
    "Dropped Pre-Effect Points",
    "Effect Start",
    "Effect End",
    "Total Effect",
    "Effect Above",
    "Effect Below",
    "Effect Between",
    "Peak Effect Index",
    "Peak Effect Value",
    "Peak Effect Magnitude",
    "Termination",
    "Forced Start",
    "Forced Slope",
    "Error",
];

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub generated_at: String,
    pub summary: BatchSummary,
    pub outcomes: Vec<TaskOutcome>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    /// Tasks that ran to completion, with or without an effect.
    pub analyzed: usize,
    pub with_effect: usize,
    pub failed: usize,
    /// Error kind → count.
    pub failures_by_kind: BTreeMap<String, usize>,
    /// Termination kind → count, over analyzed tasks.
    pub terminations: BTreeMap<String, usize>,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[TaskOutcome]) -> Self {
        let mut summary = BatchSummary {
            total: outcomes.len(),
            ..BatchSummary::default()
        };

        for outcome in outcomes {
            if let Some(err) = &outcome.error {
                summary.failed += 1;
                *summary.failures_by_kind.entry(err.kind.clone()).or_insert(0) += 1;
                continue;
            }
            summary.analyzed += 1;
            if let Some(effect) = &outcome.effect {
                if effect.start.is_some() {
                    summary.with_effect += 1;
                }
                *summary
                    .terminations
                    .entry(effect.termination.as_str().to_string())
                    .or_insert(0) += 1;
            }
        }

        summary
    }
}

impl BatchReport {
    pub fn new(outcomes: Vec<TaskOutcome>) -> Self {
        Self {
            generated_at: Utc::now().to_rfc3339(),
            summary: BatchSummary::from_outcomes(&outcomes),
            outcomes,
        }
    }

    /// Distinct parameters in the report, sorted.
    pub fn parameters(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .outcomes
            .iter()
            .map(|o| o.baseline.parameter.as_str())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    pub fn for_parameter<'a>(&'a self, parameter: &'a str) -> impl Iterator<Item = &'a TaskOutcome> + 'a {
        self.outcomes
            .iter()
            .filter(move |o| o.baseline.parameter == parameter)
    }
}

// ============================================================================
// JSON
// ============================================================================

pub fn write_json(report: &BatchReport, path: &Path) -> io::Result<()> {
    let json = serde_json::to_string_pretty(report).map_err(io::Error::other)?;
    fs::write(path, json)
}

// ============================================================================
// CSV tables
// ============================================================================

fn opt<T: Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Quotes a field when it holds a delimiter, quote or line break.
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn table_row(outcome: &TaskOutcome) -> Vec<String> {
    let b = &outcome.baseline;
    let mut row = vec![
        b.gauge.clone(),
        b.date.clone(),
        b.storm.clone(),
        b.storm_index.to_string(),
        b.naive_storm_index.to_string(),
        opt(b.window_length),
        opt(b.points),
        opt(b.mean),
        opt(b.std_dev),
        opt(b.dropped),
    ];

    match &outcome.effect {
        Some(e) => row.extend([
            opt(e.start),
            opt(e.end),
            opt(e.total),
            e.above.to_string(),
            e.below.to_string(),
            e.between.to_string(),
            opt(e.peak_index),
            opt(e.peak_value),
            opt(e.peak_magnitude),
            e.termination.to_string(),
            opt(e.forced_start),
            opt(e.forced_slope),
        ]),
        None => row.extend(std::iter::repeat_n(String::new(), 12)),
    }

    row.push(outcome.error.as_ref().map(|e| e.message.clone()).unwrap_or_default());
    row
}

/// Renders the CSV table for one parameter.
pub fn parameter_table(report: &BatchReport, parameter: &str) -> String {
    let mut out = TABLE_COLUMNS.join(",");
    out.push('\n');
    for outcome in report.for_parameter(parameter) {
        let row: Vec<String> = table_row(outcome).iter().map(|f| escape(f)).collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

/// Writes `<dir>/<parameter>.csv` for every parameter in the report.
pub fn write_parameter_tables(report: &BatchReport, dir: &Path) -> io::Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();
    for parameter in report.parameters() {
        let path = dir.join(format!("{}.csv", parameter));
        fs::write(&path, parameter_table(report, parameter))?;
        written.push(path);
    }
    Ok(written)
}

// ============================================================================
// Console
// ============================================================================

pub fn print_summary(report: &BatchReport) {
    let rule = "═".repeat(60);
    println!("\n{}", rule);
    println!("STORM EFFECT SUMMARY");
    println!("{}", rule);
    println!();
    println!("Tuples:        {}", report.summary.total);
    println!("Analyzed:      {}  ({} with an effect)", report.summary.analyzed, report.summary.with_effect);
    println!("Failed:        {}", report.summary.failed);

    if !report.summary.terminations.is_empty() {
        println!();
        println!("Terminations:");
        for (kind, count) in &report.summary.terminations {
            println!("  {:<16} {}", kind, count);
        }
    }
    if !report.summary.failures_by_kind.is_empty() {
        println!();
        println!("Failures:");
        for (kind, count) in &report.summary.failures_by_kind {
            println!("  {:<24} {}", kind, count);
        }
    }

    let rate = if report.summary.total > 0 {
        (report.summary.analyzed as f64 / report.summary.total as f64) * 100.0
    } else {
        0.0
    };
    println!();
    println!("Success Rate: {:.1}% ({}/{})", rate, report.summary.analyzed, report.summary.total);
    println!("{}", rule);
}
