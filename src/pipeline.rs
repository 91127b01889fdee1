//! Batch Analysis Pipeline
//!
//! Turns loaded gauges and storm landfalls into one analysis task per
//! (gauge, storm, parameter), runs every task, and collects the outcomes.
//!
//! Tasks are independent: each reads shared, immutable series and returns an
//! owned outcome, so the batch fans out over a rayon thread pool. A failing
//! task records its error and never stops the batch.

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::analysis::effect::{find_peak, track_effect};
use crate::analysis::onset::resolve_storm_onset;
use crate::analysis::variability::error_threshold;
use crate::analysis::window::baseline_window;
use crate::config::{AnalysisConfig, OnsetConfig};
use crate::ingest::gauge_csv::GaugeData;
use crate::ingest::storms::GaugeStorms;
use crate::logging::{self, Stage};
use crate::model::{AnalysisError, Direction, EffectProfile, Peak, Series, TerminationKind};
use crate::report::BatchReport;

// ============================================================================
// Storm events
// ============================================================================

/// A storm as seen by one gauge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StormEvent {
    pub gauge: String,
    pub storm: String,
    pub landfall: NaiveDate,
    /// Onset day offset (rain-adjusted when the gauge records rain).
    pub storm_index: usize,
    /// Landfall day offset.
    pub naive_index: usize,
}

impl StormEvent {
    pub fn onset_date(&self, gauge: &GaugeData) -> NaiveDate {
        gauge.origin + chrono::Duration::days(self.storm_index as i64)
    }
}

/// Resolves every gauge/storm pair to day offsets.
///
/// Storms whose landfall falls outside a gauge's record are skipped, as are
/// storms that left less than `min_rain` at a gauge that records rain.
pub fn resolve_events(
    gauges: &BTreeMap<String, GaugeData>,
    gauge_storms: &GaugeStorms,
    onset: &OnsetConfig,
) -> Vec<StormEvent> {
    let mut events = Vec::new();

    for (gauge_id, storms) in gauge_storms {
        let Some(gauge) = gauges.get(gauge_id) else {
            continue;
        };
        for (storm, &landfall) in storms {
            let context = format!("{}/{}", gauge_id, storm);
            let Some(naive_index) = gauge.index_of(landfall) else {
                logging::debug(Stage::Batch, Some(&context), "landfall outside gauge record");
                continue;
            };

            let storm_index = match gauge.series(&onset.rain_column) {
                Some(rain) => match resolve_storm_onset(rain, naive_index, onset.window, onset.min_rain) {
                    Some(index) => index,
                    None => {
                        logging::info(Stage::Batch, Some(&context), "too little rain for an onset; skipped");
                        continue;
                    }
                },
                None => naive_index,
            };

            events.push(StormEvent {
                gauge: gauge_id.clone(),
                storm: storm.clone(),
                landfall,
                storm_index,
                naive_index,
            });
        }
    }

    events
}

// ============================================================================
// Tasks and records
// ============================================================================

/// One (gauge, storm, parameter) tuple to analyze.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisTask {
    pub gauge: String,
    pub storm: String,
    pub date: NaiveDate,
    pub storm_index: usize,
    pub naive_index: usize,
    pub parameter: String,
    pub direction: Direction,
}

impl AnalysisTask {
    pub fn label(&self) -> String {
        format!("{}/{}/{}", self.gauge, self.storm, self.parameter)
    }
}

/// Pre-effect baseline columns of an output row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BaselineRecord {
    pub gauge: String,
    pub date: String,
    pub storm: String,
    pub storm_index: usize,
    pub naive_storm_index: usize,
    pub parameter: String,
    pub threshold: Option<f64>,
    pub window_start: Option<usize>,
    pub window_length: Option<usize>,
    pub points: Option<usize>,
    pub mean: Option<f64>,
    pub std_dev: Option<f64>,
    pub dropped: Option<usize>,
}

/// Effect columns of an output row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectRecord {
    pub start: Option<usize>,
    pub end: Option<usize>,
    pub total: Option<usize>,
    pub above: usize,
    pub below: usize,
    pub between: usize,
    pub peak_index: Option<usize>,
    pub peak_value: Option<f64>,
    pub peak_magnitude: Option<f64>,
    pub termination: TerminationKind,
    pub forced_start: Option<usize>,
    pub forced_slope: Option<f64>,
}

impl EffectRecord {
    pub fn from_profile(profile: &EffectProfile, peak: Option<Peak>) -> Self {
        Self {
            start: profile.start,
            end: profile.end,
            total: profile.length(),
            above: profile.days_above,
            below: profile.days_below,
            between: profile.days_between,
            peak_index: peak.map(|p| p.index),
            peak_value: peak.map(|p| p.value),
            peak_magnitude: peak.map(|p| p.magnitude),
            termination: profile.termination,
            forced_start: profile.forcing.map(|f| f.start),
            forced_slope: profile.forcing.map(|f| f.slope),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskError {
    pub kind: String,
    pub message: String,
}

impl From<&AnalysisError> for TaskError {
    fn from(err: &AnalysisError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Result of one task. Baseline columns are filled as far as the analysis got.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskOutcome {
    pub baseline: BaselineRecord,
    pub effect: Option<EffectRecord>,
    pub error: Option<TaskError>,
}

impl TaskOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

// ============================================================================
// Running
// ============================================================================

/// Threshold → window → statistics → effect → peak for one task.
pub fn analyze_task(series: &Series, task: &AnalysisTask, config: &AnalysisConfig) -> TaskOutcome {
    let mut baseline = BaselineRecord {
        gauge: task.gauge.clone(),
        date: task.date.format("%Y-%m-%d").to_string(),
        storm: task.storm.clone(),
        storm_index: task.storm_index,
        naive_storm_index: task.naive_index,
        parameter: task.parameter.clone(),
        threshold: None,
        window_start: None,
        window_length: None,
        points: None,
        mean: None,
        std_dev: None,
        dropped: None,
    };

    match run_stages(series, task, config, &mut baseline) {
        Ok(effect) => TaskOutcome {
            baseline,
            effect: Some(effect),
            error: None,
        },
        Err(err) => {
            logging::log_tuple_failure(&task.label(), &err);
            TaskOutcome {
                baseline,
                effect: None,
                error: Some(TaskError::from(&err)),
            }
        }
    }
}

fn run_stages(
    series: &Series,
    task: &AnalysisTask,
    config: &AnalysisConfig,
    baseline: &mut BaselineRecord,
) -> Result<EffectRecord, AnalysisError> {
    let threshold = error_threshold(series, task.storm_index, &config.variability)?;
    baseline.threshold = Some(threshold);

    let window = baseline_window(series, threshold, task.storm_index, &config.window)?;
    baseline.window_start = Some(window.window.start);
    baseline.window_length = Some(window.window.len());
    baseline.points = Some(window.stats.points);
    baseline.mean = Some(window.stats.mean);
    baseline.std_dev = Some(window.stats.std_dev);
    baseline.dropped = Some(window.stats.dropped);

    let profile = track_effect(series, &window.band(), task.storm_index, task.direction, &config.effect)?;
    let peak = find_peak(series, &profile, task.direction, window.stats.mean);
    logging::debug(
        Stage::Effect,
        Some(&task.label()),
        &format!("{} ({:?} days)", profile.termination, profile.length()),
    );

    Ok(EffectRecord::from_profile(&profile, peak))
}

/// One task per event and configured parameter the gauge actually records.
pub fn build_tasks(
    gauges: &BTreeMap<String, GaugeData>,
    events: &[StormEvent],
    directions: &BTreeMap<String, Direction>,
) -> Vec<AnalysisTask> {
    let mut tasks = Vec::new();
    for event in events {
        let Some(gauge) = gauges.get(&event.gauge) else {
            continue;
        };
        for (parameter, &direction) in directions {
            if gauge.series(parameter).is_none() {
                logging::debug(
                    Stage::Batch,
                    Some(&event.gauge),
                    &format!("no '{}' column; skipped", parameter),
                );
                continue;
            }
            tasks.push(AnalysisTask {
                gauge: event.gauge.clone(),
                storm: event.storm.clone(),
                date: event.onset_date(gauge),
                storm_index: event.storm_index,
                naive_index: event.naive_index,
                parameter: parameter.clone(),
                direction,
            });
        }
    }
    tasks
}

/// Runs every task in parallel. Outcomes keep task order.
pub fn run_tasks(
    gauges: &BTreeMap<String, GaugeData>,
    tasks: &[AnalysisTask],
    config: &AnalysisConfig,
) -> Vec<TaskOutcome> {
    tasks
        .par_iter()
        .filter_map(|task| {
            let series = gauges.get(&task.gauge)?.series(&task.parameter)?;
            Some(analyze_task(series, task, config))
        })
        .collect()
}

/// Builds, runs and summarizes the whole batch.
pub fn run_batch(
    gauges: &BTreeMap<String, GaugeData>,
    events: &[StormEvent],
    directions: &BTreeMap<String, Direction>,
    config: &AnalysisConfig,
) -> BatchReport {
    let tasks = build_tasks(gauges, events, directions);
    logging::info(
        Stage::Batch,
        None,
        &format!("Analyzing {} tuples from {} storm events", tasks.len(), events.len()),
    );

    let report = BatchReport::new(run_tasks(gauges, &tasks, config));
    logging::log_batch_summary(report.summary.total, report.summary.analyzed, report.summary.failed);
    report
}
