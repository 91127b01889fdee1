//! Core data types for the storm effect analysis: series, segments, baseline
//! windows, tolerance bands, effect profiles and the analysis error type.
//! No algorithms and no I/O live here, only types and the arithmetic that
//! belongs to them (band comparisons, line evaluation).

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::ops::Range;

// ---------------------------------------------------------------------------
// Series types
// ---------------------------------------------------------------------------

/// A daily series of one gauge parameter.
///
/// Index `i` is the day offset from the series origin. Values may be absent;
/// non-finite inputs are normalized to `None` on construction so the rest of
/// the crate only ever sees finite numbers or nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    origin: Option<NaiveDate>,
    values: Vec<Option<f64>>,
}

impl Series {
    /// Builds a series with no calendar origin.
    pub fn new(values: Vec<Option<f64>>) -> Self {
        Self::build(None, values)
    }

    /// Builds a series whose index 0 falls on `origin`.
    pub fn with_origin(origin: NaiveDate, values: Vec<Option<f64>>) -> Self {
        Self::build(Some(origin), values)
    }

    /// Builds a series from raw numbers, treating NaN as absent.
    pub fn from_values(values: &[f64]) -> Self {
        Self::build(None, values.iter().map(|&v| Some(v)).collect())
    }

    fn build(origin: Option<NaiveDate>, values: Vec<Option<f64>>) -> Self {
        let values = values
            .into_iter()
            .map(|v| v.filter(|x| x.is_finite()))
            .collect();
        Self { origin, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `index`, or `None` when absent or out of range.
    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied().flatten()
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    pub fn origin(&self) -> Option<NaiveDate> {
        self.origin
    }

    /// Calendar date of `index`, if the series has an origin.
    pub fn date_at(&self, index: usize) -> Option<NaiveDate> {
        self.origin.map(|o| o + Duration::days(index as i64))
    }

    /// Day offset of `date`, if the series has an origin and covers it.
    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        let days = (date - self.origin?).num_days();
        if days < 0 || days as usize >= self.values.len() {
            None
        } else {
            Some(days as usize)
        }
    }

    /// Present values inside `range` (clipped to the series), keeping their
    /// absolute indices.
    pub fn observations(&self, range: Range<usize>) -> Vec<Observation> {
        let end = range.end.min(self.values.len());
        let start = range.start.min(end);
        (start..end)
            .filter_map(|index| self.values[index].map(|value| Observation { index, value }))
            .collect()
    }

    /// Number of present values inside `range` (clipped to the series).
    pub fn present_count(&self, range: Range<usize>) -> usize {
        let end = range.end.min(self.values.len());
        let start = range.start.min(end);
        self.values[start..end].iter().filter(|v| v.is_some()).count()
    }
}

/// A single present value and its absolute day index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub index: usize,
    pub value: f64,
}

impl Observation {
    pub fn new(index: usize, value: f64) -> Self {
        Self { index, value }
    }
}

// ---------------------------------------------------------------------------
// Segmentation types
// ---------------------------------------------------------------------------

/// Half-open position range `[start, end)` over an observation slice, with
/// the length-normalized squared error of its best-fit line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
    pub e_norm: f64,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Least-squares line over a range of observations.
///
/// `sse` is the raw sum of squared residuals; `e_norm` is `sse` divided by
/// the number of points in the range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFit {
    pub slope: f64,
    pub intercept: f64,
    pub sse: f64,
    pub e_norm: f64,
}

impl LineFit {
    pub fn value_at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

// ---------------------------------------------------------------------------
// Baseline types
// ---------------------------------------------------------------------------

/// Absolute index range `[start, end)` of a pre-effect window. `end` is the
/// perturbation index itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreEffectWindow {
    pub start: usize,
    pub end: usize,
}

impl PreEffectWindow {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Statistics of the present values inside a pre-effect window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub mean: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    /// Points kept after outlier trimming.
    pub points: usize,
    /// Points dropped as outliers.
    pub dropped: usize,
}

/// A pre-effect window together with its statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaselineWindow {
    pub window: PreEffectWindow,
    pub stats: WindowStats,
}

impl BaselineWindow {
    pub fn band(&self) -> ToleranceBand {
        ToleranceBand::new(self.stats.mean, self.stats.std_dev)
    }
}

/// The range of "normal" values: `mean ± std_dev`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToleranceBand {
    pub low: f64,
    pub high: f64,
}

/// Where a value sits relative to a tolerance band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandPosition {
    Above,
    Within,
    Below,
}

impl ToleranceBand {
    pub fn new(mean: f64, std_dev: f64) -> Self {
        Self {
            low: mean - std_dev,
            high: mean + std_dev,
        }
    }

    /// Inclusive on both bounds.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }

    pub fn position(&self, value: f64) -> BandPosition {
        if value > self.high {
            BandPosition::Above
        } else if value < self.low {
            BandPosition::Below
        } else {
            BandPosition::Within
        }
    }
}

// ---------------------------------------------------------------------------
// Effect types
// ---------------------------------------------------------------------------

/// Expected direction of a perturbation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// The parameter rises above the band (+1).
    Above,
    /// The parameter falls below the band (-1).
    Below,
}

impl Direction {
    /// Maps the conventional `+1` / `-1` effect sign onto a direction.
    pub fn from_sign(sign: i64) -> Result<Self, AnalysisError> {
        match sign {
            1 => Ok(Direction::Above),
            -1 => Ok(Direction::Below),
            other => Err(AnalysisError::InvalidInput(format!(
                "effect direction must be 1 or -1, got {}",
                other
            ))),
        }
    }

    pub fn sign(self) -> i64 {
        match self {
            Direction::Above => 1,
            Direction::Below => -1,
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            Direction::Above => Direction::Below,
            Direction::Below => Direction::Above,
        }
    }

    /// The band edge a value must cross to count as perturbed.
    pub fn bound(self, band: &ToleranceBand) -> f64 {
        match self {
            Direction::Above => band.high,
            Direction::Below => band.low,
        }
    }

    /// Strictly beyond the band on this direction's side.
    pub fn exceeds(self, value: f64, band: &ToleranceBand) -> bool {
        match self {
            Direction::Above => value > band.high,
            Direction::Below => value < band.low,
        }
    }

    /// `true` when moving from `previous` to `current` heads back toward the band.
    pub fn toward(self, previous: f64, current: f64) -> bool {
        match self {
            Direction::Above => current < previous,
            Direction::Below => current > previous,
        }
    }

    /// `true` when a fitted slope heads back toward the band.
    pub fn slope_toward(self, slope: f64) -> bool {
        match self {
            Direction::Above => slope < 0.0,
            Direction::Below => slope > 0.0,
        }
    }

    /// `true` when `candidate` is a more extreme value than `incumbent`.
    pub fn more_extreme(self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Direction::Above => candidate > incumbent,
            Direction::Below => candidate < incumbent,
        }
    }
}

/// How an effect window ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationKind {
    /// The signal re-entered the tolerance band.
    Natural,
    /// A stalled return was extrapolated to the band.
    Forced,
    /// Too many consecutive days without data.
    Dropout,
    /// The effect reached the configured maximum length.
    MaxEffect,
    /// The series ended before the effect did.
    EndOfRecord,
    /// Forced termination was required but no usable return line existed.
    ForcingError,
    /// No effect was registered.
    #[serde(rename = "none")]
    NoEffect,
}

impl TerminationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationKind::Natural => "natural",
            TerminationKind::Forced => "forced",
            TerminationKind::Dropout => "dropout",
            TerminationKind::MaxEffect => "max_effect",
            TerminationKind::EndOfRecord => "end_of_record",
            TerminationKind::ForcingError => "forcing_error",
            TerminationKind::NoEffect => "none",
        }
    }
}

impl std::fmt::Display for TerminationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The line used to force an effect to completion.
///
/// The line passes through the anchor day `(start, anchor_value)` with the
/// least-squares slope of the returning history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Forcing {
    pub start: usize,
    pub anchor_value: f64,
    pub slope: f64,
}

impl Forcing {
    pub fn value_at(&self, index: usize) -> f64 {
        self.anchor_value + (index as f64 - self.start as f64) * self.slope
    }
}

/// The tracked response of one parameter to one perturbation.
///
/// `start` and `end` are both `None` when no effect was registered. Days in
/// `[start, end)` are counted exactly once across the three tallies.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectProfile {
    pub start: Option<usize>,
    pub end: Option<usize>,
    pub days_above: usize,
    pub days_below: usize,
    pub days_between: usize,
    pub termination: TerminationKind,
    pub forcing: Option<Forcing>,
}

impl EffectProfile {
    pub fn no_effect() -> Self {
        Self {
            start: None,
            end: None,
            days_above: 0,
            days_below: 0,
            days_between: 0,
            termination: TerminationKind::NoEffect,
            forcing: None,
        }
    }

    pub fn has_effect(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }

    /// `end - start`, when an effect was registered.
    pub fn length(&self) -> Option<usize> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

/// The most extreme observation inside an effect window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub index: usize,
    pub value: f64,
    /// `value - baseline mean`.
    pub magnitude: f64,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise while analyzing one (gauge, storm, parameter) tuple.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// A line fit or split was requested over fewer points than it needs.
    DegenerateRange { start: usize, end: usize },
    /// Segmentation was given missing/non-finite data or an unusable
    /// threshold. Indicates a caller bug.
    InvalidInput(String),
    /// No segment preceding the perturbation could serve as a baseline.
    NoWindowFound { perturbation: usize },
    /// A stalled return could not be extrapolated.
    ForcedReturnImpossible { anchor: usize },
    /// The history before an index has no computable standard deviation.
    UndefinedVariability { at_index: usize },
    /// An index fell outside the series.
    IndexOutOfRange { index: usize, len: usize },
    /// A window contained no present values.
    EmptyWindow { start: usize, end: usize },
}

impl AnalysisError {
    /// Short machine-readable name, used in reports and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::DegenerateRange { .. } => "degenerate_range",
            AnalysisError::InvalidInput(_) => "invalid_input",
            AnalysisError::NoWindowFound { .. } => "no_window_found",
            AnalysisError::ForcedReturnImpossible { .. } => "forced_return_impossible",
            AnalysisError::UndefinedVariability { .. } => "undefined_variability",
            AnalysisError::IndexOutOfRange { .. } => "index_out_of_range",
            AnalysisError::EmptyWindow { .. } => "empty_window",
        }
    }
}

impl std::fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisError::DegenerateRange { start, end } => {
                write!(f, "Degenerate range [{}, {}): at least 2 points required", start, end)
            }
            AnalysisError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            AnalysisError::NoWindowFound { perturbation } => {
                write!(f, "No pre-effect window found before index {}", perturbation)
            }
            AnalysisError::ForcedReturnImpossible { anchor } => {
                write!(f, "Forced return impossible from index {}", anchor)
            }
            AnalysisError::UndefinedVariability { at_index } => {
                write!(f, "Undefined variability in history before index {}", at_index)
            }
            AnalysisError::IndexOutOfRange { index, len } => {
                write!(f, "Index {} out of range for series of length {}", index, len)
            }
            AnalysisError::EmptyWindow { start, end } => {
                write!(f, "No data in window [{}, {})", start, end)
            }
        }
    }
}

impl std::error::Error for AnalysisError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
