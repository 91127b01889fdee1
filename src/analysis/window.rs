/// Pre-effect window selection and statistics.
///
/// The baseline for a storm is the most recent stretch of data that a single
/// straight line describes well. The data around the storm is segmented with
/// the variability threshold; the last segment starting before the storm
/// gives the window, clamped to `[min_win, max_win]` days.

use crate::analysis::compression::segment_series;
use crate::analysis::variability::{mean, population_std_dev};
use crate::config::WindowConfig;
use crate::model::{AnalysisError, BaselineWindow, PreEffectWindow, Series, WindowStats};

/// Points further than this many standard deviations from the raw window
/// mean are trimmed.
pub const OUTLIER_STDDEVS: f64 = 1.5;

// ---------------------------------------------------------------------------
// Window selection
// ---------------------------------------------------------------------------

/// Picks the pre-effect window ending at `perturbation`.
///
/// Searches `search_width / 2` days either side of the perturbation
/// (inclusive, clipped to the series).
pub fn select_pre_effect_window(
    series: &Series,
    threshold: f64,
    perturbation: usize,
    search_width: usize,
    min_win: usize,
    max_win: usize,
) -> Result<PreEffectWindow, AnalysisError> {
    if perturbation >= series.len() {
        return Err(AnalysisError::IndexOutOfRange {
            index: perturbation,
            len: series.len(),
        });
    }
    if min_win == 0 || min_win > max_win {
        return Err(AnalysisError::InvalidInput(format!(
            "window bounds must satisfy 1 <= min_win <= max_win, got {}..{}",
            min_win, max_win
        )));
    }
    if perturbation < min_win {
        return Err(AnalysisError::NoWindowFound { perturbation });
    }

    let half = search_width / 2;
    let points = series.observations(perturbation.saturating_sub(half)..perturbation + half + 1);
    if points.len() < 2 {
        return Err(AnalysisError::NoWindowFound { perturbation });
    }

    let segments = segment_series(&points, threshold)?;
    let segment_start = segments
        .iter()
        .rev()
        .map(|seg| points[seg.start].index)
        .find(|&start| start < perturbation)
        .ok_or(AnalysisError::NoWindowFound { perturbation })?;

    let length = perturbation - segment_start;
    let start = if length < min_win {
        perturbation - min_win
    } else if length > max_win {
        perturbation - max_win
    } else {
        segment_start
    };

    Ok(PreEffectWindow {
        start,
        end: perturbation,
    })
}

// ---------------------------------------------------------------------------
// Window statistics
// ---------------------------------------------------------------------------

/// Mean and population standard deviation of the present values in `window`.
///
/// With `trim_outliers`, values outside `mean ± 1.5σ` (bounds inclusive) are
/// dropped and the statistics recomputed once.
pub fn analyze_window(series: &Series, window: &PreEffectWindow, trim_outliers: bool) -> Result<WindowStats, AnalysisError> {
    let empty = AnalysisError::EmptyWindow {
        start: window.start,
        end: window.end,
    };
    let values: Vec<f64> = series
        .observations(window.start..window.end)
        .into_iter()
        .map(|o| o.value)
        .collect();

    let raw_mean = mean(&values).ok_or_else(|| empty.clone())?;
    let raw_sd = population_std_dev(&values).ok_or(empty)?;
    let untrimmed = WindowStats {
        mean: raw_mean,
        std_dev: raw_sd,
        points: values.len(),
        dropped: 0,
    };
    if !trim_outliers {
        return Ok(untrimmed);
    }

    let (low, high) = (raw_mean - OUTLIER_STDDEVS * raw_sd, raw_mean + OUTLIER_STDDEVS * raw_sd);
    let kept: Vec<f64> = values.iter().copied().filter(|v| *v >= low && *v <= high).collect();

    // a constant window whose mean rounds off its values can lose every point
    let (Some(trimmed_mean), Some(trimmed_sd)) = (mean(&kept), population_std_dev(&kept)) else {
        return Ok(untrimmed);
    };

    Ok(WindowStats {
        mean: trimmed_mean,
        std_dev: trimmed_sd,
        points: kept.len(),
        dropped: values.len() - kept.len(),
    })
}

/// Threshold, window and statistics in one step.
pub fn baseline_window(
    series: &Series,
    threshold: f64,
    perturbation: usize,
    config: &WindowConfig,
) -> Result<BaselineWindow, AnalysisError> {
    let window = select_pre_effect_window(
        series,
        threshold,
        perturbation,
        config.search_width,
        config.min_win,
        config.max_win,
    )?;
    let stats = analyze_window(series, &window, config.trim_outliers)?;
    Ok(BaselineWindow { window, stats })
}
