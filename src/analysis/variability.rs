/// Typical short-term variability of a series.
///
/// The history before a storm is cut into fixed-length windows; the mean of
/// the per-window population standard deviations is the "typical" spread of
/// the signal, and a multiple of it becomes the segmentation threshold.

use crate::config::VariabilityConfig;
use crate::model::{AnalysisError, Series};

// ---------------------------------------------------------------------------
// Small statistics helpers
// ---------------------------------------------------------------------------

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Population standard deviation (divides by `n`).
pub fn population_std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let variance = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

// ---------------------------------------------------------------------------
// Windowed variability
// ---------------------------------------------------------------------------

/// Mean of the population standard deviations of full windows
/// `[k, k + window_size)`, `k = 0, step, 2*step, ...`.
///
/// Absent values are skipped inside a window; a window with fewer than two
/// present values contributes nothing. Returns `None` when no window contributes.
pub fn windowed_std_dev(values: &[Option<f64>], window_size: usize, step: usize) -> Option<f64> {
    if window_size == 0 || step == 0 {
        return None;
    }

    let deviations: Vec<f64> = (0..)
        .step_by(step)
        .take_while(|&k| k + window_size <= values.len())
        .filter_map(|k| {
            let present: Vec<f64> = values[k..k + window_size].iter().flatten().copied().collect();
            if present.len() < 2 {
                return None;
            }
            population_std_dev(&present)
        })
        .collect();

    mean(&deviations)
}

/// Typical variability of the `history_length` days before `at_index`.
///
/// The history start saturates at 0, so early storms use whatever history
/// exists. Fails with `UndefinedVariability` when not a single window fits.
pub fn typical_std_dev(
    series: &Series,
    at_index: usize,
    history_length: usize,
    window_size: usize,
    step: usize,
) -> Result<f64, AnalysisError> {
    if at_index > series.len() {
        return Err(AnalysisError::IndexOutOfRange {
            index: at_index,
            len: series.len(),
        });
    }
    let start = at_index.saturating_sub(history_length);
    windowed_std_dev(&series.values()[start..at_index], window_size, step)
        .ok_or(AnalysisError::UndefinedVariability { at_index })
}

/// Segmentation threshold at `at_index`: typical variability times
/// `stddevs_for_error`.
pub fn error_threshold(series: &Series, at_index: usize, config: &VariabilityConfig) -> Result<f64, AnalysisError> {
    let typical = typical_std_dev(
        series,
        at_index,
        config.history_length,
        config.window_size,
        config.step,
    )?;
    Ok(typical * config.stddevs_for_error)
}
