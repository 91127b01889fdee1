/// Storm onset from rainfall at the gauge.
///
/// Landfall dates are coarse: a storm can reach an inland gauge a day or two
/// after landfall, or its outer bands can arrive first. When the gauge records
/// rainfall, the onset is moved to the wettest day near landfall.

use std::ops::Range;

use crate::model::Series;

// ============================================================================
// Precipitation Analysis Helpers
// ============================================================================

/// Total rainfall over `range` (clipped), ignoring missing days.
pub fn cumulative_rain(rain: &Series, range: Range<usize>) -> f64 {
    rain.observations(range).iter().map(|o| o.value).sum()
}

/// Whether at least `min_rain` fell over `range`.
pub fn detect_rainfall_event(rain: &Series, range: Range<usize>, min_rain: f64) -> bool {
    cumulative_rain(rain, range) >= min_rain
}

/// Day of heaviest rain within `landfall ± window` (inclusive, clipped).
///
/// Returns `None` when the span holds less than `min_rain` in total or has no
/// rain data at all. Ties go to the earliest day.
pub fn resolve_storm_onset(rain: &Series, landfall_index: usize, window: usize, min_rain: f64) -> Option<usize> {
    let span = landfall_index.saturating_sub(window)..landfall_index.saturating_add(window + 1);
    if !detect_rainfall_event(rain, span.clone(), min_rain) {
        return None;
    }

    rain.observations(span)
        .into_iter()
        .fold(None, |best: Option<(usize, f64)>, obs| match best {
            Some((_, value)) if value >= obs.value => best,
            _ => Some((obs.index, obs.value)),
        })
        .map(|(index, _)| index)
}

// ============================================================================
// Tests
// ============================================================================
