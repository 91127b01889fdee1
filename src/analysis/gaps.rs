/// Linear gap filling for daily series.
///
/// The effect tracker steps day by day and needs a value on every day, so
/// missing days are filled by straight-line interpolation between the nearest
/// present neighbours. Leading and trailing gaps take the nearest present
/// value. Which days were filled is still known from the raw series.

use crate::model::Observation;

/// Linear value between two observations at `index`.
pub fn interpolate_pair(start: &Observation, end: &Observation, index: usize) -> f64 {
    let days = end.index.saturating_sub(start.index);
    if days == 0 {
        return start.value;
    }
    let slope = (end.value - start.value) / days as f64;
    start.value + slope * (index as f64 - start.index as f64)
}

/// Fills every absent entry. Returns `None` when nothing is present.
pub fn fill_gaps(values: &[Option<f64>]) -> Option<Vec<f64>> {
    let known: Vec<Observation> = values
        .iter()
        .enumerate()
        .filter_map(|(index, v)| v.map(|value| Observation { index, value }))
        .collect();

    let first = *known.first()?;
    let last = *known.last()?;

    let mut filled = vec![first.value; values.len()];
    for pair in known.windows(2) {
        let (start, end) = (&pair[0], &pair[1]);
        for index in start.index..end.index {
            filled[index] = interpolate_pair(start, end, index);
        }
    }
    for slot in filled.iter_mut().skip(last.index) {
        *slot = last.value;
    }

    Some(filled)
}
