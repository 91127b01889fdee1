//! Piecewise-linear compression of a series.
//!
//! A series is approximated by straight segments: any segment whose
//! length-normalized squared error (`e_norm`) exceeds a threshold is split in
//! two, and the process repeats until every segment is under the threshold.
//!
//! Two different error measures are in play, and they are not interchangeable:
//! - the split point is chosen by minimizing the *raw* summed squared error of
//!   the two halves (this favours long, sparse segments);
//! - the threshold is checked against each half's `e_norm`.
//!
//! Note: `e_norm` is length-averaged squared error, not a standard error.
//!
//! Adjacent segments share their boundary point: a split of `[s, e)` at `i`
//! yields `[s, i)` and `[i - 1, e)`, so the fitted lines join at a common knot.

use crate::model::{AnalysisError, LineFit, Observation, Segment};

// ---------------------------------------------------------------------------
// Line fitting
// ---------------------------------------------------------------------------

/// Fits a least-squares line to `points[start..end]`.
///
/// The endpoints may be given in either order. The x coordinate of each point
/// is its absolute day index, so gaps in the data stretch the line correctly.
///
/// Fails with `DegenerateRange` when the range holds fewer than two points.
pub fn fit_line(points: &[Observation], start: usize, end: usize) -> Result<LineFit, AnalysisError> {
    let (start, end) = if start <= end { (start, end) } else { (end, start) };
    if end > points.len() {
        return Err(AnalysisError::IndexOutOfRange {
            index: end,
            len: points.len(),
        });
    }
    if end - start < 2 {
        return Err(AnalysisError::DegenerateRange { start, end });
    }

    let slice = &points[start..end];
    let n = slice.len() as f64;
    let mean_x = slice.iter().map(|p| p.index as f64).sum::<f64>() / n;
    let mean_y = slice.iter().map(|p| p.value).sum::<f64>() / n;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for p in slice {
        let dx = p.index as f64 - mean_x;
        sxx += dx * dx;
        sxy += dx * (p.value - mean_y);
    }
    if sxx == 0.0 {
        // every point shares one index
        return Err(AnalysisError::DegenerateRange { start, end });
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    let sse: f64 = slice
        .iter()
        .map(|p| {
            let residual = slope * p.index as f64 + intercept - p.value;
            residual * residual
        })
        .sum();

    Ok(LineFit {
        slope,
        intercept,
        sse,
        e_norm: sse / n,
    })
}

// ---------------------------------------------------------------------------
// Splitting
// ---------------------------------------------------------------------------

/// Splits one segment into the two sub-segments with the smallest summed raw
/// squared error.
///
/// - Length 3 is a fixed case: `[s, s+2)` and `[s+1, s+3)`.
/// - Otherwise every split index `i` from `s+2` through `e-2` is tried, giving
///   `[s, i)` and `[i-1, e)`. The first minimum in scan order wins.
///
/// The returned segments carry their `e_norm`, not the raw error used to pick them.
pub fn split_segment(points: &[Observation], segment: &Segment) -> Result<(Segment, Segment), AnalysisError> {
    let (start, end) = (segment.start, segment.end);
    if end > points.len() {
        return Err(AnalysisError::IndexOutOfRange {
            index: end,
            len: points.len(),
        });
    }

    match end.saturating_sub(start) {
        0..=2 => Err(AnalysisError::DegenerateRange { start, end }),
        3 => {
            let left = fit_line(points, start, start + 2)?;
            let right = fit_line(points, end - 2, end)?;
            Ok((
                Segment { start, end: start + 2, e_norm: left.e_norm },
                Segment { start: end - 2, end, e_norm: right.e_norm },
            ))
        }
        _ => {
            let mut best: Option<(f64, Segment, Segment)> = None;
            for i in (start + 2)..=(end - 2) {
                let left = fit_line(points, start, i)?;
                let right = fit_line(points, i - 1, end)?;
                let total = left.sse + right.sse;

                let improves = match &best {
                    Some((best_total, _, _)) => total < *best_total,
                    None => true,
                };
                if improves {
                    best = Some((
                        total,
                        Segment { start, end: i, e_norm: left.e_norm },
                        Segment { start: i - 1, end, e_norm: right.e_norm },
                    ));
                }
            }
            best.map(|(_, left, right)| (left, right))
                .ok_or(AnalysisError::DegenerateRange { start, end })
        }
    }
}

// ---------------------------------------------------------------------------
// Segmentation
// ---------------------------------------------------------------------------

/// Segments the whole observation slice until every segment's `e_norm` is at
/// or below `threshold`.
///
/// The points must be finite with strictly increasing indices; callers drop
/// missing values beforehand. Violations fail with `InvalidInput`.
pub fn segment_series(points: &[Observation], threshold: f64) -> Result<Vec<Segment>, AnalysisError> {
    validate_points(points)?;
    let whole = fit_line(points, 0, points.len())?;
    refine_segments(
        points,
        vec![Segment {
            start: 0,
            end: points.len(),
            e_norm: whole.e_norm,
        }],
        threshold,
    )
}

/// Continues segmentation from an existing list of segments.
///
/// Segments already at or below `threshold` come back unchanged, so running
/// this on its own output is a no-op. Length-2 segments are exact fits and
/// are never split.
pub fn refine_segments(
    points: &[Observation],
    segments: Vec<Segment>,
    threshold: f64,
) -> Result<Vec<Segment>, AnalysisError> {
    if !threshold.is_finite() || threshold < 0.0 {
        return Err(AnalysisError::InvalidInput(format!(
            "segmentation threshold must be finite and non-negative, got {}",
            threshold
        )));
    }
    validate_points(points)?;

    // worklist kept as a stack so segments come out in index order
    let mut pending: Vec<Segment> = segments.into_iter().rev().collect();
    let mut done = Vec::with_capacity(pending.len());

    while let Some(segment) = pending.pop() {
        if segment.e_norm <= threshold || segment.len() <= 2 {
            done.push(segment);
            continue;
        }
        let (left, right) = split_segment(points, &segment)?;
        pending.push(right);
        pending.push(left);
    }

    Ok(done)
}

fn validate_points(points: &[Observation]) -> Result<(), AnalysisError> {
    if let Some(bad) = points.iter().find(|p| !p.value.is_finite()) {
        return Err(AnalysisError::InvalidInput(format!(
            "non-finite value at index {}; drop missing data before segmenting",
            bad.index
        )));
    }
    if let Some(pair) = points.windows(2).find(|w| w[1].index <= w[0].index) {
        return Err(AnalysisError::InvalidInput(format!(
            "indices must strictly increase, found {} after {}",
            pair[1].index, pair[0].index
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn points(values: &[f64]) -> Vec<Observation> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| Observation::new(i, v))
            .collect()
    }

    fn noisy(n: usize) -> Vec<Observation> {
        // deterministic wiggle with a few regime changes
        points(
            &(0..n)
                .map(|i| {
                    let x = i as f64;
                    let trend = if i < n / 3 { 0.5 * x } else if i < 2 * n / 3 { 20.0 - 0.3 * x } else { 0.1 * x };
                    trend + (x * 1.7).sin() * 0.8
                })
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn test_fit_line_on_exact_line_has_zero_error() {
        let pts = points(&(0..20).map(|i| 2.0 * i as f64 + 3.0).collect::<Vec<_>>());
        for (start, end) in [(0, 20), (3, 9), (10, 12)] {
            let fit = fit_line(&pts, start, end).expect("valid range");
            assert!((fit.slope - 2.0).abs() < 1e-9, "slope for [{}, {})", start, end);
            assert!((fit.intercept - 3.0).abs() < 1e-9, "intercept for [{}, {})", start, end);
            assert!(fit.e_norm.abs() < 1e-12, "e_norm should be 0, got {}", fit.e_norm);
            assert!((fit.value_at(25.0) - 53.0).abs() < 1e-9, "line extends past the range");
        }
    }

    #[test]
    fn test_fit_line_uses_absolute_indices_across_gaps() {
        // y = x, but with days 2..5 missing
        let pts = vec![
            Observation::new(0, 0.0),
            Observation::new(1, 1.0),
            Observation::new(6, 6.0),
            Observation::new(7, 7.0),
        ];
        let fit = fit_line(&pts, 0, 4).unwrap();
        assert!((fit.slope - 1.0).abs() < 1e-12);
        assert!(fit.sse.abs() < 1e-12);
    }

    #[test]
    fn test_fit_line_is_order_independent() {
        let pts = noisy(15);
        assert_eq!(fit_line(&pts, 2, 11).unwrap(), fit_line(&pts, 11, 2).unwrap());
    }

    #[test]
    fn test_fit_line_rejects_single_point_range() {
        let pts = noisy(5);
        assert_eq!(
            fit_line(&pts, 2, 3),
            Err(AnalysisError::DegenerateRange { start: 2, end: 3 })
        );
        assert!(matches!(
            fit_line(&pts, 0, 9),
            Err(AnalysisError::IndexOutOfRange { index: 9, len: 5 })
        ));
    }

    #[test]
    fn test_e_norm_is_sse_over_length() {
        let pts = points(&[0.0, 2.0, 0.0, 2.0]);
        let fit = fit_line(&pts, 0, 4).unwrap();
        assert!((fit.e_norm - fit.sse / 4.0).abs() < 1e-12);
        assert!(fit.sse > 0.0);
    }

    #[test]
    fn test_length_three_split_is_fixed() {
        let pts = points(&[0.0, 5.0, 1.0]);
        let whole = Segment { start: 0, end: 3, e_norm: 1.0 };
        let (left, right) = split_segment(&pts, &whole).unwrap();
        assert_eq!((left.start, left.end), (0, 2));
        assert_eq!((right.start, right.end), (1, 3));
        assert!(left.e_norm.abs() < 1e-12);
        assert!(right.e_norm.abs() < 1e-12);
    }

    #[test]
    fn test_split_finds_vertex_of_tent() {
        let pts = points(&[0.0, 1.0, 2.0, 3.0, 4.0, 3.0, 2.0, 1.0, 0.0]);
        let whole = Segment { start: 0, end: 9, e_norm: 10.0 };
        let (left, right) = split_segment(&pts, &whole).unwrap();
        assert_eq!((left.start, left.end), (0, 5));
        assert_eq!((right.start, right.end), (4, 9), "halves share the vertex");
        assert!(left.e_norm < 1e-12 && right.e_norm < 1e-12);
    }

    #[test]
    fn test_split_minimizes_raw_error_not_normalized_error() {
        // The winning split must minimize left.sse + right.sse. Whether it
        // also minimizes the e_norm sum is deliberately not required.
        let pts = noisy(24);
        let whole = Segment { start: 0, end: 24, e_norm: 99.0 };
        let (left, right) = split_segment(&pts, &whole).unwrap();
        let chosen = fit_line(&pts, left.start, left.end).unwrap().sse
            + fit_line(&pts, right.start, right.end).unwrap().sse;

        for i in 2..=22 {
            let total = fit_line(&pts, 0, i).unwrap().sse + fit_line(&pts, i - 1, 24).unwrap().sse;
            assert!(
                chosen <= total + 1e-12,
                "split at {} has raw error {} below chosen {}",
                i,
                total,
                chosen
            );
        }
    }

    #[test]
    fn test_split_ties_go_to_first_candidate() {
        // a perfect line: every split has zero error, so the first wins
        let pts = points(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let (left, right) = split_segment(&pts, &Segment { start: 0, end: 6, e_norm: 1.0 }).unwrap();
        assert_eq!((left.start, left.end), (0, 2));
        assert_eq!((right.start, right.end), (1, 6));
    }

    #[test]
    fn test_split_rejects_short_segments() {
        let pts = points(&[1.0, 2.0]);
        assert!(matches!(
            split_segment(&pts, &Segment { start: 0, end: 2, e_norm: 1.0 }),
            Err(AnalysisError::DegenerateRange { .. })
        ));
    }

    #[test]
    fn test_segments_tile_range_and_meet_threshold() {
        let pts = noisy(60);
        let threshold = 0.05;
        let segments = segment_series(&pts, threshold).unwrap();

        assert_eq!(segments.first().unwrap().start, 0);
        assert_eq!(segments.last().unwrap().end, 60);
        for pair in segments.windows(2) {
            assert_eq!(pair[1].start, pair[0].end - 1, "segments must join at a shared knot");
        }
        for seg in &segments {
            assert!(seg.len() >= 2);
            assert!(seg.e_norm <= threshold || seg.len() == 2, "segment {:?} over threshold", seg);
        }
    }

    #[test]
    fn test_large_threshold_keeps_single_segment() {
        let pts = noisy(30);
        let segments = segment_series(&pts, 1e9).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!((segments[0].start, segments[0].end), (0, 30));
    }

    #[test]
    fn test_refine_is_idempotent() {
        let pts = noisy(45);
        let first = segment_series(&pts, 0.1).unwrap();
        let second = refine_segments(&pts, first.clone(), 0.1).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_zero_threshold_terminates() {
        let pts = noisy(25);
        let segments = segment_series(&pts, 0.0).unwrap();
        assert!(segments.iter().all(|s| s.len() == 2 || s.e_norm == 0.0));
    }

    #[test]
    fn test_missing_values_fail_fast() {
        let pts = vec![
            Observation::new(0, 1.0),
            Observation::new(1, f64::NAN),
            Observation::new(2, 3.0),
        ];
        assert!(matches!(segment_series(&pts, 0.1), Err(AnalysisError::InvalidInput(_))));
    }

    #[test]
    fn test_bad_threshold_and_unsorted_indices_fail() {
        let pts = noisy(10);
        assert!(matches!(segment_series(&pts, f64::NAN), Err(AnalysisError::InvalidInput(_))));
        assert!(matches!(segment_series(&pts, -1.0), Err(AnalysisError::InvalidInput(_))));

        let unsorted = vec![Observation::new(3, 1.0), Observation::new(2, 2.0)];
        assert!(matches!(segment_series(&unsorted, 0.1), Err(AnalysisError::InvalidInput(_))));
    }
}
