/// Scenario tests for effect tracking through the public API
///
/// Each scenario builds a small series by hand, with values chosen so every
/// band comparison is exact, and checks where the effect starts, where it
/// ends and why.
///
/// Run with: cargo test --test effect_scenarios

use storm_effect::analysis::effect::{find_peak, track_effect};
use storm_effect::analysis::variability::error_threshold;
use storm_effect::analysis::window::{baseline_window, select_pre_effect_window};
use storm_effect::config::{EffectConfig, ForcingConfig, VariabilityConfig, WindowConfig};
use storm_effect::model::{AnalysisError, Direction, Series, TerminationKind, ToleranceBand};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

/// `base` everywhere except the given (index, value) overrides.
fn series_with(len: usize, base: f64, overrides: &[(usize, f64)]) -> Series {
    let mut values = vec![base; len];
    for &(i, v) in overrides {
        values[i] = v;
    }
    Series::from_values(&values)
}

/// Alternates 4.5 / 5.5 for 60 days, then a storm on day 60 and a linear
/// recession back to 5.0 by day 65.
fn storm_series() -> Series {
    let mut values: Vec<f64> = (0..60).map(|d| if d % 2 == 0 { 4.5 } else { 5.5 }).collect();
    values.extend([5.0, 9.0, 8.0, 7.0, 6.0]);
    values.extend(std::iter::repeat_n(5.0, 35));
    Series::from_values(&values)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn test_storm_chain_from_threshold_to_peak() {
    let series = storm_series();
    let storm = 60;

    let threshold = error_threshold(&series, storm, &VariabilityConfig::default()).unwrap();
    assert!((threshold - 0.25).abs() < 1e-9, "half of the typical 0.5 spread, got {}", threshold);

    let baseline = baseline_window(&series, threshold, storm, &WindowConfig::default()).unwrap();
    assert_eq!(baseline.window.end, storm);
    assert!((5..=10).contains(&baseline.window.len()));
    assert_eq!(baseline.stats.dropped, 0, "the alternating baseline has no outliers");

    let profile = track_effect(&series, &baseline.band(), storm, Direction::Above, &EffectConfig::default()).unwrap();
    assert_eq!(profile.termination, TerminationKind::Natural);
    assert_eq!((profile.start, profile.end), (Some(61), Some(65)));
    assert_eq!(profile.days_above, 4);

    let peak = find_peak(&series, &profile, Direction::Above, baseline.stats.mean).unwrap();
    assert_eq!((peak.index, peak.value), (61, 9.0));
    assert!((peak.magnitude - (9.0 - baseline.stats.mean)).abs() < 1e-12);
}

#[test]
fn test_storm_has_no_effect_in_the_wrong_direction() {
    let series = storm_series();
    let band = ToleranceBand::new(5.0, 0.5);
    let profile = track_effect(&series, &band, 60, Direction::Below, &EffectConfig::default()).unwrap();
    assert!(!profile.has_effect());
    assert_eq!(profile.termination, TerminationKind::NoEffect);
    assert!(find_peak(&series, &profile, Direction::Below, 5.0).is_none());
}

#[test]
fn test_dropout_scenario() {
    // five missing days after a two-day rise, more than max_dropout allows
    let mut values: Vec<Option<f64>> = vec![Some(10.0); 20];
    values[6] = Some(14.0);
    values[7] = Some(13.0);
    for v in values.iter_mut().take(13).skip(8) {
        *v = None;
    }
    let series = Series::new(values);

    let profile = track_effect(
        &series,
        &ToleranceBand::new(10.0, 1.0),
        5,
        Direction::Above,
        &EffectConfig::default(),
    )
    .unwrap();
    assert_eq!(profile.termination, TerminationKind::Dropout);
    assert_eq!((profile.start, profile.end), (Some(6), Some(8)), "ends at the first missing day");
    assert_eq!(profile.days_above, 2);
}

#[test]
fn test_forced_scenario_below() {
    // pH drops to 3 and recovers one unit a day until it stalls at 5
    let series = series_with(40, 7.0, &[(11, 3.0), (12, 4.0), (13, 5.0), (14, 5.0), (15, 5.0)]);
    let config = EffectConfig {
        forcing: ForcingConfig::new(2, 3),
        ..EffectConfig::default()
    };

    let profile = track_effect(&series, &ToleranceBand::new(7.0, 0.5), 10, Direction::Below, &config).unwrap();
    assert_eq!(profile.termination, TerminationKind::Forced);
    assert_eq!((profile.start, profile.end), (Some(11), Some(15)));

    let forcing = profile.forcing.unwrap();
    assert_eq!(forcing.start, 13, "the line is anchored on the last day before the stall");
    assert!((forcing.slope - 1.0).abs() < 1e-9);
    assert_eq!(profile.days_below, 4, "day 14 is still below the band on the line");
}

#[test]
fn test_forced_scenario_disabled_runs_to_record_end() {
    let series = series_with(20, 7.0, &[(11, 3.0), (12, 4.0), (13, 5.0), (14, 5.0), (15, 5.0), (16, 5.0), (17, 5.0), (18, 5.0), (19, 5.0)]);
    let config = EffectConfig {
        forcing: ForcingConfig::disabled(),
        ..EffectConfig::default()
    };
    let profile = track_effect(&series, &ToleranceBand::new(7.0, 0.5), 10, Direction::Below, &config).unwrap();
    assert_eq!(profile.termination, TerminationKind::EndOfRecord);
    assert_eq!(profile.end, Some(19));
}

#[test]
fn test_perturbation_too_early_for_a_window() {
    let series = storm_series();
    let result = select_pre_effect_window(&series, 0.25, 3, 70, 5, 10);
    assert!(matches!(result, Err(AnalysisError::NoWindowFound { perturbation: 3 })));
}

#[test]
fn test_short_history_has_undefined_variability() {
    let series = storm_series();
    let result = error_threshold(&series, 10, &VariabilityConfig::default());
    assert!(matches!(result, Err(AnalysisError::UndefinedVariability { .. })));
}
