/// End-to-end test of a batch run over files on disk
///
/// Tests verify:
/// 1. Config, storm table, gauge lists and gauge CSVs load from a study directory
/// 2. Unreadable gauges and out-of-record storms are skipped, not fatal
/// 3. Rain moves the onset and the effect is tracked from there
/// 4. Parameter tables and the JSON report are written
///
/// Run with: cargo test --test pipeline_integration

use chrono::{Duration, NaiveDate};
use std::fs;
use std::path::Path;

use storm_effect::config::load_config;
use storm_effect::ingest::gauge_csv::read_gauge_dir;
use storm_effect::ingest::storms::load_gauge_storms;
use storm_effect::model::TerminationKind;
use storm_effect::parameters::resolve_directions;
use storm_effect::pipeline::{resolve_events, run_batch};
use storm_effect::report::{write_json, write_parameter_tables};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

/// 120 days from 2005-06-01: an alternating baseline, 3.5 of rain on day 81,
/// turbidity at 10 on days 81..=88 and flat afterwards.
fn storm_gauge_csv() -> String {
    let origin = NaiveDate::from_ymd_opt(2005, 6, 1).unwrap();
    let mut csv = String::from("Date,Turb Detrend,Rain\n");
    for day in 0..120 {
        let date = origin + Duration::days(day);
        let turb = match day {
            81..=88 => 10.0,
            89.. => 0.0,
            d if d % 2 == 0 => -0.5,
            _ => 0.5,
        };
        let rain = if day == 81 { 3.5 } else { 0.0 };
        csv.push_str(&format!("{},{},{}\n", date.format("%Y/%m/%d"), turb, rain));
    }
    csv
}

fn write_study(root: &Path) {
    let data = root.join("station_data");
    let gauges = root.join("storms").join("gauges");
    fs::create_dir_all(&data).unwrap();
    fs::create_dir_all(&gauges).unwrap();

    fs::write(root.join("storms").join("hurricanes.csv"), "YEAR,HURRICANE,LANDFALL\n2005,Katrina,2005/08/19\n").unwrap();
    // G2 has no data file; G3's record ends long before landfall
    fs::write(gauges.join("Katrina.txt"), "'G1'\n'G2'\n'G3'\n").unwrap();
    fs::write(data.join("G1.csv"), storm_gauge_csv()).unwrap();
    fs::write(data.join("G3.csv"), "Date,Turb Detrend\n2004/01/01,1.0\n2004/01/02,1.5\n").unwrap();

    let config = format!(
        "[paths]\n\
         data_dir = \"{data}\"\n\
         storms_file = \"{storms}\"\n\
         storm_gauges_dir = \"{gauges}\"\n\
         output_dir = \"{out}\"\n\
         \n\
         [parameters]\n\
         \"Turb Detrend\" = 1\n",
        data = data.display(),
        storms = root.join("storms").join("hurricanes.csv").display(),
        gauges = gauges.display(),
        out = root.join("results").display(),
    );
    fs::write(root.join("storm_effect.toml"), config).unwrap();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn test_batch_run_from_study_directory() {
    let dir = tempfile::tempdir().unwrap();
    write_study(dir.path());

    let config = load_config(&dir.path().join("storm_effect.toml")).expect("study config loads");
    let directions = resolve_directions(&config.parameters).unwrap();
    assert_eq!(directions.len(), 1, "the [parameters] table replaces the registry");

    let gauge_storms = load_gauge_storms(&config.paths.storms_file, &config.paths.storm_gauges_dir).unwrap();
    let ids: Vec<String> = gauge_storms.keys().cloned().collect();
    assert_eq!(ids, vec!["G1", "G2", "G3"]);

    let (gauges, failed) = read_gauge_dir(&config.paths.data_dir, &ids, config.paths.nodata);
    assert_eq!(gauges.len(), 2);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].0, "G2");

    let events = resolve_events(&gauges, &gauge_storms, &config.onset);
    assert_eq!(events.len(), 1, "G3 never saw the storm");
    assert_eq!((events[0].naive_index, events[0].storm_index), (79, 81));

    let report = run_batch(&gauges, &events, &directions, &config);
    assert_eq!(report.summary.total, 1);
    assert_eq!(report.summary.analyzed, 1);
    assert_eq!(report.summary.with_effect, 1);

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.baseline.date, "2005-08-21", "rows are dated by the rain onset");
    let effect = outcome.effect.as_ref().unwrap();
    assert_eq!((effect.start, effect.end), (Some(82), Some(89)));
    assert_eq!(effect.termination, TerminationKind::Natural);
    assert_eq!(effect.peak_value, Some(10.0));

    let written = write_parameter_tables(&report, &config.paths.output_dir).unwrap();
    assert_eq!(written.len(), 1);
    let table = fs::read_to_string(&written[0]).unwrap();
    let row = table.lines().nth(1).expect("one data row");
    assert!(row.starts_with("G1,2005-08-21,Katrina,81,79,"), "row: {}", row);
    assert!(row.contains(",natural,"));

    let json_path = dir.path().join("report.json");
    write_json(&report, &json_path).unwrap();
    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(json["summary"]["terminations"]["natural"], 1);
}

#[test]
fn test_missing_gauge_list_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write_study(dir.path());
    fs::remove_file(dir.path().join("storms").join("gauges").join("Katrina.txt")).unwrap();

    let config = load_config(&dir.path().join("storm_effect.toml")).unwrap();
    assert!(load_gauge_storms(&config.paths.storms_file, &config.paths.storm_gauges_dir).is_err());
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[window]\nmin_win = 12\nmax_win = 10\n").unwrap();
    assert!(load_config(&path).is_err());
    assert!(load_config(&dir.path().join("absent.toml")).is_err());
}
