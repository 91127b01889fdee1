/// Daily gauge CSV reader.
///
/// Each gauge has one CSV with a `Date` column and one column per measured
/// parameter:
///
/// ```text
/// Date,Discharge Detrend,Turb Detrend,Rain
/// 2005/08/01,0.12,-999,0.0
/// 2005/08/02,0.10,3.4,
/// ```
///
/// The provider's no-data sentinel, blanks, `NaN` and `null` all become
/// absent values. Days missing from the file entirely are inserted as absent
/// so every series is evenly spaced at one value per day.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::Path;

use super::{read_file, split_fields, IngestError};
use crate::logging::{self, Stage};
use crate::model::Series;

/// Sentinel used by the data provider for missing values.
pub const DEFAULT_NODATA: f64 = -999.0;

const DATE_FORMATS: &[&str] = &["%Y/%m/%d", "%Y-%m-%d", "%m/%d/%Y"];

// ============================================================================
// Gauge Data
// ============================================================================

/// All parameter series of one gauge, sharing one daily axis.
#[derive(Debug, Clone, PartialEq)]
pub struct GaugeData {
    pub gauge: String,
    pub origin: NaiveDate,
    /// Number of days covered, first to last row inclusive.
    pub days: usize,
    /// Parameter column name → series.
    pub columns: BTreeMap<String, Series>,
    /// Fields that were neither numbers nor recognized blanks.
    pub malformed_fields: usize,
}

impl GaugeData {
    pub fn series(&self, parameter: &str) -> Option<&Series> {
        self.columns.get(parameter)
    }

    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        let days = (date - self.origin).num_days();
        if days < 0 || days as usize >= self.days {
            None
        } else {
            Some(days as usize)
        }
    }

    pub fn parameters(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }
}

// ============================================================================
// Parsing
// ============================================================================

pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

/// Parses one value field. `Ok(None)` is a recognized blank; `Err(())` marks
/// a field that is not a number at all.
fn parse_value(field: &str, nodata: f64) -> Result<Option<f64>, ()> {
    let field = field.trim();
    if field.is_empty() || field.eq_ignore_ascii_case("null") || field.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    let value: f64 = field.parse().map_err(|_| ())?;
    if value == nodata || !value.is_finite() {
        Ok(None)
    } else {
        Ok(Some(value))
    }
}

/// Parses the text of a gauge CSV.
pub fn parse_gauge_csv(gauge: &str, csv: &str, nodata: f64) -> Result<GaugeData, IngestError> {
    let mut lines = csv.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());

    let (_, header) = lines.next().ok_or_else(|| IngestError::Empty(gauge.to_string()))?;
    let headers = split_fields(header);
    let date_col = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case("date"))
        .ok_or_else(|| IngestError::MissingColumn("Date".to_string()))?;
    let params: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(i, h)| *i != date_col && !h.is_empty())
        .map(|(i, h)| (i, h.to_string()))
        .collect();

    let mut origin: Option<NaiveDate> = None;
    let mut previous: Option<NaiveDate> = None;
    let mut values: Vec<Vec<Option<f64>>> = vec![Vec::new(); params.len()];
    let mut malformed_fields = 0;

    for (line_no, line) in lines {
        let line_no = line_no + 1;
        let fields = split_fields(line);
        let date_text = fields.get(date_col).copied().unwrap_or("");
        let date = parse_date(date_text).ok_or_else(|| IngestError::Parse {
            line: line_no,
            message: format!("unrecognized date '{}'", date_text),
        })?;

        if let Some(prev) = previous {
            if date <= prev {
                return Err(IngestError::Parse {
                    line: line_no,
                    message: format!("date {} does not follow {}", date, prev),
                });
            }
        }
        let first_day = *origin.get_or_insert(date);
        let day = (date - first_day).num_days() as usize;
        previous = Some(date);

        for (slot, (col, _)) in values.iter_mut().zip(&params) {
            // skipped calendar days become absent
            slot.resize(day, None);
            let value = match fields.get(*col) {
                Some(field) => parse_value(field, nodata).unwrap_or_else(|_| {
                    malformed_fields += 1;
                    None
                }),
                None => None,
            };
            slot.push(value);
        }
    }

    let origin = origin.ok_or_else(|| IngestError::Empty(gauge.to_string()))?;
    let days = previous.map_or(0, |last| (last - origin).num_days() as usize + 1);
    let columns = params
        .into_iter()
        .zip(values)
        .map(|((_, name), column)| (name, Series::with_origin(origin, column)))
        .collect();

    Ok(GaugeData {
        gauge: gauge.to_string(),
        origin,
        days,
        columns,
        malformed_fields,
    })
}

// ============================================================================
// File access
// ============================================================================

/// Reads `<dir>/<gauge>.csv`.
pub fn read_gauge_file(dir: &Path, gauge: &str, nodata: f64) -> Result<GaugeData, IngestError> {
    let path = dir.join(format!("{}.csv", gauge));
    let text = read_file(&path)?;
    let data = parse_gauge_csv(gauge, &text, nodata)?;
    if data.malformed_fields > 0 {
        logging::warn(
            Stage::Ingest,
            Some(gauge),
            &format!("{} non-numeric fields treated as missing", data.malformed_fields),
        );
    }
    Ok(data)
}

/// Reads every listed gauge. A gauge that fails to load is reported and
/// skipped; it never stops the others.
pub fn read_gauge_dir(
    dir: &Path,
    gauges: &[String],
    nodata: f64,
) -> (BTreeMap<String, GaugeData>, Vec<(String, IngestError)>) {
    let mut loaded = BTreeMap::new();
    let mut failed = Vec::new();

    for gauge in gauges {
        match read_gauge_file(dir, gauge, nodata) {
            Ok(data) => {
                logging::debug(
                    Stage::Ingest,
                    Some(gauge),
                    &format!(
                        "{} days from {}, {} parameters",
                        data.days,
                        data.origin,
                        data.parameters().count()
                    ),
                );
                loaded.insert(gauge.clone(), data);
            }
            Err(e) => {
                logging::warn(Stage::Ingest, Some(gauge), &e.to_string());
                failed.push((gauge.clone(), e));
            }
        }
    }

    (loaded, failed)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Date,Discharge Detrend,Turb Detrend,Rain
2005/08/01,1.5,-999,0.0
2005/08/02,1.7,3.4,
2005/08/04,NaN,3.9,2.5
";

    #[test]
    fn test_parse_sample_fills_skipped_day() {
        let data = parse_gauge_csv("03339000", SAMPLE, DEFAULT_NODATA).unwrap();
        assert_eq!(data.origin, NaiveDate::from_ymd_opt(2005, 8, 1).unwrap());
        assert_eq!(data.days, 4);
        assert_eq!(
            data.parameters().collect::<Vec<_>>(),
            vec!["Discharge Detrend", "Rain", "Turb Detrend"]
        );

        let discharge = data.series("Discharge Detrend").unwrap();
        assert_eq!(discharge.values(), &[Some(1.5), Some(1.7), None, None]);

        let turb = data.series("Turb Detrend").unwrap();
        assert_eq!(turb.values(), &[None, Some(3.4), None, Some(3.9)], "sentinel becomes absent");

        let rain = data.series("Rain").unwrap();
        assert_eq!(rain.get(3), Some(2.5));
        assert_eq!(rain.get(1), None, "blank field becomes absent");
        assert_eq!(data.malformed_fields, 0);
    }

    #[test]
    fn test_series_carry_the_gauge_origin() {
        let data = parse_gauge_csv("g", SAMPLE, DEFAULT_NODATA).unwrap();
        let date = NaiveDate::from_ymd_opt(2005, 8, 4).unwrap();
        assert_eq!(data.index_of(date), Some(3));
        assert_eq!(data.series("Rain").unwrap().index_of(date), Some(3));
        assert_eq!(data.index_of(NaiveDate::from_ymd_opt(2005, 8, 5).unwrap()), None);
    }

    #[test]
    fn test_iso_dates_and_quoted_headers() {
        let csv = "\"Date\",\"PH Detrend\"\n2010-01-01,7.1\n2010-01-02,7.0\n";
        let data = parse_gauge_csv("g", csv, DEFAULT_NODATA).unwrap();
        assert_eq!(data.series("PH Detrend").unwrap().values(), &[Some(7.1), Some(7.0)]);
    }

    #[test]
    fn test_non_numeric_fields_are_counted() {
        let csv = "Date,SS Detrend\n2010/01/01,abc\n2010/01/02,4\n";
        let data = parse_gauge_csv("g", csv, DEFAULT_NODATA).unwrap();
        assert_eq!(data.malformed_fields, 1);
        assert_eq!(data.series("SS Detrend").unwrap().values(), &[None, Some(4.0)]);
    }

    #[test]
    fn test_out_of_order_dates_are_rejected() {
        let csv = "Date,SS Detrend\n2010/01/02,1\n2010/01/01,2\n";
        assert!(matches!(
            parse_gauge_csv("g", csv, DEFAULT_NODATA),
            Err(IngestError::Parse { line: 3, .. })
        ));
        let dup = "Date,SS Detrend\n2010/01/02,1\n2010/01/02,2\n";
        assert!(parse_gauge_csv("g", dup, DEFAULT_NODATA).is_err());
    }

    #[test]
    fn test_missing_date_column_and_empty_file() {
        assert_eq!(
            parse_gauge_csv("g", "Day,SS Detrend\n1,2\n", DEFAULT_NODATA),
            Err(IngestError::MissingColumn("Date".to_string()))
        );
        assert_eq!(
            parse_gauge_csv("g", "Date,SS Detrend\n", DEFAULT_NODATA),
            Err(IngestError::Empty("g".to_string()))
        );
        assert!(matches!(
            parse_gauge_csv("g", "Date,SS\nyesterday,1\n", DEFAULT_NODATA),
            Err(IngestError::Parse { line: 2, .. })
        ));
    }

    #[test]
    fn test_read_gauge_dir_skips_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("A.csv"), SAMPLE).unwrap();
        let (loaded, failed) = read_gauge_dir(dir.path(), &["A".to_string(), "B".to_string()], DEFAULT_NODATA);
        assert!(loaded.contains_key("A"));
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, "B");
        assert!(matches!(failed[0].1, IngestError::Io { .. }));
    }
}
