/// Storm table and affected-gauge lists.
///
/// The storm table is a CSV with at least `HURRICANE` and `LANDFALL` columns.
/// Each storm then has a headerless `<storm>.txt` file listing the gauges it
/// affected, one per line, optionally quoted:
///
/// ```text
/// '03339000'
/// '03340500'
/// ```

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::Path;

use super::gauge_csv::parse_date;
use super::{read_file, split_fields, IngestError};
use crate::logging::{self, Stage};

/// gauge → storm name → landfall date
pub type GaugeStorms = BTreeMap<String, BTreeMap<String, NaiveDate>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Storm {
    pub name: String,
    pub landfall: NaiveDate,
}

// ============================================================================
// Parsing
// ============================================================================

pub fn parse_storm_table(csv: &str) -> Result<Vec<Storm>, IngestError> {
    let mut lines = csv.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
    let (_, header) = lines.next().ok_or_else(|| IngestError::Empty("storm table".to_string()))?;
    let headers = split_fields(header);

    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .ok_or_else(|| IngestError::MissingColumn(name.to_string()))
    };
    let name_col = column("HURRICANE")?;
    let date_col = column("LANDFALL")?;

    let mut storms = Vec::new();
    for (line_no, line) in lines {
        let fields = split_fields(line);
        let name = fields.get(name_col).copied().unwrap_or("");
        let date_text = fields.get(date_col).copied().unwrap_or("");
        if name.is_empty() {
            return Err(IngestError::Parse {
                line: line_no + 1,
                message: "storm without a name".to_string(),
            });
        }
        let landfall = parse_date(date_text).ok_or_else(|| IngestError::Parse {
            line: line_no + 1,
            message: format!("unrecognized landfall date '{}' for {}", date_text, name),
        })?;
        storms.push(Storm {
            name: name.to_string(),
            landfall,
        });
    }

    if storms.is_empty() {
        return Err(IngestError::Empty("storm table".to_string()));
    }
    Ok(storms)
}

/// Gauge ids listed in an affected-gauge file, quotes stripped.
pub fn parse_affected_gauges(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let first = line.split(',').next().unwrap_or("").trim();
            let id = first.trim_matches(|c| c == '\'' || c == '"').trim();
            (!id.is_empty()).then(|| id.to_string())
        })
        .collect()
}

/// Inverts storm → affected gauges into gauge → storm → landfall.
pub fn relate_gauges_to_storms(storms: &[Storm], affected: &BTreeMap<String, Vec<String>>) -> GaugeStorms {
    let mut related = GaugeStorms::new();
    for storm in storms {
        let Some(gauges) = affected.get(&storm.name) else {
            continue;
        };
        for gauge in gauges {
            related
                .entry(gauge.clone())
                .or_default()
                .insert(storm.name.clone(), storm.landfall);
        }
    }
    related
}

// ============================================================================
// File access
// ============================================================================

/// Reads the storm table and each storm's `<name>.txt` gauge list.
///
/// Every storm in the table must have a gauge list; a missing list is an
/// error because it silently drops a storm from the study otherwise.
pub fn load_gauge_storms(storm_file: &Path, storm_gauges_dir: &Path) -> Result<GaugeStorms, IngestError> {
    let storms = parse_storm_table(&read_file(storm_file)?)?;

    let mut affected = BTreeMap::new();
    for storm in &storms {
        let path = storm_gauges_dir.join(format!("{}.txt", storm.name));
        let gauges = parse_affected_gauges(&read_file(&path)?);
        logging::debug(
            Stage::Ingest,
            Some(&storm.name),
            &format!("landfall {}, {} gauges affected", storm.landfall, gauges.len()),
        );
        affected.insert(storm.name.clone(), gauges);
    }

    let related = relate_gauges_to_storms(&storms, &affected);
    logging::info(
        Stage::Ingest,
        None,
        &format!("{} storms affecting {} gauges", storms.len(), related.len()),
    );
    Ok(related)
}

// ============================================================================
// Tests
// ============================================================================
