/// Parameter registry for storm effect analysis.
///
/// Defines the detrended water-quality parameters studied at each gauge and
/// the direction a storm is expected to push them. Directions here are the
/// defaults; a `[parameters]` table in the config replaces them wholesale.

use std::collections::BTreeMap;

use crate::model::{AnalysisError, Direction};

// ---------------------------------------------------------------------------
// Parameter metadata
// ---------------------------------------------------------------------------

/// Metadata for a single gauge parameter column.
pub struct Parameter {
    /// Column name as it appears in the gauge CSV header.
    pub name: &'static str,
    /// Human-readable description of what the parameter measures.
    pub description: &'static str,
    /// Expected storm response.
    pub direction: Direction,
}

/// All parameters analyzed by default, in report order.
///
/// Every column is a detrended daily series; the baseline drift has already
/// been removed upstream so the tolerance band is meaningful.
pub static PARAMETER_REGISTRY: &[Parameter] = &[
    Parameter {
        name: "Discharge Detrend",
        description: "Streamflow. Storm runoff raises discharge.",
        direction: Direction::Above,
    },
    Parameter {
        name: "DO Detrend",
        description: "Dissolved oxygen. Turbulent high flow reaerates the river.",
        direction: Direction::Above,
    },
    Parameter {
        name: "Gage Detrend",
        description: "Stage height. Rises with discharge.",
        direction: Direction::Above,
    },
    Parameter {
        name: "N in situ Detrend",
        description: "In-situ nitrate. Storm water dilutes the baseflow concentration.",
        direction: Direction::Below,
    },
    Parameter {
        name: "PH Detrend",
        description: "pH. Rainfall and fresh runoff are more acidic than baseflow.",
        direction: Direction::Below,
    },
    Parameter {
        name: "SS Detrend",
        description: "Suspended sediment. Resuspended and washed in by runoff.",
        direction: Direction::Above,
    },
    Parameter {
        name: "Turb Detrend",
        description: "Turbidity. Tracks suspended sediment.",
        direction: Direction::Above,
    },
];

// ---------------------------------------------------------------------------
// Lookup helpers
// ---------------------------------------------------------------------------

pub fn all_parameter_names() -> Vec<&'static str> {
    PARAMETER_REGISTRY.iter().map(|p| p.name).collect()
}

/// Returns the names of parameters expected to move in `direction`.
pub fn parameters_with_direction(direction: Direction) -> Vec<&'static str> {
    PARAMETER_REGISTRY
        .iter()
        .filter(|p| p.direction == direction)
        .map(|p| p.name)
        .collect()
}

pub fn find_parameter(name: &str) -> Option<&'static Parameter> {
    PARAMETER_REGISTRY.iter().find(|p| p.name == name)
}

/// Resolves the parameter → direction map used for a run.
///
/// An empty `overrides` map means "use the registry". Otherwise the overrides
/// are the complete set of parameters to analyze, each given as `1` or `-1`.
pub fn resolve_directions(
    overrides: &BTreeMap<String, i64>,
) -> Result<BTreeMap<String, Direction>, AnalysisError> {
    if overrides.is_empty() {
        return Ok(PARAMETER_REGISTRY
            .iter()
            .map(|p| (p.name.to_string(), p.direction))
            .collect());
    }

    overrides
        .iter()
        .map(|(name, &sign)| Direction::from_sign(sign).map(|d| (name.clone(), d)))
        .collect()
}
