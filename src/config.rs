/// Run configuration for storm effect analysis.
///
/// Loaded from a TOML file with one table per concern:
///
/// ```toml
/// [paths]
/// data_dir = "station_data"
/// storms_file = "storms/hurricanes.csv"
/// storm_gauges_dir = "storms/gauges"
/// output_dir = "results"
///
/// [variability]
/// history_length = 56
///
/// [effect.forcing]
/// enabled = false
///
/// [parameters]
/// "Turb Detrend" = 1
/// "PH Detrend" = -1
/// ```
///
/// Every field is optional; omitted values take the defaults of the
/// reference study.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Config sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub paths: PathsConfig,
    pub variability: VariabilityConfig,
    pub window: WindowConfig,
    pub effect: EffectConfig,
    pub onset: OnsetConfig,
    /// Parameter column → expected direction (`1` or `-1`). Empty means the
    /// built-in registry.
    pub parameters: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory of `<gauge>.csv` files.
    pub data_dir: PathBuf,
    /// Storm table with `HURRICANE` and `LANDFALL` columns.
    pub storms_file: PathBuf,
    /// Directory of `<storm>.txt` affected-gauge lists.
    pub storm_gauges_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Sentinel written by the data provider for missing days.
    pub nodata: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct VariabilityConfig {
    /// Days of history before the storm used to judge typical variability.
    pub history_length: usize,
    pub window_size: usize,
    pub step: usize,
    /// Multiplier turning typical variability into a segmentation threshold.
    pub stddevs_for_error: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Total days around the storm handed to the segmenter.
    pub search_width: usize,
    pub min_win: usize,
    pub max_win: usize,
    /// Drop baseline points beyond 1.5 standard deviations.
    pub trim_outliers: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EffectConfig {
    /// Days after the storm to wait for the signal to leave the band.
    pub lag: usize,
    /// Consecutive days moving toward the band before the effect counts as returning.
    pub returning_gap: usize,
    pub dropthrough: DropthroughConfig,
    pub forcing: ForcingConfig,
    pub max_effect: usize,
    /// Longest run of missing days tolerated inside an effect.
    pub max_dropout: usize,
}

/// How often, and how far ahead, a re-entering signal may be followed
/// through the band to the opposite side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DropthroughConfig {
    pub count: usize,
    pub days: usize,
}

/// Forced completion of stalled returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ForcingConfig {
    pub enabled: bool,
    /// Look-out days for a value closer to the band before forcing.
    pub days_before_force: usize,
    /// Trailing days used to fit the return line.
    pub history_points: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OnsetConfig {
    /// Days either side of landfall searched for the heaviest rain.
    pub window: usize,
    /// Minimum cumulative rain in that span for the storm to count.
    pub min_rain: f64,
    pub rain_column: String,
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("station_data"),
            storms_file: PathBuf::from("storms/hurricanes.csv"),
            storm_gauges_dir: PathBuf::from("storms/gauges"),
            output_dir: PathBuf::from("results"),
            nodata: -999.0,
        }
    }
}

impl Default for VariabilityConfig {
    fn default() -> Self {
        Self {
            history_length: 56,
            window_size: 14,
            step: 2,
            stddevs_for_error: 0.5,
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            search_width: 70,
            min_win: 5,
            max_win: 10,
            trim_outliers: true,
        }
    }
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            lag: 4,
            returning_gap: 1,
            dropthrough: DropthroughConfig::default(),
            forcing: ForcingConfig::default(),
            max_effect: 50,
            max_dropout: 3,
        }
    }
}

impl Default for ForcingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            days_before_force: 4,
            history_points: 5,
        }
    }
}

impl ForcingConfig {
    pub fn new(days_before_force: usize, history_points: usize) -> Self {
        Self {
            enabled: true,
            days_before_force,
            history_points,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

impl Default for OnsetConfig {
    fn default() -> Self {
        Self {
            window: 5,
            min_rain: 2.0,
            rain_column: "Rain".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    Io { path: String, message: String },
    /// The file is not valid TOML for this schema.
    Parse(String),
    /// A value is out of its allowed range.
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, message } => {
                write!(f, "Cannot read config {}: {}", path, message)
            }
            ConfigError::Parse(msg) => write!(f, "Config parse error: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Loading and validation
// ---------------------------------------------------------------------------

impl AnalysisConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: AnalysisConfig =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the analysis cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let v = &self.variability;
        if v.window_size < 2 {
            return invalid(format!("variability.window_size must be at least 2, got {}", v.window_size));
        }
        if v.step == 0 {
            return invalid("variability.step must be at least 1".to_string());
        }
        if v.history_length < v.window_size {
            return invalid(format!(
                "variability.history_length ({}) is shorter than window_size ({})",
                v.history_length, v.window_size
            ));
        }
        if !v.stddevs_for_error.is_finite() || v.stddevs_for_error <= 0.0 {
            return invalid(format!(
                "variability.stddevs_for_error must be positive, got {}",
                v.stddevs_for_error
            ));
        }

        let w = &self.window;
        if w.min_win == 0 || w.min_win > w.max_win {
            return invalid(format!(
                "window.min_win ({}) must be at least 1 and no larger than max_win ({})",
                w.min_win, w.max_win
            ));
        }
        if w.search_width < 2 {
            return invalid(format!("window.search_width must be at least 2, got {}", w.search_width));
        }

        let e = &self.effect;
        if e.lag == 0 {
            return invalid("effect.lag must be at least 1".to_string());
        }
        if e.max_effect == 0 {
            return invalid("effect.max_effect must be at least 1".to_string());
        }
        if e.forcing.enabled && e.forcing.history_points < 2 {
            return invalid(format!(
                "effect.forcing.history_points must be at least 2, got {}",
                e.forcing.history_points
            ));
        }

        if !self.onset.min_rain.is_finite() || self.onset.min_rain < 0.0 {
            return invalid(format!("onset.min_rain must be non-negative, got {}", self.onset.min_rain));
        }

        if let Some((name, sign)) = self.parameters.iter().find(|(_, s)| **s != 1 && **s != -1) {
            return invalid(format!("parameters.\"{}\" must be 1 or -1, got {}", name, sign));
        }

        Ok(())
    }
}

fn invalid(message: String) -> Result<(), ConfigError> {
    Err(ConfigError::Invalid(message))
}

/// Reads, parses and validates the config file at `path`.
pub fn load_config(path: &Path) -> Result<AnalysisConfig, ConfigError> {
    let text = fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    AnalysisConfig::from_toml_str(&text)
}
