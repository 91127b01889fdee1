/// Structured logging for storm effect analysis
///
/// Provides context-rich logging with pipeline stage and tuple identifiers,
/// timestamps, and severity levels. Supports both console output and
/// file-based logging for long batch runs.
///
/// Nothing is printed until `init_logger` has been called, so the library
/// stays silent inside tests and when embedded.

use chrono::Utc;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;

use crate::model::AnalysisError;

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline Stages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Reading gauge and storm files
    Ingest,
    /// Historical variability and error thresholds
    Variability,
    /// Pre-effect window selection and statistics
    Window,
    /// Effect tracking
    Effect,
    /// Batch orchestration and reporting
    Batch,
    System,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Ingest => write!(f, "INGEST"),
            Stage::Variability => write!(f, "VAR"),
            Stage::Window => write!(f, "WINDOW"),
            Stage::Effect => write!(f, "EFFECT"),
            Stage::Batch => write!(f, "BATCH"),
            Stage::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - the data simply cannot support the analysis
    /// (too short a history, no quiet baseline before the storm)
    Expected,
    /// Unexpected failure - indicates a caller bug or corrupt input
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logger Configuration
// ---------------------------------------------------------------------------

/// Global logger instance
static LOGGER: Mutex<Option<Logger>> = Mutex::new(None);

pub struct Logger {
    /// Minimum log level to display
    min_level: LogLevel,
    /// Optional file path for logging
    log_file: Option<String>,
    /// Whether to include timestamps in console output
    console_timestamps: bool,
}

impl Logger {
    /// Initialize the global logger
    pub fn init(min_level: LogLevel, log_file: Option<String>, console_timestamps: bool) {
        let logger = Logger {
            min_level,
            log_file,
            console_timestamps,
        };

        if let Ok(mut guard) = LOGGER.lock() {
            *guard = Some(logger);
        }
    }

    fn log(&self, level: LogLevel, stage: Stage, context: Option<&str>, message: &str) {
        if level < self.min_level {
            return;
        }

        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        let context_part = context.map(|c| format!(" [{}]", c)).unwrap_or_default();
        let log_entry = format!("{} {} {}{}: {}", timestamp, level, stage, context_part, message);

        if self.console_timestamps {
            match level {
                LogLevel::Error => eprintln!("{}", log_entry),
                LogLevel::Warning => eprintln!("   {}", log_entry),
                LogLevel::Info => println!("   {}", message),
                LogLevel::Debug => println!("   [DEBUG] {}", message),
            }
        } else {
            match level {
                LogLevel::Error => eprintln!("   ✗ {}{}: {}", stage, context_part, message),
                LogLevel::Warning => eprintln!("   ⚠ {}{}: {}", stage, context_part, message),
                LogLevel::Info => println!("   {}", message),
                LogLevel::Debug => println!("   [DEBUG] {}{}: {}", stage, context_part, message),
            }
        }

        if let Some(ref path) = self.log_file {
            if let Err(e) = Self::append_to_file(path, &log_entry) {
                eprintln!("Failed to write to log file {}: {}", path, e);
            }
        }
    }

    fn append_to_file(path: &str, entry: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Initialize the global logger
pub fn init_logger(min_level: LogLevel, log_file: Option<&str>, console_timestamps: bool) {
    Logger::init(min_level, log_file.map(String::from), console_timestamps);
}

fn emit(level: LogLevel, stage: Stage, context: Option<&str>, message: &str) {
    if let Ok(guard) = LOGGER.lock() {
        if let Some(logger) = guard.as_ref() {
            logger.log(level, stage, context, message);
        }
    }
}

/// Log a general informational message
pub fn info(stage: Stage, context: Option<&str>, message: &str) {
    emit(LogLevel::Info, stage, context, message);
}

/// Log a warning message
pub fn warn(stage: Stage, context: Option<&str>, message: &str) {
    emit(LogLevel::Warning, stage, context, message);
}

/// Log an error message
pub fn error(stage: Stage, context: Option<&str>, message: &str) {
    emit(LogLevel::Error, stage, context, message);
}

/// Log a debug message
pub fn debug(stage: Stage, context: Option<&str>, message: &str) {
    emit(LogLevel::Debug, stage, context, message);
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify an analysis failure by how surprising it is for real gauge data
pub fn classify_failure(err: &AnalysisError) -> FailureType {
    match err {
        // Short records and storms with no quiet lead-in are routine
        AnalysisError::UndefinedVariability { .. } | AnalysisError::NoWindowFound { .. } => {
            FailureType::Expected
        }
        // Only reachable through bad wiring or corrupt data
        AnalysisError::InvalidInput(_)
        | AnalysisError::IndexOutOfRange { .. }
        | AnalysisError::DegenerateRange { .. } => FailureType::Unexpected,
        AnalysisError::EmptyWindow { .. } | AnalysisError::ForcedReturnImpossible { .. } => {
            FailureType::Unknown
        }
    }
}

/// Stage an analysis error surfaced from
pub fn stage_of(err: &AnalysisError) -> Stage {
    match err {
        AnalysisError::UndefinedVariability { .. } => Stage::Variability,
        AnalysisError::NoWindowFound { .. } | AnalysisError::EmptyWindow { .. } => Stage::Window,
        AnalysisError::ForcedReturnImpossible { .. } => Stage::Effect,
        _ => Stage::System,
    }
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log a failed (gauge, storm, parameter) tuple with automatic classification
pub fn log_tuple_failure(tuple: &str, err: &AnalysisError) {
    let failure_type = classify_failure(err);
    let message = format!("{} [{}]: {}", err.kind(), failure_type, err);
    let stage = stage_of(err);

    match failure_type {
        FailureType::Expected => debug(stage, Some(tuple), &message),
        FailureType::Unexpected => error(stage, Some(tuple), &message),
        FailureType::Unknown => warn(stage, Some(tuple), &message),
    }
}

// ---------------------------------------------------------------------------
// Batch Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of a batch run
pub fn log_batch_summary(total: usize, successful: usize, failed: usize) {
    let message = format!(
        "Batch complete: {}/{} analyzed, {} failed",
        successful, total, failed
    );

    if failed == 0 {
        info(Stage::Batch, None, &message);
    } else if successful == 0 {
        error(Stage::Batch, None, &message);
    } else {
        warn(Stage::Batch, None, &message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warning);
        assert!(LogLevel::Warning < LogLevel::Error);
    }

    #[test]
    fn test_failure_classification() {
        let short_history = AnalysisError::UndefinedVariability { at_index: 3 };
        assert_eq!(classify_failure(&short_history), FailureType::Expected);
        assert_eq!(stage_of(&short_history), Stage::Variability);

        let bad_input = AnalysisError::InvalidInput("NaN in segment".into());
        assert_eq!(classify_failure(&bad_input), FailureType::Unexpected);

        let no_line = AnalysisError::ForcedReturnImpossible { anchor: 12 };
        assert_eq!(classify_failure(&no_line), FailureType::Unknown);
        assert_eq!(stage_of(&no_line), Stage::Effect);
    }

    #[test]
    fn test_logging_before_init_is_silent() {
        // must not panic without a logger
        log_tuple_failure("03339000/Katrina/Turb Detrend", &AnalysisError::NoWindowFound { perturbation: 5 });
        log_batch_summary(3, 2, 1);
    }
}
