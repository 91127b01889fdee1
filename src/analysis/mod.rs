/// Numerical core of the storm effect analysis.
///
/// Everything here is pure computation over in-memory series; reading files
/// and running batches live in `ingest` and `pipeline`.
///
/// Submodules:
/// - `compression` fits lines and segments a series piecewise-linearly.
/// - `variability` estimates typical short-term spread before a storm.
/// - `window` picks the pre-effect baseline and its statistics.
/// - `gaps` fills missing days by linear interpolation.
/// - `effect` tracks the excursion after a storm and finds its peak.
/// - `onset` moves a landfall date to the wettest nearby day.

pub mod compression;
pub mod effect;
pub mod gaps;
pub mod onset;
pub mod variability;
pub mod window;
