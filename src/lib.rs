/// Storm effect analysis for river gauge time series.
///
/// For every gauge a storm passed over, and every water-quality parameter the
/// gauge records, the crate estimates a quiet pre-storm baseline and measures
/// how long and how far the parameter strayed from it afterwards.

pub mod analysis;
pub mod config;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod parameters;
pub mod pipeline;
pub mod report;
