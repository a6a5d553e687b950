//! Metrics instrumentation
//!
//! Thin wrappers over the `metrics` facade. No exporter is installed here;
//! applications choose their own recorder.

pub mod counters;
pub mod histograms;
pub mod labels;
