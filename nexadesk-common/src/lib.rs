//! Pieces shared by the nexadesk API and worker processes: environment
//! configuration, logging setup, the metrics registry with its
//! instrumentation helpers, and the process lifecycle (probes and shutdown).

pub mod config;
pub mod lifecycle;
pub mod logging;
pub mod metrics;
