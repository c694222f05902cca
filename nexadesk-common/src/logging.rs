use tracing::Span;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::ServiceConfig;

/// Install the global tracing subscriber.
///
/// Production gets one JSON object per line, other environments the
/// human-readable formatter. The level comes from `LOG_LEVEL` (see
/// [`ServiceConfig::log_level`]); an unparseable directive falls back to `info`.
pub fn init(config: &ServiceConfig) {
    let level = config.log_level();
    let (filter, invalid_level) = match EnvFilter::try_new(level) {
        Ok(filter) => (filter, false),
        Err(_) => (EnvFilter::new("info"), true),
    };

    let base_layer = fmt::layer().with_target(true).with_level(true);
    let log_layer = if config.is_production() {
        base_layer.json().with_filter(filter).boxed()
    } else {
        base_layer.with_filter(filter).boxed()
    };

    // Tests and embedders may already own the global subscriber.
    if tracing_subscriber::registry().with(log_layer).try_init().is_err() {
        return;
    }

    if invalid_level {
        tracing::warn!(log_level = level, "invalid LOG_LEVEL, falling back to info");
    }
}

/// Root span carrying the base fields attached to every record of a process.
pub fn service_span(service: &str, config: &ServiceConfig) -> Span {
    tracing::info_span!(
        "service",
        service = %service,
        version = %config.version,
        git_sha = %config.git_sha,
    )
}
