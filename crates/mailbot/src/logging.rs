//! Tracing subscriber setup for binaries and tests.
//!
//! Library code logs through the `log` facade and opens `tracing` spans; the
//! subscriber installed here receives both.

use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

use crate::error::MailbotError;

/// Filter used when neither an explicit filter nor `RUST_LOG` is given.
pub const DEFAULT_FILTER: &str = "info";

/// Builds the filter: `explicit`, else `RUST_LOG`, else [`DEFAULT_FILTER`].
pub fn env_filter(explicit: Option<&str>) -> EnvFilter {
    match explicit {
        Some(directives) => EnvFilter::try_new(directives).unwrap_or_else(|e| {
            eprintln!("Invalid log filter '{}': {}, using '{}'", directives, e, DEFAULT_FILTER);
            EnvFilter::new(DEFAULT_FILTER)
        }),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    }
}

/// Installs the global subscriber and bridges `log` records into it.
///
/// Output goes to stderr, as plain text or one JSON object per line.
pub fn init(filter: Option<&str>, json: bool) -> Result<(), MailbotError> {
    tracing_log::LogTracer::init().map_err(|e| MailbotError::Logging(e.to_string()))?;

    let registry = Registry::default().with(env_filter(filter));
    let result = if json {
        let layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(std::io::stderr);
        tracing::subscriber::set_global_default(registry.with(layer))
    } else {
        let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
        tracing::subscriber::set_global_default(registry.with(layer))
    };

    result.map_err(|e| MailbotError::Logging(e.to_string()))
}
