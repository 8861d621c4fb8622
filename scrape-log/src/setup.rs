use std::env;
use std::io;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::{LogConfig, LogFormat};

/// Returns the default filter directives used when `RUST_LOG` is not set.
///
/// The configured level applies to the receiver crates only, all other crates are limited to
/// warnings and errors.
fn default_filter(config: &LogConfig) -> EnvFilter {
    let level = config.level_filter();
    let mut filter = EnvFilter::new("warn");

    for name in ["scrape_config", "scrape_log", "scrape_receiver"] {
        if let Ok(directive) = format!("{name}={level}").parse() {
            filter = filter.add_directive(directive);
        }
    }

    filter
}

/// Initialize the logging system.
///
/// The `RUST_LOG` environment variable takes precedence over the level in the configuration.
/// Calling this function more than once has no effect.
///
/// # Example
///
/// ```
/// let log_config = scrape_log::LogConfig {
///     format: scrape_log::LogFormat::Json,
///     ..Default::default()
/// };
///
/// scrape_log::init(&log_config);
/// ```
pub fn init(config: &LogConfig) {
    let subscriber = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(true);

    let format = match (config.format, console::user_attended()) {
        (LogFormat::Auto, true) | (LogFormat::Pretty, _) => {
            subscriber.compact().without_time().with_ansi(true).boxed()
        }
        (LogFormat::Auto, false) | (LogFormat::Simplified, _) => {
            subscriber.with_ansi(false).boxed()
        }
        (LogFormat::Json, _) => subscriber
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
    };

    let filter = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(value) => EnvFilter::new(value),
        Err(_) => default_filter(config),
    };

    tracing_subscriber::registry()
        .with(format.with_filter(config.level_filter()))
        .with(filter)
        .try_init()
        .ok();
}
