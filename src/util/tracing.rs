use queuectl_env_vars::var;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initializes the `tracing` logging framework.
///
/// Log output is written to stderr, so that the regular CLI output on stdout
/// stays machine readable. It is influenced by the following environment
/// variables:
///
/// - [`RUST_LOG`](tracing_subscriber::filter::EnvFilter): log filter
///   directives, defaults to `info`.
/// - `LOG_FORMAT`: set to `json` to emit one JSON object per event.
pub fn init() {
    let log_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let json = matches!(var("LOG_FORMAT"), Ok(Some(format)) if format == "json");

    let log_layer = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(log_layer.with_filter(log_filter))
        .init();
}
