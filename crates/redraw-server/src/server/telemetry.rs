//! # Logging
//!
//! All diagnostics go through `tracing`. A single subscriber is installed at
//! startup with an [`EnvFilter`] (`RUST_LOG`, default `info`) and either a
//! human-readable or a JSON formatter.
//!
//! ## Span behavior
//!
//! - Each upload runs inside an `upload` span, so the watcher's and the
//!   claim's events carry the request's token.
//! - `tower-http`'s `TraceLayer` adds one span per HTTP request.
//!
//! ## Example usage
//!
//! ```bash
//! RUST_LOG=redraw_core=debug,info LOG_FORMAT=json redraw-server --generator-cmd ./lineart.sh
//! ```

use crate::server::config::LogFormat;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_telemetry(format: LogFormat) -> anyhow::Result<()> {
    let pretty = (format == LogFormat::Pretty).then(|| {
        fmt::layer()
            .with_thread_ids(true)
            .with_line_number(true)
            .with_target(false)
            .with_timer(fmt::time::ChronoLocal::rfc_3339())
            .with_file(true)
            .pretty()
    });

    let json = (format == LogFormat::Json).then(|| {
        fmt::layer()
            .with_thread_ids(true)
            .with_timer(fmt::time::ChronoLocal::rfc_3339())
            .json()
            .with_current_span(true)
    });

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(pretty)
        .with(json)
        .try_init()?;

    Ok(())
}
