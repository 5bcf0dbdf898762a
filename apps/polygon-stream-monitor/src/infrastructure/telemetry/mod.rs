//! Tracing Initialization
//!
//! Structured logging via `tracing` with an environment-driven filter.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: log filter (default raises this crate to `info`)

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Default directive applied on top of `RUST_LOG`.
const DEFAULT_DIRECTIVE: &str = "polygon_stream_monitor=info";

/// Initialize the global tracing subscriber.
///
/// Safe to call once at startup; later calls are ignored so tests that
/// race on initialization stay quiet.
pub fn init() {
    let env_filter = match DEFAULT_DIRECTIVE.parse() {
        Ok(directive) => EnvFilter::from_default_env().add_directive(directive),
        Err(_) => EnvFilter::from_default_env(),
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}
