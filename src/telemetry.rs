//! Tracing setup.
//!
//! - LOG_LEVEL holds filter directives, e.g.
//!   "info,training=debug,cyberlms_backend=debug,tower_http=info,axum=info".
//! - LOG_FORMAT=json switches to structured JSON lines; anything else is the default text format.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "info,training=debug,cyberlms_backend=debug,tower_http=info,axum=info";

fn filter_from_env() -> EnvFilter {
    EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

pub fn init_tracing() {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter_from_env())
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}
