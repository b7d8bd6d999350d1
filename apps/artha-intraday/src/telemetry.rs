//! Tracing initialization.
//!
//! Compact stdout logging, level driven by `RUST_LOG` with an `info` default
//! for the artha crates and `warn` for dependencies.

use tracing_subscriber::{fmt, EnvFilter};

pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,artha_engine=info,artha_intraday=info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
