//! Structured logging for pageforge.
//!
//! Log levels:
//! - ERROR: Failures that abort a batch or a request
//! - WARN: Recoverable conditions (failed pages, skipped thumbnails)
//! - INFO: High-level operation notifications (startup, batch start/end)
//! - DEBUG: Per-page traces, provider calls, cache reloads
//!
//! `RUST_LOG` takes precedence. Otherwise debug mode is enabled with the
//! `--debug` flag or `PAGEFORGE_DEBUG=1` env var.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEBUG_ENV: &str = "PAGEFORGE_DEBUG";

/// Initialize logging at the default level.
pub fn init() {
    init_with_debug(false);
}

/// Initialize logging with explicit debug mode setting.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_with_debug(debug: bool) {
    let debug_enabled = debug || env_debug();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(debug_enabled)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(debug_enabled)
                .with_thread_ids(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init();
}

fn env_debug() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|v| is_truthy(&v))
        .unwrap_or(false)
}

fn is_truthy(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn default_directives(debug: bool) -> &'static str {
    if debug {
        "pageforge=debug,info"
    } else {
        "pageforge=info,warn"
    }
}
