//! Diagnostic tracing on stderr.
//!
//! Operator-facing output goes through the renderer. This module only
//! covers `tracing` diagnostics, filtered by `RUST_LOG`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEBUG_FILTER: &str = "warn,ma_core=debug,ma_backend=debug,minagent=debug";

/// Filter directives used when `RUST_LOG` is unset.
pub fn default_directives(debug: bool) -> &'static str {
    if debug {
        DEBUG_FILTER
    } else {
        "warn"
    }
}

/// Initialize the tracing subscriber.
///
/// `debug` forces debug output for the minagent crates. Otherwise reads
/// `RUST_LOG` and defaults to `warn`. Calling it twice is a no-op.
pub fn init(debug: bool) {
    let filter = if debug {
        EnvFilter::new(default_directives(true))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directives(false)))
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
