use tracing_subscriber::{fmt, EnvFilter};

use crate::LOG_ENV;

/// Initialize structured logging with environment filter.
/// Set VKT_LOG=debug (or trace, info, warn, error) for verbosity control.
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_logging() {
    init_logging_with_default("info");
}

/// Like [`init_logging`], but with a caller-chosen filter when `VKT_LOG` is unset.
pub fn init_logging_with_default(default_filter: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let installed = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();
    if let Err(e) = installed {
        // The subscriber already in place receives this.
        tracing::debug!("keeping existing tracing subscriber: {}", e);
    }
}
