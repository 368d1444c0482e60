//! Process-wide tracing setup.

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the built-in filter.  Calling this more than once
/// is harmless; later calls leave the existing subscriber in place.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            "tidepool_client=debug,tidepool_sync=debug,tidepool_store=info,tidepool_media=info,warn",
        )
    });

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
