//! Diagnostic tracing for the session threads.
//!
//! Build with `--features tracing` to get structured events on stderr. Without
//! the feature every macro below expands to nothing, so the chat console (which
//! shares the terminal) stays clean.
//!
//! User-facing notices such as "message dropped" are *not* routed through here;
//! they are written to the session [`Console`](crate::stdio::Console).

/// Installs the stderr subscriber.
///
/// The filter comes from `RUST_LOG` and falls back to `duplex=debug`. Thread
/// names are included because every event of interest happens on one of the
/// named session threads (`duplex-input`, `duplex-tx`, ...).
#[cfg(feature = "tracing")]
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("duplex=debug"));

    // A second init (tests call this from several places) is harmless.
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_names(true)
                .with_line_number(false)
                .with_timer(fmt::time::uptime()),
        )
        .with(filter)
        .try_init();
}

#[cfg(not(feature = "tracing"))]
pub const fn init_tracing() {}

#[cfg(feature = "tracing")]
pub(crate) use tracing::{debug, error, info, trace, warn};

/// Swallows an event, fields and all. Stands in for each `tracing` macro.
#[cfg(not(feature = "tracing"))]
macro_rules! discard_event {
    ($($event:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
pub(crate) use {
    discard_event as debug, discard_event as error, discard_event as info,
    discard_event as trace, discard_event as warn,
};
