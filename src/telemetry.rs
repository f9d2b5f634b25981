//! Structured logging setup.
//!
//! The platform logs through `tracing`; this module wires a `tracing-subscriber`
//! env-filter layer so operators control verbosity via `RUST_LOG` the same way
//! across every deployment (dev, sandbox, prod).

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initializes the global `tracing` subscriber.
///
/// Honors `RUST_LOG` if set, otherwise defaults to `info` for this crate and
/// `warn` for dependencies.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sardis_core=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
