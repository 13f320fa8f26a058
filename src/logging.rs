//! Tracing subscriber setup for the `harvest` binary.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "info,catalog_harvest=debug,sqlx=warn";

/// Install the global subscriber.
///
/// Honors `RUST_LOG` when set; otherwise falls back to [`DEFAULT_FILTER`].
/// Log lines go to stderr so command summaries on stdout stay parseable.
pub fn init() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
