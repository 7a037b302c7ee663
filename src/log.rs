use tracing_subscriber::{prelude::*, util::TryInitError, EnvFilter, Registry};

/// Installs a global `tracing` subscriber writing to stderr.
///
/// The filter comes from `RUST_LOG`, defaulting to `info`. Fails if a global subscriber
/// is already set.
pub fn try_init() -> Result<(), TryInitError> {
    let fmt_filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::Layer::default()
        .with_writer(std::io::stderr)
        .with_filter(fmt_filter_layer);
    Registry::default().with(fmt_layer).try_init()
}
