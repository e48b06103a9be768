use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global subscriber. Level comes from `RUST_LOG` (default
/// `info`); events go to stderr so command output on stdout stays clean.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
