use std::io::IsTerminal;
use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

static INIT_GUARD: OnceLock<Result<(), InitError>> = OnceLock::new();

#[derive(Debug, Clone, thiserror::Error)]
pub enum InitError {
    #[error("failed to install tracing subscriber: {0}")]
    Install(String),
}

/// Installs the process-wide subscriber once; later calls are no-ops.
///
/// Logs go to stderr so the validation report on stdout stays clean.
/// `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing() {
    let result = INIT_GUARD.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_ansi(std::io::stderr().is_terminal())
            .with_writer(std::io::stderr);
        Registry::default()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|err| InitError::Install(err.to_string()))
    });

    if let Err(err) = result {
        eprintln!("{err}");
    }
}
