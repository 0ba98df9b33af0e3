use std::io::IsTerminal;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub mod formatter;

pub use formatter::RelayFormatter;

use crate::configs::LoggingConfig;

/// Builds the filter directive string from `[logging]`.
fn filter_directives(logging: Option<&LoggingConfig>) -> String {
    let level = logging
        .and_then(|l| l.level.as_deref())
        .unwrap_or("info");
    // hyper and reqwest are chatty at debug; keep them quiet unless asked.
    let mut directives = format!("{level},hyper=warn,reqwest=warn");
    if let Some(filters) = logging.and_then(|l| l.filters.as_deref()) {
        if !filters.is_empty() {
            directives.push(',');
            directives.push_str(filters);
        }
    }
    directives
}

/// Installs the global subscriber. `RUST_LOG` overrides the configured level.
pub fn init(logging: Option<&LoggingConfig>) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(logging)));

    let use_ansi = std::io::stdout().is_terminal();
    let stdout_layer = fmt::layer()
        .event_format(RelayFormatter::new(use_ansi))
        .with_ansi(use_ansi);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .init();
}
