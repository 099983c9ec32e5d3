/*!
Logging (and optional profiling) setup for the route-harvest binary.

Log output goes to stderr so stdout only carries coordinates and the summary.
There are two implementations:

- real: compiled only when `feature = "profiling"` is set. Adds a
  tracing-chrome layer writing a trace file, flushed when the returned guard
  is dropped.
- stub: compiled in all other configurations. Logging only.
*/

use tracing_subscriber::EnvFilter;

/// Filter used when RUST_LOG is not set
fn default_directives() -> &'static str {
    if cfg!(debug_assertions) {
        "info,route_harvest=debug,route_harvest_lib=debug"
    } else {
        "info"
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives()))
}

#[cfg(feature = "profiling")]
mod inner {
    use tracing_chrome::{ChromeLayerBuilder, FlushGuard};
    use tracing_subscriber::prelude::*;

    /// Keeps the trace file open; dropping it flushes the trace
    pub struct LoggingGuard {
        _flush: FlushGuard,
    }

    pub fn setup_logging() -> LoggingGuard {
        let (chrome_layer, flush) = ChromeLayerBuilder::new().include_args(true).build();
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(super::env_filter());

        tracing_subscriber::registry()
            .with(chrome_layer)
            .with(fmt_layer)
            .init();
        tracing::info!("Tracing initialized with chrome profiling layer");

        LoggingGuard { _flush: flush }
    }
}

#[cfg(not(feature = "profiling"))]
mod inner {
    use tracing_subscriber::prelude::*;

    pub struct LoggingGuard;

    pub fn setup_logging() -> LoggingGuard {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(super::env_filter());

        tracing_subscriber::registry().with(fmt_layer).init();
        LoggingGuard
    }
}

pub use inner::{LoggingGuard, setup_logging};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_parse() {
        let filter = EnvFilter::try_new(default_directives());
        assert!(filter.is_ok());
    }
}
