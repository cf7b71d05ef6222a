//! Console logging setup.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither `RUST_LOG` nor the config names one.
pub const DEFAULT_FILTER: &str = "info";

/// Build the filter: `RUST_LOG` wins, then `level`, then [`DEFAULT_FILTER`].
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if level.trim().is_empty() { DEFAULT_FILTER } else { level };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    })
}

/// Install the global subscriber. Safe to call more than once; later calls are ignored.
pub fn init_logging(level: &str) {
    let console = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_timer(fmt::time::uptime());

    let _ = tracing_subscriber::registry()
        .with(env_filter(level))
        .with(console)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_level_is_used() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let filter = env_filter("temporal_glare=debug");
        assert!(filter.to_string().contains("temporal_glare=debug"));
    }

    #[test]
    fn bad_level_falls_back_to_default() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        assert_eq!(env_filter("temporal_glare=loud").to_string(), DEFAULT_FILTER);
        assert_eq!(env_filter("").to_string(), DEFAULT_FILTER);
    }

    #[test]
    fn init_twice_does_not_panic() {
        init_logging("warn");
        init_logging("debug");
    }
}
