//! Console logging for Canopy hosts.
//!
//! Every Canopy crate reports through [`tracing`]. This module installs a `fmt` subscriber that
//! filters through `RUST_LOG`, falling back to a default level when the variable is unset or
//! unparsable.

use std::str::FromStr;
use std::sync::{Mutex, Once, OnceLock};

use tracing::level_filters::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::INFO;

static TRACING_INSTALLED: Once = Once::new();
static LOG_LEVEL: OnceLock<Mutex<LevelFilter>> = OnceLock::new();

fn level_slot() -> &'static Mutex<LevelFilter> {
    LOG_LEVEL.get_or_init(|| Mutex::new(DEFAULT_LOG_LEVEL))
}

/// Sets the level used when `RUST_LOG` is absent. Unknown names select `info`.
///
/// Only effective before [`install`].
pub fn set_default_level(level: &str) -> LevelFilter {
    let parsed = LevelFilter::from_str(level).unwrap_or(DEFAULT_LOG_LEVEL);
    if let Ok(mut guard) = level_slot().lock() {
        *guard = parsed;
    }
    parsed
}

/// The level used when `RUST_LOG` is absent.
#[must_use]
pub fn default_level() -> LevelFilter {
    level_slot()
        .lock()
        .map_or(DEFAULT_LOG_LEVEL, |guard| *guard)
}

/// Installs the console subscriber (idempotent).
///
/// Does nothing if the process already has a global subscriber.
pub fn install() {
    TRACING_INSTALLED.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_level().to_string()));
        let console = fmt::layer().with_target(true).with_filter(filter);
        if tracing_subscriber::registry().with(console).try_init().is_err() {
            eprintln!("canopy: a tracing subscriber is already installed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_level_parses_names() {
        assert_eq!(set_default_level("debug"), LevelFilter::DEBUG);
        assert_eq!(default_level(), LevelFilter::DEBUG);
        assert_eq!(set_default_level("nonsense"), LevelFilter::INFO);
        assert_eq!(default_level(), LevelFilter::INFO);
    }

    #[test]
    fn install_twice_is_harmless() {
        install();
        install();
        tracing::info!("logging installed");
    }
}
