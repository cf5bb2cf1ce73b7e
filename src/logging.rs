//! Log level selection and `env_logger` setup for the CLI.

use std::env;

use log::LevelFilter;

/// Environment variable overriding the default log level.
pub const LOG_LEVEL_ENV: &str = "SHARDPLAN_LOG_LEVEL";

/// Parse a level name (case-insensitive); unknown names yield `None`.
pub fn level_from_str(s: &str) -> Option<LevelFilter> {
    match s.trim().to_uppercase().as_str() {
        "OFF" => Some(LevelFilter::Off),
        "ERROR" => Some(LevelFilter::Error),
        "WARN" | "WARNING" => Some(LevelFilter::Warn),
        "INFO" => Some(LevelFilter::Info),
        "DEBUG" => Some(LevelFilter::Debug),
        "TRACE" => Some(LevelFilter::Trace),
        _ => None,
    }
}

/// Level chosen from the CLI switches and `SHARDPLAN_LOG_LEVEL`.
///
/// `--quiet` wins over everything, then `--verbose`, then the environment,
/// then `Warn`.
pub fn resolve_level(verbose: bool, quiet: bool, env_level: Option<&str>) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    if verbose {
        return LevelFilter::Debug;
    }
    env_level
        .and_then(level_from_str)
        .unwrap_or(LevelFilter::Warn)
}

pub fn init_logging(verbose: bool, quiet: bool) {
    let env_level = env::var(LOG_LEVEL_ENV).ok();
    let level = resolve_level(verbose, quiet, env_level.as_deref());

    let _ = env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp_millis()
        .try_init();
}
