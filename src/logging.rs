use env_logger::Builder;
use log::LevelFilter;

use crate::constants::LOG_ENV_VAR;

/// Initializes logging, at the level derived from the given verbosity.
///
/// If set, the environment variable [`LOG_ENV_VAR`] takes precedence.
pub fn init(verbosity_level: i8) {
    let mut builder = Builder::new();
    builder.filter_level(level_filter(verbosity_level)).parse_env(LOG_ENV_VAR).init();

    debug!("Logging initialized (verbosity {verbosity_level})");
}

fn level_filter(verbosity_level: i8) -> LevelFilter {
    match verbosity_level {
        i8::MIN..=-2 => LevelFilter::Off,
        -1 => LevelFilter::Error,
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}
