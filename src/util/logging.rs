use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;

use crate::config::LogLevel;

/// Level after applying the command-line flags: `verbose` raises the
/// configured level to at least debug, `debug` to trace.
pub fn effective_level(configured: LogLevel, verbose: bool, debug: bool) -> LogLevel {
    let mut level = configured;
    if verbose {
        level = level.max(LogLevel::Debug);
    }
    if debug {
        level = LogLevel::Trace;
    }
    level
}

pub fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Error => LevelFilter::Error,
        LogLevel::Warn => LevelFilter::Warn,
        LogLevel::Info => LevelFilter::Info,
        LogLevel::Debug => LevelFilter::Debug,
        LogLevel::Trace => LevelFilter::Trace,
    }
}

/// Initialize the logging system at `level`. Runs before the config is
/// loaded so config errors are logged; call [`set_level`] once the
/// configured level is known.
pub fn init(level: LogLevel) {
    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        // keep dependency chatter out of --debug output
        .filter(None, LevelFilter::Info)
        .filter(Some(env!("CARGO_CRATE_NAME")), LevelFilter::Trace)
        .init();
    set_level(level);
}

/// Change the global level of an initialized logger
pub fn set_level(level: LogLevel) {
    log::set_max_level(level_filter(level));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_level() {
        assert_eq!(effective_level(LogLevel::Info, false, false), LogLevel::Info);
        assert_eq!(effective_level(LogLevel::Info, true, false), LogLevel::Debug);
        assert_eq!(effective_level(LogLevel::Trace, true, false), LogLevel::Trace);
        assert_eq!(effective_level(LogLevel::Warn, false, true), LogLevel::Trace);
    }

    #[test]
    fn test_set_level_after_startup() {
        // startup level from the flags alone, then the configured one
        set_level(effective_level(LogLevel::default(), true, false));
        assert_eq!(log::max_level(), LevelFilter::Debug);

        set_level(LogLevel::Warn);
        assert_eq!(log::max_level(), LevelFilter::Warn);
        assert!(log::max_level() < level_filter(LogLevel::Info));
    }
}
