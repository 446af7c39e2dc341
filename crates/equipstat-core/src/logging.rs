//! Logging setup on top of env_logger

use std::io::{IsTerminal, Write};

/// ANSI color code and padded label for a log level.
fn level_style(level: log::Level, color: bool) -> (&'static str, &'static str, &'static str) {
    let label = match level {
        log::Level::Error => "ERROR",
        log::Level::Warn => "WARN ",
        log::Level::Info => "INFO ",
        log::Level::Debug => "DEBUG",
        log::Level::Trace => "TRACE",
    };
    if !color {
        return ("", label, "");
    }
    let ansi = match level {
        log::Level::Error => "\x1b[31m",
        log::Level::Warn => "\x1b[33m",
        log::Level::Info => "\x1b[32m",
        log::Level::Debug => "\x1b[36m",
        log::Level::Trace => "\x1b[35m",
    };
    (ansi, label, "\x1b[0m")
}

/// Default filter for the given verbosity flags. `debug` wins over `quiet`.
pub fn default_filter(quiet: bool, debug: bool) -> &'static str {
    if debug {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    }
}

/// Initialize logging to stderr. `RUST_LOG` overrides the default filter.
///
/// Colors are used only when stderr is a terminal; otherwise lines are
/// plain for log aggregation.
pub fn init_logging(quiet: bool, debug: bool) {
    let color = std::io::stderr().is_terminal();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter(quiet, debug)),
    )
    .format(move |buf, record| {
        let (pre, label, post) = level_style(record.level(), color);
        writeln!(buf, "[{pre}{label}{post}] {}", record.args())
    })
    .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_padded() {
        for level in [log::Level::Error, log::Level::Warn, log::Level::Info] {
            let (_, label, _) = level_style(level, false);
            assert_eq!(label.len(), 5);
        }
    }

    #[test]
    fn no_ansi_without_color() {
        let (pre, _, post) = level_style(log::Level::Warn, false);
        assert!(pre.is_empty() && post.is_empty());
        let (pre, _, post) = level_style(log::Level::Warn, true);
        assert!(pre.starts_with("\x1b["));
        assert_eq!(post, "\x1b[0m");
    }

    #[test]
    fn filter_precedence() {
        assert_eq!(default_filter(false, false), "info");
        assert_eq!(default_filter(true, false), "warn");
        assert_eq!(default_filter(true, true), "debug");
    }
}
