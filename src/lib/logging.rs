//! Structured debug logging, kept separate from `util::shell`'s
//! user-facing status lines. This is where a developer goes to see what
//! `git2` calls were actually made and when, not where an operator looks to
//! watch a build proceed.

use slog::{o, Drain, Logger};

use crate::config::ConfigVerbosity;

/// Build a term-backed async logger gated by the same verbosity knob as the
/// shell: quiet suppresses everything below warning, verbose drops down to
/// trace.
pub fn init(verbosity: ConfigVerbosity) -> Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let level = match verbosity {
        ConfigVerbosity::Verbose => slog::Level::Trace,
        ConfigVerbosity::Normal => slog::Level::Info,
        ConfigVerbosity::Quiet => slog::Level::Warning,
    };
    let drain = slog::LevelFilter::new(drain, level).fuse();
    Logger::root(drain, o!())
}

/// A logger that discards everything, for tests that don't care to see it.
pub fn discard() -> Logger {
    Logger::root(slog::Discard, o!())
}
