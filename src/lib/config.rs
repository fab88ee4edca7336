//! Ambient `distrover` configuration.
//!
//! This is distinct from the overlay document (`overlay::Overlay`), which is
//! the declarative description of what to build. This `Config` instead
//! holds settings about how the tool itself behaves: where to root the
//! working directory by default, how chatty to be, whether to use color.
//! It's layered the way the teacher's own config loader is: defaults, then
//! an optional `~/.distrover/config.toml`, then `DISTROVER_`-prefixed
//! environment variables.

use std::path::PathBuf;

use failure::ResultExt;
use serde::{Deserialize, Serialize};
use slog::Logger;

use crate::util::error::Result;
use crate::util::shell::{Shell, Verbosity};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub term: Term,
    #[serde(default)]
    pub workdir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Term {
    #[serde(default = "default_color")]
    pub color: bool,
    #[serde(default)]
    pub verbosity: ConfigVerbosity,
}

fn default_color() -> bool {
    true
}

impl Default for Term {
    fn default() -> Self {
        Term {
            color: true,
            verbosity: ConfigVerbosity::Normal,
        }
    }
}

/// Mirrors `util::shell::Verbosity`, but derives `Deserialize`/`Serialize` for config files
/// without forcing the shell module to depend on serde.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigVerbosity {
    Verbose,
    Normal,
    Quiet,
}

impl Default for ConfigVerbosity {
    fn default() -> Self {
        ConfigVerbosity::Normal
    }
}

impl From<ConfigVerbosity> for Verbosity {
    fn from(v: ConfigVerbosity) -> Self {
        match v {
            ConfigVerbosity::Verbose => Verbosity::Verbose,
            ConfigVerbosity::Normal => Verbosity::Normal,
            ConfigVerbosity::Quiet => Verbosity::Quiet,
        }
    }
}

impl Config {
    pub fn load() -> Result<Config> {
        let mut c = config::Config::new();

        if let Some(home) = directories::BaseDirs::new() {
            c.merge(
                config::File::from(home.home_dir().join(".distrover/config"))
                    .format(config::FileFormat::Toml)
                    .required(false),
            )?;
        }

        c.merge(config::Environment::with_prefix("distrover"))?;

        // `config` errors if nothing was merged and no defaults exist for required fields;
        // since every field here has a default, an empty source set still deserializes fine.
        match c.try_into() {
            Ok(cfg) => Ok(cfg),
            Err(_) => Ok(Config::default()),
        }
    }

    pub fn shell(&self) -> Shell {
        Shell::new(self.term.verbosity.into())
    }

    /// A structured logger gated by the same verbosity knob as the shell,
    /// for the debug-level detail `util::shell`'s status lines don't carry.
    pub fn log(&self) -> Logger {
        crate::logging::init(self.term.verbosity)
    }

    /// The working directory every pipeline stage reads/writes its state
    /// under: `workdir` from config if set, else `./.distrover` relative to
    /// the current directory.
    pub fn workdir_or_default(&self) -> Result<PathBuf> {
        match &self.workdir {
            Some(dir) => Ok(dir.clone()),
            None => {
                let cwd = std::env::current_dir()
                    .with_context(|_| "couldn't determine current directory")?;
                Ok(cwd.join(".distrover"))
            }
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            term: Term::default(),
            workdir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_normal_verbosity() {
        let c = Config::default();
        assert_eq!(c.term.verbosity, ConfigVerbosity::Normal);
    }
}
