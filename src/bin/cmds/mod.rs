mod build;
mod resolve;
mod run;
mod snapshot;

use clap::{App, ArgMatches};
use distrover::config::Config;
use distrover::util::error::Result;

pub type Exec = fn(&Config, &ArgMatches) -> Result<String>;

pub fn subcommands() -> Vec<App<'static, 'static>> {
    vec![resolve::cli(), snapshot::cli(), build::cli(), run::cli()]
}

pub fn execute_internal(cmd: &str) -> Option<Exec> {
    match cmd {
        "resolve" => Some(resolve::exec),
        "snapshot" => Some(snapshot::exec),
        "build" => Some(build::exec),
        "run" => Some(run::exec),
        _ => None,
    }
}
