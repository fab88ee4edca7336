#[macro_use]
extern crate clap;

mod cmds;

use std::process::exit;
use std::time::Instant;

use clap::{App, AppSettings, Arg};
use console::style;
use distrover::config::{Config, ConfigVerbosity};
use distrover::util::error::Result;
use failure::Error;

fn cli() -> App<'static, 'static> {
    App::new("distrover")
        .about("Builds a local RPM repository overlay from a declarative set of upstream/packaging git pairs")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .version(crate_version!())
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Verbose output")
                .global(true)
                .conflicts_with("quiet"),
        )
        .arg(
            Arg::with_name("quiet")
                .long("quiet")
                .help("Quiet output")
                .global(true),
        )
        .subcommands(cmds::subcommands())
}

fn go() -> Result<String> {
    let args = cli().get_matches();
    let mut config = Config::load().with_context_display("could not load configuration")?;

    if args.is_present("verbose") {
        config.term.verbosity = ConfigVerbosity::Verbose;
    } else if args.is_present("quiet") {
        config.term.verbosity = ConfigVerbosity::Quiet;
    }

    let (cmd, subcommand_args) = match args.subcommand() {
        (cmd, Some(args)) => (cmd, args),
        _ => unreachable!("clap enforces a subcommand is present"),
    };

    let exec = cmds::execute_internal(cmd).expect("clap validated this is a known subcommand");
    exec(&config, subcommand_args)
}

/// `failure::ResultExt::with_context` wants a `Fail`-typed closure argument;
/// this is a small convenience for the common "just attach a literal
/// string" case used throughout the CLI entry point.
trait WithContextDisplay<T> {
    fn with_context_display(self, msg: &str) -> Result<T>;
}

impl<T> WithContextDisplay<T> for std::result::Result<T, Error> {
    fn with_context_display(self, msg: &str) -> Result<T> {
        self.map_err(|e| failure::format_err!("{}: {}", msg, e))
    }
}

fn main() {
    let start = Instant::now();
    let res = go();

    match res {
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            exit(1);
        }
        Ok(msg) => {
            let elapsed = start.elapsed();
            println!(
                "{} {} [{}.{}s]",
                style("done:").green().bold(),
                msg,
                elapsed.as_secs(),
                elapsed.subsec_millis() / 10
            );
            exit(0);
        }
    }
}
