use std::collections::HashSet;
use std::path::PathBuf;

use clap::{App, Arg, ArgMatches, SubCommand};
use distrover::config::Config;
use distrover::pipeline;
use distrover::util::error::Result;

pub fn cli() -> App<'static, 'static> {
    SubCommand::with_name("resolve")
        .about("Pin every component in an overlay document to a concrete git revision")
        .arg(Arg::with_name("overlay").required(true).help("Path to the overlay YAML document"))
        .arg(
            Arg::with_name("fetch")
                .long("fetch")
                .takes_value(true)
                .multiple(true)
                .help("Fetch only the named component(s) from origin before resolving"),
        )
        .arg(Arg::with_name("fetch-all").long("fetch-all").help("Fetch every component from origin before resolving"))
        .arg(
            Arg::with_name("fetch-continue")
                .long("fetch-continue")
                .help("Keep resolving remaining components if one fails to fetch"),
        )
}

pub fn exec(c: &Config, args: &ArgMatches) -> Result<String> {
    let shell = c.shell();
    let workdir = c.workdir_or_default()?;
    let overlay_path = PathBuf::from(args.value_of("overlay").expect("required arg"));

    let fetch_all = args.is_present("fetch-all");
    let fetch_named: Option<HashSet<String>> = args
        .values_of("fetch")
        .map(|vs| vs.map(|s| s.to_owned()).collect());
    let fetch_continue = args.is_present("fetch-continue");

    let log = c.log();
    let failed = pipeline::resolve(&overlay_path, &workdir, fetch_named, fetch_all, fetch_continue, &shell, &log)?;

    if failed.is_empty() {
        Ok("resolved".to_owned())
    } else {
        for (name, err) in &failed {
            shell.error(format!("{}: {}", name, err));
        }
        Ok(format!("resolved with {} failure(s)", failed.len()))
    }
}
