use std::path::PathBuf;

use clap::{App, Arg, ArgMatches, SubCommand};
use distrover::builder::BuildStatus;
use distrover::config::Config;
use distrover::pipeline;
use distrover::util::error::Result;

pub fn cli() -> App<'static, 'static> {
    SubCommand::with_name("run")
        .about("Resolve, snapshot, and build an overlay in one pass")
        .arg(Arg::with_name("overlay").required(true).help("Path to the overlay YAML document"))
        .arg(
            Arg::with_name("mock-config")
                .long("mock-config")
                .takes_value(true)
                .required(true)
                .help("The mock chroot configuration to build in"),
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
    let log = c.log();
    let workdir = c.workdir_or_default()?;
    let overlay_path = PathBuf::from(args.value_of("overlay").expect("required arg"));
    let mock_config = args.value_of("mock-config").expect("required arg");

    let failed = pipeline::resolve(
        &overlay_path,
        &workdir,
        None,
        args.is_present("fetch-all"),
        args.is_present("fetch-continue"),
        &shell,
        &log,
    )?;
    for (name, err) in &failed {
        shell.warn(format!("{}: {}", name, err));
    }

    pipeline::snapshot(&workdir, &shell, &log)?;
    let outcomes = pipeline::build(&workdir, mock_config, &shell, &log)?;

    let built = outcomes.iter().filter(|o| o.status == BuildStatus::Success).count();
    let build_failed = outcomes.iter().filter(|o| o.status != BuildStatus::Success).count();

    Ok(format!(
        "built {} component(s), {} build failure(s), {} resolve failure(s)",
        built,
        build_failed,
        failed.len()
    ))
}
