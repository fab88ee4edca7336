use clap::{App, Arg, ArgMatches, SubCommand};
use distrover::builder::BuildStatus;
use distrover::config::Config;
use distrover::pipeline;
use distrover::util::error::Result;

pub fn cli() -> App<'static, 'static> {
    SubCommand::with_name("build")
        .about("Build every snapshotted component and assemble a local repo")
        .arg(
            Arg::with_name("mock-config")
                .long("mock-config")
                .takes_value(true)
                .required(true)
                .help("The mock chroot configuration to build in"),
        )
}

pub fn exec(c: &Config, args: &ArgMatches) -> Result<String> {
    let shell = c.shell();
    let log = c.log();
    let workdir = c.workdir_or_default()?;
    let mock_config = args.value_of("mock-config").expect("required arg");

    let outcomes = pipeline::build(&workdir, mock_config, &shell, &log)?;
    let built = outcomes.iter().filter(|o| o.status == BuildStatus::Success).count();
    let failed: Vec<_> = outcomes.iter().filter(|o| o.status != BuildStatus::Success).collect();

    for outcome in &failed {
        shell.error(format!("{}: {:?}", outcome.name, outcome.status));
        if let Some(tail) = &outcome.build_log_tail {
            shell.error(tail);
        } else if let Some(tail) = &outcome.root_log_tail {
            shell.error(tail);
        }
    }

    Ok(format!("built {} component(s), {} failed", built, failed.len()))
}
