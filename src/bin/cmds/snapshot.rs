use clap::{App, ArgMatches, SubCommand};
use distrover::config::Config;
use distrover::pipeline;
use distrover::util::error::Result;

pub fn cli() -> App<'static, 'static> {
    SubCommand::with_name("snapshot")
        .about("Produce a source snapshot for every component pinned by `resolve`")
}

pub fn exec(c: &Config, _args: &ArgMatches) -> Result<String> {
    let shell = c.shell();
    let log = c.log();
    let workdir = c.workdir_or_default()?;
    pipeline::snapshot(&workdir, &shell, &log)?;
    Ok("snapshotted".to_owned())
}
