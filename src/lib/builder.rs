//! Drives the sandboxed RPM builder (a mock-like external tool) over every
//! pinned component (§4.7, §4.8).
//!
//! Components are attempted in repeated passes until a pass builds nothing
//! new ("retry until no progress") rather than computed from an explicit
//! dependency graph — buildrequires are resolved by the sandboxed builder
//! itself against whatever's already in the local repo, so a component that
//! fails because a buildrequire isn't built yet just succeeds on a later
//! pass once that dependency lands.

use std::path::{Path, PathBuf};

use failure::ResultExt;
use slog::{debug, o, Logger};

use crate::buildcache::BuildCache;
use crate::overlay::PinnedComponent;
use crate::swapped_dir::SwappedDir;
use crate::util::error::{ErrorKind, Result};
use crate::util::process::ProcessRunner;
use crate::util::shell::Shell;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
    /// Built cleanly.
    Success,
    /// The mock root itself failed to initialize (missing buildrequire,
    /// broken repo metadata) — worth retrying once the repo gains more RPMs.
    RootFailed,
    /// The package's own build steps failed; retrying won't help without a
    /// spec or patch change.
    BuildFailed,
    /// Exit status didn't match any recognized shape.
    Unknown,
}

pub struct BuildOutcome {
    pub name: String,
    pub status: BuildStatus,
    pub root_log_tail: Option<String>,
    pub build_log_tail: Option<String>,
}

pub struct Builder<'a> {
    mock_root: PathBuf,
    repo_dir: SwappedDir,
    cache: &'a BuildCache,
    mock_config: &'a str,
    log: Logger,
}

const LOG_TAIL_BYTES: usize = 4096;

impl<'a> Builder<'a> {
    pub fn new(
        mock_root: PathBuf,
        repo_dir: SwappedDir,
        cache: &'a BuildCache,
        mock_config: &'a str,
        log: Logger,
    ) -> Self {
        Builder {
            mock_root,
            repo_dir,
            cache,
            mock_config,
            log: log.new(o!("component" => "builder")),
        }
    }

    /// Run every not-yet-built component through the sandboxed builder,
    /// repeating passes until one makes no progress. Returns the final
    /// outcome for every component (built this run or pulled from cache).
    pub fn build_all(
        &self,
        components: &[PinnedComponent],
        snapshots: &[(String, PathBuf)],
        shell: &Shell,
    ) -> Result<Vec<BuildOutcome>> {
        let mut remaining: Vec<&PinnedComponent> = components.iter().collect();
        let mut outcomes = Vec::new();

        loop {
            let mut progressed = false;
            let mut still_remaining = Vec::new();

            for component in remaining {
                let fingerprint = BuildCache::hashv0(component, false)?;
                if let Some(cached) = self.cache.lookup(&fingerprint) {
                    shell.status("Cached", &component.name);
                    debug!(self.log, "cache hit"; "component" => &component.name, "fingerprint" => &fingerprint);
                    self.ingest_into_repo(&cached)?;
                    outcomes.push(BuildOutcome {
                        name: component.name.clone(),
                        status: BuildStatus::Success,
                        root_log_tail: None,
                        build_log_tail: None,
                    });
                    progressed = true;
                    continue;
                }

                let srcsnap = snapshots
                    .iter()
                    .find(|(name, _)| name == &component.name)
                    .map(|(_, p)| p.as_path());
                let srcsnap = match srcsnap {
                    Some(p) => p,
                    None => {
                        still_remaining.push(component);
                        continue;
                    }
                };

                shell.status("Building", &component.name);
                let outcome = self.build_one(component, srcsnap)?;
                match outcome.status {
                    BuildStatus::Success => {
                        let rpms = BuildCache::rpms_in(&self.build_result_dir(component))?;
                        let cached = self.cache.record(&fingerprint, &rpms)?;
                        self.ingest_into_repo(&cached)?;
                        progressed = true;
                        outcomes.push(outcome);
                    }
                    BuildStatus::RootFailed => {
                        still_remaining.push(component);
                        outcomes.push(outcome);
                    }
                    BuildStatus::BuildFailed | BuildStatus::Unknown => {
                        outcomes.push(outcome);
                    }
                }
            }

            if !progressed || still_remaining.is_empty() {
                if !still_remaining.is_empty() {
                    shell.warn(format!(
                        "build pass made no progress; {} component(s) still failing",
                        still_remaining.len()
                    ));
                    return Err(ErrorKind::NoProgress {
                        count: still_remaining.len(),
                    }
                    .into());
                }
                break;
            }
            remaining = still_remaining;
        }

        Ok(outcomes)
    }

    fn build_result_dir(&self, component: &PinnedComponent) -> PathBuf {
        self.mock_root.join("results").join(&component.pkgname)
    }

    fn build_one(&self, component: &PinnedComponent, srcsnap: &Path) -> Result<BuildOutcome> {
        let result_dir = self.build_result_dir(component);
        crate::util::fsops::clean_dir(&result_dir)?;

        let mut runner = ProcessRunner::new("mock");
        runner
            .arg("-r")
            .arg(self.mock_config)
            .arg("--resultdir")
            .arg(&result_dir)
            .arg("--rebuild");
        for with in &component.rpmwith {
            runner.arg("--with").arg(with);
        }
        for without in &component.rpmwithout {
            runner.arg("--without").arg(without);
        }
        runner.arg(srcsnap);

        // Unlike `exec_with_output`, we need the raw exit status even on
        // failure: a non-zero mock exit is an expected outcome here, to be
        // classified from the logs it left behind, not a Rust-level error.
        debug!(self.log, "invoking mock"; "component" => &component.name, "command" => %runner);
        let output = runner
            .build_command()
            .output()
            .with_context(|_| format!("could not execute {}", runner))?;
        let status = output.status;
        let root_log = read_log_tail(&result_dir.join("root.log"));
        let build_log = read_log_tail(&result_dir.join("build.log"));

        let classified = if status.success() {
            BuildStatus::Success
        } else if root_log.is_some() && build_log.is_none() {
            BuildStatus::RootFailed
        } else if build_log.is_some() {
            BuildStatus::BuildFailed
        } else {
            BuildStatus::Unknown
        };

        debug!(self.log, "build finished"; "component" => &component.name, "status" => ?classified);

        Ok(BuildOutcome {
            name: component.name.clone(),
            status: classified,
            root_log_tail: root_log,
            build_log_tail: build_log,
        })
    }

    fn ingest_into_repo(&self, built_dir: &Path) -> Result<()> {
        let prepared = self.repo_dir.prepare()?;
        if let Some(current) = self.repo_dir.current() {
            crate::util::fsops::copy_dir(&current, prepared.path())?;
        }
        for rpm in BuildCache::rpms_in(built_dir)? {
            let name = rpm.file_name().unwrap();
            crate::util::fsops::hardlink_or_copy(&rpm, &prepared.path().join(name))?;
        }
        self.repo_dir.commit(prepared)?;
        Ok(())
    }
}

fn read_log_tail(path: &Path) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    let start = bytes.len().saturating_sub(LOG_TAIL_BYTES);
    Some(String::from_utf8_lossy(&bytes[start..]).into_owned())
}
