//! Wires the individual pipeline stages (resolve → snapshot → build)
//! together around a working directory, the way each `distrover` subcommand
//! needs to. Kept separate from `cli` so the stages stay independently
//! testable and callable from something other than a terminal.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use failure::ResultExt;
use slog::Logger;

use crate::buildcache::BuildCache;
use crate::builder::{BuildOutcome, Builder};
use crate::mirror::Mirror;
use crate::overlay::{OverlayLoader, PinnedOverlay, RootDoc};
use crate::resolver::{FetchPolicy, Resolver};
use crate::snapshot::{LookasideStore, Snapshotter};
use crate::swapped_dir::SwappedDir;
use crate::util::error::Result;
use crate::util::shell::Shell;

pub const PINNED_FILE: &str = "pinned.json";

pub fn workdir_mirrors(workdir: &Path) -> PathBuf {
    workdir.join("mirrors")
}

pub fn workdir_lookaside(workdir: &Path) -> PathBuf {
    workdir.join("lookaside")
}

pub fn workdir_scratch(workdir: &Path) -> PathBuf {
    workdir.join("scratch")
}

pub fn workdir_snapshots(workdir: &Path) -> PathBuf {
    workdir.join("snapshots")
}

pub fn workdir_cache(workdir: &Path) -> PathBuf {
    workdir.join("cache")
}

pub fn workdir_repo(workdir: &Path) -> PathBuf {
    workdir.join("repo")
}

pub fn read_pinned(workdir: &Path) -> Result<PinnedOverlay> {
    let path = workdir.join(PINNED_FILE);
    let text = fs::read_to_string(&path).with_context(|_| format!("couldn't read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|_| format!("couldn't parse {}", path.display())).map_err(Into::into)
}

pub fn write_pinned(workdir: &Path, pinned: &PinnedOverlay) -> Result<()> {
    let path = workdir.join(PINNED_FILE);
    let text = serde_json::to_string_pretty(pinned).with_context(|_| "couldn't serialize pinned overlay")?;
    fs::write(&path, text).with_context(|_| format!("couldn't write {}", path.display()))?;
    Ok(())
}

/// Stage 1: load the overlay document and pin every component to a
/// concrete revision, writing `pinned.json` into `workdir`.
pub fn resolve(
    overlay_path: &Path,
    workdir: &Path,
    fetch_named: Option<HashSet<String>>,
    fetch_all: bool,
    fetch_continue: bool,
    shell: &Shell,
    log: &Logger,
) -> Result<Vec<(String, String)>> {
    fs::create_dir_all(workdir).with_context(|_| format!("couldn't create {}", workdir.display()))?;
    let loaded = OverlayLoader::load_from_path(overlay_path)?;

    let mirror = Mirror::new(workdir_mirrors(workdir), log.clone())?;
    let policy = if fetch_all {
        FetchPolicy::All
    } else if let Some(names) = fetch_named {
        FetchPolicy::Named(names)
    } else {
        FetchPolicy::None
    };

    let resolver = Resolver::new(&mirror, policy, fetch_continue, log.clone());
    let outcome = resolver.resolve_all(&loaded.components, shell)?;

    write_pinned(
        workdir,
        &PinnedOverlay {
            generated_warning: Some("generated by distrover resolve; do not edit by hand".to_owned()),
            root: RootDoc { mock: loaded.root_mock },
            components: outcome.pinned,
        },
    )?;

    Ok(outcome.failed)
}

/// Stage 2: produce a source snapshot for every pinned component, recording
/// the snapshot path back into `pinned.json`.
pub fn snapshot(workdir: &Path, shell: &Shell, log: &Logger) -> Result<()> {
    let mut pinned = read_pinned(workdir)?;
    let mirror = Mirror::new(workdir_mirrors(workdir), log.clone())?;
    let lookaside = LookasideStore::new(workdir_lookaside(workdir));
    let snapshotter = Snapshotter::new(&mirror, lookaside, log.clone());

    let out_dir = workdir_snapshots(workdir);
    let scratch = workdir_scratch(workdir);
    fs::create_dir_all(&out_dir).with_context(|_| format!("couldn't create {}", out_dir.display()))?;
    fs::create_dir_all(&scratch).with_context(|_| format!("couldn't create {}", scratch.display()))?;

    for component in &mut pinned.components {
        shell.status("Snapshotting", &component.name);
        let dir = snapshotter.snapshot(component, &out_dir, &scratch)?;
        component.srcsnap = Some(dir.display().to_string());
    }

    write_pinned(workdir, &pinned)
}

/// Stage 3: build every snapshotted component in the sandboxed builder,
/// assembling successes into a local repo under `workdir/repo`.
pub fn build(workdir: &Path, mock_config: &str, shell: &Shell, log: &Logger) -> Result<Vec<BuildOutcome>> {
    let pinned = read_pinned(workdir)?;
    let cache = BuildCache::new(workdir_cache(workdir))?;
    let repo_dir = SwappedDir::new(workdir_repo(workdir))?;
    let builder = Builder::new(workdir.join("mock-root"), repo_dir, &cache, mock_config, log.clone());

    let snapshots: Vec<(String, PathBuf)> = pinned
        .components
        .iter()
        .filter_map(|c| c.srcsnap.as_ref().map(|s| (c.name.clone(), PathBuf::from(s))))
        .collect();

    builder.build_all(&pinned.components, &snapshots, shell)
}
