//! Build fingerprinting and reuse (§4.7).
//!
//! `hashv0` turns a pinned component into a sha256 fingerprint over its
//! canonical JSON representation — canonical because `serde_json`'s default
//! `Map` is `BTreeMap`-backed (we don't enable the `preserve_order`
//! feature), so keys always serialize in sorted order regardless of struct
//! field order. Two components with the same fingerprint are guaranteed to
//! produce the same build inputs, so `BuildCache` can skip rebuilding them.

use std::fs;
use std::path::{Path, PathBuf};

use failure::ResultExt;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::overlay::PinnedComponent;
use crate::util::error::Result;
use crate::util::fsops;

const DONE_MARKER: &str = "DONE";

#[derive(Serialize)]
struct HashInput<'a> {
    component: &'a PinnedComponent,
    /// A component with `self_buildrequires` builds twice: once bootstrap
    /// (without its own prior RPMs as buildrequires) and once final (with
    /// them). The two passes must never share a cache entry.
    pass: &'static str,
}

pub struct BuildCache {
    root: PathBuf,
}

impl BuildCache {
    pub fn new(root: PathBuf) -> Result<BuildCache> {
        fs::create_dir_all(&root).with_context(|_| format!("couldn't create {}", root.display()))?;
        Ok(BuildCache { root })
    }

    /// Sha256 fingerprint (hex) of `component`'s build inputs.
    pub fn hashv0(component: &PinnedComponent, bootstrap: bool) -> Result<String> {
        let pass = if component.self_buildrequires && bootstrap {
            "bootstrap"
        } else {
            "final"
        };
        let input = HashInput { component, pass };
        let canonical = serde_json::to_vec(&input).with_context(|_| "couldn't serialize build fingerprint input")?;
        let mut hasher = Sha256::new();
        hasher.input(&canonical);
        Ok(crate::util::hexify(&hasher.result()))
    }

    fn cache_dir(&self, fingerprint: &str) -> PathBuf {
        let (prefix, _) = fingerprint.split_at(2.min(fingerprint.len()));
        self.root.join(prefix).join(fingerprint)
    }

    /// The cached output directory for `fingerprint`, if a prior build
    /// completed successfully.
    pub fn lookup(&self, fingerprint: &str) -> Option<PathBuf> {
        let dir = self.cache_dir(fingerprint);
        if dir.join(DONE_MARKER).exists() {
            Some(dir)
        } else {
            None
        }
    }

    /// Record a successful build's outputs under `fingerprint`, hardlinking
    /// each file in `built_rpms` into the cache.
    pub fn record(&self, fingerprint: &str, built_rpms: &[PathBuf]) -> Result<PathBuf> {
        let dir = self.cache_dir(fingerprint);
        fsops::clean_dir(&dir)?;
        for rpm in built_rpms {
            let name = rpm
                .file_name()
                .ok_or_else(|| failure::err_msg(format!("{} has no file name", rpm.display())))?;
            fsops::hardlink_or_copy(rpm, &dir.join(name))?;
        }
        fs::write(dir.join(DONE_MARKER), b"").with_context(|_| format!("couldn't mark {} done", dir.display()))?;
        Ok(dir)
    }

    pub fn rpms_in(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut rpms: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|_| format!("couldn't read {}", dir.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "rpm").unwrap_or(false))
            .collect();
        rpms.sort();
        Ok(rpms)
    }
}
