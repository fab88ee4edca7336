//! Two-generation atomic directory swap (§5: "every output directory is
//! written through prepare/commit so a crash never leaves a half-written
//! result live").
//!
//! A `SwappedDir` owns a `current` symlink that always points at either
//! `gen-a` or `gen-b` under its root. `prepare` hands back the *other*
//! generation's path, freshly emptied, for the caller to populate; `commit`
//! flips the symlink to it atomically; `abandon` just leaves `current`
//! alone. This is the same shape as the Python `swappeddir.py` helper this
//! is adapted from.

use std::path::{Path, PathBuf};

use failure::ResultExt;

use crate::util::error::Result;
use crate::util::fsops;

const GEN_A: &str = "gen-a";
const GEN_B: &str = "gen-b";
const CURRENT_LINK: &str = "current";

pub struct SwappedDir {
    root: PathBuf,
}

/// A prepared-but-not-yet-committed generation directory.
pub struct Prepared {
    path: PathBuf,
}

impl Prepared {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SwappedDir {
    pub fn new(root: PathBuf) -> Result<SwappedDir> {
        std::fs::create_dir_all(&root)
            .with_context(|_| format!("couldn't create {}", root.display()))?;
        Ok(SwappedDir { root })
    }

    /// The directory `current` points at, if it's ever been committed.
    pub fn current(&self) -> Option<PathBuf> {
        let link = self.root.join(CURRENT_LINK);
        let target = std::fs::read_link(&link).ok()?;
        let resolved = self.root.join(target);
        if resolved.exists() {
            Some(resolved)
        } else {
            None
        }
    }

    fn other_generation(&self) -> &'static str {
        match self.current_generation_name() {
            Some(GEN_A) => GEN_B,
            _ => GEN_A,
        }
    }

    fn current_generation_name(&self) -> Option<&'static str> {
        let link = self.root.join(CURRENT_LINK);
        match std::fs::read_link(&link).ok()?.to_str() {
            Some(GEN_A) => Some(GEN_A),
            Some(GEN_B) => Some(GEN_B),
            _ => None,
        }
    }

    /// Empty and return the generation directory *not* currently live, so
    /// the caller can populate it without disturbing whatever `current`
    /// points at.
    pub fn prepare(&self) -> Result<Prepared> {
        let gen = self.other_generation();
        let path = self.root.join(gen);
        fsops::clean_dir(&path)?;
        Ok(Prepared { path })
    }

    /// Atomically flip `current` to point at the prepared generation.
    pub fn commit(&self, prepared: Prepared) -> Result<PathBuf> {
        let gen_name = prepared
            .path
            .file_name()
            .expect("prepared path always has a file name")
            .to_owned();
        let link = self.root.join(CURRENT_LINK);
        let tmp_link = self.root.join("current.tmp");

        if tmp_link.exists() || tmp_link.symlink_metadata().is_ok() {
            std::fs::remove_file(&tmp_link).ok();
        }
        symlink::symlink_dir(Path::new(&gen_name), &tmp_link)
            .with_context(|_| format!("couldn't create symlink at {}", tmp_link.display()))?;
        fsops::atomic_rename(&tmp_link, &link)?;
        Ok(prepared.path)
    }

    /// Discard a prepared-but-unwanted generation. `current` is untouched.
    pub fn abandon(&self, _prepared: Prepared) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn commit_makes_current_resolve_to_prepared_contents() {
        let tmp = tempdir().unwrap();
        let dir = SwappedDir::new(tmp.path().join("d")).unwrap();

        assert!(dir.current().is_none());

        let prepared = dir.prepare().unwrap();
        std::fs::write(prepared.path().join("marker"), b"one").unwrap();
        dir.commit(prepared).unwrap();

        let current = dir.current().unwrap();
        assert_eq!(std::fs::read(current.join("marker")).unwrap(), b"one");
    }

    #[test]
    fn second_commit_swaps_generation_and_leaves_first_alone_until_reused() {
        let tmp = tempdir().unwrap();
        let dir = SwappedDir::new(tmp.path().join("d")).unwrap();

        let p1 = dir.prepare().unwrap();
        std::fs::write(p1.path().join("marker"), b"one").unwrap();
        let gen1 = p1.path().to_path_buf();
        dir.commit(p1).unwrap();

        let p2 = dir.prepare().unwrap();
        assert_ne!(p2.path(), gen1);
        std::fs::write(p2.path().join("marker"), b"two").unwrap();
        dir.commit(p2).unwrap();

        let current = dir.current().unwrap();
        assert_eq!(std::fs::read(current.join("marker")).unwrap(), b"two");
    }

    #[test]
    fn abandon_leaves_current_untouched() {
        let tmp = tempdir().unwrap();
        let dir = SwappedDir::new(tmp.path().join("d")).unwrap();

        let p1 = dir.prepare().unwrap();
        std::fs::write(p1.path().join("marker"), b"one").unwrap();
        dir.commit(p1).unwrap();

        let p2 = dir.prepare().unwrap();
        std::fs::write(p2.path().join("marker"), b"two").unwrap();
        dir.abandon(p2);

        let current = dir.current().unwrap();
        assert_eq!(std::fs::read(current.join("marker")).unwrap(), b"one");
    }
}
