//! Filesystem primitives used throughout the pipeline: recursive delete,
//! atomic rename, hardlink-or-copy, and clean-dir. Every mutating operation
//! elsewhere in the crate is built out of these so that the "write to a
//! `.tmp` sibling, then rename into place" discipline (§5) lives in one
//! place.

use std::fs;
use std::path::Path;

use failure::ResultExt;
use walkdir::WalkDir;

use crate::util::error::Result;

/// Recursively delete `path` if it exists; a no-op otherwise.
pub fn remove_dir_all_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        remove_dir_all::remove_dir_all(path)
            .with_context(|_| format!("couldn't remove {}", path.display()))?;
    }
    Ok(())
}

/// Ensure `dir` exists and is empty, removing any prior contents.
pub fn clean_dir(dir: &Path) -> Result<()> {
    remove_dir_all_if_exists(dir)?;
    fs::create_dir_all(dir).with_context(|_| format!("couldn't create {}", dir.display()))?;
    Ok(())
}

/// Rename `from` to `to`, replacing anything already at `to`. On most
/// platforms `fs::rename` already does this atomically for same-filesystem
/// renames; we additionally clear `to` first so the call also works when
/// `to` is a non-empty directory (which a bare `rename` would refuse to
/// replace on some platforms).
pub fn atomic_rename(from: &Path, to: &Path) -> Result<()> {
    remove_dir_all_if_exists(to)?;
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).ok();
    }
    fs::rename(from, to).with_context(|_| format!("couldn't rename {} to {}", from.display(), to.display()))?;
    Ok(())
}

/// Hardlink `from` to `to`, falling back to a copy if they're on different
/// devices (hardlinks can't cross filesystems) or `to` already exists.
pub fn hardlink_or_copy(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).ok();
    }
    if to.exists() {
        fs::remove_file(to).ok();
    }
    if fs::hard_link(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to).with_context(|_| format!("couldn't link or copy {} to {}", from.display(), to.display()))?;
    Ok(())
}

/// Recursively copy `from` into `to`, skipping VCS metadata directories.
pub fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    let walker = WalkDir::new(from).follow_links(false).into_iter().filter_entry(|e| {
        e.file_name() != ".git" && e.file_name() != ".svn"
    });

    for entry in walker {
        let entry = entry.with_context(|_| format!("couldn't walk {}", from.display()))?;
        let rel = entry.path().strip_prefix(from).unwrap();
        let dest = to.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest).with_context(|_| format!("couldn't create {}", dest.display()))?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).ok();
            }
            fs::copy(entry.path(), &dest)
                .with_context(|_| format!("couldn't copy {} to {}", entry.path().display(), dest.display()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn clean_dir_removes_prior_contents() {
        let tmp = tempdir().unwrap();
        let target = tmp.path().join("d");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("stale"), b"x").unwrap();

        clean_dir(&target).unwrap();

        assert!(target.exists());
        assert!(!target.join("stale").exists());
    }

    #[test]
    fn atomic_rename_replaces_existing_dest() {
        let tmp = tempdir().unwrap();
        let from = tmp.path().join("from");
        let to = tmp.path().join("to");
        fs::create_dir(&from).unwrap();
        fs::write(from.join("a"), b"new").unwrap();
        fs::create_dir(&to).unwrap();
        fs::write(to.join("b"), b"old").unwrap();

        atomic_rename(&from, &to).unwrap();

        assert!(to.join("a").exists());
        assert!(!to.join("b").exists());
        assert!(!from.exists());
    }

    #[test]
    fn hardlink_or_copy_makes_readable_file() {
        let tmp = tempdir().unwrap();
        let from = tmp.path().join("src.txt");
        let to = tmp.path().join("dst.txt");
        fs::write(&from, b"hello").unwrap();

        hardlink_or_copy(&from, &to).unwrap();

        assert_eq!(fs::read(&to).unwrap(), b"hello");
    }

    #[test]
    fn copy_dir_skips_git_metadata() {
        let tmp = tempdir().unwrap();
        let from = tmp.path().join("src");
        let to = tmp.path().join("dst");
        fs::create_dir_all(from.join(".git")).unwrap();
        fs::write(from.join(".git/HEAD"), b"x").unwrap();
        fs::write(from.join("real.txt"), b"y").unwrap();

        copy_dir(&from, &to).unwrap();

        assert!(to.join("real.txt").exists());
        assert!(!to.join(".git").exists());
    }
}
