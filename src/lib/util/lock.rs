//! Locking to make sure that multiple copies of `distrover` don't clobber each other.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// A lock on a directory. This just generates a sibling file to the directory which indicates
/// that the directory is locked.
pub struct DirLock {
    path: PathBuf,
    lock_path: PathBuf,
}

impl DirLock {
    pub fn acquire<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = fs::canonicalize(path)?;
        Self::from_canonical(path)
    }

    /// Like `acquire`, but creates `path` as an empty directory first if it doesn't exist yet.
    pub fn acquire_or_create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            fs::create_dir_all(path)?;
        }
        let path = fs::canonicalize(path)?;
        Self::from_canonical(path)
    }

    fn from_canonical(path: PathBuf) -> io::Result<Self> {
        let lock_path = {
            let mut p = path.clone();
            p.set_extension("lock");
            p
        };
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .map(|_| DirLock { path, lock_path })
    }

    pub fn release(self) -> io::Result<()> {
        fs::remove_file(self.lock_path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
