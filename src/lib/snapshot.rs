//! Produces a buildable source snapshot for a single pinned component
//! (§4.6): a directory holding a rewritten spec file, any lookaside sources
//! it needs, and (for components with an upstream source) a freshly-rolled
//! source tarball in place of whatever distgit's own `Source0` pointed at.

use std::fs;
use std::path::{Path, PathBuf};

use failure::ResultExt;
use flate2::write::GzEncoder;
use flate2::Compression;
use slog::{debug, o, Logger};

use crate::mirror::Mirror;
use crate::overlay::{Patches, PinnedComponent};
use crate::specfile::SpecRewriter;
use crate::util::error::{ErrorKind, Result};
use crate::util::fsops;

/// Local object store for dist-git "lookaside cache" sources, keyed by the
/// sha256 of their contents the way `sources` files in real distgit repos
/// record them (`<sha256>  <filename>`).
pub struct LookasideStore {
    root: PathBuf,
}

impl LookasideStore {
    pub fn new(root: PathBuf) -> LookasideStore {
        LookasideStore { root }
    }

    pub fn object_path(&self, sha256: &str) -> PathBuf {
        let (prefix, _) = sha256.split_at(2.min(sha256.len()));
        self.root.join(prefix).join(sha256)
    }
}

pub struct Snapshotter<'a> {
    mirror: &'a Mirror,
    lookaside: LookasideStore,
    log: Logger,
}

impl<'a> Snapshotter<'a> {
    pub fn new(mirror: &'a Mirror, lookaside: LookasideStore, log: Logger) -> Self {
        Snapshotter {
            mirror,
            lookaside,
            log: log.new(o!("component" => "snapshotter")),
        }
    }

    /// Write a snapshot for `pinned` under `out_dir/<pkgname>/`, using
    /// `scratch` for intermediate checkouts. Returns the snapshot directory.
    pub fn snapshot(&self, pinned: &PinnedComponent, out_dir: &Path, scratch: &Path) -> Result<PathBuf> {
        let distgit_checkout = scratch.join(format!("{}-distgit", pinned.name));
        self.mirror
            .checkout_into(&pinned.distgit, &pinned.distgit_revision, &distgit_checkout)?;

        let spec_path = find_spec_file(&distgit_checkout)?;

        if let (Some(src), Some(src_revision)) = (&pinned.src, &pinned.src_revision) {
            let src_checkout = scratch.join(format!("{}-src", pinned.name));
            self.mirror.checkout_into(src, src_revision, &src_checkout)?;

            if pinned.spec_internal {
                let internal_spec = find_spec_file(&src_checkout)?;
                fs::copy(&internal_spec, &spec_path).with_context(|_| {
                    format!(
                        "couldn't copy internal spec {} to {}",
                        internal_spec.display(),
                        spec_path.display()
                    )
                })?;
            }

            let short_rev = &src_revision[..12.min(src_revision.len())];
            let archive_dirname = format!("{}-{}", pinned.pkgname, short_rev);
            let tarball_name = format!("{}.tar.gz", archive_dirname);
            let tarball_path = out_dir.join(&tarball_name);
            fs::create_dir_all(out_dir).with_context(|_| format!("couldn't create {}", out_dir.display()))?;
            write_source_tarball(&src_checkout, &archive_dirname, &tarball_path)?;

            let mut spec = SpecRewriter::open(&spec_path)?;
            spec.set_setup_dirname(&archive_dirname)?;
            if let Some(version) = &pinned.override_version {
                spec.set_tag("Version", version)?;
            }
            if let Ok(release) = spec.require_tag("Release") {
                let (_, dist) = SpecRewriter::release_parts(&release);
                let new_release = match dist {
                    Some(d) => format!("1.{}", d),
                    None => "1".to_owned(),
                };
                spec.set_tag("Release", &new_release)?;
            }
            self.log_and_apply_patch_policy(&mut spec, pinned);
            spec.delete_changelog();
            spec.save()?;
        } else {
            let mut spec = SpecRewriter::open(&spec_path)?;
            self.log_and_apply_patch_policy(&mut spec, pinned);
            spec.delete_changelog();
            spec.save()?;
        }

        self.hardlink_lookaside_sources(&distgit_checkout)?;

        let dest = out_dir.join(&pinned.pkgname);
        fsops::remove_dir_all_if_exists(&dest)?;
        fsops::copy_dir(&distgit_checkout, &dest)?;
        Ok(dest)
    }

    fn log_and_apply_patch_policy(&self, spec: &mut SpecRewriter, pinned: &PinnedComponent) {
        let fns = spec.get_patch_fns();
        if pinned.patches == Patches::Drop {
            spec.wipe_patches();
            debug!(self.log, "dropped patches"; "component" => &pinned.name, "patches" => ?fns);
        } else {
            debug!(self.log, "kept patches"; "component" => &pinned.name, "count" => fns.len());
        }
    }

    /// Hardlink every object named in a dist-git `sources` file (format:
    /// `<sha256>  <filename>` per line) from the lookaside store into the
    /// checkout, so rpmbuild finds `Source:` files it doesn't carry in git.
    fn hardlink_lookaside_sources(&self, checkout: &Path) -> Result<()> {
        let sources_file = checkout.join("sources");
        if !sources_file.exists() {
            return Ok(());
        }
        let text = fs::read_to_string(&sources_file)
            .with_context(|_| format!("couldn't read {}", sources_file.display()))?;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.splitn(2, char::is_whitespace);
            let hash = parts.next().unwrap_or("");
            let filename = parts.next().unwrap_or("").trim();
            if hash.is_empty() || filename.is_empty() {
                continue;
            }
            let object = self.lookaside.object_path(hash);
            if !object.exists() {
                return Err(ErrorKind::MissingLookasideObject {
                    hash: hash.to_owned(),
                    filename: filename.to_owned(),
                }
                .into());
            }
            fsops::hardlink_or_copy(&object, &checkout.join(filename))?;
        }
        Ok(())
    }
}

fn find_spec_file(dir: &Path) -> Result<PathBuf> {
    let mut specs: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|_| format!("couldn't read {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|e| e == "spec").unwrap_or(false))
        .collect();

    match specs.len() {
        0 => Err(ErrorKind::NoSpecFile {
            dir: dir.display().to_string(),
        }
        .into()),
        1 => Ok(specs.remove(0)),
        _ => Err(ErrorKind::AmbiguousSpecFile {
            dir: dir.display().to_string(),
        }
        .into()),
    }
}

fn write_source_tarball(src_dir: &Path, archive_dirname: &str, tarball_path: &Path) -> Result<()> {
    let file = fs::File::create(tarball_path)
        .with_context(|_| format!("couldn't create {}", tarball_path.display()))?;
    let enc = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(enc);
    builder
        .append_dir_all(archive_dirname, src_dir)
        .with_context(|_| format!("couldn't archive {}", src_dir.display()))?;
    builder
        .into_inner()
        .with_context(|_| "couldn't finish tarball")?
        .finish()
        .with_context(|_| "couldn't finish gzip stream")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn find_spec_file_requires_exactly_one() {
        let tmp = tempdir().unwrap();
        assert!(find_spec_file(tmp.path()).is_err());

        fs::write(tmp.path().join("widget.spec"), b"Name: widget\n").unwrap();
        assert_eq!(find_spec_file(tmp.path()).unwrap(), tmp.path().join("widget.spec"));

        fs::write(tmp.path().join("other.spec"), b"Name: other\n").unwrap();
        assert!(find_spec_file(tmp.path()).is_err());
    }

    #[test]
    fn write_source_tarball_produces_readable_gzip() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("a.txt"), b"hi").unwrap();

        let tarball = tmp.path().join("out.tar.gz");
        write_source_tarball(&src, "widget-123", &tarball).unwrap();

        let bytes = fs::read(&tarball).unwrap();
        assert!(!bytes.is_empty());
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn lookaside_object_path_shards_by_prefix() {
        let store = LookasideStore::new(PathBuf::from("/lookaside"));
        assert_eq!(
            store.object_path("abcdef0123"),
            PathBuf::from("/lookaside/ab/abcdef0123")
        );
    }
}
