//! Content-addressed local git mirror (§4.1, §4.2).
//!
//! Every distinct URL we ever clone gets exactly one bare repository under
//! the mirror root, named by a hash of the URL so that two components
//! pointing at the same upstream repo share a single clone. `Mirror` wraps
//! the git plumbing in `util::git` (lifted nearly verbatim from Cargo's own
//! git source handling) with the clone/fetch/resolve/checkout operations the
//! rest of the pipeline needs.

use std::path::{Path, PathBuf};

use failure::ResultExt;
use sha2::{Digest, Sha256};
use slog::{debug, o, Logger};

use crate::overlay::{RefSpec, UrlRef};
use crate::util::error::{ErrorKind, Result};
use crate::util::fsops;
use crate::util::git;
use crate::util::shell::Shell;

/// `+refs/*:refs/*` is the widest possible fetch refspec; a bare mirror
/// exists to hold everything a component might ever be pinned to, not just
/// the one ref currently in use.
const MIRROR_REFSPEC: &str = "+refs/*:refs/*";

pub struct Mirror {
    root: PathBuf,
    log: Logger,
}

impl Mirror {
    pub fn new(root: PathBuf, log: Logger) -> Result<Mirror> {
        std::fs::create_dir_all(&root)
            .with_context(|_| format!("couldn't create mirror root {}", root.display()))?;
        let log = log.new(o!("component" => "mirror"));
        Ok(Mirror { root, log })
    }

    /// The bare mirror directory for `url`, whether or not it's been cloned yet.
    pub fn mirror_path(&self, url_ref: &UrlRef) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.input(url_ref.url.as_str().as_bytes());
        let digest = hasher.result();
        let name = crate::util::hexify(&digest[..16]);
        self.root.join(format!("{}.git", name))
    }

    /// Make sure a bare mirror of `url_ref` exists locally, cloning it if
    /// this is the first time we've seen this URL. If `fetch` is set and the
    /// mirror already exists, update it from origin.
    pub fn ensure(&self, url_ref: &UrlRef, fetch: bool, shell: &Shell) -> Result<git2::Repository> {
        let path = self.mirror_path(url_ref);

        if !path.join("HEAD").exists() {
            shell.status("Cloning", url_ref.url.as_str());
            debug!(self.log, "cloning"; "url" => url_ref.url.as_str(), "path" => %path.display());
            let tmp = path.with_extension("tmp");
            fsops::remove_dir_all_if_exists(&tmp)?;
            let mut repo = git2::Repository::init_bare(&tmp)
                .with_context(|_| format!("couldn't init mirror at {}", tmp.display()))?;
            git::fetch(&mut repo, &url_ref.url, MIRROR_REFSPEC)
                .with_context(|_| ErrorKind::MirrorFailure {
                    url: url_ref.url.to_string(),
                })?;
            drop(repo);
            fsops::atomic_rename(&tmp, &path)?;
        } else if fetch {
            shell.status("Fetching", url_ref.url.as_str());
            debug!(self.log, "fetching"; "url" => url_ref.url.as_str(), "path" => %path.display());
            let mut repo = git2::Repository::open_bare(&path)
                .with_context(|_| format!("couldn't open mirror at {}", path.display()))?;
            git::fetch(&mut repo, &url_ref.url, MIRROR_REFSPEC)
                .with_context(|_| ErrorKind::MirrorFailure {
                    url: url_ref.url.to_string(),
                })?;
        }

        git2::Repository::open_bare(&path)
            .with_context(|_| format!("couldn't open mirror at {}", path.display()))
            .map_err(Into::into)
    }

    /// Resolve `refspec` against `url_ref`'s mirror to a concrete commit hex
    /// oid. If the revision isn't found and we haven't already fetched in
    /// this call, fetch once and retry — this lets a `freeze:` pin that
    /// predates the last mirror fetch still resolve without forcing every
    /// other component to refetch too.
    pub fn resolve(&self, url_ref: &UrlRef, refspec: &RefSpec, fetch: bool, shell: &Shell) -> Result<String> {
        let repo = self.ensure(url_ref, fetch, shell)?;
        match repo.revparse_single(refspec.revision()) {
            Ok(obj) => Ok(obj.id().to_string()),
            Err(_) if !fetch => {
                debug!(self.log, "revision missing, retrying with a fetch";
                    "url" => url_ref.url.as_str(), "revision" => refspec.revision());
                drop(repo);
                let repo = self.ensure(url_ref, true, shell)?;
                let obj = repo.revparse_single(refspec.revision()).with_context(|_| {
                    format!(
                        "couldn't resolve `{}` in {}",
                        refspec.revision(),
                        url_ref.url
                    )
                })?;
                Ok(obj.id().to_string())
            }
            Err(e) => Err(e).with_context(|_| {
                format!(
                    "couldn't resolve `{}` in {}",
                    refspec.revision(),
                    url_ref.url
                )
            })?,
        }
    }

    /// Materialize `revision` of `url_ref`'s mirror into a working tree at
    /// `dest`, recursively resolving submodules. `dest` is clobbered first.
    pub fn checkout_into(&self, url_ref: &UrlRef, revision: &str, dest: &Path) -> Result<()> {
        let mirror_path = self.mirror_path(url_ref);
        fsops::remove_dir_all_if_exists(dest)?;
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let mirror_url = url::Url::from_file_path(&mirror_path)
            .map_err(|_| ErrorKind::MirrorFailure {
                url: mirror_path.display().to_string(),
            })?;
        let repo = git2::build::RepoBuilder::new()
            .clone(mirror_url.as_str(), dest)
            .with_context(|_| format!("couldn't check out {} into {}", url_ref.url, dest.display()))?;

        let obj = repo
            .find_object(
                git2::Oid::from_str(revision)
                    .with_context(|_| format!("`{}` is not a valid revision", revision))?,
                None,
            )
            .with_context(|_| format!("revision {} not present in {}", revision, url_ref.url))?;
        git::reset(&repo, &obj)?;
        git::update_submodules(&repo).with_context(|_| ErrorKind::SubmoduleFailure {
            url: url_ref.url.to_string(),
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn init_source_repo(path: &Path) -> (git2::Repository, git2::Oid) {
        let repo = git2::Repository::init(path).unwrap();
        std::fs::write(path.join("file.txt"), b"hello").unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("file.txt")).unwrap();
        let tree_id = index.write_tree().unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = git2::Signature::now("test", "test@example.com").unwrap();
        let commit = repo
            .commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
            .unwrap();
        repo.set_head("refs/heads/master").ok();
        (repo, commit)
    }

    fn url_ref_for(path: &Path) -> UrlRef {
        UrlRef::bare(url::Url::from_file_path(path).unwrap())
    }

    #[test]
    fn ensure_clones_then_reuses_mirror() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("src");
        let (_repo, _commit) = init_source_repo(&src);

        let mirror = Mirror::new(tmp.path().join("mirrors"), crate::logging::discard()).unwrap();
        let shell = Shell::new(crate::util::shell::Verbosity::Quiet);
        let url_ref = url_ref_for(&src);

        let path_before = mirror.mirror_path(&url_ref);
        assert!(!path_before.join("HEAD").exists());

        mirror.ensure(&url_ref, false, &shell).unwrap();
        assert!(path_before.join("HEAD").exists());

        // Second call with an existing mirror and fetch=false must not error.
        mirror.ensure(&url_ref, false, &shell).unwrap();
    }

    #[test]
    fn resolve_returns_commit_oid_for_branch() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("src");
        let (_repo, commit) = init_source_repo(&src);

        let mirror = Mirror::new(tmp.path().join("mirrors"), crate::logging::discard()).unwrap();
        let shell = Shell::new(crate::util::shell::Verbosity::Quiet);
        let url_ref = url_ref_for(&src);

        let resolved = mirror
            .resolve(&url_ref, &RefSpec::Branch("master".into()), false, &shell)
            .unwrap();
        assert_eq!(resolved, commit.to_string());
    }

    #[test]
    fn checkout_into_materializes_working_tree() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("src");
        let (_repo, commit) = init_source_repo(&src);

        let mirror = Mirror::new(tmp.path().join("mirrors"), crate::logging::discard()).unwrap();
        let shell = Shell::new(crate::util::shell::Verbosity::Quiet);
        let url_ref = url_ref_for(&src);
        mirror.ensure(&url_ref, false, &shell).unwrap();

        let dest = tmp.path().join("checkout");
        mirror
            .checkout_into(&url_ref, &commit.to_string(), &dest)
            .unwrap();
        assert_eq!(std::fs::read(dest.join("file.txt")).unwrap(), b"hello");
    }
}
