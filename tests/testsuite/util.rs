use std::path::Path;

use distrover::logging;
use slog::Logger;

lazy_static::lazy_static! {
    pub static ref LOGGER: Logger = logging::discard();
}

/// Initialize a throwaway git repo at `path` with one commit carrying
/// `files`, on branch `master`. Mirrors the fixture repos a real overlay
/// would point at, without touching the network.
pub fn init_repo(path: &Path, files: &[(&str, &str)]) -> (git2::Repository, git2::Oid) {
    std::fs::create_dir_all(path).unwrap();
    let repo = git2::Repository::init(path).unwrap();
    for (name, contents) in files {
        let file_path = path.join(name);
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&file_path, contents).unwrap();
    }

    let mut index = repo.index().unwrap();
    for (name, _) in files {
        index.add_path(Path::new(name)).unwrap();
    }
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let sig = git2::Signature::now("test", "test@example.com").unwrap();
    let commit = repo
        .commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
        .unwrap();
    repo.set_head("refs/heads/master").ok();
    (repo, commit)
}

pub fn file_url(path: &Path) -> String {
    url::Url::from_file_path(path).unwrap().to_string()
}
