use std::fs;

use distrover::overlay::OverlayLoader;
use distrover::resolver::{FetchPolicy, Resolver};
use distrover::snapshot::{LookasideStore, Snapshotter};
use distrover::util::shell::{Shell, Verbosity};
use distrover::{mirror::Mirror, pipeline};
use tempfile::tempdir;

use crate::util::{file_url, init_repo, LOGGER};

const SPEC: &str = "\
Name:           widget
Version:        1.0
Release:        1%{?dist}
Source0:        %{name}-%{version}.tar.gz
Patch0:         fix-build.patch

%prep
%autosetup -n %{name}-%{version}

%changelog
* Mon Jan 01 2024 Someone <someone@example.com> - 1.0-1
- initial packaging
";

#[test]
fn resolve_then_snapshot_pins_and_rewrites_a_two_repo_component() {
    let tmp = tempdir().unwrap();
    let shell = Shell::new(Verbosity::Quiet);

    let src_path = tmp.path().join("src-repo");
    let (_src_repo, src_commit) = init_repo(&src_path, &[("widget.c", "int main() {}\n")]);

    let distgit_path = tmp.path().join("distgit-repo");
    let (_distgit_repo, distgit_commit) = init_repo(&distgit_path, &[("widget.spec", SPEC)]);

    let overlay_doc = format!(
        r#"
distgit:
  prefix: "dg"
root:
  mock: fedora-32-x86_64
components:
  - widget:
      src: "{src_url}"
      branch: master
      distgit:
        src: "{distgit_url}"
        branch: master
"#,
        src_url = file_url(&src_path),
        distgit_url = file_url(&distgit_path),
    );
    let overlay_path = tmp.path().join("overlay.yaml");
    fs::write(&overlay_path, overlay_doc).unwrap();

    let workdir = tmp.path().join("work");
    let failed = pipeline::resolve(
        &overlay_path,
        &workdir,
        None,
        false,
        false,
        &shell,
        &LOGGER,
    )
    .unwrap();
    assert!(failed.is_empty());

    let pinned = pipeline::read_pinned(&workdir).unwrap();
    assert_eq!(pinned.components.len(), 1);
    let widget = &pinned.components[0];
    assert_eq!(widget.src_revision.as_deref(), Some(src_commit.to_string().as_str()));
    assert_eq!(widget.distgit_revision, distgit_commit.to_string());

    pipeline::snapshot(&workdir, &shell, &LOGGER).unwrap();

    let pinned = pipeline::read_pinned(&workdir).unwrap();
    let widget = &pinned.components[0];
    let snapshot_dir = std::path::PathBuf::from(widget.srcsnap.as_ref().unwrap());
    assert!(snapshot_dir.is_dir());

    let spec_path = snapshot_dir.join("widget.spec");
    let spec_text = fs::read_to_string(&spec_path).unwrap();
    assert!(spec_text.contains(&format!("-n widget-{}", &src_commit.to_string()[..12])));
    assert!(!spec_text.contains("%changelog"));

    let tarball_name = format!("widget-{}.tar.gz", &src_commit.to_string()[..12]);
    assert!(pipeline::workdir_snapshots(&workdir).join(&tarball_name).is_file());
}

#[test]
fn resolver_skips_fetch_for_frozen_refs_regardless_of_policy() {
    let tmp = tempdir().unwrap();
    let shell = Shell::new(Verbosity::Quiet);

    let distgit_path = tmp.path().join("distgit-repo");
    let (_repo, commit) = init_repo(&distgit_path, &[("widget.spec", SPEC)]);

    let overlay_doc = format!(
        r#"
distgit:
  prefix: "dg"
root:
  mock: fedora-32-x86_64
components:
  - widget:
      distgit:
        src: "{url}"
        freeze: "{commit}"
"#,
        url = file_url(&distgit_path),
        commit = commit,
    );

    let loaded = OverlayLoader::load_from_str(&overlay_doc).unwrap();
    let mirror = Mirror::new(tmp.path().join("mirrors"), LOGGER.clone()).unwrap();
    let resolver = Resolver::new(&mirror, FetchPolicy::All, false, LOGGER.clone());
    let outcome = resolver.resolve_all(&loaded.components, &shell).unwrap();

    assert_eq!(outcome.pinned[0].distgit_revision, commit.to_string());
}

#[test]
fn snapshotter_rejects_missing_lookaside_objects() {
    let tmp = tempdir().unwrap();
    let shell = Shell::new(Verbosity::Quiet);

    let distgit_path = tmp.path().join("distgit-repo");
    let spec_with_source = SPEC.replace("Source0:", "Source1:        extra.tar.gz\nSource0:");
    let (_repo, _commit) = init_repo(
        &distgit_path,
        &[
            ("widget.spec", &spec_with_source),
            ("sources", "deadbeef  extra.tar.gz\n"),
        ],
    );

    let mirror = Mirror::new(tmp.path().join("mirrors"), LOGGER.clone()).unwrap();
    mirror.ensure(
        &distrover::overlay::UrlRef::bare(url::Url::parse(&file_url(&distgit_path)).unwrap()),
        false,
        &shell,
    )
    .unwrap();

    let lookaside = LookasideStore::new(tmp.path().join("lookaside"));
    let snapshotter = Snapshotter::new(&mirror, lookaside, LOGGER.clone());

    let url_ref = distrover::overlay::UrlRef::bare(url::Url::parse(&file_url(&distgit_path)).unwrap());
    let revision = mirror
        .resolve(&url_ref, &distrover::overlay::RefSpec::Branch("master".into()), false, &shell)
        .unwrap();

    let pinned = distrover::overlay::PinnedComponent {
        name: "widget".into(),
        pkgname: "widget".into(),
        src: None,
        src_revision: None,
        spec_internal: false,
        distgit: url_ref,
        distgit_revision: revision,
        patches: distrover::overlay::Patches::Keep,
        self_buildrequires: false,
        rpmwith: Vec::new(),
        rpmwithout: Vec::new(),
        srpmroot: None,
        override_version: None,
        srcsnap: None,
    };

    let out_dir = tmp.path().join("out");
    let scratch = tmp.path().join("scratch");
    fs::create_dir_all(&out_dir).unwrap();
    fs::create_dir_all(&scratch).unwrap();

    let err = snapshotter.snapshot(&pinned, &out_dir, &scratch).unwrap_err();
    assert!(err.to_string().contains("extra.tar.gz"));
}
