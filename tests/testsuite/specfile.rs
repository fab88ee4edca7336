use std::fs;

use distrover::specfile::SpecRewriter;
use tempfile::tempdir;

const SPEC: &str = "\
Name:           widget
Version:        1.0
Release:        3%{?dist}
Source0:        %{name}-%{version}.tar.gz
Patch0:         fix-build.patch
Patch1:         fix-tests.patch

%prep
%autosetup -n %{name}-%{version}
%patch0 -p1
%patch1 -p1

%changelog
* Mon Jan 01 2024 Someone <someone@example.com> - 1.0-3
- old entry
";

#[test]
fn get_patch_fns_lists_patch_filenames_in_order() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("widget.spec");
    fs::write(&path, SPEC).unwrap();

    let spec = SpecRewriter::open(&path).unwrap();
    assert_eq!(
        spec.get_patch_fns(),
        vec!["fix-build.patch".to_owned(), "fix-tests.patch".to_owned()]
    );
}

#[test]
fn set_setup_dirname_on_a_spec_with_no_setup_directive_errors() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("widget.spec");
    fs::write(&path, "Name: widget\nVersion: 1.0\n").unwrap();

    let mut spec = SpecRewriter::open(&path).unwrap();
    assert!(spec.set_setup_dirname("widget-abc").is_err());
}

#[test]
fn full_snapshot_rewrite_rolls_version_release_and_patches_together() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("widget.spec");
    fs::write(&path, SPEC).unwrap();

    let mut spec = SpecRewriter::open(&path).unwrap();
    spec.set_setup_dirname("widget-deadbeef0000").unwrap();
    spec.set_tag("Version", "2.0").unwrap();
    let (_, dist) = SpecRewriter::release_parts(&spec.require_tag("Release").unwrap());
    spec.set_tag("Release", &format!("1.{}", dist.unwrap())).unwrap();
    spec.wipe_patches();
    spec.delete_changelog();
    spec.save().unwrap();

    let rewritten = fs::read_to_string(&path).unwrap();
    assert!(rewritten.contains("Version: 2.0"));
    assert!(rewritten.contains("Release: 1.%{?dist}"));
    assert!(rewritten.contains("-n widget-deadbeef0000"));
    assert!(!rewritten.contains("Patch0"));
    assert!(!rewritten.contains("%changelog"));
}
