use distrover::overlay::{OverlayLoader, RefSpec, SourceKind};

const DOC: &str = r#"
aliases:
  - name: internal
    url: "https://git.example.com/"
  - name: dg
    url: "https://dist.example.com/"
distgit:
  prefix: "dg"
  branch: "f32"
root:
  mock: fedora-32-x86_64
components:
  - widget:
      src: "internal:acme/widget"
      tag: "v2.0"
      distgit:
        name: widget-packaging
        branch: "rawhide"
        patches: drop
      rpmwith:
        - bootstrap
      srpmroot: "widget-packaging"
  - gadget:
      src: distgit
      self-buildrequires: true
  - thingy:
      distgit: "internal:packaging/thingy"
"#;

#[test]
fn distgit_level_overrides_win_over_component_level_ref() {
    let loaded = OverlayLoader::load_from_str(DOC).unwrap();
    let widget = &loaded.components[0];

    assert_eq!(widget.distgit.name, "widget-packaging");
    assert_eq!(widget.distgit.refspec, RefSpec::Branch("rawhide".into()));
    assert_eq!(widget.distgit.patches, distrover::overlay::Patches::Drop);
    assert_eq!(widget.rpmwith, vec!["bootstrap".to_owned()]);
    assert_eq!(widget.srpmroot.as_deref(), Some("widget-packaging"));

    match &widget.source {
        SourceKind::Upstream { url, refspec } => {
            assert_eq!(url.url.as_str(), "https://git.example.com/acme/widget");
            assert_eq!(*refspec, RefSpec::Tag("v2.0".into()));
        }
        other => panic!("unexpected source kind: {:?}", other),
    }
}

#[test]
fn src_distgit_literal_mirrors_the_packaging_url_as_upstream() {
    let loaded = OverlayLoader::load_from_str(DOC).unwrap();
    let gadget = &loaded.components[1];
    assert!(gadget.self_buildrequires);

    match &gadget.source {
        SourceKind::Upstream { url, .. } => {
            assert_eq!(url.url.as_str(), gadget.distgit.url.url.as_str());
        }
        other => panic!("unexpected source kind: {:?}", other),
    }
}

#[test]
fn distgit_shorthand_string_expands_through_alias() {
    let loaded = OverlayLoader::load_from_str(DOC).unwrap();
    let thingy = &loaded.components[2];
    assert!(matches!(thingy.source, SourceKind::PackagingOnly));
    assert_eq!(
        thingy.distgit.url.url.as_str(),
        "https://git.example.com/packaging/thingy"
    );
}

#[test]
fn unknown_distgit_key_is_rejected() {
    let doc = DOC.replace("patches: drop", "typo: drop");
    let err = OverlayLoader::load_from_str(&doc).unwrap_err();
    assert!(err.to_string().contains("distgit.typo"));
}
