//! Loads and validates an overlay document: parses the YABML, expands
//! alias-prefixed URLs, fills defaults, and rejects anything the format
//! doesn't recognize. This is where every ambiguity in the raw document
//! gets resolved into the explicit `Component` shape exactly once.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use failure::ResultExt;
use url::Url;

use crate::util::error::{ErrorKind, Result};

use super::component::{Component, DistgitInfo, Patches, RefSpec, SourceKind};
use super::{AliasDoc, OverlayDoc, UrlRef};

/// Keys a component mapping may carry. Anything else is a fatal
/// configuration error (§3: "unknown keys are a fatal configuration error").
const COMPONENT_KEYS: &[&str] = &[
    "src",
    "spec",
    "distgit",
    "tag",
    "branch",
    "freeze",
    "self-buildrequires",
    "rpmwith",
    "rpmwithout",
    "srpmroot",
    "override-version",
];

const DISTGIT_KEYS: &[&str] = &["name", "src", "patches", "tag", "branch", "freeze"];

pub struct OverlayLoader {
    aliases: HashMap<String, AliasDoc>,
}

/// What `OverlayLoader::load` produces: the normalized component list plus
/// the bits of the document that survive past loading unchanged.
pub struct LoadedOverlay {
    pub root_mock: String,
    pub components: Vec<Component>,
}

impl OverlayLoader {
    pub fn load_from_path(path: &Path) -> Result<LoadedOverlay> {
        let text =
            fs::read_to_string(path).with_context(|_| format!("couldn't read {}", path.display()))?;
        Self::load_from_str(&text)
    }

    pub fn load_from_str(text: &str) -> Result<LoadedOverlay> {
        let doc: OverlayDoc =
            serde_yaml::from_str(text).with_context(|_| "couldn't parse overlay document")?;
        Self::load(doc)
    }

    pub fn load(doc: OverlayDoc) -> Result<LoadedOverlay> {
        let loader = OverlayLoader {
            aliases: doc
                .aliases
                .into_iter()
                .map(|a| (a.name.clone(), a))
                .collect(),
        };

        let mut components = Vec::with_capacity(doc.components.len());
        for raw in &doc.components {
            components.push(loader.normalize_component(raw, &doc.distgit.prefix, doc.distgit.branch.as_deref())?);
        }

        Ok(LoadedOverlay {
            root_mock: doc.root.mock,
            components,
        })
    }

    /// Resolve an `alias:path` (or bare URL) string into a `UrlRef`.
    fn resolve_url(&self, raw: &str) -> Result<UrlRef> {
        if let Some(idx) = raw.find(':') {
            let (prefix, rest) = raw.split_at(idx);
            let rest = &rest[1..];
            if let Some(alias) = self.aliases.get(prefix) {
                let base = Url::parse(&alias.url)
                    .with_context(|_| format!("alias `{}` has an invalid url", alias.name))?;
                let joined = join_alias(&base, rest)
                    .with_context(|_| format!("couldn't join alias `{}` with `{}`", alias.name, rest))?;
                return Ok(UrlRef {
                    url: joined,
                    cacertpath: alias.cacertpath.clone(),
                });
            }
        }

        // Not an alias prefix (or no alias matched): treat the whole string
        // as a literal URL, unless its shape (`word:rest`, no `//`) looks
        // like a typo'd alias reference rather than a real URL scheme —
        // `https://...`/`file://...` all carry the `//` a scheme:authority
        // URL requires, while `gh:acme/widget`-style alias refs never do.
        if !raw.contains("://") {
            if let Some(idx) = raw.find(':') {
                let prefix = &raw[..idx];
                if !self.aliases.contains_key(prefix) && is_bare_alias_like(prefix) {
                    return Err(ErrorKind::UnknownAlias {
                        name: prefix.to_owned(),
                    }
                    .into());
                }
            }
        }

        let url = Url::parse(raw).with_context(|_| format!("`{}` is not a valid url", raw))?;
        Ok(UrlRef {
            url,
            cacertpath: None,
        })
    }

    fn normalize_component(
        &self,
        raw: &serde_yaml::Mapping,
        distgit_prefix: &str,
        default_branch: Option<&str>,
    ) -> Result<Component> {
        if raw.len() != 1 {
            return Err(ErrorKind::UnknownComponentKey {
                component: "<unnamed>".into(),
                key: "<component entry must have exactly one key>".into(),
            }
            .into());
        }
        let (name_val, body_val) = raw.iter().next().unwrap();
        let name = name_val
            .as_str()
            .ok_or_else(|| ErrorKind::UnknownComponentKey {
                component: "<unnamed>".into(),
                key: "<component name must be a string>".into(),
            })?
            .to_owned();

        let body = body_val.as_mapping().ok_or_else(|| ErrorKind::UnknownComponentKey {
            component: name.clone(),
            key: "<component body must be a mapping>".into(),
        })?;

        for key in body.keys() {
            let key = key.as_str().unwrap_or("<non-string key>");
            if !COMPONENT_KEYS.contains(&key) {
                return Err(ErrorKind::UnknownComponentKey {
                    component: name.clone(),
                    key: key.to_owned(),
                }
                .into());
            }
        }

        let get_str = |key: &str| -> Option<String> {
            body.get(&serde_yaml::Value::String(key.to_owned()))
                .and_then(|v| v.as_str())
                .map(|s| s.to_owned())
        };
        let get_str_list = |key: &str| -> Result<Vec<String>> {
            match body.get(&serde_yaml::Value::String(key.to_owned())) {
                None => Ok(Vec::new()),
                Some(v) => {
                    let list: Vec<String> = serde_yaml::from_value(v.clone())
                        .with_context(|_| format!("component `{}`: `{}` must be a list of strings", name, key))?;
                    Ok(list)
                }
            }
        };
        let get_bool = |key: &str| -> bool {
            body.get(&serde_yaml::Value::String(key.to_owned()))
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
        };

        let src_raw = get_str("src");
        let spec_raw = get_str("spec");
        if let Some(ref s) = spec_raw {
            if s != "internal" {
                return Err(ErrorKind::UnknownSpecValue {
                    component: name.clone(),
                    value: s.clone(),
                }
                .into());
            }
        }

        let tag = get_str("tag");
        let branch = get_str("branch");
        let freeze = get_str("freeze");
        let component_refspec = RefSpec::resolve(
            freeze.as_deref(),
            tag.as_deref(),
            branch.as_deref(),
            "master",
        );

        let distgit_val = body.get(&serde_yaml::Value::String("distgit".to_owned()));
        let (distgit_name, distgit_src_raw, distgit_patches, distgit_refspec_override) =
            self.parse_distgit_field(&name, distgit_val)?;

        if src_raw.is_none() && distgit_val.is_none() {
            return Err(ErrorKind::MissingSource {
                component: name.clone(),
            }
            .into());
        }

        let distgit_name = distgit_name.unwrap_or_else(|| name.clone());
        let distgit_raw_url = distgit_src_raw.unwrap_or_else(|| format!("{}:{}", distgit_prefix, distgit_name));
        let distgit_url = self.resolve_url(&distgit_raw_url)?;
        let distgit_refspec = distgit_refspec_override.unwrap_or_else(|| {
            RefSpec::resolve(
                freeze.as_deref(),
                tag.as_deref(),
                branch.as_deref(),
                default_branch.unwrap_or("master"),
            )
        });

        let distgit = DistgitInfo {
            name: distgit_name.clone(),
            url: distgit_url.clone(),
            refspec: distgit_refspec,
            patches: distgit_patches,
        };

        let source = match src_raw {
            None => SourceKind::PackagingOnly,
            Some(ref s) if s == "distgit" => {
                let kind_ctor = if spec_raw.is_some() {
                    SourceKind::UpstreamInternalSpec
                } else {
                    SourceKind::Upstream
                };
                kind_ctor(distgit_url.clone(), component_refspec.clone())
            }
            Some(ref s) => {
                let url = self.resolve_url(s)?;
                if spec_raw.is_some() {
                    SourceKind::UpstreamInternalSpec {
                        url,
                        refspec: component_refspec.clone(),
                    }
                } else {
                    SourceKind::Upstream {
                        url,
                        refspec: component_refspec.clone(),
                    }
                }
            }
        };

        let pkgname = distgit_name.clone();

        Ok(Component {
            name,
            pkgname,
            source,
            distgit,
            self_buildrequires: get_bool("self-buildrequires"),
            rpmwith: get_str_list("rpmwith")?,
            rpmwithout: get_str_list("rpmwithout")?,
            srpmroot: get_str("srpmroot"),
            override_version: get_str("override-version"),
        })
    }

    #[allow(clippy::type_complexity)]
    fn parse_distgit_field(
        &self,
        component_name: &str,
        val: Option<&serde_yaml::Value>,
    ) -> Result<(Option<String>, Option<String>, Patches, Option<RefSpec>)> {
        let val = match val {
            None => return Ok((None, None, Patches::default(), None)),
            Some(v) => v,
        };

        if let Some(s) = val.as_str() {
            return Ok((Some(s.to_owned()), None, Patches::default(), None));
        }

        let map = val.as_mapping().ok_or_else(|| ErrorKind::UnknownComponentKey {
            component: component_name.to_owned(),
            key: "<distgit must be a string or mapping>".into(),
        })?;

        for key in map.keys() {
            let key = key.as_str().unwrap_or("<non-string key>");
            if !DISTGIT_KEYS.contains(&key) {
                return Err(ErrorKind::UnknownComponentKey {
                    component: component_name.to_owned(),
                    key: format!("distgit.{}", key),
                }
                .into());
            }
        }

        let get = |key: &str| -> Option<String> {
            map.get(&serde_yaml::Value::String(key.to_owned()))
                .and_then(|v| v.as_str())
                .map(|s| s.to_owned())
        };

        let patches = match get("patches").as_deref() {
            None => Patches::default(),
            Some("keep") => Patches::Keep,
            Some("drop") => Patches::Drop,
            Some(other) => {
                return Err(ErrorKind::UnknownPatchesValue {
                    component: component_name.to_owned(),
                    value: other.to_owned(),
                }
                .into())
            }
        };

        let freeze = get("freeze");
        let tag = get("tag");
        let branch = get("branch");
        let refspec_override = if freeze.is_some() || tag.is_some() || branch.is_some() {
            Some(RefSpec::resolve(
                freeze.as_deref(),
                tag.as_deref(),
                branch.as_deref(),
                "master",
            ))
        } else {
            None
        };

        Ok((get("name"), get("src"), patches, refspec_override))
    }
}

fn is_bare_alias_like(prefix: &str) -> bool {
    !prefix.is_empty()
        && prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn join_alias(base: &Url, rest: &str) -> std::result::Result<Url, url::ParseError> {
    let mut joined = base.clone();
    let mut path = joined.path().trim_end_matches('/').to_owned();
    path.push('/');
    path.push_str(rest.trim_start_matches('/'));
    joined.set_path(&path);
    Ok(joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
aliases:
  - name: gh
    url: "https://github.com/"
distgit:
  prefix: "dg"
  branch: "f30"
root:
  mock: fedora-30-x86_64
components:
  - widget:
      src: "gh:acme/widget"
      tag: "v1.0"
  - gadget:
      distgit:
        branch: "main"
"#;

    #[test]
    fn loads_components_with_alias_expansion() {
        let loaded = OverlayLoader::load_from_str(DOC).unwrap();
        assert_eq!(loaded.root_mock, "fedora-30-x86_64");
        assert_eq!(loaded.components.len(), 2);

        let widget = &loaded.components[0];
        assert_eq!(widget.name, "widget");
        match &widget.source {
            SourceKind::Upstream { url, refspec } => {
                assert_eq!(url.url.as_str(), "https://github.com/acme/widget");
                assert_eq!(*refspec, RefSpec::Tag("v1.0".into()));
            }
            other => panic!("unexpected source kind: {:?}", other),
        }
        assert_eq!(widget.distgit.refspec, RefSpec::Branch("f30".into()));
    }

    #[test]
    fn packaging_only_component_defaults_distgit_name_to_component_name() {
        let loaded = OverlayLoader::load_from_str(DOC).unwrap();
        let gadget = &loaded.components[1];
        assert!(matches!(gadget.source, SourceKind::PackagingOnly));
        assert_eq!(gadget.distgit.name, "gadget");
        assert_eq!(gadget.distgit.refspec, RefSpec::Branch("main".into()));
    }

    #[test]
    fn unknown_component_key_is_rejected() {
        let doc = DOC.replace("tag: \"v1.0\"", "typo-key: \"v1.0\"");
        let err = OverlayLoader::load_from_str(&doc).unwrap_err();
        assert!(err.to_string().contains("unknown key"));
    }

    #[test]
    fn missing_source_is_rejected() {
        let doc = r#"
distgit:
  prefix: "dg"
root:
  mock: fedora-30-x86_64
components:
  - nothing:
      tag: "v1.0"
"#;
        let err = OverlayLoader::load_from_str(doc).unwrap_err();
        assert!(err.to_string().contains("neither"));
    }
}
