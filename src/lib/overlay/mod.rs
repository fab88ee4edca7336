//! The overlay document: the declarative input data model (§3 of the design).
//!
//! `OverlayDoc` is the raw, mostly-`serde_yaml::Value`-shaped document as it
//! comes off disk. `loader` turns it into a `Vec<component::Component>` —
//! tagged records instead of dynamically-keyed maps, per the "dynamic dict
//! shape → tagged records" design note: where the Python original
//! discriminates behavior on `if component.get('src') == 'distgit'` or
//! `if 'spec' in component`, we discriminate on an explicit
//! `component::SourceKind` variant decided once, in the loader.

pub mod component;
pub mod loader;

pub use component::{Component, DistgitInfo, Patches, PinnedComponent, RefSpec, SourceKind};
pub use loader::OverlayLoader;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

/// A URL plus an optional custom CA certificate path, as described in §3
/// ("URLs canonicalized into `{url, cacertpath?}` records"). Per §6, once
/// this is written into a manifest it's serialized as a bare URL string —
/// `cacertpath` only matters while we're still actively cloning/fetching.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UrlRef {
    pub url: Url,
    #[serde(default)]
    pub cacertpath: Option<PathBuf>,
}

impl Serialize for UrlRef {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.url.as_str())
    }
}

impl UrlRef {
    pub fn bare(url: Url) -> Self {
        UrlRef {
            url,
            cacertpath: None,
        }
    }
}

/// Raw form of the `aliases` list: `{name, url, cacertpath?}`.
#[derive(Debug, Clone, Deserialize)]
pub struct AliasDoc {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub cacertpath: Option<PathBuf>,
}

/// Raw form of the top-level `distgit` defaults: `{prefix, branch?}`.
#[derive(Debug, Clone, Deserialize)]
pub struct DistgitDefaultsDoc {
    pub prefix: String,
    #[serde(default)]
    pub branch: Option<String>,
}

/// Raw form of `root`: `{mock}`.
#[derive(Debug, Clone, Deserialize)]
pub struct RootDoc {
    pub mock: String,
}

/// The overlay document as parsed straight out of YAML, before alias
/// expansion or component normalization.
#[derive(Debug, Clone, Deserialize)]
pub struct OverlayDoc {
    #[serde(default)]
    pub aliases: Vec<AliasDoc>,
    pub distgit: DistgitDefaultsDoc,
    pub root: RootDoc,
    /// Each entry is a single-key mapping `{component-name: {..fields..}}`,
    /// which is how the YAML format keeps the component list both ordered
    /// and named.
    pub components: Vec<serde_yaml::Mapping>,
}

/// The pinned overlay document: the output of `Resolver`, and the input to
/// `Snapshotter`. `aliases` has been dropped (§4.5: "the resolver deletes
/// `aliases` from the emitted document"); every component now carries
/// resolved revisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinnedOverlay {
    #[serde(rename = "__generated", skip_serializing_if = "Option::is_none")]
    pub generated_warning: Option<String>,
    pub root: RootDoc,
    pub components: Vec<component::PinnedComponent>,
}

impl Serialize for RootDoc {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("RootDoc", 1)?;
        s.serialize_field("mock", &self.mock)?;
        s.end()
    }
}
