//! Normalized component records, produced by `OverlayLoader` out of the raw
//! per-component YAML mapping.

use serde::{Deserialize, Serialize};

use super::UrlRef;

/// Whether the packaging repo's patches should be kept as-is or dropped
/// during snapshotting (§3, `patches: keep|drop`, default `keep`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Patches {
    Keep,
    Drop,
}

impl Default for Patches {
    fn default() -> Self {
        Patches::Keep
    }
}

/// Where a component's spec file lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecLocation {
    /// The spec file lives in the packaging (distgit) repo — the common case.
    Packaging,
    /// `spec: internal` — the spec file lives inside the upstream tree and is
    /// copied out rather than rewritten in place in distgit.
    Internal,
}

/// The git reference to resolve a component (or its distgit) against.
/// Exactly one of `freeze`, `tag`, `branch` was set (or defaulted), per the
/// "first of freeze, branch, tag that is set" precedence in §4.5.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefSpec {
    /// Pinned to an exact revision; not subject to fetch-driven drift.
    Freeze(String),
    Tag(String),
    Branch(String),
}

impl RefSpec {
    /// First of `freeze`, `tag`, `branch` that's set, else `Branch(default_branch)`.
    pub fn resolve(
        freeze: Option<&str>,
        tag: Option<&str>,
        branch: Option<&str>,
        default_branch: &str,
    ) -> RefSpec {
        if let Some(f) = freeze {
            RefSpec::Freeze(f.to_owned())
        } else if let Some(t) = tag {
            RefSpec::Tag(t.to_owned())
        } else if let Some(b) = branch {
            RefSpec::Branch(b.to_owned())
        } else {
            RefSpec::Branch(default_branch.to_owned())
        }
    }

    pub fn is_frozen(&self) -> bool {
        matches!(self, RefSpec::Freeze(_))
    }

    /// The refname or revision string to hand to `Mirror::resolve`.
    pub fn revision(&self) -> &str {
        match self {
            RefSpec::Freeze(r) => r,
            RefSpec::Tag(t) => t,
            RefSpec::Branch(b) => b,
        }
    }
}

/// Where a component's source code comes from, decided once at load time
/// instead of re-inspected ad hoc at every use site.
#[derive(Debug, Clone)]
pub enum SourceKind {
    /// No `src` at all — the packaging repo is the only source of truth.
    PackagingOnly,
    /// A normal upstream source repo, separate from the packaging repo.
    Upstream { url: UrlRef, refspec: RefSpec },
    /// `spec: internal` — the upstream tree carries the spec file itself.
    UpstreamInternalSpec { url: UrlRef, refspec: RefSpec },
}

impl SourceKind {
    pub fn url(&self) -> Option<&UrlRef> {
        match self {
            SourceKind::PackagingOnly => None,
            SourceKind::Upstream { url, .. } | SourceKind::UpstreamInternalSpec { url, .. } => {
                Some(url)
            }
        }
    }

    pub fn refspec(&self) -> Option<&RefSpec> {
        match self {
            SourceKind::PackagingOnly => None,
            SourceKind::Upstream { refspec, .. }
            | SourceKind::UpstreamInternalSpec { refspec, .. } => Some(refspec),
        }
    }

    pub fn spec_location(&self) -> SpecLocation {
        match self {
            SourceKind::UpstreamInternalSpec { .. } => SpecLocation::Internal,
            _ => SpecLocation::Packaging,
        }
    }
}

/// A packaging (distgit) repository reference, always present: even a
/// `PackagingOnly` component has one, and a plain-upstream component's
/// distgit name/URL are derived defaults when not given explicitly.
#[derive(Debug, Clone)]
pub struct DistgitInfo {
    pub name: String,
    pub url: UrlRef,
    pub refspec: RefSpec,
    pub patches: Patches,
}

/// A fully-normalized, not-yet-pinned component.
#[derive(Debug, Clone)]
pub struct Component {
    pub name: String,
    pub pkgname: String,
    pub source: SourceKind,
    pub distgit: DistgitInfo,
    pub self_buildrequires: bool,
    pub rpmwith: Vec<String>,
    pub rpmwithout: Vec<String>,
    pub srpmroot: Option<String>,
    pub override_version: Option<String>,
}

/// A component after `Resolver` has pinned every repository reference to a
/// concrete revision. This is what gets serialized into the pinned overlay
/// manifest (§4.5, §6) and fingerprinted by `BuildCache::hashv0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinnedComponent {
    pub name: String,
    pub pkgname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<UrlRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src_revision: Option<String>,
    pub spec_internal: bool,
    pub distgit: UrlRef,
    pub distgit_revision: String,
    pub patches: Patches,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub self_buildrequires: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rpmwith: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rpmwithout: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub srpmroot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_version: Option<String>,
    /// Set once `Snapshotter` has produced a source snapshot for this
    /// component; `None` for a `PackagingOnly` component with nothing to
    /// snapshot beyond the spec rewrite itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub srcsnap: Option<String>,
}
