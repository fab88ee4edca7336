//! Pins every component's upstream and packaging repositories to concrete
//! revisions (§4.5).
//!
//! `Resolver` walks the normalized component list, asks `Mirror` to
//! clone/fetch/resolve each repository reference, and emits a
//! `PinnedComponent` per component with `src_revision`/`distgit_revision`
//! filled in. Nothing here writes a source snapshot yet — that's
//! `Snapshotter`'s job, once everything is pinned.

use std::collections::HashSet;

use slog::{debug, o, Logger};

use crate::mirror::Mirror;
use crate::overlay::{Component, PinnedComponent, SourceKind};
use crate::util::error::Result;
use crate::util::shell::Shell;

/// Which components get their mirrors actively fetched from origin during
/// this resolve pass, versus reused as-is from whatever's already mirrored.
/// A `Freeze`'d reference never fetches regardless of policy (§4.5:
/// "freeze... disables fetch-driven updates").
#[derive(Debug, Clone)]
pub enum FetchPolicy {
    None,
    All,
    Named(HashSet<String>),
}

impl FetchPolicy {
    fn wants(&self, name: &str) -> bool {
        match self {
            FetchPolicy::None => false,
            FetchPolicy::All => true,
            FetchPolicy::Named(set) => set.contains(name),
        }
    }
}

/// The result of a resolve pass: components that pinned successfully, and
/// components that didn't (when `fetch_continue` let the pass keep going
/// past a failure instead of aborting on the first one).
pub struct ResolveOutcome {
    pub pinned: Vec<PinnedComponent>,
    pub failed: Vec<(String, String)>,
}

pub struct Resolver<'a> {
    mirror: &'a Mirror,
    policy: FetchPolicy,
    /// If a component's mirror fetch fails, keep resolving the rest instead
    /// of aborting the whole pass. Mirrors `rdgo`'s `--fetch-continue`.
    fetch_continue: bool,
    log: Logger,
}

impl<'a> Resolver<'a> {
    pub fn new(mirror: &'a Mirror, policy: FetchPolicy, fetch_continue: bool, log: Logger) -> Self {
        Resolver {
            mirror,
            policy,
            fetch_continue,
            log: log.new(o!("component" => "resolver")),
        }
    }

    pub fn resolve_all(&self, components: &[Component], shell: &Shell) -> Result<ResolveOutcome> {
        let mut pinned = Vec::with_capacity(components.len());
        let mut failed = Vec::new();

        for component in components {
            match self.resolve_one(component, shell) {
                Ok(p) => pinned.push(p),
                Err(e) if self.fetch_continue => {
                    shell.warn(format!("{}: {}", component.name, e));
                    failed.push((component.name.clone(), e.to_string()));
                }
                Err(e) => return Err(e),
            }
        }

        Ok(ResolveOutcome { pinned, failed })
    }

    fn resolve_one(&self, component: &Component, shell: &Shell) -> Result<PinnedComponent> {
        debug!(self.log, "resolving component"; "component" => &component.name);
        let distgit_fetch = self.policy.wants(&component.name) && !component.distgit.refspec.is_frozen();
        let distgit_revision =
            self.mirror
                .resolve(&component.distgit.url, &component.distgit.refspec, distgit_fetch, shell)?;

        let (src, src_revision, spec_internal) = match &component.source {
            SourceKind::PackagingOnly => (None, None, false),
            SourceKind::Upstream { url, refspec } | SourceKind::UpstreamInternalSpec { url, refspec } => {
                let src_fetch = self.policy.wants(&component.name) && !refspec.is_frozen();
                let revision = self.mirror.resolve(url, refspec, src_fetch, shell)?;
                let internal = matches!(component.source, SourceKind::UpstreamInternalSpec { .. });
                (Some(url.clone()), Some(revision), internal)
            }
        };

        Ok(PinnedComponent {
            name: component.name.clone(),
            pkgname: component.pkgname.clone(),
            src,
            src_revision,
            spec_internal,
            distgit: component.distgit.url.clone(),
            distgit_revision,
            patches: component.distgit.patches,
            self_buildrequires: component.self_buildrequires,
            rpmwith: component.rpmwith.clone(),
            rpmwithout: component.rpmwithout.clone(),
            srpmroot: component.srpmroot.clone(),
            override_version: component.override_version.clone(),
            srcsnap: None,
        })
    }
}
