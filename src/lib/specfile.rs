//! Line-oriented rewriting of RPM `.spec` files (§4.6).
//!
//! Spec files are read and rewritten as text, line by line, rather than
//! parsed into a full grammar — the packaging ecosystem's own tools
//! (rpmbuild, rpmdev-bumpspec) work the same way, and a full parser would
//! have to tolerate the same amount of shell-embedded, macro-expanding mess
//! anyway. Adapted from the `specfile.py` helper this is based on.

use std::fs;
use std::path::Path;

use failure::ResultExt;
use regex::Regex;

use crate::util::error::{ErrorKind, Result};

lazy_static::lazy_static! {
    static ref TAG_RE: Regex =
        Regex::new(r"(?i)^(Name|Version|Release|Source0?|Source\d+|Patch\d*|URL|License|Summary):\s*(.*)$").unwrap();
    static ref SETUP_RE: Regex = Regex::new(r"^%(setup|autosetup)\b.*-n\s+(\S+)").unwrap();
    static ref PATCH_LINE_RE: Regex = Regex::new(r"^(Patch\d*):\s*\S+\s*$").unwrap();
    static ref PATCH_APPLY_RE: Regex = Regex::new(r"^%patch\d*\b").unwrap();
    static ref CHANGELOG_RE: Regex = Regex::new(r"^%changelog\b").unwrap();
    static ref RELEASE_RE: Regex = Regex::new(r"^(\d+)(.*)$").unwrap();
}

/// In-memory representation of a spec file's lines, rewritten and written
/// back out with `save`.
pub struct SpecRewriter {
    path: std::path::PathBuf,
    lines: Vec<String>,
}

impl SpecRewriter {
    pub fn open(path: &Path) -> Result<SpecRewriter> {
        let text =
            fs::read_to_string(path).with_context(|_| format!("couldn't read {}", path.display()))?;
        Ok(SpecRewriter {
            path: path.to_owned(),
            lines: text.lines().map(|l| l.to_owned()).collect(),
        })
    }

    pub fn save(&self) -> Result<()> {
        let mut text = self.lines.join("\n");
        text.push('\n');
        fs::write(&self.path, text).with_context(|_| format!("couldn't write {}", self.path.display()))?;
        Ok(())
    }

    /// Value of the first `Tag: value` line matching `tag` (case-insensitive).
    pub fn get_tag(&self, tag: &str) -> Option<String> {
        for line in &self.lines {
            if let Some(caps) = TAG_RE.captures(line) {
                if caps[1].eq_ignore_ascii_case(tag) {
                    return Some(caps[2].trim().to_owned());
                }
            }
        }
        None
    }

    pub fn require_tag(&self, tag: &str) -> Result<String> {
        self.get_tag(tag)
            .ok_or_else(|| ErrorKind::MissingTag { tag: tag.to_owned() }.into())
    }

    /// Rewrite the first `Tag: value` line matching `tag` in place. Adds a
    /// new line right after `Name:` if the tag isn't present yet.
    pub fn set_tag(&mut self, tag: &str, value: &str) -> Result<()> {
        for line in &mut self.lines {
            if let Some(caps) = TAG_RE.captures(line) {
                if caps[1].eq_ignore_ascii_case(tag) {
                    *line = format!("{}: {}", &caps[1], value);
                    return Ok(());
                }
            }
        }

        let insert_at = self
            .lines
            .iter()
            .position(|l| {
                TAG_RE
                    .captures(l)
                    .map(|c| c[1].eq_ignore_ascii_case("name"))
                    .unwrap_or(false)
            })
            .map(|i| i + 1)
            .unwrap_or(0);
        self.lines.insert(insert_at, format!("{}: {}", tag, value));
        Ok(())
    }

    /// Rewrite the `-n` argument of the `%setup`/`%autosetup` line.
    pub fn set_setup_dirname(&mut self, dirname: &str) -> Result<()> {
        for line in &mut self.lines {
            if let Some(caps) = SETUP_RE.captures(line) {
                let old_dir = &caps[2];
                *line = line.replacen(old_dir, dirname, 1);
                return Ok(());
            }
        }
        Err(ErrorKind::MissingSetupDirective.into())
    }

    /// Blank out every `PatchN:` tag line and every `%patch` apply directive,
    /// used when a component's overlay config says `patches: drop`.
    pub fn wipe_patches(&mut self) {
        self.lines.retain(|line| {
            !PATCH_LINE_RE.is_match(line) && !PATCH_APPLY_RE.is_match(line)
        });
    }

    /// Truncate everything from `%changelog` onward; the snapshot pipeline
    /// regenerates its own changelog entry instead of carrying distgit's.
    pub fn delete_changelog(&mut self) {
        if let Some(idx) = self.lines.iter().position(|l| CHANGELOG_RE.is_match(l)) {
            self.lines.truncate(idx);
        }
    }

    /// Number of `PatchN:` tag lines still present.
    pub fn get_n_patches(&self) -> usize {
        self.lines.iter().filter(|l| PATCH_LINE_RE.is_match(l)).count()
    }

    /// Filenames named by every `PatchN:` tag line, in file order.
    pub fn get_patch_fns(&self) -> Vec<String> {
        self.lines
            .iter()
            .filter_map(|l| TAG_RE.captures(l))
            .filter(|c| c[1].to_ascii_lowercase().starts_with("patch"))
            .map(|c| c[2].trim().to_owned())
            .collect()
    }

    /// Split a `Release:` value into its numeric part and whatever dist
    /// suffix follows it, e.g. `"3%{?dist}"` -> `("3", Some("%{?dist}"))` or
    /// the older `"3.fc30"` -> `("3", Some("fc30"))`.
    pub fn release_parts(release: &str) -> (String, Option<String>) {
        match RELEASE_RE.captures(release) {
            Some(caps) => {
                let rest = caps.get(2).map(|m| m.as_str()).unwrap_or("");
                let rest = if rest.is_empty() {
                    None
                } else {
                    Some(rest.trim_start_matches('.').to_owned())
                };
                (caps[1].to_owned(), rest)
            }
            None => (release.to_owned(), None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn write_spec(contents: &str) -> NamedTempFile {
        let f = NamedTempFile::new().unwrap();
        fs::write(f.path(), contents).unwrap();
        f
    }

    const SAMPLE: &str = "\
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
    fn get_and_set_tag_roundtrip() {
        let f = write_spec(SAMPLE);
        let mut spec = SpecRewriter::open(f.path()).unwrap();
        assert_eq!(spec.get_tag("version").unwrap(), "1.0");
        spec.set_tag("Version", "2.0").unwrap();
        assert_eq!(spec.get_tag("Version").unwrap(), "2.0");
    }

    #[test]
    fn set_tag_inserts_missing_tag_after_name() {
        let f = write_spec(SAMPLE);
        let mut spec = SpecRewriter::open(f.path()).unwrap();
        assert!(spec.get_tag("URL").is_none());
        spec.set_tag("URL", "https://example.com").unwrap();
        assert_eq!(spec.get_tag("URL").unwrap(), "https://example.com");
    }

    #[test]
    fn set_setup_dirname_rewrites_n_argument() {
        let f = write_spec(SAMPLE);
        let mut spec = SpecRewriter::open(f.path()).unwrap();
        spec.set_setup_dirname("widget-abc123").unwrap();
        assert!(spec.lines.iter().any(|l| l.contains("-n widget-abc123")));
    }

    #[test]
    fn wipe_patches_removes_tags_and_apply_lines() {
        let f = write_spec(SAMPLE);
        let mut spec = SpecRewriter::open(f.path()).unwrap();
        assert_eq!(spec.get_n_patches(), 2);
        spec.wipe_patches();
        assert_eq!(spec.get_n_patches(), 0);
        assert!(!spec.lines.iter().any(|l| l.starts_with("%patch")));
    }

    #[test]
    fn delete_changelog_truncates_trailing_section() {
        let f = write_spec(SAMPLE);
        let mut spec = SpecRewriter::open(f.path()).unwrap();
        spec.delete_changelog();
        assert!(!spec.lines.iter().any(|l| l.starts_with("%changelog")));
    }

    #[test]
    fn release_parts_splits_numeric_and_dist_suffix() {
        assert_eq!(
            SpecRewriter::release_parts("3%{?dist}"),
            ("3".to_owned(), Some("%{?dist}".to_owned()))
        );
        assert_eq!(SpecRewriter::release_parts("7"), ("7".to_owned(), None));
    }
}
