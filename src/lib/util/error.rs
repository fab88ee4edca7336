//! Error types shared across the pipeline.

pub use failure::Fail;

use std::process::{ExitStatus, Output};

pub type Result<T> = std::result::Result<T, failure::Error>;

/// The five error kinds named by the design: configuration, resolution,
/// snapshot, build, and filesystem errors. Each carries enough of the
/// failing context to be useful on its own; callers attach more detail via
/// `failure::ResultExt::context`.
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum ErrorKind {
    #[fail(display = "unknown key `{}` in component `{}`", key, component)]
    UnknownComponentKey { component: String, key: String },
    #[fail(display = "component `{}` has neither `src` nor `distgit`", component)]
    MissingSource { component: String },
    #[fail(display = "unknown `spec` value `{}` in component `{}`", value, component)]
    UnknownSpecValue { component: String, value: String },
    #[fail(display = "unknown `patches` value `{}` in component `{}`", value, component)]
    UnknownPatchesValue { component: String, value: String },
    #[fail(display = "alias `{}` is not defined", name)]
    UnknownAlias { name: String },
    #[fail(display = "unsupported lookaside hash type `{}`", kind)]
    UnsupportedHashType { kind: String },
    #[fail(
        display = "lookaside object `{}` for `{}` not present locally",
        hash, filename
    )]
    MissingLookasideObject { hash: String, filename: String },
    #[fail(display = "could not resolve or fetch repository at {}", url)]
    MirrorFailure { url: String },
    #[fail(display = "failed to enumerate submodules of {}", url)]
    SubmoduleFailure { url: String },
    #[fail(display = "no spec file found in {}", dir)]
    NoSpecFile { dir: String },
    #[fail(display = "multiple spec files found in {}", dir)]
    AmbiguousSpecFile { dir: String },
    #[fail(display = "no %setup or %autosetup directive found")]
    MissingSetupDirective,
    #[fail(display = "tag `{}` not found", tag)]
    MissingTag { tag: String },
    #[fail(
        display = "a build pass made no progress; {} component(s) still failing",
        count
    )]
    NoProgress { count: usize },
}

/// Errors from spawning and waiting on a child process.
#[derive(Debug, Fail)]
#[fail(display = "{}", desc)]
pub struct ProcessError {
    pub desc: String,
    pub exit: Option<ExitStatus>,
    pub output: Option<Output>,
}
