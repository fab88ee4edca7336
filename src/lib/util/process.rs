//! Invoking and streaming output from child processes.
//!
//! This is the one place in the crate that spawns external tools: `git`
//! (via `git2` we mostly avoid shelling out, but submodule enumeration in
//! `mirror` still does), the sandboxed builder, the repository indexer, and
//! the lookaside downloader. Output is streamed straight to our own
//! stdout/stderr (per the design, no output capture/buffering unless the
//! caller explicitly asks for it with `exec_with_output`), and a non-zero
//! exit is turned into a `ProcessError` carrying the captured description.

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::Path;
use std::process::{Command, ExitStatus, Output};
use std::str;

use failure::ResultExt;
use shell_escape::escape;

use crate::util::error::{ProcessError, Result};

/// A builder for an external process, similar to `std::process::Command` but
/// cheaply cloneable and with a `Display` impl useful for logging.
#[derive(Clone, Debug)]
pub struct ProcessRunner {
    program: OsString,
    args: Vec<OsString>,
    env: HashMap<String, Option<OsString>>,
    cwd: Option<OsString>,
}

impl fmt::Display for ProcessRunner {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "`{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", escape(arg.to_string_lossy()))?;
        }
        write!(f, "`")
    }
}

impl ProcessRunner {
    pub fn new<T: AsRef<OsStr>>(cmd: T) -> Self {
        ProcessRunner {
            program: cmd.as_ref().to_os_string(),
            args: Vec::new(),
            cwd: None,
            env: HashMap::new(),
        }
    }

    pub fn arg<T: AsRef<OsStr>>(&mut self, arg: T) -> &mut Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<T: AsRef<OsStr>>(&mut self, args: &[T]) -> &mut Self {
        self.args.extend(args.iter().map(|t| t.as_ref().to_os_string()));
        self
    }

    pub fn cwd<T: AsRef<OsStr>>(&mut self, path: T) -> &mut Self {
        self.cwd = Some(path.as_ref().to_os_string());
        self
    }

    pub fn env<T: AsRef<OsStr>>(&mut self, key: &str, val: T) -> &mut Self {
        self.env.insert(key.to_string(), Some(val.as_ref().to_os_string()));
        self
    }

    pub fn env_remove(&mut self, key: &str) -> &mut Self {
        self.env.insert(key.to_string(), None);
        self
    }

    /// Run the process to completion, streaming stdio to ours, erroring on non-zero exit.
    pub fn exec(&self) -> Result<()> {
        let mut command = self.build_command();
        let exit = command
            .status()
            .with_context(|_| process_error(&format!("could not execute process {}", self), None, None))?;

        if exit.success() {
            Ok(())
        } else {
            Err(process_error(&format!("process didn't exit successfully: {}", self), Some(&exit), None).into())
        }
    }

    /// Run the process, capturing stdout/stderr instead of streaming them.
    pub fn exec_with_output(&self) -> Result<Output> {
        let mut command = self.build_command();
        let output = command
            .output()
            .with_context(|_| process_error(&format!("could not execute process {}", self), None, None))?;

        if output.status.success() {
            Ok(output)
        } else {
            Err(process_error(
                &format!("process didn't exit successfully: {}", self),
                Some(&output.status),
                Some(&output),
            )
            .into())
        }
    }

    pub fn build_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        if let Some(cwd) = self.cwd.as_ref().map(Path::new) {
            command.current_dir(cwd);
        }
        for arg in &self.args {
            command.arg(arg);
        }
        for (k, v) in &self.env {
            match v {
                Some(v) => {
                    command.env(k, v);
                }
                None => {
                    command.env_remove(k);
                }
            }
        }
        command
    }
}

fn process_error(msg: &str, status: Option<&ExitStatus>, output: Option<&Output>) -> ProcessError {
    let exit = match status {
        Some(s) => status_to_string(s),
        None => "never executed".to_string(),
    };
    let mut desc = format!("{} ({})", msg, exit);

    if let Some(out) = output {
        if let Ok(s) = str::from_utf8(&out.stdout) {
            if !s.trim().is_empty() {
                desc.push_str("\n--- stdout\n");
                desc.push_str(s);
            }
        }
        if let Ok(s) = str::from_utf8(&out.stderr) {
            if !s.trim().is_empty() {
                desc.push_str("\n--- stderr\n");
                desc.push_str(s);
            }
        }
    }

    ProcessError {
        desc,
        exit: status.cloned(),
        output: output.cloned(),
    }
}

#[cfg(unix)]
fn status_to_string(status: &ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;

    if let Some(signal) = status.signal() {
        format!("signal: {}", signal)
    } else {
        status.to_string()
    }
}

#[cfg(windows)]
fn status_to_string(status: &ExitStatus) -> String {
    status.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_escapes_args() {
        let mut p = ProcessRunner::new("echo");
        p.arg("hello world");
        assert_eq!(p.to_string(), "`echo 'hello world'`");
    }

    #[test]
    fn exec_success() {
        let mut p = ProcessRunner::new("true");
        if which_exists("true") {
            assert!(p.exec().is_ok());
        }
    }

    #[test]
    fn exec_failure_reports_process_error() {
        if which_exists("false") {
            let mut p = ProcessRunner::new("false");
            assert!(p.exec().is_err());
        }
    }

    fn which_exists(cmd: &str) -> bool {
        std::process::Command::new("sh")
            .arg("-c")
            .arg(format!("command -v {}", cmd))
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}
