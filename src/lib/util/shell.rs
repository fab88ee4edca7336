//! Deals with pretty-printing information to the user (i.e. not logs; those are for debugging
//! purposes, not for the user to see.)

use console::style;

/// The requested verbosity of output
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verbosity {
    Verbose,
    Normal,
    Quiet,
}

#[derive(Debug, Clone)]
pub struct Shell {
    verbosity: Verbosity,
}

impl Shell {
    pub fn new(verbosity: Verbosity) -> Self {
        Shell { verbosity }
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Print a tagged status line, e.g. `[mir] cloning https://...`.
    pub fn status(&self, tag: &str, message: impl AsRef<str>) {
        if self.verbosity == Verbosity::Quiet {
            return;
        }
        println!("{:>7} {}", style(format!("[{}]", tag)).cyan(), message.as_ref());
    }

    /// Print a status line that's only shown with `-v`.
    pub fn verbose(&self, tag: &str, message: impl AsRef<str>) {
        if self.verbosity != Verbosity::Verbose {
            return;
        }
        println!("{:>7} {}", style(format!("[{}]", tag)).dim(), message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        if self.verbosity == Verbosity::Quiet {
            return;
        }
        eprintln!("{:>7} {}", style("[warn]").yellow().bold(), message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        eprintln!("{:>7} {}", style("[error]").red().bold(), message.as_ref());
    }
}

impl Default for Shell {
    fn default() -> Self {
        Shell::new(Verbosity::Normal)
    }
}
