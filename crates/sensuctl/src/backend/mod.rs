//! Backend abstraction for sensuctl invocations.
//!
//! The [`Backend`] trait is the single seam between this crate and the
//! outside world, allowing for different implementations:
//! - Real process execution via the `sensuctl` binary
//! - An in-memory emulation for tests

pub mod cli;
pub mod memory;

use crate::error::Result;
use std::fmt;
use std::sync::Arc;

/// One call to the external tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Argument vector, excluding the executable itself
    pub args: Vec<String>,
    /// Document piped to stdin, if any
    pub stdin: Option<String>,
}

impl Invocation {
    /// Create an invocation from an argument list.
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            stdin: None,
        }
    }

    /// Attach a document to pipe into stdin.
    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    /// Short label used in error messages, e.g. `handler list`.
    pub fn label(&self) -> String {
        self.args
            .iter()
            .take_while(|a| !a.starts_with('-'))
            .take(2)
            .cloned()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sensuctl {}", self.args.join(" "))?;
        if self.stdin.is_some() {
            write!(f, " < (document)")?;
        }
        Ok(())
    }
}

/// Backend trait for executing sensuctl.
///
/// Implementations return captured stdout on success and an
/// [`Error::CommandFailed`](crate::Error::CommandFailed) on non-zero exit.
pub trait Backend: Send + Sync {
    /// Run one invocation to completion.
    fn execute(&self, invocation: &Invocation) -> Result<String>;
}

impl<B: Backend + ?Sized> Backend for Arc<B> {
    fn execute(&self, invocation: &Invocation) -> Result<String> {
        (**self).execute(invocation)
    }
}
