//! The errors encountered in this crate.

use failure::Fail;
use std::fmt::{self, Display, Formatter};

/// A `git clone` process exited unsuccessfully.
#[derive(Debug, Clone, PartialEq, Fail)]
pub struct CloneFailed {
    pub url: String,
    /// The exit code, if the process wasn't killed by a signal.
    pub code: Option<i32>,
    /// Everything the process wrote to stderr.
    pub stderr: String,
}

impl Display for CloneFailed {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "Unable to clone {}", self.url)?;

        if let Some(code) = self.code {
            write!(f, " (exit code {})", code)?;
        }

        Ok(())
    }
}

/// The target couldn't be parsed as a URL.
#[derive(Debug, Clone, PartialEq, Fail)]
#[fail(display = "\"{}\" is not a valid repository URL", target)]
pub struct MalformedTarget {
    pub target: String,
}

/// A queued task was dropped before it could report back.
#[derive(Debug, Copy, Clone, PartialEq, Fail)]
#[fail(display = "The task was abandoned before it completed")]
pub struct TaskAbandoned;

/// A page of results couldn't be deserialized.
#[derive(Debug, Clone, PartialEq, Fail)]
#[fail(display = "Unable to understand the response from {}", url)]
pub struct UnparseableBody {
    pub url: String,
}
