//! Hoard every repository (or gist, or snippet) a user or organisation owns.
//!
//! A target URL is classified into a [`Target`], the [`Driver`] asks the
//! relevant provider for everything the owner has, and the resulting
//! [`WorkItem`]s are cloned through a bounded [`TaskQueue`].

#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

pub mod config;
pub mod driver;
pub mod errors;
pub mod git;
pub mod pagination;
pub mod progress;
pub mod providers;
pub mod queue;
pub mod repository;
pub mod target;

pub use crate::config::Config;
pub use crate::driver::{Driver, Mode, Plan, Summary};
pub use crate::git::{Cloner, GitClone};
pub use crate::pagination::{HttpTransport, MemoryTransport, Transport};
pub use crate::progress::{ProgressSink, TerminalSink};
pub use crate::queue::{OutcomeHandle, TaskQueue};
pub use crate::repository::{Filter, Repository, WorkItem};
pub use crate::target::Target;
