use crate::config::Config;
use crate::errors::CloneFailed;
use crate::git::Cloner;
use crate::pagination::Transport;
use crate::providers::{GitHub, GitLab, Provider};
use crate::queue::TaskQueue;
use crate::repository::{Filter, WorkItem};
use crate::target::{ProviderKind, Target};
use failure::{Error, ResultExt};
use futures::future::join_all;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

/// Works out what to clone, then clones it.
pub struct Driver<T, C> {
    root: PathBuf,
    concurrency: usize,
    filter: Filter,
    github: GitHub,
    gitlab: GitLab,
    transport: T,
    cloner: Arc<C>,
}

/// How a [`Plan`] came about.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Everything a user or organisation owns.
    Listing,
    /// The target itself.
    Direct,
    /// The target didn't point at anything we could clone.
    Nothing,
}

/// The repositories we're about to clone.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub mode: Mode,
    pub host: String,
    pub owner: Option<String>,
    pub items: Vec<WorkItem>,
}

impl<T, C> Driver<T, C>
where
    T: Transport,
    C: Cloner + 'static,
{
    pub fn new(cfg: &Config, filter: Filter, transport: T, cloner: C) -> Driver<T, C> {
        Driver {
            root: cfg.general.root.clone(),
            concurrency: cfg.general.concurrency,
            filter,
            github: GitHub::new(cfg.github.clone()),
            gitlab: GitLab::new(cfg.gitlab.clone()),
            transport,
            cloner: Arc::new(cloner),
        }
    }

    pub fn parse_target(&self, target: &str, only_one: bool) -> Result<Target, Error> {
        let target = Target::parse(target, only_one, self.gitlab.hostname())?;
        debug!("Target: {:?}", target);

        Ok(target)
    }

    /// Figure out which repositories a target refers to.
    ///
    /// Listings are tried first, falling back to cloning the target itself
    /// when the listing comes back empty.
    pub async fn plan(&self, target: &Target) -> Result<Plan, Error> {
        let mut plan = Plan {
            mode: Mode::Nothing,
            host: target.host().to_string(),
            owner: target.owner().map(String::from),
            items: Vec::new(),
        };

        if let Some((provider, ref listing)) = target.listing {
            let repos = match provider {
                ProviderKind::GitHub => {
                    info!("Fetching repositories from {}", self.github.name());
                    self.github.list(&self.transport, listing).await
                },
                ProviderKind::GitLab => {
                    info!("Fetching repositories from {}", self.gitlab.name());
                    self.gitlab.list(&self.transport, listing).await
                },
            }
            .context("Unable to fetch repositories")?;
            info!("Found {} repositories", repos.len());

            if !repos.is_empty() {
                plan.mode = Mode::Listing;
                plan.items = repos
                    .iter()
                    .filter(|repo| {
                        let cloneable = repo.is_cloneable();
                        if !cloneable {
                            warn!("Skipping {:?}, it has no clone address or name", repo.display_name());
                        }
                        cloneable
                    })
                    .filter(|repo| self.filter.accepts(repo))
                    .map(|repo| WorkItem::for_repository(repo, &self.root))
                    .collect();
                debug!("{} repositories made it through the filter", plan.items.len());

                return Ok(plan);
            }
        }

        if let Some(ref direct) = target.direct {
            plan.mode = Mode::Direct;
            plan.items.push(WorkItem {
                name: direct.name.clone(),
                clone_url: target.url.to_string(),
                dest_dir: self.root.join(&direct.path),
            });
        } else {
            warn!("Nothing to clone at {}", target.url);
        }

        Ok(plan)
    }

    /// Clone everything in the plan, at most `concurrency` at a time.
    ///
    /// Individual failures are collected in the [`Summary`] rather than
    /// stopping the run.
    pub async fn execute(&self, plan: &Plan) -> Summary {
        info!("Cloning {} repositories", plan.items.len());
        let queue = TaskQueue::new(self.concurrency);

        let handles: Vec<_> = plan
            .items
            .iter()
            .cloned()
            .map(|item| {
                let cloner = Arc::clone(&self.cloner);
                queue.enqueue(move || async move { cloner.clone_repo(&item).await })
            })
            .collect();

        let mut summary = Summary::default();

        for (item, outcome) in plan.items.iter().zip(join_all(handles).await) {
            match outcome {
                Ok(url) => {
                    debug!("Cloned {}", url);
                    summary.succeeded += 1;
                },
                Err(e) => {
                    warn!("Cloning {} failed, {}", item.name, e);
                    summary.failures.push((item.clone(), e));
                },
            }
        }

        summary
    }
}

/// The tally at the end of a run.
#[derive(Debug, Default)]
pub struct Summary {
    pub succeeded: usize,
    pub failures: Vec<(WorkItem, Error)>,
}

impl Summary {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Write out why each clone failed.
    pub fn display<W: Write>(&self, writer: &mut W) -> Result<(), Error> {
        for &(ref item, ref err) in &self.failures {
            writeln!(writer, "Error: {} failed with {}", item.name, err)?;
            for cause in err.iter_causes() {
                writeln!(writer, "\tCaused By: {}", cause)?;
            }

            if let Some(failed) = err.downcast_ref::<CloneFailed>() {
                for line in failed.stderr.lines().filter(|l| !l.trim().is_empty()) {
                    writeln!(writer, "\t{}", line.trim())?;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::{MemoryTransport, Response};
    use std::path::Path;

    struct Succeed;

    impl Cloner for Succeed {
        async fn clone_repo(&self, item: &WorkItem) -> Result<String, Error> {
            Ok(item.clone_url.clone())
        }
    }

    fn driver(transport: MemoryTransport) -> Driver<MemoryTransport, Succeed> {
        let mut cfg = Config::default();
        cfg.general.root = PathBuf::from("/backups");

        Driver::new(&cfg, Filter::default(), transport, Succeed)
    }

    #[tokio::test]
    async fn an_empty_listing_falls_back_to_a_direct_clone() {
        let driver = driver(MemoryTransport::new());
        let target = driver.parse_target("https://github.com/acme/widget", false).unwrap();

        let got = driver.plan(&target).await.unwrap();

        assert_eq!(got.mode, Mode::Direct);
        assert_eq!(got.owner.as_deref(), Some("acme"));
        assert_eq!(
            got.items,
            vec![WorkItem {
                name: String::from("widget"),
                clone_url: String::from("https://github.com/acme/widget"),
                dest_dir: PathBuf::from("/backups/acme/widget"),
            }]
        );
    }

    #[tokio::test]
    async fn records_without_an_address_are_skipped() {
        let transport = MemoryTransport::new().respond(
            "https://api.github.com/users/acme/repos?type=sources&per_page=100",
            Response::ok(
                r#"[
                    {"name": "ghost"},
                    {"id": 2, "name": "widget", "html_url": "https://github.com/acme/widget"}
                ]"#,
            ),
        );
        let driver = driver(transport);
        let target = driver.parse_target("https://github.com/acme", false).unwrap();

        let got = driver.plan(&target).await.unwrap();

        assert_eq!(got.mode, Mode::Listing);
        assert_eq!(
            got.items,
            vec![WorkItem {
                name: String::from("widget"),
                clone_url: String::from("https://github.com/acme/widget.git"),
                dest_dir: PathBuf::from("/backups/acme/widget"),
            }]
        );
    }

    #[tokio::test]
    async fn nothing_to_do() {
        let driver = driver(MemoryTransport::new());
        let target = driver.parse_target("https://github.com/", false).unwrap();

        let got = driver.plan(&target).await.unwrap();

        assert_eq!(got.mode, Mode::Nothing);
        assert!(got.items.is_empty());
        assert_eq!(driver.execute(&got).await.succeeded, 0);
    }

    #[test]
    fn display_failures() {
        let summary = Summary {
            succeeded: 1,
            failures: vec![(
                WorkItem {
                    name: String::from("widget"),
                    clone_url: String::from("https://example.org/widget.git"),
                    dest_dir: Path::new("widget").to_path_buf(),
                },
                CloneFailed {
                    url: String::from("https://example.org/widget.git"),
                    code: Some(128),
                    stderr: String::from("fatal: repository not found\n"),
                }
                .into(),
            )],
        };
        let mut buffer = Vec::new();

        summary.display(&mut buffer).unwrap();

        let got = String::from_utf8(buffer).unwrap();
        assert_eq!(
            got,
            "Error: widget failed with Unable to clone https://example.org/widget.git (exit code 128)\n\
             \tfatal: repository not found\n"
        );
    }
}
