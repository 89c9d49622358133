use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// A repository (or snippet) in the shape every provider is normalized into.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub id: String,
    pub name: Option<String>,
    /// The names of any files attached to a snippet, in the order the
    /// provider listed them.
    pub files: Vec<String>,
    pub clone_url: String,
    pub html_url: String,
    pub mirror_url: Option<String>,
    /// `owner/name`.
    pub full_name: String,
    pub description: Option<String>,
    pub fork: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub pushed_at: Option<DateTime<Utc>>,
}

impl Repository {
    /// The name to show the user.
    ///
    /// Snippets usually don't have a name, so we fall back to the first file
    /// they contain and then to the raw identifier.
    pub fn display_name(&self) -> String {
        match (self.name.as_ref(), self.files.first()) {
            (Some(name), _) if !name.is_empty() => name.clone(),
            (_, Some(file)) => format!("{}: {}", self.id, file),
            _ => self.id.clone(),
        }
    }

    pub fn is_mirror(&self) -> bool {
        self.mirror_url.is_some()
    }

    /// Whether we know both where to clone from and where to put it.
    pub fn is_cloneable(&self) -> bool {
        !self.clone_url.is_empty() && !self.full_name.trim_matches('/').is_empty()
    }
}

/// The `.git` address for a web address, if there is one.
pub fn git_address(web_url: &str) -> Option<String> {
    if web_url.is_empty() {
        None
    } else {
        Some(format!("{}.git", web_url.trim_end_matches('/')))
    }
}

/// Derive `owner/name` from a web address like
/// `https://github.com/owner/name.git`.
///
/// Returns `None` when the address has no path segments to work with.
pub fn full_name_from_url(url: &str) -> Option<String> {
    let without_scheme = match url.find("://") {
        Some(ix) => &url[ix + 3..],
        None => url,
    };
    let path = without_scheme.splitn(2, '/').nth(1)?;

    let segments: Vec<&str> = path
        .split(|c| c == '/' || c == '?' || c == '#')
        .take_while(|s| !s.is_empty())
        .take(2)
        .map(|s| s.strip_suffix(".git").unwrap_or(s))
        .collect();

    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

/// Which kinds of repositories should be cloned.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Filter {
    pub all: bool,
    pub sources: bool,
    pub mirrors: bool,
    pub forks: bool,
}

impl Filter {
    /// Resolve the filter from the individual flags, implying `sources` when
    /// nothing was asked for.
    pub fn resolve(all: bool, sources: bool, mirrors: bool, forks: bool) -> Filter {
        let nothing_requested = !(all || sources || mirrors || forks);

        Filter {
            all,
            sources: sources || nothing_requested,
            mirrors,
            forks,
        }
    }

    pub fn accepts(&self, repo: &Repository) -> bool {
        self.all
            || (self.mirrors && repo.is_mirror())
            || (self.forks && repo.fork)
            || (self.sources && !repo.fork)
    }
}

impl Default for Filter {
    fn default() -> Filter {
        Filter::resolve(false, false, false, false)
    }
}

/// One repository queued for cloning.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub name: String,
    pub clone_url: String,
    pub dest_dir: PathBuf,
}

impl WorkItem {
    pub fn for_repository(repo: &Repository, root: &Path) -> WorkItem {
        WorkItem {
            name: repo.display_name(),
            clone_url: repo.clone_url.clone(),
            dest_dir: root.join(&repo.full_name),
        }
    }
}
