use super::{insert_secret, string_or_number, Listing, ListingKind, Provider};
use crate::pagination::{fetch_all, fetch_one, Transport};
use crate::repository::{full_name_from_url, git_address, Repository};
use chrono::{DateTime, Utc};
use failure::{Error, ResultExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use std::fmt::{self, Debug, Formatter};

const DEFAULT_HOSTNAME: &str = "gitlab.com";

/// The GitLab provider.
#[derive(Debug, Clone, PartialEq)]
pub struct GitLab {
    cfg: GitLabConfig,
}

impl GitLab {
    pub fn new(cfg: GitLabConfig) -> GitLab {
        GitLab { cfg }
    }

    pub fn hostname(&self) -> &str {
        &self.cfg.hostname
    }

    fn api_root(&self) -> String {
        format!("https://{}/api/v4", self.cfg.hostname)
    }

    fn headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("hoard"));

        if let Some(ref key) = self.cfg.api_key {
            insert_secret(&mut headers, HeaderName::from_static("private-token"), key)?;
        }

        Ok(headers)
    }

    async fn get_projects<T: Transport>(&self, transport: &T, owner: &str) -> Result<Vec<Repository>, Error> {
        let headers = self.headers()?;

        debug!("Fetching projects owned by {}", owner);
        let url = format!("{}/users/{}/projects?per_page=100", self.api_root(), owner);
        let mut projects: Vec<RawProject> = fetch_all(transport, &url, &headers)
            .await
            .context("Unable to fetch the user's projects")?;

        if projects.is_empty() {
            debug!("{} has no projects, trying it as a group", owner);
            let url = format!("{}/groups/{}/projects?per_page=100", self.api_root(), owner);
            projects = fetch_all(transport, &url, &headers)
                .await
                .context("Unable to fetch the group's projects")?;
        }

        Ok(projects.into_iter().map(normalize).collect())
    }

    /// GitLab has no way of listing somebody's snippets, so the best we can do
    /// is the one snippet we were pointed at.
    async fn get_snippet<T: Transport>(&self, transport: &T, id: &str) -> Result<Vec<Repository>, Error> {
        let headers = self.headers()?;

        debug!("Fetching snippet {}", id);
        let url = format!("{}/snippets/{}", self.api_root(), id);
        let snippet: Option<RawSnippet> = fetch_one(transport, &url, &headers)
            .await
            .context("Unable to fetch the snippet")?;

        Ok(snippet.into_iter().map(normalize_snippet).collect())
    }
}

impl Provider for GitLab {
    fn name(&self) -> &'static str {
        "gitlab"
    }

    async fn list<T: Transport>(&self, transport: &T, listing: &Listing) -> Result<Vec<Repository>, Error> {
        let found = match (listing.kind, listing.name.as_ref()) {
            (ListingKind::Repositories, _) => self.get_projects(transport, &listing.owner).await?,
            (ListingKind::Snippets, Some(id)) => self.get_snippet(transport, id).await?,
            (ListingKind::Snippets, None) => {
                warn!("A snippet URL needs to include the snippet's id");
                Vec::new()
            },
        };

        debug!("Found {} records on GitLab", found.len());
        Ok(found)
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct GitLabConfig {
    pub hostname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for GitLabConfig {
    fn default() -> GitLabConfig {
        GitLabConfig {
            hostname: DEFAULT_HOSTNAME.to_string(),
            api_key: None,
        }
    }
}

impl Debug for GitLabConfig {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("GitLabConfig")
            .field("hostname", &self.hostname)
            .field("api_key", &self.api_key.as_ref().map(|_| "XXXXXXXXXX"))
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawProject {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    name: Option<String>,
    path_with_namespace: Option<String>,
    description: Option<String>,
    mirror: Option<bool>,
    http_url_to_repo: Option<String>,
    web_url: Option<String>,
    created_at: Option<DateTime<Utc>>,
    last_activity_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawSnippet {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    title: Option<String>,
    description: Option<String>,
    file_name: Option<String>,
    files: Vec<SnippetFile>,
    http_url_to_repo: Option<String>,
    web_url: Option<String>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct SnippetFile {
    path: String,
}

/// GitLab doesn't say whether a project is a fork, so nothing is.
pub(crate) fn normalize(raw: RawProject) -> Repository {
    let web_url = raw.web_url.unwrap_or_default();

    let full_name = raw
        .path_with_namespace
        .filter(|p| !p.is_empty())
        .or_else(|| full_name_from_url(&web_url))
        .unwrap_or_else(|| raw.id.clone());
    let clone_url = raw
        .http_url_to_repo
        .filter(|u| !u.is_empty())
        .or_else(|| git_address(&web_url))
        .unwrap_or_default();
    let mirror_url = if raw.mirror.unwrap_or(false) {
        Some(web_url.clone())
    } else {
        None
    };

    Repository {
        id: raw.id,
        name: raw.name.filter(|n| !n.is_empty()),
        files: Vec::new(),
        clone_url,
        html_url: web_url,
        mirror_url,
        full_name,
        description: raw.description,
        fork: false,
        created_at: raw.created_at,
        updated_at: raw.last_activity_at,
        pushed_at: raw.last_activity_at,
    }
}

pub(crate) fn normalize_snippet(raw: RawSnippet) -> Repository {
    let web_url = raw.web_url.unwrap_or_default();

    let mut files: Vec<String> = raw.files.into_iter().map(|f| f.path).collect();
    if files.is_empty() {
        files.extend(raw.file_name.filter(|f| !f.is_empty()));
    }

    let clone_url = raw
        .http_url_to_repo
        .filter(|u| !u.is_empty())
        .or_else(|| git_address(&web_url))
        .unwrap_or_default();

    Repository {
        full_name: if raw.id.is_empty() {
            String::new()
        } else {
            format!("snippets/{}", raw.id)
        },
        id: raw.id,
        name: raw.title.filter(|t| !t.is_empty()),
        files,
        clone_url,
        html_url: web_url,
        mirror_url: None,
        description: raw.description,
        fork: false,
        created_at: raw.created_at,
        updated_at: raw.updated_at,
        pushed_at: raw.updated_at,
    }
}
