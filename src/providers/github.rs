use super::{insert_secret, string_or_number, Listing, ListingKind, Provider};
use crate::pagination::{fetch_all, fetch_one, Transport};
use crate::repository::{full_name_from_url, git_address, Repository};
use chrono::{DateTime, Utc};
use failure::{Error, ResultExt};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde_json::{Map, Value};
use std::fmt::{self, Debug, Formatter};

const API_ROOT: &str = "https://api.github.com";

/// Retrieve GitHub repositories and gists.
#[derive(Clone, PartialEq)]
pub struct GitHub {
    cfg: GitHubConfig,
}

impl GitHub {
    pub fn new(cfg: GitHubConfig) -> GitHub {
        GitHub { cfg }
    }

    fn headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(GitHubConfig::DEFAULT_AGENT));
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_str(&self.cfg.api_version)
                .context("Invalid GitHub API version")?,
        );

        if let Some(ref key) = self.cfg.api_key {
            insert_secret(&mut headers, AUTHORIZATION, &format!("token {}", key))?;
        }

        Ok(headers)
    }

    async fn get_repos<T: Transport>(&self, transport: &T, owner: &str) -> Result<Vec<RawRepo>, Error> {
        let headers = self.headers()?;

        debug!("Fetching repositories owned by {}", owner);
        let url = format!("{}/users/{}/repos?type=sources&per_page=100", API_ROOT, owner);
        let repos: Vec<RawRepo> = fetch_all(transport, &url, &headers)
            .await
            .context("Unable to fetch the user's repositories")?;

        if !repos.is_empty() {
            return Ok(repos);
        }

        debug!("{} has no repositories, trying it as an organisation", owner);
        let url = format!("{}/orgs/{}/repos?per_page=100&type=sources", API_ROOT, owner);
        let repos = fetch_all(transport, &url, &headers)
            .await
            .context("Unable to fetch the organisation's repositories")?;

        Ok(repos)
    }

    async fn get_gists<T: Transport>(&self, transport: &T, listing: &Listing) -> Result<Vec<RawRepo>, Error> {
        let headers = self.headers()?;

        let user = match listing.name {
            Some(_) => listing.owner.clone(),
            None => {
                // gist.github.com/<id> only tells us which gist, not whose
                let url = format!("{}/gists/{}", API_ROOT, listing.owner);
                let gist: Option<RawRepo> = fetch_one(transport, &url, &headers).await?;

                match gist.and_then(|g| g.owner).map(|o| o.login) {
                    Some(login) if !login.is_empty() => login,
                    _ => listing.owner.clone(),
                }
            },
        };

        debug!("Fetching gists owned by {}", user);
        let url = format!("{}/users/{}/gists?per_page=100", API_ROOT, user);
        let gists = fetch_all(transport, &url, &headers)
            .await
            .context("Unable to fetch gists")?;

        Ok(gists)
    }
}

impl Provider for GitHub {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn list<T: Transport>(&self, transport: &T, listing: &Listing) -> Result<Vec<Repository>, Error> {
        let raw = match listing.kind {
            ListingKind::Repositories => self.get_repos(transport, &listing.owner).await?,
            ListingKind::Snippets => self.get_gists(transport, listing).await?,
        };

        debug!("Found {} records on GitHub", raw.len());
        Ok(raw.into_iter().map(normalize).collect())
    }
}

impl Debug for GitHub {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("GitHub").finish()
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct GitHubConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub api_version: String,
}

impl GitHubConfig {
    pub const DEFAULT_AGENT: &'static str = "hoard";
    pub const DEFAULT_API_VERSION: &'static str = "2022-11-28";
}

impl Default for GitHubConfig {
    fn default() -> GitHubConfig {
        GitHubConfig {
            api_key: None,
            api_version: GitHubConfig::DEFAULT_API_VERSION.to_string(),
        }
    }
}

impl Debug for GitHubConfig {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "XXXXXXXXXX"))
            .field("api_version", &self.api_version)
            .finish()
    }
}

/// A repository or gist, as GitHub describes it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawRepo {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    name: Option<String>,
    full_name: Option<String>,
    description: Option<String>,
    files: Map<String, Value>,
    clone_url: Option<String>,
    git_pull_url: Option<String>,
    html_url: Option<String>,
    mirror_url: Option<String>,
    fork: Option<bool>,
    owner: Option<Owner>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    pushed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct Owner {
    login: String,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.is_empty())
}

pub(crate) fn normalize(raw: RawRepo) -> Repository {
    let html_url = raw.html_url.unwrap_or_default();
    let owner = raw.owner.map(|o| o.login).filter(|login| !login.is_empty());

    let full_name = non_empty(raw.full_name).unwrap_or_else(|| {
        match full_name_from_url(&html_url) {
            // gists live at gist.github.com/<id>
            Some(ref name) if !name.contains('/') => match owner {
                Some(ref owner) => format!("{}/{}", owner, name),
                None => name.clone(),
            },
            Some(name) => name,
            None => raw.id.clone(),
        }
    });

    let clone_url = non_empty(raw.clone_url)
        .or_else(|| non_empty(raw.git_pull_url))
        .or_else(|| git_address(&html_url))
        .unwrap_or_default();

    Repository {
        id: raw.id,
        name: non_empty(raw.name),
        files: raw.files.keys().cloned().collect(),
        clone_url,
        html_url,
        mirror_url: non_empty(raw.mirror_url),
        full_name,
        description: raw.description,
        fork: raw.fork.unwrap_or(false),
        created_at: raw.created_at,
        updated_at: raw.updated_at,
        pushed_at: raw.pushed_at,
    }
}
