//! Working out what the user asked us to hoard.

use crate::errors::MalformedTarget;
use crate::providers::{Listing, ListingKind};
use regex::Regex;
use reqwest::Url;
use std::sync::LazyLock;

/// Which provider a listing should be sent to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ProviderKind {
    GitHub,
    GitLab,
}

/// A classified target URL.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub url: Url,
    /// Set when the URL points at something a provider can list.
    pub listing: Option<(ProviderKind, Listing)>,
    /// Set when the URL can be handed to `git clone` as-is.
    pub direct: Option<DirectClone>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectClone {
    pub name: String,
    /// Where the repository should be cloned to, relative to the root.
    pub path: String,
}

impl Target {
    /// Classify a target.
    ///
    /// `only_one` skips listing mode entirely and `gitlab_host` is the
    /// hostname GitLab listings are served from.
    pub fn parse(target: &str, only_one: bool, gitlab_host: &str) -> Result<Target, MalformedTarget> {
        let url = Url::parse(target).map_err(|_| MalformedTarget {
            target: target.to_string(),
        })?;

        let listing = if only_one {
            None
        } else {
            listing_for(&url, gitlab_host)
        };

        Ok(Target {
            direct: direct_clone(&url),
            listing,
            url,
        })
    }

    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// The user or organisation this target refers to, if any.
    pub fn owner(&self) -> Option<&str> {
        path_segments(&self.url).into_iter().next()
    }
}

fn path_segments(url: &Url) -> Vec<&str> {
    url.path_segments()
        .map(|segments| {
            segments
                .filter(|s| !s.is_empty())
                .map(|s| s.strip_suffix(".git").unwrap_or(s))
                .collect()
        })
        .unwrap_or_default()
}

fn listing_for(url: &Url, gitlab_host: &str) -> Option<(ProviderKind, Listing)> {
    if !["http", "https", "ssh", "git"].contains(&url.scheme()) {
        return None;
    }

    let host = url.host_str()?.trim_start_matches("www.");
    let segments = path_segments(url);
    let owner = segments.first()?.to_string();
    let name = segments.get(1).map(|s| s.to_string());

    let (provider, kind) = if host == "gist.github.com" {
        (ProviderKind::GitHub, ListingKind::Snippets)
    } else if host == "github.com" {
        (ProviderKind::GitHub, ListingKind::Repositories)
    } else if host == gitlab_host && owner == "snippets" {
        (ProviderKind::GitLab, ListingKind::Snippets)
    } else if host == gitlab_host {
        (ProviderKind::GitLab, ListingKind::Repositories)
    } else {
        return None;
    };

    Some((provider, Listing { kind, owner, name }))
}

fn direct_clone(url: &Url) -> Option<DirectClone> {
    static GIT_URL: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)^((git|ssh|https?)|(git@[\w.]+))(:(//)?)([\w.@:/\-~]+)(\.git)?(/)?$")
            .expect("valid regex")
    });

    if !GIT_URL.is_match(url.as_str()) {
        return None;
    }

    let path = url.path().trim_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);
    if path.is_empty() {
        return None;
    }

    let name = path.rsplit('/').next().unwrap_or(path).to_string();

    Some(DirectClone {
        name,
        path: path.to_string(),
    })
}
