use crate::pagination::Transport;
use crate::repository::Repository;
use failure::Error;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::de::{Deserialize, Deserializer};
use serde_json::Value;
use std::future::Future;

mod github;
mod gitlab;

pub use self::github::{GitHub, GitHubConfig};
pub use self::gitlab::{GitLab, GitLabConfig};

/// What to ask a provider for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub kind: ListingKind,
    /// The user or organisation, or for some snippet URLs the snippet's id.
    pub owner: String,
    /// The second path segment of the target, if there was one.
    pub name: Option<String>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ListingKind {
    Repositories,
    Snippets,
}

/// Something which can retrieve the repositories we want to hoard.
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    fn list<T: Transport>(
        &self,
        transport: &T,
        listing: &Listing,
    ) -> impl Future<Output = Result<Vec<Repository>, Error>> + Send;
}

/// Add a credential header which won't show up in logs.
fn insert_secret(headers: &mut HeaderMap, name: HeaderName, value: &str) -> Result<(), Error> {
    let mut value = HeaderValue::from_str(value)?;
    value.set_sensitive(true);
    headers.insert(name, value);

    Ok(())
}

/// Identifiers are numbers on some endpoints and strings on others.
fn string_or_number<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    match Value::deserialize(de)? {
        Value::String(s) => Ok(s),
        Value::Null => Ok(String::new()),
        other => Ok(other.to_string()),
    }
}
