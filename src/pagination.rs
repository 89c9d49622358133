//! Turning a paginated listing API into one complete collection.

use crate::errors::UnparseableBody;
use failure::{Error, ResultExt};
use regex::Regex;
use reqwest::header::{HeaderMap, LINK};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{LazyLock, Mutex};

/// A raw HTTP response, before we've tried to interpret the body.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: StatusCode,
    /// The value of the `Link` header, if there was one.
    pub link: Option<String>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn ok<B: Into<Vec<u8>>>(body: B) -> Response {
        Response {
            status: StatusCode::OK,
            link: None,
            body: body.into(),
        }
    }

    pub fn with_status(status: StatusCode) -> Response {
        Response {
            status,
            link: None,
            body: Vec::new(),
        }
    }

    pub fn with_link<S: Into<String>>(mut self, link: S) -> Response {
        self.link = Some(link.into());
        self
    }
}

/// Something which can send a `GET` request.
///
/// Only network-level problems are errors, a response with a failure status
/// is still a response.
pub trait Transport: Send + Sync {
    fn get(
        &self,
        url: &str,
        headers: &HeaderMap,
    ) -> impl Future<Output = Result<Response, Error>> + Send;
}

/// A `Transport` backed by a real HTTP client.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> HttpTransport {
        HttpTransport::default()
    }
}

impl Transport for HttpTransport {
    async fn get(&self, url: &str, headers: &HeaderMap) -> Result<Response, Error> {
        debug!("Sending request to {:?}", url);

        if log_enabled!(log::Level::Trace) {
            // credentials are marked as sensitive so they're redacted here
            for line in format!("Request Headers {:#?}", headers).lines() {
                trace!("{}", line);
            }
        }

        let response = self
            .client
            .get(url)
            .headers(headers.clone())
            .send()
            .await
            .with_context(|_| format!("Unable to send a request to {}", url))?;

        let status = response.status();
        let link = response
            .headers()
            .get(LINK)
            .and_then(|value| value.to_str().ok())
            .map(String::from);
        debug!("Received response ({})", status);

        let body = response
            .bytes()
            .await
            .with_context(|_| format!("Unable to read the response from {}", url))?;

        Ok(Response {
            status,
            link,
            body: body.to_vec(),
        })
    }
}

/// An in-memory `Transport` which serves canned responses and remembers
/// every URL it was asked for. Unknown URLs get a `404 Not Found`.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    responses: HashMap<String, Response>,
    requests: Mutex<Vec<String>>,
}

impl MemoryTransport {
    pub fn new() -> MemoryTransport {
        MemoryTransport::default()
    }

    pub fn respond<S: Into<String>>(mut self, url: S, response: Response) -> MemoryTransport {
        self.responses.insert(url.into(), response);
        self
    }

    /// The URLs requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

impl Transport for MemoryTransport {
    async fn get(&self, url: &str, _headers: &HeaderMap) -> Result<Response, Error> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_string());
        }

        Ok(self
            .responses
            .get(url)
            .cloned()
            .unwrap_or_else(|| Response::with_status(StatusCode::NOT_FOUND)))
    }
}

struct Page<I> {
    next: Option<String>,
    items: Vec<I>,
}

/// Fetch every page of a listing, starting at `start` and following the
/// `rel="next"` links until there are none left.
///
/// Pages are requested one at a time and their items concatenated in the
/// order they were received. A page which comes back with a failure status
/// is treated as empty.
pub async fn fetch_all<T, I>(
    transport: &T,
    start: &str,
    headers: &HeaderMap,
) -> Result<Vec<I>, Error>
where
    T: Transport,
    I: DeserializeOwned,
{
    let mut items = Vec::new();
    let mut next_endpoint = Some(start.to_string());

    while let Some(endpoint) = next_endpoint.take() {
        let page: Page<I> = fetch_page(transport, &endpoint, headers).await?;
        trace!("Got {} items from {}", page.items.len(), endpoint);

        items.extend(page.items);
        next_endpoint = page.next;
    }

    Ok(items)
}

/// Fetch a single object, returning `None` if the server didn't respond
/// successfully.
pub async fn fetch_one<T, I>(
    transport: &T,
    url: &str,
    headers: &HeaderMap,
) -> Result<Option<I>, Error>
where
    T: Transport,
    I: DeserializeOwned,
{
    let response = transport.get(url, headers).await?;

    if !response.status.is_success() {
        warn!("Request to {} failed with {}", url, response.status);
        return Ok(None);
    }

    let got = serde_json::from_slice(&response.body).context(UnparseableBody {
        url: url.to_string(),
    })?;

    Ok(Some(got))
}

async fn fetch_page<T, I>(transport: &T, url: &str, headers: &HeaderMap) -> Result<Page<I>, Error>
where
    T: Transport,
    I: DeserializeOwned,
{
    let response = transport.get(url, headers).await?;
    let next = response.link.as_deref().and_then(next_link);

    if !response.status.is_success() {
        warn!("Request to {} failed with {}", url, response.status);

        return Ok(Page {
            next,
            items: Vec::new(),
        });
    }

    let items = serde_json::from_slice(&response.body).context(UnparseableBody {
        url: url.to_string(),
    })?;

    Ok(Page { next, items })
}

/// Find the `rel="next"` entry in a `Link` header.
pub fn next_link(header: &str) -> Option<String> {
    static NEXT: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"<([^>]+)>;\s*rel="next""#).expect("valid regex"));

    NEXT.captures(header).map(|caps| caps[1].to_string())
}
