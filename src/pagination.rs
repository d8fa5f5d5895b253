//! Pagination of list endpoints.
//!
//! GitLab reports pagination through response headers:
//!
//! - `X-Page`, `X-Prev-Page`, `X-Next-Page`, `X-Per-Page`
//! - `X-Total`, `X-Total-Pages` (dropped by the server for large collections)
//! - `Link` with a `rel="next"` target
//!
//! [`GitlabList`] keeps every item fetched so far and only asks for the next
//! page when a caller reads past the end of its cache.

use futures::Stream;
use reqwest::header::{HeaderMap, LINK};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::{AsyncGitlab, RequestOptions};
use crate::error::{GitlabError, Result};
use crate::response::parse_json;

// ---------------------------------------------------------------------------
// Header parsing
// ---------------------------------------------------------------------------

/// Pagination state reported by one page response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageInfo {
    pub current_page: Option<u64>,
    pub prev_page: Option<u64>,
    pub next_page: Option<u64>,
    pub per_page: Option<u64>,
    pub total_pages: Option<u64>,
    pub total: Option<u64>,
    /// Where the next page lives; `None` once the listing is exhausted.
    pub next_url: Option<String>,
}

impl PageInfo {
    /// Read the pagination headers of the page fetched from `page_url`.
    ///
    /// Without a `Link` header, a next page is still followed when
    /// `X-Next-Page` is ahead of `X-Page`, by rewriting the `page` query
    /// parameter of `page_url`.
    pub fn from_headers(headers: &HeaderMap, page_url: &str) -> Self {
        let mut info = Self {
            current_page: number_header(headers, "x-page"),
            prev_page: number_header(headers, "x-prev-page"),
            next_page: number_header(headers, "x-next-page"),
            per_page: number_header(headers, "x-per-page"),
            total_pages: number_header(headers, "x-total-pages"),
            total: number_header(headers, "x-total"),
            next_url: None,
        };

        info.next_url = headers
            .get_all(LINK)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(parse_next_link);

        if info.next_url.is_none() && headers.get(LINK).is_none() {
            if let (Some(current), Some(next)) = (info.current_page, info.next_page) {
                if next > current {
                    info.next_url = with_page(page_url, next);
                }
            }
        }
        info
    }
}

fn number_header(headers: &HeaderMap, name: &str) -> Option<u64> {
    let raw = headers.get(name)?.to_str().ok()?.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse() {
        Ok(n) => Some(n),
        Err(_) => {
            warn!(header = name, value = raw, "ignoring unparseable pagination header");
            None
        }
    }
}

/// Extract the `rel="next"` target of a `Link` header.
///
/// `<https://gitlab.example.com/api/v4/projects?page=2&per_page=20>; rel="next", <...>; rel="last"`
pub fn parse_next_link(link_header: &str) -> Option<String> {
    for part in link_header.split(',') {
        let mut url = None;
        let mut is_next = false;

        for segment in part.split(';') {
            let segment = segment.trim();
            if segment.starts_with('<') && segment.ends_with('>') {
                url = Some(&segment[1..segment.len() - 1]);
            } else if let Some(rel) = segment.strip_prefix("rel=") {
                is_next = rel.trim_matches('"').split_whitespace().any(|r| r == "next");
            }
        }

        if let (Some(url), true) = (url, is_next) {
            return Some(url.to_string());
        }
    }
    None
}

fn with_page(page_url: &str, page: u64) -> Option<String> {
    let mut url = url::Url::parse(page_url).ok()?;
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "page")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(pairs)
        .append_pair("page", &page.to_string());
    Some(url.into())
}

// ---------------------------------------------------------------------------
// Lazy list
// ---------------------------------------------------------------------------

/// A listing whose pages are fetched on demand.
///
/// Fetched items are cached in order and never change; reading past the
/// cache fetches the next page. All fetching methods take `&mut self`, so a
/// list is consumed by one task at a time.
#[derive(Debug)]
pub struct GitlabList {
    client: AsyncGitlab,
    info: PageInfo,
    items: Vec<Value>,
    position: usize,
    /// Set once a page fetch of the sequence failed; ends `next_item` only.
    failed: bool,
}

impl GitlabList {
    /// Fetch the first page of `path`.
    pub(crate) async fn fetch(
        client: AsyncGitlab,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Self> {
        let mut list = Self {
            client,
            info: PageInfo::default(),
            items: Vec::new(),
            position: 0,
            failed: false,
        };
        list.query(path, query).await?;
        Ok(list)
    }

    async fn query(&mut self, url: &str, query: &[(String, String)]) -> Result<()> {
        let response = self
            .client
            .send(Method::GET, url, RequestOptions::with_query(query))
            .await?;
        let info = PageInfo::from_headers(response.headers(), response.url());
        let body = response.bytes().await?;

        let page = match parse_json(&body)? {
            Value::Array(items) => items,
            other => {
                return Err(GitlabError::Parsing(format!(
                    "Expected a JSON array for a list page, got {}",
                    json_kind(&other)
                )))
            }
        };

        debug!(
            url,
            page = ?info.current_page,
            next_page = ?info.next_page,
            items = page.len(),
            "fetched list page"
        );
        self.items.extend(page);
        self.info = info;
        Ok(())
    }

    /// Fetch the next page; `false` when there is none.
    async fn fetch_next(&mut self) -> Result<bool> {
        let Some(url) = self.info.next_url.clone() else {
            return Ok(false);
        };
        self.query(&url, &[]).await?;
        Ok(true)
    }

    /// Total number of items reported by the server (`X-Total`).
    ///
    /// `None` when the server did not say; this is never guessed from the
    /// items fetched so far.
    pub fn len(&self) -> Option<u64> {
        self.info.total
    }

    /// Whether the server reported an empty listing; `None` like [`len`](Self::len).
    pub fn is_empty(&self) -> Option<bool> {
        self.len().map(|total| total == 0)
    }

    pub fn current_page(&self) -> Option<u64> {
        self.info.current_page
    }

    pub fn prev_page(&self) -> Option<u64> {
        self.info.prev_page
    }

    pub fn next_page(&self) -> Option<u64> {
        self.info.next_page
    }

    pub fn per_page(&self) -> Option<u64> {
        self.info.per_page
    }

    pub fn total_pages(&self) -> Option<u64> {
        self.info.total_pages
    }

    pub fn total(&self) -> Option<u64> {
        self.info.total
    }

    pub fn next_url(&self) -> Option<&str> {
        self.info.next_url.as_deref()
    }

    pub fn page_info(&self) -> &PageInfo {
        &self.info
    }

    /// Items fetched so far.
    pub fn fetched(&self) -> &[Value] {
        &self.items
    }

    pub fn is_exhausted(&self) -> bool {
        self.info.next_url.is_none()
    }

    /// Item at `index`, fetching pages forward as needed.
    pub async fn get(&mut self, index: usize) -> Result<&Value> {
        while index >= self.items.len() {
            if !self.fetch_next().await? {
                return Err(GitlabError::Index {
                    index,
                    available: self.items.len(),
                });
            }
        }
        Ok(&self.items[index])
    }

    /// Next item of the forward-only sequence.
    ///
    /// A page is fetched when the cached items run out. After the last item,
    /// or after a failed fetch, this keeps returning `None`. A failed fetch
    /// does not exhaust the list: [`get`](Self::get) and
    /// [`as_list`](Self::as_list) still try the next page.
    pub async fn next_item(&mut self) -> Option<Result<Value>> {
        if self.failed {
            return None;
        }
        while self.position >= self.items.len() {
            match self.fetch_next().await {
                Ok(true) => {}
                Ok(false) => return None,
                Err(e) => {
                    warn!(error = %e, "list page fetch failed, ending the sequence");
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
        let item = self.items[self.position].clone();
        self.position += 1;
        Some(Ok(item))
    }

    /// The forward-only sequence as a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Result<Value>> + Send {
        futures::stream::unfold(self, |mut list| async move {
            list.next_item().await.map(|item| (item, list))
        })
    }

    /// Fetch every remaining page and return all items in arrival order.
    pub async fn as_list(mut self) -> Result<Vec<Value>> {
        while self.fetch_next().await? {}
        Ok(self.items)
    }

    pub(crate) fn into_fetched(self) -> Vec<Value> {
        self.items
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Result of [`AsyncGitlab::http_list`].
#[derive(Debug)]
pub enum ListResult {
    /// Every requested item, fully materialized.
    List(Vec<Value>),
    /// The first page, with further pages fetched on demand.
    Paginated(GitlabList),
}

impl ListResult {
    pub fn is_paginated(&self) -> bool {
        matches!(self, ListResult::Paginated(_))
    }

    /// Materialize the result, fetching remaining pages if needed.
    pub async fn into_vec(self) -> Result<Vec<Value>> {
        match self {
            ListResult::List(items) => Ok(items),
            ListResult::Paginated(list) => list.as_list().await,
        }
    }
}
