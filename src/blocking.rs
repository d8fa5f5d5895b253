//! Blocking client.
//!
//! [`Gitlab`] runs the async execution core on its own current-thread tokio
//! runtime, so both modes share one implementation and return the same values
//! and errors. Like `reqwest::blocking`, it must not be used from within an
//! async runtime.

use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde_json::Value;
use tokio::runtime::Runtime;

use crate::client::{AsyncGitlab, ListOptions, RequestOptions};
use crate::config::{Credentials, GitlabBuilder};
use crate::error::{GitlabError, Result};
use crate::models::CurrentUser;
use crate::pagination::{self, PageInfo};
use crate::response::{ChunkAction, HttpResponse, ResponseContent};

/// GitLab API client whose calls block the current thread.
///
/// ```no_run
/// use gitlab_client::{Gitlab, ListOptions};
///
/// let gl = Gitlab::new("https://gitlab.example.com", Some("glpat-xxxx")).unwrap();
/// let issues = gl
///     .http_list("/issues", &[], ListOptions::paginated())
///     .unwrap()
///     .into_vec()
///     .unwrap();
/// for issue in &issues {
///     println!("{}", issue["title"]);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Gitlab {
    inner: AsyncGitlab,
    runtime: Arc<Runtime>,
}

impl Gitlab {
    /// Create a client authenticated with an optional private token.
    pub fn new(url: &str, private_token: Option<&str>) -> Result<Self> {
        let mut builder = GitlabBuilder::new(url);
        if let Some(token) = private_token {
            builder = builder.private_token(token);
        }
        builder.build()
    }

    pub fn builder(url: impl Into<String>) -> GitlabBuilder {
        GitlabBuilder::new(url)
    }

    pub(crate) fn from_async(inner: AsyncGitlab) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| GitlabError::Configuration(format!("Failed to start runtime: {e}")))?;
        Ok(Self {
            inner,
            runtime: Arc::new(runtime),
        })
    }

    /// The async client driving this one.
    pub fn as_async(&self) -> &AsyncGitlab {
        &self.inner
    }

    pub fn url(&self) -> &str {
        self.inner.url()
    }

    pub fn api_url(&self) -> &str {
        self.inner.api_url()
    }

    pub fn api_version(&self) -> &str {
        self.inner.api_version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    pub fn credentials(&self) -> &Credentials {
        self.inner.credentials()
    }

    pub fn per_page(&self) -> Option<u32> {
        self.inner.per_page()
    }

    pub fn build_url(&self, path: &str) -> String {
        self.inner.build_url(path)
    }

    // ---- convenience wrappers for common HTTP verbs -----------------------

    pub fn http_request(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<HttpResponse> {
        self.runtime
            .block_on(self.inner.http_request(method, path, options))
    }

    pub fn http_get(&self, path: &str, query: &[(String, String)]) -> Result<ResponseContent> {
        self.runtime.block_on(self.inner.http_get(path, query))
    }

    pub fn http_get_raw(
        &self,
        path: &str,
        query: &[(String, String)],
        streamed: bool,
        action: Option<&mut ChunkAction<'_>>,
    ) -> Result<Option<Bytes>> {
        self.runtime
            .block_on(self.inner.http_get_raw(path, query, streamed, action))
    }

    pub fn http_post(
        &self,
        path: &str,
        query: &[(String, String)],
        post_data: Option<Value>,
    ) -> Result<ResponseContent> {
        self.runtime
            .block_on(self.inner.http_post(path, query, post_data))
    }

    pub fn http_post_with(&self, path: &str, options: RequestOptions) -> Result<ResponseContent> {
        self.runtime.block_on(self.inner.http_post_with(path, options))
    }

    pub fn http_put(
        &self,
        path: &str,
        query: &[(String, String)],
        post_data: Option<Value>,
    ) -> Result<ResponseContent> {
        self.runtime
            .block_on(self.inner.http_put(path, query, post_data))
    }

    pub fn http_put_with(&self, path: &str, options: RequestOptions) -> Result<ResponseContent> {
        self.runtime.block_on(self.inner.http_put_with(path, options))
    }

    pub fn http_delete(&self, path: &str) -> Result<HttpResponse> {
        self.runtime.block_on(self.inner.http_delete(path))
    }

    pub fn http_list(
        &self,
        path: &str,
        query: &[(String, String)],
        options: ListOptions,
    ) -> Result<ListResult> {
        let result = self
            .runtime
            .block_on(self.inner.http_list(path, query, options))?;
        Ok(match result {
            pagination::ListResult::List(items) => ListResult::List(items),
            pagination::ListResult::Paginated(list) => ListResult::Paginated(GitlabList {
                inner: list,
                runtime: Arc::clone(&self.runtime),
            }),
        })
    }

    pub fn auth(&self) -> Result<CurrentUser> {
        self.runtime.block_on(self.inner.auth())
    }
}

// ---------------------------------------------------------------------------
// Blocking list
// ---------------------------------------------------------------------------

/// Blocking view over [`pagination::GitlabList`].
///
/// Iterating yields every item in order, fetching pages as needed.
#[derive(Debug)]
pub struct GitlabList {
    inner: pagination::GitlabList,
    runtime: Arc<Runtime>,
}

impl GitlabList {
    /// Total number of items reported by the server, if any.
    pub fn len(&self) -> Option<u64> {
        self.inner.len()
    }

    pub fn is_empty(&self) -> Option<bool> {
        self.inner.is_empty()
    }

    pub fn current_page(&self) -> Option<u64> {
        self.inner.current_page()
    }

    pub fn prev_page(&self) -> Option<u64> {
        self.inner.prev_page()
    }

    pub fn next_page(&self) -> Option<u64> {
        self.inner.next_page()
    }

    pub fn per_page(&self) -> Option<u64> {
        self.inner.per_page()
    }

    pub fn total_pages(&self) -> Option<u64> {
        self.inner.total_pages()
    }

    pub fn total(&self) -> Option<u64> {
        self.inner.total()
    }

    pub fn next_url(&self) -> Option<&str> {
        self.inner.next_url()
    }

    pub fn page_info(&self) -> &PageInfo {
        self.inner.page_info()
    }

    pub fn fetched(&self) -> &[Value] {
        self.inner.fetched()
    }

    pub fn is_exhausted(&self) -> bool {
        self.inner.is_exhausted()
    }

    pub fn get(&mut self, index: usize) -> Result<&Value> {
        self.runtime.block_on(self.inner.get(index))
    }

    pub fn as_list(self) -> Result<Vec<Value>> {
        self.runtime.block_on(self.inner.as_list())
    }
}

impl Iterator for GitlabList {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        self.runtime.block_on(self.inner.next_item())
    }
}

/// Result of [`Gitlab::http_list`].
#[derive(Debug)]
pub enum ListResult {
    List(Vec<Value>),
    Paginated(GitlabList),
}

impl ListResult {
    pub fn is_paginated(&self) -> bool {
        matches!(self, ListResult::Paginated(_))
    }

    pub fn into_vec(self) -> Result<Vec<Value>> {
        match self {
            ListResult::List(items) => Ok(items),
            ListResult::Paginated(list) => list.as_list(),
        }
    }
}
