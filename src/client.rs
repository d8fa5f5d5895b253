use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use crate::config::{ClientConfig, Credentials, GitlabBuilder};
use crate::error::{GitlabError, Result};
use crate::models::CurrentUser;
use crate::pagination::{GitlabList, ListResult};
use crate::response::{self, ChunkAction, HttpResponse, ResponseContent};
use crate::transport::{FilePart, HttpTransport, RequestBody, TransportRequest, TransportResponse};
use crate::urls::{build_url, copy_dict, remove_none, request_url};

// ---------------------------------------------------------------------------
// Request options
// ---------------------------------------------------------------------------

/// Raw request payload with an explicit content type.
#[derive(Debug, Clone)]
pub struct RawBody {
    pub data: Bytes,
    pub content_type: String,
}

/// Everything about a request besides its method and path.
///
/// Body precedence: `files` (multipart, with `post_data` entries sent as form
/// fields), then `raw_body`, then `post_data` as JSON. `null` entries of a
/// `post_data` object are never sent.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub query: Vec<(String, String)>,
    pub post_data: Option<Value>,
    pub raw_body: Option<RawBody>,
    pub files: Vec<FilePart>,
}

impl RequestOptions {
    pub fn with_query(query: &[(String, String)]) -> Self {
        Self {
            query: query.to_vec(),
            ..Default::default()
        }
    }

    pub fn post_data(mut self, data: Value) -> Self {
        self.post_data = Some(data);
        self
    }

    pub fn raw_body(mut self, data: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        self.raw_body = Some(RawBody {
            data: data.into(),
            content_type: content_type.into(),
        });
        self
    }

    pub fn file(mut self, file: FilePart) -> Self {
        self.files.push(file);
        self
    }

    fn into_body(self) -> (Vec<(String, String)>, RequestBody) {
        let body = if !self.files.is_empty() {
            let mut fields = Vec::new();
            if let Some(Value::Object(data)) = &self.post_data {
                copy_dict(&mut fields, data);
            }
            RequestBody::Multipart {
                fields,
                files: self.files,
            }
        } else if let Some(raw) = self.raw_body {
            RequestBody::Raw {
                data: raw.data,
                content_type: raw.content_type,
            }
        } else if let Some(data) = self.post_data {
            match data {
                Value::Object(map) => RequestBody::Json(Value::Object(remove_none(map))),
                other => RequestBody::Json(other),
            }
        } else {
            RequestBody::Empty
        };
        (self.query, body)
    }
}

/// How `http_list` should hand back its result.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListOptions {
    /// `None` means `true`: return a `Vec` rather than a lazy list.
    pub as_list: Option<bool>,
    /// Fetch every page, whatever `as_list` says.
    pub all: bool,
}

impl ListOptions {
    /// Only fetch the first page and return a lazy [`GitlabList`].
    pub fn paginated() -> Self {
        Self {
            as_list: Some(false),
            all: false,
        }
    }

    /// Fetch every page into one `Vec`.
    pub fn all() -> Self {
        Self {
            as_list: None,
            all: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Async client
// ---------------------------------------------------------------------------

struct Inner {
    config: ClientConfig,
    transport: Arc<dyn HttpTransport>,
}

/// GitLab API client whose calls are `async`.
///
/// Cloning is cheap; clones share configuration and transport.
///
/// ```no_run
/// # async fn run() -> gitlab_client::Result<()> {
/// use gitlab_client::{AsyncGitlab, ListOptions};
///
/// let gl = AsyncGitlab::new("https://gitlab.example.com", Some("glpat-xxxx"))?;
/// let projects = gl
///     .http_list("/projects", &[], ListOptions::all())
///     .await?
///     .into_vec()
///     .await?;
/// println!("{} projects", projects.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct AsyncGitlab {
    inner: Arc<Inner>,
}

impl AsyncGitlab {
    /// Create a client authenticated with an optional private token.
    pub fn new(url: &str, private_token: Option<&str>) -> Result<Self> {
        let mut builder = GitlabBuilder::new(url);
        if let Some(token) = private_token {
            builder = builder.private_token(token);
        }
        builder.build_async()
    }

    pub fn builder(url: impl Into<String>) -> GitlabBuilder {
        GitlabBuilder::new(url)
    }

    pub(crate) fn from_parts(config: ClientConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            inner: Arc::new(Inner { config, transport }),
        }
    }

    /// Server URL without trailing slash.
    pub fn url(&self) -> &str {
        &self.inner.config.url
    }

    /// Root of the REST API, e.g. `https://gitlab.example.com/api/v4`.
    pub fn api_url(&self) -> &str {
        &self.inner.config.api_url
    }

    pub fn api_version(&self) -> &str {
        &self.inner.config.api_version
    }

    /// Headers sent with every request (auth and user agent).
    pub fn headers(&self) -> &HeaderMap {
        &self.inner.config.headers
    }

    pub fn credentials(&self) -> &Credentials {
        &self.inner.config.credentials
    }

    pub fn per_page(&self) -> Option<u32> {
        self.inner.config.per_page
    }

    /// Absolute URL for `path`.
    pub fn build_url(&self, path: &str) -> String {
        build_url(self.api_url(), path)
    }

    // ---- execution core ---------------------------------------------------

    /// Send a request and fail on any non-2xx status.
    ///
    /// The body is left unread so it can be streamed. Paths with a segment
    /// made only of dots fail with [`GitlabError::InvalidUrl`] before
    /// anything is sent.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<TransportResponse> {
        let url = request_url(&self.build_url(path))?;
        let (query, body) = options.into_body();
        debug!(%method, %url, ?query, "sending request");

        let request = TransportRequest {
            method,
            url,
            query,
            headers: self.inner.config.headers.clone(),
            basic_auth: self.inner.config.credentials.basic_auth(),
            body,
        };
        let response = self.inner.transport.send(request).await?;
        debug!(status = response.status(), url = response.url(), "received response");
        response::error_for_status(response).await
    }

    /// Send a request and buffer the whole response.
    pub async fn http_request(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<HttpResponse> {
        let response = self.send(method, path, options).await?;
        HttpResponse::read(response).await
    }

    /// `GET` a resource: parsed JSON when the server says so, raw bytes otherwise.
    pub async fn http_get(&self, path: &str, query: &[(String, String)]) -> Result<ResponseContent> {
        let response = self
            .send(Method::GET, path, RequestOptions::with_query(query))
            .await?;
        response::decode(response).await
    }

    /// `GET` a resource as raw bytes, optionally streaming it through `action`.
    ///
    /// Returns `None` when `streamed` is true; the body is then only visible
    /// through `action` (stdout when `action` is `None`).
    pub async fn http_get_raw(
        &self,
        path: &str,
        query: &[(String, String)],
        streamed: bool,
        action: Option<&mut ChunkAction<'_>>,
    ) -> Result<Option<Bytes>> {
        let response = self
            .send(Method::GET, path, RequestOptions::with_query(query))
            .await?;
        response::response_content(response, streamed, action).await
    }

    pub async fn http_post(
        &self,
        path: &str,
        query: &[(String, String)],
        post_data: Option<Value>,
    ) -> Result<ResponseContent> {
        let options = RequestOptions {
            post_data,
            ..RequestOptions::with_query(query)
        };
        self.http_post_with(path, options).await
    }

    pub async fn http_post_with(&self, path: &str, options: RequestOptions) -> Result<ResponseContent> {
        let response = self.send(Method::POST, path, options).await?;
        response::decode(response).await
    }

    pub async fn http_put(
        &self,
        path: &str,
        query: &[(String, String)],
        post_data: Option<Value>,
    ) -> Result<ResponseContent> {
        let options = RequestOptions {
            post_data,
            ..RequestOptions::with_query(query)
        };
        self.http_put_with(path, options).await
    }

    pub async fn http_put_with(&self, path: &str, options: RequestOptions) -> Result<ResponseContent> {
        let response = self.send(Method::PUT, path, options).await?;
        response::decode(response).await
    }

    pub async fn http_delete(&self, path: &str) -> Result<HttpResponse> {
        self.http_request(Method::DELETE, path, RequestOptions::default())
            .await
    }

    /// `GET` a list endpoint and handle its pagination.
    ///
    /// `all` may also be passed as an `all=true` query pair; it is never sent
    /// to the server. An explicit `page` query parameter without `all`
    /// returns just that page.
    pub async fn http_list(
        &self,
        path: &str,
        query: &[(String, String)],
        options: ListOptions,
    ) -> Result<ListResult> {
        let mut all = options.all;
        let mut query: Vec<(String, String)> = query
            .iter()
            .filter(|(key, value)| {
                if key == "all" {
                    all |= value == "true" || value == "1";
                    false
                } else {
                    true
                }
            })
            .cloned()
            .collect();

        if let Some(per_page) = self.per_page() {
            if !query.iter().any(|(key, _)| key == "per_page") {
                query.push(("per_page".into(), per_page.to_string()));
            }
        }
        let explicit_page = query.iter().any(|(key, _)| key == "page");

        let list = GitlabList::fetch(self.clone(), path, &query).await?;

        if all {
            return Ok(ListResult::List(list.as_list().await?));
        }
        match options.as_list.unwrap_or(true) {
            true if explicit_page => Ok(ListResult::List(list.into_fetched())),
            true => Ok(ListResult::List(list.as_list().await?)),
            false => Ok(ListResult::Paginated(list)),
        }
    }

    /// Fetch the user the client is authenticated as.
    pub async fn auth(&self) -> Result<CurrentUser> {
        match self.http_get("/user", &[]).await? {
            ResponseContent::Json(value) => {
                serde_json::from_value(value).map_err(|e| GitlabError::Parsing(e.to_string()))
            }
            ResponseContent::Raw(_) => Err(GitlabError::Parsing(
                "Expected a JSON body for the current user".into(),
            )),
        }
    }
}

impl std::fmt::Debug for AsyncGitlab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncGitlab")
            .field("url", &self.url())
            .field("api_version", &self.api_version())
            .field("credentials", self.credentials())
            .field("per_page", &self.per_page())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use reqwest::header::{HeaderValue, CONTENT_TYPE};
    use serde_json::json;

    /// Records every request and answers with a canned JSON body.
    struct RecordingTransport {
        requests: Mutex<Vec<TransportRequest>>,
        body: &'static str,
    }

    #[async_trait]
    impl HttpTransport for RecordingTransport {
        async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
            let url = request.url.to_string();
            self.requests.lock().unwrap().push(request);
            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            Ok(TransportResponse::from_bytes(200, url, headers, self.body))
        }
    }

    fn recording_client(body: &'static str) -> (AsyncGitlab, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport {
            requests: Mutex::new(Vec::new()),
            body,
        });
        let gl = GitlabBuilder::new("http://localhost")
            .job_token("CI_JOB_TOKEN")
            .transport(transport.clone())
            .build_async()
            .unwrap();
        (gl, transport)
    }

    #[tokio::test]
    async fn dots_in_paths_are_escaped() {
        let (gl, transport) = recording_client("{}");
        gl.http_get("/projects/1/repository/files/README.md", &[])
            .await
            .unwrap();

        let requests = transport.requests.lock().unwrap();
        assert_eq!(
            requests[0].url.as_str(),
            "http://localhost/api/v4/projects/1/repository/files/README%2Emd"
        );
        assert_eq!(requests[0].headers["JOB-TOKEN"], "CI_JOB_TOKEN");
        assert!(requests[0].basic_auth.is_none());
    }

    #[tokio::test]
    async fn files_turn_post_data_into_form_fields() {
        let (gl, transport) = recording_client(r#"{"id": 1}"#);
        let options = RequestOptions::default()
            .post_data(json!({"title": "upload", "labels": {"team": "core"}}))
            .file(FilePart::new("file", "notes.txt", b"hello".to_vec()));
        gl.http_post_with("/projects/1/uploads", options)
            .await
            .unwrap();

        let requests = transport.requests.lock().unwrap();
        match &requests[0].body {
            RequestBody::Multipart { fields, files } => {
                assert!(fields.contains(&("title".into(), "upload".into())));
                assert!(fields.contains(&("labels[team]".into(), "core".into())));
                assert_eq!(files[0].file_name, "notes.txt");
            }
            other => panic!("expected a multipart body, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn null_post_data_entries_are_dropped() {
        let (gl, transport) = recording_client(r#"{"id": 1}"#);
        gl.http_put(
            "/projects/1",
            &[],
            Some(json!({"name": "project1", "description": null})),
        )
        .await
        .unwrap();

        let requests = transport.requests.lock().unwrap();
        match &requests[0].body {
            RequestBody::Json(body) => assert_eq!(body, &json!({"name": "project1"})),
            other => panic!("expected a JSON body, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dot_segments_never_reach_the_transport() {
        let (gl, transport) = recording_client("{}");
        let err = gl
            .http_get("/projects/1/repository/files/..", &[])
            .await
            .unwrap_err();

        assert!(matches!(err, GitlabError::InvalidUrl(_)));
        assert!(transport.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn raw_body_wins_over_post_data() {
        let (gl, transport) = recording_client("{}");
        let options = RequestOptions::default()
            .post_data(json!({"ignored": true}))
            .raw_body("plain text", "text/plain");
        gl.http_put_with("/projects/1/wikis/home", options)
            .await
            .unwrap();

        let requests = transport.requests.lock().unwrap();
        match &requests[0].body {
            RequestBody::Raw { data, content_type } => {
                assert_eq!(data.as_ref(), b"plain text");
                assert_eq!(content_type, "text/plain");
            }
            other => panic!("expected a raw body, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn absolute_urls_are_not_rebased() {
        let (gl, transport) = recording_client("[]");
        gl.http_list(
            "http://localhost/api/v4/projects?page=3",
            &[],
            ListOptions::paginated(),
        )
        .await
        .unwrap();

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[0].url.as_str(), "http://localhost/api/v4/projects?page=3");
    }
}
