//! HTTP transport abstraction.
//!
//! The execution core never talks to `reqwest` directly: it hands a fully
//! prepared [`TransportRequest`] to an [`HttpTransport`] and reads the status,
//! headers and chunked body of the returned [`TransportResponse`]. The default
//! implementation is [`ReqwestTransport`]; a custom transport can be injected
//! through the client builder (for instance to serve synthetic responses).

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt, TryStreamExt};
use reqwest::header::HeaderMap;
use reqwest::multipart;
use reqwest::Method;
use url::Url;

use crate::error::{GitlabError, Result};

/// Chunked response body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// A file uploaded as part of a multipart request.
#[derive(Debug, Clone)]
pub struct FilePart {
    /// Form field name, e.g. `file` or `avatar`.
    pub field: String,
    pub file_name: String,
    pub data: Vec<u8>,
    /// Defaults to `application/octet-stream`.
    pub mime_type: Option<String>,
}

impl FilePart {
    pub fn new(field: impl Into<String>, file_name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            field: field.into(),
            file_name: file_name.into(),
            data,
            mime_type: None,
        }
    }
}

/// Request payload as seen by the transport.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Raw {
        data: Bytes,
        content_type: String,
    },
    Multipart {
        fields: Vec<(String, String)>,
        files: Vec<FilePart>,
    },
}

/// Transport-level request data.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    /// Parsed request URL; may already carry a query string.
    pub url: Url,
    /// Extra query pairs appended to `url`.
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub basic_auth: Option<(String, String)>,
    pub body: RequestBody,
}

/// Transport-level response data.
pub struct TransportResponse {
    status: u16,
    url: String,
    headers: HeaderMap,
    body: ByteStream,
}

impl TransportResponse {
    pub fn new(status: u16, url: impl Into<String>, headers: HeaderMap, body: ByteStream) -> Self {
        Self {
            status,
            url: url.into(),
            headers,
            body,
        }
    }

    /// Build a response whose body is already in memory.
    pub fn from_bytes(
        status: u16,
        url: impl Into<String>,
        headers: HeaderMap,
        body: impl Into<Bytes>,
    ) -> Self {
        let body = body.into();
        let stream = futures::stream::once(futures::future::ready(Ok::<_, GitlabError>(body)));
        Self::new(status, url, headers, Box::pin(stream))
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Final URL of the request, including its query string.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Read the whole body into memory.
    pub async fn bytes(self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        let mut body = self.body;
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    pub fn into_stream(self) -> ByteStream {
        self.body
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Sends prepared requests to the server.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse>;
}

// ---------------------------------------------------------------------------
// reqwest implementation
// ---------------------------------------------------------------------------

/// Default transport backed by an async [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with an optional request timeout.
    ///
    /// When `ssl_verify` is false, invalid server certificates are accepted.
    pub fn new(timeout: Option<Duration>, ssl_verify: bool) -> Result<Self> {
        let mut builder = reqwest::Client::builder().danger_accept_invalid_certs(!ssl_verify);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
        })
    }

    /// Wrap an already configured client.
    pub fn from_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        let mut builder = self
            .http
            .request(request.method, request.url)
            .headers(request.headers);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some((username, password)) = request.basic_auth {
            builder = builder.basic_auth(username, Some(password));
        }

        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Raw { data, content_type } => builder
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .body(data),
            RequestBody::Multipart { fields, files } => {
                let mut form = multipart::Form::new();
                for (name, value) in fields {
                    form = form.text(name, value);
                }
                for file in files {
                    let mime = file
                        .mime_type
                        .as_deref()
                        .unwrap_or("application/octet-stream");
                    let part = multipart::Part::bytes(file.data)
                        .file_name(file.file_name)
                        .mime_str(mime)?;
                    form = form.part(file.field, part);
                }
                builder.multipart(form)
            }
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let url = response.url().to_string();
        let headers = response.headers().clone();
        let body = response.bytes_stream().map_err(GitlabError::from);

        Ok(TransportResponse::new(status, url, headers, Box::pin(body)))
    }
}
