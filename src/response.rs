//! Response decoding: content-type detection, JSON parsing, streaming and
//! error-body message extraction.

use std::io::Write;

use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use serde_json::Value;
use tracing::{trace, warn};

use crate::error::{GitlabError, Result};
use crate::transport::TransportResponse;

/// Callback invoked for every non-empty chunk of a streamed body.
pub type ChunkAction<'a> = dyn FnMut(&[u8]) + Send + 'a;

/// Decoded body of a successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseContent {
    /// The server declared `application/json`.
    Json(Value),
    /// Any other content type, byte for byte.
    Raw(Bytes),
}

impl ResponseContent {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseContent::Json(value) => Some(value),
            ResponseContent::Raw(_) => None,
        }
    }

    pub fn into_json(self) -> Option<Value> {
        match self {
            ResponseContent::Json(value) => Some(value),
            ResponseContent::Raw(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            ResponseContent::Raw(bytes) => Some(bytes),
            ResponseContent::Json(_) => None,
        }
    }
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    pub(crate) async fn read(response: TransportResponse) -> Result<Self> {
        let status = response.status();
        let url = response.url().to_string();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        Ok(Self {
            status,
            url,
            headers,
            body,
        })
    }

    pub fn is_json(&self) -> bool {
        is_json(&self.headers)
    }

    /// Parse the body as JSON regardless of the declared content type.
    pub fn json(&self) -> Result<Value> {
        parse_json(&self.body)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Whether the response declares a JSON body.
pub fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case("application/json"))
}

pub fn parse_json(body: &[u8]) -> Result<Value> {
    serde_json::from_slice(body).map_err(|e| GitlabError::Parsing(e.to_string()))
}

/// Best-effort human readable message from an error body.
///
/// GitLab usually answers `{"message": ...}` (sometimes `{"error": ...}`);
/// anything else is returned as text.
pub fn error_message(body: &[u8]) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(body) {
        if let Some(message) = map.get("message").or_else(|| map.get("error")) {
            return match message {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
        }
    }
    String::from_utf8_lossy(body).into_owned()
}

/// Turn a non-2xx response into [`GitlabError::Http`].
pub async fn error_for_status(response: TransportResponse) -> Result<TransportResponse> {
    if response.is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = match response.bytes().await {
        Ok(body) => body,
        Err(e) => {
            warn!(status, error = %e, "failed to read error response body");
            Bytes::new()
        }
    };
    Err(GitlabError::Http {
        status,
        message: error_message(&body),
    })
}

/// Decode a successful response according to its content type.
pub async fn decode(response: TransportResponse) -> Result<ResponseContent> {
    let json = is_json(response.headers());
    let body = response.bytes().await?;
    if json {
        parse_json(&body).map(ResponseContent::Json)
    } else {
        Ok(ResponseContent::Raw(body))
    }
}

/// Return the body, or stream it through `action` chunk by chunk.
///
/// When `streamed` is false the whole body is returned. Otherwise every
/// non-empty chunk is passed to `action` in arrival order (written to stdout
/// when no action is given) and `None` is returned.
pub async fn response_content(
    response: TransportResponse,
    streamed: bool,
    action: Option<&mut ChunkAction<'_>>,
) -> Result<Option<Bytes>> {
    if !streamed {
        return response.bytes().await.map(Some);
    }

    let mut chunks = response.into_stream();
    match action {
        Some(action) => {
            while let Some(chunk) = chunks.next().await {
                let chunk = chunk?;
                if !chunk.is_empty() {
                    trace!(len = chunk.len(), "streamed chunk");
                    action(&chunk[..]);
                }
            }
        }
        None => {
            let mut stdout = std::io::stdout();
            while let Some(chunk) = chunks.next().await {
                let chunk = chunk?;
                if !chunk.is_empty() {
                    trace!(len = chunk.len(), "streamed chunk");
                    stdout.write_all(&chunk)?;
                }
            }
            stdout.flush()?;
        }
    }
    Ok(None)
}
