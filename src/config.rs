//! Client configuration and authentication.
//!
//! Credentials are validated when the client is built: a client that would
//! send conflicting authentication never exists.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, USER_AGENT};

use crate::blocking::Gitlab;
use crate::client::AsyncGitlab;
use crate::error::{GitlabError, Result};
use crate::transport::{HttpTransport, ReqwestTransport};

/// The only API version this crate speaks.
pub const DEFAULT_API_VERSION: &str = "4";

const PRIVATE_TOKEN: &str = "private-token";
const JOB_TOKEN: &str = "job-token";

/// Authentication material for one client.
///
/// At most one of the three tokens may be set. HTTP basic auth needs both
/// username and password and cannot be combined with an OAuth token.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub private_token: Option<String>,
    pub oauth_token: Option<String>,
    pub job_token: Option<String>,
    pub http_username: Option<String>,
    pub http_password: Option<String>,
}

impl Credentials {
    pub fn validate(&self) -> Result<()> {
        let tokens = [&self.private_token, &self.oauth_token, &self.job_token]
            .iter()
            .filter(|t| t.is_some())
            .count();
        if tokens > 1 {
            return Err(GitlabError::Configuration(
                "Only one of private_token, oauth_token or job_token should be defined".into(),
            ));
        }
        if self.http_username.is_some() != self.http_password.is_some() {
            return Err(GitlabError::Configuration(
                "Both http_username and http_password should be defined".into(),
            ));
        }
        if self.oauth_token.is_some() && self.http_username.is_some() {
            return Err(GitlabError::Configuration(
                "Only one of oauth authentication or http authentication should be used".into(),
            ));
        }
        Ok(())
    }

    /// Token headers to attach to every request.
    pub fn auth_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &self.private_token {
            headers.insert(HeaderName::from_static(PRIVATE_TOKEN), header_value(token)?);
        }
        if let Some(token) = &self.oauth_token {
            headers.insert(AUTHORIZATION, header_value(&format!("Bearer {token}"))?);
        }
        if let Some(token) = &self.job_token {
            headers.insert(HeaderName::from_static(JOB_TOKEN), header_value(token)?);
        }
        Ok(headers)
    }

    pub fn basic_auth(&self) -> Option<(String, String)> {
        match (&self.http_username, &self.http_password) {
            (Some(user), Some(password)) => Some((user.clone(), password.clone())),
            _ => None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact(value: &Option<String>) -> Option<&'static str> {
            value.as_ref().map(|_| "***")
        }
        f.debug_struct("Credentials")
            .field("private_token", &redact(&self.private_token))
            .field("oauth_token", &redact(&self.oauth_token))
            .field("job_token", &redact(&self.job_token))
            .field("http_username", &self.http_username)
            .field("http_password", &redact(&self.http_password))
            .finish()
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| GitlabError::Configuration(format!("Invalid header value: {e}")))
}

/// Settings shared by every request of one client.
#[derive(Debug, Clone)]
pub(crate) struct ClientConfig {
    pub url: String,
    pub api_url: String,
    pub api_version: String,
    pub headers: HeaderMap,
    pub credentials: Credentials,
    pub per_page: Option<u32>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for [`AsyncGitlab`] and the blocking [`Gitlab`].
///
/// ```no_run
/// use gitlab_client::GitlabBuilder;
///
/// let gl = GitlabBuilder::new("https://gitlab.example.com")
///     .private_token("glpat-xxxx")
///     .per_page(50)
///     .build()
///     .unwrap();
/// ```
pub struct GitlabBuilder {
    url: String,
    api_version: String,
    credentials: Credentials,
    timeout: Option<Duration>,
    ssl_verify: bool,
    per_page: Option<u32>,
    user_agent: String,
    transport: Option<Arc<dyn HttpTransport>>,
}

impl GitlabBuilder {
    /// Start a builder for the server at `url` (e.g. `https://gitlab.com`).
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            credentials: Credentials::default(),
            timeout: None,
            ssl_verify: true,
            per_page: None,
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            transport: None,
        }
    }

    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    pub fn private_token(mut self, token: impl Into<String>) -> Self {
        self.credentials.private_token = Some(token.into());
        self
    }

    pub fn oauth_token(mut self, token: impl Into<String>) -> Self {
        self.credentials.oauth_token = Some(token.into());
        self
    }

    pub fn job_token(mut self, token: impl Into<String>) -> Self {
        self.credentials.job_token = Some(token.into());
        self
    }

    pub fn http_username(mut self, username: impl Into<String>) -> Self {
        self.credentials.http_username = Some(username.into());
        self
    }

    pub fn http_password(mut self, password: impl Into<String>) -> Self {
        self.credentials.http_password = Some(password.into());
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Request timeout handed to the default transport.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn ssl_verify(mut self, verify: bool) -> Self {
        self.ssl_verify = verify;
        self
    }

    /// Default `per_page` for list requests that do not set one.
    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = Some(per_page);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Replace the default reqwest transport.
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build a client whose calls are `async`.
    pub fn build_async(self) -> Result<AsyncGitlab> {
        self.credentials.validate()?;

        if self.api_version != DEFAULT_API_VERSION {
            return Err(GitlabError::Configuration(format!(
                "API version {} is not supported, only v{DEFAULT_API_VERSION} is",
                self.api_version
            )));
        }

        let url = self.url.trim_end_matches('/').to_string();
        ::url::Url::parse(&url)
            .map_err(|e| GitlabError::Configuration(format!("Invalid server URL {url:?}: {e}")))?;

        let mut headers = self.credentials.auth_headers()?;
        headers.insert(USER_AGENT, header_value(&self.user_agent)?);

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(
                ReqwestTransport::new(self.timeout, self.ssl_verify)
                    .map_err(|e| GitlabError::Configuration(format!("HTTP client: {e}")))?,
            ),
        };

        let config = ClientConfig {
            api_url: format!("{url}/api/v{}", self.api_version),
            url,
            api_version: self.api_version,
            headers,
            credentials: self.credentials,
            per_page: self.per_page,
        };
        Ok(AsyncGitlab::from_parts(config, transport))
    }

    /// Build a client whose calls block the current thread.
    pub fn build(self) -> Result<Gitlab> {
        Gitlab::from_async(self.build_async()?)
    }
}

impl fmt::Debug for GitlabBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitlabBuilder")
            .field("url", &self.url)
            .field("api_version", &self.api_version)
            .field("credentials", &self.credentials)
            .field("timeout", &self.timeout)
            .field("ssl_verify", &self.ssl_verify)
            .field("per_page", &self.per_page)
            .field("user_agent", &self.user_agent)
            .field("custom_transport", &self.transport.is_some())
            .finish()
    }
}
