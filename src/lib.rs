//! GitLab REST API client library for Rust.
//!
//! Every API call funnels through one execution core that builds the URL,
//! attaches authentication, sends the request and decodes the response. The
//! core is `async` ([`AsyncGitlab`]); [`Gitlab`] drives the very same code on
//! a private runtime for callers that want plain blocking calls.
//!
//! List endpoints are paginated transparently: [`AsyncGitlab::http_list`]
//! either materializes every page into a `Vec` or hands back a lazy
//! [`GitlabList`] that fetches further pages on demand.
//!
//! # Quick Start
//!
//! ```no_run
//! use gitlab_client::{Gitlab, ListOptions};
//!
//! let gl = Gitlab::new("https://gitlab.example.com", Some("glpat-xxxx")).unwrap();
//!
//! // Fetch one project, using its namespaced path as the id
//! let id = gitlab_client::urls::clean_str_id("group/project");
//! let project = gl.http_get(&format!("/projects/{id}"), &[]).unwrap();
//! println!("{:?}", project.as_json());
//!
//! // Walk every page of a listing lazily
//! if let gitlab_client::blocking::ListResult::Paginated(list) = gl
//!     .http_list("/projects", &[], ListOptions::paginated())
//!     .unwrap()
//! {
//!     for project in list {
//!         println!("{}", project.unwrap()["name"]);
//!     }
//! }
//! ```

pub mod blocking;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod pagination;
pub mod response;
pub mod transport;
pub mod urls;

// Re-export the main public types at the crate root for convenience.
pub use blocking::Gitlab;
pub use client::{AsyncGitlab, ListOptions, RawBody, RequestOptions};
pub use config::{Credentials, GitlabBuilder, DEFAULT_API_VERSION};
pub use error::{GitlabError, Result};
pub use models::CurrentUser;
pub use pagination::{GitlabList, ListResult, PageInfo};
pub use response::{ChunkAction, HttpResponse, ResponseContent};
pub use transport::{
    FilePart, HttpTransport, ReqwestTransport, RequestBody, TransportRequest, TransportResponse,
};
pub use urls::sanitize;

pub use reqwest::Method;
