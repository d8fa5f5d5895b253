//! Integration tests for the blocking client.
//!
//! The mock server lives on its own multi-threaded runtime so the blocking
//! client can be driven from the plain test thread.

use gitlab_client::blocking::ListResult;
use gitlab_client::{Gitlab, GitlabError, ListOptions, ResponseContent};
use serde_json::json;
use tokio::runtime::Runtime;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Server first so it shuts down before its runtime.
struct Fixture {
    server: MockServer,
    rt: Runtime,
}

impl Fixture {
    fn start() -> Self {
        let rt = Runtime::new().unwrap();
        let server = rt.block_on(MockServer::start());
        Self { server, rt }
    }

    fn mount(&self, mock: Mock) {
        self.rt.block_on(mock.mount(&self.server));
    }

    fn client(&self) -> Gitlab {
        Gitlab::new(&self.server.uri(), Some("private_token")).unwrap()
    }
}

fn json_response(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "application/json")
}

fn mount_two_pages(fx: &Fixture) {
    let next = format!("{}/api/v4/tests?per_page=1&page=2", fx.server.uri());
    fx.mount(
        Mock::given(method("GET"))
            .and(path("/api/v4/tests"))
            .and(query_param_is_missing("page"))
            .respond_with(
                json_response(r#"[{"a": "b"}]"#)
                    .insert_header("X-Page", "1")
                    .insert_header("X-Next-Page", "2")
                    .insert_header("X-Per-Page", "1")
                    .insert_header("X-Total-Pages", "2")
                    .insert_header("X-Total", "2")
                    .insert_header("Link", format!("<{next}>; rel=\"next\"").as_str()),
            ),
    );
    fx.mount(
        Mock::given(method("GET"))
            .and(path("/api/v4/tests"))
            .and(query_param("page", "2"))
            .respond_with(
                json_response(r#"[{"c": "d"}]"#)
                    .insert_header("X-Page", "2")
                    .insert_header("X-Next-Page", "2")
                    .insert_header("X-Per-Page", "1")
                    .insert_header("X-Total-Pages", "2")
                    .insert_header("X-Total", "2"),
            ),
    );
}

// ---------------------------------------------------------------------------
// 1. Requests
// ---------------------------------------------------------------------------

#[test]
fn test_get_request() {
    let fx = Fixture::start();
    fx.mount(
        Mock::given(method("GET"))
            .and(path("/api/v4/projects"))
            .respond_with(json_response(r#"{"name": "project1"}"#)),
    );

    let result = fx.client().http_get("/projects", &[]).unwrap();
    assert_eq!(result, ResponseContent::Json(json!({"name": "project1"})));
}

#[test]
fn test_get_request_raw() {
    let fx = Fixture::start();
    fx.mount(
        Mock::given(method("GET"))
            .and(path("/api/v4/projects"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("content", "application/octet-stream")),
    );

    let result = fx.client().http_get("/projects", &[]).unwrap();
    assert_eq!(result.as_bytes().map(|b| b.as_ref()), Some(&b"content"[..]));
}

#[test]
fn test_streamed_download() {
    let fx = Fixture::start();
    fx.mount(
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/1/jobs/2/artifacts"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("zip", "application/zip")),
    );

    let mut received = Vec::new();
    let mut action = |chunk: &[u8]| received.extend_from_slice(chunk);
    let result = fx
        .client()
        .http_get_raw("/projects/1/jobs/2/artifacts", &[], true, Some(&mut action))
        .unwrap();
    assert!(result.is_none());
    assert_eq!(received, b"zip");
}

#[test]
fn test_errors_match_async_mode() {
    let fx = Fixture::start();
    fx.mount(
        Mock::given(path("/api/v4/not_there"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Here is why it failed")),
    );
    fx.mount(
        Mock::given(path("/api/v4/projects"))
            .respond_with(json_response(r#"["name": "project1"]"#)),
    );
    let gl = fx.client();

    for err in [
        gl.http_get("/not_there", &[]).unwrap_err(),
        gl.http_list("/not_there", &[], ListOptions::default()).unwrap_err(),
        gl.http_post("/not_there", &[], None).unwrap_err(),
        gl.http_put("/not_there", &[], None).unwrap_err(),
    ] {
        assert!(err.is_not_found(), "got {err:?}");
    }

    for err in [
        gl.http_get("/projects", &[]).unwrap_err(),
        gl.http_list("/projects", &[], ListOptions::default()).unwrap_err(),
        gl.http_post("/projects", &[], None).unwrap_err(),
        gl.http_put("/projects", &[], None).unwrap_err(),
    ] {
        assert!(matches!(err, GitlabError::Parsing(_)), "got {err:?}");
    }
}

#[test]
fn test_conflicting_credentials() {
    let err = Gitlab::builder("http://localhost")
        .private_token("private_token")
        .oauth_token("bearer")
        .build()
        .unwrap_err();
    assert!(matches!(err, GitlabError::Configuration(_)));
}

// ---------------------------------------------------------------------------
// 2. Pagination
// ---------------------------------------------------------------------------

#[test]
fn test_build_list() {
    let fx = Fixture::start();
    mount_two_pages(&fx);

    let result = fx
        .client()
        .http_list("/tests", &[], ListOptions::paginated())
        .unwrap();
    let ListResult::Paginated(list) = result else {
        panic!("expected a paginated list");
    };
    assert_eq!(list.len(), Some(2));
    assert_eq!(list.current_page(), Some(1));
    assert_eq!(list.next_page(), Some(2));
    assert_eq!(list.total_pages(), Some(2));

    let items: Vec<_> = list.map(|item| item.unwrap()).collect();
    assert_eq!(items, vec![json!({"a": "b"}), json!({"c": "d"})]);
}

#[test]
fn test_list_get_and_as_list() {
    let fx = Fixture::start();
    mount_two_pages(&fx);

    let result = fx
        .client()
        .http_list("/tests", &[], ListOptions::paginated())
        .unwrap();
    let ListResult::Paginated(mut list) = result else {
        panic!("expected a paginated list");
    };

    assert_eq!(list.get(1).unwrap(), &json!({"c": "d"}));
    assert!(matches!(list.get(5), Err(GitlabError::Index { index: 5, .. })));
    assert_eq!(
        list.as_list().unwrap(),
        vec![json!({"a": "b"}), json!({"c": "d"})]
    );
}

#[test]
fn test_list_all() {
    let fx = Fixture::start();
    mount_two_pages(&fx);

    let result = fx
        .client()
        .http_list(
            "/tests",
            &[],
            ListOptions {
                as_list: Some(false),
                all: true,
            },
        )
        .unwrap();
    let ListResult::List(items) = result else {
        panic!("expected a materialized list");
    };
    assert_eq!(items, vec![json!({"a": "b"}), json!({"c": "d"})]);
}

#[test]
fn test_iteration_stops_after_failed_page() {
    let fx = Fixture::start();
    let next = format!("{}/api/v4/numbers?page=2", fx.server.uri());
    fx.mount(
        Mock::given(method("GET"))
            .and(path("/api/v4/numbers"))
            .and(query_param_is_missing("page"))
            .respond_with(
                json_response("[1]")
                    .insert_header("X-Page", "1")
                    .insert_header("X-Next-Page", "2")
                    .insert_header("Link", format!("<{next}>; rel=\"next\"").as_str()),
            ),
    );
    fx.mount(
        Mock::given(method("GET"))
            .and(path("/api/v4/numbers"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom")),
    );

    let result = fx
        .client()
        .http_list("/numbers", &[], ListOptions::paginated())
        .unwrap();
    let ListResult::Paginated(list) = result else {
        panic!("expected a paginated list");
    };
    assert_eq!(list.is_empty(), None);

    let results: Vec<_> = list.collect();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap(), &json!(1));
    match &results[1] {
        Err(GitlabError::Http { status, message }) => {
            assert_eq!(*status, 500);
            assert_eq!(message, "boom");
        }
        other => panic!("expected an HTTP error, got {other:?}"),
    }
}

#[test]
fn test_dot_segments_are_refused() {
    let fx = Fixture::start();
    let err = fx
        .client()
        .http_get("/projects/1/repository/files/..", &[])
        .unwrap_err();
    assert!(matches!(err, GitlabError::InvalidUrl(_)));
}

#[test]
fn test_token_auth() {
    let fx = Fixture::start();
    fx.mount(
        Mock::given(method("GET"))
            .and(path("/api/v4/user"))
            .respond_with(json_response(r#"{"id": 1, "username": "username"}"#)),
    );

    let user = fx.client().auth().unwrap();
    assert_eq!(user.id, 1);
    assert_eq!(user.username, "username");
}
