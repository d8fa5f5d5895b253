//! URL construction and path-segment escaping.
//!
//! GitLab accepts identifiers such as `group/project` in place of numeric
//! ids, but only when the slash is percent-encoded so the whole identifier
//! stays a single path segment.

use serde_json::{Map, Value};
use url::Url;

use crate::error::{GitlabError, Result};

/// Join `path` to the API root unless it is already an absolute URL.
///
/// Absolute URLs are returned unchanged; they are expected to point below
/// the configured server (pagination `Link` targets, for instance).
pub fn build_url(api_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else {
        format!("{api_url}{path}")
    }
}

/// Escape `/` in string values so they survive as one path segment.
///
/// Objects are transformed entry by entry, but only their string values are
/// touched. Any other value is returned as is.
pub fn sanitize(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.replace('/', "%2F")),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| match v {
                    Value::String(s) => (k, Value::String(s.replace('/', "%2F"))),
                    other => (k, other),
                })
                .collect(),
        ),
        other => other,
    }
}

/// Encode a resource identifier for use as a path segment.
pub fn clean_str_id(id: &str) -> String {
    id.replace('/', "%2F").replace('#', "%23")
}

/// Escape every `.` in the path component of `url` as `%2E`.
///
/// Proxies in front of GitLab may collapse `.` and `..` segments before the
/// request reaches the server. Only the path is rewritten. `url::Url` is not
/// usable here: parsing already normalizes dot segments.
pub fn sanitized_url(url: &str) -> String {
    let (path_start, path_end) = path_bounds(url);
    format!(
        "{}{}{}",
        &url[..path_start],
        url[path_start..path_end].replace('.', "%2E"),
        &url[path_end..]
    )
}

/// Sanitize `url` and parse it into the URL actually sent.
///
/// A path segment made only of dots cannot be sent: URL parsers resolve
/// `%2E` and `%2E%2E` segments like `.` and `..`, so the request would reach
/// another resource. Such paths are rejected with
/// [`GitlabError::InvalidUrl`].
pub fn request_url(url: &str) -> Result<Url> {
    let sanitized = sanitized_url(url);
    let (path_start, path_end) = path_bounds(&sanitized);
    if sanitized[path_start..path_end]
        .split(['/', '\\'])
        .any(is_dot_segment)
    {
        return Err(GitlabError::InvalidUrl(format!(
            "{url}: path segments made only of dots are not supported"
        )));
    }
    Url::parse(&sanitized).map_err(|e| GitlabError::InvalidUrl(format!("{url}: {e}")))
}

/// Byte range of the path component of `url`.
fn path_bounds(url: &str) -> (usize, usize) {
    let path_start = match url.find("://") {
        Some(scheme_end) => {
            let authority_start = scheme_end + 3;
            url[authority_start..]
                .find(['/', '?', '#'])
                .map_or(url.len(), |offset| authority_start + offset)
        }
        None => 0,
    };
    let path_end = url[path_start..]
        .find(['?', '#'])
        .map_or(url.len(), |offset| path_start + offset);
    (path_start, path_end)
}

fn is_dot_segment(segment: &str) -> bool {
    matches!(
        segment.to_ascii_uppercase().as_str(),
        "." | ".." | "%2E" | "%2E%2E" | ".%2E" | "%2E."
    )
}

/// Flatten a JSON object into query pairs, appending to `dest`.
///
/// Nested objects become `key[sub]` entries (`custom_attributes[foo]=bar`),
/// arrays become repeated keys and `null` values are skipped.
pub fn copy_dict(dest: &mut Vec<(String, String)>, src: &Map<String, Value>) {
    for (key, value) in src {
        match value {
            Value::Object(inner) => {
                for (inner_key, inner_value) in inner {
                    if let Some(v) = query_value(inner_value) {
                        dest.push((format!("{key}[{inner_key}]"), v));
                    }
                }
            }
            Value::Array(items) => {
                dest.extend(
                    items
                        .iter()
                        .filter_map(query_value)
                        .map(|v| (key.clone(), v)),
                );
            }
            other => {
                if let Some(v) = query_value(other) {
                    dest.push((key.clone(), v));
                }
            }
        }
    }
}

/// Drop `null` entries from a JSON object.
pub fn remove_none(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter().filter(|(_, v)| !v.is_null()).collect()
}

fn query_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}
