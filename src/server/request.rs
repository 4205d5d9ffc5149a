use std::collections::HashMap;
use std::rc::Rc;

use http::Uri;

/// The inbound request as the pipeline sees it.
///
/// Adapters translate a platform request into this trait; filters may wrap
/// an existing request in a decorator and rebind it in the scope.
pub trait Request {
    fn method(&self) -> &str;
    /// Request path with the query string stripped.
    fn path(&self) -> &str;
    /// Header value by name, case-insensitive.
    fn header(&self, name: &str) -> Option<&str>;
    fn raw_body(&self) -> &[u8];
    fn is_secure_transport(&self) -> bool;

    /// Raw query string without the leading `?`.
    fn query_string(&self) -> Option<&str> {
        None
    }

    /// Decoded query parameter; the last occurrence wins.
    fn query_param(&self, name: &str) -> Option<String> {
        let query = self.query_string()?;
        url::form_urlencoded::parse(query.as_bytes())
            .filter(|(k, _)| k == name)
            .last()
            .map(|(_, v)| v.into_owned())
    }
}

/// Request handle bound into the scope as `request`.
pub type SharedRequest = Rc<dyn Request>;

/// In-memory [`Request`], used by adapters and tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryRequest {
    method: String,
    path: String,
    query: Option<String>,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    secure: bool,
}

impl MemoryRequest {
    /// Build a request from a method and a request target such as
    /// `/users?limit=10`.
    pub fn new(method: impl Into<String>, target: &str) -> Self {
        let (path, query) = split_target(target);
        Self {
            method: method.into(),
            path,
            query,
            ..Self::default()
        }
    }

    pub fn get(target: &str) -> Self {
        Self::new("GET", target)
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Parsed cookies from the `Cookie` header.
    pub fn cookies(&self) -> HashMap<String, String> {
        self.header("cookie")
            .map(|c| {
                c.split(';')
                    .filter_map(|pair| {
                        let mut parts = pair.trim().splitn(2, '=');
                        let name = parts.next()?.trim().to_string();
                        if name.is_empty() {
                            return None;
                        }
                        let value = parts.next().unwrap_or("").trim().to_string();
                        Some((name, value))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn into_shared(self) -> SharedRequest {
        Rc::new(self)
    }
}

impl Request for MemoryRequest {
    fn method(&self) -> &str {
        &self.method
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn raw_body(&self) -> &[u8] {
        &self.body
    }

    fn is_secure_transport(&self) -> bool {
        self.secure
    }

    fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }
}

/// Split a request target into path and query string.
///
/// Absolute-form targets (`http://host/path?q`) are reduced to their path.
fn split_target(target: &str) -> (String, Option<String>) {
    if let Ok(uri) = target.parse::<Uri>() {
        let path = match uri.path() {
            "" => "/".to_string(),
            p => p.to_string(),
        };
        return (path, uri.query().map(str::to_string));
    }
    match target.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (target.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_is_stripped_from_path() {
        let req = MemoryRequest::get("/users?limit=10&offset=20&limit=5");
        assert_eq!(req.path(), "/users");
        assert_eq!(req.query_param("limit").as_deref(), Some("5"));
        assert_eq!(req.query_param("offset").as_deref(), Some("20"));
        assert_eq!(req.query_param("missing"), None);
    }

    #[test]
    fn test_absolute_form_target() {
        let req = MemoryRequest::get("http://example.com/a/b?x=1");
        assert_eq!(req.path(), "/a/b");
        assert_eq!(req.query_string(), Some("x=1"));
    }

    #[test]
    fn test_headers_are_case_insensitive() {
        let req = MemoryRequest::get("/").with_header("X-Api-Key", "k");
        assert_eq!(req.header("x-api-key"), Some("k"));
    }

    #[test]
    fn test_cookies() {
        let req = MemoryRequest::get("/").with_header("Cookie", "a=1; b = two ;=bad");
        let cookies = req.cookies();
        assert_eq!(cookies.get("a").map(String::as_str), Some("1"));
        assert_eq!(cookies.get("b").map(String::as_str), Some("two"));
        assert_eq!(cookies.len(), 2);
    }
}
