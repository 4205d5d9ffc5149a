use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

/// Raised when a handler touches headers or status after they went out.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseError {
    #[error("headers already sent, cannot change `{what}`")]
    HeadersSent { what: String },
}

/// The outbound response as the pipeline sees it.
///
/// Header and status mutations after [`Response::headers_sent`] fail with
/// [`ResponseError::HeadersSent`] instead of being dropped silently.
pub trait Response {
    fn set_status(&mut self, code: u16) -> Result<(), ResponseError>;
    /// Add a header line, keeping existing ones with the same name.
    fn add_header(&mut self, name: &str, value: &str) -> Result<(), ResponseError>;
    /// Replace every header line with the same name.
    fn set_header(&mut self, name: &str, value: &str) -> Result<(), ResponseError>;
    fn remove_header(&mut self, name: &str) -> Result<(), ResponseError>;
    fn append_body(&mut self, bytes: &[u8]);
    fn headers_sent(&self) -> bool;

    fn status(&self) -> u16;
    /// First header value with this name, case-insensitive.
    fn header(&self, name: &str) -> Option<&str>;
    fn headers(&self) -> Vec<(String, String)>;
    fn body(&self) -> &[u8];

    /// Roll back status, headers and body. Only the body is cleared once
    /// headers were sent.
    fn clear(&mut self);
}

/// Response handle bound into the scope as `response`.
pub type SharedResponse = Rc<RefCell<dyn Response>>;

/// Reason phrase for the status codes the framework emits itself.
pub fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => http::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown"),
    }
}

/// In-memory [`Response`] that buffers everything until an adapter flushes it.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    sent: bool,
}

impl Default for BufferedResponse {
    fn default() -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: Vec::new(),
            sent: false,
        }
    }
}

impl BufferedResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark headers as flushed; later header mutations fail.
    pub fn mark_sent(&mut self) {
        self.sent = true;
    }

    pub fn into_shared(self) -> SharedResponse {
        Rc::new(RefCell::new(self))
    }

    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    fn guard(&self, what: &str) -> Result<(), ResponseError> {
        if self.sent {
            return Err(ResponseError::HeadersSent {
                what: what.to_string(),
            });
        }
        Ok(())
    }
}

impl Response for BufferedResponse {
    fn set_status(&mut self, code: u16) -> Result<(), ResponseError> {
        self.guard("status")?;
        self.status = code;
        Ok(())
    }

    fn add_header(&mut self, name: &str, value: &str) -> Result<(), ResponseError> {
        self.guard(name)?;
        self.headers.push((name.to_string(), value.to_string()));
        Ok(())
    }

    fn set_header(&mut self, name: &str, value: &str) -> Result<(), ResponseError> {
        self.guard(name)?;
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
        Ok(())
    }

    fn remove_header(&mut self, name: &str) -> Result<(), ResponseError> {
        self.guard(name)?;
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        Ok(())
    }

    fn append_body(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
    }

    fn headers_sent(&self) -> bool {
        self.sent
    }

    fn status(&self) -> u16 {
        self.status
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn headers(&self) -> Vec<(String, String)> {
        self.headers.clone()
    }

    fn body(&self) -> &[u8] {
        &self.body
    }

    fn clear(&mut self) {
        self.body.clear();
        if !self.sent {
            self.status = 200;
            self.headers.clear();
        }
    }
}
