use crate::error::Error;
use std::collections::HashMap;

/// HTTP status codes the ingestion endpoint produces.
///
/// - `Continue` (100): Provisional answer to `Expect: 100-continue`
/// - `Ok` (200): Every record was emitted
/// - `BadRequest` (400): Missing or undecodable parameters
/// - `PayloadTooLarge` (413): Body exceeds the configured limit
/// - `ExpectationFailed` (417): Unsupported `Expect` value
/// - `InternalServerError` (500): The downstream sink rejected a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 100 Continue
    Continue,
    /// 200 OK
    Ok,
    /// 400 Bad Request
    BadRequest,
    /// 413 Request Entity Too Large
    PayloadTooLarge,
    /// 417 Expectation Failed
    ExpectationFailed,
    /// 500 Internal Server Error
    InternalServerError,
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use eventgate::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::PayloadTooLarge.as_u16(), 413);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Continue => 100,
            StatusCode::Ok => 200,
            StatusCode::BadRequest => 400,
            StatusCode::PayloadTooLarge => 413,
            StatusCode::ExpectationFailed => 417,
            StatusCode::InternalServerError => 500,
        }
    }

    /// Returns the standard HTTP reason phrase for this status code.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Continue => "Continue",
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::PayloadTooLarge => "Request Entity Too Large",
            StatusCode::ExpectationFailed => "Expectation Failed",
            StatusCode::InternalServerError => "Internal Server Error",
        }
    }
}

/// Represents a complete HTTP response ready to be sent to a client.
#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// Builder for constructing HTTP responses in a fluent style.
///
/// # Example
///
/// ```ignore
/// let response = ResponseBuilder::new(StatusCode::Ok)
///     .header("X-Batch", "42")
///     .build();
/// ```
pub struct ResponseBuilder {
    status: StatusCode,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl ResponseBuilder {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    /// Adds or replaces a header.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Builds the final Response.
    ///
    /// Fills in `Content-Length` from the body and `Content-Type:
    /// text/plain` unless either was set explicitly (in any letter case).
    pub fn build(mut self) -> Response {
        if !has_header(&self.headers, "Content-Length") {
            self.headers
                .insert("Content-Length".to_string(), self.body.len().to_string());
        }
        if !has_header(&self.headers, "Content-Type") {
            self.headers
                .insert("Content-Type".to_string(), "text/plain".to_string());
        }

        Response {
            status: self.status,
            headers: self.headers,
            body: self.body,
        }
    }
}

fn has_header(headers: &HashMap<String, String>, key: &str) -> bool {
    headers.keys().any(|k| k.eq_ignore_ascii_case(key))
}

impl Response {
    /// 200 OK with an empty body.
    pub fn ok() -> Self {
        ResponseBuilder::new(StatusCode::Ok).build()
    }

    /// Plain-text response describing `err`, with its mapped status.
    pub fn from_error(err: &Error) -> Self {
        Self::with_detail(err.status(), err)
    }

    /// Body of the form `"<code> <reason>\n<detail>\n"`.
    fn with_detail(status: StatusCode, detail: impl std::fmt::Display) -> Self {
        let body = format!(
            "{} {}\n{}\n",
            status.as_u16(),
            status.reason_phrase(),
            detail
        );
        ResponseBuilder::new(status).body(body.into_bytes()).build()
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}
