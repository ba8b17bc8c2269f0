use bytes::Bytes;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};

/// HTTP request methods.
///
/// Any of these may carry an event batch; POST is the convention but is not
/// enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Create or submit data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// DELETE - Delete a resource
    DELETE,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// OPTIONS - Describe communication options
    OPTIONS,
    /// PATCH - Partial modification of a resource
    PATCH,
}

impl Method {
    /// Parses an HTTP method from a string.
    ///
    /// # Example
    ///
    /// ```
    /// # use eventgate::http::request::Method;
    /// assert_eq!(Method::from_str("POST"), Some(Method::POST));
    /// assert_eq!(Method::from_str("post"), None);
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            "PUT" => Some(Method::PUT),
            "DELETE" => Some(Method::DELETE),
            "HEAD" => Some(Method::HEAD),
            "OPTIONS" => Some(Method::OPTIONS),
            "PATCH" => Some(Method::PATCH),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
        }
    }
}

fn find_header<'a>(headers: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_str())
}

/// Request line and headers, available once the header block is complete.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    /// Raw request target, path plus optional query string.
    pub target: String,
    /// HTTP version (`"HTTP/1.0"` or `"HTTP/1.1"`)
    pub version: String,
    pub headers: HashMap<String, String>,
}

impl RequestHead {
    /// Retrieves a header value by name, ignoring ASCII case.
    pub fn header(&self, key: &str) -> Option<&str> {
        find_header(&self.headers, key)
    }

    pub fn path(&self) -> &str {
        self.target
            .split_once('?')
            .map_or(self.target.as_str(), |(path, _)| path)
    }

    pub fn query(&self) -> &str {
        self.target.split_once('?').map_or("", |(_, query)| query)
    }

    /// Declared body size. `Ok(None)` when the header is absent.
    pub fn content_length(&self) -> Result<Option<usize>, std::num::ParseIntError> {
        self.header("Content-Length")
            .map(|v| v.trim().parse())
            .transpose()
    }

    pub fn content_type(&self) -> &str {
        self.header("Content-Type").unwrap_or("")
    }

    pub fn is_chunked(&self) -> bool {
        self.header("Transfer-Encoding")
            .map(|v| {
                v.rsplit(',')
                    .next()
                    .is_some_and(|last| last.trim().eq_ignore_ascii_case("chunked"))
            })
            .unwrap_or(false)
    }

    /// Keep-alive as negotiated by HTTP/1.x rules.
    ///
    /// HTTP/1.1 persists unless `Connection: close`; HTTP/1.0 only persists
    /// with `Connection: keep-alive`.
    pub fn keep_alive(&self) -> bool {
        let connection = self.header("Connection").unwrap_or("");
        let has = |token: &str| {
            connection
                .split(',')
                .any(|t| t.trim().eq_ignore_ascii_case(token))
        };
        if self.version == "HTTP/1.1" {
            !has("close")
        } else {
            has("keep-alive")
        }
    }
}

/// A fully received request, ready for dispatch.
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    pub method: Method,
    /// Request path without the query string.
    pub path: String,
    /// Query, form and multipart parameters, keys unique.
    pub params: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
    pub content_type: String,
    pub remote_addr: IpAddr,
    /// Reverse DNS name of the peer, when it was resolved.
    pub remote_host: Option<String>,
}

impl ParsedRequest {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(|v| v.as_str())
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        find_header(&self.headers, key)
    }
}

/// Builder for constructing ParsedRequest objects.
pub struct RequestBuilder {
    method: Method,
    path: Option<String>,
    params: HashMap<String, String>,
    headers: HashMap<String, String>,
    body: Bytes,
    content_type: String,
    remote_addr: IpAddr,
    remote_host: Option<String>,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            method: Method::POST,
            path: None,
            params: HashMap::new(),
            headers: HashMap::new(),
            body: Bytes::new(),
            content_type: String::new(),
            remote_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            remote_host: None,
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn remote_addr(mut self, addr: IpAddr) -> Self {
        self.remote_addr = addr;
        self
    }

    pub fn remote_host(mut self, host: impl Into<String>) -> Self {
        self.remote_host = Some(host.into());
        self
    }

    pub fn build(self) -> Result<ParsedRequest, &'static str> {
        Ok(ParsedRequest {
            method: self.method,
            path: self.path.ok_or("path missing")?,
            params: self.params,
            headers: self.headers,
            body: self.body,
            content_type: self.content_type,
            remote_addr: self.remote_addr,
            remote_host: self.remote_host,
        })
    }
}
