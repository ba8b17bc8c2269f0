//! Request parameter decoding.
//!
//! Parameters come from three places: the query string, an
//! `application/x-www-form-urlencoded` body, and a `multipart/form-data`
//! body. All of them collapse into a flat `name -> value` map.

use std::collections::HashMap;
use thiserror::Error;

pub type Params = HashMap<String, String>;

/// How a request body contributes parameters, derived from Content-Type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyEncoding {
    FormUrlEncoded,
    Multipart { boundary: String },
    /// The raw body is the `json` parameter.
    Json,
    Other,
}

impl BodyEncoding {
    pub fn from_content_type(content_type: &str) -> Self {
        let ct = content_type.trim();
        if starts_with_ignore_case(ct, "application/x-www-form-urlencoded") {
            BodyEncoding::FormUrlEncoded
        } else if starts_with_ignore_case(ct, "application/json") {
            BodyEncoding::Json
        } else if starts_with_ignore_case(ct, "multipart/form-data") {
            match parse_boundary(ct) {
                Some(boundary) => BodyEncoding::Multipart { boundary },
                None => BodyEncoding::Other,
            }
        } else {
            BodyEncoding::Other
        }
    }
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Decodes `a=1&b=2` style input. The first occurrence of a key wins.
pub fn parse_query(input: &[u8]) -> Params {
    let mut params = Params::new();
    for (key, value) in url::form_urlencoded::parse(input) {
        params
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    params
}

/// Extracts the boundary parameter from a multipart Content-Type.
///
/// Content-Type format: `multipart/form-data; boundary=----WebKitFormBoundary...`
pub fn parse_boundary(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|part| {
        let (name, value) = part.trim().split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let boundary = value.trim().trim_matches('"');
        (!boundary.is_empty()).then(|| boundary.to_string())
    })
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MultipartError {
    #[error("multipart body ended unexpectedly")]
    UnexpectedEof,
    #[error("invalid multipart format: {0}")]
    InvalidFormat(&'static str),
    #[error("multipart part without a Content-Disposition name")]
    MissingName,
}

/// Decodes every part of a `multipart/form-data` body into parameters.
///
/// File parts are treated like fields: the part's content becomes the value.
pub fn parse_multipart(body: &[u8], boundary: &str) -> Result<Params, MultipartError> {
    let delimiter = format!("--{boundary}").into_bytes();
    // Every delimiter after the first is preceded by CRLF, which belongs to it
    let mut separator = b"\r\n".to_vec();
    separator.extend_from_slice(&delimiter);
    let mut params = Params::new();

    // Skip preamble
    let mut pos = if body.starts_with(&delimiter) {
        0
    } else {
        find(body, &separator, 0).ok_or(MultipartError::UnexpectedEof)? + 2
    };

    loop {
        pos += delimiter.len();
        if body[pos..].starts_with(b"--") {
            break;
        }
        if !body[pos..].starts_with(b"\r\n") {
            return Err(MultipartError::InvalidFormat("expected CRLF after boundary"));
        }
        pos += 2;

        let headers_end = find(body, b"\r\n\r\n", pos).ok_or(MultipartError::UnexpectedEof)?;
        let headers = std::str::from_utf8(&body[pos..headers_end])
            .map_err(|_| MultipartError::InvalidFormat("part headers are not UTF-8"))?;
        let name = part_name(headers).ok_or(MultipartError::MissingName)?;
        pos = headers_end + 4;

        let data_end = find(body, &separator, pos).ok_or(MultipartError::UnexpectedEof)?;
        let value = String::from_utf8_lossy(&body[pos..data_end]).into_owned();
        params.entry(name).or_insert(value);

        pos = data_end + 2;
    }

    Ok(params)
}

fn part_name(headers: &str) -> Option<String> {
    let disposition = headers.split("\r\n").find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case("content-disposition")
            .then_some(value)
    })?;

    disposition.split(';').skip(1).find_map(|param| {
        let (key, value) = param.trim().split_once('=')?;
        (key.trim() == "name").then(|| value.trim().trim_matches('"').to_string())
    })
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}
