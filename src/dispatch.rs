//! Request dispatch: turns a parsed request into tagged, timestamped records.
//!
//! Dispatch is synchronous and runs on the reactor thread. A slow sink stalls
//! every other connection for as long as it takes.

use crate::config::Config;
use crate::emit::{Clock, EmitSink, Record};
use crate::error::Error;
use crate::http::request::ParsedRequest;
use crate::http::response::Response;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Dispatch behaviour taken from [`Config`].
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub blob_fallback: bool,
    pub fallback_delimiter: String,
    pub default_tag: Option<String>,
    pub record_remote_host: bool,
    pub remote_address_key: String,
    pub remote_address_dns_key: String,
}

impl From<&Config> for DispatchSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            blob_fallback: cfg.blob_fallback,
            fallback_delimiter: cfg.fallback_delimiter.clone(),
            default_tag: cfg.default_tag.clone(),
            record_remote_host: cfg.record_remote_host,
            remote_address_key: cfg.remote_address_key.clone(),
            remote_address_dns_key: cfg.remote_address_dns_key.clone(),
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

pub struct Dispatcher {
    settings: DispatchSettings,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EmitSink>,
}

impl Dispatcher {
    pub fn new(settings: DispatchSettings, clock: Arc<dyn Clock>, sink: Arc<dyn EmitSink>) -> Self {
        Self {
            settings,
            clock,
            sink,
        }
    }

    pub fn from_config(cfg: &Config, clock: Arc<dyn Clock>, sink: Arc<dyn EmitSink>) -> Self {
        Self::new(DispatchSettings::from(cfg), clock, sink)
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Handles one request and returns the response to send.
    pub fn dispatch(&self, req: &ParsedRequest) -> Response {
        match self.try_dispatch(req) {
            Ok(()) => Response::ok(),
            Err(e) => {
                match &e {
                    Error::Emission(_) => error!(path = %req.path, error = %e, "emit failed"),
                    _ => warn!(path = %req.path, peer = %req.remote_addr, error = %e, "rejected request"),
                }
                Response::from_error(&e)
            }
        }
    }

    fn try_dispatch(&self, req: &ParsedRequest) -> Result<(), Error> {
        let tag = derive_tag(&req.path, self.settings.default_tag.as_deref());
        let records = self.extract_records(req)?;
        let time = self.resolve_time(req)?;

        debug!(tag = %tag, time, records = records.len(), "dispatching batch");

        for mut record in records {
            if self.settings.record_remote_host {
                self.enrich(&mut record, req);
            }
            self.sink.emit(&tag, time, record)?;
        }
        Ok(())
    }

    fn extract_records(&self, req: &ParsedRequest) -> Result<Vec<Record>, Error> {
        if let Some(json) = req.param("json") {
            return decode_records(json);
        }

        if self.settings.blob_fallback {
            return Ok(split_body(&req.body, &self.settings.fallback_delimiter)
                .into_iter()
                .map(|message| {
                    let mut record = Record::new();
                    record.insert("message".to_string(), Value::String(message));
                    record
                })
                .collect());
        }

        let mut keys: Vec<&str> = req.params.keys().map(String::as_str).collect();
        keys.sort_unstable();
        Err(Error::MalformedRequest(format!(
            "'json' parameter is required, got {keys:?}"
        )))
    }

    fn resolve_time(&self, req: &ParsedRequest) -> Result<i64, Error> {
        match req.param("time") {
            Some(raw) => parse_time(raw)
                .ok_or_else(|| Error::MalformedRequest(format!("invalid 'time' parameter: {raw:?}"))),
            None => Ok(self.clock.now()),
        }
    }

    fn enrich(&self, record: &mut Record, req: &ParsedRequest) {
        record.insert(
            self.settings.remote_address_key.clone(),
            Value::String(req.remote_addr.to_string()),
        );
        record.insert(
            self.settings.remote_address_dns_key.clone(),
            Value::String(req.remote_host.clone().unwrap_or_default()),
        );
    }
}

/// `/a/b` becomes `a.b`. A blank result falls back to `default_tag` if set.
pub fn derive_tag(path: &str, default_tag: Option<&str>) -> String {
    let path = path.strip_prefix('/').unwrap_or(path);
    let mut segments: Vec<&str> = path.split('/').collect();
    while segments.last().is_some_and(|s| s.is_empty()) {
        segments.pop();
    }
    let tag = segments.join(".");

    match default_tag {
        Some(default) if tag.trim().is_empty() => default.to_string(),
        _ => tag,
    }
}

/// Decodes a JSON array of objects. A lone object is a batch of one.
pub fn decode_records(json: &str) -> Result<Vec<Record>, Error> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| Error::MalformedRequest(format!("invalid 'json' parameter: {e}")))?;

    match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(record) => Ok(record),
                _ => Err(Error::MalformedRequest(format!(
                    "element {i} of 'json' is not an object"
                ))),
            })
            .collect(),
        Value::Object(record) => Ok(vec![record]),
        _ => Err(Error::MalformedRequest(
            "'json' must be an array of objects".to_string(),
        )),
    }
}

/// Integer seconds. A decimal value is truncated toward zero.
pub fn parse_time(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    raw.parse::<i64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|t| t.is_finite())
            .map(|t| t.trunc() as i64)
    })
}

/// Splits a raw body into messages, replacing invalid UTF-8 with `?`.
///
/// Trailing empty segments are dropped, so a body ending in the delimiter
/// does not produce an empty message.
pub fn split_body(body: &[u8], delimiter: &str) -> Vec<String> {
    let text = scrub_utf8(body);
    let mut messages: Vec<String> = text.split(delimiter).map(str::to_string).collect();
    while messages.last().is_some_and(|m| m.is_empty()) {
        messages.pop();
    }
    messages
}

fn scrub_utf8(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        out.push_str(chunk.valid());
        if !chunk.invalid().is_empty() {
            out.push('?');
        }
    }
    out
}
