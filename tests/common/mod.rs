#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use eventgate::dispatch::DispatchSettings;
use eventgate::emit::{Clock, EmitError, EmitSink, Record};
use eventgate::{Config, Dispatcher, Server};

pub const NOW: i64 = 1_700_000_000;

#[derive(Debug, Clone, PartialEq)]
pub struct Emitted {
    pub tag: String,
    pub time: i64,
    pub record: Record,
}

/// Keeps every emitted record; optionally fails once `fail_after` records
/// have been accepted.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Emitted>>,
    fail_after: Option<usize>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_after(n: usize) -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            fail_after: Some(n),
        })
    }

    pub fn events(&self) -> Vec<Emitted> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

impl EmitSink for RecordingSink {
    fn emit(&self, tag: &str, time: i64, record: Record) -> Result<(), EmitError> {
        let mut events = self.events.lock().unwrap();
        if self.fail_after.is_some_and(|n| events.len() >= n) {
            return Err(EmitError::new("buffer full"));
        }
        events.push(Emitted {
            tag: tag.to_string(),
            time,
            record,
        });
        Ok(())
    }
}

pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now(&self) -> i64 {
        self.0
    }
}

pub fn record(json: serde_json::Value) -> Record {
    match json {
        serde_json::Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

pub fn dispatcher(settings: DispatchSettings, sink: &Arc<RecordingSink>) -> Dispatcher {
    Dispatcher::new(settings, Arc::new(FixedClock(NOW)), sink.clone())
}

/// Loopback config with fast ticks, suitable for tests.
pub fn test_config() -> Config {
    Config {
        bind: "127.0.0.1".to_string(),
        port: 0,
        tick_interval_ms: 50,
        ..Config::default()
    }
}

pub fn start_server(cfg: &Config, sink: &Arc<RecordingSink>) -> Server {
    let dispatcher = Dispatcher::from_config(cfg, Arc::new(FixedClock(NOW)), sink.clone());
    Server::start(cfg, dispatcher).expect("server should start")
}

pub fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream
}

/// Sends raw bytes and reads until the server closes the connection.
pub fn roundtrip(addr: SocketAddr, request: &[u8]) -> String {
    let mut stream = connect(addr);
    stream.write_all(request).unwrap();
    read_all(&mut stream)
}

pub fn read_all(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let _ = stream.read_to_end(&mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

pub fn post(path: &str, headers: &[(&str, &str)], body: &str) -> Vec<u8> {
    let mut req = format!("POST {path} HTTP/1.1\r\nHost: localhost\r\n");
    for (k, v) in headers {
        req.push_str(&format!("{k}: {v}\r\n"));
    }
    req.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));
    req.push_str(body);
    req.into_bytes()
}

pub fn form_post(path: &str, body: &str) -> Vec<u8> {
    post(
        path,
        &[("Content-Type", "application/x-www-form-urlencoded")],
        body,
    )
}

pub fn status_line(response: &str) -> &str {
    response.lines().next().unwrap_or("")
}
