use bytes::{Bytes, BytesMut};
use std::net::IpAddr;
use std::rc::Rc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::config::{Config, ConnectionPolicy};
use crate::dispatch::Dispatcher;
use crate::error::Error;
use crate::http::params::{BodyEncoding, Params, parse_multipart, parse_query};
use crate::http::parser::{ParseEvent, RequestParser};
use crate::http::request::{ParsedRequest, RequestHead};
use crate::http::response::Response;
use crate::http::writer::{CONTINUE_RESPONSE, ResponseWriter};
use crate::server::reaper::Registration;

const READ_CHUNK: usize = 8192;

/// Per-connection limits and policy.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub body_size_limit: usize,
    pub policy: ConnectionPolicy,
}

impl From<&Config> for ConnectionSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            body_size_limit: cfg.body_size_limit,
            policy: cfg.connection_policy,
        }
    }
}

/// The remote end of a connection.
#[derive(Debug, Clone)]
pub struct Peer {
    pub addr: IpAddr,
    pub host: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Start,
    HeadersParsing,
    ExpectHandling,
    BodyAccumulating,
    MessageComplete,
    Respond,
    AwaitingNext,
    Closed,
}

/// Something to put on the wire.
enum Outgoing {
    /// Provisional `100 Continue`; the exchange carries on.
    Continue,
    Final(Response),
}

pub struct Connection<S> {
    stream: S,
    peer: Peer,
    settings: ConnectionSettings,
    dispatcher: Rc<Dispatcher>,
    parser: RequestParser,
    buffer: BytesMut,
    state: ConnectionState,
    head: Option<RequestHead>,
    body: BytesMut,
    content_type: String,
    keep_alive: bool,
    closing: bool,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, peer: Peer, settings: ConnectionSettings, dispatcher: Rc<Dispatcher>) -> Self {
        Self {
            stream,
            peer,
            settings,
            dispatcher,
            parser: RequestParser::new(),
            buffer: BytesMut::with_capacity(READ_CHUNK),
            state: ConnectionState::Start,
            head: None,
            body: BytesMut::new(),
            content_type: String::new(),
            keep_alive: false,
            closing: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }

    /// Serves requests until the peer hangs up, the policy closes the
    /// connection, a fault occurs, or `close` fires.
    ///
    /// The stream is shut down on every exit path.
    pub async fn run(
        &mut self,
        registration: &Registration,
        mut close: oneshot::Receiver<()>,
    ) -> Result<(), Error> {
        let result = self.serve(registration, &mut close).await;
        self.state = ConnectionState::Closed;
        let _ = self.stream.shutdown().await;
        result
    }

    async fn serve(
        &mut self,
        registration: &Registration,
        close: &mut oneshot::Receiver<()>,
    ) -> Result<(), Error> {
        loop {
            self.buffer.reserve(READ_CHUNK);
            let read = tokio::select! {
                _ = &mut *close => {
                    debug!(peer = %self.peer.addr, conn = %registration.id(), "connection closed by reaper");
                    return Ok(());
                }
                read = self.stream.read_buf(&mut self.buffer) => read?,
            };
            if read == 0 {
                trace!(peer = %self.peer.addr, "peer closed connection");
                return Ok(());
            }
            registration.touch();

            // A peer that stops reading stalls the write; the reaper still applies.
            tokio::select! {
                _ = &mut *close => {
                    debug!(peer = %self.peer.addr, conn = %registration.id(), "connection closed by reaper while responding");
                    return Ok(());
                }
                processed = self.process() => processed?,
            }
            if self.state == ConnectionState::Closed {
                return Ok(());
            }
        }
    }

    /// Drains every complete parser event from the read buffer.
    async fn process(&mut self) -> Result<(), Error> {
        loop {
            if matches!(self.state, ConnectionState::Start | ConnectionState::AwaitingNext)
                && !self.buffer.is_empty()
            {
                self.state = ConnectionState::HeadersParsing;
            }

            let Some(event) = self.parser.next_event(&mut self.buffer)? else {
                return Ok(());
            };

            let outgoing = match event {
                ParseEvent::HeadersComplete(head) => self.on_headers_complete(head),
                ParseEvent::Body(chunk) => self.on_body(&chunk),
                ParseEvent::MessageComplete => self.on_message_complete(),
            };

            if let Some(outgoing) = outgoing {
                self.send(outgoing).await?;
            }

            match self.state {
                ConnectionState::Closed => return Ok(()),
                ConnectionState::AwaitingNext => self.reset_exchange(),
                _ => {}
            }
        }
    }

    fn on_headers_complete(&mut self, head: RequestHead) -> Option<Outgoing> {
        self.state = ConnectionState::ExpectHandling;
        self.content_type = head.content_type().to_string();
        self.keep_alive = match self.settings.policy {
            ConnectionPolicy::AlwaysClose => false,
            ConnectionPolicy::Negotiate => head.keep_alive(),
        };

        debug!(
            peer = %self.peer.addr,
            method = head.method.as_str(),
            target = %head.target,
            "request headers received"
        );

        let limit = self.settings.body_size_limit;
        let outgoing = match head.header("Expect") {
            None => None,
            Some(expect) if expect.trim().eq_ignore_ascii_case("100-continue") => {
                let declared = head.content_length().ok().flatten();
                if declared.is_none_or(|size| size <= limit) {
                    Some(Outgoing::Continue)
                } else {
                    Some(self.reject(Error::PayloadTooLarge { limit }))
                }
            }
            Some(other) => Some(self.reject(Error::ExpectationFailed(other.to_string()))),
        };

        self.head = Some(head);
        if !self.closing {
            self.state = ConnectionState::BodyAccumulating;
        }
        outgoing
    }

    fn on_body(&mut self, chunk: &[u8]) -> Option<Outgoing> {
        if self.closing {
            return None;
        }
        let limit = self.settings.body_size_limit;
        if self.body.len() + chunk.len() > limit {
            return Some(self.reject(Error::PayloadTooLarge { limit }));
        }
        self.body.extend_from_slice(chunk);
        None
    }

    fn on_message_complete(&mut self) -> Option<Outgoing> {
        if self.closing {
            return None;
        }
        self.state = ConnectionState::MessageComplete;

        let head = self.head.take()?;
        let body = std::mem::take(&mut self.body).freeze();

        let params = match build_params(&head, &self.content_type, &body) {
            Ok(params) => params,
            Err(e) => return Some(Outgoing::Final(Response::from_error(&e))),
        };

        let request = ParsedRequest {
            method: head.method,
            path: head.path().to_string(),
            params,
            headers: head.headers,
            body,
            content_type: std::mem::take(&mut self.content_type),
            remote_addr: self.peer.addr,
            remote_host: self.peer.host.clone(),
        };

        Some(Outgoing::Final(self.dispatcher.dispatch(&request)))
    }

    /// Marks the connection closing and builds the error response.
    fn reject(&mut self, err: Error) -> Outgoing {
        debug!(peer = %self.peer.addr, error = %err, "rejecting request");
        self.closing = true;
        Outgoing::Final(Response::from_error(&err))
    }

    async fn send(&mut self, outgoing: Outgoing) -> Result<(), Error> {
        match outgoing {
            Outgoing::Continue => {
                ResponseWriter::from_bytes(CONTINUE_RESPONSE.to_vec())
                    .write_to_stream(&mut self.stream)
                    .await?;
            }
            Outgoing::Final(mut response) => {
                self.state = ConnectionState::Respond;
                let keep_alive = self.keep_alive && !self.closing;
                if keep_alive {
                    response
                        .headers
                        .insert("Connection".to_string(), "keep-alive".to_string());
                }

                ResponseWriter::new(&response)
                    .write_to_stream(&mut self.stream)
                    .await?;

                debug!(
                    peer = %self.peer.addr,
                    status = response.status.as_u16(),
                    keep_alive,
                    "response sent"
                );
                self.state = if keep_alive {
                    ConnectionState::AwaitingNext
                } else {
                    ConnectionState::Closed
                };
            }
        }
        Ok(())
    }

    fn reset_exchange(&mut self) {
        self.parser.reset();
        self.head = None;
        self.body.clear();
        self.content_type.clear();
        self.keep_alive = false;
        self.state = ConnectionState::Start;
    }
}

/// Collects query parameters plus whatever the body contributes.
///
/// Body parameters override query parameters of the same name.
pub fn build_params(head: &RequestHead, content_type: &str, body: &Bytes) -> Result<Params, Error> {
    let mut params = parse_query(head.query().as_bytes());

    match BodyEncoding::from_content_type(content_type) {
        BodyEncoding::FormUrlEncoded => params.extend(parse_query(body)),
        BodyEncoding::Multipart { boundary } => {
            let fields = parse_multipart(body, &boundary)
                .map_err(|e| Error::MalformedRequest(e.to_string()))?;
            params.extend(fields);
        }
        BodyEncoding::Json => {
            params.insert("json".to_string(), String::from_utf8_lossy(body).into_owned());
        }
        BodyEncoding::Other => {}
    }

    Ok(params)
}
