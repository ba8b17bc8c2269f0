//! Error taxonomy for request handling.
//!
//! Every variant is contained to the connection or request that raised it;
//! only failures of the reactor loop itself end the server.

use crate::emit::EmitError;
use crate::http::parser::ParseError;
use crate::http::response::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed HTTP framing. The connection is closed without a response.
    #[error("malformed request framing: {0}")]
    Protocol(#[from] ParseError),

    #[error("request body exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },

    #[error("unsupported expectation: {0}")]
    ExpectationFailed(String),

    /// Missing or undecodable `json`, bad `time`, broken form encoding.
    #[error("{0}")]
    MalformedRequest(String),

    #[error("failed to emit record: {0}")]
    Emission(#[from] EmitError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Protocol(_) | Error::MalformedRequest(_) => StatusCode::BadRequest,
            Error::PayloadTooLarge { .. } => StatusCode::PayloadTooLarge,
            Error::ExpectationFailed(_) => StatusCode::ExpectationFailed,
            Error::Emission(_) | Error::Io(_) => StatusCode::InternalServerError,
        }
    }
}
