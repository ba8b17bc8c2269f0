//! eventgate - HTTP event ingestion endpoint
//!
//! Core library: HTTP/1.x connection handling, request dispatch and the
//! single-threaded reactor that ties them together.

pub mod config;
pub mod dispatch;
pub mod emit;
pub mod error;
pub mod http;
pub mod server;

pub use config::Config;
pub use dispatch::Dispatcher;
pub use emit::{Clock, EmitError, EmitSink, Record};
pub use error::Error;
pub use server::Server;
