//! HTTP/1.x protocol implementation.
//!
//! This module implements the ingestion side of HTTP/1.0 and HTTP/1.1: just
//! enough of the protocol to accept event batches from arbitrary clients.
//!
//! # Architecture
//!
//! - **`connection`**: per-connection state machine driving parse, dispatch and write
//! - **`parser`**: incremental request framing parser emitting structural events
//! - **`params`**: query string, form and multipart parameter decoding
//! - **`request`**: request head and fully parsed request types
//! - **`response`**: HTTP response representation with builder pattern
//! - **`writer`**: serializes and writes responses to the client
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │    Start    │ ← Fresh parser, empty body buffer
//!        └──────┬──────┘
//!               │ first bytes
//!               ▼
//!        ┌──────────────────┐
//!        │  HeadersParsing  │
//!        └──────┬───────────┘
//!               │ headers complete
//!               ▼
//!        ┌──────────────────┐
//!        │  ExpectHandling  │ ← 100 Continue / 413 / 417
//!        └──────┬───────────┘
//!               ▼
//!        ┌──────────────────┐
//!        │ BodyAccumulating │ ← bounded by body_size_limit (413)
//!        └──────┬───────────┘
//!               │ message complete
//!               ▼
//!        ┌──────────────────┐
//!        │ MessageComplete  │ ← params decoded, dispatcher called
//!        └──────┬───────────┘
//!               ▼
//!        ┌──────────────────┐
//!        │     Respond      │
//!        └──────┬───────────┘
//!               ├─ keep-alive (Negotiate policy) → AwaitingNext
//!               └─ otherwise → Closed
//! ```

pub mod connection;
pub mod params;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
