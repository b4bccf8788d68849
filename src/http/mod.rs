//! # HTTP Message Layer
//!
//! Parsing and shaping of HTTP/1.1 messages: the start line, the header
//! block, the body strategies, and the response value handlers produce.
//!
//! ## Overview
//!
//! A request travels through these types in order:
//!
//! ```text
//! raw line  → StartLine (method, path, version)
//! raw lines → Headers   (ordered pairs, case-insensitive lookup)
//! raw bytes → Body      (fixed / chunked / urlencoded / multipart)
//!           → Request   (the three above + remote address)
//! handler   → Response  (status + extra headers + bytes)
//! ```
//!
//! Everything here is transport-agnostic: the parsers read through
//! [`crate::io::LineReader`] over any `Read`, which is what makes the
//! dispatcher testable against in-memory sockets.

pub mod body;
pub mod error;
pub mod headers;
pub mod method;
pub mod request;
pub mod response;
pub mod start_line;

pub use body::{Body, BodyProcessor, MultipartPart};
pub use error::ProtocolError;
pub use headers::{HeaderLimits, Headers};
pub use method::Method;
pub use request::Request;
pub use response::{Response, StatusCode};
pub use start_line::{HttpVersion, PathDetails, StartLine};
