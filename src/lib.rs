//! Minum: a small, self-contained HTTP/1.1 application server.
//!
//! One coroutine per connection, blocking-style socket I/O, strictly
//! sequential request handling per connection. Ships with a preloading
//! static-asset cache, an exact-match handler registry, and an embedded
//! intrusion detector (the brig) that jails clients probing for
//! vulnerabilities.

pub mod brig;
pub mod config;
pub mod dispatcher;
pub mod http;
pub mod ids;
pub mod io;
pub mod registry;
pub mod server;
pub mod static_files;
pub mod util;

pub use brig::TheBrig;
pub use config::ServerConfig;
pub use dispatcher::HttpDispatcher;
pub use http::{
    Body, BodyProcessor, Headers, HttpVersion, Method, MultipartPart, ProtocolError, Request,
    Response, StartLine, StatusCode,
};
pub use io::{SocketWrapper, TcpSocketWrapper};
pub use registry::{Handler, HandlerRegistry};
pub use server::{Server, ServerHandle};
pub use static_files::StaticFilesCache;
