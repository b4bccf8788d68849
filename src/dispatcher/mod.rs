//! # HTTP Connection Dispatcher
//!
//! The per-connection state machine at the heart of the server: it owns
//! one accepted socket from first byte to close and processes zero or
//! more HTTP/1.1 requests on it.
//!
//! ## State machine
//!
//! ```text
//! IDLE → READING_START → READING_HEADERS → READING_BODY → HANDLING
//!      → WRITING → (IDLE if keep-alive, else CLOSED)
//! ```
//!
//! Any parse or socket error transitions to CLOSED. The socket is shut
//! down when the request loop returns, whatever the reason; if the
//! coroutine unwinds instead, dropping the stream closes it.
//!
//! ## Request flow
//!
//! 1. Jailed clients are dropped before a single byte is read.
//! 2. The start line is read under `MAX_READ_LINE_SIZE_BYTES`; an
//!    over-long line jails the client as a vulnerability seeker.
//! 3. The endpoint is resolved: handler registry first, then the
//!    static-asset cache, then 405/404 fallbacks.
//! 4. Headers decide keep-alive (1.0 opts in, 1.1 opts out) and whether
//!    a body follows.
//! 5. The handler runs with panic recovery; a panic becomes a 500 and
//!    the connection does not survive it.
//! 6. The response is serialized with `Date`, `Server`, `Content-Length`
//!    and, when the connection will be reused, `Keep-Alive`.

use crate::brig::TheBrig;
use crate::config::ServerConfig;
use crate::http::body::{Body, BodyProcessor};
use crate::http::error::ProtocolError;
use crate::http::headers::{HeaderLimits, Headers};
use crate::http::method::Method;
use crate::http::request::Request;
use crate::http::response::{Response, StatusCode};
use crate::http::start_line::{HttpVersion, StartLine};
use crate::ids::ConnectionId;
use crate::io::socket::{LineRead, LineReader, SocketWrapper};
use crate::registry::{Handler, HandlerRegistry};
use crate::static_files::StaticFilesCache;
use chrono::{DateTime, Utc};
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, warn};

/// Resolution of a start line against the registry and static cache.
enum Endpoint {
    Handler(Arc<dyn Handler>),
    Static(Arc<Response>),
    MethodNotAllowed,
    NotFound,
}

/// The per-connection request loop, shared by every connection
/// coroutine. Cloning is cheap; all state is behind `Arc`.
#[derive(Clone)]
pub struct HttpDispatcher {
    config: Arc<ServerConfig>,
    registry: Arc<RwLock<HandlerRegistry>>,
    static_files: Arc<RwLock<StaticFilesCache>>,
    brig: Arc<TheBrig>,
    date_override: Option<DateTime<Utc>>,
}

impl HttpDispatcher {
    #[must_use]
    pub fn new(
        config: Arc<ServerConfig>,
        registry: Arc<RwLock<HandlerRegistry>>,
        static_files: Arc<RwLock<StaticFilesCache>>,
        brig: Arc<TheBrig>,
    ) -> Self {
        Self {
            config,
            registry,
            static_files,
            brig,
            date_override: None,
        }
    }

    /// Pin the `Date` header to a fixed instant, for tests that assert
    /// on exact wire bytes.
    #[must_use]
    pub fn with_date_override(mut self, date: DateTime<Utc>) -> Self {
        self.date_override = Some(date);
        self
    }

    /// Process one connection to completion. The socket is always shut
    /// down before this returns.
    pub fn handle_connection(&self, sock: &mut dyn SocketWrapper) {
        let conn_id = ConnectionId::new();
        let remote_ip = sock.remote_addr().to_string();
        let peer = sock.remote_addr_with_port().to_string();
        let jail_key = format!("{}_vuln_seeking", remote_ip);

        if self.brig.is_enabled() && self.brig.is_in_jail(&jail_key) {
            debug!(conn_id = %conn_id, remote = %peer, "closing the socket on a jailed client");
            let _ = sock.shutdown();
            return;
        }

        let mut reader = LineReader::new();
        if let Err(e) = self.request_loop(sock, &mut reader, conn_id, &remote_ip, &peer, &jail_key)
        {
            debug!(
                conn_id = %conn_id,
                remote = %peer,
                error = %e,
                "connection ended on a socket error"
            );
        }
        let _ = sock.shutdown();
    }

    fn request_loop(
        &self,
        sock: &mut dyn SocketWrapper,
        reader: &mut LineReader,
        conn_id: ConnectionId,
        remote_ip: &str,
        peer: &str,
        jail_key: &str,
    ) -> io::Result<()> {
        let max_line = self.config.max_read_line_size_bytes;
        loop {
            let request_started = Instant::now();

            let raw_start = match reader.read_line(sock, max_line)? {
                LineRead::Eof => return Ok(()),
                LineRead::TooLong => {
                    warn!(
                        conn_id = %conn_id,
                        remote = %peer,
                        "client sent more bytes than allowed for a single line. Current max: {}",
                        max_line
                    );
                    self.brig.send_to_jail(jail_key, self.jail_duration());
                    return Ok(());
                }
                LineRead::Line(line) if line.is_empty() => return Ok(()),
                LineRead::Line(line) => line,
            };
            trace!(conn_id = %conn_id, remote = %peer, raw = %raw_start, "raw start line received");

            let start_line = match StartLine::parse(&raw_start) {
                Ok(sl) if sl.method != Method::Unrecognized => sl,
                Ok(_) => {
                    debug!(conn_id = %conn_id, raw = %raw_start, "unrecognized method, returning 400");
                    self.write_response(sock, &Response::new(StatusCode::BadRequest), false, false)?;
                    return Ok(());
                }
                Err(e) => {
                    debug!(conn_id = %conn_id, error = %e, "malformed start line, returning 400");
                    self.write_response(sock, &Response::new(StatusCode::BadRequest), false, false)?;
                    return Ok(());
                }
            };
            trace!(conn_id = %conn_id, start_line = %start_line, "start line parsed");

            let endpoint = self.find_endpoint(&start_line);

            // jail a suspicious-path miss as soon as it is known, so a
            // malformed remainder of the request cannot dodge the brig
            if matches!(endpoint, Endpoint::NotFound) {
                debug!(
                    conn_id = %conn_id,
                    path = %start_line.path_details.isolated_path,
                    "requested an unregistered path, returning 404"
                );
                let vuln_seeking = self
                    .brig
                    .is_looking_for_suspicious_paths(&start_line.path_details.isolated_path);
                debug!(
                    conn_id = %conn_id,
                    remote = %remote_ip,
                    vuln_seeking,
                    "vulnerability probe check"
                );
                if vuln_seeking && self.brig.is_enabled() {
                    self.brig.send_to_jail(jail_key, self.jail_duration());
                }
            }

            let headers = match Headers::extract(reader, sock, self.header_limits()) {
                Ok(h) => h,
                Err(ProtocolError::Io(e)) => return Err(e),
                Err(e) => {
                    debug!(conn_id = %conn_id, error = %e, "rejecting header block");
                    self.write_response(sock, &Response::new(e.status()), false, false)?;
                    return Ok(());
                }
            };
            trace!(conn_id = %conn_id, header_count = headers.len(), "headers parsed");

            let mut keep_alive = match start_line.version {
                HttpVersion::OneDotZero => headers.has_keep_alive(),
                HttpVersion::OneDotOne => !headers.has_connection_close(),
            };
            trace!(conn_id = %conn_id, keep_alive, "keep-alive negotiated");

            let body = if request_has_body(&headers) {
                trace!(conn_id = %conn_id, content_type = %headers.content_type(), "reading body");
                let processor =
                    BodyProcessor::new(self.config.max_read_size_bytes, max_line);
                match processor.extract(reader, sock, &headers) {
                    Ok(b) => b,
                    Err(ProtocolError::Io(e)) => return Err(e),
                    Err(e) => {
                        debug!(conn_id = %conn_id, error = %e, "rejecting body");
                        self.write_response(sock, &Response::new(e.status()), false, false)?;
                        return Ok(());
                    }
                }
            } else {
                Body::empty()
            };

            let is_head = start_line.method == Method::Head;
            let response = match endpoint {
                Endpoint::Handler(handler) => {
                    let request = Request {
                        start_line: start_line.clone(),
                        headers,
                        body,
                        remote_addr: remote_ip.to_string(),
                    };
                    let handler_started = Instant::now();
                    match catch_unwind(AssertUnwindSafe(|| handler.handle(request))) {
                        Ok(response) => {
                            trace!(
                                conn_id = %conn_id,
                                start_line = %start_line,
                                elapsed_ms = handler_started.elapsed().as_millis() as u64,
                                "handler finished"
                            );
                            response
                        }
                        Err(panic) => {
                            error!(
                                conn_id = %conn_id,
                                start_line = %start_line,
                                panic_message = ?panic_text(&panic),
                                "handler panicked, returning 500"
                            );
                            keep_alive = false;
                            Response::new(StatusCode::InternalServerError)
                        }
                    }
                }
                Endpoint::Static(prebuilt) => (*prebuilt).clone(),
                Endpoint::MethodNotAllowed => {
                    debug!(
                        conn_id = %conn_id,
                        start_line = %start_line,
                        "path registered under a different method, returning 405"
                    );
                    Response::new(StatusCode::MethodNotAllowed)
                }
                Endpoint::NotFound => Response::new(StatusCode::NotFound),
            };

            self.write_response(sock, &response, keep_alive, is_head)?;
            trace!(
                conn_id = %conn_id,
                start_line = %start_line,
                status = response.status.code(),
                elapsed_ms = request_started.elapsed().as_millis() as u64,
                "response written"
            );

            if !keep_alive {
                return Ok(());
            }
        }
    }

    fn find_endpoint(&self, start_line: &StartLine) -> Endpoint {
        let lookup = start_line.path_details.lookup_path();
        let registry = self.registry.read().unwrap();
        if let Some(handler) = registry.find(start_line.method, &lookup) {
            return Endpoint::Handler(handler);
        }
        if matches!(start_line.method, Method::Get | Method::Head) {
            if let Some(prebuilt) = self
                .static_files
                .read()
                .unwrap()
                .get_static_response(&lookup)
            {
                return Endpoint::Static(prebuilt);
            }
        }
        if registry.any_method_matches(&lookup) {
            return Endpoint::MethodNotAllowed;
        }
        Endpoint::NotFound
    }

    /// Serialize a response onto the socket. For HEAD requests the
    /// headers (Content-Length included) describe the full body, but the
    /// body itself stays home.
    fn write_response(
        &self,
        sock: &mut dyn SocketWrapper,
        response: &Response,
        keep_alive: bool,
        is_head: bool,
    ) -> io::Result<()> {
        let date = self.date_override.unwrap_or_else(Utc::now);
        let mut head = String::with_capacity(256);
        head.push_str("HTTP/1.1 ");
        head.push_str(&response.status.code().to_string());
        head.push(' ');
        head.push_str(response.status.short_description());
        head.push_str("\r\n");
        head.push_str(&format!(
            "Date: {}\r\n",
            date.format("%a, %d %b %Y %H:%M:%S GMT")
        ));
        head.push_str("Server: minum\r\n");
        for (name, value) in &response.extra_headers {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str(&format!("Content-Length: {}\r\n", response.body.len()));
        if keep_alive {
            head.push_str(&format!(
                "Keep-Alive: timeout={}\r\n",
                self.config.keep_alive_timeout_seconds
            ));
        }
        head.push_str("\r\n");
        sock.write_all(head.as_bytes())?;
        if !is_head {
            sock.write_all(&response.body)?;
        }
        sock.flush()
    }

    fn header_limits(&self) -> HeaderLimits {
        HeaderLimits {
            max_line_bytes: self.config.max_read_line_size_bytes,
            max_count: self.config.max_headers_count,
        }
    }

    fn jail_duration(&self) -> Duration {
        Duration::from_millis(self.config.vuln_seeking_jail_duration_millis)
    }
}

/// Whether the request headers announce a body: a content type plus
/// either a positive content-length or chunked transfer encoding. An
/// empty content type means "no body" even when a length is present.
fn request_has_body(headers: &Headers) -> bool {
    if headers.content_type().is_empty() {
        return false;
    }
    headers.content_length() > 0
        || headers
            .value_by_key("transfer-encoding")
            .iter()
            .any(|v| v.eq_ignore_ascii_case("chunked"))
}

fn panic_text(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
