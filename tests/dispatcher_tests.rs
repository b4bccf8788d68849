//! Dispatcher tests over an in-memory socket: the whole request loop,
//! no network involved.

use chrono::TimeZone;
use minum::http::{Method, Response, StatusCode};
use minum::io::socket::SocketWrapper;
use minum::{
    HandlerRegistry, HttpDispatcher, Request, ServerConfig, StaticFilesCache, TheBrig,
};
use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, RwLock};

/// In-memory socket: canned input bytes in, response bytes captured.
struct FakeSocket {
    input: Cursor<Vec<u8>>,
    output: Vec<u8>,
    remote_ip: String,
    remote: String,
    shutdown_calls: usize,
}

impl FakeSocket {
    fn new(input: &[u8]) -> Self {
        Self::from_ip(input, "10.1.1.1")
    }

    fn from_ip(input: &[u8], ip: &str) -> Self {
        Self {
            input: Cursor::new(input.to_vec()),
            output: Vec::new(),
            remote_ip: ip.to_string(),
            remote: format!("{}:54321", ip),
            shutdown_calls: 0,
        }
    }
}

impl Read for FakeSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}

impl Write for FakeSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SocketWrapper for FakeSocket {
    fn remote_addr(&self) -> &str {
        &self.remote_ip
    }

    fn remote_addr_with_port(&self) -> &str {
        &self.remote
    }

    fn shutdown(&mut self) -> io::Result<()> {
        self.shutdown_calls += 1;
        Ok(())
    }
}

fn build_dispatcher(
    config: ServerConfig,
    setup: impl FnOnce(&mut HandlerRegistry, &mut StaticFilesCache),
) -> (HttpDispatcher, Arc<TheBrig>) {
    let config = Arc::new(config);
    let mut registry = HandlerRegistry::new();
    let mut static_files = StaticFilesCache::new(&config);
    setup(&mut registry, &mut static_files);
    let brig = Arc::new(TheBrig::new(&config));
    let dispatcher = HttpDispatcher::new(
        config,
        Arc::new(RwLock::new(registry)),
        Arc::new(RwLock::new(static_files)),
        brig.clone(),
    );
    (dispatcher, brig)
}

fn hello_handlers(registry: &mut HandlerRegistry, _cache: &mut StaticFilesCache) {
    registry.register(Method::Get, "hello", |_req: Request| {
        Response::with_typed_body(StatusCode::Ok, "text/plain", "hi there")
    });
    registry.register(Method::Post, "echo", |req: Request| {
        Response::with_typed_body(StatusCode::Ok, "text/plain", req.body.as_bytes().to_vec())
    });
}

/// Parse a stream of responses off the captured output, using
/// Content-Length for framing.
fn split_responses(raw: &[u8]) -> Vec<(u16, Vec<(String, String)>, Vec<u8>)> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < raw.len() {
        let head_end = raw[pos..]
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .map(|i| pos + i)
            .expect("response head not terminated");
        let head = std::str::from_utf8(&raw[pos..head_end]).unwrap();
        let mut lines = head.lines();
        let status: u16 = lines
            .next()
            .and_then(|l| l.split_whitespace().nth(1))
            .and_then(|s| s.parse().ok())
            .unwrap();
        let headers: Vec<(String, String)> = lines
            .filter_map(|l| l.split_once(':'))
            .map(|(n, v)| (n.trim().to_lowercase(), v.trim().to_string()))
            .collect();
        let content_length: usize = headers
            .iter()
            .find(|(n, _)| n == "content-length")
            .and_then(|(_, v)| v.parse().ok())
            .unwrap();
        let body_start = head_end + 4;
        let body = raw[body_start..body_start + content_length].to_vec();
        pos = body_start + content_length;
        out.push((status, headers, body));
    }
    out
}

fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
}

#[test]
fn test_simple_get_has_correct_framing() {
    let (dispatcher, _brig) = build_dispatcher(ServerConfig::default(), hello_handlers);
    let mut sock = FakeSocket::new(b"GET /hello HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n");
    dispatcher.handle_connection(&mut sock);

    let responses = split_responses(&sock.output);
    assert_eq!(responses.len(), 1);
    let (status, headers, body) = &responses[0];
    assert_eq!(*status, 200);
    assert_eq!(body, b"hi there");
    assert_eq!(header(headers, "content-length"), Some("8"));
    assert_eq!(header(headers, "server"), Some("minum"));
    assert_eq!(header(headers, "content-type"), Some("text/plain"));
    assert!(header(headers, "date").is_some());
    // Connection: close means no Keep-Alive advertisement
    assert!(header(headers, "keep-alive").is_none());
    assert!(sock.shutdown_calls >= 1);
}

#[test]
fn test_date_header_is_rfc1123() {
    let (dispatcher, _brig) = build_dispatcher(ServerConfig::default(), hello_handlers);
    let fixed = chrono::Utc.with_ymd_and_hms(2026, 1, 15, 10, 30, 0).unwrap();
    let dispatcher = dispatcher.with_date_override(fixed);
    let mut sock = FakeSocket::new(b"GET /hello HTTP/1.1\r\nConnection: close\r\n\r\n");
    dispatcher.handle_connection(&mut sock);

    let (_, headers, _) = split_responses(&sock.output).remove(0);
    assert_eq!(
        header(&headers, "date"),
        Some("Thu, 15 Jan 2026 10:30:00 GMT")
    );
}

#[test]
fn test_keep_alive_processes_two_requests() {
    let (dispatcher, _brig) = build_dispatcher(ServerConfig::default(), hello_handlers);
    let mut sock = FakeSocket::new(
        b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\n\
          GET /hello HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
    );
    dispatcher.handle_connection(&mut sock);

    let responses = split_responses(&sock.output);
    assert_eq!(responses.len(), 2);
    // first response advertises keep-alive, second does not
    assert!(header(&responses[0].1, "keep-alive").is_some());
    assert!(header(&responses[1].1, "keep-alive").is_none());
}

#[test]
fn test_http_10_defaults_to_close() {
    let (dispatcher, _brig) = build_dispatcher(ServerConfig::default(), hello_handlers);
    let mut sock = FakeSocket::new(
        b"GET /hello HTTP/1.0\r\n\r\nGET /hello HTTP/1.0\r\n\r\n",
    );
    dispatcher.handle_connection(&mut sock);

    // second request never processed: 1.0 without keep-alive closes
    let responses = split_responses(&sock.output);
    assert_eq!(responses.len(), 1);
    assert!(header(&responses[0].1, "keep-alive").is_none());
}

#[test]
fn test_http_10_opts_into_keep_alive() {
    let (dispatcher, _brig) = build_dispatcher(ServerConfig::default(), hello_handlers);
    let mut sock = FakeSocket::new(
        b"GET /hello HTTP/1.0\r\nConnection: keep-alive\r\n\r\n\
          GET /hello HTTP/1.0\r\n\r\n",
    );
    dispatcher.handle_connection(&mut sock);

    let responses = split_responses(&sock.output);
    assert_eq!(responses.len(), 2);
    assert!(header(&responses[0].1, "keep-alive").is_some());
}

#[test]
fn test_unknown_path_is_404_and_keeps_alive() {
    let (dispatcher, _brig) = build_dispatcher(ServerConfig::default(), hello_handlers);
    let mut sock = FakeSocket::new(
        b"GET /does_not_exist.html HTTP/1.1\r\n\r\n\
          GET /hello HTTP/1.1\r\nConnection: close\r\n\r\n",
    );
    dispatcher.handle_connection(&mut sock);

    let responses = split_responses(&sock.output);
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0].0, 404);
    assert!(responses[0].2.is_empty());
    assert_eq!(responses[1].0, 200);
}

#[test]
fn test_malformed_start_line_is_400() {
    let (dispatcher, _brig) = build_dispatcher(ServerConfig::default(), hello_handlers);
    let mut sock = FakeSocket::new(b"this is not http\r\n\r\n");
    dispatcher.handle_connection(&mut sock);

    let responses = split_responses(&sock.output);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].0, 400);
}

#[test]
fn test_unrecognized_method_is_400() {
    let (dispatcher, _brig) = build_dispatcher(ServerConfig::default(), hello_handlers);
    let mut sock = FakeSocket::new(b"BREW /hello HTTP/1.1\r\n\r\n");
    dispatcher.handle_connection(&mut sock);

    assert_eq!(split_responses(&sock.output)[0].0, 400);
}

#[test]
fn test_wrong_method_is_405() {
    let (dispatcher, _brig) = build_dispatcher(ServerConfig::default(), hello_handlers);
    let mut sock = FakeSocket::new(b"GET /echo HTTP/1.1\r\nConnection: close\r\n\r\n");
    dispatcher.handle_connection(&mut sock);

    assert_eq!(split_responses(&sock.output)[0].0, 405);
}

#[test]
fn test_body_over_cap_is_413() {
    let config = ServerConfig {
        max_read_size_bytes: 16,
        ..ServerConfig::default()
    };
    let (dispatcher, _brig) = build_dispatcher(config, hello_handlers);
    let mut sock = FakeSocket::new(
        b"POST /echo HTTP/1.1\r\nContent-Type: text/plain\r\nContent-Length: 64\r\n\r\n\
          0123456789012345678901234567890123456789012345678901234567890123",
    );
    dispatcher.handle_connection(&mut sock);

    assert_eq!(split_responses(&sock.output)[0].0, 413);
}

#[test]
fn test_panicking_handler_is_500_and_closes() {
    let (dispatcher, _brig) = build_dispatcher(ServerConfig::default(), |registry, _| {
        registry.register(Method::Get, "boom", |_req: Request| -> Response {
            panic!("handler exploded")
        });
    });
    let mut sock = FakeSocket::new(
        b"GET /boom HTTP/1.1\r\n\r\nGET /boom HTTP/1.1\r\n\r\n",
    );
    dispatcher.handle_connection(&mut sock);

    // one 500, then the connection is dropped despite HTTP/1.1
    let responses = split_responses(&sock.output);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].0, 500);
    assert!(header(&responses[0].1, "keep-alive").is_none());
}

#[test]
fn test_urlencoded_form_reaches_handler() {
    let (dispatcher, _brig) = build_dispatcher(ServerConfig::default(), |registry, _| {
        registry.register(Method::Post, "registeruser", |req: Request| {
            match (req.form_value("username"), req.form_value("password")) {
                (Some(u), Some(_)) if !u.is_empty() => Response::redirect_to("login"),
                _ => Response::new(StatusCode::BadRequest),
            }
        });
    });
    let body = "username=foo&password=bar";
    let input = format!(
        "POST /registeruser HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let mut sock = FakeSocket::new(input.as_bytes());
    dispatcher.handle_connection(&mut sock);

    let (status, headers, _) = split_responses(&sock.output).remove(0);
    assert_eq!(status, 303);
    assert_eq!(header(&headers, "location"), Some("login"));
}

#[test]
fn test_chunked_body_reaches_handler() {
    let (dispatcher, _brig) = build_dispatcher(ServerConfig::default(), hello_handlers);
    let mut sock = FakeSocket::new(
        b"POST /echo HTTP/1.1\r\nContent-Type: text/plain\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n\
          5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n",
    );
    dispatcher.handle_connection(&mut sock);

    let (status, _, body) = split_responses(&sock.output).remove(0);
    assert_eq!(status, 200);
    assert_eq!(body, b"hello world");
}

#[test]
fn test_length_without_content_type_is_no_body() {
    let (dispatcher, _brig) = build_dispatcher(ServerConfig::default(), |registry, _| {
        registry.register(Method::Post, "probe", |req: Request| {
            Response::with_typed_body(
                StatusCode::Ok,
                "text/plain",
                format!("len={}", req.body.len()),
            )
        });
    });
    // content-length with no content-type: dispatcher treats it as bodyless
    let mut sock =
        FakeSocket::new(b"POST /probe HTTP/1.1\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello");
    dispatcher.handle_connection(&mut sock);

    let (status, _, body) = split_responses(&sock.output).remove(0);
    assert_eq!(status, 200);
    assert_eq!(body, b"len=0");
}

#[test]
fn test_query_params_reach_handler() {
    let (dispatcher, _brig) = build_dispatcher(ServerConfig::default(), |registry, _| {
        registry.register(Method::Get, "photo", |req: Request| {
            let name = req.query_param("name").unwrap_or("missing").to_string();
            Response::with_typed_body(StatusCode::Ok, "text/plain", name)
        });
    });
    let mut sock =
        FakeSocket::new(b"GET /photo?name=moon%20shot HTTP/1.1\r\nConnection: close\r\n\r\n");
    dispatcher.handle_connection(&mut sock);

    let (_, _, body) = split_responses(&sock.output).remove(0);
    assert_eq!(body, b"moon shot");
}

#[test]
fn test_path_lookup_is_case_insensitive() {
    let (dispatcher, _brig) = build_dispatcher(ServerConfig::default(), hello_handlers);
    let mut sock = FakeSocket::new(b"GET /HeLLo HTTP/1.1\r\nConnection: close\r\n\r\n");
    dispatcher.handle_connection(&mut sock);

    assert_eq!(split_responses(&sock.output)[0].0, 200);
}

#[test]
fn test_static_asset_served_with_registered_mime() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("moon.png"), b"\x89PNG fake image bytes").unwrap();

    let (dispatcher, _brig) = build_dispatcher(ServerConfig::default(), |_, cache| {
        cache.add_mime_for_suffix("png", "image/png");
        cache.load_directory(dir.path()).unwrap();
    });

    for _ in 0..2 {
        // second hit comes from the same prebuilt cache entry
        let mut sock = FakeSocket::new(b"GET /moon.png HTTP/1.1\r\nConnection: close\r\n\r\n");
        dispatcher.handle_connection(&mut sock);
        let (status, headers, body) = split_responses(&sock.output).remove(0);
        assert_eq!(status, 200);
        assert_eq!(header(&headers, "content-type"), Some("image/png"));
        assert_eq!(body, b"\x89PNG fake image bytes");
    }
}

#[test]
fn test_head_matches_get_but_empty_body() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), b"<h1>home</h1>").unwrap();

    let (dispatcher, _brig) = build_dispatcher(ServerConfig::default(), |_, cache| {
        cache.load_directory(dir.path()).unwrap();
    });

    let mut get_sock = FakeSocket::new(b"GET /index.html HTTP/1.1\r\nConnection: close\r\n\r\n");
    dispatcher.handle_connection(&mut get_sock);
    let get_raw = String::from_utf8_lossy(&get_sock.output).to_string();
    let (get_head, get_body) = get_raw.split_once("\r\n\r\n").unwrap();

    let mut head_sock = FakeSocket::new(b"HEAD /index.html HTTP/1.1\r\nConnection: close\r\n\r\n");
    dispatcher.handle_connection(&mut head_sock);
    let head_raw = String::from_utf8_lossy(&head_sock.output).to_string();
    let (head_head, head_body) = head_raw.split_once("\r\n\r\n").unwrap();

    // identical status and headers apart from the Date timestamp
    let strip_date = |head: &str| -> Vec<String> {
        head.lines()
            .filter(|l| !l.to_lowercase().starts_with("date:"))
            .map(str::to_string)
            .collect()
    };
    assert_eq!(strip_date(get_head), strip_date(head_head));
    assert_eq!(get_body, "<h1>home</h1>");
    assert!(head_body.is_empty());
}

#[test]
fn test_over_long_line_jails_client() {
    let config = ServerConfig {
        max_read_line_size_bytes: 64,
        ..ServerConfig::default()
    };
    let (dispatcher, brig) = build_dispatcher(config, hello_handlers);

    let long_line = format!("GET /{} HTTP/1.1\r\n\r\n", "a".repeat(200));
    let mut sock = FakeSocket::from_ip(long_line.as_bytes(), "172.16.0.9");
    dispatcher.handle_connection(&mut sock);

    // no response at all, and the client is in jail
    assert!(sock.output.is_empty());
    assert!(brig.is_in_jail("172.16.0.9_vuln_seeking"));

    // the next connection from that client is dropped without reading
    let mut again = FakeSocket::from_ip(b"GET /hello HTTP/1.1\r\n\r\n", "172.16.0.9");
    dispatcher.handle_connection(&mut again);
    assert!(again.output.is_empty());
    assert!(again.shutdown_calls >= 1);
}

#[test]
fn test_suspicious_404_jails_client() {
    let (dispatcher, brig) = build_dispatcher(ServerConfig::default(), hello_handlers);
    let mut sock = FakeSocket::from_ip(
        b"GET /wp-login.php HTTP/1.1\r\nConnection: close\r\n\r\n",
        "172.16.0.10",
    );
    dispatcher.handle_connection(&mut sock);

    // still a clean 404 on the wire, but the client is now jailed
    assert_eq!(split_responses(&sock.output)[0].0, 404);
    assert!(brig.is_in_jail("172.16.0.10_vuln_seeking"));
}

#[test]
fn test_suspicious_path_with_malformed_header_still_jails() {
    let (dispatcher, brig) = build_dispatcher(ServerConfig::default(), hello_handlers);
    let mut sock = FakeSocket::from_ip(
        b"GET /wp-login.php HTTP/1.1\r\nBadHeaderNoColon\r\n\r\n",
        "172.16.0.12",
    );
    dispatcher.handle_connection(&mut sock);

    // the header error wins on the wire, but the probe was already jailed
    assert_eq!(split_responses(&sock.output)[0].0, 400);
    assert!(brig.is_in_jail("172.16.0.12_vuln_seeking"));
}

#[test]
fn test_suspicious_path_with_oversized_body_still_jails() {
    let config = ServerConfig {
        max_read_size_bytes: 16,
        ..ServerConfig::default()
    };
    let (dispatcher, brig) = build_dispatcher(config, hello_handlers);
    let mut sock = FakeSocket::from_ip(
        b"POST /app/.env HTTP/1.1\r\nContent-Type: text/plain\r\nContent-Length: 64\r\n\r\n\
          0123456789012345678901234567890123456789012345678901234567890123",
        "172.16.0.13",
    );
    dispatcher.handle_connection(&mut sock);

    assert_eq!(split_responses(&sock.output)[0].0, 413);
    assert!(brig.is_in_jail("172.16.0.13_vuln_seeking"));
}

#[test]
fn test_disabled_brig_never_jails() {
    let config = ServerConfig {
        is_the_brig_enabled: false,
        max_read_line_size_bytes: 64,
        ..ServerConfig::default()
    };
    let (dispatcher, brig) = build_dispatcher(config, hello_handlers);

    let long_line = format!("GET /{} HTTP/1.1\r\n\r\n", "a".repeat(200));
    let mut sock = FakeSocket::from_ip(long_line.as_bytes(), "172.16.0.11");
    dispatcher.handle_connection(&mut sock);
    assert!(!brig.is_in_jail("172.16.0.11_vuln_seeking"));

    // and a scan-looking 404 is just a 404
    let mut scan = FakeSocket::from_ip(
        b"GET /admin.cgi HTTP/1.1\r\nConnection: close\r\n\r\n",
        "172.16.0.11",
    );
    dispatcher.handle_connection(&mut scan);
    assert_eq!(split_responses(&scan.output)[0].0, 404);
    assert!(!brig.is_in_jail("172.16.0.11_vuln_seeking"));
}

#[test]
fn test_multipart_upload_reaches_handler() {
    let (dispatcher, _brig) = build_dispatcher(ServerConfig::default(), |registry, _| {
        registry.register(Method::Post, "upload", |req: Request| {
            match req.body.part("image_uploads") {
                Some(part) => Response::with_typed_body(
                    StatusCode::Ok,
                    "text/plain",
                    format!(
                        "{}:{}",
                        part.filename.as_deref().unwrap_or(""),
                        part.data.len()
                    ),
                ),
                None => Response::new(StatusCode::BadRequest),
            }
        });
    });

    let payload: &[u8] = b"--bnd\r\n\
        Content-Disposition: form-data; name=\"image_uploads\"; filename=\"moon.png\"\r\n\
        Content-Type: image/png\r\n\
        \r\n\
        12345678\r\n\
        --bnd--\r\n";
    let input = [
        format!(
            "POST /upload HTTP/1.1\r\nContent-Type: multipart/form-data; boundary=bnd\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            payload.len()
        )
        .into_bytes(),
        payload.to_vec(),
    ]
    .concat();
    let mut sock = FakeSocket::new(&input);
    dispatcher.handle_connection(&mut sock);

    let (status, _, body) = split_responses(&sock.output).remove(0);
    assert_eq!(status, 200);
    assert_eq!(body, b"moon.png:8");
}
