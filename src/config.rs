//! Environment-variable configuration for the server.
//!
//! Every knob has a default; set the variable to override. The names are
//! the server's public contract, so they carry no crate prefix:
//!
//! ```bash
//! export SERVER_PORT=8080
//! export MAX_READ_LINE_SIZE_BYTES=1024
//! export IS_THE_BRIG_ENABLED=true
//! ```

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Honeypot tokens whose presence in a requested path marks the client
/// as scanning for vulnerabilities.
pub const DEFAULT_SUSPICIOUS_PATHS: &[&str] = &[
    ".php",
    ".env",
    "wp-login",
    "wp-admin",
    "admin.cgi",
    "/cgi-bin/",
    ".git",
    "etc/passwd",
    ".aws",
    "phpmyadmin",
];

/// Runtime configuration, loaded once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Plaintext listen port.
    pub server_port: u16,
    /// TLS listen port; 0 disables the TLS listener.
    pub secure_server_port: u16,
    /// Bind address for both listeners.
    pub host_name: String,
    /// Cap on any single CRLF-terminated line.
    pub max_read_line_size_bytes: usize,
    /// Cap on a request body; beyond it the client gets 413.
    pub max_read_size_bytes: usize,
    /// Cap on the number of header lines in one request.
    pub max_headers_count: usize,
    /// Idle socket read timeout; a timeout counts as client-gone.
    pub socket_timeout_millis: u64,
    /// Advertised in the `Keep-Alive` response header.
    pub keep_alive_timeout_seconds: u64,
    /// Jail TTL for clients caught probing, in milliseconds.
    pub vuln_seeking_jail_duration_millis: u64,
    /// Master switch for the intrusion detector.
    pub is_the_brig_enabled: bool,
    /// Period of the brig's background eviction sweep.
    pub brig_sweep_interval_millis: u64,
    /// Honeypot tokens; comma-separated in the environment.
    pub suspicious_paths: Vec<String>,
    /// Root directory preloaded into the static-asset cache.
    pub static_files_directory: PathBuf,
    /// `Cache-Control: max-age` for static assets; 0 omits the header.
    pub static_file_cache_time_seconds: u64,
    /// Root for persisted data. The core never touches it; handlers do.
    pub db_directory: PathBuf,
    /// Concurrent-connection bound; beyond it new clients get 503.
    pub max_connections: usize,
    /// How long `stop()` waits for in-flight connections to drain.
    pub shutdown_grace_millis: u64,
    /// PEM certificate chain, required when the TLS listener is enabled.
    pub tls_cert_file: Option<PathBuf>,
    /// PEM private key, required when the TLS listener is enabled.
    pub tls_key_file: Option<PathBuf>,
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    #[must_use]
    pub fn from_env() -> Self {
        let socket_timeout_millis = parse_var("SOCKET_TIMEOUT_MILLIS", 7000u64);
        Self {
            server_port: parse_var("SERVER_PORT", 8080),
            secure_server_port: parse_var("SECURE_SERVER_PORT", 0),
            host_name: string_var("HOST_NAME", "127.0.0.1"),
            max_read_line_size_bytes: parse_var("MAX_READ_LINE_SIZE_BYTES", 1024),
            max_read_size_bytes: parse_var("MAX_READ_SIZE_BYTES", 10 * 1024 * 1024),
            max_headers_count: parse_var("MAX_HEADERS_COUNT", 70),
            socket_timeout_millis,
            keep_alive_timeout_seconds: parse_var(
                "KEEP_ALIVE_TIMEOUT_SECONDS",
                (socket_timeout_millis / 1000).max(1),
            ),
            vuln_seeking_jail_duration_millis: parse_var("VULN_SEEKING_JAIL_DURATION", 10_000),
            is_the_brig_enabled: bool_var("IS_THE_BRIG_ENABLED", true),
            brig_sweep_interval_millis: parse_var("BRIG_SWEEP_INTERVAL_MILLIS", 5000),
            suspicious_paths: list_var("SUSPICIOUS_PATHS", DEFAULT_SUSPICIOUS_PATHS),
            static_files_directory: PathBuf::from(string_var("STATIC_FILES_DIRECTORY", "static")),
            static_file_cache_time_seconds: parse_var("STATIC_FILE_CACHE_TIME", 0),
            db_directory: PathBuf::from(string_var("DB_DIRECTORY", "db")),
            max_connections: parse_var("MAX_CONNECTIONS", 512),
            shutdown_grace_millis: parse_var("SHUTDOWN_GRACE_MILLIS", 3000),
            tls_cert_file: env::var("TLS_CERT_FILE").ok().map(PathBuf::from),
            tls_key_file: env::var("TLS_KEY_FILE").ok().map(PathBuf::from),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        // defaults only, regardless of the process environment
        Self {
            server_port: 8080,
            secure_server_port: 0,
            host_name: "127.0.0.1".to_string(),
            max_read_line_size_bytes: 1024,
            max_read_size_bytes: 10 * 1024 * 1024,
            max_headers_count: 70,
            socket_timeout_millis: 7000,
            keep_alive_timeout_seconds: 7,
            vuln_seeking_jail_duration_millis: 10_000,
            is_the_brig_enabled: true,
            brig_sweep_interval_millis: 5000,
            suspicious_paths: DEFAULT_SUSPICIOUS_PATHS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            static_files_directory: PathBuf::from("static"),
            static_file_cache_time_seconds: 0,
            db_directory: PathBuf::from("db"),
            max_connections: 512,
            shutdown_grace_millis: 3000,
            tls_cert_file: None,
            tls_key_file: None,
        }
    }
}

fn parse_var<T: FromStr + Copy>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn string_var(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn bool_var(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => v.eq_ignore_ascii_case("true") || v == "1",
        Err(_) => default,
    }
}

fn list_var(key: &str, default: &[&str]) -> Vec<String> {
    match env::var(key) {
        Ok(v) => v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Err(_) => default.iter().map(|s| s.to_string()).collect(),
    }
}
