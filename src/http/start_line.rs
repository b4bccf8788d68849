use crate::http::error::ProtocolError;
use crate::http::method::Method;
use std::collections::HashMap;
use std::fmt;

/// The HTTP versions this server speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    OneDotZero,
    OneDotOne,
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpVersion::OneDotZero => f.write_str("HTTP/1.0"),
            HttpVersion::OneDotOne => f.write_str("HTTP/1.1"),
        }
    }
}

/// The request target, split into its path and query components.
///
/// `isolated_path` keeps the client's casing for handlers; registry and
/// static-cache lookups go through [`PathDetails::lookup_path`], which
/// lowercases it.
#[derive(Debug, Clone)]
pub struct PathDetails {
    /// The target exactly as received, query string included.
    pub raw_path: String,
    /// The path with the query string and leading slash removed.
    pub isolated_path: String,
    query_params: HashMap<String, String>,
}

impl PathDetails {
    fn parse(target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (target, None),
        };
        let query_params = query.map(parse_query_string).unwrap_or_default();
        Self {
            raw_path: target.to_string(),
            isolated_path: path.trim_start_matches('/').to_string(),
            query_params,
        }
    }

    /// The lowercased path used as the registry / static-cache key.
    #[must_use]
    pub fn lookup_path(&self) -> String {
        self.isolated_path.to_lowercase()
    }

    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn query_params(&self) -> &HashMap<String, String> {
        &self.query_params
    }
}

/// Parse `k=v&k=v` with UTF-8 percent-decoding. Duplicate keys keep the
/// last value.
fn parse_query_string(query: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// The first line of an HTTP request: method, target, version.
#[derive(Debug, Clone)]
pub struct StartLine {
    pub method: Method,
    pub path_details: PathDetails,
    pub version: HttpVersion,
}

impl StartLine {
    /// Parse exactly `METHOD SP request-target SP HTTP/<1.0|1.1>`.
    ///
    /// Unknown method tokens still parse (to [`Method::Unrecognized`]);
    /// the dispatcher decides what to do with them.
    pub fn parse(line: &str) -> Result<StartLine, ProtocolError> {
        let malformed = || ProtocolError::MalformedStartLine(line.to_string());
        let mut parts = line.split(' ');
        let method_token = parts.next().ok_or_else(malformed)?;
        let target = parts.next().ok_or_else(malformed)?;
        let version_token = parts.next().ok_or_else(malformed)?;
        if parts.next().is_some() || method_token.is_empty() || target.is_empty() {
            return Err(malformed());
        }
        let version = match version_token {
            "HTTP/1.1" => HttpVersion::OneDotOne,
            "HTTP/1.0" => HttpVersion::OneDotZero,
            _ => return Err(malformed()),
        };
        Ok(StartLine {
            method: Method::parse(method_token),
            path_details: PathDetails::parse(target),
            version,
        })
    }
}

impl fmt::Display for StartLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} /{} {}",
            self.method, self.path_details.isolated_path, self.version
        )
    }
}
