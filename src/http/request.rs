use crate::http::body::Body;
use crate::http::headers::Headers;
use crate::http::start_line::StartLine;

/// Everything a handler gets to see about one HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    pub start_line: StartLine,
    pub headers: Headers,
    pub body: Body,
    /// Remote address without the port.
    pub remote_addr: String,
}

impl Request {
    /// A query parameter from the request target.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.start_line.path_details.query_param(name)
    }

    /// The first value of a header, case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.first_value(name)
    }

    /// A decoded field from a urlencoded form body, as text.
    #[must_use]
    pub fn form_value(&self, key: &str) -> Option<String> {
        self.body
            .form_value(key)
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }
}
