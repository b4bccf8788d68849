use std::fmt;

/// The status codes this server emits, with their reason phrases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    Created,
    NoContent,
    MovedPermanently,
    SeeOther,
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    PayloadTooLarge,
    InternalServerError,
    ServiceUnavailable,
}

impl StatusCode {
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::Created => 201,
            StatusCode::NoContent => 204,
            StatusCode::MovedPermanently => 301,
            StatusCode::SeeOther => 303,
            StatusCode::BadRequest => 400,
            StatusCode::Unauthorized => 401,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::MethodNotAllowed => 405,
            StatusCode::PayloadTooLarge => 413,
            StatusCode::InternalServerError => 500,
            StatusCode::ServiceUnavailable => 503,
        }
    }

    #[must_use]
    pub fn short_description(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Created => "Created",
            StatusCode::NoContent => "No Content",
            StatusCode::MovedPermanently => "Moved Permanently",
            StatusCode::SeeOther => "See Other",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Unauthorized => "Unauthorized",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::PayloadTooLarge => "Payload Too Large",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::ServiceUnavailable => "Service Unavailable",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.short_description())
    }
}

/// What a handler gives back: a status, extra headers, and body bytes.
///
/// The dispatcher owns serialization; it adds `Date`, `Server` and
/// `Content-Length` itself, so handlers only set what is specific to
/// their response.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub extra_headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    /// An empty-bodied response with the given status.
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            extra_headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// A response with a body and no content-type. Prefer
    /// [`Response::with_typed_body`] unless a type truly does not apply.
    #[must_use]
    pub fn with_body(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            extra_headers: Vec::new(),
            body: body.into(),
        }
    }

    /// A response with a body and a `Content-Type` header.
    #[must_use]
    pub fn with_typed_body(
        status: StatusCode,
        content_type: &str,
        body: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            status,
            extra_headers: vec![("Content-Type".to_string(), content_type.to_string())],
            body: body.into(),
        }
    }

    /// A 303 redirect to `location`.
    #[must_use]
    pub fn redirect_to(location: &str) -> Self {
        Self {
            status: StatusCode::SeeOther,
            extra_headers: vec![("Location".to_string(), location.to_string())],
            body: Vec::new(),
        }
    }

    /// Builder-style extra header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.extra_headers
            .push((name.to_string(), value.to_string()));
        self
    }

    pub fn add_header(&mut self, name: &str, value: &str) {
        self.extra_headers
            .push((name.to_string(), value.to_string()));
    }
}
