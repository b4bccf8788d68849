use crate::http::response::StatusCode;
use std::fmt;
use std::io;

/// A violation of the HTTP protocol by the client, or an I/O failure
/// while reading the request.
///
/// The dispatcher translates each variant into a numeric status and
/// closes the connection; `Io` gets no response at all since the peer
/// is assumed gone.
#[derive(Debug)]
pub enum ProtocolError {
    /// The start line did not match `METHOD SP target SP HTTP/x.y`.
    MalformedStartLine(String),
    /// A header line did not contain a colon.
    MalformedHeader(String),
    /// A single line exceeded the configured cap.
    LineTooLong { max: usize },
    /// More header lines than the configured cap.
    TooManyHeaders { max: usize },
    /// Chunked transfer framing was invalid (bad size line, missing CRLF).
    BadChunkFraming(String),
    /// Multipart framing was invalid (missing boundary or terminator).
    BadMultipartFraming(String),
    /// The declared or accumulated body size exceeded the configured cap.
    BodyTooLarge { max: usize },
    /// The connection ended before `content-length` bytes arrived.
    ContentLengthMismatch,
    /// The socket failed or timed out mid-request.
    Io(io::Error),
}

impl ProtocolError {
    /// The status the dispatcher should answer with. Meaningless for
    /// `Io`, which is handled by closing silently.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            ProtocolError::BodyTooLarge { .. } => StatusCode::PayloadTooLarge,
            _ => StatusCode::BadRequest,
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::MalformedStartLine(line) => {
                write!(f, "malformed start line: {:?}", line)
            }
            ProtocolError::MalformedHeader(line) => {
                write!(f, "malformed header line: {:?}", line)
            }
            ProtocolError::LineTooLong { max } => {
                write!(f, "line exceeded the {} byte cap", max)
            }
            ProtocolError::TooManyHeaders { max } => {
                write!(f, "more than {} header lines", max)
            }
            ProtocolError::BadChunkFraming(detail) => {
                write!(f, "invalid chunked framing: {}", detail)
            }
            ProtocolError::BadMultipartFraming(detail) => {
                write!(f, "invalid multipart framing: {}", detail)
            }
            ProtocolError::BodyTooLarge { max } => {
                write!(f, "request body exceeded the {} byte cap", max)
            }
            ProtocolError::ContentLengthMismatch => {
                write!(f, "connection closed before the declared content-length was read")
            }
            ProtocolError::Io(e) => write!(f, "socket error: {}", e),
        }
    }
}

impl std::error::Error for ProtocolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProtocolError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ProtocolError {
    fn from(e: io::Error) -> Self {
        ProtocolError::Io(e)
    }
}
