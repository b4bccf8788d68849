use crate::http::error::ProtocolError;
use crate::io::socket::{LineRead, LineReader};
use smallvec::SmallVec;
use std::io::Read;

/// Header storage. Stack-allocated for the common request shape; most
/// requests carry well under sixteen headers.
pub type HeaderVec = SmallVec<[(String, String); 16]>;

/// The header block of a request: an insertion-ordered list of
/// (name, value) pairs with case-insensitive lookup.
///
/// Duplicate names are legal and preserved; [`Headers::value_by_key`]
/// returns every value for a name, in order.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    pairs: HeaderVec,
}

/// Caps applied while reading a header block off the wire.
#[derive(Debug, Clone, Copy)]
pub struct HeaderLimits {
    /// Maximum bytes per header line.
    pub max_line_bytes: usize,
    /// Maximum number of header lines.
    pub max_count: usize,
}

impl Headers {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Read header lines until the blank line that ends the block.
    ///
    /// Each line must contain a colon; the name is everything before the
    /// first colon, the value is trimmed. Exceeding either cap in
    /// `limits` is a client protocol error.
    pub fn extract<R: Read + ?Sized>(
        reader: &mut LineReader,
        src: &mut R,
        limits: HeaderLimits,
    ) -> Result<Headers, ProtocolError> {
        let mut pairs = HeaderVec::new();
        loop {
            let line = match reader.read_line(src, limits.max_line_bytes)? {
                LineRead::Line(l) => l,
                LineRead::Eof => break,
                LineRead::TooLong => {
                    return Err(ProtocolError::LineTooLong {
                        max: limits.max_line_bytes,
                    })
                }
            };
            if line.is_empty() {
                break;
            }
            if pairs.len() >= limits.max_count {
                return Err(ProtocolError::TooManyHeaders {
                    max: limits.max_count,
                });
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| ProtocolError::MalformedHeader(line.clone()))?;
            pairs.push((name.trim().to_string(), value.trim().to_string()));
        }
        Ok(Headers { pairs })
    }

    pub fn push(&mut self, name: &str, value: &str) {
        self.pairs.push((name.to_string(), value.to_string()));
    }

    /// Every value for `key`, case-insensitively, in insertion order.
    #[must_use]
    pub fn value_by_key(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// The first value for `key`, case-insensitively.
    #[must_use]
    pub fn first_value(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// The content type, lowercased. Empty string when absent.
    #[must_use]
    pub fn content_type(&self) -> String {
        self.first_value("content-type")
            .map(str::to_lowercase)
            .unwrap_or_default()
    }

    /// The declared content length. Zero when absent or malformed.
    #[must_use]
    pub fn content_length(&self) -> usize {
        self.first_value("content-length")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Whether a `Connection` header carries the `keep-alive` token.
    #[must_use]
    pub fn has_keep_alive(&self) -> bool {
        self.connection_contains_token("keep-alive")
    }

    /// Whether a `Connection` header carries the `close` token.
    #[must_use]
    pub fn has_connection_close(&self) -> bool {
        self.connection_contains_token("close")
    }

    fn connection_contains_token(&self, token: &str) -> bool {
        self.value_by_key("connection").iter().any(|v| {
            v.split(',')
                .any(|t| t.trim().eq_ignore_ascii_case(token))
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}
