use crate::http::error::ProtocolError;
use crate::http::headers::Headers;
use crate::io::socket::{LineRead, LineReader};
use std::collections::HashMap;
use std::io::{self, Read};

/// One part of a `multipart/form-data` body.
#[derive(Debug, Clone)]
pub struct MultipartPart {
    /// The `name` parameter of the part's Content-Disposition.
    pub name: String,
    /// The `filename` parameter, when the part is a file upload.
    pub filename: Option<String>,
    /// The part's own headers, in order.
    pub headers: Vec<(String, String)>,
    /// The part's raw bytes.
    pub data: Vec<u8>,
}

/// A request body: the raw bytes, plus whichever parsed view the
/// content type called for.
#[derive(Debug, Clone, Default)]
pub struct Body {
    raw: Vec<u8>,
    form: Option<HashMap<String, Vec<u8>>>,
    parts: Option<Vec<MultipartPart>>,
}

impl Body {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// The body as text, for handlers that know it is textual.
    #[must_use]
    pub fn as_string(&self) -> String {
        String::from_utf8_lossy(&self.raw).into_owned()
    }

    /// A decoded field from a urlencoded form body.
    #[must_use]
    pub fn form_value(&self, key: &str) -> Option<&[u8]> {
        self.form.as_ref()?.get(key).map(Vec::as_slice)
    }

    /// A named part from a multipart body.
    #[must_use]
    pub fn part(&self, name: &str) -> Option<&MultipartPart> {
        self.parts.as_ref()?.iter().find(|p| p.name == name)
    }

    #[must_use]
    pub fn parts(&self) -> &[MultipartPart] {
        self.parts.as_deref().unwrap_or(&[])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

/// Reads a request body off the wire and parses it according to the
/// request headers.
///
/// Strategy selection:
/// - `Transfer-Encoding: chunked` de-chunks first, anything else reads
///   exactly `content-length` bytes;
/// - `application/x-www-form-urlencoded` additionally parses a field map;
/// - `multipart/form-data` additionally splits boundary-delimited parts;
/// - any other content type keeps the raw bytes only.
pub struct BodyProcessor {
    max_body_bytes: usize,
    max_line_bytes: usize,
}

impl BodyProcessor {
    #[must_use]
    pub fn new(max_body_bytes: usize, max_line_bytes: usize) -> Self {
        Self {
            max_body_bytes,
            max_line_bytes,
        }
    }

    pub fn extract<R: Read + ?Sized>(
        &self,
        reader: &mut LineReader,
        src: &mut R,
        headers: &Headers,
    ) -> Result<Body, ProtocolError> {
        let chunked = headers
            .value_by_key("transfer-encoding")
            .iter()
            .any(|v| v.eq_ignore_ascii_case("chunked"));

        let raw = if chunked {
            self.read_chunked(reader, src)?
        } else {
            let declared = headers.content_length();
            if declared > self.max_body_bytes {
                return Err(ProtocolError::BodyTooLarge {
                    max: self.max_body_bytes,
                });
            }
            reader.read_exact_n(src, declared).map_err(|e| {
                if e.kind() == io::ErrorKind::UnexpectedEof {
                    ProtocolError::ContentLengthMismatch
                } else {
                    ProtocolError::Io(e)
                }
            })?
        };

        let content_type = headers.content_type();
        let mut body = Body {
            raw,
            form: None,
            parts: None,
        };
        if content_type.starts_with("application/x-www-form-urlencoded") {
            body.form = Some(parse_urlencoded(&body.raw));
        } else if content_type.starts_with("multipart/form-data") {
            // the boundary is case-sensitive, so take it from the raw
            // header rather than the lowercased accessor
            let raw_content_type = headers.first_value("content-type").unwrap_or("");
            let boundary = boundary_from_content_type(raw_content_type).ok_or_else(|| {
                ProtocolError::BadMultipartFraming("no boundary parameter".to_string())
            })?;
            body.parts = Some(parse_multipart(&body.raw, &boundary)?);
        }
        Ok(body)
    }

    /// Decode chunked transfer encoding: hex size line, chunk bytes,
    /// CRLF, repeated; a zero-size chunk ends the body, followed by
    /// optional trailer lines up to a blank line.
    fn read_chunked<R: Read + ?Sized>(
        &self,
        reader: &mut LineReader,
        src: &mut R,
    ) -> Result<Vec<u8>, ProtocolError> {
        let mut out = Vec::new();
        loop {
            let size_line = self.chunk_line(reader, src)?;
            // chunk extensions after ';' are permitted and ignored
            let size_token = size_line.split(';').next().unwrap_or("").trim();
            let size = usize::from_str_radix(size_token, 16).map_err(|_| {
                ProtocolError::BadChunkFraming(format!("bad chunk size {:?}", size_token))
            })?;
            if size == 0 {
                loop {
                    let trailer = self.chunk_line(reader, src)?;
                    if trailer.is_empty() {
                        break;
                    }
                }
                return Ok(out);
            }
            if out.len() + size > self.max_body_bytes {
                return Err(ProtocolError::BodyTooLarge {
                    max: self.max_body_bytes,
                });
            }
            let chunk = reader.read_exact_n(src, size)?;
            out.extend_from_slice(&chunk);
            let crlf = reader.read_exact_n(src, 2)?;
            if crlf != b"\r\n" {
                return Err(ProtocolError::BadChunkFraming(
                    "chunk data not followed by CRLF".to_string(),
                ));
            }
        }
    }

    fn chunk_line<R: Read + ?Sized>(
        &self,
        reader: &mut LineReader,
        src: &mut R,
    ) -> Result<String, ProtocolError> {
        match reader.read_line(src, self.max_line_bytes)? {
            LineRead::Line(l) => Ok(l),
            LineRead::Eof => Err(ProtocolError::BadChunkFraming(
                "connection closed mid-chunk".to_string(),
            )),
            LineRead::TooLong => Err(ProtocolError::LineTooLong {
                max: self.max_line_bytes,
            }),
        }
    }
}

/// Parse `k=v&k=v` bytes with UTF-8 percent-decoding. Duplicate keys
/// keep the last value. Values stay as bytes; form fields are not
/// guaranteed to be text.
fn parse_urlencoded(raw: &[u8]) -> HashMap<String, Vec<u8>> {
    url::form_urlencoded::parse(raw)
        .map(|(k, v)| (k.into_owned(), v.into_owned().into_bytes()))
        .collect()
}

/// Pull the `boundary` parameter out of a multipart content-type value.
fn boundary_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|param| {
        let param = param.trim();
        let value = param
            .strip_prefix("boundary=")
            .or_else(|| param.strip_prefix("BOUNDARY="))?;
        Some(value.trim_matches('"').to_string())
    })
}

fn find_subsequence(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}

/// Split a multipart body into its parts.
///
/// Framing: preamble (ignored), then per part `--B CRLF`, part headers,
/// blank line, data bytes up to `CRLF--B`. The final delimiter is
/// `--B--`.
fn parse_multipart(raw: &[u8], boundary: &str) -> Result<Vec<MultipartPart>, ProtocolError> {
    let delimiter = format!("--{}", boundary).into_bytes();
    let mut parts = Vec::new();

    let mut pos = find_subsequence(raw, &delimiter, 0).ok_or_else(|| {
        ProtocolError::BadMultipartFraming("opening boundary not found".to_string())
    })? + delimiter.len();

    loop {
        if raw[pos..].starts_with(b"--") {
            return Ok(parts);
        }
        if raw[pos..].starts_with(b"\r\n") {
            pos += 2;
        } else {
            return Err(ProtocolError::BadMultipartFraming(
                "boundary not followed by CRLF".to_string(),
            ));
        }

        let mut headers: Vec<(String, String)> = Vec::new();
        loop {
            let eol = find_subsequence(raw, b"\r\n", pos).ok_or_else(|| {
                ProtocolError::BadMultipartFraming("part headers not terminated".to_string())
            })?;
            let line = &raw[pos..eol];
            pos = eol + 2;
            if line.is_empty() {
                break;
            }
            let line = String::from_utf8_lossy(line);
            let (name, value) = line.split_once(':').ok_or_else(|| {
                ProtocolError::BadMultipartFraming(format!("bad part header {:?}", line))
            })?;
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        let mut closing = b"\r\n".to_vec();
        closing.extend_from_slice(&delimiter);
        let end = find_subsequence(raw, &closing, pos).ok_or_else(|| {
            ProtocolError::BadMultipartFraming("closing boundary not found".to_string())
        })?;
        let data = raw[pos..end].to_vec();
        pos = end + closing.len();

        let disposition = headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case("content-disposition"))
            .map(|(_, v)| v.as_str())
            .unwrap_or("");
        let name = disposition_param(disposition, "name").unwrap_or_default();
        let filename = disposition_param(disposition, "filename");

        parts.push(MultipartPart {
            name,
            filename,
            headers,
            data,
        });
    }
}

fn disposition_param(disposition: &str, key: &str) -> Option<String> {
    disposition.split(';').find_map(|param| {
        let (k, v) = param.trim().split_once('=')?;
        if k.trim().eq_ignore_ascii_case(key) {
            Some(v.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}
