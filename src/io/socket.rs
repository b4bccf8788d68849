use std::cmp;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr};

/// The seam between the dispatcher and the transport.
///
/// The production implementation wraps a `may` TCP stream; tests drive
/// the dispatcher through an in-memory implementation. The dispatcher
/// only ever sees this trait, so everything above the socket is testable
/// without a network.
pub trait SocketWrapper: Read + Write + Send {
    /// Remote address without the port, as used for jail keys.
    fn remote_addr(&self) -> &str;

    /// Remote address including the port, for log correlation.
    fn remote_addr_with_port(&self) -> &str;

    /// Shut down both directions of the connection.
    fn shutdown(&mut self) -> io::Result<()>;
}

/// Production [`SocketWrapper`] over an accepted `may` TCP stream.
pub struct TcpSocketWrapper {
    stream: may::net::TcpStream,
    remote_ip: String,
    remote: String,
}

impl TcpSocketWrapper {
    pub fn new(stream: may::net::TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            remote_ip: peer.ip().to_string(),
            remote: peer.to_string(),
        }
    }
}

impl Read for TcpSocketWrapper {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for TcpSocketWrapper {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl SocketWrapper for TcpSocketWrapper {
    fn remote_addr(&self) -> &str {
        &self.remote_ip
    }

    fn remote_addr_with_port(&self) -> &str {
        &self.remote
    }

    fn shutdown(&mut self) -> io::Result<()> {
        self.stream.shutdown(Shutdown::Both)
    }
}

/// Outcome of a bounded line read.
#[derive(Debug, PartialEq, Eq)]
pub enum LineRead {
    /// A complete line, CR and LF stripped.
    Line(String),
    /// The peer closed its side before sending anything.
    Eof,
    /// The line exceeded the configured cap before a newline arrived.
    TooLong,
}

/// Buffered reader for CRLF-terminated lines and exact-length byte runs.
///
/// One instance lives for the whole connection: bytes read past a line
/// terminator stay available to the next read, and under keep-alive the
/// next request may already sit in the buffer.
pub struct LineReader {
    buf: Vec<u8>,
    pos: usize,
}

impl LineReader {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(4096),
            pos: 0,
        }
    }

    fn fill<R: Read + ?Sized>(&mut self, src: &mut R) -> io::Result<usize> {
        self.buf.clear();
        self.pos = 0;
        let mut tmp = [0u8; 4096];
        let n = src.read(&mut tmp)?;
        self.buf.extend_from_slice(&tmp[..n]);
        Ok(n)
    }

    /// Read one line, up to `max` bytes of content (terminator excluded).
    ///
    /// A line of exactly `max` bytes is accepted; one byte more returns
    /// [`LineRead::TooLong`]. A lone CR is dropped rather than kept, so
    /// both CRLF and bare-LF clients parse the same way.
    pub fn read_line<R: Read + ?Sized>(&mut self, src: &mut R, max: usize) -> io::Result<LineRead> {
        let mut line: Vec<u8> = Vec::new();
        loop {
            if self.pos >= self.buf.len() && self.fill(src)? == 0 {
                if line.is_empty() {
                    return Ok(LineRead::Eof);
                }
                // partial line at EOF: hand it up and let the parser reject it
                break;
            }
            let b = self.buf[self.pos];
            self.pos += 1;
            if b == b'\n' {
                break;
            }
            if b == b'\r' {
                continue;
            }
            if line.len() >= max {
                return Ok(LineRead::TooLong);
            }
            line.push(b);
        }
        Ok(LineRead::Line(String::from_utf8_lossy(&line).into_owned()))
    }

    /// Read exactly `n` bytes, consuming buffered bytes first.
    pub fn read_exact_n<R: Read + ?Sized>(&mut self, src: &mut R, n: usize) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(cmp::min(n, 64 * 1024));
        let avail = self.buf.len() - self.pos;
        let take = cmp::min(avail, n);
        out.extend_from_slice(&self.buf[self.pos..self.pos + take]);
        self.pos += take;

        let mut tmp = [0u8; 8192];
        while out.len() < n {
            let want = cmp::min(tmp.len(), n - out.len());
            let got = src.read(&mut tmp[..want])?;
            if got == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed mid-body",
                ));
            }
            out.extend_from_slice(&tmp[..got]);
        }
        Ok(out)
    }
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_line_crlf() {
        let mut src = Cursor::new(b"GET / HTTP/1.1\r\nHost: x\r\n".to_vec());
        let mut r = LineReader::new();
        assert_eq!(
            r.read_line(&mut src, 1024).unwrap(),
            LineRead::Line("GET / HTTP/1.1".into())
        );
        assert_eq!(
            r.read_line(&mut src, 1024).unwrap(),
            LineRead::Line("Host: x".into())
        );
        assert_eq!(r.read_line(&mut src, 1024).unwrap(), LineRead::Eof);
    }

    #[test]
    fn test_read_line_bare_lf() {
        let mut src = Cursor::new(b"hello\nworld\n".to_vec());
        let mut r = LineReader::new();
        assert_eq!(
            r.read_line(&mut src, 1024).unwrap(),
            LineRead::Line("hello".into())
        );
        assert_eq!(
            r.read_line(&mut src, 1024).unwrap(),
            LineRead::Line("world".into())
        );
    }

    #[test]
    fn test_line_at_exact_cap_is_accepted() {
        let line = "a".repeat(16);
        let mut src = Cursor::new(format!("{}\r\n", line).into_bytes());
        let mut r = LineReader::new();
        assert_eq!(r.read_line(&mut src, 16).unwrap(), LineRead::Line(line));
    }

    #[test]
    fn test_line_one_past_cap_is_too_long() {
        let mut src = Cursor::new(format!("{}\r\n", "a".repeat(17)).into_bytes());
        let mut r = LineReader::new();
        assert_eq!(r.read_line(&mut src, 16).unwrap(), LineRead::TooLong);
    }

    #[test]
    fn test_read_exact_n_spans_buffer_and_source() {
        let mut src = Cursor::new(b"head\r\n0123456789".to_vec());
        let mut r = LineReader::new();
        assert_eq!(
            r.read_line(&mut src, 1024).unwrap(),
            LineRead::Line("head".into())
        );
        let body = r.read_exact_n(&mut src, 10).unwrap();
        assert_eq!(body, b"0123456789");
    }

    #[test]
    fn test_read_exact_n_short_source_errors() {
        let mut src = Cursor::new(b"abc".to_vec());
        let mut r = LineReader::new();
        let err = r.read_exact_n(&mut src, 10).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
